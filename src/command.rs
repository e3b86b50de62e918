//! Text commands standing in for the selection UI and capture buttons.

use crate::error::{BoothError, BoothResult};
use crate::export::{CaptureExporter, ShareOutcome, ShareTarget};
use crate::render::StopHandle;
use crate::session::{Mode, SessionHandle};
use crossbeam_channel::Receiver;
use std::io::BufRead;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Filter(String),
    Background(usize),
    Capture,
    Share,
    Reset,
    List,
    Quit,
}

impl FromStr for Command {
    type Err = BoothError;

    fn from_str(line: &str) -> BoothResult<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let arg = words.next();

        let command = match (verb, arg) {
            ("filter" | "f", Some(id)) => Command::Filter(id.to_string()),
            ("bg" | "background" | "b", Some(index)) => Command::Background(parse_index(index)?),
            ("capture" | "c", None) => Command::Capture,
            ("share" | "s", None) => Command::Share,
            ("reset" | "r", None) => Command::Reset,
            ("list" | "l", None) => Command::List,
            ("quit" | "q", None) => Command::Quit,
            _ => {
                return Err(BoothError::invalid_selection(format!(
                    "unrecognized command '{}'",
                    line.trim()
                )))
            }
        };
        Ok(command)
    }
}

/// Parse a background index as typed by the user; negatives are rejected.
pub fn parse_index(raw: &str) -> BoothResult<usize> {
    let value: i64 = raw
        .parse()
        .map_err(|_| BoothError::invalid_selection(format!("'{raw}' is not an index")))?;
    usize::try_from(value)
        .map_err(|_| BoothError::invalid_selection(format!("background index {value} out of range")))
}

/// Whether the loop should keep going after a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Applies UI commands to the session.
pub struct Controller {
    session: SessionHandle,
    exporter: CaptureExporter,
    target: Box<dyn ShareTarget>,
    stop: StopHandle,
}

impl Controller {
    pub fn new(
        session: SessionHandle,
        exporter: CaptureExporter,
        target: Box<dyn ShareTarget>,
        stop: StopHandle,
    ) -> Self {
        Self {
            session,
            exporter,
            target,
            stop,
        }
    }

    pub fn handle(&mut self, command: Command) -> BoothResult<Flow> {
        match command {
            Command::Filter(id) => {
                self.session.select_filter(&id)?;
            }
            Command::Background(index) => {
                self.session.select_background(index)?;
            }
            Command::Capture => self.session.capture()?,
            Command::Share => {
                self.share()?;
            }
            Command::Reset => self.session.reset()?,
            Command::List => self.list(),
            Command::Quit => {
                self.stop.stop();
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Snapshot, share, and return to LIVE whatever happened, including a
    /// snapshot that could not be taken.
    pub fn share(&mut self) -> BoothResult<ShareOutcome> {
        let outcome = self
            .exporter
            .snapshot()
            .map(|snapshot| self.exporter.share(&snapshot, self.target.as_mut()));
        if self.session.mode() == Mode::Frozen {
            self.session.reset()?;
        }
        outcome
    }

    /// Apply every command waiting on `commands` without blocking.
    ///
    /// Rejected commands are reported to the user and otherwise ignored.
    pub fn drain(&mut self, commands: &Receiver<String>) {
        while let Ok(line) = commands.try_recv() {
            let result = line.parse().and_then(|command| self.handle(command));
            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(err) => self.session.notify(&err.to_string()),
            }
        }
    }

    fn list(&self) {
        self.session.with(|s| {
            let state = s.state();
            for (i, bg) in s.backgrounds().iter().enumerate() {
                let mark = if i == state.active_background_index { '*' } else { ' ' };
                tracing::info!("{} bg {:>2}  {}", mark, i, bg.display_name);
            }
            for f in s.filters().iter() {
                let mark = if f.id == state.active_filter_id { '*' } else { ' ' };
                tracing::info!("{} filter {}  {}", mark, f.id, f.display_name);
            }
            tracing::info!("mode: {}", state.mode);
        });
    }
}

/// Read command lines from stdin on a background thread.
pub fn spawn_stdin_reader() -> std::io::Result<Receiver<String>> {
    let (sender, receiver) = crossbeam_channel::unbounded();
    std::thread::Builder::new()
        .name("commands".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if sender.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StillSource;
    use crate::catalog::{BackgroundCatalog, FilterCatalog};
    use crate::compositor::Compositor;
    use crate::export::Unhosted;
    use crate::render::{DisplaySurface, RenderLoop, Tick};
    use crate::session::{LogNotifier, Session};
    use image::RgbImage;
    use std::sync::Arc;

    fn setup() -> (RenderLoop, SessionHandle, Controller) {
        let session = SessionHandle::new(
            Session::new(
                Arc::new(BackgroundCatalog::builtin()),
                Arc::new(FilterCatalog::builtin()),
            ),
            Arc::new(LogNotifier),
        );
        let display = DisplaySurface::new();
        let rl = RenderLoop::new(
            Box::new(StillSource::new(RgbImage::new(4, 4))),
            None,
            Compositor::new(4, 4),
            session.clone(),
            Arc::clone(&display),
        );
        let controller = Controller::new(
            session.clone(),
            CaptureExporter::new(session.clone(), display),
            Box::new(Unhosted),
            rl.stop_handle(),
        );
        (rl, session, controller)
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            "filter filter-cool".parse::<Command>().unwrap(),
            Command::Filter("filter-cool".to_string())
        );
        assert_eq!("bg 2".parse::<Command>().unwrap(), Command::Background(2));
        assert_eq!("  capture ".parse::<Command>().unwrap(), Command::Capture);
        assert!("dance".parse::<Command>().is_err());
        assert!("capture now".parse::<Command>().is_err());
    }

    #[test]
    fn negative_background_index_is_rejected() {
        assert!(matches!(
            "bg -1".parse::<Command>(),
            Err(BoothError::InvalidSelection(_))
        ));
        assert!(parse_index("two").is_err());
    }

    #[test]
    fn share_always_resets_to_live() {
        let (mut rl, session, mut controller) = setup();
        rl.tick().unwrap();
        controller.handle(Command::Capture).unwrap();
        assert_eq!(session.mode(), Mode::Frozen);

        assert_eq!(controller.share().unwrap(), ShareOutcome::Unsupported);
        assert_eq!(session.mode(), Mode::Live);
    }

    #[test]
    fn failed_snapshot_still_resets_to_live() {
        let (_, session, mut controller) = setup();
        controller.handle(Command::Capture).unwrap();

        assert!(matches!(controller.share(), Err(BoothError::NothingPresented)));
        assert_eq!(session.mode(), Mode::Live);
    }

    #[test]
    fn share_while_live_is_rejected() {
        let (mut rl, session, mut controller) = setup();
        rl.tick().unwrap();
        assert!(controller.handle(Command::Share).is_err());
        assert_eq!(session.mode(), Mode::Live);
    }

    #[test]
    fn drained_commands_apply_in_order_and_survive_errors() {
        let (mut rl, session, mut controller) = setup();
        rl.tick().unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        for line in ["bg 10", "bg 3", "filter filter-sepia", "reset", "capture"] {
            tx.send(line.to_string()).unwrap();
        }
        controller.drain(&rx);

        let state = session.state();
        assert_eq!(state.active_background_index, 3);
        assert_eq!(state.active_filter_id, "filter-sepia");
        assert_eq!(state.mode, Mode::Frozen);
    }

    #[test]
    fn quit_stops_the_loop() {
        let (mut rl, _, mut controller) = setup();
        assert_eq!(controller.handle(Command::Quit).unwrap(), Flow::Quit);
        assert_eq!(rl.tick().unwrap(), Tick::Stopped);
    }
}
