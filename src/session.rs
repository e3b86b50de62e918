//! Session state and its LIVE/FROZEN state machine.

use crate::catalog::{BackgroundCatalog, BackgroundLayer, FilterCatalog, FilterSpec};
use crate::error::{BoothError, BoothResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Compositing continuously
    Live,
    /// Display holds the last composite; capture/share controls are active
    Frozen,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Live => f.write_str("LIVE"),
            Mode::Frozen => f.write_str("FROZEN"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub active_filter_id: String,
    pub active_background_index: usize,
    pub mode: Mode,
}

/// The single mutable state of a running session, plus the catalogs it
/// selects from.
///
/// Every transition validates against the catalogs first, so the active
/// filter id and background index always resolve.
pub struct Session {
    state: SessionState,
    backgrounds: Arc<BackgroundCatalog>,
    filters: Arc<FilterCatalog>,
}

impl Session {
    pub fn new(backgrounds: Arc<BackgroundCatalog>, filters: Arc<FilterCatalog>) -> Self {
        let state = SessionState {
            active_filter_id: filters.default_filter().id.clone(),
            active_background_index: 0,
            mode: Mode::Live,
        };
        Self {
            state,
            backgrounds,
            filters,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn backgrounds(&self) -> &BackgroundCatalog {
        &self.backgrounds
    }

    pub fn filters(&self) -> &FilterCatalog {
        &self.filters
    }

    pub fn active_background(&self) -> &BackgroundLayer {
        self.backgrounds
            .get(self.state.active_background_index)
            .unwrap_or_else(|| self.backgrounds.default_layer())
    }

    pub fn active_filter(&self) -> &FilterSpec {
        self.filters
            .get(&self.state.active_filter_id)
            .unwrap_or_else(|| self.filters.default_filter())
    }

    /// Select a filter by id. Valid in either mode.
    ///
    /// Returns whether anything changed.
    pub fn select_filter(&mut self, id: &str) -> BoothResult<bool> {
        if self.filters.get(id).is_none() {
            return Err(BoothError::invalid_selection(format!("unknown filter '{id}'")));
        }
        if self.state.active_filter_id == id {
            return Ok(false);
        }
        self.state.active_filter_id = id.to_string();
        Ok(true)
    }

    /// Select a background by index. Valid in either mode.
    ///
    /// Returns whether anything changed.
    pub fn select_background(&mut self, index: usize) -> BoothResult<bool> {
        if index >= self.backgrounds.len() {
            return Err(BoothError::invalid_selection(format!(
                "background index {index} out of range (0..{})",
                self.backgrounds.len()
            )));
        }
        if self.state.active_background_index == index {
            return Ok(false);
        }
        self.state.active_background_index = index;
        Ok(true)
    }

    /// LIVE -> FROZEN
    pub fn capture(&mut self) -> BoothResult<()> {
        self.transition("capture", Mode::Live, Mode::Frozen)
    }

    /// FROZEN -> LIVE, after a share attempt of any outcome
    pub fn reset(&mut self) -> BoothResult<()> {
        self.transition("reset", Mode::Frozen, Mode::Live)
    }

    fn transition(&mut self, op: &'static str, from: Mode, to: Mode) -> BoothResult<()> {
        if self.state.mode != from {
            return Err(BoothError::InvalidTransition {
                op,
                mode: self.state.mode,
            });
        }
        tracing::info!("Session {} -> {}", from, to);
        self.state.mode = to;
        Ok(())
    }
}

/// User-facing acknowledgements.
pub trait Notifier: Send + Sync {
    /// Brief full-screen flash acknowledging a capture
    fn flash(&self);

    /// A message for the user
    fn notice(&self, message: &str);
}

/// Reports acknowledgements through the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn flash(&self) {
        tracing::info!("*flash*");
    }

    fn notice(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Shared handle to the session.
///
/// One mutex covers all three fields, so a reader never sees a filter from
/// one transition paired with a background from another.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
    notifier: Arc<dyn Notifier>,
}

impl SessionHandle {
    pub fn new(session: Session, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
            notifier,
        }
    }

    /// Copy of the current state
    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    pub fn mode(&self) -> Mode {
        self.inner.lock().mode()
    }

    /// Run `f` against a consistent view of the session
    pub fn with<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Run `f` only if the session is LIVE, holding the lock throughout so a
    /// capture cannot slip in between the check and the write.
    pub fn when_live<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let session = self.inner.lock();
        (session.mode() == Mode::Live).then(f)
    }

    pub fn select_filter(&self, id: &str) -> BoothResult<bool> {
        let changed = self.inner.lock().select_filter(id)?;
        if changed {
            tracing::debug!("Filter -> {}", id);
        }
        Ok(changed)
    }

    pub fn select_background(&self, index: usize) -> BoothResult<bool> {
        let changed = self.inner.lock().select_background(index)?;
        if changed {
            tracing::debug!("Background -> {}", index);
        }
        Ok(changed)
    }

    /// Freeze the display and flash. Rejected unless LIVE.
    pub fn capture(&self) -> BoothResult<()> {
        self.inner.lock().capture()?;
        self.notifier.flash();
        Ok(())
    }

    pub fn reset(&self) -> BoothResult<()> {
        self.inner.lock().reset()
    }

    pub fn notify(&self, message: &str) {
        self.notifier.notice(message);
    }
}
