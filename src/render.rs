//! The per-tick render loop.

use crate::capture::{Frame, FrameSource};
use crate::catalog::BackgroundLayer;
use crate::compositor::Compositor;
use crate::filter::FilterTransform;
use crate::output::OutputSink;
use crate::segmentation::{Mask, MaskRegister, SegmentationOracle};
use crate::session::{Mode, SessionHandle};
use anyhow::{Context, Result};
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A composite that made it onto the display.
#[derive(Clone, Debug)]
pub struct Presented {
    pub frame_seq: u64,
    /// Frame the mask was computed from; `None` for the fallback mask
    pub mask_seq: Option<u64>,
    /// Background, frame and mask layered; no filter applied
    pub image: Arc<RgbImage>,
}

/// The display surface: the latest unfiltered composite.
#[derive(Default)]
pub struct DisplaySurface {
    current: Mutex<Option<Presented>>,
}

impl DisplaySurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn current(&self) -> Option<Presented> {
        self.current.lock().clone()
    }

    /// What the user sees: the current composite with `filter` on top
    pub fn render(&self, filter: FilterTransform) -> Option<RgbImage> {
        let current = self.current()?;
        Some(filter.apply(&current.image).into_owned())
    }

    fn store(&self, presented: Presented) {
        *self.current.lock() = Some(presented);
    }
}

/// Stops a render loop from anywhere. Cloneable and idempotent.
#[derive(Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    register: Arc<MaskRegister>,
}

impl StopHandle {
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            tracing::info!("Render loop stopping");
        }
        self.register.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Presented {
        frame_seq: u64,
        mask_seq: Option<u64>,
    },
    /// Session is frozen; the display was left alone
    Held,
    Stopped,
}

#[derive(Default)]
struct TickStats {
    presented: u64,
    held: u64,
    failed: u64,
    capture_time: Duration,
    composite_time: Duration,
    output_time: Duration,
    mask_lag: u64,
}

impl TickStats {
    fn log(&self) {
        let n = self.presented.max(1) as f64;
        let avg_capture_ms = self.capture_time.as_secs_f64() * 1000.0 / n;
        let avg_composite_ms = self.composite_time.as_secs_f64() * 1000.0 / n;
        let avg_output_ms = self.output_time.as_secs_f64() * 1000.0 / n;
        let total_ms = avg_capture_ms + avg_composite_ms + avg_output_ms;
        let actual_fps = if total_ms > 0.0 { 1000.0 / total_ms } else { 0.0 };

        tracing::info!(
            "Frame {}: capture={:.1}ms, composite={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}, mask lag={:.1} frames, held={}, failed={}",
            self.presented,
            avg_capture_ms,
            avg_composite_ms,
            avg_output_ms,
            total_ms,
            actual_fps,
            self.mask_lag as f64 / n,
            self.held,
            self.failed
        );
    }
}

/// Drives capture, mask requests and compositing, one iteration per tick.
///
/// Presentation never waits on the oracle: each tick composites the newest
/// frame with whichever mask finished last, or an all-foreground mask until
/// the first one arrives.
pub struct RenderLoop {
    source: Box<dyn FrameSource>,
    oracle: Option<Box<dyn SegmentationOracle>>,
    register: Arc<MaskRegister>,
    compositor: Compositor,
    session: SessionHandle,
    display: Arc<DisplaySurface>,
    plate: Option<(String, Arc<RgbImage>)>,
    fallback: Mask,
    stop: StopHandle,
    stats: TickStats,
}

impl RenderLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        oracle: Option<Box<dyn SegmentationOracle>>,
        compositor: Compositor,
        session: SessionHandle,
        display: Arc<DisplaySurface>,
    ) -> Self {
        let register = MaskRegister::new();
        let stop = StopHandle {
            stopped: Arc::new(AtomicBool::new(false)),
            register: Arc::clone(&register),
        };

        Self {
            source,
            oracle,
            register,
            compositor,
            session,
            display,
            plate: None,
            fallback: Mask::opaque(1, 1),
            stop,
            stats: TickStats::default(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn display(&self) -> Arc<DisplaySurface> {
        Arc::clone(&self.display)
    }

    pub fn masks(&self) -> Arc<MaskRegister> {
        Arc::clone(&self.register)
    }

    /// Run one iteration.
    ///
    /// An error means this tick presented nothing; the next tick simply tries
    /// again.
    pub fn tick(&mut self) -> Result<Tick> {
        if self.stop.is_stopped() {
            return Ok(Tick::Stopped);
        }

        let (mode, background) = self
            .session
            .with(|s| (s.mode(), s.active_background().clone()));
        if mode == Mode::Frozen {
            self.stats.held += 1;
            return Ok(Tick::Held);
        }

        let capture_start = Instant::now();
        let frame = self
            .source
            .capture_frame()
            .context("Failed to capture frame")?;
        self.stats.capture_time += capture_start.elapsed();

        self.request_mask(&frame);

        let composite_start = Instant::now();
        let plate = self.plate_for(&background);

        let latest = self.register.latest();
        let mask = latest.as_deref().unwrap_or(&self.fallback);
        let mask_seq = latest.as_ref().map(|m| m.seq());

        let image = self
            .compositor
            .composite_over(frame.image(), mask.alpha(), &plate);
        self.stats.composite_time += composite_start.elapsed();

        let presented = Presented {
            frame_seq: frame.seq(),
            mask_seq,
            image: Arc::new(image),
        };

        // A capture may have landed while we were compositing
        let display = &self.display;
        if self.session.when_live(|| display.store(presented)).is_none() {
            self.stats.held += 1;
            return Ok(Tick::Held);
        }

        self.stats.presented += 1;
        if let Some(seq) = mask_seq {
            self.stats.mask_lag += frame.seq().saturating_sub(seq);
        }

        Ok(Tick::Presented {
            frame_seq: frame.seq(),
            mask_seq,
        })
    }

    /// Fire off a mask request unless one is already outstanding.
    fn request_mask(&mut self, frame: &Frame) {
        let Some(oracle) = self.oracle.as_mut() else {
            return;
        };
        if let Some(reply) = self.register.begin(frame.seq()) {
            tracing::debug!("Requesting mask for frame {}", frame.seq());
            oracle.request(frame.clone(), reply);
        }
    }

    /// Background plate for `layer`, repainted only when the selection changes.
    fn plate_for(&mut self, layer: &BackgroundLayer) -> Arc<RgbImage> {
        match &self.plate {
            Some((id, plate)) if *id == layer.id => Arc::clone(plate),
            _ => {
                tracing::debug!("Painting background plate '{}'", layer.id);
                let plate = Arc::new(self.compositor.background_plate(layer));
                self.plate = Some((layer.id.clone(), Arc::clone(&plate)));
                plate
            }
        }
    }

    /// Tick at `fps` until stopped.
    ///
    /// `before_tick` runs at the top of every iteration; UI events are
    /// drained there so they share the loop's timeline. Each tick the
    /// display, with the currently selected filter, is written to `output`,
    /// including while frozen.
    pub fn run(
        &mut self,
        fps: u32,
        mut output: Option<&mut dyn OutputSink>,
        mut before_tick: impl FnMut(),
    ) -> Result<()> {
        let frame_duration = Duration::from_secs_f32(1.0 / fps.max(1) as f32);

        tracing::info!("Starting render loop at {} fps", fps);

        loop {
            let loop_start = Instant::now();

            before_tick();

            match self.tick() {
                Ok(Tick::Stopped) => break,
                Ok(Tick::Presented { .. }) => {
                    if self.stats.presented % 30 == 0 {
                        self.stats.log();
                    }
                }
                Ok(Tick::Held) => {}
                Err(err) => {
                    self.stats.failed += 1;
                    tracing::warn!("Tick failed: {:#}", err);
                }
            }

            if let Some(sink) = output.as_deref_mut() {
                let filter = self.session.with(|s| s.active_filter().transform);
                if let Some(view) = self.display.render(filter) {
                    let output_start = Instant::now();
                    if let Err(err) = sink.write_frame(&view) {
                        tracing::warn!("Failed to present frame: {:#}", err);
                    }
                    self.stats.output_time += output_start.elapsed();
                }
            }

            // Frame rate limiting
            let elapsed = loop_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }

        tracing::info!(
            "Render loop stopped after {} presented frames",
            self.stats.presented
        );
        Ok(())
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StillSource;
    use crate::catalog::{BackgroundCatalog, FilterCatalog};
    use crate::segmentation::MaskReply;
    use crate::session::{LogNotifier, Session};
    use image::{GrayImage, Luma, Rgb};

    /// Holds on to replies until the test decides to answer
    #[derive(Default, Clone)]
    struct ManualOracle {
        pending: Arc<Mutex<Vec<(Frame, MaskReply)>>>,
    }

    impl ManualOracle {
        fn answer_all(&self, value: u8) {
            for (frame, reply) in self.pending.lock().drain(..) {
                let (w, h) = frame.dimensions();
                reply.deliver(Ok(GrayImage::from_pixel(w, h, Luma([value]))));
            }
        }

        fn outstanding(&self) -> usize {
            self.pending.lock().len()
        }
    }

    impl SegmentationOracle for ManualOracle {
        fn request(&mut self, frame: Frame, reply: MaskReply) {
            self.pending.lock().push((frame, reply));
        }
    }

    struct FailingSource {
        calls: u32,
    }

    impl FrameSource for FailingSource {
        fn capture_frame(&mut self) -> Result<Frame> {
            self.calls += 1;
            if self.calls == 1 {
                anyhow::bail!("device hiccup");
            }
            Ok(Frame::new(self.calls as u64, RgbImage::new(4, 4)))
        }

        fn resolution(&self) -> (u32, u32) {
            (4, 4)
        }
    }

    const PERSON: Rgb<u8> = Rgb([10, 20, 30]);

    fn session() -> SessionHandle {
        SessionHandle::new(
            Session::new(
                Arc::new(BackgroundCatalog::builtin()),
                Arc::new(FilterCatalog::builtin()),
            ),
            Arc::new(LogNotifier),
        )
    }

    fn render_loop(oracle: Option<ManualOracle>) -> (RenderLoop, SessionHandle) {
        let session = session();
        let source = StillSource::new(RgbImage::from_pixel(8, 6, PERSON));
        let oracle = oracle.map(|o| Box::new(o) as Box<dyn SegmentationOracle>);
        let rl = RenderLoop::new(
            Box::new(source),
            oracle,
            Compositor::new(8, 6),
            session.clone(),
            DisplaySurface::new(),
        );
        (rl, session)
    }

    #[test]
    fn presents_with_fallback_when_oracle_never_answers() {
        let oracle = ManualOracle::default();
        let (mut rl, _) = render_loop(Some(oracle.clone()));

        for _ in 0..5 {
            let tick = rl.tick().unwrap();
            assert!(matches!(tick, Tick::Presented { mask_seq: None, .. }));
        }
        // Single outstanding request, never re-issued while pending
        assert_eq!(oracle.outstanding(), 1);

        let shown = rl.display().current().unwrap();
        assert!(shown.image.pixels().all(|p| *p == PERSON));
    }

    #[test]
    fn uses_latest_completed_mask_even_if_stale() {
        let oracle = ManualOracle::default();
        let (mut rl, _) = render_loop(Some(oracle.clone()));

        rl.tick().unwrap();
        rl.tick().unwrap();
        oracle.answer_all(0);

        let tick = rl.tick().unwrap();
        assert_eq!(
            tick,
            Tick::Presented {
                frame_seq: 3,
                mask_seq: Some(1)
            }
        );

        // Transparent mask: background only
        let shown = rl.display().current().unwrap();
        assert!(shown.image.pixels().all(|p| *p != PERSON));
        // The slot freed up, so tick 3 asked again
        assert_eq!(oracle.outstanding(), 1);
    }

    #[test]
    fn frozen_tick_leaves_display_untouched() {
        let oracle = ManualOracle::default();
        let (mut rl, session) = render_loop(Some(oracle.clone()));

        rl.tick().unwrap();
        session.capture().unwrap();
        let before = rl.display().current().unwrap();

        oracle.answer_all(0);
        session.select_background(4).unwrap();
        for _ in 0..3 {
            assert_eq!(rl.tick().unwrap(), Tick::Held);
        }

        let after = rl.display().current().unwrap();
        assert_eq!(after.frame_seq, before.frame_seq);
        assert_eq!(after.image.as_raw(), before.image.as_raw());
    }

    #[test]
    fn stop_is_idempotent_and_discards_late_masks() {
        let oracle = ManualOracle::default();
        let (mut rl, _) = render_loop(Some(oracle.clone()));
        rl.tick().unwrap();

        let stop = rl.stop_handle();
        stop.stop();
        stop.stop();
        assert_eq!(rl.tick().unwrap(), Tick::Stopped);

        oracle.answer_all(0);
        assert!(rl.masks().latest().is_none());
        assert_eq!(rl.masks().discarded(), 1);
    }

    #[test]
    fn failed_tick_does_not_stop_the_next_one() {
        let session = session();
        let mut rl = RenderLoop::new(
            Box::new(FailingSource { calls: 0 }),
            None,
            Compositor::new(4, 4),
            session,
            DisplaySurface::new(),
        );

        assert!(rl.tick().is_err());
        assert!(matches!(rl.tick().unwrap(), Tick::Presented { .. }));
    }

    #[test]
    fn background_switch_repaints_plate() {
        let oracle = ManualOracle::default();
        let (mut rl, session) = render_loop(Some(oracle.clone()));
        rl.tick().unwrap();
        oracle.answer_all(0);

        rl.tick().unwrap();
        let first = *rl.display().current().unwrap().image.get_pixel(0, 0);
        session.select_background(1).unwrap();
        rl.tick().unwrap();
        let second = *rl.display().current().unwrap().image.get_pixel(0, 0);

        assert_eq!(first, Rgb([0x2c, 0x3e, 0x50]));
        assert_eq!(second, Rgb([0x34, 0x98, 0xdb]));
    }

    #[test]
    fn run_exits_once_stopped() {
        let (mut rl, _) = render_loop(None);
        let stop = rl.stop_handle();
        let mut ticks = 0;
        rl.run(1000, None, || {
            ticks += 1;
            if ticks == 3 {
                stop.stop();
            }
        })
        .unwrap();
        assert_eq!(ticks, 3);
    }
}
