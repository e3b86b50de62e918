//! Freezing a frame into a still image and handing it to a share target.

use crate::error::{BoothError, BoothResult};
use crate::render::DisplaySurface;
use crate::session::{Mode, SessionHandle};
use serde::Serialize;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// A PNG-encoded capture.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub frame_seq: u64,
    pub filter_id: String,
}

/// Caption sent along with a shared image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShareMetadata {
    pub alt_text: String,
    pub title: String,
}

impl Default for ShareMetadata {
    fn default() -> Self {
        Self {
            alt_text: "Check out my new photo!".to_string(),
            title: "My booth photo".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("share cancelled")]
    Cancelled,

    #[error("share failed: {0}")]
    Failed(String),
}

/// How a share attempt ended. None of these are fatal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    Cancelled,
    Failed(String),
    /// Not running inside a host that can share; nothing was attempted
    Unsupported,
}

/// The messaging platform's share boundary.
pub trait ShareTarget {
    /// Whether we are running inside a host that can share at all
    fn is_hosted(&self) -> bool;

    fn share(&mut self, snapshot: &Snapshot, metadata: &ShareMetadata) -> Result<(), ShareError>;
}

/// Not inside a qualifying host: every share is rejected up front.
pub struct Unhosted;

impl ShareTarget for Unhosted {
    fn is_hosted(&self) -> bool {
        false
    }

    fn share(&mut self, _: &Snapshot, _: &ShareMetadata) -> Result<(), ShareError> {
        Err(ShareError::Failed("not running inside a share host".to_string()))
    }
}

#[derive(Serialize)]
struct ShareRecord<'a> {
    #[serde(flatten)]
    metadata: &'a ShareMetadata,
    image: String,
    width: u32,
    height: u32,
    frame_seq: u64,
    filter: &'a str,
}

/// Drops shared images into a directory, each with a JSON sidecar.
pub struct DirectoryShare {
    dir: PathBuf,
}

impl DirectoryShare {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write(&self, snapshot: &Snapshot, metadata: &ShareMetadata) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let stem = format!("booth-{:06}", snapshot.frame_seq);
        let image_path = self.dir.join(format!("{stem}.png"));
        std::fs::write(&image_path, &snapshot.png)?;

        let record = ShareRecord {
            metadata,
            image: format!("{stem}.png"),
            width: snapshot.width,
            height: snapshot.height,
            frame_seq: snapshot.frame_seq,
            filter: &snapshot.filter_id,
        };
        let json = serde_json::to_vec_pretty(&record)?;
        std::fs::write(self.dir.join(format!("{stem}.json")), json)?;

        Ok(image_path)
    }
}

impl ShareTarget for DirectoryShare {
    fn is_hosted(&self) -> bool {
        true
    }

    fn share(&mut self, snapshot: &Snapshot, metadata: &ShareMetadata) -> Result<(), ShareError> {
        let path = self
            .write(snapshot, metadata)
            .map_err(|e| ShareError::Failed(format!("{}: {e}", self.dir.display())))?;
        tracing::info!("Shared capture to {}", path.display());
        Ok(())
    }
}

/// Reads the frozen display and exports it.
pub struct CaptureExporter {
    session: SessionHandle,
    display: Arc<DisplaySurface>,
    metadata: ShareMetadata,
}

impl CaptureExporter {
    pub fn new(session: SessionHandle, display: Arc<DisplaySurface>) -> Self {
        Self {
            session,
            display,
            metadata: ShareMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ShareMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Encode the frozen display, with the selected filter, as PNG.
    ///
    /// Only valid while FROZEN, when the render loop no longer writes the
    /// surface.
    pub fn snapshot(&self) -> BoothResult<Snapshot> {
        let (presented, filter) = self.session.with(|s| {
            if s.mode() != Mode::Frozen {
                return Err(BoothError::InvalidTransition {
                    op: "snapshot",
                    mode: s.mode(),
                });
            }
            let presented = self.display.current().ok_or(BoothError::NothingPresented)?;
            Ok((presented, s.active_filter().clone()))
        })?;

        let _span = tracing::debug_span!("snapshot", frame = presented.frame_seq).entered();
        let view = filter.transform.apply(&presented.image);

        let mut png = Vec::new();
        view.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

        Ok(Snapshot {
            png,
            width: view.width(),
            height: view.height(),
            frame_seq: presented.frame_seq,
            filter_id: filter.id,
        })
    }

    /// Hand `snapshot` to `target` and tell the user how it went.
    ///
    /// Never changes the session mode; the caller resets afterwards whatever
    /// the outcome.
    pub fn share(&self, snapshot: &Snapshot, target: &mut dyn ShareTarget) -> ShareOutcome {
        if !target.is_hosted() {
            self.session
                .notify("Sharing is only available inside the messaging app.");
            return ShareOutcome::Unsupported;
        }

        match target.share(snapshot, &self.metadata) {
            Ok(()) => {
                self.session.notify("Shared!");
                ShareOutcome::Shared
            }
            Err(ShareError::Cancelled) => {
                self.session.notify("Share cancelled.");
                ShareOutcome::Cancelled
            }
            Err(ShareError::Failed(reason)) => {
                tracing::warn!("Share failed: {}", reason);
                self.session.notify(&format!("Share failed: {reason}"));
                ShareOutcome::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StillSource;
    use crate::catalog::{BackgroundCatalog, FilterCatalog};
    use crate::compositor::Compositor;
    use crate::render::RenderLoop;
    use crate::session::tests::CountingNotifier;
    use crate::session::Session;
    use image::{Rgb, RgbImage};

    struct Cancelling;

    impl ShareTarget for Cancelling {
        fn is_hosted(&self) -> bool {
            true
        }

        fn share(&mut self, _: &Snapshot, _: &ShareMetadata) -> Result<(), ShareError> {
            Err(ShareError::Cancelled)
        }
    }

    fn setup() -> (RenderLoop, SessionHandle, CaptureExporter, Arc<CountingNotifier>) {
        let notifier = Arc::new(CountingNotifier::default());
        let session = SessionHandle::new(
            Session::new(
                Arc::new(BackgroundCatalog::builtin()),
                Arc::new(FilterCatalog::builtin()),
            ),
            notifier.clone(),
        );
        let display = DisplaySurface::new();
        let rl = RenderLoop::new(
            Box::new(StillSource::new(RgbImage::from_pixel(6, 4, Rgb([200, 100, 50])))),
            None,
            Compositor::new(6, 4),
            session.clone(),
            Arc::clone(&display),
        );
        let exporter = CaptureExporter::new(session.clone(), display);
        (rl, session, exporter, notifier)
    }

    #[test]
    fn snapshot_requires_frozen() {
        let (mut rl, _, exporter, _) = setup();
        rl.tick().unwrap();
        assert!(matches!(
            exporter.snapshot(),
            Err(BoothError::InvalidTransition { op: "snapshot", .. })
        ));
    }

    #[test]
    fn snapshot_before_any_frame_fails() {
        let (_, session, exporter, _) = setup();
        session.capture().unwrap();
        assert!(matches!(exporter.snapshot(), Err(BoothError::NothingPresented)));
    }

    #[test]
    fn snapshot_decodes_to_presented_view() {
        let (mut rl, session, exporter, _) = setup();
        rl.tick().unwrap();
        session.select_filter("filter-grayscale").unwrap();
        session.capture().unwrap();

        let snapshot = exporter.snapshot().unwrap();
        let decoded = image::load_from_memory(&snapshot.png).unwrap().to_rgb8();
        let expected = rl
            .display()
            .render(crate::filter::FilterTransform::Grayscale)
            .unwrap();

        assert_eq!(decoded, expected);
        assert_eq!(snapshot.filter_id, "filter-grayscale");
        assert_eq!((snapshot.width, snapshot.height), (6, 4));
    }

    #[test]
    fn unhosted_share_is_rejected_with_notice() {
        let (mut rl, session, exporter, notifier) = setup();
        rl.tick().unwrap();
        session.capture().unwrap();
        let snapshot = exporter.snapshot().unwrap();

        assert_eq!(exporter.share(&snapshot, &mut Unhosted), ShareOutcome::Unsupported);
        assert_eq!(session.mode(), Mode::Frozen);
        assert_eq!(notifier.notices.lock().len(), 1);
    }

    #[test]
    fn cancelled_share_is_reported() {
        let (mut rl, session, exporter, _) = setup();
        rl.tick().unwrap();
        session.capture().unwrap();
        let snapshot = exporter.snapshot().unwrap();

        assert_eq!(exporter.share(&snapshot, &mut Cancelling), ShareOutcome::Cancelled);
    }

    #[test]
    fn directory_share_writes_image_and_metadata() {
        let (mut rl, session, exporter, _) = setup();
        rl.tick().unwrap();
        session.capture().unwrap();
        let snapshot = exporter.snapshot().unwrap();

        let dir = std::env::temp_dir().join(format!("selfie_booth_share_{}", std::process::id()));
        let mut target = DirectoryShare::new(&dir);
        assert_eq!(exporter.share(&snapshot, &mut target), ShareOutcome::Shared);

        let png = std::fs::read(dir.join("booth-000001.png")).unwrap();
        assert_eq!(png, snapshot.png);
        let meta: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join("booth-000001.json")).unwrap())
                .unwrap();
        assert_eq!(meta["alt_text"], "Check out my new photo!");
        assert_eq!(meta["filter"], "filter-none");
    }
}
