//! Live virtual-camera booth: background replacement, colour filters, and
//! capture-and-share on top of a segmentation mask.

pub mod capture;
pub mod catalog;
pub mod command;
pub mod compositor;
pub mod error;
pub mod export;
pub mod filter;
pub mod output;
pub mod render;
pub mod segmentation;
pub mod session;

pub use capture::{Frame, FrameSource};
pub use catalog::{BackgroundCatalog, BackgroundLayer, Fill, FilterCatalog, FilterSpec};
pub use compositor::Compositor;
pub use error::{BoothError, BoothResult};
pub use export::{CaptureExporter, ShareOutcome, ShareTarget, Snapshot};
pub use filter::FilterTransform;
pub use render::{DisplaySurface, RenderLoop, StopHandle, Tick};
pub use segmentation::{Mask, SegmentationOracle};
pub use session::{Mode, Session, SessionHandle, SessionState};
