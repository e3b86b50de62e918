mod oracle;
#[cfg(feature = "onnx")]
mod preprocess;
mod register;
#[cfg(feature = "onnx")]
mod rvm;
pub mod types;

pub use oracle::{InlineOracle, SegmentationOracle, WorkerOracle};
#[cfg(feature = "onnx")]
pub use preprocess::Preprocessor;
pub use register::{MaskRegister, MaskReply};
#[cfg(feature = "onnx")]
pub use rvm::RobustVideoMatting;
pub use types::{Mask, SegmentationModel};

use anyhow::Result;

/// Create a default segmentation model (RVM)
#[cfg(feature = "onnx")]
pub fn create_default_model(model_path: &str) -> Result<Box<dyn SegmentationModel>> {
    let model = RobustVideoMatting::new(model_path)?;
    Ok(Box::new(model))
}

#[cfg(not(feature = "onnx"))]
pub fn create_default_model(model_path: &str) -> Result<Box<dyn SegmentationModel>> {
    anyhow::bail!(
        "cannot load {}: built without the `onnx` feature",
        model_path
    )
}
