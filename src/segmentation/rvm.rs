use super::preprocess::Preprocessor;
use super::types::SegmentationModel;
use anyhow::{anyhow, Context, Result};
use image::{GrayImage, RgbImage};
use ndarray::{arr1, Array4, ArrayViewD, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,

    // Recurrent hidden states, fed back in on the next frame
    recurrent: Option<[Array4<f32>; 4]>,

    // Downsample ratio for hidden states
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// Input is 512x512 with a downsample ratio of 0.25. Smaller inputs are
    /// faster and blurrier; pick per target hardware.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(4))
            .map_err(|e| anyhow!("Failed to configure ONNX session: {e}"))?
            .commit_from_file(path)
            .map_err(|e| anyhow!("Failed to load model from {}: {e}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let width = 512;
        let height = 512;

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            width,
            height,
            recurrent: None,
            downsample_ratio: 0.25,
        })
    }

    /// RVM accepts 1x1x1x1 zero tensors as the initial recurrent state
    fn initial_state() -> [Array4<f32>; 4] {
        std::array::from_fn(|_| Array4::zeros((1, 1, 1, 1)))
    }
}

fn tensor(array: ArrayViewD<'_, f32>) -> Result<TensorRef<'_, f32>> {
    TensorRef::from_array_view(array).map_err(|e| anyhow!("Bad input tensor: {e}"))
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbImage) -> Result<GrayImage> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let state = self.recurrent.take().unwrap_or_else(Self::initial_state);
        let input = self.preprocessor.to_tensor(frame);
        let ratio = arr1(&[self.downsample_ratio]);

        // RVM expects: src, r1i, r2i, r3i, r4i, downsample_ratio
        // and yields: fgr, pha, r1o, r2o, r3o, r4o
        let outputs = self
            .session
            .run(ort::inputs![
                tensor(input.view().into_dyn())?,
                tensor(state[0].view().into_dyn())?,
                tensor(state[1].view().into_dyn())?,
                tensor(state[2].view().into_dyn())?,
                tensor(state[3].view().into_dyn())?,
                tensor(ratio.view().into_dyn())?
            ])
            .map_err(|e| anyhow!("Failed to run inference: {e}"))?;

        let extract = |index: usize| {
            outputs[index]
                .try_extract_array::<f32>()
                .map_err(|e| anyhow!("Bad output {index}: {e}"))
        };

        let alpha = extract(1)?;
        let mask = Preprocessor::to_mask(&alpha).context("Unexpected alpha output shape")?;

        let mut next = Self::initial_state();
        for (i, slot) in next.iter_mut().enumerate() {
            *slot = extract(i + 2)?.to_owned().into_dimensionality::<Ix4>()?;
        }
        self.recurrent = Some(next);

        Ok(mask)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.recurrent = None;
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
