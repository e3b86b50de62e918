use super::register::MaskReply;
use super::types::SegmentationModel;
use crate::capture::Frame;
use anyhow::{Context, Result};
use crossbeam_channel::{Sender, TrySendError};
use std::thread::JoinHandle;

/// Asynchronous mask producer.
///
/// `request` must not block on the computation. The result goes through
/// `reply`, from any thread, whenever it is ready.
pub trait SegmentationOracle {
    fn request(&mut self, frame: Frame, reply: MaskReply);
}

/// Runs the model on the calling thread and replies before returning.
pub struct InlineOracle<M> {
    model: M,
}

impl<M: SegmentationModel> InlineOracle<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M: SegmentationModel> SegmentationOracle for InlineOracle<M> {
    fn request(&mut self, frame: Frame, reply: MaskReply) {
        let result = self.model.segment(frame.image());
        reply.deliver(result);
    }
}

/// Runs the model on a dedicated worker thread.
pub struct WorkerOracle {
    sender: Option<Sender<(Frame, MaskReply)>>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerOracle {
    pub fn spawn(mut model: Box<dyn SegmentationModel>) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded::<(Frame, MaskReply)>(1);

        let handle = std::thread::Builder::new()
            .name("segmentation".to_string())
            .spawn(move || {
                tracing::info!("Segmentation worker started");
                while let Ok((frame, reply)) = receiver.recv() {
                    let _span = tracing::debug_span!("segment", seq = frame.seq()).entered();
                    let result = model.segment(frame.image());
                    reply.deliver(result);
                }
                tracing::info!("Segmentation worker stopped");
            })
            .context("Failed to spawn segmentation worker")?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }
}

impl SegmentationOracle for WorkerOracle {
    fn request(&mut self, frame: Frame, reply: MaskReply) {
        let Some(sender) = &self.sender else {
            return;
        };

        // A rejected request hands the reply back; dropping it frees the slot.
        match sender.try_send((frame, reply)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => tracing::debug!("Segmentation worker busy"),
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Segmentation worker has gone away")
            }
        }
    }
}

impl Drop for WorkerOracle {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Segmentation worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::MaskRegister;
    use image::{GrayImage, Luma, RgbImage};
    use std::time::{Duration, Instant};

    struct HalfMask;

    impl SegmentationModel for HalfMask {
        fn segment(&mut self, frame: &RgbImage) -> Result<GrayImage> {
            let (w, h) = frame.dimensions();
            Ok(GrayImage::from_pixel(w / 2, h / 2, Luma([128])))
        }

        fn input_size(&self) -> (u32, u32) {
            (8, 8)
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(seq, RgbImage::new(8, 8))
    }

    #[test]
    fn inline_oracle_replies_immediately() {
        let register = MaskRegister::new();
        let mut oracle = InlineOracle::new(HalfMask);

        oracle.request(frame(3), register.begin(3).unwrap());

        let mask = register.latest().unwrap();
        assert_eq!(mask.seq(), 3);
        assert_eq!(mask.dimensions(), (4, 4));
        assert!(!register.in_flight());
    }

    #[test]
    fn worker_oracle_replies_from_thread() {
        let register = MaskRegister::new();
        let mut oracle = WorkerOracle::spawn(Box::new(HalfMask)).unwrap();

        oracle.request(frame(1), register.begin(1).unwrap());

        let deadline = Instant::now() + Duration::from_secs(5);
        while register.latest().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(register.latest().unwrap().seq(), 1);
        assert!(!register.in_flight());
    }
}
