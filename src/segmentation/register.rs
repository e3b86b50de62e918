use super::types::Mask;
use anyhow::Result;
use image::GrayImage;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Slot {
    latest: Option<Arc<Mask>>,
    in_flight: bool,
    closed: bool,
    discarded: u64,
}

/// Single-slot "latest mask" register.
///
/// At most one request is outstanding at a time. A completed mask overwrites
/// whatever was there; nothing is queued. Once closed, late replies are
/// dropped on the floor.
#[derive(Default)]
pub struct MaskRegister {
    slot: Mutex<Slot>,
}

impl MaskRegister {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the request slot for the frame `seq`.
    ///
    /// Returns `None` while a previous request is still in flight, or after
    /// the register has been closed.
    pub fn begin(self: &Arc<Self>, seq: u64) -> Option<MaskReply> {
        let mut slot = self.slot.lock();
        if slot.in_flight || slot.closed {
            return None;
        }
        slot.in_flight = true;

        Some(MaskReply {
            register: Arc::clone(self),
            seq,
            settled: false,
        })
    }

    /// Most recently completed mask, if any has ever completed
    pub fn latest(&self) -> Option<Arc<Mask>> {
        self.slot.lock().latest.clone()
    }

    pub fn in_flight(&self) -> bool {
        self.slot.lock().in_flight
    }

    /// Stop accepting results. Idempotent.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        if !slot.closed {
            tracing::debug!("Mask register closed (in_flight={})", slot.in_flight);
        }
        slot.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    /// Number of replies that arrived after `close`
    pub fn discarded(&self) -> u64 {
        self.slot.lock().discarded
    }

    fn settle(&self, seq: u64, result: Option<Result<GrayImage>>) {
        let mut slot = self.slot.lock();
        slot.in_flight = false;

        if slot.closed {
            if result.is_some() {
                slot.discarded += 1;
                tracing::debug!("Discarding mask for frame {} after stop", seq);
            }
            return;
        }

        match result {
            Some(Ok(alpha)) => slot.latest = Some(Arc::new(Mask::new(seq, alpha))),
            Some(Err(err)) => tracing::warn!("Segmentation of frame {} failed: {:#}", seq, err),
            None => tracing::debug!("Mask request for frame {} abandoned", seq),
        }
    }
}

/// One-shot reply handle for an outstanding mask request.
///
/// Dropping it without delivering frees the slot so the next tick can ask
/// again.
pub struct MaskReply {
    register: Arc<MaskRegister>,
    seq: u64,
    settled: bool,
}

impl MaskReply {
    /// Sequence number of the frame this reply belongs to
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn deliver(mut self, result: Result<GrayImage>) {
        self.settled = true;
        self.register.settle(self.seq, Some(result));
    }
}

impl Drop for MaskReply {
    fn drop(&mut self) {
        if !self.settled {
            self.register.settle(self.seq, None);
        }
    }
}
