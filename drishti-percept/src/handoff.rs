//! Single-slot frame handoff between the camera and the processing task
//!
//! Capacity is one by policy: a newer frame replaces a pending one rather
//! than queuing, so the processing task always sees the freshest frame
//! and slow inference sheds load instead of building a backlog.

use drishti_core::Frame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

pub struct FrameSlot {
    slot: Mutex<Option<Frame>>,
    notify: Notify,
    replaced: AtomicU64,
    closed: AtomicBool,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
            replaced: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Offer a frame from the camera side. Never blocks.
    ///
    /// Returns `true` if a pending frame was replaced (counted as a
    /// drop), `false` if the slot was empty or already closed.
    pub fn offer(&self, frame: Frame) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let replaced = {
            let mut slot = self.slot.lock();
            let replaced = slot.is_some();
            *slot = Some(frame);
            replaced
        };
        if replaced {
            self.replaced.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        replaced
    }

    /// Take the pending frame, waiting until one arrives.
    ///
    /// Returns `None` once the slot is closed and drained.
    pub async fn take(&self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.slot.lock().take() {
                return Some(frame);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Non-blocking take.
    pub fn try_take(&self) -> Option<Frame> {
        self.slot.lock().take()
    }

    /// Frames that were replaced before being taken.
    pub fn replaced_count(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }

    /// Close the slot and wake the consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Reopen a closed slot, discarding any stale frame left in it.
    pub fn reopen(&self) {
        *self.slot.lock() = None;
        self.closed.store(false, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}
