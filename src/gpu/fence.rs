//! Host/device completion counter

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::BlurError;

/// How long the host sleeps between device polls while waiting
pub(crate) const POLL_INTERVAL: Duration = Duration::from_micros(200);

/// A monotonically increasing value the device advances as queued work completes.
///
/// The host only observes a signaled value after `wait` returns `Ok`.
pub struct Fence {
    completed: Arc<AtomicU64>,
}

impl Fence {
    /// A fence at value 0
    pub fn new() -> Self {
        Self {
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Value reached so far
    pub fn completed_value(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Advance to `value` once everything already submitted to `queue` has executed.
    ///
    /// Work submitted after this call is not covered.
    pub fn enqueue_signal(&self, queue: &wgpu::Queue, value: u64) {
        let completed = Arc::clone(&self.completed);
        queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });
    }

    /// Block until the fence reaches `value`, polling `device` to drive callbacks.
    pub fn wait(
        &self,
        device: &wgpu::Device,
        value: u64,
        timeout: Duration,
    ) -> Result<(), BlurError> {
        let start = Instant::now();
        loop {
            device.poll(wgpu::Maintain::Poll);
            if self.completed_value() >= value {
                log::debug!("Fence reached {} after {:?}", value, start.elapsed());
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(BlurError::SynchronizationTimeout { value, timeout });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new()
    }
}
