use deferra_render_rhi::{Fence, Queue, RenderDevice};

use crate::error::Result;

/// How often the gate signaled, blocked and drained the queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub signals: u64,
    /// Calls that actually blocked the CPU.
    pub waits: u64,
    /// Signals that required their own value to complete.
    pub drains: u64,
}

/// A fence and the value of the last signal enqueued on it.
///
/// Signal values start at 1 and grow by exactly one per signal. The CPU only
/// blocks when it needs work up to some value to have completed.
pub struct FenceGate<D: RenderDevice> {
    fence: D::Fence,
    current_value: u64,
    stats: SyncStats,
}

impl<D: RenderDevice> FenceGate<D> {
    pub fn new(device: &D) -> Result<Self> {
        Ok(Self {
            fence: device.create_fence(0)?,
            current_value: 0,
            stats: SyncStats::default(),
        })
    }

    /// The value of the last enqueued signal.
    pub fn current_value(&self) -> u64 {
        self.current_value
    }

    /// The value the next signal will carry. Work submitted before that
    /// signal is complete once it is.
    pub fn next_value(&self) -> u64 {
        self.current_value + 1
    }

    pub fn completed_value(&self) -> u64 {
        self.fence.completed_value()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Enqueues a signal of the next value on `queue`, then blocks until
    /// the GPU completed at least `must_be_completed`. Returns the signaled
    /// value.
    pub fn signal_and_wait(&mut self, queue: &D::Queue, must_be_completed: u64) -> Result<u64> {
        let target = self.next_value();
        debug_assert!(
            must_be_completed <= target,
            "waiting for fence value {must_be_completed} beyond the signal {target}"
        );

        queue.signal(&self.fence, target)?;
        self.current_value = target;
        self.stats.signals += 1;
        if must_be_completed == target {
            self.stats.drains += 1;
        }

        self.block_until(must_be_completed)?;
        Ok(target)
    }

    /// Signals and waits for everything submitted so far.
    pub fn flush(&mut self, queue: &D::Queue) -> Result<u64> {
        let target = self.next_value();
        self.signal_and_wait(queue, target)
    }

    /// Blocks until the GPU completed `value`, which must already have been
    /// signaled.
    pub fn wait_for(&mut self, value: u64) -> Result<()> {
        debug_assert!(
            value <= self.current_value,
            "waiting for fence value {value} that was never signaled"
        );

        self.block_until(value)
    }

    fn block_until(&mut self, value: u64) -> Result<()> {
        let completed = self.fence.completed_value();
        if completed >= value {
            return Ok(());
        }

        log::trace!("Waiting for fence value {value} (completed {completed})");
        self.fence.wait(value)?;
        self.stats.waits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use deferra_render_rhi::mock::{MockDevice, MockGpuMode};

    use super::*;

    #[test]
    fn test_target_grows_by_one_per_signal() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let queue = device.create_queue();
        let mut gate = FenceGate::new(&device).unwrap();

        let mut previous = gate.current_value();
        for n in 1..=10 {
            let target = gate.signal_and_wait(&queue, 0).unwrap();
            assert_eq!(target, previous + 1);
            previous = target;
            assert_eq!(gate.current_value(), n);
        }

        assert_eq!(gate.stats().signals, 10);
        assert_eq!(gate.stats().drains, 0);
    }

    #[test]
    fn test_flush_is_a_drain() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let queue = device.create_queue();
        let mut gate = FenceGate::new(&device).unwrap();

        let target = gate.flush(&queue).unwrap();

        assert_eq!(target, 1);
        assert_eq!(gate.completed_value(), 1);
        assert_eq!(gate.stats().drains, 1);
    }

    #[test]
    fn test_bounded_wait_only_blocks_for_older_values() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Manual));
        let queue = device.create_queue();
        let mut gate = FenceGate::new(&*device).unwrap();

        // Nothing older to wait for.
        gate.signal_and_wait(&queue, 0).unwrap();
        gate.signal_and_wait(&queue, 0).unwrap();
        assert_eq!(gate.stats().waits, 0);

        let completer = {
            let device = Arc::clone(&device);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                device.complete_up_to(1);
            })
        };

        gate.signal_and_wait(&queue, 1).unwrap();
        completer.join().unwrap();

        assert_eq!(gate.completed_value(), 1);
        assert_eq!(gate.current_value(), 3);
        assert_eq!(gate.stats().waits, 1);
    }

    #[test]
    #[should_panic(expected = "never signaled")]
    fn test_wait_for_unsignaled_value_panics() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let mut gate = FenceGate::new(&device).unwrap();
        gate.wait_for(1).unwrap();
    }
}
