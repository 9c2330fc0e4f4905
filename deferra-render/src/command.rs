use deferra_render_rhi::{CommandAllocator, CommandList, RenderDevice};
use smallvec::SmallVec;

use crate::{error::Result, executor::CommandListExecutor, sync::FenceGate};

/// Where a slot is in its record/submit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Recording,
    Closed,
    Submitted,
}

/// One command list recorded against one of K allocators in turn, K being
/// the number of queued frames.
///
/// An allocator is only reset once the fence shows the GPU finished the
/// list last recorded against it, so the CPU can run up to K frames ahead.
pub struct CommandListPerFrame<D: RenderDevice> {
    allocators: SmallVec<[D::CommandAllocator; 4]>,
    fence_values: SmallVec<[u64; 4]>,
    states: SmallVec<[SlotState; 4]>,
    list: D::CommandList,
    frame_index: usize,
}

impl<D: RenderDevice> CommandListPerFrame<D> {
    pub fn new(device: &D, queued_frame_count: usize) -> Result<Self> {
        assert!(queued_frame_count > 0, "at least one queued frame is required");

        let allocators = (0..queued_frame_count)
            .map(|_| device.create_command_allocator())
            .collect::<Result<SmallVec<[_; 4]>, _>>()?;
        let list = device.create_command_list(&allocators[0])?;

        Ok(Self {
            allocators,
            fence_values: SmallVec::from_elem(0, queued_frame_count),
            states: SmallVec::from_elem(SlotState::Idle, queued_frame_count),
            list,
            // The first reset lands on slot 0.
            frame_index: queued_frame_count - 1,
        })
    }

    /// Moves to the next slot and returns the list ready for recording.
    ///
    /// Blocks on `gate` if the GPU may still execute the commands recorded
    /// the last time this slot was used.
    pub fn reset_with_next_allocator(
        &mut self,
        gate: &mut FenceGate<D>,
        pipeline: Option<&D::Pipeline>,
    ) -> Result<&mut D::CommandList> {
        debug_assert!(
            self.states[self.frame_index] != SlotState::Recording,
            "command list reset before its previous recording was submitted"
        );

        self.frame_index = (self.frame_index + 1) % self.allocators.len();
        let slot = self.frame_index;

        gate.wait_for(self.fence_values[slot])?;

        let allocator = &mut self.allocators[slot];
        allocator.reset()?;
        self.list.reset(allocator, pipeline)?;

        // The next signal is enqueued after this list is submitted.
        self.fence_values[slot] = gate.next_value();
        self.states[slot] = SlotState::Recording;

        Ok(&mut self.list)
    }

    /// Closes the list and pushes it for asynchronous execution.
    pub fn submit(&mut self, executor: &mut CommandListExecutor<D>) -> Result<()> {
        self.close()?;
        executor.push(&self.list)?;
        self.states[self.frame_index] = SlotState::Submitted;
        Ok(())
    }

    /// Closes the list, executes it and waits for the GPU to finish it.
    pub fn submit_and_wait(&mut self, executor: &mut CommandListExecutor<D>) -> Result<()> {
        self.close()?;
        executor.execute_and_wait(&self.list)?;
        self.states[self.frame_index] = SlotState::Submitted;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug_assert_eq!(self.states[self.frame_index], SlotState::Recording);
        self.list.close()?;
        self.states[self.frame_index] = SlotState::Closed;
        Ok(())
    }

    pub fn current_slot(&self) -> usize {
        self.frame_index
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }

    /// The fence value that covers the last use of `slot`.
    pub fn slot_fence_value(&self, slot: usize) -> u64 {
        self.fence_values[slot]
    }

    pub fn slot_count(&self) -> usize {
        self.allocators.len()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Duration,
    };

    use deferra_render_rhi::mock::{MockDevice, MockEvent, MockGpuMode};

    use super::*;

    #[test]
    fn test_slots_cycle_and_record_covering_values() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let mut executor = CommandListExecutor::new(&device, device.create_queue()).unwrap();
        let mut commands = CommandListPerFrame::new(&device, 3).unwrap();

        let mut slots = Vec::new();
        for _ in 0..4 {
            let list = commands
                .reset_with_next_allocator(executor.gate_mut(), None)
                .unwrap();
            assert!(list.is_recording());
            slots.push(commands.current_slot());

            commands.submit(&mut executor).unwrap();
            executor.signal_and_wait(0).unwrap();
        }

        assert_eq!(slots, [0, 1, 2, 0]);
        assert_eq!(commands.slot_fence_value(1), 2);
        assert_eq!(commands.slot_fence_value(0), 4);
        assert_eq!(commands.slot_state(0), SlotState::Submitted);
    }

    #[test]
    fn test_reuse_blocks_until_slot_work_completes() {
        const QUEUED_FRAMES: usize = 2;

        let device = Arc::new(MockDevice::new(MockGpuMode::Manual));
        let mut executor = CommandListExecutor::new(&*device, device.create_queue()).unwrap();
        let mut commands = CommandListPerFrame::new(&*device, QUEUED_FRAMES).unwrap();

        for _ in 0..QUEUED_FRAMES {
            commands
                .reset_with_next_allocator(executor.gate_mut(), None)
                .unwrap()
                .draw(3, 1);
            commands.submit(&mut executor).unwrap();
            executor.signal_and_wait(0).unwrap();
        }

        let slot_value = commands.slot_fence_value(0);
        assert_eq!(slot_value, 1);
        assert_eq!(executor.gate().completed_value(), 0);

        let completed = Arc::new(AtomicBool::new(false));
        let completer = {
            let device = Arc::clone(&device);
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                completed.store(true, Ordering::SeqCst);
                device.complete_up_to(slot_value);
            })
        };

        // Call K + 1 reuses slot 0 and has to wait for value 1.
        commands
            .reset_with_next_allocator(executor.gate_mut(), None)
            .unwrap();
        assert!(completed.load(Ordering::SeqCst));
        completer.join().unwrap();

        assert_eq!(commands.current_slot(), 0);
        assert_eq!(executor.gate().completed_value(), slot_value);
        assert_eq!(executor.gate().stats().waits, 1);
        assert_eq!(
            device.count_events(|event| matches!(event, MockEvent::FenceWait { value: 1, .. })),
            1
        );

        commands.submit(&mut executor).unwrap();
        device.complete_all();
    }

    #[test]
    fn test_submit_and_wait_frees_the_slot() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let mut executor = CommandListExecutor::new(&device, device.create_queue()).unwrap();
        let mut commands = CommandListPerFrame::new(&device, 1).unwrap();

        for _ in 0..3 {
            commands
                .reset_with_next_allocator(executor.gate_mut(), None)
                .unwrap();
            commands.submit_and_wait(&mut executor).unwrap();
        }

        assert_eq!(executor.gate().stats().waits, 0);
        assert_eq!(executor.gate().stats().drains, 3);
    }
}
