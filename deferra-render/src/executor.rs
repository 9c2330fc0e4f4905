use deferra_render_rhi::{Queue, RenderDevice};

use crate::{error::Result, sync::FenceGate};

/// Submits command lists to the GPU queue in the order they are pushed.
///
/// Owns the queue and the fence gate every CPU wait goes through.
pub struct CommandListExecutor<D: RenderDevice> {
    queue: D::Queue,
    gate: FenceGate<D>,
    executed_count: u64,
}

impl<D: RenderDevice> CommandListExecutor<D> {
    pub fn new(device: &D, queue: D::Queue) -> Result<Self> {
        Ok(Self {
            queue,
            gate: FenceGate::new(device)?,
            executed_count: 0,
        })
    }

    /// The queue lists are submitted to. Swap chains present from it.
    pub fn submission_queue(&self) -> &D::Queue {
        &self.queue
    }

    pub fn gate(&self) -> &FenceGate<D> {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut FenceGate<D> {
        &mut self.gate
    }

    /// Submits a closed list without waiting for it.
    pub fn push(&mut self, list: &D::CommandList) -> Result<()> {
        self.queue.submit(list)?;
        self.executed_count += 1;
        Ok(())
    }

    /// Submits a closed list and blocks until the GPU finished it and
    /// everything submitted before it.
    pub fn execute_and_wait(&mut self, list: &D::CommandList) -> Result<()> {
        self.push(list)?;
        self.gate.flush(&self.queue)?;
        Ok(())
    }

    /// See [`FenceGate::signal_and_wait`].
    pub fn signal_and_wait(&mut self, must_be_completed: u64) -> Result<u64> {
        self.gate.signal_and_wait(&self.queue, must_be_completed)
    }

    /// Blocks until every submitted list has executed.
    pub fn flush(&mut self) -> Result<u64> {
        self.gate.flush(&self.queue)
    }

    /// Lists submitted so far.
    pub fn executed_count(&self) -> u64 {
        self.executed_count
    }
}

#[cfg(test)]
mod tests {
    use deferra_render_rhi::{
        CommandAllocator, CommandList,
        mock::{MockDevice, MockEvent, MockGpuMode},
    };

    use super::*;

    #[test]
    fn test_push_preserves_order() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let mut executor = CommandListExecutor::new(&device, device.create_queue()).unwrap();

        let mut allocators = (0..3)
            .map(|_| device.create_command_allocator().unwrap())
            .collect::<Vec<_>>();
        let mut lists = Vec::new();
        for allocator in &mut allocators {
            allocator.reset().unwrap();
            let mut list = device.create_command_list(allocator).unwrap();
            list.reset(allocator, None).unwrap();
            list.close().unwrap();
            lists.push(list);
        }

        for list in &lists {
            executor.push(list).unwrap();
        }

        let submitted = device
            .events()
            .into_iter()
            .filter_map(|event| match event {
                MockEvent::Submit { list, .. } => Some(list),
                _ => None,
            })
            .collect::<Vec<_>>();
        let expected = lists.iter().map(|list| list.id()).collect::<Vec<_>>();

        assert_eq!(submitted, expected);
        assert_eq!(executor.executed_count(), 3);
        // Pushing never signals.
        assert_eq!(executor.gate().current_value(), 0);
    }

    #[test]
    fn test_execute_and_wait_drains() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let mut executor = CommandListExecutor::new(&device, device.create_queue()).unwrap();

        let mut allocator = device.create_command_allocator().unwrap();
        allocator.reset().unwrap();
        let mut list = device.create_command_list(&allocator).unwrap();
        list.reset(&allocator, None).unwrap();
        list.close().unwrap();

        executor.execute_and_wait(&list).unwrap();

        assert_eq!(executor.gate().current_value(), 1);
        assert_eq!(executor.gate().completed_value(), 1);
        assert_eq!(executor.gate().stats().drains, 1);
        // The allocator is reusable right away.
        allocator.reset().unwrap();
    }
}
