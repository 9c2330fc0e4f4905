//! A deterministic in-process GPU.
//!
//! Submitted commands are appended to an event log in execution order.
//! Fences complete either as soon as they are signaled
//! ([`MockGpuMode::Immediate`]) or when the test advances them
//! ([`MockGpuMode::Manual`]). The mock panics on hazards a real driver would
//! not report: resetting an allocator whose lists may still execute,
//! recording into a closed list and waiting on a value nobody will signal.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    Result,
    device::{CommandAllocator, CommandList, Fence, Queue, RenderDevice, SwapChain, TextureBarrier},
    state::ResourceState,
    types::{Extent2D, Format, PipelineInfo, TextureInfo, ViewKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockGpuMode {
    /// Signals complete as soon as they are enqueued.
    #[default]
    Immediate,
    /// Signals stay pending until [`MockDevice::complete_up_to`] is called.
    Manual,
}

/// Something the mock GPU observed. Texture-related events carry texture
/// ids so tests can follow a resource through views.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Submit { list: u64, allocator: u64 },
    Barrier { texture: u64, before: ResourceState, after: ResourceState },
    ClearRenderTarget { texture: u64 },
    ClearDepthStencil { texture: u64 },
    SetRenderTargets { colors: Vec<u64>, depth: Option<u64> },
    SetPipeline { pipeline: u64 },
    SetShaderResources { textures: Vec<u64> },
    SetConstants { size: usize },
    Draw { vertex_count: u32, instance_count: u32 },
    Signal { fence: usize, value: u64 },
    FenceWait { fence: usize, value: u64 },
    AllocatorReset { allocator: u64 },
    Present { back_buffer: u32 },
}

#[derive(Default)]
struct GpuState {
    mode: MockGpuMode,
    events: Vec<MockEvent>,
    completed: Vec<u64>,
    signaled: Vec<u64>,
    pending: VecDeque<(usize, u64)>,
    // Allocators with submitted work not yet covered by any signal.
    unfenced: Vec<u64>,
    // (fence, value, allocator) for work covered by a signal.
    in_flight: Vec<(usize, u64, u64)>,
}

impl GpuState {
    fn complete(&mut self, fence: usize, value: u64) {
        let completed = &mut self.completed[fence];
        *completed = (*completed).max(value);

        let completed = &self.completed;
        self.in_flight
            .retain(|&(fence, value, _)| completed[fence] < value);
    }

    fn allocator_busy(&self, allocator: u64) -> bool {
        self.unfenced.contains(&allocator)
            || self
                .in_flight
                .iter()
                .any(|&(_, _, busy)| busy == allocator)
    }
}

struct MockGpu {
    state: Mutex<GpuState>,
    progress: Condvar,
}

impl MockGpu {
    fn lock(&self) -> MutexGuard<'_, GpuState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: MockEvent) {
        self.lock().events.push(event);
    }
}

/// The mock device. Cheap to share: clone the `Arc` it is usually held in.
pub struct MockDevice {
    gpu: Arc<MockGpu>,
    next_id: AtomicU64,
}

impl MockDevice {
    pub fn new(mode: MockGpuMode) -> Self {
        Self {
            gpu: Arc::new(MockGpu {
                state: Mutex::new(GpuState {
                    mode,
                    ..Default::default()
                }),
                progress: Condvar::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn create_queue(&self) -> MockQueue {
        MockQueue {
            gpu: Arc::clone(&self.gpu),
        }
    }

    pub fn create_swap_chain(&self, buffer_count: u32, format: Format, extent: Extent2D) -> MockSwapChain {
        let buffers = (0..buffer_count)
            .map(|index| MockTexture {
                id: self.next_id(),
                name: format!("back buffer {index}"),
                format,
                extent,
            })
            .collect();

        MockSwapChain {
            gpu: Arc::clone(&self.gpu),
            buffers,
            index: 0,
            format,
            extent,
        }
    }

    pub fn set_mode(&self, mode: MockGpuMode) {
        self.gpu.lock().mode = mode;
    }

    /// Completes every pending signal with a value up to `value`, in
    /// submission order, and wakes blocked waiters.
    pub fn complete_up_to(&self, value: u64) {
        let mut state = self.gpu.lock();
        while let Some(&(fence, signaled)) = state.pending.front() {
            if signaled > value {
                break;
            }

            state.pending.pop_front();
            state.complete(fence, signaled);
        }

        drop(state);
        self.gpu.progress.notify_all();
    }

    /// Completes every pending signal.
    pub fn complete_all(&self) {
        self.complete_up_to(u64::MAX);
    }

    /// The highest completed value of the fence with the given index.
    pub fn completed_value(&self, fence: usize) -> u64 {
        self.gpu.lock().completed[fence]
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.gpu.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.gpu.lock().events.clear();
    }

    pub fn count_events(&self, predicate: impl Fn(&MockEvent) -> bool) -> usize {
        self.gpu.lock().events.iter().filter(|event| predicate(event)).count()
    }
}

impl RenderDevice for MockDevice {
    type Texture = MockTexture;
    type View = MockView;
    type Pipeline = MockPipeline;
    type CommandAllocator = MockCommandAllocator;
    type CommandList = MockCommandList;
    type Fence = MockFence;
    type Queue = MockQueue;
    type SwapChain = MockSwapChain;

    fn create_texture(&self, info: &TextureInfo) -> Result<MockTexture> {
        Ok(MockTexture {
            id: self.next_id(),
            name: info.name.to_string(),
            format: info.format,
            extent: info.extent,
        })
    }

    fn create_view(&self, texture: &MockTexture, kind: ViewKind) -> Result<MockView> {
        Ok(MockView {
            id: self.next_id(),
            texture: texture.id,
            kind,
        })
    }

    fn create_pipeline(&self, info: &PipelineInfo) -> Result<MockPipeline> {
        Ok(MockPipeline {
            id: self.next_id(),
            name: info.name.to_string(),
        })
    }

    fn create_command_allocator(&self) -> Result<MockCommandAllocator> {
        Ok(MockCommandAllocator {
            gpu: Arc::clone(&self.gpu),
            id: self.next_id(),
        })
    }

    fn create_command_list(&self, _allocator: &MockCommandAllocator) -> Result<MockCommandList> {
        Ok(MockCommandList {
            id: self.next_id(),
            allocator: None,
            commands: Vec::new(),
            recording: false,
        })
    }

    fn create_fence(&self, initial_value: u64) -> Result<MockFence> {
        let mut state = self.gpu.lock();
        let index = state.completed.len();
        state.completed.push(initial_value);
        state.signaled.push(initial_value);

        Ok(MockFence {
            gpu: Arc::clone(&self.gpu),
            index,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MockTexture {
    pub id: u64,
    pub name: String,
    pub format: Format,
    pub extent: Extent2D,
}

#[derive(Debug, Clone)]
pub struct MockView {
    pub id: u64,
    pub texture: u64,
    pub kind: ViewKind,
}

#[derive(Debug, Clone)]
pub struct MockPipeline {
    pub id: u64,
    pub name: String,
}

pub struct MockCommandAllocator {
    gpu: Arc<MockGpu>,
    id: u64,
}

impl MockCommandAllocator {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl CommandAllocator for MockCommandAllocator {
    fn reset(&mut self) -> Result<()> {
        let mut state = self.gpu.lock();
        assert!(
            !state.allocator_busy(self.id),
            "allocator {} reset while the GPU may still execute its commands",
            self.id
        );

        state.events.push(MockEvent::AllocatorReset { allocator: self.id });
        Ok(())
    }
}

pub struct MockCommandList {
    id: u64,
    allocator: Option<u64>,
    commands: Vec<MockEvent>,
    recording: bool,
}

impl MockCommandList {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    fn push(&mut self, command: MockEvent) {
        assert!(self.recording, "command list {} is closed", self.id);
        self.commands.push(command);
    }
}

impl CommandList<MockDevice> for MockCommandList {
    fn reset(&mut self, allocator: &MockCommandAllocator, pipeline: Option<&MockPipeline>) -> Result<()> {
        assert!(!self.recording, "command list {} reset while recording", self.id);

        self.allocator = Some(allocator.id);
        self.commands.clear();
        self.recording = true;

        if let Some(pipeline) = pipeline {
            self.push(MockEvent::SetPipeline { pipeline: pipeline.id });
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        assert!(self.recording, "command list {} closed twice", self.id);
        self.recording = false;
        Ok(())
    }

    fn resource_barriers(&mut self, barriers: &[TextureBarrier<'_, MockDevice>]) {
        for barrier in barriers {
            self.push(MockEvent::Barrier {
                texture: barrier.texture.id,
                before: barrier.before,
                after: barrier.after,
            });
        }
    }

    fn clear_render_target(&mut self, view: &MockView, _color: [f32; 4]) {
        self.push(MockEvent::ClearRenderTarget { texture: view.texture });
    }

    fn clear_depth_stencil(&mut self, view: &MockView, _depth: f32, _stencil: u8) {
        self.push(MockEvent::ClearDepthStencil { texture: view.texture });
    }

    fn set_render_targets(&mut self, colors: &[&MockView], depth: Option<&MockView>) {
        self.push(MockEvent::SetRenderTargets {
            colors: colors.iter().map(|view| view.texture).collect(),
            depth: depth.map(|view| view.texture),
        });
    }

    fn set_pipeline(&mut self, pipeline: &MockPipeline) {
        self.push(MockEvent::SetPipeline { pipeline: pipeline.id });
    }

    fn set_shader_resources(&mut self, views: &[&MockView]) {
        self.push(MockEvent::SetShaderResources {
            textures: views.iter().map(|view| view.texture).collect(),
        });
    }

    fn set_constants(&mut self, data: &[u8]) {
        self.push(MockEvent::SetConstants { size: data.len() });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.push(MockEvent::Draw {
            vertex_count,
            instance_count,
        });
    }
}

pub struct MockFence {
    gpu: Arc<MockGpu>,
    index: usize,
}

impl MockFence {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Fence for MockFence {
    fn completed_value(&self) -> u64 {
        self.gpu.lock().completed[self.index]
    }

    fn wait(&self, value: u64) -> Result<()> {
        let mut state = self.gpu.lock();
        state.events.push(MockEvent::FenceWait {
            fence: self.index,
            value,
        });

        assert!(
            value <= state.signaled[self.index],
            "waiting on fence value {value} that was never signaled"
        );

        while state.completed[self.index] < value {
            state = self
                .gpu
                .progress
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        Ok(())
    }
}

pub struct MockQueue {
    gpu: Arc<MockGpu>,
}

impl Queue<MockDevice> for MockQueue {
    fn submit(&self, list: &MockCommandList) -> Result<()> {
        assert!(!list.recording, "command list {} submitted while recording", list.id);
        let allocator = list
            .allocator
            .unwrap_or_else(|| panic!("command list {} submitted before it was reset", list.id));

        let mut state = self.gpu.lock();
        state.events.push(MockEvent::Submit {
            list: list.id,
            allocator,
        });
        state.events.extend(list.commands.iter().cloned());

        if !state.unfenced.contains(&allocator) {
            state.unfenced.push(allocator);
        }

        Ok(())
    }

    fn signal(&self, fence: &MockFence, value: u64) -> Result<()> {
        let mut state = self.gpu.lock();
        state.events.push(MockEvent::Signal {
            fence: fence.index,
            value,
        });

        let signaled = &mut state.signaled[fence.index];
        *signaled = (*signaled).max(value);

        let unfenced = std::mem::take(&mut state.unfenced);
        state
            .in_flight
            .extend(unfenced.into_iter().map(|allocator| (fence.index, value, allocator)));

        match state.mode {
            MockGpuMode::Immediate => {
                state.complete(fence.index, value);
                drop(state);
                self.gpu.progress.notify_all();
            }
            MockGpuMode::Manual => state.pending.push_back((fence.index, value)),
        }

        Ok(())
    }
}

pub struct MockSwapChain {
    gpu: Arc<MockGpu>,
    buffers: Vec<MockTexture>,
    index: u32,
    format: Format,
    extent: Extent2D,
}

impl SwapChain<MockDevice> for MockSwapChain {
    fn buffer_count(&self) -> u32 {
        self.buffers.len() as u32
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.index
    }

    fn back_buffer(&self, index: u32) -> Result<MockTexture> {
        Ok(self.buffers[index as usize].clone())
    }

    fn initial_state(&self) -> ResourceState {
        ResourceState::Present
    }

    fn format(&self) -> Format {
        self.format
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn present(&mut self, _queue: &MockQueue, _sync_interval: u32) -> Result<()> {
        self.gpu.record(MockEvent::Present {
            back_buffer: self.index,
        });
        self.index = (self.index + 1) % self.buffer_count();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    fn recorded_list(device: &MockDevice, allocator: &mut MockCommandAllocator) -> MockCommandList {
        let mut list = device.create_command_list(allocator).unwrap();
        allocator.reset().unwrap();
        list.reset(allocator, None).unwrap();
        list.draw(3, 1);
        list.close().unwrap();
        list
    }

    #[test]
    fn test_submit_logs_commands_in_order() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let queue = device.create_queue();
        let mut allocator = device.create_command_allocator().unwrap();
        let list = recorded_list(&device, &mut allocator);

        queue.submit(&list).unwrap();

        let events = device.events();
        assert_eq!(events[0], MockEvent::AllocatorReset { allocator: allocator.id() });
        assert_eq!(
            events[1],
            MockEvent::Submit {
                list: list.id(),
                allocator: allocator.id()
            }
        );
        assert_eq!(
            events[2],
            MockEvent::Draw {
                vertex_count: 3,
                instance_count: 1
            }
        );
    }

    #[test]
    #[should_panic(expected = "may still execute")]
    fn test_reset_of_unfenced_allocator_panics() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let queue = device.create_queue();
        let mut allocator = device.create_command_allocator().unwrap();
        let list = recorded_list(&device, &mut allocator);

        queue.submit(&list).unwrap();
        allocator.reset().unwrap();
    }

    #[test]
    fn test_allocator_is_free_once_signal_completes() {
        let device = MockDevice::new(MockGpuMode::Manual);
        let queue = device.create_queue();
        let fence = device.create_fence(0).unwrap();
        let mut allocator = device.create_command_allocator().unwrap();
        let list = recorded_list(&device, &mut allocator);

        queue.submit(&list).unwrap();
        queue.signal(&fence, 1).unwrap();
        assert_eq!(fence.completed_value(), 0);

        device.complete_up_to(1);
        assert_eq!(fence.completed_value(), 1);
        allocator.reset().unwrap();
    }

    #[test]
    fn test_wait_blocks_until_completed() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Manual));
        let queue = device.create_queue();
        let fence = device.create_fence(0).unwrap();
        queue.signal(&fence, 1).unwrap();

        let completer = {
            let device = Arc::clone(&device);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                device.complete_up_to(1);
            })
        };

        fence.wait(1).unwrap();
        assert_eq!(fence.completed_value(), 1);
        completer.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "never signaled")]
    fn test_wait_on_unsignaled_value_panics() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let fence = device.create_fence(0).unwrap();
        fence.wait(1).unwrap();
    }

    #[test]
    #[should_panic(expected = "is closed")]
    fn test_recording_into_closed_list_panics() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(&allocator).unwrap();
        list.draw(3, 1);
    }

    #[test]
    fn test_swap_chain_cycles_back_buffers() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let queue = device.create_queue();
        let mut swap_chain = device.create_swap_chain(2, Format::Bgra8Unorm, Extent2D::new(4, 4));

        let indices = (0..3)
            .map(|_| {
                let index = swap_chain.current_back_buffer_index();
                swap_chain.present(&queue, 0).unwrap();
                index
            })
            .collect::<Vec<_>>();

        assert_eq!(indices, [0, 1, 0]);
    }
}
