use deferra_render_rhi::{CommandList, RenderDevice, ResourceState, TextureBarrier};
use slotmap::SecondaryMap;
use smallvec::SmallVec;

use crate::resource::{ResourceId, ResourceTable};

/// A transition of one resource between two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBarrier {
    pub resource: ResourceId,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// The single authority on the state every resource is in.
///
/// Transitions are recorded in program order: the state returned by
/// [`ResourceStateTracker::state`] is the state the resource will be in once
/// every barrier handed out so far has executed on the GPU.
#[derive(Default)]
pub struct ResourceStateTracker {
    states: SecondaryMap<ResourceId, ResourceState>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a resource. Every resource is registered exactly once.
    pub fn add_resource(&mut self, resource: ResourceId, initial_state: ResourceState) {
        let previous = self.states.insert(resource, initial_state);
        debug_assert!(previous.is_none(), "resource {resource:?} registered twice");
    }

    pub fn remove_resource(&mut self, resource: ResourceId) {
        let removed = self.states.remove(resource);
        debug_assert!(removed.is_some(), "resource {resource:?} is not tracked");
    }

    pub fn contains(&self, resource: ResourceId) -> bool {
        self.states.contains_key(resource)
    }

    /// # Panics
    ///
    /// Panics if the resource was never registered.
    pub fn state(&self, resource: ResourceId) -> ResourceState {
        match self.states.get(resource) {
            Some(state) => *state,
            None => panic!("resource {resource:?} is not tracked"),
        }
    }

    /// Records `target` as the state of `resource` and returns the barrier
    /// that gets it there, or `None` if it is already in that state.
    ///
    /// # Panics
    ///
    /// Panics if the resource was never registered.
    pub fn request_transition(&mut self, resource: ResourceId, target: ResourceState) -> Option<ResourceBarrier> {
        debug_assert!(target.is_valid_target(), "{target:?} is not a valid transition target");

        let Some(current) = self.states.get_mut(resource) else {
            panic!("transition requested for untracked resource {resource:?}");
        };

        if *current == target {
            return None;
        }

        let barrier = ResourceBarrier {
            resource,
            before: *current,
            after: target,
        };
        *current = target;

        Some(barrier)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Barriers collected for a single `resource_barriers` call.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    barriers: SmallVec<[ResourceBarrier; 8]>,
}

impl BarrierBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a transition and keeps the barrier if one is needed.
    pub fn request(&mut self, tracker: &mut ResourceStateTracker, resource: ResourceId, target: ResourceState) {
        if let Some(barrier) = tracker.request_transition(resource, target) {
            self.barriers.push(barrier);
        }
    }

    pub fn barriers(&self) -> &[ResourceBarrier] {
        &self.barriers
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    /// Records every collected barrier into `list` with one call, and nothing
    /// at all when the batch is empty. Returns the number of barriers.
    pub fn record<D: RenderDevice>(&self, list: &mut D::CommandList, resources: &ResourceTable<D>) -> usize {
        if self.barriers.is_empty() {
            return 0;
        }

        let barriers = self
            .barriers
            .iter()
            .map(|barrier| TextureBarrier {
                texture: resources.texture(barrier.resource),
                before: barrier.before,
                after: barrier.after,
            })
            .collect::<SmallVec<[TextureBarrier<'_, D>; 8]>>();

        list.resource_barriers(&barriers);
        barriers.len()
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn resource_ids(count: usize) -> Vec<ResourceId> {
        let mut keys = SlotMap::<ResourceId, ()>::with_key();
        (0..count).map(|_| keys.insert(())).collect()
    }

    #[test]
    fn test_add_then_state_returns_initial_state() {
        let ids = resource_ids(2);
        let mut tracker = ResourceStateTracker::new();
        tracker.add_resource(ids[0], ResourceState::Present);
        tracker.add_resource(ids[1], ResourceState::DepthWrite);

        assert_eq!(tracker.state(ids[0]), ResourceState::Present);
        assert_eq!(tracker.state(ids[1]), ResourceState::DepthWrite);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_same_state_request_is_elided() {
        let ids = resource_ids(1);
        let mut tracker = ResourceStateTracker::new();
        tracker.add_resource(ids[0], ResourceState::Present);

        assert_eq!(tracker.request_transition(ids[0], ResourceState::Present), None);

        let barrier = tracker.request_transition(ids[0], ResourceState::RenderTarget);
        assert_eq!(
            barrier,
            Some(ResourceBarrier {
                resource: ids[0],
                before: ResourceState::Present,
                after: ResourceState::RenderTarget,
            })
        );
        assert_eq!(tracker.state(ids[0]), ResourceState::RenderTarget);
    }

    #[test]
    fn test_barrier_emitted_iff_state_changes() {
        let ids = resource_ids(1);
        let mut tracker = ResourceStateTracker::new();
        tracker.add_resource(ids[0], ResourceState::Common);

        let script = [
            ResourceState::RenderTarget,
            ResourceState::RenderTarget,
            ResourceState::PixelShaderResource,
            ResourceState::PixelShaderResource,
            ResourceState::PixelShaderResource,
            ResourceState::RenderTarget,
            ResourceState::Present,
            ResourceState::Present,
        ];

        let mut previous = ResourceState::Common;
        let mut emitted = 0;
        for target in script {
            let barrier = tracker.request_transition(ids[0], target);
            assert_eq!(barrier.is_some(), target != previous);
            if let Some(barrier) = barrier {
                assert_eq!(barrier.before, previous);
                assert_eq!(barrier.after, target);
                emitted += 1;
            }
            previous = target;
        }

        assert_eq!(emitted, 4);
    }

    #[test]
    fn test_batch_keeps_only_needed_barriers() {
        let ids = resource_ids(3);
        let mut tracker = ResourceStateTracker::new();
        tracker.add_resource(ids[0], ResourceState::RenderTarget);
        tracker.add_resource(ids[1], ResourceState::PixelShaderResource);
        tracker.add_resource(ids[2], ResourceState::Undefined);

        let mut batch = BarrierBatch::new();
        batch.request(&mut tracker, ids[0], ResourceState::RenderTarget);
        batch.request(&mut tracker, ids[1], ResourceState::RenderTarget);
        batch.request(&mut tracker, ids[2], ResourceState::DepthWrite);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.barriers()[0].resource, ids[1]);
        assert_eq!(batch.barriers()[1].before, ResourceState::Undefined);
    }

    #[test]
    #[should_panic(expected = "not tracked")]
    fn test_state_of_unknown_resource_panics() {
        let ids = resource_ids(1);
        ResourceStateTracker::new().state(ids[0]);
    }

    #[test]
    #[should_panic(expected = "untracked resource")]
    fn test_transition_of_unknown_resource_panics() {
        let ids = resource_ids(1);
        ResourceStateTracker::new().request_transition(ids[0], ResourceState::RenderTarget);
    }

    #[test]
    fn test_removed_resource_is_forgotten() {
        let ids = resource_ids(1);
        let mut tracker = ResourceStateTracker::new();
        tracker.add_resource(ids[0], ResourceState::Common);
        tracker.remove_resource(ids[0]);

        assert!(!tracker.contains(ids[0]));
        assert!(tracker.is_empty());
    }
}
