use std::{borrow::Cow, num::NonZeroUsize};

use deferra_render_rhi::{PipelineInfo, RenderDevice};
use slotmap::{SecondaryMap, SlotMap};

use crate::error::{RenderError, Result};

slotmap::new_key_type! {
    pub struct PipelineId;
}

/// Every pipeline the passes draw with, built once before the first frame.
pub struct PipelineLibrary<D: RenderDevice> {
    pipelines: SlotMap<PipelineId, D::Pipeline>,
    names: SecondaryMap<PipelineId, Cow<'static, str>>,
}

impl<D: RenderDevice> Default for PipelineLibrary<D> {
    fn default() -> Self {
        Self {
            pipelines: SlotMap::with_key(),
            names: SecondaryMap::new(),
        }
    }
}

impl<D: RenderDevice> PipelineLibrary<D> {
    /// Builds every description on a pool of scoped worker threads and joins
    /// them before returning. The ids are in the order of `infos`.
    ///
    /// `worker_threads` of 0 uses the available parallelism.
    pub fn build(device: &D, infos: &[PipelineInfo], worker_threads: usize) -> Result<(Self, Vec<PipelineId>)> {
        let mut library = Self::default();
        if infos.is_empty() {
            return Ok((library, Vec::new()));
        }

        let workers = worker_count(worker_threads, infos.len());
        let chunk_size = infos.len().div_ceil(workers);
        log::debug!("Building {} pipelines on {workers} workers", infos.len());

        let built = crossbeam::thread::scope(|scope| {
            let handles = infos
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move |_| {
                        chunk
                            .iter()
                            .map(|info| device.create_pipeline(info))
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Vec<_>>()
        })
        .map_err(|_| RenderError::WorkerPanicked)?;

        let mut ids = Vec::with_capacity(infos.len());
        let mut infos = infos.iter();
        for chunk in built {
            let chunk = chunk.map_err(|_| RenderError::WorkerPanicked)?;
            for (pipeline, info) in chunk.into_iter().zip(infos.by_ref()) {
                ids.push(library.insert(info.name.clone(), pipeline?));
            }
        }

        Ok((library, ids))
    }

    pub fn insert(&mut self, name: Cow<'static, str>, pipeline: D::Pipeline) -> PipelineId {
        let id = self.pipelines.insert(pipeline);
        self.names.insert(id, name);
        id
    }

    /// # Panics
    ///
    /// Panics if the pipeline does not exist.
    pub fn get(&self, id: PipelineId) -> &D::Pipeline {
        match self.pipelines.get(id) {
            Some(pipeline) => pipeline,
            None => panic!("unknown pipeline {id:?}"),
        }
    }

    pub fn name(&self, id: PipelineId) -> &str {
        self.names.get(id).map(|name| name.as_ref()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

fn worker_count(requested: usize, jobs: usize) -> usize {
    let workers = if requested == 0 {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    } else {
        requested
    };

    workers.clamp(1, jobs.max(1))
}

#[cfg(test)]
mod tests {
    use deferra_render_rhi::{
        DepthTest, Format,
        mock::{MockDevice, MockGpuMode},
    };
    use smallvec::smallvec;

    use crate::testing::blob;

    use super::*;

    fn info(name: String) -> PipelineInfo {
        PipelineInfo {
            name: name.into(),
            vertex: blob("vertex"),
            fragment: blob("fragment"),
            color_formats: smallvec![Format::Rgba8Unorm],
            depth_format: None,
            depth_test: DepthTest::Disabled,
            shader_resource_count: 1,
            constants_size: 0,
        }
    }

    #[test]
    fn test_builds_in_order_across_workers() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let infos = (0..7).map(|index| info(format!("pipeline {index}"))).collect::<Vec<_>>();

        let (library, ids) = PipelineLibrary::build(&device, &infos, 3).unwrap();

        assert_eq!(library.len(), 7);
        assert_eq!(ids.len(), 7);
        for (index, id) in ids.iter().enumerate() {
            let expected = format!("pipeline {index}");
            assert_eq!(library.name(*id), expected);
            assert_eq!(library.get(*id).name, expected);
        }
    }

    #[test]
    fn test_empty_library_spawns_nothing() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let (library, ids) = PipelineLibrary::build(&device, &[], 0).unwrap();
        assert!(library.is_empty());
        assert!(ids.is_empty());
    }

    #[test]
    fn test_worker_count_is_bounded_by_jobs() {
        assert_eq!(worker_count(8, 3), 3);
        assert_eq!(worker_count(2, 10), 2);
        assert!(worker_count(0, 64) >= 1);
    }
}
