use ash::vk;
use itertools::Itertools;

use crate::commands::{command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore};

/// 对 `vk::SubmitInfo2` 的封装，持有所有被引用的数组
#[derive(Default)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBufferSubmitInfo<'static>>,
    wait_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signal_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

impl GfxSubmitInfo {
    pub fn new(commands: &[GfxCommandBuffer]) -> Self {
        let command_buffers = commands
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(cmd.vk_handle()))
            .collect_vec();

        Self {
            command_buffers,
            wait_infos: vec![],
            signal_infos: vec![],
        }
    }

    #[inline]
    pub fn submit_info(&self) -> vk::SubmitInfo2<'_> {
        vk::SubmitInfo2::default()
            .command_buffer_infos(&self.command_buffers)
            .wait_semaphore_infos(&self.wait_infos)
            .signal_semaphore_infos(&self.signal_infos)
    }

    /// - stage: 在哪个阶段等待该 semaphore
    #[inline]
    pub fn wait(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.wait_infos.push(vk::SemaphoreSubmitInfo::default().semaphore(semaphore.handle()).stage_mask(stage));
        self
    }

    /// - stage: 在哪个阶段完成后 signal 该 semaphore
    #[inline]
    pub fn signal(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signal_infos.push(vk::SemaphoreSubmitInfo::default().semaphore(semaphore.handle()).stage_mask(stage));
        self
    }

    #[inline]
    pub fn wait_count(&self) -> usize {
        self.wait_infos.len()
    }

    #[inline]
    pub fn signal_count(&self) -> usize {
        self.signal_infos.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_info_counts() {
        let info = GfxSubmitInfo::new(&[]);
        let raw = info.submit_info();
        assert_eq!(raw.command_buffer_info_count, 0);
        assert_eq!(raw.wait_semaphore_info_count, 0);
        assert_eq!(raw.signal_semaphore_info_count, 0);
        assert_eq!((info.wait_count(), info.signal_count()), (0, 0));
    }
}
