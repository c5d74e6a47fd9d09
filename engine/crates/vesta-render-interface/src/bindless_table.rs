use ash::vk;
use itertools::Itertools;
use vesta_gfx::{
    GfxContext, GfxError, GfxResult,
    descriptors::{
        descriptor_pool::GfxDescriptorPool, descriptor_set_layout::GfxDescriptorSetLayout,
        write_descriptor_set::GfxWriteDescriptorSet,
    },
};

use crate::bindless_config::{BindlessConfig, BindlessKind};

/// 写入哪些帧的 descriptor set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameSelection {
    /// 每一帧的 set 都写入同样的内容
    AllFrames,
    /// 只写入某一帧的 set，用于 per-frame uniform buffer
    Frame(usize),
}

/// 一次 descriptor 写入的目标位置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedWrite {
    pub frame: usize,
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
}

/// 计算写入 `index` 号槽位需要的所有 descriptor write
///
/// storage buffer 的 binding 只有地址表一个 descriptor，`index` 必须为 0
pub fn plan_writes(
    config: &BindlessConfig,
    frames_in_flight: usize,
    kind: BindlessKind,
    index: u32,
    selection: FrameSelection,
) -> GfxResult<Vec<PlannedWrite>> {
    let capacity = config.descriptor_count(kind);
    if index >= capacity {
        return Err(GfxError::BindlessSlotOutOfRange {
            kind: kind.name(),
            index,
            capacity,
        });
    }

    let frames = match selection {
        FrameSelection::AllFrames => 0..frames_in_flight,
        FrameSelection::Frame(frame) if frame < frames_in_flight => frame..frame + 1,
        FrameSelection::Frame(frame) => {
            return Err(GfxError::BindlessSlotOutOfRange {
                kind: "frame",
                index: frame as u32,
                capacity: frames_in_flight as u32,
            });
        }
    };

    Ok(frames
        .map(|frame| PlannedWrite {
            frame,
            binding: config.binding(kind),
            array_element: index,
            descriptor_type: kind.descriptor_type(),
        })
        .collect())
}

/// 全局 bindless descriptor 表
///
/// 一个 layout，每个 frame in flight 一个 descriptor set，set 之间的内容互为镜像
/// （per-frame uniform buffer 除外）。
///
/// # Destroy
/// 需要手动调用 [`GfxBindlessTable::destroy`]
pub struct GfxBindlessTable {
    config: BindlessConfig,
    layout: GfxDescriptorSetLayout,
    pool: GfxDescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}
// new & init
impl GfxBindlessTable {
    pub fn new(ctx: &GfxContext, config: &BindlessConfig, frames_in_flight: usize) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxBindlessTable::new");

        let (bindings, binding_flags) = config.layout_bindings();
        let layout = GfxDescriptorSetLayout::new(
            ctx,
            vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL,
            &bindings,
            &binding_flags,
            "bindless-layout",
        )?;

        let pool = match GfxDescriptorPool::new(
            ctx,
            vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND,
            frames_in_flight as u32,
            &config.pool_sizes(frames_in_flight as u32),
            "bindless",
        ) {
            Ok(pool) => pool,
            Err(e) => {
                layout.destroy(ctx);
                return Err(e);
            }
        };

        let sets = match pool.allocate_sets(ctx, layout.handle(), frames_in_flight, "bindless-set") {
            Ok(sets) => sets,
            Err(e) => {
                pool.destroy(ctx);
                layout.destroy(ctx);
                return Err(e);
            }
        };
        log::info!("bindless table created: {} frame sets, {:?}", frames_in_flight, config);

        Ok(Self {
            config: config.clone(),
            layout,
            pool,
            sets,
        })
    }
}
// destroy
impl GfxBindlessTable {
    /// descriptor set 跟随 pool 一起销毁
    pub fn destroy(self, ctx: &GfxContext) {
        self.pool.destroy(ctx);
        self.layout.destroy(ctx);
    }
}
// getters
impl GfxBindlessTable {
    #[inline]
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    #[inline]
    pub fn set(&self, frame: usize) -> vk::DescriptorSet {
        self.sets[frame]
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn config(&self) -> &BindlessConfig {
        &self.config
    }
}
// update
impl GfxBindlessTable {
    pub fn write_image(
        &self,
        ctx: &GfxContext,
        kind: BindlessKind,
        index: u32,
        image_info: vk::DescriptorImageInfo,
        selection: FrameSelection,
    ) -> GfxResult<()> {
        let writes = plan_writes(&self.config, self.sets.len(), kind, index, selection)?
            .into_iter()
            .map(|w| {
                GfxWriteDescriptorSet::image(self.sets[w.frame], w.binding, w.array_element, w.descriptor_type, image_info)
            })
            .collect_vec();
        GfxWriteDescriptorSet::update(ctx, &writes);
        Ok(())
    }

    pub fn write_buffer(
        &self,
        ctx: &GfxContext,
        kind: BindlessKind,
        index: u32,
        buffer_info: vk::DescriptorBufferInfo,
        selection: FrameSelection,
    ) -> GfxResult<()> {
        let writes = plan_writes(&self.config, self.sets.len(), kind, index, selection)?
            .into_iter()
            .map(|w| {
                GfxWriteDescriptorSet::buffer(
                    self.sets[w.frame],
                    w.binding,
                    w.array_element,
                    w.descriptor_type,
                    buffer_info,
                )
            })
            .collect_vec();
        GfxWriteDescriptorSet::update(ctx, &writes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirrored_write_covers_every_frame() {
        let config = BindlessConfig::default();
        let writes = plan_writes(&config, 3, BindlessKind::SampledImage, 17, FrameSelection::AllFrames).unwrap();
        assert_eq!(writes.iter().map(|w| w.frame).collect_vec(), vec![0, 1, 2]);
        assert!(writes.iter().all(|w| w.binding == 2 && w.array_element == 17));
        assert!(writes.iter().all(|w| w.descriptor_type == vk::DescriptorType::SAMPLED_IMAGE));
    }

    #[test]
    fn test_uniform_write_single_frame() {
        let config = BindlessConfig::default();
        let writes = plan_writes(&config, 2, BindlessKind::UniformBuffer, 0, FrameSelection::Frame(1)).unwrap();
        assert_eq!(
            writes,
            vec![PlannedWrite {
                frame: 1,
                binding: 0,
                array_element: 0,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            }]
        );
    }

    #[test]
    fn test_out_of_range_slot() {
        let config = BindlessConfig::default();
        assert!(matches!(
            plan_writes(&config, 2, BindlessKind::Sampler, 4096, FrameSelection::AllFrames),
            Err(GfxError::BindlessSlotOutOfRange {
                index: 4096,
                capacity: 4096,
                ..
            })
        ));
        assert!(plan_writes(&config, 2, BindlessKind::UniformBuffer, 1, FrameSelection::Frame(0)).is_err());
        assert!(plan_writes(&config, 2, BindlessKind::StorageBuffer, 1, FrameSelection::AllFrames).is_err());
    }

    #[test]
    fn test_out_of_range_frame() {
        let config = BindlessConfig::default();
        assert!(matches!(
            plan_writes(&config, 2, BindlessKind::UniformBuffer, 0, FrameSelection::Frame(2)),
            Err(GfxError::BindlessSlotOutOfRange { kind: "frame", .. })
        ));
    }
}
