use ash::vk;
use itertools::Itertools;

use crate::gfx_context::GfxContext;

/// 持有 buffer/image info 内存的 descriptor write
///
/// buffer_infos 与 image_infos 只能有一个非空
#[derive(Clone, Debug)]
pub struct GfxWriteDescriptorSet {
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub descriptor_type: vk::DescriptorType,

    pub buffer_infos: Vec<vk::DescriptorBufferInfo>,
    pub image_infos: Vec<vk::DescriptorImageInfo>,
}
impl GfxWriteDescriptorSet {
    pub fn image(
        dst_set: vk::DescriptorSet,
        dst_binding: u32,
        dst_array_element: u32,
        descriptor_type: vk::DescriptorType,
        image_info: vk::DescriptorImageInfo,
    ) -> Self {
        Self {
            dst_set,
            dst_binding,
            dst_array_element,
            descriptor_type,
            buffer_infos: vec![],
            image_infos: vec![image_info],
        }
    }

    pub fn buffer(
        dst_set: vk::DescriptorSet,
        dst_binding: u32,
        dst_array_element: u32,
        descriptor_type: vk::DescriptorType,
        buffer_info: vk::DescriptorBufferInfo,
    ) -> Self {
        Self {
            dst_set,
            dst_binding,
            dst_array_element,
            descriptor_type,
            buffer_infos: vec![buffer_info],
            image_infos: vec![],
        }
    }

    pub fn to_vk_type(&self) -> vk::WriteDescriptorSet<'_> {
        debug_assert!(
            self.buffer_infos.is_empty() != self.image_infos.is_empty(),
            "exactly one of buffer_infos and image_infos should be set"
        );
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.dst_set)
            .dst_binding(self.dst_binding)
            .dst_array_element(self.dst_array_element)
            .descriptor_type(self.descriptor_type);
        // 选择 buffer ptr 还是 image ptr，是由 descriptor type 控制的
        if self.buffer_infos.is_empty() {
            write.image_info(&self.image_infos)
        } else {
            write.buffer_info(&self.buffer_infos)
        }
    }

    /// vkUpdateDescriptorSets 没有返回值，参数错误只会被 validation layer 报告
    pub fn update(ctx: &GfxContext, writes: &[Self]) {
        if writes.is_empty() {
            return;
        }
        let vk_writes = writes.iter().map(|w| w.to_vk_type()).collect_vec();
        unsafe {
            ctx.device().update_descriptor_sets(&vk_writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_write_count() {
        let write = GfxWriteDescriptorSet::image(
            vk::DescriptorSet::null(),
            2,
            7,
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorImageInfo::default().image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        );
        let vk_write = write.to_vk_type();
        assert_eq!(vk_write.dst_binding, 2);
        assert_eq!(vk_write.dst_array_element, 7);
        assert_eq!(vk_write.descriptor_count, 1);
        assert!(!vk_write.p_image_info.is_null());
    }

    #[test]
    fn test_buffer_write_count() {
        let write = GfxWriteDescriptorSet::buffer(
            vk::DescriptorSet::null(),
            0,
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorBufferInfo::default().range(176),
        );
        let vk_write = write.to_vk_type();
        assert_eq!(vk_write.descriptor_count, 1);
        assert!(!vk_write.p_buffer_info.is_null());
    }
}
