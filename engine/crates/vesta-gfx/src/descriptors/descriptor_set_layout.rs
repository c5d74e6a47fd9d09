use ash::vk;

use crate::{
    error::{GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
    gfx_context::GfxContext,
};

/// 描述符集布局
///
/// bindings 与 binding_flags 一一对应
pub struct GfxDescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
}
impl GfxDescriptorSetLayout {
    pub fn new(
        ctx: &GfxContext,
        flags: vk::DescriptorSetLayoutCreateFlags,
        bindings: &[vk::DescriptorSetLayoutBinding],
        binding_flags: &[vk::DescriptorBindingFlags],
        debug_name: &str,
    ) -> GfxResult<Self> {
        debug_assert_eq!(bindings.len(), binding_flags.len());
        let mut bind_flags_ci = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(binding_flags);
        let create_info =
            vk::DescriptorSetLayoutCreateInfo::default().flags(flags).bindings(bindings).push_next(&mut bind_flags_ci);

        let layout = unsafe { ctx.device().create_descriptor_set_layout(&create_info, None) }
            .vk_check("vkCreateDescriptorSetLayout")?;
        let layout = Self { layout };
        ctx.device().set_debug_name(&layout, debug_name);
        Ok(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn destroy(self, ctx: &GfxContext) {
        unsafe {
            ctx.device().destroy_descriptor_set_layout(self.layout, None);
        }
    }
}
impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.layout
    }
}
