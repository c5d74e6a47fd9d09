use ash::vk;

use crate::{
    error::{GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
    gfx_context::GfxContext,
};

/// 描述符池
///
/// # Destroy
/// 从池中分配的 descriptor set 跟随池一起销毁
pub struct GfxDescriptorPool {
    handle: vk::DescriptorPool,
    name: String,
}
impl DebugType for GfxDescriptorPool {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl GfxDescriptorPool {
    /// # 参数
    /// - max_sets: 最大描述符集数量
    /// - pool_sizes: 每种类型描述符的最大数量
    pub fn new(
        ctx: &GfxContext,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        name: &str,
    ) -> GfxResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        let handle = unsafe { ctx.device().create_descriptor_pool(&create_info, None) }
            .vk_check("vkCreateDescriptorPool")?;
        let pool = Self {
            handle,
            name: name.to_string(),
        };
        ctx.device().set_debug_name(&pool, name);
        Ok(pool)
    }

    /// 使用同一个 layout 分配多个 descriptor set
    pub fn allocate_sets(
        &self,
        ctx: &GfxContext,
        layout: vk::DescriptorSetLayout,
        count: usize,
        debug_name: &str,
    ) -> GfxResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; count];
        let alloc_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(self.handle).set_layouts(&layouts);
        let sets = unsafe { ctx.device().allocate_descriptor_sets(&alloc_info) }.vk_check("vkAllocateDescriptorSets")?;
        for (idx, set) in sets.iter().enumerate() {
            ctx.device().set_object_debug_name(*set, format!("GfxDescriptorSet::{debug_name}-{idx}"));
        }
        Ok(sets)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    pub fn destroy(self, ctx: &GfxContext) {
        log::info!("Destroying GfxDescriptorPool: {}", self.name);
        unsafe { ctx.device().destroy_descriptor_pool(self.handle, None) };
    }
}
