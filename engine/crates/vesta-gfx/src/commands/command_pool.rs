use ash::vk;

use crate::{
    commands::{command_buffer::GfxCommandBuffer, command_queue::GfxQueueFamily},
    error::{GfxResult, VkCheck},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    gfx_context::GfxContext,
};

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
pub struct GfxCommandPool {
    handle: vk::CommandPool,
    _queue_family: GfxQueueFamily,

    debug_name: String,
    valid: bool,
}
// init & destory
impl GfxCommandPool {
    #[inline]
    pub fn new(
        ctx: &GfxContext,
        queue_family: GfxQueueFamily,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        Self::new_internal(ctx.device(), queue_family, flags, debug_name)
    }

    /// GfxContext 初始化过程中使用，此时只有 device
    pub(crate) fn new_internal(
        gfx_device: &GfxDevice,
        queue_family: GfxQueueFamily,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let pool = unsafe {
            gfx_device.create_command_pool(
                &vk::CommandPoolCreateInfo::default().queue_family_index(queue_family.queue_family_index).flags(flags),
                None,
            )
        }
        .vk_check("vkCreateCommandPool")?;

        let command_pool = Self {
            handle: pool,
            _queue_family: queue_family,
            debug_name: debug_name.to_string(),
            valid: true,
        };
        gfx_device.set_debug_name(&command_pool, debug_name);
        Ok(command_pool)
    }

    #[inline]
    pub fn destroy(self, ctx: &GfxContext) {
        self.destroy_internal(ctx.device())
    }

    pub(crate) fn destroy_internal(mut self, gfx_device: &GfxDevice) {
        unsafe {
            gfx_device.destroy_command_pool(self.handle, None);
        }
        self.valid = false;
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }
}
// tools
impl GfxCommandPool {
    /// 释放 command buffer
    ///
    /// 释放之后，command buffer 不能再被使用
    pub fn free_command_buffers(&self, command_buffers: &[GfxCommandBuffer]) {
        let command_buffer_handles: Vec<vk::CommandBuffer> =
            command_buffers.iter().map(|cmd| cmd.vk_handle()).collect();
        if let Some(cmd) = command_buffers.first() {
            unsafe {
                cmd.device().free_command_buffers(self.handle, &command_buffer_handles);
            }
        }
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        debug_assert!(!self.valid, "CommandPool must be destroyed manually.");
        log::info!("Dropping CommandPool: {}", self.debug_name);
    }
}
