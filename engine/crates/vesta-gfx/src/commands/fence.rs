use ash::vk;

use crate::{
    error::{GfxError, GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
    gfx_context::GfxContext,
};

/// # Destroy
/// 不实现 Drop，因为可以 Clone，需要手动 destroy
#[derive(Clone)]
pub struct GfxFence {
    fence: vk::Fence,
    name: String,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(ctx: &GfxContext, signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { ctx.device().create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None) }
            .vk_check("vkCreateFence")?;

        let fence = Self {
            fence,
            name: debug_name.to_string(),
        };
        ctx.device().set_debug_name(&fence, debug_name);
        Ok(fence)
    }

    #[inline]
    pub fn destroy(self, ctx: &GfxContext) {
        unsafe {
            ctx.device().destroy_fence(self.fence, None);
        }
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence，超时视为致命错误
    pub fn wait(&self, ctx: &GfxContext, timeout_ms: u64) -> GfxResult<()> {
        let timeout_ns = timeout_ms.saturating_mul(1_000_000);
        match unsafe { ctx.device().wait_for_fences(std::slice::from_ref(&self.fence), true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(GfxError::FenceTimeout {
                name: self.name.clone(),
                timeout_ms,
            }),
            Err(e) => Err(e).vk_check("vkWaitForFences"),
        }
    }

    #[inline]
    pub fn reset(&self, ctx: &GfxContext) -> GfxResult<()> {
        unsafe { ctx.device().reset_fences(std::slice::from_ref(&self.fence)) }.vk_check("vkResetFences")
    }
}
