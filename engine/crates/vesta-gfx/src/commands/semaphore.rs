use ash::vk;

use crate::{
    error::{GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
    gfx_context::GfxContext,
};

/// binary semaphore
///
/// # Destroy
/// 不实现 Drop，因为可以 Clone，需要手动 destroy
#[derive(Clone)]
pub struct GfxSemaphore {
    semaphore: vk::Semaphore,
}

impl DebugType for GfxSemaphore {
    fn debug_type_name() -> &'static str {
        "GfxSemaphore"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.semaphore
    }
}

// 创建与销毁
impl GfxSemaphore {
    pub fn new(ctx: &GfxContext, debug_name: &str) -> GfxResult<Self> {
        let semaphore = unsafe { ctx.device().create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .vk_check("vkCreateSemaphore")?;

        let semaphore = Self { semaphore };
        ctx.device().set_debug_name(&semaphore, debug_name);
        Ok(semaphore)
    }

    #[inline]
    pub fn destroy(self, ctx: &GfxContext) {
        unsafe {
            ctx.device().destroy_semaphore(self.semaphore, None);
        }
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}
