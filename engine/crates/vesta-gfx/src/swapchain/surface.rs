use ash::vk;

use crate::{
    error::{GfxError, GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
    gfx_context::GfxContext,
};

/// # Destroy
/// 需要在 swapchain 销毁之后手动调用 [`GfxSurface::destroy`]
pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}

impl GfxSurface {
    /// 创建 surface，并检查 gfx queue family 是否可以 present
    pub fn new(
        ctx: &GfxContext,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> GfxResult<Self> {
        let ash_instance = ctx.instance().ash_instance();
        let surface_pf = ash::khr::surface::Instance::new(ctx.vk_entry(), ash_instance);

        let handle = unsafe {
            ash_window::create_surface(ctx.vk_entry(), ash_instance, raw_display_handle, raw_window_handle, None)
        }
        .vk_check("vkCreateSurfaceKHR")?;
        let surface = GfxSurface { handle, pf: surface_pf };

        let queue_family_index = ctx.gfx_queue_family().queue_family_index;
        let supported = unsafe {
            surface.pf.get_physical_device_surface_support(
                ctx.physical_device().vk_handle(),
                queue_family_index,
                surface.handle,
            )
        };
        match supported {
            Ok(true) => {}
            Ok(false) => {
                surface.destroy();
                return Err(GfxError::PresentNotSupported { queue_family_index });
            }
            Err(e) => {
                surface.destroy();
                return Err(e).vk_check("vkGetPhysicalDeviceSurfaceSupportKHR");
            }
        }

        ctx.device().set_debug_name(&surface, "main");
        Ok(surface)
    }

    pub fn destroy(self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

// getters
impl GfxSurface {
    pub fn get_capabilities(&self, ctx: &GfxContext) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.pf.get_physical_device_surface_capabilities(ctx.physical_device().vk_handle(), self.handle) }
            .vk_check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    pub fn get_formats(&self, ctx: &GfxContext) -> GfxResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.pf.get_physical_device_surface_formats(ctx.physical_device().vk_handle(), self.handle) }
            .vk_check("vkGetPhysicalDeviceSurfaceFormatsKHR")
    }

    pub fn get_present_modes(&self, ctx: &GfxContext) -> GfxResult<Vec<vk::PresentModeKHR>> {
        unsafe { self.pf.get_physical_device_surface_present_modes(ctx.physical_device().vk_handle(), self.handle) }
            .vk_check("vkGetPhysicalDeviceSurfacePresentModesKHR")
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
