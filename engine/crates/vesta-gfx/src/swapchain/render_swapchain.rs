use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{command_queue::GfxQueue, semaphore::GfxSemaphore},
    error::{GfxError, GfxResult, VkCheck},
    gfx_context::GfxContext,
    resources::image_view::{GfxImageView, GfxImageViewDesc},
    swapchain::surface::GfxSurface,
};

/// acquire 与 present 的结果
///
/// `OutOfDate` 与 `Suboptimal` 需要外部重建 swapchain，不属于致命错误
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}
impl SwapchainStatus {
    #[inline]
    pub fn need_recreate(self) -> bool {
        self != SwapchainStatus::Optimal
    }
}

pub struct GfxRenderSwapchain {
    surface: GfxSurface,
    swapchain_handle: vk::SwapchainKHR,

    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<GfxImageView>,
    swapchain_image_index: u32,

    color_format: vk::Format,
    swapchain_extent: vk::Extent2D,
}

// new & init
impl GfxRenderSwapchain {
    /// 接管 surface 的所有权
    pub fn new(
        ctx: &GfxContext,
        surface: GfxSurface,
        preferred_present_mode: vk::PresentModeKHR,
        window_physical_extent: vk::Extent2D,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxRenderSwapchain::new");

        let queried = surface.get_capabilities(ctx).and_then(|caps| {
            let formats = surface.get_formats(ctx)?;
            let present_modes = surface.get_present_modes(ctx)?;
            Ok((caps, formats, present_modes))
        });
        let (surface_capabilities, formats, present_modes) = match queried {
            Ok(queried) => queried,
            Err(e) => {
                surface.destroy();
                return Err(e);
            }
        };
        let surface_format = Self::choose_surface_format(&formats);
        let present_mode = Self::choose_present_mode(&present_modes, preferred_present_mode);

        // 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
        let extent = Self::calculate_swapchain_extent(&surface_capabilities, window_physical_extent);
        log::info!(
            "create swapchain: window {}x{}, final extent {}x{}, format {:?}, present mode {:?}",
            window_physical_extent.width,
            window_physical_extent.height,
            extent.width,
            extent.height,
            surface_format.format,
            present_mode
        );

        let swapchain_handle =
            match Self::create_swapchain(ctx, &surface, &surface_capabilities, surface_format, extent, present_mode) {
                Ok(handle) => handle,
                Err(e) => {
                    surface.destroy();
                    return Err(e);
                }
            };
        let images = match unsafe { ctx.device().swapchain().get_swapchain_images(swapchain_handle) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { ctx.device().swapchain().destroy_swapchain(swapchain_handle, None) };
                surface.destroy();
                return Err(e).vk_check("vkGetSwapchainImagesKHR");
            }
        };

        let mut swapchain = Self {
            surface,
            swapchain_handle,
            swapchain_images: images,
            swapchain_image_views: Vec::new(),
            swapchain_image_index: 0,
            swapchain_extent: extent,
            color_format: surface_format.format,
        };
        for (idx, image) in swapchain.swapchain_images.clone().into_iter().enumerate() {
            let view_desc = GfxImageViewDesc::new_2d(surface_format.format, vk::ImageAspectFlags::COLOR);
            match GfxImageView::new(ctx, image, view_desc, &format!("swapchain-{idx}")) {
                Ok(view) => swapchain.swapchain_image_views.push(view),
                Err(e) => {
                    swapchain.destroy(ctx);
                    return Err(e);
                }
            }
        }
        Ok(swapchain)
    }

    fn create_swapchain(
        ctx: &GfxContext,
        surface: &GfxSurface,
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        extent: vk::Extent2D,
        present_mode: vk::PresentModeKHR,
    ) -> GfxResult<vk::SwapchainKHR> {
        let image_count = Self::calculate_image_count(surface_capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true);

        let swapchain_handle = unsafe { ctx.device().swapchain().create_swapchain(&create_info, None) }
            .vk_check("vkCreateSwapchainKHR")?;
        ctx.device().set_object_debug_name(swapchain_handle, "main");
        Ok(swapchain_handle)
    }
}

// getters
impl GfxRenderSwapchain {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.swapchain_images.len()
    }

    #[inline]
    pub fn current_image_index(&self) -> u32 {
        self.swapchain_image_index
    }

    #[inline]
    pub fn current_image(&self) -> vk::Image {
        self.swapchain_images[self.swapchain_image_index as usize]
    }

    #[inline]
    pub fn current_image_view(&self) -> vk::ImageView {
        self.swapchain_image_views[self.swapchain_image_index as usize].handle()
    }
}

// tools
impl GfxRenderSwapchain {
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == u32::MAX || surface_extent.height == u32::MAX {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    /// max_image_count == 0，表示不限制 image 数量
    fn calculate_image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        if surface_capabilities.max_image_count == 0 {
            surface_capabilities.min_image_count + 1
        } else {
            u32::min(surface_capabilities.max_image_count, surface_capabilities.min_image_count + 1)
        }
    }

    /// 优先 B8G8R8A8_SRGB + SRGB_NONLINEAR，否则使用第一个
    fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
        formats
            .iter()
            .copied()
            .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .or_else(|| formats.first().copied())
            .unwrap_or(vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            })
    }

    /// FIFO 一定被支持，作为回退
    fn choose_present_mode(modes: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
        if modes.contains(&preferred) {
            preferred
        } else {
            log::warn!("present mode {:?} is not supported, fall back to FIFO", preferred);
            vk::PresentModeKHR::FIFO
        }
    }
}

// update
impl GfxRenderSwapchain {
    /// 获取下一张 image，等待时间以 timeout_ms 为上限
    ///
    /// `OutOfDate` 时 image index 不更新，semaphore 也不会被 signal
    pub fn acquire_next_image(
        &mut self,
        ctx: &GfxContext,
        semaphore: &GfxSemaphore,
        timeout_ms: u64,
    ) -> GfxResult<SwapchainStatus> {
        let result = unsafe {
            ctx.device().swapchain().acquire_next_image(
                self.swapchain_handle,
                timeout_ms.saturating_mul(1_000_000),
                semaphore.handle(),
                vk::Fence::null(),
            )
        };

        match classify_acquire_result(result, timeout_ms)? {
            (Some(image_index), status) => {
                if status == SwapchainStatus::Suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                self.swapchain_image_index = image_index;
                Ok(status)
            }
            (None, status) => {
                log::warn!("swapchain is out of date when acquire next image");
                Ok(status)
            }
        }
    }

    pub fn present_image(&self, queue: &GfxQueue, wait_semaphores: &[GfxSemaphore]) -> GfxResult<SwapchainStatus> {
        let wait_semaphores = wait_semaphores.iter().map(|s| s.handle()).collect_vec();
        let image_indices = [self.swapchain_image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        let result = unsafe { queue.device.swapchain().queue_present(queue.handle(), &present_info) };
        let status = classify_present_result(result)?;
        match status {
            SwapchainStatus::Suboptimal => {
                log::warn!("swapchain present image index {} is not optimal", self.swapchain_image_index)
            }
            SwapchainStatus::OutOfDate => log::warn!("swapchain is out of date when present image"),
            SwapchainStatus::Optimal => {}
        }
        Ok(status)
    }
}

/// 区分需要重建的情况与致命错误
fn classify_acquire_result(
    result: Result<(u32, bool), vk::Result>,
    timeout_ms: u64,
) -> GfxResult<(Option<u32>, SwapchainStatus)> {
    match result {
        Ok((image_index, false)) => Ok((Some(image_index), SwapchainStatus::Optimal)),
        Ok((image_index, true)) => Ok((Some(image_index), SwapchainStatus::Suboptimal)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((None, SwapchainStatus::OutOfDate)),
        Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(GfxError::FenceTimeout {
            name: "swapchain-acquire".to_string(),
            timeout_ms,
        }),
        Err(e) => Err(e).vk_check("vkAcquireNextImageKHR"),
    }
}

fn classify_present_result(result: Result<bool, vk::Result>) -> GfxResult<SwapchainStatus> {
    match result {
        Ok(false) => Ok(SwapchainStatus::Optimal),
        Ok(true) => Ok(SwapchainStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
        Err(e) => Err(e).vk_check("vkQueuePresentKHR"),
    }
}

// destroy
impl GfxRenderSwapchain {
    /// 同时销毁 image view 和 surface
    pub fn destroy(self, ctx: &GfxContext) {
        log::info!("destroying swapchain");
        self.swapchain_image_views.into_iter().for_each(|view| view.destroy(ctx));
        unsafe {
            ctx.device().swapchain().destroy_swapchain(self.swapchain_handle, None);
        }
        self.surface.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_follows_surface() {
        let caps = capabilities(vk::Extent2D {
            width: 800,
            height: 600,
        });
        let extent = GfxRenderSwapchain::calculate_swapchain_extent(
            &caps,
            vk::Extent2D {
                width: 960,
                height: 540,
            },
        );
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_clamped_to_window() {
        let caps = capabilities(vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        });
        let extent = GfxRenderSwapchain::calculate_swapchain_extent(
            &caps,
            vk::Extent2D {
                width: 10000,
                height: 540,
            },
        );
        assert_eq!((extent.width, extent.height), (4096, 540));
    }

    #[test]
    fn test_image_count() {
        let mut caps = capabilities(vk::Extent2D::default());
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&caps), 2);
    }

    #[test]
    fn test_present_mode_fallback() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            GfxRenderSwapchain::choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            GfxRenderSwapchain::choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_surface_format_preference() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(GfxRenderSwapchain::choose_surface_format(&[unorm, srgb]), srgb);
        assert_eq!(GfxRenderSwapchain::choose_surface_format(&[unorm]), unorm);
    }

    #[test]
    fn test_acquire_classification() {
        assert_eq!(classify_acquire_result(Ok((2, false)), 10).unwrap(), (Some(2), SwapchainStatus::Optimal));
        assert_eq!(classify_acquire_result(Ok((1, true)), 10).unwrap(), (Some(1), SwapchainStatus::Suboptimal));
        assert_eq!(
            classify_acquire_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), 10).unwrap(),
            (None, SwapchainStatus::OutOfDate)
        );
        assert!(matches!(
            classify_acquire_result(Err(vk::Result::TIMEOUT), 10),
            Err(GfxError::FenceTimeout { timeout_ms: 10, .. })
        ));
        let err = classify_acquire_result(Err(vk::Result::ERROR_DEVICE_LOST), 10).unwrap_err();
        assert!(err.is_device_lost());
    }

    #[test]
    fn test_present_classification() {
        assert_eq!(classify_present_result(Ok(false)).unwrap(), SwapchainStatus::Optimal);
        assert_eq!(classify_present_result(Ok(true)).unwrap(), SwapchainStatus::Suboptimal);
        assert_eq!(
            classify_present_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            SwapchainStatus::OutOfDate
        );
        assert!(classify_present_result(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
        assert!(SwapchainStatus::OutOfDate.need_recreate());
        assert!(!SwapchainStatus::Optimal.need_recreate());
    }
}
