use ash::vk;
use vk_mem::Alloc;

use crate::{
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer},
    error::{GfxError, GfxResult},
    foundation::debug_messenger::DebugType,
    gfx_context::GfxContext,
    resources::buffer::GfxBuffer,
};

/// 每个像素需要的字节数，不支持的格式返回 None
///
/// 根据 vulkan specification 中 format 的顺序，按区间判断
pub fn pixel_size_in_bytes(format: vk::Format) -> Option<usize> {
    const BYTE_1_FORMAT: [(vk::Format, vk::Format); 1] = [(vk::Format::R8_UNORM, vk::Format::R8G8_UNORM)];
    const BYTE_3_FORMAT: [(vk::Format, vk::Format); 1] = [(vk::Format::R8G8B8_UNORM, vk::Format::R8G8B8A8_UNORM)];
    const BYTE_4_FORMAT: [(vk::Format, vk::Format); 2] = [
        (vk::Format::R8G8B8A8_UNORM, vk::Format::A2R10G10B10_UNORM_PACK32),
        (vk::Format::R32_UINT, vk::Format::R32G32_UINT),
    ];
    const BYTE_8_FORMAT: [(vk::Format, vk::Format); 1] =
        [(vk::Format::R16G16B16A16_UNORM, vk::Format::R32_UINT)];
    const BYTE_16_FORMAT: [(vk::Format, vk::Format); 1] =
        [(vk::Format::R32G32B32A32_UINT, vk::Format::R64_UINT)];

    let is_in_format_region = |format: vk::Format, regions: &[(vk::Format, vk::Format)]| {
        let n = format.as_raw();
        regions.iter().any(|(begin, end)| begin.as_raw() <= n && n < end.as_raw())
    };

    match format {
        f if is_in_format_region(f, &BYTE_1_FORMAT) => Some(1),
        f if is_in_format_region(f, &BYTE_3_FORMAT) => Some(3),
        f if is_in_format_region(f, &BYTE_4_FORMAT) => Some(4),
        f if is_in_format_region(f, &BYTE_8_FORMAT) => Some(8),
        f if is_in_format_region(f, &BYTE_16_FORMAT) => Some(16),
        _ => None,
    }
}

/// 由 vma 分配的 image
///
/// # Destroy
/// 需要手动调用 [`GfxImage::destroy`]
pub struct GfxImage {
    handle: vk::Image,
    allocation: vk_mem::Allocation,

    extent: vk::Extent3D,
    format: vk::Format,

    name: String,
}
// getter
impl GfxImage {
    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}
// new & init
impl GfxImage {
    pub fn new(
        ctx: &GfxContext,
        image_info: &GfxImageCreateInfo,
        alloc_info: &vk_mem::AllocationCreateInfo,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let (image, alloc) = unsafe { ctx.allocator().create_image(&image_info.as_info(), alloc_info) }.map_err(
            |result| GfxError::VmaAlloc {
                name: debug_name.to_string(),
                result,
            },
        )?;
        let image = Self {
            handle: image,
            allocation: alloc,
            extent: image_info.inner.extent,
            format: image_info.inner.format,

            name: debug_name.to_string(),
        };
        ctx.device().set_debug_name(&image, debug_name);
        Ok(image)
    }

    /// 根据 RGBA8_UNORM 的 data 创建 image，上传完成后处于 SHADER_READ_ONLY_OPTIMAL
    pub fn from_rgba8(ctx: &GfxContext, width: u32, height: u32, data: &[u8], name: &str) -> GfxResult<Self> {
        let image_create_info = GfxImageCreateInfo::new_image_2d_info(
            vk::Extent2D { width, height },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        );
        let image = Self::new(
            ctx,
            &image_create_info,
            &vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            name,
        )?;

        if let Err(e) = image.upload(ctx, data) {
            image.destroy(ctx);
            return Err(e);
        }
        Ok(image)
    }

    /// 深度附件
    pub fn new_depth(ctx: &GfxContext, extent: vk::Extent2D, format: vk::Format, name: &str) -> GfxResult<Self> {
        let image_create_info =
            GfxImageCreateInfo::new_image_2d_info(extent, format, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        Self::new(
            ctx,
            &image_create_info,
            &vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            name,
        )
    }
}
impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage2D"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// destroy
impl GfxImage {
    pub fn destroy(mut self, ctx: &GfxContext) {
        log::debug!("Destroying GfxImage: {}", self.name);
        unsafe { ctx.allocator().destroy_image(self.handle, &mut self.allocation) }
    }
}
// tools
impl GfxImage {
    /// 同步上传像素数据
    ///
    /// # 实现步骤
    /// 1. 创建一个 staging buffer，用于存放待复制的数据
    /// 2. 进行图像布局转换，将 staging buffer 的数据复制到图像
    /// 3. 转换为 fragment shader 可读的布局
    pub fn upload(&self, ctx: &GfxContext, data: &[u8]) -> GfxResult<()> {
        let expected_len = pixel_size_in_bytes(self.format).unwrap_or(0) * (self.width() * self.height()) as usize;
        if data.len() != expected_len {
            return Err(GfxError::BufferOverflow {
                name: self.name.clone(),
                offset: 0,
                len: data.len() as u64,
                size: expected_len as u64,
            });
        }

        let stage_buffer = GfxBuffer::new_stage_buffer(ctx, data.len() as vk::DeviceSize, "image-stage-buffer")?;
        let stage_buffer = scopeguard::guard(stage_buffer, |buffer| buffer.destroy(ctx));
        stage_buffer.write_bytes(ctx, 0, data)?;

        ctx.one_time_exec(
            |cmd| {
                self.record_copy_from_buffer(cmd, stage_buffer.vk_buffer());
                Ok(())
            },
            &format!("{}-upload", self.name),
        )
    }

    fn record_copy_from_buffer(&self, command_buffer: &GfxCommandBuffer, src: vk::Buffer) {
        let image_barrier = GfxImageBarrier::new()
            .image(self.handle)
            .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
            .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .image_aspect_flag(vk::ImageAspectFlags::COLOR);
        command_buffer.image_memory_barrier(vk::DependencyFlags::empty(), std::slice::from_ref(&image_barrier));

        let buffer_image_copy = vk::BufferImageCopy2::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(self.extent)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            });
        command_buffer.cmd_copy_buffer_to_image(
            &vk::CopyBufferToImageInfo2::default()
                .src_buffer(src)
                .dst_image(self.handle)
                .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .regions(std::slice::from_ref(&buffer_image_copy)),
        );

        let image_barrier = GfxImageBarrier::new()
            .image(self.handle)
            .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
            .dst_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::SHADER_READ)
            .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_aspect_flag(vk::ImageAspectFlags::COLOR);
        command_buffer.image_memory_barrier(vk::DependencyFlags::empty(), std::slice::from_ref(&image_barrier));
    }
}

pub struct GfxImageCreateInfo {
    inner: vk::ImageCreateInfo<'static>,
}
impl GfxImageCreateInfo {
    #[inline]
    pub fn new_image_2d_info(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            inner: vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                format,
                extent: extent.into(),
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                // 这里只能是 UNDEFINED 或者 PREINITIALIZED
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            },
        }
    }

    #[inline]
    pub fn as_info(&self) -> vk::ImageCreateInfo<'static> {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_size() {
        assert_eq!(pixel_size_in_bytes(vk::Format::R8G8B8A8_UNORM), Some(4));
        assert_eq!(pixel_size_in_bytes(vk::Format::R8G8B8A8_SRGB), Some(4));
        assert_eq!(pixel_size_in_bytes(vk::Format::B8G8R8A8_SRGB), Some(4));
        assert_eq!(pixel_size_in_bytes(vk::Format::R8_UNORM), Some(1));
        assert_eq!(pixel_size_in_bytes(vk::Format::R16G16B16A16_SFLOAT), Some(8));
        assert_eq!(pixel_size_in_bytes(vk::Format::R32G32B32A32_SFLOAT), Some(16));
        assert_eq!(pixel_size_in_bytes(vk::Format::D32_SFLOAT), None);
    }

    #[test]
    fn test_image_2d_info() {
        let info = GfxImageCreateInfo::new_image_2d_info(
            vk::Extent2D { width: 4, height: 2 },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        )
        .as_info();
        assert_eq!(info.extent.depth, 1);
        assert_eq!((info.mip_levels, info.array_layers), (1, 1));
        assert_eq!(info.initial_layout, vk::ImageLayout::UNDEFINED);
    }
}
