use ash::vk;

use crate::{
    error::{GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
    gfx_context::GfxContext,
};

pub struct GfxImageView {
    handle: vk::ImageView,

    desc: GfxImageViewDesc,

    name: String,
}
impl DebugType for GfxImageView {
    fn debug_type_name() -> &'static str {
        "GfxImage2DView"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// new & init
impl GfxImageView {
    pub fn new(ctx: &GfxContext, image: vk::Image, view_desc: GfxImageViewDesc, name: &str) -> GfxResult<Self> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_desc.view_type)
            .format(view_desc.format)
            .subresource_range(view_desc.subresource_range());

        let handle = unsafe { ctx.device().create_image_view(&info, None) }.vk_check("vkCreateImageView")?;
        let image_view = Self {
            handle,
            desc: view_desc,
            name: name.to_string(),
        };
        ctx.device().set_debug_name(&image_view, name);
        Ok(image_view)
    }
}
// destroy
impl GfxImageView {
    pub fn destroy(self, ctx: &GfxContext) {
        unsafe {
            ctx.device().destroy_image_view(self.handle, None);
        }
    }
}
// getters
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &GfxImageViewDesc {
        &self.desc
    }
}
impl std::fmt::Display for GfxImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Image2DView({}, {:?})", self.name, self.handle)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageViewDesc {
    /// format 可以基于 vk::Image 重解释
    format: vk::Format,
    view_type: vk::ImageViewType,
    aspect_mask: vk::ImageAspectFlags,
}
impl GfxImageViewDesc {
    pub fn new_2d(format: vk::Format, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            format,
            view_type: vk::ImageViewType::TYPE_2D,
            aspect_mask: aspect,
        }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        self.aspect_mask
    }

    /// 单个 mip，单个 layer
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_view_range() {
        let desc = GfxImageViewDesc::new_2d(vk::Format::D32_SFLOAT, vk::ImageAspectFlags::DEPTH);
        let range = desc.subresource_range();
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!((range.level_count, range.layer_count), (1, 1));
    }
}
