use ash::vk;
use vesta_utils::PoolObject;

use crate::{
    error::GfxResult,
    gfx_context::GfxContext,
    resources::{
        image::GfxImage,
        image_view::{GfxImageView, GfxImageViewDesc},
    },
};

/// 可采样的 2D 纹理：image 与对应的 view
///
/// # Destroy
/// 需要手动调用 [`GfxTexture::destroy`]，先销毁 view 再销毁 image
pub struct GfxTexture {
    image: GfxImage,
    image_view: GfxImageView,
    name: String,
}
impl GfxTexture {
    pub fn new(ctx: &GfxContext, image: GfxImage, name: &str) -> GfxResult<Self> {
        let view_desc = GfxImageViewDesc::new_2d(image.format(), vk::ImageAspectFlags::COLOR);
        let image_view = match GfxImageView::new(ctx, image.handle(), view_desc, &format!("{name}-view")) {
            Ok(view) => view,
            Err(e) => {
                image.destroy(ctx);
                return Err(e);
            }
        };
        Ok(Self {
            image,
            image_view,
            name: name.to_string(),
        })
    }

    /// 由 RGBA8 像素数据直接创建
    pub fn from_rgba8(ctx: &GfxContext, width: u32, height: u32, pixels: &[u8], name: &str) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxTexture::from_rgba8");
        let image = GfxImage::from_rgba8(ctx, width, height, pixels, name)?;
        Self::new(ctx, image, name)
    }

    pub fn destroy(self, ctx: &GfxContext) {
        log::debug!("Destroying texture: {}", self.name);
        self.image_view.destroy(ctx);
        self.image.destroy(ctx);
    }
}
impl PoolObject for GfxTexture {
    type Context = GfxContext;

    fn uninit(self, ctx: &GfxContext) {
        self.destroy(ctx);
    }
}
// getters
impl GfxTexture {
    #[inline]
    pub fn image(&self) -> &GfxImage {
        &self.image
    }

    #[inline]
    pub fn image_view(&self) -> &GfxImageView {
        &self.image_view
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
