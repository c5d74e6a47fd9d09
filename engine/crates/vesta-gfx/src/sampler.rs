use ash::vk;
use vesta_utils::PoolObject;

use crate::{
    error::{GfxResult, VkCheck},
    gfx_context::GfxContext,
};

/// Sampler descriptor
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct GfxSamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    /// 为 0 时关闭各向异性过滤
    pub max_anisotropy: f32,
    pub compare_op: Option<vk::CompareOp>,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub border_color: vk::BorderColor,
}
impl Default for GfxSamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: 0.0,
            compare_op: None,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        }
    }
}
impl GfxSamplerDesc {
    fn create_info(&self) -> vk::SamplerCreateInfo<'static> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .address_mode_u(self.address_mode_u)
            .address_mode_v(self.address_mode_v)
            .address_mode_w(self.address_mode_w)
            .mipmap_mode(self.mipmap_mode)
            .min_lod(0.0)
            .max_lod(0.0)
            .mip_lod_bias(0.0)
            .unnormalized_coordinates(false)
            .border_color(self.border_color)
            .anisotropy_enable(self.max_anisotropy > 0.0)
            .max_anisotropy(self.max_anisotropy);

        match self.compare_op {
            Some(op) => create_info.compare_enable(true).compare_op(op),
            None => create_info.compare_enable(false).compare_op(vk::CompareOp::ALWAYS),
        }
    }
}

/// # Destroy
/// 需要手动调用 [`GfxSampler::destroy`]
pub struct GfxSampler {
    handle: vk::Sampler,
    name: String,
}
// new & init
impl GfxSampler {
    pub fn new(ctx: &GfxContext, desc: &GfxSamplerDesc, name: &str) -> GfxResult<Self> {
        let sampler = unsafe { ctx.device().create_sampler(&desc.create_info(), None) }.vk_check("vkCreateSampler")?;
        ctx.device().set_object_debug_name(sampler, format!("GfxSampler::{name}"));

        Ok(Self {
            handle: sampler,
            name: name.to_string(),
        })
    }

    pub fn destroy(self, ctx: &GfxContext) {
        log::debug!("Destroying sampler: {}", self.name);
        unsafe {
            ctx.device().destroy_sampler(self.handle, None);
        }
    }
}
impl PoolObject for GfxSampler {
    type Context = GfxContext;

    fn uninit(self, ctx: &GfxContext) {
        self.destroy(ctx);
    }
}
// getters
impl GfxSampler {
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anisotropy_switch() {
        let info = GfxSamplerDesc::default().create_info();
        assert_eq!(info.anisotropy_enable, vk::FALSE);

        let desc = GfxSamplerDesc {
            max_anisotropy: 16.0,
            ..Default::default()
        };
        let info = desc.create_info();
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 16.0);
    }

    #[test]
    fn test_compare_disabled_by_default() {
        let info = GfxSamplerDesc::default().create_info();
        assert_eq!(info.compare_enable, vk::FALSE);
        assert_eq!(info.compare_op, vk::CompareOp::ALWAYS);
        assert_eq!(info.border_color, vk::BorderColor::INT_OPAQUE_BLACK);
    }
}
