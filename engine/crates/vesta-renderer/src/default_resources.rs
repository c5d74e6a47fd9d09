use std::path::Path;

use vesta_gfx::sampler::GfxSamplerDesc;
use vesta_render_interface::gpu_resources::{GfxSamplerHandle, GfxTextureHandle};

/// 解码后的 RGBA8 像素
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rgba8Pixels {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}
impl Rgba8Pixels {
    /// 品红与黑色交替的棋盘格，每格 `cell` 像素
    pub fn checkerboard(size: u32, cell: u32) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let magenta = ((x / cell) + (y / cell)) % 2 == 0;
                pixels.extend_from_slice(if magenta { &[255, 0, 255, 255] } else { &[0, 0, 0, 255] });
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// 切线空间中指向 +Z 的法线
    pub fn flat_normal(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            pixels: [128u8, 128, 255, 255].repeat((size * size) as usize),
        }
    }

    /// 文件存在时读取文件，否则使用 `fallback` 生成
    pub fn load_or_else(path: &Path, fallback: impl FnOnce() -> Self) -> Self {
        if !path.exists() {
            log::info!("texture {} not found, use generated pixels", path.display());
            return fallback();
        }
        match image::open(path) {
            Ok(img) => {
                let img = img.into_rgba8();
                let (width, height) = img.dimensions();
                Self {
                    width,
                    height,
                    pixels: img.into_raw(),
                }
            }
            Err(e) => {
                log::warn!("failed to decode texture {}: {}, use generated pixels", path.display(), e);
                fallback()
            }
        }
    }
}

/// 默认 sampler：线性过滤，REPEAT，各向异性取设备上限
pub fn default_sampler_desc(max_anisotropy: f32) -> GfxSamplerDesc {
    GfxSamplerDesc {
        max_anisotropy,
        ..Default::default()
    }
}

/// 渲染器自带的默认资源，释放后的 bindless 槽位会指向它们
#[derive(Clone, Copy, Debug)]
pub struct DefaultResources {
    pub error_texture: GfxTextureHandle,
    pub debug_normal_texture: GfxTextureHandle,
    pub sampler: GfxSamplerHandle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_checkerboard() {
        let tex = Rgba8Pixels::checkerboard(4, 2);
        assert_eq!(tex.pixels.len(), 4 * 4 * 4);
        let pixel = |x: usize, y: usize| &tex.pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(pixel(0, 0), &[255, 0, 255, 255]);
        assert_eq!(pixel(1, 1), &[255, 0, 255, 255]);
        assert_eq!(pixel(2, 0), &[0, 0, 0, 255]);
        assert_eq!(pixel(2, 2), &[255, 0, 255, 255]);
    }

    #[test]
    fn test_flat_normal() {
        let tex = Rgba8Pixels::flat_normal(2);
        assert_eq!(tex.pixels, [128, 128, 255, 255].repeat(4));
    }

    #[test]
    fn test_missing_file_uses_fallback() {
        let path = std::env::temp_dir().join("vesta-missing-texture.png");
        let tex = Rgba8Pixels::load_or_else(&path, || Rgba8Pixels::flat_normal(1));
        assert_eq!(tex, Rgba8Pixels::flat_normal(1));
    }

    #[test]
    fn test_load_png() {
        let path = std::env::temp_dir().join(format!("vesta-texture-{}.png", std::process::id()));
        image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4])).save(&path).unwrap();
        let tex = Rgba8Pixels::load_or_else(&path, || Rgba8Pixels::checkerboard(1, 1));
        std::fs::remove_file(&path).unwrap();
        assert_eq!((tex.width, tex.height), (3, 2));
        assert_eq!(&tex.pixels[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_default_sampler_desc() {
        let desc = default_sampler_desc(16.0);
        assert_eq!(desc.min_filter, vk::Filter::LINEAR);
        assert_eq!(desc.mag_filter, vk::Filter::LINEAR);
        assert_eq!(desc.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(desc.address_mode_w, vk::SamplerAddressMode::REPEAT);
        assert_eq!(desc.border_color, vk::BorderColor::INT_OPAQUE_BLACK);
        assert_eq!(desc.compare_op, None);
        assert_eq!(desc.max_anisotropy, 16.0);
    }
}
