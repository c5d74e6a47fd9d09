use std::time::Instant;

use anyhow::Context;
use ash::vk;
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use vesta_crate_tools::resource::VestaPath;
use vesta_render_interface::{
    gpu_resources::GfxTextureHandle,
    gpu_types::{GpuFrameConst, GpuPushConstant},
    mesh_layout::MeshData,
};
use vesta_renderer::{
    default_resources::Rgba8Pixels,
    material::{Material, MaterialDesc},
    mesh::Mesh,
    renderer::Renderer,
};

/// xy 平面上的单位四边形，朝向 +z
pub fn quad_mesh_data() -> MeshData {
    MeshData {
        positions: vec![
            Vec3::new(-0.5, -0.5, 0.0),
            Vec3::new(0.5, -0.5, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
            Vec3::new(-0.5, 0.5, 0.0),
        ],
        normals: vec![Vec3::Z; 4],
        uvs: vec![Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 0.0)],
        tangents: vec![],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

/// 左下到右上的颜色渐变
pub fn gradient_pixels(size: u32) -> Rgba8Pixels {
    let size = size.max(2);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let u = x * 255 / (size - 1);
            let v = y * 255 / (size - 1);
            pixels.extend_from_slice(&[u as u8, v as u8, 200, 255]);
        }
    }
    Rgba8Pixels {
        width: size,
        height: size,
        pixels,
    }
}

/// 固定位置的相机，看向原点
pub fn frame_const(extent: vk::Extent2D, time: f32) -> GpuFrameConst {
    let eye = Vec3::new(0.0, 0.0, 2.0);
    let dir = (Vec3::ZERO - eye).normalize();
    let aspect = extent.width.max(1) as f32 / extent.height.max(1) as f32;

    GpuFrameConst {
        view: Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y),
        proj: Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 100.0),
        camera_pos: eye.extend(1.0),
        camera_dir: dir.extend(0.0),
        time,
        debug_index: 0.0,
        ..Default::default()
    }
}

/// 一个绕 y 轴旋转的带纹理四边形
pub struct DemoScene {
    mesh: Mesh,
    texture: GfxTextureHandle,
    material: Material,
    start: Instant,
}
impl DemoScene {
    pub fn new(renderer: &mut Renderer) -> anyhow::Result<Self> {
        let pixels = Rgba8Pixels::load_or_else(&VestaPath::assets_path("textures/quad.png"), || gradient_pixels(256));
        let texture = renderer
            .context_mut()
            .create_texture(pixels.width, pixels.height, &pixels.pixels, "quad-base-color")
            .context("create quad texture")?;

        let mesh = match renderer.context_mut().create_mesh(quad_mesh_data(), "quad") {
            Ok(mesh) => mesh,
            Err(e) => {
                renderer.context_mut().destroy_texture(texture)?;
                return Err(e);
            }
        };

        let desc = MaterialDesc {
            vertex_shader: renderer.config().paths.vertex_shader.clone(),
            fragment_shader: renderer.config().paths.fragment_shader.clone(),
            base_color_texture: texture,
            normal_texture: None,
            base_color_mul: Vec3::ONE,
        };
        let material = match renderer.create_material(&desc, "quad") {
            Ok(material) => material,
            Err(e) => {
                renderer.context_mut().destroy_mesh(mesh)?;
                renderer.context_mut().destroy_texture(texture)?;
                return Err(e);
            }
        };

        log::info!(
            "demo scene created: texture slot {}, material block {}",
            texture.index(),
            material.block()
        );
        Ok(Self {
            mesh,
            texture,
            material,
            start: Instant::now(),
        })
    }

    #[inline]
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    pub fn draw(&self, renderer: &mut Renderer) -> anyhow::Result<()> {
        let trs = Mat4::from_quat(Quat::from_rotation_y(self.elapsed_secs()));
        renderer.bind_material(&self.material)?;
        renderer.push_constants(&GpuPushConstant {
            trs,
            material_block_index: self.material.block(),
            mesh: self.mesh.gpu_mesh(),
        })?;
        renderer.bind_mesh(&self.mesh)?;
        renderer.draw_indexed(self.mesh.index_count())?;
        Ok(())
    }

    /// 调用前需要等待 GPU 空闲
    pub fn destroy(self, renderer: &mut Renderer) -> anyhow::Result<()> {
        let Self {
            mesh,
            texture,
            material,
            ..
        } = self;
        renderer.destroy_material(material)?;
        renderer.context_mut().destroy_mesh(mesh)?;
        renderer.context_mut().destroy_texture(texture).context("destroy quad texture")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_mesh_is_valid() {
        let mut data = quad_mesh_data();
        assert!(data.validate().is_ok());
        assert_eq!(data.vertex_count(), 4);
        assert!(data.indices.iter().all(|i| *i < 4));

        data.ensure_tangents();
        assert_eq!(data.tangents.len(), 4);
        for tangent in &data.tangents {
            assert!((tangent.truncate().length() - 1.0).abs() < 1e-4);
            assert!(tangent.w == 1.0 || tangent.w == -1.0);
        }
    }

    #[test]
    fn test_gradient_pixels() {
        let pixels = gradient_pixels(4);
        assert_eq!(pixels.pixels.len(), 4 * 4 * 4);
        assert_eq!(&pixels.pixels[0..4], &[0, 0, 200, 255]);
        let last = pixels.pixels.len() - 4;
        assert_eq!(&pixels.pixels[last..], &[255, 255, 200, 255]);
    }

    #[test]
    fn test_frame_const_camera() {
        let frame = frame_const(
            vk::Extent2D {
                width: 960,
                height: 540,
            },
            1.5,
        );
        assert_eq!(frame.camera_pos, Vec4::new(0.0, 0.0, 2.0, 1.0));
        assert_eq!(frame.camera_dir, Vec4::new(0.0, 0.0, -1.0, 0.0));
        assert_eq!(frame.time, 1.5);

        // 原点在相机前方 2 个单位
        let origin_in_view = frame.view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((origin_in_view.z + 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_frame_const_zero_extent() {
        let frame = frame_const(vk::Extent2D { width: 0, height: 0 }, 0.0);
        assert!(frame.proj.is_finite());
    }
}
