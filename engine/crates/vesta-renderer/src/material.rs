use std::path::PathBuf;

use anyhow::Context;
use ash::vk;
use glam::Vec3;
use vesta_gfx::pipelines::graphics_pipeline::{GfxGraphicsPipeline, GfxGraphicsPipelineCreateInfo};
use vesta_render_interface::{gpu_resources::GfxTextureHandle, gpu_types::GpuPbrMaterialData};

use crate::{
    render_context::RenderContext,
    renderer::Renderer,
    renderer_config::PathsConfig,
};

/// 创建材质所需的参数
#[derive(Clone, Debug)]
pub struct MaterialDesc {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub base_color_texture: GfxTextureHandle,
    /// 为空时使用默认的法线贴图
    pub normal_texture: Option<GfxTextureHandle>,
    pub base_color_mul: Vec3,
}

/// 一个 graphics pipeline 加上材质池中的一个数据块
///
/// 材质持有所引用纹理的一份引用计数
///
/// # Destroy
/// 需要手动调用 [`Renderer::destroy_material`]
pub struct Material {
    pipeline: GfxGraphicsPipeline,
    block: u32,
    base_color_texture: GfxTextureHandle,
    normal_texture: GfxTextureHandle,
    name: String,
}
impl Material {
    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    /// 材质数据在材质池中的块编号
    #[inline]
    pub fn block(&self) -> u32 {
        self.block
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn create_pipeline(ctx: &RenderContext, desc: &MaterialDesc, name: &str) -> anyhow::Result<GfxGraphicsPipeline> {
    let color_format = ctx.swapchain()?.color_format();
    let depth_format = ctx.depth()?.image.format();

    let mut create_info = GfxGraphicsPipelineCreateInfo::default();
    create_info
        .vertex_shader_stage(PathsConfig::resolve(&desc.vertex_shader))
        .fragment_shader_stage(PathsConfig::resolve(&desc.fragment_shader))
        .attach_info(vec![color_format], Some(depth_format));

    GfxGraphicsPipeline::new(
        &ctx.gfx,
        &create_info,
        ctx.pipeline_layout()?,
        ctx.pipeline_cache()?.handle(),
        name,
    )
    .with_context(|| format!("create pipeline of material <{}>", name))
}

impl Renderer {
    pub fn create_material(&mut self, desc: &MaterialDesc, name: &str) -> anyhow::Result<Material> {
        let _span = tracy_client::span!("Renderer::create_material");

        anyhow::ensure!(
            self.live_pipelines < self.config.shader_count,
            "too many pipelines: {} alive, limit {}",
            self.live_pipelines,
            self.config.shader_count
        );

        let normal_texture = match desc.normal_texture {
            Some(texture) => texture,
            None => self.ctx.defaults()?.debug_normal_texture,
        };
        let ctx = &mut self.ctx;
        let base_color_texture = desc
            .base_color_texture
            .share(&mut ctx.resources.textures)
            .with_context(|| format!("base color texture of material <{}>", name))?;
        let normal_texture = match normal_texture.share(&mut ctx.resources.textures) {
            Ok(texture) => texture,
            Err(e) => {
                ctx.destroy_texture(base_color_texture)?;
                return Err(e).with_context(|| format!("normal texture of material <{}>", name));
            }
        };

        let created = create_pipeline(ctx, desc, name).and_then(|pipeline| {
            let pool = ctx.material_pool.as_mut().context("material data pool is not created")?;
            let block = match pool.alloc_block() {
                Ok(block) => block,
                Err(e) => {
                    pipeline.destroy(&ctx.gfx);
                    return Err(e.into());
                }
            };
            let data = GpuPbrMaterialData {
                base_color_texture: base_color_texture.index(),
                normal_texture: normal_texture.index(),
                base_color_mul: desc.base_color_mul,
                padding: [0; 11],
            };
            if let Err(e) = pool.write_material(&ctx.gfx, &ctx.resources, block, &data) {
                pool.free_block(block);
                pipeline.destroy(&ctx.gfx);
                return Err(e.into());
            }
            Ok((pipeline, block))
        });

        let (pipeline, block) = match created {
            Ok(created) => created,
            Err(e) => {
                ctx.destroy_texture(normal_texture)?;
                ctx.destroy_texture(base_color_texture)?;
                return Err(e);
            }
        };

        self.live_pipelines += 1;
        log::info!("material <{}>: block {}", name, block);
        Ok(Material {
            pipeline,
            block,
            base_color_texture,
            normal_texture,
            name: name.to_string(),
        })
    }

    /// 调用方需要保证 GPU 不再使用该材质
    pub fn destroy_material(&mut self, material: Material) -> anyhow::Result<()> {
        let Material {
            pipeline,
            block,
            base_color_texture,
            normal_texture,
            name,
        } = material;

        pipeline.destroy(&self.ctx.gfx);
        self.live_pipelines = self.live_pipelines.saturating_sub(1);
        match self.ctx.material_pool.as_mut() {
            Some(pool) => pool.free_block(block),
            None => log::error!("material <{}> outlived the material data pool", name),
        }

        self.ctx.destroy_texture(normal_texture).with_context(|| format!("release textures of <{}>", name))?;
        self.ctx.destroy_texture(base_color_texture).with_context(|| format!("release textures of <{}>", name))
    }
}

