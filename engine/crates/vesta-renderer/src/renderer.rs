use std::ffi::CStr;

use anyhow::Context;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use vesta_gfx::{
    GfxContext, GfxError, GfxResult, VkCheck,
    commands::{command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool},
    pipelines::{pipeline_cache::GfxPipelineCache, pipeline_layout::GfxPipelineLayout},
    resources::{
        buffer::GfxBuffer,
        image::GfxImage,
        image_view::{GfxImageView, GfxImageViewDesc},
    },
    swapchain::{render_swapchain::GfxRenderSwapchain, surface::GfxSurface},
};
use vesta_render_interface::{
    bindless_config::BindlessKind,
    bindless_table::GfxBindlessTable,
    frame_counter::{FrameCounter, FrameState},
    gpu_resources::GpuResources,
    gpu_types::GpuFrameConst,
    material_pool::MaterialDataPool,
    resource_registrar::ResourceRegistrar,
};
use vesta_utils::DisposeStack;

use crate::{
    default_resources::{DefaultResources, Rgba8Pixels, default_sampler_desc},
    frame_pipeline::DrawState,
    render_context::{DepthTarget, FrameSync, RenderContext, report_release},
    renderer_config::{PathsConfig, RendererConfig},
};

/// 渲染器
///
/// 持有 [`RenderContext`] 与销毁它所需的 dispose stack。
/// 初始化时每创建一个对象就立即 push 对应的销毁动作，
/// 初始化中途失败或者 [`Renderer::destroy`] 时逆序销毁。
pub struct Renderer {
    pub(crate) ctx: RenderContext,
    dispose_stack: DisposeStack<RenderContext>,
    pub(crate) config: RendererConfig,

    pub(crate) frame_counter: FrameCounter,
    pub(crate) frame_state: FrameState,
    pub(crate) draw_state: DrawState,

    /// 当前存活的 graphics pipeline 数量
    pub(crate) live_pipelines: u32,
}
// new & init
impl Renderer {
    /// window system 需要的 instance extension
    pub fn required_instance_extensions(raw_display_handle: RawDisplayHandle) -> GfxResult<Vec<&'static CStr>> {
        let exts = ash_window::enumerate_required_extensions(raw_display_handle)
            .vk_check("vkEnumerateInstanceExtensionProperties")?;
        // ash-window 返回的是静态字符串
        Ok(exts.iter().map(|ext| unsafe { CStr::from_ptr(*ext) }).collect())
    }

    /// 接管 `gfx` 的所有权，销毁渲染器时一并销毁
    pub fn new(
        gfx: GfxContext,
        config: RendererConfig,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("Renderer::new");

        if let Err(e) = config.validate() {
            gfx.destroy();
            return Err(e.context("invalid renderer config"));
        }

        let mut ctx = RenderContext::new(gfx, GpuResources::new(&config.bindless));
        let mut dispose_stack = DisposeStack::new();

        let init = Self::init_steps(
            &mut ctx,
            &mut dispose_stack,
            &config,
            raw_display_handle,
            raw_window_handle,
            window_extent,
        );
        if let Err(e) = init {
            log::error!("renderer init failed, dispose {} created objects", dispose_stack.len());
            if let Err(idle_err) = ctx.gfx.device().wait_idle() {
                log::error!("wait idle before dispose failed: {}", idle_err);
            }
            dispose_stack.dispose_all(&mut ctx);
            ctx.gfx.destroy();
            return Err(e);
        }

        log::info!("renderer created, dispose stack: {:?}", dispose_stack.labels().collect::<Vec<_>>());
        Ok(Self {
            ctx,
            dispose_stack,
            frame_counter: FrameCounter::new(config.frames_in_flight),
            frame_state: FrameState::Idle,
            draw_state: DrawState::default(),
            live_pipelines: 0,
            config,
        })
    }

    fn init_steps(
        ctx: &mut RenderContext,
        stack: &mut DisposeStack<RenderContext>,
        config: &RendererConfig,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> anyhow::Result<()> {
        // 最先 push，最后执行：此时所有的资源都应该已经释放
        stack.push("leaked-pool-objects", |rc: &mut RenderContext| {
            rc.resources.destroy_leaked(&rc.gfx);
        });

        let cache_path = PathsConfig::resolve(&config.paths.pipeline_cache);
        ctx.pipeline_cache = Some(
            GfxPipelineCache::from_file(&ctx.gfx, &cache_path)
                .with_context(|| format!("create pipeline cache from {}", cache_path.display()))?,
        );
        stack.push("pipeline-cache", |rc: &mut RenderContext| {
            if let Some(cache) = rc.pipeline_cache.take() {
                cache.destroy(&rc.gfx);
            }
        });

        let surface = GfxSurface::new(&ctx.gfx, raw_display_handle, raw_window_handle).context("create surface")?;
        let swapchain = GfxRenderSwapchain::new(&ctx.gfx, surface, config.present_mode.to_vk(), window_extent)
            .context("create swapchain")?;
        let swapchain_extent = swapchain.extent();
        ctx.swapchain = Some(swapchain);
        stack.push("swapchain", |rc: &mut RenderContext| {
            if let Some(swapchain) = rc.swapchain.take() {
                swapchain.destroy(&rc.gfx);
            }
        });

        ctx.depth = Some(Self::create_depth_target(&ctx.gfx, swapchain_extent).context("create depth target")?);
        stack.push("depth-target", |rc: &mut RenderContext| {
            if let Some(depth) = rc.depth.take() {
                depth.destroy(&rc.gfx);
            }
        });

        let staging = GfxBuffer::new_stage_buffer(&ctx.gfx, config.staging_buffer_size, "staging")
            .context("create staging buffer")?;
        ctx.staging_buffer = Some(ctx.resources.insert_buffer(&ctx.gfx, staging)?);
        stack.push("staging-buffer", |rc: &mut RenderContext| {
            if let Some(handle) = rc.staging_buffer.take() {
                report_release("staging buffer", handle.destroy_handle(&mut rc.resources.buffers, &rc.gfx));
            }
        });

        let bindless = GfxBindlessTable::new(&ctx.gfx, &config.bindless, config.frames_in_flight)
            .context("create bindless table")?;
        let set_layout = bindless.layout();
        ctx.bindless = Some(bindless);
        stack.push("bindless-table", |rc: &mut RenderContext| {
            if let Some(bindless) = rc.bindless.take() {
                bindless.destroy(&rc.gfx);
            }
        });

        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::ALL)
            .offset(0)
            .size(RendererConfig::PUSH_CONSTANT_SIZE);
        ctx.pipeline_layout = Some(
            GfxPipelineLayout::new(&ctx.gfx, &[set_layout], &[push_constant_range], "bindless")
                .context("create global pipeline layout")?,
        );
        stack.push("pipeline-layout", |rc: &mut RenderContext| {
            if let Some(layout) = rc.pipeline_layout.take() {
                layout.destroy(&rc.gfx);
            }
        });

        let registrar = ResourceRegistrar::new(&ctx.gfx, ctx.bindless()?, config.scrub_freed_bindless_slots)
            .context("create resource registrar")?;
        ctx.registrar = Some(registrar);
        stack.push("resource-registrar", |rc: &mut RenderContext| {
            if let Some(registrar) = rc.registrar.take() {
                registrar.destroy(&rc.gfx);
            }
        });

        let material_pool = match ctx.registrar.as_ref() {
            Some(registrar) => MaterialDataPool::new(&ctx.gfx, &mut ctx.resources, registrar, config.material_count),
            None => Err(GfxError::NotInitialized { what: "resource registrar" }),
        };
        ctx.material_pool = Some(material_pool.context("create material data pool")?);
        stack.push("material-data-pool", |rc: &mut RenderContext| {
            if let (Some(pool), Some(registrar)) = (rc.material_pool.take(), rc.registrar.as_ref()) {
                pool.destroy(&rc.gfx, &mut rc.resources, registrar);
            }
        });

        // Vec 中只有创建成功的部分
        stack.push("frame-uniform-buffers", |rc: &mut RenderContext| {
            for handle in std::mem::take(&mut rc.frame_uniforms) {
                report_release("frame uniform buffer", handle.destroy_handle(&mut rc.resources.buffers, &rc.gfx));
            }
        });
        for frame in 0..config.frames_in_flight {
            Self::create_frame_uniform(ctx, frame).with_context(|| format!("create uniform buffer of frame {}", frame))?;
        }

        let command_pool = GfxCommandPool::new(
            &ctx.gfx,
            ctx.gfx.gfx_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "frame",
        )
        .context("create frame command pool")?;
        ctx.command_pool = Some(command_pool);
        stack.push("frame-command-pool", |rc: &mut RenderContext| {
            if let Some(pool) = rc.command_pool.take() {
                pool.destroy(&rc.gfx);
            }
        });

        stack.push("frame-command-buffers", |rc: &mut RenderContext| {
            let command_buffers = std::mem::take(&mut rc.command_buffers);
            if let Some(pool) = rc.command_pool.as_ref() {
                pool.free_command_buffers(&command_buffers);
            }
        });
        for frame in 0..config.frames_in_flight {
            let Some(pool) = ctx.command_pool.as_ref() else {
                break;
            };
            let cmd = GfxCommandBuffer::new(ctx.gfx.device_rc(), pool, &format!("frame-{}", frame))
                .with_context(|| format!("allocate command buffer of frame {}", frame))?;
            ctx.command_buffers.push(cmd);
        }

        stack.push("frame-sync-objects", |rc: &mut RenderContext| {
            for sync in std::mem::take(&mut rc.frame_syncs) {
                sync.destroy(&rc.gfx);
            }
        });
        for frame in 0..config.frames_in_flight {
            let sync = FrameSync::new(&ctx.gfx, frame).with_context(|| format!("create sync objects of frame {}", frame))?;
            ctx.frame_syncs.push(sync);
        }

        Self::create_default_resources(ctx, stack, config).context("create default resources")?;

        Ok(())
    }

    fn create_depth_target(gfx: &GfxContext, extent: vk::Extent2D) -> GfxResult<DepthTarget> {
        let format = gfx.find_depth_format()?;
        let image = GfxImage::new_depth(gfx, extent, format, "depth")?;
        let view_desc = GfxImageViewDesc::new_2d(format, vk::ImageAspectFlags::DEPTH);
        match GfxImageView::new(gfx, image.handle(), view_desc, "depth") {
            Ok(view) => Ok(DepthTarget { image, view }),
            Err(e) => {
                image.destroy(gfx);
                Err(e)
            }
        }
    }

    /// 每一帧一个 uniform buffer，写入该帧 set 的 ubo binding
    fn create_frame_uniform(ctx: &mut RenderContext, frame: usize) -> GfxResult<()> {
        let size = size_of::<GpuFrameConst>() as vk::DeviceSize;
        let buffer = GfxBuffer::new(
            &ctx.gfx,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            None,
            true,
            format!("frame-{}-const", frame),
        )?;
        buffer.transfer_data_by_mmap(&ctx.gfx, &[GpuFrameConst::default()])?;
        let handle = ctx.resources.insert_buffer(&ctx.gfx, buffer)?;
        ctx.frame_uniforms.push(handle);

        let buffer = handle.get(&ctx.resources.buffers)?;
        ctx.registrar()?.write_uniform_buffer(&ctx.gfx, ctx.bindless()?, 0, frame, buffer, size)
    }

    /// 默认纹理优先从文件读取，文件不存在时生成
    fn create_default_resources(
        ctx: &mut RenderContext,
        stack: &mut DisposeStack<RenderContext>,
        config: &RendererConfig,
    ) -> anyhow::Result<()> {
        let error_pixels = Rgba8Pixels::load_or_else(&PathsConfig::resolve(&config.paths.error_texture), || {
            Rgba8Pixels::checkerboard(64, 8)
        });
        let error_texture =
            ctx.create_texture(error_pixels.width, error_pixels.height, &error_pixels.pixels, "default-error")?;
        stack.push("default-error-texture", move |rc: &mut RenderContext| {
            report_release("default error texture", error_texture.destroy_handle(&mut rc.resources.textures, &rc.gfx));
        });

        let normal_pixels = Rgba8Pixels::load_or_else(&PathsConfig::resolve(&config.paths.debug_normal_texture), || {
            Rgba8Pixels::flat_normal(4)
        });
        let debug_normal_texture =
            ctx.create_texture(normal_pixels.width, normal_pixels.height, &normal_pixels.pixels, "default-normal")?;
        stack.push("default-normal-texture", move |rc: &mut RenderContext| {
            report_release(
                "default normal texture",
                debug_normal_texture.destroy_handle(&mut rc.resources.textures, &rc.gfx),
            );
        });

        let max_anisotropy = ctx.gfx.physical_device().max_sampler_anisotropy();
        let sampler = ctx.create_sampler(&default_sampler_desc(max_anisotropy), "default")?;
        stack.push("default-sampler", move |rc: &mut RenderContext| {
            report_release("default sampler", sampler.destroy_handle(&mut rc.resources.samplers, &rc.gfx));
        });

        ctx.defaults = Some(DefaultResources {
            error_texture,
            debug_normal_texture,
            sampler,
        });
        stack.push("default-resources", |rc: &mut RenderContext| {
            rc.defaults = None;
        });

        log::info!(
            "default resources: error texture {}, normal texture {}, sampler {}",
            error_texture.index(),
            debug_normal_texture.index(),
            sampler.index()
        );
        Ok(())
    }
}
// destroy
impl Renderer {
    /// 等待 GPU 空闲后逆序执行所有销毁动作，最后销毁 [`GfxContext`]
    ///
    /// 调用前需要释放所有在外部创建的材质、mesh 与纹理
    pub fn destroy(self) {
        let _span = tracy_client::span!("Renderer::destroy");
        let Self {
            mut ctx,
            mut dispose_stack,
            live_pipelines,
            ..
        } = self;

        if let Err(e) = ctx.gfx.device().wait_idle() {
            log::error!("wait idle before destroy failed: {}", e);
        }
        if live_pipelines > 0 {
            log::error!("{} materials are still alive when renderer is destroyed", live_pipelines);
        }

        dispose_stack.dispose_all(&mut ctx);
        ctx.gfx.destroy();
        log::info!("renderer destroyed");
    }
}
// getters
impl Renderer {
    #[inline]
    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    /// 创建与销毁纹理、sampler、buffer、mesh
    #[inline]
    pub fn context_mut(&mut self) -> &mut RenderContext {
        &mut self.ctx
    }

    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    #[inline]
    pub fn frame_state(&self) -> FrameState {
        self.frame_state
    }

    pub fn swapchain_extent(&self) -> GfxResult<vk::Extent2D> {
        Ok(self.ctx.swapchain()?.extent())
    }

    /// 可以用于 bindless 中 storage buffer 的槽位数量
    #[inline]
    pub fn storage_buffer_capacity(&self) -> u32 {
        self.config.bindless.capacity(BindlessKind::StorageBuffer)
    }

    pub fn wait_idle(&self) -> GfxResult<()> {
        self.ctx.gfx.device().wait_idle()
    }
}
