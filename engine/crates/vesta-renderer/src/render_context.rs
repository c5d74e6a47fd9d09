use ash::vk;
use vesta_gfx::{
    GfxContext, GfxError, GfxResult,
    commands::{command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence, semaphore::GfxSemaphore},
    pipelines::{pipeline_cache::GfxPipelineCache, pipeline_layout::GfxPipelineLayout},
    resources::{buffer::GfxBuffer, image::GfxImage, image_view::GfxImageView, texture::GfxTexture},
    sampler::{GfxSampler, GfxSamplerDesc},
    swapchain::render_swapchain::GfxRenderSwapchain,
};
use vesta_render_interface::{
    bindless_table::GfxBindlessTable,
    gpu_resources::{GfxBufferHandle, GfxSamplerHandle, GfxTextureHandle, GpuResources},
    material_pool::MaterialDataPool,
    resource_registrar::ResourceRegistrar,
};
use vesta_utils::{PoolError, PoolResult};

use crate::default_resources::DefaultResources;

/// 每个 frame slot 独占的同步对象
pub struct FrameSync {
    /// 上一次使用这个 slot 的提交完成后 signal，创建时即为 signaled
    pub fence: GfxFence,
    /// swapchain image 可用
    pub image_available: GfxSemaphore,
    /// 渲染完成，present 等待它
    pub render_finished: GfxSemaphore,
}
impl FrameSync {
    pub fn new(ctx: &GfxContext, frame: usize) -> GfxResult<Self> {
        let fence = GfxFence::new(ctx, true, &format!("frame-{}-in-flight", frame))?;
        let image_available = match GfxSemaphore::new(ctx, &format!("frame-{}-image-available", frame)) {
            Ok(s) => s,
            Err(e) => {
                fence.destroy(ctx);
                return Err(e);
            }
        };
        let render_finished = match GfxSemaphore::new(ctx, &format!("frame-{}-render-finished", frame)) {
            Ok(s) => s,
            Err(e) => {
                image_available.destroy(ctx);
                fence.destroy(ctx);
                return Err(e);
            }
        };
        Ok(Self {
            fence,
            image_available,
            render_finished,
        })
    }

    pub fn destroy(self, ctx: &GfxContext) {
        self.render_finished.destroy(ctx);
        self.image_available.destroy(ctx);
        self.fence.destroy(ctx);
    }
}

pub struct DepthTarget {
    pub image: GfxImage,
    pub view: GfxImageView,
}
impl DepthTarget {
    pub fn destroy(self, ctx: &GfxContext) {
        self.view.destroy(ctx);
        self.image.destroy(ctx);
    }
}

/// 渲染器持有的所有 GPU 对象
///
/// 初始化过程中逐个填充，销毁动作通过 dispose stack 逆序取出并销毁，
/// 因此除了 `gfx` 与 `resources` 之外都是 `Option` 或者 `Vec`。
pub struct RenderContext {
    pub gfx: GfxContext,
    pub resources: GpuResources,

    pub pipeline_cache: Option<GfxPipelineCache>,
    pub swapchain: Option<GfxRenderSwapchain>,
    pub depth: Option<DepthTarget>,
    pub staging_buffer: Option<GfxBufferHandle>,

    pub bindless: Option<GfxBindlessTable>,
    pub pipeline_layout: Option<GfxPipelineLayout>,
    pub registrar: Option<ResourceRegistrar>,
    pub material_pool: Option<MaterialDataPool>,

    /// 与 frame slot 一一对应
    pub frame_uniforms: Vec<GfxBufferHandle>,
    pub command_pool: Option<GfxCommandPool>,
    pub command_buffers: Vec<GfxCommandBuffer>,
    pub frame_syncs: Vec<FrameSync>,

    pub defaults: Option<DefaultResources>,
}
// new & init
impl RenderContext {
    pub fn new(gfx: GfxContext, resources: GpuResources) -> Self {
        Self {
            gfx,
            resources,
            pipeline_cache: None,
            swapchain: None,
            depth: None,
            staging_buffer: None,
            bindless: None,
            pipeline_layout: None,
            registrar: None,
            material_pool: None,
            frame_uniforms: Vec::new(),
            command_pool: None,
            command_buffers: Vec::new(),
            frame_syncs: Vec::new(),
            defaults: None,
        }
    }
}
// getters
impl RenderContext {
    pub fn pipeline_cache(&self) -> GfxResult<&GfxPipelineCache> {
        self.pipeline_cache.as_ref().ok_or(GfxError::NotInitialized { what: "pipeline cache" })
    }

    pub fn swapchain(&self) -> GfxResult<&GfxRenderSwapchain> {
        self.swapchain.as_ref().ok_or(GfxError::NotInitialized { what: "swapchain" })
    }

    pub fn depth(&self) -> GfxResult<&DepthTarget> {
        self.depth.as_ref().ok_or(GfxError::NotInitialized { what: "depth target" })
    }

    pub fn bindless(&self) -> GfxResult<&GfxBindlessTable> {
        self.bindless.as_ref().ok_or(GfxError::NotInitialized { what: "bindless table" })
    }

    pub fn pipeline_layout(&self) -> GfxResult<vk::PipelineLayout> {
        self.pipeline_layout
            .as_ref()
            .map(GfxPipelineLayout::handle)
            .ok_or(GfxError::NotInitialized { what: "pipeline layout" })
    }

    pub fn registrar(&self) -> GfxResult<&ResourceRegistrar> {
        self.registrar.as_ref().ok_or(GfxError::NotInitialized { what: "resource registrar" })
    }

    pub fn material_pool(&self) -> GfxResult<&MaterialDataPool> {
        self.material_pool.as_ref().ok_or(GfxError::NotInitialized { what: "material data pool" })
    }

    pub fn defaults(&self) -> GfxResult<&DefaultResources> {
        self.defaults.as_ref().ok_or(GfxError::NotInitialized { what: "default resources" })
    }

    pub fn frame_sync(&self, frame: usize) -> GfxResult<&FrameSync> {
        self.frame_syncs.get(frame).ok_or(GfxError::NotInitialized { what: "frame sync objects" })
    }

    pub fn command_buffer(&self, frame: usize) -> GfxResult<&GfxCommandBuffer> {
        self.command_buffers.get(frame).ok_or(GfxError::NotInitialized { what: "frame command buffer" })
    }

    pub fn frame_uniform(&self, frame: usize) -> GfxResult<GfxBufferHandle> {
        self.frame_uniforms.get(frame).copied().ok_or(GfxError::NotInitialized { what: "frame uniform buffer" })
    }
}

/// 释放 handle 的结果统一在这里处理
///
/// 引用计数下溢说明上游存在重复释放：总是记录错误，debug 下直接断言失败
pub fn report_release(what: &str, result: PoolResult<bool>) -> bool {
    match result {
        Ok(freed) => freed,
        Err(e) => {
            log::error!("failed to release {}: {}", what, e);
            debug_assert!(!matches!(e, PoolError::RefCountUnderflow { .. }), "reference count underflow on {}", what);
            false
        }
    }
}

// texture & sampler
impl RenderContext {
    /// 创建纹理并写入 bindless 表，槽位即 handle 的 index
    pub fn create_texture(&mut self, width: u32, height: u32, pixels: &[u8], name: &str) -> GfxResult<GfxTextureHandle> {
        let _span = tracy_client::span!("RenderContext::create_texture");

        let texture = GfxTexture::from_rgba8(&self.gfx, width, height, pixels, name)?;
        let view = texture.image_view().handle();
        let handle = self.resources.insert_texture(&self.gfx, texture)?;

        let written = self
            .registrar()
            .and_then(|registrar| registrar.write_sampled_image(&self.gfx, self.bindless()?, handle.index(), view));
        if let Err(e) = written {
            report_release(name, handle.destroy_handle(&mut self.resources.textures, &self.gfx));
            return Err(e);
        }
        Ok(handle)
    }

    /// 释放一个引用；纹理被销毁时槽位指回默认纹理
    ///
    /// 调用方需要保证 GPU 不再使用该纹理
    pub fn destroy_texture(&mut self, handle: GfxTextureHandle) -> GfxResult<()> {
        let freed = report_release("texture", handle.destroy_handle(&mut self.resources.textures, &self.gfx));
        if !freed {
            return Ok(());
        }

        let registrar = self.registrar()?;
        if !registrar.scrub_freed_slots() {
            return Ok(());
        }
        let fallback = self.defaults()?.error_texture.get(&self.resources.textures)?.image_view().handle();
        registrar.clear_sampled_image(&self.gfx, self.bindless()?, handle.index(), fallback)
    }

    pub fn create_sampler(&mut self, desc: &GfxSamplerDesc, name: &str) -> GfxResult<GfxSamplerHandle> {
        let sampler = GfxSampler::new(&self.gfx, desc, name)?;
        let vk_sampler = sampler.handle();
        let handle = self.resources.insert_sampler(&self.gfx, sampler)?;

        let written = self
            .registrar()
            .and_then(|registrar| registrar.write_sampler(&self.gfx, self.bindless()?, handle.index(), vk_sampler));
        if let Err(e) = written {
            report_release(name, handle.destroy_handle(&mut self.resources.samplers, &self.gfx));
            return Err(e);
        }
        Ok(handle)
    }

    /// 调用方需要保证 GPU 不再使用该 sampler
    pub fn destroy_sampler(&mut self, handle: GfxSamplerHandle) -> GfxResult<()> {
        let freed = report_release("sampler", handle.destroy_handle(&mut self.resources.samplers, &self.gfx));
        if !freed {
            return Ok(());
        }

        let registrar = self.registrar()?;
        if !registrar.scrub_freed_slots() {
            return Ok(());
        }
        let fallback = self.defaults()?.sampler.get(&self.resources.samplers)?.handle();
        registrar.clear_sampler(&self.gfx, self.bindless()?, handle.index(), fallback)
    }
}
// buffer
impl RenderContext {
    /// 创建 device local 的 storage buffer，并把地址写入地址表
    pub fn create_storage_buffer(
        &mut self,
        size: vk::DeviceSize,
        extra_usage: vk::BufferUsageFlags,
        name: &str,
    ) -> GfxResult<GfxBufferHandle> {
        let usage = vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            | vk::BufferUsageFlags::TRANSFER_DST
            | extra_usage;
        let buffer = GfxBuffer::new(&self.gfx, size, usage, None, false, name)?;
        let handle = self.resources.insert_buffer(&self.gfx, buffer)?;

        let registered = self.registrar().and_then(|registrar| {
            let buffer = handle.get(&self.resources.buffers)?;
            registrar.register_storage_buffer(&self.gfx, handle.index(), buffer)
        });
        if let Err(e) = registered {
            report_release(name, handle.destroy_handle(&mut self.resources.buffers, &self.gfx));
            return Err(e);
        }
        Ok(handle)
    }

    /// 调用方需要保证 GPU 不再使用该 buffer
    pub fn destroy_storage_buffer(&mut self, handle: GfxBufferHandle) -> GfxResult<()> {
        let freed = report_release("storage buffer", handle.destroy_handle(&mut self.resources.buffers, &self.gfx));
        if !freed {
            return Ok(());
        }
        self.registrar()?.clear_storage_buffer(&self.gfx, handle.index())
    }

    /// 只用于不进入地址表的 buffer，例如 index buffer
    pub fn create_plain_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> GfxResult<GfxBufferHandle> {
        let buffer = GfxBuffer::new(&self.gfx, size, usage | vk::BufferUsageFlags::TRANSFER_DST, None, false, name)?;
        self.resources.insert_buffer(&self.gfx, buffer)
    }

    pub fn destroy_plain_buffer(&mut self, handle: GfxBufferHandle) {
        report_release("buffer", handle.destroy_handle(&mut self.resources.buffers, &self.gfx));
    }

    /// 同步上传：数据能放进常驻的 staging buffer 时复用它，否则临时创建一个
    pub fn upload_buffer(&self, dst: GfxBufferHandle, bytes: &[u8]) -> GfxResult<()> {
        let _span = tracy_client::span!("RenderContext::upload_buffer");
        let dst = dst.get(&self.resources.buffers)?;

        let staging = match self.staging_buffer {
            Some(handle) => handle.get(&self.resources.buffers)?,
            None => return dst.transfer_data_sync(&self.gfx, bytes),
        };
        if bytes.len() as vk::DeviceSize > staging.size() {
            log::debug!("upload of {} bytes exceeds staging buffer, use a temporary one", bytes.len());
            return dst.transfer_data_sync(&self.gfx, bytes);
        }
        if bytes.is_empty() {
            return Ok(());
        }

        staging.write_bytes(&self.gfx, 0, bytes)?;
        self.gfx.one_time_exec(
            |cmd| {
                cmd.cmd_copy_buffer(
                    staging.vk_buffer(),
                    dst.vk_buffer(),
                    &[vk::BufferCopy {
                        size: bytes.len() as vk::DeviceSize,
                        ..Default::default()
                    }],
                );
                Ok(())
            },
            "upload-buffer",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_release_passes_freed_flag() {
        assert!(report_release("a", Ok(true)));
        assert!(!report_release("a", Ok(false)));
    }

    #[test]
    fn test_report_release_stale_handle_is_not_fatal() {
        let stale = Err(PoolError::StaleHandle {
            index: 0,
            generation: 0,
            current: 1,
        });
        assert!(!report_release("a", stale));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "reference count underflow"))]
    fn test_report_release_underflow() {
        assert!(!report_release("a", Err(PoolError::RefCountUnderflow { index: 3 })));
    }
}
