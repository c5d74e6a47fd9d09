//! 帧循环
//!
//! 一帧的调用顺序：
//! ```ignore
//! if renderer.begin_frame()? == FrameBegin::Ready {
//!     renderer.update_frame_constant_buffer(&frame_const)?;
//!     renderer.bind_material(&material)?;
//!     renderer.push_constants(&push_constant)?;
//!     renderer.bind_mesh(&mesh)?;
//!     renderer.draw_indexed(mesh.index_count())?;
//!     renderer.end_frame()?;
//! }
//! ```

use ash::vk;
use vesta_gfx::{
    GfxError, GfxResult,
    commands::{barrier::GfxImageBarrier, submit_info::GfxSubmitInfo},
    swapchain::render_swapchain::SwapchainStatus,
};
use vesta_render_interface::{
    frame_counter::{FrameCounter, FrameState},
    gpu_types::{GpuFrameConst, GpuPushConstant, PushConstantBlock},
};

use crate::{material::Material, mesh::Mesh, renderer::Renderer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameBegin {
    /// 命令开始录制，可以提交绘制
    Ready,
    /// swapchain 已经过期，本帧被跳过，fence 没有被 reset
    SwapchainOutOfDate,
}

/// 一帧中已经录制的绑定状态，`begin_frame` 时清空
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct DrawState {
    pipeline_bound: bool,
    index_buffer_bound: bool,
    push_constants_written: bool,
}
impl DrawState {
    /// 绘制之前缺少的绑定
    fn missing(&self) -> Option<&'static str> {
        if !self.pipeline_bound {
            Some("material")
        } else if !self.index_buffer_bound {
            Some("mesh")
        } else if !self.push_constants_written {
            Some("push constant block")
        } else {
            None
        }
    }
}

/// y 轴翻转的 viewport，使得 NDC 的 y 轴朝上
pub fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

#[inline]
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// color 与 depth 的清除值
pub fn clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ]
}

/// acquire 之后 fence 是否可以 reset
///
/// out of date 时本帧不会提交，reset 之后下一次 wait 永远等不到 signal
#[inline]
fn should_reset_fence(acquire_status: SwapchainStatus) -> bool {
    acquire_status != SwapchainStatus::OutOfDate
}

/// 一帧结束时的状态推进
///
/// 无论提交与 present 是否成功都切换到下一个 frame slot；失败时状态回到 `Idle`
fn finish_frame<R>(state: &mut FrameState, counter: &mut FrameCounter, result: GfxResult<R>) -> GfxResult<R> {
    if result.is_err() {
        *state = FrameState::Idle;
    }
    counter.next_frame();
    result
}

fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

// begin & end
impl Renderer {
    /// 等待该 frame slot 上一次的提交完成，获取 swapchain image 并开始录制
    ///
    /// swapchain 过期时返回 [`FrameBegin::SwapchainOutOfDate`]，调用方应当跳过本帧
    pub fn begin_frame(&mut self) -> GfxResult<FrameBegin> {
        let _span = tracy_client::span!("Renderer::begin_frame");
        self.frame_state.transit("begin_frame", FrameState::Acquiring)?;

        match self.acquire_and_begin() {
            Ok(FrameBegin::Ready) => {
                self.frame_state.transit("begin_frame", FrameState::Recording)?;
                Ok(FrameBegin::Ready)
            }
            Ok(FrameBegin::SwapchainOutOfDate) => {
                log::warn!("{} skipped, swapchain is out of date", self.frame_counter.frame_name());
                self.frame_state.transit("begin_frame", FrameState::Idle)?;
                Ok(FrameBegin::SwapchainOutOfDate)
            }
            Err(e) => {
                self.frame_state = FrameState::Idle;
                Err(e)
            }
        }
    }

    fn acquire_and_begin(&mut self) -> GfxResult<FrameBegin> {
        let frame = self.frame_counter.current_frame();
        let frame_name = self.frame_counter.frame_name();
        let timeout_ms = self.config.fence_timeout_ms;

        {
            let ctx = &mut self.ctx;
            let sync = ctx.frame_syncs.get(frame).ok_or(GfxError::NotInitialized {
                what: "frame sync objects",
            })?;
            sync.fence.wait(&ctx.gfx, timeout_ms)?;

            let swapchain = ctx.swapchain.as_mut().ok_or(GfxError::NotInitialized { what: "swapchain" })?;
            let status = swapchain.acquire_next_image(&ctx.gfx, &sync.image_available, timeout_ms)?;
            if !should_reset_fence(status) {
                return Ok(FrameBegin::SwapchainOutOfDate);
            }
            sync.fence.reset(&ctx.gfx)?;
        }

        let ctx = &self.ctx;
        let cmd = ctx.command_buffer(frame)?;
        let swapchain = ctx.swapchain()?;
        let depth = ctx.depth()?;
        let extent = swapchain.extent();

        cmd.reset()?;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, &frame_name)?;

        let depth_barrier = GfxImageBarrier::new()
            .image(depth.image.handle())
            .image_aspect_flag(depth_aspect(depth.image.format()))
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .src_mask(
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .dst_mask(
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );
        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::swapchain_to_color_attachment(swapchain.current_image()), depth_barrier],
        );

        let [color_clear, depth_clear] = clear_values();
        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(swapchain.current_image_view())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(color_clear)];
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(depth.view.handle())
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(depth_clear);
        let rendering_info = vk::RenderingInfo::default()
            .render_area(full_scissor(extent))
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);
        cmd.cmd_begin_rendering(&rendering_info);

        cmd.cmd_set_viewport(0, &[flipped_viewport(extent)]);
        cmd.cmd_set_scissor(0, &[full_scissor(extent)]);
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            ctx.pipeline_layout()?,
            0,
            &[ctx.bindless()?.set(frame)],
        );

        self.draw_state = DrawState::default();
        Ok(FrameBegin::Ready)
    }

    /// 结束录制，提交并 present
    ///
    /// 无论 present 的结果如何，都会切换到下一个 frame slot
    pub fn end_frame(&mut self) -> GfxResult<SwapchainStatus> {
        let _span = tracy_client::span!("Renderer::end_frame");
        self.frame_state.expect("end_frame", FrameState::Recording)?;

        let result = self.submit_and_present();
        finish_frame(&mut self.frame_state, &mut self.frame_counter, result)
    }

    fn submit_and_present(&mut self) -> GfxResult<SwapchainStatus> {
        let frame = self.frame_counter.current_frame();
        let ctx = &self.ctx;
        let cmd = ctx.command_buffer(frame)?;
        let swapchain = ctx.swapchain()?;
        let sync = ctx.frame_sync(frame)?;

        cmd.end_rendering();
        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::swapchain_to_present(swapchain.current_image())],
        );
        cmd.end()?;

        let submit_info = GfxSubmitInfo::new(std::slice::from_ref(cmd))
            .wait(&sync.image_available, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .signal(&sync.render_finished, vk::PipelineStageFlags2::ALL_COMMANDS);
        ctx.gfx.gfx_queue().submit(&[submit_info], Some(&sync.fence))?;
        self.frame_state.transit("end_frame", FrameState::Submitted)?;

        self.frame_state.transit("end_frame", FrameState::Presenting)?;
        let status = swapchain.present_image(ctx.gfx.gfx_queue(), std::slice::from_ref(&sync.render_finished));
        self.frame_state.transit("end_frame", FrameState::Idle)?;
        status
    }

    /// 写入当前 frame slot 的 uniform buffer
    ///
    /// `begin_frame` 中已经等待过该 slot 的 fence，GPU 不会再读取旧数据。
    /// `material_buffer_slot` 总是被覆盖为材质池的槽位
    pub fn update_frame_constant_buffer(&self, frame_const: &GpuFrameConst) -> GfxResult<()> {
        self.frame_state.expect("update_frame_constant_buffer", FrameState::Recording)?;
        let frame_const = GpuFrameConst {
            material_buffer_slot: self.ctx.material_pool()?.buffer_slot(),
            ..*frame_const
        };
        let handle = self.ctx.frame_uniform(self.frame_counter.current_frame())?;
        let buffer = handle.get(&self.ctx.resources.buffers)?;
        buffer.transfer_data_by_mmap(&self.ctx.gfx, &[frame_const])
    }
}
// draw
impl Renderer {
    pub fn bind_material(&mut self, material: &Material) -> GfxResult<()> {
        self.frame_state.expect("bind_material", FrameState::Recording)?;
        let cmd = self.ctx.command_buffer(self.frame_counter.current_frame())?;
        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, material.pipeline());
        self.draw_state.pipeline_bound = true;
        Ok(())
    }

    /// 顶点数据由 shader 通过地址表读取，这里只绑定 index buffer
    pub fn bind_mesh(&mut self, mesh: &Mesh) -> GfxResult<()> {
        self.frame_state.expect("bind_mesh", FrameState::Recording)?;
        let cmd = self.ctx.command_buffer(self.frame_counter.current_frame())?;
        let index_buffer = mesh.index_buffer().get(&self.ctx.resources.buffers)?;
        cmd.cmd_bind_index_buffer(index_buffer.vk_buffer(), 0, vk::IndexType::UINT32);
        self.draw_state.index_buffer_bound = true;
        Ok(())
    }

    /// 整个 256 字节的 block 一次写入，所有 shader stage 可见
    pub fn push_constants(&mut self, push_constant: &GpuPushConstant) -> GfxResult<()> {
        self.frame_state.expect("push_constants", FrameState::Recording)?;
        let cmd = self.ctx.command_buffer(self.frame_counter.current_frame())?;
        let block = PushConstantBlock::encode(push_constant);
        cmd.cmd_push_constants(self.ctx.pipeline_layout()?, vk::ShaderStageFlags::ALL, 0, block.as_bytes());
        self.draw_state.push_constants_written = true;
        Ok(())
    }

    pub fn draw_indexed(&mut self, index_count: u32) -> GfxResult<()> {
        self.frame_state.expect("draw_indexed", FrameState::Recording)?;
        if let Some(missing) = self.draw_state.missing() {
            return Err(GfxError::IncompleteDrawState {
                op: "draw_indexed",
                missing,
            });
        }
        let cmd = self.ctx.command_buffer(self.frame_counter.current_frame())?;
        cmd.draw_indexed(index_count, 0, 1, 0, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flipped_viewport() {
        let viewport = flipped_viewport(vk::Extent2D {
            width: 960,
            height: 540,
        });
        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.y, 540.0);
        assert_eq!(viewport.width, 960.0);
        assert_eq!(viewport.height, -540.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_full_scissor() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let scissor = full_scissor(extent);
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn test_clear_values() {
        let [color, depth] = clear_values();
        unsafe {
            assert_eq!(color.color.float32, [0.0, 0.0, 0.0, 1.0]);
            assert_eq!(depth.depth_stencil.depth, 1.0);
            assert_eq!(depth.depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn test_draw_state_reports_first_missing_binding() {
        let mut state = DrawState::default();
        assert_eq!(state.missing(), Some("material"));

        state.pipeline_bound = true;
        assert_eq!(state.missing(), Some("mesh"));

        state.index_buffer_bound = true;
        assert_eq!(state.missing(), Some("push constant block"));

        state.push_constants_written = true;
        assert_eq!(state.missing(), None);
    }

    #[test]
    fn test_out_of_date_keeps_fence_signaled() {
        assert!(!should_reset_fence(SwapchainStatus::OutOfDate));
        assert!(should_reset_fence(SwapchainStatus::Optimal));
        assert!(should_reset_fence(SwapchainStatus::Suboptimal));
    }

    #[test]
    fn test_finish_frame_advances_on_success() {
        let mut state = FrameState::Idle;
        let mut counter = FrameCounter::new(2);

        let status = finish_frame(&mut state, &mut counter, Ok(SwapchainStatus::Suboptimal)).unwrap();
        assert_eq!(status, SwapchainStatus::Suboptimal);
        assert_eq!(state, FrameState::Idle);
        assert_eq!((counter.current_frame(), counter.frame_id()), (1, 1));

        finish_frame(&mut state, &mut counter, Ok(SwapchainStatus::OutOfDate)).unwrap();
        assert_eq!(counter.current_frame(), 0);
    }

    #[test]
    fn test_finish_frame_advances_on_failure() {
        let mut state = FrameState::Recording;
        let mut counter = FrameCounter::new(2);

        let result: GfxResult<SwapchainStatus> = Err(GfxError::NotInitialized { what: "swapchain" });
        assert!(finish_frame(&mut state, &mut counter, result).is_err());
        assert_eq!(state, FrameState::Idle);
        assert_eq!(counter.current_frame(), 1);

        // 状态已回到 Idle，下一帧可以正常开始
        assert!(state.transit("begin_frame", FrameState::Acquiring).is_ok());
    }

    #[test]
    fn test_depth_aspect() {
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
