use anyhow::Context;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use vesta_crate_tools::{config::load_toml_or_default, init_log::init_log, resource::VestaPath};
use vesta_gfx::GfxContext;
use vesta_renderer::{frame_pipeline::FrameBegin, renderer::Renderer, renderer_config::RendererConfig};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use crate::demo_scene::{DemoScene, frame_const};

pub struct WinitApp {
    config: RendererConfig,

    window: Option<Window>,
    renderer: Option<Renderer>,
    scene: Option<DemoScene>,

    /// 事件回调中无法返回错误，先记录下来，退出事件循环之后再上报
    fatal: Option<anyhow::Error>,
}
// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口
    pub fn run() -> anyhow::Result<()> {
        init_log();
        let _tracy = tracy_client::Client::start();

        let config: RendererConfig = load_toml_or_default(VestaPath::config_path("vesta.toml"))?;
        config.validate().context("invalid config/vesta.toml")?;

        let event_loop = EventLoop::new().context("create event loop")?;
        let mut app = Self {
            config,
            window: None,
            renderer: None,
            scene: None,
            fatal: None,
        };
        let loop_result = event_loop.run_app(&mut app).context("run event loop");

        log::info!("end run.");
        let fatal = app.fatal.take();
        app.destroy()?;

        loop_result?;
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
// new & init
impl WinitApp {
    /// 在 window 创建之后调用，初始化 Renderer 与场景
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attr = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(self.config.window.width, self.config.window.height));
        let window = event_loop.create_window(window_attr).context("create window")?;

        let raw_display_handle = window.display_handle().context("get display handle")?.as_raw();
        let raw_window_handle = window.window_handle().context("get window handle")?.as_raw();
        let size = window.inner_size();
        let window_extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };
        self.window = Some(window);

        let exts = Renderer::required_instance_extensions(raw_display_handle)?;
        let gfx = GfxContext::new(&self.config.app_name, &exts).context("create gfx context")?;
        let mut renderer =
            Renderer::new(gfx, self.config.clone(), raw_display_handle, raw_window_handle, window_extent)?;

        match DemoScene::new(&mut renderer) {
            Ok(scene) => self.scene = Some(scene),
            Err(e) => {
                renderer.destroy();
                return Err(e.context("create demo scene"));
            }
        }
        self.renderer = Some(renderer);
        Ok(())
    }

    fn render(&mut self) -> anyhow::Result<()> {
        let _span = tracy_client::span!("WinitApp::render");
        let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.scene.as_ref()) else {
            return Ok(());
        };

        if renderer.begin_frame()? == FrameBegin::SwapchainOutOfDate {
            return Ok(());
        }
        let extent = renderer.swapchain_extent()?;
        renderer.update_frame_constant_buffer(&frame_const(extent, scene.elapsed_secs()))?;
        scene.draw(renderer)?;
        renderer.end_frame()?;
        Ok(())
    }

    fn report_fatal(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{:#}", err);
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        event_loop.exit();
    }
}
// destroy
impl WinitApp {
    /// 先销毁场景中的资源，再销毁 renderer，renderer 最后销毁 gfx context
    fn destroy(mut self) -> anyhow::Result<()> {
        if let Some(renderer) = self.renderer.take() {
            let scene = self.scene.take();
            shutdown(
                renderer,
                |renderer| renderer.wait_idle().context("wait device idle"),
                |renderer| match scene {
                    Some(scene) => scene.destroy(renderer),
                    None => Ok(()),
                },
                Renderer::destroy,
            )?;
        }
        self.window = None;
        Ok(())
    }
}

/// 关闭顺序：等待 GPU 空闲，销毁场景，最后总是销毁 renderer
///
/// 等待空闲失败时只记录日志，仍然继续销毁
fn shutdown<R>(
    mut renderer: R,
    wait_idle: impl FnOnce(&R) -> anyhow::Result<()>,
    destroy_scene: impl FnOnce(&mut R) -> anyhow::Result<()>,
    destroy_renderer: impl FnOnce(R),
) -> anyhow::Result<()> {
    if let Err(e) = wait_idle(&renderer) {
        log::error!("{:#}", e);
    }
    let scene_result = destroy_scene(&mut renderer);
    destroy_renderer(renderer);
    scene_result
}
// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("winit event: resumed");
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init_after_window(event_loop) {
            self.report_fatal(event_loop, e.context("init renderer"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    self.report_fatal(event_loop, e.context("render frame"));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_shutdown_continues_after_idle_failure() {
        let calls = RefCell::new(Vec::new());
        let result = shutdown(
            &calls,
            |c| {
                c.borrow_mut().push("wait_idle");
                Err(anyhow::anyhow!("device lost"))
            },
            |c| {
                c.borrow_mut().push("scene");
                Ok(())
            },
            |c| c.borrow_mut().push("renderer"),
        );
        assert!(result.is_ok());
        assert_eq!(*calls.borrow(), vec!["wait_idle", "scene", "renderer"]);
    }

    #[test]
    fn test_shutdown_destroys_renderer_when_scene_fails() {
        let calls = RefCell::new(Vec::new());
        let result = shutdown(
            &calls,
            |c| {
                c.borrow_mut().push("wait_idle");
                Ok(())
            },
            |c| {
                c.borrow_mut().push("scene");
                Err(anyhow::anyhow!("stale mesh handle"))
            },
            |c| c.borrow_mut().push("renderer"),
        );
        assert!(result.is_err());
        assert_eq!(*calls.borrow(), vec!["wait_idle", "scene", "renderer"]);
    }
}
