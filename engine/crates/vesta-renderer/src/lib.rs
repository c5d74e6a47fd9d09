//! 渲染器：初始化与销毁、帧循环、材质与 mesh
//!
//! [`renderer::Renderer`] 持有全部 GPU 对象，初始化的每一步都会把对应的销毁动作压入 dispose stack。

pub mod default_resources;
pub mod frame_pipeline;
pub mod material;
pub mod mesh;
pub mod render_context;
pub mod renderer;
pub mod renderer_config;
