//! Vulkan GFX 抽象层
//!
//! 提供对 Vulkan API 的封装，包括设备管理、命令缓冲、同步对象、资源、管线以及交换链。
//!
//! 所有 Vulkan 核心对象由 [`gfx_context::GfxContext`] 持有，
//! 需要 device 或 allocator 的操作显式接收 `&GfxContext`，初始化顺序由调用方决定。

pub mod commands;
pub mod descriptors;
pub mod error;
pub mod foundation;
pub mod gfx_context;
pub mod pipelines;
pub mod resources;
pub mod sampler;
pub mod swapchain;

pub use error::{GfxError, GfxResult, VkCheck};
pub use gfx_context::GfxContext;
