use std::path::PathBuf;

use ash::vk;
use serde::{Deserialize, Serialize};
use vesta_crate_tools::resource::VestaPath;
use vesta_render_interface::bindless_config::BindlessConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentModeConfig {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}
impl PresentModeConfig {
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentModeConfig::Fifo => vk::PresentModeKHR::FIFO,
            PresentModeConfig::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModeConfig::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}
impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vesta".to_string(),
            width: 960,
            height: 540,
        }
    }
}

/// 相对路径基于工作区根目录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub pipeline_cache: PathBuf,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub error_texture: PathBuf,
    pub debug_normal_texture: PathBuf,
}
impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pipeline_cache: "assets/pipeline_cache.bin".into(),
            vertex_shader: "assets/shaders/pbr.vert.spv".into(),
            fragment_shader: "assets/shaders/pbr.frag.spv".into(),
            error_texture: "assets/textures/error.png".into(),
            debug_normal_texture: "assets/textures/debug_normal.png".into(),
        }
    }
}
impl PathsConfig {
    #[inline]
    pub fn resolve(path: &PathBuf) -> PathBuf {
        VestaPath::resolve(path)
    }
}

/// 渲染器的配置，对应 `config/vesta.toml`
///
/// 所有字段都有默认值，配置文件中只需要写需要修改的部分
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub app_name: String,
    pub window: WindowConfig,

    pub frames_in_flight: usize,
    pub bindless: BindlessConfig,

    /// 同时存在的 graphics pipeline 上限
    pub shader_count: u32,
    /// 材质数据块的数量
    pub material_count: u32,

    /// fence 等待与 acquire image 的超时时间
    pub fence_timeout_ms: u64,
    /// 资源释放后把 bindless 槽位写回默认资源
    pub scrub_freed_bindless_slots: bool,

    pub present_mode: PresentModeConfig,
    pub staging_buffer_size: u64,

    pub paths: PathsConfig,
}
impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Vesta".to_string(),
            window: WindowConfig::default(),
            frames_in_flight: Self::MAX_FRAMES_IN_FLIGHT,
            bindless: BindlessConfig::default(),
            shader_count: 256,
            material_count: 1024,
            fence_timeout_ms: 5000,
            scrub_freed_bindless_slots: true,
            present_mode: PresentModeConfig::default(),
            staging_buffer_size: 64 * 1024 * 1024,
            paths: PathsConfig::default(),
        }
    }
}
impl RendererConfig {
    pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

    /// push constant 的大小是和 shader 约定的 ABI，不可配置
    pub const PUSH_CONSTANT_SIZE: u32 = vesta_render_interface::gpu_types::PushConstantBlock::SIZE as u32;

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=3).contains(&self.frames_in_flight),
            "frames_in_flight must be in 1..=3, got {}",
            self.frames_in_flight
        );
        self.bindless.validate().map_err(anyhow::Error::msg)?;
        anyhow::ensure!(self.shader_count > 0, "shader_count must be greater than 0");
        anyhow::ensure!(self.material_count > 0, "material_count must be greater than 0");
        anyhow::ensure!(self.fence_timeout_ms > 0, "fence_timeout_ms must be greater than 0");
        anyhow::ensure!(self.staging_buffer_size > 0, "staging_buffer_size must be greater than 0");
        anyhow::ensure!(
            self.window.width > 0 && self.window.height > 0,
            "window size {}x{} is invalid",
            self.window.width,
            self.window.height
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> RendererConfig {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        config.validate().unwrap();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.window.width, 960);
        assert_eq!(config.window.height, 540);
        assert_eq!(RendererConfig::PUSH_CONSTANT_SIZE, 256);
    }

    #[test]
    fn test_empty_file_falls_back_to_default() {
        assert_eq!(parse(""), RendererConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = parse(
            r#"
            frames_in_flight = 3
            present_mode = "mailbox"

            [window]
            title = "demo"

            [bindless]
            sampler_count = 16
            "#,
        );
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.present_mode, PresentModeConfig::Mailbox);
        assert_eq!(config.present_mode.to_vk(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.width, 960);
        assert_eq!(config.bindless.sampler_count, 16);
        assert_eq!(config.bindless.sampled_image_count, 4096);
        config.validate().unwrap();
    }

    #[test]
    fn test_frames_in_flight_out_of_range() {
        for frames in [0, 4] {
            let config = RendererConfig {
                frames_in_flight: frames,
                ..Default::default()
            };
            let msg = config.validate().unwrap_err().to_string();
            assert!(msg.contains("frames_in_flight"));
        }
    }

    #[test]
    fn test_bindless_binding_conflict() {
        let mut config = RendererConfig::default();
        config.bindless.sampler_binding = config.bindless.ubo_binding;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_present_mode_rejected() {
        assert!(toml::from_str::<RendererConfig>(r#"present_mode = "vsync""#).is_err());
    }

    #[test]
    fn test_relative_paths_resolved_from_workspace() {
        let paths = PathsConfig::default();
        let resolved = PathsConfig::resolve(&paths.vertex_shader);
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("assets/shaders/pbr.vert.spv"));
    }
}
