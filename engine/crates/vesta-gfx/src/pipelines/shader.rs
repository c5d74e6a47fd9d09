use std::ffi::CStr;
use std::path::{Path, PathBuf};

use ash::vk;

use crate::{
    error::{GfxError, GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
    gfx_context::GfxContext,
};

/// # Destroy
///
/// 需要手动调用 `destroy` 方法来释放资源。
pub struct GfxShaderModule {
    handle: vk::ShaderModule,
}
impl GfxShaderModule {
    /// # param
    /// * path - spv shader 文件路径
    pub fn new(ctx: &GfxContext, path: &Path) -> GfxResult<Self> {
        let io_err = |source| GfxError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = std::fs::File::open(path).map_err(io_err)?;
        let shader_code = ash::util::read_spv(&mut file).map_err(io_err)?;

        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&shader_code);
        let handle = unsafe { ctx.device().create_shader_module(&shader_module_info, None) }
            .vk_check("vkCreateShaderModule")?;

        let shader_module = Self { handle };
        ctx.device().set_debug_name(&shader_module, path.to_string_lossy());
        Ok(shader_module)
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn destroy(self, ctx: &GfxContext) {
        unsafe {
            ctx.device().destroy_shader_module(self.handle, None);
        }
    }
}
impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

#[derive(Clone, Debug)]
pub struct ShaderStageInfo {
    pub stage: vk::ShaderStageFlags,
    pub entry_point: &'static CStr,
    pub path: PathBuf,
}
impl ShaderStageInfo {
    pub fn new(stage: vk::ShaderStageFlags, path: impl Into<PathBuf>) -> Self {
        Self {
            stage,
            entry_point: c"main",
            path: path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entry_point() {
        let info = ShaderStageInfo::new(vk::ShaderStageFlags::VERTEX, "shaders/mesh.vert.spv");
        assert_eq!(info.entry_point, c"main");
        assert_eq!(info.path, PathBuf::from("shaders/mesh.vert.spv"));
    }
}
