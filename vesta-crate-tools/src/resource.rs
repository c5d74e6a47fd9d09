use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let config = VestaPath::config_path("vesta.toml");              // config/vesta.toml
/// let texture = VestaPath::assets_path("textures/error.png");     // assets/textures/error.png
/// let shader = VestaPath::resolve("assets/shaders/pbr.vert.spv"); // 相对路径基于工作区根目录
/// ```
pub struct VestaPath {}
// 核心路径
impl VestaPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }

    /// 绝对路径保持不变，相对路径基于工作区根目录
    pub fn resolve(path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() { path.to_path_buf() } else { Self::workspace_path().join(path) }
    }
}
// 根目录下
impl VestaPath {
    /// 获取 `assets/` 目录下的文件路径
    pub fn assets_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("assets").join(filename)
    }

    /// 获取 `config/` 目录下的文件路径
    pub fn config_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("config").join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_path() {
        let resolved = VestaPath::resolve("assets/shaders/pbr.vert.spv");
        assert!(resolved.starts_with(VestaPath::workspace_path()));
        assert!(resolved.ends_with("assets/shaders/pbr.vert.spv"));
    }

    #[test]
    fn test_resolve_absolute_path() {
        let abs = VestaPath::workspace_path().join("a.bin");
        assert_eq!(VestaPath::resolve(&abs), abs);
    }

    #[test]
    fn test_config_path() {
        assert!(VestaPath::config_path("vesta.toml").ends_with("config/vesta.toml"));
    }
}
