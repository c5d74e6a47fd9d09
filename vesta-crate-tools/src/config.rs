use std::{fs, path::Path};

use anyhow::Context;
use serde::de::DeserializeOwned;

/// 从 TOML 文件中读取配置
pub fn load_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_toml(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// 文件不存在时使用默认配置；文件存在但格式错误时仍然返回错误
pub fn load_toml_or_default<T: DeserializeOwned + Default>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    if !path.exists() {
        log::warn!("config file not found: {}, using default config", path.display());
        return Ok(T::default());
    }
    load_toml(path)
}

pub fn parse_toml<T: DeserializeOwned>(content: &str) -> anyhow::Result<T> {
    toml::from_str(content).context("invalid toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Default, PartialEq)]
    #[serde(default)]
    struct WindowConfig {
        width: u32,
        height: u32,
        title: String,
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: WindowConfig = parse_toml("width = 960\n").unwrap();
        assert_eq!(cfg.width, 960);
        assert_eq!(cfg.height, 0);
        assert!(cfg.title.is_empty());
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result: anyhow::Result<WindowConfig> = parse_toml("width = \"wide\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_uses_default() {
        let path = std::env::temp_dir().join("vesta-crate-tools-missing-config.toml");
        let cfg: WindowConfig = load_toml_or_default(&path).unwrap();
        assert_eq!(cfg, WindowConfig::default());

        let result: anyhow::Result<WindowConfig> = load_toml(&path);
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("Failed to read config file"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("vesta-crate-tools-{}.toml", std::process::id()));
        fs::write(&path, "width = 1280\nheight = 720\ntitle = \"vesta\"\n").unwrap();
        let cfg: WindowConfig = load_toml(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(
            cfg,
            WindowConfig {
                width: 1280,
                height: 720,
                title: "vesta".to_string()
            }
        );
    }
}
