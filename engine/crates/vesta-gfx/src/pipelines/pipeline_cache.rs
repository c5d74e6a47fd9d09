use std::path::Path;

use ash::vk;

use crate::{
    error::{GfxError, GfxResult, VkCheck},
    gfx_context::GfxContext,
};

/// 以不透明的二进制 blob 预热的 pipeline cache
///
/// blob 的格式由驱动决定，这里只负责原样读入
pub struct GfxPipelineCache {
    handle: vk::PipelineCache,
}
impl GfxPipelineCache {
    /// blob 文件不存在时创建空的 cache
    pub fn from_file(ctx: &GfxContext, path: &Path) -> GfxResult<Self> {
        let initial_data = read_cache_blob(path)?;
        Self::new(ctx, &initial_data)
    }

    pub fn new(ctx: &GfxContext, initial_data: &[u8]) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxPipelineCache::new");
        let info = vk::PipelineCacheCreateInfo::default().initial_data(initial_data);
        let handle = unsafe { ctx.device().create_pipeline_cache(&info, None) }.vk_check("vkCreatePipelineCache")?;
        log::info!("pipeline cache created with {} bytes of initial data", initial_data.len());
        Ok(Self { handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineCache {
        self.handle
    }

    pub fn destroy(self, ctx: &GfxContext) {
        unsafe {
            ctx.device().destroy_pipeline_cache(self.handle, None);
        }
    }
}

fn read_cache_blob(path: &Path) -> GfxResult<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("pipeline cache blob not found: {}, using an empty cache", path.display());
            Ok(Vec::new())
        }
        Err(source) => Err(GfxError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_blob_is_empty() {
        let path = std::env::temp_dir().join("vesta-missing-pipeline-cache.bin");
        let _ = std::fs::remove_file(&path);
        assert!(read_cache_blob(&path).unwrap().is_empty());
    }

    #[test]
    fn test_blob_bytes_passed_through() {
        let path = std::env::temp_dir().join("vesta-pipeline-cache-blob.bin");
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();
        assert_eq!(read_cache_blob(&path).unwrap(), vec![1, 2, 3, 4]);
        std::fs::remove_file(&path).unwrap();
    }
}
