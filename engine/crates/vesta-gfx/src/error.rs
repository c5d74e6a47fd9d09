use std::panic::Location;
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;
use vesta_utils::PoolError;

/// GFX 层的错误
///
/// 除了 `Pool` 和 `BindlessSlotOutOfRange` 这类资源使用错误之外，
/// 其余错误都意味着 device 状态不再可信，调用方应当终止运行
#[derive(Error, Debug)]
pub enum GfxError {
    #[error("{op} failed: {} ({result:?}) at {location}", vk_result_str(*.result))]
    Vk {
        op: &'static str,
        result: vk::Result,
        location: &'static Location<'static>,
    },

    #[error("failed to load vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("vma allocation for <{name}> failed: {}", vk_result_str(*.result))]
    VmaAlloc { name: String, result: vk::Result },

    #[error("fence <{name}> not signaled within {timeout_ms} ms")]
    FenceTimeout { name: String, timeout_ms: u64 },

    #[error("no physical device with a graphics queue family was found")]
    NoSuitableDevice,

    #[error("required {kind} is missing: {name}")]
    MissingExtension { kind: &'static str, name: String },

    #[error("queue family {queue_family_index} can not present to the surface")]
    PresentNotSupported { queue_family_index: u32 },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("bindless {kind} slot {index} out of range (capacity {capacity})")]
    BindlessSlotOutOfRange { kind: &'static str, index: u32, capacity: u32 },

    #[error("{op} called in frame state {state}")]
    InvalidFrameState { op: &'static str, state: &'static str },

    #[error("{what} is not created or already destroyed")]
    NotInitialized { what: &'static str },

    #[error("{op} requires a bound {missing}")]
    IncompleteDrawState { op: &'static str, missing: &'static str },

    #[error("buffer <{name}> has no device address, SHADER_DEVICE_ADDRESS usage is required")]
    MissingDeviceAddress { name: String },

    #[error("buffer <{name}> is not host mapped")]
    BufferNotMapped { name: String },

    #[error("write of {len} bytes at offset {offset} overflows buffer <{name}> of {size} bytes")]
    BufferOverflow { name: String, offset: u64, len: u64, size: u64 },

    #[error("buffer usage {usage:?} is not allowed: {reason}")]
    InvalidBufferUsage { usage: vk::BufferUsageFlags, reason: &'static str },
}

pub type GfxResult<T> = Result<T, GfxError>;

/// 为 `VkResult<T>` 附加调用名与调用位置
pub trait VkCheck<T> {
    fn vk_check(self, op: &'static str) -> GfxResult<T>;
}

impl<T> VkCheck<T> for Result<T, vk::Result> {
    #[inline]
    #[track_caller]
    fn vk_check(self, op: &'static str) -> GfxResult<T> {
        let location = Location::caller();
        self.map_err(|result| GfxError::Vk { op, result, location })
    }
}

impl GfxError {
    /// 是否是 device 丢失，这种情况下不应再调用任何 device 函数
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            GfxError::Vk {
                result: vk::Result::ERROR_DEVICE_LOST,
                ..
            }
        )
    }
}

/// VkResult 的可读名称
pub fn vk_result_str(result: vk::Result) -> &'static str {
    match result {
        vk::Result::SUCCESS => "VK_SUCCESS",
        vk::Result::NOT_READY => "VK_NOT_READY",
        vk::Result::TIMEOUT => "VK_TIMEOUT",
        vk::Result::EVENT_SET => "VK_EVENT_SET",
        vk::Result::EVENT_RESET => "VK_EVENT_RESET",
        vk::Result::INCOMPLETE => "VK_INCOMPLETE",
        vk::Result::ERROR_OUT_OF_HOST_MEMORY => "VK_ERROR_OUT_OF_HOST_MEMORY",
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => "VK_ERROR_OUT_OF_DEVICE_MEMORY",
        vk::Result::ERROR_INITIALIZATION_FAILED => "VK_ERROR_INITIALIZATION_FAILED",
        vk::Result::ERROR_DEVICE_LOST => "VK_ERROR_DEVICE_LOST",
        vk::Result::ERROR_MEMORY_MAP_FAILED => "VK_ERROR_MEMORY_MAP_FAILED",
        vk::Result::ERROR_LAYER_NOT_PRESENT => "VK_ERROR_LAYER_NOT_PRESENT",
        vk::Result::ERROR_EXTENSION_NOT_PRESENT => "VK_ERROR_EXTENSION_NOT_PRESENT",
        vk::Result::ERROR_FEATURE_NOT_PRESENT => "VK_ERROR_FEATURE_NOT_PRESENT",
        vk::Result::ERROR_INCOMPATIBLE_DRIVER => "VK_ERROR_INCOMPATIBLE_DRIVER",
        vk::Result::ERROR_TOO_MANY_OBJECTS => "VK_ERROR_TOO_MANY_OBJECTS",
        vk::Result::ERROR_FORMAT_NOT_SUPPORTED => "VK_ERROR_FORMAT_NOT_SUPPORTED",
        vk::Result::ERROR_FRAGMENTED_POOL => "VK_ERROR_FRAGMENTED_POOL",
        vk::Result::ERROR_UNKNOWN => "VK_ERROR_UNKNOWN",
        vk::Result::ERROR_OUT_OF_POOL_MEMORY => "VK_ERROR_OUT_OF_POOL_MEMORY",
        vk::Result::ERROR_INVALID_EXTERNAL_HANDLE => "VK_ERROR_INVALID_EXTERNAL_HANDLE",
        vk::Result::ERROR_FRAGMENTATION => "VK_ERROR_FRAGMENTATION",
        vk::Result::ERROR_INVALID_OPAQUE_CAPTURE_ADDRESS => "VK_ERROR_INVALID_OPAQUE_CAPTURE_ADDRESS",
        vk::Result::PIPELINE_COMPILE_REQUIRED => "VK_PIPELINE_COMPILE_REQUIRED",
        vk::Result::ERROR_SURFACE_LOST_KHR => "VK_ERROR_SURFACE_LOST_KHR",
        vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => "VK_ERROR_NATIVE_WINDOW_IN_USE_KHR",
        vk::Result::SUBOPTIMAL_KHR => "VK_SUBOPTIMAL_KHR",
        vk::Result::ERROR_OUT_OF_DATE_KHR => "VK_ERROR_OUT_OF_DATE_KHR",
        vk::Result::ERROR_INCOMPATIBLE_DISPLAY_KHR => "VK_ERROR_INCOMPATIBLE_DISPLAY_KHR",
        vk::Result::ERROR_VALIDATION_FAILED_EXT => "VK_ERROR_VALIDATION_FAILED_EXT",
        _ => "VK_UNKNOWN_RESULT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_result_str() {
        assert_eq!(vk_result_str(vk::Result::ERROR_DEVICE_LOST), "VK_ERROR_DEVICE_LOST");
        assert_eq!(vk_result_str(vk::Result::SUBOPTIMAL_KHR), "VK_SUBOPTIMAL_KHR");
        assert_eq!(vk_result_str(vk::Result::from_raw(-123456)), "VK_UNKNOWN_RESULT");
    }

    #[test]
    fn test_vk_check_records_call_site() {
        let line = line!() + 1;
        let err = Err::<(), _>(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).vk_check("vkAllocateMemory").unwrap_err();
        match &err {
            GfxError::Vk { op, result, location } => {
                assert_eq!(*op, "vkAllocateMemory");
                assert_eq!(*result, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
                assert_eq!(location.line(), line);
                assert!(location.file().ends_with("error.rs"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let msg = err.to_string();
        assert!(msg.starts_with("vkAllocateMemory failed: VK_ERROR_OUT_OF_DEVICE_MEMORY"));
        assert!(msg.contains("error.rs"));
    }

    #[test]
    fn test_vk_check_passes_value() {
        assert_eq!(Ok::<_, vk::Result>(7).vk_check("vkNothing").unwrap(), 7);
    }

    #[test]
    fn test_device_lost() {
        let lost = Err::<(), _>(vk::Result::ERROR_DEVICE_LOST).vk_check("vkQueueSubmit2").unwrap_err();
        assert!(lost.is_device_lost());
        assert!(!GfxError::NoSuitableDevice.is_device_lost());
    }

    #[test]
    fn test_pool_error_conversion() {
        let err: GfxError = PoolError::Exhausted { capacity: 4 }.into();
        assert!(matches!(err, GfxError::Pool(PoolError::Exhausted { capacity: 4 })));
    }
}
