use std::ffi::CStr;

use ash::vk;

use crate::error::{GfxResult, VkCheck};

/// 将 validation layer 的消息转发到 log
pub struct GfxDebugMsger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl GfxDebugMsger {
    pub fn new(vk_entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(vk_entry, instance);

        let create_info = Self::debug_utils_messenger_ci();
        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .vk_check("vkCreateDebugUtilsMessengerEXT")?;

        Ok(Self { loader, messenger })
    }

    pub fn destroy(self) {
        log::info!("Destroying GfxDebugMsger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// debug messenger 的回调函数
/// # Safety
/// 由 vulkan loader 调用，`p_callback_data` 在回调期间有效
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let msg = if p_callback_data.is_null() || unsafe { (*p_callback_data).p_message.is_null() } {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr((*p_callback_data).p_message).to_string_lossy() }
    };

    let format_msg = format!("[{:?}]\n{}\n", message_type, format_validation_message(msg.as_ref()));

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{}", format_msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{}", format_msg),
        _ => log::info!("{}", format_msg),
    };

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}

/// validation layer 可以输出 json 格式的消息
///
/// 其中 MainMessage 字段带有换行符，单独放到最后输出；非 json 的消息原样返回
fn format_validation_message(msg: &str) -> String {
    let Ok(serde_json::Value::Object(mut obj)) = serde_json::from_str::<serde_json::Value>(msg) else {
        return msg.to_string();
    };

    let main_msg = obj.remove("MainMessage");
    let main_msg = main_msg.as_ref().and_then(|value| value.as_str()).unwrap_or_default();
    let rest = serde_json::to_string_pretty(&obj).unwrap_or_default();
    format!("{}\n{}", rest, main_msg)
}

// 构造过程辅助函数
impl GfxDebugMsger {
    const MSG_TYPE: vk::DebugUtilsMessageTypeFlagsEXT = vk::DebugUtilsMessageTypeFlagsEXT::from_raw(
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL.as_raw()
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION.as_raw()
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE.as_raw(),
    );

    const MSG_SEVERITY: vk::DebugUtilsMessageSeverityFlagsEXT = vk::DebugUtilsMessageSeverityFlagsEXT::from_raw(
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING.as_raw() | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR.as_raw(),
    );

    /// 用于创建 debug messenger 的结构体，也会挂到 instance 的 p_next 上，捕获 instance 创建期间的消息
    pub fn debug_utils_messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(Self::MSG_SEVERITY)
            .message_type(Self::MSG_TYPE)
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

/// 可以设置 debug name 的 vulkan 对象
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_plain_message() {
        assert_eq!(format_validation_message("plain text"), "plain text");
    }

    #[test]
    fn test_format_json_message() {
        let msg = r#"{"MainMessage": "line1\nline2", "MessageID": 42}"#;
        let formatted = format_validation_message(msg);
        assert!(formatted.ends_with("line1\nline2"));
        assert!(formatted.contains("\"MessageID\": 42"));
        assert!(!formatted.contains("MainMessage"));
    }
}
