use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::command_queue::GfxQueueFamily,
    error::{GfxError, GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
};

/// 表示一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,

    /// graphics | compute | transfer 全能的 queue family
    pub(crate) gfx_queue_family: GfxQueueFamily,
}

impl GfxPhysicalDevice {
    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    ///
    /// 没有 graphics queue family 的显卡会被跳过
    pub fn new_descrete_physical_device(instance: &ash::Instance) -> GfxResult<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices() }.vk_check("vkEnumeratePhysicalDevices")?;
        pdevices
            .iter()
            .filter_map(|pdevice| GfxPhysicalDevice::new(*pdevice, instance))
            // 优先使用独立显卡
            .find_or_first(GfxPhysicalDevice::is_descrete_gpu)
            .ok_or(GfxError::NoSuitableDevice)
    }

    fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance) -> Option<Self> {
        unsafe {
            let basic_props = instance.get_physical_device_properties(pdevice);
            let physical_device_name = CStr::from_ptr(basic_props.device_name.as_ptr());
            log::info!("found gpu: {:?}", physical_device_name);

            // 找到所有的队列信息并打印出来
            let queue_family_props = instance.get_physical_device_queue_family_properties(pdevice);
            log::debug!("physical device: queue family props:\n{:#?}", queue_family_props);

            let required_flags = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER;
            let Some(gfx_queue_family) = queue_family_props
                .iter()
                .enumerate()
                .find(|(_, props)| props.queue_flags.contains(required_flags))
                .map(|(family_idx, props)| GfxQueueFamily {
                    name: "gfx".to_string(),
                    queue_family_index: family_idx as u32,
                    queue_flags: props.queue_flags,
                    queue_count: props.queue_count,
                })
            else {
                log::warn!("gpu {:?} has no graphics queue family, skipped", physical_device_name);
                return None;
            };

            Some(Self {
                vk_handle: pdevice,
                basic_props,
                gfx_queue_family,
            })
        }
    }

    #[inline]
    /// 当前 gpu 是否是独立显卡
    pub fn is_descrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }
}

// getter
impl GfxPhysicalDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.vk_handle
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> &GfxQueueFamily {
        &self.gfx_queue_family
    }

    #[inline]
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.basic_props.limits.max_sampler_anisotropy
    }

    pub fn device_name(&self) -> String {
        unsafe { CStr::from_ptr(self.basic_props.device_name.as_ptr()) }.to_string_lossy().into_owned()
    }
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
