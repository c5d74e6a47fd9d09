use ash::vk;
use itertools::Itertools;
use std::cell::Cell;
use std::{
    ffi::{CStr, CString},
    ops::Deref,
};

use crate::{
    error::{GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
};

/// Vulkan 逻辑设备封装
///
/// 包含核心设备 API 以及扩展的函数指针，这些函数指针在应用生命周期中保持不变，可以安全共享。
///
/// # 扩展支持
/// - Dynamic Rendering (KHR)
/// - Debug Utils (EXT)
/// - Swapchain (KHR)
pub struct GfxDevice {
    /// 核心 Vulkan 设备 API
    pub(crate) device: ash::Device,
    /// 动态渲染扩展 API
    pub(crate) dynamic_rendering: ash::khr::dynamic_rendering::Device,
    /// 调试工具扩展 API
    pub(crate) debug_utils: ash::ext::debug_utils::Device,
    /// 交换链扩展 API
    pub(crate) swapchain: ash::khr::swapchain::Device,

    #[cfg(debug_assertions)]
    destroyed: Cell<bool>,
}

// 构造与销毁
impl GfxDevice {
    pub fn new(
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        queue_create_info: &[vk::DeviceQueueCreateInfo],
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxDevice::new");

        // device 所需的所有 extension
        let device_exts = Self::basic_device_exts().iter().map(|e| e.as_ptr()).collect_vec();
        let exts_str = Self::basic_device_exts().iter().map(|e| format!("\n\t{:?}", e)).join("");
        log::info!("device exts: {}", exts_str);

        // device 所需的所有 features
        let mut all_features = vk::PhysicalDeviceFeatures2::default().features(Self::physical_device_basic_features());
        let mut physical_device_ext_features = Self::physical_device_extra_features();
        unsafe {
            physical_device_ext_features.iter_mut().for_each(|f| {
                let ptr = <*mut dyn vk::ExtendsPhysicalDeviceFeatures2>::cast::<vk::BaseOutStructure>(f.as_mut());
                (*ptr).p_next = all_features.p_next as _;
                all_features.p_next = ptr as _;
            });
        }

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(queue_create_info)
            .enabled_extension_names(&device_exts)
            .push_next(&mut all_features);

        let device =
            unsafe { instance.create_device(pdevice, &device_create_info, None) }.vk_check("vkCreateDevice")?;

        let dynamic_rendering = ash::khr::dynamic_rendering::Device::new(instance, &device);
        let debug_utils = ash::ext::debug_utils::Device::new(instance, &device);
        let swapchain = ash::khr::swapchain::Device::new(instance, &device);

        Ok(Self {
            device,
            dynamic_rendering,
            debug_utils,
            swapchain,

            #[cfg(debug_assertions)]
            destroyed: Cell::new(false),
        })
    }

    pub fn destroy(&self) {
        log::info!("destroying device");

        #[cfg(debug_assertions)]
        self.destroyed.set(true);

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

// 创建过程的辅助函数
impl GfxDevice {
    /// 必要的 physical device core features
    fn physical_device_basic_features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .shader_int64(true) // 用于 buffer device address
    }

    /// 必要的 physical device extension features
    fn physical_device_extra_features() -> Vec<Box<dyn vk::ExtendsPhysicalDeviceFeatures2>> {
        vec![
            Box::new(vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true)),
            Box::new(vk::PhysicalDeviceBufferDeviceAddressFeatures::default().buffer_device_address(true)),
            Box::new(vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true)),
            // bindless table 依赖的特性
            Box::new(
                vk::PhysicalDeviceDescriptorIndexingFeatures::default()
                    .descriptor_binding_partially_bound(true) // 即使一些 descriptor 是 invalid
                    .runtime_descriptor_array(true)
                    .shader_sampled_image_array_non_uniform_indexing(true)
                    .shader_storage_image_array_non_uniform_indexing(true)
                    .descriptor_binding_uniform_buffer_update_after_bind(true)
                    .descriptor_binding_sampled_image_update_after_bind(true)
                    .descriptor_binding_storage_image_update_after_bind(true)
                    .descriptor_binding_storage_buffer_update_after_bind(true)
                    .descriptor_binding_update_unused_while_pending(true),
            ),
            Box::new(vk::PhysicalDeviceShaderDrawParametersFeatures::default().shader_draw_parameters(true)),
            // shader 中的 block 都使用 scalar 布局：vec3 数组的 stride 为 12
            Box::new(vk::PhysicalDeviceScalarBlockLayoutFeatures::default().scalar_block_layout(true)),
            Box::new(
                vk::PhysicalDeviceUniformBufferStandardLayoutFeatures::default().uniform_buffer_standard_layout(true),
            ),
        ]
    }

    /// 必要的 device extensions
    fn basic_device_exts() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,
            // 已经提升到 core-1.3.0，显式开启可以兼容旧驱动
            ash::khr::dynamic_rendering::NAME,
        ]
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }
    #[inline]
    pub fn dynamic_rendering(&self) -> &ash::khr::dynamic_rendering::Device {
        &self.dynamic_rendering
    }
    #[inline]
    pub fn debug_utils(&self) -> &ash::ext::debug_utils::Device {
        &self.debug_utils
    }
    #[inline]
    pub fn swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain
    }
}

// tools
impl GfxDevice {
    /// debug name 只用于调试，设置失败时只记录日志
    #[inline]
    pub fn set_object_debug_name<T: vk::Handle>(&self, handle: T, name: impl AsRef<str>) {
        let name = CString::new(name.as_ref()).unwrap_or_default();
        let result = unsafe {
            self.debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            )
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        let debug_name = format!("{}::{}", T::debug_type_name(), name.as_ref());
        self.set_object_debug_name(handle.vk_handle(), debug_name);
    }

    #[inline]
    pub fn wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle() }.vk_check("vkDeviceWaitIdle")
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
impl Drop for GfxDevice {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.destroyed.get(), "GfxDevice must be destroyed before being dropped.");
    }
}
impl DebugType for GfxDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.device.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 按 sType 在 feature 链中查找
    fn find_feature<T: vk::TaggedStructure>(features: &[Box<dyn vk::ExtendsPhysicalDeviceFeatures2>]) -> Option<&T> {
        features.iter().find_map(|f| unsafe {
            let ptr = <*const dyn vk::ExtendsPhysicalDeviceFeatures2>::cast::<vk::BaseOutStructure>(f.as_ref());
            ((*ptr).s_type == T::STRUCTURE_TYPE).then(|| &*ptr.cast::<T>())
        })
    }

    #[test]
    fn test_scalar_block_layout_enabled() {
        let features = GfxDevice::physical_device_extra_features();
        let scalar = find_feature::<vk::PhysicalDeviceScalarBlockLayoutFeatures>(&features).unwrap();
        assert_eq!(scalar.scalar_block_layout, vk::TRUE);

        let std_layout = find_feature::<vk::PhysicalDeviceUniformBufferStandardLayoutFeatures>(&features).unwrap();
        assert_eq!(std_layout.uniform_buffer_standard_layout, vk::TRUE);
    }

    #[test]
    fn test_vertex_pulling_features_enabled() {
        let features = GfxDevice::physical_device_extra_features();
        let bda = find_feature::<vk::PhysicalDeviceBufferDeviceAddressFeatures>(&features).unwrap();
        assert_eq!(bda.buffer_device_address, vk::TRUE);

        let indexing = find_feature::<vk::PhysicalDeviceDescriptorIndexingFeatures>(&features).unwrap();
        assert_eq!(indexing.descriptor_binding_partially_bound, vk::TRUE);
        assert_eq!(indexing.runtime_descriptor_array, vk::TRUE);

        assert_eq!(GfxDevice::physical_device_basic_features().shader_int64, vk::TRUE);
    }

    #[test]
    fn test_feature_types_are_unique() {
        let features = GfxDevice::physical_device_extra_features();
        let types = features
            .iter()
            .map(|f| unsafe {
                let ptr = <*const dyn vk::ExtendsPhysicalDeviceFeatures2>::cast::<vk::BaseOutStructure>(f.as_ref());
                (*ptr).s_type
            })
            .collect_vec();
        assert_eq!(types.iter().unique().count(), types.len());
    }
}
