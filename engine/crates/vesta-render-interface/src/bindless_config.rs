use ash::vk;
use serde::{Deserialize, Serialize};

/// bindless 表中的资源种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindlessKind {
    UniformBuffer,
    Sampler,
    SampledImage,
    StorageImage,
    /// 存放 buffer device address 的表，本身只占一个 descriptor
    StorageBuffer,
}
impl BindlessKind {
    pub const ALL: [BindlessKind; 5] = [
        BindlessKind::UniformBuffer,
        BindlessKind::Sampler,
        BindlessKind::SampledImage,
        BindlessKind::StorageImage,
        BindlessKind::StorageBuffer,
    ];

    #[inline]
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            BindlessKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            BindlessKind::Sampler => vk::DescriptorType::SAMPLER,
            BindlessKind::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            BindlessKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            BindlessKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            BindlessKind::UniformBuffer => "uniform-buffer",
            BindlessKind::Sampler => "sampler",
            BindlessKind::SampledImage => "sampled-image",
            BindlessKind::StorageImage => "storage-image",
            BindlessKind::StorageBuffer => "storage-buffer",
        }
    }
}

/// bindless descriptor set 的 binding 编号与容量
///
/// binding 编号是与 shader 之间的 ABI，修改时需要同步修改 shader
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindlessConfig {
    pub ubo_binding: u32,
    pub sampler_binding: u32,
    pub sampled_image_binding: u32,
    pub storage_image_binding: u32,
    pub storage_buffer_binding: u32,

    pub ubo_count: u32,
    pub sampler_count: u32,
    pub sampled_image_count: u32,
    pub storage_image_count: u32,
    /// 地址表中的槽位数量
    pub storage_buffer_count: u32,
}
impl Default for BindlessConfig {
    fn default() -> Self {
        Self {
            ubo_binding: 0,
            sampler_binding: 1,
            sampled_image_binding: 2,
            storage_image_binding: 3,
            storage_buffer_binding: 4,

            ubo_count: 1,
            sampler_count: 4096,
            sampled_image_count: 4096,
            storage_image_count: 4096,
            storage_buffer_count: 4096,
        }
    }
}
impl BindlessConfig {
    #[inline]
    pub fn binding(&self, kind: BindlessKind) -> u32 {
        match kind {
            BindlessKind::UniformBuffer => self.ubo_binding,
            BindlessKind::Sampler => self.sampler_binding,
            BindlessKind::SampledImage => self.sampled_image_binding,
            BindlessKind::StorageImage => self.storage_image_binding,
            BindlessKind::StorageBuffer => self.storage_buffer_binding,
        }
    }

    /// 每种资源可以使用的槽位数量
    #[inline]
    pub fn capacity(&self, kind: BindlessKind) -> u32 {
        match kind {
            BindlessKind::UniformBuffer => self.ubo_count,
            BindlessKind::Sampler => self.sampler_count,
            BindlessKind::SampledImage => self.sampled_image_count,
            BindlessKind::StorageImage => self.storage_image_count,
            BindlessKind::StorageBuffer => self.storage_buffer_count,
        }
    }

    /// descriptor set layout 中的 descriptor 数量，storage buffer 只有地址表一个
    #[inline]
    pub fn descriptor_count(&self, kind: BindlessKind) -> u32 {
        match kind {
            BindlessKind::StorageBuffer => 1,
            _ => self.capacity(kind),
        }
    }

    /// binding 编号不能重复，容量不能为 0
    pub fn validate(&self) -> Result<(), String> {
        for (i, a) in BindlessKind::ALL.iter().enumerate() {
            if self.capacity(*a) == 0 {
                return Err(format!("bindless {} count must be greater than 0", a.name()));
            }
            for b in &BindlessKind::ALL[i + 1..] {
                if self.binding(*a) == self.binding(*b) {
                    return Err(format!(
                        "bindless {} and {} share binding {}",
                        a.name(),
                        b.name(),
                        self.binding(*a)
                    ));
                }
            }
        }
        Ok(())
    }

    /// layout 的 bindings 与对应的 binding flags
    pub fn layout_bindings(&self) -> (Vec<vk::DescriptorSetLayoutBinding<'static>>, Vec<vk::DescriptorBindingFlags>) {
        let flags = vk::DescriptorBindingFlags::PARTIALLY_BOUND
            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
            | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING;
        BindlessKind::ALL
            .iter()
            .map(|kind| {
                let binding = vk::DescriptorSetLayoutBinding::default()
                    .binding(self.binding(*kind))
                    .descriptor_type(kind.descriptor_type())
                    .descriptor_count(self.descriptor_count(*kind))
                    .stage_flags(vk::ShaderStageFlags::ALL);
                (binding, flags)
            })
            .unzip()
    }

    /// 每一帧一个 set，pool 的容量按帧数放大
    pub fn pool_sizes(&self, frames_in_flight: u32) -> Vec<vk::DescriptorPoolSize> {
        BindlessKind::ALL
            .iter()
            .map(|kind| vk::DescriptorPoolSize {
                ty: kind.descriptor_type(),
                descriptor_count: self.descriptor_count(*kind) * frames_in_flight,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let config = BindlessConfig::default();
        let bindings = BindlessKind::ALL.map(|k| config.binding(k));
        assert_eq!(bindings, [0, 1, 2, 3, 4]);
        assert_eq!(config.descriptor_count(BindlessKind::UniformBuffer), 1);
        assert_eq!(config.descriptor_count(BindlessKind::SampledImage), 4096);
        assert_eq!(config.descriptor_count(BindlessKind::StorageBuffer), 1);
        assert_eq!(config.capacity(BindlessKind::StorageBuffer), 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let config = BindlessConfig {
            sampler_binding: 2,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("binding 2"));
    }

    #[test]
    fn test_zero_count_rejected() {
        let config = BindlessConfig {
            sampler_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_layout_bindings() {
        let (bindings, flags) = BindlessConfig::default().layout_bindings();
        assert_eq!(bindings.len(), 5);
        assert_eq!(flags.len(), 5);
        assert_eq!(bindings[2].descriptor_type, vk::DescriptorType::SAMPLED_IMAGE);
        assert_eq!(bindings[4].descriptor_count, 1);
        assert!(flags.iter().all(|f| f.contains(vk::DescriptorBindingFlags::UPDATE_AFTER_BIND)));
    }

    #[test]
    fn test_pool_sizes_scale_with_frames() {
        let sizes = BindlessConfig::default().pool_sizes(2);
        let sampler = sizes.iter().find(|s| s.ty == vk::DescriptorType::SAMPLER).unwrap();
        assert_eq!(sampler.descriptor_count, 8192);
        let ubo = sizes.iter().find(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER).unwrap();
        assert_eq!(ubo.descriptor_count, 2);
    }

    #[test]
    fn test_partial_toml_fields_default() {
        let config: BindlessConfig = deserialize_one_field("sampler_count", 16);
        assert_eq!(config.sampler_count, 16);
        assert_eq!(config.sampled_image_count, 4096);
    }

    /// 只覆盖一个字段，其余字段走 serde(default)
    fn deserialize_one_field(field: &str, value: u32) -> BindlessConfig {
        use serde::de::value::{Error, MapDeserializer};
        let map = MapDeserializer::<_, Error>::new(std::iter::once((field, value)));
        BindlessConfig::deserialize(map).unwrap()
    }
}
