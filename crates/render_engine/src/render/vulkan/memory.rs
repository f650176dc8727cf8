//! Device memory-type selection
//!
//! Every buffer and image allocation funnels through `find_type`: the first
//! memory type whose bit is set in the resource's type bitmask and whose
//! property flags are a superset of the requested properties wins. Failure
//! is final for the allocation — the hardware's memory-type table will not
//! change between attempts.

use ash::vk;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Find a memory type index satisfying a type bitmask and property flags
pub fn find_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    required_type_bits: u32,
    required_properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    for index in 0..memory_properties.memory_type_count {
        let has_required_type = (1 << index) & required_type_bits != 0;
        let property_flags = memory_properties.memory_types[index as usize].property_flags;
        if has_required_type && property_flags.contains(required_properties) {
            return Ok(index);
        }
    }

    Err(VulkanError::NoSuitableMemoryType)
}

/// Build the allocation info for a resource's actual memory requirements
pub fn allocation_info(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: &vk::MemoryRequirements,
    required_properties: vk::MemoryPropertyFlags,
) -> VulkanResult<vk::MemoryAllocateInfo> {
    let memory_type_index = find_type(
        memory_properties,
        requirements.memory_type_bits,
        required_properties,
    )?;

    Ok(vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (slot, &flags) in properties.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        properties
    }

    #[test]
    fn first_matching_type_wins() {
        let properties = table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_type(
            &properties,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .expect("type 1 qualifies");
        assert_eq!(index, 1);
    }

    #[test]
    fn type_bitmask_excludes_otherwise_suitable_types() {
        let properties = table(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        // only bit 1 set: type 0 is property-suitable but type-excluded
        let index = find_type(&properties, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE)
            .expect("type 1 qualifies");
        assert_eq!(index, 1);
    }

    #[test]
    fn property_superset_is_required() {
        let properties = table(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);

        let result = find_type(
            &properties,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }

    #[test]
    fn allocation_uses_actual_requirement_size() {
        let properties = table(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let requirements = vk::MemoryRequirements {
            size: 4096,
            alignment: 256,
            memory_type_bits: 0b1,
        };

        let info = allocation_info(&properties, &requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .expect("type 0 qualifies");
        assert_eq!(info.allocation_size, 4096);
        assert_eq!(info.memory_type_index, 0);
    }
}
