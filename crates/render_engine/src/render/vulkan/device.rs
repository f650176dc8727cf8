//! Physical adapter selection and logical device construction
//!
//! Adapters are scored rather than first-matched: an adapter missing the
//! required extensions, swapchain support or queue families scores zero;
//! otherwise it scores one, plus one for anisotropic filtering and plus two
//! for a queue family serving both graphics and presentation. The maximum
//! scorer wins, so cross-family synchronization overhead and lower-quality
//! sampling are avoided without being hard requirements.

use std::collections::BTreeSet;

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;
use ash::Instance;

use crate::render::vulkan::instance::{gather_extensions, name_from_raw, VulkanInstance};
use crate::render::vulkan::surface::WindowSurface;
use crate::render::vulkan::swapchain::SupportDetails;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Queue family indices for graphics and presentation
///
/// Derived once per adapter; both must exist for the adapter to be viable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilies {
    /// Index of a graphics-capable queue family
    pub graphics: Option<u32>,
    /// Index of a present-capable queue family
    pub present: Option<u32>,
}

impl QueueFamilies {
    /// Choose indices from the sets of graphics- and present-capable families
    ///
    /// Prefers an index in the intersection of both sets: a single shared
    /// queue keeps submission ordering trivial. Falls back to independent
    /// first picks when no family supports both.
    pub fn select(graphics_families: &BTreeSet<u32>, present_families: &BTreeSet<u32>) -> Self {
        if let Some(&shared) = graphics_families.intersection(present_families).next() {
            return Self {
                graphics: Some(shared),
                present: Some(shared),
            };
        }

        Self {
            graphics: graphics_families.iter().next().copied(),
            present: present_families.iter().next().copied(),
        }
    }

    /// Enumerate an adapter's queue families and choose indices
    pub fn query(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        surface: &WindowSurface,
    ) -> VulkanResult<Self> {
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        let mut graphics_families = BTreeSet::new();
        let mut present_families = BTreeSet::new();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics_families.insert(index);
            }

            let present_support = unsafe {
                surface
                    .loader()
                    .get_physical_device_surface_support(physical_device, index, surface.handle())
                    .map_err(VulkanError::Api)?
            };
            if present_support {
                present_families.insert(index);
            }
        }

        Ok(Self::select(&graphics_families, &present_families))
    }

    /// Whether both required families exist
    pub fn complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Whether a single family serves both graphics and presentation
    pub fn shared(&self) -> bool {
        self.complete() && self.graphics == self.present
    }
}

/// Score an adapter from its evaluated capabilities
///
/// Zero disqualifies; the other weights steer selection toward shared-family
/// adapters first, anisotropic filtering second.
pub(crate) fn score_adapter(
    has_required_extensions: bool,
    swapchain_adequate: bool,
    families: &QueueFamilies,
    supports_anisotropy: bool,
) -> u32 {
    if !has_required_extensions || !swapchain_adequate || !families.complete() {
        return 0;
    }

    let mut score = 1;
    if supports_anisotropy {
        score += 1;
    }
    if families.shared() {
        score += 2;
    }
    score
}

/// Immutable result of physical adapter selection
pub struct AdapterInfo {
    /// Selected physical device handle
    pub physical_device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Features the device supports (not necessarily enabled)
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory-type table used for every allocation
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Chosen queue family indices
    pub families: QueueFamilies,
}

/// Logical device, its queues and command pools
pub struct Device {
    instance: Instance,
    device: ash::Device,
    adapter: AdapterInfo,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    command_pool: vk::CommandPool,
    transient_pool: vk::CommandPool,
    swapchain_loader: SwapchainLoader,
}

impl Device {
    /// Device extensions every viable adapter must provide
    fn required_extensions() -> Vec<String> {
        vec![SwapchainLoader::name()
            .to_str()
            .expect("extension name is valid UTF-8")
            .to_string()]
    }

    /// Select the best adapter and build the logical device around it
    pub fn new(instance: &VulkanInstance, surface: &WindowSurface) -> VulkanResult<Self> {
        let instance = instance.instance().clone();
        let adapter = Self::select_physical_adapter(&instance, surface)?;

        log::info!("Selected GPU: {}", name_from_raw(&adapter.properties.device_name));

        let device = Self::build_logical_device(&instance, &adapter)?;

        let graphics_family = adapter.families.graphics.expect("adapter scored viable");
        let present_family = adapter.families.present.expect("adapter scored viable");
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        let command_pool = Self::create_pool(&device, graphics_family, false)?;
        let transient_pool = Self::create_pool(&device, graphics_family, true)?;

        let swapchain_loader = SwapchainLoader::new(&instance, &device);

        Ok(Self {
            instance,
            device,
            adapter,
            graphics_queue,
            present_queue,
            command_pool,
            transient_pool,
            swapchain_loader,
        })
    }

    /// Score every visible adapter and pick the maximum
    fn select_physical_adapter(
        instance: &Instance,
        surface: &WindowSurface,
    ) -> VulkanResult<AdapterInfo> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };
        if devices.is_empty() {
            return Err(VulkanError::NoViableAdapter);
        }

        let required_extensions = Self::required_extensions();
        let mut best: Option<(u32, AdapterInfo)> = None;

        for physical_device in devices {
            let available_extensions = unsafe {
                instance
                    .enumerate_device_extension_properties(physical_device)
                    .map_err(VulkanError::Api)?
            };
            let has_required_extensions =
                gather_extensions(&available_extensions, &required_extensions).is_ok();

            // The swapchain query is only valid once the extension exists
            let swapchain_adequate = has_required_extensions
                && SupportDetails::query(surface, physical_device)
                    .map(|support| support.adequate())
                    .unwrap_or(false);

            let families = QueueFamilies::query(instance, physical_device, surface)?;
            let features = unsafe { instance.get_physical_device_features(physical_device) };
            let supports_anisotropy = features.sampler_anisotropy == vk::TRUE;

            let score = score_adapter(
                has_required_extensions,
                swapchain_adequate,
                &families,
                supports_anisotropy,
            );

            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            log::debug!(
                "Adapter {} scored {}",
                name_from_raw(&properties.device_name),
                score
            );

            if score > 0 && best.as_ref().map_or(true, |(top, _)| score > *top) {
                let memory_properties =
                    unsafe { instance.get_physical_device_memory_properties(physical_device) };
                best = Some((
                    score,
                    AdapterInfo {
                        physical_device,
                        properties,
                        features,
                        memory_properties,
                        families,
                    },
                ));
            }
        }

        best.map(|(_, info)| info).ok_or(VulkanError::NoViableAdapter)
    }

    fn build_logical_device(
        instance: &Instance,
        adapter: &AdapterInfo,
    ) -> VulkanResult<ash::Device> {
        let unique_families: BTreeSet<u32> = [
            adapter.families.graphics.expect("adapter scored viable"),
            adapter.families.present.expect("adapter scored viable"),
        ]
        .into_iter()
        .collect();

        let queue_priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extension_ptrs = [SwapchainLoader::name().as_ptr()];

        // Enable anisotropy only when the adapter actually has it; selection
        // preferred such adapters but did not require them
        let features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(adapter.features.sampler_anisotropy == vk::TRUE)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        unsafe {
            instance
                .create_device(adapter.physical_device, &create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn create_pool(
        device: &ash::Device,
        queue_family: u32,
        transient: bool,
    ) -> VulkanResult<vk::CommandPool> {
        let flags = if transient {
            vk::CommandPoolCreateFlags::TRANSIENT
        } else {
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
        };
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family);

        unsafe {
            device
                .create_command_pool(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// The logical device handle
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Clone of the logical device for resource wrappers
    pub fn raw(&self) -> ash::Device {
        self.device.clone()
    }

    /// Selected adapter information
    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// Chosen queue family indices
    pub fn families(&self) -> QueueFamilies {
        self.adapter.families
    }

    /// Adapter memory-type table
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.adapter.memory_properties
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Presentation queue (may be the graphics queue)
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Long-lived command pool for per-frame command buffers
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Transient pool for one-time upload command buffers
    pub fn transient_pool(&self) -> vk::CommandPool {
        self.transient_pool
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Whether images of this format/tiling can be sampled with linear
    /// filtering, required for mipmap blits
    pub fn supports_linear_filter(&self, format: vk::Format, tiling: vk::ImageTiling) -> bool {
        let properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.adapter.physical_device, format)
        };
        let features = match tiling {
            vk::ImageTiling::LINEAR => properties.linear_tiling_features,
            _ => properties.optimal_tiling_features,
        };
        features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_command_pool(self.transient_pool, None);
            self.device.destroy_device(None);
        }
    }
}

/// Record and synchronously execute a one-time command buffer
///
/// Used only for startup uploads: the blocking `queue_wait_idle` guarantees
/// any staging resources referenced by the recorded commands outlive the
/// GPU's reads before the caller drops them.
pub(crate) fn record_one_time<F>(device: &Device, record: F) -> VulkanResult<()>
where
    F: FnOnce(vk::CommandBuffer) -> VulkanResult<()>,
{
    let allocate_info = vk::CommandBufferAllocateInfo::builder()
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_pool(device.transient_pool())
        .command_buffer_count(1);

    let command_buffer = unsafe {
        device
            .handle()
            .allocate_command_buffers(&allocate_info)
            .map_err(VulkanError::Api)?[0]
    };

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device
            .handle()
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(VulkanError::Api)?;
    }

    record(command_buffer)?;

    let command_buffers = [command_buffer];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

    unsafe {
        device
            .handle()
            .end_command_buffer(command_buffer)
            .map_err(VulkanError::Api)?;
        device
            .handle()
            .queue_submit(device.graphics_queue(), &[submit_info.build()], vk::Fence::null())
            .map_err(VulkanError::Api)?;
        device
            .handle()
            .queue_wait_idle(device.graphics_queue())
            .map_err(VulkanError::Api)?;
        device
            .handle()
            .free_command_buffers(device.transient_pool(), &command_buffers);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(indices: &[u32]) -> BTreeSet<u32> {
        indices.iter().copied().collect()
    }

    #[test]
    fn shared_family_preferred_over_independent_picks() {
        // family 2 supports both; independent first picks would be (0, 1)
        let families = QueueFamilies::select(&set(&[0, 2]), &set(&[1, 2]));

        assert_eq!(families.graphics, Some(2));
        assert_eq!(families.present, Some(2));
        assert!(families.shared());
    }

    #[test]
    fn disjoint_families_fall_back_to_first_of_each() {
        let families = QueueFamilies::select(&set(&[0]), &set(&[1]));

        assert_eq!(families.graphics, Some(0));
        assert_eq!(families.present, Some(1));
        assert!(families.complete());
        assert!(!families.shared());
    }

    #[test]
    fn missing_family_leaves_selection_incomplete() {
        let families = QueueFamilies::select(&set(&[0]), &set(&[]));

        assert_eq!(families.graphics, Some(0));
        assert_eq!(families.present, None);
        assert!(!families.complete());
    }

    #[test]
    fn score_zero_for_any_missing_requirement() {
        let complete = QueueFamilies {
            graphics: Some(0),
            present: Some(0),
        };
        let incomplete = QueueFamilies {
            graphics: Some(0),
            present: None,
        };

        assert_eq!(score_adapter(false, true, &complete, true), 0);
        assert_eq!(score_adapter(true, false, &complete, true), 0);
        assert_eq!(score_adapter(true, true, &incomplete, true), 0);
    }

    #[test]
    fn score_prefers_shared_family_over_anisotropy() {
        let shared = QueueFamilies {
            graphics: Some(0),
            present: Some(0),
        };
        let split = QueueFamilies {
            graphics: Some(0),
            present: Some(1),
        };

        let shared_no_aniso = score_adapter(true, true, &shared, false);
        let split_with_aniso = score_adapter(true, true, &split, true);
        assert!(shared_no_aniso > split_with_aniso);

        // best case: shared family and anisotropy
        assert_eq!(score_adapter(true, true, &shared, true), 4);
        assert_eq!(score_adapter(true, true, &split, false), 1);
    }
}
