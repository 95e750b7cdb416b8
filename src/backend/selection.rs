// Physical device selection rules
//
// Pure functions over data already queried from the driver, so the
// suitability and scoring rules can be checked without a GPU.

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::CStr;

/// Queue family indices for the two roles the renderer needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, one queue gets created for each
    pub fn unique(&self) -> Vec<u32> {
        let mut families: Vec<u32> = self.graphics.into_iter().chain(self.present).collect();
        families.dedup();
        families
    }
}

/// Search graphics and present families independently.
///
/// `present_support[i]` says whether family `i` can present to the surface.
/// The graphics family is reused for present when it can do both.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> QueueFamilyIndices {
    let supports_present = |i: usize| present_support.get(i).copied().unwrap_or(false);

    let graphics = families
        .iter()
        .position(|family| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        });

    let present = match graphics {
        Some(index) if supports_present(index) => Some(index),
        _ => (0..families.len()).find(|&i| families[i].queue_count > 0 && supports_present(i)),
    };

    QueueFamilyIndices {
        graphics: graphics.map(|i| i as u32),
        present: present.map(|i| i as u32),
    }
}

/// Required extensions the device does not report
pub fn missing_extensions<'a>(available: &[&CStr], required: &[&'a CStr]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|name| !available.contains(name))
        .collect()
}

/// Everything selection needs to know about one physical device
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: QueueFamilyIndices,
    pub missing_extensions: Vec<String>,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
}

/// Raw driver answers about one device, before any of them is interpreted
#[derive(Debug)]
pub struct DeviceQueries<'a> {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// One answer per queue family
    pub present_support: Vec<VkResult<bool>>,
    pub extensions: VkResult<Vec<&'a CStr>>,
    pub surface_formats: VkResult<usize>,
    pub present_modes: VkResult<usize>,
}

impl DeviceCandidate {
    /// Interpret the queries for one device.
    ///
    /// A failed query only counts against this device: it reads as no present
    /// support, no extensions, or no formats and present modes.
    pub fn from_queries(queries: DeviceQueries<'_>, required_extensions: &[&CStr]) -> Self {
        let name = queries.name;

        let present_support: Vec<bool> = queries
            .present_support
            .into_iter()
            .enumerate()
            .map(|(family, result)| {
                result.unwrap_or_else(|e| {
                    log::debug!("{}: present support query for family {} failed: {}", name, family, e);
                    false
                })
            })
            .collect();
        let queue_families = find_queue_families(&queries.queue_families, &present_support);

        let missing = match &queries.extensions {
            Ok(available) => missing_extensions(available, required_extensions),
            Err(e) => {
                log::debug!("{}: extension query failed: {}", name, e);
                required_extensions.to_vec()
            }
        };

        let count = |what: &str, result: VkResult<usize>| {
            result.unwrap_or_else(|e| {
                log::debug!("{}: {} query failed: {}", name, what, e);
                0
            })
        };
        let surface_format_count = count("surface format", queries.surface_formats);
        let present_mode_count = count("present mode", queries.present_modes);

        Self {
            name,
            device_type: queries.device_type,
            queue_families,
            missing_extensions: missing
                .iter()
                .map(|ext| ext.to_string_lossy().into_owned())
                .collect(),
            surface_format_count,
            present_mode_count,
        }
    }

    /// Both queue roles, every extension, and at least one format and present mode.
    pub fn is_suitable(&self) -> bool {
        self.queue_families.is_complete()
            && self.missing_extensions.is_empty()
            && self.surface_format_count > 0
            && self.present_mode_count > 0
    }

    /// Prefer discrete GPUs, then integrated, then anything else that renders
    pub fn score(&self) -> u32 {
        match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
            vk::PhysicalDeviceType::CPU => 1,
            _ => 0,
        }
    }
}

/// Index of the highest scoring suitable candidate.
///
/// Ties keep the earliest enumerated device. Returns `None` when nothing is
/// suitable or the best score is zero.
pub fn pick_best(candidates: &[DeviceCandidate]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        if !candidate.is_suitable() {
            log::debug!("Skipping unsuitable device {}: {:?}", candidate.name, candidate);
            continue;
        }

        let score = candidate.score();
        log::debug!("Device {} scored {}", candidate.name, score);

        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    best.filter(|&(_, score)| score > 0).map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn candidate(name: &str, device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            device_type,
            queue_families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
            },
            missing_extensions: Vec::new(),
            surface_format_count: 1,
            present_mode_count: 1,
        }
    }

    #[test]
    fn graphics_family_matches_on_contained_flag() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        ];

        let indices = find_queue_families(&families, &[false, true]);

        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.unique(), vec![1]);
    }

    #[test]
    fn present_family_may_differ_from_graphics() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];

        let indices = find_queue_families(&families, &[false, true]);

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.unique(), vec![0, 1]);
    }

    #[test]
    fn graphics_family_preferred_for_present_when_capable() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::GRAPHICS)];

        let indices = find_queue_families(&families, &[true, true]);

        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn incomplete_when_no_family_presents() {
        let families = [family(vk::QueueFlags::GRAPHICS)];

        let indices = find_queue_families(&families, &[false]);

        assert!(!indices.is_complete());
        assert_eq!(indices.present, None);
    }

    #[test]
    fn empty_families_are_ignored() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];

        let indices = find_queue_families(&families, &[true, true]);

        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn reports_only_missing_extensions() {
        let swapchain = c"VK_KHR_swapchain";
        let maintenance = c"VK_KHR_maintenance1";

        assert!(missing_extensions(&[maintenance, swapchain], &[swapchain]).is_empty());
        assert_eq!(missing_extensions(&[maintenance], &[swapchain]), vec![swapchain]);
    }

    #[test]
    fn suitability_needs_formats_and_present_modes() {
        let mut device = candidate("gpu", vk::PhysicalDeviceType::DISCRETE_GPU);
        assert!(device.is_suitable());

        device.surface_format_count = 0;
        assert!(!device.is_suitable());

        device.surface_format_count = 2;
        device.present_mode_count = 0;
        assert!(!device.is_suitable());
    }

    #[test]
    fn suitability_needs_extensions_and_queues() {
        let mut device = candidate("gpu", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.missing_extensions.push("VK_KHR_swapchain".to_string());
        assert!(!device.is_suitable());

        let mut device = candidate("gpu", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.queue_families.present = None;
        assert!(!device.is_suitable());
    }

    #[test]
    fn discrete_beats_integrated() {
        let candidates = [
            candidate("integrated", vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate("discrete", vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate("cpu", vk::PhysicalDeviceType::CPU),
        ];

        assert_eq!(pick_best(&candidates), Some(1));
    }

    #[test]
    fn unsuitable_devices_never_win() {
        let mut discrete = candidate("discrete", vk::PhysicalDeviceType::DISCRETE_GPU);
        discrete.present_mode_count = 0;
        let candidates = [discrete, candidate("integrated", vk::PhysicalDeviceType::INTEGRATED_GPU)];

        let best = pick_best(&candidates).unwrap();
        assert_eq!(best, 1);
        assert!(candidates[best].is_suitable());
    }

    #[test]
    fn ties_keep_first_enumerated() {
        let candidates = [
            candidate("first", vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate("second", vk::PhysicalDeviceType::INTEGRATED_GPU),
        ];

        assert_eq!(pick_best(&candidates), Some(0));
    }

    #[test]
    fn zero_score_is_not_enough() {
        let candidates = [candidate("other", vk::PhysicalDeviceType::OTHER)];
        assert_eq!(pick_best(&candidates), None);
    }

    const SWAPCHAIN: &CStr = c"VK_KHR_swapchain";

    fn queries(name: &str, device_type: vk::PhysicalDeviceType) -> DeviceQueries<'static> {
        DeviceQueries {
            name: name.to_string(),
            device_type,
            queue_families: vec![family(vk::QueueFlags::GRAPHICS)],
            present_support: vec![Ok(true)],
            extensions: Ok(vec![SWAPCHAIN]),
            surface_formats: Ok(2),
            present_modes: Ok(1),
        }
    }

    #[test]
    fn answered_queries_make_a_suitable_candidate() {
        let device = DeviceCandidate::from_queries(
            queries("gpu", vk::PhysicalDeviceType::DISCRETE_GPU),
            &[SWAPCHAIN],
        );

        assert!(device.is_suitable());
        assert_eq!(device.surface_format_count, 2);
        assert_eq!(device.present_mode_count, 1);
    }

    #[test]
    fn failed_surface_query_only_disqualifies_that_device() {
        let mut lost = queries("discrete", vk::PhysicalDeviceType::DISCRETE_GPU);
        lost.surface_formats = Err(vk::Result::ERROR_SURFACE_LOST_KHR);

        let candidates = [
            DeviceCandidate::from_queries(lost, &[SWAPCHAIN]),
            DeviceCandidate::from_queries(
                queries("integrated", vk::PhysicalDeviceType::INTEGRATED_GPU),
                &[SWAPCHAIN],
            ),
        ];

        assert_eq!(candidates[0].surface_format_count, 0);
        assert!(!candidates[0].is_suitable());
        assert_eq!(pick_best(&candidates), Some(1));
    }

    #[test]
    fn failed_present_mode_query_counts_as_none() {
        let mut device = queries("gpu", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.present_modes = Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);

        let device = DeviceCandidate::from_queries(device, &[SWAPCHAIN]);

        assert_eq!(device.present_mode_count, 0);
        assert!(!device.is_suitable());
    }

    #[test]
    fn failed_present_support_query_reads_as_unsupported() {
        let mut device = queries("gpu", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.queue_families.push(family(vk::QueueFlags::TRANSFER));
        device.present_support = vec![Err(vk::Result::ERROR_SURFACE_LOST_KHR), Ok(true)];

        let device = DeviceCandidate::from_queries(device, &[SWAPCHAIN]);

        assert_eq!(device.queue_families.graphics, Some(0));
        assert_eq!(device.queue_families.present, Some(1));
    }

    #[test]
    fn failed_extension_query_reports_everything_missing() {
        let mut device = queries("gpu", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.extensions = Err(vk::Result::ERROR_INITIALIZATION_FAILED);

        let device = DeviceCandidate::from_queries(device, &[SWAPCHAIN]);

        assert_eq!(device.missing_extensions, vec!["VK_KHR_swapchain".to_string()]);
        assert!(!device.is_suitable());
    }

    #[test]
    fn nothing_to_pick_from() {
        assert_eq!(pick_best(&[]), None);
    }
}
