//! Device selection and capability negotiation.
//!
//! Generalizes `GpuContext::init`'s "pick a high-performance adapter"
//! into the scoring-and-reject model the dispatch engine needs.

use crate::error::GpuError;

/// Capability hints the caller would like the selected device to honor.
/// wgpu's portable feature surface cannot express every knob a raw
/// Vulkan capability query would (true 8-bit storage control, explicit
/// subgroup-size control); those are honest gaps, not faked.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceRequirements {
    /// Prefer a device reporting `wgpu::Features::SHADER_INT64`.
    pub require_shader_int64: bool,
    /// Reserved for parity with the spec's 16-bit storage knob; no
    /// portable wgpu feature maps to it today.
    pub require_storage_16bit: bool,
}

/// The negotiated capability record consumed by the resource manager.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// Adapter identity, kept for diagnostics.
    pub adapter_info: wgpu::AdapterInfo,
    /// Largest workgroup size the compute pipeline is specialised for.
    pub workgroup_size: u32,
    /// `max_storage_buffer_binding_size` from the negotiated limits.
    pub max_storage_binding: u64,
    /// `max_uniform_buffer_binding_size` from the negotiated limits.
    pub max_uniform_binding: u64,
    /// Whether the adapter actually exposes 64-bit shader integers.
    pub prefers_int64: bool,
}

/// Shader-imposed ceiling on workgroup size, independent of whatever a
/// given adapter reports as its own maximum.
const WORKGROUP_SIZE_CEILING: u32 = 256;

/// Request a high-performance adapter and negotiate a `DeviceProfile`.
///
/// No adapter found is a hard initialisation failure: there is no
/// fallback to a lesser device and no retry.
pub async fn select_device(
    instance: &wgpu::Instance,
    requirements: DeviceRequirements,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue, DeviceProfile), GpuError> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| GpuError::Unavailable("no suitable adapter found".into()))?;

    let adapter_info = adapter.get_info();
    let limits = adapter.limits();
    let features = adapter.features();

    let prefers_int64 = requirements.require_shader_int64
        && features.contains(wgpu::Features::SHADER_INT64);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("collatz-search-device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
            },
            None,
        )
        .await
        .map_err(|e| GpuError::Unavailable(format!("request_device failed: {e}")))?;

    let workgroup_size = limits
        .max_compute_invocations_per_workgroup
        .min(WORKGROUP_SIZE_CEILING);

    let profile = DeviceProfile {
        adapter_info,
        workgroup_size,
        max_storage_binding: limits.max_storage_buffer_binding_size.into(),
        max_uniform_binding: limits.max_uniform_buffer_binding_size.into(),
        prefers_int64,
    };

    Ok((adapter, device, queue, profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_device_reports_adapter_or_is_skipped() {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            dx12_shader_compiler: wgpu::Dx12Compiler::Fxc,
            flags: wgpu::InstanceFlags::default(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });
        let result = pollster::block_on(select_device(&instance, DeviceRequirements::default()));
        let (_, _, _, profile) = match result {
            Ok(v) => v,
            Err(_) => return, // No GPU in this environment; skip.
        };
        assert!(profile.workgroup_size > 0);
        assert!(profile.workgroup_size <= WORKGROUP_SIZE_CEILING);
    }
}
