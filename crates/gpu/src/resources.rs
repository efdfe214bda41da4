//! Resource manager: geometry sizing, slot lifecycle, and the shared
//! pipeline/bind-group-layout pair.
//!
//! Grounded in the teacher's `IoBuffers`/`FixedBuffers`/`GpuPipeline`
//! triad and `get_or_create_*` caching helpers, generalized from one
//! fixed-size result buffer to a multi-slot double-buffered heap.

use std::borrow::Cow;
use std::path::Path;

use bytemuck::{Pod, Zeroable};

use crate::device::DeviceProfile;
use crate::error::GpuError;

const SHADER_WGSL: &str = include_str!("shader.wgsl");

/// One 64-bit value as handed to the shader (see `shader.wgsl`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct StartValueIn {
    /// Low 32 bits.
    pub lo: u32,
    /// High 32 bits.
    pub hi: u32,
}

#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Anchor {
    lo: u32,
    hi: u32,
    _pad0: u32,
    _pad1: u32,
}

#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct Params {
    pub(crate) best_stop_time: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
    val0mod1off: [Anchor; 3],
    val1mod6off: [Anchor; 3],
}

impl Params {
    pub(crate) fn new(best_stop_time: u32, val0mod1off: [(u32, u32); 3], val1mod6off: [(u32, u32); 3]) -> Self {
        let pack = |pairs: [(u32, u32); 3]| {
            [
                Anchor { lo: pairs[0].0, hi: pairs[0].1, _pad0: 0, _pad1: 0 },
                Anchor { lo: pairs[1].0, hi: pairs[1].1, _pad0: 0, _pad1: 0 },
                Anchor { lo: pairs[2].0, hi: pairs[2].1, _pad0: 0, _pad1: 0 },
            ]
        };
        Self {
            best_stop_time,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
            val0mod1off: pack(val0mod1off),
            val1mod6off: pack(val1mod6off),
        }
    }
}

/// Geometry parameters: how many values fill one slot, how many slots
/// make up a heap, and the workgroup size the pipeline is specialised
/// for. Computed once at startup from `DeviceProfile` and the
/// `--max-memory` fraction.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    /// Values dispatched per slot, always a multiple of `workgroup_size`.
    pub values_per_inout: u32,
    /// Slots per buffer.
    pub inouts_per_buffer: u32,
    /// Buffers per heap.
    pub buffers_per_heap: u32,
    /// Workgroup size the compute pipeline is specialised for.
    pub workgroup_size: u32,
}

impl Geometry {
    /// Total slots making up one heap.
    pub fn inouts_per_heap(&self) -> u32 {
        self.inouts_per_buffer * self.buffers_per_heap
    }

    /// Derive a geometry that fits within `max_memory_fraction` of the
    /// device's storage-binding budget, rounding `values_per_inout`
    /// down to a multiple of the workgroup size.
    pub fn negotiate(profile: &DeviceProfile, max_memory_fraction: f64) -> Self {
        let per_value_bytes = (std::mem::size_of::<StartValueIn>() + std::mem::size_of::<u32>()) as u64;
        let budget = ((profile.max_storage_binding as f64) * max_memory_fraction.clamp(0.01, 1.0)) as u64;
        let raw_values = (budget / per_value_bytes.max(1)).max(profile.workgroup_size as u64);
        let values_per_inout = ((raw_values / profile.workgroup_size as u64).max(1) * profile.workgroup_size as u64)
            .min(u32::MAX as u64) as u32;

        Geometry {
            values_per_inout,
            inouts_per_buffer: 2,
            buffers_per_heap: 2,
            workgroup_size: profile.workgroup_size,
        }
    }
}

/// Lifecycle state of one slot, mirroring the state table exactly:
/// `Idle -> Filling -> Computing -> Draining -> Ready -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No work in flight; eligible to be filled.
    Idle,
    /// Input buffer and params have been written.
    Filling,
    /// Compute dispatch submitted, awaiting the device.
    Computing,
    /// Output has been copied to the staging buffer and is being mapped.
    Draining,
    /// Results have been read back and are ready for analysis.
    Ready,
}

/// One double-buffered unit of work: a device-local input buffer (fed
/// directly via `queue.write_buffer`, the same upload path the teacher
/// uses for its prefix/suffix/params buffers — no separate persistently
/// mapped staging buffer is needed on the input side), a device-local
/// output buffer, a host-visible (mapped) output staging buffer, the
/// per-slot uniform params, and the bind group wired to them.
pub struct Slot {
    /// Current point in the `Idle -> Filling -> Computing -> Draining
    /// -> Ready -> Idle` lifecycle.
    pub state: SlotState,
    /// Device-local input buffer, written via `queue.write_buffer`.
    pub input_device: wgpu::Buffer,
    /// Device-local output buffer the shader writes stop times into.
    pub output_device: wgpu::Buffer,
    /// Host-visible (`MAP_READ`) copy of `output_device`, populated by
    /// a copy command each submission and mapped during drain.
    pub output_staging: wgpu::Buffer,
    /// Per-slot uniform params (best stop time and anchor arrays).
    pub params: wgpu::Buffer,
    /// Bind group wired to this slot's three buffers.
    pub bind_group: wgpu::BindGroup,
}

fn create_buffer(device: &wgpu::Device, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    })
}

impl Slot {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, geometry: &Geometry, index: usize) -> Self {
        let input_size = (geometry.values_per_inout as u64) * (std::mem::size_of::<StartValueIn>() as u64);
        let output_size = (geometry.values_per_inout as u64) * (std::mem::size_of::<u32>() as u64);
        let params_size = std::mem::size_of::<Params>() as u64;

        let input_device = create_buffer(
            device,
            &format!("collatz-slot-{index}-input-device"),
            input_size.max(16),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let output_device = create_buffer(
            device,
            &format!("collatz-slot-{index}-output-device"),
            output_size.max(16),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        );
        let output_staging = create_buffer(
            device,
            &format!("collatz-slot-{index}-output-staging"),
            output_size.max(16),
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );
        let params = create_buffer(
            device,
            &format!("collatz-slot-{index}-params"),
            params_size,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("collatz-slot-{index}-bind-group")),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: input_device.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: output_device.as_entire_binding() },
            ],
        });

        Self {
            state: SlotState::Idle,
            input_device,
            output_device,
            output_staging,
            params,
            bind_group,
        }
    }
}

/// Owns the negotiated geometry, the shared compute pipeline, and the
/// slot pool making up one heap.
pub struct ResourceSet {
    /// Negotiated slot/heap sizing.
    pub geometry: Geometry,
    /// Shared compute pipeline, built once and reused by every slot.
    pub pipeline: wgpu::ComputePipeline,
    /// Bind group layout every slot's bind group conforms to.
    pub layout: wgpu::BindGroupLayout,
    /// One slot per entry in the heap.
    pub slots: Vec<Slot>,
}

impl ResourceSet {
    /// Build the shared pipeline/layout and allocate every slot in the
    /// heap up front.
    pub fn new(device: &wgpu::Device, geometry: Geometry) -> Result<Self, GpuError> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("collatz-search-shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER_WGSL)),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("collatz-search-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(std::mem::size_of::<Params>() as u64),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("collatz-search-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("collatz-search-pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "main",
        });

        let slots = (0..geometry.inouts_per_heap() as usize)
            .map(|i| Slot::new(device, &layout, &geometry, i))
            .collect();

        Ok(Self { geometry, pipeline, layout, slots })
    }

    /// Load a previously captured pipeline-cache blob, if the backend
    /// produced one. Portable WebGPU has no standardized cache blob
    /// format, so callers on a backend without
    /// `wgpu::Features::PIPELINE_CACHE` always get `None` here; this is
    /// a documented no-op fallback, not an error.
    pub fn load_pipeline_cache(path: &Path) -> Option<Vec<u8>> {
        std::fs::read(path).ok()
    }

    /// Persist whatever pipeline-cache bytes are available. A no-op
    /// when there is nothing to capture.
    pub fn store_pipeline_cache(bytes: &[u8], path: &Path) -> std::io::Result<()> {
        std::fs::write(path, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{select_device, DeviceRequirements};

    #[test]
    fn geometry_rounds_to_workgroup_multiple() {
        let profile = DeviceProfile {
            adapter_info: wgpu::AdapterInfo {
                name: "test".into(),
                vendor: 0,
                device: 0,
                device_type: wgpu::DeviceType::Other,
                backend: wgpu::Backend::Vulkan,
                driver: String::new(),
                driver_info: String::new(),
            },
            workgroup_size: 256,
            max_storage_binding: 1 << 20,
            max_uniform_binding: 1 << 16,
            prefers_int64: false,
        };
        let geometry = Geometry::negotiate(&profile, 0.5);
        assert_eq!(geometry.values_per_inout % 256, 0);
        assert!(geometry.values_per_inout > 0);
    }

    #[test]
    fn resource_set_builds_requested_slot_count_when_gpu_available() {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            dx12_shader_compiler: wgpu::Dx12Compiler::Fxc,
            flags: wgpu::InstanceFlags::default(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });
        let result = pollster::block_on(select_device(&instance, DeviceRequirements::default()));
        let (_, device, _, profile) = match result {
            Ok(v) => v,
            Err(_) => return,
        };
        let geometry = Geometry::negotiate(&profile, 0.1);
        let resources = ResourceSet::new(&device, geometry).expect("resource set build");
        assert_eq!(resources.slots.len(), geometry.inouts_per_heap() as usize);
    }
}
