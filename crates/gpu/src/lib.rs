#![deny(missing_docs)]

//! wgpu dispatch engine for the Collatz record search.
//!
//! Wires device selection (`device`), slot/pipeline resource management
//! (`resources`), and the rolling double-buffered dispatch loop
//! (`dispatch`) into a single entry point the binary facade drives.

pub mod device;
pub mod dispatch;
pub mod error;
pub mod resources;

pub use device::{select_device, DeviceProfile, DeviceRequirements};
pub use dispatch::{CancelFlag, DispatchEngine, DispatchOutcome};
pub use error::GpuError;
pub use resources::{Geometry, ResourceSet, Slot, SlotState, StartValueIn};

use collatz_search_core::Position;

/// Build a fully initialised `DispatchEngine`: selects a device,
/// negotiates geometry against `max_memory_fraction`, allocates the
/// resource set, and wires in the starting `Position`.
///
/// `enable_validation` threads the CLI's `--validation-layers` flag
/// through to `wgpu::InstanceFlags::VALIDATION`; it is the one
/// debug-instrumentation flag from the spec's CLI surface that a
/// portable wgpu backend can actually honor (see DESIGN.md for the
/// others, which are accepted but inert).
///
/// A missing or unavailable adapter is a hard initialisation failure:
/// there is no retry and no fallback to a lesser device.
pub async fn init_engine(
    requirements: DeviceRequirements,
    max_memory_fraction: f64,
    position: Position,
    cancel: CancelFlag,
    enable_validation: bool,
) -> Result<DispatchEngine, GpuError> {
    let mut flags = wgpu::InstanceFlags::default();
    if enable_validation {
        flags.insert(wgpu::InstanceFlags::VALIDATION);
    }
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        dx12_shader_compiler: wgpu::Dx12Compiler::Fxc,
        flags,
        gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
    });

    let (_adapter, device, queue, profile) = select_device(&instance, requirements).await?;
    let geometry = Geometry::negotiate(&profile, max_memory_fraction);
    let resources = ResourceSet::new(&device, geometry)?;

    Ok(DispatchEngine::new(device, queue, resources, position, cancel))
}
