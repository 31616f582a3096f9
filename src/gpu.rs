//! Headless GPU device management.
//!
//! This module provides [`GpuContext`], the struct that holds the wgpu device
//! and queue the [`WgpuBackend`](crate::WgpuBackend) renders with. The effect
//! pipeline never presents to a window; the host renderer owns the surface
//! and reads the composited texture back from the backend.
//!
//! # Example
//!
//! ```no_run
//! use screenfx::GpuContext;
//!
//! let gpu = GpuContext::new_headless()?;
//! println!("running on {} (vendor {:#06x})", gpu.adapter_info.name, gpu.adapter_info.vendor);
//! # Ok::<(), screenfx::EffectsError>(())
//! ```

use crate::error::{EffectsError, EffectsResult};

/// PCI vendor id of Intel GPUs.
pub const VENDOR_INTEL: u32 = 0x8086;

/// Core GPU context holding wgpu resources.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
pub struct GpuContext {
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Adapter identification, used to pick driver workarounds.
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Create a GPU context without a surface.
    ///
    /// This performs all wgpu initialization:
    /// 1. Creates a wgpu instance with primary backends (Vulkan, Metal, DX12)
    /// 2. Requests a suitable GPU adapter
    /// 3. Creates the logical device and command queue
    ///
    /// # Errors
    ///
    /// Returns [`EffectsError::Device`] if no adapter is found or device
    /// creation fails.
    pub fn new_headless() -> EffectsResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        Self::from_instance(&instance)
    }

    /// Create a GPU context on the first adapter `instance` offers.
    ///
    /// Lets callers pick the backends themselves, e.g. wgpu's noop backend
    /// to validate pipelines without a GPU.
    ///
    /// # Errors
    ///
    /// Same as [`new_headless`](Self::new_headless).
    pub fn from_instance(instance: &wgpu::Instance) -> EffectsResult<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(EffectsError::device)?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("screenfx Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .map_err(EffectsError::device)?;

        let adapter_info = adapter.get_info();
        log::info!(
            "GPU adapter: {} ({:?}, vendor {:#06x})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.vendor
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    /// Whether the adapter is an Intel GPU.
    ///
    /// Rendering into depth-only framebuffers is unreliable on these drivers,
    /// so the HiZ pyramid falls back to a float colour texture there.
    pub fn is_intel(&self) -> bool {
        self.adapter_info.vendor == VENDOR_INTEL
    }
}
