//! Compute device session.
//!
//! Owns the adapter, device and queue for exactly one selected device. A
//! session is either *standalone* (its own device, destroyed on close) or
//! *shared* (borrows the rendering stack's device so textures created by the
//! graphics side are directly usable by compute).

use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::surface::RESULT_FORMAT;
use crate::util::{Error, Result};

/// Execution unit class requested by the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Gpu,
    Cpu,
}

impl DeviceClass {
    /// Classify a wgpu device type. `Other` belongs to neither class.
    pub fn of(ty: wgpu::DeviceType) -> Option<Self> {
        match ty {
            wgpu::DeviceType::IntegratedGpu
            | wgpu::DeviceType::DiscreteGpu
            | wgpu::DeviceType::VirtualGpu => Some(Self::Gpu),
            wgpu::DeviceType::Cpu => Some(Self::Cpu),
            wgpu::DeviceType::Other => None,
        }
    }

    /// Whether a device of type `ty` satisfies this preference.
    #[inline]
    pub fn matches(self, ty: wgpu::DeviceType) -> bool {
        Self::of(ty) == Some(self)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => f.write_str("GPU"),
            Self::Cpu => f.write_str("CPU"),
        }
    }
}

impl FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            other => Err(format!("unknown device class '{}' (expected gpu or cpu)", other)),
        }
    }
}

/// How the session came by its device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    /// Device created by this session; destroyed on close.
    Standalone,
    /// Device borrowed from the rendering context; only references are dropped.
    Shared,
}

/// Enumerate every adapter visible to a fresh instance.
pub fn list_adapters() -> Vec<wgpu::AdapterInfo> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    instance
        .enumerate_adapters(wgpu::Backends::all())
        .iter()
        .map(|a| a.get_info())
        .collect()
}

/// Verify the adapter can run the kernel and write its result image.
fn check_capabilities(adapter: &wgpu::Adapter) -> Result<()> {
    let downlevel = adapter.get_downlevel_capabilities();
    if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
        return Err(Error::ResourceUnsupported(format!(
            "{} does not support compute shaders",
            adapter.get_info().name
        )));
    }
    let features = adapter.get_texture_format_features(RESULT_FORMAT);
    if !features.allowed_usages.contains(wgpu::TextureUsages::STORAGE_BINDING) {
        return Err(Error::ResourceUnsupported(format!(
            "{} cannot write {:?} storage images",
            adapter.get_info().name,
            RESULT_FORMAT
        )));
    }
    Ok(())
}

/// Verify the limits a device was created with leave room for the kernel.
fn check_device_limits(device: &wgpu::Device, name: &str) -> Result<()> {
    let limits = device.limits();
    let missing = [
        ("compute invocations per work-group", limits.max_compute_invocations_per_workgroup),
        ("compute work-groups per dimension", limits.max_compute_workgroups_per_dimension),
        ("storage textures per shader stage", limits.max_storage_textures_per_shader_stage),
    ]
    .into_iter()
    .find(|(_, value)| *value == 0);

    if let Some((what, _)) = missing {
        return Err(Error::ResourceUnsupported(format!("{} was created with no {}", name, what)));
    }
    Ok(())
}

/// Compute context, device and queue for one selected device.
pub struct DeviceSession {
    adapter: Option<wgpu::Adapter>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    info: wgpu::AdapterInfo,
    class: DeviceClass,
    kind: SessionKind,
}

impl DeviceSession {
    /// Open a standalone session on the first visible adapter of class `prefer`.
    pub fn open(prefer: DeviceClass) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        Self::open_from(instance.enumerate_adapters(wgpu::Backends::all()), prefer)
    }

    /// Open a standalone session, selecting from the given adapters in order.
    ///
    /// There is no fallback class: if nothing matches, nothing is created.
    pub fn open_from<I>(adapters: I, prefer: DeviceClass) -> Result<Self>
    where
        I: IntoIterator<Item = wgpu::Adapter>,
    {
        let adapter = adapters
            .into_iter()
            .find(|a| prefer.matches(a.get_info().device_type))
            .ok_or_else(|| Error::DeviceUnavailable { class: prefer.to_string() })?;

        check_capabilities(&adapter)?;

        let info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("mandel-interop compute device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|e| Error::ContextCreationFailed(e.to_string()))?;

        info!("Connecting to {:#06x} {} ({:?}, {:?})", info.vendor, info.name, info.device_type, info.backend);
        if !info.driver.is_empty() {
            debug!("Driver: {} {}", info.driver, info.driver_info);
        }

        Ok(Self {
            adapter: Some(adapter),
            device: Some(device),
            queue: Some(queue),
            info,
            class: prefer,
            kind: SessionKind::Standalone,
        })
    }

    /// Wrap the rendering context's device so surfaces are valid in both contexts.
    ///
    /// The only visible device is the renderer's; it must match `prefer`.
    pub fn from_shared(
        adapter: &wgpu::Adapter,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        prefer: DeviceClass,
    ) -> Result<Self> {
        let info = adapter.get_info();
        if !prefer.matches(info.device_type) {
            return Err(Error::DeviceUnavailable { class: prefer.to_string() });
        }
        check_capabilities(adapter)?;
        check_device_limits(device, &info.name)?;

        info!("Using active render context: {} ({:?})", info.name, info.backend);

        Ok(Self {
            adapter: Some(adapter.clone()),
            device: Some(device.clone()),
            queue: Some(queue.clone()),
            info,
            class: prefer,
            kind: SessionKind::Shared,
        })
    }

    /// Device handle, or `InvalidState` after close.
    pub fn device(&self) -> Result<&wgpu::Device> {
        self.device.as_ref().ok_or_else(|| Error::invalid("device session is closed"))
    }

    /// Queue handle, or `InvalidState` after close.
    pub fn queue(&self) -> Result<&wgpu::Queue> {
        self.queue.as_ref().ok_or_else(|| Error::invalid("device session is closed"))
    }

    /// Adapter handle, or `InvalidState` after close.
    pub fn adapter(&self) -> Result<&wgpu::Adapter> {
        self.adapter.as_ref().ok_or_else(|| Error::invalid("device session is closed"))
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some() && self.queue.is_some()
    }

    /// Run `f` inside validation and out-of-memory error scopes.
    ///
    /// The outer `Result` reports a closed session; the inner one carries the
    /// first device error raised by `f`.
    pub fn guarded<T>(
        &self,
        f: impl FnOnce(&wgpu::Device, &wgpu::Queue) -> T,
    ) -> Result<std::result::Result<T, wgpu::Error>> {
        let device = self.device()?;
        let queue = self.queue()?;

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(device, queue);
        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());

        Ok(match validation.or(oom) {
            Some(err) => Err(err),
            None => Ok(value),
        })
    }

    /// Block until all submitted work has completed.
    pub fn wait_idle(&self) -> Result<()> {
        self.device()?
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| Error::DispatchFailed(e.to_string()))
    }

    /// Release queue, device and adapter. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(device) = &self.device {
            if let Err(e) = device.poll(wgpu::PollType::wait_indefinitely()) {
                warn!("Device did not drain before shutdown: {}", e);
            }
        }
        self.queue = None;
        if let Some(device) = self.device.take() {
            if self.kind == SessionKind::Standalone {
                device.destroy();
            }
            debug!("Released {} device session ({:?})", self.class, self.kind);
        }
        self.adapter = None;
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("name", &self.info.name)
            .field("class", &self.class)
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}
