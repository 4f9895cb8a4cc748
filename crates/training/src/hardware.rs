//! Backend/accelerator reporting. A missing GPU is a warning, never an error.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::NdArray => "ndarray",
            BackendKind::Wgpu => "wgpu",
        }
    }
}

/// What the graphics stack reported for the adapter it would hand out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterSummary {
    pub name: String,
    pub backend: String,
    /// Software rasterizer (llvmpipe, WARP, ...) rather than a real GPU.
    pub software: bool,
}

pub trait AdapterQuery {
    fn adapter(&self) -> Option<AdapterSummary>;
}

/// Reports no adapter; used by CPU-only builds.
pub struct NoAccelerator;

impl AdapterQuery for NoAccelerator {
    fn adapter(&self) -> Option<AdapterSummary> {
        None
    }
}

/// Asks wgpu for its default adapter, blocking until it answers.
#[cfg(feature = "backend-wgpu")]
pub struct WgpuAdapterQuery;

#[cfg(feature = "backend-wgpu")]
impl AdapterQuery for WgpuAdapterQuery {
    fn adapter(&self) -> Option<AdapterSummary> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        )?;
        let info = adapter.get_info();
        Some(AdapterSummary {
            software: info.device_type == wgpu::DeviceType::Cpu,
            backend: format!("{:?}", info.backend),
            name: info.name,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HardwareStatus {
    /// A hardware adapter answered; training may use the GPU backend.
    pub accelerated: bool,
    pub backend: BackendKind,
    pub adapter: Option<AdapterSummary>,
}

pub fn detect_with(query: &dyn AdapterQuery) -> HardwareStatus {
    let adapter = query.adapter();
    let accelerated = adapter.as_ref().is_some_and(|a| !a.software);
    HardwareStatus {
        accelerated,
        backend: if accelerated {
            BackendKind::Wgpu
        } else {
            BackendKind::NdArray
        },
        adapter,
    }
}

pub fn detect_hardware() -> HardwareStatus {
    #[cfg(feature = "backend-wgpu")]
    {
        detect_with(&WgpuAdapterQuery)
    }
    #[cfg(not(feature = "backend-wgpu"))]
    {
        detect_with(&NoAccelerator)
    }
}

pub fn report_hardware(status: &HardwareStatus) {
    match (&status.adapter, status.accelerated) {
        (Some(adapter), true) => {
            log::info!("using GPU {} via {}", adapter.name, adapter.backend);
        }
        (Some(adapter), false) => log::warn!(
            "No GPU found (only the software adapter {}). Training runs on the CPU backend.",
            adapter.name
        ),
        (None, _) if cfg!(feature = "backend-wgpu") => {
            log::warn!("No GPU found: wgpu returned no adapter. Training runs on the CPU backend.")
        }
        (None, _) => log::warn!(
            "No GPU found. Training runs on the CPU backend; \
             build with --features backend-wgpu to train on a GPU."
        ),
    }
}

/// Backend this binary can run besides the CPU fallback.
fn compiled_backend() -> BackendKind {
    if cfg!(feature = "backend-wgpu") {
        BackendKind::Wgpu
    } else {
        BackendKind::NdArray
    }
}

/// A config naming a backend this binary lacks is a hard error; asking for
/// `ndarray` on a GPU build only pins training to the CPU.
pub fn validate_backend_choice(requested: BackendKind) -> anyhow::Result<()> {
    if requested == compiled_backend() {
        return Ok(());
    }
    if requested == BackendKind::Wgpu {
        anyhow::bail!(
            "config asks for the wgpu backend but this binary was built without `backend-wgpu`"
        );
    }
    log::info!("backend = \"ndarray\" in config; training stays on the CPU");
    Ok(())
}
