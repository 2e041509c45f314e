//! Mandelbrot viewer - eframe window around the interop pipeline

mod app;
pub mod input;
mod presenter;

pub use presenter::EguiPresenter;

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::settings::Settings;
use crate::util::logging::install_panic_hook;

/// Open the window and run until it closes.
///
/// Any pipeline error tears the pipeline down, closes the window and is
/// returned here so the caller can exit non-zero.
pub fn run(settings: Settings) -> Result<()> {
    install_panic_hook();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([settings.width as f32, settings.height as f32])
            .with_title("Mandelbrot"),
        renderer: eframe::Renderer::Wgpu,
        wgpu_options: egui_wgpu::WgpuConfiguration {
            wgpu_setup: egui_wgpu::WgpuSetup::CreateNew(egui_wgpu::WgpuSetupCreateNew {
                device_descriptor: Arc::new(|adapter| {
                    let base_limits = if adapter.get_info().backend == wgpu::Backend::Gl {
                        wgpu::Limits::downlevel_webgl2_defaults()
                    } else {
                        wgpu::Limits::default()
                    };
                    wgpu::DeviceDescriptor {
                        label: Some("mandel-viewer device"),
                        required_limits: wgpu::Limits {
                            max_texture_dimension_2d: 8192,
                            ..base_limits
                        },
                        ..Default::default()
                    }
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    };

    let fatal: app::FatalSlot = Arc::new(Mutex::new(None));
    let slot = fatal.clone();
    eframe::run_native(
        "Mandelbrot",
        options,
        Box::new(move |cc| match app::ViewerApp::new(cc, settings.clone(), slot.clone()) {
            Ok(app) => Ok(Box::new(app) as Box<dyn eframe::App>),
            Err(e) => Err(e.into()),
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run: {}", e))?;

    let taken = fatal.lock().take();
    match taken {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
