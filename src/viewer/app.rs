//! Main application state and frame loop

use std::sync::Arc;

use anyhow::Context as _;
use egui::{CentralPanel, Color32, Rect, pos2};
use log::{error, info, warn};
use parking_lot::Mutex;

use crate::compute::{
    strategy_for, DeviceSession, DispatchParameters, InteropPipeline, KernelSource, SessionKind, StorageMode,
};
use crate::settings::Settings;
use crate::stats::StatsAccumulator;

use super::input::{self, Effect};
use super::presenter::EguiPresenter;

/// Error that ended the run, reported by `run` after the window closes.
pub type FatalSlot = Arc<Mutex<Option<anyhow::Error>>>;

/// Main viewer application
pub struct ViewerApp {
    pipeline: InteropPipeline,
    presenter: EguiPresenter,
    params: DispatchParameters,
    stats: StatsAccumulator,
    settings: Settings,
    fullscreen: bool,
    fatal: FatalSlot,
}

impl ViewerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, settings: Settings, fatal: FatalSlot) -> anyhow::Result<Self> {
        let render_state = cc
            .wgpu_render_state
            .as_ref()
            .context("eframe did not provide a wgpu render state")?;

        let (session, mode) = select_session(render_state, &settings)?;

        let mut presenter = EguiPresenter::new(cc.egui_ctx.clone(), render_state.renderer.clone());
        let source = KernelSource::resolve(settings.kernel_path.as_ref())?;
        let pipeline = InteropPipeline::setup(
            session,
            strategy_for(mode),
            &source,
            settings.target_items_per_group,
            &mut presenter,
            settings.width,
            settings.height,
        )?;

        Ok(Self {
            pipeline,
            presenter,
            params: settings.params(),
            stats: StatsAccumulator::new(settings.report_interval),
            settings,
            fullscreen: false,
            fatal,
        })
    }

    fn handle_input(&mut self, ctx: &egui::Context) -> anyhow::Result<()> {
        let actions: Vec<_> = ctx.input(|i| {
            i.events
                .iter()
                .filter_map(|e| match e {
                    egui::Event::Key { key, pressed: true, .. } => input::action_for(*key),
                    _ => None,
                })
                .collect()
        });

        for action in actions {
            match input::apply(action, &mut self.params) {
                Effect::None => {}
                Effect::ToggleFullscreen => {
                    self.fullscreen = !self.fullscreen;
                    ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(self.fullscreen));
                }
                Effect::RebuildKernel => {
                    let source = KernelSource::resolve(self.settings.kernel_path.as_ref())?;
                    self.pipeline.build_kernel(&source, self.settings.target_items_per_group)?;
                    info!("Rebuilt kernel from '{}'", source.origin);
                }
                Effect::Quit => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
            }
        }
        Ok(())
    }

    /// Log, tear down, store the error and close the window.
    fn fail(&mut self, ctx: &egui::Context, err: anyhow::Error) {
        error!("{:#}", err);
        self.pipeline.close();
        self.presenter.release();
        *self.fatal.lock() = Some(err);
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.fatal.lock().is_some() {
            return;
        }
        if let Err(e) = self.handle_input(ctx) {
            self.fail(ctx, e);
            return;
        }

        let mut failure = None;
        CentralPanel::default().frame(egui::Frame::NONE).show(ctx, |ui| {
            let rect = ui.max_rect();
            let ppp = ctx.pixels_per_point();
            let width = ((rect.width() * ppp).round() as u32).max(1);
            let height = ((rect.height() * ppp).round() as u32).max(1);
            if self.params.size() != (width, height) {
                self.params.set_size(width, height);
            }

            if let Err(e) = self.pipeline.run_timed_frame(&mut self.params, &mut self.presenter, &mut self.stats) {
                failure = Some(anyhow::Error::from(e).context("frame failed"));
                return;
            }

            if let Some(id) = self.presenter.texture_id() {
                let uv = Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0));
                ui.painter().image(id, rect, uv, Color32::WHITE);
            }
        });

        if let Some(err) = failure {
            self.fail(ctx, err);
            return;
        }
        ctx.request_repaint();
    }

    fn on_exit(&mut self) {
        self.pipeline.close();
        self.presenter.release();
    }
}

/// Pick the compute session and transfer mode for the renderer's device.
///
/// Auto mode prefers sharing the renderer's device and falls back to a
/// standalone session with staged transfers.
fn select_session(
    render_state: &egui_wgpu::RenderState,
    settings: &Settings,
) -> anyhow::Result<(DeviceSession, StorageMode)> {
    let shared = || {
        DeviceSession::from_shared(
            &render_state.adapter,
            &render_state.device,
            &render_state.queue,
            settings.device,
        )
    };

    let session = match settings.transfer.forced() {
        Some(StorageMode::Shared) => shared().context("shared transfer requested")?,
        Some(StorageMode::Staged) => DeviceSession::open(settings.device)?,
        None => match shared() {
            Ok(session) => session,
            Err(e) => {
                warn!("Render device not usable for compute ({}), using a separate {} device", e, settings.device);
                DeviceSession::open(settings.device)?
            }
        },
    };

    let mode = match session.kind() {
        SessionKind::Shared => StorageMode::Shared,
        SessionKind::Standalone => StorageMode::Staged,
    };
    Ok((session, mode))
}
