use eframe::egui;
use std::path::PathBuf;

use crate::core::AppConfig;
use crate::gui::grid::GridView;
use crate::identify::controller::{status, CaptureController, GridTileSwap};
use crate::identify::pipeline::{CaptureEvent, CaptureFrame, CapturePipeline};
use crate::video::{VideoPlayer, VideoProbe};

pub struct CardScoutApp {
    pub config: AppConfig,
    pub player: VideoPlayer,
    pub controller: CaptureController,
    pub pipeline: CapturePipeline,
    pub grid_view: GridView,
    pub selected_video: Option<PathBuf>,
    pub status_message: String,
}

impl CardScoutApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> anyhow::Result<Self> {
        // Set global text color to white
        let mut visuals = egui::Visuals::dark();
        visuals.override_text_color = Some(egui::Color32::WHITE);
        cc.egui_ctx.set_visuals(visuals);

        let config = AppConfig::load()?;
        log::info!("Identify endpoint: {}", config.identify_endpoint);

        let pipeline = CapturePipeline::new(config.identify_endpoint.clone());

        Ok(Self {
            config,
            player: VideoPlayer::new(),
            controller: CaptureController::new(Box::new(GridTileSwap)),
            pipeline,
            grid_view: GridView::new(),
            selected_video: None,
            status_message: String::new(),
        })
    }

    /// Opens the native file chooser and remembers the picked file. Loading
    /// is a separate step, the same choose-then-load flow as the controls.
    fn choose_video(&mut self) {
        let mut dialog = rfd::FileDialog::new().add_filter(
            "Videos",
            &["mp4", "mkv", "avi", "mov", "webm", "m4v", "mpg", "mpeg"],
        );
        if let Some(dir) = &self.config.last_video_directory {
            dialog = dialog.set_directory(dir);
        }

        if let Some(path) = dialog.pick_file() {
            log::info!("Selected video file: {}", path.display());
            if let Some(parent) = path.parent() {
                self.config.last_video_directory = Some(parent.to_path_buf());
                if let Err(e) = self.config.save() {
                    log::warn!("Failed to save config: {}", e);
                }
            }
            self.selected_video = Some(path);
        }
    }

    pub fn load_video(&mut self) {
        let Some(path) = self.selected_video.clone() else {
            self.status_message = status::CHOOSE_FILE.to_string();
            return;
        };

        match VideoProbe::probe(&path) {
            Ok(info) => {
                self.player.load(path, info);
                self.status_message = status::VIDEO_LOADED.to_string();
            }
            Err(e) => {
                log::error!("Failed to probe {}: {}", path.display(), e);
                self.status_message = format!("Failed to load video: {}", e);
            }
        }
    }

    pub fn trigger_capture(&mut self) {
        // A second trigger while one exchange is in flight is dropped silently
        if self.controller.is_capturing() {
            return;
        }

        let Some(frame) = self.player.latest_frame() else {
            self.status_message = status::VIDEO_NOT_READY.to_string();
            return;
        };
        let frame = CaptureFrame {
            rgba: frame.rgba.clone(),
            width: frame.width,
            height: frame.height,
        };

        if let Some(generation) = self.controller.begin_capture() {
            self.pipeline.submit_encode(generation, frame);
        }
    }

    pub fn clear_grid(&mut self) {
        self.status_message = self.controller.clear_grid().to_string();
    }

    fn process_capture_events(&mut self) {
        while let Some(event) = self.pipeline.try_recv_event() {
            match event {
                CaptureEvent::Encoded {
                    generation,
                    jpeg,
                    preview,
                } => {
                    if let Some(slot) = self.controller.on_encoded(generation, preview) {
                        self.status_message = status::IDENTIFYING.to_string();
                        self.pipeline.submit_upload(generation, slot, jpeg);
                    }
                }
                CaptureEvent::EncodeFailed { generation, reason } => {
                    if let Some(text) = self.controller.on_encode_failed(generation, &reason) {
                        self.status_message = text.to_string();
                    }
                }
                CaptureEvent::Uploaded {
                    generation,
                    slot,
                    result,
                } => {
                    if let Some(text) = self.controller.on_uploaded(generation, slot, result) {
                        self.status_message = text.to_string();
                    }
                }
            }
        }
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        // Shortcuts stay inactive while a text field has focus
        if ctx.wants_keyboard_input() {
            return;
        }
        if !self.player.state().is_loaded() {
            return;
        }

        if ctx.input(|i| i.key_pressed(egui::Key::C)) {
            self.trigger_capture();
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Space)) {
            self.player.toggle_playback();
        }
    }

    fn show_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("📂 Open Video…").clicked() {
                self.choose_video();
            }
            if ui.button("Load").clicked() {
                self.load_video();
            }

            ui.separator();

            let capture_enabled = self.player.state().is_loaded();
            if ui
                .add_enabled(capture_enabled, egui::Button::new("📸 Capture (C)"))
                .clicked()
            {
                self.trigger_capture();
            }
            if ui.button("Clear grid").clicked() {
                self.clear_grid();
            }

            // Show current file on the right
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some(ref path) = self.selected_video {
                    ui.label(format!(
                        "📁 {}",
                        path.file_name().unwrap_or_default().to_string_lossy()
                    ));
                } else {
                    ui.label("❌ No video selected");
                }
            });
        });
    }

    fn show_player(&mut self, ui: &mut egui::Ui) {
        let available_width = ui.available_width();

        if let Some(texture) = self.player.texture() {
            let size = texture.size_vec2();
            if size.x > 0.0 && size.y > 0.0 {
                let scale = (available_width / size.x).min(320.0 / size.y).min(1.0);
                ui.vertical_centered(|ui| {
                    ui.add(egui::Image::new((texture.id(), size * scale)));
                });
            }
        } else {
            let (rect, _) = ui.allocate_exact_size(
                egui::Vec2::new(available_width, 220.0),
                egui::Sense::hover(),
            );
            ui.painter()
                .rect_filled(rect, 4.0, egui::Color32::from_gray(20));
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                self.player.state().display_text(),
                egui::FontId::proportional(16.0),
                egui::Color32::GRAY,
            );
        }

        self.show_transport(ui);
    }

    fn show_transport(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let state = self.player.state().clone();

            let toggle_label = if state.can_pause() { "⏸" } else { "▶" };
            if ui
                .add_enabled(
                    state.can_play() || state.can_pause(),
                    egui::Button::new(toggle_label),
                )
                .clicked()
            {
                self.player.toggle_playback();
            }

            let duration = self.player.duration();
            let mut position = self.player.position();

            ui.spacing_mut().slider_width = (ui.available_width() - 200.0).max(80.0);
            let slider =
                egui::Slider::new(&mut position, 0.0..=duration.max(0.001)).show_value(false);
            if ui.add_enabled(state.can_seek(), slider).changed() {
                self.player.seek(position);
            }

            ui.label(format!(
                "{} / {}",
                format_time(self.player.position()),
                format_time(duration)
            ));

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.weak(state.display_text());
            });
        });
    }
}

impl eframe::App for CardScoutApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Pump worker events before drawing anything
        self.player.update(ctx);
        self.process_capture_events();
        self.handle_keyboard(ctx);

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            self.show_toolbar(ui);
        });

        // Status bar at bottom
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Status:");
                if self.status_message.is_empty() {
                    ui.label("Ready");
                } else {
                    ui.label(&self.status_message);
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label("Capture: C");
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_player(ui);
            ui.separator();
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.grid_view.show(ui, self.controller.grid());
            });
        });

        // Request repaint to handle continuous updates
        ctx.request_repaint();
    }
}

fn format_time(seconds: f64) -> String {
    let mins = (seconds / 60.0) as u32;
    let secs = seconds % 60.0;
    format!("{}:{:04.1}", mins, secs)
}
