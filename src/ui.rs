//! The viewer window: live video, detection overlay and the mapped
//! emoji/caption for the current expression.

use std::sync::Arc;
use std::time::Duration;

use eframe::egui::{
    self, Color32, ColorImage, Pos2, Rect, RichText, TextureHandle, TextureOptions,
};
use moodmirror_vision::Dimensions;

use crate::mapper::{caption_for, emoji_for, Locale};
use crate::tracker::{SharedView, TrackerHandle};

pub struct ViewerApp {
    shared: Arc<SharedView>,
    tracker: Option<TrackerHandle>,
    locale: Locale,
    failure_warn_threshold: u32,
    video_texture: Option<TextureHandle>,
    overlay_texture: Option<TextureHandle>,
    startup_error: Option<String>,
}

impl ViewerApp {
    pub fn new(
        shared: Arc<SharedView>,
        tracker: TrackerHandle,
        locale: Locale,
        failure_warn_threshold: u32,
    ) -> Self {
        Self {
            shared,
            tracker: Some(tracker),
            locale,
            failure_warn_threshold,
            video_texture: None,
            overlay_texture: None,
            startup_error: None,
        }
    }

    /// A window that only reports why the feature could not start. Camera
    /// and model failures must be visible, not just logged.
    pub fn startup_failed(message: String) -> Self {
        Self {
            shared: Arc::new(SharedView::new()),
            tracker: None,
            locale: Locale::default(),
            failure_warn_threshold: u32::MAX,
            video_texture: None,
            overlay_texture: None,
            startup_error: Some(message),
        }
    }

    fn refresh_textures(&mut self, ctx: &egui::Context) {
        if let Some(frame) = self.shared.video_frame() {
            let size = [frame.width() as usize, frame.height() as usize];
            let image = ColorImage::from_rgb(size, frame.as_raw());
            match &mut self.video_texture {
                Some(texture) => texture.set(image, TextureOptions::LINEAR),
                None => {
                    self.video_texture =
                        Some(ctx.load_texture("video", image, TextureOptions::LINEAR))
                }
            }
        }
        if let Some(overlay) = self.shared.overlay_frame() {
            let size = [overlay.width() as usize, overlay.height() as usize];
            let image = ColorImage::from_rgba_unmultiplied(size, overlay.as_raw());
            match &mut self.overlay_texture {
                Some(texture) => texture.set(image, TextureOptions::LINEAR),
                None => {
                    self.overlay_texture =
                        Some(ctx.load_texture("overlay", image, TextureOptions::LINEAR))
                }
            }
        }
    }

    fn show_video(&self, ui: &mut egui::Ui) {
        let Some(texture) = &self.video_texture else {
            ui.label("Waiting for camera…");
            return;
        };

        let avail = ui.available_size();
        let caption_height = 120.0;
        let area = egui::vec2(avail.x, (avail.y - caption_height).max(1.0));
        let tex_size = texture.size_vec2();
        let scale = (area.x / tex_size.x).min(area.y / tex_size.y).max(0.01);
        let size = tex_size * scale;

        let (rect, _response) = ui.allocate_exact_size(size, egui::Sense::hover());
        let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
        ui.painter().image(texture.id(), rect, uv, Color32::WHITE);
        if let Some(overlay) = &self.overlay_texture {
            ui.painter().image(overlay.id(), rect, uv, Color32::WHITE);
        }

        // Tell the loop what size the video is actually rendered at, so
        // the next overlay is drawn to match.
        self.shared.set_display_dims(Dimensions {
            width: rect.width().round() as u32,
            height: rect.height().round() as u32,
        });
    }

    fn show_caption(&self, ui: &mut egui::Ui) {
        let expression = self.shared.expression();
        let label = expression.map(|e| e.as_label()).unwrap_or("");
        ui.horizontal(|ui| {
            match emoji_for(label) {
                Some(glyph) => {
                    ui.label(RichText::new(glyph).size(64.0));
                    ui.label(RichText::new(caption_for(label, self.locale)).size(28.0));
                }
                None => {
                    ui.label(RichText::new("…").size(28.0).weak());
                }
            };
        });
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(Duration::from_millis(100));

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(message) = &self.startup_error {
                ui.centered_and_justified(|ui| {
                    ui.label(
                        RichText::new(format!("⚠ {message}"))
                            .size(20.0)
                            .color(Color32::LIGHT_RED),
                    );
                });
                return;
            }

            if self.shared.consecutive_failures() >= self.failure_warn_threshold {
                ui.colored_label(
                    Color32::YELLOW,
                    "Detection keeps failing; check the camera and the log.",
                );
            }

            self.refresh_textures(ctx);
            self.show_video(ui);
            ui.separator();
            self.show_caption(ui);
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if let Some(mut tracker) = self.tracker.take() {
            tracker.stop();
        }
    }
}

/// Open the viewer window and block until it closes.
pub fn run(app: ViewerApp) -> anyhow::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 760.0])
            .with_title("moodmirror"),
        ..Default::default()
    };
    eframe::run_native("moodmirror", options, Box::new(move |_cc| Ok(Box::new(app))))
        .map_err(|err| anyhow::anyhow!("viewer window failed: {err}"))
}
