//! Desktop front-end: page surface, slider bar and menus on top of a
//! [`GalleryController`].

use crate::config::Config;
use crate::controller::{GalleryController, PageMenuAction};
use crate::image_decode::PageImage;
use crate::input::{self, ActionOutcome, NavZone};
use crate::navigation::LayoutMode;
use crate::page::{PageView, Progress};
use crate::provider::GallerySize;

/// Fraction of the page area height that acts as the menu tap band.
const MENU_BAND: f32 = 1.0 / 6.0;

/// egui rendition of one page.
///
/// Pixels handed over by `set_image` are uploaded lazily on the next paint,
/// since uploading needs the egui context.
#[derive(Default)]
pub struct PageSurface {
    pending: Option<egui::ColorImage>,
    texture: Option<egui::TextureHandle>,
    image_size: Option<egui::Vec2>,
    progress: Option<Progress>,
    page: usize,
    error: Option<String>,
    showing_image: bool,
}

impl PageView for PageSurface {
    fn show_info(&mut self) {
        self.showing_image = false;
    }

    fn show_image(&mut self) {
        self.showing_image = true;
    }

    fn set_image(&mut self, image: Option<&PageImage>) {
        match image {
            Some(image) => {
                let size = [image.width as usize, image.height as usize];
                self.pending = Some(egui::ColorImage::from_rgba_unmultiplied(size, &image.pixels));
                self.image_size = Some(egui::vec2(image.width as f32, image.height as f32));
            }
            None => {
                self.pending = None;
                self.texture = None;
                self.image_size = None;
            }
        }
    }

    fn set_progress(&mut self, progress: Progress) {
        self.progress = Some(progress);
    }

    fn set_page(&mut self, number: usize) {
        self.page = number;
    }

    fn set_error(&mut self, error: Option<&str>) {
        self.error = error.map(str::to_owned);
    }
}

impl PageSurface {
    fn upload(&mut self, ctx: &egui::Context) {
        if let Some(image) = self.pending.take() {
            puffin::profile_scope!("upload_page_texture");
            let name = format!("page-{}", self.page);
            self.texture = Some(ctx.load_texture(name, image, egui::TextureOptions::LINEAR));
        }
    }

    /// Paint the image fitted into `rect`, or the info layer.
    pub fn paint(&mut self, ui: &mut egui::Ui, rect: egui::Rect) {
        self.upload(ui.ctx());

        if self.showing_image {
            if let (Some(texture), Some(size)) = (&self.texture, self.image_size) {
                let scale = (rect.width() / size.x).min(rect.height() / size.y).min(1.0);
                let image_rect = egui::Rect::from_center_size(rect.center(), size * scale);
                ui.painter().image(
                    texture.id(),
                    image_rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
                return;
            }
        }

        let page = self.page;
        let progress = self.progress;
        let error = self.error.clone();
        ui.put(rect, |ui: &mut egui::Ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(rect.height() * 0.35);
                if page > 0 {
                    ui.label(egui::RichText::new(page.to_string()).color(egui::Color32::GRAY).size(48.0));
                }
                match progress {
                    Some(Progress::Percent(percent)) => {
                        ui.add(
                            egui::ProgressBar::new(percent / 100.0)
                                .desired_width(rect.width() * 0.4)
                                .show_percentage(),
                        );
                    }
                    Some(Progress::Indeterminate) => {
                        ui.add(egui::Spinner::new().size(32.0));
                    }
                    Some(Progress::Gone) | None => {}
                }
                if let Some(error) = &error {
                    ui.label(egui::RichText::new(error).color(egui::Color32::RED).size(16.0));
                }
            })
            .response
        });
    }
}

/// Application state
pub struct GalleryApp {
    controller: GalleryController<PageSurface>,
    config: Config,
    title: String,
    /// Slider position while the user drags it
    slider_value: usize,
    status: Option<String>,
    should_exit: bool,
}

impl GalleryApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        controller: GalleryController<PageSurface>,
        config: Config,
        title: String,
    ) -> Self {
        let ctx = cc.egui_ctx.clone();
        controller.set_waker(move || ctx.request_repaint());
        Self {
            controller,
            config,
            title,
            slider_value: 1,
            status: None,
            should_exit: false,
        }
    }

    fn handle_input(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let actions = ctx.input(|input| input::collect_actions(input, &self.config));
        for action in actions {
            if input::perform(&mut self.controller, action) == ActionOutcome::Exit {
                self.should_exit = true;
            }
        }
    }

    fn draw_slider(&mut self, ctx: &egui::Context) {
        if !self.controller.slider_visible() {
            return;
        }
        let Some(projection) = self.controller.projection().cloned() else {
            return;
        };

        egui::TopBottomPanel::bottom("slider").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(&projection.left_label);

                // Slider position runs left to right; flip it for reversed layouts.
                let to_position = |value: usize| {
                    if projection.reversed {
                        projection.max + projection.min - value
                    } else {
                        value
                    }
                };
                let old = projection.value;
                let mut position = to_position(self.slider_value.clamp(projection.min, projection.max));

                let label_width = 48.0;
                ui.spacing_mut().slider_width = (ui.available_width() - label_width).max(32.0);
                let response = ui.add(
                    egui::Slider::new(&mut position, projection.min..=projection.max).show_value(false),
                );
                ui.label(&projection.right_label);

                let new = to_position(position);
                if response.drag_stopped() || (response.changed() && !response.dragged()) {
                    self.slider_value = new;
                    self.controller.on_set_progress(new, old, true, true);
                } else if response.dragged() {
                    self.slider_value = new;
                    self.controller.on_set_progress(new, old, true, false);
                } else {
                    self.slider_value = old;
                }
            });
        });
    }

    fn draw_menu(&mut self, ctx: &egui::Context) {
        if !self.controller.menu_open() {
            return;
        }
        let mut open = true;
        egui::Window::new(&self.title)
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                let layout = self.controller.navigator().layout_mode();
                ui.horizontal(|ui| {
                    ui.label("Reading direction:");
                    if ui.selectable_label(layout == LayoutMode::LeftToRight, "Left to right").clicked() {
                        self.controller.set_layout_mode(LayoutMode::LeftToRight);
                    }
                    if ui.selectable_label(layout == LayoutMode::RightToLeft, "Right to left").clicked() {
                        self.controller.set_layout_mode(LayoutMode::RightToLeft);
                    }
                });
                ui.label(format!("Pages: {}", self.controller.size()));
                if let Some(status) = &self.status {
                    ui.label(status);
                }
            });
        if !open {
            self.controller.on_tap_menu_area();
        }
    }

    fn draw_page_menu(&mut self, ctx: &egui::Context) {
        let Some(index) = self.controller.page_menu() else {
            return;
        };
        let mut chosen = None;
        let mut dismissed = false;
        egui::Window::new(format!("Page {}", index + 1))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                if ui.button("Refresh").clicked() {
                    chosen = Some(PageMenuAction::Refresh);
                }
                if ui.button("Save").clicked() {
                    chosen = Some(PageMenuAction::Save);
                }
                if ui.button("Cancel").clicked() {
                    dismissed = true;
                }
            });

        if let Some(action) = chosen {
            self.status = match self.controller.page_menu_action(index, action) {
                Ok(Some(_export)) => Some(format!("Saving page {} to {}", index + 1, self.config.save_dir.display())),
                Ok(None) => None,
                Err(err) => Some(err.to_string()),
            };
        } else if dismissed {
            self.controller.dismiss_page_menu();
        }
    }

    fn draw_page(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let rect = ui.available_rect_before_wrap();
                let response = ui.allocate_rect(rect, egui::Sense::click());

                match self.controller.current_slot_mut() {
                    Some(slot) => slot.view_mut().paint(ui, rect),
                    None => {
                        let text = match self.controller.size() {
                            GallerySize::Error => self
                                .controller
                                .provider_error()
                                .unwrap_or_else(|| "Failed to open gallery".to_string()),
                            GallerySize::Ready(0) => "Gallery is empty".to_string(),
                            _ => "Loading…".to_string(),
                        };
                        ui.put(rect, egui::Label::new(egui::RichText::new(text).color(egui::Color32::GRAY).size(18.0)));
                    }
                }

                if response.secondary_clicked() || response.long_touched() {
                    let index = self.controller.current_index();
                    self.controller.on_long_press_page(index);
                } else if response.clicked() {
                    if let Some(pos) = response.interact_pointer_pos() {
                        self.on_page_tap(pos, rect);
                    }
                }
            });
    }

    fn on_page_tap(&mut self, pos: egui::Pos2, rect: egui::Rect) {
        if pos.y < rect.top() + rect.height() * MENU_BAND {
            self.controller.on_tap_menu_area();
            return;
        }
        match NavZone::from_position(pos.x, rect.left(), rect.width()) {
            NavZone::Left => self.controller.page_left(),
            NavZone::Right => self.controller.page_right(),
            NavZone::Center => self.controller.on_tap_slider_area(),
        }
    }
}

impl eframe::App for GalleryApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        puffin::GlobalProfiler::lock().new_frame();

        self.controller.pump();
        self.handle_input(ctx);

        self.draw_slider(ctx);
        self.draw_menu(ctx);
        self.draw_page_menu(ctx);
        self.draw_page(ctx);

        // Relay messages posted by this frame's input
        if self.controller.pump() > 0 {
            ctx.request_repaint();
        }

        if self.should_exit {
            self.controller.close();
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}
