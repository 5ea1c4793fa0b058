//! Input handling module
//!
//! Turns egui input into configured [`Action`]s, resolves tap zones on the
//! page area and applies actions to a running session.

use crate::config::{Action, Config, InputBinding};
use crate::controller::GalleryController;
use crate::navigation::LayoutMode;
use crate::page::PageView;

/// Region of the page area a tap landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavZone {
    Left,
    /// Middle band: slider toggle.
    Center,
    Right,
}

impl NavZone {
    /// Left and right thirds page; the middle third toggles the slider.
    pub fn from_position(x: f32, left: f32, width: f32) -> Self {
        if width <= 0.0 {
            return NavZone::Center;
        }
        let t = (x - left) / width;
        if t < 1.0 / 3.0 {
            NavZone::Left
        } else if t > 2.0 / 3.0 {
            NavZone::Right
        } else {
            NavZone::Center
        }
    }
}

/// Physical direction a reading-order action resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualMove {
    Left,
    Right,
}

/// Resolve a reading-order page action through the layout direction.
pub fn visual_move(action: Action, layout: LayoutMode) -> Option<VisualMove> {
    match (action, layout) {
        (Action::PreviousPage, LayoutMode::LeftToRight) | (Action::NextPage, LayoutMode::RightToLeft) => {
            Some(VisualMove::Left)
        }
        (Action::NextPage, LayoutMode::LeftToRight) | (Action::PreviousPage, LayoutMode::RightToLeft) => {
            Some(VisualMove::Right)
        }
        _ => None,
    }
}

/// Binding produced by a key press with the given modifiers.
pub fn key_binding(key: egui::Key, modifiers: egui::Modifiers) -> InputBinding {
    if modifiers.command || modifiers.ctrl {
        InputBinding::KeyWithCtrl(key)
    } else if modifiers.shift {
        InputBinding::KeyWithShift(key)
    } else if modifiers.alt {
        InputBinding::KeyWithAlt(key)
    } else {
        InputBinding::Key(key)
    }
}

/// Collect the actions triggered during this frame, in input order.
pub fn collect_actions(input: &egui::InputState, config: &Config) -> Vec<Action> {
    let mut actions = Vec::new();
    for event in &input.events {
        if let egui::Event::Key {
            key,
            pressed: true,
            modifiers,
            ..
        } = event
        {
            if let Some(action) = config.action_for(&key_binding(*key, *modifiers)) {
                actions.push(action);
            }
        }
    }

    let scroll = input.raw_scroll_delta.y;
    let wheel = if scroll > 0.0 {
        Some(InputBinding::ScrollUp)
    } else if scroll < 0.0 {
        Some(InputBinding::ScrollDown)
    } else {
        None
    };
    if let Some(action) = wheel.and_then(|binding| config.action_for(&binding)) {
        actions.push(action);
    }
    actions
}

/// What the front-end must do after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Handled,
    Exit,
}

/// Apply `action` to the session.
pub fn perform<V: PageView>(controller: &mut GalleryController<V>, action: Action) -> ActionOutcome {
    if let Some(step) = visual_move(action, controller.navigator().layout_mode()) {
        match step {
            VisualMove::Left => controller.page_left(),
            VisualMove::Right => controller.page_right(),
        }
        return ActionOutcome::Handled;
    }

    match action {
        Action::FirstPage => controller.first_page(),
        Action::LastPage => controller.last_page(),
        Action::ToggleMenu => controller.on_tap_menu_area(),
        Action::ToggleSlider => controller.on_tap_slider_area(),
        Action::ToggleLayout => controller.toggle_layout_mode(),
        Action::RefreshPage => {
            let index = controller.current_index();
            if let Err(err) = controller.refresh_page(index) {
                tracing::debug!(index, error = %err, "refresh rejected");
            }
        }
        Action::SavePage => {
            let index = controller.current_index();
            if let Err(err) = controller.save_page(index) {
                tracing::warn!(index, error = %err, "save rejected");
            }
        }
        Action::Exit => return ActionOutcome::Exit,
        Action::PreviousPage | Action::NextPage => {}
    }
    ActionOutcome::Handled
}
