//! Configuration module for reader settings, remote options and shortcuts.
//! Settings live in an INI file in the platform config directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{GalleryError, Result};
use crate::navigation::LayoutMode;

const DEFAULT_CONFIG_INI: &str = include_str!("../config.ini");

/// Represents all input types that can trigger a shortcut
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputBinding {
    Key(egui::Key),
    KeyWithCtrl(egui::Key),
    KeyWithShift(egui::Key),
    KeyWithAlt(egui::Key),
    ScrollUp,
    ScrollDown,
}

/// All configurable actions of the reader.
///
/// Page movement is expressed in reading order; the layout direction decides
/// which visual side that is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    PreviousPage,
    NextPage,
    FirstPage,
    LastPage,
    ToggleMenu,
    ToggleSlider,
    ToggleLayout,
    RefreshPage,
    SavePage,
    Exit,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::PreviousPage,
        Action::NextPage,
        Action::FirstPage,
        Action::LastPage,
        Action::ToggleMenu,
        Action::ToggleSlider,
        Action::ToggleLayout,
        Action::RefreshPage,
        Action::SavePage,
        Action::Exit,
    ];

    pub fn from_str(s: &str) -> Option<Action> {
        match s.trim().to_lowercase().as_str() {
            "previous_page" | "previous" | "prev" => Some(Action::PreviousPage),
            "next_page" | "next" => Some(Action::NextPage),
            "first_page" | "first" | "home" => Some(Action::FirstPage),
            "last_page" | "last" | "end" => Some(Action::LastPage),
            "toggle_menu" | "menu" => Some(Action::ToggleMenu),
            "toggle_slider" | "slider" => Some(Action::ToggleSlider),
            "toggle_layout" | "layout" | "toggle_direction" => Some(Action::ToggleLayout),
            "refresh_page" | "refresh" | "reload" => Some(Action::RefreshPage),
            "save_page" | "save" => Some(Action::SavePage),
            "exit" | "quit" | "close" => Some(Action::Exit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::PreviousPage => "previous_page",
            Action::NextPage => "next_page",
            Action::FirstPage => "first_page",
            Action::LastPage => "last_page",
            Action::ToggleMenu => "toggle_menu",
            Action::ToggleSlider => "toggle_slider",
            Action::ToggleLayout => "toggle_layout",
            Action::RefreshPage => "refresh_page",
            Action::SavePage => "save_page",
            Action::Exit => "exit",
        }
    }
}

/// Parse an input binding from string
pub fn parse_input_binding(s: &str) -> Option<InputBinding> {
    let s = s.trim().to_lowercase();

    if let Some(key_str) = s.strip_prefix("ctrl+") {
        return parse_key(key_str).map(InputBinding::KeyWithCtrl);
    }
    if let Some(key_str) = s.strip_prefix("shift+") {
        return parse_key(key_str).map(InputBinding::KeyWithShift);
    }
    if let Some(key_str) = s.strip_prefix("alt+") {
        return parse_key(key_str).map(InputBinding::KeyWithAlt);
    }

    match s.as_str() {
        "scroll_up" | "wheel_up" => return Some(InputBinding::ScrollUp),
        "scroll_down" | "wheel_down" => return Some(InputBinding::ScrollDown),
        _ => {}
    }

    parse_key(&s).map(InputBinding::Key)
}

/// Parse a single key from string
fn parse_key(s: &str) -> Option<egui::Key> {
    let key = match s.trim().to_lowercase().as_str() {
        "left" | "arrow_left" | "arrowleft" => egui::Key::ArrowLeft,
        "right" | "arrow_right" | "arrowright" => egui::Key::ArrowRight,
        "up" | "arrow_up" | "arrowup" => egui::Key::ArrowUp,
        "down" | "arrow_down" | "arrowdown" => egui::Key::ArrowDown,
        "escape" | "esc" => egui::Key::Escape,
        "enter" | "return" => egui::Key::Enter,
        "space" | "spacebar" => egui::Key::Space,
        "tab" => egui::Key::Tab,
        "backspace" => egui::Key::Backspace,
        "delete" | "del" => egui::Key::Delete,
        "home" => egui::Key::Home,
        "end" => egui::Key::End,
        "pageup" | "page_up" => egui::Key::PageUp,
        "pagedown" | "page_down" => egui::Key::PageDown,
        "minus" | "-" => egui::Key::Minus,
        "plus" | "=" | "equals" => egui::Key::Equals,
        "f1" => egui::Key::F1,
        "f2" => egui::Key::F2,
        "f3" => egui::Key::F3,
        "f4" => egui::Key::F4,
        "f5" => egui::Key::F5,
        "f6" => egui::Key::F6,
        "f7" => egui::Key::F7,
        "f8" => egui::Key::F8,
        "f9" => egui::Key::F9,
        "f10" => egui::Key::F10,
        "f11" => egui::Key::F11,
        "f12" => egui::Key::F12,
        other => return egui::Key::from_name(other).or_else(|| egui::Key::from_name(&other.to_uppercase())),
    };
    Some(key)
}

/// Application configuration loaded from INI file
#[derive(Debug, Clone)]
pub struct Config {
    /// Map from input binding to action
    pub bindings: HashMap<InputBinding, Action>,
    /// Reverse map for looking up bindings for an action
    pub action_bindings: HashMap<Action, Vec<InputBinding>>,

    /// Layout direction a new session starts with
    pub reading_direction: LayoutMode,
    /// Pages kept bound on each side of the current one
    pub preload_radius: usize,
    /// Decoded pages larger than this on either side are downscaled (0 = never)
    pub max_texture_side: u32,
    /// Maximum requests a file provider drains into one parallel decode batch
    pub batch_size: usize,

    /// HTTP timeout for remote galleries, in seconds
    pub remote_timeout_secs: u64,
    /// Raw page downloads kept in memory
    pub remote_cache_pages: usize,
    /// Worker threads of the remote provider's runtime
    pub remote_worker_threads: usize,

    /// Where "Save" writes exported pages
    pub save_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self::without_bindings();
        config.set_defaults();
        config
    }
}

impl Config {
    fn without_bindings() -> Self {
        Config {
            bindings: HashMap::new(),
            action_bindings: HashMap::new(),
            reading_direction: LayoutMode::LeftToRight,
            preload_radius: 1,
            max_texture_side: 8192,
            batch_size: 8,
            remote_timeout_secs: 30,
            remote_cache_pages: 16,
            remote_worker_threads: 2,
            save_dir: default_save_dir(),
        }
    }

    /// Set default keybindings
    fn set_defaults(&mut self) {
        use egui::Key;

        for key in [Key::ArrowLeft, Key::ArrowUp, Key::PageUp] {
            self.add_binding(InputBinding::Key(key), Action::PreviousPage);
        }
        self.add_binding(InputBinding::ScrollUp, Action::PreviousPage);
        for key in [Key::ArrowRight, Key::ArrowDown, Key::PageDown] {
            self.add_binding(InputBinding::Key(key), Action::NextPage);
        }
        self.add_binding(InputBinding::ScrollDown, Action::NextPage);

        self.add_binding(InputBinding::Key(Key::Home), Action::FirstPage);
        self.add_binding(InputBinding::Key(Key::End), Action::LastPage);
        self.add_binding(InputBinding::Key(Key::Space), Action::ToggleMenu);
        self.add_binding(InputBinding::Key(Key::S), Action::ToggleSlider);
        self.add_binding(InputBinding::Key(Key::L), Action::ToggleLayout);
        self.add_binding(InputBinding::Key(Key::F5), Action::RefreshPage);
        self.add_binding(InputBinding::KeyWithCtrl(Key::S), Action::SavePage);
        self.add_binding(InputBinding::Key(Key::Escape), Action::Exit);
        self.add_binding(InputBinding::KeyWithCtrl(Key::W), Action::Exit);
    }

    /// Add a binding
    fn add_binding(&mut self, input: InputBinding, action: Action) {
        if let Some(previous) = self.bindings.insert(input.clone(), action) {
            if let Some(list) = self.action_bindings.get_mut(&previous) {
                list.retain(|b| b != &input);
            }
        }
        self.action_bindings.entry(action).or_default().push(input);
    }

    /// Platform configuration directory, e.g. `~/.config/gallery-viewer`.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "gallery-viewer").map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.ini"))
    }

    /// Load configuration from the platform config file, creating it from
    /// the bundled template on first run. Never fails; problems are logged
    /// and defaults are used.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            warn!("no configuration directory available, using defaults");
            return Self::parse_ini(DEFAULT_CONFIG_INI);
        };

        if !path.exists() {
            let written = path
                .parent()
                .map(fs::create_dir_all)
                .unwrap_or(Ok(()))
                .and_then(|_| fs::write(&path, DEFAULT_CONFIG_INI));
            if let Err(err) = written {
                warn!(path = %path.display(), error = %err, "could not write config template");
            }
            return Self::parse_ini(DEFAULT_CONFIG_INI);
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "could not read config, using defaults");
                Self::parse_ini(DEFAULT_CONFIG_INI)
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| GalleryError::io(path, e))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(Self::parse_ini(&content))
    }

    /// Parse INI content into Config
    pub fn parse_ini(content: &str) -> Self {
        let mut config = Self::without_bindings();
        let mut shortcuts_seen = false;

        #[derive(PartialEq)]
        enum Section {
            None,
            Settings,
            Remote,
            Export,
            Shortcuts,
        }
        let mut section = Section::None;

        for line in content.lines() {
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = &line[1..line.len() - 1];
                section = if name.eq_ignore_ascii_case("settings") {
                    Section::Settings
                } else if name.eq_ignore_ascii_case("remote") {
                    Section::Remote
                } else if name.eq_ignore_ascii_case("export") {
                    Section::Export
                } else if name.eq_ignore_ascii_case("shortcuts") {
                    shortcuts_seen = true;
                    Section::Shortcuts
                } else {
                    Section::None
                };
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match section {
                Section::Shortcuts => {
                    if let Some(action) = Action::from_str(&key) {
                        // Value can be comma-separated for multiple bindings
                        for binding_str in value.split(',') {
                            if let Some(binding) = parse_input_binding(binding_str) {
                                config.add_binding(binding, action);
                            }
                        }
                    }
                }
                Section::Settings => match key.as_str() {
                    "reading_direction" | "layout_mode" | "direction" => {
                        if let Some(mode) = LayoutMode::from_str(value) {
                            config.reading_direction = mode;
                        }
                    }
                    "preload_radius" | "preload" => {
                        if let Ok(v) = value.parse::<usize>() {
                            config.preload_radius = v.min(8);
                        }
                    }
                    "max_texture_side" | "max_texture_size" => {
                        if let Ok(v) = value.parse::<u32>() {
                            // 0 disables downscaling
                            config.max_texture_side = if v == 0 { 0 } else { v.clamp(256, 16384) };
                        }
                    }
                    "batch_size" => {
                        if let Ok(v) = value.parse::<usize>() {
                            config.batch_size = v.clamp(1, 64);
                        }
                    }
                    _ => {}
                },
                Section::Remote => match key.as_str() {
                    "timeout_secs" | "timeout" => {
                        if let Ok(v) = value.parse::<u64>() {
                            config.remote_timeout_secs = v.clamp(1, 600);
                        }
                    }
                    "cache_pages" | "cache_size" => {
                        if let Ok(v) = value.parse::<usize>() {
                            config.remote_cache_pages = v.clamp(1, 512);
                        }
                    }
                    "worker_threads" | "threads" => {
                        if let Ok(v) = value.parse::<usize>() {
                            config.remote_worker_threads = v.clamp(1, 16);
                        }
                    }
                    _ => {}
                },
                Section::Export => {
                    if key == "save_dir" && !value.is_empty() {
                        config.save_dir = PathBuf::from(value);
                    }
                }
                Section::None => {}
            }
        }

        // Without a [Shortcuts] section, or with one that binds nothing, use defaults
        if !shortcuts_seen || config.bindings.is_empty() {
            config.set_defaults();
        }

        config
    }

    /// Write the current configuration as commented INI.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let mut content = String::new();

        content.push_str("; Gallery Viewer Configuration\n\n");

        content.push_str("[Settings]\n");
        content.push_str("; Reading direction: left_to_right or right_to_left\n");
        content.push_str(&format!("reading_direction = {}\n", self.reading_direction.as_str()));
        content.push_str("; Pages kept loaded on each side of the current page\n");
        content.push_str(&format!("preload_radius = {}\n", self.preload_radius));
        content.push_str("; Larger pages are downscaled to fit this many pixels per side (0 = never)\n");
        content.push_str(&format!("max_texture_side = {}\n", self.max_texture_side));
        content.push_str("; Page requests decoded together in one parallel batch\n");
        content.push_str(&format!("batch_size = {}\n\n", self.batch_size));

        content.push_str("[Remote]\n");
        content.push_str(&format!("timeout_secs = {}\n", self.remote_timeout_secs));
        content.push_str(&format!("cache_pages = {}\n", self.remote_cache_pages));
        content.push_str(&format!("worker_threads = {}\n\n", self.remote_worker_threads));

        content.push_str("[Export]\n");
        content.push_str(&format!("save_dir = {}\n\n", self.save_dir.display()));

        content.push_str("[Shortcuts]\n");
        content.push_str("; Multiple bindings are comma separated, modifiers as ctrl+key\n");
        for action in Action::ALL {
            let bindings: Vec<String> = self.get_bindings(action).iter().map(binding_to_string).collect();
            if !bindings.is_empty() {
                content.push_str(&format!("{} = {}\n", action.as_str(), bindings.join(", ")));
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| GalleryError::io(parent, e))?;
        }
        fs::write(path, content).map_err(|e| GalleryError::io(path, e))
    }

    /// Action bound to an input, if any
    pub fn action_for(&self, input: &InputBinding) -> Option<Action> {
        self.bindings.get(input).copied()
    }

    pub fn is_action(&self, input: &InputBinding, action: Action) -> bool {
        self.bindings.get(input) == Some(&action)
    }

    /// Get all bindings for an action
    pub fn get_bindings(&self, action: Action) -> Vec<InputBinding> {
        self.action_bindings.get(&action).cloned().unwrap_or_default()
    }
}

fn default_save_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.picture_dir().map(|p| p.join("gallery-viewer")))
        .unwrap_or_else(|| PathBuf::from("exports"))
}

/// Convert InputBinding back to string representation
fn binding_to_string(binding: &InputBinding) -> String {
    match binding {
        InputBinding::Key(key) => key_to_string(key),
        InputBinding::KeyWithCtrl(key) => format!("ctrl+{}", key_to_string(key)),
        InputBinding::KeyWithShift(key) => format!("shift+{}", key_to_string(key)),
        InputBinding::KeyWithAlt(key) => format!("alt+{}", key_to_string(key)),
        InputBinding::ScrollUp => "scroll_up".to_string(),
        InputBinding::ScrollDown => "scroll_down".to_string(),
    }
}

fn key_to_string(key: &egui::Key) -> String {
    match key {
        egui::Key::ArrowLeft => "left".to_string(),
        egui::Key::ArrowRight => "right".to_string(),
        egui::Key::ArrowUp => "up".to_string(),
        egui::Key::ArrowDown => "down".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let config = Config::parse_ini(DEFAULT_CONFIG_INI);
        assert_eq!(config.reading_direction, LayoutMode::LeftToRight);
        assert_eq!(config.preload_radius, 1);
        assert_eq!(config.action_for(&InputBinding::Key(egui::Key::ArrowLeft)), Some(Action::PreviousPage));
        assert_eq!(config.action_for(&InputBinding::Key(egui::Key::Space)), Some(Action::ToggleMenu));
    }

    #[test]
    fn values_are_clamped_and_unknown_keys_ignored() {
        let config = Config::parse_ini(
            "[Settings]\nreading_direction = rtl\npreload_radius = 99\nbatch_size = 0\nbogus = 1\n\
             [Remote]\ntimeout_secs = 0\ncache_pages = 4\n[Export]\nsave_dir = /tmp/pages\n",
        );
        assert_eq!(config.reading_direction, LayoutMode::RightToLeft);
        assert_eq!(config.preload_radius, 8);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.remote_timeout_secs, 1);
        assert_eq!(config.remote_cache_pages, 4);
        assert_eq!(config.save_dir, PathBuf::from("/tmp/pages"));
        // No [Shortcuts] section: defaults apply
        assert!(config.is_action(&InputBinding::Key(egui::Key::ArrowRight), Action::NextPage));
    }

    #[test]
    fn shortcuts_accept_lists_and_modifiers() {
        let config = Config::parse_ini("[Shortcuts]\nnext_page = d, ctrl+right\nexit = q\n");
        assert_eq!(config.action_for(&InputBinding::Key(egui::Key::D)), Some(Action::NextPage));
        assert_eq!(
            config.action_for(&InputBinding::KeyWithCtrl(egui::Key::ArrowRight)),
            Some(Action::NextPage)
        );
        assert_eq!(config.action_for(&InputBinding::Key(egui::Key::Q)), Some(Action::Exit));
        assert!(config.action_for(&InputBinding::Key(egui::Key::ArrowRight)).is_none());
    }

    #[test]
    fn saved_config_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        let mut config = Config::default();
        config.reading_direction = LayoutMode::RightToLeft;
        config.remote_worker_threads = 3;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.reading_direction, LayoutMode::RightToLeft);
        assert_eq!(loaded.remote_worker_threads, 3);
        assert_eq!(loaded.get_bindings(Action::PreviousPage).len(), config.get_bindings(Action::PreviousPage).len());
    }
}
