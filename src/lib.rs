//! Page-by-page gallery reader.
//!
//! Pages come from a [`provider::GalleryProvider`] (directory, zip archive or
//! remote HTTP gallery) that decodes in the background and reports through a
//! listener. The [`controller::GalleryController`] relays those reports onto
//! the UI thread and keeps page slots and the slider consistent with them.

pub mod config;
pub mod controller;
pub mod error;
pub mod image_decode;
pub mod input;
pub mod navigation;
pub mod notify;
pub mod page;
pub mod provider;
pub mod ui;

pub use config::Config;
pub use controller::{ControllerStats, GalleryController, PageMenuAction};
pub use error::{GalleryError, Result};
pub use image_decode::PageImage;
pub use navigation::{LayoutMode, Navigator, SliderProjection};
pub use page::{PageSlot, PageState, PageView, Progress};
pub use provider::{
    build_provider, ArchiveProvider, DirectoryProvider, GalleryInfo, GalleryProvider, GalleryProviderListener,
    GallerySize, GallerySource, RemoteProvider, SessionParams, Ticket,
};
