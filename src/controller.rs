//! Consumer-side session: owns the provider, drains the relay and keeps page
//! slots and navigation consistent with in-flight work.
//!
//! Everything here runs on one thread. Provider callbacks only ever reach this
//! module as relay messages, applied in FIFO order by [`GalleryController::pump`].

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{GalleryError, Result};
use crate::image_decode::PageImage;
use crate::navigation::{LayoutMode, Navigator, SliderProjection};
use crate::notify::{Notify, NotifyKey, PageEvent, Relay, RelaySender};
use crate::page::{Applied, PageSlot, PageView, Progress};
use crate::provider::{build_provider, GalleryProvider, GalleryProviderListener, GallerySize, GallerySource, Ticket};

/// Counters for monitoring the consumer side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControllerStats {
    /// Decoded pages handed to a bound slot.
    pub images_applied: usize,
    /// Decoded pages dropped because no slot was bound to their index.
    pub images_released: usize,
    /// Events discarded because a newer request attempt exists.
    pub stale_events: usize,
}

/// Entries of the long-press page menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMenuAction {
    /// Abandon the current attempt and load the page again.
    Refresh,
    /// Export the decoded page as PNG.
    Save,
}

/// Listener installed on the provider. Posts everything onto the relay.
struct RelayListener {
    sender: RelaySender,
}

impl GalleryProviderListener for RelayListener {
    fn on_data_changed(&self, size: GallerySize) {
        self.sender.post_task(NotifyKey::Size, size.to_raw());
    }

    fn on_page_changed(&self, index: usize) {
        self.sender.post_task(NotifyKey::PageChanged, index as i64);
    }

    fn on_page_wait(&self, ticket: Ticket) {
        self.sender.post_page(PageEvent::Wait(ticket));
    }

    fn on_page_percent(&self, ticket: Ticket, progress: Progress) {
        self.sender.post_page(PageEvent::Percent(ticket, progress));
    }

    fn on_page_succeed(&self, ticket: Ticket, image: PageImage) {
        self.sender.post_page(PageEvent::Succeed(ticket, image));
    }

    fn on_page_failed(&self, ticket: Ticket, error: String) {
        self.sender.post_page(PageEvent::Failed(ticket, error));
    }
}

/// One open gallery.
pub struct GalleryController<V: PageView> {
    provider: Box<dyn GalleryProvider>,
    relay: Relay,
    navigator: Navigator,
    /// Page the view is centred on. Leads the navigator until the
    /// current-index notification is applied.
    window_center: usize,
    preload_radius: usize,
    slots: Vec<PageSlot<V>>,
    slider_visible: bool,
    menu_open: bool,
    page_menu: Option<usize>,
    save_dir: PathBuf,
    stats: ControllerStats,
    closed: bool,
}

impl<V: PageView + Default> GalleryController<V> {
    /// Build the provider for `source` and start the session.
    pub fn open(source: GallerySource, config: &Config) -> Result<Self> {
        info!(?source, "opening gallery");
        let provider = build_provider(source, config)?;
        Ok(Self::with_provider(provider, config))
    }

    /// Start a session on an already constructed provider.
    pub fn with_provider(provider: Box<dyn GalleryProvider>, config: &Config) -> Self {
        let relay = Relay::new();
        let slot_count = 2 * config.preload_radius + 1;
        let slots = (0..slot_count).map(|_| PageSlot::new(V::default())).collect();

        provider.set_listener(Some(Arc::new(RelayListener { sender: relay.sender() })));
        provider.start();

        Self {
            provider,
            relay,
            navigator: Navigator::new(config.reading_direction),
            window_center: 0,
            preload_radius: config.preload_radius,
            slots,
            slider_visible: false,
            menu_open: false,
            page_menu: None,
            save_dir: config.save_dir.clone(),
            stats: ControllerStats::default(),
            closed: false,
        }
    }
}

impl<V: PageView> GalleryController<V> {
    /// Callback run whenever a message is posted from any thread.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.relay.set_waker(waker);
    }

    /// Apply every pending relay message. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        puffin::profile_function!();
        let mut applied = 0;
        while let Some(message) = self.relay.try_next() {
            match message {
                Notify::Task(task) => {
                    self.run_task(task.key(), task.value());
                    self.relay.recycle(task);
                }
                Notify::Page(event) => self.apply_page_event(event),
            }
            applied += 1;
        }
        applied
    }

    fn run_task(&mut self, key: NotifyKey, value: i64) {
        match key {
            NotifyKey::Size => self.apply_size(GallerySize::from_raw(value)),
            NotifyKey::CurrentIndex => {
                if let Ok(index) = usize::try_from(value) {
                    self.navigator.set_current_index(index);
                }
            }
            NotifyKey::LayoutMode => {
                self.navigator.set_layout_mode(LayoutMode::from_raw(value));
            }
            NotifyKey::TapSliderArea => {
                if self.navigator.page_count() > 0 {
                    self.slider_visible = !self.slider_visible;
                }
            }
            NotifyKey::TapMenuArea => self.menu_open = !self.menu_open,
            NotifyKey::LongPressPage => {
                self.page_menu = usize::try_from(value)
                    .ok()
                    .filter(|index| self.navigator.size().contains(*index));
            }
            NotifyKey::PageChanged => {
                if let Ok(index) = usize::try_from(value) {
                    self.rerequest(index);
                }
            }
        }
    }

    fn apply_size(&mut self, size: GallerySize) {
        self.navigator.set_size(size);
        match size {
            GallerySize::Ready(count) => {
                debug!(count, "gallery size ready");
                self.window_center = self.window_center.min(count.saturating_sub(1));
                self.rebind_window();
            }
            GallerySize::Error => {
                let error = self
                    .provider
                    .error()
                    .unwrap_or_else(|| "unknown error".to_string());
                warn!(%error, "gallery provider reported a fatal error");
                for slot in &mut self.slots {
                    slot.fail_unless_loaded(&error);
                }
                self.slider_visible = false;
            }
            GallerySize::Wait => {}
        }
    }

    fn apply_page_event(&mut self, event: PageEvent) {
        let ticket = event.ticket();
        let carries_image = matches!(event, PageEvent::Succeed(..));

        let Some(slot) = self.slots.iter_mut().find(|s| s.index() == Some(ticket.index)) else {
            if carries_image {
                self.stats.images_released += 1;
                debug!(index = ticket.index, "released image for unbound page");
            }
            return;
        };

        match slot.apply(event) {
            Applied::Stale => {
                self.stats.stale_events += 1;
                debug!(
                    index = ticket.index,
                    generation = ticket.generation,
                    current = slot.generation(),
                    "discarded stale page event"
                );
            }
            Applied::Updated => {
                if carries_image {
                    self.stats.images_applied += 1;
                }
            }
        }
    }

    /// Bind slots to the pages around the window centre and unbind the rest.
    fn rebind_window(&mut self) {
        let count = self.navigator.page_count();
        if count == 0 {
            for slot in &mut self.slots {
                if slot.index().is_some() {
                    slot.unbind();
                }
            }
            return;
        }

        let first = self.window_center.saturating_sub(self.preload_radius);
        let last = (self.window_center + self.preload_radius).min(count - 1);
        let wanted = first..=last;

        for slot in &mut self.slots {
            if slot.index().map_or(false, |index| !wanted.contains(&index)) {
                slot.unbind();
            }
        }

        // Current page first so it gets the earliest request.
        let mut order: Vec<usize> = wanted.collect();
        order.sort_by_key(|index| index.abs_diff(self.window_center));

        for index in order {
            if self.slots.iter().any(|s| s.index() == Some(index)) {
                continue;
            }
            let Some(slot) = self.slots.iter_mut().find(|s| s.index().is_none()) else {
                break;
            };
            match self.provider.request(index) {
                Ok(generation) => slot.bind(index, generation),
                Err(err) => slot.bind_rejected(index, &err.to_string()),
            }
        }
    }

    /// Request a bound page again after its content changed.
    fn rerequest(&mut self, index: usize) {
        let Some(slot) = self.slots.iter_mut().find(|s| s.index() == Some(index)) else {
            return;
        };
        match self.provider.request(index) {
            Ok(generation) => slot.bind(index, generation),
            Err(err) => slot.bind_rejected(index, &err.to_string()),
        }
    }

    /// Move the view to `index`. Out-of-range indices are clamped.
    pub fn set_current_page(&mut self, index: usize) {
        let Some(index) = self.navigator.clamp_index(index) else {
            return;
        };
        if index == self.window_center && self.slots.iter().any(|s| s.index() == Some(index)) {
            return;
        }
        self.window_center = index;
        self.rebind_window();
        self.relay.sender().post_task(NotifyKey::CurrentIndex, index as i64);
    }

    /// Move to the page visually on the left.
    pub fn page_left(&mut self) {
        if let Some(target) = self.navigator.left_of(self.window_center) {
            self.set_current_page(target);
        }
    }

    /// Move to the page visually on the right.
    pub fn page_right(&mut self) {
        if let Some(target) = self.navigator.right_of(self.window_center) {
            self.set_current_page(target);
        }
    }

    /// Previous page in reading order.
    pub fn previous_page(&mut self) {
        match self.navigator.layout_mode() {
            LayoutMode::LeftToRight => self.page_left(),
            LayoutMode::RightToLeft => self.page_right(),
        }
    }

    /// Next page in reading order.
    pub fn next_page(&mut self) {
        match self.navigator.layout_mode() {
            LayoutMode::LeftToRight => self.page_right(),
            LayoutMode::RightToLeft => self.page_left(),
        }
    }

    pub fn first_page(&mut self) {
        self.set_current_page(0);
    }

    pub fn last_page(&mut self) {
        let count = self.navigator.page_count();
        if count > 0 {
            self.set_current_page(count - 1);
        }
    }

    /// Slider callback. Navigates only on a confirmed user change.
    pub fn on_set_progress(&mut self, new_progress: usize, _old_progress: usize, by_user: bool, confirm: bool) {
        if !(by_user && confirm) {
            return;
        }
        if let Some(index) = self.navigator.index_for_slider(new_progress) {
            self.set_current_page(index);
        }
    }

    /// Programmatic index change. Moves the window like any other
    /// navigation; the slider follows once the echo is pumped.
    pub fn on_update_current_index(&mut self, index: usize) {
        self.set_current_page(index);
    }

    pub fn on_tap_slider_area(&self) {
        self.relay.sender().post_task(NotifyKey::TapSliderArea, 0);
    }

    pub fn on_tap_menu_area(&self) {
        self.relay.sender().post_task(NotifyKey::TapMenuArea, 0);
    }

    pub fn on_long_press_page(&self, index: usize) {
        self.relay.sender().post_task(NotifyKey::LongPressPage, index as i64);
    }

    pub fn set_layout_mode(&self, mode: LayoutMode) {
        self.relay.sender().post_task(NotifyKey::LayoutMode, mode.to_raw());
    }

    pub fn toggle_layout_mode(&self) {
        self.set_layout_mode(self.navigator.layout_mode().toggled());
    }

    pub fn dismiss_page_menu(&mut self) {
        self.page_menu = None;
    }

    /// Run an entry of the page menu and close it.
    ///
    /// `Save` returns the handle of the background export.
    pub fn page_menu_action(&mut self, index: usize, action: PageMenuAction) -> Result<Option<JoinHandle<Result<PathBuf>>>> {
        self.page_menu = None;
        match action {
            PageMenuAction::Refresh => {
                self.refresh_page(index)?;
                Ok(None)
            }
            PageMenuAction::Save => self.save_page(index).map(Some),
        }
    }

    /// Abandon the current attempt for `index` and start over.
    pub fn refresh_page(&mut self, index: usize) -> Result<()> {
        let result = self.provider.force_request(index);
        let slot = self.slots.iter_mut().find(|s| s.index() == Some(index));
        match (result, slot) {
            (Ok(generation), Some(slot)) => {
                slot.restart(generation);
                Ok(())
            }
            (Ok(_), None) => Ok(()),
            (Err(err), slot) => {
                // A loaded page keeps its image when the gallery has failed.
                if let Some(slot) = slot.filter(|s| s.image().is_none()) {
                    let message = self.provider.error().unwrap_or_else(|| err.to_string());
                    slot.bind_rejected(index, &message);
                }
                Err(err)
            }
        }
    }

    /// Write the decoded page to the export directory on a background thread.
    pub fn save_page(&self, index: usize) -> Result<JoinHandle<Result<PathBuf>>> {
        let image = self
            .slots
            .iter()
            .find(|s| s.index() == Some(index))
            .and_then(|s| s.image())
            .cloned()
            .ok_or(GalleryError::PageNotReady(index))?;
        let path = self.save_dir.join(format!("page-{:04}.png", index + 1));

        std::thread::Builder::new()
            .name("gallery-export".into())
            .spawn(move || {
                let result = export_png(&image, &path).map(|_| path);
                match &result {
                    Ok(path) => info!(path = %path.display(), "page exported"),
                    Err(err) => warn!(error = %err, "page export failed"),
                }
                result
            })
            .map_err(|e| GalleryError::Export(e.to_string()))
    }

    /// Clear the listener, then stop the provider. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.provider.set_listener(None);
        self.provider.stop();

        while let Some(message) = self.relay.try_next() {
            if let Notify::Task(task) = message {
                self.relay.recycle(task);
            }
        }
        for slot in &mut self.slots {
            slot.unbind();
        }
        info!(
            applied = self.stats.images_applied,
            released = self.stats.images_released,
            stale = self.stats.stale_events,
            "gallery closed"
        );
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn projection(&self) -> Option<&SliderProjection> {
        self.navigator.projection()
    }

    /// Page the view is centred on.
    pub fn current_index(&self) -> usize {
        self.window_center
    }

    pub fn size(&self) -> GallerySize {
        self.navigator.size()
    }

    pub fn provider_error(&self) -> Option<String> {
        self.provider.error()
    }

    pub fn slots(&self) -> &[PageSlot<V>] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [PageSlot<V>] {
        &mut self.slots
    }

    pub fn slot_for(&self, index: usize) -> Option<&PageSlot<V>> {
        self.slots.iter().find(|s| s.index() == Some(index))
    }

    pub fn current_slot(&self) -> Option<&PageSlot<V>> {
        self.slot_for(self.window_center)
    }

    pub fn current_slot_mut(&mut self) -> Option<&mut PageSlot<V>> {
        let center = self.window_center;
        self.slots.iter_mut().find(|s| s.index() == Some(center))
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn slider_visible(&self) -> bool {
        self.slider_visible
    }

    pub fn menu_open(&self) -> bool {
        self.menu_open
    }

    pub fn page_menu(&self) -> Option<usize> {
        self.page_menu
    }
}

impl<V: PageView> Drop for GalleryController<V> {
    fn drop(&mut self) {
        self.close();
    }
}

fn export_png(image: &PageImage, path: &std::path::Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| GalleryError::io(dir, e))?;
    }
    image::save_buffer_with_format(
        path,
        &image.pixels,
        image.width,
        image.height,
        image::ExtendedColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|e| GalleryError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::tests::{EventLogView, RecordingView};
    use crate::page::PageState;
    use crate::provider::{Generation, ProviderCore};

    /// Provider whose background work is driven by the test.
    struct ScriptedProvider {
        core: Arc<ProviderCore>,
    }

    impl GalleryProvider for ScriptedProvider {
        fn start(&self) {
            self.core.begin();
        }
        fn stop(&self) {
            self.core.shut();
        }
        fn size(&self) -> GallerySize {
            self.core.size()
        }
        fn error(&self) -> Option<String> {
            self.core.error()
        }
        fn request(&self, index: usize) -> Result<Generation> {
            Ok(self.core.admit(index, false)?.generation())
        }
        fn force_request(&self, index: usize) -> Result<Generation> {
            Ok(self.core.admit(index, true)?.generation())
        }
        fn set_listener(&self, listener: Option<Arc<dyn GalleryProviderListener>>) {
            self.core.set_listener(listener);
        }
    }

    fn session(radius: usize) -> (GalleryController<RecordingView>, Arc<ProviderCore>) {
        let core = Arc::new(ProviderCore::new());
        let provider = ScriptedProvider { core: Arc::clone(&core) };
        let config = Config {
            preload_radius: radius,
            ..Config::default()
        };
        (GalleryController::with_provider(Box::new(provider), &config), core)
    }

    fn image() -> PageImage {
        PageImage::new(vec![255; 4 * 4 * 4], 4, 4)
    }

    fn generation_of(controller: &GalleryController<RecordingView>, index: usize) -> Generation {
        controller.slot_for(index).unwrap().generation()
    }

    #[test]
    fn size_binds_window_around_current_page() {
        let (mut controller, core) = session(1);
        core.publish_size(5);
        controller.pump();

        let mut bound: Vec<_> = controller.slots().iter().filter_map(|s| s.index()).collect();
        bound.sort();
        assert_eq!(bound, vec![0, 1]);
        assert_eq!(controller.current_slot().unwrap().state(), &PageState::Waiting);
    }

    #[test]
    fn unbound_result_is_released() {
        let (mut controller, core) = session(0);
        core.publish_size(3);
        controller.pump();
        let g0 = generation_of(&controller, 0);

        controller.set_current_page(2);
        core.report_result(Ticket::new(0, g0), Ok(image()));
        controller.pump();

        assert_eq!(controller.stats().images_released, 1);
        assert!(controller.slot_for(0).is_none());
    }

    #[test]
    fn moving_window_releases_image_before_slot_is_reused() {
        let core = Arc::new(ProviderCore::new());
        let config = Config {
            preload_radius: 0,
            ..Config::default()
        };
        let mut controller: GalleryController<EventLogView> =
            GalleryController::with_provider(Box::new(ScriptedProvider { core: Arc::clone(&core) }), &config);
        core.publish_size(3);
        controller.pump();
        let g0 = controller.slot_for(0).unwrap().generation();
        core.report_result(Ticket::new(0, g0), Ok(PageImage::new(vec![255; 16], 2, 2)));
        controller.pump();
        assert!(controller.slot_for(0).unwrap().image().is_some());
        controller.slots_mut()[0].view_mut().calls.clear();

        controller.set_current_page(2);

        let slot = &controller.slots()[0];
        assert_eq!(slot.index(), Some(2));
        assert!(slot.image().is_none());
        let calls = &slot.view().calls;
        let released = calls.iter().position(|c| c == "image:none").expect("image released");
        let rebound = calls.iter().position(|c| c == "page:3").expect("slot rebound");
        assert!(released < rebound, "{calls:?}");
    }

    #[test]
    fn error_size_fails_pending_pages_only() {
        let (mut controller, core) = session(1);
        core.publish_size(3);
        controller.pump();
        core.report_result(Ticket::new(0, generation_of(&controller, 0)), Ok(image()));
        controller.pump();

        core.fail(&GalleryError::Network("connection reset".into()));
        controller.pump();

        assert!(controller.slot_for(0).unwrap().image().is_some());
        match controller.slot_for(1).unwrap().state() {
            PageState::Failed(message) => assert!(message.contains("connection reset")),
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(controller.size(), GallerySize::Error);
        assert!(controller.projection().is_none());
    }

    #[test]
    fn refresh_after_fatal_error_keeps_loaded_page() {
        let (mut controller, core) = session(1);
        core.publish_size(3);
        controller.pump();
        core.report_result(Ticket::new(0, generation_of(&controller, 0)), Ok(image()));
        controller.pump();
        core.fail(&GalleryError::Network("connection reset".into()));
        controller.pump();

        assert!(controller.refresh_page(0).is_err());
        let loaded = controller.slot_for(0).unwrap();
        assert_eq!(loaded.view().image, Some((4, 4)));
        assert!(loaded.image().is_some());

        assert!(controller.refresh_page(1).is_err());
        match controller.slot_for(1).unwrap().state() {
            PageState::Failed(message) => assert!(message.contains("connection reset"), "{message}"),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn slider_confirm_is_required_to_navigate() {
        let (mut controller, core) = session(0);
        core.publish_size(10);
        controller.pump();

        controller.on_set_progress(6, 1, true, false);
        assert_eq!(controller.current_index(), 0);
        controller.on_set_progress(6, 1, false, true);
        assert_eq!(controller.current_index(), 0);
        controller.on_set_progress(6, 1, true, true);
        controller.pump();
        assert_eq!(controller.current_index(), 5);
        assert_eq!(controller.projection().unwrap().value, 6);
    }

    #[test]
    fn programmatic_index_is_clamped_and_moves_window() {
        let (mut controller, core) = session(0);
        core.publish_size(12);
        controller.pump();

        controller.on_update_current_index(40);
        controller.pump();

        let p = controller.projection().unwrap();
        assert!(p.value <= p.max, "slider value {} outside [1, {}]", p.value, p.max);
        assert_eq!(p.value, 12);
        assert_eq!(controller.current_index(), 11);
        assert_eq!(controller.navigator().current_index(), 11);
        assert_eq!(controller.current_slot().unwrap().index(), Some(11));
    }

    #[test]
    fn reading_order_follows_layout() {
        let (mut controller, core) = session(0);
        core.publish_size(4);
        controller.pump();

        controller.next_page();
        assert_eq!(controller.current_index(), 1);

        controller.set_layout_mode(LayoutMode::RightToLeft);
        controller.pump();
        controller.page_left();
        assert_eq!(controller.current_index(), 2);
        controller.previous_page();
        assert_eq!(controller.current_index(), 1);
    }

    #[test]
    fn gesture_echoes_toggle_chrome() {
        let (mut controller, core) = session(0);
        controller.on_tap_slider_area();
        controller.pump();
        assert!(!controller.slider_visible(), "no slider without pages");

        core.publish_size(2);
        controller.on_tap_slider_area();
        controller.on_tap_menu_area();
        controller.on_long_press_page(1);
        controller.pump();
        assert!(controller.slider_visible());
        assert!(controller.menu_open());
        assert_eq!(controller.page_menu(), Some(1));
    }

    #[test]
    fn page_changed_requests_bound_page_again() {
        let (mut controller, core) = session(0);
        core.publish_size(2);
        controller.pump();
        let first = generation_of(&controller, 0);
        core.report_result(Ticket::new(0, first), Ok(image()));
        controller.pump();

        core.invalidate(0);
        controller.pump();
        let slot = controller.slot_for(0).unwrap();
        assert!(slot.generation() > first);
        assert_eq!(slot.state(), &PageState::Waiting);
    }

    #[test]
    fn refresh_restarts_and_save_exports_png() {
        let dir = tempfile::tempdir().unwrap();
        let core = Arc::new(ProviderCore::new());
        let config = Config {
            preload_radius: 0,
            save_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let mut controller: GalleryController<RecordingView> =
            GalleryController::with_provider(Box::new(ScriptedProvider { core: Arc::clone(&core) }), &config);
        core.publish_size(1);
        controller.pump();

        assert!(matches!(
            controller.page_menu_action(0, PageMenuAction::Save),
            Err(GalleryError::PageNotReady(0))
        ));

        core.report_result(Ticket::new(0, generation_of(&controller, 0)), Ok(image()));
        controller.pump();
        let handle = controller.page_menu_action(0, PageMenuAction::Save).unwrap().unwrap();
        let path = handle.join().unwrap().unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (4, 4));

        let before = generation_of(&controller, 0);
        controller.page_menu_action(0, PageMenuAction::Refresh).unwrap();
        assert!(generation_of(&controller, 0) > before);
        assert_eq!(controller.slot_for(0).unwrap().state(), &PageState::Waiting);
    }

    #[test]
    fn close_silences_provider() {
        let (mut controller, core) = session(0);
        core.publish_size(1);
        controller.pump();
        controller.close();

        core.publish_size(7);
        assert_eq!(controller.pump(), 0);
        assert!(controller.slots().iter().all(|s| s.index().is_none()));
    }
}
