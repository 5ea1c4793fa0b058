//! Visible state of one page slot and the rendering surface it drives.

use crate::image_decode::PageImage;
use crate::notify::PageEvent;
use crate::provider::Generation;

/// Loading progress shown on a page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Work is running but its length is unknown.
    Indeterminate,
    /// Percent in `[0, 100)`.
    Percent(f32),
    /// Hide the progress indicator.
    Gone,
}

/// Rendering surface for a single page.
pub trait PageView {
    /// Switch to the info layer (progress, page number, error).
    fn show_info(&mut self);
    /// Switch to the image layer.
    fn show_image(&mut self);
    fn set_image(&mut self, image: Option<&PageImage>);
    fn set_progress(&mut self, progress: Progress);
    /// One-based page number; 0 clears it.
    fn set_page(&mut self, number: usize);
    fn set_error(&mut self, error: Option<&str>);
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageState {
    Unbound,
    Waiting,
    Progressing(f32),
    Succeeded(PageImage),
    Failed(String),
}

/// What applying a page event did to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    /// The event belongs to an older request attempt.
    Stale,
}

/// A page surface plus the index it is bound to.
pub struct PageSlot<V> {
    index: Option<usize>,
    generation: Generation,
    state: PageState,
    view: V,
}

impl<V: PageView> PageSlot<V> {
    pub fn new(view: V) -> Self {
        Self {
            index: None,
            generation: 0,
            state: PageState::Unbound,
            view,
        }
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn image(&self) -> Option<&PageImage> {
        match &self.state {
            PageState::Succeeded(image) => Some(image),
            _ => None,
        }
    }

    /// Bind to `index` and enter `Waiting` for the given attempt.
    pub fn bind(&mut self, index: usize, generation: Generation) {
        self.release_image();
        self.index = Some(index);
        self.generation = generation;
        self.view.set_page(index + 1);
        self.enter_waiting();
    }

    /// Bind to `index` after the provider refused the request.
    pub fn bind_rejected(&mut self, index: usize, error: &str) {
        self.release_image();
        self.index = Some(index);
        self.generation = 0;
        self.view.set_page(index + 1);
        self.enter_failed(error.to_owned());
    }

    /// Restart the bound page with a fresh attempt.
    pub fn restart(&mut self, generation: Generation) {
        self.release_image();
        self.generation = generation;
        self.enter_waiting();
    }

    /// Drop the binding and any held image.
    pub fn unbind(&mut self) {
        self.release_image();
        self.index = None;
        self.generation = 0;
        self.state = PageState::Unbound;
        self.view.set_page(0);
        self.view.set_error(None);
        self.view.set_progress(Progress::Gone);
        self.view.show_info();
    }

    /// Switch to `Failed` unless the page already shows its image.
    pub fn fail_unless_loaded(&mut self, error: &str) {
        if self.index.is_some() && !matches!(self.state, PageState::Succeeded(_)) {
            self.enter_failed(error.to_owned());
        }
    }

    /// Apply a provider event addressed to this slot's index.
    ///
    /// Events from an older attempt are ignored; a newer generation is
    /// adopted, since the provider only emits for its current attempt.
    pub fn apply(&mut self, event: PageEvent) -> Applied {
        let ticket = event.ticket();
        if ticket.generation < self.generation {
            return Applied::Stale;
        }
        self.generation = ticket.generation;

        match event {
            PageEvent::Wait(_) => {
                self.release_image();
                self.enter_waiting();
            }
            PageEvent::Percent(_, progress) => match progress {
                Progress::Percent(p) => {
                    self.state = PageState::Progressing(p);
                    self.view.set_progress(progress);
                }
                Progress::Indeterminate | Progress::Gone => self.view.set_progress(progress),
            },
            PageEvent::Succeed(_, image) => {
                self.view.set_progress(Progress::Gone);
                self.view.set_error(None);
                self.view.set_image(Some(&image));
                self.view.show_image();
                self.state = PageState::Succeeded(image);
            }
            PageEvent::Failed(_, error) => {
                self.release_image();
                self.enter_failed(error);
            }
        }
        Applied::Updated
    }

    fn enter_waiting(&mut self) {
        self.state = PageState::Waiting;
        self.view.set_error(None);
        self.view.set_progress(Progress::Indeterminate);
        self.view.show_info();
    }

    fn enter_failed(&mut self, error: String) {
        self.view.set_progress(Progress::Gone);
        self.view.set_error(Some(&error));
        self.view.show_info();
        self.state = PageState::Failed(error);
    }

    fn release_image(&mut self) {
        if matches!(self.state, PageState::Succeeded(_)) {
            self.view.set_image(None);
            self.state = PageState::Waiting;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::Ticket;

    /// Records what a slot pushed into its surface.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingView {
        pub image: Option<(u32, u32)>,
        pub progress: Option<Progress>,
        pub page: usize,
        pub error: Option<String>,
        pub showing_image: bool,
    }

    impl PageView for RecordingView {
        fn show_info(&mut self) {
            self.showing_image = false;
        }
        fn show_image(&mut self) {
            self.showing_image = true;
        }
        fn set_image(&mut self, image: Option<&PageImage>) {
            self.image = image.map(|i| (i.width, i.height));
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

    /// Keeps every surface call in order.
    #[derive(Debug, Default)]
    pub(crate) struct EventLogView {
        pub calls: Vec<String>,
    }

    impl PageView for EventLogView {
        fn show_info(&mut self) {
            self.calls.push("info".into());
        }
        fn show_image(&mut self) {
            self.calls.push("image-layer".into());
        }
        fn set_image(&mut self, image: Option<&PageImage>) {
            self.calls.push(match image {
                Some(i) => format!("image:{}x{}", i.width, i.height),
                None => "image:none".into(),
            });
        }
        fn set_progress(&mut self, progress: Progress) {
            self.calls.push(format!("progress:{progress:?}"));
        }
        fn set_page(&mut self, number: usize) {
            self.calls.push(format!("page:{number}"));
        }
        fn set_error(&mut self, error: Option<&str>) {
            self.calls.push(format!("error:{error:?}"));
        }
    }

    fn image() -> PageImage {
        PageImage::new(vec![0; 16], 2, 2)
    }

    #[test]
    fn succeed_shows_image() {
        let mut slot = PageSlot::new(RecordingView::default());
        slot.bind(0, 1);
        assert_eq!(slot.state(), &PageState::Waiting);
        assert_eq!(slot.view().page, 1);

        slot.apply(PageEvent::Percent(Ticket::new(0, 1), Progress::Percent(40.0)));
        assert_eq!(slot.state(), &PageState::Progressing(40.0));

        slot.apply(PageEvent::Succeed(Ticket::new(0, 1), image()));
        assert!(slot.view().showing_image);
        assert_eq!(slot.view().image, Some((2, 2)));
        assert_eq!(slot.view().progress, Some(Progress::Gone));
    }

    #[test]
    fn indeterminate_progress_keeps_progressing_state() {
        let mut slot = PageSlot::new(RecordingView::default());
        slot.bind(0, 1);
        slot.apply(PageEvent::Percent(Ticket::new(0, 1), Progress::Percent(25.0)));
        slot.apply(PageEvent::Percent(Ticket::new(0, 1), Progress::Indeterminate));
        assert_eq!(slot.state(), &PageState::Progressing(25.0));
        assert_eq!(slot.view().progress, Some(Progress::Indeterminate));
    }

    #[test]
    fn unbinding_loaded_page_releases_image_before_rebind() {
        let mut slot = PageSlot::new(EventLogView::default());
        slot.bind(0, 1);
        slot.apply(PageEvent::Succeed(Ticket::new(0, 1), image()));
        slot.view_mut().calls.clear();

        slot.unbind();
        slot.bind(4, 2);
        let calls = &slot.view().calls;
        let released = calls.iter().position(|c| c == "image:none").unwrap();
        let rebound = calls.iter().position(|c| c == "page:5").unwrap();
        assert!(released < rebound, "{calls:?}");
        assert!(slot.image().is_none());
    }

    #[test]
    fn older_generation_is_stale() {
        let mut slot = PageSlot::new(RecordingView::default());
        slot.bind(3, 5);
        let applied = slot.apply(PageEvent::Succeed(Ticket::new(3, 4), image()));
        assert_eq!(applied, Applied::Stale);
        assert_eq!(slot.state(), &PageState::Waiting);
        assert!(slot.view().image.is_none());
    }

    #[test]
    fn restart_releases_held_image() {
        let mut slot = PageSlot::new(RecordingView::default());
        slot.bind(0, 1);
        slot.apply(PageEvent::Succeed(Ticket::new(0, 1), image()));
        slot.restart(2);
        assert_eq!(slot.state(), &PageState::Waiting);
        assert!(slot.view().image.is_none());
        assert_eq!(slot.generation(), 2);
    }

    #[test]
    fn unbind_clears_surface() {
        let mut slot = PageSlot::new(RecordingView::default());
        slot.bind(1, 1);
        slot.apply(PageEvent::Failed(Ticket::new(1, 1), "boom".into()));
        assert_eq!(slot.view().error.as_deref(), Some("boom"));
        slot.unbind();
        assert_eq!(slot.index(), None);
        assert_eq!(slot.state(), &PageState::Unbound);
        assert!(slot.view().error.is_none());
        assert_eq!(slot.view().page, 0);
    }

    #[test]
    fn provider_error_keeps_loaded_pages() {
        let mut loaded = PageSlot::new(RecordingView::default());
        loaded.bind(0, 1);
        loaded.apply(PageEvent::Succeed(Ticket::new(0, 1), image()));
        loaded.fail_unless_loaded("gone");
        assert!(loaded.image().is_some());

        let mut waiting = PageSlot::new(RecordingView::default());
        waiting.bind(1, 2);
        waiting.fail_unless_loaded("gone");
        assert_eq!(waiting.state(), &PageState::Failed("gone".into()));
    }
}
