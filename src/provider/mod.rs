//! Asynchronous page providers.
//!
//! A provider owns all background work for one gallery and reports through a
//! [`GalleryProviderListener`]. Callbacks run on provider threads; the
//! listener the controller installs only posts onto the relay.
//!
//! Each request attempt gets a fresh [`Generation`]. Every page callback
//! carries a [`Ticket`] so the consumer can drop results that belong to a
//! superseded attempt, even when they race with a newer one.

mod archive;
mod directory;
mod remote;
mod worker;

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{GalleryError, Result};
use crate::image_decode::{is_supported_archive, PageImage};
use crate::page::Progress;

pub use archive::ArchiveProvider;
pub use directory::DirectoryProvider;
pub use remote::{GalleryInfo, RemoteProvider};

/// Stamp of one request attempt. Strictly increasing per provider.
pub type Generation = u64;

/// Identifies one request attempt for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub index: usize,
    pub generation: Generation,
}

impl Ticket {
    pub fn new(index: usize, generation: Generation) -> Self {
        Self { index, generation }
    }
}

/// Known page count of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GallerySize {
    /// Not loaded yet.
    Wait,
    /// Fatal provider error; see [`GalleryProvider::error`].
    Error,
    Ready(usize),
}

impl GallerySize {
    const RAW_WAIT: i64 = -1;
    const RAW_ERROR: i64 = -2;

    /// Integer encoding used by pooled notifications.
    pub fn to_raw(self) -> i64 {
        match self {
            GallerySize::Wait => Self::RAW_WAIT,
            GallerySize::Error => Self::RAW_ERROR,
            GallerySize::Ready(n) => n as i64,
        }
    }

    pub fn from_raw(raw: i64) -> Self {
        match raw {
            n if n >= 0 => GallerySize::Ready(n as usize),
            Self::RAW_WAIT => GallerySize::Wait,
            _ => GallerySize::Error,
        }
    }

    pub fn ready(self) -> Option<usize> {
        match self {
            GallerySize::Ready(n) => Some(n),
            _ => None,
        }
    }

    pub fn contains(self, index: usize) -> bool {
        self.ready().map_or(false, |n| index < n)
    }
}

impl fmt::Display for GallerySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GallerySize::Wait => f.write_str("loading"),
            GallerySize::Error => f.write_str("error"),
            GallerySize::Ready(n) => write!(f, "{n}"),
        }
    }
}

/// Receives provider reports. Called on provider threads.
pub trait GalleryProviderListener: Send + Sync {
    /// Size discovered or changed.
    fn on_data_changed(&self, size: GallerySize);
    /// Content at `index` went stale; the consumer should request it again.
    fn on_page_changed(&self, index: usize);
    fn on_page_wait(&self, ticket: Ticket);
    fn on_page_percent(&self, ticket: Ticket, progress: Progress);
    /// Ownership of `image` passes to the listener.
    fn on_page_succeed(&self, ticket: Ticket, image: PageImage);
    fn on_page_failed(&self, ticket: Ticket, error: String);
}

/// Asynchronous page source for one gallery.
pub trait GalleryProvider: Send + Sync {
    /// Begin background work. Calling it again is a no-op.
    fn start(&self);

    /// Stop all background work. No listener callback fires after this returns.
    fn stop(&self);

    fn size(&self) -> GallerySize;

    /// Fatal error text, set once `size()` is [`GallerySize::Error`].
    fn error(&self) -> Option<String>;

    /// Make sure `index` is being produced. Returns the generation of the
    /// attempt in flight, which is the existing one if there already is one.
    fn request(&self, index: usize) -> Result<Generation>;

    /// Abandon any attempt for `index` and start a new one.
    fn force_request(&self, index: usize) -> Result<Generation>;

    fn set_listener(&self, listener: Option<Arc<dyn GalleryProviderListener>>);
}

/// Single-slot listener subscription.
///
/// Delivery holds the read lock for the whole callback, so replacing or
/// clearing the listener waits for a callback already running and every later
/// delivery sees the new value. Once closed, nothing is delivered again.
#[derive(Default)]
pub struct ListenerSlot {
    inner: RwLock<SlotState>,
}

#[derive(Default)]
struct SlotState {
    listener: Option<Arc<dyn GalleryProviderListener>>,
    closed: bool,
}

impl ListenerSlot {
    pub fn set(&self, listener: Option<Arc<dyn GalleryProviderListener>>) {
        let mut state = self.inner.write();
        if state.closed && listener.is_some() {
            warn!("listener installed on a stopped provider is ignored");
            return;
        }
        state.listener = listener;
    }

    /// Drop the listener and refuse all further deliveries.
    pub fn close(&self) {
        let mut state = self.inner.write();
        state.closed = true;
        state.listener = None;
    }

    pub fn emit(&self, deliver: impl FnOnce(&dyn GalleryProviderListener)) {
        let state = self.inner.read();
        if state.closed {
            return;
        }
        if let Some(listener) = state.listener.as_deref() {
            deliver(listener);
        }
    }
}

/// Page count holder where `Error` is terminal.
pub struct SizeCell {
    raw: AtomicI64,
}

impl SizeCell {
    pub fn new() -> Self {
        Self {
            raw: AtomicI64::new(GallerySize::Wait.to_raw()),
        }
    }

    pub fn get(&self) -> GallerySize {
        GallerySize::from_raw(self.raw.load(Ordering::Acquire))
    }

    /// Store a new size. Returns false if the cell already holds `Error`.
    pub fn set(&self, size: GallerySize) -> bool {
        let new = size.to_raw();
        self.raw
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != GallerySize::Error.to_raw()).then_some(new)
            })
            .is_ok()
    }
}

impl Default for SizeCell {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct RequestEntry {
    generation: Generation,
    in_flight: bool,
}

/// How a request resolved against the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new attempt was opened and must be scheduled.
    Started(Generation),
    /// The existing in-flight attempt stays authoritative.
    InFlight(Generation),
}

impl Admission {
    pub fn generation(self) -> Generation {
        match self {
            Admission::Started(g) | Admission::InFlight(g) => g,
        }
    }
}

/// State shared by every provider variant and its background threads.
pub struct ProviderCore {
    size: SizeCell,
    error: Mutex<Option<String>>,
    listener: ListenerSlot,
    requests: Mutex<HashMap<usize, RequestEntry>>,
    next_generation: AtomicU64,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl ProviderCore {
    pub fn new() -> Self {
        Self {
            size: SizeCell::new(),
            error: Mutex::new(None),
            listener: ListenerSlot::default(),
            requests: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Flip to started. Returns false if already started or stopped.
    pub fn begin(&self) -> bool {
        !self.stopped.load(Ordering::Acquire) && !self.started.swap(true, Ordering::AcqRel)
    }

    /// Close the listener slot and mark stopped. Returns false on repeat calls.
    pub fn shut(&self) -> bool {
        self.listener.close();
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn size(&self) -> GallerySize {
        self.size.get()
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn GalleryProviderListener>>) {
        self.listener.set(listener);
    }

    pub fn emit(&self, deliver: impl FnOnce(&dyn GalleryProviderListener)) {
        self.listener.emit(deliver);
    }

    /// Publish the discovered page count.
    pub fn publish_size(&self, pages: usize) {
        if self.size.set(GallerySize::Ready(pages)) {
            self.emit(|l| l.on_data_changed(GallerySize::Ready(pages)));
        }
    }

    /// Enter the fatal state. Only the first call is reported.
    pub fn fail(&self, error: &GalleryError) {
        {
            let mut slot = self.error.lock();
            if slot.is_some() {
                return;
            }
            *slot = Some(error.to_string());
        }
        warn!(%error, "gallery provider failed");
        self.size.set(GallerySize::Error);
        self.requests.lock().clear();
        self.emit(|l| l.on_data_changed(GallerySize::Error));
    }

    fn check_range(&self, index: usize) -> Result<()> {
        let size = self.size();
        if size.contains(index) {
            Ok(())
        } else {
            Err(GalleryError::IndexOutOfRange { index, size })
        }
    }

    /// Open an attempt for `index` unless one is already in flight.
    ///
    /// On [`Admission::Started`] the wait callback has already been emitted;
    /// the caller schedules the work.
    pub fn admit(&self, index: usize, force: bool) -> Result<Admission> {
        self.check_range(index)?;
        if self.is_stopped() {
            return Err(GalleryError::Cancelled);
        }

        let admission = {
            let mut requests = self.requests.lock();
            match requests.get(&index) {
                Some(entry) if entry.in_flight && !force => Admission::InFlight(entry.generation),
                _ => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    requests.insert(
                        index,
                        RequestEntry {
                            generation,
                            in_flight: true,
                        },
                    );
                    Admission::Started(generation)
                }
            }
        };

        if let Admission::Started(generation) = admission {
            debug!(index, generation, force, "page request admitted");
            self.emit(|l| l.on_page_wait(Ticket::new(index, generation)));
        }
        Ok(admission)
    }

    /// Whether `ticket` is still the authoritative attempt for its index.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.requests
            .lock()
            .get(&ticket.index)
            .map_or(false, |entry| entry.in_flight && entry.generation == ticket.generation)
    }

    /// Close the attempt. Returns false if it was superseded meanwhile, in
    /// which case its result must not be reported.
    pub fn settle(&self, ticket: Ticket) -> bool {
        let mut requests = self.requests.lock();
        match requests.get_mut(&ticket.index) {
            Some(entry) if entry.in_flight && entry.generation == ticket.generation => {
                entry.in_flight = false;
                true
            }
            _ => false,
        }
    }

    /// Tell the consumer that content at `index` is stale and must be
    /// requested again.
    pub fn invalidate(&self, index: usize) {
        if self.is_stopped() {
            return;
        }
        debug!(index, "page content invalidated");
        self.emit(|l| l.on_page_changed(index));
    }

    pub fn report_percent(&self, ticket: Ticket, progress: Progress) {
        if self.is_current(ticket) {
            self.emit(|l| l.on_page_percent(ticket, progress));
        }
    }

    /// Deliver the terminal event of `ticket` if it is still current.
    pub fn report_result(&self, ticket: Ticket, result: Result<PageImage>) {
        if !self.settle(ticket) {
            debug!(index = ticket.index, generation = ticket.generation, "superseded page result dropped");
            return;
        }
        match result {
            Ok(image) => self.emit(|l| l.on_page_succeed(ticket, image)),
            Err(error) => {
                debug!(index = ticket.index, %error, "page failed");
                self.emit(|l| l.on_page_failed(ticket, error.to_string()));
            }
        }
    }
}

impl Default for ProviderCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Which backend a session reads from. Fixed for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GallerySource {
    Directory(PathBuf),
    Archive(PathBuf),
    Remote(GalleryInfo),
}

/// Raw session parameters, as received from the command line.
#[derive(Debug, Clone, Default)]
pub struct SessionParams {
    pub directory: Option<String>,
    pub archive: Option<String>,
    pub gallery: Option<GalleryInfo>,
}

impl GallerySource {
    /// Exactly one parameter must be present and non-empty.
    pub fn from_params(params: SessionParams) -> Result<Self> {
        let directory = params.directory.filter(|s| !s.trim().is_empty());
        let archive = params.archive.filter(|s| !s.trim().is_empty());

        match (directory, archive, params.gallery) {
            (Some(dir), None, None) => Ok(GallerySource::Directory(PathBuf::from(dir))),
            (None, Some(file), None) => Ok(GallerySource::Archive(PathBuf::from(file))),
            (None, None, Some(info)) => Ok(GallerySource::Remote(info)),
            _ => Err(GalleryError::NoProvider),
        }
    }

    /// Classify a bare path: archives by extension, everything else as a directory.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_file() && is_supported_archive(&path) {
            GallerySource::Archive(path)
        } else {
            GallerySource::Directory(path)
        }
    }
}

/// Build the provider for `source`. The listener is not set and the provider
/// is not started.
pub fn build_provider(source: GallerySource, config: &Config) -> Result<Box<dyn GalleryProvider>> {
    let provider: Box<dyn GalleryProvider> = match source {
        GallerySource::Directory(path) => Box::new(DirectoryProvider::new(path, config)),
        GallerySource::Archive(path) => Box::new(ArchiveProvider::new(path, config)),
        GallerySource::Remote(info) => Box::new(RemoteProvider::new(info, config)?),
    };
    Ok(provider)
}
