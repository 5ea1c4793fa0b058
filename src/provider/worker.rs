//! Coordinator thread shared by the file-backed providers.
//!
//! Requests are queued on a channel. The coordinator blocks for the first
//! one, drains whatever else is pending into a batch, reads the batch
//! sequentially (reporting percent as bytes arrive) and decodes it in
//! parallel on the rayon pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, error, info};

use super::{Admission, GalleryProvider, GalleryProviderListener, GallerySize, Generation, ProviderCore, Ticket};
use crate::config::Config;
use crate::error::{GalleryError, Result};
use crate::image_decode::decode_page;
use crate::page::Progress;

/// Read size used when streaming a page off disk.
pub(crate) const READ_CHUNK: usize = 64 * 1024;

/// Backend-specific part of a file provider.
pub(crate) trait PageSource: Send + 'static {
    /// Short label for logs.
    fn describe(&self) -> String;

    /// Scan the backend and return the page count. Zero pages is an error.
    fn open(&mut self) -> Result<usize>;

    /// Read the encoded bytes of `index`. `progress(read, total)` is called
    /// after every chunk; returning false aborts the read.
    fn read_page(&mut self, index: usize, progress: &mut dyn FnMut(u64, u64) -> bool) -> Result<Vec<u8>>;
}

/// Tunables taken from the configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerSettings {
    pub max_texture_side: u32,
    pub batch_size: usize,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_texture_side: config.max_texture_side,
            batch_size: config.batch_size.max(1),
        }
    }
}

struct PageJob {
    ticket: Ticket,
}

/// Provider driving a [`PageSource`] from one coordinator thread.
pub(crate) struct FileProvider<S: PageSource> {
    core: Arc<ProviderCore>,
    settings: WorkerSettings,
    thread_name: &'static str,
    /// Taken by `start`.
    source: Mutex<Option<S>>,
    /// Channel to the coordinator; dropped by `stop`.
    job_tx: Mutex<Option<Sender<PageJob>>>,
    job_rx: Mutex<Option<Receiver<PageJob>>>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl<S: PageSource> FileProvider<S> {
    pub fn new(source: S, settings: WorkerSettings, thread_name: &'static str) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        Self {
            core: Arc::new(ProviderCore::new()),
            settings,
            thread_name,
            source: Mutex::new(Some(source)),
            job_tx: Mutex::new(Some(job_tx)),
            job_rx: Mutex::new(Some(job_rx)),
            coordinator: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    fn schedule(&self, admission: Admission, index: usize) -> Result<Generation> {
        let generation = admission.generation();
        if let Admission::Started(generation) = admission {
            let sent = self
                .job_tx
                .lock()
                .as_ref()
                .map(|tx| tx.send(PageJob { ticket: Ticket::new(index, generation) }).is_ok())
                .unwrap_or(false);
            if !sent {
                return Err(GalleryError::Cancelled);
            }
        }
        Ok(generation)
    }

    fn coordinator_loop(
        mut source: S,
        job_rx: Receiver<PageJob>,
        core: Arc<ProviderCore>,
        shutdown: Arc<AtomicBool>,
        settings: WorkerSettings,
    ) {
        let label = source.describe();
        let pages = match source.open() {
            Ok(pages) => pages,
            Err(err) => {
                error!(source = %label, error = %err, "failed to open gallery");
                core.fail(&err);
                return;
            }
        };
        info!(source = %label, pages, "gallery opened");
        core.publish_size(pages);

        let mut batch: Vec<PageJob> = Vec::with_capacity(settings.batch_size);
        let mut fetched: Vec<(Ticket, Result<Vec<u8>>)> = Vec::with_capacity(settings.batch_size);

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            batch.clear();
            match job_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(job) => batch.push(job),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
            while batch.len() < settings.batch_size {
                match job_rx.try_recv() {
                    Ok(job) => batch.push(job),
                    Err(_) => break,
                }
            }

            fetched.clear();
            for job in batch.drain(..) {
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }
                let ticket = job.ticket;
                // Superseded while queued: the newer job carries the terminal event.
                if !core.is_current(ticket) {
                    debug!(index = ticket.index, generation = ticket.generation, "skipping superseded job");
                    continue;
                }
                let bytes = Self::read_with_progress(&mut source, ticket, &core, &shutdown);
                fetched.push((ticket, bytes));
            }

            let decoded: Vec<(Ticket, Result<_>)> = fetched
                .par_drain(..)
                .map(|(ticket, bytes)| {
                    puffin::profile_scope!("decode_page_job");
                    let image = bytes.and_then(|bytes| decode_page(&bytes, settings.max_texture_side));
                    (ticket, image)
                })
                .collect();

            for (ticket, result) in decoded {
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }
                core.report_result(ticket, result);
            }
        }
        debug!(source = %label, "coordinator exiting");
    }

    fn read_with_progress(source: &mut S, ticket: Ticket, core: &ProviderCore, shutdown: &AtomicBool) -> Result<Vec<u8>> {
        let mut last_percent: Option<u32> = None;
        let mut reported_unknown = false;
        let mut progress = |read: u64, total: u64| -> bool {
            if shutdown.load(Ordering::Relaxed) || !core.is_current(ticket) {
                return false;
            }
            if total == 0 {
                if !reported_unknown {
                    reported_unknown = true;
                    core.report_percent(ticket, Progress::Indeterminate);
                }
                return true;
            }
            let percent = ((read.saturating_mul(100)) / total).min(99) as u32;
            if last_percent.map_or(true, |last| percent > last) {
                last_percent = Some(percent);
                core.report_percent(ticket, Progress::Percent(percent as f32));
            }
            true
        };
        source.read_page(ticket.index, &mut progress)
    }
}

impl<S: PageSource> GalleryProvider for FileProvider<S> {
    fn start(&self) {
        if !self.core.begin() {
            return;
        }
        let (Some(source), Some(job_rx)) = (self.source.lock().take(), self.job_rx.lock().take()) else {
            return;
        };
        let core = Arc::clone(&self.core);
        let shutdown = Arc::clone(&self.shutdown);
        let settings = self.settings;

        let spawned = std::thread::Builder::new()
            .name(self.thread_name.into())
            .spawn(move || Self::coordinator_loop(source, job_rx, core, shutdown, settings));
        match spawned {
            Ok(handle) => *self.coordinator.lock() = Some(handle),
            Err(err) => self.core.fail(&GalleryError::Runtime(format!("failed to spawn {}: {err}", self.thread_name))),
        }
    }

    fn stop(&self) {
        if !self.core.shut() {
            return;
        }
        self.shutdown.store(true, Ordering::Release);
        self.job_tx.lock().take();
        if let Some(handle) = self.coordinator.lock().take() {
            if handle.join().is_err() {
                error!(thread = self.thread_name, "coordinator thread panicked");
            }
        }
        debug!(thread = self.thread_name, "provider stopped");
    }

    fn size(&self) -> GallerySize {
        self.core.size()
    }

    fn error(&self) -> Option<String> {
        self.core.error()
    }

    fn request(&self, index: usize) -> Result<Generation> {
        let admission = self.core.admit(index, false)?;
        self.schedule(admission, index)
    }

    fn force_request(&self, index: usize) -> Result<Generation> {
        let admission = self.core.admit(index, true)?;
        self.schedule(admission, index)
    }

    fn set_listener(&self, listener: Option<Arc<dyn GalleryProviderListener>>) {
        self.core.set_listener(listener);
    }
}

impl<S: PageSource> Drop for FileProvider<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Copy `reader` into memory in [`READ_CHUNK`] pieces, reporting progress.
pub(crate) fn read_chunked(
    mut reader: impl std::io::Read,
    total: u64,
    progress: &mut dyn FnMut(u64, u64) -> bool,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut out = Vec::with_capacity(total.min(64 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut read_total = 0u64;
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
        read_total += n as u64;
        if !progress(read_total, total) {
            return Ok(None);
        }
    }
    Ok(Some(out))
}
