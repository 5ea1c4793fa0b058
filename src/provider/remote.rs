//! Pages of a remote gallery, fetched over HTTP.
//!
//! The gallery publishes a JSON manifest listing its page URLs. Each page
//! request becomes a task on a private tokio runtime: download with percent
//! reports, keep the raw bytes in an LRU cache, decode on the blocking pool.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hashbrown::HashMap;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use reqwest::Url;
use serde::Deserialize;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Admission, GalleryProvider, GalleryProviderListener, GallerySize, Generation, ProviderCore, Ticket};
use crate::config::Config;
use crate::error::{GalleryError, Result};
use crate::image_decode::{decode_page, PageImage};
use crate::page::Progress;

/// Identity of a remote gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryInfo {
    gid: u64,
    token: String,
    title: Option<String>,
    /// Scheme, host and path prefix, without a trailing slash.
    base_url: String,
}

impl GalleryInfo {
    pub fn new(gid: u64, token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            gid,
            token: token.into(),
            title: None,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Parse a gallery URL of the form `<base>/g/<gid>/<token>/`.
    pub fn from_url(url: &str) -> Result<Self> {
        let invalid = || GalleryError::Manifest(format!("not a gallery URL: {url}"));
        let mut parsed = Url::parse(url).map_err(|_| invalid())?;

        let segments: Vec<String> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).map(str::to_owned).collect())
            .unwrap_or_default();
        let marker = segments
            .windows(3)
            .position(|w| w[0] == "g" && w[1].parse::<u64>().is_ok() && !w[2].is_empty())
            .ok_or_else(invalid)?;
        let gid = segments[marker + 1].parse::<u64>().map_err(|_| invalid())?;
        let token = segments[marker + 2].clone();

        parsed.set_path(&segments[..marker].join("/"));
        parsed.set_query(None);
        parsed.set_fragment(None);
        Ok(Self::new(gid, token, parsed.as_str()))
    }

    pub fn gid(&self) -> u64 {
        self.gid
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn gallery_url(&self) -> String {
        format!("{}/g/{}/{}/", self.base_url, self.gid, self.token)
    }

    pub fn manifest_url(&self) -> String {
        format!("{}manifest.json", self.gallery_url())
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    pages: Vec<String>,
}

/// Remote options taken from the configuration.
#[derive(Debug, Clone, Copy)]
struct RemoteSettings {
    timeout: Duration,
    cache_pages: NonZeroUsize,
    worker_threads: usize,
    max_texture_side: u32,
}

/// State shared with the runtime's tasks.
struct RemoteShared {
    core: ProviderCore,
    client: reqwest::Client,
    pages: RwLock<Vec<Url>>,
    cache: Mutex<LruCache<usize, Bytes>>,
    max_texture_side: u32,
}

/// Fetches a remote gallery through its JSON manifest.
pub struct RemoteProvider {
    info: GalleryInfo,
    settings: RemoteSettings,
    shared: Arc<RemoteShared>,
    runtime: Mutex<Option<Runtime>>,
    tasks: Mutex<HashMap<usize, JoinHandle<()>>>,
}

impl RemoteProvider {
    pub fn new(info: GalleryInfo, config: &Config) -> Result<Self> {
        let settings = RemoteSettings {
            timeout: Duration::from_secs(config.remote_timeout_secs),
            cache_pages: NonZeroUsize::new(config.remote_cache_pages).unwrap_or(NonZeroUsize::MIN),
            worker_threads: config.remote_worker_threads.max(1),
            max_texture_side: config.max_texture_side,
        };
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .build()?;

        Ok(Self {
            info,
            settings,
            shared: Arc::new(RemoteShared {
                core: ProviderCore::new(),
                client,
                pages: RwLock::new(Vec::new()),
                cache: Mutex::new(LruCache::new(settings.cache_pages)),
                max_texture_side: settings.max_texture_side,
            }),
            runtime: Mutex::new(None),
            tasks: Mutex::new(HashMap::new()),
        })
    }

    pub fn info(&self) -> &GalleryInfo {
        &self.info
    }

    fn build_runtime(&self) -> Result<Runtime> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.settings.worker_threads)
            .thread_name("gallery-remote")
            .enable_all()
            .build()
            .map_err(|e| GalleryError::Runtime(e.to_string()))
    }

    fn schedule(&self, admission: Admission, index: usize, bypass_cache: bool) -> Result<Generation> {
        let Admission::Started(generation) = admission else {
            return Ok(admission.generation());
        };
        let ticket = Ticket::new(index, generation);

        let runtime = self.runtime.lock();
        let Some(runtime) = runtime.as_ref() else {
            return Err(GalleryError::Cancelled);
        };
        let shared = Arc::clone(&self.shared);
        let handle = runtime.spawn(async move {
            shared.fetch_page(ticket, bypass_cache).await;
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|_, task| !task.is_finished());
        if let Some(previous) = tasks.insert(index, handle) {
            previous.abort();
        }
        Ok(generation)
    }
}

impl RemoteShared {
    async fn load_manifest(&self, info: &GalleryInfo) -> Result<Vec<Url>> {
        let manifest_url = info.manifest_url();
        let body = self
            .client
            .get(&manifest_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let manifest: Manifest =
            serde_json::from_slice(&body).map_err(|e| GalleryError::Manifest(e.to_string()))?;

        let base = Url::parse(&format!("{}/", info.base_url()))
            .map_err(|e| GalleryError::Manifest(format!("bad base URL: {e}")))?;
        let pages = manifest
            .pages
            .iter()
            .map(|page| {
                base.join(page)
                    .map_err(|e| GalleryError::Manifest(format!("bad page URL {page:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        if pages.is_empty() {
            return Err(GalleryError::EmptyGallery(info.gallery_url()));
        }
        Ok(pages)
    }

    async fn fetch_page(&self, ticket: Ticket, bypass_cache: bool) {
        let cached = if bypass_cache {
            None
        } else {
            self.cache.lock().get(&ticket.index).cloned()
        };
        let from_cache = cached.is_some();

        let bytes = match cached {
            Some(bytes) => Ok(bytes),
            None => self.download(ticket).await,
        };
        let result = match bytes {
            Ok(bytes) => {
                if !from_cache {
                    self.cache.lock().put(ticket.index, bytes.clone());
                }
                self.decode(bytes).await
            }
            Err(err) => Err(err),
        };

        let corrupt_cache = from_cache && matches!(result, Err(GalleryError::Decode(_)));
        self.core.report_result(ticket, result);
        if corrupt_cache {
            warn!(index = ticket.index, "cached page failed to decode, evicting");
            self.cache.lock().pop(&ticket.index);
            self.core.invalidate(ticket.index);
        }
    }

    async fn download(&self, ticket: Ticket) -> Result<Bytes> {
        let url = self.pages.read().get(ticket.index).cloned().ok_or(GalleryError::IndexOutOfRange {
            index: ticket.index,
            size: self.core.size(),
        })?;
        debug!(index = ticket.index, %url, "downloading page");

        let mut response = self.client.get(url).send().await?.error_for_status()?;
        let total = response.content_length().filter(|len| *len > 0);
        if total.is_none() {
            self.core.report_percent(ticket, Progress::Indeterminate);
        }

        let mut buffer = Vec::with_capacity(total.unwrap_or(0).min(64 * 1024 * 1024) as usize);
        let mut last_percent: Option<u64> = None;
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
            if let Some(total) = total {
                let percent = (buffer.len() as u64).saturating_mul(100) / total;
                let percent = percent.min(99);
                if last_percent.map_or(true, |last| percent > last) {
                    last_percent = Some(percent);
                    self.core.report_percent(ticket, Progress::Percent(percent as f32));
                }
            }
        }
        Ok(Bytes::from(buffer))
    }

    async fn decode(&self, bytes: Bytes) -> Result<PageImage> {
        let max_side = self.max_texture_side;
        tokio::task::spawn_blocking(move || decode_page(&bytes, max_side))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    GalleryError::Cancelled
                } else {
                    GalleryError::Runtime(e.to_string())
                }
            })?
    }
}

impl GalleryProvider for RemoteProvider {
    fn start(&self) {
        if !self.shared.core.begin() {
            return;
        }
        let runtime = match self.build_runtime() {
            Ok(runtime) => runtime,
            Err(err) => {
                self.shared.core.fail(&err);
                return;
            }
        };

        let shared = Arc::clone(&self.shared);
        let info = self.info.clone();
        runtime.spawn(async move {
            match shared.load_manifest(&info).await {
                Ok(pages) => {
                    let count = pages.len();
                    *shared.pages.write() = pages;
                    info!(gid = info.gid(), pages = count, "remote gallery manifest loaded");
                    shared.core.publish_size(count);
                }
                Err(err) => shared.core.fail(&err),
            }
        });
        *self.runtime.lock() = Some(runtime);
    }

    fn stop(&self) {
        if !self.shared.core.shut() {
            return;
        }
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
        debug!(gid = self.info.gid(), "remote provider stopped");
    }

    fn size(&self) -> GallerySize {
        self.shared.core.size()
    }

    fn error(&self) -> Option<String> {
        self.shared.core.error()
    }

    fn request(&self, index: usize) -> Result<Generation> {
        let admission = self.shared.core.admit(index, false)?;
        self.schedule(admission, index, false)
    }

    fn force_request(&self, index: usize) -> Result<Generation> {
        let admission = self.shared.core.admit(index, true)?;
        self.schedule(admission, index, true)
    }

    fn set_listener(&self, listener: Option<Arc<dyn GalleryProviderListener>>) {
        self.shared.core.set_listener(listener);
    }
}

impl Drop for RemoteProvider {
    fn drop(&mut self) {
        self.stop();
    }
}
