//! Preview asset downloads for the layout selection flow.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use mushaf_core::LayoutRegistry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

const PREVIEWS_DIR: &str = "previews";
const MEDIA_SCANNER_MARKER: &str = ".nomedia";

#[async_trait::async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch(&self, url: &str, destination: &Path) -> anyhow::Result<()>;
}

pub trait PreviewView: Send + Sync {
    fn on_updated_data(&self, items: Vec<AssetItem>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetItem {
    pub key: String,
    pub preview: Option<PathBuf>,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssetState {
    #[default]
    Missing,
    Fetching,
    Cached,
}

impl AssetState {
    pub fn fetch_started(self) -> Self {
        match self {
            AssetState::Missing => AssetState::Fetching,
            other => other,
        }
    }

    pub fn fetch_finished(self, success: bool) -> Self {
        match (self, success) {
            (AssetState::Fetching, true) => AssetState::Cached,
            (AssetState::Fetching, false) => AssetState::Missing,
            (other, _) => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub base_dir: PathBuf,
    pub base_url: String,
    pub fallback_base_url: String,
}

enum Command {
    Bind(Arc<dyn PreviewView>),
    Unbind(Arc<dyn PreviewView>),
    Refresh,
    FetchFinished {
        key: String,
        generation: u64,
        result: anyhow::Result<()>,
    },
}

#[derive(Clone)]
pub struct PreviewCoordinator {
    commands: mpsc::UnboundedSender<Command>,
}

impl PreviewCoordinator {
    pub fn spawn(
        registry: Arc<LayoutRegistry>,
        downloader: Arc<dyn Downloader>,
        config: PreviewConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            registry,
            downloader,
            config,
            commands: tx.downgrade(),
            view: None,
            states: HashMap::new(),
            fetches: HashMap::new(),
            generation: 0,
            prepared: false,
        };
        tokio::spawn(worker.run(rx));
        Self { commands: tx }
    }

    pub fn bind(&self, view: Arc<dyn PreviewView>) {
        let _ = self.commands.send(Command::Bind(view));
    }

    pub fn unbind(&self, view: &Arc<dyn PreviewView>) {
        let _ = self.commands.send(Command::Unbind(Arc::clone(view)));
    }

    pub fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh);
    }
}

// All mutable coordinator state is confined to this task.
struct Worker {
    registry: Arc<LayoutRegistry>,
    downloader: Arc<dyn Downloader>,
    config: PreviewConfig,
    commands: mpsc::WeakUnboundedSender<Command>,
    view: Option<Arc<dyn PreviewView>>,
    states: HashMap<String, AssetState>,
    fetches: HashMap<String, JoinHandle<()>>,
    generation: u64,
    prepared: bool,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Bind(view) => {
                    self.view = Some(view);
                    self.generate_view().await;
                }
                Command::Unbind(view) => self.unbind(&view),
                Command::Refresh => self.generate_view().await,
                Command::FetchFinished {
                    key,
                    generation,
                    result,
                } => self.fetch_finished(key, generation, result).await,
            }
        }
    }

    fn unbind(&mut self, view: &Arc<dyn PreviewView>) {
        let bound = self
            .view
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, view));
        if !bound {
            debug!("ignoring unbind from a superseded session");
            return;
        }

        self.view = None;
        // Late completions carry the old generation and are discarded.
        self.generation += 1;
        for (key, handle) in self.fetches.drain() {
            handle.abort();
            if let Some(state) = self.states.get_mut(&key) {
                *state = state.fetch_finished(false);
            }
        }
    }

    async fn fetch_finished(&mut self, key: String, generation: u64, result: anyhow::Result<()>) {
        if generation != self.generation {
            debug!(key = %key, "discarding fetch result from an unbound session");
            return;
        }

        self.fetches.remove(&key);
        let success = result.is_ok();
        if let Err(err) = result {
            error!(key = %key, error = ?err, "preview download failed");
        }
        if let Some(state) = self.states.get_mut(&key) {
            *state = state.fetch_finished(success);
        }

        // Failed keys stay absent until the next explicit refresh; only a
        // newly cached asset warrants republishing the view.
        if success {
            self.generate_view().await;
        }
    }

    async fn generate_view(&mut self) {
        if self.view.is_none() {
            return;
        }
        let fetchable = self.prepare_cache_dir().await;

        let registry = Arc::clone(&self.registry);
        let mut items = Vec::with_capacity(registry.len());
        for (key, layout) in registry.iter() {
            let path = self.asset_path(key);
            let mut state = if matches!(self.states.get(key), Some(AssetState::Fetching)) {
                AssetState::Fetching
            } else if file_exists(&path).await {
                AssetState::Cached
            } else {
                AssetState::Missing
            };

            if state == AssetState::Missing && fetchable {
                self.start_fetch(key, path.clone());
                state = state.fetch_started();
            }
            self.states.insert(key.to_string(), state);

            items.push(AssetItem {
                key: key.to_string(),
                preview: (state == AssetState::Cached).then(|| path.clone()),
                title: layout.title().to_string(),
                description: layout.description().to_string(),
            });
        }

        if let Some(view) = &self.view {
            view.on_updated_data(items);
        }
    }

    fn start_fetch(&mut self, key: &str, destination: PathBuf) {
        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        let downloader = Arc::clone(&self.downloader);
        let primary = format!("{}/{key}.png", self.config.base_url);
        let fallback = format!("{}/{key}.png", self.config.fallback_base_url);
        let generation = self.generation;
        let key = key.to_string();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let result =
                fetch_with_fallback(downloader.as_ref(), &primary, &fallback, &destination).await;
            let _ = commands.send(Command::FetchFinished {
                key,
                generation,
                result,
            });
        });
        self.fetches.insert(task_key, handle);
    }

    async fn prepare_cache_dir(&mut self) -> bool {
        if self.prepared {
            return true;
        }
        match self.try_prepare_cache_dir().await {
            Ok(()) => {
                self.prepared = true;
                true
            }
            Err(err) => {
                warn!(error = ?err, "preview cache dir unavailable, downloads suppressed");
                false
            }
        }
    }

    async fn try_prepare_cache_dir(&self) -> anyhow::Result<()> {
        let dir = self.cache_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create preview cache dir {}", dir.display()))?;

        // Keep the OS media scanner out of the cache.
        let marker = dir.join(MEDIA_SCANNER_MARKER);
        if !file_exists(&marker).await {
            tokio::fs::write(&marker, b"")
                .await
                .with_context(|| format!("create {}", marker.display()))?;
        }
        Ok(())
    }

    fn cache_dir(&self) -> PathBuf {
        self.config.base_dir.join(PREVIEWS_DIR)
    }

    fn asset_path(&self, key: &str) -> PathBuf {
        self.cache_dir().join(format!("{key}.png"))
    }
}

async fn fetch_with_fallback(
    downloader: &dyn Downloader,
    primary: &str,
    fallback: &str,
    destination: &Path,
) -> anyhow::Result<()> {
    match downloader.fetch(primary, destination).await {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(url = primary, error = ?err, "primary download failed, trying fallback");
            downloader
                .fetch(fallback, destination)
                .await
                .with_context(|| format!("fallback download from {fallback}"))
        }
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
