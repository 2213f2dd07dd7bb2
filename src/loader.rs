//! Asynchronous weight loading and the shared model handle.
//!
//! The store is built from two independently retrievable artifacts: a JSON
//! structure descriptor and the binary weight blob. Both are fetched
//! concurrently and joined before anything becomes visible to scorers —
//! there is no partial or lazy loading.
//!
//! "Not yet loaded" is an explicit state of [`ModelHandle`], not a null
//! scattered through call sites. Callers that can tolerate an absent store
//! poll `get()`; callers that need the model await `ready()`.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::weights::{LoadError, Topology, WeightStore};

/// Timeout for a single artifact fetch.
const ARTIFACT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a weight artifact lives.
#[derive(Debug, Clone)]
pub enum ArtifactSource {
    Url(String),
    File(PathBuf),
}

impl ArtifactSource {
    /// Interpret a CLI argument: anything with an http(s) scheme is a URL,
    /// everything else a local path.
    pub fn from_arg(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            Self::Url(arg.to_string())
        } else {
            Self::File(PathBuf::from(arg))
        }
    }

    async fn retrieve(&self, client: &reqwest::Client) -> Result<Vec<u8>, LoadError> {
        match self {
            Self::Url(url) => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| LoadError::FetchFailed(format!("{url}: {e}")))?;
                if !resp.status().is_success() {
                    return Err(LoadError::FetchFailed(format!(
                        "{url}: status {}",
                        resp.status()
                    )));
                }
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| LoadError::FetchFailed(format!("{url}: {e}")))?;
                Ok(bytes.to_vec())
            }
            Self::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| LoadError::FetchFailed(format!("{}: {e}", path.display()))),
        }
    }
}

impl std::fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Fetch both artifacts concurrently and assemble the store.
///
/// All-or-nothing: a failure on either artifact, or any shape mismatch,
/// yields an error and no store.
pub async fn load(
    structure: &ArtifactSource,
    blob: &ArtifactSource,
) -> Result<WeightStore, LoadError> {
    let client = reqwest::Client::builder()
        .timeout(ARTIFACT_FETCH_TIMEOUT)
        .build()
        .map_err(|e| LoadError::FetchFailed(format!("http client: {e}")))?;

    let (descriptor_bytes, blob_bytes) =
        tokio::try_join!(structure.retrieve(&client), blob.retrieve(&client))?;

    let topology = Topology::parse(&descriptor_bytes)?;
    WeightStore::from_parts(topology, &blob_bytes)
}

/// Single-initialization, process-lifetime handle to the weight store.
///
/// Clones share the same underlying slot, so a background load task and any
/// number of scorers can hold the handle concurrently. The store is read-only
/// once installed; no locking is needed on the scoring path.
///
/// The readiness channel is tri-state: `None` while a load attempt is in
/// flight, `Some(true)` once a store is installed, `Some(false)` when the
/// attempt completed without one. `ready()` resolves in either terminal
/// state, so waiters are never stranded by a failed load.
#[derive(Clone)]
pub struct ModelHandle {
    store: Arc<OnceLock<WeightStore>>,
    ready_tx: Arc<watch::Sender<Option<bool>>>,
    ready_rx: watch::Receiver<Option<bool>>,
}

impl ModelHandle {
    /// A handle with no store installed. Scoring against it degrades to 0.
    pub fn empty() -> Self {
        let (ready_tx, ready_rx) = watch::channel(None);
        Self {
            store: Arc::new(OnceLock::new()),
            ready_tx: Arc::new(ready_tx),
            ready_rx,
        }
    }

    /// A handle pre-populated with a store (tests, synchronous CLI paths).
    pub fn with_store(store: WeightStore) -> Self {
        let handle = Self::empty();
        handle.install(store);
        handle
    }

    /// Install the store. Returns false if one was already installed;
    /// the handle is initialize-once by design.
    pub fn install(&self, store: WeightStore) -> bool {
        let installed = self.store.set(store).is_ok();
        if installed {
            let _ = self.ready_tx.send(Some(true));
        }
        installed
    }

    /// Mark the current load attempt as completed without a store. Waiters on
    /// `ready()` wake up and see `false`. A later `install()` still works and
    /// flips the state back to loaded.
    pub fn mark_load_failed(&self) {
        self.ready_tx.send_if_modified(|state| {
            if *state == Some(true) {
                return false;
            }
            *state = Some(false);
            true
        });
    }

    /// Current store, or `None` while loading has not completed (or failed).
    /// Never blocks.
    pub fn get(&self) -> Option<&WeightStore> {
        self.store.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.store.get().is_some()
    }

    /// Wait until a load attempt has completed, in success or failure.
    /// Returns whether a store is installed.
    pub async fn ready(&self) -> bool {
        let mut rx = self.ready_rx.clone();
        // Only fails if the sender is dropped, and the handle owns the sender.
        let loaded = match rx.wait_for(|state| state.is_some()).await {
            Ok(state) => state.unwrap_or(false),
            Err(_) => self.is_loaded(),
        };
        loaded
    }
}

impl Default for ModelHandle {
    fn default() -> Self {
        Self::empty()
    }
}

/// Kick off a background load into `handle`.
///
/// On failure the handle is left absent and scoring degrades to 0; the
/// process keeps running and waiters on `ready()` are released.
pub fn spawn_load(
    handle: ModelHandle,
    structure: ArtifactSource,
    blob: ArtifactSource,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match load(&structure, &blob).await {
            Ok(store) => {
                info!(
                    hash = store.hash(),
                    params = store.param_count(),
                    input_width = store.topology().input_width,
                    "weight store loaded"
                );
                if !handle.install(store) {
                    warn!("weight store was already installed; ignoring reload");
                }
            }
            Err(e) => {
                warn!(structure = %structure, weights = %blob, error = %e,
                    "weight load failed; scoring will degrade to 0");
                handle.mark_load_failed();
            }
        }
    })
}
