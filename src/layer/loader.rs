//! Layer asset loading
//!
//! A [`LayerAssetRef`] is a soft reference: it names an asset without holding
//! it. Loaders resolve references either from memory (`resolve_resident`) or by
//! actually loading them. Async requests are tracked with the [`LayerLoad`]
//! state machine.

use super::InputLayerAsset;
use crate::binding::GameplayTag;
use crate::error::RegistryError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Soft reference to a layer asset (relative to the loader root, or absolute)
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerAssetRef(String);

impl LayerAssetRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl Display for LayerAssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LayerAssetRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Trait for asset sources the registry can pull layers from
pub trait LayerAssetLoader: Send + Sync + 'static {
    /// Asset already in memory, no load needed
    fn resolve_resident(&self, reference: &LayerAssetRef) -> Option<Arc<InputLayerAsset>>;

    /// Blocking load
    fn load(&self, reference: &LayerAssetRef) -> Result<Arc<InputLayerAsset>, RegistryError>;
}

/// Loads layer assets from TOML files below a root directory
#[derive(Clone, Debug)]
pub struct TomlLayerLoader {
    root: PathBuf,
}

impl TomlLayerLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LayerAssetLoader for TomlLayerLoader {
    fn resolve_resident(&self, _reference: &LayerAssetRef) -> Option<Arc<InputLayerAsset>> {
        None
    }

    fn load(&self, reference: &LayerAssetRef) -> Result<Arc<InputLayerAsset>, RegistryError> {
        let path = reference.resolve(&self.root);
        debug!("Loading layer asset from {:?}", path);
        InputLayerAsset::from_file(&path).map(Arc::new)
    }
}

/// Result of an async load, applied by `InputLayerRegistry::pump_completions`
#[derive(Debug)]
pub struct LoadCompletion {
    pub tag: GameplayTag,
    pub reference: LayerAssetRef,
    pub result: Result<Arc<InputLayerAsset>, RegistryError>,
}

/// Lifecycle of one async load request
#[state]
#[derive(Debug, Clone)]
pub enum LoadState {
    Requested, // Created, nothing spawned yet
    Loading,   // Blocking load running on the runtime
}

#[machine]
#[derive(Debug)]
pub struct LayerLoad<S: LoadState> {
    tag: GameplayTag,
    reference: LayerAssetRef,
    requested_at: DateTime<Local>,
    task: Option<JoinHandle<()>>,
}

impl<S: LoadState> LayerLoad<S> {
    pub fn tag(&self) -> &GameplayTag {
        &self.tag
    }

    pub fn reference(&self) -> &LayerAssetRef {
        &self.reference
    }

    pub fn requested_at(&self) -> DateTime<Local> {
        self.requested_at
    }
}

impl LayerLoad<Requested> {
    pub fn request(tag: GameplayTag, reference: LayerAssetRef) -> Self {
        trace!("Load requested for {} ({})", tag, reference);
        Self::new(tag, reference, Local::now(), None)
    }

    /// Spawns the blocking load; the outcome is sent to `completions`
    pub fn start(
        mut self,
        runtime: &Handle,
        loader: Arc<dyn LayerAssetLoader>,
        completions: mpsc::UnboundedSender<LoadCompletion>,
    ) -> LayerLoad<Loading> {
        let tag = self.tag.clone();
        let reference = self.reference.clone();

        let task = runtime.spawn(async move {
            let blocking_ref = reference.clone();
            let result = match tokio::task::spawn_blocking(move || loader.load(&blocking_ref)).await {
                Ok(result) => result,
                Err(e) => Err(RegistryError::TaskFailed(e.to_string())),
            };

            let completion = LoadCompletion {
                tag,
                reference,
                result,
            };
            if completions.send(completion).is_err() {
                trace!("Registry dropped before load completed");
            }
        });

        self.task = Some(task);
        self.transition()
    }
}

impl LayerLoad<Loading> {
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
