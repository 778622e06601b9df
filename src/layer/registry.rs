//! Tag to layer asset registry
//!
//! Lookup order of [`InputLayerRegistry::try_get_layer_asset`]:
//!
//! ```text
//! loaded cache ──► tag map ──► resident asset ──► sync load      (use_async_loads = false)
//!                                             └─► async request  (use_async_loads = true, returns None)
//! ```
//!
//! Async loads finish on the tokio blocking pool and are applied on the
//! caller's thread by [`InputLayerRegistry::pump_completions`].

use super::loader::{LayerAssetLoader, LayerAssetRef, LayerLoad, LoadCompletion, Loading, TomlLayerLoader};
use super::InputLayerAsset;
use crate::binding::GameplayTag;
use crate::config::RegistrySettings;
use crate::error::RegistryError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

pub struct InputLayerRegistry {
    use_async_loads: bool,
    log_registry_loads: bool,
    loader: Arc<dyn LayerAssetLoader>,
    layer_map: HashMap<GameplayTag, LayerAssetRef>,
    loaded_layers: HashMap<GameplayTag, Arc<InputLayerAsset>>,
    pending_loads: HashMap<GameplayTag, LayerLoad<Loading>>,
    completion_tx: mpsc::UnboundedSender<LoadCompletion>,
    completion_rx: mpsc::UnboundedReceiver<LoadCompletion>,
}

impl std::fmt::Debug for InputLayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputLayerRegistry")
            .field("use_async_loads", &self.use_async_loads)
            .field("registered", &self.layer_map.len())
            .field("loaded", &self.loaded_layers.len())
            .field("pending", &self.pending_loads.len())
            .finish()
    }
}

impl InputLayerRegistry {
    pub fn new(loader: Arc<dyn LayerAssetLoader>, settings: &RegistrySettings) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let mut layer_map = HashMap::new();
        for entry in &settings.layers {
            if !entry.tag.is_valid() {
                continue;
            }
            layer_map.insert(entry.tag.clone(), entry.asset.clone());
        }

        if settings.log_registry_loads {
            info!(
                "Layer registry loaded {} entries (async={})",
                layer_map.len(),
                settings.use_async_loads
            );
        }

        Self {
            use_async_loads: settings.use_async_loads,
            log_registry_loads: settings.log_registry_loads,
            loader,
            layer_map,
            loaded_layers: HashMap::new(),
            pending_loads: HashMap::new(),
            completion_tx,
            completion_rx,
        }
    }

    /// Registry reading TOML assets below `settings.asset_root`
    pub fn from_settings(settings: &RegistrySettings) -> Self {
        Self::new(Arc::new(TomlLayerLoader::new(&settings.asset_root)), settings)
    }

    /// Adds or replaces a tag mapping
    ///
    /// An already loaded asset for the tag is dropped and a load still in
    /// flight is aborted.
    pub fn register(&mut self, tag: GameplayTag, reference: LayerAssetRef) {
        if !tag.is_valid() {
            return;
        }
        self.loaded_layers.remove(&tag);
        if let Some(load) = self.pending_loads.remove(&tag) {
            debug!("Aborting load of {} ({}), tag re-registered", tag, load.reference());
            load.abort();
        }
        self.layer_map.insert(tag, reference);
    }

    pub fn is_async_loads_enabled(&self) -> bool {
        self.use_async_loads
    }

    /// Resolves `tag` to a loaded asset, starting a load if needed
    ///
    /// Returns `None` for unknown tags, failed loads and loads still in flight.
    pub fn try_get_layer_asset(&mut self, tag: &GameplayTag) -> Option<Arc<InputLayerAsset>> {
        if !tag.is_valid() {
            return None;
        }

        self.pump_completions();

        if let Some(asset) = self.loaded_layers.get(tag) {
            return Some(asset.clone());
        }

        let Some(reference) = self.layer_map.get(tag).cloned() else {
            warn!("Layer tag {} not found in registry", tag);
            return None;
        };

        if let Some(asset) = self.loader.resolve_resident(&reference) {
            self.loaded_layers.insert(tag.clone(), asset.clone());
            return Some(asset);
        }

        if !self.use_async_loads {
            return self.load_now(tag, &reference);
        }

        self.request_layer_async(tag);
        debug!("Layer tag {} requested async load", tag);
        // set when the runtime fallback loaded synchronously
        self.loaded_layers.get(tag).cloned()
    }

    /// Starts a background load unless one is running or the asset is cached
    ///
    /// In sync mode this is the same as `try_get_layer_asset`.
    pub fn request_layer_async(&mut self, tag: &GameplayTag) {
        if !self.use_async_loads {
            let _ = self.try_get_layer_asset(tag);
            return;
        }

        if !tag.is_valid()
            || self.loaded_layers.contains_key(tag)
            || self.pending_loads.contains_key(tag)
        {
            return;
        }

        let Some(reference) = self.layer_map.get(tag).cloned() else {
            return;
        };
        if reference.is_null() {
            return;
        }

        match Handle::try_current() {
            Ok(runtime) => {
                let load = LayerLoad::request(tag.clone(), reference).start(
                    &runtime,
                    self.loader.clone(),
                    self.completion_tx.clone(),
                );
                self.pending_loads.insert(tag.clone(), load);
            }
            Err(_) => {
                warn!("No tokio runtime for async load of {}, loading synchronously", tag);
                let _ = self.load_now(tag, &reference);
            }
        }
    }

    /// Applies finished async loads; returns how many were applied
    pub fn pump_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.apply_completion(completion);
            applied += 1;
        }
        applied
    }

    /// Waits until every in-flight load has been applied
    pub async fn wait_for_pending(&mut self) {
        self.pump_completions();
        while !self.pending_loads.is_empty() {
            match self.completion_rx.recv().await {
                Some(completion) => self.apply_completion(completion),
                None => break,
            }
        }
    }

    fn apply_completion(&mut self, completion: LoadCompletion) {
        let LoadCompletion {
            tag,
            reference,
            result,
        } = completion;

        // completions of aborted or superseded loads
        if self.pending_loads.get(&tag).map(|load| load.reference()) != Some(&reference) {
            trace!("Dropping stale load of {} ({})", tag, reference);
            return;
        }
        if let Some(load) = self.pending_loads.remove(&tag) {
            trace!(
                "Load of {} took {}ms",
                tag,
                (chrono::Local::now() - load.requested_at()).num_milliseconds()
            );
        }

        match result.and_then(|asset| Self::check_tag(&tag, asset)) {
            Ok(asset) => {
                self.loaded_layers.insert(tag.clone(), asset);
                if self.log_registry_loads {
                    info!("Async load completed for layer tag {}", tag);
                }
            }
            Err(e) => {
                warn!("Async load failed for layer tag {}: {}", tag, e);
            }
        }
    }

    fn load_now(&mut self, tag: &GameplayTag, reference: &LayerAssetRef) -> Option<Arc<InputLayerAsset>> {
        match self
            .loader
            .load(reference)
            .and_then(|asset| Self::check_tag(tag, asset))
        {
            Ok(asset) => {
                if self.log_registry_loads {
                    info!("Loaded layer {} from {}", tag, reference);
                }
                self.loaded_layers.insert(tag.clone(), asset.clone());
                Some(asset)
            }
            Err(e) => {
                warn!("Layer tag {} failed to load asset: {}", tag, e);
                None
            }
        }
    }

    fn check_tag(
        expected: &GameplayTag,
        asset: Arc<InputLayerAsset>,
    ) -> Result<Arc<InputLayerAsset>, RegistryError> {
        if asset.layer_tag.matches_exact(expected) {
            Ok(asset)
        } else {
            Err(RegistryError::TagMismatch {
                expected: expected.to_string(),
                found: asset.layer_tag.to_string(),
            })
        }
    }

    /// Registered tags, sorted
    pub fn registered_tags(&self) -> Vec<GameplayTag> {
        let mut tags: Vec<_> = self.layer_map.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn loaded_tags(&self) -> Vec<GameplayTag> {
        let mut tags: Vec<_> = self.loaded_layers.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn pending_tags(&self) -> Vec<GameplayTag> {
        let mut tags: Vec<_> = self.pending_loads.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn is_loaded(&self, tag: &GameplayTag) -> bool {
        self.loaded_layers.contains_key(tag)
    }

    pub fn is_pending(&self, tag: &GameplayTag) -> bool {
        self.pending_loads.contains_key(tag)
    }
}

impl Drop for InputLayerRegistry {
    fn drop(&mut self) {
        for load in self.pending_loads.values() {
            load.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryEntry;
    use crate::testing::MemoryLayerLoader;
    use std::fs;

    fn settings(use_async_loads: bool, entries: &[(&str, &str)]) -> RegistrySettings {
        RegistrySettings {
            use_async_loads,
            log_registry_loads: false,
            layers: entries
                .iter()
                .map(|(tag, asset)| RegistryEntry {
                    tag: GameplayTag::new(*tag),
                    asset: LayerAssetRef::new(*asset),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_and_invalid_tags_are_not_found() {
        let mut registry = InputLayerRegistry::new(Arc::new(MemoryLayerLoader::default()), &settings(false, &[]));
        assert!(registry.try_get_layer_asset(&GameplayTag::new("Input.Layer.Nope")).is_none());
        assert!(registry.try_get_layer_asset(&GameplayTag::none()).is_none());
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let registry = InputLayerRegistry::new(
            Arc::new(MemoryLayerLoader::default()),
            &settings(false, &[("", "broken"), ("Input.Layer.Combat", "combat")]),
        );
        assert_eq!(registry.registered_tags(), vec![GameplayTag::new("Input.Layer.Combat")]);
    }

    #[test]
    fn resident_asset_is_cached_without_loading() {
        let loader = MemoryLayerLoader::default()
            .with_resident("combat", InputLayerAsset::new("Input.Layer.Combat", 0));
        let loads = loader.load_counter();
        let mut registry = InputLayerRegistry::new(
            Arc::new(loader),
            &settings(true, &[("Input.Layer.Combat", "combat")]),
        );

        let tag = GameplayTag::new("Input.Layer.Combat");
        assert!(registry.try_get_layer_asset(&tag).is_some());
        assert!(registry.is_loaded(&tag));
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn sync_mode_loads_from_disk_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("combat.toml"),
            "tag = \"Input.Layer.Combat\"\npriority = 3\n",
        )
        .unwrap();

        let mut settings = settings(false, &[("Input.Layer.Combat", "combat.toml")]);
        settings.asset_root = dir.path().to_path_buf();
        let mut registry = InputLayerRegistry::from_settings(&settings);

        let tag = GameplayTag::new("Input.Layer.Combat");
        let first = registry.try_get_layer_asset(&tag).unwrap();
        assert_eq!(first.priority, 3);

        fs::remove_file(dir.path().join("combat.toml")).unwrap();
        let second = registry.try_get_layer_asset(&tag).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn failed_sync_load_is_not_cached() {
        let mut registry = InputLayerRegistry::new(
            Arc::new(MemoryLayerLoader::default()),
            &settings(false, &[("Input.Layer.Combat", "combat")]),
        );
        let tag = GameplayTag::new("Input.Layer.Combat");
        assert!(registry.try_get_layer_asset(&tag).is_none());
        assert!(!registry.is_loaded(&tag));
    }

    #[test]
    fn mismatched_tag_is_rejected() {
        let loader = MemoryLayerLoader::default()
            .with_asset("combat", InputLayerAsset::new("Input.Layer.Menu", 0));
        let mut registry = InputLayerRegistry::new(
            Arc::new(loader),
            &settings(false, &[("Input.Layer.Combat", "combat")]),
        );
        assert!(registry.try_get_layer_asset(&GameplayTag::new("Input.Layer.Combat")).is_none());
    }

    #[test]
    fn async_mode_without_runtime_falls_back_to_sync() {
        let loader = MemoryLayerLoader::default()
            .with_asset("combat", InputLayerAsset::new("Input.Layer.Combat", 0));
        let mut registry = InputLayerRegistry::new(
            Arc::new(loader),
            &settings(true, &[("Input.Layer.Combat", "combat")]),
        );
        let tag = GameplayTag::new("Input.Layer.Combat");

        assert!(registry.try_get_layer_asset(&tag).is_some());
        assert!(registry.is_loaded(&tag));
        assert!(!registry.is_pending(&tag));
    }

    #[tokio::test]
    async fn async_load_completes_later() {
        let loader = MemoryLayerLoader::default()
            .with_asset("combat", InputLayerAsset::new("Input.Layer.Combat", 0));
        let loads = loader.load_counter();
        let mut registry = InputLayerRegistry::new(
            Arc::new(loader),
            &settings(true, &[("Input.Layer.Combat", "combat")]),
        );
        let tag = GameplayTag::new("Input.Layer.Combat");

        assert!(registry.try_get_layer_asset(&tag).is_none());
        assert!(registry.is_pending(&tag));

        // duplicate requests are suppressed while in flight
        registry.request_layer_async(&tag);
        assert_eq!(registry.pending_tags().len(), 1);

        registry.wait_for_pending().await;
        assert!(!registry.is_pending(&tag));
        assert!(registry.try_get_layer_asset(&tag).is_some());
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_failure_is_logged_not_cached() {
        let mut registry = InputLayerRegistry::new(
            Arc::new(MemoryLayerLoader::default()),
            &settings(true, &[("Input.Layer.Combat", "combat")]),
        );
        let tag = GameplayTag::new("Input.Layer.Combat");

        assert!(registry.try_get_layer_asset(&tag).is_none());
        registry.wait_for_pending().await;
        assert!(!registry.is_loaded(&tag));
        assert!(!registry.is_pending(&tag));
    }

    #[tokio::test]
    async fn register_replaces_load_in_flight() {
        let loader = MemoryLayerLoader::default()
            .with_asset("combat_v1", InputLayerAsset::new("Input.Layer.Combat", 1))
            .with_asset("combat_v2", InputLayerAsset::new("Input.Layer.Combat", 2));
        let mut registry = InputLayerRegistry::new(
            Arc::new(loader),
            &settings(true, &[("Input.Layer.Combat", "combat_v1")]),
        );
        let tag = GameplayTag::new("Input.Layer.Combat");

        assert!(registry.try_get_layer_asset(&tag).is_none());
        assert!(registry.is_pending(&tag));

        registry.register(tag.clone(), LayerAssetRef::new("combat_v2"));
        assert!(!registry.is_pending(&tag));

        // an old completion that was already queued is ignored
        registry
            .completion_tx
            .send(LoadCompletion {
                tag: tag.clone(),
                reference: LayerAssetRef::new("combat_v1"),
                result: Ok(Arc::new(InputLayerAsset::new("Input.Layer.Combat", 1))),
            })
            .unwrap();
        registry.pump_completions();
        assert!(!registry.is_loaded(&tag));

        assert!(registry.try_get_layer_asset(&tag).is_none());
        registry.wait_for_pending().await;
        let asset = registry.try_get_layer_asset(&tag).unwrap();
        assert_eq!(asset.priority, 2);
    }
}
