//! Test doubles for embedding applications and the crate's own tests

use crate::binding::{GameplayTag, InputActionId, InputActionInstance, InputActionValue, TriggerEvent};
use crate::binding::gate::TagPredicate;
use crate::error::RegistryError;
use crate::handler::{HandlerContext, HandlerInterest, InputHandler};
use crate::layer::loader::{LayerAssetLoader, LayerAssetRef};
use crate::layer::InputLayerAsset;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// One observed handler callback
#[derive(Clone, Debug, PartialEq)]
pub enum HandlerCall {
    Activated(String),
    Deactivated(String),
    Live {
        handler: String,
        action: InputActionId,
        event: TriggerEvent,
        value: InputActionValue,
    },
    Buffered {
        handler: String,
        action: InputActionId,
        event: TriggerEvent,
        value: InputActionValue,
    },
}

pub type CallLog = Arc<Mutex<Vec<HandlerCall>>>;

/// Handler that appends every callback to a shared log
///
/// Duplicates share the log with their template.
#[derive(Clone, Debug)]
pub struct RecordingHandler {
    label: String,
    interest: HandlerInterest,
    log: CallLog,
}

impl RecordingHandler {
    pub fn new(label: impl Into<String>, interest: HandlerInterest, log: CallLog) -> Self {
        Self {
            label: label.into(),
            interest,
            log,
        }
    }

    fn record(&self, call: HandlerCall) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

impl InputHandler for RecordingHandler {
    fn interest(&self) -> &HandlerInterest {
        &self.interest
    }

    fn duplicate(&self) -> Box<dyn InputHandler> {
        Box::new(self.clone())
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn on_activated(&mut self, _ctx: &mut HandlerContext<'_>) {
        self.record(HandlerCall::Activated(self.label.clone()));
    }

    fn on_deactivated(&mut self, _ctx: &mut HandlerContext<'_>) {
        self.record(HandlerCall::Deactivated(self.label.clone()));
    }

    fn handle_input(&mut self, _ctx: &mut HandlerContext<'_>, instance: &InputActionInstance) {
        self.record(HandlerCall::Live {
            handler: self.label.clone(),
            action: instance.action.clone(),
            event: instance.trigger_event,
            value: instance.value,
        });
    }

    fn handle_buffered_input(
        &mut self,
        _ctx: &mut HandlerContext<'_>,
        action: &InputActionId,
        event: TriggerEvent,
        value: InputActionValue,
    ) {
        self.record(HandlerCall::Buffered {
            handler: self.label.clone(),
            action: action.clone(),
            event,
            value,
        });
    }
}

pub fn new_call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn take_calls(log: &CallLog) -> Vec<HandlerCall> {
    std::mem::take(&mut *log.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Live/buffered calls only, as `(handler, action)` pairs
pub fn handled_by(calls: &[HandlerCall]) -> Vec<(String, String)> {
    calls
        .iter()
        .filter_map(|call| match call {
            HandlerCall::Live { handler, action, .. } | HandlerCall::Buffered { handler, action, .. } => {
                Some((handler.clone(), action.to_string()))
            }
            _ => None,
        })
        .collect()
}

/// Tag predicate over a mutable tag set; clones share the set
#[derive(Clone, Debug, Default)]
pub struct StaticTagPredicate {
    tags: Arc<RwLock<HashSet<GameplayTag>>>,
}

impl StaticTagPredicate {
    pub fn with_tags<I>(tags: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<GameplayTag>,
    {
        let predicate = Self::default();
        for tag in tags {
            predicate.add(tag.into());
        }
        predicate
    }

    pub fn add(&self, tag: GameplayTag) {
        self.tags.write().unwrap_or_else(PoisonError::into_inner).insert(tag);
    }

    pub fn remove(&self, tag: &GameplayTag) {
        self.tags.write().unwrap_or_else(PoisonError::into_inner).remove(tag);
    }
}

impl TagPredicate for StaticTagPredicate {
    fn actor_has_tag(&self, tag: &GameplayTag) -> bool {
        self.tags.read().unwrap_or_else(PoisonError::into_inner).contains(tag)
    }
}

/// In-memory asset source with optional "resident" assets
#[derive(Debug, Default)]
pub struct MemoryLayerLoader {
    assets: HashMap<LayerAssetRef, Arc<InputLayerAsset>>,
    resident: HashSet<LayerAssetRef>,
    loads: Arc<AtomicUsize>,
}

impl MemoryLayerLoader {
    /// Asset that needs a load
    pub fn with_asset(mut self, reference: impl Into<LayerAssetRef>, asset: InputLayerAsset) -> Self {
        self.assets.insert(reference.into(), Arc::new(asset));
        self
    }

    /// Asset already in memory
    pub fn with_resident(mut self, reference: impl Into<LayerAssetRef>, asset: InputLayerAsset) -> Self {
        let reference = reference.into();
        self.resident.insert(reference.clone());
        self.assets.insert(reference, Arc::new(asset));
        self
    }

    /// Counter of `load` calls, shared with the loader
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }
}

impl LayerAssetLoader for MemoryLayerLoader {
    fn resolve_resident(&self, reference: &LayerAssetRef) -> Option<Arc<InputLayerAsset>> {
        if self.resident.contains(reference) {
            self.assets.get(reference).cloned()
        } else {
            None
        }
    }

    fn load(&self, reference: &LayerAssetRef) -> Result<Arc<InputLayerAsset>, RegistryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.assets
            .get(reference)
            .cloned()
            .ok_or_else(|| RegistryError::MissingAsset(reference.to_string()))
    }
}
