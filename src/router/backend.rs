//! Engine input subsystem seen from the router

use crate::binding::{InputBindingKey, MappingContextRef};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Handle of one action binding, returned by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingHandle(pub u32);

/// Identity of the owning controller/input component pair
///
/// A change of this value means bindings must be rebuilt.
pub type ContextId = u64;

/// Trait for the input subsystem plus owning context the router binds against
pub trait InputBackend: Debug + Send {
    /// `None` while the owning context cannot be resolved
    fn context_id(&self) -> Option<ContextId>;

    fn clear_all_mappings(&mut self);

    fn add_mapping_context(&mut self, context: &MappingContextRef, priority: i32);

    /// Registers `key`; `None` if the backend refused the binding
    fn bind_action(&mut self, key: &InputBindingKey) -> Option<BindingHandle>;

    fn remove_binding(&mut self, handle: BindingHandle);
}

/// Snapshot of everything a [`RecordingBackend`] was told
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendState {
    pub context_id: Option<ContextId>,
    pub mappings: Vec<(MappingContextRef, i32)>,
    pub bindings: BTreeMap<BindingHandle, InputBindingKey>,
    pub clear_count: usize,
    pub removed_count: usize,
    next_handle: u32,
}

/// In-memory backend
///
/// Clones share state, so a caller can keep one clone to inspect or to
/// simulate a controller change while the router owns the other.
#[derive(Clone, Debug, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<BackendState>>,
}

impl RecordingBackend {
    /// Backend with a resolved context
    pub fn new(context_id: ContextId) -> Self {
        let backend = Self::default();
        backend.lock().context_id = Some(context_id);
        backend
    }

    /// Backend whose owning context is not resolvable yet
    pub fn unresolved() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_context_id(&self, context_id: Option<ContextId>) {
        debug!("Backend context changed to {:?}", context_id);
        self.lock().context_id = context_id;
    }

    pub fn snapshot(&self) -> BackendState {
        self.lock().clone()
    }

    /// Bound keys in registration order
    pub fn bound_keys(&self) -> Vec<InputBindingKey> {
        self.lock().bindings.values().cloned().collect()
    }

    pub fn mappings(&self) -> Vec<(MappingContextRef, i32)> {
        self.lock().mappings.clone()
    }
}

impl InputBackend for RecordingBackend {
    fn context_id(&self) -> Option<ContextId> {
        self.lock().context_id
    }

    fn clear_all_mappings(&mut self) {
        let mut state = self.lock();
        state.mappings.clear();
        state.clear_count += 1;
        trace!("Cleared all mapping contexts");
    }

    fn add_mapping_context(&mut self, context: &MappingContextRef, priority: i32) {
        trace!("Adding mapping context {} at priority {}", context, priority);
        self.lock().mappings.push((context.clone(), priority));
    }

    fn bind_action(&mut self, key: &InputBindingKey) -> Option<BindingHandle> {
        let mut state = self.lock();
        let handle = BindingHandle(state.next_handle);
        state.next_handle += 1;
        state.bindings.insert(handle, key.clone());
        trace!("Bound {} as {:?}", key, handle);
        Some(handle)
    }

    fn remove_binding(&mut self, handle: BindingHandle) {
        let mut state = self.lock();
        if state.bindings.remove(&handle).is_some() {
            state.removed_count += 1;
        }
    }
}
