//! Layered input router
//!
//! Owns the active layer stack and turns engine action events into handler
//! calls:
//!
//! ```text
//! on_action_event ──► route_input ──► gates ──► layer ranges (highest priority first)
//!                                                  │
//!                          ┌───────────────────────┼──────────────────────┐
//!                  channel open + should_buffer   replay             live event
//!                          │                       │                      │
//!                    InputBuffer::buffer_event  handle_buffered_input  handle_input
//! ```
//!
//! After each layer the consume policy decides whether lower layers see the
//! event. Every stack change rebuilds the mapping contexts, the dispatch table
//! and the engine bindings.

pub mod backend;
pub mod dispatch;


use self::backend::{BindingHandle, ContextId, InputBackend};
use self::dispatch::{DispatchTable, collect_bindings, layers_to_apply};
use crate::binding::device::{device_from_key, InputDevice, InputKey};
use crate::binding::gate::{self, InputGateRule, TagPredicate};
use crate::binding::{
    GameplayTag, InputActionId, InputActionInstance, InputActionValue, InputBindingKey, TriggerEvent,
};
use crate::buffer::{BufferedInputEvent, BufferedInputSink, InputBuffer};
use crate::config::{InputRouterConfig, RouterSettings};
use crate::handler::{HandlerContext, InputIntentEvent};
use crate::layer::{ActiveInputLayer, ActiveLayerSummary, InputLayerAsset, InputLayerRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace};

const INTENT_CHANNEL_CAPACITY: usize = 64;

pub type SharedTagPredicate = Box<dyn TagPredicate + Send + Sync>;

pub struct InputRouter {
    settings: RouterSettings,
    backend: Option<Box<dyn InputBackend>>,
    tag_predicate: Option<SharedTagPredicate>,
    buffer: Option<InputBuffer>,

    active_layers: Vec<ActiveInputLayer>,
    dispatch: DispatchTable,
    cached_binding_order: Vec<InputBindingKey>,
    router_owned_bindings: Vec<BindingHandle>,
    bound_context: Option<ContextId>,
    last_observed_context: Option<ContextId>,

    last_device: InputDevice,
    pending_intents: Vec<InputIntentEvent>,
    intent_tx: broadcast::Sender<InputIntentEvent>,
    device_tx: watch::Sender<InputDevice>,

    refresh_next_tick: bool,
    auto_refresh_elapsed: Duration,
    debug_log_elapsed: Duration,
}

impl std::fmt::Debug for InputRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputRouter")
            .field("layers", &self.active_layer_tags())
            .field("bindings", &self.cached_binding_order.len())
            .field("bound_context", &self.bound_context)
            .field("has_buffer", &self.buffer.is_some())
            .field("last_device", &self.last_device)
            .finish()
    }
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::new(RouterSettings::default())
    }
}

impl InputRouter {
    /// Router without backend; the first `tick` refreshes it
    pub fn new(settings: RouterSettings) -> Self {
        let (intent_tx, _) = broadcast::channel(INTENT_CHANNEL_CAPACITY);
        let (device_tx, _) = watch::channel(InputDevice::Unknown);

        Self {
            settings,
            backend: None,
            tag_predicate: None,
            buffer: None,
            active_layers: Vec::new(),
            dispatch: DispatchTable::default(),
            cached_binding_order: Vec::new(),
            router_owned_bindings: Vec::new(),
            bound_context: None,
            last_observed_context: None,
            last_device: InputDevice::Unknown,
            pending_intents: Vec::new(),
            intent_tx,
            device_tx,
            refresh_next_tick: true,
            auto_refresh_elapsed: Duration::ZERO,
            debug_log_elapsed: Duration::ZERO,
        }
    }

    /// Router with the configured buffer attached
    pub fn from_config(config: &InputRouterConfig) -> Self {
        let mut router = Self::new(config.router.clone());
        router.attach_buffer(config.buffer.build());
        router
    }

    pub fn with_backend(mut self, backend: impl InputBackend + 'static) -> Self {
        self.set_backend(Some(Box::new(backend)));
        self
    }

    pub fn with_buffer(mut self, buffer: InputBuffer) -> Self {
        self.attach_buffer(buffer);
        self
    }

    pub fn with_tag_predicate(mut self, predicate: impl TagPredicate + Send + Sync + 'static) -> Self {
        self.tag_predicate = Some(Box::new(predicate));
        self
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    // --- owning context ---

    /// Swaps the input backend and refreshes
    ///
    /// Bindings owned by the previous backend are removed from it first.
    pub fn set_backend(&mut self, backend: Option<Box<dyn InputBackend>>) {
        if let Some(mut previous) = self.backend.take() {
            for handle in self.router_owned_bindings.drain(..).rev() {
                previous.remove_binding(handle);
            }
            previous.clear_all_mappings();
        }
        self.router_owned_bindings.clear();
        self.bound_context = None;
        self.backend = backend;
        self.refresh_router();
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    fn resolved_context(&self) -> Option<ContextId> {
        self.backend.as_ref().and_then(|backend| backend.context_id())
    }

    /// Immediate refresh, the initial one included
    pub fn initialize_router(&mut self) {
        self.refresh_next_tick = false;
        self.refresh_router();
    }

    /// Re-resolves the owning context and rebuilds everything
    pub fn refresh_router(&mut self) {
        let previous = self.bound_context;

        if let Some(backend) = self.backend.as_mut() {
            backend.clear_all_mappings();
        }

        self.rebuild_bindings();

        let current = self.resolved_context();
        self.last_observed_context = current;

        if self.settings.debug_log_router_state {
            info!(
                "Router refreshed (context changed: {})",
                previous != current
            );
        }
    }

    pub fn schedule_refresh_next_tick(&mut self) {
        self.refresh_next_tick = true;
    }

    /// Frame update: deferred refresh, auto-refresh poll and state logging
    pub fn tick(&mut self, delta: Duration) {
        if self.refresh_next_tick {
            self.refresh_next_tick = false;
            self.refresh_router();
        }

        if self.settings.enable_auto_refresh {
            self.auto_refresh_elapsed = self.auto_refresh_elapsed.saturating_add(delta);
            if self.auto_refresh_elapsed >= self.settings.auto_refresh_interval() {
                self.auto_refresh_elapsed = Duration::ZERO;
                self.auto_refresh_check();
            }
        }

        if self.settings.debug_log_router_state {
            self.debug_log_elapsed = self.debug_log_elapsed.saturating_add(delta);
            if self.debug_log_elapsed >= self.settings.debug_log_interval() {
                self.debug_log_elapsed = Duration::ZERO;
                self.log_router_state();
            }
        }
    }

    fn auto_refresh_check(&mut self) {
        let current = self.resolved_context();
        if current == self.last_observed_context {
            return;
        }

        let previous = self.last_observed_context;
        self.last_observed_context = current;
        self.refresh_router();

        if self.settings.debug_log_router_state {
            info!("Router auto-refresh: context {:?} -> {:?}", previous, current);
        }
    }

    /// Push-style alternative to the auto-refresh poll
    ///
    /// Embedders that know when the owning context changed call this instead
    /// of waiting for the next poll; an unchanged context is ignored.
    pub fn notify_context_changed(&mut self) {
        self.auto_refresh_elapsed = Duration::ZERO;
        self.auto_refresh_check();
    }

    fn log_router_state(&self) {
        let layers = join_tags(&self.active_layer_tags());
        let open = join_tags(&self.open_buffer_channels());
        let top = self.top_buffer_channel().unwrap_or_default();
        info!(
            "Router state: Layers=[{}] TopChannel={} Open=[{}] Device={}",
            layers, top, open, self.last_device
        );
    }

    /// EndPlay teardown
    ///
    /// Deactivates every handler, removes router bindings, clears mappings and
    /// resets the buffer. Calling it again is harmless.
    pub fn shutdown(&mut self) {
        let mut ctx = HandlerContext::new(&mut self.pending_intents, self.last_device);
        for layer in &mut self.active_layers {
            layer.deactivate(&mut ctx);
        }
        drop(ctx);

        self.clear_router_owned_bindings();
        if let Some(backend) = self.backend.as_mut() {
            backend.clear_all_mappings();
        }
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.reset_all();
        }

        self.active_layers.clear();
        self.dispatch.clear();
        self.cached_binding_order.clear();
        self.bound_context = None;
        self.refresh_next_tick = false;
        self.flush_intents();
        trace!("Router shut down");
    }

    fn clear_router_owned_bindings(&mut self) {
        match self.backend.as_mut() {
            Some(backend) => {
                for handle in self.router_owned_bindings.drain(..).rev() {
                    backend.remove_binding(handle);
                }
            }
            None => self.router_owned_bindings.clear(),
        }
    }

    // --- layer stack ---

    /// Activates `asset` on top of its priority band
    ///
    /// No-op while the owning context is unresolved.
    pub fn push_layer(&mut self, asset: Arc<InputLayerAsset>) {
        if self.resolved_context().is_none() {
            debug!("Ignoring push of {}: no input context", asset.layer_tag);
            return;
        }

        let mut ctx = HandlerContext::new(&mut self.pending_intents, self.last_device);
        let active = ActiveInputLayer::instantiate(asset, &mut ctx);
        drop(ctx);

        debug!("Pushed layer {} (priority {})", active.layer_tag(), active.priority);
        self.active_layers.push(active);
        // stable: equal priorities keep push order
        self.active_layers.sort_by(|a, b| b.priority.cmp(&a.priority));

        self.rebuild_bindings();
        self.flush_intents();
    }

    /// Looks the layer up in `registry`; silent while an async load is pending
    pub fn push_layer_by_tag(&mut self, registry: &mut InputLayerRegistry, tag: &GameplayTag) {
        if !tag.is_valid() {
            return;
        }

        match registry.try_get_layer_asset(tag) {
            Some(asset) => self.push_layer(asset),
            None if registry.is_async_loads_enabled() => {
                debug!("Layer {} not yet loaded (async mode)", tag);
            }
            None => {}
        }
    }

    /// Removes the lowest-priority active layer carrying `tag`
    pub fn pop_layer_by_tag(&mut self, tag: &GameplayTag) {
        if !tag.is_valid() {
            return;
        }

        let Some(index) = self
            .active_layers
            .iter()
            .rposition(|layer| layer.layer_tag().matches_exact(tag))
        else {
            return;
        };

        let mut layer = self.active_layers.remove(index);
        let mut ctx = HandlerContext::new(&mut self.pending_intents, self.last_device);
        layer.deactivate(&mut ctx);
        drop(ctx);
        debug!("Popped layer {}", tag);

        self.rebuild_bindings();
        self.flush_intents();
    }

    pub fn clear_all_layers(&mut self) {
        let mut ctx = HandlerContext::new(&mut self.pending_intents, self.last_device);
        for layer in &mut self.active_layers {
            layer.deactivate(&mut ctx);
        }
        drop(ctx);

        self.active_layers.clear();
        self.rebuild_bindings();
        self.flush_intents();
    }

    /// Re-applies contexts, dispatch table and bindings for the current stack
    pub fn rebuild_bindings(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            self.router_owned_bindings.clear();
            self.dispatch.clear();
            self.cached_binding_order.clear();
            self.bound_context = None;
            return;
        };

        for handle in self.router_owned_bindings.drain(..).rev() {
            backend.remove_binding(handle);
        }

        let Some(context) = backend.context_id() else {
            trace!("Input context unresolved, bindings cleared");
            self.dispatch.clear();
            self.cached_binding_order.clear();
            self.bound_context = None;
            return;
        };
        self.bound_context = Some(context);

        backend.clear_all_mappings();

        let applied = &self.active_layers[..layers_to_apply(&self.active_layers)];
        for layer in applied {
            for mapping_context in &layer.applied_contexts {
                backend.add_mapping_context(mapping_context, layer.priority);
            }
        }

        self.dispatch = DispatchTable::build(applied);
        self.cached_binding_order = collect_bindings(applied);

        for key in &self.cached_binding_order {
            if let Some(handle) = backend.bind_action(key) {
                self.router_owned_bindings.push(handle);
            }
        }

        if self.settings.debug_log_router_state || self.settings.debug_log_bindings {
            let keys = self
                .cached_binding_order
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            info!("Router bindings ({}): {}", keys.len(), keys.join(","));
        }
    }

    // --- dispatch ---

    /// Engine callback for a bound (action, event)
    ///
    /// Keys that are not in the current binding set are ignored.
    pub fn on_action_event(&mut self, instance: &InputActionInstance) {
        if !instance.trigger_event.is_bindable()
            || self.cached_binding_order.binary_search(&instance.binding_key()).is_err()
        {
            trace!("Unbound action event {}", instance.binding_key());
            return;
        }
        self.route_input(&instance.action, instance.trigger_event, instance.value, false);
    }

    /// Walks the dispatch table for one event
    pub fn route_input(
        &mut self,
        action: &InputActionId,
        trigger_event: TriggerEvent,
        value: InputActionValue,
        from_buffer: bool,
    ) {
        let allow_live = self.evaluate_gates(false);
        let allow_buffering = self.evaluate_gates(true);

        if !from_buffer && !allow_live && !allow_buffering {
            trace!("Gates dropped {}:{}", action, trigger_event);
            return;
        }

        let open_channel = self
            .buffer
            .as_ref()
            .and_then(|buffer| buffer.top_open_channel().cloned());
        let instance = InputActionInstance::new(action.clone(), trigger_event, value);

        let Self {
            dispatch,
            active_layers,
            buffer,
            pending_intents,
            last_device,
            ..
        } = self;
        let mut ctx = HandlerContext::new(pending_intents, *last_device);

        'dispatch: for info in &dispatch.layers {
            let mut layer_handled = false;

            for entry in &dispatch.entries[info.start..info.end] {
                let Some(handler) = active_layers
                    .get_mut(entry.layer_index)
                    .and_then(|layer| layer.runtime_handlers.get_mut(entry.handler_index))
                else {
                    continue;
                };

                if !handler.can_handle(action, trigger_event) {
                    continue;
                }

                if !from_buffer {
                    if let Some(channel) = &open_channel {
                        if handler.should_buffer(action, trigger_event, channel) {
                            if !allow_buffering {
                                break 'dispatch;
                            }
                            if let Some(buffer) = buffer.as_mut() {
                                buffer.buffer_event(BufferedInputEvent::new(
                                    action.clone(),
                                    trigger_event,
                                    value,
                                    handler.buffer_channel().clone(),
                                ));
                            }
                            continue;
                        }
                    }
                }

                if from_buffer {
                    if allow_live {
                        handler.handle_buffered_input(&mut ctx, action, trigger_event, value);
                        layer_handled = true;
                    }
                } else {
                    if !allow_live {
                        break 'dispatch;
                    }
                    handler.handle_input(&mut ctx, &instance);
                    layer_handled = true;
                }
            }

            if info.stops_propagation(layer_handled) {
                break;
            }
        }

        drop(ctx);
        self.flush_intents();
    }

    // --- gates ---

    fn evaluate_gates(&self, for_buffering: bool) -> bool {
        gate::evaluate_gates(
            self.settings.enable_tag_gates,
            &self.settings.gate_rules,
            self.tag_predicate
                .as_deref()
                .map(|predicate| predicate as &dyn TagPredicate),
            for_buffering,
        )
    }

    pub fn set_tag_predicate(&mut self, predicate: Option<SharedTagPredicate>) {
        self.tag_predicate = predicate;
    }

    pub fn set_tag_gates_enabled(&mut self, enabled: bool) {
        self.settings.enable_tag_gates = enabled;
    }

    pub fn set_gate_rules(&mut self, rules: Vec<InputGateRule>) {
        self.settings.gate_rules = rules;
    }

    pub fn is_live_input_allowed(&self) -> bool {
        self.evaluate_gates(false)
    }

    pub fn is_buffering_allowed(&self) -> bool {
        self.evaluate_gates(true)
    }

    // --- buffer ---

    pub fn attach_buffer(&mut self, buffer: InputBuffer) {
        self.buffer = Some(buffer);
    }

    pub fn detach_buffer(&mut self) -> Option<InputBuffer> {
        self.buffer.take()
    }

    /// Attached buffer, created with defaults if missing
    pub fn ensure_buffer(&mut self) -> &mut InputBuffer {
        self.buffer.get_or_insert_with(InputBuffer::default)
    }

    pub fn buffer(&self) -> Option<&InputBuffer> {
        self.buffer.as_ref()
    }

    pub fn buffer_mut(&mut self) -> Option<&mut InputBuffer> {
        self.buffer.as_mut()
    }

    pub fn open_input_buffer(&mut self, channel: GameplayTag) {
        match self.buffer.as_mut() {
            Some(buffer) => buffer.open_channel(channel),
            None => trace!("No buffer attached, ignoring open of {}", channel),
        }
    }

    /// Closes `channel`, replaying its queue through the router when `flush` is set
    pub fn close_input_buffer(&mut self, channel: &GameplayTag, flush: bool) {
        let Some(mut buffer) = self.buffer.take() else {
            trace!("No buffer attached, ignoring close of {}", channel);
            return;
        };
        // detached while replaying; replays never buffer
        buffer.close_channel(channel, flush, Some(self as &mut dyn BufferedInputSink));
        self.buffer = Some(buffer);
    }

    pub fn open_buffer_channels(&self) -> Vec<GameplayTag> {
        self.buffer
            .as_ref()
            .map(|buffer| buffer.open_channels().to_vec())
            .unwrap_or_default()
    }

    pub fn top_buffer_channel(&self) -> Option<GameplayTag> {
        self.buffer.as_ref().and_then(|buffer| buffer.top_open_channel().cloned())
    }

    pub fn notify_montage_ended(&mut self) {
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.notify_montage_ended();
        }
    }

    // --- intents & devices ---

    pub fn broadcast_intent(&mut self, intent_tag: GameplayTag, trigger_event: TriggerEvent, value: InputActionValue) {
        self.pending_intents.push(InputIntentEvent {
            intent_tag,
            trigger_event,
            value,
        });
        self.flush_intents();
    }

    fn flush_intents(&mut self) {
        for intent in self.pending_intents.drain(..) {
            if self.intent_tx.send(intent).is_err() {
                trace!("Intent dropped, no subscribers");
            }
        }
    }

    pub fn subscribe_intents(&self) -> broadcast::Receiver<InputIntentEvent> {
        self.intent_tx.subscribe()
    }

    pub fn subscribe_device_changes(&self) -> watch::Receiver<InputDevice> {
        self.device_tx.subscribe()
    }

    /// Classifies `key` and publishes the device if it changed
    pub fn notify_key_input(&mut self, key: &InputKey) {
        let device = device_from_key(key);
        if device == self.last_device {
            return;
        }
        debug!("Input device changed: {} -> {}", self.last_device, device);
        self.last_device = device;
        self.device_tx.send_replace(device);
    }

    pub fn last_device(&self) -> InputDevice {
        self.last_device
    }

    pub fn is_gamepad_active(&self) -> bool {
        self.last_device == InputDevice::Gamepad
    }

    // --- queries ---

    pub fn is_layer_active(&self, tag: &GameplayTag) -> bool {
        self.active_layers.iter().any(|layer| layer.layer_tag().matches_exact(tag))
    }

    /// Tags of the active stack, highest priority first
    pub fn active_layer_tags(&self) -> Vec<GameplayTag> {
        self.active_layers.iter().map(|layer| layer.layer_tag().clone()).collect()
    }

    pub fn active_layer_summaries(&self) -> Vec<ActiveLayerSummary> {
        self.active_layers.iter().map(ActiveInputLayer::summary).collect()
    }

    pub fn active_layers(&self) -> &[ActiveInputLayer] {
        &self.active_layers
    }

    /// Bindings currently registered with the backend, in registration order
    pub fn binding_snapshot(&self) -> &[InputBindingKey] {
        &self.cached_binding_order
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.dispatch
    }
}

impl BufferedInputSink for InputRouter {
    /// Replays a flushed event through the buffered-input path
    fn dispatch_buffered_event(&mut self, event: &BufferedInputEvent) {
        self.route_input(&event.action, event.trigger_event, event.value, true);
    }
}

impl Drop for InputRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn join_tags(tags: &[GameplayTag]) -> String {
    tags.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}
