//! Input handlers
//!
//! A handler declares which (action, trigger event) pairs it is interested in
//! and reacts to live or replayed input. Layer assets carry handler
//! *templates*; the router duplicates every template when a layer is pushed so
//! runtime state never leaks between activations.
//!
//! ```text
//! InputLayerAsset.handler_templates ──duplicate()──► ActiveInputLayer.runtime_handlers
//!                                                          │
//!                                         on_activated / handle_input / on_deactivated
//! ```

pub mod intent;
pub mod template;

pub use intent::{BroadcastIntentHandler, PassiveHandler};
pub use template::{HandlerKind, HandlerTemplate};

use crate::binding::device::InputDevice;
use crate::binding::{GameplayTag, InputActionId, InputActionInstance, InputActionValue, TriggerEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Interest and buffering declaration shared by all handlers
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerInterest {
    pub interested_actions: HashSet<InputActionId>,
    pub interested_events: HashSet<TriggerEvent>,
    pub allow_buffering: bool,
    pub buffer_channel: GameplayTag,
}

impl HandlerInterest {
    pub fn new<A, E>(actions: A, events: E) -> Self
    where
        A: IntoIterator,
        A::Item: Into<InputActionId>,
        E: IntoIterator<Item = TriggerEvent>,
    {
        Self {
            interested_actions: actions.into_iter().map(Into::into).collect(),
            interested_events: events.into_iter().collect(),
            allow_buffering: false,
            buffer_channel: GameplayTag::none(),
        }
    }

    /// Opts into buffering while `channel` is the top open channel
    pub fn buffered_on(mut self, channel: impl Into<GameplayTag>) -> Self {
        self.allow_buffering = true;
        self.buffer_channel = channel.into();
        self
    }

    /// Both sets must contain the value; empty sets never match
    pub fn is_interested(&self, action: &InputActionId, event: TriggerEvent) -> bool {
        self.interested_actions.contains(action) && self.interested_events.contains(&event)
    }

    pub fn buffers_on(&self, channel: &GameplayTag) -> bool {
        self.allow_buffering && self.buffer_channel.matches_exact(channel)
    }
}

/// Intent broadcast by a handler or the router
#[derive(Clone, Debug, PartialEq)]
pub struct InputIntentEvent {
    pub intent_tag: GameplayTag,
    pub trigger_event: TriggerEvent,
    pub value: InputActionValue,
}

/// Receives intents until every sender is gone, returns how many arrived
///
/// A receiver that falls behind skips the overwritten intents and keeps going.
pub async fn drain_intents(
    mut intents: broadcast::Receiver<InputIntentEvent>,
    mut on_intent: impl FnMut(&InputIntentEvent),
) -> usize {
    let mut count = 0;
    loop {
        match intents.recv().await {
            Ok(intent) => {
                on_intent(&intent);
                count += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Intent receiver lagged, {} intents skipped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    count
}

/// What a handler may touch while it runs
///
/// Intents are collected here and published by the router once the current
/// dispatch has finished.
#[derive(Debug)]
pub struct HandlerContext<'a> {
    intents: &'a mut Vec<InputIntentEvent>,
    last_device: InputDevice,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(intents: &'a mut Vec<InputIntentEvent>, last_device: InputDevice) -> Self {
        Self {
            intents,
            last_device,
        }
    }

    pub fn broadcast_intent(
        &mut self,
        intent_tag: GameplayTag,
        trigger_event: TriggerEvent,
        value: InputActionValue,
    ) {
        self.intents.push(InputIntentEvent {
            intent_tag,
            trigger_event,
            value,
        });
    }

    pub fn last_device(&self) -> InputDevice {
        self.last_device
    }
}

/// Trait for everything that can sit in a layer's dispatch range
///
/// All hooks default to no-ops; a handler only needs to declare its interest
/// and how to duplicate itself.
pub trait InputHandler: Debug + Send + Sync + 'static {
    fn interest(&self) -> &HandlerInterest;

    /// Clone used to turn a template into a runtime instance
    fn duplicate(&self) -> Box<dyn InputHandler>;

    fn name(&self) -> &str {
        "InputHandler"
    }

    fn can_handle(&self, action: &InputActionId, event: TriggerEvent) -> bool {
        self.interest().is_interested(action, event)
    }

    /// Whether a live event should be captured while `open_channel` is on top
    fn should_buffer(
        &self,
        action: &InputActionId,
        event: TriggerEvent,
        open_channel: &GameplayTag,
    ) -> bool {
        self.interest().buffers_on(open_channel) && self.can_handle(action, event)
    }

    fn buffer_channel(&self) -> &GameplayTag {
        &self.interest().buffer_channel
    }

    fn on_activated(&mut self, _ctx: &mut HandlerContext<'_>) {}

    fn on_deactivated(&mut self, _ctx: &mut HandlerContext<'_>) {}

    fn handle_input(&mut self, _ctx: &mut HandlerContext<'_>, _instance: &InputActionInstance) {}

    fn handle_buffered_input(
        &mut self,
        _ctx: &mut HandlerContext<'_>,
        _action: &InputActionId,
        _event: TriggerEvent,
        _value: InputActionValue,
    ) {
    }
}
