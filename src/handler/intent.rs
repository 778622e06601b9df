//! Built-in handlers

use super::{HandlerContext, HandlerInterest, InputHandler};
use crate::binding::{GameplayTag, InputActionId, InputActionInstance, InputActionValue, TriggerEvent};
use tracing::debug;

/// Base handler: matches its interest and swallows the event
///
/// Useful to make a layer consume actions without reacting to them.
#[derive(Clone, Debug, Default)]
pub struct PassiveHandler {
    interest: HandlerInterest,
}

impl PassiveHandler {
    pub fn new(interest: HandlerInterest) -> Self {
        Self { interest }
    }
}

impl InputHandler for PassiveHandler {
    fn interest(&self) -> &HandlerInterest {
        &self.interest
    }

    fn duplicate(&self) -> Box<dyn InputHandler> {
        Box::new(self.clone())
    }

    fn name(&self) -> &str {
        "PassiveHandler"
    }
}

/// Tag-broadcasting handler
///
/// Translates matching actions into an intent tag that gameplay systems listen
/// for, both for live and replayed input.
#[derive(Clone, Debug)]
pub struct BroadcastIntentHandler {
    interest: HandlerInterest,
    intent_tag: GameplayTag,
}

impl BroadcastIntentHandler {
    pub fn new(interest: HandlerInterest, intent_tag: impl Into<GameplayTag>) -> Self {
        Self {
            interest,
            intent_tag: intent_tag.into(),
        }
    }

    pub fn intent_tag(&self) -> &GameplayTag {
        &self.intent_tag
    }

    fn emit(&self, ctx: &mut HandlerContext<'_>, event: TriggerEvent, value: InputActionValue) {
        if !self.intent_tag.is_valid() {
            return;
        }
        debug!("Broadcasting intent {} ({})", self.intent_tag, event);
        ctx.broadcast_intent(self.intent_tag.clone(), event, value);
    }
}

impl InputHandler for BroadcastIntentHandler {
    fn interest(&self) -> &HandlerInterest {
        &self.interest
    }

    fn duplicate(&self) -> Box<dyn InputHandler> {
        Box::new(self.clone())
    }

    fn name(&self) -> &str {
        "BroadcastIntentHandler"
    }

    fn handle_input(&mut self, ctx: &mut HandlerContext<'_>, instance: &InputActionInstance) {
        self.emit(ctx, instance.trigger_event, instance.value);
    }

    fn handle_buffered_input(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        _action: &InputActionId,
        event: TriggerEvent,
        value: InputActionValue,
    ) {
        self.emit(ctx, event, value);
    }
}
