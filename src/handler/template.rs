//! Serializable handler templates
//!
//! Layer asset files describe handlers declaratively; a template validates
//! itself and builds the concrete handler, the same way mapping configs build
//! their strategies.

use super::{BroadcastIntentHandler, HandlerInterest, InputHandler, PassiveHandler};
use crate::binding::{GameplayTag, InputActionId, TriggerEvent};
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Built-in handler kinds available to asset files
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    #[default]
    Passive,
    BroadcastIntent,
}

/// One `[[handlers]]` entry of a layer asset file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerTemplate {
    pub kind: HandlerKind,
    /// Intent tag, required for `broadcast_intent`
    pub intent: Option<GameplayTag>,
    pub actions: HashSet<InputActionId>,
    pub events: HashSet<TriggerEvent>,
    pub allow_buffering: bool,
    pub buffer_channel: Option<GameplayTag>,
}

impl HandlerTemplate {
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.kind == HandlerKind::BroadcastIntent
            && !self.intent.as_ref().is_some_and(GameplayTag::is_valid)
        {
            return Err(RegistryError::InvalidTemplate(
                "broadcast_intent handler without intent tag".to_string(),
            ));
        }

        if self.allow_buffering && !self.buffer_channel.as_ref().is_some_and(GameplayTag::is_valid) {
            return Err(RegistryError::InvalidTemplate(
                "buffering enabled without buffer_channel".to_string(),
            ));
        }

        Ok(())
    }

    fn interest(&self) -> HandlerInterest {
        HandlerInterest {
            interested_actions: self.actions.clone(),
            interested_events: self.events.clone(),
            allow_buffering: self.allow_buffering,
            buffer_channel: self.buffer_channel.clone().unwrap_or_default(),
        }
    }

    pub fn create_handler(&self) -> Result<Box<dyn InputHandler>, RegistryError> {
        self.validate()?;

        let handler: Box<dyn InputHandler> = match self.kind {
            HandlerKind::Passive => Box::new(PassiveHandler::new(self.interest())),
            HandlerKind::BroadcastIntent => Box::new(BroadcastIntentHandler::new(
                self.interest(),
                self.intent.clone().unwrap_or_default(),
            )),
        };
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_template_builds_handler() {
        let template: HandlerTemplate = toml::from_str(
            r#"
            kind = "broadcast_intent"
            intent = "Intent.Attack"
            actions = ["IA_Attack"]
            events = ["triggered"]
            allow_buffering = true
            buffer_channel = "Input.Buffer.Channel.Execution"
            "#,
        )
        .unwrap();

        let handler = template.create_handler().unwrap();
        assert_eq!(handler.name(), "BroadcastIntentHandler");
        assert!(handler.can_handle(&InputActionId::new("IA_Attack"), TriggerEvent::Triggered));
        assert!(handler.should_buffer(
            &InputActionId::new("IA_Attack"),
            TriggerEvent::Triggered,
            &GameplayTag::new("Input.Buffer.Channel.Execution"),
        ));
    }

    #[test]
    fn broadcast_template_needs_intent() {
        let template = HandlerTemplate {
            kind: HandlerKind::BroadcastIntent,
            ..Default::default()
        };
        assert!(matches!(
            template.create_handler(),
            Err(RegistryError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn buffering_template_needs_channel() {
        let template = HandlerTemplate {
            allow_buffering: true,
            ..Default::default()
        };
        assert!(template.validate().is_err());
    }
}
