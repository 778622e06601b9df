//! Value types shared by the whole router
//!
//! Actions, gameplay tags, mapping contexts and trigger events are opaque
//! identifiers owned by the embedding engine. The router only compares,
//! hashes and orders them.
//!
//! ```text
//! InputActionId ─┐
//!                ├──► InputBindingKey ──► one engine binding per distinct key
//! TriggerEvent ──┘
//! ```

pub mod device;
pub mod gate;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Hierarchical gameplay tag (`Input.Layer.Combat`)
///
/// An empty tag is the "invalid" tag and never matches anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameplayTag(String);

impl GameplayTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The invalid tag
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact match; invalid tags never match
    pub fn matches_exact(&self, other: &GameplayTag) -> bool {
        self.is_valid() && self.0 == other.0
    }

    /// Hierarchical match: `Input.Buffer.Channel.Execution` matches `Input.Buffer`
    pub fn matches(&self, parent: &GameplayTag) -> bool {
        if !self.is_valid() || !parent.is_valid() {
            return false;
        }
        self.0 == parent.0
            || (self.0.starts_with(parent.as_str())
                && self.0.as_bytes().get(parent.0.len()) == Some(&b'.'))
    }
}

impl Display for GameplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "None")
        }
    }
}

impl From<&str> for GameplayTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of an abstract input action (`IA_Jump`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputActionId(String);

impl InputActionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for InputActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InputActionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Reference to an engine-side input mapping context (`IMC_Combat`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingContextRef(String);

impl MappingContextRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for MappingContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MappingContextRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Phase of an action's lifecycle
///
/// Discriminants follow the engine's bit values; the derived ordering is the
/// numeric one, which is what binding sorting relies on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    #[default]
    None = 0,
    Triggered = 1,
    Started = 2,
    Ongoing = 4,
    Canceled = 8,
    Completed = 16,
}

impl TriggerEvent {
    pub fn is_bindable(self) -> bool {
        self != TriggerEvent::None
    }
}

impl Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerEvent::None => "None",
            TriggerEvent::Triggered => "Triggered",
            TriggerEvent::Started => "Started",
            TriggerEvent::Ongoing => "Ongoing",
            TriggerEvent::Canceled => "Canceled",
            TriggerEvent::Completed => "Completed",
        };
        write!(f, "{}", name)
    }
}

/// Value carried by an action event
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputActionValue {
    Bool(bool),
    Axis1d(f32),
    Axis2d([f32; 2]),
    Axis3d([f32; 3]),
}

impl Default for InputActionValue {
    fn default() -> Self {
        InputActionValue::Bool(false)
    }
}

/// (action, trigger event) pair the router registers with the engine
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputBindingKey {
    pub action: InputActionId,
    pub trigger_event: TriggerEvent,
}

impl InputBindingKey {
    pub fn new(action: impl Into<InputActionId>, trigger_event: TriggerEvent) -> Self {
        Self {
            action: action.into(),
            trigger_event,
        }
    }
}

impl Display for InputBindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.action, self.trigger_event)
    }
}

/// Live action event as delivered by the engine callback
#[derive(Clone, Debug, PartialEq)]
pub struct InputActionInstance {
    pub action: InputActionId,
    pub trigger_event: TriggerEvent,
    pub value: InputActionValue,
}

impl InputActionInstance {
    pub fn new(
        action: impl Into<InputActionId>,
        trigger_event: TriggerEvent,
        value: InputActionValue,
    ) -> Self {
        Self {
            action: action.into(),
            trigger_event,
            value,
        }
    }

    pub fn binding_key(&self) -> InputBindingKey {
        InputBindingKey {
            action: self.action.clone(),
            trigger_event: self.trigger_event,
        }
    }
}
