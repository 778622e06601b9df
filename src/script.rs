//! Scripted input sessions
//!
//! A script is a TOML list of `[[step]]` tables, each with an `op` field:
//!
//! ```toml
//! [[step]]
//! op = "push"
//! layer = "Input.Layer.Combat"
//!
//! [[step]]
//! op = "input"
//! action = "IA_Attack"
//! event = "triggered"
//! ```
//!
//! Used by the `replay` command to drive a router without an engine.

use crate::binding::device::InputKey;
use crate::binding::{GameplayTag, InputActionId, InputActionInstance, InputActionValue, TriggerEvent};
use crate::console;
use crate::error::ScriptError;
use crate::layer::InputLayerRegistry;
use crate::router::InputRouter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

fn default_flush() -> bool {
    true
}

fn default_value() -> InputActionValue {
    InputActionValue::Bool(true)
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Push a registered layer by tag
    Push { layer: GameplayTag },
    Pop { layer: GameplayTag },
    Clear,
    Open { channel: GameplayTag },
    Close {
        channel: GameplayTag,
        #[serde(default = "default_flush")]
        flush: bool,
    },
    /// Engine action event; ignored unless currently bound
    Input {
        action: InputActionId,
        event: TriggerEvent,
        #[serde(default = "default_value")]
        value: InputActionValue,
    },
    /// Raw key press, feeds device tracking
    Key { name: String },
    Refresh,
    Tick { seconds: f32 },
    /// Waits until all pending async layer loads have landed
    Wait,
    Dump,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Script {
    #[serde(rename = "step", default)]
    pub steps: Vec<ScriptStep>,
}

impl Script {
    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ScriptError> {
        toml::from_str(content).map_err(|source| ScriptError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Frame delta of a `tick` step; out-of-range values tick by zero
fn tick_delta(seconds: f32) -> Duration {
    Duration::try_from_secs_f32(seconds.max(0.0)).unwrap_or_else(|_| {
        warn!("Tick of {} seconds out of range, ticking by zero", seconds);
        Duration::ZERO
    })
}

/// Applies `script` step by step and returns the lines of every `dump` step
pub async fn run_script(
    router: &mut InputRouter,
    registry: &mut InputLayerRegistry,
    script: &Script,
) -> Vec<String> {
    let mut output = Vec::new();

    for (index, step) in script.steps.iter().enumerate() {
        debug!("Step {}: {:?}", index, step);
        match step {
            ScriptStep::Push { layer } => router.push_layer_by_tag(registry, layer),
            ScriptStep::Pop { layer } => router.pop_layer_by_tag(layer),
            ScriptStep::Clear => router.clear_all_layers(),
            ScriptStep::Open { channel } => router.open_input_buffer(channel.clone()),
            ScriptStep::Close { channel, flush } => router.close_input_buffer(channel, *flush),
            ScriptStep::Input {
                action,
                event,
                value,
            } => router.on_action_event(&InputActionInstance::new(action.clone(), *event, *value)),
            ScriptStep::Key { name } => router.notify_key_input(&InputKey::from_name(name)),
            ScriptStep::Refresh => router.refresh_router(),
            ScriptStep::Tick { seconds } => router.tick(tick_delta(*seconds)),
            ScriptStep::Wait => {
                registry.wait_for_pending().await;
                info!("Pending layer loads finished");
            }
            ScriptStep::Dump => output.extend(console::dump_lines(router)),
        }
    }

    output
}
