//! Input layers
//!
//! An [`InputLayerAsset`] is immutable author-time data: priority, consume
//! policy, mapping contexts and handler templates. Pushing it onto the router
//! produces an [`ActiveInputLayer`] with its own runtime handlers.

pub mod loader;
pub mod registry;

pub use registry::InputLayerRegistry;

use crate::binding::{GameplayTag, InputActionId, MappingContextRef, TriggerEvent};
use crate::error::RegistryError;
use crate::handler::{HandlerContext, HandlerTemplate, InputHandler};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// When dispatch stops looking at lower-priority layers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumePolicy {
    /// Never stops on its own
    None,
    /// Stops once any handler of the layer handled the event
    #[default]
    ConsumeHandled,
    /// Stops after this layer, matched or not
    ConsumeAllMatches,
}

impl Display for ConsumePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumePolicy::None => write!(f, "None"),
            ConsumePolicy::ConsumeHandled => write!(f, "ConsumeHandled"),
            ConsumePolicy::ConsumeAllMatches => write!(f, "ConsumeAllMatches"),
        }
    }
}

/// Author-time layer definition
#[derive(Debug)]
pub struct InputLayerAsset {
    pub layer_tag: GameplayTag,
    pub priority: i32,
    pub mapping_contexts: Vec<MappingContextRef>,
    pub handler_templates: Vec<Box<dyn InputHandler>>,
    pub blocks_lower_priority_layers: bool,
    pub consume_policy: ConsumePolicy,
}

impl InputLayerAsset {
    pub fn new(layer_tag: impl Into<GameplayTag>, priority: i32) -> Self {
        Self {
            layer_tag: layer_tag.into(),
            priority,
            mapping_contexts: Vec::new(),
            handler_templates: Vec::new(),
            blocks_lower_priority_layers: false,
            consume_policy: ConsumePolicy::default(),
        }
    }

    pub fn with_consume_policy(mut self, policy: ConsumePolicy) -> Self {
        self.consume_policy = policy;
        self
    }

    pub fn blocking_lower_priority(mut self) -> Self {
        self.blocks_lower_priority_layers = true;
        self
    }

    pub fn with_mapping_context(mut self, context: impl Into<MappingContextRef>) -> Self {
        self.mapping_contexts.push(context.into());
        self
    }

    pub fn with_handler(mut self, handler: impl InputHandler) -> Self {
        self.handler_templates.push(Box::new(handler));
        self
    }

    /// Every (action, events) pair the handler templates are interested in
    pub fn all_bindings(&self) -> BTreeMap<InputActionId, BTreeSet<TriggerEvent>> {
        let mut bindings: BTreeMap<InputActionId, BTreeSet<TriggerEvent>> = BTreeMap::new();
        for template in &self.handler_templates {
            let interest = template.interest();
            for action in &interest.interested_actions {
                bindings
                    .entry(action.clone())
                    .or_default()
                    .extend(interest.interested_events.iter().copied());
            }
        }
        bindings
    }

    /// Reads an asset file from disk
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, RegistryError> {
        let file: LayerAssetFile = toml::from_str(content).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        file.into_asset()
    }
}

/// On-disk representation of a layer asset
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerAssetFile {
    pub tag: GameplayTag,
    pub priority: i32,
    pub blocks_lower_priority_layers: bool,
    pub consume_policy: ConsumePolicy,
    pub mapping_contexts: Vec<MappingContextRef>,
    pub handlers: Vec<HandlerTemplate>,
}

impl LayerAssetFile {
    pub fn into_asset(self) -> Result<InputLayerAsset, RegistryError> {
        let handler_templates = self
            .handlers
            .iter()
            .map(HandlerTemplate::create_handler)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InputLayerAsset {
            layer_tag: self.tag,
            priority: self.priority,
            mapping_contexts: self.mapping_contexts,
            handler_templates,
            blocks_lower_priority_layers: self.blocks_lower_priority_layers,
            consume_policy: self.consume_policy,
        })
    }
}

/// Runtime record of a pushed layer
#[derive(Debug)]
pub struct ActiveInputLayer {
    pub layer_asset: Arc<InputLayerAsset>,
    pub priority: i32,
    pub blocks_lower_priority_layers: bool,
    pub consume_policy: ConsumePolicy,
    pub applied_contexts: Vec<MappingContextRef>,
    pub runtime_handlers: Vec<Box<dyn InputHandler>>,
}

impl ActiveInputLayer {
    /// Copies the asset settings and activates one duplicate per handler template
    pub fn instantiate(layer_asset: Arc<InputLayerAsset>, ctx: &mut HandlerContext<'_>) -> Self {
        let runtime_handlers = layer_asset
            .handler_templates
            .iter()
            .map(|template| {
                let mut handler = template.duplicate();
                handler.on_activated(ctx);
                handler
            })
            .collect::<Vec<_>>();

        debug!(
            "Instantiated layer {} with {} handlers",
            layer_asset.layer_tag,
            runtime_handlers.len()
        );

        Self {
            priority: layer_asset.priority,
            blocks_lower_priority_layers: layer_asset.blocks_lower_priority_layers,
            consume_policy: layer_asset.consume_policy,
            applied_contexts: layer_asset.mapping_contexts.clone(),
            runtime_handlers,
            layer_asset,
        }
    }

    pub fn layer_tag(&self) -> &GameplayTag {
        &self.layer_asset.layer_tag
    }

    pub fn deactivate(&mut self, ctx: &mut HandlerContext<'_>) {
        for handler in &mut self.runtime_handlers {
            handler.on_deactivated(ctx);
        }
    }

    pub fn summary(&self) -> ActiveLayerSummary {
        ActiveLayerSummary {
            layer_tag: self.layer_tag().clone(),
            priority: self.priority,
            blocks_lower_priority_layers: self.blocks_lower_priority_layers,
            consume_policy: self.consume_policy,
            mapping_context_count: self.applied_contexts.len(),
            handler_count: self.runtime_handlers.len(),
        }
    }
}

/// Debug view of an active layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveLayerSummary {
    pub layer_tag: GameplayTag,
    pub priority: i32,
    pub blocks_lower_priority_layers: bool,
    pub consume_policy: ConsumePolicy,
    pub mapping_context_count: usize,
    pub handler_count: usize,
}
