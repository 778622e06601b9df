//! Dispatch table derived from the active layer stack

use crate::binding::{InputBindingKey, TriggerEvent};
use crate::layer::{ActiveInputLayer, ConsumePolicy};
use std::collections::BTreeSet;

/// One runtime handler, addressed by position in the active layer stack
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchEntry {
    pub layer_index: usize,
    pub handler_index: usize,
}

/// Contiguous `entries[start..end]` range belonging to one layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchLayerInfo {
    pub start: usize,
    pub end: usize,
    pub consume_policy: ConsumePolicy,
    pub blocks_lower_priority_layers: bool,
}

impl DispatchLayerInfo {
    /// Whether dispatch ends after this layer
    ///
    /// `ConsumeAllMatches` stops even when no handler of the layer matched.
    pub fn stops_propagation(&self, layer_handled: bool) -> bool {
        if self.consume_policy == ConsumePolicy::ConsumeAllMatches {
            return true;
        }
        layer_handled
            && (self.consume_policy == ConsumePolicy::ConsumeHandled || self.blocks_lower_priority_layers)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchTable {
    pub entries: Vec<DispatchEntry>,
    pub layers: Vec<DispatchLayerInfo>,
}

impl DispatchTable {
    /// `layers` must be the prefix returned by [`layers_to_apply`]
    pub fn build(layers: &[ActiveInputLayer]) -> Self {
        let mut table = DispatchTable::default();

        for (layer_index, layer) in layers.iter().enumerate() {
            let start = table.entries.len();
            table.entries.extend(
                (0..layer.runtime_handlers.len()).map(|handler_index| DispatchEntry {
                    layer_index,
                    handler_index,
                }),
            );
            table.layers.push(DispatchLayerInfo {
                start,
                end: table.entries.len(),
                consume_policy: layer.consume_policy,
                blocks_lower_priority_layers: layer.blocks_lower_priority_layers,
            });
        }

        table
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.layers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Length of the stack prefix that receives input: up to and including the first blocking layer
pub fn layers_to_apply(active_layers: &[ActiveInputLayer]) -> usize {
    active_layers
        .iter()
        .position(|layer| layer.blocks_lower_priority_layers)
        .map_or(active_layers.len(), |blocking| blocking + 1)
}

/// Deduplicated bindings of `layers`, ordered by action name then event value
pub fn collect_bindings(layers: &[ActiveInputLayer]) -> Vec<InputBindingKey> {
    let mut unique = BTreeSet::new();
    for layer in layers {
        for (action, events) in layer.layer_asset.all_bindings() {
            for event in events {
                if event == TriggerEvent::None {
                    continue;
                }
                unique.insert(InputBindingKey::new(action.clone(), event));
            }
        }
    }
    unique.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::device::InputDevice;
    use crate::handler::{HandlerContext, HandlerInterest, PassiveHandler};
    use crate::layer::InputLayerAsset;
    use std::sync::Arc;

    fn active(asset: InputLayerAsset) -> ActiveInputLayer {
        let mut intents = Vec::new();
        let mut ctx = HandlerContext::new(&mut intents, InputDevice::Unknown);
        ActiveInputLayer::instantiate(Arc::new(asset), &mut ctx)
    }

    fn passive(actions: &[&str], events: &[TriggerEvent]) -> PassiveHandler {
        PassiveHandler::new(HandlerInterest::new(
            actions.iter().copied(),
            events.iter().copied(),
        ))
    }

    #[test]
    fn prefix_stops_at_first_blocking_layer() {
        let layers = vec![
            active(InputLayerAsset::new("L.High", 10)),
            active(InputLayerAsset::new("L.Block", 5).blocking_lower_priority()),
            active(InputLayerAsset::new("L.Low", 1)),
        ];
        assert_eq!(layers_to_apply(&layers), 2);
        assert_eq!(layers_to_apply(&layers[2..]), 1);
        assert_eq!(layers_to_apply(&[]), 0);
    }

    #[test]
    fn table_ranges_are_contiguous() {
        let layers = vec![
            active(
                InputLayerAsset::new("L.A", 2)
                    .with_handler(passive(&["IA_A"], &[TriggerEvent::Started]))
                    .with_handler(passive(&["IA_B"], &[TriggerEvent::Started])),
            ),
            active(InputLayerAsset::new("L.Empty", 1)),
            active(InputLayerAsset::new("L.C", 0).with_handler(passive(&["IA_C"], &[TriggerEvent::Started]))),
        ];

        let table = DispatchTable::build(&layers);
        let ranges: Vec<_> = table.layers.iter().map(|l| (l.start, l.end)).collect();
        assert_eq!(ranges, vec![(0, 2), (2, 2), (2, 3)]);
        assert_eq!(
            table.entries[2],
            DispatchEntry {
                layer_index: 2,
                handler_index: 0
            }
        );
    }

    #[test]
    fn bindings_are_deduplicated_and_skip_none() {
        let layers = vec![
            active(
                InputLayerAsset::new("L.A", 2)
                    .with_handler(passive(&["IA_Jump"], &[TriggerEvent::Triggered, TriggerEvent::None])),
            ),
            active(
                InputLayerAsset::new("L.B", 1)
                    .with_handler(passive(&["IA_Jump", "IA_Attack"], &[TriggerEvent::Triggered])),
            ),
        ];

        let keys: Vec<String> = collect_bindings(&layers).iter().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["IA_Attack:Triggered", "IA_Jump:Triggered"]);
    }

    #[test]
    fn consume_rules() {
        let info = |consume_policy, blocks_lower_priority_layers| DispatchLayerInfo {
            start: 0,
            end: 0,
            consume_policy,
            blocks_lower_priority_layers,
        };

        assert!(info(ConsumePolicy::ConsumeAllMatches, false).stops_propagation(false));
        assert!(info(ConsumePolicy::ConsumeHandled, false).stops_propagation(true));
        assert!(!info(ConsumePolicy::ConsumeHandled, false).stops_propagation(false));
        assert!(!info(ConsumePolicy::None, false).stops_propagation(true));
        assert!(info(ConsumePolicy::None, true).stops_propagation(true));
        assert!(!info(ConsumePolicy::None, true).stops_propagation(false));
    }
}
