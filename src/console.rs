//! Text dump of the router state for consoles and the CLI

use crate::layer::ActiveLayerSummary;
use crate::router::InputRouter;

/// Layers, buffers and bindings, one line each
pub fn dump_lines(router: &InputRouter) -> Vec<String> {
    let summaries = router.active_layer_summaries();
    let mut lines = Vec::with_capacity(summaries.len() + 3);

    lines.push(format!("Layers={}", summaries.len()));
    lines.extend(summaries.iter().map(layer_line));

    let top = router.top_buffer_channel().unwrap_or_default();
    let open = router
        .open_buffer_channels()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    lines.push(format!("  Buffers: Top={} Open=[{}]", top, open));

    let bindings = router.binding_snapshot();
    let joined = bindings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    lines.push(format!("  Bindings ({}): {}", bindings.len(), joined));

    lines
}

fn layer_line(summary: &ActiveLayerSummary) -> String {
    format!(
        "  Tag={} Priority={} Block={} Consume={} Contexts={} Handlers={}",
        summary.layer_tag,
        summary.priority,
        summary.blocks_lower_priority_layers,
        summary.consume_policy,
        summary.mapping_context_count,
        summary.handler_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{GameplayTag, TriggerEvent};
    use crate::buffer::InputBuffer;
    use crate::handler::{HandlerInterest, PassiveHandler};
    use crate::layer::{ConsumePolicy, InputLayerAsset};
    use crate::router::backend::RecordingBackend;
    use std::sync::Arc;

    #[test]
    fn empty_router() {
        let router = InputRouter::default();
        assert_eq!(
            dump_lines(&router),
            vec!["Layers=0", "  Buffers: Top=None Open=[]", "  Bindings (0): "]
        );
    }

    #[test]
    fn populated_router() {
        let mut router = InputRouter::default()
            .with_backend(RecordingBackend::new(1))
            .with_buffer(InputBuffer::default());
        router.push_layer(Arc::new(
            InputLayerAsset::new("Input.Layer.Menu", 10)
                .with_consume_policy(ConsumePolicy::ConsumeAllMatches)
                .blocking_lower_priority()
                .with_mapping_context("IMC_Menu")
                .with_handler(PassiveHandler::new(HandlerInterest::new(
                    ["IA_Back"],
                    [TriggerEvent::Started, TriggerEvent::Completed],
                ))),
        ));
        router.open_input_buffer(GameplayTag::new("Input.Buffer.Channel.Execution"));

        assert_eq!(
            dump_lines(&router),
            vec![
                "Layers=1",
                "  Tag=Input.Layer.Menu Priority=10 Block=true Consume=ConsumeAllMatches Contexts=1 Handlers=1",
                "  Buffers: Top=Input.Buffer.Channel.Execution Open=[Input.Buffer.Channel.Execution]",
                "  Bindings (2): IA_Back:Started,IA_Back:Completed",
            ]
        );
    }
}
