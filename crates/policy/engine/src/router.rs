//! Event router: static wiring tables
//!
//! Built once at activation from every block's declared event wiring.
//! Lookup preserves insertion order — the order targets were wired is
//! the policy author's intended sequencing and delivery follows it.
//! The delivery loop itself lives on the runtime, which resolves each
//! target's behavior.

use policy_types::{BlockConfig, BlockId, OutputEvent};
use std::collections::HashMap;

/// Output-event wiring for a whole policy
#[derive(Debug, Default)]
pub struct EventRouter {
    wires: HashMap<(BlockId, OutputEvent), Vec<BlockId>>,
}

impl EventRouter {
    /// Build the wiring tables from block configuration
    pub fn build<'a>(blocks: impl Iterator<Item = &'a BlockConfig>) -> Self {
        let mut wires: HashMap<(BlockId, OutputEvent), Vec<BlockId>> = HashMap::new();
        for block in blocks {
            for wire in &block.event_wiring {
                wires
                    .entry((block.id.clone(), wire.event))
                    .or_default()
                    .extend(wire.targets.iter().cloned());
            }
        }
        Self { wires }
    }

    /// Targets wired to a source's output event, in wiring order.
    /// An empty slice means the event is terminal.
    pub fn targets(&self, source: &BlockId, event: OutputEvent) -> &[BlockId] {
        self.wires
            .get(&(source.clone(), event))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct (source, event) wires
    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_preserve_wiring_order() {
        let blocks = vec![BlockConfig::new("request", "requestDocument").with_wire(
            OutputEvent::Run,
            vec![BlockId::new("a"), BlockId::new("b"), BlockId::new("c")],
        )];
        let router = EventRouter::build(blocks.iter());

        let targets = router.targets(&BlockId::new("request"), OutputEvent::Run);
        assert_eq!(
            targets,
            &[BlockId::new("a"), BlockId::new("b"), BlockId::new("c")]
        );
    }

    #[test]
    fn test_unwired_event_is_terminal() {
        let blocks = vec![BlockConfig::new("request", "requestDocument")];
        let router = EventRouter::build(blocks.iter());
        assert!(router
            .targets(&BlockId::new("request"), OutputEvent::Refresh)
            .is_empty());
    }

    #[test]
    fn test_split_wires_for_same_event_concatenate() {
        let blocks = vec![BlockConfig::new("request", "requestDocument")
            .with_wire(OutputEvent::Run, vec![BlockId::new("a")])
            .with_wire(OutputEvent::Run, vec![BlockId::new("b")])];
        let router = EventRouter::build(blocks.iter());
        assert_eq!(
            router.targets(&BlockId::new("request"), OutputEvent::Run),
            &[BlockId::new("a"), BlockId::new("b")]
        );
    }
}
