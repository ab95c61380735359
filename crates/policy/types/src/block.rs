//! Block configuration: one node of the policy tree
//!
//! A `BlockConfig` is static — fixed when the policy is activated.
//! The tree is acyclic, every non-root block has exactly one parent,
//! and identifiers are unique within a policy. Those invariants are
//! enforced when the engine builds the runtime tree, not here.

use crate::{BlockId, OutputEvent};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of a block's static event wiring: an output event type
/// and the ordered blocks it is delivered to. An empty target list
/// means the event is terminal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventWire {
    /// The output event this wire carries
    pub event: OutputEvent,
    /// Delivery targets, in the policy author's intended order
    pub targets: Vec<BlockId>,
}

impl EventWire {
    pub fn new(event: OutputEvent, targets: Vec<BlockId>) -> Self {
        Self { event, targets }
    }
}

/// Static configuration of a single block instance
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Unique identifier within the policy
    pub id: BlockId,
    /// Type tag resolved against the behavior registry
    pub block_type: String,
    /// Author-facing label, referenced by other blocks' options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Type-erased static options
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    /// Ordered child blocks; the parent owns them exclusively
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BlockId>,
    /// Output event → ordered delivery targets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_wiring: Vec<EventWire>,
}

impl BlockConfig {
    pub fn new(id: impl Into<String>, block_type: impl Into<String>) -> Self {
        Self {
            id: BlockId::new(id),
            block_type: block_type.into(),
            tag: None,
            options: Map::new(),
            children: Vec::new(),
            event_wiring: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    pub fn with_child(mut self, child: BlockId) -> Self {
        self.children.push(child);
        self
    }

    /// Wire an output event to targets, preserving wiring order
    pub fn with_wire(mut self, event: OutputEvent, targets: Vec<BlockId>) -> Self {
        self.event_wiring.push(EventWire::new(event, targets));
        self
    }

    /// Get a raw option value by name
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// Get a string option by name
    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(Value::as_str)
    }

    /// Deserialize the options map into a typed configuration struct.
    ///
    /// Unrecognized fields are ignored; this is the typed view over
    /// the generic options bag.
    pub fn options_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.options.clone()))
    }

    /// Targets wired to an output event, in wiring order
    pub fn wired_targets(&self, event: OutputEvent) -> &[BlockId] {
        self.event_wiring
            .iter()
            .find(|w| w.event == event)
            .map(|w| w.targets.as_slice())
            .unwrap_or(&[])
    }

    /// All output events this block wires anywhere
    pub fn wired_events(&self) -> impl Iterator<Item = OutputEvent> + '_ {
        self.event_wiring.iter().map(|w| w.event)
    }
}
