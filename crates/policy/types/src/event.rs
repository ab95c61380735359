//! The event model: typed signals connecting blocks
//!
//! Blocks never call each other directly. A block completes an action,
//! declares zero or more output events, and the router delivers each
//! event to every block wired to that output — in wiring order, which
//! is the policy author's intended sequencing.

use crate::{BlockId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types a block may declare as inputs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputEvent {
    /// Run the block's main action for the acting user
    #[serde(rename = "RunEvent")]
    Run,
    /// Re-render externally visible state (no document work)
    #[serde(rename = "RefreshEvent")]
    Refresh,
    /// Restore a previously captured document into the block's form
    #[serde(rename = "RestoreEvent")]
    Restore,
    /// Release a held document downstream
    #[serde(rename = "ReleaseEvent")]
    Release,
}

/// Event types a block may declare as outputs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputEvent {
    #[serde(rename = "RunEvent")]
    Run,
    #[serde(rename = "RefreshEvent")]
    Refresh,
    #[serde(rename = "RestoreEvent")]
    Restore,
    #[serde(rename = "ReleaseEvent")]
    Release,
}

impl OutputEvent {
    /// The input event type a target block services for this output
    pub fn as_input(self) -> InputEvent {
        match self {
            OutputEvent::Run => InputEvent::Run,
            OutputEvent::Refresh => InputEvent::Refresh,
            OutputEvent::Restore => InputEvent::Restore,
            OutputEvent::Release => InputEvent::Release,
        }
    }
}

impl std::fmt::Display for OutputEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputEvent::Run => "RunEvent",
            OutputEvent::Refresh => "RefreshEvent",
            OutputEvent::Restore => "RestoreEvent",
            OutputEvent::Release => "ReleaseEvent",
        };
        write!(f, "{name}")
    }
}

/// The user a request acts on behalf of
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUser {
    /// Session-scoped user identifier
    pub id: UserId,
    /// The user's decentralized identifier, if one has been issued.
    /// Mutating actions require it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
}

impl PolicyUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            did: None,
        }
    }

    pub fn with_did(mut self, did: impl Into<String>) -> Self {
        self.did = Some(did.into());
        self
    }
}

/// A typed message in flight between blocks.
///
/// Events are transient — never persisted — and self-contained: the
/// receiver must be able to reconstruct intent from the event alone,
/// without reading shared state that may have changed since emission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockEvent {
    /// The output event type the source declared
    pub event: OutputEvent,
    /// The block that emitted the event
    pub source: BlockId,
    /// The acting user
    pub user: PolicyUser,
    /// Optional document payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl BlockEvent {
    pub fn new(event: OutputEvent, source: BlockId, user: PolicyUser) -> Self {
        Self {
            event,
            source,
            user,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Kind of notification pushed to observers outside the policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalEventKind {
    /// A user submitted data through a block
    Set,
    /// A block's main action ran
    Run,
    /// A block's externally visible state changed
    StateChange,
    /// A member left a group managed by the policy
    DeleteMember,
}

/// A fire-and-forget notification for external automation.
///
/// Decoupled from the event router: no delivery guarantee, no ordering
/// contract, never observed by blocks inside the policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub kind: ExternalEventKind,
    pub block_id: BlockId,
    pub block_type: String,
    pub user: Option<UserId>,
    pub emitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ExternalEvent {
    pub fn new(kind: ExternalEventKind, block_id: BlockId, block_type: impl Into<String>) -> Self {
        Self {
            kind,
            block_id,
            block_type: block_type.into(),
            user: None,
            emitted_at: Utc::now(),
            data: None,
        }
    }

    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_names() {
        let run = serde_json::to_string(&OutputEvent::Run).unwrap();
        assert_eq!(run, "\"RunEvent\"");
        let parsed: InputEvent = serde_json::from_str("\"RestoreEvent\"").unwrap();
        assert_eq!(parsed, InputEvent::Restore);
    }

    #[test]
    fn test_output_maps_to_input() {
        assert_eq!(OutputEvent::Run.as_input(), InputEvent::Run);
        assert_eq!(OutputEvent::Refresh.as_input(), InputEvent::Refresh);
    }

    #[test]
    fn test_block_event_payload() {
        let user = PolicyUser::new("u-1").with_did("did:verdant:u-1");
        let event = BlockEvent::new(OutputEvent::Run, BlockId::new("request"), user)
            .with_payload(json!({"amount": 10}));
        assert_eq!(event.payload.unwrap()["amount"], 10);
    }

    #[test]
    fn test_external_event() {
        let ev = ExternalEvent::new(ExternalEventKind::Set, BlockId::new("b"), "requestDocument")
            .with_user(UserId::new("u-1"));
        assert_eq!(ev.kind, ExternalEventKind::Set);
        assert_eq!(ev.user.unwrap(), UserId::new("u-1"));
    }
}
