//! Error types for the policy engine

use crate::{BlockId, OutputEvent};

/// Errors that can occur in policy engine operations.
///
/// Configuration errors are deliberately absent: they never escalate
/// beyond the `ValidationResultContainer` a validation pass fills.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A live user action was rejected. Always tagged with the block
    /// that rejected it; surfaced to the caller as-is.
    #[error("{message} (block type {block_type}, id {block_id})")]
    Action {
        message: String,
        block_type: String,
        block_id: BlockId,
    },

    /// The block's schema is not resolvable yet. Retryable: callers
    /// may repeat the request once the dependency resolves.
    #[error("Waiting for schema (block type {block_type}, id {block_id})")]
    WaitingForSchema {
        block_type: String,
        block_id: BlockId,
    },

    #[error("Block not found: {0}")]
    BlockNotFound(BlockId),

    #[error("Unknown block type: {0}")]
    UnknownBlockType(String),

    #[error("Duplicate block id: {0}")]
    DuplicateBlockId(BlockId),

    #[error("Block {0} has more than one parent")]
    MultipleParents(BlockId),

    #[error("Block {0} is not reachable from the policy root")]
    OrphanBlock(BlockId),

    #[error("Cycle detected in policy tree")]
    CycleDetected,

    #[error("Block {block_id} wires undeclared output event {event}")]
    UndeclaredOutputEvent {
        block_id: BlockId,
        event: OutputEvent,
    },

    #[error("Block {block_id} is wired to receive an event type it does not declare ({event})")]
    UndeclaredInputEvent {
        block_id: BlockId,
        event: OutputEvent,
    },

    #[error("State store lock poisoned")]
    LockPoisoned,
}

impl PolicyError {
    /// Build an action error tagged with the rejecting block
    pub fn action(
        message: impl Into<String>,
        block_type: impl Into<String>,
        block_id: BlockId,
    ) -> Self {
        Self::Action {
            message: message.into(),
            block_type: block_type.into(),
            block_id,
        }
    }

    /// True for preconditions the caller may retry once resolved
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WaitingForSchema { .. })
    }
}

/// Result type alias for policy engine operations
pub type PolicyResult<T> = Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_names_the_block() {
        let err = PolicyError::action("Block not available", "requestDocument", BlockId::new("b1"));
        let msg = err.to_string();
        assert!(msg.contains("Block not available"));
        assert!(msg.contains("requestDocument"));
        assert!(msg.contains("b1"));
    }

    #[test]
    fn test_waiting_for_schema_is_retryable() {
        let err = PolicyError::WaitingForSchema {
            block_type: "requestDocument".into(),
            block_id: BlockId::new("b1"),
        };
        assert!(err.is_retryable());
        assert!(!PolicyError::CycleDetected.is_retryable());
    }
}
