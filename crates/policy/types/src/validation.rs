//! Validation result container
//!
//! Configuration problems are accumulated, never raised mid-pass: the
//! policy author sees every error across the whole tree at once, and
//! an empty container is the green light for activation.

use crate::BlockId;
use serde::{Deserialize, Serialize};

/// One configuration error, attributed to the block that carries it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockError {
    pub block_id: BlockId,
    pub message: String,
}

/// Accumulates configuration errors produced by a validation pass
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationResultContainer {
    errors: Vec<BlockError>,
}

impl ValidationResultContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error against a block. Collection continues.
    pub fn add_block_error(&mut self, block_id: BlockId, message: impl Into<String>) {
        self.errors.push(BlockError {
            block_id,
            message: message.into(),
        });
    }

    /// True when the policy may be activated
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[BlockError] {
        &self.errors
    }

    /// Errors attributed to one block
    pub fn errors_for(&self, block_id: &BlockId) -> Vec<&BlockError> {
        self.errors
            .iter()
            .filter(|e| &e.block_id == block_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_container_is_valid() {
        let container = ValidationResultContainer::new();
        assert!(container.is_valid());
        assert_eq!(container.len(), 0);
    }

    #[test]
    fn test_accumulates_across_blocks() {
        let mut container = ValidationResultContainer::new();
        container.add_block_error(BlockId::new("a"), "Option \"schema\" is not set");
        container.add_block_error(BlockId::new("b"), "Option \"schema\" must be a string");
        container.add_block_error(BlockId::new("a"), "Unknown block type");

        assert!(!container.is_valid());
        assert_eq!(container.len(), 3);
        assert_eq!(container.errors_for(&BlockId::new("a")).len(), 2);
        assert_eq!(container.errors_for(&BlockId::new("b")).len(), 1);
    }
}
