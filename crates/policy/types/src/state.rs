//! The per-(block, user) execution record

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution state for one user on one block.
///
/// Materialized lazily on first access with `active = true`, and never
/// cleared implicitly — only an explicit restore/reset action touches
/// it. `extra` holds block-specific fields the engine does not
/// interpret.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockUserState {
    /// Whether the block accepts actions from this user
    pub active: bool,
    /// Document stashed by a restore event, surfaced by the next read
    /// and cleared by the next successful submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_data: Option<Value>,
    /// Open-ended block-specific fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for BlockUserState {
    fn default() -> Self {
        Self {
            active: true,
            restore_data: None,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_is_active() {
        let state = BlockUserState::default();
        assert!(state.active);
        assert!(state.restore_data.is_none());
    }

    #[test]
    fn test_extra_fields_flatten() {
        let mut state = BlockUserState::default();
        state.extra.insert("index".into(), json!(3));

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["active"], true);
        assert_eq!(value["index"], 3);

        let back: BlockUserState = serde_json::from_value(value).unwrap();
        assert_eq!(back.extra.get("index").unwrap(), &json!(3));
    }
}
