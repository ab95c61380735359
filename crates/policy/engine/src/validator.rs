//! Options validator: the pre-activation configuration pass
//!
//! Walks the full block tree and runs every block type's option checks
//! inside an isolating boundary: a fault from one block's checker is
//! recorded as a single error against that block and the walk
//! continues. The output is always the complete list of accumulated
//! errors — an empty container is the green light for activation.

use crate::collaborators::ReferenceChecker;
use crate::registry::{BehaviorRegistry, BlockTree};
use policy_types::{
    BlockConfig, OptionDescriptor, PolicyResult, ReferenceKind, TopicId, ValidationResultContainer,
};
use serde_json::Value;

/// What the option checks may consult: existence lookups and the
/// topic scope schemas resolve under.
pub struct ValidationContext<'a> {
    pub refs: &'a dyn ReferenceChecker,
    pub topic: Option<&'a TopicId>,
}

/// Run the configuration pass over a whole policy tree.
///
/// Never fails and never aborts early; every problem in the tree ends
/// up in the returned container, attributed to its block.
pub async fn validate_policy(
    tree: &BlockTree,
    registry: &BehaviorRegistry,
    refs: &dyn ReferenceChecker,
) -> ValidationResultContainer {
    let mut results = ValidationResultContainer::new();
    let ctx = ValidationContext {
        refs,
        topic: tree.context().topic_id.as_ref(),
    };

    for block in tree.iter_depth_first() {
        match registry.get(&block.block_type) {
            Err(_) => {
                results.add_block_error(
                    block.id.clone(),
                    format!("Unknown block type \"{}\"", block.block_type),
                );
            }
            Ok(behavior) => {
                if let Err(error) = behavior.validate_options(block, &ctx, &mut results).await {
                    results
                        .add_block_error(block.id.clone(), format!("Unhandled exception {error}"));
                }
            }
        }
    }

    tracing::debug!(
        blocks = tree.len(),
        errors = results.len(),
        "validation pass finished"
    );
    results
}

/// Interpret a block type's declarative option descriptors.
///
/// Per-field policy: a missing optional field is fine; a present field
/// of the wrong type, a value outside the allowed set, or a
/// well-formed reference to a nonexistent external entity is an error.
/// Lookup failures propagate to the caller, which records them as an
/// unhandled exception for this block.
pub async fn check_option_descriptors(
    block: &BlockConfig,
    descriptors: &[OptionDescriptor],
    ctx: &ValidationContext<'_>,
    results: &mut ValidationResultContainer,
) -> PolicyResult<()> {
    for descriptor in descriptors {
        let value = match block.option(&descriptor.name) {
            None => {
                if descriptor.required {
                    results.add_block_error(
                        block.id.clone(),
                        format!("Option \"{}\" is not set", descriptor.name),
                    );
                }
                continue;
            }
            Some(value) => value,
        };

        if !descriptor.kind.matches(value) {
            results.add_block_error(
                block.id.clone(),
                format!(
                    "Option \"{}\" must be a {}",
                    descriptor.name,
                    descriptor.kind.name()
                ),
            );
            continue;
        }

        if let (Some(allowed), Value::String(text)) = (&descriptor.allowed, value) {
            if !allowed.iter().any(|a| a == text) {
                results.add_block_error(
                    block.id.clone(),
                    format!(
                        "Option \"{}\" must be one of {}",
                        descriptor.name,
                        allowed.join(",")
                    ),
                );
                continue;
            }
        }

        if let (Some(reference), Value::String(text)) = (descriptor.reference, value) {
            match reference {
                ReferenceKind::Schema => {
                    if !ctx.refs.schema_exists(text, ctx.topic).await? {
                        results.add_block_error(
                            block.id.clone(),
                            format!("Schema with id \"{text}\" does not exist"),
                        );
                    }
                }
                ReferenceKind::Token => {
                    if !ctx.refs.token_exists(text).await? {
                        results.add_block_error(
                            block.id.clone(),
                            format!("Token with id {text} does not exist"),
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ExecutionContext;
    use crate::testing::{FaultyBlock, PassthroughBlock, StaticReferenceChecker};
    use policy_types::{BlockId, OptionKind, PolicyId};
    use serde_json::json;
    use std::sync::Arc;

    fn request_descriptors() -> Vec<OptionDescriptor> {
        vec![
            OptionDescriptor::required_string("schema").references(ReferenceKind::Schema),
            OptionDescriptor::new("idType", OptionKind::String).one_of(&["uuid", "did", "owner"]),
        ]
    }

    fn make_registry() -> BehaviorRegistry {
        let mut registry = BehaviorRegistry::new();
        registry.register(Arc::new(PassthroughBlock::new("container")));
        registry.register(Arc::new(
            PassthroughBlock::new("requestDocument").with_descriptors(request_descriptors()),
        ));
        registry
    }

    fn make_tree(blocks: Vec<BlockConfig>) -> BlockTree {
        BlockTree::build(
            ExecutionContext::new(PolicyId::new("p-1")),
            BlockId::new("root"),
            blocks,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_tree_yields_empty_container() {
        let tree = make_tree(vec![
            BlockConfig::new("root", "container").with_child(BlockId::new("request")),
            BlockConfig::new("request", "requestDocument")
                .with_option("schema", json!("#issuer"))
                .with_option("idType", json!("uuid")),
        ]);
        let refs = StaticReferenceChecker::new().with_schema("#issuer");

        let results = validate_policy(&tree, &make_registry(), &refs).await;
        assert!(results.is_valid(), "unexpected errors: {:?}", results);
    }

    #[tokio::test]
    async fn test_three_misconfigured_blocks_yield_three_errors() {
        // Missing required option, wrong option type, dangling schema
        // reference — one error each, attributed correctly, in a
        // single pass.
        let tree = make_tree(vec![
            BlockConfig::new("root", "container")
                .with_child(BlockId::new("missing"))
                .with_child(BlockId::new("mistyped"))
                .with_child(BlockId::new("dangling")),
            BlockConfig::new("missing", "requestDocument"),
            BlockConfig::new("mistyped", "requestDocument").with_option("schema", json!(42)),
            BlockConfig::new("dangling", "requestDocument").with_option("schema", json!("#ghost")),
        ]);
        let refs = StaticReferenceChecker::new().with_schema("#issuer");

        let results = validate_policy(&tree, &make_registry(), &refs).await;
        assert_eq!(results.len(), 3);
        assert_eq!(
            results.errors_for(&BlockId::new("missing"))[0].message,
            "Option \"schema\" is not set"
        );
        assert_eq!(
            results.errors_for(&BlockId::new("mistyped"))[0].message,
            "Option \"schema\" must be a string"
        );
        assert_eq!(
            results.errors_for(&BlockId::new("dangling"))[0].message,
            "Schema with id \"#ghost\" does not exist"
        );
    }

    #[tokio::test]
    async fn test_enum_membership() {
        let tree = make_tree(vec![
            BlockConfig::new("root", "container").with_child(BlockId::new("request")),
            BlockConfig::new("request", "requestDocument")
                .with_option("schema", json!("#issuer"))
                .with_option("idType", json!("guid")),
        ]);
        let refs = StaticReferenceChecker::new().with_schema("#issuer");

        let results = validate_policy(&tree, &make_registry(), &refs).await;
        assert_eq!(results.len(), 1);
        assert!(results.errors()[0]
            .message
            .contains("must be one of uuid,did,owner"));
    }

    #[tokio::test]
    async fn test_unknown_block_type_recorded() {
        let tree = make_tree(vec![BlockConfig::new("root", "teleporter")]);
        let refs = StaticReferenceChecker::new();

        let results = validate_policy(&tree, &make_registry(), &refs).await;
        assert_eq!(results.len(), 1);
        assert!(results.errors()[0].message.contains("teleporter"));
    }

    #[tokio::test]
    async fn test_faulty_checker_is_isolated() {
        // A behavior whose validate_options fails must produce one
        // error for its block and must not stop the walk.
        let mut registry = make_registry();
        registry.register(Arc::new(FaultyBlock::new("faulty")));

        let tree = make_tree(vec![
            BlockConfig::new("root", "container")
                .with_child(BlockId::new("bad"))
                .with_child(BlockId::new("also-missing")),
            BlockConfig::new("bad", "faulty"),
            BlockConfig::new("also-missing", "requestDocument"),
        ]);
        let refs = StaticReferenceChecker::new();

        let results = validate_policy(&tree, &registry, &refs).await;
        assert_eq!(results.len(), 2);
        assert!(results.errors_for(&BlockId::new("bad"))[0]
            .message
            .starts_with("Unhandled exception"));
        assert_eq!(results.errors_for(&BlockId::new("also-missing")).len(), 1);
    }
}
