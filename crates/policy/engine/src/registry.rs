//! Block tree and behavior registry
//!
//! The tree owns the runtime instance graph for one policy and the
//! shared execution context. It is the single seam through which
//! dry-run mode is consulted — no other component branches on dry-run
//! directly.

use crate::behavior::{BlockBehavior, BlockClass};
use policy_types::{BlockConfig, BlockId, PolicyError, PolicyId, PolicyResult, TopicId};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Registry of block type implementations, keyed by type tag
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    behaviors: HashMap<String, Arc<dyn BlockBehavior>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a behavior under its type tag. Re-registering a tag
    /// replaces the previous implementation.
    pub fn register(&mut self, behavior: Arc<dyn BlockBehavior>) {
        let tag = behavior.block_type().to_string();
        if self.behaviors.insert(tag.clone(), behavior).is_some() {
            tracing::warn!(block_type = %tag, "behavior re-registered");
        }
    }

    /// Resolve a behavior by type tag
    pub fn get(&self, block_type: &str) -> PolicyResult<Arc<dyn BlockBehavior>> {
        self.behaviors
            .get(block_type)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownBlockType(block_type.to_string()))
    }

    pub fn contains(&self, block_type: &str) -> bool {
        self.behaviors.contains_key(block_type)
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

/// Tree-wide execution context, immutable after activation
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    /// The running policy instance
    pub policy_id: PolicyId,
    /// Ledger topic the policy publishes to
    pub topic_id: Option<TopicId>,
    /// Route identity/ledger side effects to the sandbox
    pub dry_run: bool,
}

impl ExecutionContext {
    pub fn new(policy_id: PolicyId) -> Self {
        Self {
            policy_id,
            topic_id: None,
            dry_run: false,
        }
    }

    pub fn with_topic(mut self, topic_id: TopicId) -> Self {
        self.topic_id = Some(topic_id);
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// The runtime instance graph for one policy
pub struct BlockTree {
    root: BlockId,
    blocks: HashMap<BlockId, BlockConfig>,
    /// Depth-first walk order, fixed at build time
    order: Vec<BlockId>,
    context: ExecutionContext,
}

impl BlockTree {
    /// Build and verify the tree: unique ids, exactly one parent per
    /// non-root block, every block reachable from the root.
    pub fn build(
        context: ExecutionContext,
        root: BlockId,
        blocks: Vec<BlockConfig>,
    ) -> PolicyResult<Self> {
        let mut map: HashMap<BlockId, BlockConfig> = HashMap::new();
        for block in blocks {
            if map.contains_key(&block.id) {
                return Err(PolicyError::DuplicateBlockId(block.id));
            }
            map.insert(block.id.clone(), block);
        }
        if !map.contains_key(&root) {
            return Err(PolicyError::BlockNotFound(root));
        }

        // Every non-root block has exactly one parent; the root has none.
        let mut seen_children: HashSet<BlockId> = HashSet::new();
        for block in map.values() {
            for child in &block.children {
                if child == &root {
                    return Err(PolicyError::CycleDetected);
                }
                if !map.contains_key(child) {
                    return Err(PolicyError::BlockNotFound(child.clone()));
                }
                if !seen_children.insert(child.clone()) {
                    return Err(PolicyError::MultipleParents(child.clone()));
                }
            }
        }

        // Depth-first reachability from the root; single-parenthood
        // makes any unreachable block an orphan rather than a cycle.
        let mut order = Vec::with_capacity(map.len());
        let mut stack = vec![root.clone()];
        let mut visited: HashSet<BlockId> = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let block = &map[&current];
            for child in block.children.iter().rev() {
                stack.push(child.clone());
            }
            order.push(current);
        }
        for id in map.keys() {
            if !visited.contains(id) {
                return Err(PolicyError::OrphanBlock(id.clone()));
            }
        }

        Ok(Self {
            root,
            blocks: map,
            order,
            context,
        })
    }

    pub fn root(&self) -> &BlockId {
        &self.root
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The only place the engine consults dry-run mode
    pub fn is_dry_run(&self) -> bool {
        self.context.dry_run
    }

    /// Static configuration of a block
    pub fn config(&self, id: &BlockId) -> PolicyResult<&BlockConfig> {
        self.blocks
            .get(id)
            .ok_or_else(|| PolicyError::BlockNotFound(id.clone()))
    }

    /// Ordered children of a block
    pub fn children(&self, id: &BlockId) -> PolicyResult<Vec<&BlockConfig>> {
        let block = self.config(id)?;
        block.children.iter().map(|c| self.config(c)).collect()
    }

    /// Children whose behavior carries a capability class
    pub fn children_of_class(
        &self,
        id: &BlockId,
        class: BlockClass,
        registry: &BehaviorRegistry,
    ) -> PolicyResult<Vec<&BlockConfig>> {
        Ok(self
            .children(id)?
            .into_iter()
            .filter(|child| {
                registry
                    .get(&child.block_type)
                    .map(|b| b.block_class() == class)
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Depth-first iteration in build order
    pub fn iter_depth_first(&self) -> impl Iterator<Item = &BlockConfig> {
        self.order.iter().map(|id| &self.blocks[id])
    }

    /// Instance options merged over block-kind defaults
    pub fn unique_options(
        &self,
        id: &BlockId,
        behavior: &dyn BlockBehavior,
    ) -> PolicyResult<Map<String, Value>> {
        let block = self.config(id)?;
        let mut merged = behavior.default_options();
        for (name, value) in &block.options {
            merged.insert(name.clone(), value.clone());
        }
        Ok(merged)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PassthroughBlock;
    use serde_json::json;

    fn make_context() -> ExecutionContext {
        ExecutionContext::new(PolicyId::new("policy-1")).with_topic(TopicId::new("0.0.7"))
    }

    fn make_tree() -> BlockTree {
        let root = BlockConfig::new("root", "container")
            .with_child(BlockId::new("request"))
            .with_child(BlockId::new("approve"));
        let request = BlockConfig::new("request", "requestDocument");
        let approve = BlockConfig::new("approve", "approveDocument");
        BlockTree::build(
            make_context(),
            BlockId::new("root"),
            vec![root, request, approve],
        )
        .unwrap()
    }

    #[test]
    fn test_build_and_walk() {
        let tree = make_tree();
        assert_eq!(tree.len(), 3);
        let order: Vec<_> = tree.iter_depth_first().map(|b| b.id.0.as_str()).collect();
        assert_eq!(order, ["root", "request", "approve"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = BlockTree::build(
            make_context(),
            BlockId::new("root"),
            vec![
                BlockConfig::new("root", "container"),
                BlockConfig::new("root", "requestDocument"),
            ],
        );
        assert!(matches!(result, Err(PolicyError::DuplicateBlockId(_))));
    }

    #[test]
    fn test_two_parents_rejected() {
        let a = BlockConfig::new("a", "container").with_child(BlockId::new("shared"));
        let b = BlockConfig::new("b", "container").with_child(BlockId::new("shared"));
        let root = BlockConfig::new("root", "container")
            .with_child(BlockId::new("a"))
            .with_child(BlockId::new("b"));
        let shared = BlockConfig::new("shared", "requestDocument");

        let result = BlockTree::build(
            make_context(),
            BlockId::new("root"),
            vec![root, a, b, shared],
        );
        assert!(matches!(result, Err(PolicyError::MultipleParents(_))));
    }

    #[test]
    fn test_orphan_rejected() {
        let result = BlockTree::build(
            make_context(),
            BlockId::new("root"),
            vec![
                BlockConfig::new("root", "container"),
                BlockConfig::new("island", "requestDocument"),
            ],
        );
        assert!(matches!(result, Err(PolicyError::OrphanBlock(_))));
    }

    #[test]
    fn test_root_as_child_rejected() {
        let root = BlockConfig::new("root", "container").with_child(BlockId::new("a"));
        let a = BlockConfig::new("a", "container").with_child(BlockId::new("root"));
        let result = BlockTree::build(make_context(), BlockId::new("root"), vec![root, a]);
        assert!(matches!(result, Err(PolicyError::CycleDetected)));
    }

    #[test]
    fn test_unique_options_merges_defaults() {
        let tree = make_tree();
        let behavior = PassthroughBlock::new("requestDocument")
            .with_default_option("uiMetaData", json!({"type": "page"}));
        let merged = tree
            .unique_options(&BlockId::new("request"), &behavior)
            .unwrap();
        assert_eq!(merged["uiMetaData"]["type"], "page");

        // Instance options win over defaults
        let request = BlockConfig::new("r2", "requestDocument")
            .with_option("uiMetaData", json!({"type": "dialog"}));
        let root = BlockConfig::new("root", "container").with_child(BlockId::new("r2"));
        let tree =
            BlockTree::build(make_context(), BlockId::new("root"), vec![root, request]).unwrap();
        let merged = tree.unique_options(&BlockId::new("r2"), &behavior).unwrap();
        assert_eq!(merged["uiMetaData"]["type"], "dialog");
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = BehaviorRegistry::new();
        registry.register(Arc::new(PassthroughBlock::new("requestDocument")));
        assert!(registry.get("requestDocument").is_ok());
        assert!(matches!(
            registry.get("nope"),
            Err(PolicyError::UnknownBlockType(_))
        ));
    }
}
