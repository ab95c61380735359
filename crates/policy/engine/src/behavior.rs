//! The block behavior contract
//!
//! Every concrete block type — request form, approval button, mint,
//! switch, aggregator, … — is a plugin implementing [`BlockBehavior`].
//! The contract is explicit: declared input/output event types, a
//! declarative option descriptor list, and a handler for routed
//! events. Declarations are checked once at activation; at runtime the
//! engine trusts them.

use crate::runtime::BlockContext;
use crate::validator::{check_option_descriptors, ValidationContext};
use async_trait::async_trait;
use policy_types::{
    BlockConfig, BlockEvent, InputEvent, OptionDescriptor, OutputEvent, PolicyDocument,
    PolicyResult, PolicyUser, ValidationResultContainer,
};
use serde_json::{Map, Value};

/// Capability class of a block type, used to filter children.
///
/// A request block, for example, runs every `Validator`-class child
/// over a freshly built document before accepting it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockClass {
    /// Renders a form or view to the user
    Ui,
    /// Validates documents produced by its parent
    Validator,
    /// Supplies source documents to its parent
    Source,
    /// Decorates its parent's behavior (filters, pagination, …)
    Addon,
    /// Runs without user interaction
    Server,
}

/// The contract every block type implements.
///
/// Engine-side semantics (active gating, restore stashing, readonly
/// preset enforcement, identifier generation) live in the dispatcher;
/// behaviors contribute the block-type-specific pieces only.
#[async_trait]
pub trait BlockBehavior: Send + Sync {
    /// Type tag used for registry lookup
    fn block_type(&self) -> &str;

    /// Capability class
    fn block_class(&self) -> BlockClass;

    /// Input event types this block services
    fn input_events(&self) -> &[InputEvent];

    /// Output event types this block may emit
    fn output_events(&self) -> &[OutputEvent];

    /// Declarative option checks run by the validation pass
    fn option_descriptors(&self) -> Vec<OptionDescriptor> {
        Vec::new()
    }

    /// Block-kind defaults merged beneath instance options
    fn default_options(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Validate this block's static options.
    ///
    /// The default interprets [`Self::option_descriptors`]. A returned
    /// error is caught by the validation pass and recorded against
    /// this block; it never aborts the pass.
    async fn validate_options(
        &self,
        block: &BlockConfig,
        ctx: &ValidationContext<'_>,
        results: &mut ValidationResultContainer,
    ) -> PolicyResult<()> {
        check_option_descriptors(block, &self.option_descriptors(), ctx, results).await
    }

    /// Service a routed input event.
    ///
    /// The default stashes restore events and ignores the rest, which
    /// is correct for blocks that only react to refresh cycles.
    async fn handle(&self, ctx: &BlockContext<'_>, event: BlockEvent) -> PolicyResult<()> {
        match event.event.as_input() {
            InputEvent::Restore => ctx.restore(event),
            _ => Ok(()),
        }
    }

    /// Judge a document built by the parent block. Only meaningful for
    /// `Validator`-class blocks; the default accepts everything.
    async fn validate_document(
        &self,
        _ctx: &BlockContext<'_>,
        _event: &BlockEvent,
    ) -> PolicyResult<bool> {
        Ok(true)
    }

    /// Source documents this block offers the acting user. Used by
    /// `get_data` to surface the current document.
    async fn sources(
        &self,
        _ctx: &BlockContext<'_>,
        _user: &PolicyUser,
    ) -> PolicyResult<Vec<PolicyDocument>> {
        Ok(Vec::new())
    }
}
