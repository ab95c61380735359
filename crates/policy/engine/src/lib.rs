//! Policy Block Execution Engine for Verdant
//!
//! The engine drives a policy — a tree of typed blocks — through its
//! lifecycle: it validates block configuration before activation,
//! dispatches user actions to blocks, maintains per-user execution
//! state, and propagates typed output events along the policy's static
//! wiring.
//!
//! # Components
//!
//! - [`BlockTree`]: the runtime instance graph and the single seam for
//!   tree-wide execution context (dry-run mode, policy/topic ids).
//! - [`BehaviorRegistry`]: type tag → [`BlockBehavior`] plugin, with
//!   event declarations checked at activation, not at runtime.
//! - [`BlockStateStore`]: per-(block, user) state, guarded per key so
//!   unrelated users never serialize on each other.
//! - [`EventRouter`]: output event → ordered delivery targets.
//! - [`PolicyRuntime`]: the action dispatcher — `get_data`,
//!   `set_data`, `change_active`, `update_block`, `restore_action` —
//!   and the event delivery loop.
//! - [`ExternalNotifier`]: fire-and-forget channel for observers
//!   outside the policy.
//!
//! # Design Principles
//!
//! 1. The engine coordinates; block types plug in. Every concrete
//!    block type implements [`BlockBehavior`] and nothing else.
//! 2. A failed action never locks a user out: the deactivate-before-
//!    work / reactivate-after-work gate always reactivates, on success
//!    and on failure alike.
//! 3. A failing delivery target never blocks the remaining targets,
//!    and never fails the emitting action.

#![deny(unsafe_code)]

mod behavior;
mod collaborators;
mod notify;
mod registry;
mod router;
mod runtime;
mod state_store;
mod validator;

pub mod testing;

pub use behavior::{BlockBehavior, BlockClass};
pub use collaborators::{
    DocumentStore, HolderAccount, IdentityProvider, LedgerClient, ReferenceChecker,
    VerificationResult,
};
pub use notify::ExternalNotifier;
pub use registry::{BehaviorRegistry, BlockTree, ExecutionContext};
pub use router::EventRouter;
pub use runtime::{BlockContext, BlockView, PolicyRuntime, PolicyServices};
pub use state_store::BlockStateStore;
pub use validator::{check_option_descriptors, validate_policy, ValidationContext};
