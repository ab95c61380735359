//! Policy Domain Types for Verdant
//!
//! A policy in Verdant is a **tree of blocks** — typed processing units
//! wired together by events. Each block encodes one unit of document
//! workflow behavior (present a form, request approval, branch on a
//! condition, …); the engine routes documents and user actions through
//! the tree.
//!
//! # Key Concepts
//!
//! - **BlockConfig**: One node of the policy tree — a type tag, a
//!   type-erased options map, ordered children, and the static event
//!   wiring connecting its output events to other blocks.
//! - **BlockEvent**: A transient typed message (event type, source
//!   block, acting user, optional document payload). Events are never
//!   persisted and carry everything the receiver needs.
//! - **BlockUserState**: The per-(block, user) execution record. It is
//!   materialized lazily with `active = true` and survives for the
//!   lifetime of the policy instance.
//! - **OptionDescriptor**: A declarative per-field configuration check
//!   (required, typed, enumerated, references-an-external-entity) run
//!   by the options validator before a policy may go live.
//! - **ValidationResultContainer**: Accumulates configuration errors
//!   across the whole tree — the pass never aborts on the first fault.
//!
//! # Design Principles
//!
//! 1. Event wiring is explicit and inspectable. Declared input/output
//!    event types live in tables built at registration time, never
//!    discovered by reflection.
//! 2. Per-user state is an explicit keyed store, never dynamic
//!    property access on a shared object.
//! 3. Action failures always name the block (type + id) that raised
//!    them, and never leave a block locked for the acting user.

#![deny(unsafe_code)]

mod block;
mod document;
mod errors;
mod event;
mod ids;
mod options;
mod state;
mod validation;

pub use block::*;
pub use document::*;
pub use errors::*;
pub use event::*;
pub use ids::*;
pub use options::*;
pub use state::*;
pub use validation::*;
