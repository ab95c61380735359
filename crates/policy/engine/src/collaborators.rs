//! Collaborator interfaces
//!
//! The engine performs no cryptography, ledger messaging, or
//! persistence of its own. Those concerns live behind the traits
//! below, injected at activation. In-memory doubles for all of them
//! live in [`crate::testing`].

use async_trait::async_trait;
use policy_types::{DidDocument, LedgerReceipt, PolicyDocument, PolicyResult, SchemaRecord, TopicId};
use serde_json::Value;

/// Outcome of verifying a credential subject against its schema
#[derive(Clone, Debug)]
pub struct VerificationResult {
    pub ok: bool,
    pub error: Option<String>,
}

impl VerificationResult {
    pub fn valid() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// The ledger account and signing key backing a credential holder
#[derive(Clone, Debug)]
pub struct HolderAccount {
    pub account_id: String,
    pub signing_key: String,
}

/// Identity and credential cryptography collaborator
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Check a credential subject against its declared schema
    async fn verify_subject(&self, subject: &Value) -> PolicyResult<VerificationResult>;

    /// Construct and sign a verifiable credential over a subject
    async fn create_credential(
        &self,
        holder_did: &str,
        signing_key: &str,
        subject: Value,
    ) -> PolicyResult<Value>;

    /// Create a fresh decentralized identifier under a topic
    async fn create_did(&self, topic: &TopicId) -> PolicyResult<DidDocument>;

    /// Resolve the ledger account backing a holder identity
    async fn holder_account(&self, did: &str) -> PolicyResult<HolderAccount>;
}

/// Ledger/consensus messaging collaborator.
///
/// Used only for identifier-generation side effects, never on hot
/// read paths.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn submit(&self, topic: &TopicId, message: Value) -> PolicyResult<LedgerReceipt>;
}

/// Persistent document store collaborator
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Resolve a schema by IRI, scoped to a topic when given
    async fn get_schema_by_iri(
        &self,
        iri: &str,
        topic: Option<&TopicId>,
    ) -> PolicyResult<Option<SchemaRecord>>;

    /// Persist a freshly created identifier document
    async fn save_identifier_document(&self, document: PolicyDocument) -> PolicyResult<()>;

    /// Look up a related document by reference id
    async fn get_relationship(&self, reference: &str) -> PolicyResult<Option<PolicyDocument>>;
}

/// Existence checks used by the options validator.
///
/// Injected so validation is testable without a live backing store.
#[async_trait]
pub trait ReferenceChecker: Send + Sync {
    async fn schema_exists(&self, iri: &str, topic: Option<&TopicId>) -> PolicyResult<bool>;

    async fn token_exists(&self, token_id: &str) -> PolicyResult<bool>;
}
