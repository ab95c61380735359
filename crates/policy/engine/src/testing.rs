//! In-memory collaborators and block behaviors for tests
//!
//! These stand in for the identity, ledger, and document-store
//! subsystems so engine behavior is testable without a live backend.

use crate::behavior::{BlockBehavior, BlockClass};
use crate::collaborators::{
    DocumentStore, HolderAccount, IdentityProvider, LedgerClient, ReferenceChecker,
    VerificationResult,
};
use crate::runtime::BlockContext;
use crate::validator::ValidationContext;
use async_trait::async_trait;
use policy_types::{
    BlockConfig, BlockEvent, DidDocument, InputEvent, LedgerReceipt, OptionDescriptor,
    OutputEvent, PolicyDocument, PolicyError, PolicyResult, SchemaRecord, TopicId,
    ValidationResultContainer,
};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

const ALL_INPUTS: &[InputEvent] = &[
    InputEvent::Run,
    InputEvent::Refresh,
    InputEvent::Restore,
    InputEvent::Release,
];

const ALL_OUTPUTS: &[OutputEvent] = &[
    OutputEvent::Run,
    OutputEvent::Refresh,
    OutputEvent::Restore,
    OutputEvent::Release,
];

// ── Block behaviors ──────────────────────────────────────────────────

/// A configurable no-op block: declares events, carries descriptors
/// and defaults, handles everything silently.
pub struct PassthroughBlock {
    block_type: String,
    class: BlockClass,
    inputs: Vec<InputEvent>,
    outputs: Vec<OutputEvent>,
    descriptors: Vec<OptionDescriptor>,
    defaults: Map<String, Value>,
}

impl PassthroughBlock {
    pub fn new(block_type: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            class: BlockClass::Ui,
            inputs: ALL_INPUTS.to_vec(),
            outputs: ALL_OUTPUTS.to_vec(),
            descriptors: Vec::new(),
            defaults: Map::new(),
        }
    }

    pub fn with_class(mut self, class: BlockClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<InputEvent>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<OutputEvent>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_descriptors(mut self, descriptors: Vec<OptionDescriptor>) -> Self {
        self.descriptors = descriptors;
        self
    }

    pub fn with_default_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(name.into(), value);
        self
    }
}

#[async_trait]
impl BlockBehavior for PassthroughBlock {
    fn block_type(&self) -> &str {
        &self.block_type
    }

    fn block_class(&self) -> BlockClass {
        self.class
    }

    fn input_events(&self) -> &[InputEvent] {
        &self.inputs
    }

    fn output_events(&self) -> &[OutputEvent] {
        &self.outputs
    }

    fn option_descriptors(&self) -> Vec<OptionDescriptor> {
        self.descriptors.clone()
    }

    fn default_options(&self) -> Map<String, Value> {
        self.defaults.clone()
    }
}

/// Records every delivery into a shared log, optionally failing after
/// recording. Used to observe fan-out order and failure isolation.
pub struct RecordingBlock {
    block_type: String,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingBlock {
    pub fn new(block_type: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            block_type: block_type.into(),
            log,
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl BlockBehavior for RecordingBlock {
    fn block_type(&self) -> &str {
        &self.block_type
    }

    fn block_class(&self) -> BlockClass {
        BlockClass::Ui
    }

    fn input_events(&self) -> &[InputEvent] {
        ALL_INPUTS
    }

    fn output_events(&self) -> &[OutputEvent] {
        ALL_OUTPUTS
    }

    async fn handle(&self, ctx: &BlockContext<'_>, event: BlockEvent) -> PolicyResult<()> {
        self.log
            .lock()
            .map_err(|_| PolicyError::LockPoisoned)?
            .push(format!("{}:{}", ctx.block().id, event.event));
        if self.fail {
            return Err(PolicyError::action(
                "handler exploded",
                &self.block_type,
                ctx.block().id.clone(),
            ));
        }
        Ok(())
    }
}

/// A behavior whose option checker itself faults, for isolation tests
pub struct FaultyBlock {
    block_type: String,
}

impl FaultyBlock {
    pub fn new(block_type: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
        }
    }
}

#[async_trait]
impl BlockBehavior for FaultyBlock {
    fn block_type(&self) -> &str {
        &self.block_type
    }

    fn block_class(&self) -> BlockClass {
        BlockClass::Ui
    }

    fn input_events(&self) -> &[InputEvent] {
        ALL_INPUTS
    }

    fn output_events(&self) -> &[OutputEvent] {
        ALL_OUTPUTS
    }

    async fn validate_options(
        &self,
        block: &BlockConfig,
        _ctx: &ValidationContext<'_>,
        _results: &mut ValidationResultContainer,
    ) -> PolicyResult<()> {
        Err(PolicyError::action(
            "checker exploded",
            &self.block_type,
            block.id.clone(),
        ))
    }
}

/// A validator-class child with a fixed verdict
pub struct VerdictValidator {
    block_type: String,
    verdict: bool,
}

impl VerdictValidator {
    pub fn accepting(block_type: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            verdict: true,
        }
    }

    pub fn rejecting(block_type: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            verdict: false,
        }
    }
}

#[async_trait]
impl BlockBehavior for VerdictValidator {
    fn block_type(&self) -> &str {
        &self.block_type
    }

    fn block_class(&self) -> BlockClass {
        BlockClass::Validator
    }

    fn input_events(&self) -> &[InputEvent] {
        ALL_INPUTS
    }

    fn output_events(&self) -> &[OutputEvent] {
        ALL_OUTPUTS
    }

    async fn validate_document(
        &self,
        _ctx: &BlockContext<'_>,
        _event: &BlockEvent,
    ) -> PolicyResult<bool> {
        Ok(self.verdict)
    }
}

// ── Collaborators ────────────────────────────────────────────────────

/// Identity collaborator that signs everything it is handed
#[derive(Default)]
pub struct MemoryIdentityProvider {
    fail_verification: Option<String>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `verify_subject` report every subject as invalid
    pub fn with_failing_verification(mut self, error: impl Into<String>) -> Self {
        self.fail_verification = Some(error.into());
        self
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn verify_subject(&self, _subject: &Value) -> PolicyResult<VerificationResult> {
        Ok(match &self.fail_verification {
            Some(error) => VerificationResult::invalid(error.clone()),
            None => VerificationResult::valid(),
        })
    }

    async fn create_credential(
        &self,
        holder_did: &str,
        _signing_key: &str,
        subject: Value,
    ) -> PolicyResult<Value> {
        Ok(json!({
            "credentialSubject": [subject],
            "issuer": holder_did,
            "proof": {"type": "Ed25519Signature2018"}
        }))
    }

    async fn create_did(&self, _topic: &TopicId) -> PolicyResult<DidDocument> {
        let identifier = format!("did:verdant:{}", uuid::Uuid::new_v4());
        Ok(DidDocument {
            document: json!({"id": identifier}),
            private_key: uuid::Uuid::new_v4().to_string(),
            identifier,
        })
    }

    async fn holder_account(&self, _did: &str) -> PolicyResult<HolderAccount> {
        Ok(HolderAccount {
            account_id: "0.0.1001".into(),
            signing_key: "302e020100300506032b657004220420".into(),
        })
    }
}

/// Ledger that records submissions and accepts everything
#[derive(Default)]
pub struct MemoryLedger {
    submissions: Mutex<Vec<(TopicId, Value)>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn submit(&self, topic: &TopicId, message: Value) -> PolicyResult<LedgerReceipt> {
        self.submissions
            .lock()
            .map_err(|_| PolicyError::LockPoisoned)?
            .push((topic.clone(), message));
        Ok(LedgerReceipt {
            message_id: uuid::Uuid::new_v4().to_string(),
            topic_id: topic.clone(),
        })
    }
}

/// Document store over hash maps
#[derive(Default)]
pub struct MemoryDocumentStore {
    schemas: Mutex<HashMap<String, SchemaRecord>>,
    relationships: Mutex<HashMap<String, PolicyDocument>>,
    saved: Mutex<Vec<PolicyDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_schema(&self, record: SchemaRecord) {
        if let Ok(mut schemas) = self.schemas.lock() {
            schemas.insert(record.iri.clone(), record);
        }
    }

    pub fn insert_relationship(&self, reference: impl Into<String>, document: PolicyDocument) {
        if let Ok(mut relationships) = self.relationships.lock() {
            relationships.insert(reference.into(), document);
        }
    }

    pub fn saved_count(&self) -> usize {
        self.saved.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_schema_by_iri(
        &self,
        iri: &str,
        _topic: Option<&TopicId>,
    ) -> PolicyResult<Option<SchemaRecord>> {
        Ok(self
            .schemas
            .lock()
            .map_err(|_| PolicyError::LockPoisoned)?
            .get(iri)
            .cloned())
    }

    async fn save_identifier_document(&self, document: PolicyDocument) -> PolicyResult<()> {
        self.saved
            .lock()
            .map_err(|_| PolicyError::LockPoisoned)?
            .push(document);
        Ok(())
    }

    async fn get_relationship(&self, reference: &str) -> PolicyResult<Option<PolicyDocument>> {
        Ok(self
            .relationships
            .lock()
            .map_err(|_| PolicyError::LockPoisoned)?
            .get(reference)
            .cloned())
    }
}

/// Reference checker over static sets
#[derive(Default)]
pub struct StaticReferenceChecker {
    schemas: HashSet<String>,
    tokens: HashSet<String>,
}

impl StaticReferenceChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, iri: impl Into<String>) -> Self {
        self.schemas.insert(iri.into());
        self
    }

    pub fn with_token(mut self, token_id: impl Into<String>) -> Self {
        self.tokens.insert(token_id.into());
        self
    }
}

#[async_trait]
impl ReferenceChecker for StaticReferenceChecker {
    async fn schema_exists(&self, iri: &str, _topic: Option<&TopicId>) -> PolicyResult<bool> {
        Ok(self.schemas.contains(iri))
    }

    async fn token_exists(&self, token_id: &str) -> PolicyResult<bool> {
        Ok(self.tokens.contains(token_id))
    }
}
