//! The action dispatcher
//!
//! [`PolicyRuntime`] is the assembled policy instance: tree, registry,
//! state store, router, and collaborators, wired together at
//! activation. User actions enter here (`get_data`, `set_data`) and
//! output events fan out from here.
//!
//! # Key Concepts
//!
//! - Activation re-checks every event declaration: a wire naming an
//!   output the source never declares, or a target that does not
//!   service the event's input type, fails activation. At runtime the
//!   router is trusted.
//! - `set_data` runs inside the deactivate/reactivate gate: the block
//!   is deactivated for the acting user before any document work and
//!   reactivated after, on success and on failure alike. A concurrent
//!   second submission sees the inactive flag and is rejected.
//! - Event delivery follows wiring order and isolates failures: a
//!   failing target is logged and skipped, never aborting the rest of
//!   the fan-out or the emitting action.

use crate::behavior::{BlockBehavior, BlockClass};
use crate::collaborators::ReferenceChecker;
use crate::notify::ExternalNotifier;
use crate::registry::{BehaviorRegistry, BlockTree};
use crate::router::EventRouter;
use crate::state_store::BlockStateStore;
use crate::validator::validate_policy;
use crate::{DocumentStore, IdentityProvider, LedgerClient};
use policy_types::{
    BlockConfig, BlockEvent, BlockId, ExternalEvent, ExternalEventKind, OutputEvent, PolicyDocument,
    PolicyError, PolicyResult, PolicyUser, PresetField, SchemaRecord, TopicId,
    ValidationResultContainer,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// The injected collaborators one policy instance works against.
///
/// A dry-run instance is built with sandbox-backed implementations;
/// the engine itself never branches on which it was given.
#[derive(Clone)]
pub struct PolicyServices {
    pub identity: Arc<dyn IdentityProvider>,
    pub ledger: Arc<dyn LedgerClient>,
    pub documents: Arc<dyn DocumentStore>,
}

impl PolicyServices {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        ledger: Arc<dyn LedgerClient>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            identity,
            ledger,
            documents,
        }
    }
}

/// What a behavior sees while servicing an event: its own block's
/// configuration plus narrow windows into the runtime.
pub struct BlockContext<'a> {
    runtime: &'a PolicyRuntime,
    block: &'a BlockConfig,
}

impl BlockContext<'_> {
    /// Configuration of the block being serviced
    pub fn block(&self) -> &BlockConfig {
        self.block
    }

    pub fn is_dry_run(&self) -> bool {
        self.runtime.tree.is_dry_run()
    }

    pub fn state(&self) -> &BlockStateStore {
        &self.runtime.state
    }

    pub fn services(&self) -> &PolicyServices {
        &self.runtime.services
    }

    /// Stash the event's payload for later restoration into this
    /// block's form
    pub fn restore(&self, event: BlockEvent) -> PolicyResult<()> {
        self.runtime.restore_action(&self.block.id, event)
    }

    /// Push this block's state record to external observers
    pub fn update_block(&self, user: &PolicyUser) -> PolicyResult<()> {
        self.runtime.update_block(&self.block.id, user)
    }

    /// Emit an output event from this block
    pub async fn trigger(&self, event: OutputEvent, user: &PolicyUser, payload: Option<Value>) {
        self.runtime
            .trigger_events(&self.block.id, event, user, payload)
            .await;
    }
}

/// The externally visible rendering of a block for one user, as
/// returned by `get_data`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub id: BlockId,
    pub block_type: String,
    pub schema: SchemaRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset_schema: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preset_fields: Vec<PresetField>,
    pub ui_meta_data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hide_fields: Vec<String>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PolicyDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_data: Option<Value>,
}

/// An activated policy instance
pub struct PolicyRuntime {
    tree: BlockTree,
    registry: BehaviorRegistry,
    state: BlockStateStore,
    router: EventRouter,
    services: PolicyServices,
    notifier: ExternalNotifier,
}

impl PolicyRuntime {
    /// Activate a policy: verify every block's event declarations
    /// against its wiring, then build the routing tables.
    pub fn activate(
        tree: BlockTree,
        registry: BehaviorRegistry,
        services: PolicyServices,
        notifier: ExternalNotifier,
    ) -> PolicyResult<Self> {
        for block in tree.iter_depth_first() {
            let behavior = registry.get(&block.block_type)?;
            for wire in &block.event_wiring {
                if !behavior.output_events().contains(&wire.event) {
                    return Err(PolicyError::UndeclaredOutputEvent {
                        block_id: block.id.clone(),
                        event: wire.event,
                    });
                }
                for target in &wire.targets {
                    let target_block = tree.config(target)?;
                    let target_behavior = registry.get(&target_block.block_type)?;
                    if !target_behavior
                        .input_events()
                        .contains(&wire.event.as_input())
                    {
                        return Err(PolicyError::UndeclaredInputEvent {
                            block_id: target.clone(),
                            event: wire.event,
                        });
                    }
                }
            }
        }

        let router = EventRouter::build(tree.iter_depth_first());
        tracing::info!(
            policy_id = %tree.context().policy_id,
            blocks = tree.len(),
            wires = router.wire_count(),
            dry_run = tree.is_dry_run(),
            "policy activated"
        );
        Ok(Self {
            tree,
            registry,
            state: BlockStateStore::new(),
            router,
            services,
            notifier,
        })
    }

    pub fn tree(&self) -> &BlockTree {
        &self.tree
    }

    pub fn state(&self) -> &BlockStateStore {
        &self.state
    }

    /// Run the configuration pass over this instance's tree
    pub async fn validate(&self, refs: &dyn ReferenceChecker) -> ValidationResultContainer {
        validate_policy(&self.tree, &self.registry, refs).await
    }

    // ── User actions ─────────────────────────────────────────────────

    /// Render a block for a user. Read-only: two identical calls with
    /// no intervening mutation return identical views.
    pub async fn get_data(&self, block_id: &BlockId, user: &PolicyUser) -> PolicyResult<BlockView> {
        let block = self.tree.config(block_id)?;
        let behavior = self.registry.get(&block.block_type)?;
        let options = self.tree.unique_options(block_id, behavior.as_ref())?;

        let schema = self.resolved_schema(block, &options).await?;
        let ctx = BlockContext {
            runtime: self,
            block,
        };
        let sources = behavior
            .sources(&ctx, user)
            .await
            .map_err(|error| self.as_action(block, error))?;
        let state = self.state.get(block_id, &user.id)?;

        tracing::debug!(block_id = %block.id, user = %user.id, active = state.active, "get_data");
        Ok(BlockView {
            id: block.id.clone(),
            block_type: block.block_type.clone(),
            schema,
            preset_schema: options
                .get("presetSchema")
                .and_then(Value::as_str)
                .map(String::from),
            preset_fields: self.preset_fields(block, &options)?,
            ui_meta_data: options.get("uiMetaData").cloned().unwrap_or(json!({})),
            hide_fields: options
                .get("hideFields")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default(),
            active: state.active,
            data: sources.into_iter().next(),
            restore_data: state.restore_data,
        })
    }

    /// Accept a user's document submission: build, verify, and sign
    /// the credential, then propagate it along the block's wiring.
    ///
    /// Runs inside the deactivate/reactivate gate. The `Set` external
    /// notification fires on the success path only.
    pub async fn set_data(
        &self,
        block_id: &BlockId,
        user: &PolicyUser,
        data: PolicyDocument,
    ) -> PolicyResult<PolicyDocument> {
        let block = self.tree.config(block_id)?;
        let behavior = self.registry.get(&block.block_type)?;
        tracing::info!(block_id = %block.id, user = %user.id, "set_data");

        // A fresh submission supersedes any stashed restore payload
        let _ = self.state.take_restore_data(&block.id, &user.id)?;

        let did = user.did.clone().ok_or_else(|| {
            PolicyError::action("User has no DID", &block.block_type, block.id.clone())
        })?;
        // Claim the gate in a single read-modify-write: of two
        // parallel submissions exactly one sees the flag still set.
        let was_active = self.state.update(&block.id, &user.id, |state| {
            std::mem::replace(&mut state.active, false)
        })?;
        if !was_active {
            return Err(PolicyError::action(
                "Block not available",
                &block.block_type,
                block.id.clone(),
            ));
        }
        self.update_block(block_id, user)?;
        self.trigger_events(&block.id, OutputEvent::Refresh, user, None)
            .await;
        match self
            .construct_document(block, behavior.as_ref(), user, &did, data)
            .await
        {
            Ok(item) => {
                self.change_active(block_id, user, true).await?;
                let payload = serde_json::to_value(&item).unwrap_or(Value::Null);
                self.trigger_events(&block.id, OutputEvent::Run, user, Some(payload.clone()))
                    .await;
                self.trigger_events(&block.id, OutputEvent::Refresh, user, Some(payload))
                    .await;
                self.notifier.emit(
                    ExternalEvent::new(
                        ExternalEventKind::Set,
                        block.id.clone(),
                        &block.block_type,
                    )
                    .with_user(user.id.clone()),
                );
                Ok(item)
            }
            Err(error) => {
                tracing::error!(block_id = %block.id, user = %user.id, %error, "set_data failed");
                // A failed submission never locks the user out
                self.change_active(block_id, user, true).await?;
                Err(self.as_action(block, error))
            }
        }
    }

    /// Flip a block's active flag for one user. Announces the change
    /// externally and refreshes downstream blocks.
    pub async fn change_active(
        &self,
        block_id: &BlockId,
        user: &PolicyUser,
        active: bool,
    ) -> PolicyResult<()> {
        let block = self.tree.config(block_id)?;
        self.state.set_active(&block.id, &user.id, active)?;
        self.update_block(block_id, user)?;
        self.trigger_events(&block.id, OutputEvent::Refresh, user, None)
            .await;
        Ok(())
    }

    /// Push a block's externally visible state record to observers.
    /// Outside the event cycle: no block receives anything. Behaviors
    /// reach this through [`BlockContext::update_block`] after
    /// mutating their own state.
    pub fn update_block(&self, block_id: &BlockId, user: &PolicyUser) -> PolicyResult<()> {
        let block = self.tree.config(block_id)?;
        let state = self.state.get(&block.id, &user.id)?;
        self.notifier.emit(
            ExternalEvent::new(
                ExternalEventKind::StateChange,
                block.id.clone(),
                &block.block_type,
            )
            .with_user(user.id.clone())
            .with_data(serde_json::to_value(state).unwrap_or(Value::Null)),
        );
        Ok(())
    }

    /// Stash a routed restore payload for later rendering by
    /// `get_data`
    pub fn restore_action(&self, block_id: &BlockId, event: BlockEvent) -> PolicyResult<()> {
        let Some(payload) = event.payload else {
            return Ok(());
        };
        self.state
            .stash_restore_data(block_id, &event.user.id, payload)
    }

    // ── Event delivery ───────────────────────────────────────────────

    /// Fan an output event out to every wired target, in wiring order.
    /// A failing target is logged and skipped; the emitter never
    /// observes delivery failures.
    pub async fn trigger_events(
        &self,
        source: &BlockId,
        event: OutputEvent,
        user: &PolicyUser,
        payload: Option<Value>,
    ) {
        let targets = self.router.targets(source, event).to_vec();
        if targets.is_empty() {
            return;
        }
        let mut block_event = BlockEvent::new(event, source.clone(), user.clone());
        if let Some(payload) = payload {
            block_event = block_event.with_payload(payload);
        }
        for target in targets {
            if let Err(error) = self.deliver(&target, block_event.clone()).await {
                tracing::error!(
                    source = %source,
                    target = %target,
                    event = %event,
                    %error,
                    "event delivery failed"
                );
            }
        }
    }

    async fn deliver(&self, target: &BlockId, event: BlockEvent) -> PolicyResult<()> {
        let block = self.tree.config(target)?;
        let behavior = self.registry.get(&block.block_type)?;
        let ctx = BlockContext {
            runtime: self,
            block,
        };
        behavior.handle(&ctx, event).await
    }

    // ── Document construction ────────────────────────────────────────

    async fn construct_document(
        &self,
        block: &BlockConfig,
        behavior: &dyn BlockBehavior,
        user: &PolicyUser,
        did: &str,
        data: PolicyDocument,
    ) -> PolicyResult<PolicyDocument> {
        let options = self.tree.unique_options(&block.id, behavior)?;

        let relationship = match &data.reference {
            None => None,
            Some(reference) => {
                let found = self
                    .services
                    .documents
                    .get_relationship(reference)
                    .await
                    .ok()
                    .flatten();
                match found {
                    Some(document) => Some(document),
                    None => {
                        return Err(PolicyError::action(
                            "Invalid relationships",
                            &block.block_type,
                            block.id.clone(),
                        ))
                    }
                }
            }
        };

        if options.contains_key("presetSchema") {
            let preset_fields = self.preset_fields(block, &options)?;
            let preset_subject = relationship
                .as_ref()
                .and_then(PolicyDocument::credential_subject);
            let modified = modified_readonly_fields(&preset_fields, &data.document, preset_subject);
            if !modified.is_empty() {
                return Err(PolicyError::action(
                    format!(
                        "Readonly preset fields can not be modified ({})",
                        modified.join(", ")
                    ),
                    &block.block_type,
                    block.id.clone(),
                ));
            }
        }

        let schema = self.resolved_schema(block, &options).await?;
        let id_type = options
            .get("idType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let generated = self.generate_identifier(block, id_type, did).await?;

        let mut subject = data.document.clone();
        let Value::Object(fields) = &mut subject else {
            return Err(PolicyError::action(
                "Document must be an object",
                &block.block_type,
                block.id.clone(),
            ));
        };
        if let Some(id) = generated {
            fields.insert("id".into(), json!(id));
        }
        if let Some(reference_id) = relationship.as_ref().and_then(PolicyDocument::subject_id) {
            fields.insert("ref".into(), json!(reference_id));
        }
        fields.insert("policyId".into(), json!(self.tree.context().policy_id));
        if self.tree.is_dry_run() {
            fields.insert("dryRun".into(), json!(true));
        }

        let verdict = self.services.identity.verify_subject(&subject).await?;
        if !verdict.ok {
            return Err(PolicyError::action(
                verdict
                    .error
                    .unwrap_or_else(|| "Invalid credential subject".into()),
                &block.block_type,
                block.id.clone(),
            ));
        }

        let account = self.services.identity.holder_account(did).await?;
        let credential = self
            .services
            .identity
            .create_credential(did, &account.signing_key, subject)
            .await?;

        let mut item = PolicyDocument::new(credential)
            .with_owner(did)
            .with_schema(schema.iri);
        if let Some(reference_id) = relationship.as_ref().and_then(PolicyDocument::subject_id) {
            item = item.with_reference(reference_id);
        }

        // Validator-class children judge the finished document
        let payload = serde_json::to_value(&item).unwrap_or(Value::Null);
        let event = BlockEvent::new(OutputEvent::Run, block.id.clone(), user.clone())
            .with_payload(payload);
        for validator in self
            .tree
            .children_of_class(&block.id, BlockClass::Validator, &self.registry)?
        {
            let validator_behavior = self.registry.get(&validator.block_type)?;
            let ctx = BlockContext {
                runtime: self,
                block: validator,
            };
            if !validator_behavior.validate_document(&ctx, &event).await? {
                return Err(PolicyError::action(
                    "Invalid document",
                    &block.block_type,
                    block.id.clone(),
                ));
            }
        }

        Ok(item)
    }

    /// Produce the subject identifier a block's `idType` option asks
    /// for. The `did` variant registers a fresh identifier on the
    /// ledger before returning it.
    async fn generate_identifier(
        &self,
        block: &BlockConfig,
        id_type: &str,
        did: &str,
    ) -> PolicyResult<Option<String>> {
        match id_type {
            "uuid" => Ok(Some(uuid::Uuid::new_v4().to_string())),
            "owner" => Ok(Some(did.to_string())),
            "did" => {
                let topic = self.tree.context().topic_id.clone().ok_or_else(|| {
                    PolicyError::action(
                        "Policy has no ledger topic",
                        &block.block_type,
                        block.id.clone(),
                    )
                })?;
                let identifier = self.register_identifier(&topic).await.map_err(|error| {
                    tracing::error!(block_id = %block.id, %error, "identifier generation failed");
                    self.as_action(block, error)
                })?;
                Ok(Some(identifier))
            }
            _ => Ok(None),
        }
    }

    async fn register_identifier(&self, topic: &TopicId) -> PolicyResult<String> {
        let did_document = self.services.identity.create_did(topic).await?;
        self.services
            .ledger
            .submit(
                topic,
                json!({
                    "action": "register-did",
                    "document": did_document.document,
                }),
            )
            .await?;
        let record = PolicyDocument::new(did_document.document.clone())
            .with_owner(did_document.identifier.clone());
        self.services.documents.save_identifier_document(record).await?;
        Ok(did_document.identifier)
    }

    /// Resolve the block's schema option through the document store.
    /// Looked up on every call so a schema published after activation
    /// heals the block without a restart.
    async fn resolved_schema(
        &self,
        block: &BlockConfig,
        options: &Map<String, Value>,
    ) -> PolicyResult<SchemaRecord> {
        let iri = options
            .get("schema")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PolicyError::action(
                    "Option \"schema\" is not set",
                    &block.block_type,
                    block.id.clone(),
                )
            })?;
        let topic = self.tree.context().topic_id.as_ref();
        match self.services.documents.get_schema_by_iri(iri, topic).await? {
            Some(schema) => Ok(schema),
            None => Err(PolicyError::WaitingForSchema {
                block_type: block.block_type.clone(),
                block_id: block.id.clone(),
            }),
        }
    }

    fn preset_fields(
        &self,
        block: &BlockConfig,
        options: &Map<String, Value>,
    ) -> PolicyResult<Vec<PresetField>> {
        match options.get("presetFields") {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|_| {
                PolicyError::action(
                    "Option \"presetFields\" is malformed",
                    &block.block_type,
                    block.id.clone(),
                )
            }),
        }
    }

    /// Tag an error with the acting block unless it already carries
    /// one
    fn as_action(&self, block: &BlockConfig, error: PolicyError) -> PolicyError {
        match error {
            error @ (PolicyError::Action { .. } | PolicyError::WaitingForSchema { .. }) => error,
            other => PolicyError::action(other.to_string(), &block.block_type, block.id.clone()),
        }
    }
}

/// Readonly preset fields whose submitted value differs from the
/// preset document's value (deep equality; a dropped field counts as
/// modified)
fn modified_readonly_fields(
    preset_fields: &[PresetField],
    document: &Value,
    preset_document: Option<&Value>,
) -> Vec<String> {
    let Some(preset_document) = preset_document else {
        return Vec::new();
    };
    preset_fields
        .iter()
        .filter(|field| {
            field.readonly && preset_document.get(&field.name) != document.get(&field.name)
        })
        .map(|field| field.name.clone())
        .collect()
}
