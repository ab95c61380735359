//! Document payloads routed by the engine
//!
//! The engine does not interpret credential documents beyond the few
//! fields it stamps (`id`, `ref`, `policyId`); the wire schema belongs
//! to the credential subsystem.

use crate::TopicId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A document moving through the policy: the raw JSON plus the
/// routing metadata blocks attach to it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// The document body (for credentials: the credential subject or
    /// the full signed credential)
    pub document: Value,
    /// Reference to a related document, when this one was derived
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Schema IRI the document conforms to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_iri: Option<String>,
    /// DID of the document owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl PolicyDocument {
    pub fn new(document: Value) -> Self {
        Self {
            document,
            reference: None,
            schema_iri: None,
            owner: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_schema(mut self, iri: impl Into<String>) -> Self {
        self.schema_iri = Some(iri.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// The first credential subject, when the body is a signed
    /// credential rather than a bare subject
    pub fn credential_subject(&self) -> Option<&Value> {
        match self.document.get("credentialSubject") {
            Some(Value::Array(subjects)) => subjects.first(),
            Some(subject) => Some(subject),
            None => None,
        }
    }

    /// The subject identifier, wherever the body keeps it
    pub fn subject_id(&self) -> Option<&str> {
        self.credential_subject()
            .or(Some(&self.document))
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str)
    }
}

/// A schema resolved through the document store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Schema IRI, unique within a topic
    pub iri: String,
    /// Topic the schema was published under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<TopicId>,
    /// The schema definition document
    pub definition: Value,
}

impl SchemaRecord {
    pub fn new(iri: impl Into<String>, definition: Value) -> Self {
        Self {
            iri: iri.into(),
            topic_id: None,
            definition,
        }
    }
}

/// A field of a preset reference document
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresetField {
    /// Field name in the credential subject
    pub name: String,
    /// Display title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Whether callers may change the preset value
    #[serde(default)]
    pub readonly: bool,
}

impl PresetField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            readonly: false,
        }
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }
}

/// A freshly created decentralized identifier, as returned by the
/// identity collaborator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DidDocument {
    /// The identifier itself
    pub identifier: String,
    /// The published DID document
    pub document: Value,
    /// Private key material; the engine only forwards it to the wallet
    pub private_key: String,
}

/// Receipt for a message accepted by the ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub message_id: String,
    pub topic_id: TopicId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credential_subject_from_array() {
        let doc = PolicyDocument::new(json!({
            "credentialSubject": [{"id": "did:verdant:alice", "amount": 10}]
        }));
        assert_eq!(doc.credential_subject().unwrap()["amount"], 10);
        assert_eq!(doc.subject_id(), Some("did:verdant:alice"));
    }

    #[test]
    fn test_subject_id_from_bare_document() {
        let doc = PolicyDocument::new(json!({"id": "did:verdant:bob"}));
        assert_eq!(doc.subject_id(), Some("did:verdant:bob"));
    }

    #[test]
    fn test_ref_field_name() {
        let doc = PolicyDocument::new(json!({})).with_reference("doc-1");
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["ref"], "doc-1");
    }
}
