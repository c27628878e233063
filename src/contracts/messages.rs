//! Typed shapes of the inbound document-exchange events.
//!
//! Every counterparty event shares the `{ version, messageType, context, data }` envelope.
//! Payloads are checked against the processor's JSON Schema before they are decoded into
//! these types, so decoding only fails on shapes the schema does not pin down.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub version: u32,
    pub message_type: String,
    pub context: MessageContext,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub date: String,
    pub sender: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeData {
    pub id: String,
    pub product_id: String,
    pub category_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentData {
    pub id: String,
    pub name: String,
    pub product_id: String,
    pub category_id: String,
    pub type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequestData {
    pub request_id: String,
    pub company_id: String,
    pub types: Vec<TypeData>,
    #[serde(default)]
    pub forms: Vec<DocumentData>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

pub type DocumentRequestMessage = Envelope<DocumentRequestData>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteOrigin {
    OutgoingRequest,
    IncomingRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestNoteData {
    pub request_id: String,
    pub origin: NoteOrigin,
    pub note: Note,
}

pub type DocumentRequestNoteMessage = Envelope<RequestNoteData>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissedTypesData {
    pub request_id: String,
    pub dismissed_types: Vec<String>,
}

pub type DismissedTypesMessage = Envelope<DismissedTypesData>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDocumentsData {
    pub documents: Vec<DocumentData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_id: Option<String>,
    #[serde(default)]
    pub review_not_required: bool,
    #[serde(default)]
    pub document_share_notification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

pub type SendDocumentsMessage = Envelope<SendDocumentsData>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFeedbackData {
    pub document_id: String,
    pub status: FeedbackStatus,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_id: Option<String>,
    pub documents: Vec<DocumentFeedbackData>,
}

pub type DocumentFeedbackMessage = Envelope<FeedbackData>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionContext {
    pub product_id: String,
    pub document_id: String,
}

/// Result of a blockchain registration, published by the transaction signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResultMessage {
    pub message_type: String,
    pub tx_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub context: TransactionContext,
}

/// Internal fan-out sent once received documents are stored. Document content is stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReceivedMessage {
    pub context: MessageContext,
    pub documents: Vec<DocumentData>,
    pub sender_static_id: String,
}
