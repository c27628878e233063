//! Persistence used by the document processors.
//!
//! Writes that a broker redelivery may repeat report [`WriteOutcome::Duplicate`] instead of
//! failing, so processors can skip their side effects on a second delivery.

use async_trait::async_trait;

use crate::contracts::messages::{DocumentData, FeedbackStatus, Note, NoteOrigin, TypeData};
use crate::contracts::ProcessingError;

pub mod memory;

pub use memory::InMemoryDocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Duplicate,
}

/// Identifies the follow-up work (tasks, notifications, fan-out) of one stored record.
///
/// A record is written before its follow-ups run. When a follow-up fails transiently the
/// message is redelivered and the write reports [`WriteOutcome::Duplicate`]; the processor
/// then checks this key to decide whether the follow-ups still have to run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EffectKey(String);

impl EffectKey {
    pub fn new(event_name: &str, product_id: &str, record_id: &str) -> Self {
        Self(format!("{}:{}:{}", event_name, product_id, record_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A document request received from a counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub id: String,
    pub product_id: String,
    pub company_id: String,
    pub types: Vec<TypeData>,
    pub forms: Vec<DocumentData>,
    pub notes: Vec<Note>,
}

/// A document request this node sent to a counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub id: String,
    pub product_id: String,
    pub company_id: String,
    pub types: Vec<String>,
    pub dismissed_types: Vec<String>,
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReview {
    pub document_id: String,
    pub status: FeedbackStatus,
    pub note: String,
}

/// Documents shared with this node by a counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedDocuments {
    pub product_id: String,
    pub company_id: String,
    pub request_id: Option<String>,
    pub share_id: Option<String>,
    pub documents: Vec<DocumentData>,
    pub reviews: Vec<DocumentReview>,
}

/// Feedback a counterparty gave on a document this node shared with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedDocumentFeedback {
    pub document_id: String,
    pub status: FeedbackStatus,
    pub note: String,
}

/// A document this node shared with a counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedDocument {
    pub product_id: String,
    pub document_id: String,
    pub company_id: String,
    pub feedback: Option<SharedDocumentFeedback>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    Pending,
    Confirmed { tx_hash: Option<String> },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub product_id: String,
    pub document_id: String,
    pub tx_id: String,
    pub state: RegistrationState,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_incoming_request(
        &self,
        request: IncomingRequest,
    ) -> Result<WriteOutcome, StoreError>;

    /// Appends a note to the incoming or outgoing request `origin` names. An identical
    /// note (same date and content) is a duplicate.
    async fn add_request_note(
        &self,
        product_id: &str,
        origin: NoteOrigin,
        request_id: &str,
        note: Note,
    ) -> Result<WriteOutcome, StoreError>;

    async fn dismiss_request_types(
        &self,
        product_id: &str,
        request_id: &str,
        type_ids: &[String],
    ) -> Result<(), StoreError>;

    /// Keyed by sender and share id when a share id is present, otherwise by sender and
    /// request id.
    async fn store_received_documents(
        &self,
        received: ReceivedDocuments,
    ) -> Result<WriteOutcome, StoreError>;

    /// Applies all feedback or none of it. Every document must have been shared with
    /// `company_id`.
    async fn record_feedback(
        &self,
        product_id: &str,
        company_id: &str,
        feedback: Vec<SharedDocumentFeedback>,
    ) -> Result<(), StoreError>;

    async fn update_registration(
        &self,
        product_id: &str,
        document_id: &str,
        tx_id: &str,
        state: RegistrationState,
    ) -> Result<(), StoreError>;

    async fn effects_completed(&self, key: &EffectKey) -> Result<bool, StoreError>;

    async fn mark_effects_completed(&self, key: &EffectKey) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for ProcessingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ProcessingError::invalid_message(err.to_string()),
            StoreError::Unavailable(_) => ProcessingError::transient(err.to_string()),
        }
    }
}
