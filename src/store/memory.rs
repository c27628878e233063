use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    DocumentStore, EffectKey, IncomingRequest, OutgoingRequest, ReceivedDocuments, Registration,
    RegistrationState, SharedDocument, SharedDocumentFeedback, StoreError, WriteOutcome,
};
use crate::contracts::messages::{Note, NoteOrigin};

type Key = (String, String);

fn key(product_id: &str, id: &str) -> Key {
    (product_id.to_string(), id.to_string())
}

#[derive(Default)]
struct Inner {
    incoming: HashMap<Key, IncomingRequest>,
    outgoing: HashMap<Key, OutgoingRequest>,
    received: HashMap<Key, ReceivedDocuments>,
    shared: HashMap<Key, SharedDocument>,
    registrations: HashMap<Key, Registration>,
    completed_effects: HashSet<EffectKey>,
}

/// Process-local store. State does not survive a restart.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_outgoing_request(&self, request: OutgoingRequest) {
        let mut inner = self.inner.write().await;
        inner
            .outgoing
            .insert(key(&request.product_id, &request.id), request);
    }

    pub async fn insert_shared_document(&self, document: SharedDocument) {
        let mut inner = self.inner.write().await;
        inner
            .shared
            .insert(key(&document.product_id, &document.document_id), document);
    }

    pub async fn incoming_request(&self, product_id: &str, id: &str) -> Option<IncomingRequest> {
        self.inner.read().await.incoming.get(&key(product_id, id)).cloned()
    }

    pub async fn outgoing_request(&self, product_id: &str, id: &str) -> Option<OutgoingRequest> {
        self.inner.read().await.outgoing.get(&key(product_id, id)).cloned()
    }

    pub async fn shared_document(&self, product_id: &str, document_id: &str) -> Option<SharedDocument> {
        self.inner
            .read()
            .await
            .shared
            .get(&key(product_id, document_id))
            .cloned()
    }

    pub async fn received_documents(&self, product_id: &str) -> Vec<ReceivedDocuments> {
        self.inner
            .read()
            .await
            .received
            .iter()
            .filter(|((product, _), _)| product == product_id)
            .map(|(_, received)| received.clone())
            .collect()
    }

    pub async fn registration(&self, product_id: &str, document_id: &str) -> Option<Registration> {
        self.inner
            .read()
            .await
            .registrations
            .get(&key(product_id, document_id))
            .cloned()
    }
}

fn push_note(notes: &mut Vec<Note>, note: Note) -> WriteOutcome {
    if notes
        .iter()
        .any(|existing| existing.date == note.date && existing.content == note.content)
    {
        return WriteOutcome::Duplicate;
    }
    notes.push(note);
    WriteOutcome::Created
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_incoming_request(
        &self,
        request: IncomingRequest,
    ) -> Result<WriteOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        let id = key(&request.product_id, &request.id);
        if inner.incoming.contains_key(&id) {
            return Ok(WriteOutcome::Duplicate);
        }
        inner.incoming.insert(id, request);
        Ok(WriteOutcome::Created)
    }

    async fn add_request_note(
        &self,
        product_id: &str,
        origin: NoteOrigin,
        request_id: &str,
        note: Note,
    ) -> Result<WriteOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        let id = key(product_id, request_id);
        let notes = match origin {
            NoteOrigin::IncomingRequest => inner.incoming.get_mut(&id).map(|r| &mut r.notes),
            NoteOrigin::OutgoingRequest => inner.outgoing.get_mut(&id).map(|r| &mut r.notes),
        }
        .ok_or_else(|| StoreError::NotFound(format!("Request {}", request_id)))?;

        Ok(push_note(notes, note))
    }

    async fn dismiss_request_types(
        &self,
        product_id: &str,
        request_id: &str,
        type_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let request = inner
            .outgoing
            .get_mut(&key(product_id, request_id))
            .ok_or_else(|| StoreError::NotFound(format!("Outgoing request {}", request_id)))?;

        for type_id in type_ids {
            if !request.dismissed_types.contains(type_id) {
                request.dismissed_types.push(type_id.clone());
            }
        }
        Ok(())
    }

    async fn store_received_documents(
        &self,
        received: ReceivedDocuments,
    ) -> Result<WriteOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        let id = match (&received.share_id, &received.request_id) {
            (Some(share_id), _) => format!("{}:share:{}", received.company_id, share_id),
            (None, Some(request_id)) => format!("{}:request:{}", received.company_id, request_id),
            (None, None) => uuid::Uuid::new_v4().to_string(),
        };
        let id = key(&received.product_id, &id);

        if inner.received.contains_key(&id) {
            return Ok(WriteOutcome::Duplicate);
        }
        inner.received.insert(id, received);
        Ok(WriteOutcome::Created)
    }

    async fn record_feedback(
        &self,
        product_id: &str,
        company_id: &str,
        feedback: Vec<SharedDocumentFeedback>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(unknown) = feedback.iter().find(|f| {
            !inner
                .shared
                .get(&key(product_id, &f.document_id))
                .is_some_and(|document| document.company_id == company_id)
        }) {
            return Err(StoreError::NotFound(format!(
                "Shared document {}",
                unknown.document_id
            )));
        }

        for item in feedback {
            if let Some(document) = inner.shared.get_mut(&key(product_id, &item.document_id)) {
                document.feedback = Some(item);
            }
        }
        Ok(())
    }

    async fn update_registration(
        &self,
        product_id: &str,
        document_id: &str,
        tx_id: &str,
        state: RegistrationState,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.registrations.insert(
            key(product_id, document_id),
            Registration {
                product_id: product_id.to_string(),
                document_id: document_id.to_string(),
                tx_id: tx_id.to_string(),
                state,
            },
        );
        Ok(())
    }

    async fn effects_completed(&self, key: &EffectKey) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.completed_effects.contains(key))
    }

    async fn mark_effects_completed(&self, key: &EffectKey) -> Result<(), StoreError> {
        self.inner.write().await.completed_effects.insert(key.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(content: &str) -> Note {
        Note {
            date: "2019-07-10T11:03:00Z".to_string(),
            sender: "bank".to_string(),
            content: content.to_string(),
        }
    }

    fn outgoing(id: &str) -> OutgoingRequest {
        OutgoingRequest {
            id: id.to_string(),
            product_id: "kyc".to_string(),
            company_id: "company-b".to_string(),
            types: vec!["passport".to_string()],
            dismissed_types: Vec::new(),
            notes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn identical_notes_are_duplicates() {
        let store = InMemoryDocumentStore::new();
        store.insert_outgoing_request(outgoing("r-1")).await;

        let first = store
            .add_request_note("kyc", NoteOrigin::OutgoingRequest, "r-1", note("hello"))
            .await
            .unwrap();
        let second = store
            .add_request_note("kyc", NoteOrigin::OutgoingRequest, "r-1", note("hello"))
            .await
            .unwrap();

        assert_eq!(first, WriteOutcome::Created);
        assert_eq!(second, WriteOutcome::Duplicate);
        assert_eq!(store.outgoing_request("kyc", "r-1").await.unwrap().notes.len(), 1);
    }

    #[tokio::test]
    async fn note_on_unknown_request_is_not_found() {
        let store = InMemoryDocumentStore::new();

        let err = store
            .add_request_note("kyc", NoteOrigin::IncomingRequest, "missing", note("hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn dismissing_types_is_idempotent() {
        let store = InMemoryDocumentStore::new();
        store.insert_outgoing_request(outgoing("r-1")).await;
        let types = vec!["passport".to_string()];

        store.dismiss_request_types("kyc", "r-1", &types).await.unwrap();
        store.dismiss_request_types("kyc", "r-1", &types).await.unwrap();

        assert_eq!(
            store.outgoing_request("kyc", "r-1").await.unwrap().dismissed_types,
            types
        );
    }

    #[tokio::test]
    async fn feedback_requires_document_shared_with_sender() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_shared_document(SharedDocument {
                product_id: "kyc".to_string(),
                document_id: "doc-1".to_string(),
                company_id: "company-b".to_string(),
                feedback: None,
            })
            .await;
        let feedback = SharedDocumentFeedback {
            document_id: "doc-1".to_string(),
            status: crate::contracts::messages::FeedbackStatus::Accepted,
            note: String::new(),
        };

        assert!(store
            .record_feedback("kyc", "company-c", vec![feedback.clone()])
            .await
            .is_err());
        store
            .record_feedback("kyc", "company-b", vec![feedback.clone()])
            .await
            .unwrap();

        assert_eq!(
            store.shared_document("kyc", "doc-1").await.unwrap().feedback,
            Some(feedback)
        );
    }

    fn shared(document_id: &str) -> SharedDocument {
        SharedDocument {
            product_id: "kyc".to_string(),
            document_id: document_id.to_string(),
            company_id: "company-b".to_string(),
            feedback: None,
        }
    }

    #[tokio::test]
    async fn feedback_batch_with_unknown_document_writes_nothing() {
        let store = InMemoryDocumentStore::new();
        store.insert_shared_document(shared("doc-1")).await;
        let batch: Vec<SharedDocumentFeedback> = ["doc-1", "doc-2"]
            .iter()
            .map(|id| SharedDocumentFeedback {
                document_id: id.to_string(),
                status: crate::contracts::messages::FeedbackStatus::Rejected,
                note: String::new(),
            })
            .collect();

        let err = store.record_feedback("kyc", "company-b", batch).await.unwrap_err();

        assert!(matches!(err, StoreError::NotFound(ref what) if what.contains("doc-2")));
        assert!(store.shared_document("kyc", "doc-1").await.unwrap().feedback.is_none());
    }

    fn received(company_id: &str, share_id: &str) -> ReceivedDocuments {
        ReceivedDocuments {
            product_id: "kyc".to_string(),
            company_id: company_id.to_string(),
            request_id: None,
            share_id: Some(share_id.to_string()),
            documents: Vec::new(),
            reviews: Vec::new(),
        }
    }

    #[tokio::test]
    async fn same_share_id_from_different_senders_is_not_a_duplicate() {
        let store = InMemoryDocumentStore::new();

        let first = store
            .store_received_documents(received("company-a", "share-1"))
            .await
            .unwrap();
        let other_sender = store
            .store_received_documents(received("company-b", "share-1"))
            .await
            .unwrap();
        let repeat = store
            .store_received_documents(received("company-a", "share-1"))
            .await
            .unwrap();

        assert_eq!(first, WriteOutcome::Created);
        assert_eq!(other_sender, WriteOutcome::Created);
        assert_eq!(repeat, WriteOutcome::Duplicate);
        assert_eq!(store.received_documents("kyc").await.len(), 2);
    }

    #[tokio::test]
    async fn effects_are_tracked_per_key() {
        let store = InMemoryDocumentStore::new();
        let key = EffectKey::new("SEND_DOCUMENTS", "kyc", "company-a:share-1");

        assert!(!store.effects_completed(&key).await.unwrap());
        store.mark_effects_completed(&key).await.unwrap();

        assert!(store.effects_completed(&key).await.unwrap());
        assert!(!store
            .effects_completed(&EffectKey::new("SEND_DOCUMENTS", "kyc", "company-b:share-1"))
            .await
            .unwrap());
    }
}
