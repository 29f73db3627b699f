//! Typed, application-form access to a backend.
//!
//! [`PirClient`] is created once at startup around a backend and cloned into
//! whatever needs it. It hands out a [`Collection`] per entity; every record
//! going in is converted to storage form, every record coming out is
//! converted to application form.

use std::{marker::PhantomData, sync::Arc};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{
  auth::{AuthProvider, AuthUser},
  convert::{Entity, answer_doc_id, storage, to_application_form, to_storage_form},
  entity::{
    Answer, Attachment, Company, HistoryEntry, Pir, PirStatus, Product, Question,
    Record, Tag, User, UserProfile,
  },
  lifecycle::Transition,
  store::{Direction, Document, DocumentStore, Patch, Query, Snapshot, Subscription, Target},
  timestamp::Timestamp,
};

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClientError<E: std::error::Error + 'static> {
  /// The backend failed; its error is passed through as is.
  #[error(transparent)]
  Store(E),

  /// A record could not be converted or violates a domain rule.
  #[error(transparent)]
  Model(#[from] crate::Error),

  #[error("{collection}/{id} not found")]
  NotFound { collection: &'static str, id: String },
}

pub type ClientResult<T, E> = std::result::Result<T, ClientError<E>>;

// ─── Client ──────────────────────────────────────────────────────────────────

/// The process-wide handle to a backend.
///
/// Cloning is cheap; all clones share one backend.
pub struct PirClient<B> {
  backend: Arc<B>,
}

impl<B> Clone for PirClient<B> {
  fn clone(&self) -> Self { Self { backend: Arc::clone(&self.backend) } }
}

impl<B> PirClient<B> {
  pub fn new(backend: B) -> Self { Self { backend: Arc::new(backend) } }

  pub fn from_shared(backend: Arc<B>) -> Self { Self { backend } }

  pub fn backend(&self) -> &B { &self.backend }
}

impl<B: DocumentStore> PirClient<B> {
  pub fn collection<E: Entity>(&self) -> Collection<'_, B, E> {
    Collection { store: &self.backend, _entity: PhantomData }
  }

  pub fn pirs(&self) -> Collection<'_, B, Pir> { self.collection() }

  pub fn questions(&self) -> Collection<'_, B, Question> { self.collection() }

  pub fn answers(&self) -> Collection<'_, B, Answer> { self.collection() }

  pub fn tags(&self) -> Collection<'_, B, Tag> { self.collection() }

  pub fn products(&self) -> Collection<'_, B, Product> { self.collection() }

  pub fn companies(&self) -> Collection<'_, B, Company> { self.collection() }

  pub fn users(&self) -> Collection<'_, B, UserProfile> { self.collection() }

  pub fn attachments(&self) -> Collection<'_, B, Attachment> { self.collection() }
}

impl<B: AuthProvider> PirClient<B> {
  pub fn auth(&self) -> &B { &self.backend }
}

impl<B: DocumentStore + AuthProvider> PirClient<B> {
  /// The profile document of the signed-in user, if signed in and present.
  pub async fn current_profile(
    &self,
  ) -> ClientResult<Option<User>, <B as DocumentStore>::Error> {
    match self.backend.current_user() {
      Some(user) => self.users().for_auth_user(&user).await,
      None => Ok(None),
    }
  }
}

// ─── Collection ──────────────────────────────────────────────────────────────

/// Typed access to the collection holding `E`.
pub struct Collection<'a, S, E> {
  store:   &'a S,
  _entity: PhantomData<fn() -> E>,
}

fn decode<E: Entity>(doc: Document) -> crate::Result<Record<E>> {
  let stored: E::Stored = serde_json::from_value(doc.data)?;
  Ok(to_application_form(&Record::new(doc.id, stored)))
}

fn encode<E: Entity>(body: &E) -> crate::Result<Value> {
  Ok(serde_json::to_value(body.to_stored()?)?)
}

impl<'a, S: DocumentStore, E: Entity> Collection<'a, S, E> {
  pub fn name(&self) -> &'static str { E::COLLECTION }

  pub async fn get(&self, id: &str) -> ClientResult<Option<Record<E>>, S::Error> {
    debug!(collection = E::COLLECTION, id, "get");
    let doc = self
      .store
      .get(E::COLLECTION, id)
      .await
      .map_err(ClientError::Store)?;
    Ok(doc.map(decode::<E>).transpose()?)
  }

  /// Like [`Collection::get`], but a missing document is an error.
  pub async fn fetch(&self, id: &str) -> ClientResult<Record<E>, S::Error> {
    self.get(id).await?.ok_or_else(|| ClientError::NotFound {
      collection: E::COLLECTION,
      id:         id.to_owned(),
    })
  }

  /// Create or overwrite the document `record.id`. The body is checked with
  /// [`Entity::validate`] first.
  pub async fn set(&self, record: &Record<E>) -> ClientResult<(), S::Error> {
    debug!(collection = E::COLLECTION, id = %record.id, "set");
    record.data.validate()?;
    let data = serde_json::to_value(to_storage_form(record)?).map_err(crate::Error::from)?;
    self
      .store
      .set(E::COLLECTION, &record.id, data)
      .await
      .map_err(ClientError::Store)
  }

  /// Create a document under a store-assigned id.
  pub async fn add(&self, body: E) -> ClientResult<Record<E>, S::Error> {
    body.validate()?;
    let data = encode(&body)?;
    let id = self
      .store
      .add(E::COLLECTION, data)
      .await
      .map_err(ClientError::Store)?;
    debug!(collection = E::COLLECTION, id, "added");
    Ok(Record::new(id, body))
  }

  /// Apply a partial update. The patch is in storage form: timestamp values
  /// must be serialised [`Timestamp`]s.
  pub async fn update(&self, id: &str, patch: &Patch) -> ClientResult<(), S::Error> {
    debug!(collection = E::COLLECTION, id, fields = patch.fields.len(), "update");
    self
      .store
      .update(E::COLLECTION, id, patch)
      .await
      .map_err(ClientError::Store)
  }

  pub async fn delete(&self, id: &str) -> ClientResult<(), S::Error> {
    debug!(collection = E::COLLECTION, id, "delete");
    self
      .store
      .delete(E::COLLECTION, id)
      .await
      .map_err(ClientError::Store)
  }

  pub async fn query(&self, query: &Query) -> ClientResult<Vec<Record<E>>, S::Error> {
    let docs = self
      .store
      .query(E::COLLECTION, query)
      .await
      .map_err(ClientError::Store)?;
    debug!(collection = E::COLLECTION, hits = docs.len(), "query");
    Ok(docs.into_iter().map(decode::<E>).collect::<crate::Result<Vec<_>>>()?)
  }

  /// Follow one document live.
  pub async fn watch(&self, id: &str) -> ClientResult<DocumentWatch<E>, S::Error> {
    let target = Target::Document {
      collection: E::COLLECTION.to_owned(),
      id:         id.to_owned(),
    };
    let inner = self.store.subscribe(target).await.map_err(ClientError::Store)?;
    Ok(DocumentWatch { inner, _entity: PhantomData })
  }

  /// Follow the result set of `query` live.
  pub async fn watch_query(&self, query: Query) -> ClientResult<QueryWatch<E>, S::Error> {
    let target = Target::Query { collection: E::COLLECTION.to_owned(), query };
    let inner = self.store.subscribe(target).await.map_err(ClientError::Store)?;
    Ok(QueryWatch { inner, _entity: PhantomData })
  }
}

// ─── Entity-specific access ──────────────────────────────────────────────────

impl<S: DocumentStore> Collection<'_, S, Pir> {
  /// Read the PIR, apply `transition` now, and write it back.
  ///
  /// This is a read-modify-write without a transaction; concurrent writers
  /// are last-write-wins, as the store decides.
  pub async fn apply(
    &self,
    id: &str,
    transition: Transition,
  ) -> ClientResult<Record<Pir>, S::Error> {
    let mut record = self.fetch(id).await?;
    record.data.apply(transition, Timestamp::now().to_string())?;
    self.set(&record).await?;
    Ok(record)
  }

  /// PIRs in `status`, newest first.
  pub async fn by_status(&self, status: PirStatus) -> ClientResult<Vec<Record<Pir>>, S::Error> {
    let query = Query::new()
      .where_eq("status", status.as_str())
      .order_by("createdAt", Direction::Desc);
    self.query(&query).await
  }
}

impl<S: DocumentStore> Collection<'_, S, Question> {
  /// Questions carrying `tag_id`.
  pub async fn for_tag(&self, tag_id: &str) -> ClientResult<Vec<Record<Question>>, S::Error> {
    let query = Query::new()
      .where_array_contains("tagIds", tag_id)
      .order_by("createdAt", Direction::Asc);
    self.query(&query).await
  }
}

impl<S: DocumentStore> Collection<'_, S, Answer> {
  /// The answer to `question_id` within `pir_id`, looked up by its derived
  /// document id.
  pub async fn get_for(
    &self,
    pir_id: &str,
    question_id: &str,
  ) -> ClientResult<Option<Record<Answer>>, S::Error> {
    self.get(&answer_doc_id(pir_id, question_id)).await
  }

  /// Write `answer` under its derived document id.
  pub async fn save(&self, answer: Answer) -> ClientResult<Record<Answer>, S::Error> {
    let record = Record::new(answer.doc_id(), answer);
    self.set(&record).await?;
    Ok(record)
  }

  /// Append `entry` to the stored history and make it the current answer in
  /// one partial update. The entry is added with array-union semantics, so
  /// an identical entry is not recorded twice.
  ///
  /// An entry older than the last recorded one is rejected with
  /// [`crate::Error::HistoryOutOfOrder`] and nothing is written. The check
  /// reads the answer first; a concurrent append can still slip in between.
  pub async fn append_history(
    &self,
    pir_id: &str,
    question_id: &str,
    entry: &HistoryEntry,
  ) -> ClientResult<(), S::Error> {
    let doc_id = answer_doc_id(pir_id, question_id);
    let stored = storage(entry)?;
    let mut current = self.fetch(&doc_id).await?.data.to_stored()?;
    current.record(stored.clone())?;

    let patch = Patch::new()
      .array_union(
        "history",
        vec![serde_json::to_value(&stored).map_err(crate::Error::from)?],
      )
      .set("answerText", entry.answer_text.clone())
      .set("status", entry.status.as_str())
      .set(
        "updatedAt",
        serde_json::to_value(stored.timestamp).map_err(crate::Error::from)?,
      );
    self.update(&doc_id, &patch).await
  }

  /// All answers belonging to `pir_id`.
  pub async fn for_pir(&self, pir_id: &str) -> ClientResult<Vec<Record<Answer>>, S::Error> {
    self.query(&Query::new().where_eq("pirId", pir_id)).await
  }
}

impl<S: DocumentStore> Collection<'_, S, Tag> {
  /// Direct children of `parent_id` in the tag tree.
  pub async fn children(&self, parent_id: &str) -> ClientResult<Vec<Record<Tag>>, S::Error> {
    self.query(&Query::new().where_eq("parentId", parent_id)).await
  }
}

impl<S: DocumentStore> Collection<'_, S, Attachment> {
  pub async fn for_pir(&self, pir_id: &str) -> ClientResult<Vec<Record<Attachment>>, S::Error> {
    let query = Query::new()
      .where_eq("pirId", pir_id)
      .order_by("createdAt", Direction::Asc);
    self.query(&query).await
  }
}

impl<S: DocumentStore> Collection<'_, S, UserProfile> {
  /// The profile stored under the uid of `user`.
  pub async fn for_auth_user(&self, user: &AuthUser) -> ClientResult<Option<User>, S::Error> {
    self.get(&user.uid).await
  }
}

// ─── Live views ──────────────────────────────────────────────────────────────

/// A live, application-form view of one document.
pub struct DocumentWatch<E> {
  inner:   Subscription,
  _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> DocumentWatch<E> {
  /// The next state of the document; `Ok(None)` once it is deleted, `None`
  /// when the feed ends.
  pub async fn next(&mut self) -> Option<crate::Result<Option<Record<E>>>> {
    loop {
      if let Snapshot::Document(doc) = self.inner.next().await? {
        return Some(doc.map(decode::<E>).transpose());
      }
    }
  }

  pub fn unsubscribe(self) { self.inner.unsubscribe() }
}

/// A live, application-form view of a query's result set.
pub struct QueryWatch<E> {
  inner:   Subscription,
  _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> QueryWatch<E> {
  pub async fn next(&mut self) -> Option<crate::Result<Vec<Record<E>>>> {
    loop {
      if let Snapshot::Query(docs) = self.inner.next().await? {
        return Some(docs.into_iter().map(decode::<E>).collect());
      }
    }
  }

  pub fn unsubscribe(self) { self.inner.unsubscribe() }
}
