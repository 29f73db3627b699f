//! Conversion between storage form and application form.
//!
//! Each generic entity implements [`Retime`], which rebuilds the entity with
//! every timestamp field passed through a [`TimeMapper`] and every other field
//! copied unchanged. Two mappers exist: [`ToApplication`] (infallible) and
//! [`ToStorage`] (fails on unparsable or missing required timestamps).
//!
//! [`Entity`] ties an application-form body to its collection name and its
//! storage type; [`to_application_form`] and [`to_storage_form`] work on whole
//! records.

use std::convert::Infallible;

use serde::{Serialize, de::DeserializeOwned};

use crate::{
  Error, Result,
  entity::{
    Answer, Attachment, Audit, Company, HistoryEntry, Pir, Product, Question,
    Record, Tag, UserProfile,
  },
  timestamp::{Timestamp, format_iso, to_application_string, to_storage_handle},
};

// ─── Mappers ─────────────────────────────────────────────────────────────────

/// Converts individual timestamp values from `T` to `U`.
///
/// `field` is the wire name of the field being converted.
pub trait TimeMapper<T, U> {
  type Error;

  fn required(&mut self, field: &'static str, value: &T) -> Result<U, Self::Error>;

  fn optional(
    &mut self,
    field: &'static str,
    value: Option<&T>,
  ) -> Result<Option<U>, Self::Error>;
}

/// Storage handle → ISO-8601 string.
pub struct ToApplication;

impl TimeMapper<Timestamp, String> for ToApplication {
  type Error = Infallible;

  fn required(&mut self, _: &'static str, value: &Timestamp) -> Result<String, Infallible> {
    Ok(format_iso(value.to_date()))
  }

  fn optional(
    &mut self,
    _: &'static str,
    value: Option<&Timestamp>,
  ) -> Result<Option<String>, Infallible> {
    Ok(to_application_string(value))
  }
}

/// ISO-8601 string → storage handle. An empty required field is an error,
/// never a default.
pub struct ToStorage;

impl TimeMapper<String, Timestamp> for ToStorage {
  type Error = Error;

  fn required(&mut self, field: &'static str, value: &String) -> Result<Timestamp> {
    to_storage_handle(Some(value.as_str()))?.ok_or(Error::MissingTimestamp(field))
  }

  fn optional(
    &mut self,
    _: &'static str,
    value: Option<&String>,
  ) -> Result<Option<Timestamp>> {
    to_storage_handle(value.map(String::as_str))
  }
}

// ─── Retime ──────────────────────────────────────────────────────────────────

/// An entity whose timestamp representation can be swapped.
pub trait Retime<T> {
  type With<U>;

  fn retime<U, M>(&self, mapper: &mut M) -> Result<Self::With<U>, M::Error>
  where
    M: TimeMapper<T, U>;
}

impl<T> Retime<T> for Audit<T> {
  type With<U> = Audit<U>;

  fn retime<U, M>(&self, m: &mut M) -> Result<Audit<U>, M::Error>
  where
    M: TimeMapper<T, U>,
  {
    Ok(Audit {
      created_at: m.required("createdAt", &self.created_at)?,
      updated_at: m.required("updatedAt", &self.updated_at)?,
      created_by: self.created_by.clone(),
    })
  }
}

impl<T> Retime<T> for Pir<T> {
  type With<U> = Pir<U>;

  fn retime<U, M>(&self, m: &mut M) -> Result<Pir<U>, M::Error>
  where
    M: TimeMapper<T, U>,
  {
    Ok(Pir {
      title:        self.title.clone(),
      description:  self.description.clone(),
      status:       self.status,
      tag_ids:      self.tag_ids.clone(),
      product_id:   self.product_id.clone(),
      company_id:   self.company_id.clone(),
      question_ids: self.question_ids.clone(),
      submitted_at: m.optional("submittedAt", self.submitted_at.as_ref())?,
      reviewed_at:  m.optional("reviewedAt", self.reviewed_at.as_ref())?,
      accepted_at:  m.optional("acceptedAt", self.accepted_at.as_ref())?,
      audit:        self.audit.retime(m)?,
    })
  }
}

impl<T> Retime<T> for Question<T> {
  type With<U> = Question<U>;

  fn retime<U, M>(&self, m: &mut M) -> Result<Question<U>, M::Error>
  where
    M: TimeMapper<T, U>,
  {
    Ok(Question {
      text:     self.text.clone(),
      tag_ids:  self.tag_ids.clone(),
      kind:     self.kind,
      required: self.required,
      options:  self.options.clone(),
      audit:    self.audit.retime(m)?,
    })
  }
}

impl<T> Retime<T> for HistoryEntry<T> {
  type With<U> = HistoryEntry<U>;

  fn retime<U, M>(&self, m: &mut M) -> Result<HistoryEntry<U>, M::Error>
  where
    M: TimeMapper<T, U>,
  {
    Ok(HistoryEntry {
      timestamp:   m.required("timestamp", &self.timestamp)?,
      user_id:     self.user_id.clone(),
      answer_text: self.answer_text.clone(),
      status:      self.status,
      comment:     self.comment.clone(),
    })
  }
}

impl<T> Retime<T> for Answer<T> {
  type With<U> = Answer<U>;

  fn retime<U, M>(&self, m: &mut M) -> Result<Answer<U>, M::Error>
  where
    M: TimeMapper<T, U>,
  {
    let history = self
      .history
      .iter()
      .map(|entry| entry.retime(m))
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Answer {
      pir_id: self.pir_id.clone(),
      question_id: self.question_id.clone(),
      answer_text: self.answer_text.clone(),
      status: self.status,
      history,
      audit: self.audit.retime(m)?,
    })
  }
}

impl<T> Retime<T> for Tag<T> {
  type With<U> = Tag<U>;

  fn retime<U, M>(&self, m: &mut M) -> Result<Tag<U>, M::Error>
  where
    M: TimeMapper<T, U>,
  {
    Ok(Tag {
      label:       self.label.clone(),
      description: self.description.clone(),
      parent_id:   self.parent_id.clone(),
      audit:       self.audit.retime(m)?,
    })
  }
}

impl<T> Retime<T> for Product<T> {
  type With<U> = Product<U>;

  fn retime<U, M>(&self, m: &mut M) -> Result<Product<U>, M::Error>
  where
    M: TimeMapper<T, U>,
  {
    Ok(Product {
      name:        self.name.clone(),
      description: self.description.clone(),
      audit:       self.audit.retime(m)?,
    })
  }
}

impl<T> Retime<T> for Company<T> {
  type With<U> = Company<U>;

  fn retime<U, M>(&self, m: &mut M) -> Result<Company<U>, M::Error>
  where
    M: TimeMapper<T, U>,
  {
    Ok(Company {
      name:        self.name.clone(),
      description: self.description.clone(),
      audit:       self.audit.retime(m)?,
    })
  }
}

impl<T> Retime<T> for Attachment<T> {
  type With<U> = Attachment<U>;

  fn retime<U, M>(&self, m: &mut M) -> Result<Attachment<U>, M::Error>
  where
    M: TimeMapper<T, U>,
  {
    Ok(Attachment {
      file_name:     self.file_name.clone(),
      file_type:     self.file_type.clone(),
      file_size:     self.file_size,
      download_url:  self.download_url.clone(),
      created_at:    m.required("createdAt", &self.created_at)?,
      created_by:    self.created_by.clone(),
      pir_id:        self.pir_id.clone(),
      question_id:   self.question_id.clone(),
      answer_doc_id: self.answer_doc_id.clone(),
    })
  }
}

/// Storage form → application form for any retimeable value.
pub fn application<R: Retime<Timestamp>>(stored: &R) -> R::With<String> {
  match stored.retime::<String, _>(&mut ToApplication) {
    Ok(converted) => converted,
    Err(never) => match never {},
  }
}

/// Application form → storage form for any retimeable value.
pub fn storage<R: Retime<String>>(value: &R) -> Result<R::With<Timestamp>> {
  value.retime::<Timestamp, _>(&mut ToStorage)
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// An application-form entity body that lives in its own collection.
pub trait Entity:
  Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
  /// Name of the collection holding documents of this entity.
  const COLLECTION: &'static str;

  /// The body as it is persisted.
  type Stored: Serialize + DeserializeOwned + Send + Sync + 'static;

  fn from_stored(stored: &Self::Stored) -> Self;

  fn to_stored(&self) -> Result<Self::Stored>;

  /// Domain rules checked before a write. Nothing by default.
  fn validate(&self) -> Result<()> { Ok(()) }
}

impl Entity for Pir {
  const COLLECTION: &'static str = "pirs";
  type Stored = Pir<Timestamp>;

  fn from_stored(stored: &Self::Stored) -> Self { application(stored) }

  fn to_stored(&self) -> Result<Self::Stored> { storage(self) }

  fn validate(&self) -> Result<()> { Pir::validate(self) }
}

impl Entity for Question {
  const COLLECTION: &'static str = "questions";
  type Stored = Question<Timestamp>;

  fn from_stored(stored: &Self::Stored) -> Self { application(stored) }

  fn to_stored(&self) -> Result<Self::Stored> { storage(self) }

  fn validate(&self) -> Result<()> { Question::validate(self) }
}

impl Entity for Answer {
  const COLLECTION: &'static str = "answers";
  type Stored = Answer<Timestamp>;

  fn from_stored(stored: &Self::Stored) -> Self { application(stored) }

  fn to_stored(&self) -> Result<Self::Stored> { storage(self) }

  fn validate(&self) -> Result<()> { Answer::validate(self) }
}

impl Entity for Tag {
  const COLLECTION: &'static str = "tags";
  type Stored = Tag<Timestamp>;

  fn from_stored(stored: &Self::Stored) -> Self { application(stored) }

  fn to_stored(&self) -> Result<Self::Stored> { storage(self) }
}

impl Entity for Product {
  const COLLECTION: &'static str = "products";
  type Stored = Product<Timestamp>;

  fn from_stored(stored: &Self::Stored) -> Self { application(stored) }

  fn to_stored(&self) -> Result<Self::Stored> { storage(self) }
}

impl Entity for Company {
  const COLLECTION: &'static str = "companies";
  type Stored = Company<Timestamp>;

  fn from_stored(stored: &Self::Stored) -> Self { application(stored) }

  fn to_stored(&self) -> Result<Self::Stored> { storage(self) }
}

impl Entity for Attachment {
  const COLLECTION: &'static str = "attachments";
  type Stored = Attachment<Timestamp>;

  fn from_stored(stored: &Self::Stored) -> Self { application(stored) }

  fn to_stored(&self) -> Result<Self::Stored> { storage(self) }
}

impl Entity for UserProfile {
  const COLLECTION: &'static str = "users";
  type Stored = UserProfile;

  fn from_stored(stored: &Self::Stored) -> Self { stored.clone() }

  fn to_stored(&self) -> Result<Self::Stored> { Ok(self.clone()) }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Storage-form record → application-form record.
pub fn to_application_form<E: Entity>(stored: &Record<E::Stored>) -> Record<E> {
  Record::new(stored.id.clone(), E::from_stored(&stored.data))
}

/// Application-form record → storage-form body. The identifier is dropped:
/// it is the document key, not part of the document.
pub fn to_storage_form<E: Entity>(record: &Record<E>) -> Result<E::Stored> {
  record.data.to_stored()
}

// ─── Answer document ids ─────────────────────────────────────────────────────

/// The document id of the answer to `question_id` within `pir_id`.
///
/// Ids are joined with `_` and not escaped, so ids that themselves contain
/// `_` can collide: `("pir1_q", "1")` and `("pir1", "q_1")` both map to
/// `pir1_q_1`. Callers must keep the delimiter out of one side of the pair.
pub fn answer_doc_id(pir_id: &str, question_id: &str) -> String {
  format!("{pir_id}_{question_id}")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::{AnswerStatus, PirStatus, StoredAnswer, StoredPir};

  fn ts(iso: &str) -> Timestamp {
    to_storage_handle(Some(iso)).unwrap().unwrap()
  }

  fn stored_pir() -> Record<StoredPir> {
    Record::new(
      "p1",
      Pir {
        title:        "X".into(),
        description:  String::new(),
        status:       PirStatus::Submitted,
        tag_ids:      vec!["t1".into()],
        product_id:   "pr1".into(),
        company_id:   "c1".into(),
        question_ids: None,
        submitted_at: Some(ts("2024-01-03T00:00:00.000Z")),
        reviewed_at:  None,
        accepted_at:  None,
        audit:        Audit {
          created_at: ts("2024-01-01T00:00:00.000Z"),
          updated_at: ts("2024-01-02T00:00:00.000Z"),
          created_by: "u1".into(),
        },
      },
    )
  }

  #[test]
  fn pir_converts_to_application_form() {
    let app: Record<Pir> = to_application_form(&stored_pir());

    assert_eq!(app.id, "p1");
    assert_eq!(app.data.title, "X");
    assert_eq!(app.data.status, PirStatus::Submitted);
    assert_eq!(app.data.tag_ids, ["t1"]);
    assert_eq!(app.data.product_id, "pr1");
    assert_eq!(app.data.company_id, "c1");
    assert_eq!(app.data.audit.created_at, "2024-01-01T00:00:00.000Z");
    assert_eq!(app.data.audit.updated_at, "2024-01-02T00:00:00.000Z");
    assert_eq!(app.data.submitted_at.as_deref(), Some("2024-01-03T00:00:00.000Z"));
    assert_eq!(app.data.reviewed_at, None);
    assert_eq!(app.data.accepted_at, None);
  }

  #[test]
  fn pir_round_trips_through_application_form() {
    let mut stored = stored_pir();
    stored.data.status = PirStatus::Accepted;
    stored.data.question_ids = Some(vec!["q1".into(), "q2".into()]);
    stored.data.reviewed_at = Some(ts("2024-01-04T00:00:00.000Z"));
    stored.data.accepted_at = Some(ts("2024-01-05T12:30:00.250Z"));

    let app: Record<Pir> = to_application_form(&stored);
    let back = to_storage_form(&app).unwrap();
    assert_eq!(back, stored.data);
  }

  #[test]
  fn absent_optional_timestamps_stay_absent() {
    let stored = stored_pir();
    let app: Record<Pir> = to_application_form(&stored);
    let back = to_storage_form(&app).unwrap();

    assert!(app.data.reviewed_at.is_none());
    assert!(back.reviewed_at.is_none());
    assert!(back.accepted_at.is_none());
  }

  #[test]
  fn empty_optional_string_maps_to_absent() {
    let mut app: Record<Pir> = to_application_form(&stored_pir());
    app.data.reviewed_at = Some(String::new());
    let back = to_storage_form(&app).unwrap();
    assert!(back.reviewed_at.is_none());
  }

  #[test]
  fn empty_required_timestamp_fails_loudly() {
    let mut app: Record<Pir> = to_application_form(&stored_pir());
    app.data.audit.created_at = String::new();
    let err = to_storage_form(&app).unwrap_err();
    assert!(matches!(err, Error::MissingTimestamp("createdAt")));
  }

  #[test]
  fn unparsable_timestamp_is_an_error() {
    let mut app: Record<Pir> = to_application_form(&stored_pir());
    app.data.submitted_at = Some("next tuesday".into());
    assert!(matches!(
      to_storage_form(&app).unwrap_err(),
      Error::InvalidTimestamp(_)
    ));
  }

  #[test]
  fn answer_history_keeps_order_and_fields() {
    let entry = |iso: &str, text: &str, status: AnswerStatus, comment: Option<&str>| HistoryEntry {
      timestamp:   ts(iso),
      user_id:     "u1".into(),
      answer_text: text.into(),
      status,
      comment:     comment.map(str::to_owned),
    };

    let stored: Record<StoredAnswer> = Record::new(
      answer_doc_id("p1", "q1"),
      Answer {
        pir_id:      "p1".into(),
        question_id: "q1".into(),
        answer_text: "final".into(),
        status:      AnswerStatus::Accepted,
        history:     vec![
          entry("2024-01-01T09:00:00.000Z", "draft", AnswerStatus::Draft, None),
          entry(
            "2024-01-02T09:00:00.000Z",
            "first",
            AnswerStatus::RevisionRequested,
            Some("needs units"),
          ),
          entry("2024-01-03T09:00:00.000Z", "final", AnswerStatus::Accepted, None),
        ],
        audit:       Audit {
          created_at: ts("2024-01-01T09:00:00.000Z"),
          updated_at: ts("2024-01-03T09:00:00.000Z"),
          created_by: "u1".into(),
        },
      },
    );

    let app: Record<Answer> = to_application_form(&stored);
    let stamps: Vec<&str> =
      app.data.history.iter().map(|e| e.timestamp.as_str()).collect();
    assert_eq!(
      stamps,
      [
        "2024-01-01T09:00:00.000Z",
        "2024-01-02T09:00:00.000Z",
        "2024-01-03T09:00:00.000Z",
      ]
    );
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(app.data.history[1].comment.as_deref(), Some("needs units"));
    assert_eq!(app.data.history[1].status, AnswerStatus::RevisionRequested);
    assert_eq!(app.data.history[2].answer_text, "final");

    assert_eq!(to_storage_form(&app).unwrap(), stored.data);
  }

  #[test]
  fn attachment_converts_its_single_timestamp() {
    let stored = Attachment {
      file_name:     "allergen-sheet.pdf".into(),
      file_type:     "application/pdf".into(),
      file_size:     1024,
      download_url:  "https://files.example.com/allergen-sheet.pdf".into(),
      created_at:    ts("2024-02-01T10:00:00.000Z"),
      created_by:    "u1".into(),
      pir_id:        "p1".into(),
      question_id:   Some("q1".into()),
      answer_doc_id: Some(answer_doc_id("p1", "q1")),
    };
    let app: Attachment = application(&stored);
    assert_eq!(app.created_at, "2024-02-01T10:00:00.000Z");
    assert_eq!(app.answer_doc_id.as_deref(), Some("p1_q1"));
    assert_eq!(storage(&app).unwrap(), stored);
  }

  #[test]
  fn conversion_leaves_input_untouched() {
    let stored = stored_pir();
    let snapshot = stored.clone();
    let first: Record<Pir> = to_application_form(&stored);
    let second: Record<Pir> = to_application_form(&stored);
    assert_eq!(stored, snapshot);
    assert_eq!(first, second);
  }

  #[test]
  fn answer_doc_id_joins_with_underscore() {
    assert_eq!(answer_doc_id("pir1", "q1"), "pir1_q1");
  }

  #[test]
  fn answer_doc_id_collides_when_ids_contain_the_delimiter() {
    // Known limitation: the delimiter is not escaped.
    assert_eq!(answer_doc_id("pir1_q", "1"), answer_doc_id("pir1", "q_1"));
  }

  #[test]
  fn collections_are_distinct() {
    let names = [
      Pir::COLLECTION,
      Question::COLLECTION,
      Answer::COLLECTION,
      Tag::COLLECTION,
      Product::COLLECTION,
      Company::COLLECTION,
      Attachment::COLLECTION,
      UserProfile::COLLECTION,
    ];
    let mut sorted = names.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), names.len());
  }
}
