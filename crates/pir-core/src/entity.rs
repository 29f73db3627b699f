//! The PIR domain catalogue.
//!
//! Every timestamp-bearing entity is declared once, generic over its
//! timestamp representation `T`:
//!
//! - storage form: `T = `[`Timestamp`], as documents sit in the store;
//! - application form: `T = String` (ISO-8601), the default, which is what
//!   callers of this crate see.
//!
//! Entity bodies never carry their own identifier. The identifier is the
//! document key and is attached by [`Record`].

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

// ─── Record ──────────────────────────────────────────────────────────────────

/// An entity body together with the identifier of the document holding it.
///
/// Serialises flat: `{"id": "...", <body fields>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<E> {
  pub id:   String,
  #[serde(flatten)]
  pub data: E,
}

impl<E> Record<E> {
  pub fn new(id: impl Into<String>, data: E) -> Self {
    Self { id: id.into(), data }
  }

  pub fn into_parts(self) -> (String, E) { (self.id, self.data) }
}

// ─── Enumerations ────────────────────────────────────────────────────────────

/// The four-stage PIR lifecycle. Variants are declared in lifecycle order, so
/// `Ord` compares stages.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PirStatus {
  Requested,
  Submitted,
  Reviewed,
  Accepted,
}

impl PirStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Requested => "requested",
      Self::Submitted => "submitted",
      Self::Reviewed => "reviewed",
      Self::Accepted => "accepted",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
  Unanswered,
  Draft,
  Submitted,
  Accepted,
  RevisionRequested,
}

impl AnswerStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Unanswered => "unanswered",
      Self::Draft => "draft",
      Self::Submitted => "submitted",
      Self::Accepted => "accepted",
      Self::RevisionRequested => "revision_requested",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
  Customer,
  Vendor,
  Reviewer,
  Admin,
}

impl UserRole {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Customer => "customer",
      Self::Vendor => "vendor",
      Self::Reviewer => "reviewer",
      Self::Admin => "admin",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
  Text,
  Select,
  Multiselect,
  Boolean,
}

impl QuestionType {
  /// Whether questions of this type carry a list of options.
  pub fn has_options(self) -> bool {
    matches!(self, Self::Select | Self::Multiselect)
  }
}

// ─── Base shape ──────────────────────────────────────────────────────────────

/// Creation and modification metadata shared by most entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit<T = String> {
  pub created_at: T,
  pub updated_at: T,
  /// The user id of the author.
  pub created_by: String,
}

impl<T: Clone> Audit<T> {
  /// Fresh metadata: created and last updated at the same instant.
  pub fn new(created_by: impl Into<String>, at: T) -> Self {
    Self { created_at: at.clone(), updated_at: at, created_by: created_by.into() }
  }
}

// ─── PIR ─────────────────────────────────────────────────────────────────────

/// A Product Information Request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Pir<T = String> {
  pub title:        String,
  pub description:  String,
  pub status:       PirStatus,
  /// At least one tag is required.
  pub tag_ids:      Vec<String>,
  pub product_id:   String,
  pub company_id:   String,
  /// Populated when the PIR is submitted.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub question_ids: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub submitted_at: Option<T>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reviewed_at:  Option<T>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub accepted_at:  Option<T>,
  #[serde(flatten)]
  pub audit:        Audit<T>,
}

impl<T: Clone> Pir<T> {
  /// A newly requested PIR with no lifecycle stamps.
  pub fn new(
    title: impl Into<String>,
    description: impl Into<String>,
    tag_ids: Vec<String>,
    product_id: impl Into<String>,
    company_id: impl Into<String>,
    audit: Audit<T>,
  ) -> Self {
    Self {
      title: title.into(),
      description: description.into(),
      status: PirStatus::Requested,
      tag_ids,
      product_id: product_id.into(),
      company_id: company_id.into(),
      question_ids: None,
      submitted_at: None,
      reviewed_at: None,
      accepted_at: None,
      audit,
    }
  }
}

// ─── Question ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question<T = String> {
  pub text:     String,
  pub tag_ids:  Vec<String>,
  #[serde(rename = "type")]
  pub kind:     QuestionType,
  pub required: bool,
  /// Present iff `kind` is `select` or `multiselect`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub options:  Option<Vec<String>>,
  #[serde(flatten)]
  pub audit:    Audit<T>,
}

// ─── Answer ──────────────────────────────────────────────────────────────────

/// One immutable entry in an answer's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry<T = String> {
  pub timestamp:   T,
  pub user_id:     String,
  pub answer_text: String,
  pub status:      AnswerStatus,
  /// Typically set when a revision is requested.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub comment:     Option<String>,
}

/// The answer to one question within one PIR. Stored under
/// [`answer_doc_id`](crate::convert::answer_doc_id)`(pir_id, question_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Answer<T = String> {
  pub pir_id:      String,
  pub question_id: String,
  pub answer_text: String,
  pub status:      AnswerStatus,
  /// Append-only, oldest first.
  #[serde(default)]
  pub history:     Vec<HistoryEntry<T>>,
  #[serde(flatten)]
  pub audit:       Audit<T>,
}

impl<T: Clone> Answer<T> {
  /// An empty answer slot for `(pir_id, question_id)`.
  pub fn unanswered(
    pir_id: impl Into<String>,
    question_id: impl Into<String>,
    audit: Audit<T>,
  ) -> Self {
    Self {
      pir_id: pir_id.into(),
      question_id: question_id.into(),
      answer_text: String::new(),
      status: AnswerStatus::Unanswered,
      history: Vec::new(),
      audit,
    }
  }

  /// The document identifier this answer lives under.
  pub fn doc_id(&self) -> String {
    crate::convert::answer_doc_id(&self.pir_id, &self.question_id)
  }
}

// ─── Tag, Product, Company ───────────────────────────────────────────────────

/// A hierarchical label. `parent_id` forms a tree; cycles are not detected
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag<T = String> {
  pub label:       String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent_id:   Option<String>,
  #[serde(flatten)]
  pub audit:       Audit<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product<T = String> {
  pub name:        String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(flatten)]
  pub audit:       Audit<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company<T = String> {
  pub name:        String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(flatten)]
  pub audit:       Audit<T>,
}

// ─── User ────────────────────────────────────────────────────────────────────

/// Profile data for a user, keyed by the authentication uid. Carries no
/// timestamps, so storage and application form coincide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  pub email:        String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  pub role:         UserRole,
}

pub type User = Record<UserProfile>;

// ─── Attachment ──────────────────────────────────────────────────────────────

/// File metadata attached to a PIR, optionally narrowed to a question or an
/// answer document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment<T = String> {
  pub file_name:     String,
  /// MIME type.
  pub file_type:     String,
  /// Size in bytes.
  pub file_size:     u64,
  pub download_url:  String,
  pub created_at:    T,
  pub created_by:    String,
  pub pir_id:        String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub question_id:   Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub answer_doc_id: Option<String>,
}

// ─── Storage-form aliases ────────────────────────────────────────────────────

pub type StoredPir = Pir<Timestamp>;
pub type StoredQuestion = Question<Timestamp>;
pub type StoredAnswer = Answer<Timestamp>;
pub type StoredHistoryEntry = HistoryEntry<Timestamp>;
pub type StoredTag = Tag<Timestamp>;
pub type StoredProduct = Product<Timestamp>;
pub type StoredCompany = Company<Timestamp>;
pub type StoredAttachment = Attachment<Timestamp>;

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn pir_wire_shape_is_camel_case_and_omits_absent_fields() {
    let pir = Record::new(
      "p1",
      Pir::new(
        "X",
        "desc",
        vec!["t1".into()],
        "pr1",
        "c1",
        Audit::new("u1", "2024-01-01T00:00:00.000Z".to_owned()),
      ),
    );

    let json = serde_json::to_value(&pir).unwrap();
    assert_eq!(
      json,
      json!({
        "id": "p1",
        "title": "X",
        "description": "desc",
        "status": "requested",
        "tagIds": ["t1"],
        "productId": "pr1",
        "companyId": "c1",
        "createdAt": "2024-01-01T00:00:00.000Z",
        "updatedAt": "2024-01-01T00:00:00.000Z",
        "createdBy": "u1",
      })
    );

    let back: Record<Pir> = serde_json::from_value(json).unwrap();
    assert_eq!(back, pir);
  }

  #[test]
  fn question_type_uses_the_type_key() {
    let q: Question = serde_json::from_value(json!({
      "text": "Colour?",
      "tagIds": ["t1"],
      "type": "select",
      "required": true,
      "options": ["red", "blue"],
      "createdAt": "2024-01-01T00:00:00.000Z",
      "updatedAt": "2024-01-01T00:00:00.000Z",
      "createdBy": "u1",
    }))
    .unwrap();
    assert_eq!(q.kind, QuestionType::Select);
    assert!(q.kind.has_options());
    assert_eq!(q.options.as_deref(), Some(&["red".to_owned(), "blue".to_owned()][..]));
  }

  #[test]
  fn answer_status_is_snake_case() {
    let v = serde_json::to_value(AnswerStatus::RevisionRequested).unwrap();
    assert_eq!(v, json!("revision_requested"));
    assert_eq!(AnswerStatus::RevisionRequested.as_str(), "revision_requested");
  }

  #[test]
  fn storage_forms_decode_without_optional_fields() {
    let stamp = json!({ "seconds": 1_704_067_200, "nanoseconds": 0 });
    let pir: StoredPir = serde_json::from_value(json!({
      "title": "X",
      "description": "",
      "status": "requested",
      "tagIds": ["t1"],
      "productId": "pr1",
      "companyId": "c1",
      "createdAt": stamp,
      "updatedAt": stamp,
      "createdBy": "u1",
    }))
    .unwrap();
    assert_eq!(pir.submitted_at, None);
    assert_eq!(pir.accepted_at, None);

    let answer: StoredAnswer = serde_json::from_value(json!({
      "pirId": "p1",
      "questionId": "q1",
      "answerText": "",
      "status": "unanswered",
      "createdAt": stamp,
      "updatedAt": stamp,
      "createdBy": "u1",
    }))
    .unwrap();
    assert!(answer.history.is_empty());
  }

  #[test]
  fn storage_form_requires_created_at() {
    let missing = json!({
      "name": "Acme",
      "updatedAt": { "seconds": 0, "nanoseconds": 0 },
      "createdBy": "u1",
    });
    assert!(serde_json::from_value::<StoredCompany>(missing).is_err());
  }

  #[test]
  fn pir_statuses_are_ordered_by_stage() {
    assert!(PirStatus::Requested < PirStatus::Submitted);
    assert!(PirStatus::Submitted < PirStatus::Reviewed);
    assert!(PirStatus::Reviewed < PirStatus::Accepted);
  }

  #[test]
  fn user_serialises_flat() {
    let user: User = Record::new(
      "uid-1",
      UserProfile {
        email:        "a@example.com".into(),
        display_name: None,
        role:         UserRole::Vendor,
      },
    );
    assert_eq!(
      serde_json::to_value(&user).unwrap(),
      json!({ "id": "uid-1", "email": "a@example.com", "role": "vendor" })
    );
  }
}
