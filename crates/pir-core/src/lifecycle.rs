//! PIR lifecycle transitions, answer history, and entity invariants.
//!
//! A PIR moves strictly forward: requested → submitted → reviewed →
//! accepted. Each step stamps the matching `*_at` field and bumps
//! `updated_at`; submission also fixes the question set. An answer's history
//! only grows, oldest entry first.
//!
//! Everything here is generic over the timestamp representation, so it works
//! on storage and application form alike.

use std::fmt::Display;

use crate::{
  Error, Result,
  entity::{Answer, HistoryEntry, Pir, PirStatus, Question},
};

// ─── Transitions ─────────────────────────────────────────────────────────────

/// A single forward step in the PIR lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
  /// requested → submitted, fixing the questions the vendor must answer.
  Submit { question_ids: Vec<String> },
  /// submitted → reviewed.
  Review,
  /// reviewed → accepted.
  Accept,
}

impl Transition {
  /// The status a PIR holds after this transition.
  pub fn target(&self) -> PirStatus {
    match self {
      Self::Submit { .. } => PirStatus::Submitted,
      Self::Review => PirStatus::Reviewed,
      Self::Accept => PirStatus::Accepted,
    }
  }
}

impl PirStatus {
  /// The stage that follows this one, if any.
  pub fn next(self) -> Option<Self> {
    match self {
      Self::Requested => Some(Self::Submitted),
      Self::Submitted => Some(Self::Reviewed),
      Self::Reviewed => Some(Self::Accepted),
      Self::Accepted => None,
    }
  }

  pub fn can_advance_to(self, to: Self) -> bool { self.next() == Some(to) }
}

impl<T: Clone> Pir<T> {
  /// Apply `transition` at instant `at`.
  ///
  /// Fails with [`Error::IllegalTransition`] unless the transition's target
  /// is the stage directly after the current one; the PIR is left untouched
  /// in that case.
  pub fn apply(&mut self, transition: Transition, at: T) -> Result<()> {
    let to = transition.target();
    if !self.status.can_advance_to(to) {
      return Err(Error::IllegalTransition { from: self.status, to });
    }

    match transition {
      Transition::Submit { question_ids } => {
        self.question_ids = Some(question_ids);
        self.submitted_at = Some(at.clone());
      }
      Transition::Review => self.reviewed_at = Some(at.clone()),
      Transition::Accept => self.accepted_at = Some(at.clone()),
    }

    self.status = to;
    self.audit.updated_at = at;
    Ok(())
  }
}

// ─── Answer history ──────────────────────────────────────────────────────────

impl<T: Ord + Clone + Display> Answer<T> {
  /// Append `entry` to the history and make it the current answer.
  ///
  /// Entries must arrive in chronological order; an entry older than the
  /// last recorded one is rejected and nothing changes.
  pub fn record(&mut self, entry: HistoryEntry<T>) -> Result<()> {
    if let Some(last) = self.history.last()
      && entry.timestamp < last.timestamp
    {
      return Err(Error::HistoryOutOfOrder(entry.timestamp.to_string()));
    }

    self.answer_text = entry.answer_text.clone();
    self.status = entry.status;
    self.audit.updated_at = entry.timestamp.clone();
    self.history.push(entry);
    Ok(())
  }

  /// The most recent history entry.
  pub fn latest(&self) -> Option<&HistoryEntry<T>> { self.history.last() }

  /// History entries must be in chronological order.
  pub fn validate(&self) -> Result<()> {
    match self.history.windows(2).find(|w| w[1].timestamp < w[0].timestamp) {
      Some(w) => Err(Error::HistoryOutOfOrder(w[1].timestamp.to_string())),
      None => Ok(()),
    }
  }
}

// ─── Invariants ──────────────────────────────────────────────────────────────

impl<T> Pir<T> {
  /// Check the structural invariants of a PIR: at least one tag, and each
  /// lifecycle field populated exactly when the status has reached the stage
  /// that sets it.
  pub fn validate(&self) -> Result<()> {
    if self.tag_ids.is_empty() {
      return Err(Error::NoTags);
    }

    if self.question_ids.is_some() && self.status < PirStatus::Submitted {
      return Err(Error::PrematureField {
        field:  "questionIds",
        status: self.status,
      });
    }

    let stamps = [
      ("submittedAt", self.submitted_at.is_some(), PirStatus::Submitted),
      ("reviewedAt", self.reviewed_at.is_some(), PirStatus::Reviewed),
      ("acceptedAt", self.accepted_at.is_some(), PirStatus::Accepted),
    ];
    for (field, present, stage) in stamps {
      let reached = self.status >= stage;
      if present && !reached {
        return Err(Error::PrematureField { field, status: self.status });
      }
      if !present && reached {
        return Err(Error::MissingLifecycleField { field, status: self.status });
      }
    }

    Ok(())
  }
}

impl<T> Question<T> {
  /// At least one tag, and `options` present iff the type calls for them.
  pub fn validate(&self) -> Result<()> {
    if self.tag_ids.is_empty() {
      return Err(Error::QuestionWithoutTags);
    }
    match (self.kind.has_options(), self.options.is_some()) {
      (true, false) => Err(Error::MissingOptions(self.kind)),
      (false, true) => Err(Error::UnexpectedOptions(self.kind)),
      _ => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::{AnswerStatus, Audit, QuestionType};

  fn requested() -> Pir {
    Pir::new(
      "Allergens",
      "Declare allergens",
      vec!["food".into()],
      "pr1",
      "c1",
      Audit::new("u1", "2024-01-01T00:00:00.000Z".to_owned()),
    )
  }

  #[test]
  fn full_lifecycle_stamps_each_stage() {
    let mut pir = requested();
    pir.validate().unwrap();

    pir
      .apply(
        Transition::Submit { question_ids: vec!["q1".into(), "q2".into()] },
        "2024-01-02T00:00:00.000Z".into(),
      )
      .unwrap();
    assert_eq!(pir.status, PirStatus::Submitted);
    assert_eq!(pir.question_ids.as_deref().map(<[String]>::len), Some(2));
    assert_eq!(pir.submitted_at.as_deref(), Some("2024-01-02T00:00:00.000Z"));
    assert!(pir.reviewed_at.is_none());
    pir.validate().unwrap();

    pir.apply(Transition::Review, "2024-01-03T00:00:00.000Z".into()).unwrap();
    pir.apply(Transition::Accept, "2024-01-04T00:00:00.000Z".into()).unwrap();

    assert_eq!(pir.status, PirStatus::Accepted);
    assert_eq!(pir.reviewed_at.as_deref(), Some("2024-01-03T00:00:00.000Z"));
    assert_eq!(pir.accepted_at.as_deref(), Some("2024-01-04T00:00:00.000Z"));
    assert_eq!(pir.audit.updated_at, "2024-01-04T00:00:00.000Z");
    assert_eq!(pir.audit.created_at, "2024-01-01T00:00:00.000Z");
    pir.validate().unwrap();
  }

  #[test]
  fn skipping_a_stage_is_rejected() {
    let mut pir = requested();
    let before = pir.clone();

    let err = pir.apply(Transition::Accept, "2024-01-02T00:00:00.000Z".into());
    assert!(matches!(
      err,
      Err(Error::IllegalTransition {
        from: PirStatus::Requested,
        to:   PirStatus::Accepted,
      })
    ));
    assert_eq!(pir, before);
  }

  #[test]
  fn accepted_is_terminal() {
    assert_eq!(PirStatus::Accepted.next(), None);
    assert!(!PirStatus::Accepted.can_advance_to(PirStatus::Requested));
    assert!(!PirStatus::Submitted.can_advance_to(PirStatus::Requested));
  }

  #[test]
  fn validate_requires_tags() {
    let mut pir = requested();
    pir.tag_ids.clear();
    assert!(matches!(pir.validate(), Err(Error::NoTags)));
  }

  #[test]
  fn validate_rejects_premature_stamps() {
    let mut pir = requested();
    pir.reviewed_at = Some("2024-01-02T00:00:00.000Z".into());
    assert!(matches!(
      pir.validate(),
      Err(Error::PrematureField { field: "reviewedAt", .. })
    ));

    let mut pir = requested();
    pir.question_ids = Some(vec!["q1".into()]);
    assert!(matches!(
      pir.validate(),
      Err(Error::PrematureField { field: "questionIds", .. })
    ));
  }

  #[test]
  fn validate_rejects_missing_stamps() {
    let mut pir = requested();
    pir.status = PirStatus::Reviewed;
    pir.submitted_at = Some("2024-01-02T00:00:00.000Z".into());
    assert!(matches!(
      pir.validate(),
      Err(Error::MissingLifecycleField { field: "reviewedAt", .. })
    ));
  }

  fn question(kind: QuestionType, options: Option<Vec<String>>) -> Question {
    Question {
      text: "?".into(),
      tag_ids: vec!["t1".into()],
      kind,
      required: true,
      options,
      audit: Audit::new("u1", "2024-01-01T00:00:00.000Z".to_owned()),
    }
  }

  #[test]
  fn question_options_follow_type() {
    question(QuestionType::Text, None).validate().unwrap();
    question(QuestionType::Boolean, None).validate().unwrap();
    question(QuestionType::Select, Some(vec!["a".into()])).validate().unwrap();
    question(QuestionType::Multiselect, Some(vec![])).validate().unwrap();

    assert!(matches!(
      question(QuestionType::Select, None).validate(),
      Err(Error::MissingOptions(QuestionType::Select))
    ));
    assert!(matches!(
      question(QuestionType::Text, Some(vec!["a".into()])).validate(),
      Err(Error::UnexpectedOptions(QuestionType::Text))
    ));
  }

  #[test]
  fn question_requires_tags() {
    let mut q = question(QuestionType::Text, None);
    q.tag_ids.clear();
    assert!(matches!(q.validate(), Err(Error::QuestionWithoutTags)));
  }

  fn entry(at: &str, text: &str, status: AnswerStatus) -> HistoryEntry {
    HistoryEntry {
      timestamp:   at.into(),
      user_id:     "vendor".into(),
      answer_text: text.into(),
      status,
      comment:     None,
    }
  }

  #[test]
  fn record_appends_and_updates_current_answer() {
    let mut answer = Answer::unanswered(
      "p1",
      "q1",
      Audit::new("u1", "2024-01-01T00:00:00.000Z".to_owned()),
    );

    answer
      .record(entry("2024-01-02T00:00:00.000Z", "peanuts", AnswerStatus::Draft))
      .unwrap();
    answer
      .record(entry("2024-01-03T00:00:00.000Z", "peanuts, soy", AnswerStatus::Submitted))
      .unwrap();

    assert_eq!(answer.history.len(), 2);
    assert_eq!(answer.answer_text, "peanuts, soy");
    assert_eq!(answer.status, AnswerStatus::Submitted);
    assert_eq!(answer.audit.updated_at, "2024-01-03T00:00:00.000Z");
    assert_eq!(answer.latest().map(|e| e.answer_text.as_str()), Some("peanuts, soy"));
    assert_eq!(answer.doc_id(), "p1_q1");
  }

  #[test]
  fn record_rejects_entries_from_the_past() {
    let mut answer = Answer::unanswered(
      "p1",
      "q1",
      Audit::new("u1", "2024-01-01T00:00:00.000Z".to_owned()),
    );
    answer
      .record(entry("2024-01-03T00:00:00.000Z", "b", AnswerStatus::Draft))
      .unwrap();

    let err = answer
      .record(entry("2024-01-02T00:00:00.000Z", "a", AnswerStatus::Draft))
      .unwrap_err();
    assert!(matches!(err, Error::HistoryOutOfOrder(_)));
    assert_eq!(answer.history.len(), 1);
    assert_eq!(answer.answer_text, "b");
  }

  #[test]
  fn validate_checks_history_order() {
    let mut answer = Answer::unanswered(
      "p1",
      "q1",
      Audit::new("u1", "2024-01-01T00:00:00.000Z".to_owned()),
    );
    answer.validate().unwrap();

    answer.history = vec![
      entry("2024-01-03T00:00:00.000Z", "b", AnswerStatus::Draft),
      entry("2024-01-02T00:00:00.000Z", "a", AnswerStatus::Draft),
    ];
    assert!(matches!(
      answer.validate(),
      Err(Error::HistoryOutOfOrder(at)) if at == "2024-01-02T00:00:00.000Z"
    ));
  }
}
