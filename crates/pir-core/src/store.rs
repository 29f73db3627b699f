//! The `DocumentStore` trait and supporting query, patch and subscription
//! types.
//!
//! The trait is implemented by storage backends (e.g. `pir-store-sqlite`).
//! [`crate::client`] builds typed, application-form access on top of it and
//! never talks to a concrete backend.
//!
//! Documents are JSON objects in storage form, keyed by `(collection, id)`.
//! The id is not part of the document body.

use std::{cmp::Ordering, future::Future};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tokio::{sync::mpsc, task::JoinHandle};

// ─── Documents ───────────────────────────────────────────────────────────────

/// A raw document as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub id:   String,
  /// Storage-form body; always a JSON object.
  pub data: Value,
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
  /// The field equals the value.
  Eq,
  /// The field is an array containing the value.
  ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
  /// Field path; nested fields are separated by `.`.
  pub field: String,
  pub op:    FilterOp,
  pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
  #[default]
  Asc,
  Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
  pub field:     String,
  pub direction: Direction,
}

/// Parameters for [`DocumentStore::query`].
///
/// Filters are conjunctive. Documents lacking an `order_by` field are
/// excluded from the result, matching the platform this layer was built for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
  pub filters:  Vec<Filter>,
  pub order_by: Vec<OrderBy>,
  pub limit:    Option<usize>,
}

impl Query {
  pub fn new() -> Self { Self::default() }

  pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
    self.filters.push(Filter {
      field: field.into(),
      op:    FilterOp::Eq,
      value: value.into(),
    });
    self
  }

  pub fn where_array_contains(
    mut self,
    field: impl Into<String>,
    value: impl Into<Value>,
  ) -> Self {
    self.filters.push(Filter {
      field: field.into(),
      op:    FilterOp::ArrayContains,
      value: value.into(),
    });
    self
  }

  pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
    self.order_by.push(OrderBy { field: field.into(), direction });
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  /// Whether `data` satisfies every filter and has every ordering field.
  pub fn matches(&self, data: &Value) -> bool {
    let filtered = self.filters.iter().all(|f| {
      let Some(field) = lookup(data, &f.field) else {
        return false;
      };
      match f.op {
        FilterOp::Eq => field == &f.value,
        FilterOp::ArrayContains => {
          field.as_array().is_some_and(|items| items.contains(&f.value))
        }
      }
    });
    filtered && self.order_by.iter().all(|o| lookup(data, &o.field).is_some())
  }

  /// Filter, order and truncate `docs`. Backends that cannot push the query
  /// down can load a whole collection and call this.
  pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
    let mut out: Vec<Document> =
      docs.into_iter().filter(|d| self.matches(&d.data)).collect();

    // Ties fall back to the document id so results are deterministic.
    out.sort_by(|a, b| {
      self
        .order_by
        .iter()
        .map(|o| {
          let ord = compare_values(lookup(&a.data, &o.field), lookup(&b.data, &o.field));
          match o.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
          }
        })
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.id.cmp(&b.id))
    });

    if let Some(limit) = self.limit {
      out.truncate(limit);
    }
    out
  }
}

/// Resolve a `.`-separated field path inside a JSON object.
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
  path.split('.').try_fold(data, |node, key| node.get(key))
}

/// Total order over JSON values used for `order_by`:
/// null < bool < number < timestamp < string < array < object.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
  match (a, b) {
    (None, None) => Ordering::Equal,
    (None, Some(_)) => Ordering::Less,
    (Some(_), None) => Ordering::Greater,
    (Some(a), Some(b)) => {
      let rank = type_rank(a).cmp(&type_rank(b));
      if rank.is_ne() {
        return rank;
      }
      match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
          .iter()
          .zip(y)
          .map(|(x, y)| compare_values(Some(x), Some(y)))
          .find(|ord| ord.is_ne())
          .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(_), Value::Object(_)) => {
          match (as_timestamp(a), as_timestamp(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => Ordering::Equal,
          }
        }
        _ => Ordering::Equal,
      }
    }
  }
}

/// Integers compare exactly; only pairs involving a float go through `f64`.
fn compare_numbers(x: &Number, y: &Number) -> Ordering {
  match (x.as_i64(), y.as_i64(), x.as_u64(), y.as_u64()) {
    (Some(x), Some(y), ..) => x.cmp(&y),
    (.., Some(x), Some(y)) => x.cmp(&y),
    // Negative against beyond `i64::MAX`.
    (Some(_), None, None, Some(_)) => Ordering::Less,
    (None, Some(_), Some(_), None) => Ordering::Greater,
    _ => {
      let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
      x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
  }
}

fn type_rank(v: &Value) -> u8 {
  match v {
    Value::Null => 0,
    Value::Bool(_) => 1,
    Value::Number(_) => 2,
    Value::Object(_) if as_timestamp(v).is_some() => 3,
    Value::String(_) => 4,
    Value::Array(_) => 5,
    Value::Object(_) => 6,
  }
}

/// Recognise a serialised storage timestamp.
fn as_timestamp(v: &Value) -> Option<(i64, u64)> {
  let obj = v.as_object()?;
  if obj.len() != 2 {
    return None;
  }
  Some((obj.get("seconds")?.as_i64()?, obj.get("nanoseconds")?.as_u64()?))
}

// ─── Partial updates ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
  /// Replace the field.
  Set(Value),
  /// Remove the field.
  Delete,
  /// Append each value not already present in the array field.
  ArrayUnion(Vec<Value>),
  /// Remove every occurrence of each value from the array field.
  ArrayRemove(Vec<Value>),
}

/// A partial update for [`DocumentStore::update`]. Fields not named are left
/// as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
  pub fields: Vec<(String, FieldUpdate)>,
}

impl Patch {
  pub fn new() -> Self { Self::default() }

  pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
    self.fields.push((field.into(), FieldUpdate::Set(value.into())));
    self
  }

  pub fn delete(mut self, field: impl Into<String>) -> Self {
    self.fields.push((field.into(), FieldUpdate::Delete));
    self
  }

  pub fn array_union(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
    self.fields.push((field.into(), FieldUpdate::ArrayUnion(values)));
    self
  }

  pub fn array_remove(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
    self.fields.push((field.into(), FieldUpdate::ArrayRemove(values)));
    self
  }

  /// Apply every field update, in order, to the JSON object `data`.
  /// Intermediate objects along a dotted path are created as needed.
  pub fn apply(&self, data: &mut Value) {
    for (path, update) in &self.fields {
      let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path.as_str()),
      };

      let Some(target) = parent_mut(data, parents) else {
        continue;
      };

      match update {
        FieldUpdate::Set(value) => {
          target.insert(leaf.to_owned(), value.clone());
        }
        FieldUpdate::Delete => {
          target.remove(leaf);
        }
        FieldUpdate::ArrayUnion(values) => {
          let slot = target
            .entry(leaf)
            .or_insert_with(|| Value::Array(Vec::new()));
          if !slot.is_array() {
            *slot = Value::Array(Vec::new());
          }
          if let Value::Array(items) = slot {
            for value in values {
              if !items.contains(value) {
                items.push(value.clone());
              }
            }
          }
        }
        FieldUpdate::ArrayRemove(values) => {
          if let Some(Value::Array(items)) = target.get_mut(leaf) {
            items.retain(|item| !values.contains(item));
          } else {
            target.insert(leaf.to_owned(), Value::Array(Vec::new()));
          }
        }
      }
    }
  }
}

/// Coerce `node` into an object, replacing any non-object value.
fn object_mut(node: &mut Value) -> Option<&mut Map<String, Value>> {
  if !node.is_object() {
    *node = Value::Object(Map::new());
  }
  node.as_object_mut()
}

/// The object holding the leaf of a dotted path, creating intermediate
/// objects along `parents` as needed.
fn parent_mut<'a>(
  data: &'a mut Value,
  parents: Option<&str>,
) -> Option<&'a mut Map<String, Value>> {
  let mut node = data;
  for key in parents.into_iter().flat_map(|p| p.split('.')) {
    node = object_mut(node)?
      .entry(key)
      .or_insert_with(|| Value::Object(Map::new()));
  }
  object_mut(node)
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

/// What a live subscription follows.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
  Document { collection: String, id: String },
  Query { collection: String, query: Query },
}

/// One delivery from a live subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
  /// Current state of a watched document; `None` once it is deleted.
  Document(Option<Document>),
  /// Current result set of a watched query.
  Query(Vec<Document>),
}

/// A live subscription. Each change to the watched target yields a fresh
/// [`Snapshot`]; the first snapshot is the state at subscription time.
///
/// Snapshots may lag behind writes made elsewhere, and there is no
/// reconciliation beyond always delivering whole states.
///
/// Dropping the subscription cancels it, as does [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
  rx:   mpsc::Receiver<Snapshot>,
  task: JoinHandle<()>,
}

impl Subscription {
  /// Wrap the receiving end fed by `task`. The task is aborted when the
  /// subscription ends.
  pub fn new(rx: mpsc::Receiver<Snapshot>, task: JoinHandle<()>) -> Self {
    Self { rx, task }
  }

  /// Wait for the next snapshot. `None` means the feed has ended.
  pub async fn next(&mut self) -> Option<Snapshot> { self.rx.recv().await }

  /// Stop the feed.
  pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
  fn drop(&mut self) { self.task.abort(); }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a document store backend.
///
/// Errors are the backend's own and are passed through untouched by higher
/// layers. There are no retries or timeouts at this level.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read one document. Returns `None` if it does not exist.
  fn get<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  /// Create or overwrite a document. `data` must be a JSON object.
  fn set<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
    data: Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Create a document under a store-assigned id and return that id.
  fn add<'a>(
    &'a self,
    collection: &'a str,
    data: Value,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  /// Apply a partial update. Fails if the document does not exist.
  fn update<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
    patch: &'a Patch,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Delete a document. Deleting a missing document is not an error.
  fn delete<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Run `query` over `collection`.
  fn query<'a>(
    &'a self,
    collection: &'a str,
    query: &'a Query,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + 'a;

  /// Start a live subscription on `target`.
  fn subscribe(
    &self,
    target: Target,
  ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn doc(id: &str, data: Value) -> Document {
    Document { id: id.into(), data }
  }

  fn ts(seconds: i64) -> Value { json!({ "seconds": seconds, "nanoseconds": 0 }) }

  #[test]
  fn eq_and_array_contains_filters() {
    let q = Query::new()
      .where_eq("status", "submitted")
      .where_array_contains("tagIds", "food");

    assert!(q.matches(&json!({ "status": "submitted", "tagIds": ["food", "eu"] })));
    assert!(!q.matches(&json!({ "status": "requested", "tagIds": ["food"] })));
    assert!(!q.matches(&json!({ "status": "submitted", "tagIds": ["eu"] })));
    assert!(!q.matches(&json!({ "status": "submitted" })));
  }

  #[test]
  fn nested_field_lookup() {
    let data = json!({ "a": { "b": { "c": 1 } } });
    assert_eq!(lookup(&data, "a.b.c"), Some(&json!(1)));
    assert_eq!(lookup(&data, "a.x"), None);
  }

  #[test]
  fn orders_timestamps_and_limits() {
    let docs = vec![
      doc("a", json!({ "createdAt": ts(30) })),
      doc("b", json!({ "createdAt": ts(10) })),
      doc("c", json!({ "createdAt": ts(20) })),
      doc("d", json!({ "other": true })),
    ];

    let asc = Query::new().order_by("createdAt", Direction::Asc).apply(docs.clone());
    let ids: Vec<_> = asc.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["b", "c", "a"]);

    let desc = Query::new()
      .order_by("createdAt", Direction::Desc)
      .limit(2)
      .apply(docs);
    let ids: Vec<_> = desc.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["a", "c"]);
  }

  #[test]
  fn ties_break_on_id() {
    let docs = vec![doc("z", json!({ "n": 1 })), doc("m", json!({ "n": 1 }))];
    let out = Query::new().order_by("n", Direction::Asc).apply(docs);
    assert_eq!(out[0].id, "m");
  }

  #[test]
  fn value_ordering_by_type() {
    let ordered = [json!(null), json!(false), json!(3), ts(1), json!("a"), json!([1])];
    for pair in ordered.windows(2) {
      assert_eq!(
        compare_values(Some(&pair[0]), Some(&pair[1])),
        Ordering::Less,
        "{} < {}",
        pair[0],
        pair[1]
      );
    }
  }

  #[test]
  fn large_integers_order_exactly() {
    let below = json!(9_007_199_254_740_992_i64);
    let above = json!(9_007_199_254_740_993_i64);
    assert_eq!(compare_values(Some(&below), Some(&above)), Ordering::Less);

    let huge = json!(u64::MAX);
    let negative = json!(-1);
    assert_eq!(compare_values(Some(&negative), Some(&huge)), Ordering::Less);
    assert_eq!(compare_values(Some(&huge), Some(&json!(u64::MAX - 1))), Ordering::Greater);
    assert_eq!(compare_values(Some(&json!(1.5)), Some(&json!(2))), Ordering::Less);
  }

  #[test]
  fn patch_replaces_scalars_on_a_nested_path() {
    let mut data = json!({ "meta": 5, "a": { "b": "x" } });
    Patch::new()
      .set("meta.source", "import")
      .set("a.b.c", 1)
      .set("a.d", true)
      .apply(&mut data);
    assert_eq!(
      data,
      json!({ "meta": { "source": "import" }, "a": { "b": { "c": 1 }, "d": true } })
    );
  }

  #[test]
  fn patch_set_delete_and_nested() {
    let mut data = json!({ "a": 1, "b": 2 });
    Patch::new()
      .set("a", 10)
      .delete("b")
      .set("meta.source", "import")
      .apply(&mut data);
    assert_eq!(data, json!({ "a": 10, "meta": { "source": "import" } }));
  }

  #[test]
  fn array_union_appends_only_new_values() {
    let mut data = json!({ "history": [{ "n": 1 }] });
    Patch::new()
      .array_union("history", vec![json!({ "n": 1 }), json!({ "n": 2 })])
      .array_union("tags", vec![json!("x")])
      .apply(&mut data);
    assert_eq!(
      data,
      json!({ "history": [{ "n": 1 }, { "n": 2 }], "tags": ["x"] })
    );
  }

  #[test]
  fn array_remove_drops_every_occurrence() {
    let mut data = json!({ "tags": ["a", "b", "a"] });
    Patch::new().array_remove("tags", vec![json!("a")]).apply(&mut data);
    assert_eq!(data, json!({ "tags": ["b"] }));
  }
}
