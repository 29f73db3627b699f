//! [`SqliteStore`]: the SQLite implementation of [`DocumentStore`].

use std::{path::Path, sync::Arc};

use chrono::Utc;
use pir_core::{
  auth::AuthUser,
  config::ProjectConfig,
  store::{Document, DocumentStore, Patch, Query, Snapshot, Subscription, Target},
};
use rusqlite::OptionalExtension as _;
use serde_json::Value;
use tokio::sync::{broadcast::error::RecvError, mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  bus::{Change, ChangeBus},
  encode::{RawDocument, encode_data, encode_dt},
  schema::SCHEMA,
};

/// Snapshots buffered per subscription before the feed waits on the reader.
const SUBSCRIPTION_BUFFER: usize = 16;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A PIR project backed by a single SQLite file.
///
/// Cloning is cheap; clones share the connection, the change bus and the
/// auth session.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:    tokio_rusqlite::Connection,
  pub(crate) bus:     ChangeBus,
  pub(crate) session: Arc<watch::Sender<Option<AuthUser>>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  /// Open the store for the project described by `config`, kept at
  /// `{data_dir}/{projectId}.sqlite3`.
  ///
  /// `apiKey` and `projectId` must be set; the other settings are not used
  /// by this backend.
  pub async fn connect(config: &ProjectConfig, data_dir: impl AsRef<Path>) -> Result<Self> {
    config.get("apiKey").ok_or(Error::MissingConfig("apiKey"))?;
    let project_id = config
      .get("projectId")
      .ok_or(Error::MissingConfig("projectId"))?;

    let path = data_dir.as_ref().join(format!("{project_id}.sqlite3"));
    info!(project_id, path = %path.display(), "opening project store");
    Self::open(path).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;

    let (session, _) = watch::channel(None);
    Ok(Self { conn, bus: ChangeBus::default(), session: Arc::new(session) })
  }

  /// The bus on which every write is announced.
  pub fn changes(&self) -> &ChangeBus { &self.bus }

  fn announce(&self, collection: &str, id: &str) {
    let listeners = self.bus.publish(Change {
      collection: collection.to_owned(),
      id:         id.to_owned(),
    });
    debug!(collection, id, listeners, "change published");
  }

  /// Current state of `target`.
  async fn snapshot(&self, target: &Target) -> Result<Snapshot> {
    Ok(match target {
      Target::Document { collection, id } => {
        Snapshot::Document(self.get(collection, id).await?)
      }
      Target::Query { collection, query } => {
        Snapshot::Query(self.query(collection, query).await?)
      }
    })
  }

  /// Feed `tx` with a fresh snapshot of `target` on every relevant change
  /// until the reader goes away. Identical consecutive snapshots are sent
  /// once.
  async fn pump(
    self,
    target: Target,
    mut changes: tokio::sync::broadcast::Receiver<Change>,
    mut last: Snapshot,
    tx: mpsc::Sender<Snapshot>,
  ) {
    if tx.send(last.clone()).await.is_err() {
      return;
    }

    loop {
      match changes.recv().await {
        Ok(change) if !change.affects(&target) => continue,
        Ok(_) => {}
        Err(RecvError::Lagged(skipped)) => {
          warn!(skipped, ?target, "subscription lagged; re-reading current state");
        }
        Err(RecvError::Closed) => break,
      }

      let next = match self.snapshot(&target).await {
        Ok(next) => next,
        Err(err) => {
          warn!(%err, ?target, "subscription read failed; ending feed");
          break;
        }
      };
      if next == last {
        continue;
      }
      if tx.send(next.clone()).await.is_err() {
        break;
      }
      last = next;
    }
    debug!(?target, "subscription ended");
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
    let collection = collection.to_owned();
    let id = id.to_owned();

    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT doc_id, data_json FROM documents
             WHERE collection = ?1 AND doc_id = ?2",
            rusqlite::params![collection, id],
            |row| Ok(RawDocument { doc_id: row.get(0)?, data_json: row.get(1)? }),
          )
          .optional()?)
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }

  async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
    let data_json = encode_data(collection, id, &data)?;
    let written_at = encode_dt(Utc::now());
    let (c, i) = (collection.to_owned(), id.to_owned());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (collection, doc_id, data_json, written_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (collection, doc_id)
           DO UPDATE SET data_json = excluded.data_json,
                         written_at = excluded.written_at",
          rusqlite::params![c, i, data_json, written_at],
        )?;
        Ok(())
      })
      .await?;

    debug!(collection, id, "document set");
    self.announce(collection, id);
    Ok(())
  }

  async fn add(&self, collection: &str, data: Value) -> Result<String> {
    let id = Uuid::new_v4().simple().to_string();
    self.set(collection, &id, data).await?;
    Ok(id)
  }

  async fn update(&self, collection: &str, id: &str, patch: &Patch) -> Result<()> {
    let written_at = encode_dt(Utc::now());
    let patch = patch.clone();
    let (c, i) = (collection.to_owned(), id.to_owned());

    // Read, patch and write in one transaction so concurrent updates on the
    // connection cannot interleave. `None` means the document is missing.
    let outcome: Option<std::result::Result<(), serde_json::Error>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current: Option<String> = tx
          .query_row(
            "SELECT data_json FROM documents WHERE collection = ?1 AND doc_id = ?2",
            rusqlite::params![c, i],
            |row| row.get(0),
          )
          .optional()?;
        let Some(current) = current else {
          return Ok(None);
        };

        let patched = serde_json::from_str::<Value>(&current).map(|mut data| {
          patch.apply(&mut data);
          data.to_string()
        });
        let patched = match patched {
          Ok(json) => json,
          Err(err) => return Ok(Some(Err(err))),
        };

        tx.execute(
          "UPDATE documents SET data_json = ?3, written_at = ?4
           WHERE collection = ?1 AND doc_id = ?2",
          rusqlite::params![c, i, patched, written_at],
        )?;
        tx.commit()?;
        Ok(Some(Ok(())))
      })
      .await?;

    match outcome {
      None => Err(Error::NotFound {
        collection: collection.to_owned(),
        id:         id.to_owned(),
      }),
      Some(result) => {
        result?;
        debug!(collection, id, "document updated");
        self.announce(collection, id);
        Ok(())
      }
    }
  }

  async fn delete(&self, collection: &str, id: &str) -> Result<()> {
    let (c, i) = (collection.to_owned(), id.to_owned());

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2",
          rusqlite::params![c, i],
        )?)
      })
      .await?;

    if removed > 0 {
      debug!(collection, id, "document deleted");
      self.announce(collection, id);
    }
    Ok(())
  }

  async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
    let c = collection.to_owned();

    // Filtering and ordering happen in Rust over the whole collection.
    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT doc_id, data_json FROM documents WHERE collection = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![c], |row| {
            Ok(RawDocument { doc_id: row.get(0)?, data_json: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let docs = raws
      .into_iter()
      .map(RawDocument::into_document)
      .collect::<Result<Vec<_>>>()?;
    let hits = query.apply(docs);
    debug!(collection, hits = hits.len(), "query");
    Ok(hits)
  }

  async fn subscribe(&self, target: Target) -> Result<Subscription> {
    // Listen before the initial read so no write can fall in between.
    let changes = self.bus.subscribe();
    let initial = self.snapshot(&target).await?;

    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    debug!(?target, "subscription started");
    let task = tokio::spawn(self.clone().pump(target, changes, initial, tx));
    Ok(Subscription::new(rx, task))
  }
}
