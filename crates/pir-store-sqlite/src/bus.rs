//! In-process change notification.
//!
//! Every successful write publishes a [`Change`]; live subscriptions listen
//! on the bus and re-read whatever they watch when a change touches it.

use std::sync::Arc;

use pir_core::store::Target;
use tokio::sync::broadcast;

/// A document was written or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
  pub collection: String,
  pub id:         String,
}

impl Change {
  /// Whether this change can alter what `target` observes.
  pub fn affects(&self, target: &Target) -> bool {
    match target {
      Target::Document { collection, id } => {
        &self.collection == collection && &self.id == id
      }
      Target::Query { collection, .. } => &self.collection == collection,
    }
  }
}

/// Fan-out of [`Change`]s, backed by `tokio::broadcast`. Single-process only.
#[derive(Debug, Clone)]
pub struct ChangeBus {
  sender: Arc<broadcast::Sender<Change>>,
}

impl ChangeBus {
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity);
    Self { sender: Arc::new(sender) }
  }

  /// Publish to all current listeners and return how many there were.
  /// Publishing with nobody listening is not an error.
  pub fn publish(&self, change: Change) -> usize { self.sender.send(change).unwrap_or(0) }

  pub fn subscribe(&self) -> broadcast::Receiver<Change> { self.sender.subscribe() }

  pub fn listener_count(&self) -> usize { self.sender.receiver_count() }
}

impl Default for ChangeBus {
  fn default() -> Self { Self::new(256) }
}

#[cfg(test)]
mod tests {
  use pir_core::store::Query;

  use super::*;

  fn change(collection: &str, id: &str) -> Change {
    Change { collection: collection.into(), id: id.into() }
  }

  #[tokio::test]
  async fn publish_reaches_every_listener() {
    let bus = ChangeBus::new(8);
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();
    assert_eq!(bus.listener_count(), 2);

    assert_eq!(bus.publish(change("pirs", "p1")), 2);
    assert_eq!(a.recv().await.unwrap(), change("pirs", "p1"));
    assert_eq!(b.recv().await.unwrap(), change("pirs", "p1"));
  }

  #[test]
  fn publish_without_listeners_is_fine() {
    assert_eq!(ChangeBus::default().publish(change("pirs", "p1")), 0);
  }

  #[test]
  fn affects_matches_targets() {
    let doc = Target::Document { collection: "pirs".into(), id: "p1".into() };
    let query = Target::Query { collection: "pirs".into(), query: Query::new() };

    assert!(change("pirs", "p1").affects(&doc));
    assert!(!change("pirs", "p2").affects(&doc));
    assert!(change("pirs", "p2").affects(&query));
    assert!(!change("answers", "p1").affects(&query));
  }
}
