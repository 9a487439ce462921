//! Read-only view of queue contents handed to rule predicates

use std::collections::VecDeque;

use serde_json::Value;

/// One queue as seen by a predicate
#[derive(Debug, Clone, Copy)]
pub struct QueueView<'a> {
    pub name: &'a str,
    pub items: &'a VecDeque<Value>,
}

impl QueueView<'_> {
    /// Number of items waiting in this queue
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing is waiting in this queue
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Immutable snapshot of every registered queue, in registration order
///
/// Lookups by name for a queue that is not part of the snapshot behave as
/// if that queue were empty.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot<'a> {
    queues: Vec<QueueView<'a>>,
}

impl<'a> QueueSnapshot<'a> {
    pub fn new(queues: Vec<QueueView<'a>>) -> Self {
        Self { queues }
    }

    /// Look up a queue by name
    pub fn get(&self, name: &str) -> Option<&QueueView<'a>> {
        self.queues.iter().find(|q| q.name == name)
    }

    /// True if a queue with this name is part of the snapshot
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Length of the named queue (0 when unknown)
    pub fn len(&self, name: &str) -> usize {
        self.get(name).map(|q| q.len()).unwrap_or(0)
    }

    /// True if the named queue holds no items (or is unknown)
    pub fn is_empty(&self, name: &str) -> bool {
        self.len(name) == 0
    }

    /// Items of the named queue, head first
    pub fn items(&self, name: &str) -> Option<&'a VecDeque<Value>> {
        self.get(name).map(|q| q.items)
    }

    /// Total number of items across all queues
    pub fn total_len(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    /// True if every queue is empty
    pub fn all_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty())
    }

    /// Number of queues in the snapshot
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Queue names in registration order
    pub fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.queues.iter().map(|q| q.name)
    }

    /// Queues in registration order
    pub fn iter(&self) -> impl Iterator<Item = &QueueView<'a>> {
        self.queues.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_lookups() {
        let a: VecDeque<Value> = VecDeque::from(vec![json!(1), json!(2)]);
        let b: VecDeque<Value> = VecDeque::new();
        let snapshot = QueueSnapshot::new(vec![
            QueueView { name: "a", items: &a },
            QueueView { name: "b", items: &b },
        ]);

        assert_eq!(snapshot.len("a"), 2);
        assert!(snapshot.is_empty("b"));
        assert!(snapshot.contains("b"));
        assert!(!snapshot.contains("c"));
        assert_eq!(snapshot.len("c"), 0);
        assert_eq!(snapshot.total_len(), 2);
        assert!(!snapshot.all_empty());
        assert_eq!(snapshot.items("a").unwrap().front(), Some(&json!(1)));
        assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_snapshot_is_all_empty() {
        let snapshot = QueueSnapshot::default();
        assert!(snapshot.all_empty());
        assert_eq!(snapshot.queue_count(), 0);
    }
}
