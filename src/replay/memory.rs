//! # In-memory message store.
//!
//! [`MemoryStore`] persists one stream's messages in originating-time order,
//! the backing for tests and short captures. Ordering is enforced at write
//! time; readers never need to sort or deduplicate.

use std::sync::Arc;

use crate::clock::Timestamp;
use crate::error::PostError;
use crate::replay::store::StoreReader;

/// Append-only store of `(originating_time, value)` pairs for one stream.
///
/// Writes must carry strictly increasing originating times, the same contract
/// an emitter enforces at post time. Equal timestamps are rejected like
/// regressions.
pub struct MemoryStore<T> {
    name: Arc<str>,
    items: Vec<(Timestamp, T)>,
}

impl<T: Clone + Send + 'static> MemoryStore<T> {
    /// Creates an empty store for the named stream.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Stream name this store captures.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends one message.
    ///
    /// ### Errors
    /// [`PostError::NonMonotonicTime`] if `originating_time` is not strictly
    /// greater than the last written time.
    pub fn write(&mut self, value: T, originating_time: Timestamp) -> Result<(), PostError> {
        if let Some((last, _)) = self.items.last() {
            if originating_time <= *last {
                return Err(PostError::NonMonotonicTime {
                    stream: self.name.to_string(),
                    last: *last,
                    offered: originating_time,
                });
            }
        }
        self.items.push((originating_time, value));
        Ok(())
    }

    /// Creates a reader over a snapshot of the current contents.
    pub fn reader(&self) -> MemoryReader<T> {
        MemoryReader {
            items: self.items.clone(),
            cursor: 0,
        }
    }
}

/// Snapshot reader over a [`MemoryStore`].
pub struct MemoryReader<T> {
    items: Vec<(Timestamp, T)>,
    cursor: usize,
}

impl<T: Clone + Send + 'static> StoreReader<T> for MemoryReader<T> {
    fn interval(&self) -> Option<(Timestamp, Timestamp)> {
        match (self.items.first(), self.items.last()) {
            (Some((first, _)), Some((last, _))) => Some((*first, *last)),
            _ => None,
        }
    }

    fn seek(&mut self, start: Timestamp) {
        self.cursor = self.items.partition_point(|(t, _)| *t < start);
    }

    fn next(&mut self) -> Option<(T, Timestamp)> {
        let (t, value) = self.items.get(self.cursor)?;
        self.cursor += 1;
        Some((value.clone(), *t))
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::Timestamp;
    use crate::error::PostError;
    use crate::replay::store::StoreReader;

    use super::MemoryStore;

    fn t(ms: i64) -> Timestamp {
        Timestamp::from_unix_millis(ms)
    }

    #[test]
    fn rejects_ties_and_regressions_at_write() {
        let mut store = MemoryStore::new("readings");
        store.write(1u64, t(10)).unwrap();
        assert!(matches!(
            store.write(2, t(10)),
            Err(PostError::NonMonotonicTime { .. })
        ));
        assert!(matches!(
            store.write(3, t(5)),
            Err(PostError::NonMonotonicTime { .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reader_seeks_to_first_at_or_after() {
        let mut store = MemoryStore::new("readings");
        for i in 1..=5i64 {
            store.write(i as u64, t(i * 10)).unwrap();
        }
        let mut reader = store.reader();
        assert_eq!(reader.interval(), Some((t(10), t(50))));

        reader.seek(t(25));
        assert_eq!(reader.next(), Some((3, t(30))));
        assert_eq!(reader.next(), Some((4, t(40))));

        reader.seek(t(50));
        assert_eq!(reader.next(), Some((5, t(50))));
        assert_eq!(reader.next(), None);
    }

    #[test]
    fn reader_snapshot_ignores_later_writes() {
        let mut store = MemoryStore::new("readings");
        store.write(1u64, t(10)).unwrap();
        let mut reader = store.reader();
        store.write(2, t(20)).unwrap();

        assert_eq!(reader.next(), Some((1, t(10))));
        assert_eq!(reader.next(), None);
    }
}
