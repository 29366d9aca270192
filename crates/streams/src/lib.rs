//! Per-session append-only event streams.
//!
//! One stream plays two parts per session: the **inbox** (user messages
//! pushed by the orchestrator, popped by the task runner) and the
//! **outbox** (typed events produced by the runner, consumed by SSE
//! subscribers with independent cursors).
//!
//! An in-process implementation backs development; a streams-capable
//! broker can implement the same trait for durable deployments.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use fm_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EventStream trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An append-only queue of string payloads with dense, monotonically
/// increasing ids.
///
/// Reads are independent: multiple subscribers may hold separate
/// cursors. Writes are linearizable within one stream.
#[async_trait::async_trait]
pub trait EventStream: Send + Sync {
    /// Append a payload, returning its assigned id.
    async fn put(&self, payload: String) -> Result<u64>;

    /// Read the first entry with id > `start_id` (`None` = from the
    /// earliest). When nothing qualifies and `block_ms > 0`, waits up
    /// to that many milliseconds. `None` on timeout or empty.
    async fn get(&self, start_id: Option<u64>, block_ms: u64) -> Result<Option<(u64, String)>>;

    /// Destructive read of the earliest entry. `None` when empty.
    async fn pop(&self) -> Result<Option<(u64, String)>>;

    /// Delete a specific entry by id. Returns whether it existed.
    async fn delete(&self, id: u64) -> Result<bool>;

    async fn is_empty(&self) -> Result<bool>;

    async fn size(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-process stream: a locked deque plus a wakeup for blocked readers.
///
/// Ids come from a counter that may be shared between streams (see
/// [`MemoryStream::session_pair`]): a session's inbox and outbox draw
/// from one id space so persisted event ids never collide.
pub struct MemoryStream {
    entries: Mutex<VecDeque<(u64, String)>>,
    ids: Arc<AtomicU64>,
    wakeup: Notify,
}

impl MemoryStream {
    pub fn new() -> Arc<Self> {
        Self::with_ids(Arc::new(AtomicU64::new(1)))
    }

    pub fn with_ids(ids: Arc<AtomicU64>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(VecDeque::new()),
            ids,
            wakeup: Notify::new(),
        })
    }

    /// An (inbox, outbox) pair sharing one id space.
    pub fn session_pair() -> (Arc<Self>, Arc<Self>) {
        let ids = Arc::new(AtomicU64::new(1));
        (Self::with_ids(ids.clone()), Self::with_ids(ids))
    }

    fn first_after(&self, start_id: Option<u64>) -> Option<(u64, String)> {
        let entries = self.entries.lock();
        let floor = start_id.unwrap_or(0);
        entries.iter().find(|(id, _)| *id > floor).cloned()
    }
}

#[async_trait::async_trait]
impl EventStream for MemoryStream {
    async fn put(&self, payload: String) -> Result<u64> {
        let id = {
            // Take the id inside the lock so entries stay sorted even
            // under concurrent puts.
            let mut entries = self.entries.lock();
            let id = self.ids.fetch_add(1, Ordering::SeqCst);
            entries.push_back((id, payload));
            id
        };
        // Wake every blocked reader; each re-checks its own cursor.
        self.wakeup.notify_waiters();
        Ok(id)
    }

    async fn get(&self, start_id: Option<u64>, block_ms: u64) -> Result<Option<(u64, String)>> {
        if let Some(entry) = self.first_after(start_id) {
            return Ok(Some(entry));
        }
        if block_ms == 0 {
            return Ok(None);
        }

        let deadline = tokio::time::Instant::now() + Duration::from_millis(block_ms);
        loop {
            // Arm the wakeup before re-checking so a put between the
            // check and the await is not lost.
            let notified = self.wakeup.notified();
            if let Some(entry) = self.first_after(start_id) {
                return Ok(Some(entry));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn pop(&self) -> Result<Option<(u64, String)>> {
        Ok(self.entries.lock().pop_front())
    }

    async fn delete(&self, id: u64) -> Result<bool> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        Ok(entries.len() != before)
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.entries.lock().is_empty())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.entries.lock().len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StreamHub
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session-indexed registry of (inbox, outbox) pairs.
///
/// Streams belong to the session, not the worker: a resumed session
/// gets a fresh task but the same streams, so subscriber cursors stay
/// valid across suspension and reconnect.
pub struct StreamHub {
    pairs: Mutex<std::collections::HashMap<String, (Arc<MemoryStream>, Arc<MemoryStream>)>>,
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamHub {
    pub fn new() -> Self {
        Self {
            pairs: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// The session's (inbox, outbox), created on first use.
    pub fn session_streams(&self, session_id: &str) -> (Arc<MemoryStream>, Arc<MemoryStream>) {
        let mut pairs = self.pairs.lock();
        pairs
            .entry(session_id.to_owned())
            .or_insert_with(MemoryStream::session_pair)
            .clone()
    }

    /// Drop a session's streams (session deletion).
    pub fn remove(&self, session_id: &str) {
        self.pairs.lock().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_dense_and_increasing() {
        let stream = MemoryStream::new();
        let a = stream.put("a".into()).await.unwrap();
        let b = stream.put("b".into()).await.unwrap();
        let c = stream.put("c".into()).await.unwrap();
        assert!(a < b && b < c);
        assert_eq!(b, a + 1);
        assert_eq!(c, b + 1);
    }

    #[tokio::test]
    async fn cursor_reads_are_independent() {
        let stream = MemoryStream::new();
        let a = stream.put("a".into()).await.unwrap();
        let b = stream.put("b".into()).await.unwrap();

        // Reader one from the start.
        let (id1, payload1) = stream.get(None, 0).await.unwrap().unwrap();
        assert_eq!((id1, payload1.as_str()), (a, "a"));

        // Reader two starts after `a` and still sees `b`.
        let (id2, payload2) = stream.get(Some(a), 0).await.unwrap().unwrap();
        assert_eq!((id2, payload2.as_str()), (b, "b"));

        // Reader one re-reads the same entry: non-destructive.
        let (id3, _) = stream.get(None, 0).await.unwrap().unwrap();
        assert_eq!(id3, a);
    }

    #[tokio::test]
    async fn get_past_end_returns_none() {
        let stream = MemoryStream::new();
        let a = stream.put("a".into()).await.unwrap();
        assert!(stream.get(Some(a), 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blocking_get_wakes_on_put() {
        let stream = MemoryStream::new();
        let reader = stream.clone();
        let handle =
            tokio::spawn(async move { reader.get(None, 5_000).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let id = stream.put("late".into()).await.unwrap();

        let got = handle.await.unwrap().unwrap();
        assert_eq!(got, (id, "late".into()));
    }

    #[tokio::test]
    async fn blocking_get_times_out() {
        let stream = MemoryStream::new();
        let started = tokio::time::Instant::now();
        assert!(stream.get(None, 30).await.unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn pop_is_destructive_fifo() {
        let stream = MemoryStream::new();
        stream.put("a".into()).await.unwrap();
        stream.put("b".into()).await.unwrap();

        let (_, first) = stream.pop().await.unwrap().unwrap();
        assert_eq!(first, "a");
        assert_eq!(stream.size().await.unwrap(), 1);

        let (_, second) = stream.pop().await.unwrap().unwrap();
        assert_eq!(second, "b");
        assert!(stream.pop().await.unwrap().is_none());
        assert!(stream.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let stream = MemoryStream::new();
        let a = stream.put("a".into()).await.unwrap();
        stream.put("b".into()).await.unwrap();

        assert!(stream.delete(a).await.unwrap());
        assert!(!stream.delete(a).await.unwrap());
        assert_eq!(stream.size().await.unwrap(), 1);

        stream.clear().await.unwrap();
        assert!(stream.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn session_pair_shares_one_id_space() {
        let (inbox, outbox) = MemoryStream::session_pair();
        let a = inbox.put("user msg".into()).await.unwrap();
        let b = outbox.put("event".into()).await.unwrap();
        let c = inbox.put("user msg 2".into()).await.unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn hub_returns_the_same_streams_per_session() {
        let hub = StreamHub::new();
        let (inbox_a, outbox_a) = hub.session_streams("s1");
        let id = outbox_a.put("event".into()).await.unwrap();

        let (inbox_b, outbox_b) = hub.session_streams("s1");
        assert!(Arc::ptr_eq(&inbox_a, &inbox_b));
        let (got, _) = outbox_b.get(None, 0).await.unwrap().unwrap();
        assert_eq!(got, id);

        hub.remove("s1");
        let (_, outbox_c) = hub.session_streams("s1");
        assert!(outbox_c.get(None, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ids_survive_pop() {
        // Ids keep increasing after destructive reads; a cursor taken
        // before a pop never sees an id twice.
        let stream = MemoryStream::new();
        let a = stream.put("a".into()).await.unwrap();
        stream.pop().await.unwrap();
        let b = stream.put("b".into()).await.unwrap();
        assert!(b > a);
    }
}
