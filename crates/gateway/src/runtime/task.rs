//! The per-session worker task handle.
//!
//! A task owns the session's inbox and outbox streams (one shared id
//! space), the cancellation token its flow cooperates with, and the
//! join handle of the worker. The store indexes live tasks by id so
//! `stop` and `shutdown` can reach them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use fm_streams::MemoryStream;

pub struct Task {
    pub id: String,
    pub session_id: String,
    /// User messages, popped by the runner.
    pub input: Arc<MemoryStream>,
    /// Typed events, read by subscribers with independent cursors.
    pub output: Arc<MemoryStream>,
    pub cancel: CancellationToken,
    done: AtomicBool,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Task {
    fn new(session_id: &str, input: Arc<MemoryStream>, output: Arc<MemoryStream>) -> Arc<Self> {
        Arc::new(Self {
            id: fm_domain::short_id(),
            session_id: session_id.to_string(),
            input,
            output,
            cancel: CancellationToken::new(),
            done: AtomicBool::new(false),
            join: Mutex::new(None),
        })
    }

    /// Signal the worker to stop cooperatively. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the worker has returned (completed, suspended, failed,
    /// or cancelled).
    pub fn done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    pub fn mark_running(&self) {
        self.done.store(false, Ordering::Release);
    }

    pub fn set_join(&self, handle: JoinHandle<()>) {
        *self.join.lock() = Some(handle);
    }

    pub fn take_join(&self) -> Option<JoinHandle<()>> {
        self.join.lock().take()
    }
}

/// Registry of live tasks, keyed by task id.
pub struct TaskStore {
    tasks: Mutex<HashMap<String, Arc<Task>>>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a task bound to the session's (inbox, outbox) pair. The
    /// streams outlive the task: a resumed session reuses them.
    pub fn create(
        &self,
        session_id: &str,
        input: Arc<MemoryStream>,
        output: Arc<MemoryStream>,
    ) -> Arc<Task> {
        let task = Task::new(session_id, input, output);
        self.tasks.lock().insert(task.id.clone(), task.clone());
        task
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<Task>> {
        self.tasks.lock().get(task_id).cloned()
    }

    pub fn remove(&self, task_id: &str) -> Option<Arc<Task>> {
        self.tasks.lock().remove(task_id)
    }

    pub fn all(&self) -> Vec<Arc<Task>> {
        self.tasks.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fm_streams::EventStream;

    fn new_task(store: &TaskStore) -> Arc<Task> {
        let (input, output) = MemoryStream::session_pair();
        store.create("s1", input, output)
    }

    #[tokio::test]
    async fn task_streams_share_an_id_space() {
        let store = TaskStore::new();
        let task = new_task(&store);
        let a = task.input.put("msg".into()).await.unwrap();
        let b = task.output.put("event".into()).await.unwrap();
        assert!(b > a);
    }

    #[test]
    fn cancel_is_idempotent() {
        let store = TaskStore::new();
        let task = new_task(&store);
        assert!(!task.is_cancelled());
        task.cancel();
        task.cancel();
        assert!(task.is_cancelled());
    }

    #[test]
    fn store_create_get_remove() {
        let store = TaskStore::new();
        let task = new_task(&store);
        assert!(store.get(&task.id).is_some());
        assert_eq!(store.len(), 1);

        store.remove(&task.id);
        assert!(store.get(&task.id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn done_flag_round_trips() {
        let store = TaskStore::new();
        let task = new_task(&store);
        assert!(!task.done());
        task.mark_done();
        assert!(task.done());
        task.mark_running();
        assert!(!task.done());
    }
}
