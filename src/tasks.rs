// src/tasks.rs
use tokio::task::JoinHandle;
use tracing::debug;

/// Owned background task. Aborted on `shutdown()` or when dropped.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    inner: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn new(name: &'static str, inner: JoinHandle<()>) -> Self {
        Self {
            name,
            inner: Some(inner),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Abort and wait until the task has actually stopped.
    pub async fn shutdown(mut self) {
        if let Some(h) = self.inner.take() {
            h.abort();
            let _ = h.await;
            debug!(target: "engine", task = self.name, "task stopped");
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(h) = self.inner.take() {
            h.abort();
        }
    }
}
