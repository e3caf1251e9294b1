use crate::types::Target;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Ordered set of targets waiting for a worker slot. Pull order is the
/// input list's order; a target that fails is never re-enqueued, retry
/// policy lives in the downloader.
#[derive(Debug)]
pub struct TargetQueue {
    inner: Mutex<VecDeque<Target>>,
}

impl TargetQueue {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            inner: Mutex::new(targets.into()),
        }
    }

    /// Pull the next target. Safe for concurrent callers; returns None
    /// once the queue is exhausted.
    pub async fn next(&self) -> Option<Target> {
        self.inner.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
