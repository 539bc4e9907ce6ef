use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use super::matcher::{Progress, ProgressFn, exact_search, fuzzy_search};
use super::{CancelToken, SearchError, Searchable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOp {
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone)]
pub struct SearchJob<T> {
    pub op: SearchOp,
    pub list: Arc<Vec<T>>,
    pub keys: Vec<String>,
    pub query: String,
    pub threshold: f64,
}

impl<T: Searchable> SearchJob<T> {
    pub fn run(&self, token: &CancelToken, progress: &Progress) -> Result<Vec<T>, SearchError> {
        match self.op {
            SearchOp::Exact => exact_search(&self.list, &self.keys, &self.query, token, progress),
            SearchOp::Fuzzy => fuzzy_search(
                &self.list,
                &self.keys,
                &self.query,
                self.threshold,
                token,
                progress,
            ),
        }
    }
}

/// Handle to a search running on its own thread.
pub struct SearchTask<T> {
    receiver: Receiver<Result<Vec<T>, SearchError>>,
    token: CancelToken,
    resolved: Arc<AtomicBool>,
}

/// Runs `job` on a dedicated worker thread. Progress stops once the task is
/// resolved by completion or cancellation.
pub fn spawn<T: Searchable>(
    job: SearchJob<T>,
    token: CancelToken,
    on_progress: Option<ProgressFn>,
) -> SearchTask<T> {
    let (sender, receiver) = mpsc::channel();
    let resolved = Arc::new(AtomicBool::new(false));

    let progress = Progress::new(on_progress.map(|callback| {
        let resolved = resolved.clone();
        let gated: ProgressFn = Arc::new(move |status: &str| {
            if !resolved.load(Ordering::SeqCst) {
                callback(status);
            }
        });
        gated
    }));

    let worker_token = token.clone();
    let worker_resolved = resolved.clone();
    let spawned = thread::Builder::new()
        .name("search-worker".to_string())
        .spawn(move || {
            let result = job.run(&worker_token, &progress);
            worker_resolved.store(true, Ordering::SeqCst);
            let _ = sender.send(result);
        });

    if let Err(err) = spawned {
        tracing::error!("failed to start search worker: {err}");
        resolved.store(true, Ordering::SeqCst);
        let (sender, failed) = mpsc::channel();
        let _ = sender.send(Err(SearchError::Worker(err.to_string())));
        return SearchTask {
            receiver: failed,
            token,
            resolved,
        };
    }

    SearchTask {
        receiver,
        token,
        resolved,
    }
}

impl<T> SearchTask<T> {
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
        self.resolved.store(true, Ordering::SeqCst);
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Blocks until the worker finishes. A cancelled task always yields
    /// `Cancelled`, even when the scan had already completed.
    pub fn wait(self) -> Result<Vec<T>, SearchError> {
        let result = self
            .receiver
            .recv()
            .unwrap_or_else(|_| Err(SearchError::Worker("search worker exited".to_string())));
        self.resolved.store(true, Ordering::SeqCst);
        self.token.check()?;
        result
    }

    /// Non-blocking poll; `None` while the worker is still scanning.
    pub fn try_result(&self) -> Option<Result<Vec<T>, SearchError>> {
        let result = match self.receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                Err(SearchError::Worker("search worker exited".to_string()))
            }
        };
        self.resolved.store(true, Ordering::SeqCst);
        if let Err(err) = self.token.check() {
            return Some(Err(err));
        }
        Some(result)
    }
}
