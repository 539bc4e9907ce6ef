//! Newline-delimited JSON request/response framing for out-of-process search.
//!
//! Each input line is either a request
//! `{"op": "exact"|"fuzzy", "list": [...], "keys": [...], "query": "...", "threshold"?: 0.25, "id"?: ...}`
//! or an abort `{"abort": {"reason": "..."}}` that cancels every request
//! still in flight. Each request gets exactly one response line, in
//! completion order: `{"id"?, "matches": [...]}` or `{"id"?, "error", "reason"}`.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::worker::{SearchJob, SearchOp, SearchTask, spawn};
use super::{CancelToken, DEFAULT_THRESHOLD, SearchError};
use crate::error::AtlasError;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub op: SearchOp,
    pub list: Vec<Value>,
    #[serde(default = "default_keys")]
    pub keys: Vec<String>,
    pub query: String,
    #[serde(default)]
    pub threshold: Option<f64>,
}

fn default_keys() -> Vec<String> {
    vec!["name".to_string()]
}

impl SearchRequest {
    pub fn into_job(self) -> (Option<Value>, SearchJob<Value>) {
        let job = SearchJob {
            op: self.op,
            list: Arc::new(self.list),
            keys: self.keys,
            query: self.query,
            threshold: self.threshold.unwrap_or(DEFAULT_THRESHOLD),
        };
        (self.id, job)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AbortReason {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AbortMessage {
    pub abort: AbortReason,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Abort(AbortMessage),
    Request(SearchRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResponse {
    Matches {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        matches: Vec<Value>,
    },
    Failure {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        error: String,
        reason: String,
    },
}

impl SearchResponse {
    pub fn from_result(id: Option<Value>, result: Result<Vec<Value>, SearchError>) -> Self {
        match result {
            Ok(matches) => SearchResponse::Matches { id, matches },
            Err(SearchError::Cancelled(reason)) => SearchResponse::Failure {
                id,
                error: "cancelled".to_string(),
                reason,
            },
            Err(SearchError::Worker(reason)) => SearchResponse::Failure {
                id,
                error: "failed".to_string(),
                reason,
            },
        }
    }

    fn invalid(reason: String) -> Self {
        SearchResponse::Failure {
            id: None,
            error: "invalid request".to_string(),
            reason,
        }
    }
}

pub fn parse_line(line: &str) -> Result<Incoming, serde_json::Error> {
    serde_json::from_str(line)
}

struct Pending {
    id: Option<Value>,
    task: SearchTask<Value>,
}

fn write_response<W: Write>(output: &mut W, response: &SearchResponse) -> Result<(), AtlasError> {
    serde_json::to_writer(&mut *output, response)
        .map_err(|err| AtlasError::Serialize(format!("search response: {err}")))?;
    writeln!(output).map_err(|err| AtlasError::Filesystem(err.to_string()))?;
    output
        .flush()
        .map_err(|err| AtlasError::Filesystem(err.to_string()))
}

/// Serves requests from `input` until it is exhausted and every accepted
/// request has been answered.
pub fn serve<R, W>(input: R, output: &mut W) -> Result<(), AtlasError>
where
    R: BufRead + Send + 'static,
    W: Write,
{
    let (sender, lines) = mpsc::channel();
    thread::Builder::new()
        .name("search-input".to_string())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if sender.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!("stopped reading search requests: {err}");
                        break;
                    }
                }
            }
        })
        .map_err(|err| AtlasError::Search(err.to_string()))?;

    let mut pending: Vec<Pending> = Vec::new();
    let mut open = true;
    while open || !pending.is_empty() {
        if open {
            match lines.recv_timeout(POLL_INTERVAL) {
                Ok(line) => accept(&line, &mut pending, output)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => open = false,
            }
        } else {
            thread::sleep(POLL_INTERVAL);
        }

        let mut index = 0;
        while index < pending.len() {
            match pending[index].task.try_result() {
                Some(result) => {
                    let done = pending.swap_remove(index);
                    write_response(output, &SearchResponse::from_result(done.id, result))?;
                }
                None => index += 1,
            }
        }
    }
    Ok(())
}

fn accept<W: Write>(
    line: &str,
    pending: &mut Vec<Pending>,
    output: &mut W,
) -> Result<(), AtlasError> {
    if line.trim().is_empty() {
        return Ok(());
    }
    match parse_line(line) {
        Ok(Incoming::Abort(message)) => {
            let reason = message.abort.reason.unwrap_or_else(|| "aborted".to_string());
            tracing::debug!(in_flight = pending.len(), reason = %reason, "aborting searches");
            for entry in pending.iter() {
                entry.task.cancel(reason.clone());
            }
            Ok(())
        }
        Ok(Incoming::Request(request)) => {
            tracing::debug!(op = ?request.op, entries = request.list.len(), "search request");
            let (id, job) = request.into_job();
            pending.push(Pending {
                id,
                task: spawn(job, CancelToken::new(), None),
            });
            Ok(())
        }
        Err(err) => write_response(output, &SearchResponse::invalid(err.to_string())),
    }
}
