//! Exact and trigram search over flat entry lists, run on worker threads with
//! cooperative cancellation.

mod cancel;
mod combine;
mod entry;
mod list;
mod matcher;
pub mod protocol;
mod session;
mod worker;

pub use cancel::CancelToken;
pub use combine::combine;
pub use entry::{EntryKind, SearchEntry, Searchable};
pub use list::{filter_by_kind, search_list};
pub use matcher::{
    DEFAULT_THRESHOLD, Progress, ProgressFn, exact_search, fuzzy_search, n_gram_similarity,
    n_grams, normalize,
};
pub use session::{SearchResults, SearchSession};
pub use worker::{SearchJob, SearchOp, SearchTask, spawn};

use thiserror::Error;

use crate::error::AtlasError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// Not a failure: the caller withdrew the request.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Worker(String),
}

impl SearchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SearchError::Cancelled(_))
    }
}

impl From<SearchError> for AtlasError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Cancelled(reason) => AtlasError::Cancelled(reason),
            SearchError::Worker(message) => AtlasError::Search(message),
        }
    }
}
