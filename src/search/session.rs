use std::sync::Arc;

use super::worker::{SearchJob, SearchOp, SearchTask, spawn};
use super::{CancelToken, ProgressFn, SearchError, Searchable, combine};

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults<T> {
    pub generation: u64,
    pub query: String,
    pub matches: Vec<T>,
}

struct InFlight<T> {
    generation: u64,
    query: String,
    exact: SearchTask<T>,
    fuzzy: SearchTask<T>,
}

impl<T> InFlight<T> {
    fn cancel_stale(&self) {
        self.exact
            .cancel(format!("Stale exact search: {}", self.query));
        self.fuzzy
            .cancel(format!("Stale fuzzy search: {}", self.query));
    }
}

/// Query-by-query search over one list where the latest query wins: each
/// submission cancels whatever was still running for the previous one.
pub struct SearchSession<T> {
    list: Arc<Vec<T>>,
    keys: Vec<String>,
    threshold: f64,
    on_progress: Option<ProgressFn>,
    generation: u64,
    query: String,
    in_flight: Option<InFlight<T>>,
}

impl<T: Searchable> SearchSession<T> {
    pub fn new(list: Arc<Vec<T>>, keys: Vec<String>, threshold: f64) -> Self {
        Self {
            list,
            keys,
            threshold,
            on_progress: None,
            generation: 0,
            query: String::new(),
            in_flight: None,
        }
    }

    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Starts exact and fuzzy scans for `query` side by side. A blank query
    /// starts nothing and resolves to no matches.
    pub fn submit(&mut self, query: &str) -> u64 {
        if let Some(stale) = self.in_flight.take() {
            tracing::debug!(generation = stale.generation, query = %stale.query, "cancelling stale search");
            stale.cancel_stale();
        }
        self.generation += 1;
        self.query = query.to_string();
        if query.trim().is_empty() {
            return self.generation;
        }

        let job = |op| SearchJob {
            op,
            list: self.list.clone(),
            keys: self.keys.clone(),
            query: query.to_string(),
            threshold: self.threshold,
        };
        let exact = spawn(job(SearchOp::Exact), CancelToken::new(), self.on_progress.clone());
        let fuzzy = spawn(job(SearchOp::Fuzzy), CancelToken::new(), None);
        self.in_flight = Some(InFlight {
            generation: self.generation,
            query: query.to_string(),
            exact,
            fuzzy,
        });
        self.generation
    }

    /// Cancels the running search; its `results` reports the reason.
    pub fn cancel(&mut self, reason: &str) {
        if let Some(flight) = &self.in_flight {
            flight.exact.cancel(reason);
            flight.fuzzy.cancel(reason);
        }
    }

    /// Waits for the latest submission and combines its two passes.
    pub fn results(&mut self) -> Result<SearchResults<T>, SearchError> {
        let Some(flight) = self.in_flight.take() else {
            return Ok(SearchResults {
                generation: self.generation,
                query: self.query.clone(),
                matches: Vec::new(),
            });
        };
        let exact = flight.exact.wait();
        let fuzzy = flight.fuzzy.wait();
        Ok(SearchResults {
            generation: flight.generation,
            query: flight.query,
            matches: combine(exact?, fuzzy?),
        })
    }
}

impl<T> Drop for SearchSession<T> {
    fn drop(&mut self) {
        if let Some(flight) = &self.in_flight {
            flight.cancel_stale();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchEntry;

    fn session() -> SearchSession<SearchEntry> {
        let list = vec![
            SearchEntry::named("Firmicutes"),
            SearchEntry::named("Fibrobacteres"),
            SearchEntry::named("Proteobacteria"),
        ];
        SearchSession::new(Arc::new(list), vec!["name".to_string()], 0.25)
    }

    #[test]
    fn latest_query_wins() {
        let mut session = session();
        session.submit("fib");
        let generation = session.submit("firmicute");
        let results = session.results().unwrap();
        assert_eq!(results.generation, generation);
        assert_eq!(results.query, "firmicute");
        assert_eq!(results.matches.len(), 1);
        assert_eq!(results.matches[0].name, "Firmicutes");
        assert!(!results.matches[0].is_fuzzy());
        assert!(session.is_current(generation));
    }

    #[test]
    fn fuzzy_only_matches_are_flagged() {
        let mut session = session();
        session.submit("Firmicuts");
        let results = session.results().unwrap();
        assert_eq!(results.matches.len(), 1);
        assert!(results.matches[0].is_fuzzy());
    }

    #[test]
    fn blank_query_has_no_matches() {
        let mut session = session();
        let generation = session.submit("   ");
        let results = session.results().unwrap();
        assert_eq!(results.generation, generation);
        assert!(results.matches.is_empty());
    }

    #[test]
    fn cancelled_search_rejects_with_reason() {
        let mut session = session();
        session.submit("firm");
        session.cancel("closed");
        assert_eq!(
            session.results(),
            Err(SearchError::Cancelled("closed".to_string()))
        );
    }
}
