//! Per-run crawl state
//!
//! Built when a run starts and dropped when it ends. Nothing here is
//! persisted; durable knowledge lives in the store's record set.

use std::collections::HashSet;

/// Tracks which URLs a single run already knows about
#[derive(Debug, Clone, Default)]
pub struct CrawlState {
    /// `source_url`s stored by earlier runs
    known: HashSet<String>,

    /// Detail URLs handed out for processing in this run
    visited: HashSet<String>,
}

impl CrawlState {
    /// Creates state seeded with the keys already in the store
    pub fn new(known: HashSet<String>) -> Self {
        Self {
            known,
            visited: HashSet::new(),
        }
    }

    pub fn is_known(&self, url: &str) -> bool {
        self.known.contains(url)
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Marks a URL as visited in this run
    ///
    /// Returns false if it had already been visited.
    pub fn mark_visited(&mut self, url: &str) -> bool {
        self.visited.insert(url.to_string())
    }

    /// Selects the discovered URLs this run should process
    ///
    /// Duplicates are dropped (first occurrence wins, order is kept). With
    /// `resume` set, URLs already known from earlier runs are skipped too.
    /// Every returned URL is marked visited.
    pub fn filter_pending(&mut self, discovered: &[String], resume: bool) -> Vec<String> {
        let mut pending = Vec::new();
        for url in discovered {
            if resume && self.is_known(url) {
                continue;
            }
            if self.mark_visited(url) {
                pending.push(url.clone());
            }
        }
        pending
    }
}
