//! Keyed poll cache that survives restarts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use townsquare_models::poll::{PollSummary, PollView, VoteReceipt, VoteResults, VotersByOption};

use crate::error::ClientError;

/// What the client believes about one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollCacheEntry {
    pub has_voted: bool,
    pub selected_option: Option<String>,
    pub vote_results: VoteResults,
    pub voters_by_option: VotersByOption,
    pub total_votes: u32,
}

impl PollCacheEntry {
    pub fn from_view(view: &PollView) -> Self {
        Self {
            has_voted: view.has_voted,
            selected_option: view.user_vote.clone(),
            vote_results: view.vote_results.clone(),
            voters_by_option: view.voters_by_option.clone(),
            total_votes: view.total_votes,
        }
    }

    /// Summaries carry no voter lists; those fill in on the first full read
    /// or vote receipt.
    pub fn from_summary(summary: &PollSummary) -> Self {
        Self {
            has_voted: summary.has_voted,
            selected_option: summary.user_vote.clone(),
            vote_results: summary.vote_results.clone(),
            voters_by_option: VotersByOption::new(),
            total_votes: summary.total_votes,
        }
    }

    /// Count a vote for `option` locally, ahead of the server.
    pub fn apply_optimistic_vote(&mut self, option: &str) {
        *self.vote_results.entry(option.to_string()).or_insert(0) += 1;
        self.total_votes += 1;
        self.has_voted = true;
        self.selected_option = Some(option.to_string());
    }

    /// Replace every server-derived field with the receipt's values.
    pub fn apply_receipt(&mut self, receipt: &VoteReceipt) {
        self.has_voted = receipt.has_voted;
        self.selected_option = Some(receipt.user_vote.clone());
        self.vote_results = receipt.vote_results.clone();
        self.voters_by_option = receipt.voters_by_option.clone();
        self.total_votes = receipt.total_votes;
    }

    pub fn votes_for(&self, option: &str) -> u32 {
        self.vote_results.get(option).copied().unwrap_or(0)
    }

    /// Share of the total for `option`, rounded to a whole percent.
    pub fn percentage(&self, option: &str) -> u32 {
        if self.total_votes == 0 {
            return 0;
        }
        let share = f64::from(self.votes_for(option)) / f64::from(self.total_votes);
        (share * 100.0).round() as u32
    }

    /// True when `option` holds the highest count and that count is non-zero.
    /// Ties lead together.
    pub fn is_leading(&self, option: &str) -> bool {
        let max = self.vote_results.values().copied().max().unwrap_or(0);
        max > 0 && self.votes_for(option) == max
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollCache {
    entries: HashMap<String, PollCacheEntry>,
}

impl PollCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, poll_id: &str) -> Option<&PollCacheEntry> {
        self.entries.get(poll_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `make()` for `poll_id` unless an entry is already cached.
    pub fn get_or_insert_with(
        &mut self,
        poll_id: &str,
        make: impl FnOnce() -> PollCacheEntry,
    ) -> &mut PollCacheEntry {
        self.entries.entry(poll_id.to_string()).or_insert_with(make)
    }

    /// Mutate the entry for `poll_id`, starting from an empty one if absent.
    pub fn update<R>(&mut self, poll_id: &str, f: impl FnOnce(&mut PollCacheEntry) -> R) -> R {
        f(self.entries.entry(poll_id.to_string()).or_default())
    }

    pub fn insert(&mut self, poll_id: &str, entry: PollCacheEntry) -> Option<PollCacheEntry> {
        self.entries.insert(poll_id.to_string(), entry)
    }

    pub fn to_json(&self) -> Result<String, ClientError> {
        serde_json::to_string(self).map_err(|e| ClientError::Persistence(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, ClientError> {
        serde_json::from_str(raw).map_err(|e| ClientError::Persistence(e.to_string()))
    }

    /// Write the cache to `path`, via a sibling temp file so a crash never
    /// leaves a half-written cache behind.
    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ClientError::Persistence(e.to_string()))?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| ClientError::Persistence(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| ClientError::Persistence(e.to_string()))?;
        tracing::debug!(path = %path.display(), polls = self.len(), "poll cache saved");
        Ok(())
    }

    /// Read a cache written by [`PollCache::save`]. A missing file is an
    /// empty cache; an unreadable or corrupt one is logged and discarded.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "could not read poll cache: {e}");
                return Self::new();
            }
        };
        match Self::from_json(&raw) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!(path = %path.display(), "discarding corrupt poll cache: {e}");
                Self::new()
            }
        }
    }
}
