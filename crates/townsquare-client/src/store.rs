use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use townsquare_models::poll::{PollSummary, PollView, VoteReceipt};

use crate::cache::{PollCache, PollCacheEntry};
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotePhase {
    NotVoted,
    /// A vote was dispatched and the server has not answered yet.
    Voting,
    Voted,
}

/// What the store knows about a poll besides its cache entry.
#[derive(Debug, Clone, Default)]
struct PollSlot {
    options: Vec<String>,
    expires_at: Option<DateTime<Utc>>,
    show_results: bool,
    /// The cached entry came from a list summary and has no voter lists yet.
    summary_only: bool,
    /// Entry as it was before the optimistic mutation. Present only while
    /// the poll is in the `Voting` phase.
    snapshot: Option<PollCacheEntry>,
}

impl PollSlot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Per-poll client state: the cache plus the vote state machine.
///
/// All methods are synchronous; callers that share a store across tasks
/// hold it behind a mutex and release it before any network call.
#[derive(Debug, Default)]
pub struct PollStore {
    cache: PollCache,
    slots: HashMap<String, PollSlot>,
}

impl PollStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously persisted cache. Polls still need to be
    /// observed before they can be voted on.
    pub fn with_cache(cache: PollCache) -> Self {
        Self {
            cache,
            slots: HashMap::new(),
        }
    }

    pub fn load(path: &Path) -> Self {
        Self::with_cache(PollCache::load(path))
    }

    /// Record a server view. The cache entry is created on first sight and
    /// left alone afterwards; use [`PollStore::refresh`] to overwrite it.
    /// An entry seeded from a list summary is completed by the first full
    /// view, since summaries carry no voter lists.
    pub fn observe(&mut self, view: &PollView) -> PollCacheEntry {
        self.remember(&view.poll_id, &view.options, view.expires_at);
        let summary_only = self
            .slots
            .get(&view.poll_id)
            .is_some_and(|slot| slot.summary_only);
        if summary_only && self.phase(&view.poll_id) != VotePhase::Voting {
            self.mark_complete(&view.poll_id);
            let entry = PollCacheEntry::from_view(view);
            self.cache.insert(&view.poll_id, entry.clone());
            return entry;
        }
        self.cache
            .get_or_insert_with(&view.poll_id, || PollCacheEntry::from_view(view))
            .clone()
    }

    /// Seed the cache from a list entry. Existing entries are kept.
    pub fn observe_summary(&mut self, summary: &PollSummary) -> PollCacheEntry {
        self.remember(&summary.id, &summary.options, summary.expires_at);
        if let Some(existing) = self.cache.get(&summary.id) {
            return existing.clone();
        }
        if let Some(slot) = self.slots.get_mut(&summary.id) {
            slot.summary_only = true;
        }
        let entry = PollCacheEntry::from_summary(summary);
        self.cache.insert(&summary.id, entry.clone());
        entry
    }

    fn mark_complete(&mut self, poll_id: &str) {
        if let Some(slot) = self.slots.get_mut(poll_id) {
            slot.summary_only = false;
        }
    }

    /// Replace the cached entry with a fresh server view. Ignored while a
    /// vote on the poll is in flight; returns whether the entry was replaced.
    pub fn refresh(&mut self, view: &PollView) -> bool {
        self.remember(&view.poll_id, &view.options, view.expires_at);
        if self.phase(&view.poll_id) == VotePhase::Voting {
            return false;
        }
        self.mark_complete(&view.poll_id);
        self.cache.insert(&view.poll_id, PollCacheEntry::from_view(view));
        true
    }

    fn remember(&mut self, poll_id: &str, options: &[String], expires_at: Option<DateTime<Utc>>) {
        let slot = self.slots.entry(poll_id.to_string()).or_default();
        slot.options = options.to_vec();
        slot.expires_at = expires_at;
    }

    pub fn entry(&self, poll_id: &str) -> Option<&PollCacheEntry> {
        self.cache.get(poll_id)
    }

    pub fn cache(&self) -> &PollCache {
        &self.cache
    }

    pub fn phase(&self, poll_id: &str) -> VotePhase {
        if self
            .slots
            .get(poll_id)
            .is_some_and(|slot| slot.snapshot.is_some())
        {
            return VotePhase::Voting;
        }
        match self.cache.get(poll_id) {
            Some(entry) if entry.has_voted => VotePhase::Voted,
            _ => VotePhase::NotVoted,
        }
    }

    pub fn is_expired(&self, poll_id: &str, now: DateTime<Utc>) -> bool {
        self.slots
            .get(poll_id)
            .is_some_and(|slot| slot.is_expired(now))
    }

    pub fn can_vote(&self, poll_id: &str, now: DateTime<Utc>) -> bool {
        self.slots.contains_key(poll_id)
            && self.phase(poll_id) == VotePhase::NotVoted
            && !self.is_expired(poll_id, now)
    }

    /// Tallies show once the user has voted, once the poll has expired, or
    /// when the user asked to see them.
    pub fn results_visible(&self, poll_id: &str, now: DateTime<Utc>) -> bool {
        let voted = self.cache.get(poll_id).is_some_and(|e| e.has_voted);
        let shown = self.slots.get(poll_id).is_some_and(|s| s.show_results);
        voted || shown || self.is_expired(poll_id, now)
    }

    /// Flip "show results" for an unvoted, unexpired poll. Returns the
    /// resulting visibility; other polls are left as they are.
    pub fn toggle_results(&mut self, poll_id: &str, now: DateTime<Utc>) -> bool {
        if self.phase(poll_id) != VotePhase::NotVoted || self.is_expired(poll_id, now) {
            return self.results_visible(poll_id, now);
        }
        if let Some(slot) = self.slots.get_mut(poll_id) {
            slot.show_results = !slot.show_results;
        }
        self.results_visible(poll_id, now)
    }

    /// Enter `Voting`: snapshot the entry, then apply the optimistic vote.
    /// Every rejection leaves the store untouched.
    pub fn begin_vote(
        &mut self,
        poll_id: &str,
        option: &str,
        now: DateTime<Utc>,
    ) -> Result<PollCacheEntry, ClientError> {
        let slot = self
            .slots
            .get(poll_id)
            .ok_or_else(|| ClientError::UnknownPoll(poll_id.to_string()))?;
        match self.phase(poll_id) {
            VotePhase::Voting => return Err(ClientError::VoteInFlight),
            VotePhase::Voted => return Err(ClientError::AlreadyVoted),
            VotePhase::NotVoted => {}
        }
        if slot.is_expired(now) {
            return Err(ClientError::PollExpired);
        }
        if !slot.options.iter().any(|o| o == option) {
            return Err(ClientError::UnknownOption(option.to_string()));
        }

        let snapshot = self.cache.get(poll_id).cloned().unwrap_or_default();
        let optimistic = self.cache.update(poll_id, |entry| {
            entry.apply_optimistic_vote(option);
            entry.clone()
        });
        if let Some(slot) = self.slots.get_mut(poll_id) {
            slot.snapshot = Some(snapshot);
        }
        tracing::debug!(poll_id, option, "optimistic vote applied");
        Ok(optimistic)
    }

    /// Settle a vote with the server's tally, which replaces the optimistic
    /// guess wholesale.
    pub fn confirm_vote(&mut self, poll_id: &str, receipt: &VoteReceipt) -> PollCacheEntry {
        if let Some(slot) = self.slots.get_mut(poll_id) {
            slot.snapshot = None;
            slot.summary_only = false;
        }
        self.cache.update(poll_id, |entry| {
            entry.apply_receipt(receipt);
            entry.clone()
        })
    }

    /// Abandon an in-flight vote and restore the pre-vote entry exactly.
    pub fn fail_vote(&mut self, poll_id: &str) {
        let snapshot = self
            .slots
            .get_mut(poll_id)
            .and_then(|slot| slot.snapshot.take());
        if let Some(snapshot) = snapshot {
            self.cache.insert(poll_id, snapshot);
            tracing::debug!(poll_id, "optimistic vote rolled back");
        }
    }

    /// The cache as it should be written to disk: in-flight entries are
    /// replaced by their pre-vote snapshot.
    pub fn persisted_cache(&self) -> PollCache {
        let mut cache = self.cache.clone();
        for (poll_id, slot) in &self.slots {
            if let Some(snapshot) = &slot.snapshot {
                cache.insert(poll_id, snapshot.clone());
            }
        }
        cache
    }

    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        self.persisted_cache().save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use townsquare_models::poll::{VoteResults, VotersByOption, Voter};
    use townsquare_models::user::Author;

    fn view(expires_at: Option<DateTime<Utc>>) -> PollView {
        PollView {
            poll_id: "p1".into(),
            question: "Cleanup?".into(),
            options: vec!["A".into(), "B".into()],
            total_votes: 5,
            vote_results: [("A".to_string(), 3), ("B".to_string(), 2)].into(),
            voters_by_option: VotersByOption::new(),
            user_vote: None,
            has_voted: false,
            expires_at,
        }
    }

    fn receipt() -> VoteReceipt {
        VoteReceipt {
            poll_id: "p1".into(),
            total_votes: 7,
            vote_results: [("A".to_string(), 5), ("B".to_string(), 2)].into(),
            voters_by_option: [(
                "A".to_string(),
                vec![Voter {
                    id: "9".into(),
                    name: "Anonymous".into(),
                    image: None,
                }],
            )]
            .into(),
            user_vote: "A".into(),
            has_voted: true,
        }
    }

    #[test]
    fn optimistic_vote_then_rollback_restores_exact_state() {
        let now = Utc::now();
        let mut store = PollStore::new();
        let initial = store.observe(&view(None));

        let optimistic = store.begin_vote("p1", "A", now).unwrap();
        assert_eq!(store.phase("p1"), VotePhase::Voting);
        assert!(optimistic.has_voted);
        assert_eq!(optimistic.selected_option.as_deref(), Some("A"));
        assert_eq!(
            optimistic.vote_results,
            VoteResults::from([("A".to_string(), 4), ("B".to_string(), 2)])
        );
        assert_eq!(optimistic.total_votes, 6);

        store.fail_vote("p1");
        assert_eq!(store.phase("p1"), VotePhase::NotVoted);
        assert_eq!(store.entry("p1"), Some(&initial));
    }

    #[test]
    fn confirm_overwrites_with_server_values() {
        let now = Utc::now();
        let mut store = PollStore::new();
        store.observe(&view(None));
        store.begin_vote("p1", "A", now).unwrap();

        let settled = store.confirm_vote("p1", &receipt());
        assert_eq!(store.phase("p1"), VotePhase::Voted);
        assert_eq!(settled.total_votes, 7);
        assert_eq!(settled.votes_for("A"), 5);
        assert_eq!(settled.voters_by_option["A"].len(), 1);
        assert!(store.results_visible("p1", now));
    }

    #[test]
    fn second_vote_while_in_flight_changes_nothing() {
        let now = Utc::now();
        let mut store = PollStore::new();
        store.observe(&view(None));
        let optimistic = store.begin_vote("p1", "A", now).unwrap();

        let err = store.begin_vote("p1", "B", now).unwrap_err();
        assert!(matches!(err, ClientError::VoteInFlight));
        assert_eq!(store.entry("p1"), Some(&optimistic));
    }

    #[test]
    fn local_rejections_leave_store_untouched() {
        let now = Utc::now();
        let mut store = PollStore::new();
        assert!(matches!(
            store.begin_vote("p1", "A", now),
            Err(ClientError::UnknownPoll(_))
        ));

        let initial = store.observe(&view(None));
        assert!(matches!(
            store.begin_vote("p1", "C", now),
            Err(ClientError::UnknownOption(_))
        ));
        assert_eq!(store.entry("p1"), Some(&initial));

        store.begin_vote("p1", "B", now).unwrap();
        store.confirm_vote("p1", &receipt());
        assert!(matches!(
            store.begin_vote("p1", "B", now),
            Err(ClientError::AlreadyVoted)
        ));
    }

    #[test]
    fn expired_poll_blocks_voting_and_shows_results() {
        let now = Utc::now();
        let mut store = PollStore::new();
        let initial = store.observe(&view(Some(now - Duration::minutes(1))));

        assert!(!store.can_vote("p1", now));
        assert!(store.results_visible("p1", now));
        assert!(matches!(
            store.begin_vote("p1", "A", now),
            Err(ClientError::PollExpired)
        ));
        assert_eq!(store.entry("p1"), Some(&initial));
        assert!(store.toggle_results("p1", now));
        assert!(store.results_visible("p1", now));
    }

    #[test]
    fn toggle_results_only_while_unvoted() {
        let now = Utc::now();
        let mut store = PollStore::new();
        store.observe(&view(Some(now + Duration::hours(1))));

        assert!(!store.results_visible("p1", now));
        assert!(store.toggle_results("p1", now));
        assert!(!store.toggle_results("p1", now));

        store.begin_vote("p1", "A", now).unwrap();
        store.confirm_vote("p1", &receipt());
        assert!(store.toggle_results("p1", now));
        assert!(store.results_visible("p1", now));
    }

    #[test]
    fn observe_keeps_existing_entry_refresh_replaces_it() {
        let now = Utc::now();
        let mut store = PollStore::new();
        store.observe(&view(None));

        let mut newer = view(None);
        newer.total_votes = 6;
        newer.vote_results.insert("B".into(), 3);
        assert_eq!(store.observe(&newer).total_votes, 5);

        assert!(store.refresh(&newer));
        assert_eq!(store.entry("p1").map(|e| e.total_votes), Some(6));

        store.begin_vote("p1", "A", now).unwrap();
        assert!(!store.refresh(&view(None)));
        assert_eq!(store.entry("p1").map(|e| e.total_votes), Some(7));
    }

    fn summary() -> PollSummary {
        PollSummary {
            id: "p1".into(),
            question: "Cleanup?".into(),
            options: vec!["A".into(), "B".into()],
            vote_results: [("A".to_string(), 1), ("B".to_string(), 0)].into(),
            total_votes: 1,
            user_vote: None,
            has_voted: false,
            expires_at: None,
            neighborhood: Some("Riverside".into()),
            created_at: Utc::now(),
            author: Author {
                id: "1".into(),
                name: "Ada".into(),
                image: None,
                neighborhood: None,
            },
        }
    }

    fn view_with_voter() -> PollView {
        PollView {
            total_votes: 1,
            vote_results: [("A".to_string(), 1), ("B".to_string(), 0)].into(),
            voters_by_option: [(
                "A".to_string(),
                vec![Voter {
                    id: "7".into(),
                    name: "Grace".into(),
                    image: None,
                }],
            )]
            .into(),
            ..view(None)
        }
    }

    #[test]
    fn summary_seed_is_completed_by_first_full_view() {
        let now = Utc::now();
        let mut store = PollStore::new();
        let seeded = store.observe_summary(&summary());
        assert_eq!(seeded.total_votes, 1);
        assert!(seeded.voters_by_option.is_empty());
        assert!(store.can_vote("p1", now));

        let loaded = store.observe(&view_with_voter());
        assert_eq!(loaded.voters_by_option["A"][0].name, "Grace");

        // Once complete, later views no longer replace the entry.
        let again = store.observe(&view(None));
        assert_eq!(again, loaded);
    }

    #[test]
    fn summary_does_not_replace_existing_entry() {
        let mut store = PollStore::new();
        let full = store.observe(&view_with_voter());
        assert_eq!(store.observe_summary(&summary()), full);
        assert_eq!(store.observe(&view(None)), full);
    }

    #[test]
    fn persisted_cache_holds_snapshot_for_in_flight_vote() {
        let now = Utc::now();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polls.json");

        let mut store = PollStore::new();
        let initial = store.observe(&view(None));
        store.begin_vote("p1", "A", now).unwrap();
        store.save(&path).unwrap();

        let restored = PollStore::load(&path);
        assert_eq!(restored.entry("p1"), Some(&initial));
        assert_eq!(restored.phase("p1"), VotePhase::NotVoted);
        // Not observed since the restart.
        assert!(!restored.can_vote("p1", now));
    }
}
