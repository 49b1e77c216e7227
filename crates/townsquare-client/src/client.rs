use chrono::Utc;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::PollCacheEntry;
use crate::error::ClientError;
use crate::store::{PollStore, VotePhase};
use crate::transport::VoteTransport;
use townsquare_models::poll::{PollSummary, VoteReceipt};

fn lock_store(store: &Mutex<PollStore>) -> MutexGuard<'_, PollStore> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Rolls an in-flight vote back when dropped unless it was confirmed first,
/// including when the vote future itself is dropped before the server answers.
struct PendingVote<'a> {
    store: &'a Mutex<PollStore>,
    poll_id: &'a str,
    settled: bool,
}

impl<'a> PendingVote<'a> {
    fn new(store: &'a Mutex<PollStore>, poll_id: &'a str) -> Self {
        Self {
            store,
            poll_id,
            settled: false,
        }
    }

    fn confirm(mut self, receipt: &VoteReceipt) -> PollCacheEntry {
        self.settled = true;
        lock_store(self.store).confirm_vote(self.poll_id, receipt)
    }
}

impl Drop for PendingVote<'_> {
    fn drop(&mut self) {
        if !self.settled {
            lock_store(self.store).fail_vote(self.poll_id);
        }
    }
}

/// Drives optimistic votes through a shared [`PollStore`].
///
/// The store lock is only ever held for synchronous transitions, never
/// across a transport call, so reads stay responsive while a vote is in
/// flight.
pub struct PollClient<T> {
    transport: T,
    store: Arc<Mutex<PollStore>>,
}

impl<T: VoteTransport> PollClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_store(transport, PollStore::new())
    }

    pub fn with_store(transport: T, store: PollStore) -> Self {
        Self {
            transport,
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<Mutex<PollStore>> {
        Arc::clone(&self.store)
    }

    fn lock(&self) -> MutexGuard<'_, PollStore> {
        lock_store(&self.store)
    }

    /// Fetch a poll and seed its cache entry if this is the first sighting.
    pub async fn load_poll(&self, poll_id: &str) -> Result<PollCacheEntry, ClientError> {
        let view = self.transport.fetch_poll(poll_id).await?;
        Ok(self.lock().observe(&view))
    }

    /// Seed cache entries from a poll listing. Voter lists stay empty until
    /// the poll is loaded in full or voted on.
    pub fn observe_list(&self, summaries: &[PollSummary]) -> Vec<PollCacheEntry> {
        let mut store = self.lock();
        summaries.iter().map(|s| store.observe_summary(s)).collect()
    }

    /// Fetch a poll and overwrite its cache entry with the server's state.
    pub async fn refresh_poll(&self, poll_id: &str) -> Result<PollCacheEntry, ClientError> {
        let view = self.transport.fetch_poll(poll_id).await?;
        let mut store = self.lock();
        store.refresh(&view);
        store
            .entry(poll_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownPoll(poll_id.to_string()))
    }

    /// Vote for `option`. The cache shows the vote immediately; on success it
    /// holds the server's tally, on failure exactly what it held before.
    pub async fn vote(&self, poll_id: &str, option: &str) -> Result<PollCacheEntry, ClientError> {
        self.lock().begin_vote(poll_id, option, Utc::now())?;
        let pending = PendingVote::new(&self.store, poll_id);

        match self.transport.cast_vote(poll_id, option).await {
            Ok(receipt) => {
                let entry = pending.confirm(&receipt);
                tracing::info!(poll_id, option, total = entry.total_votes, "vote confirmed");
                Ok(entry)
            }
            Err(e) => {
                drop(pending);
                tracing::warn!(poll_id, option, kind = ?e.kind(), "vote failed, rolled back: {e}");
                Err(e.into())
            }
        }
    }

    pub fn entry(&self, poll_id: &str) -> Option<PollCacheEntry> {
        self.lock().entry(poll_id).cloned()
    }

    pub fn phase(&self, poll_id: &str) -> VotePhase {
        self.lock().phase(poll_id)
    }

    pub fn can_vote(&self, poll_id: &str) -> bool {
        self.lock().can_vote(poll_id, Utc::now())
    }

    pub fn results_visible(&self, poll_id: &str) -> bool {
        self.lock().results_visible(poll_id, Utc::now())
    }

    pub fn toggle_results(&self, poll_id: &str) -> bool {
        self.lock().toggle_results(poll_id, Utc::now())
    }

    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        self.lock().save(path)
    }
}
