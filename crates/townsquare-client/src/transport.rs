use async_trait::async_trait;
use townsquare_models::poll::{PollView, VoteReceipt};

use crate::error::TransportError;

/// How the client reaches the vote ledger.
#[async_trait]
pub trait VoteTransport: Send + Sync {
    /// Cast the authenticated user's vote and return the server's tally.
    async fn cast_vote(&self, poll_id: &str, option: &str) -> Result<VoteReceipt, TransportError>;

    async fn fetch_poll(&self, poll_id: &str) -> Result<PollView, TransportError>;
}
