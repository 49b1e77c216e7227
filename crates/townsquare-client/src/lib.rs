//! Client-side poll state with optimistic voting.
//!
//! [`PollStore`] holds one cache entry and one vote phase per poll.
//! [`PollClient`] drives a vote through the store and a [`VoteTransport`]:
//! the cache is bumped before the request goes out, replaced by the server's
//! tally on success, and restored from a snapshot on failure.

pub mod cache;
pub mod client;
pub mod error;
pub mod http;
pub mod store;
pub mod transport;

pub use cache::{PollCache, PollCacheEntry};
pub use client::PollClient;
pub use error::{ClientError, FailureKind, TransportError};
pub use http::HttpTransport;
pub use store::{PollStore, VotePhase};
pub use transport::VoteTransport;
