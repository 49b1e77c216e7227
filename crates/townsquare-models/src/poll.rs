use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::user::Author;

/// Option label -> vote count.
pub type VoteResults = BTreeMap<String, u32>;
/// Option label -> voters, in vote arrival order.
pub type VotersByOption = BTreeMap<String, Vec<Voter>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Body of `POST /polls/{id}/vote`.
///
/// `option` is optional at the type level so a missing field is reported as
/// a 400 by the handler instead of a deserialization rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CastVoteRequest {
    #[serde(default)]
    pub option: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub neighborhood: Option<String>,
}

/// Authoritative tally returned by a successful vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub poll_id: String,
    pub total_votes: u32,
    pub vote_results: VoteResults,
    pub voters_by_option: VotersByOption,
    pub user_vote: String,
    pub has_voted: bool,
}

/// Full state of one poll as seen by a (possibly anonymous) requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollView {
    pub poll_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub total_votes: u32,
    pub vote_results: VoteResults,
    pub voters_by_option: VotersByOption,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_vote: Option<String>,
    pub has_voted: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PollView {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Entry of `GET /polls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub vote_results: VoteResults,
    pub total_votes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_vote: Option<String>,
    pub has_voted: bool,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    pub created_at: DateTime<Utc>,
    pub author: Author,
}
