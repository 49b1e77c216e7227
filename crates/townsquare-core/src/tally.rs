//! Aggregate tally over a poll's recorded votes.

use townsquare_db::polls::VoteRow;
use townsquare_models::poll::{VoteResults, Voter, VotersByOption};
use townsquare_models::user::ANONYMOUS_NAME;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub vote_results: VoteResults,
    pub voters_by_option: VotersByOption,
    pub total_votes: u32,
}

pub fn voter_from_row(row: &VoteRow) -> Voter {
    Voter {
        id: row.user_id.to_string(),
        name: row
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string()),
        image: row.avatar_url.clone(),
    }
}

/// Count `votes` (already in arrival order) against the declared `options`.
///
/// Every declared option is present in the result, voted for or not. Votes
/// naming an undeclared option are skipped, so `total_votes` is always the
/// sum of the per-option counts.
pub fn tally(options: &[String], votes: &[VoteRow]) -> Tally {
    let mut out = Tally::default();
    for option in options {
        out.vote_results.insert(option.clone(), 0);
        out.voters_by_option.insert(option.clone(), Vec::new());
    }

    for vote in votes {
        let Some(count) = out.vote_results.get_mut(&vote.option_label) else {
            tracing::warn!(
                poll_id = vote.poll_id,
                vote_id = vote.id,
                "ignoring vote for undeclared option"
            );
            continue;
        };
        *count += 1;
        out.total_votes += 1;
        if let Some(voters) = out.voters_by_option.get_mut(&vote.option_label) {
            voters.push(voter_from_row(vote));
        }
    }

    out
}
