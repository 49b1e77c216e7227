//! Vote ledger: poll creation, vote casting and poll state reads.

use chrono::{DateTime, Utc};
use townsquare_db::polls::PollRow;
use townsquare_db::{DbError, DbPool};
use townsquare_models::poll::{CreatePollRequest, PollSummary, PollView, VoteReceipt};
use townsquare_models::user::{Author, ANONYMOUS_NAME};

use crate::error::CoreError;
use crate::tally::{tally, Tally};

pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_POLL_OPTIONS: usize = 10;
pub const MAX_QUESTION_LEN: usize = 300;
pub const MAX_OPTION_LEN: usize = 100;
pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;

/// A creation request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub neighborhood: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn validate_new_poll(
    req: &CreatePollRequest,
    now: DateTime<Utc>,
) -> Result<NewPoll, CoreError> {
    let question = non_empty(req.question.as_deref())
        .ok_or_else(|| CoreError::BadRequest("Question is required".into()))?;
    if question.chars().count() > MAX_QUESTION_LEN {
        return Err(CoreError::BadRequest(format!(
            "Question must be at most {MAX_QUESTION_LEN} characters"
        )));
    }

    if req.options.len() < MIN_POLL_OPTIONS {
        return Err(CoreError::BadRequest(
            "Question and at least two options are required".into(),
        ));
    }
    if req.options.len() > MAX_POLL_OPTIONS {
        return Err(CoreError::BadRequest(format!(
            "A poll can have at most {MAX_POLL_OPTIONS} options"
        )));
    }

    let mut options: Vec<String> = Vec::with_capacity(req.options.len());
    for raw in &req.options {
        let label = raw.trim();
        if label.is_empty() {
            return Err(CoreError::BadRequest("Options cannot be empty".into()));
        }
        if label.chars().count() > MAX_OPTION_LEN {
            return Err(CoreError::BadRequest(format!(
                "Options must be at most {MAX_OPTION_LEN} characters"
            )));
        }
        if options.iter().any(|existing| existing == label) {
            return Err(CoreError::BadRequest(format!(
                "Duplicate option '{label}'"
            )));
        }
        options.push(label.to_string());
    }

    if let Some(expires_at) = req.expires_at {
        if expires_at <= now {
            return Err(CoreError::BadRequest(
                "Expiry must be in the future".into(),
            ));
        }
    }

    Ok(NewPoll {
        question,
        options,
        expires_at: req.expires_at,
        neighborhood: non_empty(req.neighborhood.as_deref()),
    })
}

fn is_expired(poll: &PollRow, now: DateTime<Utc>) -> bool {
    poll.expires_at.is_some_and(|at| at <= now)
}

fn author_of(poll: &PollRow) -> Author {
    Author {
        id: poll.author_id.to_string(),
        name: poll
            .author_display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string()),
        image: poll.author_avatar_url.clone(),
        neighborhood: poll.author_neighborhood.clone(),
    }
}

async fn load_tally(pool: &DbPool, poll_id: i64) -> Result<(Vec<String>, Tally), CoreError> {
    let options = townsquare_db::polls::get_poll_options(pool, poll_id).await?;
    let votes = townsquare_db::polls::get_poll_votes(pool, poll_id).await?;
    let tally = tally(&options, &votes);
    Ok((options, tally))
}

async fn viewer_vote(
    pool: &DbPool,
    poll_id: i64,
    viewer: Option<i64>,
) -> Result<Option<String>, CoreError> {
    match viewer {
        Some(user_id) => Ok(townsquare_db::polls::get_user_vote(pool, poll_id, user_id).await?),
        None => Ok(None),
    }
}

fn build_view(poll: &PollRow, options: Vec<String>, tally: Tally, user_vote: Option<String>) -> PollView {
    PollView {
        poll_id: poll.id.to_string(),
        question: poll.question.clone(),
        options,
        total_votes: tally.total_votes,
        vote_results: tally.vote_results,
        voters_by_option: tally.voters_by_option,
        has_voted: user_vote.is_some(),
        user_vote,
        expires_at: poll.expires_at,
    }
}

/// Create a poll authored by `author_id`. The poll's neighborhood defaults
/// to the author's.
pub async fn create_poll(
    pool: &DbPool,
    poll_id: i64,
    author_id: i64,
    req: &CreatePollRequest,
    now: DateTime<Utc>,
) -> Result<PollView, CoreError> {
    let new_poll = validate_new_poll(req, now)?;

    let author = townsquare_db::users::get_user_by_id(pool, author_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    let neighborhood = new_poll.neighborhood.clone().or(author.neighborhood);

    let row = townsquare_db::polls::create_poll(
        pool,
        poll_id,
        author_id,
        &new_poll.question,
        &new_poll.options,
        neighborhood.as_deref(),
        new_poll.expires_at,
    )
    .await
    .map_err(|e| match e {
        DbError::Duplicate => CoreError::BadRequest("Duplicate poll option".into()),
        other => other.into(),
    })?;

    tracing::info!(
        poll_id = row.id,
        author_id,
        options = new_poll.options.len(),
        neighborhood = row.neighborhood.as_deref().unwrap_or(""),
        "poll created"
    );

    let empty = tally(&new_poll.options, &[]);
    Ok(build_view(&row, new_poll.options, empty, None))
}

/// Record `user_id`'s vote for `option` and return the post-insert tally.
///
/// Either the vote is stored and included in the returned tally, or nothing
/// is stored and an error comes back. Duplicate votes are decided by the
/// store's `(poll_id, user_id)` constraint, so two racing casts by the same
/// user produce exactly one vote and one [`CoreError::AlreadyVoted`].
pub async fn cast_vote(
    pool: &DbPool,
    poll_id: i64,
    user_id: i64,
    option: &str,
    now: DateTime<Utc>,
) -> Result<VoteReceipt, CoreError> {
    if option.is_empty() {
        return Err(CoreError::BadRequest("Option is required".into()));
    }

    let poll = townsquare_db::polls::get_poll(pool, poll_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if is_expired(&poll, now) {
        tracing::debug!(poll_id, user_id, "vote rejected: poll expired");
        return Err(CoreError::PollExpired);
    }

    let options = townsquare_db::polls::get_poll_options(pool, poll_id).await?;
    if !options.iter().any(|o| o == option) {
        tracing::debug!(poll_id, user_id, option, "vote rejected: invalid option");
        return Err(CoreError::InvalidOption(option.to_string()));
    }

    match townsquare_db::polls::insert_vote(pool, poll_id, user_id, option).await {
        Ok(_) => {}
        Err(DbError::Duplicate) => {
            tracing::debug!(poll_id, user_id, "vote rejected: already voted");
            return Err(CoreError::AlreadyVoted);
        }
        Err(e) => return Err(e.into()),
    }

    let votes = townsquare_db::polls::get_poll_votes(pool, poll_id).await?;
    let tally = tally(&options, &votes);

    tracing::info!(
        poll_id,
        user_id,
        option,
        total_votes = tally.total_votes,
        "vote recorded"
    );

    Ok(VoteReceipt {
        poll_id: poll_id.to_string(),
        total_votes: tally.total_votes,
        vote_results: tally.vote_results,
        voters_by_option: tally.voters_by_option,
        user_vote: option.to_string(),
        has_voted: true,
    })
}

/// Current state of a poll; `viewer` decides `hasVoted` / `userVote`.
pub async fn get_poll_state(
    pool: &DbPool,
    poll_id: i64,
    viewer: Option<i64>,
) -> Result<PollView, CoreError> {
    let poll = townsquare_db::polls::get_poll(pool, poll_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    let (options, tally) = load_tally(pool, poll_id).await?;
    let user_vote = viewer_vote(pool, poll_id, viewer).await?;
    Ok(build_view(&poll, options, tally, user_vote))
}

pub fn clamp_list_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Poll summaries, newest first.
pub async fn list_polls(
    pool: &DbPool,
    viewer: Option<i64>,
    neighborhood: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<PollSummary>, CoreError> {
    let neighborhood = non_empty(neighborhood);
    let rows =
        townsquare_db::polls::list_polls(pool, neighborhood.as_deref(), clamp_list_limit(limit))
            .await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for poll in rows {
        let (options, tally) = load_tally(pool, poll.id).await?;
        let user_vote = viewer_vote(pool, poll.id, viewer).await?;
        summaries.push(PollSummary {
            id: poll.id.to_string(),
            question: poll.question.clone(),
            options,
            vote_results: tally.vote_results,
            total_votes: tally.total_votes,
            has_voted: user_vote.is_some(),
            user_vote,
            expires_at: poll.expires_at,
            neighborhood: poll.neighborhood.clone(),
            created_at: poll.created_at,
            author: author_of(&poll),
        });
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_pool() -> DbPool {
        let pool = townsquare_db::create_pool("sqlite::memory:", 1).await.unwrap();
        townsquare_db::run_migrations(&pool).await.unwrap();
        for (id, name) in [(1, "u1"), (2, "u2"), (3, "u3")] {
            townsquare_db::users::create_user(&pool, id, name, Some(name), None, Some("Riverside"))
                .await
                .unwrap();
        }
        pool
    }

    fn request(question: &str, options: &[&str]) -> CreatePollRequest {
        CreatePollRequest {
            question: Some(question.to_string()),
            options: options.iter().map(|s| s.to_string()).collect(),
            expires_at: None,
            neighborhood: None,
        }
    }

    async fn cleanup_poll(pool: &DbPool) -> i64 {
        create_poll(pool, 100, 1, &request("Cleanup?", &["Yes", "No"]), Utc::now())
            .await
            .unwrap();
        100
    }

    #[test]
    fn validation_rejects_missing_question_and_short_options() {
        let now = Utc::now();
        let mut req = request("  ", &["A", "B"]);
        assert!(matches!(
            validate_new_poll(&req, now),
            Err(CoreError::BadRequest(_))
        ));
        req = request("Q", &["A"]);
        assert!(matches!(
            validate_new_poll(&req, now),
            Err(CoreError::BadRequest(_))
        ));
        req.question = None;
        assert!(validate_new_poll(&req, now).is_err());
    }

    #[test]
    fn validation_trims_and_rejects_duplicates() {
        let now = Utc::now();
        let ok = validate_new_poll(&request(" Q ", &[" A ", "B"]), now).unwrap();
        assert_eq!(ok.question, "Q");
        assert_eq!(ok.options, vec!["A".to_string(), "B".to_string()]);

        let dup = validate_new_poll(&request("Q", &["A", " A"]), now);
        assert!(matches!(dup, Err(CoreError::BadRequest(_))));

        let blank = validate_new_poll(&request("Q", &["A", ""]), now);
        assert!(matches!(blank, Err(CoreError::BadRequest(_))));
    }

    #[test]
    fn validation_rejects_past_expiry_and_too_many_options() {
        let now = Utc::now();
        let mut req = request("Q", &["A", "B"]);
        req.expires_at = Some(now - Duration::minutes(1));
        assert!(validate_new_poll(&req, now).is_err());

        let many: Vec<String> = (0..=MAX_POLL_OPTIONS).map(|i| format!("o{i}")).collect();
        let req = CreatePollRequest {
            question: Some("Q".into()),
            options: many,
            ..Default::default()
        };
        assert!(validate_new_poll(&req, now).is_err());
    }

    #[tokio::test]
    async fn cleanup_scenario_views_differ_per_user() {
        let pool = test_pool().await;
        let poll_id = cleanup_poll(&pool).await;

        let receipt = cast_vote(&pool, poll_id, 1, "Yes", Utc::now()).await.unwrap();
        assert_eq!(receipt.total_votes, 1);
        assert_eq!(receipt.user_vote, "Yes");
        assert!(receipt.has_voted);

        let u1 = get_poll_state(&pool, poll_id, Some(1)).await.unwrap();
        assert_eq!(u1.vote_results["Yes"], 1);
        assert_eq!(u1.vote_results["No"], 0);
        assert_eq!(u1.total_votes, 1);
        assert_eq!(u1.user_vote.as_deref(), Some("Yes"));
        assert!(u1.has_voted);

        let u2 = get_poll_state(&pool, poll_id, Some(2)).await.unwrap();
        assert!(!u2.has_voted);
        assert!(u2.user_vote.is_none());
        assert_eq!(u2.vote_results, u1.vote_results);

        let anonymous = get_poll_state(&pool, poll_id, None).await.unwrap();
        assert!(!anonymous.has_voted);
        assert_eq!(anonymous.question, "Cleanup?");
        assert_eq!(anonymous.options, vec!["Yes".to_string(), "No".to_string()]);
    }

    #[tokio::test]
    async fn second_vote_is_already_voted_and_not_recorded() {
        let pool = test_pool().await;
        let poll_id = cleanup_poll(&pool).await;

        cast_vote(&pool, poll_id, 2, "Yes", Utc::now()).await.unwrap();
        let err = cast_vote(&pool, poll_id, 2, "No", Utc::now()).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyVoted));

        let view = get_poll_state(&pool, poll_id, Some(2)).await.unwrap();
        assert_eq!(view.total_votes, 1);
        assert_eq!(view.user_vote.as_deref(), Some("Yes"));
    }

    #[tokio::test]
    async fn concurrent_casts_record_exactly_one_vote() {
        let pool = test_pool().await;
        let poll_id = cleanup_poll(&pool).await;

        let now = Utc::now();
        let (a, b) = tokio::join!(
            cast_vote(&pool, poll_id, 3, "Yes", now),
            cast_vote(&pool, poll_id, 3, "No", now),
        );
        let outcomes = [a, b];
        let accepted = outcomes.iter().filter(|r| r.is_ok()).count();
        let rejected = outcomes
            .iter()
            .filter(|r| matches!(r, Err(CoreError::AlreadyVoted)))
            .count();
        assert_eq!((accepted, rejected), (1, 1));
        assert_eq!(
            townsquare_db::polls::count_poll_votes(&pool, poll_id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn invalid_option_changes_nothing() {
        let pool = test_pool().await;
        let poll_id = cleanup_poll(&pool).await;
        cast_vote(&pool, poll_id, 1, "No", Utc::now()).await.unwrap();
        let before = get_poll_state(&pool, poll_id, None).await.unwrap();

        let err = cast_vote(&pool, poll_id, 2, "Perhaps", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOption(ref o) if o == "Perhaps"));

        let after = get_poll_state(&pool, poll_id, None).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn missing_poll_is_not_found() {
        let pool = test_pool().await;
        assert!(matches!(
            cast_vote(&pool, 999, 1, "Yes", Utc::now()).await,
            Err(CoreError::NotFound)
        ));
        assert!(matches!(
            get_poll_state(&pool, 999, None).await,
            Err(CoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn expired_poll_rejects_votes() {
        let pool = test_pool().await;
        let created = Utc::now();
        let mut req = request("Soon over", &["A", "B"]);
        req.expires_at = Some(created + Duration::hours(1));
        create_poll(&pool, 200, 1, &req, created).await.unwrap();

        let later = created + Duration::hours(2);
        let err = cast_vote(&pool, 200, 2, "A", later).await.unwrap_err();
        assert!(matches!(err, CoreError::PollExpired));
        assert_eq!(
            townsquare_db::polls::count_poll_votes(&pool, 200).await.unwrap(),
            0
        );

        cast_vote(&pool, 200, 2, "A", created).await.unwrap();
    }

    #[tokio::test]
    async fn totals_match_sum_after_many_casts() {
        let pool = test_pool().await;
        create_poll(&pool, 300, 1, &request("Pick", &["A", "B", "C"]), Utc::now())
            .await
            .unwrap();
        cast_vote(&pool, 300, 1, "B", Utc::now()).await.unwrap();
        cast_vote(&pool, 300, 2, "B", Utc::now()).await.unwrap();
        let receipt = cast_vote(&pool, 300, 3, "A", Utc::now()).await.unwrap();

        assert_eq!(receipt.total_votes, 3);
        assert_eq!(receipt.vote_results.values().sum::<u32>(), receipt.total_votes);
        assert_eq!(receipt.vote_results["C"], 0);
        assert!(receipt.voters_by_option["C"].is_empty());
        let b_voters: Vec<&str> = receipt.voters_by_option["B"]
            .iter()
            .map(|v| v.id.as_str())
            .collect();
        assert_eq!(b_voters, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn create_poll_defaults_neighborhood_to_author() {
        let pool = test_pool().await;
        create_poll(&pool, 400, 1, &request("Q", &["A", "B"]), Utc::now())
            .await
            .unwrap();
        let mut req = request("Q2", &["A", "B"]);
        req.neighborhood = Some("Hilltop".into());
        create_poll(&pool, 401, 1, &req, Utc::now()).await.unwrap();

        let riverside = list_polls(&pool, None, Some("Riverside"), None).await.unwrap();
        assert_eq!(riverside.len(), 1);
        assert_eq!(riverside[0].id, "400");
        assert_eq!(riverside[0].author.name, "u1");
    }

    #[tokio::test]
    async fn create_poll_by_unknown_author_is_not_found() {
        let pool = test_pool().await;
        let err = create_poll(&pool, 500, 77, &request("Q", &["A", "B"]), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[tokio::test]
    async fn list_polls_reports_viewer_vote() {
        let pool = test_pool().await;
        create_poll(&pool, 600, 1, &request("First", &["A", "B"]), Utc::now())
            .await
            .unwrap();
        create_poll(&pool, 601, 1, &request("Second", &["A", "B"]), Utc::now())
            .await
            .unwrap();
        cast_vote(&pool, 600, 2, "B", Utc::now()).await.unwrap();

        let list = list_polls(&pool, Some(2), None, None).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "601");
        assert!(!list[0].has_voted);
        assert_eq!(list[1].user_vote.as_deref(), Some("B"));
        assert_eq!(list[1].total_votes, 1);
    }

    #[test]
    fn list_limit_is_clamped() {
        assert_eq!(clamp_list_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_list_limit(Some(0)), 1);
        assert_eq!(clamp_list_limit(Some(10_000)), MAX_LIST_LIMIT);
    }
}
