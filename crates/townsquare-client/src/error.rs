use thiserror::Error;

/// User-facing category of a failed poll operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    InvalidOption,
    AlreadyVoted,
    Expired,
    Unauthenticated,
    /// Network or server trouble; nothing changed and a retry may work.
    Transient,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("server rejected request ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Rejected { status, code, .. } => match (*status, code.as_str()) {
                (_, "ALREADY_VOTED") => FailureKind::AlreadyVoted,
                (_, "POLL_EXPIRED") => FailureKind::Expired,
                (_, "INVALID_OPTION") | (400, _) => FailureKind::InvalidOption,
                (401, _) => FailureKind::Unauthenticated,
                (403, _) => FailureKind::AlreadyVoted,
                (404, _) => FailureKind::NotFound,
                _ => FailureKind::Transient,
            },
            TransportError::Timeout | TransportError::Network(_) | TransportError::Decode(_) => {
                FailureKind::Transient
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// Another vote for this poll is still waiting on the server.
    #[error("a vote on this poll is already in flight")]
    VoteInFlight,
    #[error("already voted on this poll")]
    AlreadyVoted,
    #[error("poll has expired")]
    PollExpired,
    #[error("poll {0} has not been loaded")]
    UnknownPoll(String),
    #[error("'{0}' is not an option of this poll")]
    UnknownOption(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("cache persistence failed: {0}")]
    Persistence(String),
}

impl ClientError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::AlreadyVoted | ClientError::VoteInFlight => FailureKind::AlreadyVoted,
            ClientError::PollExpired => FailureKind::Expired,
            ClientError::UnknownPoll(_) => FailureKind::NotFound,
            ClientError::UnknownOption(_) => FailureKind::InvalidOption,
            ClientError::Transport(e) => e.kind(),
            ClientError::Persistence(_) => FailureKind::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(status: u16, code: &str) -> TransportError {
        TransportError::Rejected {
            status,
            code: code.to_string(),
            message: String::new(),
        }
    }

    #[test]
    fn server_codes_classify() {
        assert_eq!(rejected(403, "ALREADY_VOTED").kind(), FailureKind::AlreadyVoted);
        assert_eq!(rejected(403, "POLL_EXPIRED").kind(), FailureKind::Expired);
        assert_eq!(rejected(400, "INVALID_OPTION").kind(), FailureKind::InvalidOption);
        assert_eq!(rejected(401, "UNAUTHORIZED").kind(), FailureKind::Unauthenticated);
        assert_eq!(rejected(404, "NOT_FOUND").kind(), FailureKind::NotFound);
        assert_eq!(rejected(500, "INTERNAL_ERROR").kind(), FailureKind::Transient);
        assert_eq!(rejected(503, "SERVICE_UNAVAILABLE").kind(), FailureKind::Transient);
        assert_eq!(TransportError::Timeout.kind(), FailureKind::Transient);
    }
}
