// Domain error taxonomy shared by every auction operation.

use thiserror::Error;

/// Coarse classification of an [`AuctionError`], used by transports to pick
/// a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    InvalidState,
    ValidationFailed,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case code sent on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuctionError {
    // --- Unauthorized ---
    #[error("not authorized to perform this action")]
    Unauthorized,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid or expired token")]
    InvalidToken,

    // --- NotFound ---
    #[error("auction {0} not found")]
    AuctionNotFound(i64),

    #[error("no auction with code {0}")]
    CodeNotFound(String),

    #[error("player {0} not found")]
    PlayerNotFound(i64),

    #[error("team `{0}` not found")]
    TeamNotFound(String),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("library player {0} not found")]
    LibraryPlayerNotFound(i64),

    // --- InvalidState ---
    #[error("auction {0} is not active")]
    AuctionNotActive(i64),

    #[error("player {0} is already sold")]
    AlreadySold(i64),

    #[error("team `{0}` has bought players and cannot be changed this way")]
    TeamHasPlayers(String),

    #[error("player {0} is sold and can no longer be modified")]
    PlayerSold(i64),

    // --- ValidationFailed ---
    #[error("select a team in this auction before bidding")]
    NoTeamSelected,

    #[error("bid of {amount} must be higher than the current bid of {current}")]
    BidTooLow { amount: i64, current: i64 },

    #[error("bid of {amount} exceeds remaining budget of {remaining}")]
    InsufficientBudget { amount: i64, remaining: i64 },

    #[error("budget of {budget} would leave a remaining balance of {remaining}")]
    InvalidBudget { budget: i64, remaining: i64 },

    #[error("player {0} has no bids")]
    NoBids(i64),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {message}")]
    InvalidValue { field: &'static str, message: String },

    // --- Conflict ---
    #[error("username `{0}` already exists")]
    UsernameTaken(String),

    #[error("a team named `{0}` already exists in this auction")]
    DuplicateTeam(String),

    // --- Internal ---
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuctionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuctionError::Unauthorized
            | AuctionError::InvalidCredentials
            | AuctionError::InvalidToken => ErrorKind::Unauthorized,

            AuctionError::AuctionNotFound(_)
            | AuctionError::CodeNotFound(_)
            | AuctionError::PlayerNotFound(_)
            | AuctionError::TeamNotFound(_)
            | AuctionError::UserNotFound(_)
            | AuctionError::LibraryPlayerNotFound(_) => ErrorKind::NotFound,

            AuctionError::AuctionNotActive(_)
            | AuctionError::AlreadySold(_)
            | AuctionError::TeamHasPlayers(_)
            | AuctionError::PlayerSold(_) => ErrorKind::InvalidState,

            AuctionError::NoTeamSelected
            | AuctionError::BidTooLow { .. }
            | AuctionError::InsufficientBudget { .. }
            | AuctionError::InvalidBudget { .. }
            | AuctionError::NoBids(_)
            | AuctionError::MissingField(_)
            | AuctionError::InvalidValue { .. } => ErrorKind::ValidationFailed,

            AuctionError::UsernameTaken(_) | AuctionError::DuplicateTeam(_) => ErrorKind::Conflict,

            AuctionError::Storage(_) | AuctionError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Short reason recorded against a rejected bid in the bid log.
    pub fn reason(&self) -> &'static str {
        match self {
            AuctionError::AlreadySold(_) => "already_sold",
            AuctionError::BidTooLow { .. } => "bid_too_low",
            AuctionError::InsufficientBudget { .. } => "insufficient_budget",
            AuctionError::TeamNotFound(_) => "team_not_found",
            AuctionError::AuctionNotActive(_) => "auction_not_active",
            _ => "rejected",
        }
    }
}

pub type Result<T> = std::result::Result<T, AuctionError>;

/// True when a rusqlite error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
