// Records stored by the auction service and their string encodings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuctionError;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Account role carried by a user and its credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Bidder,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Bidder => "bidder",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "bidder" => Some(Role::Bidder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Active,
    Closed,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Active => "active",
            AuctionStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AuctionStatus::Active),
            "closed" => Some(AuctionStatus::Closed),
            _ => None,
        }
    }
}

/// Cricket playing role of an auctioned player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerRole {
    Batsman,
    Bowler,
    #[default]
    #[serde(rename = "All-rounder")]
    AllRounder,
    #[serde(rename = "Wicket-keeper")]
    WicketKeeper,
}

impl PlayerRole {
    /// Parse a role string. Accepts the display names plus a few common
    /// spellings ("allrounder", "wk", "keeper"), case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "batsman" | "batter" => Some(PlayerRole::Batsman),
            "bowler" => Some(PlayerRole::Bowler),
            "all-rounder" | "allrounder" | "all rounder" => Some(PlayerRole::AllRounder),
            "wicket-keeper" | "wicketkeeper" | "wicket keeper" | "keeper" | "wk" => {
                Some(PlayerRole::WicketKeeper)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerRole::Batsman => "Batsman",
            PlayerRole::Bowler => "Bowler",
            PlayerRole::AllRounder => "All-rounder",
            PlayerRole::WicketKeeper => "Wicket-keeper",
        }
    }
}

impl fmt::Display for PlayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Accepted,
    Rejected,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Accepted => "accepted",
            BidStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(BidStatus::Accepted),
            "rejected" => Some(BidStatus::Rejected),
            _ => None,
        }
    }
}

/// Convert a stored enum column into a rusqlite error when the text is not
/// a known variant.
pub(crate) fn decode_column<T>(
    idx: usize,
    raw: String,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown value `{raw}`").into(),
        )
    })
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: i64,
    pub admin_id: i64,
    pub name: String,
    pub code: String,
    pub status: AuctionStatus,
    pub current_player_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: i64,
    pub auction_id: i64,
    pub name: String,
    pub budget: i64,
    pub remaining_budget: i64,
}

/// A player bought by a team, as shown on that team's roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub player_id: i64,
    pub name: String,
    pub role: PlayerRole,
    pub price: i64,
    pub image_url: Option<String>,
}

/// A team together with the players it has bought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamWithRoster {
    #[serde(flatten)]
    pub team: Team,
    pub players: Vec<RosterEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: i64,
    pub auction_id: i64,
    pub name: String,
    pub role: PlayerRole,
    pub country: String,
    pub base_price: i64,
    pub image_url: Option<String>,
    pub current_bid: i64,
    pub current_bidder: Option<String>,
    pub sold: bool,
    pub sold_to: Option<String>,
    pub sold_price: Option<i64>,
}

impl Player {
    pub fn roster_entry(&self) -> Option<RosterEntry> {
        let price = self.sold_price?;
        Some(RosterEntry {
            player_id: self.id,
            name: self.name.clone(),
            role: self.role,
            price,
            image_url: self.image_url.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub player_id: i64,
    pub team: String,
    pub amount: i64,
    pub status: BidStatus,
    pub reason: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryPlayer {
    pub id: i64,
    pub name: String,
    pub role: PlayerRole,
    pub base_price: i64,
    pub country: String,
    pub image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Fields for a new auction player. Missing optional fields fall back to the
/// service defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlayer {
    pub name: String,
    #[serde(default)]
    pub role: Option<PlayerRole>,
    #[serde(default)]
    pub base_price: Option<i64>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Partial update of a player's catalog fields. `None` keeps the stored
/// value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<PlayerRole>,
    #[serde(default)]
    pub base_price: Option<i64>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLibraryPlayer {
    pub name: String,
    pub role: PlayerRole,
    pub base_price: i64,
    pub country: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Require a non-blank string field, returning it trimmed.
pub(crate) fn required(field: &'static str, value: &str) -> Result<String, AuctionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuctionError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

/// Require a strictly positive amount.
pub(crate) fn positive(field: &'static str, value: i64) -> Result<i64, AuctionError> {
    if value <= 0 {
        return Err(AuctionError::InvalidValue {
            field,
            message: format!("must be greater than 0, got {value}"),
        });
    }
    Ok(value)
}
