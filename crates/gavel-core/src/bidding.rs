// Bidding engine: validates and records bids on an auction's players.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{self, Database, BID_COLUMNS};
use crate::error::{AuctionError, Result};
use crate::identity::membership_team;
use crate::models::{AuctionStatus, Bid, BidStatus, Player};

/// Result of an accepted bid: the log row and the player as it now stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidReceipt {
    pub bid: Bid,
    pub player: Player,
}

/// What the bid transaction decided. A rejection is still committed so the
/// attempt stays in the bid log.
enum Outcome {
    Accepted(BidReceipt),
    Rejected(AuctionError),
}

fn record_bid(
    conn: &Connection,
    player: &Player,
    team: &str,
    amount: i64,
    status: BidStatus,
    reason: Option<&str>,
) -> Result<Bid> {
    let timestamp = db::now_timestamp();
    conn.execute(
        "INSERT INTO bids (auction_id, player_id, team, amount, status, reason, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            player.auction_id,
            player.id,
            team,
            amount,
            status.as_str(),
            reason,
            timestamp
        ],
    )?;
    Ok(Bid {
        id: conn.last_insert_rowid(),
        auction_id: player.auction_id,
        player_id: player.id,
        team: team.to_string(),
        amount,
        status,
        reason: reason.map(str::to_string),
        timestamp,
    })
}

/// Checks that depend on live player and team state. `Ok(Some(_))` is a
/// rejection to be logged; `Err` is a storage failure.
fn rejection(
    conn: &Connection,
    player: &Player,
    team_name: &str,
    amount: i64,
) -> Result<Option<AuctionError>> {
    if player.sold {
        return Ok(Some(AuctionError::AlreadySold(player.id)));
    }
    if amount <= player.current_bid {
        return Ok(Some(AuctionError::BidTooLow {
            amount,
            current: player.current_bid,
        }));
    }
    let Some(team) = db::find_team_by_name(conn, player.auction_id, team_name)? else {
        return Ok(Some(AuctionError::TeamNotFound(team_name.to_string())));
    };
    if amount > team.remaining_budget {
        return Ok(Some(AuctionError::InsufficientBudget {
            amount,
            remaining: team.remaining_budget,
        }));
    }
    Ok(None)
}

/// Place a bid of `amount` on `player_id` for the team `user_id` has
/// selected in `auction_id`.
///
/// Checks run against the live rows inside one immediate transaction, first
/// failure wins:
///
/// 1. the user has a team in this auction
/// 2. the auction exists and is active
/// 3. the player exists in this auction
/// 4. the player is unsold
/// 5. `amount` beats the current bid
/// 6. the team exists and can afford `amount`
///
/// Failures from step 4 on are written to the bid log as rejected attempts.
pub fn place_bid(
    db: &Database,
    user_id: i64,
    auction_id: i64,
    player_id: i64,
    amount: i64,
) -> Result<BidReceipt> {
    let outcome = db.write(|tx| {
        let team_name =
            membership_team(tx, user_id, auction_id)?.ok_or(AuctionError::NoTeamSelected)?;

        let auction =
            db::find_auction(tx, auction_id)?.ok_or(AuctionError::AuctionNotFound(auction_id))?;
        if auction.status != AuctionStatus::Active {
            return Err(AuctionError::AuctionNotActive(auction_id));
        }

        let player = db::find_player(tx, player_id)?
            .filter(|p| p.auction_id == auction_id)
            .ok_or(AuctionError::PlayerNotFound(player_id))?;

        if let Some(err) = rejection(tx, &player, &team_name, amount)? {
            record_bid(
                tx,
                &player,
                &team_name,
                amount,
                BidStatus::Rejected,
                Some(err.reason()),
            )?;
            return Ok(Outcome::Rejected(err));
        }

        let bid = record_bid(tx, &player, &team_name, amount, BidStatus::Accepted, None)?;
        tx.execute(
            "UPDATE players SET current_bid = ?1, current_bidder = ?2 WHERE id = ?3",
            params![amount, team_name, player_id],
        )?;
        let player =
            db::find_player(tx, player_id)?.ok_or(AuctionError::PlayerNotFound(player_id))?;
        Ok(Outcome::Accepted(BidReceipt { bid, player }))
    })?;

    match outcome {
        Outcome::Accepted(receipt) => {
            info!(
                "Auction {}: '{}' bid {} on player {}",
                auction_id, receipt.bid.team, amount, player_id
            );
            Ok(receipt)
        }
        Outcome::Rejected(err) => {
            debug!(
                "Auction {}: bid of {} on player {} by user {} rejected: {}",
                auction_id, amount, player_id, user_id, err
            );
            Err(err)
        }
    }
}

/// Bids on a player, newest first. Rejected attempts are included only when
/// asked for.
pub fn bid_history(db: &Database, player_id: i64, include_rejected: bool) -> Result<Vec<Bid>> {
    db.read(|conn| {
        db::find_player(conn, player_id)?.ok_or(AuctionError::PlayerNotFound(player_id))?;
        let sql = if include_rejected {
            format!("SELECT {BID_COLUMNS} FROM bids WHERE player_id = ?1 ORDER BY id DESC")
        } else {
            format!(
                "SELECT {BID_COLUMNS} FROM bids WHERE player_id = ?1 AND status = 'accepted'
                 ORDER BY id DESC"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let bids = stmt
            .query_map(params![player_id], db::bid_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bids)
    })
}
