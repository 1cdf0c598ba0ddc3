// Settlement: closing the sale of a player to the team holding the lead.

use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{self, Database};
use crate::error::{AuctionError, Result};
use crate::models::{Player, RosterEntry};
use crate::registry::owned_auction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub player: Player,
    pub team_name: String,
    pub price: i64,
    pub remaining_before: i64,
    pub remaining_after: i64,
    pub roster_entry: RosterEntry,
}

/// Sell a player to its current highest bidder at the current bid.
///
/// The winning team and its balance are read again inside the sale
/// transaction; a team that was removed or can no longer cover the price
/// fails the sale with nothing changed. On success the player is frozen as
/// sold, the team is debited and the auction's active player is cleared.
pub fn sell_player(
    db: &Database,
    auction_id: i64,
    player_id: i64,
    requester_id: i64,
) -> Result<SettlementReceipt> {
    db.write(|tx| {
        owned_auction(tx, auction_id, requester_id)?;

        let player = db::find_player(tx, player_id)?
            .filter(|p| p.auction_id == auction_id)
            .ok_or(AuctionError::PlayerNotFound(player_id))?;
        if player.sold {
            return Err(AuctionError::AlreadySold(player_id));
        }
        let team_name = player
            .current_bidder
            .clone()
            .ok_or(AuctionError::NoBids(player_id))?;
        let price = player.current_bid;

        let team = db::find_team_by_name(tx, auction_id, &team_name)?
            .ok_or_else(|| AuctionError::TeamNotFound(team_name.clone()))?;
        if team.remaining_budget < price {
            warn!(
                "Sale of player {} blocked: '{}' has {} left, needs {}",
                player_id, team_name, team.remaining_budget, price
            );
            return Err(AuctionError::InsufficientBudget {
                amount: price,
                remaining: team.remaining_budget,
            });
        }

        tx.execute(
            "UPDATE players SET sold = 1, sold_to = ?1, sold_price = ?2 WHERE id = ?3",
            params![team_name, price, player_id],
        )?;
        tx.execute(
            "UPDATE teams SET remaining_budget = remaining_budget - ?1 WHERE id = ?2",
            params![price, team.id],
        )?;
        tx.execute(
            "UPDATE auctions SET current_player_id = NULL WHERE id = ?1",
            params![auction_id],
        )?;

        let player =
            db::find_player(tx, player_id)?.ok_or(AuctionError::PlayerNotFound(player_id))?;
        let roster_entry = player.roster_entry().ok_or_else(|| {
            AuctionError::Internal(format!("player {player_id} has no sale price"))
        })?;
        let remaining_after = team.remaining_budget - price;

        info!(
            "Auction {}: player '{}' sold to '{}' for {} (remaining {} -> {})",
            auction_id, player.name, team_name, price, team.remaining_budget, remaining_after
        );

        Ok(SettlementReceipt {
            player,
            team_name,
            price,
            remaining_before: team.remaining_budget,
            remaining_after,
            roster_entry,
        })
    })
}
