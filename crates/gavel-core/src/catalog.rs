// Player catalog: the players of each auction and their catalog fields.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{self, Database, PLAYER_COLUMNS};
use crate::error::{AuctionError, Result};
use crate::models::{positive, required, NewPlayer, Player, PlayerUpdate};
use crate::registry::owned_auction;

/// Values applied when a new player omits optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDefaults {
    pub base_price: i64,
    pub country: String,
}

impl Default for PlayerDefaults {
    fn default() -> Self {
        Self {
            base_price: 100_000,
            country: "India".to_string(),
        }
    }
}

/// Empty strings clear an optional text field.
fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A fully resolved player row, validated before anything is written.
struct PlayerRow {
    name: String,
    role: &'static str,
    country: String,
    base_price: i64,
    image_url: Option<String>,
}

fn resolve(new: &NewPlayer, defaults: &PlayerDefaults) -> Result<PlayerRow> {
    Ok(PlayerRow {
        name: required("name", &new.name)?,
        role: new.role.unwrap_or_default().as_str(),
        country: non_empty(new.country.as_deref()).unwrap_or_else(|| defaults.country.clone()),
        base_price: positive("basePrice", new.base_price.unwrap_or(defaults.base_price))?,
        image_url: non_empty(new.image_url.as_deref()),
    })
}

fn insert(conn: &Connection, auction_id: i64, row: &PlayerRow) -> Result<i64> {
    conn.execute(
        "INSERT INTO players (auction_id, name, role, country, base_price, image_url, current_bid)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?5)",
        params![
            auction_id,
            row.name,
            row.role,
            row.country,
            row.base_price,
            row.image_url
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert many players into an auction the requester owns. Every entry is
/// validated before the first insert; either all rows land or none do.
pub(crate) fn insert_many(
    conn: &Connection,
    auction_id: i64,
    players: &[NewPlayer],
    defaults: &PlayerDefaults,
) -> Result<usize> {
    let rows = players
        .iter()
        .map(|p| resolve(p, defaults))
        .collect::<Result<Vec<_>>>()?;
    for row in &rows {
        insert(conn, auction_id, row)?;
    }
    Ok(rows.len())
}

fn player_in_owned_auction(
    conn: &Connection,
    player_id: i64,
    requester_id: i64,
) -> Result<Player> {
    let player =
        db::find_player(conn, player_id)?.ok_or(AuctionError::PlayerNotFound(player_id))?;
    owned_auction(conn, player.auction_id, requester_id)?;
    Ok(player)
}

pub fn add_player(
    db: &Database,
    auction_id: i64,
    new: &NewPlayer,
    defaults: &PlayerDefaults,
    requester_id: i64,
) -> Result<Player> {
    let row = resolve(new, defaults)?;
    db.write(|tx| {
        owned_auction(tx, auction_id, requester_id)?;
        let id = insert(tx, auction_id, &row)?;
        info!(
            "Auction {}: player '{}' added at base price {}",
            auction_id, row.name, row.base_price
        );
        db::find_player(tx, id)?.ok_or(AuctionError::PlayerNotFound(id))
    })
}

/// Add a batch of players in one transaction. Returns the number inserted.
pub fn bulk_import(
    db: &Database,
    auction_id: i64,
    players: &[NewPlayer],
    defaults: &PlayerDefaults,
    requester_id: i64,
) -> Result<usize> {
    db.write(|tx| {
        owned_auction(tx, auction_id, requester_id)?;
        let count = insert_many(tx, auction_id, players, defaults)?;
        info!("Auction {}: imported {} players", auction_id, count);
        Ok(count)
    })
}

/// Edit an unsold player's catalog fields. When the base price changes and
/// nobody has bid yet, the opening bid follows the new base price.
pub fn update_player(
    db: &Database,
    player_id: i64,
    update: &PlayerUpdate,
    requester_id: i64,
) -> Result<Player> {
    let name = update.name.as_deref().map(|n| required("name", n)).transpose()?;
    let base_price = update
        .base_price
        .map(|p| positive("basePrice", p))
        .transpose()?;

    db.write(|tx| {
        let player = player_in_owned_auction(tx, player_id, requester_id)?;
        if player.sold {
            return Err(AuctionError::PlayerSold(player_id));
        }

        let base_price = base_price.unwrap_or(player.base_price);
        let current_bid = if player.current_bidder.is_none() {
            base_price
        } else {
            player.current_bid
        };
        let image_url = match update.image_url.as_deref() {
            Some(url) => non_empty(Some(url)),
            None => player.image_url.clone(),
        };

        tx.execute(
            "UPDATE players
             SET name = ?1, role = ?2, country = ?3, base_price = ?4,
                 image_url = ?5, current_bid = ?6
             WHERE id = ?7",
            params![
                name.as_deref().unwrap_or(&player.name),
                update.role.unwrap_or(player.role).as_str(),
                non_empty(update.country.as_deref()).unwrap_or_else(|| player.country.clone()),
                base_price,
                image_url,
                current_bid,
                player_id
            ],
        )?;
        db::find_player(tx, player_id)?.ok_or(AuctionError::PlayerNotFound(player_id))
    })
}

/// Remove an unsold player.
pub fn delete_player(db: &Database, player_id: i64, requester_id: i64) -> Result<()> {
    db.write(|tx| {
        let player = player_in_owned_auction(tx, player_id, requester_id)?;
        if player.sold {
            return Err(AuctionError::PlayerSold(player_id));
        }
        tx.execute("DELETE FROM players WHERE id = ?1", params![player_id])?;
        info!("Player '{}' removed from auction {}", player.name, player.auction_id);
        Ok(())
    })
}

pub fn player(db: &Database, player_id: i64) -> Result<Player> {
    db.read(|conn| db::find_player(conn, player_id))?
        .ok_or(AuctionError::PlayerNotFound(player_id))
}

/// Players ordered by id, optionally limited to one auction.
pub fn list_players(db: &Database, auction_id: Option<i64>) -> Result<Vec<Player>> {
    db.read(|conn| {
        let players = match auction_id {
            Some(id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PLAYER_COLUMNS} FROM players WHERE auction_id = ?1 ORDER BY id"
                ))?;
                let rows = stmt.query_map(params![id], db::player_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("SELECT {PLAYER_COLUMNS} FROM players ORDER BY id"))?;
                let rows = stmt.query_map([], db::player_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(players)
    })
}
