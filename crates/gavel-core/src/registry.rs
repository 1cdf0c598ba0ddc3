// Auction registry: creation, join codes, the active-player pointer and
// restart.

use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{self, Database, AUCTION_COLUMNS};
use crate::error::{is_unique_violation, AuctionError, Result};
use crate::models::{required, Auction, AuctionStatus, Role};

/// Characters used in generated join codes.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How many fresh codes to try before giving up on a uniqueness clash.
const MAX_CODE_ATTEMPTS: usize = 16;

/// Poll view of an auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionStatusView {
    pub status: AuctionStatus,
    pub current_player_id: Option<i64>,
}

/// Row counts touched by a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartSummary {
    pub teams_reset: usize,
    pub players_reset: usize,
    pub bids_cleared: usize,
}

/// Random uppercase alphanumeric join code of `len` characters.
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Load an auction and require that `requester_id` owns it.
pub(crate) fn owned_auction(
    conn: &Connection,
    auction_id: i64,
    requester_id: i64,
) -> Result<Auction> {
    let auction =
        db::find_auction(conn, auction_id)?.ok_or(AuctionError::AuctionNotFound(auction_id))?;
    if auction.admin_id != requester_id {
        warn!(
            "User {} attempted an admin action on auction {} owned by {}",
            requester_id, auction_id, auction.admin_id
        );
        return Err(AuctionError::Unauthorized);
    }
    Ok(auction)
}

/// Create an auction owned by `admin_id` with a fresh join code. Regenerates
/// the code when it collides with an existing one.
pub fn create_auction(
    db: &Database,
    admin_id: i64,
    name: &str,
    code_length: usize,
) -> Result<Auction> {
    let name = required("name", name)?;

    db.write(|tx| {
        let admin = db::find_user(tx, admin_id)?.ok_or(AuctionError::UserNotFound(admin_id))?;
        if admin.role != Role::Admin {
            return Err(AuctionError::Unauthorized);
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = generate_code(code_length);
            let inserted = tx.execute(
                "INSERT INTO auctions (admin_id, name, code, status) VALUES (?1, ?2, ?3, ?4)",
                params![admin_id, name, code, AuctionStatus::Active.as_str()],
            );
            match inserted {
                Ok(_) => {
                    let id = tx.last_insert_rowid();
                    info!("Auction '{}' created (id={}, code={})", name, id, code);
                    return db::find_auction(tx, id)?
                        .ok_or_else(|| AuctionError::Internal("auction vanished".into()));
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!("Join code {} already taken (attempt {})", code, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AuctionError::Internal(format!(
            "could not generate a unique join code after {MAX_CODE_ATTEMPTS} attempts"
        )))
    })
}

pub fn auction(db: &Database, auction_id: i64) -> Result<Auction> {
    db.read(|conn| db::find_auction(conn, auction_id))?
        .ok_or(AuctionError::AuctionNotFound(auction_id))
}

/// Look up an auction by join code, ignoring case. Only active auctions can
/// be joined.
pub fn join_auction(db: &Database, code: &str) -> Result<Auction> {
    let code = required("code", code)?.to_uppercase();
    let auction = db.read(|conn| {
        let auction = conn
            .query_row(
                &format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE code = ?1"),
                params![code],
                db::auction_from_row,
            )
            .optional()?;
        Ok(auction)
    })?;

    let auction = auction.ok_or_else(|| AuctionError::CodeNotFound(code.clone()))?;
    if auction.status != AuctionStatus::Active {
        return Err(AuctionError::AuctionNotActive(auction.id));
    }
    Ok(auction)
}

pub fn auction_status(db: &Database, auction_id: i64) -> Result<AuctionStatusView> {
    let auction = auction(db, auction_id)?;
    Ok(AuctionStatusView {
        status: auction.status,
        current_player_id: auction.current_player_id,
    })
}

/// Auctions owned by `admin_id`, oldest first.
pub fn list_auctions(db: &Database, admin_id: i64) -> Result<Vec<Auction>> {
    db.read(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions WHERE admin_id = ?1 ORDER BY id"
        ))?;
        let auctions = stmt
            .query_map(params![admin_id], db::auction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(auctions)
    })
}

/// Point the auction at `player_id` (or clear the pointer with `None`). The
/// previous active player, if any, is replaced.
pub fn set_active_player(
    db: &Database,
    auction_id: i64,
    player_id: Option<i64>,
    requester_id: i64,
) -> Result<Auction> {
    db.write(|tx| {
        owned_auction(tx, auction_id, requester_id)?;

        if let Some(pid) = player_id {
            let player = db::find_player(tx, pid)?
                .filter(|p| p.auction_id == auction_id)
                .ok_or(AuctionError::PlayerNotFound(pid))?;
            if player.sold {
                return Err(AuctionError::AlreadySold(pid));
            }
        }

        tx.execute(
            "UPDATE auctions SET current_player_id = ?1 WHERE id = ?2",
            params![player_id, auction_id],
        )?;
        match player_id {
            Some(pid) => info!("Auction {}: player {} is now open for bidding", auction_id, pid),
            None => info!("Auction {}: bidding stopped", auction_id),
        }

        db::find_auction(tx, auction_id)?.ok_or(AuctionError::AuctionNotFound(auction_id))
    })
}

/// Close or reopen an auction. Closing also clears the active player.
pub fn set_status(
    db: &Database,
    auction_id: i64,
    status: AuctionStatus,
    requester_id: i64,
) -> Result<Auction> {
    db.write(|tx| {
        owned_auction(tx, auction_id, requester_id)?;
        match status {
            AuctionStatus::Active => tx.execute(
                "UPDATE auctions SET status = ?1 WHERE id = ?2",
                params![status.as_str(), auction_id],
            )?,
            AuctionStatus::Closed => tx.execute(
                "UPDATE auctions SET status = ?1, current_player_id = NULL WHERE id = ?2",
                params![status.as_str(), auction_id],
            )?,
        };
        info!("Auction {} is now {}", auction_id, status.as_str());
        db::find_auction(tx, auction_id)?.ok_or(AuctionError::AuctionNotFound(auction_id))
    })
}

/// Reset all mutable bidding state of one auction in a single transaction:
/// team balances back to budget, players back to unsold at base price, bid
/// log emptied, active player cleared. Other auctions are not touched.
pub fn restart_auction(
    db: &Database,
    auction_id: i64,
    requester_id: i64,
) -> Result<RestartSummary> {
    db.write(|tx| {
        owned_auction(tx, auction_id, requester_id)?;

        tx.execute(
            "UPDATE auctions SET current_player_id = NULL WHERE id = ?1",
            params![auction_id],
        )?;
        let teams_reset = tx.execute(
            "UPDATE teams SET remaining_budget = budget WHERE auction_id = ?1",
            params![auction_id],
        )?;
        let players_reset = tx.execute(
            "UPDATE players
             SET current_bid = base_price,
                 current_bidder = NULL,
                 sold = 0,
                 sold_to = NULL,
                 sold_price = NULL
             WHERE auction_id = ?1",
            params![auction_id],
        )?;
        let bids_cleared =
            tx.execute("DELETE FROM bids WHERE auction_id = ?1", params![auction_id])?;

        info!(
            "Auction {} restarted: {} teams, {} players reset, {} bids cleared",
            auction_id, teams_reset, players_reset, bids_cleared
        );
        Ok(RestartSummary {
            teams_reset,
            players_reset,
            bids_cleared,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity;

    fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").expect("in-memory database should open");
        let admin = identity::register(&db, "boss", "pw", Role::Admin).unwrap();
        (db, admin.id)
    }

    fn add_player(db: &Database, auction_id: i64, name: &str) -> i64 {
        let conn = db.conn();
        conn.execute(
            "INSERT INTO players (auction_id, name, role, country, base_price, current_bid)
             VALUES (?1, ?2, 'Batsman', 'India', 100, 100)",
            params![auction_id, name],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn generated_codes_are_uppercase_alphanumeric() {
        let code = generate_code(6);
        assert_eq!(code.len(), 6);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn create_auction_starts_active_without_player() {
        let (db, admin) = setup();
        let auction = create_auction(&db, admin, "Premier Cup", 6).unwrap();
        assert_eq!(auction.admin_id, admin);
        assert_eq!(auction.status, AuctionStatus::Active);
        assert_eq!(auction.current_player_id, None);
        assert_eq!(auction.code.len(), 6);
    }

    #[test]
    fn create_auction_requires_admin_and_name() {
        let (db, admin) = setup();
        let bidder = identity::register(&db, "fan", "pw", Role::Bidder).unwrap();
        assert!(matches!(
            create_auction(&db, bidder.id, "Cup", 6),
            Err(AuctionError::Unauthorized)
        ));
        assert!(matches!(
            create_auction(&db, admin, "  ", 6),
            Err(AuctionError::MissingField("name"))
        ));
    }

    #[test]
    fn create_auction_survives_code_collisions() {
        let (db, admin) = setup();
        // With one-character codes collisions are certain after 36 auctions;
        // the first few must still succeed via regeneration.
        let mut codes = std::collections::HashSet::new();
        for i in 0..10 {
            let auction = create_auction(&db, admin, &format!("Cup {i}"), 1).unwrap();
            assert!(codes.insert(auction.code));
        }
    }

    #[test]
    fn join_is_case_insensitive() {
        let (db, admin) = setup();
        let auction = create_auction(&db, admin, "Cup", 6).unwrap();
        let joined = join_auction(&db, &auction.code.to_lowercase()).unwrap();
        assert_eq!(joined.id, auction.id);
    }

    #[test]
    fn join_unknown_code_is_not_found() {
        let (db, _) = setup();
        assert!(matches!(
            join_auction(&db, "ZZZZZZ"),
            Err(AuctionError::CodeNotFound(_))
        ));
    }

    #[test]
    fn join_closed_auction_is_invalid_state() {
        let (db, admin) = setup();
        let auction = create_auction(&db, admin, "Cup", 6).unwrap();
        set_status(&db, auction.id, AuctionStatus::Closed, admin).unwrap();
        assert!(matches!(
            join_auction(&db, &auction.code),
            Err(AuctionError::AuctionNotActive(_))
        ));
    }

    #[test]
    fn set_active_player_replaces_previous() {
        let (db, admin) = setup();
        let auction = create_auction(&db, admin, "Cup", 6).unwrap();
        let p1 = add_player(&db, auction.id, "One");
        let p2 = add_player(&db, auction.id, "Two");

        set_active_player(&db, auction.id, Some(p1), admin).unwrap();
        let updated = set_active_player(&db, auction.id, Some(p2), admin).unwrap();
        assert_eq!(updated.current_player_id, Some(p2));

        let cleared = set_active_player(&db, auction.id, None, admin).unwrap();
        assert_eq!(cleared.current_player_id, None);
    }

    #[test]
    fn set_active_player_checks_owner_and_scope() {
        let (db, admin) = setup();
        let other_admin = identity::register(&db, "rival", "pw", Role::Admin).unwrap();
        let a = create_auction(&db, admin, "A", 6).unwrap();
        let b = create_auction(&db, other_admin.id, "B", 6).unwrap();
        let foreign = add_player(&db, b.id, "Foreign");

        assert!(matches!(
            set_active_player(&db, a.id, None, other_admin.id),
            Err(AuctionError::Unauthorized)
        ));
        assert!(matches!(
            set_active_player(&db, a.id, Some(foreign), admin),
            Err(AuctionError::PlayerNotFound(_))
        ));
        assert!(matches!(
            set_active_player(&db, 999, None, admin),
            Err(AuctionError::AuctionNotFound(999))
        ));
    }

    #[test]
    fn closing_clears_pointer_and_reopen_keeps_it_clear() {
        let (db, admin) = setup();
        let auction = create_auction(&db, admin, "Cup", 6).unwrap();
        let p = add_player(&db, auction.id, "One");
        set_active_player(&db, auction.id, Some(p), admin).unwrap();

        let closed = set_status(&db, auction.id, AuctionStatus::Closed, admin).unwrap();
        assert_eq!(closed.current_player_id, None);
        let reopened = set_status(&db, auction.id, AuctionStatus::Active, admin).unwrap();
        assert_eq!(reopened.status, AuctionStatus::Active);
        assert_eq!(reopened.current_player_id, None);
    }

    #[test]
    fn list_auctions_only_returns_own() {
        let (db, admin) = setup();
        let other = identity::register(&db, "rival", "pw", Role::Admin).unwrap();
        create_auction(&db, admin, "Mine 1", 6).unwrap();
        create_auction(&db, other.id, "Theirs", 6).unwrap();
        create_auction(&db, admin, "Mine 2", 6).unwrap();

        let names: Vec<String> = list_auctions(&db, admin)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Mine 1", "Mine 2"]);
    }

    #[test]
    fn restart_requires_owner() {
        let (db, admin) = setup();
        let other = identity::register(&db, "rival", "pw", Role::Admin).unwrap();
        let auction = create_auction(&db, admin, "Cup", 6).unwrap();
        assert!(matches!(
            restart_auction(&db, auction.id, other.id),
            Err(AuctionError::Unauthorized)
        ));
    }
}
