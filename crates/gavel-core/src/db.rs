// SQLite persistence layer for auctions, teams, players, bids and users.

use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::error::Result;
use crate::models::{
    decode_column, Auction, AuctionStatus, Bid, BidStatus, LibraryPlayer, Player, PlayerRole,
    Team, User,
};

/// SQLite-backed store for every auction record.
///
/// All access goes through a single connection guarded by a mutex. State
/// changes run inside [`Database::write`], which holds that mutex for the
/// whole `BEGIN IMMEDIATE` transaction, so read-compare-write sequences on a
/// player's bid or a team's balance never interleave within this process and
/// take SQLite's reserved lock against other processes.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                username      TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role          TEXT NOT NULL,
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS auctions (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                admin_id          INTEGER NOT NULL REFERENCES users(id),
                name              TEXT NOT NULL,
                code              TEXT UNIQUE NOT NULL,
                status            TEXT NOT NULL DEFAULT 'active',
                current_player_id INTEGER REFERENCES players(id) ON DELETE SET NULL,
                created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS teams (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                auction_id       INTEGER NOT NULL REFERENCES auctions(id) ON DELETE CASCADE,
                name             TEXT NOT NULL,
                budget           INTEGER NOT NULL,
                remaining_budget INTEGER NOT NULL CHECK (remaining_budget >= 0),
                created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(auction_id, name)
            );

            CREATE TABLE IF NOT EXISTS players (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                auction_id     INTEGER NOT NULL REFERENCES auctions(id) ON DELETE CASCADE,
                name           TEXT NOT NULL,
                role           TEXT NOT NULL,
                country        TEXT NOT NULL,
                base_price     INTEGER NOT NULL,
                image_url      TEXT,
                current_bid    INTEGER NOT NULL,
                current_bidder TEXT,
                sold           INTEGER NOT NULL DEFAULT 0,
                sold_to        TEXT,
                sold_price     INTEGER,
                created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS bids (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                auction_id INTEGER NOT NULL REFERENCES auctions(id) ON DELETE CASCADE,
                player_id  INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
                team       TEXT NOT NULL,
                amount     INTEGER NOT NULL,
                status     TEXT NOT NULL,
                reason     TEXT,
                timestamp  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS memberships (
                user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                auction_id INTEGER NOT NULL REFERENCES auctions(id) ON DELETE CASCADE,
                team_name  TEXT NOT NULL,
                PRIMARY KEY (user_id, auction_id)
            );

            CREATE TABLE IF NOT EXISTS library_players (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL,
                role       TEXT NOT NULL,
                base_price INTEGER NOT NULL,
                country    TEXT NOT NULL,
                image_url  TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_teams_auction ON teams(auction_id);
            CREATE INDEX IF NOT EXISTS idx_players_auction ON players(auction_id);
            CREATE INDEX IF NOT EXISTS idx_bids_player ON bids(player_id);
            CREATE INDEX IF NOT EXISTS idx_bids_auction ON bids(auction_id);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run `f` inside an immediate transaction. The transaction commits only
    /// when `f` returns `Ok`; any error drops it, rolling back every write
    /// `f` made.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run a read-only closure against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn();
        f(&conn)
    }
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

pub(crate) const AUCTION_COLUMNS: &str =
    "id, admin_id, name, code, status, current_player_id, created_at";

pub(crate) const TEAM_COLUMNS: &str = "id, auction_id, name, budget, remaining_budget";

pub(crate) const PLAYER_COLUMNS: &str = "id, auction_id, name, role, country, base_price, \
     image_url, current_bid, current_bidder, sold, sold_to, sold_price";

pub(crate) const BID_COLUMNS: &str =
    "id, auction_id, player_id, team, amount, status, reason, timestamp";

pub(crate) const LIBRARY_COLUMNS: &str = "id, name, role, base_price, country, image_url";

pub(crate) fn auction_from_row(row: &Row<'_>) -> rusqlite::Result<Auction> {
    Ok(Auction {
        id: row.get(0)?,
        admin_id: row.get(1)?,
        name: row.get(2)?,
        code: row.get(3)?,
        status: decode_column(4, row.get(4)?, AuctionStatus::parse)?,
        current_player_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub(crate) fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        auction_id: row.get(1)?,
        name: row.get(2)?,
        budget: row.get(3)?,
        remaining_budget: row.get(4)?,
    })
}

pub(crate) fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        auction_id: row.get(1)?,
        name: row.get(2)?,
        role: decode_column(3, row.get(3)?, PlayerRole::parse)?,
        country: row.get(4)?,
        base_price: row.get(5)?,
        image_url: row.get(6)?,
        current_bid: row.get(7)?,
        current_bidder: row.get(8)?,
        sold: row.get(9)?,
        sold_to: row.get(10)?,
        sold_price: row.get(11)?,
    })
}

pub(crate) fn bid_from_row(row: &Row<'_>) -> rusqlite::Result<Bid> {
    Ok(Bid {
        id: row.get(0)?,
        auction_id: row.get(1)?,
        player_id: row.get(2)?,
        team: row.get(3)?,
        amount: row.get(4)?,
        status: decode_column(5, row.get(5)?, BidStatus::parse)?,
        reason: row.get(6)?,
        timestamp: row.get(7)?,
    })
}

pub(crate) fn library_player_from_row(row: &Row<'_>) -> rusqlite::Result<LibraryPlayer> {
    Ok(LibraryPlayer {
        id: row.get(0)?,
        name: row.get(1)?,
        role: decode_column(2, row.get(2)?, PlayerRole::parse)?,
        base_price: row.get(3)?,
        country: row.get(4)?,
        image_url: row.get(5)?,
    })
}

// ---------------------------------------------------------------------------
// Shared lookups
// ---------------------------------------------------------------------------

pub(crate) fn find_auction(conn: &Connection, auction_id: i64) -> Result<Option<Auction>> {
    let auction = conn
        .query_row(
            &format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = ?1"),
            params![auction_id],
            auction_from_row,
        )
        .optional()?;
    Ok(auction)
}

pub(crate) fn find_player(conn: &Connection, player_id: i64) -> Result<Option<Player>> {
    let player = conn
        .query_row(
            &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1"),
            params![player_id],
            player_from_row,
        )
        .optional()?;
    Ok(player)
}

pub(crate) fn find_team(conn: &Connection, team_id: i64) -> Result<Option<Team>> {
    let team = conn
        .query_row(
            &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1"),
            params![team_id],
            team_from_row,
        )
        .optional()?;
    Ok(team)
}

/// Look up a team by name within one auction.
pub(crate) fn find_team_by_name(
    conn: &Connection,
    auction_id: i64,
    name: &str,
) -> Result<Option<Team>> {
    let team = conn
        .query_row(
            &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE auction_id = ?1 AND name = ?2"),
            params![auction_id, name],
            team_from_row,
        )
        .optional()?;
    Ok(team)
}

pub(crate) fn find_user(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, role FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    role: decode_column(2, row.get(2)?, crate::models::Role::parse)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuctionError;

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn seed_admin(conn: &Connection) -> i64 {
        conn.execute(
            "INSERT INTO users (username, password_hash, role) VALUES ('root', 'x', 'admin')",
            [],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "auctions",
            "bids",
            "library_players",
            "memberships",
            "players",
            "teams",
            "users",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn write_commits_on_ok() {
        let db = test_db();
        let admin = db.write(|tx| Ok(seed_admin(tx))).unwrap();

        let user = db.read(|conn| find_user(conn, admin)).unwrap().unwrap();
        assert_eq!(user.username, "root");
    }

    #[test]
    fn write_rolls_back_on_err() {
        let db = test_db();
        let result: Result<()> = db.write(|tx| {
            seed_admin(tx);
            Err(AuctionError::Unauthorized)
        });
        assert!(matches!(result, Err(AuctionError::Unauthorized)));

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn team_names_unique_per_auction() {
        let db = test_db();
        let conn = db.conn();
        let admin = seed_admin(&conn);
        for code in ["AAAAAA", "BBBBBB"] {
            conn.execute(
                "INSERT INTO auctions (admin_id, name, code) VALUES (?1, 'Cup', ?2)",
                params![admin, code],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO teams (auction_id, name, budget, remaining_budget)
             VALUES (1, 'Kings', 10, 10)",
            [],
        )
        .unwrap();
        // Same name in another auction is fine.
        conn.execute(
            "INSERT INTO teams (auction_id, name, budget, remaining_budget)
             VALUES (2, 'Kings', 10, 10)",
            [],
        )
        .unwrap();

        let dup = conn
            .execute(
                "INSERT INTO teams (auction_id, name, budget, remaining_budget)
                 VALUES (1, 'Kings', 10, 10)",
                [],
            )
            .unwrap_err();
        assert!(crate::error::is_unique_violation(&dup));
    }

    #[test]
    fn negative_remaining_budget_rejected_by_schema() {
        let db = test_db();
        let conn = db.conn();
        let admin = seed_admin(&conn);
        conn.execute(
            "INSERT INTO auctions (admin_id, name, code) VALUES (?1, 'Cup', 'CCCCCC')",
            params![admin],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO teams (auction_id, name, budget, remaining_budget)
             VALUES (1, 'Kings', 10, -1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn foreign_keys_enforced() {
        let db = test_db();
        let conn = db.conn();
        let result = conn.execute(
            "INSERT INTO teams (auction_id, name, budget, remaining_budget)
             VALUES (99, 'Ghosts', 10, 10)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }
}
