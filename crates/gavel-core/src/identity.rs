// Users, password checks, signed credentials and per-auction team
// memberships.

use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::info;

use crate::db::{self, Database};
use crate::error::{is_unique_violation, AuctionError, Result};
use crate::models::{decode_column, required, Role, User};

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// bcrypt work factor for stored passwords.
const HASH_COST: u32 = 10;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Random alphanumeric string, used for generated secrets.
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// bcrypt hash of a password. The salt and cost live inside the returned
/// string.
fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, HASH_COST)
        .map_err(|e| AuctionError::Internal(format!("failed to hash password: {e}")))
}

fn verify_password(password: &str, stored: &str) -> Result<bool> {
    bcrypt::verify(password, stored)
        .map_err(|e| AuctionError::Internal(format!("stored password hash unreadable: {e}")))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Create a user. Fails with `UsernameTaken` when the name exists.
pub fn register(db: &Database, username: &str, password: &str, role: Role) -> Result<User> {
    let username = required("username", username)?;
    if password.is_empty() {
        return Err(AuctionError::MissingField("password"));
    }
    let digest = hash_password(password)?;

    db.write(|tx| {
        let inserted = tx.execute(
            "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
            params![username, digest, role.as_str()],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AuctionError::UsernameTaken(username.clone()))
            }
            Err(e) => return Err(e.into()),
        }
        let id = tx.last_insert_rowid();
        info!("Registered {} user '{}' (id={})", role.as_str(), username, id);
        Ok(User {
            id,
            username: username.clone(),
            role,
        })
    })
}

/// Verify a username/password pair.
pub fn login(db: &Database, username: &str, password: &str) -> Result<User> {
    let row = db.read(|conn| {
        let row = conn
            .query_row(
                "SELECT id, username, role, password_hash FROM users WHERE username = ?1",
                params![username],
                |row| {
                    let user = User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        role: decode_column(2, row.get(2)?, Role::parse)?,
                    };
                    let digest: String = row.get(3)?;
                    Ok((user, digest))
                },
            )
            .optional()?;
        Ok(row)
    })?;

    let (user, digest) = row.ok_or(AuctionError::InvalidCredentials)?;
    if !verify_password(password, &digest)? {
        return Err(AuctionError::InvalidCredentials);
    }
    Ok(user)
}

/// Create the `admin` account when no users exist yet. Returns `true` when
/// an account was created.
pub fn seed_default_admin(db: &Database, password: &str) -> Result<bool> {
    let count: i64 = db.read(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    })?;
    if count > 0 {
        return Ok(false);
    }
    register(db, "admin", password, Role::Admin)?;
    info!("Default admin user created (username: admin)");
    Ok(true)
}

pub fn user(db: &Database, user_id: i64) -> Result<User> {
    db.read(|conn| db::find_user(conn, user_id))?
        .ok_or(AuctionError::UserNotFound(user_id))
}

// ---------------------------------------------------------------------------
// Memberships
// ---------------------------------------------------------------------------

/// The team a user plays for in one auction, if they have picked one.
pub fn membership_team(conn: &Connection, user_id: i64, auction_id: i64) -> Result<Option<String>> {
    let team = conn
        .query_row(
            "SELECT team_name FROM memberships WHERE user_id = ?1 AND auction_id = ?2",
            params![user_id, auction_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(team)
}

/// Record that `user_id` bids for `team_name` in `auction_id`, replacing any
/// earlier choice in that auction. Other auctions are unaffected.
pub fn select_team(db: &Database, user_id: i64, auction_id: i64, team_name: &str) -> Result<()> {
    let team_name = required("team", team_name)?;
    db.write(|tx| {
        db::find_auction(tx, auction_id)?.ok_or(AuctionError::AuctionNotFound(auction_id))?;
        db::find_user(tx, user_id)?.ok_or(AuctionError::UserNotFound(user_id))?;
        db::find_team_by_name(tx, auction_id, &team_name)?
            .ok_or_else(|| AuctionError::TeamNotFound(team_name.clone()))?;
        tx.execute(
            "INSERT INTO memberships (user_id, auction_id, team_name) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, auction_id) DO UPDATE SET team_name = excluded.team_name",
            params![user_id, auction_id, team_name],
        )?;
        info!(
            "User {} selected team '{}' in auction {}",
            user_id, team_name, auction_id
        );
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Claims carried by a signed credential. Team affiliation is not a claim;
/// it is resolved from memberships on each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    /// Unix seconds.
    pub expires_at: i64,
}

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies HMAC-SHA256 signed credentials of the form
/// `<hex(json claims)>.<hex(mac)>`.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: chrono::Duration,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: chrono::Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String> {
        let claims = Claims {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            expires_at: (chrono::Utc::now() + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| AuctionError::Internal(format!("failed to encode claims: {e}")))?;
        let tag = self.mac(&payload)?.finalize().into_bytes();
        Ok(format!("{}.{}", hex(&payload), hex(&tag)))
    }

    /// Check the signature and expiry of `token` and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let (payload_hex, mac_hex) = token.split_once('.').ok_or(AuctionError::InvalidToken)?;
        let payload = unhex(payload_hex).ok_or(AuctionError::InvalidToken)?;
        let mac = unhex(mac_hex).ok_or(AuctionError::InvalidToken)?;

        self.mac(&payload)?
            .verify_slice(&mac)
            .map_err(|_| AuctionError::InvalidToken)?;

        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| AuctionError::InvalidToken)?;
        if claims.expires_at <= chrono::Utc::now().timestamp() {
            return Err(AuctionError::InvalidToken);
        }
        Ok(claims)
    }

    fn mac(&self, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuctionError::Internal(format!("invalid signing key: {e}")))?;
        mac.update(payload);
        Ok(mac)
    }
}
