// AuctionService: the single entry point the transport layer talks to.
//
// Every call takes the verified claims of the caller. Admin operations
// require the admin role from the claims and, where an auction is involved,
// ownership of that auction as recorded in the store.

use serde::{Deserialize, Serialize};

use crate::bidding::{self, BidReceipt};
use crate::catalog::{self, PlayerDefaults};
use crate::db::Database;
use crate::error::{AuctionError, Result};
use crate::identity::{self, Claims, TokenSigner};
use crate::library;
use crate::ledger;
use crate::models::{
    Auction, AuctionStatus, Bid, LibraryPlayer, NewLibraryPlayer, NewPlayer, Player, PlayerUpdate,
    Role, Team, TeamWithRoster, User,
};
use crate::registry::{self, AuctionStatusView, RestartSummary};
use crate::settlement::{self, SettlementReceipt};

/// Tunables the service applies to new records.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub code_length: usize,
    pub player_defaults: PlayerDefaults,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            code_length: 6,
            player_defaults: PlayerDefaults::default(),
        }
    }
}

/// A signed-in user and the credential to present on later calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Where a bulk import takes its players from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportSource {
    Inline(Vec<NewPlayer>),
    Library(Vec<i64>),
}

/// The membership of the caller in one auction, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub auction_id: i64,
    pub team: Option<String>,
}

pub struct AuctionService {
    db: Database,
    signer: TokenSigner,
    settings: ServiceSettings,
}

impl AuctionService {
    pub fn new(db: Database, signer: TokenSigner, settings: ServiceSettings) -> Self {
        Self {
            db,
            signer,
            settings,
        }
    }

    /// Verify a presented credential. A missing token is `Unauthorized`; a
    /// forged or expired one is `InvalidToken`.
    pub fn authenticate(&self, token: Option<&str>) -> Result<Claims> {
        let token = token.ok_or(AuctionError::Unauthorized)?;
        self.signer.verify(token)
    }

    fn require_admin(claims: &Claims) -> Result<()> {
        if claims.role != Role::Admin {
            return Err(AuctionError::Unauthorized);
        }
        Ok(())
    }

    fn session(&self, user: User) -> Result<Session> {
        let token = self.signer.issue(&user)?;
        Ok(Session { token, user })
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    pub fn register(&self, username: &str, password: &str, role: Option<Role>) -> Result<Session> {
        let user = identity::register(&self.db, username, password, role.unwrap_or(Role::Bidder))?;
        self.session(user)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Session> {
        let user = identity::login(&self.db, username, password)?;
        self.session(user)
    }

    pub fn select_team(&self, claims: &Claims, auction_id: i64, team: &str) -> Result<Membership> {
        identity::select_team(&self.db, claims.user_id, auction_id, team)?;
        self.membership(claims, auction_id)
    }

    pub fn membership(&self, claims: &Claims, auction_id: i64) -> Result<Membership> {
        let team = self
            .db
            .read(|conn| identity::membership_team(conn, claims.user_id, auction_id))?;
        Ok(Membership { auction_id, team })
    }

    // -----------------------------------------------------------------------
    // Auctions
    // -----------------------------------------------------------------------

    pub fn create_auction(&self, claims: &Claims, name: &str) -> Result<Auction> {
        Self::require_admin(claims)?;
        registry::create_auction(&self.db, claims.user_id, name, self.settings.code_length)
    }

    pub fn list_auctions(&self, claims: &Claims) -> Result<Vec<Auction>> {
        Self::require_admin(claims)?;
        registry::list_auctions(&self.db, claims.user_id)
    }

    pub fn join_auction(&self, _claims: &Claims, code: &str) -> Result<Auction> {
        registry::join_auction(&self.db, code)
    }

    pub fn auction_status(&self, _claims: &Claims, auction_id: i64) -> Result<AuctionStatusView> {
        registry::auction_status(&self.db, auction_id)
    }

    pub fn set_active_player(
        &self,
        claims: &Claims,
        auction_id: i64,
        player_id: Option<i64>,
    ) -> Result<Auction> {
        Self::require_admin(claims)?;
        registry::set_active_player(&self.db, auction_id, player_id, claims.user_id)
    }

    pub fn set_auction_status(
        &self,
        claims: &Claims,
        auction_id: i64,
        status: AuctionStatus,
    ) -> Result<Auction> {
        Self::require_admin(claims)?;
        registry::set_status(&self.db, auction_id, status, claims.user_id)
    }

    pub fn restart_auction(&self, claims: &Claims, auction_id: i64) -> Result<RestartSummary> {
        Self::require_admin(claims)?;
        registry::restart_auction(&self.db, auction_id, claims.user_id)
    }

    // -----------------------------------------------------------------------
    // Teams
    // -----------------------------------------------------------------------

    pub fn list_teams(
        &self,
        _claims: &Claims,
        auction_id: Option<i64>,
    ) -> Result<Vec<TeamWithRoster>> {
        ledger::list_teams(&self.db, auction_id)
    }

    pub fn add_team(
        &self,
        claims: &Claims,
        auction_id: i64,
        name: &str,
        budget: i64,
    ) -> Result<Team> {
        Self::require_admin(claims)?;
        ledger::add_team(&self.db, auction_id, name, budget, claims.user_id)
    }

    pub fn update_team(
        &self,
        claims: &Claims,
        team_id: i64,
        name: Option<&str>,
        budget: Option<i64>,
    ) -> Result<Team> {
        Self::require_admin(claims)?;
        ledger::update_team(&self.db, team_id, name, budget, claims.user_id)
    }

    pub fn delete_team(&self, claims: &Claims, team_id: i64) -> Result<()> {
        Self::require_admin(claims)?;
        ledger::delete_team(&self.db, team_id, claims.user_id)
    }

    // -----------------------------------------------------------------------
    // Players
    // -----------------------------------------------------------------------

    pub fn list_players(&self, _claims: &Claims, auction_id: Option<i64>) -> Result<Vec<Player>> {
        catalog::list_players(&self.db, auction_id)
    }

    pub fn player(&self, _claims: &Claims, player_id: i64) -> Result<Player> {
        catalog::player(&self.db, player_id)
    }

    pub fn add_player(&self, claims: &Claims, auction_id: i64, new: &NewPlayer) -> Result<Player> {
        Self::require_admin(claims)?;
        catalog::add_player(
            &self.db,
            auction_id,
            new,
            &self.settings.player_defaults,
            claims.user_id,
        )
    }

    pub fn update_player(
        &self,
        claims: &Claims,
        player_id: i64,
        update: &PlayerUpdate,
    ) -> Result<Player> {
        Self::require_admin(claims)?;
        catalog::update_player(&self.db, player_id, update, claims.user_id)
    }

    pub fn delete_player(&self, claims: &Claims, player_id: i64) -> Result<()> {
        Self::require_admin(claims)?;
        catalog::delete_player(&self.db, player_id, claims.user_id)
    }

    pub fn bulk_import(
        &self,
        claims: &Claims,
        auction_id: i64,
        source: &ImportSource,
    ) -> Result<usize> {
        Self::require_admin(claims)?;
        let defaults = &self.settings.player_defaults;
        match source {
            ImportSource::Inline(players) => {
                catalog::bulk_import(&self.db, auction_id, players, defaults, claims.user_id)
            }
            ImportSource::Library(ids) => {
                library::import_from_library(&self.db, auction_id, ids, defaults, claims.user_id)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Bidding and settlement
    // -----------------------------------------------------------------------

    pub fn place_bid(
        &self,
        claims: &Claims,
        auction_id: i64,
        player_id: i64,
        amount: i64,
    ) -> Result<BidReceipt> {
        bidding::place_bid(&self.db, claims.user_id, auction_id, player_id, amount)
    }

    pub fn bid_history(
        &self,
        _claims: &Claims,
        player_id: i64,
        include_rejected: bool,
    ) -> Result<Vec<Bid>> {
        bidding::bid_history(&self.db, player_id, include_rejected)
    }

    pub fn sell_player(
        &self,
        claims: &Claims,
        auction_id: i64,
        player_id: i64,
    ) -> Result<SettlementReceipt> {
        Self::require_admin(claims)?;
        settlement::sell_player(&self.db, auction_id, player_id, claims.user_id)
    }

    // -----------------------------------------------------------------------
    // Library
    // -----------------------------------------------------------------------

    pub fn library(&self, _claims: &Claims) -> Result<Vec<LibraryPlayer>> {
        library::list_library(&self.db)
    }

    pub fn add_library_player(
        &self,
        claims: &Claims,
        new: &NewLibraryPlayer,
    ) -> Result<LibraryPlayer> {
        Self::require_admin(claims)?;
        library::add_library_player(&self.db, new)
    }

    pub fn delete_library_player(&self, claims: &Claims, id: i64) -> Result<()> {
        Self::require_admin(claims)?;
        library::delete_library_player(&self.db, id)
    }
}
