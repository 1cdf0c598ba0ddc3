// Request dispatch: turns protocol requests into AuctionService calls.

use gavel_core::models::AuctionStatus;
use gavel_core::{AuctionError, AuctionService, ImportSource};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::protocol::{self, Op, Request, Response};

/// Shared application state handed to every connection task.
pub struct App {
    service: AuctionService,
}

impl App {
    pub fn new(service: AuctionService) -> Self {
        Self { service }
    }

    /// Handle one raw text frame and return the encoded response frame.
    pub fn handle_text(&self, text: &str) -> String {
        let response = match protocol::parse_request(text) {
            Ok(request) => self.handle(request),
            Err(e) => {
                debug!("Rejected frame: {}", e.message);
                Response::from_frame_error(e)
            }
        };
        encode(&response)
    }

    /// Authenticate and execute one request.
    pub fn handle(&self, request: Request) -> Response {
        let Request { id, token, op } = request;
        match self.dispatch(token.as_deref(), op) {
            Ok(data) => Response::success(id, data),
            Err(e) => {
                match e.kind() {
                    gavel_core::ErrorKind::Internal => error!("Request {} failed: {}", id, e),
                    gavel_core::ErrorKind::Unauthorized => warn!("Request {} refused: {}", id, e),
                    _ => debug!("Request {} rejected: {}", id, e),
                }
                Response::from_error(id, &e)
            }
        }
    }

    /// Operations that need no credential.
    fn dispatch_public(&self, op: Op) -> Result<Value, AuctionError> {
        match op {
            Op::Register {
                username,
                password,
                role,
            } => to_data(self.service.register(&username, &password, role)?),
            Op::Login { username, password } => {
                to_data(self.service.login(&username, &password)?)
            }
            _ => Err(AuctionError::Internal("not a public operation".into())),
        }
    }

    fn dispatch(&self, token: Option<&str>, op: Op) -> Result<Value, AuctionError> {
        if op.is_public() {
            return self.dispatch_public(op);
        }

        let svc = &self.service;
        let claims = svc.authenticate(token)?;
        match op {
            Op::Register { .. } | Op::Login { .. } => self.dispatch_public(op),

            // --- Accounts ---
            Op::SelectTeam { auction_id, team } => {
                to_data(svc.select_team(&claims, auction_id, &team)?)
            }
            Op::MyTeam { auction_id } => to_data(svc.membership(&claims, auction_id)?),

            // --- Auctions ---
            Op::CreateAuction { name } => to_data(svc.create_auction(&claims, &name)?),
            Op::ListAuctions => to_data(svc.list_auctions(&claims)?),
            Op::JoinAuction { code } => to_data(svc.join_auction(&claims, &code)?),
            Op::AuctionStatus { auction_id } => to_data(svc.auction_status(&claims, auction_id)?),
            Op::SetActivePlayer {
                auction_id,
                player_id,
            } => to_data(svc.set_active_player(&claims, auction_id, player_id)?),
            Op::CloseAuction { auction_id } => to_data(svc.set_auction_status(
                &claims,
                auction_id,
                AuctionStatus::Closed,
            )?),
            Op::ReopenAuction { auction_id } => to_data(svc.set_auction_status(
                &claims,
                auction_id,
                AuctionStatus::Active,
            )?),
            Op::RestartAuction { auction_id } => {
                to_data(svc.restart_auction(&claims, auction_id)?)
            }

            // --- Teams ---
            Op::ListTeams { auction_id } => to_data(svc.list_teams(&claims, auction_id)?),
            Op::AddTeam {
                auction_id,
                name,
                budget,
            } => to_data(svc.add_team(&claims, auction_id, &name, budget)?),
            Op::UpdateTeam {
                team_id,
                name,
                budget,
            } => to_data(svc.update_team(&claims, team_id, name.as_deref(), budget)?),
            Op::DeleteTeam { team_id } => {
                svc.delete_team(&claims, team_id)?;
                Ok(json!({ "deleted": team_id }))
            }

            // --- Players ---
            Op::ListPlayers { auction_id } => to_data(svc.list_players(&claims, auction_id)?),
            Op::GetPlayer { player_id } => to_data(svc.player(&claims, player_id)?),
            Op::AddPlayer { auction_id, player } => {
                to_data(svc.add_player(&claims, auction_id, &player)?)
            }
            Op::UpdatePlayer { player_id, changes } => {
                to_data(svc.update_player(&claims, player_id, &changes)?)
            }
            Op::DeletePlayer { player_id } => {
                svc.delete_player(&claims, player_id)?;
                Ok(json!({ "deleted": player_id }))
            }
            Op::ImportPlayers {
                auction_id,
                players,
                library_ids,
            } => {
                let source = match (players, library_ids) {
                    (Some(players), None) => ImportSource::Inline(players),
                    (None, Some(ids)) => ImportSource::Library(ids),
                    _ => {
                        return Err(AuctionError::InvalidValue {
                            field: "players",
                            message: "give exactly one of `players` or `libraryIds`".into(),
                        })
                    }
                };
                let imported = svc.bulk_import(&claims, auction_id, &source)?;
                Ok(json!({ "imported": imported }))
            }

            // --- Bidding ---
            Op::PlaceBid {
                auction_id,
                player_id,
                amount,
            } => to_data(svc.place_bid(&claims, auction_id, player_id, amount)?),
            Op::BidHistory {
                player_id,
                include_rejected,
            } => to_data(svc.bid_history(&claims, player_id, include_rejected)?),
            Op::SellPlayer {
                auction_id,
                player_id,
            } => to_data(svc.sell_player(&claims, auction_id, player_id)?),

            // --- Library ---
            Op::ListLibrary => to_data(svc.library(&claims)?),
            Op::AddLibraryPlayer { player } => to_data(svc.add_library_player(&claims, &player)?),
            Op::DeleteLibraryPlayer { library_id } => {
                svc.delete_library_player(&claims, library_id)?;
                Ok(json!({ "deleted": library_id }))
            }
        }
    }
}

fn to_data<T: Serialize>(value: T) -> Result<Value, AuctionError> {
    serde_json::to_value(value)
        .map_err(|e| AuctionError::Internal(format!("failed to encode response: {e}")))
}

pub(crate) fn encode(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!("Failed to encode response: {}", e);
        r#"{"id":null,"ok":false,"error":{"code":"internal","message":"internal error"}}"#
            .to_string()
    })
}
