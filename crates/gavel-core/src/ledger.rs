// Team ledger: per-auction teams, their budgets and rosters.

use rusqlite::{params, Connection};
use tracing::info;

use crate::db::{self, Database, PLAYER_COLUMNS, TEAM_COLUMNS};
use crate::error::{is_unique_violation, AuctionError, Result};
use crate::models::{positive, required, RosterEntry, Team, TeamWithRoster};
use crate::registry::owned_auction;

/// Players bought by `team_name` within `auction_id`, in purchase order.
pub(crate) fn roster(
    conn: &Connection,
    auction_id: i64,
    team_name: &str,
) -> Result<Vec<RosterEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLAYER_COLUMNS} FROM players
         WHERE auction_id = ?1 AND sold = 1 AND sold_to = ?2
         ORDER BY id"
    ))?;
    let players = stmt
        .query_map(params![auction_id, team_name], db::player_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(players.iter().filter_map(|p| p.roster_entry()).collect())
}

/// True when the team appears on a sold player or holds a live lead.
fn team_is_referenced(conn: &Connection, team: &Team) -> Result<bool> {
    let referenced: bool = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM players
             WHERE auction_id = ?1 AND (sold_to = ?2 OR current_bidder = ?2)
         )",
        params![team.auction_id, team.name],
        |row| row.get(0),
    )?;
    Ok(referenced)
}

fn team_in_owned_auction(conn: &Connection, team_id: i64, requester_id: i64) -> Result<Team> {
    let team = db::find_team(conn, team_id)?
        .ok_or_else(|| AuctionError::TeamNotFound(format!("#{team_id}")))?;
    owned_auction(conn, team.auction_id, requester_id)?;
    Ok(team)
}

/// Add a team whose remaining budget starts equal to its budget.
pub fn add_team(
    db: &Database,
    auction_id: i64,
    name: &str,
    budget: i64,
    requester_id: i64,
) -> Result<Team> {
    let name = required("name", name)?;
    let budget = positive("budget", budget)?;

    db.write(|tx| {
        owned_auction(tx, auction_id, requester_id)?;
        let inserted = tx.execute(
            "INSERT INTO teams (auction_id, name, budget, remaining_budget)
             VALUES (?1, ?2, ?3, ?3)",
            params![auction_id, name, budget],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AuctionError::DuplicateTeam(name.clone()))
            }
            Err(e) => return Err(e.into()),
        }
        let id = tx.last_insert_rowid();
        info!("Auction {}: team '{}' added with budget {}", auction_id, name, budget);
        Ok(Team {
            id,
            auction_id,
            name: name.clone(),
            budget,
            remaining_budget: budget,
        })
    })
}

/// Rename a team and/or change its budget.
///
/// A budget change shifts `remaining_budget` by the same delta and is
/// rejected when the result would go below zero. A rename is rejected once
/// the team is referenced by name from a player record; memberships follow
/// the new name.
pub fn update_team(
    db: &Database,
    team_id: i64,
    name: Option<&str>,
    budget: Option<i64>,
    requester_id: i64,
) -> Result<Team> {
    let name = name.map(|n| required("name", n)).transpose()?;
    let budget = budget.map(|b| positive("budget", b)).transpose()?;

    db.write(|tx| {
        let team = team_in_owned_auction(tx, team_id, requester_id)?;

        if let Some(new_budget) = budget.filter(|b| *b != team.budget) {
            let delta = new_budget - team.budget;
            let remaining = team.remaining_budget + delta;
            if remaining < 0 {
                return Err(AuctionError::InvalidBudget {
                    budget: new_budget,
                    remaining,
                });
            }
            tx.execute(
                "UPDATE teams
                 SET budget = ?1, remaining_budget = remaining_budget + ?2
                 WHERE id = ?3",
                params![new_budget, delta, team_id],
            )?;
            info!(
                "Team '{}' budget {} -> {} (remaining {} -> {})",
                team.name, team.budget, new_budget, team.remaining_budget, remaining
            );
        }

        if let Some(new_name) = name.as_deref().filter(|n| *n != team.name) {
            if team_is_referenced(tx, &team)? {
                return Err(AuctionError::TeamHasPlayers(team.name.clone()));
            }
            match tx.execute(
                "UPDATE teams SET name = ?1 WHERE id = ?2",
                params![new_name, team_id],
            ) {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(AuctionError::DuplicateTeam(new_name.to_string()))
                }
                Err(e) => return Err(e.into()),
            }
            tx.execute(
                "UPDATE memberships SET team_name = ?1 WHERE auction_id = ?2 AND team_name = ?3",
                params![new_name, team.auction_id, team.name],
            )?;
            info!("Team '{}' renamed to '{}'", team.name, new_name);
        }

        db::find_team(tx, team_id)?.ok_or_else(|| AuctionError::TeamNotFound(format!("#{team_id}")))
    })
}

/// Delete a team that has not bought anyone. Memberships pointing at it are
/// removed with it.
pub fn delete_team(db: &Database, team_id: i64, requester_id: i64) -> Result<()> {
    db.write(|tx| {
        let team = team_in_owned_auction(tx, team_id, requester_id)?;
        if team_is_referenced(tx, &team)? {
            return Err(AuctionError::TeamHasPlayers(team.name));
        }
        tx.execute(
            "DELETE FROM memberships WHERE auction_id = ?1 AND team_name = ?2",
            params![team.auction_id, team.name],
        )?;
        tx.execute("DELETE FROM teams WHERE id = ?1", params![team_id])?;
        info!("Team '{}' deleted from auction {}", team.name, team.auction_id);
        Ok(())
    })
}

pub fn team(db: &Database, team_id: i64) -> Result<Team> {
    db.read(|conn| db::find_team(conn, team_id))?
        .ok_or_else(|| AuctionError::TeamNotFound(format!("#{team_id}")))
}

/// Teams with their rosters, optionally limited to one auction.
pub fn list_teams(db: &Database, auction_id: Option<i64>) -> Result<Vec<TeamWithRoster>> {
    db.read(|conn| {
        let teams = match auction_id {
            Some(id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TEAM_COLUMNS} FROM teams WHERE auction_id = ?1 ORDER BY id"
                ))?;
                let rows = stmt.query_map(params![id], db::team_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("SELECT {TEAM_COLUMNS} FROM teams ORDER BY id"))?;
                let rows = stmt.query_map([], db::team_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        teams
            .into_iter()
            .map(|team| -> Result<TeamWithRoster> {
                let players = roster(conn, team.auction_id, &team.name)?;
                Ok(TeamWithRoster { team, players })
            })
            .collect()
    })
}
