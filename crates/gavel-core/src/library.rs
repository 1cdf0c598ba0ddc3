// Shared player library: a reusable pool of players that admins copy into
// their auctions.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use rusqlite::params;
use serde::Deserialize;
use tracing::{info, warn};

use crate::catalog::{self, PlayerDefaults};
use crate::db::{self, Database, LIBRARY_COLUMNS};
use crate::error::{AuctionError, Result};
use crate::models::{positive, required, LibraryPlayer, NewLibraryPlayer, NewPlayer, PlayerRole};
use crate::registry::owned_auction;

pub fn list_library(db: &Database) -> Result<Vec<LibraryPlayer>> {
    db.read(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {LIBRARY_COLUMNS} FROM library_players ORDER BY name, id"
        ))?;
        let players = stmt
            .query_map([], db::library_player_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(players)
    })
}

pub fn add_library_player(db: &Database, new: &NewLibraryPlayer) -> Result<LibraryPlayer> {
    let name = required("name", &new.name)?;
    let country = required("country", &new.country)?;
    let base_price = positive("basePrice", new.base_price)?;
    let image_url = new
        .image_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());

    db.write(|tx| {
        tx.execute(
            "INSERT INTO library_players (name, role, base_price, country, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, new.role.as_str(), base_price, country, image_url],
        )?;
        let id = tx.last_insert_rowid();
        Ok(LibraryPlayer {
            id,
            name: name.clone(),
            role: new.role,
            base_price,
            country: country.clone(),
            image_url: image_url.map(str::to_string),
        })
    })
}

pub fn delete_library_player(db: &Database, id: i64) -> Result<()> {
    db.write(|tx| {
        let removed = tx.execute("DELETE FROM library_players WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(AuctionError::LibraryPlayerNotFound(id));
        }
        Ok(())
    })
}

/// Copy library players into an auction the requester owns. Unknown ids
/// fail the whole import.
pub fn import_from_library(
    db: &Database,
    auction_id: i64,
    library_ids: &[i64],
    defaults: &PlayerDefaults,
    requester_id: i64,
) -> Result<usize> {
    db.write(|tx| {
        owned_auction(tx, auction_id, requester_id)?;

        let mut players = Vec::with_capacity(library_ids.len());
        for &id in library_ids {
            let entry = tx
                .query_row(
                    &format!("SELECT {LIBRARY_COLUMNS} FROM library_players WHERE id = ?1"),
                    params![id],
                    db::library_player_from_row,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => AuctionError::LibraryPlayerNotFound(id),
                    other => other.into(),
                })?;
            players.push(NewPlayer {
                name: entry.name,
                role: Some(entry.role),
                base_price: Some(entry.base_price),
                country: Some(entry.country),
                image_url: entry.image_url,
            });
        }

        let count = catalog::insert_many(tx, auction_id, &players, defaults)?;
        info!("Auction {}: imported {} players from the library", auction_id, count);
        Ok(count)
    })
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SeedRecord {
    name: String,
    role: String,
    base_price: i64,
    country: String,
    #[serde(default)]
    image_url: Option<String>,
}

/// Load library rows from CSV (`name,role,base_price,country,image_url`)
/// when the library is empty. Returns the number of rows inserted; an
/// already-populated library is left alone and yields 0.
pub fn seed_from_reader<R: Read>(db: &Database, reader: R) -> anyhow::Result<usize> {
    let mut rows = Vec::new();
    let mut csv = csv::Reader::from_reader(reader);
    for (line, record) in csv.deserialize::<SeedRecord>().enumerate() {
        let record = record.with_context(|| format!("malformed library row {}", line + 1))?;
        let Some(role) = PlayerRole::parse(&record.role) else {
            warn!(
                "Skipping library row {} ({}): unknown role '{}'",
                line + 1,
                record.name,
                record.role
            );
            continue;
        };
        rows.push(NewLibraryPlayer {
            name: record.name,
            role,
            base_price: record.base_price,
            country: record.country,
            image_url: record.image_url,
        });
    }

    let inserted = db.write(|tx| {
        let existing: i64 =
            tx.query_row("SELECT COUNT(*) FROM library_players", [], |row| row.get(0))?;
        if existing > 0 {
            return Ok(0);
        }
        for row in &rows {
            let name = required("name", &row.name)?;
            let base_price = positive("basePrice", row.base_price)?;
            tx.execute(
                "INSERT INTO library_players (name, role, base_price, country, image_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    name,
                    row.role.as_str(),
                    base_price,
                    row.country.trim(),
                    row.image_url.as_deref().filter(|u| !u.trim().is_empty())
                ],
            )?;
        }
        Ok(rows.len())
    })?;

    if inserted > 0 {
        info!("Seeded player library with {} players", inserted);
    }
    Ok(inserted)
}

pub fn seed_from_csv(db: &Database, path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open library seed {}", path.display()))?;
    seed_from_reader(db, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity;
    use crate::models::Role;
    use crate::registry;

    const SEED: &str = "\
name,role,base_price,country,image_url
Virat Kohli,Batsman,200000,India,https://img.example/virat.png
Jasprit Bumrah,Bowler,150000,India,
Glenn Maxwell,All-rounder,120000,Australia,
Nobody,Umpire,1000,Nowhere,
";

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    #[test]
    fn seed_loads_rows_once() {
        let db = test_db();
        assert_eq!(seed_from_reader(&db, SEED.as_bytes()).unwrap(), 3);
        assert_eq!(seed_from_reader(&db, SEED.as_bytes()).unwrap(), 0);

        let library = list_library(&db).unwrap();
        assert_eq!(library.len(), 3);
        let bumrah = library.iter().find(|p| p.name == "Jasprit Bumrah").unwrap();
        assert_eq!(bumrah.role, PlayerRole::Bowler);
        assert!(bumrah.image_url.is_none());
    }

    #[test]
    fn add_requires_fields() {
        let db = test_db();
        let mut new = NewLibraryPlayer {
            name: "Rashid Khan".into(),
            role: PlayerRole::Bowler,
            base_price: 180_000,
            country: "  ".into(),
            image_url: None,
        };
        assert!(matches!(
            add_library_player(&db, &new),
            Err(AuctionError::MissingField("country"))
        ));
        new.country = "Afghanistan".into();
        let added = add_library_player(&db, &new).unwrap();
        assert_eq!(added.country, "Afghanistan");

        delete_library_player(&db, added.id).unwrap();
        assert!(matches!(
            delete_library_player(&db, added.id),
            Err(AuctionError::LibraryPlayerNotFound(_))
        ));
    }

    #[test]
    fn import_copies_library_players() {
        let db = test_db();
        seed_from_reader(&db, SEED.as_bytes()).unwrap();
        let admin = identity::register(&db, "boss", "pw", Role::Admin).unwrap().id;
        let auction = registry::create_auction(&db, admin, "Cup", 6).unwrap().id;
        let ids: Vec<i64> = list_library(&db).unwrap().iter().map(|p| p.id).collect();

        let count =
            import_from_library(&db, auction, &ids, &PlayerDefaults::default(), admin).unwrap();
        assert_eq!(count, 3);

        let players = catalog::list_players(&db, Some(auction)).unwrap();
        let virat = players.iter().find(|p| p.name == "Virat Kohli").unwrap();
        assert_eq!(virat.base_price, 200_000);
        assert_eq!(virat.current_bid, 200_000);
        assert_eq!(virat.role, PlayerRole::Batsman);
    }

    #[test]
    fn import_with_unknown_id_inserts_nothing() {
        let db = test_db();
        seed_from_reader(&db, SEED.as_bytes()).unwrap();
        let admin = identity::register(&db, "boss", "pw", Role::Admin).unwrap().id;
        let auction = registry::create_auction(&db, admin, "Cup", 6).unwrap().id;
        let first = list_library(&db).unwrap()[0].id;

        assert!(matches!(
            import_from_library(&db, auction, &[first, 9999], &PlayerDefaults::default(), admin),
            Err(AuctionError::LibraryPlayerNotFound(9999))
        ));
        assert!(catalog::list_players(&db, Some(auction)).unwrap().is_empty());
    }
}
