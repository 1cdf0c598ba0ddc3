pub mod bidding;
pub mod catalog;
pub mod db;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod library;
pub mod models;
pub mod registry;
pub mod service;
pub mod settlement;

pub use db::Database;
pub use error::{AuctionError, ErrorKind, Result};
pub use service::{AuctionService, ImportSource, ServiceSettings, Session};
