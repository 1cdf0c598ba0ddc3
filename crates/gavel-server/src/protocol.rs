// Wire protocol types for WebSocket clients.
//
// Every text frame carries one request:
//   {"id": 7, "token": "...", "op": "place_bid", "auctionId": 1, "playerId": 3, "amount": 150000}
// and is answered by exactly one response frame echoing the id.

use gavel_core::models::{NewLibraryPlayer, NewPlayer, PlayerUpdate, Role};
use gavel_core::AuctionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A parsed request frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: u64,
    pub token: Option<String>,
    pub op: Op,
}

/// The operation named by a request's `op` field, with its arguments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "op",
    rename_all = "snake_case",
    rename_all_fields = "camelCase",
    deny_unknown_fields
)]
pub enum Op {
    // Accounts
    Register {
        username: String,
        password: String,
        #[serde(default)]
        role: Option<Role>,
    },
    Login {
        username: String,
        password: String,
    },
    SelectTeam {
        auction_id: i64,
        team: String,
    },
    MyTeam {
        auction_id: i64,
    },

    // Auctions
    CreateAuction {
        name: String,
    },
    ListAuctions,
    JoinAuction {
        code: String,
    },
    AuctionStatus {
        auction_id: i64,
    },
    /// `playerId: null` (or omitted) stops bidding.
    SetActivePlayer {
        auction_id: i64,
        #[serde(default)]
        player_id: Option<i64>,
    },
    CloseAuction {
        auction_id: i64,
    },
    ReopenAuction {
        auction_id: i64,
    },
    RestartAuction {
        auction_id: i64,
    },

    // Teams
    ListTeams {
        #[serde(default)]
        auction_id: Option<i64>,
    },
    AddTeam {
        auction_id: i64,
        name: String,
        budget: i64,
    },
    UpdateTeam {
        team_id: i64,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        budget: Option<i64>,
    },
    DeleteTeam {
        team_id: i64,
    },

    // Players
    ListPlayers {
        #[serde(default)]
        auction_id: Option<i64>,
    },
    GetPlayer {
        player_id: i64,
    },
    AddPlayer {
        auction_id: i64,
        player: NewPlayer,
    },
    UpdatePlayer {
        player_id: i64,
        changes: PlayerUpdate,
    },
    DeletePlayer {
        player_id: i64,
    },
    /// Exactly one of `players` and `libraryIds` must be given.
    ImportPlayers {
        auction_id: i64,
        #[serde(default)]
        players: Option<Vec<NewPlayer>>,
        #[serde(default)]
        library_ids: Option<Vec<i64>>,
    },

    // Bidding
    PlaceBid {
        auction_id: i64,
        player_id: i64,
        amount: i64,
    },
    BidHistory {
        player_id: i64,
        #[serde(default)]
        include_rejected: bool,
    },
    SellPlayer {
        auction_id: i64,
        player_id: i64,
    },

    // Library
    ListLibrary,
    AddLibraryPlayer {
        player: NewLibraryPlayer,
    },
    DeleteLibraryPlayer {
        library_id: i64,
    },
}

impl Op {
    /// Operations that may be called without a credential.
    pub fn is_public(&self) -> bool {
        matches!(self, Op::Register { .. } | Op::Login { .. })
    }
}

/// Why a frame could not be turned into a [`Request`]. Carries the request
/// id when one could be read so the error can still be correlated.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameError {
    pub id: Option<u64>,
    pub message: String,
}

/// Parse one text frame. The envelope fields `id` and `token` are split off
/// first; everything else must describe exactly one known operation.
pub fn parse_request(text: &str) -> Result<Request, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(|e| FrameError {
        id: None,
        message: format!("malformed JSON: {e}"),
    })?;
    let Value::Object(mut fields) = value else {
        return Err(FrameError {
            id: None,
            message: "request must be a JSON object".into(),
        });
    };

    let id = fields
        .remove("id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| FrameError {
            id: None,
            message: "missing or invalid `id`".into(),
        })?;

    let token = match fields.remove("token") {
        None | Some(Value::Null) => None,
        Some(Value::String(t)) => Some(t),
        Some(_) => {
            return Err(FrameError {
                id: Some(id),
                message: "`token` must be a string".into(),
            })
        }
    };

    let op = serde_json::from_value(Value::Object(fields)).map_err(|e| FrameError {
        id: Some(id),
        message: format!("invalid request: {e}"),
    })?;

    Ok(Request { id, token, op })
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// One response frame. Exactly one of `data` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(id: u64, data: Value) -> Self {
        Self {
            id: Some(id),
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(id: Option<u64>, code: &str, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            data: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }

    /// Map a domain error onto the wire. Internal failures are reported
    /// without their details.
    pub fn from_error(id: u64, err: &AuctionError) -> Self {
        let kind = err.kind();
        let message = match kind {
            gavel_core::ErrorKind::Internal => "internal error".to_string(),
            _ => err.to_string(),
        };
        Self::failure(Some(id), kind.code(), message)
    }

    pub fn from_frame_error(err: FrameError) -> Self {
        Self::failure(
            err.id,
            gavel_core::ErrorKind::ValidationFailed.code(),
            err.message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bid_request() {
        let req = parse_request(
            r#"{"id":7,"token":"abc","op":"place_bid","auctionId":1,"playerId":3,"amount":150000}"#,
        )
        .unwrap();
        assert_eq!(req.id, 7);
        assert_eq!(req.token.as_deref(), Some("abc"));
        assert_eq!(
            req.op,
            Op::PlaceBid {
                auction_id: 1,
                player_id: 3,
                amount: 150_000
            }
        );
        assert!(!req.op.is_public());
    }

    #[test]
    fn unit_ops_and_optional_fields() {
        let req = parse_request(r#"{"id":1,"op":"list_auctions"}"#).unwrap();
        assert_eq!(req.op, Op::ListAuctions);
        assert!(req.token.is_none());

        let req = parse_request(r#"{"id":2,"op":"set_active_player","auctionId":4}"#).unwrap();
        assert_eq!(
            req.op,
            Op::SetActivePlayer {
                auction_id: 4,
                player_id: None
            }
        );

        let req = parse_request(r#"{"id":3,"op":"register","username":"a","password":"b"}"#)
            .unwrap();
        assert!(req.op.is_public());
    }

    #[test]
    fn nested_player_payload() {
        let req = parse_request(
            r#"{"id":9,"op":"add_player","auctionId":2,
                "player":{"name":"Rohit","role":"Batsman","basePrice":200000}}"#,
        )
        .unwrap();
        match req.op {
            Op::AddPlayer { auction_id, player } => {
                assert_eq!(auction_id, 2);
                assert_eq!(player.name, "Rohit");
                assert_eq!(player.base_price, Some(200_000));
                assert!(player.country.is_none());
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_op_and_fields() {
        let err = parse_request(r#"{"id":5,"op":"steal_player","playerId":1}"#).unwrap_err();
        assert_eq!(err.id, Some(5));

        let err = parse_request(r#"{"id":6,"op":"get_player","playerId":1,"extra":true}"#)
            .unwrap_err();
        assert_eq!(err.id, Some(6));

        let err = parse_request(r#"{"id":8,"op":"place_bid","auctionId":1,"playerId":3}"#)
            .unwrap_err();
        assert!(err.message.contains("amount"));
    }

    #[test]
    fn rejects_malformed_envelopes() {
        assert_eq!(parse_request("not json").unwrap_err().id, None);
        assert_eq!(parse_request("[1,2]").unwrap_err().id, None);
        assert_eq!(parse_request(r#"{"op":"list_auctions"}"#).unwrap_err().id, None);
        assert_eq!(
            parse_request(r#"{"id":4,"token":5,"op":"list_auctions"}"#)
                .unwrap_err()
                .id,
            Some(4)
        );
    }

    #[test]
    fn response_shapes() {
        let ok = serde_json::to_value(Response::success(3, json!({"x": 1}))).unwrap();
        assert_eq!(ok, json!({"id": 3, "ok": true, "data": {"x": 1}}));

        let err = Response::from_error(
            4,
            &AuctionError::BidTooLow {
                amount: 100,
                current: 100,
            },
        );
        let err = serde_json::to_value(err).unwrap();
        assert_eq!(err["ok"], false);
        assert_eq!(err["error"]["code"], "validation_failed");
        assert!(err.get("data").is_none());

        let internal = Response::from_error(5, &AuctionError::Internal("disk on fire".into()));
        assert_eq!(internal.error.unwrap().message, "internal error");
    }
}
