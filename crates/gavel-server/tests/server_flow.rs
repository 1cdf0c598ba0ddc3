// Integration tests: a real listener on an ephemeral port driven by
// WebSocket clients.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use gavel_core::identity::TokenSigner;
use gavel_core::{AuctionService, Database, ServiceSettings};
use gavel_server::app::App;
use gavel_server::ws_server;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> String {
    let db = Database::open(":memory:").expect("in-memory database should open");
    let app = Arc::new(App::new(AuctionService::new(
        db,
        TokenSigner::new("integration-secret-key", chrono::Duration::hours(1)),
        ServiceSettings::default(),
    )));
    let listener = ws_server::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(ws_server::run(listener, app));
    format!("ws://{addr}")
}

async fn connect(url: &str) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    client
}

async fn call(client: &mut Client, request: Value) -> Value {
    client
        .send(Message::Text(request.to_string().into()))
        .await
        .unwrap();
    loop {
        match client.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn register(client: &mut Client, username: &str, role: &str) -> String {
    let resp = call(
        client,
        json!({"id": 1, "op": "register", "username": username, "password": "pw", "role": role}),
    )
    .await;
    assert_eq!(resp["ok"], true, "register failed: {resp}");
    resp["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_auction_across_two_clients() {
    let url = start_server().await;
    let mut organiser = connect(&url).await;
    let mut bidder = connect(&url).await;

    let admin = register(&mut organiser, "organiser", "admin").await;
    let fan = register(&mut bidder, "fan", "bidder").await;

    let auction = call(
        &mut organiser,
        json!({"id": 2, "token": admin, "op": "create_auction", "name": "Cup"}),
    )
    .await;
    let auction_id = auction["data"]["id"].as_i64().unwrap();
    let code = auction["data"]["code"].as_str().unwrap().to_string();

    call(
        &mut organiser,
        json!({"id": 3, "token": admin, "op": "add_team",
               "auctionId": auction_id, "name": "Kings", "budget": 1_000_000}),
    )
    .await;
    let player = call(
        &mut organiser,
        json!({"id": 4, "token": admin, "op": "add_player",
               "auctionId": auction_id, "player": {"name": "Rohit", "basePrice": 100_000}}),
    )
    .await;
    let player_id = player["data"]["id"].as_i64().unwrap();
    call(
        &mut organiser,
        json!({"id": 5, "token": admin, "op": "set_active_player",
               "auctionId": auction_id, "playerId": player_id}),
    )
    .await;

    let joined = call(
        &mut bidder,
        json!({"id": 6, "token": fan, "op": "join_auction", "code": code.to_lowercase()}),
    )
    .await;
    assert_eq!(joined["data"]["id"], auction_id);
    call(
        &mut bidder,
        json!({"id": 7, "token": fan, "op": "select_team",
               "auctionId": auction_id, "team": "Kings"}),
    )
    .await;

    let status = call(
        &mut bidder,
        json!({"id": 8, "token": fan, "op": "auction_status", "auctionId": auction_id}),
    )
    .await;
    assert_eq!(status["data"]["currentPlayerId"], player_id);

    let bid = call(
        &mut bidder,
        json!({"id": 9, "token": fan, "op": "place_bid",
               "auctionId": auction_id, "playerId": player_id, "amount": 150_000}),
    )
    .await;
    assert_eq!(bid["id"], 9);
    assert_eq!(bid["ok"], true);

    let sale = call(
        &mut organiser,
        json!({"id": 10, "token": admin, "op": "sell_player",
               "auctionId": auction_id, "playerId": player_id}),
    )
    .await;
    assert_eq!(sale["data"]["remainingAfter"], 850_000);

    let teams = call(
        &mut bidder,
        json!({"id": 11, "token": fan, "op": "list_teams", "auctionId": auction_id}),
    )
    .await;
    assert_eq!(teams["data"][0]["remainingBudget"], 850_000);
    assert_eq!(teams["data"][0]["players"][0]["name"], "Rohit");

    let status = call(
        &mut bidder,
        json!({"id": 12, "token": fan, "op": "auction_status", "auctionId": auction_id}),
    )
    .await;
    assert_eq!(status["data"]["currentPlayerId"], Value::Null);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_frames_do_not_drop_the_connection() {
    let url = start_server().await;
    let mut client = connect(&url).await;

    client.send(Message::Text("not json".into())).await.unwrap();
    let reply = match client.next().await.unwrap().unwrap() {
        Message::Text(text) => serde_json::from_str::<Value>(text.as_str()).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    };
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"]["code"], "validation_failed");

    let resp = call(&mut client, json!({"id": 2, "op": "no_such_op"})).await;
    assert_eq!(resp["id"], 2);
    assert_eq!(resp["error"]["code"], "validation_failed");

    let token = register(&mut client, "still-here", "bidder").await;
    assert!(!token.is_empty());
}
