// WebSocket server: one task per client, one response per request frame.

use std::sync::Arc;

use anyhow::Context;
use futures_util::stream::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::app::{self, App};
use crate::protocol::Response;

/// Bind the listening socket.
pub async fn bind(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    info!("WebSocket server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections forever, serving each on its own task. Clients are
/// independent: a slow or broken connection never blocks the others.
pub async fn run(listener: TcpListener, app: Arc<App>) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            serve_connection(stream, addr.to_string(), app).await;
        });
    }
}

async fn serve_connection(stream: TcpStream, addr: String, app: Arc<App>) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };
    info!("Client {addr} connected");

    let (mut write, read) = ws_stream.split();
    if let Err(e) = process_message_stream(read, &mut write, &app, &addr).await {
        warn!("Failed to reply to {addr}: {e}");
    }
    info!("Client {addr} disconnected");
}

/// Answer every text frame from `stream` with one text frame on `sink`.
/// Binary, ping and pong frames are ignored; a close frame or a transport
/// error ends the loop. Returns `Err` only when writing a reply fails.
///
/// Generic over stream and sink so it can be driven by in-memory mocks.
pub async fn process_message_stream<St, Si>(
    mut stream: St,
    sink: &mut Si,
    app: &Arc<App>,
    addr: &str,
) -> Result<(), Si::Error>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    Si: Sink<Message> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let reply = respond(app, text.to_string()).await;
                sink.send(Message::Text(reply.into())).await?;
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}

/// Store access is synchronous, so requests run on the blocking pool.
async fn respond(app: &Arc<App>, text: String) -> String {
    let app = Arc::clone(app);
    match tokio::task::spawn_blocking(move || app.handle_text(&text)).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Request handler panicked: {e}");
            app::encode(&Response::failure(None, "internal", "internal error"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use gavel_core::identity::TokenSigner;
    use gavel_core::{AuctionService, Database, ServiceSettings};
    use serde_json::Value;
    use tokio_tungstenite::tungstenite::Error as WsError;

    fn test_app() -> Arc<App> {
        let db = Database::open(":memory:").expect("in-memory database should open");
        Arc::new(App::new(AuctionService::new(
            db,
            TokenSigner::new("ws-test-secret-value", chrono::Duration::hours(1)),
            ServiceSettings::default(),
        )))
    }

    /// Helper: create a stream of Message results from a vec.
    fn mock_stream(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    fn reply_json(msg: &Message) -> Value {
        match msg {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn each_text_frame_gets_one_reply_in_order() {
        let app = test_app();
        let messages = vec![
            Ok(Message::Text(r#"{"id":1,"op":"list_library"}"#.into())),
            Ok(Message::Text(
                r#"{"id":2,"op":"login","username":"ghost","password":"x"}"#.into(),
            )),
            Ok(Message::Text(
                r#"{"id":3,"op":"register","username":"fan","password":"pw"}"#.into(),
            )),
        ];
        let mut sink: Vec<Message> = Vec::new();

        process_message_stream(mock_stream(messages), &mut sink, &app, "test")
            .await
            .unwrap();

        assert_eq!(sink.len(), 3);
        let first = reply_json(&sink[0]);
        assert_eq!(first["id"], 1);
        assert_eq!(first["error"]["code"], "unauthorized");
        let second = reply_json(&sink[1]);
        assert_eq!(second["id"], 2);
        assert_eq!(second["error"]["code"], "unauthorized");
        let third = reply_json(&sink[2]);
        assert_eq!(third["ok"], true);
        assert_eq!(third["data"]["user"]["role"], "bidder");
    }

    #[tokio::test]
    async fn malformed_frame_still_answered() {
        let app = test_app();
        let messages = vec![Ok(Message::Text("garbage".into()))];
        let mut sink: Vec<Message> = Vec::new();

        process_message_stream(mock_stream(messages), &mut sink, &app, "test")
            .await
            .unwrap();

        let reply = reply_json(&sink[0]);
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["ok"], false);
    }

    #[tokio::test]
    async fn close_frame_stops_processing() {
        let app = test_app();
        let messages = vec![
            Ok(Message::Text(r#"{"id":1,"op":"list_library"}"#.into())),
            Ok(Message::Close(None)),
            Ok(Message::Text(r#"{"id":2,"op":"list_library"}"#.into())),
        ];
        let mut sink: Vec<Message> = Vec::new();

        process_message_stream(mock_stream(messages), &mut sink, &app, "test")
            .await
            .unwrap();

        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn error_stops_processing() {
        let app = test_app();
        let messages = vec![
            Err(WsError::ConnectionClosed),
            Ok(Message::Text(r#"{"id":2,"op":"list_library"}"#.into())),
        ];
        let mut sink: Vec<Message> = Vec::new();

        process_message_stream(mock_stream(messages), &mut sink, &app, "test")
            .await
            .unwrap();

        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn binary_and_ping_messages_are_ignored() {
        let app = test_app();
        let messages = vec![
            Ok(Message::Binary(vec![1, 2, 3].into())),
            Ok(Message::Ping(vec![].into())),
            Ok(Message::Pong(vec![].into())),
        ];
        let mut sink: Vec<Message> = Vec::new();

        process_message_stream(mock_stream(messages), &mut sink, &app, "test")
            .await
            .unwrap();

        assert!(sink.is_empty());
    }
}
