use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{net::TcpStream, sync::mpsc::UnboundedSender};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

// Plays an opening against a running server: two guests queue for chess at
// the same stake and white pushes the king's pawn.
#[tokio::main]
async fn main() {
    let url = std::env::var("WAGER_E2E_URL").unwrap_or_else(|_| "ws://localhost:3001/ws".to_string());

    let (p1, mut p1_events) = spawn_player(&url, "p1").await;
    let (p2, _p2_events) = spawn_player(&url, "p2").await;

    p1.send(json!({"event": "join-chess-queue", "data": 10}).to_string())
        .unwrap();
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    p2.send(json!({"event": "join-chess-queue", "data": 10}).to_string())
        .unwrap();

    let mut room_id = None;
    let mut white = false;
    while let Some(event) = p1_events.recv().await {
        if event["event"] == "player-assigned" {
            room_id = event["data"]["roomId"].as_str().map(str::to_string);
            white = event["data"]["color"] == "white";
            break;
        }
    }
    let room_id = room_id.expect("No room assigned");

    // The later queue entrant is seated as white.
    let mover = if white { &p1 } else { &p2 };
    mover
        .send(
            json!({
                "event": "chess-move",
                "data": {"roomId": room_id, "from": {"row": 6, "col": 4}, "to": {"row": 4, "col": 4}}
            })
            .to_string(),
        )
        .unwrap();

    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
}

async fn create_connection(url: &str) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
    let (ws_stream, _) = connect_async(url).await.expect("Failed to connect");
    ws_stream
}

async fn spawn_player(
    url: &str,
    label: &'static str,
) -> (UnboundedSender<String>, tokio::sync::mpsc::UnboundedReceiver<Value>) {
    let mut ws_stream = create_connection(url).await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel::<Value>();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    if ws_stream.send(Message::Text(msg.into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(msg)) = ws_stream.next() => {
                    println!("{} received: {:?}", label, msg);
                    if let Message::Text(text) = msg {
                        if let Ok(value) = serde_json::from_str::<Value>(&text) {
                            let _ = event_tx.send(value);
                        }
                    }
                }
                else => break,
            }
        }
    });
    (tx, event_rx)
}
