use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use regret_types::events::{SocketCommand, SocketEvent};

use crate::dispatcher::Dispatcher;
use crate::feed::ConfessionFeed;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one live viewer until it disconnects, stops answering pings, or the
/// server shuts down.
pub async fn handle_connection<F: ConfessionFeed>(socket: WebSocket, dispatcher: Dispatcher, feed: F) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot so nothing created in between is missed
    let (conn_id, mut broadcast_rx) = dispatcher.register_viewer().await;
    info!("Viewer {} connected", conn_id);

    let snapshot = feed.snapshot().await.unwrap_or_else(|e| {
        warn!("Snapshot for viewer {} failed: {}", conn_id, e);
        Vec::new()
    });

    // Broadcasts racing the snapshot would otherwise arrive twice
    let mut in_snapshot: HashSet<Uuid> = snapshot.iter().map(|c| c.id).collect();

    if send_event(&mut sender, &SocketEvent::InitialConfessions(snapshot))
        .await
        .is_err()
    {
        dispatcher.unregister_viewer(conn_id).await;
        return;
    }

    // Replies addressed to this viewer only (submit rejections)
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<SocketEvent>();
    let shutdown = dispatcher.shutdown_token();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + replies -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Viewer {} lagged by {} confessions", conn_id, n);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };

                    if in_snapshot.remove(&msg.id) {
                        continue;
                    }

                    if sender.send(Message::Text(msg.json.to_string().into())).await.is_err() {
                        warn!("Dropping viewer {}: broadcast write failed", conn_id);
                        break;
                    }
                }
                result = reply_rx.recv() => {
                    let Some(event) = result else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout for viewer {} (missed {} pongs)", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Read commands from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<SocketCommand>(&text) {
                    Ok(SocketCommand::SubmitConfession(req)) => match feed.submit(req).await {
                        Ok(confession) => {
                            debug!("Viewer {} submitted confession {}", conn_id, confession.id)
                        }
                        Err(rejection) => {
                            debug!("Viewer {} submission rejected: {}", conn_id, rejection.error);
                            let _ = reply_tx.send(SocketEvent::SubmitRejected {
                                status: rejection.status,
                                error: rejection.error,
                                details: rejection.details,
                            });
                        }
                    },
                    Err(e) => {
                        warn!(
                            "Viewer {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        let _ = reply_tx.send(SocketEvent::SubmitRejected {
                            status: 400,
                            error: format!("Malformed command: {}", e),
                            details: vec![],
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_viewer(conn_id).await;
    info!("Viewer {} disconnected", conn_id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &SocketEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode socket event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}
