//! Axum WebSocket upgrade for the encoder connection (spec.md §6:
//! "bidirectional message framing over a persistent streaming
//! transport"). New at the handler level, but layered on the same
//! `axum`/`ws` dependency pair `foia-server` already carries.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::protocol::Frame;
use crate::scheduler::Dispatcher;

pub async fn upgrade(State(dispatcher): State<Arc<Dispatcher>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, dispatcher))
}

async fn handle_socket(mut socket: WebSocket, dispatcher: Arc<Dispatcher>) {
    let Some(encoder_id) = await_hello(&mut socket, &dispatcher).await else {
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    dispatcher.connections().register(&encoder_id, tx).await;
    let _ = dispatcher.dispatch_until_idle().await;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if send_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if handle_inbound(&text, &encoder_id, &dispatcher).await.is_err() {
                            warn!(encoder_id = %encoder_id, "malformed frame, ignoring");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(encoder_id = %encoder_id, %err, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    info!(encoder_id = %encoder_id, "encoder connection closed");
    if let Err(err) = dispatcher.on_disconnect(&encoder_id).await {
        warn!(encoder_id = %encoder_id, %err, "failed to process disconnect");
    }
}

/// The first frame on any connection must be HELLO (spec.md §4.4 "On
/// open: peer is unidentified; it must send HELLO").
async fn await_hello(socket: &mut WebSocket, dispatcher: &Arc<Dispatcher>) -> Option<String> {
    while let Some(message) = socket.recv().await {
        let Ok(Message::Text(text)) = message else {
            continue;
        };
        let Ok(Frame::Hello { encoder_id, max_concurrent, capabilities }) = serde_json::from_str::<Frame>(&text) else {
            continue;
        };
        if dispatcher.on_hello(&encoder_id, max_concurrent, capabilities).await.is_err() {
            return None;
        }
        return Some(encoder_id);
    }
    None
}

async fn handle_inbound(text: &str, encoder_id: &str, dispatcher: &Arc<Dispatcher>) -> Result<(), serde_json::Error> {
    let frame: Frame = serde_json::from_str(text)?;
    let result = match frame {
        Frame::Heartbeat => dispatcher.on_heartbeat(encoder_id).await,
        Frame::Accept { job_id } => dispatcher.on_accept(&job_id).await,
        Frame::Reject { job_id, reason } => dispatcher.on_reject(encoder_id, &job_id, &reason).await,
        Frame::Progress { job_id, pct, .. } => dispatcher.on_progress(&job_id, pct).await,
        Frame::Completed { job_id, output_path, size, compression_ratio, duration_secs } => {
            dispatcher
                .on_completed(encoder_id, &job_id, &output_path, size, compression_ratio, duration_secs)
                .await
        }
        Frame::Failed { job_id, error } => dispatcher.on_failed(encoder_id, &job_id, &error).await,
        Frame::Hello { .. } | Frame::Offer { .. } | Frame::Cancel { .. } | Frame::Ping => Ok(()),
    };
    if let Err(err) = result {
        warn!(encoder_id, %err, "dispatcher rejected frame");
    }
    let _ = dispatcher.dispatch_until_idle().await;
    Ok(())
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).unwrap_or_default();
    socket.send(Message::Text(text)).await
}
