//! The per-connection WebSocket lifetime: attach to a subscription, send the
//! on-connect baseline, then stream grains until either side goes away.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use nmos_query_core::subscriptions::AttachedSocket;
use nmos_query_proto::{Grain, GrainEntry, SubscriptionId};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::routes::resolve_version;
use crate::state::AppState;

const WRITE_DEADLINE: Duration = Duration::from_secs(5);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(version): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    if let Err(status) = resolve_version(&state, &version) {
        return status.into_response();
    }
    // An upgrade without a resolvable subscription is refused outright
    // rather than accepted and left hanging.
    let Some(uid) = params.get("uid").and_then(|raw| raw.parse::<SubscriptionId>().ok()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if state.subscriptions.get(uid).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    ws.on_upgrade(move |socket| session(socket, state, uid))
}

async fn session(socket: WebSocket, state: AppState, uid: SubscriptionId) {
    // The subscription can vanish between the upgrade check and now.
    let Ok(attached) = state.subscriptions.attach(uid) else {
        let _ = close(socket).await;
        return;
    };
    let AttachedSocket { subscription, api_version, attachment, mut grains } = attached;
    debug!(%uid, "websocket attached");

    let (mut sink, mut inbound) = socket.split();

    // On-connect baseline: one grain listing everything that currently
    // matches, each entry with identical pre and post images.
    match state
        .query
        .matching_snapshot(api_version, subscription.resource_path, &subscription.params)
        .await
    {
        Ok(docs) => {
            let entries = docs
                .into_iter()
                .map(|doc| GrainEntry {
                    path: doc.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    pre: Some(doc.clone()),
                    post: Some(doc),
                })
                .collect();
            let grain = Grain::new(
                state.subscriptions.source_id(),
                subscription.id,
                subscription.resource_path.to_string(),
                entries,
            );
            if send_grain(&mut sink, &grain).await.is_err() {
                state.subscriptions.detach(uid, attachment);
                return;
            }
        }
        Err(err) => {
            error!(%uid, %err, "initial sync failed");
            state.subscriptions.detach(uid, attachment);
            let _ = sink
                .send(Message::Close(Some(CloseFrame { code: close_code::NORMAL, reason: "sync failed".into() })))
                .await;
            return;
        }
    }

    loop {
        tokio::select! {
            grain = grains.recv() => match grain {
                Some(grain) => {
                    if send_grain(&mut sink, &grain).await.is_err() {
                        break;
                    }
                }
                // Queue closed: subscription deleted, terminated as slow,
                // or the service is shutting down.
                None => break,
            },
            message = inbound.next() => match message {
                // Anything the peer sends is just a keepalive.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.subscriptions.detach(uid, attachment);
    let _ = sink
        .send(Message::Close(Some(CloseFrame { code: close_code::NORMAL, reason: "".into() })))
        .await;
    debug!(%uid, "websocket detached");
}

async fn send_grain(sink: &mut SplitSink<WebSocket, Message>, grain: &Grain) -> Result<(), ()> {
    let text = serde_json::to_string(grain).map_err(|_| ())?;
    match tokio::time::timeout(WRITE_DEADLINE, sink.send(Message::Text(text.into()))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            debug!(%err, "websocket write failed");
            Err(())
        }
        Err(_) => {
            warn!("websocket write missed its deadline, dropping slow client");
            Err(())
        }
    }
}

async fn close(mut socket: WebSocket) -> Result<(), axum::Error> {
    socket
        .send(Message::Close(Some(CloseFrame { code: close_code::NORMAL, reason: "".into() })))
        .await
}
