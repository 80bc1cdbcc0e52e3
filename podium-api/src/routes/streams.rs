//! The streaming bridge: workspace logs over SSE, interactive shells over
//! WebSocket.

use std::convert::Infallible;

use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{
        sse::{Event, KeepAlive, Sse},
        Response,
    },
    routing::get,
    Extension, Router,
};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use podium_core::identity::Identity;
use podium_runtime::ExecSession;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/workspaces/{project}/logs", get(stream_logs))
        .route("/api/v1/workspaces/{project}/shell", get(shell))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    #[serde(default = "default_follow")]
    follow: bool,
    tail: Option<u32>,
}

fn default_follow() -> bool {
    true
}

/// Server-sent events, one per log line. The event name carries the origin
/// stream (`stdout` / `stderr`), the data carries the line.
async fn stream_logs(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let lines = state
        .engine
        .stream_logs(&identity, &project, query.follow, query.tail.or(Some(100)))
        .await?;
    let events = lines.map(|line| Ok(Event::default().event(line.stream.as_str()).data(line.line)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Duplex shell: client frames go to the session's stdin, session output
/// comes back as binary frames. The session has a TTY, so output arrives
/// pre-merged.
async fn shell(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Response> {
    let session = state.engine.shell(&identity, &project, None).await?;
    Ok(ws.on_upgrade(move |socket| bridge(socket, session)))
}

async fn bridge(socket: WebSocket, mut session: ExecSession) {
    let (mut sink, mut source) = socket.split();
    loop {
        tokio::select! {
            chunk = session.output.next() => match chunk {
                Some(Ok(chunk)) => {
                    if sink.send(Message::Binary(chunk.into_bytes())).await.is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    debug!(session = %session.id, error = %err, "shell output ended");
                    break;
                }
                None => break,
            },
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if session.input.write_all(text.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if session.input.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong handled by axum
                Some(Err(_)) => break,
            },
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}
