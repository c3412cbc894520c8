// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer WebSocket fan-out.
//!
//! Every connected observer receives the supervisor's event stream as
//! protocol envelopes. Observers talk back through the supervisor only
//! (`intervene`), never to the intervention controller directly.

use crate::protocol::{ClientMessage, Envelope, EnvelopeKind};
use futures_util::{SinkExt, StreamExt};
use ov_adapters::ProcessAdapter;
use ov_core::{iso_ms, Clock, SystemClock, TaskId};
use ov_engine::{PoolEvent, Supervisor};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

fn now() -> String {
    iso_ms(SystemClock.epoch_ms())
}

/// WebSocket observer endpoint bound to a local port.
pub struct Observer<P: ProcessAdapter, C: Clock> {
    listener: TcpListener,
    supervisor: Arc<Supervisor<P, C>>,
}

impl<P: ProcessAdapter, C: Clock> Observer<P, C> {
    /// Bind the observer endpoint. Port 0 picks a free port.
    pub async fn bind(
        supervisor: Arc<Supervisor<P, C>>,
        port: u16,
    ) -> std::io::Result<(Self, SocketAddr)> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "observer channel listening");
        Ok((
            Self {
                listener,
                supervisor,
            },
            addr,
        ))
    }

    /// Accept observer connections until the listener fails.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "observer connected");
                    let supervisor = Arc::clone(&self.supervisor);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, supervisor).await {
                            tracing::debug!(%peer, error = %e, "observer connection ended");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "observer accept failed");
                    return;
                }
            }
        }
    }
}

async fn handle_connection<P: ProcessAdapter, C: Clock>(
    stream: TcpStream,
    supervisor: Arc<Supervisor<P, C>>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws.split();
    let mut events = supervisor.events();

    loop {
        tokio::select! {
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(&supervisor, text.as_str()).await;
                        write.send(Message::Text(reply.to_json().into())).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ping/Pong/Binary — ignore
                    Some(Err(e)) => return Err(e),
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        for envelope in envelopes_for(&event) {
                            write.send(Message::Text(envelope.to_json().into())).await?;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        let envelope = Envelope::new(
                            EnvelopeKind::System,
                            json!({ "lagged": skipped }),
                            now(),
                        );
                        write.send(Message::Text(envelope.to_json().into())).await?;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    Ok(())
}

async fn handle_client_message<P: ProcessAdapter, C: Clock>(
    supervisor: &Supervisor<P, C>,
    text: &str,
) -> Envelope {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            return Envelope::new(
                EnvelopeKind::Error,
                json!({ "error": format!("malformed message: {}", e) }),
                now(),
            )
        }
    };

    match message {
        ClientMessage::Intervene { task_id, prompt } => {
            let id = TaskId::new(task_id.as_str());
            match supervisor.intervene(&id, &prompt).await {
                Ok(()) => Envelope::new(
                    EnvelopeKind::Intervention,
                    json!({ "prompt": prompt }),
                    now(),
                )
                .for_task(task_id),
                Err(e) => Envelope::new(
                    EnvelopeKind::Error,
                    json!({ "error": e.to_string() }),
                    now(),
                )
                .for_task(task_id),
            }
        }
        ClientMessage::Subscribe => {
            Envelope::new(EnvelopeKind::System, json!({ "subscribed": true }), now())
        }
        ClientMessage::Ping => Envelope::new(EnvelopeKind::System, json!({ "pong": true }), now()),
    }
}

/// Map a pool event onto its observer envelopes.
fn envelopes_for(event: &PoolEvent) -> Vec<Envelope> {
    let envelope = match event {
        PoolEvent::TaskStream { task_id, chunk } => Envelope::new(
            EnvelopeKind::Stream,
            json!({ "chunk": chunk }),
            now(),
        )
        .for_task(task_id.as_str()),
        PoolEvent::TaskComplete { result } => {
            let Ok(data) = serde_json::to_value(result) else {
                return Vec::new();
            };
            let update =
                Envelope::new(EnvelopeKind::TaskUpdate, data, now()).for_task(result.id.as_str());
            // The verification report gets its own envelope for observers
            // that only track verdicts
            return match &result.verification {
                Some(report) => match serde_json::to_value(report) {
                    Ok(report) => vec![
                        update,
                        Envelope::new(EnvelopeKind::Verification, report, now())
                            .for_task(result.id.as_str()),
                    ],
                    Err(_) => vec![update],
                },
                None => vec![update],
            };
        }
        PoolEvent::TaskError {
            task_id,
            kind,
            error,
        } => Envelope::new(
            EnvelopeKind::Error,
            json!({ "kind": kind.to_string(), "error": error }),
            now(),
        )
        .for_task(task_id.as_str()),
        PoolEvent::ToolInvocation { task_id, payload } => Envelope::new(
            EnvelopeKind::System,
            json!({ "tool_invocation": payload }),
            now(),
        )
        .for_task(task_id.as_str()),
        PoolEvent::ChildComplete(info) => Envelope::new(
            EnvelopeKind::System,
            json!({
                "child_complete": {
                    "shortId": info.short_id,
                    "durationMs": info.duration_ms,
                    "lines": info.lines,
                    "interventions": info.interventions,
                }
            }),
            now(),
        )
        .for_task(info.task_id.as_str()),
    };
    vec![envelope]
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
