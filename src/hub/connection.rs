use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::hub::registry::ConnectionId;
use crate::hub::router::Verdict;
use crate::hub::Hub;
use crate::protocol::Envelope;

/// Drive one WebSocket for its whole life: a writer task drains the
/// connection's outbound queue, this task reads frames and routes them.
/// Both halves stop once the connection leaves the registry.
pub async fn serve_socket(socket: WebSocket, hub: Hub) {
    let (sink, mut stream) = socket.split();
    let (outbound, outbound_rx) = mpsc::channel::<Envelope>(hub.outbound_buffer());
    let id = hub.registry().register(outbound).await;
    let closed = hub.registry().closed_signal(id).await;
    tracing::info!("👤 New connection {}", id);

    let writer = tokio::spawn(write_loop(
        id,
        sink,
        outbound_rx,
        closed.clone(),
        hub.write_timeout(),
    ));

    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = stream.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::info!("❌ Read error from {}: {}", id, e);
                break;
            }
        };

        if hub.router().route(id, &text).await == Verdict::Close {
            break;
        }
    }

    // Deregister before exiting so no further fan-out targets this handle.
    hub.router().disconnect(id).await;
    if let Err(e) = writer.await {
        tracing::error!("❌ Writer task for {} failed: {}", id, e);
    }
    // Dropping the stream here releases the socket along with the writer's half.
    tracing::info!("Connection {} closed", id);
}

/// Forward queued envelopes to `sink` until the queue closes, the close
/// signal fires with nothing left queued, or a single write stalls past
/// `write_timeout`. Envelopes queued before the close signal still go out.
pub async fn write_loop<S>(
    id: ConnectionId,
    mut sink: S,
    mut outbound: mpsc::Receiver<Envelope>,
    closed: CancellationToken,
    write_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    loop {
        let envelope = tokio::select! {
            biased;
            next = outbound.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
            _ = closed.cancelled() => break,
        };

        let text = match envelope.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("❌ Failed to encode {}: {}", envelope.kind().tag(), e);
                continue;
            }
        };

        match tokio::time::timeout(write_timeout, sink.send(Message::Text(text))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!("Write to {} failed: {}", id, e);
                return;
            }
            Err(_) => {
                tracing::warn!("⚠️ Write to {} stalled for {:?}, dropping socket", id, write_timeout);
                return;
            }
        }
    }

    if tokio::time::timeout(write_timeout, sink.close()).await.is_err() {
        tracing::debug!("Close handshake with {} timed out", id);
    }
}
