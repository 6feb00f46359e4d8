//! WebSocket transport
//!
//! This file implements the server side of the relay. Responsibilities:
//! - Accept TCP connections and perform the WebSocket handshake
//! - Route the request path to a topic, refusing unknown paths with 404 and
//!   connections beyond `max_connections` with 503
//! - Drive one `Connection` per socket from a reader loop, with a writer
//!   task draining the connection's outbound queue into the socket
//!
//! Control frames (ping/pong/close) are answered by tungstenite and never
//! reach the broker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::Message;
use crate::client::{ConnectionHandle, OutboundQueue};
use crate::config::Settings;
use crate::transport::lifecycle::{Connection, ConnectionState};
use crate::transport::router::Router;
use crate::utils::RelayResult;

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// Bind the listener for `addr` (`host:port`).
pub async fn bind(addr: &str) -> RelayResult<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Bind to the configured address and serve until the task is dropped.
pub async fn run(router: Arc<Router>, settings: Settings) -> RelayResult<()> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = bind(&addr).await?;
    let local = listener.local_addr()?;

    let topics = router.registry().topics();
    info!("{} pubsub topic(s) listening on ws://{local}", topics.len());
    for topic in &topics {
        info!("ws://{local}{topic}");
    }
    if router.is_dynamic() {
        info!("dynamic topics enabled: any absolute path is served");
    }

    serve(listener, router, settings).await;
    Ok(())
}

/// Accept connections on `listener` forever.
pub async fn serve(listener: TcpListener, router: Arc<Router>, settings: Settings) {
    let settings = Arc::new(settings);
    let live = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };

        let router = router.clone();
        let settings = settings.clone();
        let live = live.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, router, settings, live).await;
        });
    }
}

/// Counts a connection against `max_connections` until dropped.
struct ConnectionSlot {
    live: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(live: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        if live.fetch_add(1, Ordering::AcqRel) >= limit {
            live.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(Self { live: live.clone() })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    settings: Arc<Settings>,
    live: Arc<AtomicUsize>,
) {
    let slot = ConnectionSlot::acquire(&live, settings.server.max_connections);
    let mut topic = None;

    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if slot.is_none() {
            return Err(reject(StatusCode::SERVICE_UNAVAILABLE, "too many connections"));
        }
        match router.route(request.uri().path()) {
            Some(key) => {
                topic = Some(key);
                Ok(response)
            }
            None => Err(reject(StatusCode::NOT_FOUND, "no such topic")),
        }
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, "WebSocket handshake refused: {e}");
            return;
        }
    };
    let Some(topic) = topic else {
        return;
    };

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let (handle, queue) = ConnectionHandle::new(settings.relay.queue_capacity, Some(peer));
    let mut connection = Connection::new(router.registry().clone(), topic, handle.clone());

    if let Err(e) = connection.open() {
        warn!(%peer, topic = %connection.topic(), "could not attach: {e}");
        return;
    }

    let mut writer = tokio::spawn(write_loop(ws_sender, queue, handle.clone()));

    loop {
        let frame = tokio::select! {
            frame = ws_receiver.next() => frame,
            _ = handle.closed() => break,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                debug!(connection_id = %connection.id(), "read failed: {e}");
                break;
            }
            None => break,
        };
        if frame.is_close() {
            break;
        }
        let Some(message) = Message::from_ws(frame) else {
            continue;
        };

        if let Err(e) = connection.on_message(message) {
            warn!(connection_id = %connection.id(), "message dropped: {e}");
            if connection.state() == ConnectionState::Closed {
                break;
            }
        }
    }

    connection.on_close();

    if tokio::time::timeout(settings.relay.send_timeout(), &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
    drop(slot);
}

async fn write_loop(mut sink: WsSink, mut queue: OutboundQueue, handle: Arc<ConnectionHandle>) {
    loop {
        tokio::select! {
            next = queue.recv() => match next {
                Some(message) => {
                    if let Err(e) = sink.send(message.into()).await {
                        debug!(connection_id = %handle.id(), "write failed: {e}");
                        break;
                    }
                }
                None => break,
            },
            _ = handle.closed() => break,
        }
    }

    handle.close();
    let _ = sink.close().await;
}
