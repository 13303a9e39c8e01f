//! Loopback RPC listener.
//!
//! One tokio task per connection. Within a connection, calls run one at a
//! time and responses are written in request order. A peer that half-closes
//! still gets answers to every call it sent. If the connection fails while a
//! call is in flight, the call future is dropped, which aborts its outbound
//! HTTP request.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use orka_plugin_protocol::{CallRequest, CallResponse, MAX_FRAME_BYTES};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::Dispatcher;

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Pipelined frames buffered per connection while a call runs. Once full, the
/// socket is not read again until the call finishes.
const MAX_QUEUED_FRAMES: usize = 16;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Bind the loopback listener and serve until the process is stopped.
pub async fn run(config: &Config) -> Result<(), ServerError> {
    let dispatcher = Arc::new(Dispatcher::from_config(config)?);
    let listener = bind(config).await?;
    serve(listener, dispatcher).await;
    Ok(())
}

pub async fn bind(config: &Config) -> Result<TcpListener, ServerError> {
    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, "llm plugin listening");
    Ok(listener)
}

/// Accept connections forever.
pub async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, dispatcher).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, dispatcher: Arc<Dispatcher>) {
    debug!(peer = %peer, "Connection opened");
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));
    // Frames read while a call was running; handled in order afterwards.
    let mut queued: VecDeque<String> = VecDeque::new();
    // Cleared once the peer half-closes; queued frames are still answered.
    let mut read_open = true;

    loop {
        let line = match queued.pop_front() {
            Some(line) => line,
            None if !read_open => break,
            None => match framed.next().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    log_frame_error(peer, &e);
                    break;
                }
                None => break,
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<CallRequest>(&line) {
            Ok(request) => {
                let call = dispatcher.call(request);
                tokio::pin!(call);

                // Keep reading while the call runs so a reset is noticed.
                // A finished call always wins over socket activity.
                let response = loop {
                    tokio::select! {
                        biased;
                        response = &mut call => break Some(response),
                        next = framed.next(), if read_open && queued.len() < MAX_QUEUED_FRAMES => {
                            match next {
                                Some(Ok(line)) => queued.push_back(line),
                                Some(Err(e)) => {
                                    log_frame_error(peer, &e);
                                    break None;
                                }
                                None => {
                                    debug!(peer = %peer, "Peer half-closed, finishing in-flight call");
                                    read_open = false;
                                }
                            }
                        }
                    }
                };
                let Some(response) = response else {
                    debug!(peer = %peer, "Connection failed mid-call, call cancelled");
                    break;
                };
                response
            }
            Err(e) => {
                debug!(peer = %peer, error = %e, "Undecodable request frame");
                CallResponse::failure(format!("invalid request: {e}"))
            }
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to encode response");
                break;
            }
        };
        if let Err(e) = framed.send(encoded).await {
            log_frame_error(peer, &e);
            break;
        }
    }

    debug!(peer = %peer, "Connection closed");
}

fn log_frame_error(peer: SocketAddr, error: &LinesCodecError) {
    match error {
        LinesCodecError::MaxLineLengthExceeded => {
            warn!(peer = %peer, max = MAX_FRAME_BYTES, "Frame too long, closing connection");
        }
        LinesCodecError::Io(e) => {
            warn!(peer = %peer, error = %e, "Connection error");
        }
    }
}
