//! Minimal client for the plugin wire protocol.

use futures::{SinkExt, StreamExt};
use orka_plugin_protocol::{CallRequest, CallResponse, MAX_FRAME_BYTES};
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Codec(#[from] LinesCodecError),

    #[error("invalid frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("connection closed before a response arrived")]
    Closed,
}

/// One connection to a plugin. Calls on it are sequential.
pub struct RpcClient {
    framed: Framed<TcpStream, LinesCodec>,
}

impl RpcClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_BYTES)),
        })
    }

    /// Send one request and wait for its response.
    pub async fn call(&mut self, request: &CallRequest) -> Result<CallResponse, ClientError> {
        self.framed.send(serde_json::to_string(request)?).await?;
        let line = self.framed.next().await.ok_or(ClientError::Closed)??;
        Ok(serde_json::from_str(&line)?)
    }

    /// Send a raw line, bypassing request encoding.
    pub async fn call_raw(&mut self, line: &str) -> Result<CallResponse, ClientError> {
        self.framed.send(line).await?;
        let line = self.framed.next().await.ok_or(ClientError::Closed)??;
        Ok(serde_json::from_str(&line)?)
    }
}
