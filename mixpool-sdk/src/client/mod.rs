//! WebSocket client for the operator protocol.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::objects::deposit::{DepositPayload, DepositRecord};
use crate::objects::ws::{ErrorPayload, WsClientMessage, WsServerMessage};

/// Errors produced by the operator WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be serialized or deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The operator rejected the request.
    #[error("operator error {code}: {message}")]
    Operator { code: u16, message: String },

    /// The connection closed before the expected response arrived.
    #[error("connection closed")]
    Closed,
}

impl From<ErrorPayload> for ClientError {
    fn from(e: ErrorPayload) -> Self {
        ClientError::Operator {
            code: e.code,
            message: e.message,
        }
    }
}

/// A connected operator client.
///
/// Request helpers send one frame and then read frames until the matching
/// response arrives; unrelated broadcast frames received in between are
/// buffered and can be drained later with [`next_event`](Self::next_event).
pub struct OperatorClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    buffered: Vec<WsServerMessage>,
}

impl OperatorClient {
    /// Connect to the operator's `/ws` endpoint.
    pub async fn connect(url: &Url) -> Result<Self, ClientError> {
        let (stream, _) = connect_async(url.as_str()).await?;
        Ok(Self {
            stream,
            buffered: Vec::new(),
        })
    }

    /// Send a raw protocol message.
    pub async fn send(&mut self, message: &WsClientMessage) -> Result<(), ClientError> {
        let json = serde_json::to_string(message)?;
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Receive the next server message, draining the buffer first.
    pub async fn next_event(&mut self) -> Result<WsServerMessage, ClientError> {
        if !self.buffered.is_empty() {
            return Ok(self.buffered.remove(0));
        }
        self.recv_frame().await
    }

    /// Register signed deposit metadata.
    pub async fn submit_deposit_metadata(
        &mut self,
        payload: DepositPayload,
    ) -> Result<DepositRecord, ClientError> {
        self.send(&WsClientMessage::SubmitDepositMetadata(payload))
            .await?;
        self.wait_for(|msg| match msg {
            WsServerMessage::SubmitDepositSuccess { deposit } => Some(Ok(deposit)),
            WsServerMessage::SubmitDepositError { error } => Some(Err(error.into())),
            _ => None,
        })
        .await?
    }

    /// Fetch fillable deposits at or above `minimum_amount`.
    pub async fn fetch_fillable_deposits(
        &mut self,
        minimum_amount: u128,
    ) -> Result<Vec<DepositRecord>, ClientError> {
        self.send(&WsClientMessage::FetchFillableDeposits { minimum_amount })
            .await?;
        self.wait_for(|msg| match msg {
            WsServerMessage::FillableDeposits { deposits } => Some(deposits),
            _ => None,
        })
        .await
    }

    /// Fetch the participation threshold.
    pub async fn get_threshold(&mut self) -> Result<usize, ClientError> {
        self.send(&WsClientMessage::GetThreshold).await?;
        self.wait_for(|msg| match msg {
            WsServerMessage::ThresholdInfo { threshold } => Some(threshold),
            _ => None,
        })
        .await
    }

    /// Fetch the current quorum.
    pub async fn get_quorum(&mut self) -> Result<usize, ClientError> {
        self.send(&WsClientMessage::GetQuorum).await?;
        self.wait_for(|msg| match msg {
            WsServerMessage::QuorumChanged { quorum } => Some(quorum),
            _ => None,
        })
        .await
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }

    /// Read frames until `matcher` extracts a response, buffering
    /// broadcasts seen along the way.
    async fn wait_for<T>(
        &mut self,
        matcher: impl Fn(WsServerMessage) -> Option<T>,
    ) -> Result<T, ClientError> {
        // Drain buffered frames first in case the response already arrived.
        let mut i = 0;
        while i < self.buffered.len() {
            if let Some(out) = matcher(self.buffered[i].clone()) {
                self.buffered.remove(i);
                return Ok(out);
            }
            i += 1;
        }
        loop {
            let msg = self.recv_frame().await?;
            match matcher(msg.clone()) {
                Some(out) => return Ok(out),
                None => self.buffered.push(msg),
            }
        }
    }

    async fn recv_frame(&mut self) -> Result<WsServerMessage, ClientError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(serde_json::from_str(text.as_str())?);
                }
                Some(Ok(Message::Close(_))) | None => return Err(ClientError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}
