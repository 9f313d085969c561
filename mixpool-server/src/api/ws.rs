//! WebSocket session handling.
//!
//! Each connected client gets one task that:
//!
//! 1. Sends the threshold, the current quorum, and (once bootstrapped)
//!    the encryption key as the opening frames.
//! 2. Relays broadcast frames from the engine's fan-out channel.
//! 3. Dispatches [`WsClientMessage`] requests against the application
//!    state and answers on the same socket.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use mixpool_sdk::objects::deposit::DepositRecord;
use mixpool_sdk::objects::ws::{
    ErrorCode, ErrorPayload, OperatorConfigInfo, WsClientMessage, WsCloseCode, WsServerMessage,
};
use mixpool_core::registry::RegistryError;
use tracing::{debug, error, warn};

use crate::state::AppState;

/// `GET /ws` — the operator protocol stream.
pub async fn operator_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

/// Background task that drives a single WebSocket connection.
async fn handle_session(mut socket: WebSocket, state: AppState) {
    // Subscribe to the fan-out channel *before* reading current state so
    // any transition that races with the snapshot still reaches the
    // client.
    let mut events_rx = state.events_tx.subscribe();

    if send_opening_frames(&mut socket, &state).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = events_rx.recv() => {
                match result {
                    Ok(message) => {
                        if send_json(&mut socket, &message).await.is_err() {
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        // The client fell behind; resync the quorum rather
                        // than replaying the missed frames.
                        warn!(skipped, "WS: broadcast receiver lagged, resyncing quorum");
                        if let Some(message) = current_quorum_frame(&state).await {
                            if send_json(&mut socket, &message).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsClientMessage>(text.as_str()) {
                            Ok(request) => {
                                let response = dispatch(&state, request).await;
                                if send_json(&mut socket, &response).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                debug!(error = %e, "WS: unparseable client frame");
                                let reply = WsServerMessage::Error {
                                    code: WsCloseCode::BAD_MESSAGE,
                                    reason: "unrecognized message".into(),
                                };
                                if send_json(&mut socket, &reply).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) => {
                        return;
                    }
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

/// Threshold, current quorum, and (when cached) the encryption key.
async fn send_opening_frames(socket: &mut WebSocket, state: &AppState) -> Result<(), ()> {
    let threshold = state.config.read().await.threshold;
    send_json(socket, &WsServerMessage::ThresholdInfo { threshold }).await?;

    if let Some(message) = current_quorum_frame(state).await {
        send_json(socket, &message).await?;
    }

    match state.store.pub_key_data().await {
        Ok(Some(pub_key_data)) => {
            send_json(
                socket,
                &WsServerMessage::PubKeyReady {
                    pub_key_data: pub_key_data.into(),
                },
            )
            .await?;
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "WS: unable to read cached encryption key");
        }
    }
    Ok(())
}

async fn current_quorum_frame(state: &AppState) -> Option<WsServerMessage> {
    let minimum_amount = state.config.read().await.minimum_amount;
    match state.registry.compute_quorum(minimum_amount).await {
        Ok(quorum) => Some(WsServerMessage::QuorumChanged { quorum }),
        Err(e) => {
            error!(error = %e, "WS: unable to compute quorum");
            None
        }
    }
}

/// Answer one client request.
async fn dispatch(state: &AppState, request: WsClientMessage) -> WsServerMessage {
    match request {
        WsClientMessage::Ping => WsServerMessage::Pong,

        WsClientMessage::GetThreshold => WsServerMessage::ThresholdInfo {
            threshold: state.config.read().await.threshold,
        },

        WsClientMessage::GetQuorum => {
            let minimum_amount = state.config.read().await.minimum_amount;
            match state.registry.compute_quorum(minimum_amount).await {
                Ok(quorum) => WsServerMessage::QuorumChanged { quorum },
                Err(e) => internal_error(&e),
            }
        }

        WsClientMessage::FetchFillableDeposits { minimum_amount } => {
            match state.registry.fetch_fillable_deposits(minimum_amount).await {
                Ok(deposits) => WsServerMessage::FillableDeposits {
                    deposits: deposits.iter().map(DepositRecord::from).collect(),
                },
                Err(e) => internal_error(&e),
            }
        }

        WsClientMessage::SubmitDepositMetadata(payload) => {
            match state.registry.register_deposit(payload).await {
                Ok(deposit) => WsServerMessage::SubmitDepositSuccess {
                    deposit: DepositRecord::from(&deposit),
                },
                Err(RegistryError::InvalidSignature(_)) => WsServerMessage::SubmitDepositError {
                    error: ErrorPayload {
                        code: ErrorCode::INVALID_SIGNATURE,
                        message: "invalid signature".into(),
                    },
                },
                Err(e) => {
                    error!(error = %e, "Deposit registration failed");
                    WsServerMessage::SubmitDepositError {
                        error: ErrorPayload {
                            code: ErrorCode::INTERNAL,
                            message: "internal error".into(),
                        },
                    }
                }
            }
        }

        WsClientMessage::FetchConfig => {
            let config = state.config.read().await;
            let pub_key_data = match state.store.pub_key_data().await {
                Ok(data) => data.map(Into::into),
                Err(e) => {
                    error!(error = %e, "Unable to read cached encryption key");
                    None
                }
            };
            WsServerMessage::ConfigInfo {
                config: OperatorConfigInfo {
                    ledger_contract: state.contracts.ledger_contract.clone(),
                    compute_contract: state.contracts.compute_contract.clone(),
                    threshold: config.threshold,
                    minimum_amount: config.minimum_amount,
                    deal_interval_blocks: config.deal_interval_blocks,
                    pub_key_data,
                },
            }
        }

        WsClientMessage::RefreshCountdown => match state.scheduler.refresh_countdown().await {
            Ok(countdown) => WsServerMessage::CountdownTick {
                blocks_remaining: countdown.max(0) as u64,
            },
            Err(e) => {
                error!(error = %e, "Countdown refresh failed");
                WsServerMessage::Error {
                    code: WsCloseCode::INTERNAL_ERROR,
                    reason: "ledger unreachable".into(),
                }
            }
        },
    }
}

fn internal_error(error: &impl std::fmt::Display) -> WsServerMessage {
    error!(error = %error, "WS: request failed");
    WsServerMessage::Error {
        code: WsCloseCode::INTERNAL_ERROR,
        reason: "internal error".into(),
    }
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
