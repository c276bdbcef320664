use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::auth::middleware::{authenticate_token, AuthUser};
use crate::db::repo::Store;
use crate::error::AppError;
use crate::services::events::ServerEvent;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// GET /ws?token=: streams `ServerEvent`s addressed to the caller's
/// account or profile.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let auth_user = match query
        .token
        .as_deref()
        .ok_or_else(AppError::unauthorized)
        .and_then(|token| authenticate_token(token, &state.config))
    {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket auth failed");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, auth_user))
}

/// Who a socket delivers to. Balance events are keyed by profile id, and the
/// profile may be provisioned after the socket connects, so the id is
/// resolved lazily and cached once found.
struct Audience {
    account_id: Uuid,
    profile_id: Option<Uuid>,
}

impl Audience {
    fn new(account_id: Uuid) -> Self {
        Self {
            account_id,
            profile_id: None,
        }
    }

    async fn accepts(&mut self, event: &ServerEvent, store: &dyn Store) -> bool {
        let audience = event.audience();
        if audience == self.account_id || Some(audience) == self.profile_id {
            return true;
        }
        if self.profile_id.is_some() || !matches!(event, ServerEvent::BalanceChanged { .. }) {
            return false;
        }
        match store.find_profile_by_auth(self.account_id).await {
            Ok(profile) => self.profile_id = profile.map(|p| p.id),
            Err(e) => {
                tracing::warn!(account_id = %self.account_id, error = %e, "Profile lookup failed");
                return false;
            }
        }
        Some(audience) == self.profile_id
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, auth_user: AuthUser) {
    let (mut sender, mut receiver) = socket.split();
    let account_id = auth_user.id;
    let mut rx = state.events.subscribe();
    let store = state.store.clone();
    let mut audience = Audience::new(account_id);

    tracing::debug!(account_id = %account_id, "WebSocket connection established");

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(account_id = %account_id, skipped = skipped, "WebSocket subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !audience.accepts(&event, store.as_ref()).await {
                continue;
            }
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode server event");
                    continue;
                }
            };
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(account_id = %account_id, "WebSocket connection closed");
}
