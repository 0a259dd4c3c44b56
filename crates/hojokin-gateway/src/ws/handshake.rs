use hojokin_core::config::{HEARTBEAT_INTERVAL_SECS, MAX_PAYLOAD_BYTES, PROTOCOL_VERSION};
use hojokin_core::types::ConnId;
use hojokin_protocol::{
    frames::EventFrame,
    handshake::{ClientPolicy, ConnectChallenge, ConnectParams, HelloOk, ServerInfo, SessionUser},
    methods::events,
};
use hojokin_users::User;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::resolve_token;

/// Random nonce for the connect challenge.
pub fn make_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The `connect.challenge` event that opens every WS session.
pub fn challenge_event(nonce: &str) -> String {
    EventFrame::new(
        events::CONNECT_CHALLENGE,
        ConnectChallenge {
            nonce: nonce.to_string(),
        },
    )
    .encode()
}

/// Verify the bearer token carried in `connect` params.
pub fn verify_auth(params: &ConnectParams, app: &AppState) -> Result<User, String> {
    resolve_token(app, params.auth.token.trim()).map_err(|e| e.message)
}

/// Build the `hello-ok` response payload after successful authentication.
pub fn hello_ok_payload(conn_id: &ConnId, user: &User, lock_ttl_secs: u64) -> HelloOk {
    HelloOk {
        protocol: PROTOCOL_VERSION,
        server: ServerInfo {
            name: "hojokin".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        conn_id: conn_id.to_string(),
        user: SessionUser {
            id: user.id.clone(),
            display_name: user.display_name().to_string(),
            role: user.role.to_string(),
        },
        policy: ClientPolicy {
            max_message_size: MAX_PAYLOAD_BYTES,
            heartbeat_secs: HEARTBEAT_INTERVAL_SECS,
            lock_ttl_secs,
        },
    }
}
