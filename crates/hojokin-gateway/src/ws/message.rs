use hojokin_collab::Outbound;
use hojokin_core::types::{ConnId, UserId};
use hojokin_core::HojokinError;
use hojokin_protocol::{
    frames::{parse_req, ReqFrame, ResFrame},
    handshake::ConnectParams,
    methods::CONNECT,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;
use crate::ws::connection::{ConnState, Session};
use crate::ws::send::{self, WsSink};
use crate::ws::{dispatch, handshake};

/// Process one inbound WS text frame. Returns the new connection state.
pub async fn handle(
    conn_id: &ConnId,
    text: &str,
    state: ConnState,
    tx: &mut WsSink,
    outbound: &Outbound,
    app: &Arc<AppState>,
) -> ConnState {
    let req = match parse_req(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "malformed frame");
            return state;
        }
    };

    match state {
        ConnState::AwaitingConnect => handle_auth(conn_id, req, tx, outbound, app).await,
        ConnState::Authenticated(session) => handle_method(conn_id, req, session, tx, app).await,
        ConnState::Closing => ConnState::Closing,
    }
}

/// Pre-auth: only `connect` method is accepted.
async fn handle_auth(
    conn_id: &ConnId,
    req: ReqFrame,
    tx: &mut WsSink,
    outbound: &Outbound,
    app: &Arc<AppState>,
) -> ConnState {
    if req.method != CONNECT {
        let res = ResFrame::from_error(&req.id, &HojokinError::Protocol("must authenticate first".into()));
        let _ = send::json(tx, &res).await;
        return ConnState::AwaitingConnect;
    }

    let params: ConnectParams = match req.params.and_then(|p| serde_json::from_value(p).ok()) {
        Some(p) => p,
        None => {
            let res = ResFrame::from_error(&req.id, &HojokinError::Protocol("invalid connect params".into()));
            let _ = send::json(tx, &res).await;
            return ConnState::Closing;
        }
    };

    match handshake::verify_auth(&params, app) {
        Ok(user) => {
            let hello = handshake::hello_ok_payload(conn_id, &user, app.hub.lock_ttl_secs());
            if send::json(tx, &ResFrame::ok(&req.id, hello)).await.is_err() {
                return ConnState::Closing;
            }
            // queued notifications go out after hello-ok, straight to the
            // socket and ahead of anything in the outbound channel
            let queued = app
                .hub
                .register(
                    conn_id.clone(),
                    UserId::from(user.id.as_str()),
                    user.display_name(),
                    outbound.clone(),
                )
                .await;
            info!(conn_id = %conn_id, user_id = %user.id, queued = queued.len(), "client authenticated");
            for frame in queued {
                // a dead socket ends the loop on its next read
                if send::text(tx, frame).await.is_err() {
                    break;
                }
            }
            ConnState::Authenticated(Session {
                is_admin: user.is_admin(),
                user_id: user.id,
            })
        }
        Err(reason) => {
            warn!(conn_id = %conn_id, %reason, "auth failed");
            let res = ResFrame::from_error(&req.id, &HojokinError::AuthFailed(reason));
            let _ = send::json(tx, &res).await;
            ConnState::Closing
        }
    }
}

/// Post-auth: dispatch method calls to handlers.
async fn handle_method(
    conn_id: &ConnId,
    req: ReqFrame,
    session: Session,
    tx: &mut WsSink,
    app: &Arc<AppState>,
) -> ConnState {
    let res = dispatch::route(&req, &session, conn_id, app).await;
    if send::json(tx, &res).await.is_err() {
        return ConnState::Closing;
    }
    ConnState::Authenticated(session)
}
