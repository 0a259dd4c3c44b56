use std::sync::Arc;

use chrono::Utc;
use hojokin_applications::{ApplicationError, Caller};
use hojokin_collab::CollabError;
use hojokin_core::types::{ApplicationId, ConnId};
use hojokin_core::HojokinError;
use hojokin_protocol::{
    frames::{ReqFrame, ResFrame},
    methods::*,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::app::AppState;
use crate::error::ApiError;
use crate::ws::connection::Session;

/// Error half of a method call, already reduced to its wire form.
struct MethodError {
    code: &'static str,
    message: String,
}

impl From<HojokinError> for MethodError {
    fn from(e: HojokinError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<CollabError> for MethodError {
    fn from(e: CollabError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<ApplicationError> for MethodError {
    fn from(e: ApplicationError) -> Self {
        let api = ApiError::from(e);
        Self {
            code: api.code,
            message: api.message,
        }
    }
}

type MethodResult = Result<Value, MethodError>;

/// Route a WS method call to the correct handler.
pub async fn route(req: &ReqFrame, session: &Session, conn: &ConnId, app: &Arc<AppState>) -> ResFrame {
    debug!(conn_id = %conn, method = %req.method, "ws method");
    let result = match req.method.as_str() {
        PING => Ok(json!({ "pong": true, "ts": Utc::now().timestamp_millis() })),

        COLLAB_JOIN => join(req, session, conn, app).await,
        COLLAB_LEAVE => leave(req, conn, app).await,
        COLLAB_EDIT => edit(req, conn, app),
        COLLAB_CURSOR => cursor(req, conn, app),
        COLLAB_LOCK => lock(req, conn, app).await,
        COLLAB_UNLOCK => unlock(req, conn, app).await,
        COLLAB_PRESENCE => presence(req, session, app),

        CONNECT => Err(HojokinError::Protocol("already authenticated".to_string()).into()),

        other => {
            return ResFrame::from_error(
                &req.id,
                &HojokinError::MethodNotFound {
                    method: other.to_string(),
                },
            )
        }
    };

    match result {
        Ok(payload) => ResFrame::ok(&req.id, payload),
        Err(e) => ResFrame::err(&req.id, e.code, &e.message),
    }
}

fn required<'a>(req: &'a ReqFrame, name: &str) -> Result<&'a str, MethodError> {
    req.str_param(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HojokinError::InvalidParams(format!("missing '{name}'")).into())
}

fn application_param(req: &ReqFrame) -> Result<ApplicationId, MethodError> {
    required(req, "application_id").map(ApplicationId::from)
}

/// Rooms are keyed by application, so reading the application decides
/// who may enter: the owner or an admin.
fn ensure_access(app: &AppState, session: &Session, application: &ApplicationId) -> Result<(), MethodError> {
    let caller = Caller::new(&session.user_id, session.is_admin);
    app.applications.get(caller, application.as_str())?;
    Ok(())
}

fn to_value(v: impl serde::Serialize) -> MethodResult {
    serde_json::to_value(v).map_err(|e| HojokinError::from(e).into())
}

async fn join(req: &ReqFrame, session: &Session, conn: &ConnId, app: &AppState) -> MethodResult {
    let application = application_param(req)?;
    ensure_access(app, session, &application)?;
    let snapshot = app.hub.join(conn, &application).await?;
    to_value(snapshot)
}

async fn leave(req: &ReqFrame, conn: &ConnId, app: &AppState) -> MethodResult {
    let application = application_param(req)?;
    app.hub.leave(conn, &application).await?;
    Ok(json!({ "application_id": application }))
}

fn edit(req: &ReqFrame, conn: &ConnId, app: &AppState) -> MethodResult {
    let application = application_param(req)?;
    let section = required(req, "section")?;
    // empty content is a legitimate edit (section cleared)
    let content = req
        .str_param("content")
        .ok_or_else(|| HojokinError::InvalidParams("missing 'content'".to_string()))?;
    app.hub.edit(conn, &application, section, content)?;
    Ok(json!({ "application_id": application, "section": section }))
}

fn cursor(req: &ReqFrame, conn: &ConnId, app: &AppState) -> MethodResult {
    let application = application_param(req)?;
    let section = required(req, "section")?;
    let position = req
        .params
        .as_ref()
        .and_then(|p| p.get("position"))
        .cloned()
        .unwrap_or(Value::Null);
    app.hub.cursor(conn, &application, section, position)?;
    Ok(json!({ "application_id": application, "section": section }))
}

async fn lock(req: &ReqFrame, conn: &ConnId, app: &AppState) -> MethodResult {
    let application = application_param(req)?;
    let section = required(req, "section")?;
    let lock = app.hub.lock(conn, &application, section, Utc::now()).await?;
    to_value(lock)
}

async fn unlock(req: &ReqFrame, conn: &ConnId, app: &AppState) -> MethodResult {
    let application = application_param(req)?;
    let section = required(req, "section")?;
    app.hub.unlock(conn, &application, section).await?;
    Ok(json!({ "application_id": application, "section": section, "released": true }))
}

fn presence(req: &ReqFrame, session: &Session, app: &AppState) -> MethodResult {
    let application = application_param(req)?;
    ensure_access(app, session, &application)?;
    Ok(json!({
        "application_id": application,
        "presence": app.hub.presence(&application),
        "locks": app.hub.locks(&application),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_app, TestApp};
    use hojokin_core::types::UserId;
    use tokio::sync::mpsc;

    fn req(method: &str, params: Value) -> ReqFrame {
        ReqFrame {
            frame_type: "req".into(),
            id: "r1".into(),
            method: method.into(),
            params: Some(params),
        }
    }

    async fn connect(app: &TestApp, user_id: &str) -> (ConnId, Session, mpsc::Receiver<String>) {
        let conn = ConnId::new();
        let (tx, rx) = mpsc::channel(16);
        app.state
            .hub
            .register(conn.clone(), UserId::from(user_id), "テスト", tx)
            .await;
        let session = Session {
            user_id: user_id.to_string(),
            is_admin: false,
        };
        (conn, session, rx)
    }

    fn error_code(res: &ResFrame) -> &str {
        assert!(!res.ok);
        res.error.as_ref().map(|e| e.code.as_str()).unwrap_or_default()
    }

    #[tokio::test]
    async fn join_requires_ownership() {
        let app = test_app("x");
        let (owner_token, owner_id) = app.register("owner@example.jp").await;
        let (_, other_id) = app.register("other@example.jp").await;
        let application = app.create_application(&owner_token).await;

        let (conn, session, _rx) = connect(&app, &other_id).await;
        let res = route(&req(COLLAB_JOIN, json!({ "application_id": application })), &session, &conn, &app.state).await;
        assert_eq!(error_code(&res), "NOT_FOUND");

        let (conn, session, _rx) = connect(&app, &owner_id).await;
        let res = route(&req(COLLAB_JOIN, json!({ "application_id": application })), &session, &conn, &app.state).await;
        assert!(res.ok);
        let payload = res.payload.unwrap();
        assert_eq!(payload["presence"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn locked_section_refuses_other_connections() {
        let app = test_app("x");
        let (token, owner_id) = app.register("owner@example.jp").await;
        let application = app.create_application(&token).await;
        let target = json!({ "application_id": application, "section": "sales_plan" });

        let (a, session_a, _rx_a) = connect(&app, &owner_id).await;
        let (b, session_b, mut rx_b) = connect(&app, &owner_id).await;
        for (conn, session) in [(&a, &session_a), (&b, &session_b)] {
            let res = route(&req(COLLAB_JOIN, json!({ "application_id": application })), session, conn, &app.state).await;
            assert!(res.ok);
        }

        let res = route(&req(COLLAB_LOCK, target.clone()), &session_a, &a, &app.state).await;
        assert!(res.ok);
        assert_eq!(res.payload.unwrap()["section"], "sales_plan");

        let mut edit = target.clone();
        edit["content"] = json!("別の人の編集");
        let res = route(&req(COLLAB_EDIT, edit.clone()), &session_b, &b, &app.state).await;
        assert_eq!(error_code(&res), "SECTION_LOCKED");

        let res = route(&req(COLLAB_UNLOCK, target.clone()), &session_b, &b, &app.state).await;
        assert_eq!(error_code(&res), "NOT_LOCK_HOLDER");

        // the holder's edit reaches the other connection
        while rx_b.try_recv().is_ok() {}
        let res = route(&req(COLLAB_EDIT, edit), &session_a, &a, &app.state).await;
        assert!(res.ok);
        let frame: Value = serde_json::from_str(&rx_b.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "collab.edit");
        assert_eq!(frame["payload"]["content"], "別の人の編集");
    }

    #[tokio::test]
    async fn protocol_errors() {
        let app = test_app("x");
        let (_, user_id) = app.register("owner@example.jp").await;
        let (conn, session, _rx) = connect(&app, &user_id).await;

        let res = route(&req(PING, json!({})), &session, &conn, &app.state).await;
        assert!(res.ok);

        let res = route(&req("chat.send", json!({})), &session, &conn, &app.state).await;
        assert_eq!(error_code(&res), "METHOD_NOT_FOUND");

        let res = route(&req(COLLAB_LOCK, json!({ "section": "x" })), &session, &conn, &app.state).await;
        assert_eq!(error_code(&res), "INVALID_PARAMS");

        let res = route(&req(CONNECT, json!({})), &session, &conn, &app.state).await;
        assert_eq!(error_code(&res), "PROTOCOL_ERROR");
    }
}
