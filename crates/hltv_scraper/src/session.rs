//! Bypass service (FlareSolverr-style) control API and the session token.
//!
//! Protocol: `POST {base}/v1` with a JSON command. Replies always carry
//! `status` + `message`; `request.get` replies wrap the page in
//! `solution.response`.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub const CMD_SESSION_CREATE: &str = "sessions.create";
pub const CMD_SESSION_DESTROY: &str = "sessions.destroy";
pub const CMD_REQUEST_GET: &str = "request.get";

/// Process-wide bypass session token. Written on start/stop only, read by
/// every proxied fetch.
#[derive(Debug, Default)]
pub struct SessionHandle {
    token: RwLock<Option<String>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn set(&self, token: String) {
        *self.token.write().await = Some(token);
    }

    pub async fn take(&self) -> Option<String> {
        self.token.write().await.take()
    }
}

#[derive(Debug, Serialize)]
pub struct BypassCommand<'a> {
    pub cmd: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<&'a str>,
    #[serde(rename = "maxTimeout", skip_serializing_if = "Option::is_none")]
    pub max_timeout: Option<u64>,
}

impl<'a> BypassCommand<'a> {
    pub fn create_session() -> Self {
        Self {
            cmd: CMD_SESSION_CREATE,
            url: None,
            session: None,
            max_timeout: None,
        }
    }

    pub fn destroy_session(session: &'a str) -> Self {
        Self {
            cmd: CMD_SESSION_DESTROY,
            url: None,
            session: Some(session),
            max_timeout: None,
        }
    }

    pub fn get(url: &'a str, session: Option<&'a str>, max_timeout_ms: u64) -> Self {
        Self {
            cmd: CMD_REQUEST_GET,
            url: Some(url),
            session,
            max_timeout: Some(max_timeout_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BypassResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub solution: Option<BypassSolution>,
}

impl BypassResponse {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

#[derive(Debug, Deserialize)]
pub struct BypassSolution {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub response: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_command_omits_missing_session() {
        let cmd = BypassCommand::get("https://www.hltv.org/team/1/x", None, 60_000);
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            v,
            json!({"cmd": "request.get", "url": "https://www.hltv.org/team/1/x", "maxTimeout": 60000})
        );
    }

    #[test]
    fn get_command_carries_session() {
        let cmd = BypassCommand::get("u", Some("s-1"), 60_000);
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["session"], "s-1");
    }

    #[test]
    fn session_commands_shape() {
        let v = serde_json::to_value(BypassCommand::create_session()).unwrap();
        assert_eq!(v, json!({"cmd": "sessions.create"}));
        let v = serde_json::to_value(BypassCommand::destroy_session("abc")).unwrap();
        assert_eq!(v, json!({"cmd": "sessions.destroy", "session": "abc"}));
    }

    #[test]
    fn parses_solution_envelope() {
        let raw = r#"{"status":"ok","message":"Challenge not detected!",
            "solution":{"url":"https://www.hltv.org/team/1/x","status":200,"response":"<html></html>"},
            "startTimestamp":1,"endTimestamp":2,"version":"3.3.21"}"#;
        let resp: BypassResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.is_ok());
        let solution = resp.solution.unwrap();
        assert_eq!(solution.response.as_deref(), Some("<html></html>"));
        assert_eq!(solution.status, Some(200));
    }

    #[test]
    fn parses_error_envelope() {
        let raw = r#"{"status":"error","message":"Error: Timeout after 60.0 seconds."}"#;
        let resp: BypassResponse = serde_json::from_str(raw).unwrap();
        assert!(!resp.is_ok());
        assert!(resp.solution.is_none());
        assert_eq!(resp.message, "Error: Timeout after 60.0 seconds.");
    }

    #[tokio::test]
    async fn handle_holds_at_most_one_token() {
        let handle = SessionHandle::new();
        assert!(handle.current().await.is_none());
        handle.set("one".into()).await;
        handle.set("two".into()).await;
        assert_eq!(handle.current().await.as_deref(), Some("two"));
        assert_eq!(handle.take().await.as_deref(), Some("two"));
        assert!(handle.current().await.is_none());
    }
}
