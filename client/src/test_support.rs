//! In-memory backend used by unit tests.
//!
//! [`FakeBackend`] implements [`Transport`] and behaves like the token
//! endpoints of the real backend (login, refresh with revocable tokens,
//! bearer checks on every other path) while the remaining routes are
//! scripted per test. Every request is recorded for later assertions.

use crate::api::client::REFRESH_PATH;
use crate::api::transport::{HttpRequest, HttpResponse, Transport};
use crate::auth::service::LOGIN_PATH;
use crate::errors::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const BASE_URL: &str = "http://helpdesk.test";

#[derive(Clone)]
enum Reply {
    Response(HttpResponse),
    TransportFailure,
}

#[derive(Default)]
struct Route {
    once: VecDeque<Reply>,
    persistent: Option<Reply>,
    delay: Option<Duration>,
}

#[derive(Default)]
struct BackendState {
    valid_access: HashSet<String>,
    valid_refresh: HashSet<String>,
    users: HashMap<String, String>,
    issued: u32,
    reject_all_access: bool,
    routes: HashMap<(Method, String), Route>,
    requests: Vec<HttpRequest>,
}

impl BackendState {
    fn peek_reply(&self, key: &(Method, String)) -> Option<&Reply> {
        let route = self.routes.get(key)?;
        route.once.front().or(route.persistent.as_ref())
    }

    fn take_reply(&mut self, key: &(Method, String)) -> Option<Reply> {
        let route = self.routes.get_mut(key)?;
        route.once.pop_front().or_else(|| route.persistent.clone())
    }

    fn issue(&mut self, prefix: &str) -> String {
        self.issued += 1;
        format!("{}-{}", prefix, self.issued)
    }

    fn refresh(&mut self, request: &HttpRequest) -> HttpResponse {
        let presented = request
            .body
            .as_ref()
            .and_then(|body| body.get("refresh"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if !self.valid_refresh.contains(&presented) {
            return json_response(
                401,
                json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
            );
        }

        let access = self.issue("access");
        self.valid_access.insert(access.clone());
        json_response(200, json!({ "access": access }))
    }

    fn login(&mut self, request: &HttpRequest) -> HttpResponse {
        let field = |name: &str| {
            request
                .body
                .as_ref()
                .and_then(|body| body.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let (username, password) = (field("username"), field("password"));

        if self.users.get(&username) != Some(&password) {
            return json_response(
                401,
                json!({"detail": "No active account found with the given credentials"}),
            );
        }

        let access = self.issue("access");
        let refresh = self.issue("refresh");
        self.valid_access.insert(access.clone());
        self.valid_refresh.insert(refresh.clone());
        json_response(200, json!({ "access": access, "refresh": refresh }))
    }
}

fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse::new(status, body.to_string())
}

pub(crate) struct FakeBackend {
    state: Mutex<BackendState>,
    refresh_latency: Duration,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BackendState::default()),
            refresh_latency: Duration::ZERO,
        }
    }

    /// Holds every refresh call open for `latency` so concurrent 401s can
    /// pile up behind it.
    pub fn with_refresh_latency(mut self, latency: Duration) -> Self {
        self.refresh_latency = latency;
        self
    }

    pub fn grant(&self, access: &str, refresh: &str) {
        let mut state = self.state.lock().unwrap();
        state.valid_access.insert(access.to_string());
        state.valid_refresh.insert(refresh.to_string());
    }

    pub fn grant_refresh(&self, refresh: &str) {
        self.state
            .lock()
            .unwrap()
            .valid_refresh
            .insert(refresh.to_string());
    }

    /// Invalidates every access token issued so far.
    pub fn expire_access_tokens(&self) {
        self.state.lock().unwrap().valid_access.clear();
    }

    pub fn add_user(&self, username: &str, password: &str) {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(username.to_string(), password.to_string());
    }

    pub fn reject_all_access(&self, reject: bool) {
        self.state.lock().unwrap().reject_all_access = reject;
    }

    fn route(&self, method: Method, path: &str, apply: impl FnOnce(&mut Route)) {
        let mut state = self.state.lock().unwrap();
        apply(state.routes.entry((method, path.to_string())).or_default());
    }

    /// Answers every request to `path` with `status` and `body`.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        let reply = Reply::Response(json_response(status, body));
        self.route(method, path, |route| route.persistent = Some(reply));
    }

    pub fn respond_raw(&self, method: Method, path: &str, status: u16, body: &str) {
        let reply = Reply::Response(HttpResponse::new(status, body));
        self.route(method, path, |route| route.persistent = Some(reply));
    }

    /// Answers the next request to `path` only, ahead of any persistent reply.
    pub fn respond_once(&self, method: Method, path: &str, status: u16, body: Value) {
        let reply = Reply::Response(json_response(status, body));
        self.route(method, path, |route| route.once.push_back(reply));
    }

    pub fn fail_transport(&self, method: Method, path: &str) {
        self.route(method, path, |route| {
            route.persistent = Some(Reply::TransportFailure)
        });
    }

    pub fn delay(&self, method: Method, path: &str, delay: Duration) {
        self.route(method, path, |route| route.delay = Some(delay));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        let url = format!("{}{}", BASE_URL, path);
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }

    /// Body of the most recent request to `path`.
    pub fn last_body(&self, method: Method, path: &str) -> Option<Value> {
        let url = format!("{}{}", BASE_URL, path);
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .rev()
            .find(|r| r.method == method && r.url == url)
            .and_then(|r| r.body.clone())
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .to_string();
        let key = (request.method.clone(), path.clone());

        let delay = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            state.routes.get(&key).and_then(|route| route.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if path == REFRESH_PATH && !self.refresh_latency.is_zero() {
            tokio::time::sleep(self.refresh_latency).await;
        }

        let mut state = self.state.lock().unwrap();

        if matches!(state.peek_reply(&key), Some(Reply::TransportFailure)) {
            state.take_reply(&key);
            return Err(ClientError::transport("connection refused"));
        }

        let token_endpoint = path == REFRESH_PATH || path == LOGIN_PATH;
        if !token_endpoint {
            let authorized = !state.reject_all_access
                && request
                    .bearer
                    .as_ref()
                    .is_some_and(|token| state.valid_access.contains(token));
            if !authorized {
                return Ok(json_response(
                    401,
                    json!({
                        "detail": "Given token not valid for any token type",
                        "code": "token_not_valid"
                    }),
                ));
            }
        }

        if let Some(reply) = state.take_reply(&key) {
            return match reply {
                Reply::Response(response) => Ok(response),
                Reply::TransportFailure => Err(ClientError::transport("connection refused")),
            };
        }

        Ok(match path.as_str() {
            REFRESH_PATH => state.refresh(&request),
            LOGIN_PATH => state.login(&request),
            _ => json_response(404, json!({"detail": "Not found."})),
        })
    }
}

pub(crate) fn ticket_json(id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "ticket_number": "4f8e2a10-6b3c-4d2e-9a1f-0c9b8a7d6e5f",
        "status": status,
        "description": "VPN drops every few minutes",
        "created_at": "2025-03-01T09:00:00Z",
        "updated_at": "2025-03-01T09:00:00Z",
        "client": 3,
        "issue": 1,
        "sub_issue": 2,
        "assigned_to": 7,
        "client_name": "carol",
        "issue_name": "Network",
        "sub_issue_name": "VPN",
        "assigned_staff": "bob"
    })
}

pub(crate) fn activity_json(id: i64, old_status: &str, new_status: &str, minute: u32) -> Value {
    json!({
        "id": id,
        "old_status": old_status,
        "new_status": new_status,
        "changed_by": "admin",
        "created_at": format!("2025-03-01T10:{:02}:00Z", minute)
    })
}
