//! Dorado REST Adapter
//!
//! Implements [`ArrayClient`] over the array's deviceManager REST API.
//!
//! - Login posts credentials to each controller endpoint in order and keeps
//!   the first session that authenticates.
//! - Every response is an envelope `{"data": .., "error": {"code", "description"}}`;
//!   a non-zero code is an error.
//! - An expired session (`-401`) triggers one re-login and replay.
//! - Transient failures are retried with exponential backoff. Reads retry on
//!   any transient failure; writes only when the connection was never made,
//!   since a write that timed out may already be applied.

use crate::config::ArrayConfig;
use crate::domain::ports::{
    ArrayAction, ArrayClient, Association, ObjectKind, PowerOperation, SearchQuery,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Device placeholder used before a session exists
const LOGIN_DEVICE: &str = "xxxxx";

/// Error code of an expired or missing session
const UNAUTHORIZED_CODE: i64 = -401;

/// Error codes reporting that the addressed object does not exist
const NOT_FOUND_CODES: [i64; 3] = [1077948996, 1077936859, 1077939726];

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Value,
    error: ApiStatus,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    code: i64,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    deviceid: String,
    #[serde(rename = "iBaseToken")]
    ibase_token: String,
}

/// Authenticated session on one controller
#[derive(Debug, Clone)]
struct Session {
    endpoint: String,
    device_id: String,
    token: String,
}

impl Session {
    fn url(&self, path: &str) -> String {
        format!(
            "{}/deviceManager/rest/{}{}",
            self.endpoint, self.device_id, path
        )
    }
}

/// One REST call, before it is bound to a session
#[derive(Debug, Clone, PartialEq)]
struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    fn query(mut self, pairs: Vec<(&'static str, String)>) -> Self {
        self.query = pairs;
        self
    }

    fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Unwrap a response envelope
fn open_envelope(raw: Value, path: &str) -> Result<Value> {
    let envelope: Envelope = serde_json::from_value(raw)?;
    match envelope.error.code {
        0 => Ok(envelope.data),
        UNAUTHORIZED_CODE => Err(Error::Unauthorized),
        code if NOT_FOUND_CODES.contains(&code) => Err(Error::NotFound {
            kind: "Array object".into(),
            name: path.to_string(),
        }),
        code => Err(Error::Api {
            code,
            description: envelope.error.description,
        }),
    }
}

fn object_path(kind: ObjectKind, id: &str) -> String {
    format!("{}/{}", kind.resource_path(), urlencoding::encode(id))
}

/// Request adding or removing a membership edge
fn association_request(association: &Association, remove: bool) -> Result<ApiRequest> {
    let member_type = association.member.type_code();
    let parent_id = association.parent_id.clone();
    let member_id = association.member_id.clone();

    let request = match (association.parent, association.member, remove) {
        (ObjectKind::HostGroup, ObjectKind::Host, false) => {
            ApiRequest::new(Method::POST, "/hostgroup/associate").body(json!({
                "ID": parent_id,
                "ASSOCIATEOBJTYPE": member_type,
                "ASSOCIATEOBJID": member_id,
            }))
        }
        (ObjectKind::HostGroup, ObjectKind::Host, true) => {
            ApiRequest::new(Method::DELETE, "/host/associate").query(vec![
                ("ID", parent_id),
                ("ASSOCIATEOBJID", member_id),
                ("ASSOCIATEOBJTYPE", member_type.to_string()),
                ("TYPE", ObjectKind::HostGroup.type_code().to_string()),
            ])
        }
        (ObjectKind::MappingView, member, remove) if member != ObjectKind::MappingView => {
            let path = if remove {
                "/mappingview/remove_associate"
            } else {
                "/mappingview/create_associate"
            };
            ApiRequest::new(Method::PUT, path).body(json!({
                "ID": parent_id,
                "TYPE": ObjectKind::MappingView.type_code().to_string(),
                "ASSOCIATEOBJTYPE": member_type,
                "ASSOCIATEOBJID": member_id,
            }))
        }
        (ObjectKind::LunGroup, ObjectKind::Lun, false) => {
            ApiRequest::new(Method::POST, "/lungroup/associate").body(json!({
                "ID": parent_id,
                "ASSOCIATEOBJTYPE": member_type,
                "ASSOCIATEOBJID": member_id,
            }))
        }
        (ObjectKind::LunGroup, ObjectKind::Lun, true) => {
            ApiRequest::new(Method::DELETE, "/lungroup/associate").query(vec![
                ("ID", parent_id),
                ("ASSOCIATEOBJTYPE", member_type.to_string()),
                ("ASSOCIATEOBJID", member_id),
            ])
        }
        _ => {
            return Err(Error::Internal(format!(
                "unsupported association: {}",
                association
            )))
        }
    };
    Ok(request)
}

fn action_request(action: &ArrayAction) -> ApiRequest {
    match action {
        ArrayAction::ExpandLun { lun_id, capacity } => {
            ApiRequest::new(Method::PUT, "/lun/expand").body(json!({
                "ID": lun_id,
                "TYPE": ObjectKind::Lun.type_code(),
                "CAPACITY": capacity,
            }))
        }
        ArrayAction::ActivateSnapshot { snapshot_id } => {
            ApiRequest::new(Method::POST, "/snapshot/activate")
                .body(json!({ "SNAPSHOTLIST": snapshot_id }))
        }
        ArrayAction::StopSnapshot { snapshot_id } => {
            ApiRequest::new(Method::PUT, "/snapshot/stop").body(json!({ "ID": snapshot_id }))
        }
        ArrayAction::Power {
            operation,
            important_password,
        } => {
            let path = match operation {
                PowerOperation::PowerOff => "/SYSTEM/POWEROFF",
                PowerOperation::Reboot => "/SYSTEM/REBOOT",
            };
            ApiRequest::new(Method::PUT, path)
                .body(json!({ "IMPORTANTPSW": important_password.expose() }))
        }
    }
}

/// Parse the `CMO_SYS_UTC_TIME` field (Unix seconds as a string)
fn parse_utc_time(data: &Value) -> Result<DateTime<Utc>> {
    let raw = data
        .get("CMO_SYS_UTC_TIME")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let secs: i64 = raw.parse().map_err(|_| Error::Api {
        code: 0,
        description: format!("CMO_SYS_UTC_TIME '{}' is invalid", raw),
    })?;
    Utc.timestamp_opt(secs, 0).single().ok_or_else(|| Error::Api {
        code: 0,
        description: format!("CMO_SYS_UTC_TIME '{}' is out of range", raw),
    })
}

/// Whether a failed request may be sent again
fn may_retry(method: &Method, error: &Error) -> bool {
    if *method == Method::GET {
        error.is_transient()
    } else {
        error.is_connect_failure()
    }
}

// =============================================================================
// Client
// =============================================================================

/// REST client for one dual-controller array
pub struct DoradoClient {
    config: ArrayConfig,
    http: reqwest::Client,
    session: RwLock<Option<Session>>,
}

impl DoradoClient {
    pub fn new(config: ArrayConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        Ok(Self {
            config,
            http,
            session: RwLock::new(None),
        })
    }

    /// Open a session on the first controller that accepts the credentials
    pub async fn login(&self) -> Result<()> {
        self.open_session().await.map(|_| ())
    }

    async fn open_session(&self) -> Result<Session> {
        let mut last_error = None;

        for endpoint in &self.config.endpoints {
            match self.login_to(endpoint).await {
                Ok(session) => {
                    info!(
                        "Logged in to {} (device: {})",
                        session.endpoint, session.device_id
                    );
                    *self.session.write().await = Some(session.clone());
                    return Ok(session);
                }
                Err(e) => {
                    warn!("Login to {} failed: {}", endpoint, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Configuration("no management endpoint configured".into())
        }))
    }

    async fn login_to(&self, endpoint: &str) -> Result<Session> {
        let url = format!("{}/deviceManager/rest/{}/sessions", endpoint, LOGIN_DEVICE);
        let body = json!({
            "username": self.config.username,
            "password": self.config.password,
            "scope": self.config.scope,
        });

        let raw: Value = self.http.post(&url).json(&body).send().await?.json().await?;
        let login: LoginData = serde_json::from_value(open_envelope(raw, "/sessions")?)?;

        Ok(Session {
            endpoint: endpoint.to_string(),
            device_id: login.deviceid,
            token: login.ibase_token,
        })
    }

    async fn current_session(&self) -> Result<Session> {
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }
        self.open_session().await
    }

    async fn send_once(&self, session: &Session, request: &ApiRequest) -> Result<Value> {
        let mut builder = self
            .http
            .request(request.method.clone(), session.url(&request.path))
            .header("iBaseToken", &session.token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let raw: Value = builder.send().await?.json().await?;
        open_envelope(raw, &request.path)
    }

    /// Send on the current session, logging in again once if it expired
    async fn send_authenticated(&self, request: &ApiRequest) -> Result<Value> {
        let session = self.current_session().await?;
        match self.send_once(&session, request).await {
            Err(Error::Unauthorized) => {
                warn!("Session on {} expired, logging in again", session.endpoint);
                *self.session.write().await = None;
                let session = self.open_session().await?;
                self.send_once(&session, request).await
            }
            other => other,
        }
    }

    async fn call(&self, request: ApiRequest) -> Result<Value> {
        debug!("{} {}", request.method, request.path);

        let policy = ExponentialBackoff {
            current_interval: Duration::from_millis(200),
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        let attempts = AtomicU32::new(0);
        let max_retries = self.config.max_retries;

        let this = self;
        let request = &request;
        let attempts = &attempts;
        backoff::future::retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            match this.send_authenticated(request).await {
                Ok(data) => Ok(data),
                Err(e) if attempt < max_retries && may_retry(&request.method, &e) => {
                    warn!(
                        "{} {} failed (attempt {}), retrying: {}",
                        request.method,
                        request.path,
                        attempt + 1,
                        e
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    /// Array clock, also used as a connectivity check
    pub async fn system_utc_time(&self) -> Result<DateTime<Utc>> {
        let data = self
            .call(ApiRequest::new(Method::GET, "/system_utc_time"))
            .await?;
        parse_utc_time(&data)
    }
}

#[async_trait]
impl ArrayClient for DoradoClient {
    async fn list(&self, kind: ObjectKind, query: &SearchQuery) -> Result<Vec<Value>> {
        let data = self
            .call(ApiRequest::new(Method::GET, kind.resource_path()).query(query.to_pairs()))
            .await?;
        // An empty search carries no data field at all
        Ok(match data {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other)?,
        })
    }

    async fn get(&self, kind: ObjectKind, id: &str) -> Result<Value> {
        self.call(ApiRequest::new(Method::GET, object_path(kind, id)))
            .await
    }

    async fn create(&self, kind: ObjectKind, payload: Value) -> Result<Value> {
        self.call(ApiRequest::new(Method::POST, kind.resource_path()).body(payload))
            .await
    }

    async fn delete(&self, kind: ObjectKind, id: &str) -> Result<()> {
        let mut request = ApiRequest::new(Method::DELETE, object_path(kind, id));
        if kind == ObjectKind::Snapshot {
            request = request.body(json!({
                "TYPE": kind.type_code().to_string(),
                "ID": id,
            }));
        }
        self.call(request).await.map(|_| ())
    }

    async fn associate(&self, association: &Association) -> Result<()> {
        self.call(association_request(association, false)?)
            .await
            .map(|_| ())
    }

    async fn disassociate(&self, association: &Association) -> Result<()> {
        self.call(association_request(association, true)?)
            .await
            .map(|_| ())
    }

    async fn list_associated(&self, kind: ObjectKind, query: &SearchQuery) -> Result<Vec<Value>> {
        let path = format!("{}/associate", kind.resource_path());
        let data = self
            .call(ApiRequest::new(Method::GET, path).query(query.to_pairs()))
            .await?;
        Ok(match data {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other)?,
        })
    }

    async fn invoke(&self, action: ArrayAction) -> Result<()> {
        self.call(action_request(&action)).await.map(|_| ())
    }

    fn adapter_name(&self) -> &str {
        "dorado"
    }
}
