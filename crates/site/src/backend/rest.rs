//! REST backend.
//!
//! Auth goes through the identity toolkit (`accounts:signUp`,
//! `accounts:signInWithCustomToken`); documents through the document store's
//! REST API, authorized with the signed-in principal's id token. Id tokens are
//! short-lived: they are exchanged at the secure token endpoint shortly before
//! they expire, and once more if the document API rejects one. The REST
//! surface has no push channel, so document subscriptions poll and only emit
//! when the document actually changed.
//!
//! Only string-valued fields are written. Integer, boolean and double values
//! written by other tools are read back as their string form.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use leadline_core::{CollectionPath, DocumentPath, Fields, RecordId};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{
    Backend, BackendError, DocumentEvent, DocumentSnapshot, Principal, SetOptions, Subscription,
};
use crate::config::RestBackendConfig;

const USER_AGENT: &str = concat!("leadline-site/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Lifetime assumed when the auth API omits `expiresIn`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Id tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Which API a failed request went to; decides how statuses are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Auth,
    Documents,
}

#[derive(Clone)]
struct Session {
    principal: Principal,
    id_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: Instant,
}

impl Session {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now + REFRESH_MARGIN
    }
}

struct Inner {
    client: reqwest::Client,
    api_key: SecretString,
    auth_base: String,
    token_base: String,
    documents_root: String,
    poll_interval: Duration,
    session: watch::Sender<Option<Session>>,
    /// Serializes token refreshes so concurrent callers exchange once.
    refresh: Mutex<()>,
}

/// [`Backend`] speaking the hosted identity and document REST APIs.
///
/// Cheap to clone; clones share the HTTP client and the signed-in session.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<Inner>,
}

impl fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestBackend")
            .field("documents_root", &self.inner.documents_root)
            .field("poll_interval", &self.inner.poll_interval)
            .finish_non_exhaustive()
    }
}

impl RestBackend {
    /// Create a new REST backend.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &RestBackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let documents_root = format!(
            "{}/projects/{}/databases/(default)/documents",
            config.documents_url.as_str().trim_end_matches('/'),
            urlencoding::encode(&config.project_id)
        );

        let (session, _) = watch::channel(None);

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                api_key: config.api_key.clone(),
                auth_base: config.auth_url.as_str().trim_end_matches('/').to_string(),
                token_base: config.token_url.as_str().trim_end_matches('/').to_string(),
                documents_root,
                poll_interval: config.poll_interval,
                session,
                refresh: Mutex::new(()),
            }),
        })
    }

    fn auth_url(&self, method: &str) -> String {
        format!(
            "{}/accounts:{method}?key={}",
            self.inner.auth_base,
            urlencoding::encode(self.inner.api_key.expose_secret())
        )
    }

    fn token_url(&self) -> String {
        format!(
            "{}/token?key={}",
            self.inner.token_base,
            urlencoding::encode(self.inner.api_key.expose_secret())
        )
    }

    fn document_url(&self, path: &str) -> String {
        format!("{}/{}", self.inner.documents_root, encode_path(path))
    }

    fn session(&self) -> Option<Session> {
        self.inner.session.borrow().clone()
    }

    async fn sign_in(
        &self,
        method: &str,
        body: serde_json::Value,
        anonymous: bool,
    ) -> Result<Principal, BackendError> {
        let request = self.inner.client.post(self.auth_url(method)).json(&body);
        let response: SignInResponse = send(request, Endpoint::Auth).await?;

        let uid = match response.local_id {
            Some(uid) if !uid.is_empty() => uid,
            _ => self.lookup_uid(&response.id_token).await?,
        };

        let principal = Principal::new(uid, anonymous);
        self.inner.session.send_replace(Some(Session {
            principal: principal.clone(),
            id_token: SecretString::from(response.id_token),
            refresh_token: response.refresh_token.map(SecretString::from),
            expires_at: Instant::now() + token_lifetime(response.expires_in.as_deref()),
        }));
        info!(uid = %principal.uid, anonymous, "Backend session established");
        Ok(principal)
    }

    /// Resolve the uid behind an id token; custom-token sign-in omits it.
    async fn lookup_uid(&self, id_token: &str) -> Result<String, BackendError> {
        let request = self
            .inner
            .client
            .post(self.auth_url("lookup"))
            .json(&json!({ "idToken": id_token }));
        let response: LookupResponse = send(request, Endpoint::Auth).await?;

        response
            .users
            .into_iter()
            .next()
            .map(|user| user.local_id)
            .ok_or_else(|| BackendError::InvalidResponse("account lookup returned no user".to_string()))
    }

    /// The id token to send, refreshed first when it is close to expiry or
    /// is the one the document API just `rejected`.
    async fn bearer(
        &self,
        rejected: Option<&SecretString>,
    ) -> Result<Option<SecretString>, BackendError> {
        match self.session() {
            None => return Ok(None),
            Some(session) if rejected.is_none() && session.is_fresh(Instant::now()) => {
                return Ok(Some(session.id_token));
            }
            Some(_) => {}
        }

        let _guard = self.inner.refresh.lock().await;

        // Another caller may have refreshed while this one waited.
        let Some(session) = self.session() else {
            return Ok(None);
        };
        let still_rejected = rejected
            .is_some_and(|token| token.expose_secret() == session.id_token.expose_secret());
        if !still_rejected && session.is_fresh(Instant::now()) {
            return Ok(Some(session.id_token));
        }
        let Some(refresh_token) = session.refresh_token else {
            return Ok(Some(session.id_token));
        };

        self.refresh(&refresh_token).await.map(Some)
    }

    /// Exchange a refresh token for a new id token and store it.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<SecretString, BackendError> {
        let request = self.inner.client.post(self.token_url()).json(&json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token.expose_secret(),
        }));
        let response: RefreshResponse = send(request, Endpoint::Auth).await?;

        let id_token = SecretString::from(response.id_token);
        let expires_at = Instant::now() + token_lifetime(response.expires_in.as_deref());
        let rotated = response.refresh_token.map(SecretString::from);

        // Same principal, so auth listeners are not notified.
        let stored = id_token.clone();
        self.inner.session.send_if_modified(move |current| {
            if let Some(session) = current {
                session.id_token = stored;
                session.expires_at = expires_at;
                if rotated.is_some() {
                    session.refresh_token = rotated;
                }
            }
            false
        });

        debug!("Refreshed backend id token");
        Ok(id_token)
    }

    /// Send a document request with the current id token, refreshing it and
    /// resending once if the token is rejected.
    async fn document_request<F>(&self, build: F) -> Result<Response, BackendError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let token = self.bearer(None).await?;
        let response = with_bearer(build(), token.as_ref()).send().await?;

        let Some(rejected) = token else {
            return Ok(response);
        };
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("Id token rejected by the document API");
        let retry = self.bearer(Some(&rejected)).await?;
        if retry.as_ref().map(ExposeSecret::expose_secret) == Some(rejected.expose_secret()) {
            return Ok(response);
        }
        Ok(with_bearer(build(), retry.as_ref()).send().await?)
    }

    async fn poll_document(self, path: DocumentPath, tx: mpsc::UnboundedSender<DocumentEvent>) {
        let mut interval = tokio::time::interval(self.inner.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<DocumentEvent> = None;

        loop {
            interval.tick().await;
            let event = match self.get_document(&path).await {
                Ok(Some(snapshot)) => DocumentEvent::Snapshot(snapshot),
                Ok(None) => DocumentEvent::Missing,
                Err(err) => DocumentEvent::Error(err),
            };
            let terminal = matches!(event, DocumentEvent::Error(_));

            if last.as_ref() != Some(&event) {
                last = Some(event.clone());
                if tx.send(event).is_err() {
                    break;
                }
            }
            if terminal {
                break;
            }
        }
        debug!(path = %path, "Document polling stopped");
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn sign_in_anonymously(&self) -> Result<Principal, BackendError> {
        self.sign_in("signUp", json!({ "returnSecureToken": true }), true)
            .await
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<Principal, BackendError> {
        self.sign_in(
            "signInWithCustomToken",
            json!({ "token": token, "returnSecureToken": true }),
            false,
        )
        .await
    }

    fn on_auth_state_changed(&self) -> Subscription<Option<Principal>> {
        let mut session = self.inner.session.subscribe();
        let current = principal_of(session.borrow_and_update().as_ref());

        let Ok(runtime) = Handle::try_current() else {
            return Subscription::single(current);
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(current);
        let task = runtime.spawn(async move {
            while session.changed().await.is_ok() {
                let principal = principal_of(session.borrow_and_update().as_ref());
                if tx.send(principal).is_err() {
                    break;
                }
            }
        });
        Subscription::new(rx, move || task.abort())
    }

    async fn get_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Option<DocumentSnapshot>, BackendError> {
        let url = self.document_url(path.as_str());
        let response = self
            .document_request(|| self.inner.client.get(&url))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let document: Document = decode(response, Endpoint::Documents).await?;
        document.into_snapshot().map(Some)
    }

    async fn set_document(
        &self,
        path: &DocumentPath,
        fields: &Fields,
        options: SetOptions,
    ) -> Result<(), BackendError> {
        let mut url = self.document_url(path.as_str());
        if options.merge {
            // An empty mask would replace the whole document.
            if fields.is_empty() {
                return Ok(());
            }
            url = format!("{url}?{}", update_mask(fields));
        }

        let body = DocumentBody::from_fields(fields);
        let response = self
            .document_request(|| self.inner.client.patch(&url).json(&body))
            .await?;
        let _: Document = decode(response, Endpoint::Documents).await?;
        Ok(())
    }

    fn subscribe_document(&self, path: &DocumentPath) -> Subscription<DocumentEvent> {
        let Ok(runtime) = Handle::try_current() else {
            return Subscription::single(DocumentEvent::Error(BackendError::Network(
                "no async runtime to poll the document from".to_string(),
            )));
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(self.clone().poll_document(path.clone(), tx));
        Subscription::new(rx, move || task.abort())
    }

    async fn add_record(
        &self,
        collection: &CollectionPath,
        record: &Fields,
    ) -> Result<RecordId, BackendError> {
        let url = self.document_url(collection.as_str());
        let body = DocumentBody::from_fields(record);
        let response = self
            .document_request(|| self.inner.client.post(&url).json(&body))
            .await?;
        let document: Document = decode(response, Endpoint::Documents).await?;
        record_id(&document.name)
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    local_id: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

/// Secure token endpoint reply; unlike the identity toolkit it is snake case.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
    update_time: Option<String>,
}

impl Document {
    fn into_snapshot(self) -> Result<DocumentSnapshot, BackendError> {
        let revision = match self.update_time.as_deref() {
            Some(update_time) => parse_revision(update_time)?,
            None => 0,
        };

        let fields = self
            .fields
            .into_iter()
            .filter_map(|(key, value)| match value.into_text() {
                Some(text) => Some((key, text)),
                None => {
                    debug!(field = %key, "Skipping non-scalar document field");
                    None
                }
            })
            .collect();

        Ok(DocumentSnapshot { fields, revision })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Value {
    #[serde(skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(skip_serializing)]
    integer_value: Option<String>,
    #[serde(skip_serializing)]
    boolean_value: Option<bool>,
    #[serde(skip_serializing)]
    double_value: Option<f64>,
}

impl Value {
    fn string(value: &str) -> Self {
        Self {
            string_value: Some(value.to_string()),
            ..Self::default()
        }
    }

    fn into_text(self) -> Option<String> {
        self.string_value
            .or(self.integer_value)
            .or_else(|| self.boolean_value.map(|b| b.to_string()))
            .or_else(|| self.double_value.map(|d| d.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct DocumentBody {
    fields: BTreeMap<String, Value>,
}

impl DocumentBody {
    fn from_fields(fields: &Fields) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(key, value)| (key.clone(), Value::string(value)))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

// =============================================================================
// Helpers
// =============================================================================

async fn send<T: DeserializeOwned>(
    request: RequestBuilder,
    endpoint: Endpoint,
) -> Result<T, BackendError> {
    let response = request.send().await?;
    decode(response, endpoint).await
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    endpoint: Endpoint,
) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify(status, &body, endpoint));
    }

    response
        .json()
        .await
        .map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

/// Map a failed HTTP status onto the backend error taxonomy.
fn classify(status: StatusCode, body: &str, endpoint: Endpoint) -> BackendError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| status.to_string());

    match (endpoint, status) {
        (_, StatusCode::TOO_MANY_REQUESTS) => BackendError::Network(message),
        (_, s) if s.is_server_error() => BackendError::Network(message),
        (Endpoint::Auth, _) => BackendError::Auth(message),
        (Endpoint::Documents, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            BackendError::Permission(message)
        }
        (Endpoint::Documents, _) => BackendError::InvalidResponse(message),
    }
}

fn with_bearer(request: RequestBuilder, token: Option<&SecretString>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token.expose_secret()),
        None => request,
    }
}

/// Token lifetime from an `expiresIn` value in seconds.
fn token_lifetime(expires_in: Option<&str>) -> Duration {
    expires_in
        .and_then(|secs| secs.trim().parse::<u64>().ok())
        .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs)
}

fn principal_of(session: Option<&Session>) -> Option<Principal> {
    session.map(|session| session.principal.clone())
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn update_mask(fields: &Fields) -> String {
    fields
        .keys()
        .map(|key| format!("updateMask.fieldPaths={}", urlencoding::encode(key)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Document revisions are the update time in microseconds since the epoch.
fn parse_revision(update_time: &str) -> Result<u64, BackendError> {
    let parsed = DateTime::parse_from_rfc3339(update_time)
        .map_err(|e| BackendError::InvalidResponse(format!("bad updateTime {update_time:?}: {e}")))?;
    u64::try_from(parsed.timestamp_micros())
        .map_err(|_| BackendError::InvalidResponse(format!("updateTime before epoch: {update_time}")))
}

fn record_id(document_name: &str) -> Result<RecordId, BackendError> {
    document_name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(RecordId::from)
        .ok_or_else(|| BackendError::InvalidResponse("created document has no name".to_string()))
}
