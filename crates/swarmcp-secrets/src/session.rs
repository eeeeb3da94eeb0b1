use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use ureq::Agent;
use url::Url;

use crate::SecretResolver;
use crate::error::SecretStoreError;
use crate::path::{SecretPath, pick_field};
use crate::settings::{Credentials, Flavor, SessionSettings};

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(500);

/// Snapshot of background token renewal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionHealth {
    pub renewals: u32,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

struct Client {
    agent: Agent,
    base: Url,
    namespace: Option<String>,
}

impl Client {
    fn new(settings: &SessionSettings) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .build();
        let mut base = settings.addr.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self {
            agent: Agent::new_with_config(config),
            base,
            namespace: settings.namespace.clone(),
        }
    }

    fn endpoint(&self, api_path: &str) -> Result<String, SecretStoreError> {
        self.base
            .join(&format!("v1/{api_path}"))
            .map(String::from)
            .map_err(|source| SecretStoreError::InvalidAddress {
                flavor: "secret store".to_string(),
                addr: self.base.to_string(),
                source,
            })
    }

    fn get(&self, api_path: &str, token: &str) -> Result<Value, SecretStoreError> {
        let url = self.endpoint(api_path)?;
        let mut request = self.agent.get(url.as_str()).header(TOKEN_HEADER, token);
        if let Some(namespace) = &self.namespace {
            request = request.header(NAMESPACE_HEADER, namespace.as_str());
        }
        let operation = format!("GET {api_path}");
        request
            .call()
            .and_then(|mut response| response.body_mut().read_json::<Value>())
            .map_err(|source| http_error(&operation, source))
    }

    fn post(&self, api_path: &str, token: Option<&str>, body: &Value) -> Result<Value, SecretStoreError> {
        let url = self.endpoint(api_path)?;
        let mut request = self.agent.post(url.as_str());
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(namespace) = &self.namespace {
            request = request.header(NAMESPACE_HEADER, namespace.as_str());
        }
        let operation = format!("POST {api_path}");
        request
            .send_json(body)
            .and_then(|mut response| response.body_mut().read_json::<Value>())
            .map_err(|source| http_error(&operation, source))
    }

    fn post_empty(&self, api_path: &str, token: &str) -> Result<(), SecretStoreError> {
        let url = self.endpoint(api_path)?;
        let mut request = self.agent.post(url.as_str()).header(TOKEN_HEADER, token);
        if let Some(namespace) = &self.namespace {
            request = request.header(NAMESPACE_HEADER, namespace.as_str());
        }
        request
            .send_empty()
            .map(|_| ())
            .map_err(|source| http_error(&format!("POST {api_path}"), source))
    }
}

fn http_error(operation: &str, source: ureq::Error) -> SecretStoreError {
    SecretStoreError::Http {
        operation: operation.to_string(),
        source: Box::new(source),
    }
}

fn malformed(operation: &str, detail: &str) -> SecretStoreError {
    SecretStoreError::MalformedResponse {
        operation: operation.to_string(),
        detail: detail.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

struct Login {
    token: String,
    /// Whether this session minted the token and must revoke it.
    minted: bool,
    renewable: bool,
    lease: Duration,
}

fn login(client: &Client, credentials: &Credentials) -> Result<Login, SecretStoreError> {
    match credentials {
        Credentials::Token(token) => Ok(Login {
            token: token.clone(),
            minted: false,
            renewable: false,
            lease: Duration::ZERO,
        }),
        Credentials::AppRole {
            role_id,
            wrapping_token,
        } => {
            let secret_id = unwrap_secret_id(client, wrapping_token)?;
            let response = client.post(
                "auth/approle/login",
                None,
                &json!({ "role_id": role_id, "secret_id": secret_id }),
            )?;
            let auth = response
                .get("auth")
                .and_then(Value::as_object)
                .ok_or_else(|| malformed("approle login", "missing auth block"))?;
            let token = auth
                .get("client_token")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .ok_or_else(|| malformed("approle login", "empty client token"))?;
            Ok(Login {
                token: token.to_string(),
                minted: true,
                renewable: auth.get("renewable").and_then(Value::as_bool).unwrap_or(false),
                lease: lease_duration(auth),
            })
        }
    }
}

/// The unwrapped document normally carries `secret_id`; otherwise the first
/// non-empty string field is used.
fn unwrap_secret_id(client: &Client, wrapping_token: &str) -> Result<String, SecretStoreError> {
    let response = client.post("sys/wrapping/unwrap", Some(wrapping_token), &json!({}))?;
    let data = response
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("unwrap", "empty response"))?;
    data.get("secret_id")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .or_else(|| {
            data.values()
                .filter_map(Value::as_str)
                .find(|value| !value.is_empty())
        })
        .map(ToString::to_string)
        .ok_or_else(|| malformed("unwrap", "secret_id not found"))
}

fn lease_duration(auth: &Map<String, Value>) -> Duration {
    Duration::from_secs(auth.get("lease_duration").and_then(Value::as_u64).unwrap_or(0))
}

fn renew_interval(lease: Duration) -> Duration {
    (lease * 2 / 3).max(MIN_RENEW_INTERVAL)
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Renewal {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// One authenticated connection to a Vault-compatible secret store.
///
/// Lookups are safe from many threads. The session is released by
/// [`SecretSession::close`] or on drop, whichever comes first.
pub struct SecretSession {
    flavor: Flavor,
    client: Arc<Client>,
    token: String,
    minted: bool,
    health: Arc<Mutex<SessionHealth>>,
    renewal: Mutex<Option<Renewal>>,
    closed: AtomicBool,
}

impl SecretSession {
    /// Authenticate and, for renewable tokens, start background renewal.
    ///
    /// # Errors
    ///
    /// Returns an error when unwrapping or login fails.
    pub fn open(settings: &SessionSettings) -> Result<Self, SecretStoreError> {
        let client = Arc::new(Client::new(settings));
        let login = login(&client, &settings.credentials)?;
        info!(
            flavor = %settings.flavor,
            addr = %settings.addr,
            renewable = login.renewable,
            "opened secret store session"
        );

        let health = Arc::new(Mutex::new(SessionHealth::default()));
        let renewal = (login.renewable && !login.lease.is_zero()).then(|| {
            spawn_renewal(
                Arc::clone(&client),
                login.token.clone(),
                login.lease,
                Arc::clone(&health),
            )
        });

        Ok(Self {
            flavor: settings.flavor,
            client,
            token: login.token,
            minted: login.minted,
            health,
            renewal: Mutex::new(renewal),
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub const fn flavor(&self) -> Flavor {
        self.flavor
    }

    #[must_use]
    pub fn health(&self) -> SessionHealth {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop renewal and revoke a token this session minted. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let renewal = self
            .renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(renewal) = renewal {
            let _ = renewal.stop.send(());
            if renewal.handle.join().is_err() {
                warn!("secret token renewal thread panicked");
            }
        }
        let revoked = if self.minted {
            self.client.post_empty("auth/token/revoke-self", &self.token)
        } else {
            Ok(())
        };
        if let Err(error) = revoked {
            warn!(error = %error, "failed to revoke secret store token");
        }
        debug!(flavor = %self.flavor, "closed secret store session");
    }

    fn read(&self, path: &SecretPath<'_>) -> Result<Vec<u8>, SecretStoreError> {
        let display = path.logical;
        // KV v2 documents nest the payload under data.data.
        let kv2 = self.client.get(&path.kv2_path(), &self.token).ok();
        if let Some(document) = kv2
            .as_ref()
            .and_then(|response| response.pointer("/data/data"))
            .and_then(Value::as_object)
        {
            return pick_field(display, document, path.field);
        }

        let response = self.client.get(path.logical, &self.token)?;
        let document = response
            .get("data")
            .and_then(Value::as_object)
            .ok_or_else(|| SecretStoreError::NoData {
                path: display.to_string(),
            })?;
        pick_field(display, document, path.field)
    }
}

impl SecretResolver for SecretSession {
    fn resolve_secret(&self, path: &str) -> Result<Vec<u8>, SecretStoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SecretStoreError::SessionClosed);
        }
        let parsed = SecretPath::parse(path)?;
        debug!(path = parsed.logical, "reading secret");
        self.read(&parsed)
    }
}

impl Drop for SecretSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_renewal(
    client: Arc<Client>,
    token: String,
    lease: Duration,
    health: Arc<Mutex<SessionHealth>>,
) -> Renewal {
    let (stop, stopped) = mpsc::channel::<()>();
    let handle = thread::spawn(move || {
        let mut interval = renew_interval(lease);
        loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
            let renewed = client
                .post("auth/token/renew-self", Some(&token), &json!({}))
                .and_then(|response| {
                    response
                        .get("auth")
                        .and_then(Value::as_object)
                        .map(lease_duration)
                        .ok_or_else(|| malformed("token renewal", "missing auth block"))
                });
            let mut health = health.lock().unwrap_or_else(PoisonError::into_inner);
            match renewed {
                Ok(next_lease) => {
                    health.renewals += 1;
                    debug!(lease_secs = next_lease.as_secs(), "renewed secret store token");
                    if next_lease.is_zero() {
                        return;
                    }
                    interval = renew_interval(next_lease);
                }
                Err(error) => {
                    warn!(error = %error, "secret store token renewal failed");
                    health.last_error = Some(error.to_string());
                    return;
                }
            }
        }
    });
    Renewal { stop, handle }
}
