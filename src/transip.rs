use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use reqwest::Client;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::debug::RequestStats;
use crate::repository::{
    ApiError, ApiResult, BigStorage, BigStorageRepository, Domain, DomainRepository, Haip,
    HaipRepository, IpAddress, Snapshot, Vps, VpsBackup, VpsRepository,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_EXPIRATION: &str = "1 day";
const TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;
/// Tokens this close to expiry are not reused.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub token: String,
    /// Unix seconds
    pub expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at - TOKEN_EXPIRY_MARGIN_SECS > now
    }
}

/// JSON file holding one token per account.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Creates the file when missing so an unusable location fails at startup.
    pub fn open(path: &Path) -> ApiResult<Self> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|error| cache_error(path, error))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn get(&self, key: &str) -> ApiResult<Option<CachedToken>> {
        Ok(self.read_all()?.remove(key))
    }

    pub fn set(&self, key: &str, token: CachedToken) -> ApiResult<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), token);
        let raw = serde_json::to_string_pretty(&entries)
            .map_err(|error| cache_error(&self.path, error))?;
        fs::write(&self.path, raw).map_err(|error| cache_error(&self.path, error))
    }

    fn read_all(&self) -> ApiResult<BTreeMap<String, CachedToken>> {
        let raw = fs::read_to_string(&self.path).map_err(|error| cache_error(&self.path, error))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|error| cache_error(&self.path, error))
    }
}

fn cache_error(path: &Path, error: impl ToString) -> ApiError {
    ApiError::TokenCache {
        path: path.display().to_string(),
        detail: error.to_string(),
    }
}

enum Credentials {
    AccessToken(String),
    KeyPair {
        account: String,
        signing_key: Box<SigningKey<Sha512>>,
        cache: TokenCache,
    },
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    login: &'a str,
    nonce: String,
    read_only: bool,
    expiration_time: &'a str,
    label: String,
    global_key: bool,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

pub struct Authenticator {
    credentials: Credentials,
    current: Mutex<Option<CachedToken>>,
}

impl Authenticator {
    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::AccessToken(token.into()),
            current: Mutex::new(None),
        }
    }

    pub fn with_key_file(account: &str, key_path: &Path, cache: TokenCache) -> ApiResult<Self> {
        let key = load_private_key(key_path)?;
        Ok(Self {
            credentials: Credentials::KeyPair {
                account: account.to_string(),
                signing_key: Box::new(SigningKey::<Sha512>::new(key)),
                cache,
            },
            current: Mutex::new(None),
        })
    }

    pub async fn token(&self, http: &Client, endpoint: &str, test_mode: bool) -> ApiResult<String> {
        let (account, signing_key, cache) = match &self.credentials {
            Credentials::AccessToken(token) => return Ok(token.clone()),
            Credentials::KeyPair {
                account,
                signing_key,
                cache,
            } => (account, signing_key, cache),
        };

        let now = Utc::now().timestamp();
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.token.clone());
        }

        let cache_key = format!("{account}-token");
        if let Some(token) = cache.get(&cache_key)?
            && token.is_fresh(now)
        {
            debug!(%account, "reusing cached access token");
            let value = token.token.clone();
            *current = Some(token);
            return Ok(value);
        }

        debug!(%account, "requesting new access token");
        let fresh = request_token(http, endpoint, test_mode, account, signing_key).await?;
        let token = CachedToken {
            token: fresh,
            expires_at: now + TOKEN_LIFETIME_SECS,
        };
        cache.set(&cache_key, token.clone())?;
        let value = token.token.clone();
        *current = Some(token);
        Ok(value)
    }
}

fn load_private_key(path: &Path) -> ApiResult<RsaPrivateKey> {
    let key_error = |detail: String| ApiError::Key {
        path: path.display().to_string(),
        detail,
    };
    let pem = fs::read_to_string(path).map_err(|error| key_error(error.to_string()))?;
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|error| key_error(error.to_string()))
}

/// Base64 RSA-SHA512 signature of the exact request body.
fn sign_body(signing_key: &SigningKey<Sha512>, body: &[u8]) -> String {
    BASE64.encode(signing_key.sign(body).to_bytes())
}

async fn request_token(
    http: &Client,
    endpoint: &str,
    test_mode: bool,
    account: &str,
    signing_key: &SigningKey<Sha512>,
) -> ApiResult<String> {
    let request = auth_request(http, endpoint, test_mode, account, signing_key)?;
    let response: AuthResponse = read_response("/auth", request).await?;
    Ok(response.token)
}

fn auth_request(
    http: &Client,
    endpoint: &str,
    test_mode: bool,
    account: &str,
    signing_key: &SigningKey<Sha512>,
) -> ApiResult<reqwest::RequestBuilder> {
    let body = serde_json::to_vec(&AuthRequest {
        login: account,
        nonce: Uuid::new_v4().simple().to_string(),
        read_only: false,
        expiration_time: TOKEN_EXPIRATION,
        label: format!("transterm-{}", Utc::now().timestamp()),
        global_key: true,
    })
    .map_err(|error| ApiError::Auth(error.to_string()))?;

    let mut request = http
        .post(format!("{endpoint}/auth"))
        .header("Signature", sign_body(signing_key, &body))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body);
    if test_mode {
        request = request.query(&[("test", "1")]);
    }
    Ok(request)
}

async fn read_response<T: DeserializeOwned>(
    path: &str,
    request: reqwest::RequestBuilder,
) -> ApiResult<T> {
    let http_error = |source: reqwest::Error| ApiError::Http {
        path: path.to_string(),
        source,
    };
    let response = request.send().await.map_err(http_error)?;
    let status = response.status();
    let body = response.text().await.map_err(http_error)?;
    trace!(path, status = status.as_u16(), bytes = body.len(), "api response");

    if !status.is_success() {
        return Err(ApiError::Status {
            path: path.to_string(),
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    serde_json::from_str(&body).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

/// The API reports failures as `{"error": "..."}`.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

pub struct TransipClient {
    http: Client,
    endpoint: String,
    test_mode: bool,
    auth: Authenticator,
    stats: Arc<RequestStats>,
}

impl TransipClient {
    pub fn new(
        endpoint: impl Into<String>,
        test_mode: bool,
        auth: Authenticator,
        stats: Arc<RequestStats>,
    ) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("transterm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ApiError::Http {
                path: "client".to_string(),
                source,
            })?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            test_mode,
            auth,
            stats,
        })
    }

    pub fn from_config(config: &Config, stats: Arc<RequestStats>) -> ApiResult<Self> {
        let auth = match &config.access_token {
            Some(token) => Authenticator::with_access_token(token.clone()),
            None => {
                let cache = TokenCache::open(&config.token_cache_path)?;
                Authenticator::with_key_file(&config.account_name, &config.private_key_path, cache)?
            }
        };
        if !config.test_mode {
            warn!("test mode disabled, requests run against the live account");
        }
        Self::new(config.endpoint.clone(), config.test_mode, auth, stats)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let started = Instant::now();
        let result = self.get_unrecorded(path).await;
        self.stats.record(started.elapsed(), result.is_ok());
        result
    }

    async fn get_unrecorded<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let token = self
            .auth
            .token(&self.http, &self.endpoint, self.test_mode)
            .await?;
        read_response(path, self.get_request(path, &token)).await
    }

    fn get_request(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .get(format!("{}{path}", self.endpoint))
            .bearer_auth(token);
        if self.test_mode {
            request.query(&[("test", "1")])
        } else {
            request
        }
    }
}

#[derive(Deserialize)]
struct VpsListResponse {
    #[serde(default)]
    vpss: Vec<Vps>,
}

#[derive(Deserialize)]
struct VpsResponse {
    vps: Vps,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpAddressesResponse {
    #[serde(default)]
    ip_addresses: Vec<IpAddress>,
}

#[derive(Deserialize)]
struct BackupsResponse {
    #[serde(default)]
    backups: Vec<VpsBackup>,
}

#[derive(Deserialize)]
struct SnapshotsResponse {
    #[serde(default)]
    snapshots: Vec<Snapshot>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BigStoragesResponse {
    #[serde(default)]
    big_storages: Vec<BigStorage>,
}

#[derive(Deserialize)]
struct HaipsResponse {
    #[serde(default)]
    haips: Vec<Haip>,
}

#[derive(Deserialize)]
struct DomainsResponse {
    #[serde(default)]
    domains: Vec<Domain>,
}

#[async_trait]
impl VpsRepository for TransipClient {
    async fn list_all(&self) -> ApiResult<Vec<Vps>> {
        let response: VpsListResponse = self.get("/vps").await?;
        Ok(response.vpss)
    }

    async fn get_by_name(&self, name: &str) -> ApiResult<Vps> {
        let response: VpsResponse = self.get(&format!("/vps/{name}")).await?;
        Ok(response.vps)
    }

    async fn get_ip_addresses(&self, name: &str) -> ApiResult<Vec<IpAddress>> {
        let response: IpAddressesResponse =
            self.get(&format!("/vps/{name}/ip-addresses")).await?;
        Ok(response.ip_addresses)
    }

    async fn get_backups(&self, name: &str) -> ApiResult<Vec<VpsBackup>> {
        let response: BackupsResponse = self.get(&format!("/vps/{name}/backups")).await?;
        Ok(response.backups)
    }

    async fn get_snapshots(&self, name: &str) -> ApiResult<Vec<Snapshot>> {
        let response: SnapshotsResponse = self.get(&format!("/vps/{name}/snapshots")).await?;
        Ok(response.snapshots)
    }
}

#[async_trait]
impl BigStorageRepository for TransipClient {
    async fn list_all(&self) -> ApiResult<Vec<BigStorage>> {
        let response: BigStoragesResponse = self.get("/big-storages").await?;
        Ok(response.big_storages)
    }
}

#[async_trait]
impl HaipRepository for TransipClient {
    async fn list_all(&self) -> ApiResult<Vec<Haip>> {
        let response: HaipsResponse = self.get("/haips").await?;
        Ok(response.haips)
    }
}

#[async_trait]
impl DomainRepository for TransipClient {
    async fn list_all(&self) -> ApiResult<Vec<Domain>> {
        let response: DomainsResponse = self.get("/domains").await?;
        Ok(response.domains)
    }
}
