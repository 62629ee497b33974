use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::Arc;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} returned HTTP {status}: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("private key {path} is unusable: {detail}")]
    Key { path: String, detail: String },

    #[error("token cache {path}: {detail}")]
    TokenCache { path: String, detail: String },
}

#[async_trait]
pub trait VpsRepository: Send + Sync {
    async fn list_all(&self) -> ApiResult<Vec<Vps>>;
    async fn get_by_name(&self, name: &str) -> ApiResult<Vps>;
    async fn get_ip_addresses(&self, name: &str) -> ApiResult<Vec<IpAddress>>;
    async fn get_backups(&self, name: &str) -> ApiResult<Vec<VpsBackup>>;
    async fn get_snapshots(&self, name: &str) -> ApiResult<Vec<Snapshot>>;
}

#[async_trait]
pub trait BigStorageRepository: Send + Sync {
    async fn list_all(&self) -> ApiResult<Vec<BigStorage>>;
}

#[async_trait]
pub trait HaipRepository: Send + Sync {
    async fn list_all(&self) -> ApiResult<Vec<Haip>>;
}

#[async_trait]
pub trait DomainRepository: Send + Sync {
    async fn list_all(&self) -> ApiResult<Vec<Domain>>;
}

/// One repository per resource kind, shared by the tree and the detail view.
#[derive(Clone)]
pub struct Repositories {
    pub vps: Arc<dyn VpsRepository>,
    pub big_storage: Arc<dyn BigStorageRepository>,
    pub haip: Arc<dyn HaipRepository>,
    pub domain: Arc<dyn DomainRepository>,
}

impl Repositories {
    /// Uses a single backend for every kind.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: VpsRepository + BigStorageRepository + HaipRepository + DomainRepository + 'static,
    {
        Self {
            vps: backend.clone(),
            big_storage: backend.clone(),
            haip: backend.clone(),
            domain: backend,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Vps {
    pub name: String,
    pub description: String,
    pub product_name: String,
    pub operating_system: String,
    /// KiB
    pub disk_size: u64,
    /// KiB
    pub memory_size: u64,
    pub cpus: u32,
    pub status: String,
    pub ip_address: String,
    pub availability_zone: String,
}

#[derive(Debug, Clone, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BigStorage {
    pub name: String,
    pub description: String,
    pub disk_size: u64,
    pub vps_name: String,
    pub status: String,
    pub availability_zone: String,
}

#[derive(Debug, Clone, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Haip {
    pub name: String,
    pub description: String,
    pub status: String,
    pub ip_addresses: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Domain {
    pub name: String,
    pub is_dns_only: bool,
    pub renewal_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IpAddress {
    pub address: IpAddr,
    pub subnet_mask: SubnetMask,
    #[serde(default, deserialize_with = "optional_ip")]
    pub gateway: Option<IpAddr>,
    #[serde(default)]
    pub reverse_dns: String,
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpsBackup {
    pub id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "dateTimeCreate", deserialize_with = "provider_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub disk_size: u64,
    #[serde(default)]
    pub availability_zone: String,
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub disk_size: u64,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "dateTimeCreate", deserialize_with = "provider_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// IPv4 masks travel as dotted quads, IPv6 ones as a `/prefix`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SubnetMask {
    Dotted(Ipv4Addr),
    Prefix(u8),
}

impl FromStr for SubnetMask {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let raw = raw.trim();
        if let Some(prefix) = raw.strip_prefix('/') {
            return prefix
                .parse::<u8>()
                .ok()
                .filter(|bits| *bits <= 128)
                .map(Self::Prefix)
                .ok_or_else(|| format!("invalid prefix length '{raw}'"));
        }
        if let Ok(mask) = raw.parse::<Ipv4Addr>() {
            return Ok(Self::Dotted(mask));
        }
        match raw.parse::<u8>() {
            Ok(bits) if bits <= 128 => Ok(Self::Prefix(bits)),
            _ => Err(format!("invalid subnet mask '{raw}'")),
        }
    }
}

impl Display for SubnetMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dotted(mask) => write!(f, "{mask}"),
            Self::Prefix(bits) => write!(f, "/{bits}"),
        }
    }
}

impl<'de> Deserialize<'de> for SubnetMask {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

const PROVIDER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn provider_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_provider_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_provider_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw.trim(), PROVIDER_TIME_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| format!("invalid timestamp '{raw}': {error}"))
}

fn optional_ip<'de, D>(deserializer: D) -> std::result::Result<Option<IpAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<IpAddr>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::{
        ApiError, ApiResult, BigStorage, BigStorageRepository, Domain, DomainRepository, Haip,
        HaipRepository, IpAddress, Repositories, Snapshot, Vps, VpsBackup, VpsRepository,
    };
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Debug, Default)]
    pub struct FakeState {
        pub vpses: Vec<Vps>,
        pub big_storages: Vec<BigStorage>,
        pub haips: Vec<Haip>,
        pub domains: Vec<Domain>,
        pub ip_addresses: Vec<IpAddress>,
        pub backups: Vec<VpsBackup>,
        pub snapshots: Vec<Snapshot>,
        pub failing: HashSet<&'static str>,
        pub calls: Vec<String>,
    }

    /// In-process backend; operations listed in `failing` return an HTTP 500.
    #[derive(Debug, Default)]
    pub struct FakeBackend {
        state: Mutex<FakeState>,
    }

    impl FakeBackend {
        pub fn new(state: FakeState) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(state),
            })
        }

        pub fn state(&self) -> MutexGuard<'_, FakeState> {
            self.state.lock().unwrap()
        }

        pub fn repositories(self: &Arc<Self>) -> Repositories {
            Repositories::from_backend(self.clone())
        }

        fn call(&self, op: &'static str, target: &str) -> ApiResult<MutexGuard<'_, FakeState>> {
            let mut state = self.state();
            state.calls.push(format!("{op} {target}").trim().to_string());
            if state.failing.contains(op) {
                return Err(ApiError::Status {
                    path: op.to_string(),
                    status: 500,
                    message: "scripted failure".to_string(),
                });
            }
            Ok(state)
        }
    }

    pub fn vps(name: &str, description: &str) -> Vps {
        Vps {
            name: name.to_string(),
            description: description.to_string(),
            product_name: "vps-bladevps-x4".to_string(),
            availability_zone: "ams0".to_string(),
            cpus: 4,
            disk_size: 4_194_304,
            memory_size: 8_388_608,
            status: "running".to_string(),
            ..Vps::default()
        }
    }

    #[async_trait]
    impl VpsRepository for FakeBackend {
        async fn list_all(&self) -> ApiResult<Vec<Vps>> {
            Ok(self.call("vps.list_all", "")?.vpses.clone())
        }

        async fn get_by_name(&self, name: &str) -> ApiResult<Vps> {
            let state = self.call("vps.get_by_name", name)?;
            state
                .vpses
                .iter()
                .find(|vps| vps.name == name)
                .cloned()
                .ok_or_else(|| ApiError::Status {
                    path: format!("/vps/{name}"),
                    status: 404,
                    message: format!("VPS '{name}' not found"),
                })
        }

        async fn get_ip_addresses(&self, name: &str) -> ApiResult<Vec<IpAddress>> {
            Ok(self.call("vps.get_ip_addresses", name)?.ip_addresses.clone())
        }

        async fn get_backups(&self, name: &str) -> ApiResult<Vec<VpsBackup>> {
            Ok(self.call("vps.get_backups", name)?.backups.clone())
        }

        async fn get_snapshots(&self, name: &str) -> ApiResult<Vec<Snapshot>> {
            Ok(self.call("vps.get_snapshots", name)?.snapshots.clone())
        }
    }

    #[async_trait]
    impl BigStorageRepository for FakeBackend {
        async fn list_all(&self) -> ApiResult<Vec<BigStorage>> {
            Ok(self.call("bigstorage.list_all", "")?.big_storages.clone())
        }
    }

    #[async_trait]
    impl HaipRepository for FakeBackend {
        async fn list_all(&self) -> ApiResult<Vec<Haip>> {
            Ok(self.call("haip.list_all", "")?.haips.clone())
        }
    }

    #[async_trait]
    impl DomainRepository for FakeBackend {
        async fn list_all(&self) -> ApiResult<Vec<Domain>> {
            Ok(self.call("domain.list_all", "")?.domains.clone())
        }
    }
}
