use crate::cli::CliArgs;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENDPOINT: &str = "https://api.transip.nl/v6";
const DEFAULT_PRIVATE_KEY: &str = "transip.key";
const DEFAULT_TOKEN_CACHE: &str = ".token-cache";
const DEFAULT_LOG_FILE: &str = "transterm.log";
const DEFAULT_LOG_FILTER: &str = "debug";

/// Fully resolved startup configuration.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    pub account_name: String,
    pub private_key_path: PathBuf,
    pub access_token: Option<String>,
    pub token_cache_path: PathBuf,
    pub test_mode: bool,
    pub endpoint: String,
    pub log_file: PathBuf,
    pub log_filter: String,
    pub debug_addr: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TranstermConfigFile {
    #[serde(default, alias = "account")]
    account_name: Option<String>,
    #[serde(default, alias = "private_key")]
    private_key_path: Option<PathBuf>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default, alias = "token_cache")]
    token_cache_path: Option<PathBuf>,
    #[serde(default)]
    test_mode: Option<bool>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    log_file: Option<PathBuf>,
    #[serde(default)]
    log_filter: Option<String>,
    #[serde(default)]
    debug_addr: Option<String>,
}

impl Config {
    pub fn load(args: &CliArgs) -> Result<Self> {
        let path = args.config.clone().or_else(|| {
            discover_config_path(
                std::env::var("TRANSTERM_CONFIG").ok(),
                Path::new("."),
                std::env::var_os("HOME").map(PathBuf::from),
            )
        });
        let file = match path {
            Some(path) => load_config_file(&path)?,
            None => TranstermConfigFile::default(),
        };
        Self::merge(args, file)
    }

    fn merge(args: &CliArgs, file: TranstermConfigFile) -> Result<Self> {
        let access_token = args
            .access_token
            .clone()
            .or(file.access_token)
            .filter(|token| !token.trim().is_empty());
        let account_name = args
            .account
            .clone()
            .or(file.account_name)
            .unwrap_or_default();

        if account_name.trim().is_empty() && access_token.is_none() {
            bail!("no account name configured (use --account, TRANSIP_ACCOUNT or account_name)");
        }

        Ok(Self {
            account_name,
            private_key_path: args
                .private_key
                .clone()
                .or(file.private_key_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PRIVATE_KEY)),
            access_token,
            token_cache_path: args
                .token_cache
                .clone()
                .or(file.token_cache_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_CACHE)),
            test_mode: !args.live && file.test_mode.unwrap_or(true),
            endpoint: args
                .endpoint
                .clone()
                .or(file.endpoint)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            log_file: args
                .log_file
                .clone()
                .or(file.log_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            log_filter: args
                .log_filter
                .clone()
                .or(file.log_filter)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            debug_addr: args.debug_addr.clone().or(file.debug_addr),
        })
    }
}

fn load_config_file(path: &Path) -> Result<TranstermConfigFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(TranstermConfigFile::default());
    }
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

fn discover_config_path(
    env_path: Option<String>,
    cwd: &Path,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = env_path
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    for name in ["transterm.yaml", "transterm.yml"] {
        let candidate = cwd.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    home.map(|home| home.join(".config/transterm/config.yaml"))
        .filter(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::{
        Config, DEFAULT_ENDPOINT, TranstermConfigFile, discover_config_path, load_config_file,
    };
    use crate::cli::CliArgs;
    use std::io::Write;
    use std::path::PathBuf;

    fn args_with_account(account: &str) -> CliArgs {
        CliArgs {
            account: Some(account.to_string()),
            ..CliArgs::default()
        }
    }

    #[test]
    fn defaults_fill_everything_but_the_account() {
        let config = Config::merge(&args_with_account("swiltink"), TranstermConfigFile::default())
            .unwrap();
        assert_eq!(config.account_name, "swiltink");
        assert_eq!(config.private_key_path, PathBuf::from("transip.key"));
        assert_eq!(config.token_cache_path, PathBuf::from(".token-cache"));
        assert_eq!(config.log_file, PathBuf::from("transterm.log"));
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.test_mode);
        assert!(config.access_token.is_none());
    }

    #[test]
    fn missing_account_is_rejected() {
        let error = Config::merge(&CliArgs::default(), TranstermConfigFile::default())
            .unwrap_err()
            .to_string();
        assert!(error.contains("no account name"));
    }

    #[test]
    fn access_token_alone_is_enough() {
        let args = CliArgs {
            access_token: Some("eyJ0eXAi".to_string()),
            ..CliArgs::default()
        };
        let config = Config::merge(&args, TranstermConfigFile::default()).unwrap();
        assert_eq!(config.access_token.as_deref(), Some("eyJ0eXAi"));
    }

    #[test]
    fn cli_overrides_file_and_live_disables_test_mode() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "account_name: from-file\nprivate_key: keys/file.key\ntest_mode: true\nendpoint: http://localhost:8080/v6/\n"
        )
        .unwrap();
        let parsed = load_config_file(file.path()).unwrap();

        let args = CliArgs {
            account: Some("from-cli".to_string()),
            live: true,
            ..CliArgs::default()
        };
        let config = Config::merge(&args, parsed).unwrap();
        assert_eq!(config.account_name, "from-cli");
        assert_eq!(config.private_key_path, PathBuf::from("keys/file.key"));
        assert_eq!(config.endpoint, "http://localhost:8080/v6");
        assert!(!config.test_mode);
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "acount_name: typo").unwrap();
        let error = load_config_file(file.path()).unwrap_err();
        assert!(format!("{error:#}").contains("failed to parse config"));
    }

    #[test]
    fn config_discovery_prefers_env_then_cwd_then_home() {
        let cwd = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let home_config = home.path().join(".config/transterm/config.yaml");
        std::fs::create_dir_all(home_config.parent().unwrap()).unwrap();
        std::fs::write(&home_config, "account_name: home\n").unwrap();
        let home_dir = Some(home.path().to_path_buf());

        assert_eq!(
            discover_config_path(None, cwd.path(), home_dir.clone()),
            Some(home_config.clone())
        );

        let cwd_yml = cwd.path().join("transterm.yml");
        std::fs::write(&cwd_yml, "account_name: yml\n").unwrap();
        assert_eq!(
            discover_config_path(None, cwd.path(), home_dir.clone()),
            Some(cwd_yml)
        );

        let cwd_yaml = cwd.path().join("transterm.yaml");
        std::fs::write(&cwd_yaml, "account_name: yaml\n").unwrap();
        assert_eq!(
            discover_config_path(Some("  ".to_string()), cwd.path(), home_dir.clone()),
            Some(cwd_yaml)
        );

        assert_eq!(
            discover_config_path(Some("elsewhere.yaml".to_string()), cwd.path(), home_dir),
            Some(PathBuf::from("elsewhere.yaml"))
        );
    }

    #[test]
    fn no_config_file_anywhere_is_fine() {
        let cwd = tempfile::tempdir().unwrap();
        assert_eq!(discover_config_path(None, cwd.path(), None), None);
    }
}
