//! Configuration management for the withdraw client
//!
//! Client settings come from built-in defaults, an optional TOML file named by
//! `WITHDRAW_CONFIG`, and a few environment overrides. The network connection
//! profile is a separate JSON document handed to the gateway exactly as read;
//! `${VAR}` substitution applies to the TOML settings only.

use crate::error::{WithdrawError, WithdrawResult};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the optional TOML settings file
pub const CONFIG_ENV: &str = "WITHDRAW_CONFIG";
/// Environment override for the connection profile path
pub const PROFILE_ENV: &str = "WITHDRAW_CONNECTION_PROFILE";
/// Environment override for the wallet directory
pub const WALLET_ENV: &str = "WITHDRAW_WALLET_PATH";
/// Environment override for the identity label
pub const IDENTITY_ENV: &str = "WITHDRAW_IDENTITY";

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
}

/// Root client settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client: ClientConfig,
    pub target: TargetConfig,
    pub discovery: DiscoveryOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection profile path, defaults to `../connection.json` next to the binary
    pub connection_profile: Option<PathBuf>,
    /// Wallet directory, defaults to `<cwd>/wallet`
    pub wallet_path: Option<PathBuf>,
    pub identity: String,
    /// Exit with a distinct status when the identity is missing
    pub fail_on_missing_identity: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection_profile: None,
            wallet_path: None,
            identity: "User1".to_string(),
            fail_on_missing_identity: false,
        }
    }
}

/// Where the transaction goes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub channel: String,
    pub contract: String,
    pub transaction: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            channel: "general".to_string(),
            contract: "asset_management".to_string(),
            transaction: "withdraw".to_string(),
        }
    }
}

/// Service discovery options passed to the gateway on connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    pub enabled: bool,
    /// Connect to peer hosts on the loopback address, keeping their TLS names
    pub as_localhost: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            as_localhost: false,
        }
    }
}

impl Settings {
    /// Load settings from defaults, the optional settings file and the environment
    pub fn load() -> Result<Self> {
        let mut settings = match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        settings.apply_env_overrides();
        settings.validate()?;

        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text after env var substitution
    pub fn from_toml(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input);
        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var(PROFILE_ENV) {
            self.client.connection_profile = Some(PathBuf::from(path));
        }
        if let Ok(path) = env::var(WALLET_ENV) {
            self.client.wallet_path = Some(PathBuf::from(path));
        }
        if let Ok(identity) = env::var(IDENTITY_ENV) {
            self.client.identity = identity;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("client.identity", &self.client.identity),
            ("target.channel", &self.target.channel),
            ("target.contract", &self.target.contract),
            ("target.transaction", &self.target.transaction),
        ];
        for (key, value) in names {
            if value.trim().is_empty() {
                anyhow::bail!("{} must not be empty", key);
            }
        }

        Ok(())
    }

    /// Resolved connection profile path
    pub fn connection_profile_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.client.connection_profile {
            return Ok(path.clone());
        }

        let exe = env::current_exe().context("Failed to locate the running executable")?;
        let exe_dir = exe
            .parent()
            .context("Executable path has no parent directory")?;
        Ok(exe_dir.join("..").join("connection.json"))
    }

    /// Resolved wallet directory
    ///
    /// Resolved once the client is running, so a failure is reported like
    /// any other submission failure.
    pub fn wallet_path(&self) -> WithdrawResult<PathBuf> {
        self.wallet_path_from(env::current_dir())
    }

    fn wallet_path_from(&self, cwd: std::io::Result<PathBuf>) -> WithdrawResult<PathBuf> {
        if let Some(path) = &self.client.wallet_path {
            return Ok(path.clone());
        }

        let cwd = cwd.map_err(|e| {
            WithdrawError::Config(format!("Failed to read the current directory: {}", e))
        })?;
        Ok(cwd.join("wallet"))
    }
}

/// Network connection profile
///
/// Only the parts the gateway needs for endpoint resolution are typed; every
/// other key is kept in `extra`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default)]
    pub client: Option<ProfileClient>,
    #[serde(default)]
    pub organizations: HashMap<String, OrganizationConfig>,
    #[serde(default)]
    pub peers: HashMap<String, PeerConfig>,
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
    /// Directory of the profile file, for relative TLS paths
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileClient {
    #[serde(default)]
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationConfig {
    #[serde(default)]
    pub mspid: Option<String>,
    #[serde(default)]
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeerConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "tlsCACerts")]
    pub tls_ca_certs: Option<TlsCaCerts>,
    #[serde(default, rename = "grpcOptions")]
    pub grpc_options: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsCaCerts {
    #[serde(default)]
    pub pem: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    /// Peer name -> peer role options
    #[serde(default)]
    pub peers: HashMap<String, Value>,
}

impl ConnectionProfile {
    /// Load and parse a connection profile
    pub fn load(path: &Path) -> Result<Self> {
        let profile_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read connection profile: {:?}", path))?;

        let mut profile = Self::from_json(&profile_str)
            .with_context(|| format!("Failed to parse connection profile: {:?}", path))?;
        profile.base_dir = path.parent().map(Path::to_path_buf);

        Ok(profile)
    }

    /// Parse a connection profile from JSON text
    pub fn from_json(input: &str) -> Result<Self> {
        let profile: ConnectionProfile = serde_json::from_str(input)?;
        Ok(profile)
    }

    /// Organization the client belongs to, if the profile names one
    pub fn client_organization(&self) -> Option<&str> {
        self.client.as_ref()?.organization.as_deref()
    }

    /// MSP id of the client organization
    pub fn client_mspid(&self) -> Option<&str> {
        let org = self.client_organization()?;
        self.organizations.get(org)?.mspid.as_deref()
    }

    /// Resolve a relative path against the profile directory
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
