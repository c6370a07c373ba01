use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub session: SessionConfig,

    pub identity: IdentityConfig,

    pub storage: StorageConfig,

    pub authorization: AuthorizationConfig,

    pub security: SecurityConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            worker_threads: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,

    pub port: u16,

    /// How many successive ports to try when the configured one is taken.
    pub port_retry_attempts: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Default: true for production safety. Set to false for local development without HTTPS.
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            port_retry_attempts: 5,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            secure_cookies: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStoreKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub store: SessionStoreKind,

    /// Database URL for the SQLite session store.
    pub database_path: String,

    pub cookie_name: String,

    /// Hard upper bound on a session's age, counted from login.
    pub lifetime_seconds: u64,

    /// Interval of the expired-session sweep for persistent stores.
    pub cleanup_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: SessionStoreKind::Sqlite,
            database_path: "sqlite:data/sessions.db".to_string(),
            cookie_name: "academy.sid".to_string(),
            lifetime_seconds: 4 * 60 * 60,
            cleanup_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Firebase project id; the expected `aud` of ID tokens.
    pub project_id: String,

    /// Web API key used for password sign-in.
    pub api_key: String,

    pub jwks_url: String,

    pub identity_toolkit_url: String,

    /// Seconds to keep fetched signing keys before refreshing.
    pub jwks_cache_seconds: u64,

    pub clock_skew_seconds: u64,

    pub request_timeout_seconds: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_key: String::new(),
            jwks_url:
                "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com"
                    .to_string(),
            identity_toolkit_url: "https://identitytoolkit.googleapis.com".to_string(),
            jwks_cache_seconds: 60 * 60,
            clock_skew_seconds: 60,
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Sqlite,
    Firestore,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Firestore => write!(f, "firestore"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    pub database_path: String,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,

    /// Path to a Google service-account JSON file (Firestore backend).
    pub service_account_path: Option<String>,

    /// `host:port` of a Firestore emulator; disables OAuth when set.
    pub firestore_emulator_host: Option<String>,

    pub firestore_base_url: String,

    pub admins_collection: String,

    /// Create the bootstrap admin on startup when no admin exists.
    pub seed_default_admin: bool,

    pub bootstrap_username: String,

    pub bootstrap_password: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_path: "sqlite:data/academy.db".to_string(),
            max_db_connections: 5,
            min_db_connections: 1,
            service_account_path: None,
            firestore_emulator_host: None,
            firestore_base_url: "https://firestore.googleapis.com".to_string(),
            admins_collection: "admins".to_string(),
            seed_default_admin: false,
            bootstrap_username: "admin".to_string(),
            bootstrap_password: "password123".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolePolicyKind {
    /// The token's `role` claim must be `admin`.
    Claim,
    /// The token's email must match exactly one admin record.
    AllowList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub policy: RolePolicyKind,

    pub admin_role: String,

    /// Accept `{ username, password }` logins checked against local admin records.
    pub legacy_login_enabled: bool,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            policy: RolePolicyKind::AllowList,
            admin_role: "admin".to_string(),
            legacy_login_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Rehash legacy bcrypt passwords with Argon2id on successful login
    pub auto_migrate_password_hashes: bool,

    /// Login endpoint throttling and lockout policy.
    pub auth_throttle: AuthThrottleConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            auto_migrate_password_hashes: true,
            auth_throttle: AuthThrottleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthThrottleConfig {
    pub enabled: bool,

    /// Max failed attempts in the window before lockout.
    pub max_attempts: u32,

    /// Rolling window for counting failures.
    pub window_seconds: u64,

    /// Temporary lockout duration once max attempts is reached.
    pub lockout_seconds: u64,
}

impl Default for AuthThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            window_seconds: 5 * 60,
            lockout_seconds: 2 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "academy-admin".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::load_file()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Applies the environment variables recognised by the service.
    ///
    /// `lookup` is the variable source, `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {port}"))?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.storage.database_path = url;
        }
        if let Some(backend) = lookup("STORAGE_BACKEND") {
            self.storage.backend = match backend.to_ascii_lowercase().as_str() {
                "sqlite" => StorageBackend::Sqlite,
                "firestore" => StorageBackend::Firestore,
                other => anyhow::bail!("Unknown STORAGE_BACKEND: {other}"),
            };
        }
        if let Some(path) = lookup("FIREBASE_SERVICE_ACCOUNT") {
            self.storage.service_account_path = Some(path);
        }
        if let Some(host) = lookup("FIRESTORE_EMULATOR_HOST") {
            self.storage.firestore_emulator_host = Some(host);
        }
        if let Some(seed) = lookup("ENABLE_FIRESTORE_SEED") {
            self.storage.seed_default_admin = seed == "true";
        }
        if let Some(project_id) = lookup("FIREBASE_PROJECT_ID") {
            self.identity.project_id = project_id;
        }
        if let Some(api_key) = lookup("FIREBASE_API_KEY") {
            self.identity.api_key = api_key;
        }
        if let Some(policy) = lookup("AUTH_ROLE_POLICY") {
            self.authorization.policy = match policy.to_ascii_lowercase().as_str() {
                "claim" => RolePolicyKind::Claim,
                "allow_list" | "allowlist" => RolePolicyKind::AllowList,
                other => anyhow::bail!("Unknown AUTH_ROLE_POLICY: {other}"),
            };
        }
        Ok(())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("academy-admin").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".academy-admin").join("config.toml"));
        }

        paths
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = PathBuf::from("config.toml");
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.lifetime_seconds == 0 {
            anyhow::bail!("session.lifetime_seconds must be > 0");
        }

        if self.storage.backend == StorageBackend::Firestore {
            if self.storage.service_account_path.is_none()
                && self.storage.firestore_emulator_host.is_none()
            {
                anyhow::bail!(
                    "Firestore backend needs storage.service_account_path or storage.firestore_emulator_host"
                );
            }
            if self.storage.firestore_emulator_host.is_some() && self.identity.project_id.is_empty()
            {
                anyhow::bail!("Firestore emulator requires identity.project_id");
            }
        }

        if self.authorization.policy == RolePolicyKind::Claim
            && self.authorization.admin_role.is_empty()
        {
            anyhow::bail!("authorization.admin_role cannot be empty for the claim policy");
        }

        let token_only = self.authorization.policy == RolePolicyKind::Claim
            || !self.authorization.legacy_login_enabled;
        if token_only && !self.token_login_configured() {
            anyhow::bail!(
                "identity.project_id is required when logins depend on identity tokens"
            );
        }

        Ok(())
    }

    /// Token logins are only possible once the expected audience is known.
    #[must_use]
    pub fn token_login_configured(&self) -> bool {
        !self.identity.project_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.session.lifetime_seconds, 14_400);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.authorization.policy, RolePolicyKind::AllowList);
        assert_eq!(config.security.auth_throttle.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[storage]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [authorization]
            policy = "claim"

            [session]
            store = "memory"
            lifetime_seconds = 600
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.authorization.policy, RolePolicyKind::Claim);
        assert_eq!(config.session.store, SessionStoreKind::Memory);
        assert_eq!(config.session.lifetime_seconds, 600);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("STORAGE_BACKEND", "firestore"),
            ("FIREBASE_SERVICE_ACCOUNT", "./data/sa.json"),
            ("ENABLE_FIRESTORE_SEED", "true"),
            ("AUTH_ROLE_POLICY", "claim"),
            ("FIREBASE_PROJECT_ID", "academy-test"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Firestore);
        assert_eq!(
            config.storage.service_account_path.as_deref(),
            Some("./data/sa.json")
        );
        assert!(config.storage.seed_default_admin);
        assert_eq!(config.authorization.policy, RolePolicyKind::Claim);
        assert_eq!(config.identity.project_id, "academy-test");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_reject_garbage() {
        let mut config = Config::default();
        assert!(
            config
                .apply_env_overrides(|key| (key == "PORT").then(|| "eighty".to_string()))
                .is_err()
        );
        assert!(
            config
                .apply_env_overrides(|key| (key == "STORAGE_BACKEND").then(|| "mongo".to_string()))
                .is_err()
        );
    }

    #[test]
    fn test_firestore_requires_credentials() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Firestore;
        assert!(config.validate().is_err());

        config.storage.firestore_emulator_host = Some("localhost:8081".to_string());
        config.identity.project_id = "academy-test".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_login_requires_project_id() {
        let mut config = Config::default();
        config.authorization.policy = RolePolicyKind::Claim;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.authorization.legacy_login_enabled = false;
        assert!(config.validate().is_err());

        config.identity.project_id = "academy-test".to_string();
        assert!(config.validate().is_ok());
    }
}
