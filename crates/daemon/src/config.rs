// Daemon configuration.
//
// File: `~/.courier/config.toml`, or the path given with `--config`.
// Every setting that carries a secret or differs per deployment can be
// overridden by a `COURIER_*` environment variable.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root directory for courier state: `~/.courier/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".courier"))
}

/// Path to the default config file: `~/.courier/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Root config ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub db: DbConfig,
    pub features: FeatureFlags,
    pub git: GitExportConfig,
    pub github: GithubConfig,
    pub forum: ForumConfig,
    pub canvas: CanvasConfig,
    pub export: ExportConfig,
    pub course_sync: CourseSyncConfig,
    pub content: ContentConfig,
    pub worker: WorkerConfig,
}

impl DaemonConfig {
    /// Load configuration and apply environment overrides.
    ///
    /// An explicit path must exist. Without one, the default path is used
    /// when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(default_path) => Self::load_from(&default_path)?,
                None => Self::default(),
            },
        };
        config.apply_env_fn(|key| std::env::var(key))?;
        Ok(config)
    }

    /// Load from a specific path without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Apply `COURIER_*` overrides read through `env`.
    ///
    /// | Variable | Setting |
    /// |---|---|
    /// | `COURIER_LISTEN_ADDR` | `server.listen_addr` |
    /// | `COURIER_LOG_FILTER` / `COURIER_LOG_FORMAT` | `log.filter` / `log.format` |
    /// | `COURIER_DB_PATH` | `db.path` |
    /// | `COURIER_GIT_EXPORT_DIR` | `git.export_dir` |
    /// | `COURIER_GIT_WEBHOOK_SECRET` / `COURIER_GIT_IMPORT_BRANCH` | `git.webhook_secret` / `git.import_branch` |
    /// | `COURIER_GITHUB_ORG_API_URL` / `COURIER_GITHUB_ACCESS_TOKEN` | `github.*` |
    /// | `COURIER_FORUM_BASE_URL` / `COURIER_FORUM_API_KEY` | `forum.*` |
    /// | `COURIER_CANVAS_BASE_URL` / `COURIER_CANVAS_ACCESS_TOKEN` | `canvas.*` |
    /// | `COURIER_EXPORT_BUCKET` / `COURIER_EXPORT_REGION` / `COURIER_EXPORT_ENDPOINT` | `export.*` |
    /// | `COURIER_AWS_ACCESS_KEY_ID` / `COURIER_AWS_SECRET_ACCESS_KEY` | `export.*` credentials |
    /// | `COURIER_SERVICE_WORKER_USERNAME` | `course_sync.service_worker_username` |
    /// | `COURIER_WORKER_CONCURRENCY` / `COURIER_WORKER_ON_UNEXPECTED` | `worker.*` |
    /// | `COURIER_FEATURE_<NAME>` | `features.<name>` (`true`/`false`) |
    pub fn apply_env_fn<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let get = |key: &str| env(key).ok().filter(|value| !value.trim().is_empty());

        if let Some(value) = get("COURIER_LISTEN_ADDR") {
            self.server.listen_addr = value;
        }
        if let Some(value) = get("COURIER_LOG_FILTER") {
            self.log.filter = value;
        }
        if let Some(value) = get("COURIER_LOG_FORMAT") {
            self.log.format = match value.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                _ => return Err(ConfigError::invalid("COURIER_LOG_FORMAT", &value)),
            };
        }
        if let Some(value) = get("COURIER_DB_PATH") {
            self.db.path = PathBuf::from(value);
        }
        if let Some(value) = get("COURIER_GIT_EXPORT_DIR") {
            self.git.export_dir = PathBuf::from(value);
        }
        if let Some(value) = get("COURIER_GIT_WEBHOOK_SECRET") {
            self.git.webhook_secret = Some(value);
        }
        if let Some(value) = get("COURIER_GIT_IMPORT_BRANCH") {
            self.git.import_branch = value;
        }
        if let Some(value) = get("COURIER_GITHUB_ORG_API_URL") {
            self.github.org_api_url = Some(value);
        }
        if let Some(value) = get("COURIER_GITHUB_ACCESS_TOKEN") {
            self.github.access_token = Some(value);
        }
        if let Some(value) = get("COURIER_FORUM_BASE_URL") {
            self.forum.base_url = Some(value);
        }
        if let Some(value) = get("COURIER_FORUM_API_KEY") {
            self.forum.api_key = Some(value);
        }
        if let Some(value) = get("COURIER_CANVAS_BASE_URL") {
            self.canvas.base_url = Some(value);
        }
        if let Some(value) = get("COURIER_CANVAS_ACCESS_TOKEN") {
            self.canvas.access_token = Some(value);
        }
        if let Some(value) = get("COURIER_EXPORT_BUCKET") {
            self.export.bucket = Some(value);
        }
        if let Some(value) = get("COURIER_EXPORT_REGION") {
            self.export.region = value;
        }
        if let Some(value) = get("COURIER_EXPORT_ENDPOINT") {
            self.export.endpoint = Some(value);
        }
        if let Some(value) = get("COURIER_AWS_ACCESS_KEY_ID") {
            self.export.access_key_id = Some(value);
        }
        if let Some(value) = get("COURIER_AWS_SECRET_ACCESS_KEY") {
            self.export.secret_access_key = Some(value);
        }
        if let Some(value) = get("COURIER_SERVICE_WORKER_USERNAME") {
            self.course_sync.service_worker_username = Some(value);
        }
        if let Some(value) = get("COURIER_WORKER_CONCURRENCY") {
            self.worker.concurrency = value
                .parse()
                .ok()
                .filter(|n: &usize| *n > 0)
                .ok_or_else(|| ConfigError::invalid("COURIER_WORKER_CONCURRENCY", &value))?;
        }
        if let Some(value) = get("COURIER_WORKER_ON_UNEXPECTED") {
            self.worker.on_unexpected = match value.to_ascii_lowercase().as_str() {
                "log" => UnexpectedErrorPolicy::Log,
                "fatal" => UnexpectedErrorPolicy::Fatal,
                _ => return Err(ConfigError::invalid("COURIER_WORKER_ON_UNEXPECTED", &value)),
            };
        }

        for name in FeatureFlags::NAMES {
            let key = format!("COURIER_FEATURE_{}", name.to_ascii_uppercase());
            if let Some(value) = get(&key) {
                let enabled = parse_bool(&value).ok_or_else(|| ConfigError::invalid(&key, &value))?;
                self.features.set(name, enabled);
            }
        }

        Ok(())
    }

    /// Listen address, validated.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .listen_addr
            .parse()
            .map_err(|_| ConfigError::invalid("server.listen_addr", &self.server.listen_addr))
    }

    /// Human-readable notes about enabled features that lack the settings
    /// they need. Tasks for those features end as precondition failures.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let repo_creation = self.features.auto_repo_creation || self.features.auto_library_repo_creation;
        if repo_creation && (self.github.org_api_url.is_none() || self.github.access_token.is_none())
        {
            warnings.push(
                "repository creation is enabled but github.org_api_url or github.access_token is missing"
                    .to_string(),
            );
        }
        if self.features.course_sync && self.course_sync.service_worker_username.is_none() {
            warnings.push(
                "course sync is enabled but course_sync.service_worker_username is missing".to_string(),
            );
        }
        if self.features.username_changer && self.forum.base_url.is_none() {
            warnings.push("username changer is enabled but forum.base_url is missing".to_string());
        }
        if self.features.canvas && (self.canvas.base_url.is_none() || self.canvas.access_token.is_none())
        {
            warnings.push(
                "canvas sync is enabled but canvas.base_url or canvas.access_token is missing"
                    .to_string(),
            );
        }
        if self.export.bucket.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            warnings.push("export.bucket is not configured; archive exports will be refused".to_string());
        }
        if let Err(error) = self.content.validate() {
            warnings.push(error.to_string());
        }
        warnings
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ── Sections ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: String,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: "127.0.0.1:8765".into(), max_body_bytes: 8 * 1024 * 1024 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `info,courier_daemon=debug`).
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: "info".into(), format: LogFormat::Text }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        let path = global_dir()
            .map(|dir| dir.join("meta.db"))
            .unwrap_or_else(|| PathBuf::from("courier-meta.db"));
        Self { path }
    }
}

/// Feature toggles. Everything is off until explicitly enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureFlags {
    pub username_changer: bool,
    pub git_auto_export: bool,
    pub git_auto_library_export: bool,
    pub auto_repo_creation: bool,
    pub auto_library_repo_creation: bool,
    pub course_sync: bool,
    pub canvas: bool,
}

impl FeatureFlags {
    pub const NAMES: [&'static str; 7] = [
        "username_changer",
        "git_auto_export",
        "git_auto_library_export",
        "auto_repo_creation",
        "auto_library_repo_creation",
        "course_sync",
        "canvas",
    ];

    /// Set a flag by name. Returns false for unknown names.
    pub fn set(&mut self, name: &str, enabled: bool) -> bool {
        let slot = match name {
            "username_changer" => &mut self.username_changer,
            "git_auto_export" => &mut self.git_auto_export,
            "git_auto_library_export" => &mut self.git_auto_library_export,
            "auto_repo_creation" => &mut self.auto_repo_creation,
            "auto_library_repo_creation" => &mut self.auto_library_repo_creation,
            "course_sync" => &mut self.course_sync,
            "canvas" => &mut self.canvas,
            _ => return false,
        };
        *slot = enabled;
        true
    }

    /// Whether Git export is enabled for this kind of content.
    pub fn git_export_enabled(&self, is_library: bool) -> bool {
        if is_library {
            self.git_auto_library_export
        } else {
            self.git_auto_export
        }
    }

    /// Whether repository creation is enabled for this kind of content.
    pub fn repo_creation_enabled(&self, is_library: bool) -> bool {
        if is_library {
            self.auto_library_repo_creation
        } else {
            self.auto_repo_creation
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitExportConfig {
    /// Directory holding one local clone per bound repository.
    pub export_dir: PathBuf,
    /// Commit author used when the publisher is unknown.
    pub default_author: String,
    /// Domain used to build `user@domain` author emails for publishers.
    pub author_email_domain: String,
    /// Shared secret for `X-Hub-Signature-256` on push webhooks. Imports are
    /// refused while unset.
    pub webhook_secret: Option<String>,
    /// Only pushes to this branch trigger an import.
    pub import_branch: String,
}

impl Default for GitExportConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("/openedx/export_course_repos"),
            default_author: "Courier Export <export@courier.local>".into(),
            author_email_domain: "courier.local".into(),
            webhook_secret: None,
            import_branch: "master".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GithubConfig {
    /// Organization API root, e.g. `https://api.github.com/orgs/mitodl`.
    pub org_api_url: Option<String>,
    pub access_token: Option<String>,
    pub api_version: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self { org_api_url: None, access_token: None, api_version: "2022-11-28".into() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForumConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CanvasConfig {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    /// `points_possible` sent with every synced assignment.
    pub assignment_points: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self { base_url: None, access_token: None, assignment_points: 100.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub bucket: Option<String>,
    pub region: String,
    /// Override for S3-compatible stores; defaults to `https://{bucket}.s3.{region}.amazonaws.com`.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: "us-east-1".into(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CourseSyncConfig {
    /// Account the platform attributes synced content to.
    pub service_worker_username: Option<String>,
}

/// Backing stores and the key-prefix routes that select them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContentConfig {
    pub default_store: String,
    pub stores: Vec<StoreConfig>,
    pub routes: Vec<RouteConfig>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            default_store: "primary".into(),
            stores: vec![StoreConfig { id: "primary".into(), kind: StoreKind::Sqlite }],
            routes: Vec::new(),
        }
    }
}

impl ContentConfig {
    /// Every route and the default must name a declared store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let known = |id: &str| self.stores.iter().any(|store| store.id == id);
        if !known(&self.default_store) {
            return Err(ConfigError::invalid("content.default_store", &self.default_store));
        }
        if let Some(route) = self.routes.iter().find(|route| !known(&route.store)) {
            return Err(ConfigError::invalid("content.routes.store", &route.store));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub id: String,
    pub kind: StoreKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Key prefix, e.g. `library-v1:` or `course-v1:MITx+`.
    pub prefix: String,
    pub store: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    /// Idle poll interval; committed work also wakes workers directly.
    pub poll_interval_ms: u64,
    pub on_unexpected: UnexpectedErrorPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 4, poll_interval_ms: 1_000, on_unexpected: UnexpectedErrorPolicy::Log }
    }
}

/// What the worker pool does after a task fails in an unexpected way.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnexpectedErrorPolicy {
    /// Log with full context and keep serving.
    Log,
    /// Log, then stop the daemon so supervision and alerting notice.
    Fatal,
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    Invalid { key: String, value: String },
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        Self::Invalid { key: key.to_string(), value: value.to_string() }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
            Self::Invalid { key, value } => write!(f, "invalid value `{value}` for `{key}`"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_disable_every_feature() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.features, FeatureFlags::default());
        assert_eq!(cfg.server.listen_addr, "127.0.0.1:8765");
        assert_eq!(cfg.git.export_dir, PathBuf::from("/openedx/export_course_repos"));
        assert_eq!(cfg.worker.on_unexpected, UnexpectedErrorPolicy::Log);
        assert_eq!(cfg.content.default_store, "primary");
        assert!(cfg.content.validate().is_ok());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
[features]
git_auto_export = true

[export]
bucket = "course-exports"
"#;
        let cfg: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert!(cfg.features.git_auto_export);
        assert!(!cfg.features.canvas);
        assert_eq!(cfg.export.bucket.as_deref(), Some("course-exports"));
        assert_eq!(cfg.export.region, "us-east-1");
        assert_eq!(cfg.worker.concurrency, 4);
    }

    #[test]
    fn content_routes_parse_from_toml() {
        let toml_str = r#"
[content]
default_store = "split"

[[content.stores]]
id = "split"
kind = "sqlite"

[[content.stores]]
id = "legacy"
kind = "memory"

[[content.routes]]
prefix = "library-v1:"
store = "legacy"
"#;
        let cfg: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.content.stores.len(), 2);
        assert_eq!(cfg.content.routes[0].store, "legacy");
        assert!(cfg.content.validate().is_ok());
    }

    #[test]
    fn content_validation_rejects_unknown_store() {
        let mut content = ContentConfig::default();
        content.routes.push(RouteConfig { prefix: "lib:".into(), store: "missing".into() });
        let error = content.validate().unwrap_err();
        assert!(error.to_string().contains("missing"));
    }

    #[test]
    fn env_overrides_secrets_and_flags() {
        let mut m = HashMap::new();
        m.insert("COURIER_EXPORT_BUCKET", "exports");
        m.insert("COURIER_CANVAS_ACCESS_TOKEN", "canvas-token");
        m.insert("COURIER_FEATURE_COURSE_SYNC", "true");
        m.insert("COURIER_FEATURE_CANVAS", "1");
        m.insert("COURIER_WORKER_ON_UNEXPECTED", "fatal");
        m.insert("COURIER_LOG_FORMAT", "json");
        m.insert("COURIER_GIT_WEBHOOK_SECRET", "hook-secret");

        let mut cfg = DaemonConfig::default();
        cfg.apply_env_fn(env_from_map(m)).unwrap();

        assert_eq!(cfg.git.webhook_secret.as_deref(), Some("hook-secret"));
        assert_eq!(cfg.git.import_branch, "master");

        assert_eq!(cfg.export.bucket.as_deref(), Some("exports"));
        assert_eq!(cfg.canvas.access_token.as_deref(), Some("canvas-token"));
        assert!(cfg.features.course_sync);
        assert!(cfg.features.canvas);
        assert!(!cfg.features.username_changer);
        assert_eq!(cfg.worker.on_unexpected, UnexpectedErrorPolicy::Fatal);
        assert_eq!(cfg.log.format, LogFormat::Json);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut m = HashMap::new();
        m.insert("COURIER_EXPORT_BUCKET", "   ");
        let mut cfg = DaemonConfig::default();
        cfg.apply_env_fn(env_from_map(m)).unwrap();
        assert!(cfg.export.bucket.is_none());
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let mut m = HashMap::new();
        m.insert("COURIER_FEATURE_CANVAS", "maybe");
        let mut cfg = DaemonConfig::default();
        let error = cfg.apply_env_fn(env_from_map(m)).unwrap_err();
        assert!(error.to_string().contains("COURIER_FEATURE_CANVAS"));

        let mut m = HashMap::new();
        m.insert("COURIER_WORKER_CONCURRENCY", "0");
        let error = cfg.apply_env_fn(env_from_map(m)).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { .. }));
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = DaemonConfig::default();
        cfg.features.username_changer = true;
        cfg.forum.base_url = Some("http://forum:4567".into());
        cfg.save_to(&path).unwrap();

        let loaded = DaemonConfig::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = DaemonConfig::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn warnings_flag_enabled_features_without_settings() {
        let mut cfg = DaemonConfig::default();
        cfg.features.course_sync = true;
        cfg.features.auto_repo_creation = true;
        let warnings = cfg.warnings();
        assert!(warnings.iter().any(|w| w.contains("service_worker_username")));
        assert!(warnings.iter().any(|w| w.contains("github.org_api_url")));
        assert!(warnings.iter().any(|w| w.contains("export.bucket")));
    }

    #[test]
    fn feature_flag_helpers_split_courses_and_libraries() {
        let mut flags = FeatureFlags::default();
        assert!(flags.set("git_auto_library_export", true));
        assert!(!flags.set("unknown_flag", true));
        assert!(flags.git_export_enabled(true));
        assert!(!flags.git_export_enabled(false));
        assert!(!flags.repo_creation_enabled(true));
    }

    #[test]
    fn listen_addr_is_validated() {
        let mut cfg = DaemonConfig::default();
        assert!(cfg.listen_addr().is_ok());
        cfg.server.listen_addr = "not an addr".into();
        assert!(cfg.listen_addr().is_err());
    }
}
