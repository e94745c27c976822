use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

/// First of several keys that is set (profile-aware).
fn profiled_env_any(profile: &str, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| profiled_env_opt(profile, k))
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub genai: GenAiConfig,
    pub sources: SourcesConfig,
    pub invoker: InvokerConfig,
    pub retention: RetentionConfig,
    pub scheduler: SchedulerConfig,
    pub github: GithubConfig,
    pub digest: DigestConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `LOGWARDEN_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("LOGWARDEN_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            genai: GenAiConfig::from_env_profiled(p),
            sources: SourcesConfig::from_env_profiled(p),
            invoker: InvokerConfig::from_env_profiled(p),
            retention: RetentionConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            github: GithubConfig::from_env_profiled(p),
            digest: DigestConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:     {}:{} namespace={}", self.server.host, self.server.port, self.server.namespace);
        tracing::info!("  postgres:   configured={}", self.postgres.is_configured());
        tracing::info!("  genai:      configured={}", self.genai.is_configured());
        tracing::info!(
            "  sources:    blue={} green={}",
            self.sources.blue_host.as_deref().unwrap_or("(none)"),
            self.sources.green_host.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  invoker:    remote={} credentials={}",
            self.invoker.api_host.as_deref().unwrap_or("(local)"),
            self.invoker.api_key.is_some()
        );
        tracing::info!(
            "  retention:  logs={}d issues={}d",
            self.retention.log_days,
            self.retention.issue_days
        );
        tracing::info!("  scheduler:  utc_offset={} tick_loop={}", self.scheduler.utc_offset, self.scheduler.tick_loop);
        tracing::info!("  github:     configured={}", self.github.is_configured());
        tracing::info!("  digest:     email={} webhook={}", self.digest.email_configured(), self.digest.webhook_url.is_some());
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port, "namespace": self.server.namespace },
            "postgres": { "configured": self.postgres.is_configured() },
            "genai": { "configured": self.genai.is_configured() },
            "sources": { "blue": self.sources.blue_host, "green": self.sources.green_host },
            "invoker": { "api_host": self.invoker.api_host, "credentials": self.invoker.api_key.is_some() },
            "retention": { "logs": self.retention.log_days, "issues": self.retention.issue_days },
            "scheduler": { "utc_offset": self.scheduler.utc_offset },
            "github": { "configured": self.github.is_configured() },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    /// First path segment of the job invocation routes.
    pub namespace: String,
    /// Directory holding `{issue_type}.md` remediation runbooks.
    pub runbooks_dir: PathBuf,
    /// Optional YAML file overriding detection thresholds.
    pub rules_file: Option<PathBuf>,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
            namespace: profiled_env_or(p, "JOB_NAMESPACE", "monitoring"),
            runbooks_dir: PathBuf::from(profiled_env_or(p, "RUNBOOKS_DIR", "knowledge/runbooks")),
            rules_file: profiled_env_opt(p, "RULES_FILE").map(PathBuf::from),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Full URL; takes precedence over the individual fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "DATABASE_URL"),
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "logwarden"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.username.is_some()
    }
}

// ── GenAI agent ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenAiConfig {
    /// Base URL of the OpenAI-compatible agent endpoint.
    pub agent_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Timeout for the periodic log analysis call.
    pub analysis_timeout_secs: u64,
    /// Timeout for the E2E failure analysis call.
    pub e2e_timeout_secs: u64,
}

impl GenAiConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            agent_url: profiled_env_opt(p, "GENAI_AGENT_URL"),
            api_key: profiled_env_opt(p, "GENAI_API_KEY"),
            model: profiled_env_opt(p, "GENAI_MODEL"),
            temperature: profiled_env_or(p, "GENAI_TEMPERATURE", "0.1")
                .parse()
                .unwrap_or(0.1),
            max_tokens: profiled_env_u32(p, "GENAI_MAX_TOKENS", 2000),
            analysis_timeout_secs: profiled_env_u64(p, "GENAI_TIMEOUT_SECS", 30),
            e2e_timeout_secs: profiled_env_u64(p, "GENAI_E2E_TIMEOUT_SECS", 60),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.agent_url.is_some()
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn e2e_timeout(&self) -> Duration {
        Duration::from_secs(self.e2e_timeout_secs)
    }
}

// ── Log sources ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub blue_host: Option<String>,
    pub green_host: Option<String>,
    pub port: u16,
    pub timeout_secs: u64,
    /// How far back each collection run asks for logs.
    pub lookback_minutes: i64,
}

impl SourcesConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            blue_host: profiled_env_opt(p, "BLUE_HOST"),
            green_host: profiled_env_opt(p, "GREEN_HOST"),
            port: profiled_env_u16(p, "LOG_SOURCE_PORT", 3000),
            timeout_secs: profiled_env_u64(p, "LOG_SOURCE_TIMEOUT_SECS", 10),
            lookback_minutes: profiled_env_u64(p, "LOG_COLLECT_LOOKBACK_MINUTES", 5) as i64,
        }
    }

    /// Named sources in collection order; hosts may be unset.
    pub fn nodes(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("blue", self.blue_host.as_deref()),
            ("green", self.green_host.as_deref()),
        ]
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Remote job invoker ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokerConfig {
    /// When set, jobs are invoked over HTTP instead of in-process.
    pub api_host: Option<String>,
    /// `user:password` pair sent as HTTP basic auth.
    pub api_key: Option<String>,
    pub namespace: String,
    pub timeout_secs: u64,
}

impl InvokerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_host: profiled_env_any(p, &["INVOKER_API_HOST", "__OW_API_HOST"]),
            api_key: profiled_env_any(p, &["INVOKER_API_KEY", "__OW_API_KEY"]),
            namespace: profiled_env_any(p, &["INVOKER_NAMESPACE", "__OW_NAMESPACE"])
                .unwrap_or_else(|| "monitoring".to_string()),
            timeout_secs: profiled_env_u64(p, "INVOKER_TIMEOUT_SECS", 30),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.api_host.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Retention ─────────────────────────────────────────────────

/// Resolved issues are always kept this long.
pub const ISSUE_RETENTION_DAYS: u32 = 90;

/// Upper bound for `LOG_RETENTION_DAYS` (ten years).
pub const MAX_LOG_RETENTION_DAYS: u32 = 3650;

/// Keep a configured log retention within `1..=MAX_LOG_RETENTION_DAYS`.
fn clamp_log_days(days: u32) -> u32 {
    let clamped = days.clamp(1, MAX_LOG_RETENTION_DAYS);
    if clamped != days {
        tracing::warn!(days, clamped, "LOG_RETENTION_DAYS out of range, clamping");
    }
    clamped
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub log_days: u32,
    pub issue_days: u32,
}

impl RetentionConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            log_days: clamp_log_days(profiled_env_u32(p, "LOG_RETENTION_DAYS", 30)),
            issue_days: ISSUE_RETENTION_DAYS,
        }
    }

    /// Re-read the retention settings; cleanup calls this once per run.
    pub fn current(profile: &str) -> Self {
        Self::from_env_profiled(profile)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            log_days: 30,
            issue_days: ISSUE_RETENTION_DAYS,
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed offset the cadence is evaluated in, e.g. "+00:00" or "-05:00".
    pub utc_offset: String,
    /// Whether `serve` also runs the minute tick loop.
    pub tick_loop: bool,
    /// Max unanalyzed entries sent to the AI per analysis run.
    pub analysis_batch: u32,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            utc_offset: profiled_env_or(p, "SCHEDULER_UTC_OFFSET", "+00:00"),
            tick_loop: profiled_env_bool(p, "SCHEDULER_TICK_LOOP", true),
            analysis_batch: profiled_env_u32(p, "ANALYSIS_BATCH_SIZE", 100),
        }
    }

    pub fn offset(&self) -> Result<FixedOffset, CoreError> {
        parse_utc_offset(&self.utc_offset)
    }
}

/// Parse `Z`, `+HH:MM`, `-HH:MM` or `+HHMM` into a fixed offset.
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset, CoreError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| CoreError::Config(s.to_string()));
    }
    let invalid = || CoreError::Config(format!("invalid UTC offset: {s}"));
    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

// ── GitHub alerts ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// `owner/name` of the repository receiving alert issues.
    pub alerts_repo: Option<String>,
    pub token: Option<String>,
}

impl GithubConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            alerts_repo: profiled_env_opt(p, "ALERTS_REPO"),
            token: profiled_env_opt(p, "GH_TOKEN"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.alerts_repo.is_some() && self.token.is_some()
    }
}

// ── Digest delivery ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_tls: bool,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub webhook_url: Option<String>,
}

impl DigestConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            smtp_host: profiled_env_opt(p, "SMTP_HOST"),
            smtp_port: profiled_env_opt(p, "SMTP_PORT").and_then(|v| v.parse().ok()),
            smtp_tls: profiled_env_bool(p, "SMTP_TLS", true),
            smtp_username: profiled_env_opt(p, "SMTP_USERNAME"),
            smtp_password: profiled_env_opt(p, "SMTP_PASSWORD"),
            from: profiled_env_opt(p, "DIGEST_FROM"),
            to: profiled_env_opt(p, "DIGEST_TO")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            webhook_url: profiled_env_opt(p, "DIGEST_WEBHOOK_URL"),
        }
    }

    pub fn email_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from.is_some() && !self.to.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utc_offsets() {
        assert_eq!(parse_utc_offset("+00:00").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_utc_offset("-0530").unwrap().local_minus_utc(), -19800);
        assert!(parse_utc_offset("2:00").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
    }

    #[test]
    fn postgres_url_takes_precedence() {
        let mut pg = PostgresConfig {
            url: None,
            host: "db".to_string(),
            port: 5432,
            database: "logs".to_string(),
            username: Some("app".to_string()),
            password: Some("secret".to_string()),
            ssl_mode: "require".to_string(),
            max_connections: 5,
        };
        assert_eq!(
            pg.connection_string(),
            "postgres://app:secret@db:5432/logs?sslmode=require"
        );
        pg.url = Some("postgres://other/db".to_string());
        assert_eq!(pg.connection_string(), "postgres://other/db");
    }

    #[test]
    fn retention_defaults() {
        let r = RetentionConfig::default();
        assert_eq!(r.log_days, 30);
        assert_eq!(r.issue_days, 90);
    }

    #[test]
    fn log_retention_is_clamped() {
        assert_eq!(clamp_log_days(200_000_000), MAX_LOG_RETENTION_DAYS);
        assert_eq!(clamp_log_days(0), 1);
        assert_eq!(clamp_log_days(30), 30);
    }
}
