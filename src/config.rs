//! Process configuration, read once at startup from the environment (and `.env`).

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DocumentIntelligenceConfig {
    pub endpoint: Option<String>,
    pub key: Option<String>,
    pub model_id: String,
    pub api_version: String,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    /// Return a tagged placeholder instead of an error when the service fails.
    pub degraded_mode: bool,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub service_role_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: String,
    pub database_path: PathBuf,
    pub upload_dir: PathBuf,
    /// In-memory database; a token accepted by the identity provider is enough.
    pub skip_db: bool,
    /// Offline mode: stub identity provider, in-memory vector memory, no probes.
    pub offline: bool,
    pub document_intelligence: DocumentIntelligenceConfig,
    pub chat: ChatConfig,
    pub memory: MemoryConfig,
    pub graph: GraphConfig,
    pub identity: IdentityConfig,
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cfo-gateway")
        .join("cfo_gateway.db")
}

fn flag(value: Option<String>) -> bool {
    matches!(value.as_deref(), Some("1" | "true" | "True" | "TRUE"))
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| {
            get(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        AppConfig {
            addr: or("API_SERVER_ADDR", "0.0.0.0:8000"),
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_database_path),
            upload_dir: PathBuf::from(or("UPLOAD_DIR", "uploads")),
            skip_db: flag(get("SKIP_DB")),
            offline: flag(get("SKIP_SERVICE_CHECKS")),
            document_intelligence: DocumentIntelligenceConfig {
                endpoint: get("DI_ENDPOINT").map(|e| e.trim_end_matches('/').to_string()),
                key: get("DI_KEY"),
                model_id: or("DI_MODEL_ID", "prebuilt-layout"),
                api_version: or("DI_API_VERSION", "2024-11-30"),
                poll_interval: Duration::from_millis(number("DI_POLL_INTERVAL_MS", 2000)),
                poll_attempts: number("DI_POLL_ATTEMPTS", 60).min(u32::MAX as u64) as u32,
                degraded_mode: flag(get("DI_DEGRADED_MODE")),
            },
            chat: ChatConfig {
                api_key: get("OPENAI_API_KEY"),
                model: or("OPENAI_MODEL", "gpt-4-turbo-preview"),
                base_url: or("OPENAI_BASE_URL", "https://api.openai.com")
                    .trim_end_matches('/')
                    .to_string(),
            },
            memory: MemoryConfig {
                api_url: get("ZEP_API_URL").map(|u| u.trim_end_matches('/').to_string()),
                api_key: get("ZEP_API_KEY"),
            },
            graph: GraphConfig {
                uri: get("NEO4J_URI").map(|u| u.trim_end_matches('/').to_string()),
                username: get("NEO4J_USERNAME"),
                password: get("NEO4J_PASSWORD"),
                database: or("NEO4J_DATABASE", "neo4j"),
            },
            identity: IdentityConfig {
                url: get("SUPABASE_URL").map(|u| u.trim_end_matches('/').to_string()),
                anon_key: get("SUPABASE_ANON_KEY"),
                service_role_key: get("SUPABASE_SERVICE_ROLE_KEY"),
            },
        }
    }

    /// Offline, in-memory configuration for tests.
    pub fn offline_for_tests(upload_dir: PathBuf) -> Self {
        let mut config = Self::from_lookup(|key| match key {
            "SKIP_DB" | "SKIP_SERVICE_CHECKS" => Some("1".to_string()),
            _ => None,
        });
        config.upload_dir = upload_dir;
        config
    }
}
