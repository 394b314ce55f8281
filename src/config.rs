use anyhow::Result;
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    #[allow(dead_code)]
    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database; unset selects the in-memory store (dev/test wiring)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // AI narrative service; token unset disables augmentation
    pub ai_service_url: String,
    pub ai_service_token: Option<String>,
    pub ai_service_timeout_seconds: u64,

    // Expiry sweep
    pub sweep_interval_seconds: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // AI narrative service
        let ai_service_url =
            env::var("AI_SERVICE_URL").unwrap_or_else(|_| "http://ai-service:8000".to_string());
        let ai_service_token = env::var("AI_SERVICE_TOKEN").ok().filter(|s| !s.is_empty());
        let ai_service_timeout_seconds = env::var("AI_SERVICE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120); // 2 minutes default for LLM calls

        // Expiry sweep
        let sweep_interval_seconds = env::var("SWEEP_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            cors_allow_origins,
            ai_service_url,
            ai_service_token,
            ai_service_timeout_seconds,
            sweep_interval_seconds,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Environment::Dev,
            server_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            database_max_connections: 10,
            cors_allow_origins: vec!["http://localhost:3000".to_string()],
            ai_service_url: "http://ai-service:8000".to_string(),
            ai_service_token: None,
            ai_service_timeout_seconds: 120,
            sweep_interval_seconds: 60,
        }
    }
}
