use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Per-minute request quotas for the in-process throttle.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub register_per_min: u32,
    pub login_per_min: u32,
    pub api_per_min: u32,
    pub public_per_min: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub debug: bool,
    pub jwt: JwtConfig,
    pub rate: RateLimitConfig,
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let debug = std::env::var("APP_DEBUG")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "campus-api".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "campus-api-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };
        let rate = RateLimitConfig {
            enabled: std::env::var("RATE_LIMIT_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            register_per_min: env_u32("RATE_LIMIT_REGISTER_PER_MIN", 5),
            login_per_min: env_u32("RATE_LIMIT_LOGIN_PER_MIN", 10),
            api_per_min: env_u32("RATE_LIMIT_API_PER_MIN", 60),
            public_per_min: env_u32("RATE_LIMIT_PUBLIC_PER_MIN", 100),
        };
        Ok(Self {
            database_url,
            debug,
            jwt,
            rate,
        })
    }
}
