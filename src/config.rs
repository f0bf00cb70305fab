use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Offset applied when computing the server's calendar day for
    /// today-bounded reads.
    pub utc_offset_hours: i8,
    pub cache_sweep_secs: u64,
    /// Shared secret gating the first-owner bootstrap route. Unset means
    /// the route is disabled.
    pub bootstrap_token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "rollcall".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "rollcall-principals".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };
        let utc_offset_hours = std::env::var("UTC_OFFSET_HOURS")
            .ok()
            .and_then(|v| v.parse::<i8>().ok())
            .unwrap_or(0);
        let cache_sweep_secs = std::env::var("CACHE_SWEEP_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        let bootstrap_token = std::env::var("BOOTSTRAP_TOKEN")
            .ok()
            .filter(|v| !v.is_empty());
        Ok(Self {
            database_url,
            jwt,
            utc_offset_hours,
            cache_sweep_secs,
            bootstrap_token,
        })
    }

    /// The current calendar day in the configured time zone.
    pub fn today(&self) -> time::Date {
        let offset = time::UtcOffset::from_hms(self.utc_offset_hours, 0, 0)
            .unwrap_or(time::UtcOffset::UTC);
        time::OffsetDateTime::now_utc().to_offset(offset).date()
    }
}
