//! Environment configuration.

/// Settings read from the environment (a `.env` file is honored).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_db_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            max_db_connections: std::env::var("REFNET_MAX_DB_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        }
    }

    /// Connect a pool from this configuration.
    #[cfg(feature = "database")]
    pub async fn connect_pool(&self) -> anyhow::Result<sqlx::PgPool> {
        let url = self
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(self.max_db_connections)
            .connect(url)
            .await?;
        Ok(pool)
    }
}
