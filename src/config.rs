use std::env;

pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub public_dir: String,
    pub seed_demo_event: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://ensemble.db".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            public_dir: env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".to_string()),
            seed_demo_event: env::var("SEED_DEMO_EVENT")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}
