use anyhow::Error;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "montage.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres:@localhost/montage".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub movies_per_page: usize,
    pub reviews_per_page: usize,
    pub home_list_size: usize,
    pub ranking_list_size: usize,
    pub hero_count: usize,
    pub home_min_reviews: usize,
    pub ranking_min_reviews: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            movies_per_page: 20,
            reviews_per_page: 10,
            home_list_size: 8,
            ranking_list_size: 50,
            hero_count: 5,
            home_min_reviews: 3,
            ranking_min_reviews: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReviewConfig {
    pub max_comment_length: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_comment_length: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccountsConfig {
    pub token_expiry_minutes: i64,
    pub min_password_length: usize,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            token_expiry_minutes: 30,
            min_password_length: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// UTC hour of the daily rating recompute
    pub ranking_update_hour: u32,
    pub ranking_update_minute: u32,
    /// Minute of every hour at which expired tokens are purged
    pub token_cleanup_minute: u32,
    /// Movies loaded per chunk while sweeping the catalog
    pub chunk_size: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            ranking_update_hour: 2,
            ranking_update_minute: 0,
            token_cleanup_minute: 0,
            chunk_size: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub reviews: ReviewConfig,
    pub accounts: AccountsConfig,
    pub maintenance: MaintenanceConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let parsed: Self = toml::from_str(&contents)?;
        Ok(parsed)
    }

    /// Load the file if it exists (defaults otherwise), then let `DATABASE_URL`
    /// from the environment or a `.env` file override the database url.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };

        dotenv::dotenv().ok();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }

        Ok(config)
    }
}
