use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};

pub const DEFAULT_DATABASE: &str = "test";
pub const DEFAULT_MODEL_INDEX: &str = "loopback__model__name";
pub const DEFAULT_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(alias = "db")]
    pub database: String,                 // Global default physical database
    pub model_index: String,              // Default discriminator field

    pub page_size: usize,                 // Paging threshold and default native limit

    pub index_model_prefix: String,       // _design/<model prefix>__<Model>__<property prefix>__<index>
    pub index_property_prefix: String,

    pub lazy_connect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            url: None,
            username: None,
            password: None,
            database: DEFAULT_DATABASE.to_string(),
            model_index: DEFAULT_MODEL_INDEX.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            index_model_prefix: "LBModel".to_string(),
            index_property_prefix: "LBIndex".to_string(),
            lazy_connect: false,
        }
    }
}

impl Config {
    /// Load datasource settings from JSON; missing keys take their defaults
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let mut config: Config = serde_json::from_value(value)?;
        config.normalize_url();
        config.validate()?;
        Ok(config)
    }

    pub fn with_url(url: &str) -> Self {
        let mut config = Config {
            url: Some(url.to_string()),
            ..Config::default()
        };
        config.normalize_url();
        config
    }

    /// Splits a database name off the URL path: `http://host:5984/shop`
    /// becomes url `http://host:5984` and database `shop`, unless a database
    /// was configured explicitly.
    pub fn normalize_url(&mut self) {
        let Some(url) = self.url.clone() else { return };
        let authority_start = url.find("://").map(|i| i + 3).unwrap_or(0);
        let Some(path_start) = url[authority_start..].find('/').map(|i| i + authority_start) else {
            return;
        };
        let path = &url[path_start..];
        if path == "/" {
            self.url = Some(url[..path_start].to_string());
            return;
        }
        let db = path.trim_start_matches('/').split('/').next().unwrap_or("");
        if !db.is_empty() && self.database == DEFAULT_DATABASE {
            self.database = db.to_string();
        }
        self.url = Some(url[..path_start].to_string());
    }

    pub fn validate(&self) -> Result<()> {
        let has_credentials = self.username.is_some() && self.password.is_some();
        if self.url.is_none() && !has_credentials {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "Invalid settings: \"url\" OR \"username\" AND \"password\" required".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "Invalid settings: \"pageSize\" must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
