use std::env;

const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017";
const DEFAULT_DB_NAME: &str = "foodexpress";
const DEFAULT_PORT: u16 = 3000;

/// AppConfig
///
/// Holds the application's configuration. Immutable once loaded and pulled into
/// handlers through `FromRef`, alongside the repository and identity resolver.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // MongoDB connection string.
    pub mongo_uri: String,
    // Database holding the users, restaurants and menus collections.
    pub db_name: String,
    // TCP port the HTTP server binds on.
    pub port: u16,
    // Runtime environment marker. Selects the log format.
    pub env: Env,
}

/// Env
///
/// The runtime context. Production switches logging to JSON and makes the
/// storage connection string mandatory.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Non-panicking configuration for test state setup.
    fn default() -> Self {
        Self {
            mongo_uri: DEFAULT_MONGO_URI.to_string(),
            db_name: "foodexpress_test".to_string(),
            port: 0,
            env: Env::Local,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables at startup.
    ///
    /// # Panics
    /// Panics when `MONGO_URI` is missing in production, or when `PORT` is set
    /// to something that is not a port number.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let mongo_uri = match env {
            Env::Production => {
                env::var("MONGO_URI").expect("FATAL: MONGO_URI must be set in production.")
            }
            Env::Local => env::var("MONGO_URI").unwrap_or_else(|_| DEFAULT_MONGO_URI.to_string()),
        };

        let db_name = env::var("DB_NAME").unwrap_or_else(|_| DEFAULT_DB_NAME.to_string());

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .expect("FATAL: PORT must be a valid port number."),
            Err(_) => DEFAULT_PORT,
        };

        Self {
            mongo_uri,
            db_name,
            port,
            env,
        }
    }
}
