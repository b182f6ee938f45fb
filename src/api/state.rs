//! Application state management.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::warn;

use super::auth::{AuthConfig, JwtAuth};
use crate::config::ServerConfig;
use crate::engine::Engine;

/// Shared application state.
pub struct AppState {
    /// The orchestration engine
    pub engine: Arc<Engine>,
    /// JWT authentication handler
    pub jwt_auth: JwtAuth,
    /// Server configuration
    pub config: ServerConfig,
    /// Server start time
    pub start_time: Instant,
    /// Accounts allowed to log in
    pub users: RwLock<HashMap<String, UserCredentials>>,
}

/// User credentials for authentication.
#[derive(Clone)]
pub struct UserCredentials {
    pub password: String,
    pub roles: Vec<String>,
}

impl AppState {
    /// Create the state, seeding accounts from the configuration.
    ///
    /// Without configured users a single `admin`/`admin` account exists.
    pub fn new(engine: Arc<Engine>, config: ServerConfig) -> Self {
        let jwt_auth = JwtAuth::new(&AuthConfig {
            secret: config.jwt_secret.clone(),
            expiration_secs: config.token_lifetime.as_secs(),
            ..AuthConfig::default()
        });

        let mut users: HashMap<String, UserCredentials> = config
            .users
            .iter()
            .map(|u| {
                (
                    u.username.clone(),
                    UserCredentials {
                        password: u.password.clone(),
                        roles: u.roles.clone(),
                    },
                )
            })
            .collect();
        if users.is_empty() {
            warn!("No API users configured, enabling the default admin account");
            users.insert(
                "admin".to_string(),
                UserCredentials {
                    password: "admin".to_string(),
                    roles: vec!["admin".to_string(), "user".to_string()],
                },
            );
        }

        Self {
            engine,
            jwt_auth,
            config,
            start_time: Instant::now(),
            users: RwLock::new(users),
        }
    }

    /// Get server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check user credentials (returns roles if valid).
    pub fn verify_credentials(&self, username: &str, password: &str) -> Option<Vec<String>> {
        self.users
            .read()
            .get(username)
            .filter(|creds| creds.password == password)
            .map(|creds| creds.roles.clone())
    }
}
