//! Host definition for the execution inventory.
//!
//! A host is the resolved form of an asset: its identity, address, and the
//! connection variables that the backend reads when it dials the host.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Well-known connection variable names.
pub mod vars {
    pub const HOST: &str = "ansible_host";
    pub const PORT: &str = "ansible_port";
    pub const USER: &str = "ansible_user";
    pub const PASSWORD: &str = "ansible_password";
    pub const PRIVATE_KEY_FILE: &str = "ansible_ssh_private_key_file";
    pub const SSH_COMMON_ARGS: &str = "ansible_ssh_common_args";
    pub const CONNECTION: &str = "ansible_connection";
    pub const BECOME: &str = "ansible_become";
    pub const BECOME_METHOD: &str = "ansible_become_method";
    pub const BECOME_USER: &str = "ansible_become_user";
    pub const BECOME_PASS: &str = "ansible_become_pass";
}

/// Connection type for a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// SSH connection (default)
    #[default]
    Ssh,
    /// Run on the engine machine itself
    Local,
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionType::Ssh => write!(f, "ssh"),
            ConnectionType::Local => write!(f, "local"),
        }
    }
}

/// Privilege escalation settings attached to a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BecomeParams {
    pub method: String,
    pub user: String,
    pub password: Option<String>,
}

/// A managed host in the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Asset id the host was built from
    pub id: Uuid,

    /// Inventory name (the asset hostname)
    pub name: String,

    /// Address to connect to
    pub address: String,

    /// Port to connect to
    pub port: u16,

    /// Host variables, including connection credentials
    #[serde(default)]
    pub vars: IndexMap<String, Value>,

    /// Names of the groups this host is in
    #[serde(default)]
    pub groups: IndexSet<String>,
}

impl Host {
    /// Create a host with a random id
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            address: name.clone(),
            name,
            port: 22,
            vars: IndexMap::new(),
            groups: IndexSet::new(),
        }
    }

    /// Set the connection address
    pub fn with_address(mut self, address: impl Into<String>, port: u16) -> Self {
        self.address = address.into();
        self.port = port;
        self
    }

    /// Add the host to a group
    pub fn add_to_group(&mut self, group: impl Into<String>) {
        self.groups.insert(group.into());
    }

    /// Check group membership
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Set a host variable
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Get a host variable
    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Get a host variable rendered as a string
    pub fn var_str(&self, key: &str) -> Option<String> {
        match self.vars.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Login user, when known
    pub fn user(&self) -> Option<String> {
        self.var_str(vars::USER)
    }

    /// Login password, when known
    pub fn password(&self) -> Option<String> {
        self.var_str(vars::PASSWORD)
    }

    /// Private key file, when known
    pub fn private_key_file(&self) -> Option<String> {
        self.var_str(vars::PRIVATE_KEY_FILE)
    }

    /// Extra ssh arguments such as a proxy command
    pub fn ssh_common_args(&self) -> Option<String> {
        self.var_str(vars::SSH_COMMON_ARGS)
    }

    /// How the backend should reach this host
    pub fn connection_type(&self) -> ConnectionType {
        match self.var_str(vars::CONNECTION).as_deref() {
            Some("local") => ConnectionType::Local,
            Some(_) => ConnectionType::Ssh,
            None if matches!(self.address.as_str(), "localhost" | "127.0.0.1" | "::1") => {
                ConnectionType::Local
            }
            None => ConnectionType::Ssh,
        }
    }

    /// Privilege escalation, if enabled for this host.
    ///
    /// Method and user fall back to the given defaults when the host does
    /// not name them.
    pub fn become_params(&self, default_method: &str, default_user: &str) -> Option<BecomeParams> {
        let enabled = match self.vars.get(vars::BECOME) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "yes" | "true" | "True"),
            _ => false,
        };
        if !enabled {
            return None;
        }
        Some(BecomeParams {
            method: self
                .var_str(vars::BECOME_METHOD)
                .unwrap_or_else(|| default_method.to_string()),
            user: self
                .var_str(vars::BECOME_USER)
                .unwrap_or_else(|| default_user.to_string()),
            password: self.var_str(vars::BECOME_PASS),
        })
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_type() {
        let local = Host::new("box").with_address("127.0.0.1", 22);
        assert_eq!(local.connection_type(), ConnectionType::Local);

        let mut remote = Host::new("web1").with_address("10.0.0.1", 22);
        assert_eq!(remote.connection_type(), ConnectionType::Ssh);
        remote.set_var(vars::CONNECTION, "local");
        assert_eq!(remote.connection_type(), ConnectionType::Local);
    }

    #[test]
    fn test_become_params() {
        let mut host = Host::new("web1");
        assert!(host.become_params("sudo", "root").is_none());

        host.set_var(vars::BECOME, true);
        host.set_var(vars::BECOME_USER, "postgres");
        let params = host.become_params("sudo", "root").unwrap();
        assert_eq!(params.method, "sudo");
        assert_eq!(params.user, "postgres");
        assert_eq!(params.password, None);
    }

    #[test]
    fn test_var_str_renders_numbers() {
        let mut host = Host::new("web1");
        host.set_var("answer", 42);
        assert_eq!(host.var_str("answer").as_deref(), Some("42"));
    }
}
