//! Asset records consumed by the engine.
//!
//! Assets, nodes, credentials and network domains are owned by the asset
//! management side of the bastion. The engine only reads them through the
//! [`AssetDirectory`] trait; [`MemoryDirectory`] is the in-process
//! implementation used by the CLI and the tests.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Result;
use crate::inventory::InventoryError;

fn default_ssh_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

/// Authentication material for an account on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Display name, unique per credential kind
    pub name: String,
    /// Login user
    pub username: String,
    /// Login password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Path of a private key file usable by ssh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,
}

impl Credential {
    /// Create a credential with only a user name.
    pub fn new(name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            password: None,
            private_key_file: None,
        }
    }

    /// Attach a password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Attach a private key file.
    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_file = Some(path.into());
        self
    }
}

/// A `name:value` tag on an asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Jump host used to reach assets inside a network domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    pub ip: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Isolated network segment reachable through gateways.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub gateways: Vec<Gateway>,
}

impl Domain {
    /// True if at least one active gateway exists.
    pub fn has_gateway(&self) -> bool {
        self.gateway().is_some()
    }

    /// The gateway connections are tunnelled through.
    pub fn gateway(&self) -> Option<&Gateway> {
        self.gateways.iter().find(|g| g.is_active)
    }
}

/// A node in the asset tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    /// Display value, used as the inventory group name
    pub value: String,
    #[serde(default)]
    pub parent: Option<Uuid>,
}

/// A managed host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub hostname: String,
    pub ip: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Name of the admin credential used for `run_as_admin` runs
    #[serde(default)]
    pub admin_user: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Uuid>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub domain: Option<Uuid>,
}

impl Asset {
    /// Create an active asset listening on the default ssh port.
    pub fn new(hostname: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hostname: hostname.into(),
            ip: ip.into(),
            port: default_ssh_port(),
            is_active: true,
            admin_user: None,
            nodes: Vec::new(),
            labels: Vec::new(),
            domain: None,
        }
    }
}

/// Read access to the asset tree and credentials.
pub trait AssetDirectory: Send + Sync {
    /// Look up an asset by id.
    fn asset(&self, id: Uuid) -> Option<Asset>;

    /// Look up a node by id.
    fn node(&self, id: Uuid) -> Option<Node>;

    /// Direct children of a node.
    fn node_children(&self, id: Uuid) -> Vec<Node>;

    /// Every asset attached to the node or any of its descendants.
    fn node_assets(&self, id: Uuid) -> Vec<Asset>;

    /// Resolve an admin credential by name.
    fn admin_user(&self, name: &str) -> Option<Credential>;

    /// Resolve a system user by name.
    fn system_user(&self, name: &str) -> Option<Credential>;

    /// Look up a network domain.
    fn domain(&self, id: Uuid) -> Option<Domain>;

    /// Find an asset by hostname.
    fn asset_by_hostname(&self, hostname: &str) -> Option<Asset>;

    /// Find a node by its display value.
    fn node_by_value(&self, value: &str) -> Option<Node>;
}

/// On-disk layout of a directory file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DirectoryFile {
    assets: Vec<Asset>,
    nodes: Vec<Node>,
    admin_users: Vec<Credential>,
    system_users: Vec<Credential>,
    domains: Vec<Domain>,
}

/// In-memory asset directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    assets: IndexMap<Uuid, Asset>,
    nodes: IndexMap<Uuid, Node>,
    admin_users: IndexMap<String, Credential>,
    system_users: IndexMap<String, Credential>,
    domains: IndexMap<Uuid, Domain>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML directory document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: DirectoryFile = serde_yaml::from_str(content)?;
        let mut directory = Self::new();
        for node in file.nodes {
            directory.add_node(node);
        }
        let mut hostnames = HashSet::new();
        for asset in file.assets {
            if !hostnames.insert(asset.hostname.clone()) {
                return Err(InventoryError::DuplicateHostname(asset.hostname).into());
            }
            directory.add_asset(asset);
        }
        for credential in file.admin_users {
            directory.add_admin_user(credential);
        }
        for credential in file.system_users {
            directory.add_system_user(credential);
        }
        for domain in file.domains {
            directory.add_domain(domain);
        }
        Ok(directory)
    }

    /// Load a YAML directory file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn add_asset(&mut self, asset: Asset) {
        self.assets.insert(asset.id, asset);
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub fn add_admin_user(&mut self, credential: Credential) {
        self.admin_users.insert(credential.name.clone(), credential);
    }

    pub fn add_system_user(&mut self, credential: Credential) {
        self.system_users.insert(credential.name.clone(), credential);
    }

    pub fn add_domain(&mut self, domain: Domain) {
        self.domains.insert(domain.id, domain);
    }

    /// All assets in insertion order.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    /// The node and all of its descendants.
    fn subtree(&self, root: Uuid) -> HashSet<Uuid> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            queue.extend(
                self.nodes
                    .values()
                    .filter(|n| n.parent == Some(id))
                    .map(|n| n.id),
            );
        }
        seen
    }
}

impl AssetDirectory for MemoryDirectory {
    fn asset(&self, id: Uuid) -> Option<Asset> {
        self.assets.get(&id).cloned()
    }

    fn node(&self, id: Uuid) -> Option<Node> {
        self.nodes.get(&id).cloned()
    }

    fn node_children(&self, id: Uuid) -> Vec<Node> {
        self.nodes
            .values()
            .filter(|n| n.parent == Some(id))
            .cloned()
            .collect()
    }

    fn node_assets(&self, id: Uuid) -> Vec<Asset> {
        let subtree = self.subtree(id);
        let mut seen = IndexSet::new();
        self.assets
            .values()
            .filter(|a| a.nodes.iter().any(|n| subtree.contains(n)))
            .filter(|a| seen.insert(a.id))
            .cloned()
            .collect()
    }

    fn admin_user(&self, name: &str) -> Option<Credential> {
        self.admin_users.get(name).cloned()
    }

    fn system_user(&self, name: &str) -> Option<Credential> {
        self.system_users.get(name).cloned()
    }

    fn domain(&self, id: Uuid) -> Option<Domain> {
        self.domains.get(&id).cloned()
    }

    fn asset_by_hostname(&self, hostname: &str) -> Option<Asset> {
        self.assets
            .values()
            .find(|a| a.hostname == hostname)
            .cloned()
    }

    fn node_by_value(&self, value: &str) -> Option<Node> {
        self.nodes.values().find(|n| n.value == value).cloned()
    }
}
