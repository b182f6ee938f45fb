//! Builds an [`Inventory`] from asset records and a run-as policy.
//!
//! Hosts are keyed by asset identity, so an asset listed directly and also
//! reachable through one of the listed nodes appears once.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::host::vars;
use super::{Group, Host, Inventory, InventoryError, InventoryResult};
use crate::assets::{Asset, AssetDirectory, Credential, Gateway, Node};

/// Reserved prefix for host-scoped variable blocks (`__<asset-id>`).
pub const HOST_VARS_PREFIX: &str = "__";

/// Privilege escalation applied to every host of an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BecomeSpec {
    pub method: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
}

impl BecomeSpec {
    fn to_vars(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        out.insert(vars::BECOME.to_string(), Value::Bool(true));
        out.insert(vars::BECOME_METHOD.to_string(), self.method.clone().into());
        out.insert(vars::BECOME_USER.to_string(), self.user.clone().into());
        if let Some(pass) = self.pass.as_ref().filter(|p| !p.is_empty()) {
            out.insert(vars::BECOME_PASS.to_string(), pass.clone().into());
        }
        out
    }
}

/// Connection variables for a credential.
pub fn credential_vars(credential: &Credential) -> IndexMap<String, Value> {
    let mut out = IndexMap::new();
    out.insert(vars::USER.to_string(), credential.username.clone().into());
    if let Some(password) = credential.password.as_ref().filter(|p| !p.is_empty()) {
        out.insert(vars::PASSWORD.to_string(), password.clone().into());
    }
    if let Some(key) = &credential.private_key_file {
        out.insert(
            vars::PRIVATE_KEY_FILE.to_string(),
            key.display().to_string().into(),
        );
    }
    out
}

/// The `ansible_ssh_common_args` value that tunnels through a gateway.
pub fn make_proxy_command(gateway: &Gateway) -> String {
    let mut parts = vec![
        "ssh".to_string(),
        "-p".to_string(),
        gateway.port.to_string(),
        format!("{}@{}", gateway.username, gateway.ip),
        "-W".to_string(),
        "%h:%p".to_string(),
        "-q".to_string(),
    ];

    if let Some(password) = gateway.password.as_ref().filter(|p| !p.is_empty()) {
        parts.insert(0, format!("sshpass -p {}", password));
    }
    if let Some(key) = &gateway.private_key_file {
        parts.push(format!("-i {}", key.display()));
    }

    format!("'-o ProxyCommand={}'", parts.join(" "))
}

/// Builder turning asset and node selections into an inventory.
pub struct InventoryBuilder<'a> {
    directory: &'a dyn AssetDirectory,
    assets: Vec<Uuid>,
    nodes: Vec<Uuid>,
    run_as_admin: bool,
    run_as: Option<String>,
    become_spec: Option<BecomeSpec>,
    vars: IndexMap<String, Value>,
}

impl<'a> InventoryBuilder<'a> {
    pub fn new(directory: &'a dyn AssetDirectory) -> Self {
        Self {
            directory,
            assets: Vec::new(),
            nodes: Vec::new(),
            run_as_admin: false,
            run_as: None,
            become_spec: None,
            vars: IndexMap::new(),
        }
    }

    pub fn assets(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.assets.extend(ids);
        self
    }

    pub fn nodes(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.nodes.extend(ids);
        self
    }

    /// Connect with each host's own admin credential.
    pub fn run_as_admin(mut self, enabled: bool) -> Self {
        self.run_as_admin = enabled;
        self
    }

    /// Connect every host as the named system user.
    pub fn run_as(mut self, system_user: Option<String>) -> Self {
        self.run_as = system_user;
        self
    }

    pub fn become_spec(mut self, spec: Option<BecomeSpec>) -> Self {
        self.become_spec = spec;
        self
    }

    /// Extra variables; keys under `__<asset-id>` apply to that host only.
    pub fn vars(mut self, vars: IndexMap<String, Value>) -> Self {
        self.vars = vars;
        self
    }

    /// Union of listed assets and node members, deduplicated by id.
    pub fn resolve_assets(&self) -> Vec<Asset> {
        let mut resolved: IndexMap<Uuid, Asset> = IndexMap::new();

        for id in &self.assets {
            match self.directory.asset(*id) {
                Some(asset) => {
                    resolved.entry(asset.id).or_insert(asset);
                }
                None => warn!(asset_id = %id, "Asset not found, skipping"),
            }
        }

        for id in &self.nodes {
            for asset in self.directory.node_assets(*id) {
                resolved.entry(asset.id).or_insert(asset);
            }
        }

        resolved
            .into_values()
            .filter(|asset| {
                if !asset.is_active {
                    debug!(hostname = %asset.hostname, "Skipping inactive asset");
                }
                asset.is_active
            })
            .collect()
    }

    /// Build the inventory.
    ///
    /// An empty asset selection yields an empty inventory; deciding whether
    /// that is fatal is up to the runner.
    pub fn build(&self) -> InventoryResult<Inventory> {
        let run_user_vars = match &self.run_as {
            Some(name) => {
                let credential = self
                    .directory
                    .system_user(name)
                    .ok_or_else(|| InventoryError::SystemUserNotFound(name.clone()))?;
                Some(credential_vars(&credential))
            }
            None => None,
        };
        let become_vars = self.become_spec.as_ref().map(BecomeSpec::to_vars);

        let mut inventory = Inventory::new();
        let mut nodes: IndexMap<Uuid, Node> = IndexMap::new();

        for asset in self.resolve_assets() {
            if inventory.get_host(&asset.hostname).is_some() {
                return Err(InventoryError::DuplicateHostname(asset.hostname));
            }
            let mut host = self.convert(&asset);

            if let Some(extra) = &run_user_vars {
                host.vars.extend(extra.clone());
            }
            if let Some(extra) = &become_vars {
                host.vars.extend(extra.clone());
            }

            for node in asset.nodes.iter().filter_map(|id| self.directory.node(*id)) {
                nodes.entry(node.id).or_insert(node);
            }

            inventory.add_host(host);
        }

        for node in nodes.values() {
            let mut group = Group::new(node.value.clone());
            for child in self.directory.node_children(node.id) {
                group.add_child(child.value);
            }
            inventory.add_group(group);
        }

        debug!(
            hosts = inventory.host_count(),
            groups = nodes.len(),
            "Inventory built"
        );
        Ok(inventory)
    }

    fn convert(&self, asset: &Asset) -> Host {
        let mut host = Host::new(asset.hostname.clone()).with_address(asset.ip.clone(), asset.port);
        host.id = asset.id;

        let domain = asset.domain.and_then(|id| self.directory.domain(id));
        if let Some(gateway) = domain.as_ref().and_then(|d| d.gateway()) {
            host.set_var(vars::SSH_COMMON_ARGS, make_proxy_command(gateway));
        }

        if self.run_as_admin {
            match asset
                .admin_user
                .as_deref()
                .and_then(|name| self.directory.admin_user(name))
            {
                Some(credential) => host.vars.extend(credential_vars(&credential)),
                None => warn!(hostname = %asset.hostname, "Asset has no admin user"),
            }
        }

        for node in asset.nodes.iter().filter_map(|id| self.directory.node(*id)) {
            host.add_to_group(node.value);
        }

        for label in &asset.labels {
            host.set_var(label.name.clone(), label.value.clone());
            host.add_to_group(format!("{}:{}", label.name, label.value));
        }

        if let Some(domain) = &domain {
            host.set_var("domain", domain.name.clone());
            host.add_to_group(format!("domain_{}", domain.name));
        }

        for (key, value) in &self.vars {
            if !key.starts_with(HOST_VARS_PREFIX) {
                host.set_var(key.clone(), value.clone());
            }
        }

        let scoped_key = format!("{}{}", HOST_VARS_PREFIX, asset.id);
        if let Some(Value::Object(scoped)) = self.vars.get(&scoped_key) {
            for (key, value) in scoped {
                host.set_var(key.clone(), value.clone());
            }
        }

        host
    }
}
