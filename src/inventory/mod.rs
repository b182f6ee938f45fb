//! Execution inventory.
//!
//! This module provides:
//! - The resolved [`Inventory`] of hosts and groups a run targets
//! - Host pattern matching
//! - [`InventoryBuilder`], which turns asset records and a run-as policy
//!   into an inventory

pub mod builder;
pub mod group;
pub mod host;

pub use builder::{BecomeSpec, InventoryBuilder};
pub use group::Group;
pub use host::{BecomeParams, ConnectionType, Host};

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during inventory operations
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("invalid host pattern: {0}")]
    InvalidPattern(String),

    #[error("system user not found: {0}")]
    SystemUserNotFound(String),

    #[error("asset not found: {0}")]
    AssetNotFound(Uuid),

    #[error("node not found: {0}")]
    NodeNotFound(Uuid),

    #[error("hostname '{0}' is used by more than one asset")]
    DuplicateHostname(String),
}

/// Result type for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;

/// The inventory a run executes against
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    /// All hosts indexed by name
    hosts: IndexMap<String, Host>,

    /// All groups indexed by name
    groups: IndexMap<String, Group>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    /// Create a new empty inventory with the `all` group
    pub fn new() -> Self {
        let mut groups = IndexMap::new();
        groups.insert("all".to_string(), Group::all());
        Self {
            hosts: IndexMap::new(),
            groups,
        }
    }

    /// Add a host, creating any group it names
    pub fn add_host(&mut self, host: Host) {
        let name = host.name.clone();

        if let Some(all_group) = self.groups.get_mut("all") {
            all_group.add_host(name.clone());
        }

        for group_name in &host.groups {
            self.groups
                .entry(group_name.clone())
                .or_insert_with(|| Group::new(group_name.clone()))
                .add_host(name.clone());
        }

        self.hosts.insert(name, host);
    }

    /// Add a group, merging with one of the same name
    pub fn add_group(&mut self, group: Group) {
        match self.groups.get_mut(&group.name) {
            Some(existing) => {
                existing.hosts.extend(group.hosts);
                existing.children.extend(group.children);
                existing.vars.extend(group.vars);
            }
            None => {
                self.groups.insert(group.name.clone(), group);
            }
        }
    }

    /// Get a host by name
    pub fn get_host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    /// Get a group by name
    pub fn get_group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Get all hosts
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Get all groups
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Count total hosts
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// True when the inventory has no hosts
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Get hosts matching a pattern
    ///
    /// Supported patterns:
    /// - `all` or `*` - all hosts
    /// - `groupname` - all hosts in group, including child groups
    /// - `hostname` - specific host
    /// - `a:b` or `a,b` - union
    /// - `a:&b` - intersection
    /// - `a:!b` - exclusion
    /// - `~regex` - regex match on hostname
    /// - `web*` - wildcard match
    ///
    /// Exact group and host names win over operator parsing, so label groups
    /// such as `env:prod` resolve directly. A name that matches nothing
    /// yields an empty list.
    pub fn get_hosts_for_pattern(&self, pattern: &str) -> InventoryResult<Vec<&Host>> {
        let pattern = pattern.trim();

        if pattern.is_empty() {
            return Ok(Vec::new());
        }

        if pattern == "all" || pattern == "*" {
            return Ok(self.hosts.values().collect());
        }

        if let Some(group) = self.groups.get(pattern) {
            return Ok(self.get_hosts_in_group_recursive(group));
        }

        if let Some(host) = self.hosts.get(pattern) {
            return Ok(vec![host]);
        }

        if split_pattern(pattern).len() > 1 || pattern.starts_with(['&', '!']) {
            return self.parse_complex_pattern(pattern);
        }

        if let Some(regex_str) = pattern.strip_prefix('~') {
            let regex = Regex::new(regex_str)
                .map_err(|_| InventoryError::InvalidPattern(pattern.to_string()))?;
            return Ok(self
                .hosts
                .values()
                .filter(|h| regex.is_match(&h.name))
                .collect());
        }

        if pattern.contains(['*', '?', '[']) {
            let regex = Regex::new(&glob_to_regex(pattern))
                .map_err(|_| InventoryError::InvalidPattern(pattern.to_string()))?;
            let mut matched: IndexSet<&str> = IndexSet::new();
            for host in self.hosts.values().filter(|h| regex.is_match(&h.name)) {
                matched.insert(&host.name);
            }
            for group in self.groups.values().filter(|g| regex.is_match(&g.name)) {
                for host in self.get_hosts_in_group_recursive(group) {
                    matched.insert(&host.name);
                }
            }
            return Ok(matched
                .into_iter()
                .filter_map(|name| self.hosts.get(name))
                .collect());
        }

        Ok(Vec::new())
    }

    /// Parse a pattern with union, intersection and exclusion operators
    fn parse_complex_pattern(&self, pattern: &str) -> InventoryResult<Vec<&Host>> {
        let mut result: IndexSet<&str> = IndexSet::new();

        for part in split_pattern(pattern) {
            let part = part.trim();

            if part.is_empty() {
                continue;
            }

            if let Some(sub_pattern) = part.strip_prefix('&') {
                let sub_set: IndexSet<&str> = self
                    .get_hosts_for_pattern(sub_pattern)?
                    .into_iter()
                    .map(|h| h.name.as_str())
                    .collect();
                result.retain(|name| sub_set.contains(name));
            } else if let Some(sub_pattern) = part.strip_prefix('!') {
                for host in self.get_hosts_for_pattern(sub_pattern)? {
                    result.shift_remove(host.name.as_str());
                }
            } else {
                for host in self.get_hosts_for_pattern(part)? {
                    result.insert(&host.name);
                }
            }
        }

        Ok(result
            .into_iter()
            .filter_map(|name| self.hosts.get(name))
            .collect())
    }

    /// Get all hosts in a group, including hosts from child groups
    fn get_hosts_in_group_recursive(&self, group: &Group) -> Vec<&Host> {
        let mut hosts: IndexSet<&str> = IndexSet::new();
        let mut visited: IndexSet<&str> = IndexSet::new();
        let mut stack = vec![group];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.name.as_str()) {
                continue;
            }
            hosts.extend(current.hosts.iter().map(String::as_str));
            stack.extend(
                current
                    .children
                    .iter()
                    .filter_map(|child| self.groups.get(child)),
            );
        }

        hosts
            .into_iter()
            .filter_map(|name| self.hosts.get(name))
            .collect()
    }

    /// Render in the JSON layout ansible dynamic inventories use.
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        let mut hostvars = Map::new();

        for host in self.hosts.values() {
            let mut vars: Map<String, Value> = host
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            vars.entry(host::vars::HOST.to_string())
                .or_insert_with(|| json!(host.address));
            vars.entry(host::vars::PORT.to_string())
                .or_insert_with(|| json!(host.port));
            hostvars.insert(host.name.clone(), Value::Object(vars));
        }

        for group in self.groups.values() {
            let mut entry = Map::new();
            entry.insert("hosts".into(), json!(group.hosts));
            if !group.children.is_empty() {
                entry.insert("children".into(), json!(group.children));
            }
            if !group.vars.is_empty() {
                entry.insert("vars".into(), json!(group.vars));
            }
            root.insert(group.name.clone(), Value::Object(entry));
        }

        root.insert("_meta".into(), json!({ "hostvars": hostvars }));
        Value::Object(root)
    }
}

/// Split pattern by `:` or `,` but not inside brackets
fn split_pattern(pattern: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut bracket_depth: usize = 0;

    for (i, ch) in pattern.char_indices() {
        match ch {
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            ':' | ',' if bracket_depth == 0 => {
                parts.push(&pattern[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    parts.push(&pattern[start..]);
    parts
}

/// Convert a glob pattern to regex
fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");

    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '(' | ')' | '{' | '}' | '.' | '+' | '^' | '$' | '|' | '\\' => {
                regex.push('\\');
                regex.push(ch);
            }
            _ => regex.push(ch),
        }
    }

    regex.push('$');
    regex
}

impl std::fmt::Display for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Inventory ({} hosts, {} groups)",
            self.hosts.len(),
            self.groups.len()
        )?;

        for group in self.groups.values() {
            if group.is_empty() {
                continue;
            }
            writeln!(f, "  [{}]", group.name)?;
            for host_name in &group.hosts {
                if let Some(host) = self.hosts.get(host_name) {
                    writeln!(f, "    {}", host)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, groups: &[&str]) -> Host {
        let mut host = Host::new(name);
        for group in groups {
            host.add_to_group(*group);
        }
        host
    }

    fn sample() -> Inventory {
        let mut inv = Inventory::new();
        inv.add_host(host("web1", &["Web", "env:prod"]));
        inv.add_host(host("web2", &["Web", "env:dev"]));
        inv.add_host(host("db1", &["DB", "env:prod"]));
        let mut default = Group::new("Default");
        default.add_child("Web");
        default.add_child("DB");
        inv.add_group(default);
        inv
    }

    fn names(hosts: Vec<&Host>) -> Vec<&str> {
        let mut names: Vec<&str> = hosts.into_iter().map(|h| h.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    #[test]
    fn test_empty_inventory() {
        let inv = Inventory::new();
        assert!(inv.is_empty());
        assert!(inv.get_group("all").is_some());
        assert!(inv.get_hosts_for_pattern("all").unwrap().is_empty());
    }

    #[test]
    fn test_pattern_matching() {
        let inv = sample();
        assert_eq!(inv.get_hosts_for_pattern("all").unwrap().len(), 3);
        assert_eq!(names(inv.get_hosts_for_pattern("Web").unwrap()), ["web1", "web2"]);
        assert_eq!(names(inv.get_hosts_for_pattern("db1").unwrap()), ["db1"]);
        assert_eq!(inv.get_hosts_for_pattern("Default").unwrap().len(), 3);
        assert!(inv.get_hosts_for_pattern("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_label_group_is_not_split() {
        let inv = sample();
        assert_eq!(
            names(inv.get_hosts_for_pattern("env:prod").unwrap()),
            ["db1", "web1"]
        );
    }

    #[test]
    fn test_operators() {
        let inv = sample();
        assert_eq!(
            names(inv.get_hosts_for_pattern("Default:&Web").unwrap()),
            ["web1", "web2"]
        );
        assert_eq!(names(inv.get_hosts_for_pattern("Web:!web2").unwrap()), ["web1"]);
        assert_eq!(names(inv.get_hosts_for_pattern("web1,db1").unwrap()), ["db1", "web1"]);
    }

    #[test]
    fn test_glob_and_regex() {
        let inv = sample();
        assert_eq!(names(inv.get_hosts_for_pattern("web*").unwrap()), ["web1", "web2"]);
        assert_eq!(names(inv.get_hosts_for_pattern("~db\\d+").unwrap()), ["db1"]);
        assert!(inv.get_hosts_for_pattern("~(").is_err());
    }

    #[test]
    fn test_to_json_layout() {
        let inv = sample();
        let json = inv.to_json();
        assert_eq!(json["Default"]["children"], json!(["Web", "DB"]));
        assert_eq!(json["_meta"]["hostvars"]["web1"]["ansible_port"], json!(22));
        assert_eq!(json["all"]["hosts"].as_array().unwrap().len(), 3);
    }
}
