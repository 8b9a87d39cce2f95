//! Static topology tables
//!
//! Loaded once at startup. The file lists devices with their role and may
//! override role policies:
//!
//! ```toml
//! sla_window_minutes = 30
//!
//! [[devices]]
//! name = "spine-01"
//! role = "spine"
//!
//! [policies.tor]
//! criticality_base = 5.5
//! blast_multiplier = 1.5
//! services = ["rack-connectivity"]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::role::{DeviceRole, RolePolicy};
use crate::TopologyError;

const DEFAULT_SLA_WINDOW_MINUTES: f64 = 30.0;

#[derive(Debug, Deserialize)]
struct DeviceEntry {
    name: String,
    role: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TopologyFile {
    devices: Vec<DeviceEntry>,
    policies: BTreeMap<String, RolePolicy>,
    sla_window_minutes: Option<f64>,
}

/// Device-to-role and role-to-policy lookup
#[derive(Debug, Clone)]
pub struct TopologyTable {
    devices: BTreeMap<String, DeviceRole>,
    policies: BTreeMap<DeviceRole, RolePolicy>,
    sla_window_minutes: f64,
}

impl Default for TopologyTable {
    fn default() -> Self {
        Self {
            devices: BTreeMap::new(),
            policies: default_policies(),
            sla_window_minutes: DEFAULT_SLA_WINDOW_MINUTES,
        }
    }
}

fn default_policies() -> BTreeMap<DeviceRole, RolePolicy> {
    DeviceRole::ALL
        .into_iter()
        .map(|role| (role, RolePolicy::default_for(role)))
        .collect()
}

impl TopologyTable {
    /// Load from a file; format follows the extension
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let raw: TopologyFile = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        let table = Self::from_file(raw)?;
        info!(
            "Loaded topology from {}: {} devices",
            path.display(),
            table.len()
        );
        Ok(table)
    }

    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, TopologyError> {
        let raw: TopologyFile = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Self::from_file(raw)
    }

    /// Build from `(device, role)` pairs with default policies
    pub fn from_devices<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = (S, DeviceRole)>,
        S: Into<String>,
    {
        Self {
            devices: devices.into_iter().map(|(n, r)| (n.into(), r)).collect(),
            ..Default::default()
        }
    }

    fn from_file(raw: TopologyFile) -> Result<Self, TopologyError> {
        let mut devices = BTreeMap::new();
        for entry in raw.devices {
            let role: DeviceRole = entry.role.parse()?;
            if role == DeviceRole::Unknown {
                return Err(TopologyError::InvalidTable(format!(
                    "device {} cannot be assigned role unknown",
                    entry.name
                )));
            }
            if devices.insert(entry.name.clone(), role).is_some() {
                return Err(TopologyError::InvalidTable(format!(
                    "device {} listed twice",
                    entry.name
                )));
            }
        }

        let mut policies = default_policies();
        for (name, policy) in raw.policies {
            let role: DeviceRole = name.parse()?;
            if !(policy.criticality_base.is_finite() && policy.blast_multiplier >= 0.0) {
                return Err(TopologyError::InvalidTable(format!(
                    "policy for {} has invalid weights",
                    role
                )));
            }
            policies.insert(role, policy);
        }

        let sla_window_minutes = raw.sla_window_minutes.unwrap_or(DEFAULT_SLA_WINDOW_MINUTES);
        if !(sla_window_minutes > 0.0 && sla_window_minutes.is_finite()) {
            return Err(TopologyError::InvalidTable(format!(
                "sla_window_minutes must be positive, got {}",
                sla_window_minutes
            )));
        }

        Ok(Self {
            devices,
            policies,
            sla_window_minutes,
        })
    }

    /// Role of a device; devices missing from the table are `Unknown`
    pub fn role_of(&self, device: &str) -> DeviceRole {
        self.devices
            .get(device)
            .copied()
            .unwrap_or(DeviceRole::Unknown)
    }

    pub fn policy(&self, role: DeviceRole) -> RolePolicy {
        self.policies
            .get(&role)
            .cloned()
            .unwrap_or_else(|| RolePolicy::default_for(role))
    }

    /// Devices holding any of `roles`, sorted by name
    pub fn devices_with_roles(&self, roles: &[DeviceRole]) -> Vec<String> {
        self.devices
            .iter()
            .filter(|(_, role)| roles.contains(role))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Services of every role in `roles`, deduplicated
    pub fn services_of(&self, roles: &[DeviceRole]) -> BTreeSet<String> {
        roles
            .iter()
            .flat_map(|role| self.policy(*role).services)
            .collect()
    }

    pub fn sla_window_minutes(&self) -> f64 {
        self.sla_window_minutes
    }

    /// Number of known devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FABRIC: &str = r#"
sla_window_minutes = 15

[[devices]]
name = "spine-01"
role = "spine"

[[devices]]
name = "tor-01"
role = "tor"

[[devices]]
name = "srv-01"
role = "server"

[policies.tor]
criticality_base = 5.5
blast_multiplier = 2.0
services = ["rack-connectivity", "storage-replication"]
"#;

    #[test]
    fn test_load_from_toml() {
        let table = TopologyTable::from_toml_str(FABRIC).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.role_of("spine-01"), DeviceRole::Spine);
        assert_eq!(table.role_of("nowhere-9"), DeviceRole::Unknown);
        assert_eq!(table.sla_window_minutes(), 15.0);
        assert_eq!(table.policy(DeviceRole::Tor).criticality_base, 5.5);
        // Untouched roles keep defaults
        assert_eq!(table.policy(DeviceRole::Spine), RolePolicy::default_for(DeviceRole::Spine));
    }

    #[test]
    fn test_unknown_role_fails_at_load() {
        let text = r#"
[[devices]]
name = "leaf-01"
role = "leaf"
"#;
        assert!(matches!(
            TopologyTable::from_toml_str(text),
            Err(TopologyError::UnknownRole(r)) if r == "leaf"
        ));
    }

    #[test]
    fn test_unknown_policy_role_fails_at_load() {
        let text = r#"
[policies.core]
criticality_base = 9.0
blast_multiplier = 4.0
"#;
        assert!(TopologyTable::from_toml_str(text).is_err());
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let text = r#"
[[devices]]
name = "tor-01"
role = "tor"

[[devices]]
name = "tor-01"
role = "server"
"#;
        assert!(matches!(
            TopologyTable::from_toml_str(text),
            Err(TopologyError::InvalidTable(_))
        ));
    }

    #[test]
    fn test_devices_with_roles() {
        let table = TopologyTable::from_devices([
            ("tor-02", DeviceRole::Tor),
            ("srv-02", DeviceRole::Server),
            ("srv-01", DeviceRole::Server),
        ]);
        assert_eq!(
            table.devices_with_roles(&[DeviceRole::Server]),
            vec!["srv-01".to_string(), "srv-02".to_string()]
        );
        assert!(table.services_of(&[DeviceRole::Tor]).contains("rack-connectivity"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            TopologyTable::load(Path::new("/nonexistent/topology.toml")),
            Err(TopologyError::Load(_))
        ));
    }
}
