//! Closed vocabularies used by triage

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TopologyError;

/// Position of a device in the fabric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Spine,
    Edge,
    Tor,
    Server,
    /// Device missing from the topology table
    Unknown,
}

impl DeviceRole {
    pub const ALL: [DeviceRole; 5] = [
        DeviceRole::Spine,
        DeviceRole::Edge,
        DeviceRole::Tor,
        DeviceRole::Server,
        DeviceRole::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::Spine => "spine",
            DeviceRole::Edge => "edge",
            DeviceRole::Tor => "tor",
            DeviceRole::Server => "server",
            DeviceRole::Unknown => "unknown",
        }
    }

    /// Tie-break rank, lower first
    pub fn rank(&self) -> u8 {
        match self {
            DeviceRole::Spine => 0,
            DeviceRole::Edge => 1,
            DeviceRole::Tor => 2,
            DeviceRole::Server => 3,
            DeviceRole::Unknown => 4,
        }
    }

    /// Roles whose devices sit below this one
    pub fn downstream_roles(&self) -> &'static [DeviceRole] {
        match self {
            DeviceRole::Spine | DeviceRole::Edge => &[DeviceRole::Tor, DeviceRole::Server],
            DeviceRole::Tor => &[DeviceRole::Server],
            DeviceRole::Server | DeviceRole::Unknown => &[],
        }
    }

    pub fn is_single_point_of_failure(&self) -> bool {
        matches!(self, DeviceRole::Spine | DeviceRole::Edge)
    }

    pub fn failure_domain(&self) -> FailureDomain {
        if self.is_single_point_of_failure() {
            FailureDomain::Datacenter
        } else {
            FailureDomain::Rack
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceRole {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceRole::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| TopologyError::UnknownRole(s.to_string()))
    }
}

/// Containment scope of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureDomain {
    Rack,
    Pod,
    Datacenter,
    Region,
}

/// Urgency tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P1,
    P2,
    P3,
}

impl Priority {
    pub fn is_urgent(&self) -> bool {
        matches!(self, Priority::P1 | Priority::P2)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        };
        f.write_str(s)
    }
}

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            other => Err(TopologyError::InvalidTable(format!(
                "unknown severity {:?}",
                other
            ))),
        }
    }
}

/// Per-role triage policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePolicy {
    /// Criticality before confidence and context bonuses
    pub criticality_base: f64,
    /// Impact multiplier per affected device
    pub blast_multiplier: f64,
    /// Services carried by devices of this role
    #[serde(default)]
    pub services: Vec<String>,
}

impl RolePolicy {
    fn new(criticality_base: f64, blast_multiplier: f64, services: &[&str]) -> Self {
        Self {
            criticality_base,
            blast_multiplier,
            services: services.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Built-in policy for a role
    pub fn default_for(role: DeviceRole) -> Self {
        match role {
            DeviceRole::Spine => Self::new(7.0, 3.0, &["fabric-transit"]),
            DeviceRole::Edge => Self::new(7.0, 3.0, &["external-connectivity"]),
            DeviceRole::Tor => Self::new(5.0, 1.5, &["rack-connectivity"]),
            DeviceRole::Server => Self::new(3.0, 1.0, &["compute"]),
            DeviceRole::Unknown => Self::new(2.0, 0.0, &[]),
        }
    }
}
