//! Root cause and remediation tables

use serde::{Deserialize, Serialize};
use topology_triage::DeviceRole;

/// Family a detected series belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalFamily {
    Withdrawal,
    LinkState,
    ErrorRate,
    Flap,
    Announcement,
    PathChurn,
    Utilization,
    Unknown,
}

impl SignalFamily {
    /// Classify a series or feature name
    pub fn of(series: &str) -> Self {
        let name = series.to_ascii_lowercase();
        if name.starts_with("wdr") || name.contains("withdraw") {
            SignalFamily::Withdrawal
        } else if name.starts_with("ann") || name.contains("announce") {
            SignalFamily::Announcement
        } else if name.contains("flap") {
            SignalFamily::Flap
        } else if name.contains("as_path") || name.contains("churn") {
            SignalFamily::PathChurn
        } else if name.contains("error") || name.contains("crc") || name.contains("discard") {
            SignalFamily::ErrorRate
        } else if name.contains("oper_status") || name.contains("link") {
            SignalFamily::LinkState
        } else if name.contains("util") || name.contains("cpu") || name.contains("mem") {
            SignalFamily::Utilization
        } else {
            SignalFamily::Unknown
        }
    }
}

/// Root cause category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCauseCategory {
    PhysicalLinkFailure,
    RoutingInstability,
    SessionFlap,
    InterfaceDegradation,
    CapacityExhaustion,
    Undetermined,
}

/// Most likely explanation for an incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCause {
    pub category: RootCauseCategory,
    pub description: String,
    pub signal_family: SignalFamily,
}

/// Remediation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub description: String,
    /// Rendered CLI command
    pub command: Option<String>,
    pub estimated_minutes: u32,
}

/// Look up the root cause for a signal family, role, and confirmation state
pub fn root_cause(family: SignalFamily, role: DeviceRole, is_multi_modal: bool) -> RootCause {
    use RootCauseCategory::*;
    use SignalFamily::*;

    let fabric = matches!(role, DeviceRole::Spine | DeviceRole::Edge);
    let (category, description) = match (family, fabric, is_multi_modal) {
        (Withdrawal | LinkState, true, true) => (
            PhysicalLinkFailure,
            "physical link failure on fabric uplink, confirmed by device health",
        ),
        (Withdrawal | LinkState, false, true) => (
            PhysicalLinkFailure,
            "physical link failure, confirmed by device health",
        ),
        (Withdrawal, true, false) => (
            RoutingInstability,
            "route withdrawal burst at fabric layer, unconfirmed by device health",
        ),
        (Withdrawal, false, false) => (
            RoutingInstability,
            "route withdrawal burst, unconfirmed by device health",
        ),
        (LinkState, _, false) => (
            PhysicalLinkFailure,
            "link state changes, unconfirmed by routing",
        ),
        (Flap, _, true) => (
            PhysicalLinkFailure,
            "flapping link driving BGP session resets",
        ),
        (Flap, _, false) => (SessionFlap, "BGP session flapping"),
        (Announcement | PathChurn, true, _) => (
            RoutingInstability,
            "upstream route leak or policy change reaching the fabric",
        ),
        (Announcement | PathChurn, false, _) => (
            RoutingInstability,
            "route churn from a neighbour policy change",
        ),
        (ErrorRate, _, true) => (
            InterfaceDegradation,
            "interface degradation with routing impact",
        ),
        (ErrorRate, _, false) => (InterfaceDegradation, "interface degradation, unconfirmed"),
        (Utilization, _, _) => (CapacityExhaustion, "capacity exhaustion"),
        (Unknown, _, _) => (Undetermined, "undetermined, manual investigation required"),
    };

    RootCause {
        category,
        description: description.to_string(),
        signal_family: family,
    }
}

struct ActionTemplate {
    description: &'static str,
    command: Option<&'static str>,
    minutes: u32,
}

const fn action(
    description: &'static str,
    command: Option<&'static str>,
    minutes: u32,
) -> ActionTemplate {
    ActionTemplate {
        description,
        command,
        minutes,
    }
}

fn templates(category: RootCauseCategory) -> &'static [ActionTemplate] {
    const LINK: &[ActionTemplate] = &[
        action(
            "Check optic levels and link state",
            Some("show interfaces {interface} transceiver"),
            5,
        ),
        action("Inspect error counters", Some("show interfaces {interface} counters errors"), 5),
        action("Dispatch field engineer to reseat or replace optic", None, 60),
    ];
    const ROUTING: &[ActionTemplate] = &[
        action("Review BGP neighbour state", Some("show bgp summary"), 5),
        action(
            "Compare received prefixes with baseline",
            Some("show bgp neighbors {peer} received-routes"),
            10,
        ),
        action("Check recent routing policy changes", None, 20),
    ];
    const FLAP: &[ActionTemplate] = &[
        action("Review session reset history", Some("show bgp neighbors {peer}"), 5),
        action("Apply route dampening if flaps persist", None, 15),
    ];
    const DEGRADATION: &[ActionTemplate] = &[
        action("Inspect error counters", Some("show interfaces {interface} counters errors"), 5),
        action("Clean or replace cabling", None, 30),
    ];
    const CAPACITY: &[ActionTemplate] = &[
        action(
            "Check utilisation and top talkers",
            Some("show interfaces {interface} counters rates"),
            5,
        ),
        action("Shift traffic to redundant paths", None, 20),
    ];
    const UNDETERMINED: &[ActionTemplate] = &[
        action("Collect device logs", Some("show logging last 100"), 10),
        action("Escalate to network on-call for manual triage", None, 30),
    ];

    match category {
        RootCauseCategory::PhysicalLinkFailure => LINK,
        RootCauseCategory::RoutingInstability => ROUTING,
        RootCauseCategory::SessionFlap => FLAP,
        RootCauseCategory::InterfaceDegradation => DEGRADATION,
        RootCauseCategory::CapacityExhaustion => CAPACITY,
        RootCauseCategory::Undetermined => UNDETERMINED,
    }
}

/// Replace ` {name}` placeholders; an absent value drops the placeholder
fn render(template: &str, name: &str, value: Option<&str>) -> String {
    let placeholder = format!(" {{{}}}", name);
    let replacement = value.map(|v| format!(" {}", v)).unwrap_or_default();
    template.replace(&placeholder, &replacement)
}

/// Remediation steps for a root cause at a location
pub fn recommended_actions(
    category: RootCauseCategory,
    interface: Option<&str>,
    peer: Option<&str>,
) -> Vec<RecommendedAction> {
    templates(category)
        .iter()
        .map(|t| RecommendedAction {
            description: t.description.to_string(),
            command: t
                .command
                .map(|c| render(&render(c, "interface", interface), "peer", peer)),
            estimated_minutes: t.minutes,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_families() {
        assert_eq!(SignalFamily::of("wdr_total"), SignalFamily::Withdrawal);
        assert_eq!(SignalFamily::of("ann_total"), SignalFamily::Announcement);
        assert_eq!(SignalFamily::of("flap_count"), SignalFamily::Flap);
        assert_eq!(SignalFamily::of("as_path_churn"), SignalFamily::PathChurn);
        assert_eq!(SignalFamily::of("crc_errors"), SignalFamily::ErrorRate);
        assert_eq!(SignalFamily::of("oper_status_changes"), SignalFamily::LinkState);
        assert_eq!(SignalFamily::of("cpu_pct"), SignalFamily::Utilization);
        assert_eq!(SignalFamily::of("fan_rpm"), SignalFamily::Unknown);
    }

    #[test]
    fn test_root_cause_table() {
        let cause = root_cause(SignalFamily::Withdrawal, DeviceRole::Spine, true);
        assert_eq!(cause.category, RootCauseCategory::PhysicalLinkFailure);
        assert!(cause.description.contains("fabric uplink"));

        let cause = root_cause(SignalFamily::ErrorRate, DeviceRole::Server, false);
        assert_eq!(cause.description, "interface degradation, unconfirmed");
    }

    #[test]
    fn test_render_with_and_without_interface() {
        let actions = recommended_actions(
            RootCauseCategory::InterfaceDegradation,
            Some("Ethernet7"),
            None,
        );
        assert_eq!(
            actions[0].command.as_deref(),
            Some("show interfaces Ethernet7 counters errors")
        );

        let actions = recommended_actions(RootCauseCategory::InterfaceDegradation, None, None);
        assert_eq!(actions[0].command.as_deref(), Some("show interfaces counters errors"));
        assert!(actions[1].command.is_none());
    }

    #[test]
    fn test_every_category_has_actions() {
        for category in [
            RootCauseCategory::PhysicalLinkFailure,
            RootCauseCategory::RoutingInstability,
            RootCauseCategory::SessionFlap,
            RootCauseCategory::InterfaceDegradation,
            RootCauseCategory::CapacityExhaustion,
            RootCauseCategory::Undetermined,
        ] {
            assert!(!recommended_actions(category, None, None).is_empty());
        }
    }
}
