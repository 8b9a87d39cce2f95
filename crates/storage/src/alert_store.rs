//! Alert Store Implementation

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use alerting::Alert;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use topology_triage::Severity;
use tracing::{debug, info};

use crate::StorageError;

/// Alert plus its acknowledgment state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAlert {
    pub alert: Alert,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Alert totals by severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub critical: usize,
    pub unacknowledged: usize,
}

/// Bounded alert repository, oldest evicted first
pub struct AlertStore {
    alerts: Mutex<VecDeque<StoredAlert>>,
    max_alerts: usize,
}

impl AlertStore {
    /// Create a store retaining at most `max_alerts`
    pub fn new(max_alerts: usize) -> Self {
        let max_alerts = max_alerts.max(1);
        info!("Creating alert store (retention {})", max_alerts);
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(max_alerts.min(1024))),
            max_alerts,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<StoredAlert>>, StorageError> {
        self.alerts
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Store a new alert
    pub fn insert(&self, alert: Alert) -> Result<(), StorageError> {
        let mut alerts = self.lock()?;
        if alerts.iter().any(|a| a.alert.alert_id == alert.alert_id) {
            return Err(StorageError::Duplicate(alert.alert_id));
        }

        while alerts.len() >= self.max_alerts {
            if let Some(evicted) = alerts.pop_front() {
                debug!("Evicting alert {}", evicted.alert.alert_id);
            }
        }

        alerts.push_back(StoredAlert {
            alert,
            acknowledged: false,
            acknowledged_at: None,
        });
        Ok(())
    }

    /// Newest first, optionally filtered by severity
    pub fn recent(
        &self,
        severity: Option<Severity>,
        limit: usize,
    ) -> Result<Vec<StoredAlert>, StorageError> {
        let alerts = self.lock()?;
        Ok(alerts
            .iter()
            .rev()
            .filter(|a| severity.map_or(true, |s| a.alert.severity == s))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Look up one alert
    pub fn get(&self, alert_id: &str) -> Result<StoredAlert, StorageError> {
        let alerts = self.lock()?;
        alerts
            .iter()
            .find(|a| a.alert.alert_id == alert_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(alert_id.to_string()))
    }

    /// Mark an alert acknowledged; repeated calls keep the first time
    pub fn acknowledge(&self, alert_id: &str) -> Result<StoredAlert, StorageError> {
        let mut alerts = self.lock()?;
        let stored = alerts
            .iter_mut()
            .find(|a| a.alert.alert_id == alert_id)
            .ok_or_else(|| StorageError::NotFound(alert_id.to_string()))?;

        if !stored.acknowledged {
            stored.acknowledged = true;
            stored.acknowledged_at = Some(Utc::now());
            info!("Alert acknowledged: {}", alert_id);
        }
        Ok(stored.clone())
    }

    pub fn counts(&self) -> Result<SeverityCounts, StorageError> {
        let alerts = self.lock()?;
        let mut counts = SeverityCounts::default();
        for stored in alerts.iter() {
            match stored.alert.severity {
                Severity::Info => counts.info += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Error => counts.error += 1,
                Severity::Critical => counts.critical += 1,
            }
            if !stored.acknowledged {
                counts.unacknowledged += 1;
            }
        }
        Ok(counts)
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all alerts
    pub fn clear(&self) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.clear();
        }
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}
