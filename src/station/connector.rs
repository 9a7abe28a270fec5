//! Connector / EVSE / transaction / charging-profile data model (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connector availability (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Operative,
    Inoperative,
}

/// Connector status, shared vocabulary across 1.6 and 2.0.1 (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorStatus {
    Available,
    Preparing,
    Charging,
    SuspendedEV,
    SuspendedEVSE,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
    Occupied,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::SuspendedEV => "SuspendedEV",
            Self::SuspendedEVSE => "SuspendedEVSE",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
            Self::Occupied => "Occupied",
        }
    }
}

/// Per-connector transaction bookkeeping (spec.md §3 `Connector`).
#[derive(Debug, Clone, Default)]
pub struct TransactionBlock {
    pub started: bool,
    pub transaction_id: Option<String>,
    pub id_tag: Option<String>,
    pub start_ts: Option<DateTime<Utc>>,
    pub remote_started: bool,
}

/// Sampled meter registers for a connector (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct MeterRegisters {
    pub energy_active_import: f64,
    pub transaction_energy_active_import: f64,
    /// -1 sentinel on connector re-init, reset to 0 on transaction start,
    /// preserved across sampling ticks otherwise (spec.md §4.D).
    pub last_energy_active_import_register_value: f64,
}

impl MeterRegisters {
    pub fn reinitialized() -> Self {
        Self {
            last_energy_active_import_register_value: -1.0,
            ..Default::default()
        }
    }
}

/// Cached local/remote authorization result for the connector's current
/// session (spec.md §3 `Connector.authorize-cache`).
#[derive(Debug, Clone, Default)]
pub struct ConnectorAuthCache {
    pub local_authorized: Option<bool>,
    pub remote_authorized: Option<bool>,
    pub id_tag: Option<String>,
}

/// Charging profile purpose (spec.md §3 `ChargingProfile`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingProfilePurpose {
    ChargePointMaxProfile,
    TxDefaultProfile,
    TxProfile,
}

/// Charging profile kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingProfileKind {
    Absolute,
    RecurringDaily,
    RecurringWeekly,
    Relative,
}

/// Unit for a charging schedule period limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingRateUnit {
    W,
    A,
}

/// One entry of a charging schedule (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingSchedulePeriod {
    pub start_period_seconds: i64,
    pub limit: f64,
    pub number_phases: Option<u32>,
}

/// A charging profile attached to a connector (spec.md §3, §4.M).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingProfile {
    pub profile_id: i32,
    pub stack_level: i32,
    pub purpose: ChargingProfilePurpose,
    pub kind: ChargingProfileKind,
    pub charging_rate_unit: ChargingRateUnit,
    pub start_schedule: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub periods: Vec<ChargingSchedulePeriod>,
}

/// A single connector. `id == 0` is the station-wide pseudo-connector.
#[derive(Debug, Clone)]
pub struct Connector {
    pub id: u32,
    pub availability: Availability,
    pub status: ConnectorStatus,
    pub boot_status: ConnectorStatus,
    pub transaction: TransactionBlock,
    pub meter: MeterRegisters,
    pub auth_cache: ConnectorAuthCache,
    /// Sorted descending by `stack_level` — highest priority first
    /// (spec.md §3 `ChargingProfile` invariant).
    pub profiles: Vec<ChargingProfile>,
}

impl Connector {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            availability: Availability::Operative,
            status: ConnectorStatus::Available,
            boot_status: ConnectorStatus::Available,
            transaction: TransactionBlock::default(),
            meter: MeterRegisters::reinitialized(),
            auth_cache: ConnectorAuthCache::default(),
            profiles: Vec::new(),
        }
    }

    pub fn has_active_transaction(&self) -> bool {
        self.transaction.started
    }

    pub fn start_transaction(&mut self, transaction_id: String, id_tag: String, now: DateTime<Utc>, remote: bool) {
        self.transaction = TransactionBlock {
            started: true,
            transaction_id: Some(transaction_id),
            id_tag: Some(id_tag),
            start_ts: Some(now),
            remote_started: remote,
        };
        self.meter.transaction_energy_active_import = 0.0;
        self.meter.last_energy_active_import_register_value = 0.0;
        self.status = ConnectorStatus::Charging;
    }

    pub fn stop_transaction(&mut self) {
        self.transaction = TransactionBlock::default();
        self.status = ConnectorStatus::Available;
    }

    /// Adds or replaces a profile keyed by (profile id, purpose, stack
    /// level), keeping the list sorted by stack level descending
    /// (spec.md §4.E SetChargingProfile).
    pub fn set_profile(&mut self, profile: ChargingProfile) {
        self.profiles.retain(|p| {
            !(p.profile_id == profile.profile_id && p.purpose == profile.purpose)
        });
        self.profiles.push(profile);
        self.profiles.sort_by(|a, b| b.stack_level.cmp(&a.stack_level));
    }

    /// Clears profiles matching the given optional filters
    /// (spec.md §4.E ClearChargingProfile).
    pub fn clear_profiles(
        &mut self,
        id: Option<i32>,
        purpose: Option<ChargingProfilePurpose>,
        stack_level: Option<i32>,
    ) -> usize {
        let before = self.profiles.len();
        self.profiles.retain(|p| {
            let id_match = id.map(|i| i == p.profile_id).unwrap_or(true);
            let purpose_match = purpose.map(|pp| pp == p.purpose).unwrap_or(true);
            let stack_match = stack_level.map(|s| s == p.stack_level).unwrap_or(true);
            !(id_match && purpose_match && stack_match)
        });
        before - self.profiles.len()
    }
}

/// EVSE grouping of connectors (2.0.1, spec.md §3).
#[derive(Debug, Clone)]
pub struct Evse {
    pub id: u32,
    pub availability: Availability,
    pub connector_ids: Vec<u32>,
}

/// Terminated or active transaction record, unique by `transaction_id`
/// (spec.md §3 `TransactionState`).
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub connector_id: u32,
    pub transaction_id: String,
    pub started_at: DateTime<Utc>,
    pub start_meter: i64,
    pub id_tag: String,
    pub stop_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_stop_transaction_resets_block() {
        let mut c = Connector::new(1);
        assert!(!c.has_active_transaction());
        c.start_transaction("42".into(), "TAG1".into(), Utc::now(), false);
        assert!(c.has_active_transaction());
        assert_eq!(c.status, ConnectorStatus::Charging);
        c.stop_transaction();
        assert!(!c.has_active_transaction());
        assert_eq!(c.status, ConnectorStatus::Available);
    }

    #[test]
    fn set_profile_keeps_descending_stack_level_order() {
        let mut c = Connector::new(1);
        let mk = |id, level| ChargingProfile {
            profile_id: id,
            stack_level: level,
            purpose: ChargingProfilePurpose::TxProfile,
            kind: ChargingProfileKind::Absolute,
            charging_rate_unit: ChargingRateUnit::W,
            start_schedule: None,
            duration_seconds: None,
            periods: vec![],
        };
        c.set_profile(mk(1, 1));
        c.set_profile(mk(2, 5));
        c.set_profile(mk(3, 3));
        let levels: Vec<i32> = c.profiles.iter().map(|p| p.stack_level).collect();
        assert_eq!(levels, vec![5, 3, 1]);
    }

    #[test]
    fn clear_profiles_by_purpose_filter() {
        let mut c = Connector::new(1);
        let mk = |id, purpose| ChargingProfile {
            profile_id: id,
            stack_level: 0,
            purpose,
            kind: ChargingProfileKind::Absolute,
            charging_rate_unit: ChargingRateUnit::W,
            start_schedule: None,
            duration_seconds: None,
            periods: vec![],
        };
        c.set_profile(mk(1, ChargingProfilePurpose::TxProfile));
        c.set_profile(mk(2, ChargingProfilePurpose::TxDefaultProfile));
        let cleared = c.clear_profiles(None, Some(ChargingProfilePurpose::TxProfile), None);
        assert_eq!(cleared, 1);
        assert_eq!(c.profiles.len(), 1);
    }
}
