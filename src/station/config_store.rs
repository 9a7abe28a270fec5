//! 1.6-style configuration key store, also the persistence target for
//! 2.0.1 Persistent variables (spec.md §3 `ConfigurationKey`, §4.F).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigurationKey {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default = "ConfigurationKey::default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub reboot: bool,
}

impl ConfigurationKey {
    fn default_visible() -> bool {
        true
    }

    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            readonly: false,
            visible: true,
            reboot: false,
        }
    }
}

/// Result of a `ChangeConfiguration`/Actual-write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationSetOutcome {
    Accepted,
    RebootRequired,
    Rejected,
    NotSupported,
}

/// Ordered collection of configuration keys with unique-by-key lookup
/// (spec.md §3 `ConfigurationKey`).
#[derive(Debug, Clone, Default)]
pub struct ConfigurationStore {
    keys: Vec<ConfigurationKey>,
}

impl ConfigurationStore {
    pub fn new(seed: Vec<ConfigurationKey>) -> Self {
        Self { keys: seed }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigurationKey> {
        self.keys.iter().find(|k| k.key == key)
    }

    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.get(key).map(|k| k.value.as_str())
    }

    pub fn all(&self) -> &[ConfigurationKey] {
        &self.keys
    }

    /// Inserts or updates a key regardless of readonly/visibility, used
    /// for internal writes (boot-derived heartbeat interval, variable
    /// manager persistence) that bypass the `ChangeConfiguration` policy
    /// check in [`Self::change`].
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self.keys.iter_mut().find(|k| k.key == key) {
            existing.value = value;
        } else {
            self.keys.push(ConfigurationKey::new(key, value));
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.keys.retain(|k| k.key != key);
    }

    /// Applies the `ChangeConfiguration` policy (spec.md §4.E): unknown
    /// key is `NotSupported`; readonly is `Rejected`; otherwise writes and
    /// returns `Accepted` or `RebootRequired` per the key's `reboot` flag.
    pub fn change(&mut self, key: &str, value: &str) -> ConfigurationSetOutcome {
        let Some(existing) = self.keys.iter_mut().find(|k| k.key == key) else {
            return ConfigurationSetOutcome::NotSupported;
        };
        if existing.readonly {
            return ConfigurationSetOutcome::Rejected;
        }
        existing.value = value.to_string();
        if existing.reboot {
            ConfigurationSetOutcome::RebootRequired
        } else {
            ConfigurationSetOutcome::Accepted
        }
    }

    /// Writes `HeartBeatInterval` and `HeartbeatInterval` together,
    /// vendor-compatibility mirroring required by spec.md §4.D/§4.E.
    pub fn put_heartbeat_interval_seconds(&mut self, seconds: u64) {
        self.put("HeartBeatInterval", seconds.to_string());
        self.put("HeartbeatInterval", seconds.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_unknown_key_is_not_supported() {
        let mut store = ConfigurationStore::default();
        assert_eq!(store.change("Nope", "1"), ConfigurationSetOutcome::NotSupported);
    }

    #[test]
    fn change_readonly_key_is_rejected() {
        let mut key = ConfigurationKey::new("K", "1");
        key.readonly = true;
        let mut store = ConfigurationStore::new(vec![key]);
        assert_eq!(store.change("K", "2"), ConfigurationSetOutcome::Rejected);
        assert_eq!(store.get_value("K"), Some("1"));
    }

    #[test]
    fn change_reboot_key_returns_reboot_required() {
        let mut key = ConfigurationKey::new("K", "1");
        key.reboot = true;
        let mut store = ConfigurationStore::new(vec![key]);
        assert_eq!(store.change("K", "2"), ConfigurationSetOutcome::RebootRequired);
        assert_eq!(store.get_value("K"), Some("2"));
    }

    #[test]
    fn heartbeat_interval_mirrors_both_key_forms() {
        let mut store = ConfigurationStore::default();
        store.put_heartbeat_interval_seconds(30);
        assert_eq!(store.get_value("HeartBeatInterval"), Some("30"));
        assert_eq!(store.get_value("HeartbeatInterval"), Some("30"));
    }
}
