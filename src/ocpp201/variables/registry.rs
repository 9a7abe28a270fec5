//! 2.0.1 Device Model registry (spec.md §4.F): the static catalog of
//! components/variables/attributes plus the volatile override map and
//! the MinSet/MaxSet override maps.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    OptionList,
    SequenceList,
    MemberList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Persistent,
    Volatile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Actual,
    Target,
    MinSet,
    MaxSet,
}

/// Identifies one entry: `(component, componentInstance, variable,
/// variableInstance)` (spec.md §3 `VariableRecord`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableKey {
    pub component: String,
    pub component_instance: Option<String>,
    pub variable: String,
    pub variable_instance: Option<String>,
}

impl VariableKey {
    pub fn new(component: &str, variable: &str) -> Self {
        Self {
            component: component.to_string(),
            component_instance: None,
            variable: variable.to_string(),
            variable_instance: None,
        }
    }

    /// Persistence-store key: `"${variable}.${instance}"` when
    /// instance-qualified, else bare `variable` (spec.md §4.F step 6).
    pub fn store_key(&self) -> String {
        match &self.variable_instance {
            Some(instance) => format!("{}.{instance}", self.variable),
            None => self.variable.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariableMetadata {
    pub data_type: DataType,
    pub mutability: Mutability,
    pub persistence: Persistence,
    pub supported_attributes: HashSet<AttributeType>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub default_value: Option<String>,
    pub reboot_required: bool,
    pub instance_scoped: bool,
}

impl VariableMetadata {
    pub fn simple(data_type: DataType, mutability: Mutability, persistence: Persistence) -> Self {
        Self {
            data_type,
            mutability,
            persistence,
            supported_attributes: HashSet::from([AttributeType::Actual]),
            min: None,
            max: None,
            default_value: None,
            reboot_required: false,
            instance_scoped: false,
        }
    }

    pub fn with_default(mut self, default_value: &str) -> Self {
        self.default_value = Some(default_value.to_string());
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.supported_attributes.insert(AttributeType::MinSet);
        self.supported_attributes.insert(AttributeType::MaxSet);
        self
    }

    pub fn reboot_required(mut self) -> Self {
        self.reboot_required = true;
        self
    }
}

/// The Device Model registry: static metadata + per-key runtime overrides
/// (spec.md §4.F). Does not own the persistent config store — callers
/// pass one in for Get/Set so the same store serves 1.6 and 2.0.1.
pub struct VariableRegistry {
    metadata: HashMap<VariableKey, VariableMetadata>,
    volatile: HashMap<VariableKey, String>,
    min_set_override: HashMap<VariableKey, f64>,
    max_set_override: HashMap<VariableKey, f64>,
    invalid: HashSet<VariableKey>,
}

impl VariableRegistry {
    /// Seeds the standard component/variable catalog this station
    /// supports (spec.md §4.F table; non-exhaustive but covers the
    /// behaviors named in §8's scenarios 4 and 5).
    pub fn standard() -> Self {
        let mut metadata = HashMap::new();

        metadata.insert(
            VariableKey::new("OCPPCommCtrlr", "HeartbeatInterval"),
            VariableMetadata::simple(DataType::Integer, Mutability::ReadWrite, Persistence::Persistent)
                .with_default("60")
                .with_bounds(0.0, 86_400.0),
        );
        metadata.insert(
            VariableKey::new("OCPPCommCtrlr", "WebSocketPingInterval"),
            VariableMetadata::simple(DataType::Integer, Mutability::ReadWrite, Persistence::Persistent)
                .with_default("0")
                .with_bounds(0.0, 3600.0),
        );
        metadata.insert(
            VariableKey::new("DeviceDataCtrlr", "ValueSize"),
            VariableMetadata::simple(DataType::Integer, Mutability::ReadWrite, Persistence::Persistent)
                .with_default("2500"),
        );
        metadata.insert(
            VariableKey::new("DeviceDataCtrlr", "ConfigurationValueSize"),
            VariableMetadata::simple(DataType::Integer, Mutability::ReadWrite, Persistence::Persistent)
                .with_default("2500"),
        );
        metadata.insert(
            VariableKey::new("DeviceDataCtrlr", "ReportingValueSize"),
            VariableMetadata::simple(DataType::Integer, Mutability::ReadWrite, Persistence::Persistent)
                .with_default("2500"),
        );
        metadata.insert(
            VariableKey::new("SecurityCtrlr", "OrganizationName"),
            VariableMetadata::simple(DataType::String, Mutability::ReadWrite, Persistence::Persistent),
        );
        metadata.insert(
            VariableKey::new("AuthCtrlr", "LocalAuthorizeOffline"),
            VariableMetadata::simple(DataType::Boolean, Mutability::ReadWrite, Persistence::Persistent)
                .with_default("false"),
        );
        metadata.insert(
            VariableKey::new("AuthCtrlr", "AuthorizeRemoteStart"),
            VariableMetadata::simple(DataType::Boolean, Mutability::ReadWrite, Persistence::Persistent)
                .with_default("true"),
        );
        metadata.insert(
            VariableKey::new("TxCtrlr", "EVConnectionTimeOut"),
            VariableMetadata::simple(DataType::Integer, Mutability::ReadWrite, Persistence::Persistent)
                .with_default("60")
                .with_bounds(0.0, 3600.0),
        );
        metadata.insert(
            VariableKey::new("SampledDataCtrlr", "TxUpdatedInterval"),
            VariableMetadata::simple(DataType::Integer, Mutability::ReadWrite, Persistence::Persistent)
                .with_default("60")
                .with_bounds(0.0, 86_400.0),
        );
        metadata.insert(
            VariableKey::new("OCPPCommCtrlr", "ProtocolVersion"),
            VariableMetadata::simple(DataType::String, Mutability::ReadOnly, Persistence::Persistent)
                .with_default("2.0.1"),
        );
        metadata.insert(
            VariableKey::new("SecurityCtrlr", "BasicAuthPassword"),
            VariableMetadata::simple(DataType::String, Mutability::WriteOnly, Persistence::Persistent).reboot_required(),
        );
        metadata.insert(
            VariableKey::new("SampledDataCtrlr", "VoltageRipple"),
            VariableMetadata::simple(DataType::Decimal, Mutability::ReadWrite, Persistence::Persistent)
                .with_default("0.0")
                .with_bounds(0.0, 10.0),
        );

        Self {
            metadata,
            volatile: HashMap::new(),
            min_set_override: HashMap::new(),
            max_set_override: HashMap::new(),
            invalid: HashSet::new(),
        }
    }

    pub fn lookup(&self, key: &VariableKey) -> Option<&VariableMetadata> {
        self.metadata.get(key)
    }

    pub fn component_exists(&self, component: &str) -> bool {
        self.metadata.keys().any(|k| k.component == component)
    }

    /// `performMappingSelfCheck` (spec.md §4.F): seeds the config store
    /// with each Persistent non-WriteOnly non-instance-scoped default
    /// that is missing, and marks composite keys without a default and
    /// without an existing value as invalid.
    pub fn perform_mapping_self_check(&mut self, config_store: &mut crate::station::config_store::ConfigurationStore) {
        let entries: Vec<(VariableKey, VariableMetadata)> =
            self.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (key, meta) in entries {
            if meta.persistence != Persistence::Persistent || meta.mutability == Mutability::WriteOnly || meta.instance_scoped {
                continue;
            }
            let store_key = key.store_key();
            if config_store.get_value(&store_key).is_some() {
                continue;
            }
            match &meta.default_value {
                Some(default) => config_store.put(store_key, default.clone()),
                None => {
                    self.invalid.insert(key);
                }
            }
        }
    }

    pub fn is_invalid(&self, key: &VariableKey) -> bool {
        self.invalid.contains(key)
    }

    pub fn clear_invalid(&mut self, key: &VariableKey) {
        self.invalid.remove(key);
    }

    pub fn volatile_get(&self, key: &VariableKey) -> Option<&str> {
        self.volatile.get(key).map(String::as_str)
    }

    pub fn volatile_put(&mut self, key: VariableKey, value: String) {
        self.volatile.insert(key, value);
    }

    pub fn min_set_override(&self, key: &VariableKey) -> Option<f64> {
        self.min_set_override.get(key).copied()
    }

    pub fn max_set_override(&self, key: &VariableKey) -> Option<f64> {
        self.max_set_override.get(key).copied()
    }

    pub fn set_min_max_override(&mut self, key: &VariableKey, min: Option<f64>, max: Option<f64>) {
        if let Some(min) = min {
            self.min_set_override.insert(key.clone(), min);
        }
        if let Some(max) = max {
            self.max_set_override.insert(key.clone(), max);
        }
    }
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
