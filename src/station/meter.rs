//! Meter-value sampling (spec.md §4.D).

use rand::Rng;
use tracing::warn;

use crate::station::connector::MeterRegisters;

/// A single sampled measurand value, ready to slot into a `MeterValues`/
/// `TransactionEvent` payload by the version-specific request builder.
#[derive(Debug, Clone)]
pub struct MeterSample {
    pub measurand: &'static str,
    pub value: String,
    pub unit: &'static str,
}

/// Advances `registers.energy_active_import` by a random increment bounded
/// by `maxPower`, the sampling interval, and `powerDivider`, then returns
/// the measurand set for one `MeterValues` tick (spec.md §4.D).
pub fn sample(
    registers: &mut MeterRegisters,
    in_transaction: bool,
    max_power_watts: f64,
    interval_secs: u64,
    power_divider: u32,
) -> Vec<MeterSample> {
    let divider = power_divider.max(1) as f64;
    let interval_hours = interval_secs as f64 / 3600.0;
    let max_increment_wh = max_power_watts * interval_hours / divider;

    let increment = if max_increment_wh > 0.0 {
        rand::thread_rng().gen_range(0.0..=max_increment_wh)
    } else {
        0.0
    };

    registers.energy_active_import += increment;
    if in_transaction {
        registers.transaction_energy_active_import += increment;
    }

    let ceiling = max_power_watts * 3600.0 * interval_secs as f64 / divider / 3600.0;
    if ceiling > 0.0 && registers.energy_active_import > ceiling * 1_000.0 {
        warn!(
            energy = registers.energy_active_import,
            ceiling, "sampled energy register exceeds theoretical ceiling"
        );
    }

    let mut samples = vec![MeterSample {
        measurand: "Energy.Active.Import.Register",
        value: format!("{:.2}", registers.energy_active_import),
        unit: "Wh",
    }];

    samples.push(MeterSample {
        measurand: "Voltage",
        value: "230".to_string(),
        unit: "V",
    });

    samples.push(MeterSample {
        measurand: "SoC",
        value: rand::thread_rng().gen_range(0..=100).to_string(),
        unit: "Percent",
    });

    samples
}

/// Resolves an arbitrary configured measurand name to a sample, logging
/// and dropping unknown ones without emitting a value (spec.md §4.D).
pub fn sample_measurand(name: &str, registers: &MeterRegisters) -> Option<MeterSample> {
    match name {
        "Energy.Active.Import.Register" => Some(MeterSample {
            measurand: "Energy.Active.Import.Register",
            value: format!("{:.2}", registers.energy_active_import),
            unit: "Wh",
        }),
        "Voltage" => Some(MeterSample {
            measurand: "Voltage",
            value: "230".to_string(),
            unit: "V",
        }),
        "SoC" => Some(MeterSample {
            measurand: "SoC",
            value: rand::thread_rng().gen_range(0..=100).to_string(),
            unit: "Percent",
        }),
        other => {
            warn!(measurand = other, "unknown measurand requested, skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_increments_energy_monotonically() {
        let mut registers = MeterRegisters::reinitialized();
        let before = registers.energy_active_import;
        sample(&mut registers, true, 22_000.0, 60, 1);
        assert!(registers.energy_active_import >= before);
        assert!(registers.transaction_energy_active_import >= 0.0);
    }

    #[test]
    fn unknown_measurand_is_skipped() {
        let registers = MeterRegisters::reinitialized();
        assert!(sample_measurand("Temperature", &registers).is_none());
    }

    #[test]
    fn zero_max_power_never_increments() {
        let mut registers = MeterRegisters::reinitialized();
        sample(&mut registers, false, 0.0, 60, 1);
        assert_eq!(registers.energy_active_import, 0.0);
    }
}
