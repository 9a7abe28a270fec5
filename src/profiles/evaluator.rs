//! Charging-profile evaluator (spec.md §4.M).

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};

use crate::station::connector::{ChargingProfile, ChargingProfileKind};

#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub limit: f64,
    pub matching_profile_id: i32,
}

/// Computes the effective window `[start, start+duration)` for `profile`
/// relative to `now`, honoring the `RecurringDaily` day-shift rule
/// (spec.md §4.M). Returns `None` when the profile is inactive (future
/// `Absolute`/`Relative` start, or recurrence never reaches `now`).
fn effective_window(profile: &ChargingProfile, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let duration = profile
        .duration_seconds
        .map(ChronoDuration::seconds)
        .unwrap_or_else(|| ChronoDuration::seconds(i64::MAX / 2));

    match profile.kind {
        ChargingProfileKind::RecurringDaily => {
            let start_schedule = profile.start_schedule?;
            let mut shifted = Utc
                .with_ymd_and_hms(
                    now.year(),
                    now.month(),
                    now.day(),
                    start_schedule.hour(),
                    start_schedule.minute(),
                    start_schedule.second(),
                )
                .single()?;
            if shifted > now {
                shifted -= ChronoDuration::days(1);
            }
            Some((shifted, shifted + duration))
        }
        ChargingProfileKind::RecurringWeekly => {
            let start_schedule = profile.start_schedule?;
            let mut shifted = start_schedule;
            while shifted + ChronoDuration::weeks(1) <= now {
                shifted += ChronoDuration::weeks(1);
            }
            if shifted > now {
                shifted -= ChronoDuration::weeks(1);
            }
            Some((shifted, shifted + duration))
        }
        ChargingProfileKind::Absolute | ChargingProfileKind::Relative => {
            let start = profile.start_schedule?;
            if start > now {
                return None;
            }
            Some((start, start + duration))
        }
    }
}

/// Scans `periods` (already relative to `window_start`) for the limit
/// applicable at `now` (spec.md §4.M): the last period whose start has
/// passed wins.
fn period_limit(profile: &ChargingProfile, window_start: DateTime<Utc>, now: DateTime<Utc>) -> Option<f64> {
    if profile.periods.len() == 1 && profile.periods[0].start_period_seconds == 0 {
        return Some(profile.periods[0].limit);
    }

    let elapsed = (now - window_start).num_seconds();
    let mut applicable: Option<f64> = None;
    for period in &profile.periods {
        if period.start_period_seconds <= elapsed {
            applicable = Some(period.limit);
        } else {
            break;
        }
    }
    applicable.or_else(|| profile.periods.last().map(|p| p.limit))
}

/// Evaluates a stack-level-descending profile list at `now`, returning the
/// first active profile's effective limit (spec.md §4.M).
pub fn evaluate(profiles: &[ChargingProfile], now: DateTime<Utc>) -> Option<EvaluationResult> {
    for profile in profiles {
        let Some((start, end)) = effective_window(profile, now) else {
            continue;
        };
        if start <= now && now < end {
            if let Some(limit) = period_limit(profile, start, now) {
                return Some(EvaluationResult {
                    limit,
                    matching_profile_id: profile.profile_id,
                });
            }
        }
    }
    None
}

/// Converts an AC limit (per-phase amps) to watts:
/// `phases · voltage · amps` (spec.md §4.M `ACElectricUtils.powerTotal`).
pub fn ac_power_total(phases: u32, voltage: f64, amps: f64) -> f64 {
    phases as f64 * voltage * amps
}

/// Converts a DC limit (amps) to watts: `voltage · amps`
/// (spec.md §4.M `DCElectricUtils.power`).
pub fn dc_power(voltage: f64, amps: f64) -> f64 {
    voltage * amps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::connector::{ChargingProfilePurpose, ChargingRateUnit, ChargingSchedulePeriod};

    fn profile(id: i32, stack_level: i32, start: DateTime<Utc>, duration: i64, periods: Vec<ChargingSchedulePeriod>) -> ChargingProfile {
        ChargingProfile {
            profile_id: id,
            stack_level,
            purpose: ChargingProfilePurpose::TxProfile,
            kind: ChargingProfileKind::Absolute,
            charging_rate_unit: ChargingRateUnit::A,
            start_schedule: Some(start),
            duration_seconds: Some(duration),
            periods,
        }
    }

    #[test]
    fn single_period_returns_its_limit_scenario_6() {
        let now = Utc::now();
        let p = profile(
            1,
            0,
            now - ChronoDuration::seconds(10),
            3600,
            vec![ChargingSchedulePeriod {
                start_period_seconds: 0,
                limit: 16.0,
                number_phases: Some(1),
            }],
        );
        let result = evaluate(&[p], now).unwrap();
        assert_eq!(result.limit, 16.0);
        let watts = ac_power_total(1, 230.0, result.limit);
        assert_eq!(watts, 3680.0);
    }

    #[test]
    fn future_profile_is_inactive() {
        let now = Utc::now();
        let p = profile(
            1,
            0,
            now + ChronoDuration::seconds(100),
            3600,
            vec![ChargingSchedulePeriod {
                start_period_seconds: 0,
                limit: 16.0,
                number_phases: None,
            }],
        );
        assert!(evaluate(&[p], now).is_none());
    }

    #[test]
    fn multi_period_picks_previous_period_before_next_boundary() {
        let now_base = Utc::now() - ChronoDuration::seconds(500);
        let p = profile(
            1,
            0,
            now_base,
            3600,
            vec![
                ChargingSchedulePeriod { start_period_seconds: 0, limit: 32.0, number_phases: None },
                ChargingSchedulePeriod { start_period_seconds: 600, limit: 16.0, number_phases: None },
            ],
        );
        let result = evaluate(&[p], now_base + ChronoDuration::seconds(300)).unwrap();
        assert_eq!(result.limit, 32.0);
    }
}
