//! Default risk levels: per-window scoring and aggregation.
//!
//! Per window:
//!
//! 1. minutes-at-attenuation filters may drop the window
//! 2. transmission risk level (TRL) from report type and infectiousness offsets
//! 3. TRL filters may drop the window
//! 4. TRL → transmission risk value (TRV)
//! 5. normalized time = TRV × attenuation-weighted minutes
//! 6. normalized time → per-window risk level
//!
//! Across windows, results are grouped per day, each day is mapped to a
//! risk level via its summed normalized time, and the days are folded into
//! an [`EwAggregatedRiskResult`].
//!
//! Everything here is a pure function of its inputs; "now" is passed in.

use crate::clock::Clock;
use crate::error::RiskError;
use crate::risk::params::{
    MinutesAtAttenuationFilter, MinutesAtAttenuationWeight, NormalizedTimeToRiskLevelMapping,
    RiskCalculationParameters, RiskLevel, TransmissionRiskLevelEncoding,
    TransmissionRiskValueMapping, TrlFilter,
};
use crate::risk::result::{EwAggregatedRiskResult, ExposureWindowDayRisk, RiskResult};
use crate::risk::window::{ExposureWindow, Infectiousness, ReportType};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Valid transmission risk levels.
pub const TRANSMISSION_RISK_LEVEL_RANGE: RangeInclusive<i32> = 1..=8;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Score one exposure window.
///
/// `Ok(None)` means the window was filtered out and contributes nothing.
pub fn calculate_risk(
    params: &RiskCalculationParameters,
    window: &ExposureWindow,
    now: DateTime<Utc>,
) -> Result<Option<RiskResult>, RiskError> {
    if drop_due_to_minutes_at_attenuation(window, &params.minutes_at_attenuation_filters) {
        tracing::trace!(?window, "Window dropped by minutes-at-attenuation filter");
        return Ok(None);
    }

    let (transmission_risk_level, clamped) =
        determine_transmission_risk_level(window, &params.transmission_risk_level_encoding)?;

    if drop_due_to_transmission_risk_level(
        transmission_risk_level,
        &params.transmission_risk_level_filters,
    ) {
        tracing::trace!(transmission_risk_level, "Window dropped by TRL filter");
        return Ok(None);
    }

    let transmission_risk_value = determine_transmission_risk_value(
        transmission_risk_level,
        &params.transmission_risk_value_mapping,
    )?;

    let weighted_minutes =
        determine_weighted_seconds(window, &params.minutes_at_attenuation_weights) / 60.0;
    let normalized_time = transmission_risk_value * weighted_minutes;

    let Some(risk_level) = determine_risk_level(
        normalized_time,
        &params.normalized_time_per_exposure_window_to_risk_level_mapping,
    ) else {
        tracing::debug!(normalized_time, "No per-window risk level mapping matches, dropping window");
        return Ok(None);
    };

    Ok(Some(RiskResult {
        transmission_risk_level,
        transmission_risk_level_clamped: clamped,
        transmission_risk_value,
        normalized_time,
        risk_level,
        age_in_days: age_in_days(window.date_millis_since_epoch, now),
    }))
}

/// Fold per-window results into the overall risk.
pub fn aggregate_results(
    params: &RiskCalculationParameters,
    results: &[(ExposureWindow, RiskResult)],
) -> EwAggregatedRiskResult {
    let mut by_day: BTreeMap<i64, Vec<&(ExposureWindow, RiskResult)>> = BTreeMap::new();
    for entry in results {
        by_day.entry(entry.1.age_in_days).or_default().push(entry);
    }

    // Ascending age, i.e. most recent day first.
    let day_risks: Vec<ExposureWindowDayRisk> = by_day
        .iter()
        .map(|(age, entries)| aggregate_risk_per_day(params, *age, entries))
        .collect();

    let total_risk_level = day_risks
        .iter()
        .map(|day| day.risk_level)
        .max()
        .unwrap_or(RiskLevel::Low)
        .max(RiskLevel::Low);

    let aggregated = EwAggregatedRiskResult {
        total_risk_level,
        total_minimum_distinct_encounters_with_low_risk: day_risks
            .iter()
            .map(|day| day.minimum_distinct_encounters_with_low_risk)
            .sum(),
        total_minimum_distinct_encounters_with_high_risk: day_risks
            .iter()
            .map(|day| day.minimum_distinct_encounters_with_high_risk)
            .sum(),
        most_recent_date_with_low_risk: most_recent_date_for_risk(&day_risks, RiskLevel::Low),
        most_recent_date_with_high_risk: most_recent_date_for_risk(&day_risks, RiskLevel::High),
        exposure_window_day_risks: day_risks,
    };

    tracing::debug!(
        total_risk_level = %aggregated.total_risk_level,
        days = aggregated.exposure_window_day_risks.len(),
        "Aggregated exposure window results"
    );
    aggregated
}

fn aggregate_risk_per_day(
    params: &RiskCalculationParameters,
    age_in_days: i64,
    entries: &[&(ExposureWindow, RiskResult)],
) -> ExposureWindowDayRisk {
    let normalized_time: f64 = entries.iter().map(|(_, result)| result.normalized_time).sum();

    let risk_level = determine_risk_level(
        normalized_time,
        &params.normalized_time_per_day_to_risk_level_mapping,
    )
    .unwrap_or_else(|| {
        tracing::warn!(age_in_days, normalized_time, "No per-day risk level mapping matches");
        RiskLevel::Unspecified
    });

    let date = entries
        .iter()
        .map(|(window, _)| window.date())
        .max()
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    ExposureWindowDayRisk {
        date,
        age_in_days,
        normalized_time,
        risk_level,
        minimum_distinct_encounters_with_low_risk: minimum_distinct_encounters(entries, RiskLevel::Low),
        minimum_distinct_encounters_with_high_risk: minimum_distinct_encounters(entries, RiskLevel::High),
    }
}

/// Windows with the same TRL and calibration confidence may stem from the
/// same encounter, so only distinct combinations count.
fn minimum_distinct_encounters(
    entries: &[&(ExposureWindow, RiskResult)],
    risk_level: RiskLevel,
) -> usize {
    entries
        .iter()
        .filter(|(_, result)| result.risk_level == risk_level)
        .map(|(window, result)| (result.transmission_risk_level, window.calibration_confidence))
        .collect::<HashSet<_>>()
        .len()
}

fn most_recent_date_for_risk(
    days: &[ExposureWindowDayRisk],
    risk_level: RiskLevel,
) -> Option<DateTime<Utc>> {
    days.iter()
        .filter(|day| day.risk_level == risk_level)
        .map(|day| day.date)
        .max()
}

fn drop_due_to_minutes_at_attenuation(
    window: &ExposureWindow,
    filters: &[MinutesAtAttenuationFilter],
) -> bool {
    filters.iter().any(|filter| {
        let seconds_at_attenuation: f64 = window
            .scan_instances
            .iter()
            .filter(|scan| filter.attenuation_range.in_range(f64::from(scan.min_attenuation_db)))
            .map(|scan| f64::from(scan.seconds_since_last_scan))
            .sum();
        filter
            .drop_if_minutes_in_range
            .in_range(seconds_at_attenuation / 60.0)
    })
}

fn determine_transmission_risk_level(
    window: &ExposureWindow,
    encoding: &TransmissionRiskLevelEncoding,
) -> Result<(i32, bool), RiskError> {
    let report_type_offset = match window.report_type {
        ReportType::ConfirmedTest => encoding.report_type_offset_confirmed_test,
        ReportType::ConfirmedClinicalDiagnosis => {
            encoding.report_type_offset_confirmed_clinical_diagnosis
        }
        ReportType::SelfReport => encoding.report_type_offset_self_report,
        ReportType::Recursive => encoding.report_type_offset_recursive,
        other @ (ReportType::Unknown | ReportType::Revoked) => {
            return Err(RiskError::UnknownReportType(format!("{other:?}")))
        }
    };
    let infectiousness_offset = match window.infectiousness {
        Infectiousness::High => encoding.infectiousness_offset_high,
        Infectiousness::Standard | Infectiousness::None => encoding.infectiousness_offset_standard,
    };

    let level = report_type_offset + infectiousness_offset;
    let clamped = level.clamp(
        *TRANSMISSION_RISK_LEVEL_RANGE.start(),
        *TRANSMISSION_RISK_LEVEL_RANGE.end(),
    );
    Ok((clamped, clamped != level))
}

fn drop_due_to_transmission_risk_level(level: i32, filters: &[TrlFilter]) -> bool {
    filters
        .iter()
        .any(|filter| filter.drop_if_trl_in_range.in_range(f64::from(level)))
}

fn determine_transmission_risk_value(
    level: i32,
    mapping: &[TransmissionRiskValueMapping],
) -> Result<f64, RiskError> {
    mapping
        .iter()
        .find(|entry| entry.transmission_risk_level == level)
        .map(|entry| entry.transmission_risk_value)
        .ok_or(RiskError::UnknownTransmissionRiskLevel(level))
}

/// Scan seconds weighted by the first weight whose range contains the typical attenuation.
fn determine_weighted_seconds(window: &ExposureWindow, weights: &[MinutesAtAttenuationWeight]) -> f64 {
    window
        .scan_instances
        .iter()
        .map(|scan| {
            let weight = weights
                .iter()
                .find(|w| w.attenuation_range.in_range(f64::from(scan.typical_attenuation_db)))
                .map_or(0.0, |w| w.weight);
            f64::from(scan.seconds_since_last_scan) * weight
        })
        .sum()
}

fn determine_risk_level(
    normalized_time: f64,
    mappings: &[NormalizedTimeToRiskLevelMapping],
) -> Option<RiskLevel> {
    mappings
        .iter()
        .find(|mapping| mapping.normalized_time_range.in_range(normalized_time))
        .map(|mapping| mapping.risk_level)
}

fn age_in_days(date_millis_since_epoch: i64, now: DateTime<Utc>) -> i64 {
    (now.timestamp_millis() - date_millis_since_epoch).div_euclid(MILLIS_PER_DAY)
}

/// Scoring seam for the risk-state machinery.
pub trait RiskLevels: Send + Sync {
    fn calculate_risk(
        &self,
        params: &RiskCalculationParameters,
        window: &ExposureWindow,
    ) -> Result<Option<RiskResult>, RiskError>;

    fn aggregate_results(
        &self,
        params: &RiskCalculationParameters,
        results: &[(ExposureWindow, RiskResult)],
    ) -> EwAggregatedRiskResult;
}

/// [`RiskLevels`] with "now" taken from a clock.
pub struct DefaultRiskLevels {
    clock: Arc<dyn Clock>,
}

impl DefaultRiskLevels {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Score every window and aggregate the survivors.
    ///
    /// A configuration error in one window does not stop the others; the
    /// failed windows are returned alongside the aggregate.
    pub fn evaluate(
        &self,
        params: &RiskCalculationParameters,
        windows: &[ExposureWindow],
    ) -> RiskEvaluation {
        let mut scored = Vec::new();
        let mut failed = Vec::new();
        for window in windows {
            match self.calculate_risk(params, window) {
                Ok(Some(result)) => scored.push((window.clone(), result)),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Could not score exposure window");
                    failed.push((window.clone(), e));
                }
            }
        }
        RiskEvaluation {
            aggregated: self.aggregate_results(params, &scored),
            evaluated: windows.len(),
            scored: scored.len(),
            failed,
        }
    }
}

/// Outcome of [`DefaultRiskLevels::evaluate`].
#[derive(Debug)]
pub struct RiskEvaluation {
    pub aggregated: EwAggregatedRiskResult,
    /// Windows passed in
    pub evaluated: usize,
    /// Windows that survived the filters and mappings
    pub scored: usize,
    pub failed: Vec<(ExposureWindow, RiskError)>,
}

impl RiskEvaluation {
    /// Windows that did not contribute, whether filtered out or failed.
    pub fn dropped(&self) -> usize {
        self.evaluated - self.scored
    }
}

impl RiskLevels for DefaultRiskLevels {
    fn calculate_risk(
        &self,
        params: &RiskCalculationParameters,
        window: &ExposureWindow,
    ) -> Result<Option<RiskResult>, RiskError> {
        calculate_risk(params, window, self.clock.now_utc())
    }

    fn aggregate_results(
        &self,
        params: &RiskCalculationParameters,
        results: &[(ExposureWindow, RiskResult)],
    ) -> EwAggregatedRiskResult {
        aggregate_results(params, results)
    }
}
