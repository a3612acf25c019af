//! Results of the scoring engine.

use crate::risk::params::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score of a single exposure window that survived all filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskResult {
    pub transmission_risk_level: i32,
    /// Whether the encoded level had to be clamped into the valid range
    pub transmission_risk_level_clamped: bool,
    pub transmission_risk_value: f64,
    /// Weighted minutes multiplied by the transmission risk value
    pub normalized_time: f64,
    pub risk_level: RiskLevel,
    pub age_in_days: i64,
}

/// Aggregated risk of one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureWindowDayRisk {
    pub date: DateTime<Utc>,
    pub age_in_days: i64,
    pub normalized_time: f64,
    pub risk_level: RiskLevel,
    pub minimum_distinct_encounters_with_low_risk: usize,
    pub minimum_distinct_encounters_with_high_risk: usize,
}

/// Risk across all evaluated exposure windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EwAggregatedRiskResult {
    pub total_risk_level: RiskLevel,
    pub total_minimum_distinct_encounters_with_low_risk: usize,
    pub total_minimum_distinct_encounters_with_high_risk: usize,
    pub most_recent_date_with_low_risk: Option<DateTime<Utc>>,
    pub most_recent_date_with_high_risk: Option<DateTime<Utc>>,
    /// Per-day breakdown, most recent day first
    pub exposure_window_day_risks: Vec<ExposureWindowDayRisk>,
}

impl EwAggregatedRiskResult {
    pub fn is_increased_risk(&self) -> bool {
        self.total_risk_level == RiskLevel::High
    }

    pub fn is_low_risk(&self) -> bool {
        self.total_risk_level == RiskLevel::Low
    }

    /// Most recent day with any risk.
    pub fn last_risk_encounter(&self) -> Option<DateTime<Utc>> {
        match self.total_risk_level {
            RiskLevel::High => self.most_recent_date_with_high_risk,
            _ => self.most_recent_date_with_low_risk,
        }
    }
}
