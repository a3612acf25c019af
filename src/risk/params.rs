//! Risk calculation parameters as distributed with the app configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interval with independently inclusive or exclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub min_exclusive: bool,
    #[serde(default)]
    pub max_exclusive: bool,
}

impl Range {
    /// Closed interval `[min, max]`.
    pub fn closed(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    /// Half-open interval `[min, max)`.
    pub fn closed_open(min: f64, max: f64) -> Self {
        Self {
            max_exclusive: true,
            ..Self::closed(min, max)
        }
    }

    pub fn in_range(&self, value: f64) -> bool {
        let above_min = if self.min_exclusive {
            value > self.min
        } else {
            value >= self.min
        };
        let below_max = if self.max_exclusive {
            value < self.max
        } else {
            value <= self.max
        };
        above_min && below_max
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.min_exclusive { '(' } else { '[' };
        let close = if self.max_exclusive { ')' } else { ']' };
        write!(f, "{open}{}, {}{close}", self.min, self.max)
    }
}

/// Risk level of an exposure window or a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum RiskLevel {
    Unspecified = 0,
    Low = 1,
    High = 2,
}

impl TryFrom<i32> for RiskLevel {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RiskLevel::Unspecified),
            1 => Ok(RiskLevel::Low),
            2 => Ok(RiskLevel::High),
            other => Err(format!("Unknown risk level {other}")),
        }
    }
}

impl From<RiskLevel> for i32 {
    fn from(level: RiskLevel) -> Self {
        level as i32
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Unspecified => write!(f, "unspecified"),
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Drops a window if it spent `dropIfMinutesInRange` minutes in `attenuationRange`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinutesAtAttenuationFilter {
    pub attenuation_range: Range,
    pub drop_if_minutes_in_range: Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinutesAtAttenuationWeight {
    pub attenuation_range: Range,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTimeToRiskLevelMapping {
    pub normalized_time_range: Range,
    pub risk_level: RiskLevel,
}

/// Offsets that add up to a transmission risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionRiskLevelEncoding {
    pub infectiousness_offset_standard: i32,
    pub infectiousness_offset_high: i32,
    pub report_type_offset_recursive: i32,
    pub report_type_offset_self_report: i32,
    pub report_type_offset_confirmed_clinical_diagnosis: i32,
    pub report_type_offset_confirmed_test: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrlFilter {
    pub drop_if_trl_in_range: Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionRiskValueMapping {
    pub transmission_risk_level: i32,
    pub transmission_risk_value: f64,
}

/// Complete configuration of the scoring engine. Immutable per evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskCalculationParameters {
    pub minutes_at_attenuation_filters: Vec<MinutesAtAttenuationFilter>,
    pub minutes_at_attenuation_weights: Vec<MinutesAtAttenuationWeight>,
    #[serde(alias = "normalizedTimePerEWToRiskLevelMapping")]
    pub normalized_time_per_exposure_window_to_risk_level_mapping:
        Vec<NormalizedTimeToRiskLevelMapping>,
    #[serde(alias = "normalizedTimePerDayToRiskLevelMappingList")]
    pub normalized_time_per_day_to_risk_level_mapping: Vec<NormalizedTimeToRiskLevelMapping>,
    #[serde(alias = "trlEncoding")]
    pub transmission_risk_level_encoding: TransmissionRiskLevelEncoding,
    #[serde(alias = "trlFilters")]
    pub transmission_risk_level_filters: Vec<TrlFilter>,
    pub transmission_risk_value_mapping: Vec<TransmissionRiskValueMapping>,
}

impl Default for RiskCalculationParameters {
    /// Built-in configuration used when no parameters file is present.
    ///
    /// Filters, weights and mappings follow the distribution server. The
    /// report type offsets differ: a confirmed test ranks above a recursive
    /// report, so confirmed test plus high infectiousness reaches TRL 8.
    fn default() -> Self {
        Self {
            minutes_at_attenuation_filters: vec![MinutesAtAttenuationFilter {
                attenuation_range: Range::closed_open(0.0, 73.0),
                drop_if_minutes_in_range: Range::closed_open(0.0, 10.0),
            }],
            minutes_at_attenuation_weights: vec![
                MinutesAtAttenuationWeight {
                    attenuation_range: Range::closed_open(0.0, 55.0),
                    weight: 1.0,
                },
                MinutesAtAttenuationWeight {
                    attenuation_range: Range::closed_open(55.0, 63.0),
                    weight: 0.5,
                },
            ],
            normalized_time_per_exposure_window_to_risk_level_mapping: vec![
                NormalizedTimeToRiskLevelMapping {
                    normalized_time_range: Range::closed_open(0.0, 15.0),
                    risk_level: RiskLevel::Low,
                },
                NormalizedTimeToRiskLevelMapping {
                    normalized_time_range: Range::closed(15.0, 9999.0),
                    risk_level: RiskLevel::High,
                },
            ],
            normalized_time_per_day_to_risk_level_mapping: vec![
                NormalizedTimeToRiskLevelMapping {
                    normalized_time_range: Range::closed_open(0.0, 15.0),
                    risk_level: RiskLevel::Low,
                },
                NormalizedTimeToRiskLevelMapping {
                    normalized_time_range: Range::closed(15.0, 99999.0),
                    risk_level: RiskLevel::High,
                },
            ],
            transmission_risk_level_encoding: TransmissionRiskLevelEncoding {
                infectiousness_offset_standard: 0,
                infectiousness_offset_high: 4,
                report_type_offset_recursive: 2,
                report_type_offset_self_report: 3,
                report_type_offset_confirmed_clinical_diagnosis: 2,
                report_type_offset_confirmed_test: 4,
            },
            transmission_risk_level_filters: vec![TrlFilter {
                drop_if_trl_in_range: Range::closed(1.0, 2.0),
            }],
            transmission_risk_value_mapping: [
                (1, 0.0),
                (2, 0.0),
                (3, 0.6),
                (4, 0.8),
                (5, 1.0),
                (6, 1.2),
                (7, 1.4),
                (8, 1.6),
            ]
            .into_iter()
            .map(|(level, value)| TransmissionRiskValueMapping {
                transmission_risk_level: level,
                transmission_risk_value: value,
            })
            .collect(),
        }
    }
}
