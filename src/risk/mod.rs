//! Risk calculation for exposure windows.

pub mod levels;
pub mod params;
pub mod result;
pub mod window;

pub use levels::{
    aggregate_results, calculate_risk, DefaultRiskLevels, RiskEvaluation, RiskLevels,
};
pub use params::{
    MinutesAtAttenuationFilter, MinutesAtAttenuationWeight, NormalizedTimeToRiskLevelMapping,
    Range, RiskCalculationParameters, RiskLevel, TransmissionRiskLevelEncoding,
    TransmissionRiskValueMapping, TrlFilter,
};
pub use result::{EwAggregatedRiskResult, ExposureWindowDayRisk, RiskResult};
pub use window::{ExposureWindow, Infectiousness, ReportType, ScanInstance};
