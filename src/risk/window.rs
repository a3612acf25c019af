//! Exposure windows as reported by the exposure detection platform.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// How the key owner's diagnosis was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ReportType {
    Unknown = 0,
    ConfirmedTest = 1,
    ConfirmedClinicalDiagnosis = 2,
    SelfReport = 3,
    Recursive = 4,
    Revoked = 5,
}

impl TryFrom<i32> for ReportType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ReportType::Unknown,
            1 => ReportType::ConfirmedTest,
            2 => ReportType::ConfirmedClinicalDiagnosis,
            3 => ReportType::SelfReport,
            4 => ReportType::Recursive,
            5 => ReportType::Revoked,
            other => return Err(format!("Unknown report type {other}")),
        })
    }
}

impl From<ReportType> for i32 {
    fn from(report_type: ReportType) -> Self {
        report_type as i32
    }
}

/// Infectiousness of the key owner on the day of the exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Infectiousness {
    None = 0,
    Standard = 1,
    High = 2,
}

impl TryFrom<i32> for Infectiousness {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Infectiousness::None,
            1 => Infectiousness::Standard,
            2 => Infectiousness::High,
            other => return Err(format!("Unknown infectiousness {other}")),
        })
    }
}

impl From<Infectiousness> for i32 {
    fn from(infectiousness: Infectiousness) -> Self {
        infectiousness as i32
    }
}

/// One Bluetooth scan within an exposure window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanInstance {
    #[serde(alias = "minAttenuation")]
    pub min_attenuation_db: i32,
    #[serde(alias = "typicalAttenuation")]
    pub typical_attenuation_db: i32,
    pub seconds_since_last_scan: i32,
}

/// A time bucket of proximity scans against one diagnosis key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureWindow {
    /// Start of the UTC day the window belongs to
    pub date_millis_since_epoch: i64,
    pub report_type: ReportType,
    pub infectiousness: Infectiousness,
    pub calibration_confidence: i32,
    pub scan_instances: Vec<ScanInstance>,
}

impl ExposureWindow {
    pub fn date(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.date_millis_since_epoch)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_json() {
        let json = r#"{
            "dateMillisSinceEpoch": 1614556800000,
            "reportType": 1,
            "infectiousness": 2,
            "calibrationConfidence": 0,
            "scanInstances": [
                {"minAttenuation": 30, "typicalAttenuation": 25, "secondsSinceLastScan": 300},
                {"minAttenuationDb": 50, "typicalAttenuationDb": 55, "secondsSinceLastScan": 120}
            ]
        }"#;
        let window: ExposureWindow = serde_json::from_str(json).unwrap();

        assert_eq!(window.report_type, ReportType::ConfirmedTest);
        assert_eq!(window.infectiousness, Infectiousness::High);
        assert_eq!(window.scan_instances[0].min_attenuation_db, 30);
        assert_eq!(window.scan_instances[1].typical_attenuation_db, 55);
        assert_eq!(window.scan_instances[1].seconds_since_last_scan, 120);
        assert_eq!(window.date().to_rfc3339(), "2021-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_unknown_codes_rejected() {
        assert!(ReportType::try_from(9).is_err());
        assert!(Infectiousness::try_from(3).is_err());
    }
}
