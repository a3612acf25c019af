//! Risk calculation test cases from the JSON fixture

use chrono::{DateTime, Duration, TimeZone, Utc};
use exposure_agent::clock::FixedClock;
use exposure_agent::risk::{
    aggregate_results, calculate_risk, DefaultRiskLevels, ExposureWindow, Infectiousness,
    ReportType, RiskCalculationParameters, RiskLevel, ScanInstance,
};
use serde::Deserialize;
use std::sync::Arc;

const FIXTURE: &str = include_str!("fixtures/exposure-windows-risk-calculation.json");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fixture {
    default_risk_calculation_configuration: RiskCalculationParameters,
    test_cases: Vec<TestCase>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestCase {
    description: String,
    exposure_windows: Vec<TestWindow>,
    exp_total_risk_level: RiskLevel,
    exp_total_minimum_distinct_encounters_with_low_risk: usize,
    exp_total_minimum_distinct_encounters_with_high_risk: usize,
    exp_age_of_most_recent_date_with_low_risk: Option<i64>,
    exp_age_of_most_recent_date_with_high_risk: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestWindow {
    age_in_days: i64,
    report_type: ReportType,
    infectiousness: Infectiousness,
    calibration_confidence: i32,
    scan_instances: Vec<ScanInstance>,
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 10, 12, 0, 0).unwrap()
}

/// Midnight UTC of the day `age_in_days` before today.
fn start_of_day(age_in_days: i64) -> DateTime<Utc> {
    let today = now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
    today - Duration::days(age_in_days)
}

impl TestWindow {
    fn to_exposure_window(&self) -> ExposureWindow {
        ExposureWindow {
            date_millis_since_epoch: start_of_day(self.age_in_days).timestamp_millis(),
            report_type: self.report_type,
            infectiousness: self.infectiousness,
            calibration_confidence: self.calibration_confidence,
            scan_instances: self.scan_instances.clone(),
        }
    }
}

fn load_fixture() -> Fixture {
    serde_json::from_str(FIXTURE).expect("fixture should parse")
}

#[test]
fn test_fixture_configuration_matches_defaults() {
    let fixture = load_fixture();
    assert_eq!(
        fixture.default_risk_calculation_configuration,
        RiskCalculationParameters::default()
    );
}

#[test]
fn test_fixture_cases() {
    let fixture = load_fixture();
    let params = &fixture.default_risk_calculation_configuration;
    assert!(!fixture.test_cases.is_empty());

    for case in &fixture.test_cases {
        let scored: Vec<_> = case
            .exposure_windows
            .iter()
            .map(TestWindow::to_exposure_window)
            .filter_map(|window| {
                calculate_risk(params, &window, now())
                    .unwrap_or_else(|e| panic!("{}: {e}", case.description))
                    .map(|result| (window, result))
            })
            .collect();
        let aggregated = aggregate_results(params, &scored);

        assert_eq!(
            aggregated.total_risk_level, case.exp_total_risk_level,
            "{}",
            case.description
        );
        assert_eq!(
            aggregated.total_minimum_distinct_encounters_with_low_risk,
            case.exp_total_minimum_distinct_encounters_with_low_risk,
            "{}",
            case.description
        );
        assert_eq!(
            aggregated.total_minimum_distinct_encounters_with_high_risk,
            case.exp_total_minimum_distinct_encounters_with_high_risk,
            "{}",
            case.description
        );
        assert_eq!(
            aggregated.most_recent_date_with_low_risk,
            case.exp_age_of_most_recent_date_with_low_risk.map(start_of_day),
            "{}",
            case.description
        );
        assert_eq!(
            aggregated.most_recent_date_with_high_risk,
            case.exp_age_of_most_recent_date_with_high_risk.map(start_of_day),
            "{}",
            case.description
        );
    }
}

#[test]
fn test_day_risks_are_ordered_most_recent_first() {
    let fixture = load_fixture();
    let params = &fixture.default_risk_calculation_configuration;
    let case = fixture
        .test_cases
        .iter()
        .find(|case| case.exposure_windows.len() == 4)
        .expect("mixed days case");

    let windows: Vec<ExposureWindow> = case
        .exposure_windows
        .iter()
        .map(TestWindow::to_exposure_window)
        .collect();
    let levels = DefaultRiskLevels::new(Arc::new(FixedClock::new(now())));
    let evaluation = levels.evaluate(params, &windows);
    let aggregated = evaluation.aggregated;

    assert!(evaluation.failed.is_empty());
    assert_eq!(evaluation.scored, 4);
    let ages: Vec<i64> = aggregated
        .exposure_window_day_risks
        .iter()
        .map(|day| day.age_in_days)
        .collect();
    assert_eq!(ages, vec![1, 4, 6]);

    let day_levels: Vec<RiskLevel> = aggregated
        .exposure_window_day_risks
        .iter()
        .map(|day| day.risk_level)
        .collect();
    assert_eq!(day_levels, vec![RiskLevel::Low, RiskLevel::High, RiskLevel::Low]);
    assert!((aggregated.exposure_window_day_risks[1].normalized_time - 64.0).abs() < 1e-9);
    assert_eq!(aggregated.last_risk_encounter(), Some(start_of_day(4)));
}

#[test]
fn test_unmapped_day_is_unspecified() {
    let mut params = RiskCalculationParameters::default();
    params.normalized_time_per_day_to_risk_level_mapping.truncate(1);
    let window = ExposureWindow {
        date_millis_since_epoch: start_of_day(2).timestamp_millis(),
        report_type: ReportType::ConfirmedTest,
        infectiousness: Infectiousness::High,
        calibration_confidence: 0,
        scan_instances: vec![ScanInstance {
            min_attenuation_db: 30,
            typical_attenuation_db: 30,
            seconds_since_last_scan: 1200,
        }],
    };

    let result = calculate_risk(&params, &window, now()).unwrap().unwrap();
    let aggregated = aggregate_results(&params, &[(window, result)]);

    assert_eq!(
        aggregated.exposure_window_day_risks[0].risk_level,
        RiskLevel::Unspecified
    );
    // The overall level never drops below low.
    assert_eq!(aggregated.total_risk_level, RiskLevel::Low);
    assert_eq!(aggregated.most_recent_date_with_high_risk, None);
}
