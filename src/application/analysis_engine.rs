// Analysis engine - AQI and threshold warnings from current metric values
use crate::domain::air_quality::{ALL_CLEAR, AirQualityReport, AqiLevel, Threshold};
use crate::domain::metric::MetricKind;
use std::collections::HashMap;

/// PM2.5 concentration (μg/m³) that maps to AQI 100.
const PM25_REFERENCE: f64 = 35.0;
/// CO concentration (ppm) that maps to AQI 100.
const CO_REFERENCE: f64 = 9.0;
const AQI_CEILING: f64 = 500.0;

pub const THRESHOLDS: [Threshold; 5] = [
    Threshold::new(MetricKind::Temperature, Some(18.0), Some(28.0)),
    Threshold::new(MetricKind::Humidity, Some(40.0), Some(70.0)),
    Threshold::new(MetricKind::Formaldehyde, None, Some(0.08)),
    Threshold::new(MetricKind::Pm2_5, None, Some(35.0)),
    Threshold::new(MetricKind::Co, None, Some(9.0)),
];

/// Composite AQI: the worse of the PM2.5 and CO sub-indices, each clamped to [0, 500].
pub fn calculate_aqi(pm25: f64, co: f64) -> f64 {
    let aqi_pm25 = (pm25 / PM25_REFERENCE * 100.0).clamp(0.0, AQI_CEILING);
    let aqi_co = (co / CO_REFERENCE * 100.0).clamp(0.0, AQI_CEILING);
    aqi_pm25.max(aqi_co)
}

/// Analyse the current value of each metric.
///
/// Metrics absent from `current` have not reported yet and count as 0, the
/// same default the metric store reports for them.
pub fn analyze(current: &HashMap<MetricKind, f64>) -> AirQualityReport {
    let value_of = |metric| current.get(&metric).copied().unwrap_or(0.0);
    let aqi = calculate_aqi(value_of(MetricKind::Pm2_5), value_of(MetricKind::Co));
    let level = AqiLevel::from_aqi(aqi);

    let mut warnings: Vec<String> = THRESHOLDS
        .iter()
        .filter_map(|t| t.check(value_of(t.metric)))
        .collect();

    let all_clear = warnings.is_empty();
    if all_clear {
        warnings.push(ALL_CLEAR.to_string());
    }

    AirQualityReport {
        aqi,
        level,
        advice: level.advice(),
        warnings,
        all_clear,
    }
}
