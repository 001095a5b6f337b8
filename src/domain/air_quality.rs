// Air quality index and threshold domain models
use super::metric::MetricKind;
use serde::Serialize;
use std::fmt;

/// Line emitted when no threshold is breached.
pub const ALL_CLEAR: &str = "All parameters within safe range";

/// AQI bands, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AqiLevel {
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Unhealthy for Sensitive Groups")]
    UnhealthyForSensitiveGroups,
    #[serde(rename = "Unhealthy")]
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    #[serde(rename = "Hazardous")]
    Hazardous,
}

impl AqiLevel {
    /// Band for an AQI value. Upper bounds are inclusive.
    pub fn from_aqi(aqi: f64) -> Self {
        if aqi <= 50.0 {
            AqiLevel::Good
        } else if aqi <= 100.0 {
            AqiLevel::Moderate
        } else if aqi <= 150.0 {
            AqiLevel::UnhealthyForSensitiveGroups
        } else if aqi <= 200.0 {
            AqiLevel::Unhealthy
        } else if aqi <= 300.0 {
            AqiLevel::VeryUnhealthy
        } else {
            AqiLevel::Hazardous
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AqiLevel::Good => "Good",
            AqiLevel::Moderate => "Moderate",
            AqiLevel::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiLevel::Unhealthy => "Unhealthy",
            AqiLevel::VeryUnhealthy => "Very Unhealthy",
            AqiLevel::Hazardous => "Hazardous",
        }
    }

    pub fn advice(self) -> &'static str {
        match self {
            AqiLevel::Good => {
                "Air quality is satisfactory, with little or no air pollution."
            }
            AqiLevel::Moderate => {
                "Air quality is acceptable, but some pollutants may slightly affect a very small number of unusually sensitive people."
            }
            AqiLevel::UnhealthyForSensitiveGroups => {
                "Symptoms of sensitive people are mildly aggravated; healthy people may experience irritation."
            }
            AqiLevel::Unhealthy => {
                "Symptoms of sensitive people are further aggravated; the heart and respiratory systems of healthy people may be affected."
            }
            AqiLevel::VeryUnhealthy => {
                "Symptoms of people with heart or lung disease are markedly aggravated and exercise tolerance drops; healthy people commonly show symptoms."
            }
            AqiLevel::Hazardous => {
                "Healthy people have reduced exercise tolerance with strong, obvious symptoms; some illnesses may appear early."
            }
        }
    }
}

impl fmt::Display for AqiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Safe operating range of a metric. A missing bound is never breached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub metric: MetricKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Threshold {
    pub const fn new(metric: MetricKind, min: Option<f64>, max: Option<f64>) -> Self {
        Self { metric, min, max }
    }

    /// Warning text if `value` falls outside the range.
    pub fn check(&self, value: f64) -> Option<String> {
        let unit = self.metric.unit();
        if let Some(min) = self.min.filter(|min| value < *min) {
            return Some(format!(
                "{} too low: {} {} (minimum {} {})",
                self.metric, value, unit, min, unit
            ));
        }
        if let Some(max) = self.max.filter(|max| value > *max) {
            return Some(format!(
                "{} too high: {} {} (maximum {} {})",
                self.metric, value, unit, max, unit
            ));
        }
        None
    }
}

/// Result of analysing the current metric values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirQualityReport {
    pub aqi: f64,
    pub level: AqiLevel,
    pub advice: &'static str,
    /// Threshold warnings, or the single all-clear line.
    pub warnings: Vec<String>,
    pub all_clear: bool,
}

impl fmt::Display for AirQualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "AQI: {:.0} ({})", self.aqi, self.level)?;
        write!(f, "Advice: {}", self.advice)?;
        for warning in &self.warnings {
            write!(f, "\n{}", warning)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_bands_are_inclusive() {
        assert_eq!(AqiLevel::from_aqi(0.0), AqiLevel::Good);
        assert_eq!(AqiLevel::from_aqi(50.0), AqiLevel::Good);
        assert_eq!(AqiLevel::from_aqi(50.1), AqiLevel::Moderate);
        assert_eq!(AqiLevel::from_aqi(100.0), AqiLevel::Moderate);
        assert_eq!(AqiLevel::from_aqi(150.0), AqiLevel::UnhealthyForSensitiveGroups);
        assert_eq!(AqiLevel::from_aqi(200.0), AqiLevel::Unhealthy);
        assert_eq!(AqiLevel::from_aqi(300.0), AqiLevel::VeryUnhealthy);
        assert_eq!(AqiLevel::from_aqi(300.5), AqiLevel::Hazardous);
        assert_eq!(AqiLevel::from_aqi(500.0), AqiLevel::Hazardous);
    }

    #[test]
    fn test_upper_only_threshold_ignores_low_values() {
        let threshold = Threshold::new(MetricKind::Co, None, Some(9.0));
        assert_eq!(threshold.check(-3.0), None);
        assert_eq!(threshold.check(9.0), None);
        assert_eq!(
            threshold.check(12.0).as_deref(),
            Some("co too high: 12 ppm (maximum 9 ppm)")
        );
    }

    #[test]
    fn test_report_text_layout() {
        let report = AirQualityReport {
            aqi: 114.28,
            level: AqiLevel::UnhealthyForSensitiveGroups,
            advice: AqiLevel::UnhealthyForSensitiveGroups.advice(),
            warnings: vec!["pm2.5 too high: 40 μg/m³ (maximum 35 μg/m³)".to_string()],
            all_clear: false,
        };
        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "AQI: 114 (Unhealthy for Sensitive Groups)");
        assert!(lines[1].starts_with("Advice: "));
        assert!(lines[2].starts_with("pm2.5 too high"));
    }
}
