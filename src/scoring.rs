//! Fire risk scoring.
//!
//! A fixed-weight bracket score over temperature, humidity and wind speed.
//! The brackets are part of the public contract: the browser client renders
//! the same numbers, so they must not drift.
//!
//! # Score
//!
//! | Term        | Brackets (strict inequalities)           |
//! |-------------|------------------------------------------|
//! | temperature | >35 → 30, >25 → 20, >15 → 10, else 5     |
//! | humidity    | <20 → 40, <40 → 25, <60 → 15, else 5     |
//! | wind speed  | >25 → 30, >15 → 20, >10 → 10, else 5     |
//!
//! The total lies in `[15, 100]`. A total of 70 or more is `High`, 40 or
//! more is `Medium`, anything else `Low`. The scorer never returns
//! `Critical`.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::RiskLevel;

/// Score at or above which risk is `High`.
const HIGH_THRESHOLD: u32 = 70;

/// Score at or above which risk is `Medium`.
const MEDIUM_THRESHOLD: u32 = 40;

const HIGH_RECOMMENDATIONS: [&str; 4] = [
    "Immediate alert to fire departments and emergency services",
    "Restrict outdoor activities and campfires",
    "Increase surveillance and monitoring in the area",
    "Prepare evacuation plans for nearby communities",
];

const MEDIUM_RECOMMENDATIONS: [&str; 4] = [
    "Enhanced monitoring of environmental conditions",
    "Alert forest rangers and local authorities",
    "Issue public advisories about fire safety",
    "Prepare response teams for potential deployment",
];

const LOW_RECOMMENDATIONS: [&str; 3] = [
    "Continue regular monitoring protocols",
    "Maintain standard fire prevention measures",
    "Monitor weather forecasts for changes",
];

/// Environmental readings fed to the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readings {
    /// Air temperature in °C.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Wind speed in km/h.
    pub wind_speed: f64,
}

/// How strongly one reading contributes to the risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    #[serde(rename = "Low Impact")]
    Low,
    #[serde(rename = "Medium Impact")]
    Medium,
    #[serde(rename = "High Impact")]
    High,
}

/// Per-reading impact classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactFactors {
    pub temperature: Impact,
    pub humidity: Impact,
    pub wind_speed: Impact,
}

/// Output of [`assess`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub confidence: u32,
    pub factors: ImpactFactors,
    pub recommendations: Vec<String>,
}

/// Score a set of readings.
///
/// Everything but `confidence` is a pure function of the readings.
/// Confidence is a base value per level plus a uniform draw from `rng`,
/// rounded to the nearest integer:
///
/// - `High`: 85 + U(0, 10)
/// - `Medium`: 75 + U(0, 15)
/// - `Low`: 80 + U(0, 15)
pub fn assess<R: Rng>(readings: &Readings, rng: &mut R) -> RiskAssessment {
    let risk_score = risk_score(readings);
    let risk_level = risk_level(risk_score);

    let (base, spread): (f64, f64) = match risk_level {
        RiskLevel::High => (85.0, 10.0),
        RiskLevel::Medium => (75.0, 15.0),
        _ => (80.0, 15.0),
    };
    let confidence = (base + rng.gen_range(0.0..spread)).round() as u32;

    RiskAssessment {
        risk_level,
        risk_score,
        confidence,
        factors: impact_factors(readings),
        recommendations: recommendations(risk_level)
            .iter()
            .map(|r| (*r).to_string())
            .collect(),
    }
}

/// Sum of the three bracket terms.
pub fn risk_score(readings: &Readings) -> u32 {
    temperature_term(readings.temperature)
        + humidity_term(readings.humidity)
        + wind_term(readings.wind_speed)
}

pub fn risk_level(score: u32) -> RiskLevel {
    if score >= HIGH_THRESHOLD {
        RiskLevel::High
    } else if score >= MEDIUM_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// The fixed advice list for a risk level.
///
/// `Critical` shares the `High` list.
pub fn recommendations(level: RiskLevel) -> &'static [&'static str] {
    match level {
        RiskLevel::High | RiskLevel::Critical => &HIGH_RECOMMENDATIONS,
        RiskLevel::Medium => &MEDIUM_RECOMMENDATIONS,
        RiskLevel::Low => &LOW_RECOMMENDATIONS,
    }
}

fn temperature_term(celsius: f64) -> u32 {
    if celsius > 35.0 {
        30
    } else if celsius > 25.0 {
        20
    } else if celsius > 15.0 {
        10
    } else {
        5
    }
}

// Inverse: drier air scores higher.
fn humidity_term(percent: f64) -> u32 {
    if percent < 20.0 {
        40
    } else if percent < 40.0 {
        25
    } else if percent < 60.0 {
        15
    } else {
        5
    }
}

fn wind_term(kmh: f64) -> u32 {
    if kmh > 25.0 {
        30
    } else if kmh > 15.0 {
        20
    } else if kmh > 10.0 {
        10
    } else {
        5
    }
}

// Impact thresholds are independent of the score brackets.
fn impact_factors(readings: &Readings) -> ImpactFactors {
    let temperature = if readings.temperature > 30.0 {
        Impact::High
    } else if readings.temperature > 20.0 {
        Impact::Medium
    } else {
        Impact::Low
    };

    let humidity = if readings.humidity < 30.0 {
        Impact::High
    } else if readings.humidity < 50.0 {
        Impact::Medium
    } else {
        Impact::Low
    };

    let wind_speed = if readings.wind_speed > 20.0 {
        Impact::High
    } else if readings.wind_speed > 10.0 {
        Impact::Medium
    } else {
        Impact::Low
    };

    ImpactFactors {
        temperature,
        humidity,
        wind_speed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::rngs::mock::StepRng;

    fn readings(temperature: f64, humidity: f64, wind_speed: f64) -> Readings {
        Readings {
            temperature,
            humidity,
            wind_speed,
        }
    }

    #[test]
    fn test_maximum_score_is_high() {
        let assessment = assess(&readings(36.0, 10.0, 26.0), &mut StepRng::new(0, 0));

        assert_eq!(assessment.risk_score, 100);
        assert_eq!(assessment.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_mild_conditions_are_low() {
        let assessment = assess(&readings(20.0, 70.0, 5.0), &mut StepRng::new(0, 0));

        assert_eq!(assessment.risk_score, 20);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_mixed_conditions_are_medium() {
        // 20 (temperature > 25) + 15 (humidity 45 is not < 40) + 20 (wind > 15)
        let assessment = assess(&readings(26.0, 45.0, 16.0), &mut StepRng::new(0, 0));

        assert_eq!(assessment.risk_score, 55);
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_brackets_are_strict() {
        assert_eq!(temperature_term(35.0), 20);
        assert_eq!(temperature_term(35.01), 30);
        assert_eq!(temperature_term(25.0), 10);
        assert_eq!(temperature_term(15.0), 5);

        assert_eq!(humidity_term(20.0), 25);
        assert_eq!(humidity_term(19.99), 40);
        assert_eq!(humidity_term(40.0), 15);
        assert_eq!(humidity_term(60.0), 5);

        assert_eq!(wind_term(25.0), 20);
        assert_eq!(wind_term(25.5), 30);
        assert_eq!(wind_term(10.0), 5);
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(risk_level(70), RiskLevel::High);
        assert_eq!(risk_level(69), RiskLevel::Medium);
        assert_eq!(risk_level(40), RiskLevel::Medium);
        assert_eq!(risk_level(39), RiskLevel::Low);
    }

    #[test]
    fn test_score_range_over_grid() {
        let allowed = [5, 10, 15, 20, 25, 30, 40];
        for t in [-50.0, 0.0, 15.0, 20.0, 25.5, 35.0, 40.0, 60.0] {
            for h in [0.0, 19.0, 20.0, 39.0, 59.0, 60.0, 100.0] {
                for w in [0.0, 10.0, 12.0, 16.0, 26.0, 200.0] {
                    let score = risk_score(&readings(t, h, w));
                    assert!((15..=100).contains(&score), "score {score} for {t}/{h}/{w}");
                    assert!(allowed.contains(&temperature_term(t)));
                    assert!(allowed.contains(&humidity_term(h)));
                    assert!(allowed.contains(&wind_term(w)));
                }
            }
        }
    }

    #[test]
    fn test_confidence_lower_bound_per_level() {
        let mut zero = StepRng::new(0, 0);

        assert_eq!(assess(&readings(36.0, 10.0, 26.0), &mut zero).confidence, 85);
        assert_eq!(assess(&readings(26.0, 45.0, 16.0), &mut zero).confidence, 75);
        assert_eq!(assess(&readings(20.0, 70.0, 5.0), &mut zero).confidence, 80);
    }

    #[test]
    fn test_confidence_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let high = assess(&readings(36.0, 10.0, 26.0), &mut rng);
            assert!((85..=95).contains(&high.confidence));

            let medium = assess(&readings(26.0, 45.0, 16.0), &mut rng);
            assert!((75..=90).contains(&medium.confidence));

            let low = assess(&readings(20.0, 70.0, 5.0), &mut rng);
            assert!((80..=95).contains(&low.confidence));
        }
    }

    #[test]
    fn test_impact_thresholds_differ_from_score() {
        // 31°C scores only 20 on temperature but is already high impact.
        let factors = impact_factors(&readings(31.0, 35.0, 11.0));

        assert_eq!(factors.temperature, Impact::High);
        assert_eq!(factors.humidity, Impact::Medium);
        assert_eq!(factors.wind_speed, Impact::Medium);

        let calm = impact_factors(&readings(20.0, 50.0, 10.0));
        assert_eq!(calm.temperature, Impact::Low);
        assert_eq!(calm.humidity, Impact::Low);
        assert_eq!(calm.wind_speed, Impact::Low);
    }

    #[test]
    fn test_recommendations_per_level() {
        let high = assess(&readings(36.0, 10.0, 26.0), &mut StepRng::new(0, 0));
        assert_eq!(high.recommendations.len(), 4);
        assert_eq!(
            high.recommendations[0],
            "Immediate alert to fire departments and emergency services"
        );

        let medium = assess(&readings(26.0, 45.0, 16.0), &mut StepRng::new(0, 0));
        assert_eq!(medium.recommendations.len(), 4);

        let low = assess(&readings(20.0, 70.0, 5.0), &mut StepRng::new(0, 0));
        assert_eq!(low.recommendations.len(), 3);
        assert_eq!(low.recommendations[2], "Monitor weather forecasts for changes");
    }

    #[test]
    fn test_assessment_wire_format() {
        let assessment = assess(&readings(36.0, 10.0, 26.0), &mut StepRng::new(0, 0));
        let json = serde_json::to_value(&assessment).unwrap();

        assert_eq!(json["riskLevel"], "High");
        assert_eq!(json["riskScore"], 100);
        assert_eq!(json["factors"]["windSpeed"], "High Impact");
    }
}
