//! Scored fire risk predictions.
//!
//! A prediction is written once from a scoring run and afterwards only
//! deactivated or replaced wholesale. It is never escalated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Coordinates, Record, RiskLevel, ValidationError, check_non_negative, check_range, check_text,
    default_expiry, default_true, millis_until, new_id, timestamp,
};
use crate::scoring::{ImpactFactors, Readings, RiskAssessment};

pub const DEFAULT_MODEL_VERSION: &str = "1.0.0";

/// Data source recorded for predictions created through the HTTP API.
pub const API_DATA_SOURCE: &str = "api_request";

/// Measured conditions a prediction was scored from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditions {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    #[serde(default)]
    pub precipitation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_moisture: Option<f64>,
}

impl Conditions {
    pub fn readings(&self) -> Readings {
        Readings {
            temperature: self.temperature,
            humidity: self.humidity,
            wind_speed: self.wind_speed,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("environmentalData.temperature", self.temperature, -50.0, 60.0)?;
        check_range("environmentalData.humidity", self.humidity, 0.0, 100.0)?;
        check_range("environmentalData.windSpeed", self.wind_speed, 0.0, 200.0)?;
        check_non_negative("environmentalData.precipitation", self.precipitation)?;
        if let Some(soil_moisture) = self.soil_moisture {
            check_range("environmentalData.soilMoisture", soil_moisture, 0.0, 100.0)?;
        }
        Ok(())
    }
}

/// The scored part of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub confidence: u32,
    pub factors: ImpactFactors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionMetadata {
    #[serde(default = "default_model_version")]
    pub model_version: String,
    /// Scoring time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<u64>,
    #[serde(default = "default_data_source")]
    pub data_source: String,
}

impl Default for PredictionMetadata {
    fn default() -> Self {
        Self {
            model_version: default_model_version(),
            processing_time: None,
            data_source: default_data_source(),
        }
    }
}

fn default_model_version() -> String {
    DEFAULT_MODEL_VERSION.to_string()
}

fn default_data_source() -> String {
    "manual_input".to_string()
}

/// A stored prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub id: String,
    pub location: String,
    pub coordinates: Coordinates,
    pub environmental_data: Conditions,
    pub prediction: Outcome,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(with = "timestamp")]
    pub prediction_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub valid_until: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub metadata: PredictionMetadata,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Readings as posted by a client. Presence is checked explicitly so a
/// missing reading gets a precise error instead of a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConditions {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub precipitation: Option<f64>,
    pub soil_moisture: Option<f64>,
}

impl NewConditions {
    pub fn into_conditions(self) -> Result<Conditions, ValidationError> {
        match (self.temperature, self.humidity, self.wind_speed) {
            (Some(temperature), Some(humidity), Some(wind_speed)) => {
                let conditions = Conditions {
                    temperature,
                    humidity,
                    wind_speed,
                    precipitation: self.precipitation.unwrap_or(0.0),
                    soil_moisture: self.soil_moisture,
                };
                conditions.validate()?;
                Ok(conditions)
            }
            _ => Err(ValidationError::new(
                "Missing environmental data: temperature, humidity and windSpeed are required",
            )),
        }
    }
}

/// Request body for `POST /api/predictions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrediction {
    pub location: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub environmental_data: Option<NewConditions>,
}

impl NewPrediction {
    /// Split into the validated location, coordinates and readings.
    pub fn into_parts(self) -> Result<(String, Coordinates, Conditions), ValidationError> {
        let location = self
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        let (Some(location), Some(conditions)) = (location, self.environmental_data) else {
            return Err(ValidationError::new(
                "Missing required fields: location and environmentalData",
            ));
        };

        let coordinates = self.coordinates.unwrap_or_default();
        coordinates.validate()?;

        Ok((location, coordinates, conditions.into_conditions()?))
    }
}

impl Prediction {
    /// Build a prediction from a finished scoring run.
    pub fn create(
        location: String,
        coordinates: Coordinates,
        environmental_data: Conditions,
        assessment: RiskAssessment,
        processing_time_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let prediction = Self {
            id: new_id(),
            location,
            coordinates,
            environmental_data,
            prediction: Outcome {
                risk_level: assessment.risk_level,
                risk_score: assessment.risk_score,
                confidence: assessment.confidence,
                factors: assessment.factors,
            },
            recommendations: assessment.recommendations,
            prediction_date: now,
            valid_until: default_expiry(now),
            is_active: true,
            metadata: PredictionMetadata {
                processing_time: Some(processing_time_ms),
                data_source: API_DATA_SOURCE.to_string(),
                ..PredictionMetadata::default()
            },
            created_at: now,
            updated_at: now,
        };

        prediction.validate()?;
        Ok(prediction)
    }

    /// Retire the prediction. There is no way back.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    /// Milliseconds of validity left, zero once expired.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> i64 {
        millis_until(self.valid_until, now)
    }

    pub fn into_view(self, now: DateTime<Utc>) -> PredictionView {
        PredictionView {
            is_expired: self.is_expired(now),
            time_remaining: self.time_remaining(now),
            prediction: self,
        }
    }
}

impl Record for Prediction {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        check_text("location", &self.location, usize::MAX)?;
        self.coordinates.validate()?;
        self.environmental_data.validate()?;

        if self.prediction.risk_score > 100 {
            return Err(ValidationError(format!(
                "prediction.riskScore must be between 0 and 100 (got {})",
                self.prediction.risk_score
            )));
        }
        if self.prediction.confidence > 100 {
            return Err(ValidationError(format!(
                "prediction.confidence must be between 0 and 100 (got {})",
                self.prediction.confidence
            )));
        }
        Ok(())
    }
}

/// A prediction with its derived, never-persisted fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionView {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub is_expired: bool,
    pub time_remaining: i64,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scoring::assess;
    use chrono::Duration;
    use rand::rngs::mock::StepRng;

    pub(crate) fn sample_prediction(now: DateTime<Utc>) -> Prediction {
        let conditions = Conditions {
            temperature: 36.0,
            humidity: 10.0,
            wind_speed: 26.0,
            precipitation: 0.0,
            soil_moisture: None,
        };
        let assessment = assess(&conditions.readings(), &mut StepRng::new(0, 0));
        Prediction::create(
            "Cedar Ridge".to_string(),
            Coordinates {
                latitude: 40.0,
                longitude: -120.0,
            },
            conditions,
            assessment,
            2,
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_create_from_assessment() {
        let now = Utc::now();
        let prediction = sample_prediction(now);

        assert_eq!(prediction.prediction.risk_level, RiskLevel::High);
        assert_eq!(prediction.prediction.risk_score, 100);
        assert_eq!(prediction.recommendations.len(), 4);
        assert_eq!(prediction.valid_until, now + Duration::hours(24));
        assert_eq!(prediction.metadata.data_source, API_DATA_SOURCE);
        assert_eq!(prediction.metadata.model_version, DEFAULT_MODEL_VERSION);
        assert!(prediction.is_active);
    }

    #[test]
    fn test_missing_readings_are_rejected() {
        let request = NewPrediction {
            location: Some("Cedar Ridge".to_string()),
            coordinates: None,
            environmental_data: Some(NewConditions {
                temperature: Some(30.0),
                humidity: None,
                wind_speed: Some(5.0),
                ..NewConditions::default()
            }),
        };

        let err = request.into_parts().unwrap_err();
        assert!(err.0.contains("Missing environmental data"));
    }

    #[test]
    fn test_missing_location_is_rejected() {
        let request = NewPrediction {
            location: Some("  ".to_string()),
            ..NewPrediction::default()
        };

        let err = request.into_parts().unwrap_err();
        assert!(err.0.contains("Missing required fields"));
    }

    #[test]
    fn test_out_of_range_readings_are_rejected() {
        let conditions = NewConditions {
            temperature: Some(61.0),
            humidity: Some(20.0),
            wind_speed: Some(5.0),
            ..NewConditions::default()
        };
        assert!(conditions.into_conditions().is_err());

        let conditions = NewConditions {
            temperature: Some(20.0),
            humidity: Some(20.0),
            wind_speed: Some(201.0),
            ..NewConditions::default()
        };
        assert!(conditions.into_conditions().is_err());
    }

    #[test]
    fn test_coordinates_default_to_origin() {
        let request = NewPrediction {
            location: Some("Cedar Ridge".to_string()),
            coordinates: None,
            environmental_data: Some(NewConditions {
                temperature: Some(30.0),
                humidity: Some(30.0),
                wind_speed: Some(5.0),
                ..NewConditions::default()
            }),
        };

        let (_, coordinates, conditions) = request.into_parts().unwrap();
        assert_eq!(coordinates, Coordinates::default());
        assert_eq!(conditions.precipitation, 0.0);
    }

    #[test]
    fn test_expiry_and_deactivation() {
        let now = Utc::now();
        let mut prediction = sample_prediction(now);

        assert!(!prediction.is_expired(now));
        assert!(prediction.is_expired(now + Duration::hours(25)));
        assert_eq!(prediction.time_remaining(now + Duration::hours(25)), 0);

        prediction.deactivate();
        assert!(!prediction.is_active);
    }
}
