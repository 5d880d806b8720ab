//! Prediction scoring, storage and statistics.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use super::{Change, Listing, merge_patch, modify};
use crate::error::{AppError, AppResult};
use crate::model::prediction::NewConditions;
use crate::model::{NewPrediction, Prediction, RiskLevel, timestamp};
use crate::query::{BoundingBox, Filter, ListQuery, PredictionCriteria, Sort, path};
use crate::scoring::{self, RiskAssessment};
use crate::storage::{Collection, Storage};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionStats {
    /// Active, unexpired predictions.
    pub total: u64,
    pub by_risk_level: Vec<RiskLevelSummary>,
    #[serde(with = "timestamp")]
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskLevelSummary {
    pub risk_level: String,
    pub count: i64,
    pub avg_confidence: f64,
    pub avg_risk_score: f64,
}

#[derive(Clone)]
pub struct PredictionService {
    storage: Storage,
}

impl PredictionService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn list(
        &self,
        criteria: &PredictionCriteria,
        now: DateTime<Utc>,
    ) -> AppResult<Listing<Prediction>> {
        let ListQuery { filter, sort, page } = criteria.to_query(now)?;

        let items: Vec<Prediction> = self.storage.find(&filter, sort, Some(page)).await?;
        let total = self.storage.count(Collection::Predictions, &filter).await?;

        Ok(Listing {
            pagination: page.describe(items.len(), total),
            items,
        })
    }

    pub async fn get(&self, id: &str) -> AppResult<Prediction> {
        self.storage
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(Collection::Predictions.entity(), id))
    }

    /// Score the request and store the result.
    pub async fn create<R: Rng>(
        &self,
        request: NewPrediction,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> AppResult<Prediction> {
        let (location, coordinates, conditions) = request.into_parts()?;

        let started = Instant::now();
        let assessment = scoring::assess(&conditions.readings(), rng);
        let processing_time = started.elapsed().as_millis() as u64;

        let prediction = Prediction::create(
            location,
            coordinates,
            conditions,
            assessment,
            processing_time,
            now,
        )?;
        self.storage.insert(&prediction).await?;
        Ok(prediction)
    }

    /// Score readings without storing anything.
    pub fn assess<R: Rng>(&self, readings: NewConditions, rng: &mut R) -> AppResult<RiskAssessment> {
        let conditions = readings.into_conditions()?;
        Ok(scoring::assess(&conditions.readings(), rng))
    }

    pub async fn update(&self, id: &str, patch: &Value, now: DateTime<Utc>) -> AppResult<Prediction> {
        modify(&self.storage, id, now, |prediction: &mut Prediction| {
            *prediction = merge_patch(prediction, patch)?;
            Ok(Change::Modified)
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        if self.storage.delete(Collection::Predictions, id).await? {
            Ok(())
        } else {
            Err(AppError::not_found(Collection::Predictions.entity(), id))
        }
    }

    pub async fn deactivate(&self, id: &str, now: DateTime<Utc>) -> AppResult<Prediction> {
        modify(&self.storage, id, now, |prediction: &mut Prediction| {
            prediction.deactivate();
            Ok(Change::Modified)
        })
        .await
    }

    pub async fn in_area(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Prediction>> {
        let bbox = BoundingBox::around(latitude, longitude, radius_km)?;
        let filter = bbox.restrict(Filter::new().live(path::VALID_UNTIL, now));

        Ok(self.storage.find(&filter, Sort::newest_first(), None).await?)
    }

    /// Live predictions at one risk level.
    pub async fn by_risk_level(&self, level: RiskLevel, now: DateTime<Utc>) -> AppResult<Vec<Prediction>> {
        let filter = Filter::new()
            .equals(path::PREDICTION_RISK_LEVEL, level.as_str())
            .live(path::VALID_UNTIL, now);

        Ok(self.storage.find(&filter, Sort::newest_first(), None).await?)
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> AppResult<PredictionStats> {
        let live = Filter::new().live(path::VALID_UNTIL, now);

        let total = self.storage.count(Collection::Predictions, &live).await?;
        let by_risk_level = self
            .storage
            .group_averages(
                Collection::Predictions,
                path::PREDICTION_RISK_LEVEL,
                &[path::PREDICTION_CONFIDENCE, path::PREDICTION_RISK_SCORE],
                &live,
            )
            .await?
            .into_iter()
            .map(|group| RiskLevelSummary {
                risk_level: group.key,
                count: group.count,
                avg_confidence: group.averages[0],
                avg_risk_score: group.averages[1],
            })
            .collect();

        Ok(PredictionStats {
            total,
            by_risk_level,
            last_updated: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coordinates;
    use chrono::{Duration, TimeZone};
    use rand::rngs::mock::StepRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    async fn service() -> PredictionService {
        PredictionService::new(Storage::new("sqlite::memory:").await.unwrap())
    }

    fn request(temperature: f64, humidity: f64, wind_speed: f64, latitude: f64) -> NewPrediction {
        NewPrediction {
            location: Some("Cedar Ridge".to_string()),
            coordinates: Some(Coordinates {
                latitude,
                longitude: -120.0,
            }),
            environmental_data: Some(NewConditions {
                temperature: Some(temperature),
                humidity: Some(humidity),
                wind_speed: Some(wind_speed),
                ..NewConditions::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_create_scores_and_stores() {
        let service = service().await;
        let mut rng = StepRng::new(0, 0);

        let created = service
            .create(request(36.0, 10.0, 26.0, 40.0), &mut rng, now())
            .await
            .unwrap();
        assert_eq!(created.prediction.risk_level, RiskLevel::High);
        assert_eq!(created.prediction.risk_score, 100);
        assert_eq!(created.prediction.confidence, 85);
        assert!(created.metadata.processing_time.is_some());

        let stored = service.get(&created.id).await.unwrap();
        assert_eq!(stored.id, created.id);
        assert_eq!(stored.valid_until, now() + Duration::hours(24));
    }

    #[tokio::test]
    async fn test_create_rejects_missing_readings() {
        let service = service().await;
        let mut incomplete = request(30.0, 20.0, 5.0, 40.0);
        incomplete.environmental_data = None;

        let err = service
            .create(incomplete, &mut StepRng::new(0, 0), now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_assess_does_not_store() {
        let service = service().await;
        let readings = NewConditions {
            temperature: Some(20.0),
            humidity: Some(70.0),
            wind_speed: Some(5.0),
            ..NewConditions::default()
        };

        let assessment = service.assess(readings, &mut StepRng::new(0, 0)).unwrap();
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert_eq!(assessment.risk_score, 20);

        let listing = service
            .list(&PredictionCriteria::default(), now())
            .await
            .unwrap();
        assert!(listing.items.is_empty());
    }

    #[tokio::test]
    async fn test_deactivate_hides_from_live_queries() {
        let service = service().await;
        let mut rng = StepRng::new(0, 0);
        let created = service
            .create(request(36.0, 10.0, 26.0, 40.0), &mut rng, now())
            .await
            .unwrap();

        let deactivated = service.deactivate(&created.id, now()).await.unwrap();
        assert!(!deactivated.is_active);

        assert!(service.by_risk_level(RiskLevel::High, now()).await.unwrap().is_empty());
        assert!(service.in_area(40.0, -120.0, 10.0, now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_area_and_risk_level_queries() {
        let service = service().await;
        let mut rng = StepRng::new(0, 0);
        service
            .create(request(36.0, 10.0, 26.0, 40.0), &mut rng, now())
            .await
            .unwrap();
        service
            .create(request(20.0, 70.0, 5.0, 45.0), &mut rng, now())
            .await
            .unwrap();

        let nearby = service.in_area(40.0, -120.0, 50.0, now()).await.unwrap();
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].prediction.risk_level, RiskLevel::High);

        let low = service.by_risk_level(RiskLevel::Low, now()).await.unwrap();
        assert_eq!(low.len(), 1);

        // Past the validity window nothing is live.
        let later = now() + Duration::hours(25);
        assert!(service.by_risk_level(RiskLevel::Low, later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let service = service().await;
        let created = service
            .create(request(36.0, 10.0, 26.0, 40.0), &mut StepRng::new(0, 0), now())
            .await
            .unwrap();

        let updated = service
            .update(&created.id, &serde_json::json!({"location": "Cedar Ridge North"}), now())
            .await
            .unwrap();
        assert_eq!(updated.location, "Cedar Ridge North");

        let err = service
            .update(
                &created.id,
                &serde_json::json!({"coordinates": {"latitude": 95.0, "longitude": 0.0}}),
                now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        service.delete(&created.id).await.unwrap();
        assert!(matches!(
            service.delete(&created.id).await,
            Err(AppError::NotFound { .. })
        ));
        assert!(matches!(
            service.get(&created.id).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stats_group_live_predictions() {
        let service = service().await;
        let mut rng = StepRng::new(0, 0);
        for _ in 0..2 {
            service
                .create(request(36.0, 10.0, 26.0, 40.0), &mut rng, now())
                .await
                .unwrap();
        }
        let retired = service
            .create(request(20.0, 70.0, 5.0, 40.0), &mut rng, now())
            .await
            .unwrap();
        service.deactivate(&retired.id, now()).await.unwrap();

        let stats = service.stats(now()).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(
            stats.by_risk_level,
            [RiskLevelSummary {
                risk_level: "High".to_string(),
                count: 2,
                avg_confidence: 85.0,
                avg_risk_score: 100.0,
            }]
        );
    }
}
