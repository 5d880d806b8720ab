//! SQLite document store for FireWatch.
//!
//! Each collection is one table of JSON documents:
//!
//! - `id`: Document id (UUID text)
//! - `rev`: Revision counter, bumped on every write
//! - `doc`: The entity serialized as JSON
//!
//! Queries read fields with `json_extract`, and the hot fields are covered
//! by expression indexes. Writers that read-modify-write a document pass the
//! revision they read to [`Storage::replace`], which only succeeds if nobody
//! wrote in between.

use std::str::FromStr;

use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use thiserror::Error;

use crate::model::{Alert, Prediction, Record, Report, timestamp};
use crate::query::{Condition, Direction, FieldValue, Filter, Page, Sort, path};

/// Errors raised by the store itself, never by the caller's input.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed document: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The three document collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Alerts,
    Predictions,
    Reports,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Alerts,
        Collection::Predictions,
        Collection::Reports,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Collection::Alerts => "alerts",
            Collection::Predictions => "predictions",
            Collection::Reports => "reports",
        }
    }

    /// Singular entity name used in error messages.
    pub fn entity(&self) -> &'static str {
        match self {
            Collection::Alerts => "Alert",
            Collection::Predictions => "Prediction",
            Collection::Reports => "Report",
        }
    }

    /// Expression indexes as `(name, [paths])`.
    fn indexes(&self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            Collection::Alerts => &[
                ("location_created", &[path::LOCATION, path::CREATED_AT]),
                ("severity_status", &[path::SEVERITY, path::STATUS]),
                ("type_active", &[path::ALERT_TYPE, path::IS_ACTIVE]),
                ("coordinates", &[path::LATITUDE, path::LONGITUDE]),
                ("expires", &[path::EXPIRES_AT]),
                ("status_created", &[path::STATUS, path::CREATED_AT]),
            ],
            Collection::Predictions => &[
                ("location_date", &[path::LOCATION, path::PREDICTION_DATE]),
                ("coordinates", &[path::LATITUDE, path::LONGITUDE]),
                ("risk_level_date", &[path::PREDICTION_RISK_LEVEL, path::PREDICTION_DATE]),
                ("valid_until", &[path::VALID_UNTIL]),
            ],
            Collection::Reports => &[
                ("location_created", &[path::LOCATION, path::CREATED_AT]),
                ("type_status", &[path::REPORT_TYPE, path::STATUS]),
                ("risk_level_created", &[path::RISK_LEVEL, path::CREATED_AT]),
                ("period", &[path::PERIOD_START, path::PERIOD_END]),
            ],
        }
    }
}

/// An entity stored in a collection.
pub trait Document: Record {
    const COLLECTION: Collection;
}

impl Document for Alert {
    const COLLECTION: Collection = Collection::Alerts;
}

impl Document for Prediction {
    const COLLECTION: Collection = Collection::Predictions;
}

impl Document for Report {
    const COLLECTION: Collection = Collection::Reports;
}

/// A document together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<D> {
    pub doc: D,
    pub rev: i64,
}

/// Averages of several fields within one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAverages {
    pub key: String,
    pub count: i64,
    /// One entry per requested value path, in request order.
    pub averages: Vec<f64>,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open the store and create missing tables and indexes.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:firewatch.db?mode=rwc" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> StorageResult<Self> {
        let options = SqlitePoolOptions::new();

        // Every connection to ":memory:" opens its own empty database, so the
        // pool must hold exactly one connection and never recycle it.
        let options = if database_url.contains(":memory:") {
            options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options.max_connections(5)
        };

        // REGEXP backs the case-insensitive text filters.
        let connect = SqliteConnectOptions::from_str(database_url)?.with_regexp();
        let pool = options.connect_with(connect).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> StorageResult<()> {
        for collection in Collection::ALL {
            let table = collection.table();

            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    rev INTEGER NOT NULL,
                    doc TEXT NOT NULL CHECK (json_valid(doc))
                )
                "#
            ))
            .execute(&self.pool)
            .await?;

            for (name, paths) in collection.indexes() {
                let columns: Vec<String> = paths.iter().map(|p| field(p)).collect();
                sqlx::query(&format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{name} ON {table} ({})",
                    columns.join(", ")
                ))
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    /// Release all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn insert<D: Document>(&self, doc: &D) -> StorageResult<()> {
        let json = serde_json::to_string(doc)?;

        sqlx::query(&format!(
            "INSERT INTO {} (id, rev, doc) VALUES (?, 0, ?)",
            D::COLLECTION.table()
        ))
        .bind(doc.id())
        .bind(json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id<D: Document>(&self, id: &str) -> StorageResult<Option<D>> {
        Ok(self.find_versioned(id).await?.map(|v| v.doc))
    }

    pub async fn find_versioned<D: Document>(&self, id: &str) -> StorageResult<Option<Versioned<D>>> {
        let row = sqlx::query(&format!(
            "SELECT doc, rev FROM {} WHERE id = ?",
            D::COLLECTION.table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Versioned {
            doc: decode(&row)?,
            rev: row.try_get("rev")?,
        }))
    }

    /// Documents matching `filter` in `sort` order, optionally windowed.
    pub async fn find<D: Document>(
        &self,
        filter: &Filter,
        sort: Sort,
        page: Option<Page>,
    ) -> StorageResult<Vec<D>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT doc FROM {}", D::COLLECTION.table()));
        push_filter(&mut builder, filter);

        let direction = match sort.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        builder.push(format!(
            " ORDER BY {} {direction}, rowid {direction}",
            field(sort.path)
        ));

        if let Some(page) = page {
            builder
                .push(" LIMIT ")
                .push_bind(i64::from(page.limit))
                .push(" OFFSET ")
                .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode).collect()
    }

    pub async fn count(&self, collection: Collection, filter: &Filter) -> StorageResult<u64> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) AS n FROM {}", collection.table()));
        push_filter(&mut builder, filter);

        let row = builder.build().fetch_one(&self.pool).await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    /// Overwrite a document if it is still at `expected_rev`.
    ///
    /// Returns `false` when the document was written by someone else in the
    /// meantime, or no longer exists.
    pub async fn replace<D: Document>(&self, doc: &D, expected_rev: i64) -> StorageResult<bool> {
        let json = serde_json::to_string(doc)?;

        let result = sqlx::query(&format!(
            "UPDATE {} SET doc = ?, rev = rev + 1 WHERE id = ? AND rev = ?",
            D::COLLECTION.table()
        ))
        .bind(json)
        .bind(doc.id())
        .bind(expected_rev)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Returns whether a document was removed.
    pub async fn delete(&self, collection: Collection, id: &str) -> StorageResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", collection.table()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Atomically add `by` to a numeric field, treating a missing field as 0.
    ///
    /// Returns whether the document exists.
    pub async fn increment(
        &self,
        collection: Collection,
        id: &str,
        path: &'static str,
        by: i64,
    ) -> StorageResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET doc = json_set(doc, '{path}', COALESCE({}, 0) + ?), rev = rev + 1 \
             WHERE id = ?",
            collection.table(),
            field(path)
        ))
        .bind(by)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Number of documents per distinct value of `group_path`, largest
    /// group first. Documents without the field are left out.
    pub async fn count_by(
        &self,
        collection: Collection,
        group_path: &'static str,
        filter: &Filter,
    ) -> StorageResult<Vec<(String, i64)>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} AS k, COUNT(*) AS n FROM {}",
            field(group_path),
            collection.table()
        ));
        push_filter(&mut builder, filter);
        builder.push(" GROUP BY k ORDER BY n DESC, k ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let key: Option<String> = row.try_get("k")?;
            if let Some(key) = key {
                groups.push((key, row.try_get("n")?));
            }
        }
        Ok(groups)
    }

    /// Integer sum of a numeric field, 0 when nothing matches.
    pub async fn sum(
        &self,
        collection: Collection,
        value_path: &'static str,
        filter: &Filter,
    ) -> StorageResult<i64> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT CAST(COALESCE(SUM({}), 0) AS INTEGER) AS total FROM {}",
            field(value_path),
            collection.table()
        ));
        push_filter(&mut builder, filter);

        let row = builder.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("total")?)
    }

    /// Count and per-field averages for each distinct value of
    /// `group_path`, largest group first.
    pub async fn group_averages(
        &self,
        collection: Collection,
        group_path: &'static str,
        value_paths: &[&'static str],
        filter: &Filter,
    ) -> StorageResult<Vec<GroupAverages>> {
        let mut select = format!("SELECT {} AS k, COUNT(*) AS n", field(group_path));
        for (i, value_path) in value_paths.iter().enumerate() {
            select.push_str(&format!(", AVG({}) AS a{i}", field(value_path)));
        }
        select.push_str(&format!(" FROM {}", collection.table()));

        let mut builder = QueryBuilder::<Sqlite>::new(select);
        push_filter(&mut builder, filter);
        builder.push(" GROUP BY k ORDER BY n DESC, k ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let key: Option<String> = row.try_get("k")?;
            let Some(key) = key else { continue };

            let mut averages = Vec::with_capacity(value_paths.len());
            for i in 0..value_paths.len() {
                let average: Option<f64> = row.try_get(format!("a{i}").as_str())?;
                averages.push(average.unwrap_or(0.0));
            }

            groups.push(GroupAverages {
                key,
                count: row.try_get("n")?,
                averages,
            });
        }
        Ok(groups)
    }
}

/// SQL expression reading one JSON path. Paths are crate constants.
fn field(path: &str) -> String {
    format!("json_extract(doc, '{path}')")
}

fn decode<D: Document>(row: &SqliteRow) -> StorageResult<D> {
    let doc: String = row.try_get("doc")?;
    Ok(serde_json::from_str(&doc)?)
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    for (i, condition) in filter.conditions().iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        push_condition(builder, condition);
    }
}

fn push_condition(builder: &mut QueryBuilder<'_, Sqlite>, condition: &Condition) {
    match condition {
        Condition::Equals { path, value } => {
            builder.push(field(path)).push(" = ");
            push_value(builder, value);
        }
        Condition::OneOf { path, values } => {
            if values.is_empty() {
                builder.push("0");
                return;
            }
            builder.push(field(path)).push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_value(builder, value);
            }
            builder.push(")");
        }
        Condition::Contains { path, needle } => {
            builder
                .push(format!("{} REGEXP ", field(path)))
                .push_bind(substring_pattern(needle));
        }
        Condition::AnyContains { paths, needle } => {
            builder.push("(");
            for (i, path) in paths.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder
                    .push(format!("{} REGEXP ", field(path)))
                    .push_bind(substring_pattern(needle));
            }
            builder.push(")");
        }
        Condition::Between { path, min, max } => {
            builder
                .push(field(path))
                .push(" BETWEEN ")
                .push_bind(*min)
                .push(" AND ")
                .push_bind(*max);
        }
        Condition::After {
            path,
            instant,
            inclusive,
        } => {
            let op = if *inclusive { " >= " } else { " > " };
            builder
                .push(field(path))
                .push(op)
                .push_bind(timestamp::format(instant));
        }
    }
}

// JSON booleans come back from json_extract as 0/1.
fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &FieldValue) {
    match value {
        FieldValue::Text(text) => builder.push_bind(text.clone()),
        FieldValue::Bool(flag) => builder.push_bind(i64::from(*flag)),
        FieldValue::Number(number) => builder.push_bind(*number),
    };
}

/// Unicode case-insensitive pattern matching `needle` literally.
fn substring_pattern(needle: &str) -> String {
    format!("(?i){}", regex::escape(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::alert::tests::sample_new_alert;
    use crate::model::prediction::tests::sample_prediction;
    use crate::model::report::tests::sample_new_report;
    use crate::model::{AlertStatus, Severity};
    use chrono::{Duration, Utc};

    async fn storage() -> Storage {
        Storage::new("sqlite::memory:").await.unwrap()
    }

    fn alert(title: &str, severity: Severity) -> Alert {
        let mut new = sample_new_alert();
        new.title = title.to_string();
        new.severity = severity;
        Alert::create(new, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find_by_id() {
        let storage = storage().await;
        let alert = alert("Smoke", Severity::High);

        storage.insert(&alert).await.unwrap();

        // Stored timestamps keep millisecond precision only.
        let found: Alert = storage.find_by_id(&alert.id).await.unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(&found).unwrap(),
            serde_json::to_value(&alert).unwrap()
        );

        let missing: Option<Alert> = storage.find_by_id("nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_replace_rejects_stale_revision() {
        let storage = storage().await;
        let alert = alert("Smoke", Severity::High);
        storage.insert(&alert).await.unwrap();

        let Versioned { mut doc, rev } = storage
            .find_versioned::<Alert>(&alert.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rev, 0);

        doc.resolve();
        assert!(storage.replace(&doc, rev).await.unwrap());
        assert!(!storage.replace(&doc, rev).await.unwrap());

        let stored = storage.find_versioned::<Alert>(&alert.id).await.unwrap().unwrap();
        assert_eq!(stored.rev, 1);
        assert_eq!(stored.doc.status, AlertStatus::Resolved);
    }

    #[tokio::test]
    async fn test_find_filters_sorts_and_pages() {
        let storage = storage().await;
        for (title, severity) in [
            ("a", Severity::Low),
            ("b", Severity::High),
            ("c", Severity::High),
            ("d", Severity::Medium),
        ] {
            storage.insert(&alert(title, severity)).await.unwrap();
        }

        let high = Filter::new().equals(path::SEVERITY, "High");
        let found: Vec<Alert> = storage
            .find(&high, Sort { path: path::TITLE, direction: Direction::Asc }, None)
            .await
            .unwrap();
        let titles: Vec<&str> = found.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["b", "c"]);

        let page = Page::new(Some(2), Some(3), 50).unwrap();
        let found: Vec<Alert> = storage
            .find(&Filter::new(), Sort { path: path::TITLE, direction: Direction::Desc }, Some(page))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "a");

        assert_eq!(storage.count(Collection::Alerts, &high).await.unwrap(), 2);
        assert_eq!(storage.count(Collection::Alerts, &Filter::new()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_boolean_and_time_conditions() {
        let storage = storage().await;
        let now = Utc::now();

        let live = alert("live", Severity::Low);
        let mut closed = alert("closed", Severity::Low);
        closed.resolve();
        let mut stale = alert("stale", Severity::Low);
        stale.expires_at = now - Duration::hours(1);

        for a in [&live, &closed, &stale] {
            storage.insert(a).await.unwrap();
        }

        let filter = Filter::new().live(path::EXPIRES_AT, now);
        let found: Vec<Alert> = storage.find(&filter, Sort::newest_first(), None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "live");
    }

    #[tokio::test]
    async fn test_contains_is_case_insensitive() {
        let storage = storage().await;
        storage.insert(&alert("Smoke", Severity::Low)).await.unwrap();

        let filter = Filter::new().contains(path::LOCATION, "PINE");
        assert_eq!(storage.count(Collection::Alerts, &filter).await.unwrap(), 1);

        let filter = Filter::new().contains(path::LOCATION, "cedar");
        assert_eq!(storage.count(Collection::Alerts, &filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_contains_folds_non_ascii_case() {
        let storage = storage().await;
        let mut new = sample_new_alert();
        new.location = "Île-de-Ré, Łódź".to_string();
        storage.insert(&Alert::create(new, Utc::now()).unwrap()).await.unwrap();

        for needle in ["île-DE-RÉ", "ŁÓDŹ", "é, ł"] {
            let filter = Filter::new().contains(path::LOCATION, needle);
            assert_eq!(
                storage.count(Collection::Alerts, &filter).await.unwrap(),
                1,
                "{needle}"
            );
        }

        // Regex metacharacters in the needle are literal.
        let filter = Filter::new().contains(path::LOCATION, ".*");
        assert_eq!(storage.count(Collection::Alerts, &filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_increment_and_sum() {
        let storage = storage().await;
        let report = Report::create(sample_new_report(), Utc::now()).unwrap();
        storage.insert(&report).await.unwrap();

        for _ in 0..3 {
            assert!(storage
                .increment(Collection::Reports, &report.id, path::VIEWS, 1)
                .await
                .unwrap());
        }
        assert!(!storage
            .increment(Collection::Reports, "nope", path::VIEWS, 1)
            .await
            .unwrap());

        let stored: Report = storage.find_by_id(&report.id).await.unwrap().unwrap();
        assert_eq!(stored.metrics.views, 3);

        let total = storage
            .sum(Collection::Reports, path::VIEWS, &Filter::new())
            .await
            .unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_count_by_and_group_averages() {
        let storage = storage().await;
        for severity in [Severity::High, Severity::High, Severity::Low] {
            storage.insert(&alert("x", severity)).await.unwrap();
        }

        let groups = storage
            .count_by(Collection::Alerts, path::SEVERITY, &Filter::new())
            .await
            .unwrap();
        assert_eq!(groups, [("High".to_string(), 2), ("Low".to_string(), 1)]);

        let now = Utc::now();
        storage.insert(&sample_prediction(now)).await.unwrap();
        storage.insert(&sample_prediction(now)).await.unwrap();

        let groups = storage
            .group_averages(
                Collection::Predictions,
                path::PREDICTION_RISK_LEVEL,
                &[path::PREDICTION_CONFIDENCE, path::PREDICTION_RISK_SCORE],
                &Filter::new(),
            )
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "High");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].averages, [85.0, 100.0]);
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = storage().await;
        let alert = alert("Smoke", Severity::High);
        storage.insert(&alert).await.unwrap();

        assert!(storage.delete(Collection::Alerts, &alert.id).await.unwrap());
        assert!(!storage.delete(Collection::Alerts, &alert.id).await.unwrap());
    }
}
