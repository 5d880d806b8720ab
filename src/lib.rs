//! FireWatch - wildfire risk scoring, alerting and reporting.
//!
//! # Overview
//!
//! FireWatch turns weather readings (temperature, humidity, wind speed) into
//! a 0-100 risk score and a Low/Medium/High risk level, stores the result as
//! a time-limited prediction, and tracks two further kinds of record:
//!
//! - **Alerts**, with an acknowledge/escalate/extend/resolve lifecycle
//! - **Reports**, with draft/publish/archive states, view counts and versions
//!
//! Everything is served as JSON over HTTP and persisted in a single SQLite
//! database.
//!
//! # Modules
//!
//! - [`model`]: Entities, their validation and lifecycle transitions
//! - [`scoring`]: The risk scorer
//! - [`query`]: Filters, sorting, paging and area queries
//! - [`storage`]: SQLite document store with optimistic revisions
//! - [`service`]: Operations over the store
//! - [`api`]: HTTP routes and middleware
//! - [`config`]: Environment configuration
//! - [`error`]: Error type and HTTP mapping

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod scoring;
pub mod service;
pub mod storage;
