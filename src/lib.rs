//! `ecomarket-http` is a resilient async HTTP client for the EcoMarket JSON API.
//!
//! Every call goes through [`EcoMarketClient::execute`], which:
//! - bounds each attempt with its own timeout
//! - retries timeouts and transport failures up to a fixed budget
//! - rejects successful responses that are not JSON
//! - surfaces 409 conflicts and other HTTP errors without retrying
//! - reports each attempt to a [`Telemetry`] handle
//!
//! Catalog helpers such as [`EcoMarketClient::list_products`] and
//! [`EcoMarketClient::delete_producer`] are thin callers over that core.

mod cancel;
mod client;
mod error;
mod options;
mod request;
mod resources;
mod retry;
mod types;

pub mod telemetry;

pub use client::{EcoMarketClient, DEFAULT_BASE_URL};
pub use error::{ApiError, ErrorKind};
pub use options::ClientOptions;
pub use request::{Method, RequestSpec};
pub use telemetry::{Severity, Telemetry, TelemetryRecord};
pub use types::{ConflictDetails, DeleteOutcome, NewProduct, Product};

pub type Result<T> = std::result::Result<T, ApiError>;
