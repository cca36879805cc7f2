//! HTTP transport to the Survey Assist API.

pub mod http;

pub use http::{ApiClient, ApiError};
