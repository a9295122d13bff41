//! REST API access for the analytics sources.
//!
//! `ApiClient` talks to the church-management backend over HTTPS with a
//! bearer token; `StatsSource` is the seam the fetch coordinator depends on.

pub mod client;
pub mod error;
pub mod source;

pub use client::ApiClient;
pub use error::ApiError;
pub use source::StatsSource;
