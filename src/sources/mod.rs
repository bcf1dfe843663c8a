//! Source clients: one generic cache/retry wrapper over per-capability upstreams.

pub mod client;
pub mod fixture;
pub mod http;
pub mod providers;
pub mod types;

pub use client::{RetryPolicy, SourceClient};
pub use fixture::FixtureUpstream;
pub use types::{
    ActiveFireFields, DroughtFields, DroughtLevel, Fetched, IncidentFields, ReadingStatus,
    SourceFields, SourceKind, SourceReading, Upstream, WeatherFields,
};
