//! One [`Upstream`](crate::sources::Upstream) per capability.

pub mod calfire;
pub mod firms;
pub mod nws;
pub mod usdm;

pub use calfire::CalFireIncidents;
pub use firms::FirmsActiveFire;
pub use nws::NwsWeather;
pub use usdm::UsdmDrought;
