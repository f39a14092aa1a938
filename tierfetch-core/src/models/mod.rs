//! Domain models for tierfetch.
//!
//! ## Submodules
//!
//! - [`result`] - Fetch results (Tier, FailureKind, FetchResult, HybridResult)
//! - [`robots`] - Robots permission (RobotsDecision, RobotsCacheEntry)
//! - [`origin`] - URL parsing and origin normalization

mod origin;
mod result;
mod robots;

pub use origin::{origin_of, parse_url};
pub use result::{
    FailureKind, FetchResult, FetchResultBuilder, HybridResult, Route, Tier, is_success_status,
};
pub use robots::{RobotsCacheEntry, RobotsDecision};
