//! Request policy: client classification and unlock throttling.

pub mod classifier;
pub mod throttle;
