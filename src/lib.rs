//! # capsule-rs
//!
//! Kubernetes controller keeping the cluster-wide Capsule configuration
//! validated.
//!
//! The controller watches `CapsuleConfiguration` resources, admits events for
//! a single configured instance and re-validates that configuration on every
//! admitted event. An invalid configuration is reported as a fatal error so
//! the process stops instead of running with rules it cannot apply.

pub mod config;
pub mod configuration;
pub mod error;
pub mod logging;
pub mod operator;

pub use crate::config::{ConfigLoader, ControllerConfig};
pub use error::{Error, Result};
