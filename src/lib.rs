//! Rack provider - Kubernetes provider bootstrap for the rack control plane
//!
//! Resolves cluster credentials, assembles the [`provider::Provider`]
//! capability context the rest of the control plane works through, and
//! starts the background controllers and heartbeat that keep the rack's
//! view of the cluster current.
//!
//! # Modules
//!
//! - [`bootstrap`] - One-time process setup (TLS provider, runtime log noise)
//! - [`config`] - Settings read from the environment
//! - [`credentials`] - In-cluster and kubectl credential resolution
//! - [`provider`] - The capability context and its context forking
//! - [`controller`] - Deployment, event, node and pod controllers
//! - [`heartbeat`] - Periodic inventory report
//! - [`engine`] - Substrate-specific capability trait and generic backend
//! - [`cluster`] - Typed cluster reads
//! - [`apply`] - Server-side apply of rendered manifests
//! - [`template`] - Embedded manifest templates
//! - [`metrics`] - Outbound telemetry
//! - [`telemetry`] - Structured logging setup
//! - [`error`] - Error types for the provider

#![deny(missing_docs)]

pub mod apply;
pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod heartbeat;
pub mod metrics;
pub mod provider;
pub mod telemetry;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
