//! # EPGW Core - Gateway Foundation Types
//!
//! This crate provides the foundational types for the EPortal message-transformation
//! gateway: the immutable configuration tree, the per-message envelope record, the
//! error taxonomy shared by every pipeline stage, and the wire-contract constants
//! for header and property names.
//!
//! ## Key Components
//!
//! - **Configuration**: YAML-based channel/operation/topic configuration under the
//!   `app` prefix, validated once at startup
//! - **Envelope**: the typed, single-owner state object that travels from a consumer
//!   through the worker pipeline to a producer or the DLQ
//! - **Error Taxonomy**: one variant per catalogued failure kind, surfaced by kind
//!   string rather than by type
//!
//! ## Example Usage
//!
//! ```rust
//! use epgw_core::config::GatewayConfig;
//!
//! # fn example() -> anyhow::Result<()> {
//! let yaml = std::fs::read_to_string("config/gateway.yml")?;
//! let config = GatewayConfig::from_yaml(&yaml)?;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

/// Channel, operation, topic, and DLQ configuration
pub mod config;

/// Per-message envelope and the commit-handle seam
pub mod envelope;

/// Pipeline error taxonomy
pub mod error;

/// Header names and other wire-contract constants
pub mod headers;

pub use config::{ChannelConfig, DlqConfig, GatewayConfig, KafkaConfig, OperationConfig, TopicsConfig};
pub use envelope::{CommitHandle, Envelope, EnvelopeState, HeaderMap};
pub use error::{CommitError, GatewayError};
