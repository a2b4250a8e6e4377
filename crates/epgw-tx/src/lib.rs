//! # EPGW Transform - Per-Message Pipeline Stages
//!
//! This crate implements the stages a worker drives an envelope through:
//! operation resolution, header gating, binary-record decode, JSON-schema
//! validation, the declarative transform, binary-record encode, and destination
//! routing. Everything here is pure with respect to the broker: stages read and
//! mutate the envelope, and the `epgw-io` crate owns the Kafka plumbing around
//! them.

/// Resource registry: schemas and transform expressions by name
pub mod registry;

/// Binary record <-> JSON codec
pub mod codec;

/// Operation resolver: message headers -> channel operation
pub mod resolve;

/// Header gate: mandatory inbound header checks
pub mod gate;

/// Transform stage: validation, declarative transform, header restore
pub mod transform;

/// Output route selection: destination topic and outbound schema header
pub mod route;
