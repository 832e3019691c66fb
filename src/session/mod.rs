//! Client session identifiers.
//!
//! # Responsibilities
//! - Generate random session ids that carry session options
//! - Recover the options from an id without any server-side state
//!
//! # Design Decisions
//! - Ids are RFC 4122 version 4 UUIDs so they pass through any tool that
//!   validates UUIDs; the options live in bits that are random in a plain
//!   v4 UUID and are never the version or variant bits.

pub mod sid;

pub use sid::{Sid, SidError, SessionOptions};
