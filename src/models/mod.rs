//! Data models for query requests and responses.
//!
//! This module contains the envelopes exchanged between a client and the
//! transport, shared by the executor, authorizers and the session manager.

pub mod request;
pub mod response;

pub use request::{Headers, RequestEnvelope};
pub use response::{QueryResponse, Timings};
