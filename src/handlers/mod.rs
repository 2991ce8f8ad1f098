//! HTTP handlers.
//!
//! - [`client`]: the client-facing vote API (`/votes`, `/results`).
//! - [`peer`]: node-to-node calls under `/internal`.

pub mod client;
pub mod peer;
