//! Client library: per-node calls and a failover session across nodes.

pub mod api;
pub mod session;

pub use api::{CallError, HttpNodeApi, NodeApi};
pub use session::{ClientError, ClientSession, SessionState};
