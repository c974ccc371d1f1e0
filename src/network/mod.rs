//! Network Layer
//!
//! WebSocket surface over the escrow engine. This layer is
//! **non-deterministic** — all protocol rules live in `escrow/` and
//! `settlement/`; the server only shuttles messages and fans out events.

pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
pub use server::{EscrowServer, ServerConfig, ServerError};
