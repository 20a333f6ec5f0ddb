// MCP (Model Context Protocol) layer: JSON-RPC wire types, the protocol
// engine driving per-session dispatch, and the TrustyData-backed tools.

pub mod engine;
pub mod protocol;
pub mod tools;

pub use engine::{Outcome, ProtocolEngine};

/// Protocol revision implemented by this gateway (Streamable HTTP).
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Revisions accepted in the `MCP-Protocol-Version` header.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[PROTOCOL_VERSION];
