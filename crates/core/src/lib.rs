// Core types for the TrustyData MCP gateway: session lifecycle and the
// gateway error taxonomy. No HTTP dependencies live here.

pub mod error;
pub mod session;
pub mod types;

pub use error::GatewayError;
pub use session::SessionStore;
pub use types::{Session, SessionId};
