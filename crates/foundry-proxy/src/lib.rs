//! Foundry chat proxy.
//!
//! Accepts conversations from the embedded chat widget, authenticates against
//! the Foundry agent endpoint with an API key or an Entra ID client-credentials
//! token, and answers with the agent's reply reduced to a single display string.
//!
//! The binary in `main.rs` wires [`config::ProxyConfig`] into [`server::serve`];
//! the router is exposed separately so it can be exercised without a socket.

pub mod config;
pub mod error;
pub mod server;

pub use config::ProxyConfig;
pub use error::{ConfigError, ErrorReply, ProxyError};
pub use server::{AppState, router, serve};
