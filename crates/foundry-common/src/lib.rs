//! # foundry-common
//!
//! Types shared by the Foundry chat proxy, its client library and the CLI.
//!
//! - [`chat`]: conversation messages and content coercion
//! - [`client`]: upstream configuration, credentials and the forward request/response pair
//! - [`actions`]: extraction of page actions from agent replies
//!
//! ## Example
//!
//! ```
//! use foundry_common::{AuthMode, ChatPayload, Credentials, ForwardRequest};
//! use serde_json::json;
//!
//! let credentials = Credentials::default().with_api_key("key");
//! assert_eq!(credentials.auth_mode(), AuthMode::ApiKey);
//!
//! let payload: ChatPayload = serde_json::from_value(json!({
//!     "messages": [{"role": "user", "content": "Hello"}]
//! }))
//! .unwrap();
//! let request = ForwardRequest::try_from(payload).unwrap();
//! assert_eq!(request.messages.len(), 1);
//! ```

/// Page actions parsed out of agent replies.
pub mod actions;
/// Chat message types.
pub mod chat;
/// Upstream configuration and request/response types.
pub mod client;
/// Loose JSON inspection helpers.
pub mod json;

pub use actions::{ActionParser, AgentReply, FieldSelection, FormField};
pub use chat::{ChatMessage, MessageRole};
pub use client::{
    AuthMode, ChatPayload, Config, Credentials, ForwardRequest, ForwardResponse, InvalidPayload,
    ResponseShape,
};
