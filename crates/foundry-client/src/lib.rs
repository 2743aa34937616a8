//! # foundry-client
//!
//! Client library for forwarding chat conversations to a Foundry agent
//! endpoint.
//!
//! - [`FoundryClient`] validates a conversation, picks API-key or Entra ID
//!   authentication, checks that the endpoint resolves (IPv4 first) and
//!   posts it upstream
//! - [`token`] acquires and caches OAuth2 client-credentials tokens
//! - [`responses::normalize`] turns any of the known response shapes into one
//!   display string
//! - [`diagnostics`] backs the health, auth and connectivity reports
//!
//! ## Example
//!
//! ```no_run
//! use foundry_client::FoundryClient;
//! use foundry_common::{ChatMessage, Config, Credentials, ForwardRequest};
//!
//! # async fn example() -> Result<(), foundry_client::ClientError> {
//! let config = Config::new("https://my-resource.services.ai.azure.com/api/projects/p/applications/a/protocols/openai/responses")
//!     .with_credentials(Credentials::default().with_api_key("your-api-key"));
//!
//! let client = FoundryClient::new(config)?;
//! let request = ForwardRequest::new(vec![ChatMessage::user("Hello!")]);
//!
//! let response = client.forward_chat(&request).await?;
//! println!("Agent: {}", response.text);
//! # Ok(())
//! # }
//! ```

pub mod diagnostics;
pub mod dns;
pub mod endpoint;
pub mod error;
pub mod responses;
pub mod token;

pub use diagnostics::{AuthDiagnostics, ConnectionReport, ConnectionTestError, HealthReport};
pub use dns::{DnsError, Resolver, SystemResolver};
pub use endpoint::Endpoint;
pub use error::ClientError;
pub use responses::FoundryClient;
pub use token::{Clock, SystemClock, TokenCache, TokenError, TokenManager};
