//! Command implementations for the CLI.

use anyhow::{Context, Result};
use colored::Colorize;

use foundry_client::diagnostics::TokenTestStatus;
use foundry_common::client::{API_KEY_VAR, CLIENT_ID_VAR, CLIENT_SECRET_VAR, TENANT_ID_VAR};
use foundry_common::{ActionParser, ChatMessage, ChatPayload};

use crate::client::{ChatOutcome, ProxyClient};
use crate::display::{
    Reveal, display_diagnostics, display_env_var, display_failure, display_health, display_hint,
    display_proxy_error, display_reply, display_section, display_warning,
};

/// Credential variables and how much of each may be shown.
const CREDENTIAL_VARS: [(&str, Reveal); 4] = [
    (TENANT_ID_VAR, Reveal::Prefix),
    (CLIENT_ID_VAR, Reveal::Prefix),
    (CLIENT_SECRET_VAR, Reveal::Length),
    (API_KEY_VAR, Reveal::Length),
];

/// Checks local credentials, proxy health and the proxy's auth diagnostics.
///
/// Returns `true` when the proxy is reachable and reports no issues. Proxy
/// problems are printed, not returned.
pub async fn check(client: &ProxyClient) -> bool {
    println!("{}", "Checking authentication configuration".bold());

    display_section("Environment variables:");
    for (name, reveal) in CREDENTIAL_VARS {
        let value = std::env::var(name)
            .ok()
            .filter(|value| !value.trim().is_empty());
        display_env_var(name, value.as_deref(), reveal);
    }

    display_section(&format!("Proxy server ({}):", client.base_url()));
    match client.health().await {
        Ok(health) => display_health(&health),
        Err(e) => {
            display_failure("Proxy server is NOT running or not accessible");
            println!("  Error: {e:#}");
            display_hint("Start the server with: foundry-proxy");
            return false;
        }
    }

    display_section("Diagnostics:");
    let healthy = match client.diagnose_auth().await {
        Ok(diagnostics) => {
            display_diagnostics(&diagnostics);
            diagnostics.issues.is_empty()
                && diagnostics
                    .token_test
                    .as_ref()
                    .is_none_or(|test| test.status == TokenTestStatus::Success)
        }
        Err(e) => {
            display_failure(&format!("Failed to run diagnostics: {e:#}"));
            false
        }
    };

    println!();
    if healthy {
        println!("{} Check complete", "✓".bright_green());
    } else {
        display_warning("Check complete with problems");
    }
    healthy
}

/// Sends `message` through the proxy and prints the reply with any page
/// actions it implies.
///
/// Returns `true` when the agent answered.
///
/// # Errors
///
/// Returns an error if the proxy is unreachable or answers with something
/// other than JSON.
pub async fn chat(client: &ProxyClient, message: &str, endpoint: Option<String>) -> Result<bool> {
    let payload = ChatPayload::from_messages(&[ChatMessage::user(message)], endpoint);

    match client.chat(&payload).await? {
        ChatOutcome::Reply(response) => {
            let parser = ActionParser::new().context("Failed to compile action patterns")?;
            let parsed = parser.parse(&response.text, message);
            display_reply(&response.text, parsed.as_ref());
            Ok(true)
        }
        ChatOutcome::Failed { status, body } => {
            display_proxy_error(status, &body);
            Ok(false)
        }
    }
}
