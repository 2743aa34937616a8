//! Display utilities for CLI output formatting
//!
//! Provides formatted output for environment checks, proxy reports, agent
//! replies and proxy errors.

use colored::Colorize;
use serde_json::Value;

use foundry_client::diagnostics::{TokenTest, TokenTestStatus};
use foundry_client::{AuthDiagnostics, HealthReport};
use foundry_common::AgentReply;

/// Characters of an identifier shown before it is cut off.
const ID_PREFIX_CHARS: usize = 8;

/// How much of a set environment variable to reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reveal {
    /// Leading characters followed by `...`; for identifiers.
    Prefix,
    /// Only the length; for secrets.
    Length,
}

/// Describes an environment variable value without exposing secrets.
pub fn describe_env(value: Option<&str>, reveal: Reveal) -> String {
    match (value, reveal) {
        (None, _) => "NOT SET".to_string(),
        (Some(value), Reveal::Prefix) => {
            let head: String = value.chars().take(ID_PREFIX_CHARS).collect();
            format!("{head}...")
        }
        (Some(value), Reveal::Length) => format!("SET ({} chars)", value.chars().count()),
    }
}

/// Display a section heading
pub fn display_section(title: &str) {
    println!("\n{}", title.bright_cyan().bold());
}

/// Display one environment variable line
pub fn display_env_var(name: &str, value: Option<&str>, reveal: Reveal) {
    let described = describe_env(value, reveal);
    let described = if value.is_some() {
        described.bright_green()
    } else {
        described.bright_red()
    };
    println!("  {name}: {described}");
}

/// Display a positive result
pub fn display_ok(message: &str) {
    println!("  {} {message}", "✓".bright_green());
}

/// Display a warning
pub fn display_warning(message: &str) {
    println!("  {} {message}", "!".bright_yellow());
}

/// Display a failure
pub fn display_failure(message: &str) {
    println!("  {} {message}", "✗".bright_red());
}

/// Display a hint for the operator
pub fn display_hint(message: &str) {
    println!("  {} {message}", "→".bright_blue());
}

/// Display the proxy health report
pub fn display_health(health: &HealthReport) {
    display_ok("Proxy server is running");
    println!("  Authentication method: {}", health.auth.to_string().bright_yellow());
    println!("  Endpoint: {}", health.endpoint);
}

/// Display auth diagnostics
pub fn display_diagnostics(diagnostics: &AuthDiagnostics) {
    let config = &diagnostics.configuration;
    println!(
        "  API key: {}",
        presence(config.has_api_key, config.api_key_length)
    );
    println!(
        "  Tenant ID: {}",
        config.tenant_id.as_deref().unwrap_or("not set")
    );
    println!(
        "  Client ID: {}",
        config.client_id.as_deref().unwrap_or("not set")
    );
    println!(
        "  Client secret: {}",
        presence(config.has_client_secret, config.client_secret_length)
    );
    if config.has_cached_token {
        let validity = if config.token_valid { "valid" } else { "expired" };
        match config.token_expiry {
            Some(expiry) => println!("  Cached token: {validity} until {expiry}"),
            None => println!("  Cached token: {validity}"),
        }
    }

    if !diagnostics.issues.is_empty() {
        display_section("Issues Found:");
        for issue in &diagnostics.issues {
            display_warning(issue);
        }
    }

    if !diagnostics.recommendations.is_empty() {
        display_section("Recommendations:");
        for recommendation in &diagnostics.recommendations {
            display_hint(recommendation);
        }
    }

    if let Some(token_test) = &diagnostics.token_test {
        display_section("Token Test:");
        display_token_test(token_test);
    }
}

fn presence(set: bool, length: usize) -> String {
    if set {
        format!("set ({length} chars)")
    } else {
        "not set".to_string()
    }
}

fn display_token_test(token_test: &TokenTest) {
    let status = match token_test.status {
        TokenTestStatus::Success => "success".bright_green(),
        TokenTestStatus::Failed => "failed".bright_red(),
        TokenTestStatus::Error => "error".bright_red(),
    };
    println!("  Status: {status}");
    println!("  Message: {}", token_test.message);
    if let Some(preview) = &token_test.token_preview {
        println!("  Token: {preview}");
    }
    if let Some(error) = &token_test.error {
        println!("  Error: {}", error.bright_red());
    }
}

/// Display an agent reply and the page actions found in it
pub fn display_reply(text: &str, parsed: Option<&AgentReply>) {
    println!("{}", "Agent".bright_magenta().bold());
    match parsed {
        Some(reply) => {
            println!("{}", reply.message);
            if !reply.actions.is_empty() {
                display_section("Page actions:");
                for action in &reply.actions {
                    println!("  {} {action}", "●".bright_white());
                }
            }
        }
        None => println!("{text}"),
    }
}

/// Display an error body returned by the proxy
pub fn display_proxy_error(status: u16, body: &Value) {
    let error = body
        .get("error")
        .map_or_else(|| body.to_string(), text_of);
    eprintln!("{} HTTP {status}: {error}", "Error:".bright_red());

    if let Some(message) = body.get("message").filter(|m| m.is_string()) {
        eprintln!("  {}", text_of(message));
    }
    for key in ["details", "troubleshooting"] {
        match body.get(key) {
            Some(Value::Array(lines)) => {
                for line in lines {
                    eprintln!("  {}", text_of(line));
                }
            }
            Some(Value::String(line)) => eprintln!("  {line}"),
            Some(other) if !other.is_null() => eprintln!("  {other}"),
            _ => {}
        }
    }
    if let Some(help) = body.get("help") {
        eprintln!("  {} {}", "→".bright_blue(), text_of(help));
    }
}

fn text_of(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}
