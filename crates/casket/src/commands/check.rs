//! Check command - validates configuration and shows resolved store settings.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Also print the effective configuration as TOML
    #[arg(long)]
    pub show_toml: bool,
}

/// Check output for JSON mode.
#[derive(Debug, Serialize)]
struct CheckOutput {
    source: Option<String>,
    exclusive_access: bool,
    compression: String,
    header_prefix: String,
    data_prefix: String,
    max_attempts: u32,
    initial_backoff_ms: u128,
    max_backoff_ms: u128,
    log_file: Option<String>,
    client_keys: Vec<String>,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.config.config;
    let settings = config.provider_settings()?;

    let output = CheckOutput {
        source: ctx.config.source.as_ref().map(|p| p.display().to_string()),
        exclusive_access: settings.exclusive_access,
        compression: settings.effective_compression().to_string(),
        header_prefix: settings.keys.header_prefix().to_string(),
        data_prefix: settings.keys.data_prefix().to_string(),
        max_attempts: settings.retry.max_attempts,
        initial_backoff_ms: settings.retry.initial_backoff.as_millis(),
        max_backoff_ms: settings.retry.max_backoff.as_millis(),
        log_file: config
            .logging
            .wants_file_sink()
            .then(|| config.logging.filename.display().to_string()),
        client_keys: config.client.keys().cloned().collect(),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let green = Style::new().green();

    println!();
    println!("{}", style("Casket Configuration").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Status:"), green.apply_to("● valid"));
    println!(
        "  {} {}",
        dim.apply_to("Source:"),
        output.source.as_deref().unwrap_or("(defaults)")
    );
    println!(
        "  {} {}",
        dim.apply_to("Exclusive access:"),
        output.exclusive_access
    );
    println!("  {} {}", dim.apply_to("Compression:"), output.compression);
    println!(
        "  {} {} / {}",
        dim.apply_to("Key prefixes:"),
        output.header_prefix,
        output.data_prefix
    );
    println!(
        "  {} {} attempts, {}-{} ms backoff",
        dim.apply_to("Retry:"),
        output.max_attempts,
        output.initial_backoff_ms,
        output.max_backoff_ms
    );
    println!(
        "  {} {}",
        dim.apply_to("Log file:"),
        output.log_file.as_deref().unwrap_or("(console only)")
    );
    if ctx.verbose && !output.client_keys.is_empty() {
        println!(
            "  {} {}",
            dim.apply_to("Client keys:"),
            output.client_keys.join(", ")
        );
    }
    println!();

    if args.show_toml {
        println!("{}", config.to_toml()?);
    }

    Ok(())
}
