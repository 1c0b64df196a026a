//! `limits` command.

use console::style;

use scrapegate::config::ScopeLimitsConfig;
use scrapegate::{AdmissionConfig, RateLimitConfig};

/// Print the configured limits table.
pub fn cmd_limits(config: &AdmissionConfig, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    match &config.source_path {
        Some(path) => println!("{} {}", style("Config:").bold(), path.display()),
        None => println!("{} built-in defaults", style("Config:").bold()),
    }
    println!();
    println!(
        "{:<20} {:>8} {:>8} {:>8} {:>6} {:>9} {:>11}",
        "scope", "req/s", "req/min", "req/h", "burst", "cooldown", "concurrent"
    );
    println!("{}", "-".repeat(76));

    print_row("global", &config.global, None);
    for (name, scope) in &config.retailers {
        print_scope(name, scope);
    }
    for (name, scope) in &config.domains {
        print_scope(&format!("{} (domain)", name), scope);
    }

    println!();
    println!(
        "{} {} items per tier",
        style("Queue:").bold(),
        config.queue.max_size
    );
    Ok(())
}

fn print_scope(name: &str, scope: &ScopeLimitsConfig) {
    print_row(name, &scope.limits, scope.max_concurrent);
}

fn print_row(name: &str, limits: &RateLimitConfig, concurrent: Option<usize>) {
    let concurrent = concurrent
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<20} {:>8.2} {:>8} {:>8} {:>6} {:>8.2}s {:>11}",
        name,
        limits.requests_per_second,
        limits.requests_per_minute,
        limits.requests_per_hour,
        limits.burst_size,
        limits.cooldown_seconds,
        concurrent
    );
}
