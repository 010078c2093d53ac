// Colored terminal output for the end-of-run summary and cache stats.

use std::time::Duration;

use colored::Colorize;

use super::sink::UploadStats;
use crate::catalog::resolver::ResolutionStats;
use crate::pipeline::run::RunReport;

fn secs(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

fn heading(title: &str) {
    println!("\n{}", format!("=== {title} ===").bold());
}

fn resolution_line(label: &str, stats: &ResolutionStats) {
    let failed = if stats.failed.is_empty() {
        "0".green()
    } else {
        stats.failed.len().to_string().red().bold()
    };
    println!(
        "  {:<18} {} resolved ({} cached, {} fetched), {} failed, {} requests",
        label,
        stats.succeeded(),
        stats.cache_hits,
        stats.fetched,
        failed,
        stats.requests,
    );
}

/// Print what a finished run aggregated.
pub fn display_run_summary(report: &RunReport) {
    let ctx = &report.context;
    let fetch = &ctx.fetch;

    heading(&format!("Run Summary ({} customers)", report.customer_ids.len()));

    println!(
        "  {:<18} {} fetched, {} not found, {} malformed, {}",
        "Customers",
        fetch.succeeded.len().to_string().green(),
        fetch.not_found.len(),
        fetch.malformed.len(),
        if fetch.failed.is_empty() {
            "0 failed".normal()
        } else {
            format!("{} failed", fetch.failed.len()).red().bold()
        },
    );
    println!(
        "  {:<18} {} male, {} female",
        "Gender", ctx.gender.male, ctx.gender.female
    );
    println!(
        "  {:<18} {} loaded, {} unique, {} compacted",
        "Likes",
        fetch.likes_loaded,
        ctx.likes.len(),
        report.compact_likes().len(),
    );
    println!(
        "  {:<18} {} loaded, {} unique, {} malformed URLs",
        "Tracks",
        fetch.listens_loaded,
        ctx.tracks.len(),
        fetch.malformed_urls,
    );
    resolution_line("Track resolution", &report.track_resolution);
    println!(
        "  {:<18} {} unique, {} with fans, {} compacted",
        "Artists",
        ctx.artists.len(),
        report.fan_counts.len(),
        report.compact_fan_counts().len(),
    );
    resolution_line("Image resolution", &report.image_resolution);

    if !ctx.music_apps.is_empty() {
        println!("\n  {}", "Music applications".dimmed());
        for (app, count) in &ctx.music_apps {
            println!("    {:<24} {}", app, count);
        }
    }

    let t = &report.timings;
    println!("\n  {}", "Stage timings".dimmed());
    println!("    {:<24} {}", "fetch customers", secs(t.fetch_customers));
    println!("    {:<24} {}", "resolve tracks", secs(t.resolve_tracks));
    println!("    {:<24} {}", "fan counts", secs(t.fan_counts));
    println!("    {:<24} {}", "resolve images", secs(t.resolve_images));
    println!("    {:<24} {}", "close cache", secs(t.close_cache));

    if !fetch.failed.is_empty() {
        println!(
            "\n  {} {} customers could not be fetched; results are partial",
            "!".bright_red(),
            fetch.failed.len()
        );
    }
}

/// Print upload results, or the IDs that would have been written.
pub fn display_upload(stats: &UploadStats) {
    heading("Reports");
    for id in &stats.written {
        println!("  {} {}", "✓".green(), id);
    }
    for id in &stats.failed {
        println!("  {} {}", "✗".red().bold(), id);
    }
}

pub fn display_dry_run(ids: &[String]) {
    heading("Dry run: reports not uploaded");
    for id in ids {
        println!("  {} {}", "~".yellow(), id);
    }
}

/// Print entry counts for each cache namespace.
pub fn display_cache_stats(rows: &[(&str, u64)]) {
    heading("Resolution Cache");
    for (name, count) in rows {
        println!("  {:<10} {} entries", name, count);
    }
}
