use anyhow::{anyhow, Context};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use common::{DaemonStatus, Request, Response, ThemeMode};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Daemon control address
    #[arg(long, default_value = common::DEFAULT_CONTROL_ADDR)]
    addr: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Switch to light mode now and keep it until `auto`
    Light,
    /// Switch to dark mode now and keep it until `auto`
    Dark,
    /// Clear the manual choice and follow sunrise/sunset again
    Auto,
    /// Show what the daemon is doing
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let req = match cli.command {
        Commands::Light => Request::SetOverride(ThemeMode::Light),
        Commands::Dark => Request::SetOverride(ThemeMode::Dark),
        Commands::Auto => Request::ClearOverride,
        Commands::Status => Request::Status,
    };

    let resp = send(&cli.addr, &req).await?;

    match resp {
        Response::Ok => println!("Success"),
        Response::Error(e) => return Err(anyhow!("Daemon reported an error: {}", e)),
        Response::Status(status) => print_status(&status),
    }

    Ok(())
}

async fn send(addr: &str, req: &Request) -> anyhow::Result<Response> {
    let stream = TcpStream::connect(addr).await
        .with_context(|| format!("Could not reach the daemon at {}; is it running?", addr))?;
    let (reader, mut writer) = stream.into_split();

    let mut req_bytes = serde_json::to_vec(req)?;
    req_bytes.push(b'\n');
    log::debug!("Sending {:?} to {}", req, addr);
    writer.write_all(&req_bytes).await?;

    let line = BufReader::new(reader).lines().next_line().await?
        .ok_or_else(|| anyhow!("Daemon closed the connection without answering"))?;
    Ok(serde_json::from_str(&line)?)
}

fn fmt_time(t: Option<DateTime<Local>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_status(status: &DaemonStatus) {
    println!("Daemon Status:");
    match status.location {
        Some(loc) => println!("  Location:     {}", loc),
        None => println!("  Location:     unknown"),
    }
    match status.override_mode {
        Some(mode) => println!("  Mode:         {} (manual)", mode),
        None => println!("  Mode:         automatic"),
    }
    println!("  Last applied: {}", status.last_applied.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string()));
    println!("  Sunrise:      {}", fmt_time(status.solar_window.map(|w| w.sunrise)));
    println!("  Sunset:       {}", fmt_time(status.solar_window.map(|w| w.sunset)));
    println!("  Next change:  {}", fmt_time(status.next_change));
    println!(
        "  Ticks: {}  Switches: {}  Postponed: {}  Failures: {}",
        status.ticks, status.switches, status.postponements, status.failures
    );
}
