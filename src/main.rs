//! mptrace - NAT-aware multipath traceroute.
//!
//! This is the command-line interface for the mptrace library.

#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;
use mptrace::{Flow, TracerouteConfigBuilder, TracerouteError, TracerouteResults};
use std::time::Duration;

/// Get the version string for mptrace
fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Command-line arguments for the traceroute tool.
#[derive(Parser, Debug)]
#[clap(author, version, about = "NAT-aware multipath (ECMP) traceroute", long_about = None)]
struct Args {
    /// Target hostname or IP address
    host: String,

    /// Probe over IPv6 instead of IPv4
    #[clap(short = '6', long)]
    ipv6: bool,

    /// UDP source port
    #[clap(short = 's', long, default_value_t = 12345)]
    src_port: u16,

    /// Base UDP destination port (each path adds its index)
    #[clap(short = 'd', long, default_value_t = 33434)]
    dst_port: u16,

    /// Number of ECMP paths to enumerate
    #[clap(short = 'n', long, default_value_t = 20)]
    npaths: u8,

    /// Lowest TTL to probe
    #[clap(short = 't', long, default_value_t = 1)]
    min_ttl: u8,

    /// Highest TTL to probe
    #[clap(short = 'T', long, default_value_t = 30)]
    max_ttl: u8,

    /// Pause between consecutive probes in milliseconds
    #[clap(short = 'i', long, default_value_t = 10)]
    delay_ms: u64,

    /// How long to keep capturing after the last probe, in milliseconds
    #[clap(short = 'w', long, default_value_t = 1000)]
    drain_ms: u64,

    /// Vary the source port per path, for NATs that rewrite the
    /// destination port
    #[clap(short = 'b', long)]
    broken_nat: bool,

    /// Disable reverse DNS lookups
    #[clap(long)]
    no_rdns: bool,

    /// Output results in JSON format
    #[clap(long)]
    json: bool,

    /// Enable verbose output (repeat for more detail)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// JSON output structure for a single hop
#[derive(Debug, serde::Serialize)]
struct JsonHop {
    ttl: u8,
    address: Option<String>,
    hostname: Option<String>,
    rtt_ms: Option<f64>,
    nat_detected: bool,
}

/// JSON output structure for one probed flow
#[derive(Debug, serde::Serialize)]
struct JsonFlow {
    path_index: u8,
    flow_id: u16,
    hops: Vec<JsonHop>,
}

/// JSON output structure for the entire traceroute result
#[derive(Debug, serde::Serialize)]
struct JsonOutput {
    version: String,
    target: String,
    target_ip: String,
    destination_reached: bool,
    nat_detected: bool,
    total_duration_ms: u64,
    flows: Vec<JsonFlow>,
}

fn main() {
    // Single-threaded runtime is plenty for one probe loop
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    if let Err(e) = runtime.block_on(async_main()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    let config = TracerouteConfigBuilder::new()
        .target(&args.host)
        .ipv6(args.ipv6)
        .src_port(args.src_port)
        .dst_port(args.dst_port)
        .npaths(args.npaths)
        .min_ttl(args.min_ttl)
        .max_ttl(args.max_ttl)
        .delay(Duration::from_millis(args.delay_ms))
        .drain_timeout(Duration::from_millis(args.drain_ms))
        .broken_nat(args.broken_nat)
        .enable_rdns(!args.no_rdns)
        .verbose(args.verbose);

    let config = match config.build() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run 'mptrace --help' for usage information.");
            std::process::exit(1);
        }
    };

    if !args.json {
        println!(
            "mptrace to {} over {}, {} paths, ttl {}-{}",
            args.host,
            if args.ipv6 { "IPv6" } else { "IPv4" },
            args.npaths,
            args.min_ttl,
            args.max_ttl
        );
    }

    let results = match mptrace::trace_with_config(config).await {
        Ok(results) => results,
        Err(TracerouteError::InsufficientPermissions {
            required,
            suggestion,
        }) => {
            eprintln!("\nError: Insufficient permissions");
            eprintln!("Required: {}", required);
            eprintln!("Suggestion: {}", suggestion);
            eprintln!(
                "\nTo run with elevated privileges: sudo {}",
                std::env::args().collect::<Vec<_>>().join(" ")
            );
            std::process::exit(1);
        }
        Err(TracerouteError::ResolutionError(msg)) => {
            eprintln!("\nError: {}", msg);
            eprintln!("Please check the hostname and your network connection.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("\nError: {}", e);
            std::process::exit(1);
        }
    };

    if args.json {
        display_json_results(&results)?;
    } else {
        display_text_results(&results, args.no_rdns);
    }

    Ok(())
}

/// Display results in JSON format
fn display_json_results(results: &TracerouteResults) -> Result<()> {
    let output = JsonOutput {
        version: get_version().to_string(),
        target: results.target.clone(),
        target_ip: results.target_ip.to_string(),
        destination_reached: results.destination_reached,
        nat_detected: results.nat_detected(),
        total_duration_ms: results.total_duration.as_millis() as u64,
        flows: results
            .flows
            .values()
            .map(|flow| JsonFlow {
                path_index: flow.path_index,
                flow_id: flow.flow_id,
                hops: flow
                    .hops
                    .iter()
                    .map(|hop| JsonHop {
                        ttl: hop.ttl,
                        address: hop.addr.map(|a| a.to_string()),
                        hostname: hop.hostname.clone(),
                        rtt_ms: hop.rtt_ms(),
                        nat_detected: hop.nat_detected,
                    })
                    .collect(),
            })
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Display results in text format, one block per flow
fn display_text_results(results: &TracerouteResults, no_rdns: bool) {
    for flow in results.flows.values() {
        print_flow(results, flow, no_rdns);
    }

    if results.nat_detected() {
        println!("\nNAT detected on at least one path (identifiers used for matching)");
    }
    if results.destination_reached {
        println!("Destination reached");
    }
}

fn print_flow(results: &TracerouteResults, flow: &Flow, no_rdns: bool) {
    println!("\nFlow #{} (flow id {}):", flow.path_index, flow.flow_id);
    for hop in &flow.hops {
        let Some(addr) = hop.addr else {
            println!("{:3}  *", hop.ttl);
            continue;
        };

        let host_display = match (&hop.hostname, no_rdns) {
            (Some(hostname), false) => format!("{} ({})", hostname, addr),
            _ => addr.to_string(),
        };
        let rtt_str = hop
            .rtt_ms()
            .map_or("*".to_string(), |r| format!("{:.3} ms", r));
        let mut markers = String::new();
        if hop.nat_detected {
            markers.push_str(" [NAT]");
        }
        if hop.is_destination(results.target_ip) {
            markers.push_str(" [DEST]");
        }
        println!("{:3}  {} {}{}", hop.ttl, host_display, rtt_str, markers);
    }
}
