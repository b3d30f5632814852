//! CLI for hoptrace.

mod runner;

use clap::Parser;
use hoptrace_core::TraceParams;
use runner::RunOptions;
use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// hoptrace - ICMP path discovery over a raw datalink channel.
#[derive(Parser, Debug)]
#[command(name = "hoptrace")]
#[command(version)]
#[command(about = "hoptrace - ICMP path discovery over a raw datalink channel")]
pub struct Args {
    /// Target hostname or IPv4 address.
    #[arg(required = true)]
    pub target: String,

    /// Network interface to probe from.
    #[arg(short, long)]
    pub interface: String,

    /// Gateway IPv4 address. Guessed from the local /24 when omitted.
    #[arg(short, long)]
    pub gateway: Option<Ipv4Addr>,

    /// Hop limit of the first probe.
    #[arg(long = "first-hop", default_value = "1")]
    pub first_hop: u8,

    /// Maximum hop limit.
    #[arg(short = 'm', long = "max-hops", default_value = "64")]
    pub max_hops: u8,

    /// Receive timeout per round in milliseconds.
    #[arg(long, default_value = "5000")]
    pub timeout: u64,

    /// Probes sent per burst.
    #[arg(short, long, default_value = "3")]
    pub batch: usize,

    /// Ceiling on receive rounds before aborting.
    #[arg(long = "max-iterations", default_value = "256")]
    pub max_iterations: usize,

    /// ARP resolution window in milliseconds.
    #[arg(long = "arp-window", default_value = "2000")]
    pub arp_window: u64,

    /// Geolocate the discovered route.
    #[arg(long)]
    pub geo: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Convert CLI args to RunOptions.
    fn to_options(&self) -> RunOptions {
        RunOptions {
            target: self.target.clone(),
            interface: self.interface.clone(),
            gateway: self.gateway,
            params: TraceParams {
                first_hop: self.first_hop,
                max_hops: self.max_hops,
                timeout: Duration::from_millis(self.timeout),
                batch_size: self.batch,
                max_iterations: self.max_iterations,
            },
            geolocate: self.geo,
            arp_window: Duration::from_millis(self.arp_window),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let opts = args.to_options();

    let cancel = CancellationToken::new();
    let ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping trace");
            ctrlc.cancel();
        }
    });

    match runner::run_trace(opts, cancel).await {
        Ok(report) => match report.to_json() {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("Trace failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
