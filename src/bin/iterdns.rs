//! iterdns: resolve a host name by walking the DNS from the root servers

use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use iterdns::dns::context::{ResolverConfig, ResolverContext};
use iterdns::dns::resolve::IterativeResolver;

/// Iterative DNS resolver
#[derive(Parser)]
#[command(name = "iterdns")]
#[command(version)]
#[command(about = "Resolve a host name to IPv4 addresses, starting at the root servers", long_about = None)]
struct Cli {
    /// Host name to resolve
    domain: String,

    /// TOML file with resolver settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-query receive timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Maximum number of queries for the whole resolution
    #[arg(long)]
    max_hops: Option<usize>,

    /// Print every server asked to stderr
    #[arg(long)]
    trace: bool,

    /// More log output, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }

        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn resolver_config(&self) -> Result<ResolverConfig, Box<dyn std::error::Error>> {
        let mut config = match self.config {
            Some(ref path) => ResolverConfig::from_file(path)?,
            None => ResolverConfig::default(),
        };

        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(max_hops) = self.max_hops {
            config.max_hops = max_hops;
        }
        config.validate()?;

        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = SimpleLogger::new().with_level(cli.log_level()).init() {
        eprintln!("failed to initialize logger: {}", e);
    }

    let config = match cli.resolver_config() {
        Ok(x) => x,
        Err(e) => {
            eprintln!("iterdns: {}", e);
            process::exit(1);
        }
    };

    let context = ResolverContext::new(config);
    let resolver = IterativeResolver::new(context.clone());

    let mut trace = Vec::new();
    let result = resolver.resolve_with_trace(&cli.domain, &mut trace);

    if cli.trace {
        for (i, hop) in trace.iter().enumerate() {
            eprintln!("{:>3}  {}", i + 1, hop);
        }
    }

    log::info!(
        "sent {} queries, {} failed",
        context.client.get_sent_count(),
        context.client.get_failed_count()
    );

    match result {
        Ok(resolution) => {
            if resolution.canonical_name != resolution.name {
                log::info!("{} is an alias for {}", resolution.name, resolution.canonical_name);
            }
            for addr in &resolution.addresses {
                println!("{}", addr);
            }
        }
        Err(e) => {
            eprintln!("iterdns: {}", e);
            process::exit(1);
        }
    }
}
