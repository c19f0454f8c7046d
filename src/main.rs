use std::time::Duration;

use clap::Parser;
use hickory_proto::rr::RecordType;

use bifrost::config::ResolverConfig;
use bifrost::resolver::{FanoutResolver, Resolver};
use bifrost::{system, wire};

#[derive(Parser, Debug)]
#[command(
    name = "bifrost",
    about = "Fan-out DNS lookup against multiple upstream servers"
)]
struct Args {
    /// Domain name to resolve
    name: String,

    /// Record type to query
    #[arg(default_value = "A")]
    record_type: String,

    /// Upstream server, repeatable; system nameservers when omitted
    #[arg(short, long = "server")]
    servers: Vec<String>,

    /// Attempts per server
    #[arg(long)]
    retries: Option<usize>,

    /// Per-attempt timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Force TCP for all transactions
    #[arg(long)]
    tcp: bool,

    /// Rotate the first server tried across invocations of the resolver
    #[arg(long)]
    load_balance: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let mut config = ResolverConfig::from_env()?;
    if !args.servers.is_empty() {
        config.servers = args
            .servers
            .iter()
            .map(|server| system::parse_server(server))
            .collect::<bifrost::Result<Vec<_>>>()?;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(timeout) = args.timeout {
        config.timeout = Duration::from_secs(timeout);
    }
    config.load_balance = args.load_balance;

    let resolver = FanoutResolver::from_config(&config);
    if args.tcp {
        resolver.set_tcp(true);
    }

    let record_type: RecordType = args.record_type.to_uppercase().parse()?;
    let query = wire::build_query(&args.name, record_type)?;

    let response = resolver.send(&query).await?;
    println!("; rcode: {}", response.response_code());
    for record in response.answers() {
        println!("{}", record);
    }

    Ok(())
}
