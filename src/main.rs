//! clash-route - CLI Entry Point

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Context;
use clap::Parser;
use clash_route::common::Metadata;
use clash_route::{Config, Gateway, VERSION};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "clash-route")]
#[command(author = "Tsang")]
#[command(version = VERSION)]
#[command(about = "Rule routing core with GeoSite matching and proxy groups")]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', short_alias = 'f', long = "config", default_value = "config.yaml")]
    config: PathBuf,

    /// Configuration directory; relative paths resolve against it
    #[arg(short = 'd', long = "directory")]
    directory: Option<PathBuf>,

    /// External controller address (overrides config)
    #[arg(long = "ext-ctl")]
    external_controller: Option<String>,

    /// External controller secret (overrides config)
    #[arg(long = "secret")]
    secret: Option<String>,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Print the domains of a GeoSite list (CODE or CODE@attr) and exit
    #[arg(long = "lookup", value_name = "CODE")]
    lookup: Option<String>,

    /// Print the adapter chain chosen for a host and exit
    #[arg(long = "route", value_name = "HOST")]
    route: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().max(2))
        .enable_all()
        .thread_name("clash-route-worker")
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = match &args.directory {
        Some(dir) if args.config.is_relative() => dir.join(&args.config),
        _ => args.config.clone(),
    };
    let loaded = Config::load_async(&config_path).await;

    let level = loaded
        .as_ref()
        .ok()
        .and_then(|c| c.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("clash_route={}", level)))
        .context("invalid log-level")?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    info!("clash-route v{}", VERSION);
    info!("Loading configuration from: {}", config_path.display());

    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(ext_ctl) = args.external_controller {
        config.external_controller = Some(ext_ctl);
    }
    if let Some(secret) = args.secret {
        config.secret = Some(secret);
    }

    let gateway = match Gateway::with_home_dir(config, args.directory).await {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to initialize gateway: {}", e);
            std::process::exit(1);
        }
    };

    if args.test {
        info!("Configuration test passed");
        return Ok(());
    }

    if let Some(token) = args.lookup {
        let domains = gateway
            .lookup(&token)
            .with_context(|| format!("lookup {} in {}", token, gateway.geosite_database().display()))?;
        for domain in domains.iter() {
            match domain.kind() {
                Some(kind) => println!("{:?}:{}", kind, domain.value),
                None => println!("Unknown({}):{}", domain.domain_type, domain.value),
            }
        }
        return Ok(());
    }

    if let Some(host) = args.route {
        let metadata = Metadata::tcp().with_host(host).with_dst_port(443);
        let tunnel = gateway.tunnel();
        let route = tunnel.route(&metadata)?;
        let chain = tunnel.chain(&metadata)?;
        println!("{} {} => {}", route.rule, route.rule_payload, chain.join(" -> "));
        return Ok(());
    }

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
