use anyhow::Context;
use clap::{value_parser, Arg, Command};
use parlor_node::{engine, Config};
use prometheus_client::{encoding::text::encode, registry::Registry};
use tracing::info;

fn main() -> anyhow::Result<()> {
    // Parse arguments
    let matches = Command::new("parlor")
        .about("Runs parlor tables against a simulated chat load.")
        .arg(Arg::new("config").long("config").required(true))
        .arg(
            Arg::new("seed")
                .long("seed")
                .required(false)
                .value_parser(value_parser!(u64)),
        )
        .get_matches();

    // Load config
    let config_file = matches
        .get_one::<String>("config")
        .context("missing --config")?;
    let contents = std::fs::read_to_string(config_file)
        .with_context(|| format!("could not read config file {config_file}"))?;
    let mut config: Config =
        serde_yaml::from_str(&contents).context("could not parse config file")?;
    if let Some(seed) = matches.get_one::<u64>("seed") {
        config.seed = Some(*seed);
    }
    let config = config.validate().context("invalid config")?;

    // Configure telemetry
    let subscriber = tracing_subscriber::fmt().with_max_level(config.log_level);
    if config.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    // Initialize runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .context("could not start runtime")?;

    runtime.block_on(async move {
        let mut registry = Registry::with_prefix("parlor");
        let ledger = engine::seed_ledger(&config.simulation);
        let opening = ledger.total();
        let engine =
            engine::Engine::new(engine::Config::from(&config), ledger.clone(), &mut registry);

        let summary = engine.run().await;
        info!(
            ?summary,
            opening,
            closing = ledger.total(),
            "ledger totals"
        );

        // Export metrics
        let mut exported = String::new();
        encode(&mut exported, &registry).context("could not encode metrics")?;
        match &config.metrics_path {
            Some(path) => std::fs::write(path, &exported)
                .with_context(|| format!("could not write metrics to {}", path.display()))?,
            None => info!(metrics = %exported, "final metrics"),
        }
        Ok::<_, anyhow::Error>(())
    })
}
