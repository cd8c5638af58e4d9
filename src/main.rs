use clap::Parser;
use price_etl::config::LogFormat;
use price_etl::core::ConfigProvider;
use price_etl::utils::error::ErrorSeverity;
use price_etl::utils::{logger, validation::Validate};
use price_etl::{
    CliConfig, EtlEngine, EtlError, FileRepository, LocalStorage, Product, ProductPipeline,
    TomlConfig,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    match cli.log_format {
        LogFormat::Compact => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }

    tracing::info!("Starting price-etl");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Shutdown requested, cancelling pending delays");
            signal_token.cancel();
        }
    });

    let outcome = match cli.config.clone() {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            match TomlConfig::from_file(&path).await {
                Ok(config) => {
                    let monitor = cli.monitor || config.monitoring_enabled();
                    run(config, monitor, cli.fetch_only, shutdown).await
                }
                Err(e) => Err(e),
            }
        }
        None => {
            let monitor = cli.monitor;
            let fetch_only = cli.fetch_only;
            run(cli, monitor, fetch_only, shutdown).await
        }
    };

    match outcome {
        Ok(products) => {
            println!("{}", serde_json::to_string_pretty(&products)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                "❌ ETL process failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
            Ok(())
        }
    }
}

async fn run<C>(
    config: C,
    monitor: bool,
    fetch_only: bool,
    shutdown: CancellationToken,
) -> Result<Vec<Product>, EtlError>
where
    C: ConfigProvider + Validate + 'static,
{
    config.validate()?;
    tracing::info!(
        "✅ Configuration validated: {} workers, {:?} delay",
        config.parallelism(),
        config.delay_mode()
    );

    let storage = LocalStorage::new(config.output_path());
    let repository = FileRepository::new(storage, config.output_formats().to_vec());
    let pipeline = ProductPipeline::new(repository, config).with_shutdown(shutdown);

    if fetch_only {
        return pipeline.fetch_only().await;
    }

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor);
    engine.run().await
}
