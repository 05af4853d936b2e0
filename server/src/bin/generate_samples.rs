use speech_server::{config::SamplesConfig, engine::load_pipeline, samples};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    let config = SamplesConfig::from_env()?;

    if let Err(e) = generate(&config) {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}

fn generate(config: &SamplesConfig) -> anyhow::Result<()> {
    info!("[1/4] Initializing Kokoro...");
    let pipeline = load_pipeline(&config.pipeline)?;
    info!("[1/4] Pipeline ready");
    samples::run(pipeline.as_ref(), config)?;
    Ok(())
}
