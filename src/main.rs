use anyhow::Context;
use contract_verifier::{
    chains::{self, load_chains},
    compiler::SolcCompiler,
    creation_data::CreationDataResolver,
    repository::FileSystemRepository,
    run_http_server,
    settings::{Settings, TracingFormat},
    sources::GatewaySourceFetcher,
    Verifier,
};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logs(format: TracingFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        TracingFormat::Default => registry.with(fmt::layer()).init(),
        TracingFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::new().context("failed to read config")?;
    init_logs(settings.tracing.format);

    let chains = load_chains(&settings.chains, settings.chains_mode, settings.rpc.timeout)?;
    tracing::info!(
        chains = chains.len(),
        mode = ?settings.chains_mode,
        "chains loaded"
    );
    chains::health_check(&chains).await;

    let resolver = CreationDataResolver::new(settings.creation_data.request_timeout)
        .context("failed to build creation data resolver")?;
    let source_fetcher = GatewaySourceFetcher::new(
        settings.source_fetcher.ipfs_gateway.clone(),
        settings.source_fetcher.swarm_gateway.clone(),
        settings.source_fetcher.request_timeout,
    )
    .context("failed to build source fetcher")?;
    let repository = FileSystemRepository::new(settings.repository.root.clone());

    let verifier = Verifier::new(
        chains,
        resolver,
        Arc::new(source_fetcher),
        Arc::new(SolcCompiler::default()),
        Arc::new(repository),
    );

    run_http_server(settings.server, Arc::new(verifier)).await?;
    Ok(())
}
