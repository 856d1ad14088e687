use anyhow::Result;
use dog_media_axum::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    let app = dog_media_axum::build(&config).await?;

    let addr = config.addr();
    tracing::info!(
        staging = %config.media.staging_dir.display(),
        objects = %config.media.objects_dir.display(),
        "dog-media listening on http://{addr}"
    );

    app.listen(addr).await?;

    Ok(())
}
