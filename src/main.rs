use datasource_starter::Environment;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env = Environment::load();
    let loglevel = env
        .property("logging.level")
        .unwrap_or_else(|| "info".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let datasource = datasource_starter::init_data_source(&env).await?;
    info!(
        url = %datasource.url(),
        username = %datasource.username(),
        "datasource ready; press Ctrl-C to shut down"
    );

    tokio::signal::ctrl_c().await?;
    datasource.close().await;
    Ok(())
}
