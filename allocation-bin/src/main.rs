use allocation_engine::calculate_allocation;
use color_eyre::eyre::{self, WrapErr};
use tracing::{info, warn};

mod loader;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let path = loader::request_path(std::env::args().nth(1))?;
    let request = loader::load_request(&path).await?;

    let result = calculate_allocation(&request).wrap_err("Allocation calculation failed")?;
    if result.is_over_allocation() {
        warn!(remaining = result.remaining, "Usage exceeds granted allocation");
    }
    info!(
        total_used = result.total_used,
        total_available = result.total_available,
        remaining = result.remaining,
        "Allocation report ready"
    );

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
