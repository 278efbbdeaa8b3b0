//! Agri Payout - online-learning payout predictor service

use agri_payout::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // WARN unless RUST_LOG says otherwise; RUST_LOG=info shows lifecycle events
    let directives = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(agri_payout::log_filter(directives.as_deref()))
        .init();

    cli::run().await
}
