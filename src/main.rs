use anyhow::Result;
use portfolio_api::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    portfolio_api::init_tracing(&config);
    portfolio_api::run(config).await
}
