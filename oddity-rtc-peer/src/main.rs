use std::env::args;
use std::error::Error;
use std::path::Path;

use oddity_rtc_peer::app::config::AppConfig;
use oddity_rtc_peer::app::App;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("LOG"))
        .init();

    let config_file = args().nth(1).unwrap_or_else(|| "default.yaml".to_string());
    let config = AppConfig::from_file(Path::new(&config_file))?;
    tracing::debug!(?config, "read config file");

    let mut app = App::start(config).await?;
    let result = app.run().await;
    app.stop().await;

    result.map_err(Into::into)
}
