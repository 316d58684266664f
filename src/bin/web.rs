#![cfg(not(tarpaulin_include))]

use log::{info, warn};
use std::sync::Arc;
use synthai::app;
use synthai::config::AppConfig;
use synthai::llm::GeminiClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    if config.gemini.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set, summaries and answers will be unavailable");
    }

    match local_ip_address::local_ip() {
        Ok(ip) => info!("reachable on the local network at http://{}:{}", ip, config.port),
        Err(e) => warn!("could not determine local IP address: {}", e),
    }

    let llm = Arc::new(GeminiClient::new(config.gemini.clone()));
    app::run(config, llm).await
}
