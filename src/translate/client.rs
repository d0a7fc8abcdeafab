use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::error::{Result, SubflowError};

const DEFAULT_USER_AGENT: &str = concat!("subflow/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by every backend worker.
///
/// Proxy, credentials and user agent are fixed here; workers only clone the
/// handle.
pub fn build_http_client(network: &NetworkConfig, timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(network.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(url) = &network.https_proxy {
        debug!("Using HTTPS proxy {}", url);
        builder = builder.proxy(with_credentials(Proxy::https(url).map_err(invalid_proxy)?, network));
    }
    if let Some(url) = &network.http_proxy {
        debug!("Using HTTP proxy {}", url);
        builder = builder.proxy(with_credentials(Proxy::http(url).map_err(invalid_proxy)?, network));
    }

    builder
        .build()
        .map_err(|e| SubflowError::Config(format!("Failed to build HTTP client: {}", e)))
}

fn with_credentials(proxy: Proxy, network: &NetworkConfig) -> Proxy {
    match (&network.proxy_username, &network.proxy_password) {
        (Some(user), Some(password)) => proxy.basic_auth(user, password),
        (Some(user), None) => proxy.basic_auth(user, ""),
        _ => proxy,
    }
}

fn invalid_proxy(e: reqwest::Error) -> SubflowError {
    SubflowError::Config(format!("Invalid proxy URL: {}", e))
}

/// Check that an Ollama endpoint is reachable and has `model` pulled
pub async fn check_ollama_availability(client: &Client, endpoint: &str, model: &str) -> Result<()> {
    let url = format!("{}/api/show", endpoint.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "name": model }))
        .send()
        .await?;

    if response.status().is_success() {
        info!("Ollama model '{}' is available", model);
        Ok(())
    } else {
        Err(SubflowError::Config(format!(
            "Ollama model '{}' not found. Please pull the model first: ollama pull {}",
            model, model
        )))
    }
}
