use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config;
use crate::error::{AppError, Result};

const RATE_PATH: &str = "/rate/cryptoToXdr";
const API_KEY_HEADER: &str = "x-api-key";

/// ETH→SDR conversion source, injectable so the pipeline can be exercised
/// without the sidecar.
#[async_trait]
pub trait RateOracle: Send + Sync {
    async fn eth_to_sdr(&self) -> Result<f64>;
}

#[derive(Deserialize)]
struct RateItem {
    price: f64,
    crypto: RateCrypto,
}

#[derive(Deserialize)]
struct RateCrypto {
    symbol: String,
}

#[derive(Deserialize)]
struct RateResponse {
    data: Vec<RateItem>,
}

/// HTTP client for the SDR rate sidecar.
pub struct RateService {
    client: reqwest::Client,
    base_path: String,
    api_key: String,
}

impl RateService {
    pub fn new(cfg: &config::SdrBackend) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_path: cfg.base_path.clone(),
            api_key: cfg.api_key.clone(),
        }
    }
}

#[async_trait]
impl RateOracle for RateService {
    async fn eth_to_sdr(&self) -> Result<f64> {
        let url = format!("{}{}", self.base_path, RATE_PATH);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::RateOracle(format!("request to the SDR backend failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::RateOracle(format!(
                "SDR backend responded with status {}",
                response.status()
            )));
        }

        let rates: RateResponse = response
            .json()
            .await
            .map_err(|e| AppError::RateOracle(format!("failed to decode SDR response: {}", e)))?;

        rates
            .data
            .into_iter()
            .find(|item| item.crypto.symbol == "ETH")
            .map(|item| item.price)
            .ok_or_else(|| AppError::RateOracle("there is no ETH rate in the SDR response".into()))
    }
}
