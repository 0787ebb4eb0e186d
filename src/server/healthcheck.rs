//! Background healthcheck pinger
//!
//! When `healthcheck.url` is configured, a detached task issues a HEAD
//! request against it once per minute. Failures are logged and the
//! loop keeps going.

use std::time::Duration;
use tracing::{debug, warn};

use super::upstream::USER_AGENT;

const PING_INTERVAL: Duration = Duration::from_secs(60);

pub fn spawn(url: String) {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                warn!("Can't create healthcheck client: {err}");
                return;
            }
        };

        let mut interval = tokio::time::interval(PING_INTERVAL);

        loop {
            interval.tick().await;

            match client.head(&url).send().await {
                Ok(response) => debug!("Healthcheck ping {} -> {}", url, response.status()),
                Err(err) => warn!("Healthcheck ping {} failed: {}", url, err),
            }
        }
    });
}
