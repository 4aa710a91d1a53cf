//! Connectivity probes
//!
//! An [`OnlineProbe`] answers "can we likely reach the network". Any error
//! while probing counts as offline.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait OnlineProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probe driven by a caller-controlled flag
///
/// Hosts that already receive connectivity notifications flip it directly.
#[derive(Debug)]
pub struct ManualProbe {
    online: AtomicBool,
}

impl ManualProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl OnlineProbe for ManualProbe {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Sends a HEAD request to a health endpoint
///
/// A forced value, when set, short-circuits the network check.
pub struct HttpProbe {
    client: Client,
    health_url: String,
    forced: Option<bool>,
}

impl HttpProbe {
    pub fn new(health_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            health_url: health_url.into(),
            forced: None,
        })
    }

    pub fn with_override(mut self, forced: Option<bool>) -> Self {
        self.forced = forced;
        self
    }
}

#[async_trait]
impl OnlineProbe for HttpProbe {
    async fn is_online(&self) -> bool {
        if let Some(forced) = self.forced {
            return forced;
        }

        match self.client.head(&self.health_url).send().await {
            // Any response proves reachability, even an error status
            Ok(response) => {
                debug!(url = %self.health_url, status = response.status().as_u16(), "Probe reached health endpoint");
                true
            }
            Err(e) => {
                debug!(url = %self.health_url, error = %e, "Probe failed, treating as offline");
                false
            }
        }
    }
}
