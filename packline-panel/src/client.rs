//! Summary service client with subnet discovery
//!
//! The panel is usually deployed without knowing which host runs the
//! summary service, so when no explicit URL is configured it sweeps the
//! line subnet probing `/health` until one host answers. A transport
//! error mid-operation drops and rebuilds the HTTP client; after enough
//! consecutive failures the host is rediscovered from scratch.

use packline_common::config::PanelConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::render::Summary;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of one summary fetch
#[derive(Debug)]
pub enum Fetch {
    Summary(Summary),
    /// 404: no work-in-progress batch on the line
    NoWip,
    /// Service answered with an unexpected status
    ApiError(u16),
    /// Connection-level failure
    Unreachable,
}

pub struct PanelClient {
    cfg: PanelConfig,
    http: reqwest::Client,
    base_url: Option<String>,
    consecutive_failures: u32,
}

impl PanelClient {
    pub fn new(cfg: PanelConfig) -> PanelClient {
        PanelClient {
            http: build_http(),
            base_url: cfg.api_url.clone(),
            consecutive_failures: 0,
            cfg,
        }
    }

    /// Fetch the line summary, discovering the host first if needed.
    pub async fn fetch(&mut self) -> Fetch {
        let Some(base) = self.resolve_host().await else {
            return Fetch::Unreachable;
        };

        let url = format!("{}/summary/{}", base, self.cfg.line);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<Summary>().await {
                Ok(summary) => {
                    self.consecutive_failures = 0;
                    Fetch::Summary(summary)
                }
                Err(e) => {
                    warn!("summary payload unreadable: {}", e);
                    self.note_failure();
                    Fetch::ApiError(0)
                }
            },
            Ok(resp) if resp.status().as_u16() == 404 => {
                self.consecutive_failures = 0;
                Fetch::NoWip
            }
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), "summary fetch rejected");
                self.note_failure();
                Fetch::ApiError(resp.status().as_u16())
            }
            Err(e) => {
                debug!("summary fetch failed: {}", e);
                // a wedged connection pool survives inside the client;
                // start over with a fresh one
                self.http = build_http();
                self.note_failure();
                Fetch::Unreachable
            }
        }
    }

    async fn resolve_host(&mut self) -> Option<String> {
        if self.base_url.is_none() {
            self.base_url = self.discover().await;
        }
        self.base_url.clone()
    }

    fn note_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.cfg.max_failures && self.cfg.api_url.is_none() {
            warn!(
                failures = self.consecutive_failures,
                "summary host lost, rediscovering"
            );
            self.base_url = None;
            self.consecutive_failures = 0;
        }
    }

    /// Sweep the configured subnet probing /health.
    async fn discover(&self) -> Option<String> {
        info!(prefix = %self.cfg.subnet_prefix, "discovering summary host");
        for octet in 1..=254u16 {
            let base = format!(
                "http://{}{}:{}",
                self.cfg.subnet_prefix, octet, self.cfg.api_port
            );
            let url = format!("{}/health", base);
            let probe = self.http.get(&url).timeout(PROBE_TIMEOUT).send().await;
            if let Ok(resp) = probe {
                if resp.status().is_success() {
                    info!(host = %base, "summary host found");
                    return Some(base);
                }
            }
        }
        warn!("no summary host answered on the subnet");
        None
    }
}

fn build_http() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_default()
}
