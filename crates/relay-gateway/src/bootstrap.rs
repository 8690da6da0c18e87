//! C10 — process bootstrap: shared-store connect (fatal on failure),
//! auth-server health probing with bounded exponential backoff, and the
//! degraded-mode flag that every protected handler consults (spec.md
//! §4.10). Grounded in the teacher's connection-then-health-check startup
//! sequence in its server bootstrap, generalized from "this process's own
//! health" to "is the thing we delegate auth to reachable."

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use relay_auth::{AuthMode, RedisStore};

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Shared degraded-mode flag. `Relaxed` ordering is enough: every reader
/// only needs "probably up to date", not a synchronization point — a
/// stale read for one request just means one extra round trip to the
/// real introspection endpoint, which will itself fail fast.
#[derive(Clone)]
pub struct DegradedModeFlag(Arc<AtomicBool>);

impl DegradedModeFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_degraded(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, degraded: bool) {
        self.0.store(degraded, Ordering::Relaxed);
    }
}

impl Default for DegradedModeFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Connects to the shared store. Per spec.md §6/§7's exit-code contract,
/// a failure here is fatal — the caller (`main`) should exit 1, not retry.
pub async fn connect_store(config: &GatewayConfig) -> Result<RedisStore, GatewayError> {
    RedisStore::connect(&config.store_url)
        .await
        .map_err(|e| GatewayError::StoreUnavailable(e.to_string()))
}

const PROBE_MAX_ATTEMPTS: u32 = 5;
const PROBE_BASE_DELAY: Duration = Duration::from_millis(200);

/// Probes the introspection endpoint with exponential backoff, bounded at
/// `PROBE_MAX_ATTEMPTS`. Returns the resulting flag; never fails the
/// process — on persistent failure the flag starts (and stays) degraded
/// until a later background probe succeeds.
pub async fn probe_auth_server(config: &GatewayConfig) -> DegradedModeFlag {
    let flag = DegradedModeFlag::new();

    if !matches!(config.auth_mode, AuthMode::External) {
        return flag;
    }

    let Some(url) = config.external_introspection_url.clone() else {
        flag.set(true);
        return flag;
    };

    let client = reqwest::Client::new();
    let mut reachable = false;
    for attempt in 0..PROBE_MAX_ATTEMPTS {
        match client.head(&url).send().await {
            Ok(_) => {
                reachable = true;
                break;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "auth server probe failed");
                tokio::time::sleep(PROBE_BASE_DELAY * 2u32.pow(attempt)).await;
            }
        }
    }

    if !reachable {
        tracing::error!("auth server unreachable after {PROBE_MAX_ATTEMPTS} attempts; entering degraded mode");
        flag.set(true);
    }

    spawn_recovery_probe(client, url, flag.clone());
    flag
}

/// Keeps probing in the background after entering degraded mode so the
/// process recovers on its own once the endpoint comes back, without a
/// restart (spec.md §4.10: "until a later probe succeeds").
fn spawn_recovery_probe(client: reqwest::Client, url: String, flag: DegradedModeFlag) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            if !flag.is_degraded() {
                continue;
            }
            match client.head(&url).send().await {
                Ok(_) => {
                    tracing::info!("auth server reachable again; leaving degraded mode");
                    flag.set(false);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "auth server still unreachable");
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_defaults_to_not_degraded() {
        let flag = DegradedModeFlag::new();
        assert!(!flag.is_degraded());
    }
}
