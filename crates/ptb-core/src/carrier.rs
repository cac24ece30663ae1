//! Carrier port: where parcel statuses come from.

use std::time::Duration;

use async_trait::async_trait;

use crate::{domain::StatusSnapshot, Error, Result};

/// Source of current parcel statuses (Belpost in production).
///
/// Errors are opaque to the engine: any failure means "could not refresh this cycle".
#[async_trait]
pub trait CarrierClient: Send + Sync {
    async fn fetch_status(&self, number: &str) -> Result<StatusSnapshot>;
}

/// Fetch with a hard deadline so one unresponsive lookup cannot stall a scan.
pub async fn fetch_with_timeout(
    carrier: &dyn CarrierClient,
    number: &str,
    timeout: Duration,
) -> Result<StatusSnapshot> {
    match tokio::time::timeout(timeout, carrier.fetch_status(number)).await {
        Ok(res) => res,
        Err(_) => Err(Error::Carrier(format!(
            "lookup for {number} timed out after {}s",
            timeout.as_secs_f32()
        ))),
    }
}
