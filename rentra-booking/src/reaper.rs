//! Recurring sweep demoting stale unpaid reservations back to "free".

use crate::engine::invalidate_for;
use chrono::{Duration, Utc};
use rentra_core::repository::{CacheInvalidator, ReservationStore, VehicleStore};
use rentra_core::BookingError;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct ExpiryReaper {
    reservations: Arc<dyn ReservationStore>,
    vehicles: Arc<dyn VehicleStore>,
    cache: Arc<dyn CacheInvalidator>,
    /// Same value the availability oracle uses; see `BookingRules`.
    grace_window: Duration,
    interval: std::time::Duration,
}

impl ExpiryReaper {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        vehicles: Arc<dyn VehicleStore>,
        cache: Arc<dyn CacheInvalidator>,
        grace_window: Duration,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            reservations,
            vehicles,
            cache,
            grace_window,
            interval,
        }
    }

    /// Long-lived worker loop. Individual sweep failures are logged and the
    /// next tick tries again; the reaper itself never dies.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(interval_secs = self.interval.as_secs(), "expiry reaper started");
        loop {
            ticker.tick().await;
            match self.sweep().await {
                Ok(0) => {}
                Ok(expired) => info!(expired, "expired stale pending reservations"),
                Err(e) => error!(error = %e, "expiry sweep failed"),
            }
        }
    }

    /// One sweep: everything pending and older than the grace window moves
    /// to expired/failed. Idempotent; already-expired rows are untouched.
    pub async fn sweep(&self) -> Result<usize, BookingError> {
        let cutoff = Utc::now() - self.grace_window;
        let expired = self.reservations.expire_stale(cutoff).await?;

        for reservation in &expired {
            let owner_id = match self
                .vehicles
                .find_by_registration(&reservation.vehicle_registration)
                .await
            {
                Ok(v) => v.map(|v| v.owner_id),
                Err(e) => {
                    warn!(reservation_id = %reservation.id, error = %e, "owner lookup failed during sweep");
                    None
                }
            };
            invalidate_for(self.cache.as_ref(), reservation, owner_id).await;
        }

        Ok(expired.len())
    }
}
