//! The availability oracle: pure predicates over the reservation ledger.
//!
//! A vehicle has no booked flag. Whether it is free for a window is derived
//! from its reservations every time the question is asked. The Postgres
//! repository encodes the same predicate in SQL so it can run inside an open
//! transaction's read view; the tests here pin the canonical behavior.

use crate::reservation::{Reservation, ReservationStatus};
use chrono::{DateTime, Duration, Utc};

/// True iff the reservation counts against availability for `[start, end)`.
///
/// Confirmed reservations always block. Pending reservations block only
/// while still inside the grace window measured from their creation: the
/// tentative holder may still pay, so everyone else is kept out. Pendings
/// older than the grace window are dead weight awaiting the reaper and do
/// not block.
pub fn blocks(
    r: &Reservation,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
) -> bool {
    let status_blocks = match r.status {
        ReservationStatus::Confirmed => true,
        ReservationStatus::Pending => r.created_at >= now - grace,
        _ => false,
    };
    // Half-open interval overlap: [a, b) and [c, d) intersect iff a < d && b > c.
    status_blocks && r.start_at < end && r.end_at > start
}

/// True iff none of `candidates` blocks the window.
pub fn is_available<'a, I>(
    candidates: I,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
) -> bool
where
    I: IntoIterator<Item = &'a Reservation>,
{
    candidates
        .into_iter()
        .all(|r| !blocks(r, start, end, now, grace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::{PaymentMethod, PaymentState};
    use uuid::Uuid;

    fn day(n: i64) -> DateTime<Utc> {
        // Pin the base time so repeated calls with the same `n` are equal,
        // keeping exact-boundary comparisons deterministic.
        static BASE: std::sync::OnceLock<DateTime<Utc>> = std::sync::OnceLock::new();
        *BASE.get_or_init(Utc::now) + Duration::days(n)
    }

    fn reservation(
        status: ReservationStatus,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            customer_id: "cust-1".into(),
            vehicle_id: Uuid::new_v4(),
            vehicle_registration: "KA-01-1234".into(),
            start_at: start,
            end_at: end,
            total_price: 1000,
            daily_rate_snapshot: 1000,
            status,
            payment_status: PaymentState::Pending,
            payment_method: PaymentMethod::CreditCard,
            external_session_id: None,
            external_transaction_id: None,
            pickup_location: "Depot".into(),
            dropoff_location: "Depot".into(),
            created_at,
            updated_at: created_at,
        }
    }

    fn grace() -> Duration {
        Duration::minutes(10)
    }

    #[test]
    fn confirmed_overlap_blocks() {
        let now = Utc::now();
        let r = reservation(ReservationStatus::Confirmed, day(1), day(3), now - Duration::days(1));
        assert!(blocks(&r, day(2), day(4), now, grace()));
        assert!(!is_available(std::iter::once(&r), day(2), day(4), now, grace()));
    }

    #[test]
    fn disjoint_windows_do_not_block() {
        let now = Utc::now();
        let r = reservation(ReservationStatus::Confirmed, day(1), day(3), now);
        assert!(!blocks(&r, day(5), day(6), now, grace()));
    }

    #[test]
    fn half_open_boundary_is_not_an_overlap() {
        let now = Utc::now();
        let r = reservation(ReservationStatus::Confirmed, day(1), day(3), now);
        // A new rental starting exactly at the previous end is fine.
        assert!(!blocks(&r, day(3), day(5), now, grace()));
        assert!(!blocks(&r, day(0), day(1), now, grace()));
    }

    #[test]
    fn fresh_pending_blocks_everyone() {
        let now = Utc::now();
        let r = reservation(ReservationStatus::Pending, day(1), day(3), now - Duration::minutes(2));
        assert!(blocks(&r, day(1), day(3), now, grace()));
    }

    #[test]
    fn stale_pending_does_not_block() {
        let now = Utc::now();
        let r = reservation(ReservationStatus::Pending, day(1), day(3), now - Duration::minutes(11));
        assert!(!blocks(&r, day(1), day(3), now, grace()));
    }

    #[test]
    fn terminal_states_never_block() {
        let now = Utc::now();
        for status in [
            ReservationStatus::Cancelled,
            ReservationStatus::Expired,
            ReservationStatus::Completed,
        ] {
            let r = reservation(status, day(1), day(3), now);
            assert!(!blocks(&r, day(1), day(3), now, grace()), "{status:?} must not block");
        }
    }

    #[test]
    fn availability_over_a_ledger() {
        let now = Utc::now();
        let ledger = vec![
            reservation(ReservationStatus::Confirmed, day(1), day(3), now - Duration::days(2)),
            reservation(ReservationStatus::Expired, day(4), day(6), now - Duration::days(1)),
        ];
        assert!(!is_available(ledger.iter(), day(2), day(4), now, grace()));
        assert!(is_available(ledger.iter(), day(3), day(5), now, grace()));
    }
}
