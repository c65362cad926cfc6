pub mod engine;
pub mod reaper;
pub mod reconcile;
pub mod stripe;

pub use engine::{BookingEngine, BookingRules, CreatedReservation, ReservationRequest};
pub use reaper::ExpiryReaper;
pub use reconcile::{Reconciler, ReconcileRules, VerifyOutcome};
pub use stripe::StripeGateway;
