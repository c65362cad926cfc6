pub mod availability;
pub mod error;
pub mod payment;
pub mod pricing;
pub mod repository;
pub mod reservation;
pub mod vehicle;

pub use error::BookingError;
pub use reservation::{PaymentMethod, PaymentState, Reservation, ReservationStatus};
pub use vehicle::{Vehicle, VehicleStatus};
