use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Active,
    Maintenance,
    Retired,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Active => "active",
            VehicleStatus::Maintenance => "maintenance",
            VehicleStatus::Retired => "retired",
        }
    }
}

impl FromStr for VehicleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(VehicleStatus::Active),
            "maintenance" => Ok(VehicleStatus::Maintenance),
            "retired" => Ok(VehicleStatus::Retired),
            other => Err(format!("unknown vehicle status: {other}")),
        }
    }
}

/// Catalog entry, read-only from this subsystem's point of view. There is no
/// "booked" flag here; availability is always derived from the reservation
/// ledger at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub registration: String,
    pub owner_id: Uuid,
    pub make: String,
    pub model: String,
    pub daily_rate: i64,
    pub status: VehicleStatus,
    pub created_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn is_rentable(&self) -> bool {
        self.status == VehicleStatus::Active
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.make, self.model)
    }
}
