use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::app_error::AppError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl StockRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockRequestStatus::Pending => "PENDING",
            StockRequestStatus::Approved => "APPROVED",
            StockRequestStatus::Rejected => "REJECTED",
        }
    }

    /// Only pending requests can be decided; decisions are final.
    pub fn transition(self, next: StockRequestStatus) -> Result<StockRequestStatus, AppError> {
        match (self, next) {
            (StockRequestStatus::Pending, StockRequestStatus::Approved)
            | (StockRequestStatus::Pending, StockRequestStatus::Rejected) => Ok(next),
            (from, to) => Err(AppError::Conflict(format!(
                "Stock request cannot move from {from} to {to}"
            ))),
        }
    }
}

impl fmt::Display for StockRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockRequestStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(StockRequestStatus::Pending),
            "APPROVED" => Ok(StockRequestStatus::Approved),
            "REJECTED" => Ok(StockRequestStatus::Rejected),
            other => Err(AppError::Other(anyhow::anyhow!(
                "Unknown stock request status {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StockRequestStatus::*;
    use super::*;

    #[test]
    fn pending_requests_can_be_decided() {
        assert_eq!(Pending.transition(Approved).unwrap(), Approved);
        assert_eq!(Pending.transition(Rejected).unwrap(), Rejected);
    }

    #[test]
    fn decisions_are_final() {
        for from in [Approved, Rejected] {
            for to in [Pending, Approved, Rejected] {
                assert!(matches!(from.transition(to), Err(AppError::Conflict(_))));
            }
        }
        assert!(Pending.transition(Pending).is_err());
    }

    #[test]
    fn parses_stored_status() {
        assert_eq!("APPROVED".parse::<StockRequestStatus>().unwrap(), Approved);
        assert!("approved".parse::<StockRequestStatus>().is_err());
    }
}
