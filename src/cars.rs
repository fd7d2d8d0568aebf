use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use car_number_pattern::CAR_NUMBER_RE;

/// A car in the fleet.
///
/// A car does not store a "current branch" field — its location is always
/// derived from the movement log (see [`crate::movement_log`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: i64,
    pub car_number: String,
    pub make: String,
    pub model: String,
    pub provisioned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCar {
    pub car_number: String,
    pub make: String,
    pub model: String,
}

impl NewCar {
    /// Validates `car_number` against `^C[0-9]+$` before it ever reaches the
    /// database, mirroring the original `CarNumberField` regex validator.
    pub fn new(
        car_number: impl Into<String>,
        make: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, InvalidCarNumber> {
        let car_number = car_number.into();
        if !CAR_NUMBER_RE.is_match(&car_number) {
            return Err(InvalidCarNumber(car_number));
        }
        Ok(Self {
            car_number,
            make: make.into(),
            model: model.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCarNumber(pub String);

impl std::fmt::Display for InvalidCarNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "car_number '{}' must match ^C[0-9]+$",
            self.0
        )
    }
}

impl std::error::Error for InvalidCarNumber {}

mod car_number_pattern {
    use regex::Regex;
    use std::sync::LazyLock;

    pub static CAR_NUMBER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^C[0-9]+$").expect("valid regex"));
}
