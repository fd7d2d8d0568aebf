use serde::{Deserialize, Serialize};

/// A physical rental location, identified by a unique city name.
///
/// Branches are created out-of-band; the core never mutates one once it
/// exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub city: String,
}
