//! Domain layer - Pure business abstractions
//!
//! Error types, the achievement catalog and snapshot types, and the traits the
//! services depend on. Implementations live in infrastructure and services.

pub mod achievements;
pub mod clock;
pub mod errors;
pub mod repositories;

pub use achievements::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{ErrorKind, LedgerError};
pub use repositories::*;
