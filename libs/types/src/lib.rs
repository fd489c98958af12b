//! Types library for the custodial ledger
//!
//! This library provides the identifier, fixed-point and time types shared by
//! every ledger component, keeping cross-precision arithmetic in one place.
//!
//! # Version
//! v1.0.0
//!
//! # Modules
//! - `ids`: Identifiers (UserId, AssetId, PriceSourceId, EventId)
//! - `numeric`: Fixed-point helpers and the canonical `UsdAmount`
//! - `time`: Clock abstraction (system and manual clocks)

// Public modules
pub mod ids;
pub mod numeric;
pub mod time;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::time::*;
}
