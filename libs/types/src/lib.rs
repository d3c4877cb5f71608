//! Types library for the market-data metrics services
//!
//! Shared vocabulary for everything that sits between the exchange
//! ingesters and the metrics engine: who sent a message, which instrument
//! it concerns, how option instrument names decompose, and how wire prices
//! become exact decimal book keys.
//!
//! # Modules
//! - `ids`: Identifiers (ExchangeId, InstrumentId)
//! - `numeric`: Decimal price conversion helpers
//! - `side`: Trade aggressor side
//! - `option`: Option instrument identity, permissive name parsing, expiry dates
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod side;
pub mod option;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::side::*;
    pub use crate::option::*;
    pub use crate::errors::*;
}
