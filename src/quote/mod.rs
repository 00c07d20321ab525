//! Quote lifetime: the expiry timer and the task that drives it

pub mod countdown;
pub mod expiry;

pub use countdown::Countdown;
pub use expiry::{Expired, QuoteExpiryTimer, DEFAULT_VALIDITY_WINDOW};
