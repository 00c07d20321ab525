//! Swap desk
//!
//! Negotiates a cross-chain swap route with a time-bounded price guarantee and
//! drives the resulting k-of-n Safe transaction from draft to on-chain
//! execution.
//!
//! The [`Orchestrator`] is the entry point. It fetches a quote through a
//! [`RouteProvider`], keeps it alive for the validity window, gates creation on
//! known balances and turns the quote into a [`CustodyTransactionLifecycle`].

pub mod chain;
pub mod config;
pub mod custody;
pub mod error;
pub mod events;
pub mod gate;
pub mod lifecycle;
pub mod metrics;
pub mod orchestrator;
pub mod quote;
pub mod route;
pub mod telemetry;
pub mod tx;

pub use config::Settings;
pub use custody::{CustodyService, HashSigner};
pub use error::{DeskError, DeskResult, LifecycleError, QuoteError};
pub use events::{DeskEvent, EventSink};
pub use gate::{BalanceError, BalanceVerdict};
pub use lifecycle::{CustodyTransactionLifecycle, TransactionState};
pub use orchestrator::{Orchestrator, SwapSummary};
pub use route::{Quote, RouteProvider, SwapRequest};
