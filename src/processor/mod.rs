//! External payment processor integration
//!
//! The [`ProcessorGateway`] trait abstracts over concrete processor APIs;
//! [`StripeGateway`] is the production implementation. [`ProcessorClient`]
//! wraps a gateway behind a circuit breaker and is the only surface the
//! rest of the application calls.

pub mod client;
pub mod stripe;
pub mod traits;
pub mod types;

pub use client::ProcessorClient;
pub use stripe::{StripeConfig, StripeGateway};
pub use traits::ProcessorGateway;
pub use types::{to_minor_units, ChargeRequest, ChargeResult, RefundResult, RetrievedCharge};
