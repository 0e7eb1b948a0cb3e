//! Workflows that span several repositories.
//!
//! # Services
//!
//! - `checkout` - Turn an active cart into an order with a price snapshot
//! - `ingest` - Apply newline-delimited entity events, dead-lettering failures

pub mod checkout;
pub mod ingest;

pub use checkout::{CheckoutError, CheckoutService, PlacedOrder};
pub use ingest::{EventEnvelope, EventIngestor, IngestError, IngestReport, RetryReport, Topic};
