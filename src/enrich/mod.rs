//! Enrichment: descriptive text from an external generation service.
//!
//! - **Transport**: wire types and the HTTP channel
//! - **Retry**: backoff policy and the retry state machine
//! - **Extract**: permissive `{...}` extraction from free text
//! - **Client**: the three call contracts built on top

pub mod client;
pub mod extract;
pub mod retry;
pub mod transport;

pub use client::{EnrichError, EnrichmentClient, TitledDescription};
pub use extract::extract_structured_block;
pub use retry::{RetryPolicy, RetryState, Sleeper, ThreadSleeper};
pub use transport::{GenerateRequest, GenerateResponse, HttpTransport, Transport, TransportError};
