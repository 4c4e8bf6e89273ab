//! HTTP middleware stack for the site.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with status and latency)
//! 3. Request ID (record on span, Sentry scope and response)
//! 4. Rate limiting on `POST /contact` (governor)

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::contact_rate_limiter;
pub use request_id::request_id_middleware;
