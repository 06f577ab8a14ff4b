//! Resilient HTTP client core for Mercado.
//!
//! Every outbound API call in the process flows through this crate.
//! Consumers describe a request as data ([`ApiRequest`]) and get back a
//! parsed payload or one normalized error ([`ApiError`]) — they never
//! see transport-specific failure structures, and they never handle
//! token expiry themselves.
//!
//! The pipeline, in order:
//!
//! ```text
//! ApiRequest
//!   │ 1. shape        (multipart bodies lose any explicit content-type)
//!   │ 2. cache lookup (idempotent reads only; fresh hit short-circuits)
//!   │ 3. credentials  (protected → valid token; public → best effort)
//!   │ 4. dispatch
//!   ▼ 5. response     (cache fill · 401 refresh-and-replay · 5xx backoff
//!   │                  · 429 pass-through · network errors)
//!   ▼ 6. normalize    (validation bodies flattened to one message)
//! payload or ApiError
//! ```
//!
//! The 401 path is coordinated process-wide by the
//! [`RefreshCoordinator`]: while one request refreshes the credential,
//! every other request that hits a 401 queues and resumes with the same
//! outcome — one refresh round trip, no matter how many requests race.

mod client;
mod error;
mod refresh;
mod request;

pub use client::{ClientConfig, HttpClient, SignOutHook};
pub use error::ApiError;
pub use refresh::{RefreshCoordinator, RefreshOutcome, RefreshTicket};
pub use request::{ApiRequest, AuthRequirement, MultipartPart, RequestBody, TimeoutClass};
