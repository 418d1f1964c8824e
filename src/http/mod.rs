//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection
//!     → server.rs (hyper connection, request ID, tracing)
//!     → switchboard lookup by Host
//!     → forward.rs (rewrite target and headers, stream to backend and back)
//!
//! Plaintext connection
//!     → redirect.rs (ACME challenge or redirect to HTTPS)
//! ```

pub mod forward;
pub mod redirect;
pub mod server;

pub use forward::{ForwardError, Forwarder};
pub use redirect::plaintext_router;
pub use server::{proxy_router, AppState, ProxyServer};
