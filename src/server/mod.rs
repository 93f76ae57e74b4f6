//! Transport adapters.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   axum router (handlers, routes)     API-Gateway event (lambda) │
//! │                 │                                │              │
//! │                 └──────────▶ ImageHandler ◀──────┘              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both adapters only marshal requests and responses; they never look at the
//! image parameters.

pub mod handlers;
pub mod lambda;
pub mod routes;

pub use handlers::{health_handler, image_handler, referer_from, AppState, HealthResponse};
pub use lambda::LambdaAdapter;
pub use routes::{create_router, RouterConfig};
