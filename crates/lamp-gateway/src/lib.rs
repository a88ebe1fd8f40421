//! HTTP front door for the question-answering service: `POST /query`, health
//! probes, bearer auth, and per-client rate limiting.

mod error;
mod handlers;
mod router;
mod server;

pub use error::GatewayError;
pub use handlers::{ErrorResponse, QueryRequest};
pub use server::GatewayServer;
