//! ocrgate Gateway HTTP API Server
//!
//! Routes:
//! - `GET /` and `GET /api/health`
//! - `POST /ocr`: image upload through the dispatch engine
//! - `POST /convert`: document upload through the remote conversion service

pub mod error;
pub mod handlers;
pub mod server;
pub mod upload;

pub use error::ApiError;
pub use server::{build_router, start_server, GatewayState};
