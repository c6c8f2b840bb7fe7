//! Request/response model and the network capability.

pub mod client;
pub mod headers;
pub mod types;

pub use client::{Fetcher, NetworkClient};
pub use types::{Request, Response, ResponseType};
