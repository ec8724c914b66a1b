pub mod client;

pub use client::{build_http_client, read_body, HttpFailure};
