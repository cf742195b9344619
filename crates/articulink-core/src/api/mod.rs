//! REST API transport for the ArticuLink backend.
//!
//! This module provides the `HttpTransport` seam and its reqwest-backed
//! implementation. Requests are plain data (`ApiRequest`); responses carry
//! the status and decoded JSON body so the session layer can decide how to
//! react to failures.

pub mod client;
pub mod error;

pub use client::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
pub use error::ApiError;
pub use reqwest::{Method, StatusCode};
