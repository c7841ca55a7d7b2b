//! HTTP transport layer
//!
//! This module provides the single-exchange [`Transport`] contract, its
//! reqwest implementation, per-profile client construction and the retry
//! policy used by the request executor.
//!
//! The module is organized into specialized components:
//! - `transport`: the transport trait and wire request/response types
//! - `config`: shared client settings and per-request client profiles
//! - `http`: the reqwest transport
//! - `factory`: transport factories and the client registry
//! - `retry`: retry decisions and back-off
//! - `mock`: a scripted transport for tests

pub mod config;
pub mod factory;
pub mod http;
pub mod mock;
pub mod retry;
pub mod transport;

pub use config::{ClientConfig, ClientProfile};
pub use factory::{ClientRegistry, HttpClient, ReqwestTransportFactory, TransportFactory};
pub use http::ReqwestTransport;
pub use mock::{MockReply, MockTransport, MockTransportFactory};
pub use retry::RetryHandler;
pub use transport::{validate_url, Transport, TransportRequest, TransportResponse};
