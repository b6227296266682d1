//! Root of the `successfuel-core` library.
//!
//! Connectivity-aware request coordination for the SuccessFuel API client.

// Library code reports through tracing; the binary owns stdout/stderr.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod api_client;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod health;
pub mod monitor;
pub mod retry;
pub mod status;

pub use api_client::ApiClient;
pub use api_client::ApiError;
pub use api_client::TokenProvider;
pub use coordinator::ExecuteError;
pub use coordinator::ExecuteOptions;
pub use coordinator::RequestCoordinator;
pub use health::HealthProbe;
pub use health::HttpHealthProbe;
pub use health::ProbeOutcome;
pub use monitor::ConnectivityMonitor;
pub use retry::BackoffPolicy;
pub use retry::ErrorClass;
pub use retry::RetryClassifiable;
pub use retry::RetryEngine;
pub use status::ConnectionRegister;
pub use status::ConnectionStatus;
pub use status::Stability;
pub use status::Subscription;
