// Portal client - library root

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod redirect;

pub use client::PortalClient;
pub use error::{ClientError, RefreshError};
