pub mod agent;
pub mod certificate;
pub mod config;
pub mod error;
pub mod installer;
pub mod keys;
pub mod persist;
pub mod request;
pub mod types;

#[cfg(feature = "fetch")]
pub mod client;
#[cfg(feature = "fetch")]
pub mod transport;

#[cfg(test)]
mod testutil;
