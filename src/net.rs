//! Network collaborators
//!
//! The core never talks to a radio or a socket. It asks a [`Network`] to
//! associate, to set the wall clock and to disconnect, and hands finished
//! request bodies to an [`Uploader`]. Every call is bounded by the timeout the
//! implementation enforces; a timeout is reported, never waited out.

use core::time::Duration;

use thiserror_no_std::Error;

use crate::http::Endpoint;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    #[error("no WiFi credentials provisioned")]
    NotProvisioned,
    #[error("network operation timed out")]
    Timeout,
    #[error("host name lookup failed")]
    Dns,
    #[error("could not connect")]
    Connect,
    #[error("network I/O error")]
    Io,
}

pub trait Network {
    /// Associate with the configured access point and obtain an address.
    fn connect(&mut self, timeout: Duration) -> impl Future<Output = Result<(), NetError>>;

    /// One time-acquisition handshake; on success the wall clock reads an
    /// absolute time.
    fn acquire_absolute_time(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), NetError>>;

    fn disconnect(&mut self) -> impl Future<Output = ()>;

    /// Receive fresh credentials from the user and store them.
    fn provision(&mut self, timeout: Duration) -> impl Future<Output = Result<(), NetError>>;
}

pub trait Uploader {
    /// POST `body` as JSON and return the collector's HTTP status code.
    ///
    /// Only transport problems are errors; any status the collector answers
    /// with is `Ok`.
    fn post(
        &mut self,
        endpoint: &Endpoint,
        body: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<u16, NetError>>;
}
