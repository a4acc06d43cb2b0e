use std::fmt;

/// Error taxonomy for the proxy pool.
///
/// Per-attempt failures are absorbed by the Dispatcher and never surface to
/// the client directly; only `PoolEmpty` and `PoolExhausted` become HTTP
/// responses. `ClientProtocolError` is the one variant that short-circuits
/// before any upstream attempt is made.
#[derive(Debug)]
pub enum ProxyError {
    /// Malformed HTTP from the local client.
    ClientProtocolError(String),
    /// Request headers exceeded the 1 MiB bound without completing (§4.2).
    /// The only Request Reader failure that gets a response instead of a
    /// silent close.
    PayloadTooLarge(String),
    /// The pool snapshot yielded zero eligible upstreams.
    PoolEmpty,
    /// A single dispatch attempt failed in a way that triggers failover:
    /// transport error, timeout, or a soft-failure status code.
    UpstreamSoftError(String),
    /// Every candidate in the snapshot produced `UpstreamSoftError`.
    PoolExhausted,
    /// An invariant was violated (e.g. an invalid upstream slipped past the
    /// registry filter). Logged and treated as `UpstreamSoftError`.
    Internal(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::ClientProtocolError(msg) => write!(f, "client protocol error: {msg}"),
            ProxyError::PayloadTooLarge(msg) => write!(f, "payload too large: {msg}"),
            ProxyError::PoolEmpty => write!(f, "no providers configured in proxy pool"),
            ProxyError::UpstreamSoftError(msg) => write!(f, "upstream soft error: {msg}"),
            ProxyError::PoolExhausted => write!(f, "all providers failed"),
            ProxyError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ProxyError {}
