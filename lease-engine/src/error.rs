use thiserror::Error;

/// Errors the state machine can produce. All data-plane variants are
/// recovered locally (drop the packet or NAK); only a handler/background
/// task treats its own setup failure as fatal.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("no free address in range")]
    NoFreeAddress,

    #[error("address already leased to another client")]
    AlreadyLeased,

    #[error("renewal no longer matches the current binding")]
    StaleRenewal,

    #[error("request missing required fields: {0}")]
    MalformedRequest(&'static str),

    #[error("store unreachable: {0}")]
    TransportLost(#[from] kv_gateway::KvError),

    #[error("DNS publish failed: {0}")]
    DnsPublishFailed(#[from] crate::dns::DnsError),
}

pub type LeaseResult<T> = Result<T, LeaseError>;
