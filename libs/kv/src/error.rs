//! Error types for the KV gateway, shielding callers from `etcd_client`
//! internals.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    /// The store was unreachable or the call failed in transit.
    #[error("transport error: {0}")]
    Transport(String),

    /// A value stored under a key wasn't valid UTF-8.
    #[error("non-utf8 value for key {0:?}")]
    NonUtf8Value(String),

    /// TLS material (CA/cert/key) could not be loaded.
    #[error("failed to load TLS material from {path}: {source}")]
    Tls {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type KvResult<T> = Result<T, KvError>;
