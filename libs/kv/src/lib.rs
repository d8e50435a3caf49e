//! Typed wrapper over the external KV store's transactional and
//! TTL-bearing primitives: the only thing the lease engine, reclaimer, and
//! DNS publisher are allowed to talk to for persistent state.

pub mod error;
pub mod gateway;
pub mod keys;
pub mod range;

pub use error::{KvError, KvResult};
pub use gateway::{EtcdStore, FakeKv, Guard, KvStore, LeaseId, Op, Txn, TxnResult};
pub use keys::KeySchema;
pub use range::AddrRange;
