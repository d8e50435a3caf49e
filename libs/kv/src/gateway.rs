//! The transactional/TTL surface the lease engine is built on: a thin,
//! typed wrapper over etcd's compare-and-swap transactions and leases.
//!
//! [`KvStore`] is the trait the lease engine, reclaimer, and DNS publisher
//! depend on. [`EtcdStore`] is the real implementation over
//! `etcd_client::Client`; [`FakeKv`] is an in-memory double used by the
//! test suite, since we never talk to a live cluster here.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{KvError, KvResult};

/// Opaque store-side lease handle. Matches `etcd_client::LeaseId`'s
/// underlying representation.
pub type LeaseId = i64;

/// A guard clause evaluated against current store state before a
/// transaction's branch is chosen.
#[derive(Debug, Clone)]
pub enum Guard {
    KeyMissing(String),
    KeyExists(String),
    ValueEquals(String, String),
}

/// A single write (or nested transaction) executed as part of a
/// transaction's chosen branch.
#[derive(Debug, Clone)]
pub enum Op {
    Put { key: String, value: String },
    PutWithLease { key: String, value: String, lease: LeaseId },
    Delete { key: String },
    Txn(Txn),
}

impl Op {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Op::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn put_with_lease(key: impl Into<String>, value: impl Into<String>, lease: LeaseId) -> Self {
        Op::PutWithLease {
            key: key.into(),
            value: value.into(),
            lease,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Op::Delete { key: key.into() }
    }
}

/// A guarded transaction: all `guards` must hold for `on_true` to run,
/// otherwise `on_false` runs. A transaction may itself appear as a single
/// [`Op::Txn`] nested inside another transaction's branch.
#[derive(Debug, Clone, Default)]
pub struct Txn {
    pub guards: Vec<Guard>,
    pub on_true: Vec<Op>,
    pub on_false: Vec<Op>,
}

impl Txn {
    pub fn new(guards: Vec<Guard>, on_true: Vec<Op>, on_false: Vec<Op>) -> Self {
        Self {
            guards,
            on_true,
            on_false,
        }
    }
}

/// The outcome of running a [`Txn`]: whether `on_true` ran, plus the
/// results of any nested transactions encountered while running the
/// chosen branch, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxnResult {
    pub applied: bool,
    pub nested: Vec<TxnResult>,
}

/// The transactional/TTL KV surface the rest of the crate is built on.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Ascending-by-key `(key, value)` pairs under `prefix`.
    async fn get_by_prefix(&self, prefix: &str) -> KvResult<Vec<(String, String)>>;

    async fn grant_lease(&self, ttl_seconds: i64) -> KvResult<LeaseId>;

    async fn txn(&self, txn: Txn) -> KvResult<TxnResult>;

    async fn put(&self, key: &str, value: &str, lease: Option<LeaseId>) -> KvResult<()>;

    async fn delete(&self, key: &str) -> KvResult<()>;

    /// Refreshes the client's endpoint list. Used by the endpoint-sync
    /// background task; failure there is treated as fatal by the caller.
    async fn sync_endpoints(&self) -> KvResult<()>;
}

/// Real [`KvStore`] over a live etcd cluster, reached with mutual-TLS.
pub struct EtcdStore {
    client: Mutex<etcd_client::Client>,
}

impl EtcdStore {
    pub async fn connect(
        endpoints: &[String],
        ca_path: &str,
        cert_path: &str,
        key_path: &str,
    ) -> KvResult<Self> {
        let ca = read_pem(ca_path)?;
        let cert = read_pem(cert_path)?;
        let key = read_pem(key_path)?;

        let tls = etcd_client::TlsOptions::new()
            .ca_certificate(etcd_client::Certificate::from_pem(ca))
            .identity(etcd_client::Identity::from_pem(cert, key));

        let options = etcd_client::ConnectOptions::new().with_tls(tls);

        let client = etcd_client::Client::connect(endpoints, Some(options))
            .await
            .map_err(|e| KvError::Transport(e.to_string()))?;

        Ok(Self {
            client: Mutex::new(client),
        })
    }

    fn guard_to_compare(guard: &Guard) -> etcd_client::Compare {
        use etcd_client::{Compare, CompareOp};
        match guard {
            Guard::KeyMissing(key) => Compare::version(key.clone(), CompareOp::Equal, 0),
            Guard::KeyExists(key) => Compare::version(key.clone(), CompareOp::Greater, 0),
            Guard::ValueEquals(key, value) => {
                Compare::value(key.clone(), CompareOp::Equal, value.clone())
            }
        }
    }

    fn op_to_txn_op(op: &Op) -> etcd_client::TxnOp {
        use etcd_client::{PutOptions, TxnOp};
        match op {
            Op::Put { key, value } => TxnOp::put(key.clone(), value.clone(), None),
            Op::PutWithLease { key, value, lease } => {
                TxnOp::put(key.clone(), value.clone(), Some(PutOptions::new().with_lease(*lease)))
            }
            Op::Delete { key } => TxnOp::delete(key.clone(), None),
            Op::Txn(nested) => TxnOp::txn(Self::build_txn(nested)),
        }
    }

    fn build_txn(txn: &Txn) -> etcd_client::Txn {
        etcd_client::Txn::new()
            .when(txn.guards.iter().map(Self::guard_to_compare).collect::<Vec<_>>())
            .and_then(txn.on_true.iter().map(Self::op_to_txn_op).collect::<Vec<_>>())
            .or_else(txn.on_false.iter().map(Self::op_to_txn_op).collect::<Vec<_>>())
    }

    fn collect_nested(responses: &[etcd_client::TxnOpResponse]) -> Vec<TxnResult> {
        responses
            .iter()
            .filter_map(|resp| match resp {
                etcd_client::TxnOpResponse::Txn(nested) => Some(TxnResult {
                    applied: nested.succeeded(),
                    nested: Self::collect_nested(nested.op_responses()),
                }),
                _ => None,
            })
            .collect()
    }
}

fn read_pem(path: &str) -> KvResult<String> {
    std::fs::read_to_string(Path::new(path)).map_err(|source| KvError::Tls {
        path: path.to_owned(),
        source,
    })
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut client = self.client.lock().await;
        let resp = client
            .get(key, None)
            .await
            .map_err(|e| KvError::Transport(e.to_string()))?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(
                kv.value_str()
                    .map_err(|_| KvError::NonUtf8Value(key.to_owned()))?
                    .to_owned(),
            )),
            None => Ok(None),
        }
    }

    async fn get_by_prefix(&self, prefix: &str) -> KvResult<Vec<(String, String)>> {
        let mut client = self.client.lock().await;
        let options = etcd_client::GetOptions::new()
            .with_prefix()
            .with_sort(etcd_client::SortTarget::Key, etcd_client::SortOrder::Ascend);
        let resp = client
            .get(prefix, Some(options))
            .await
            .map_err(|e| KvError::Transport(e.to_string()))?;
        resp.kvs()
            .iter()
            .map(|kv| {
                let key = kv
                    .key_str()
                    .map_err(|_| KvError::NonUtf8Value(prefix.to_owned()))?
                    .to_owned();
                let value = kv
                    .value_str()
                    .map_err(|_| KvError::NonUtf8Value(prefix.to_owned()))?
                    .to_owned();
                Ok((key, value))
            })
            .collect()
    }

    async fn grant_lease(&self, ttl_seconds: i64) -> KvResult<LeaseId> {
        let mut client = self.client.lock().await;
        let resp = client
            .lease_grant(ttl_seconds, None)
            .await
            .map_err(|e| KvError::Transport(e.to_string()))?;
        Ok(resp.id())
    }

    async fn txn(&self, txn: Txn) -> KvResult<TxnResult> {
        let mut client = self.client.lock().await;
        let resp = client
            .txn(Self::build_txn(&txn))
            .await
            .map_err(|e| KvError::Transport(e.to_string()))?;
        Ok(TxnResult {
            applied: resp.succeeded(),
            nested: Self::collect_nested(resp.op_responses()),
        })
    }

    async fn put(&self, key: &str, value: &str, lease: Option<LeaseId>) -> KvResult<()> {
        let mut client = self.client.lock().await;
        let options = lease.map(|l| etcd_client::PutOptions::new().with_lease(l));
        client
            .put(key, value, options)
            .await
            .map_err(|e| KvError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        let mut client = self.client.lock().await;
        client
            .delete(key, None)
            .await
            .map_err(|e| KvError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn sync_endpoints(&self) -> KvResult<()> {
        let mut client = self.client.lock().await;
        client
            .sync_members(None)
            .await
            .map_err(|e| KvError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    lease: Option<LeaseId>,
}

#[derive(Default)]
struct FakeState {
    data: HashMap<String, Entry>,
    leases: HashMap<LeaseId, ()>,
    next_lease: LeaseId,
}

/// In-memory [`KvStore`] double reproducing etcd's guard/nested-transaction
/// semantics, with an explicit [`FakeKv::expire_lease`] hook standing in
/// for wall-clock TTL expiry.
#[derive(Default)]
pub struct FakeKv {
    state: Mutex<FakeState>,
}

impl FakeKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-only hook simulating the store reaping every key bound to
    /// `lease` the instant it expires.
    pub async fn expire_lease(&self, lease: LeaseId) {
        let mut state = self.state.lock().await;
        state.leases.remove(&lease);
        state.data.retain(|_, entry| entry.lease != Some(lease));
        debug!(lease, "fake kv: expired lease");
    }

    fn eval_guard(data: &HashMap<String, Entry>, guard: &Guard) -> bool {
        match guard {
            Guard::KeyMissing(key) => !data.contains_key(key),
            Guard::KeyExists(key) => data.contains_key(key),
            Guard::ValueEquals(key, value) => {
                data.get(key).map(|e| &e.value == value).unwrap_or(false)
            }
        }
    }

    fn apply_txn(state: &mut FakeState, txn: &Txn) -> TxnResult {
        let applied = txn.guards.iter().all(|g| Self::eval_guard(&state.data, g));
        let branch = if applied { &txn.on_true } else { &txn.on_false };
        let mut nested = Vec::new();
        for op in branch {
            match op {
                Op::Put { key, value } => {
                    state.data.insert(
                        key.clone(),
                        Entry {
                            value: value.clone(),
                            lease: None,
                        },
                    );
                }
                Op::PutWithLease { key, value, lease } => {
                    state.data.insert(
                        key.clone(),
                        Entry {
                            value: value.clone(),
                            lease: Some(*lease),
                        },
                    );
                }
                Op::Delete { key } => {
                    state.data.remove(key);
                }
                Op::Txn(nested_txn) => {
                    nested.push(Self::apply_txn(state, nested_txn));
                }
            }
        }
        TxnResult { applied, nested }
    }
}

#[async_trait]
impl KvStore for FakeKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.data.get(key).map(|e| e.value.clone()))
    }

    async fn get_by_prefix(&self, prefix: &str) -> KvResult<Vec<(String, String)>> {
        let state = self.state.lock().await;
        let mut pairs: Vec<_> = state
            .data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }

    async fn grant_lease(&self, _ttl_seconds: i64) -> KvResult<LeaseId> {
        let mut state = self.state.lock().await;
        state.next_lease += 1;
        let id = state.next_lease;
        state.leases.insert(id, ());
        Ok(id)
    }

    async fn txn(&self, txn: Txn) -> KvResult<TxnResult> {
        let mut state = self.state.lock().await;
        Ok(Self::apply_txn(&mut state, &txn))
    }

    async fn put(&self, key: &str, value: &str, lease: Option<LeaseId>) -> KvResult<()> {
        let mut state = self.state.lock().await;
        state.data.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                lease,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        let mut state = self.state.lock().await;
        state.data.remove(key);
        Ok(())
    }

    async fn sync_endpoints(&self) -> KvResult<()> {
        warn!("fake kv: sync_endpoints is a no-op");
        Ok(())
    }
}
