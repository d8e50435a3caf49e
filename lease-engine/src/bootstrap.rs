//! Idempotent one-shot that stamps every address in the configured range
//! as `free` unless it's already `free` or `leased`.

use kv_gateway::{AddrRange, Guard, KeySchema, KvStore, Op, Txn};
use tracing::debug;

use crate::error::LeaseResult;

/// Runs the bootstrap transaction for every address in `range`. Re-running
/// it (including from a peer instance sharing the same prefix) is
/// harmless. Fails fast on the first transport error; does not retry.
pub async fn bootstrap<S: KvStore>(store: &S, keys: &KeySchema, range: &AddrRange) -> LeaseResult<()> {
    for addr in range.iter() {
        stamp_free(store, keys, addr).await?;
    }
    debug!(count = range.len(), "bootstrap complete");
    Ok(())
}

/// The single re-stamp transaction shared by bootstrap and the reclaimer:
/// `Put(ips/free/A, A)` iff neither `ips/free/A` nor `ips/leased/A` exist.
pub(crate) async fn stamp_free<S: KvStore>(
    store: &S,
    keys: &KeySchema,
    addr: std::net::Ipv4Addr,
) -> LeaseResult<bool> {
    let free_key = keys.ip_free(addr);
    let leased_key = keys.ip_leased(addr);
    let result = store
        .txn(Txn::new(
            vec![Guard::KeyMissing(free_key.clone()), Guard::KeyMissing(leased_key)],
            vec![Op::put(free_key, addr.to_string())],
            vec![],
        ))
        .await?;
    Ok(result.applied)
}
