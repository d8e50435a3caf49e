//! An etcd-coordinated DHCPv4 address-assignment state machine: discover →
//! offer, request → lease/renew/nak, release/decline → revoke, with a
//! periodic reclaimer and optional DNS publication.

pub mod bootstrap;
pub mod dns;
pub mod engine;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod reclaim;
pub mod startup_health;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use config::DhcpConfig;
use kv_gateway::{EtcdStore, KeySchema};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use dns::{DnsError, DnsPublisher};
pub use engine::{Granted, LeaseEngine, RequestParams};
pub use error::{LeaseError, LeaseResult};
pub use handler::{Handler, DEFAULT_LEASE_SECONDS, PACKET_DEADLINE};
pub use kv_gateway::{AddrRange, FakeKv, KvStore};

/// A fully wired handler instance plus the background tasks that keep its
/// store state converged: bootstrap has already run, and the reclaimer and
/// endpoint-sync tasks are spawned and sharing `shutdown`.
pub struct Instance {
    pub handler: Arc<Handler<EtcdStore>>,
    pub shutdown: CancellationToken,
    reclaimer: tokio::task::JoinHandle<()>,
    endpoint_sync: tokio::task::JoinHandle<()>,
}

impl Instance {
    /// Builds the store client, bootstraps the range, and spawns the
    /// reclaimer and endpoint-sync background tasks.
    pub async fn new(config_payload: &str, server_ip: Ipv4Addr) -> anyhow::Result<Self> {
        let cfg = DhcpConfig::parse(config_payload)?;
        let names = cfg.load_names()?;

        let store = Arc::new(
            EtcdStore::connect(&cfg.endpoints, &cfg.ca, &cfg.cert, &cfg.key).await?,
        );
        store.sync_endpoints().await?;

        let keys = KeySchema::new(cfg.prefix.clone(), cfg.separator.clone());
        let range = AddrRange::new(cfg.start, cfg.end);
        bootstrap::bootstrap(store.as_ref(), &keys, &range).await?;

        let dns = cfg.dns_zone.as_ref().map(|zone| {
            DnsPublisher::new(store.clone(), keys.clone(), zone.clone(), names.clone())
        });

        let engine = Arc::new(LeaseEngine::new(store.clone(), keys.clone(), dns));
        let handler = Arc::new(Handler::new(engine, server_ip));

        let shutdown = CancellationToken::new();
        let mut reclaimer = reclaim::spawn_reclaimer(
            store.clone(),
            keys.clone(),
            range,
            reclaim::DEFAULT_SWEEP_INTERVAL,
            shutdown.clone(),
        );
        let mut endpoint_sync = spawn_endpoint_sync(store, shutdown.clone());

        startup_health::verify_background_task_running("reclaimer", &mut reclaimer).await?;
        startup_health::verify_background_task_running("endpoint sync", &mut endpoint_sync).await?;

        info!("dhcp lease handler ready");

        Ok(Self {
            handler,
            shutdown,
            reclaimer,
            endpoint_sync,
        })
    }

    /// Cancels the background tasks and waits for them to exit.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        self.reclaimer.await?;
        self.endpoint_sync.await?;
        Ok(())
    }
}

const ENDPOINT_SYNC_INTERVAL: Duration = Duration::from_secs(60);
const ENDPOINT_SYNC_DEADLINE: Duration = Duration::from_secs(30);

/// After client creation, periodically refreshes the endpoint list.
/// Failure is fatal: the process exits so an external supervisor restarts
/// it, matching the DORA GC/coordination-monitor task shape this is
/// grounded on.
fn spawn_endpoint_sync(
    store: Arc<EtcdStore>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ENDPOINT_SYNC_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("endpoint sync task stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match tokio::time::timeout(ENDPOINT_SYNC_DEADLINE, store.sync_endpoints()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            tracing::error!(?err, "endpoint sync failed, exiting for supervisor restart");
                            std::process::exit(1);
                        }
                        Err(_) => {
                            tracing::error!("endpoint sync timed out, exiting for supervisor restart");
                            std::process::exit(1);
                        }
                    }
                }
            }
        }
    })
}
