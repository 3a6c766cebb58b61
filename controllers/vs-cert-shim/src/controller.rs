//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the caches, the
//! reconciler, the work queue, the watchers and the worker pool together,
//! and the worker loop itself. Reconciles read VirtualServers and
//! Certificates from the watchers' reflector stores, so workers only start
//! once both stores have completed their initial list.

use crate::config::Config;
use crate::correlator::{CertificateHandler, ResourceEventHandler, VirtualServerHandler};
use crate::error::ControllerError;
use crate::events::KubeEventRecorder;
use crate::key::ObjectKey;
use crate::metrics::Metrics;
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::server::{ServerState, start_server};
use crate::watcher::watch_resource;
use cert_store::{CachedStore, KubeStore};
use crds::{Certificate, VirtualServer};
use kube::{Api, Client};
use kube_runtime::reflector::{self, Store};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Processes keys until the queue is shut down.
pub async fn run_worker(
    id: usize,
    queue: WorkQueue<ObjectKey>,
    reconciler: Arc<Reconciler>,
    cancel: CancellationToken,
) {
    debug!(worker = id, "Worker started");
    while let Some(key) = queue.get().await {
        match reconciler.process_item(&key, &cancel).await {
            Ok(()) => queue.forget(&key),
            Err(ControllerError::Cancelled) => {
                debug!(worker = id, %key, "Reconcile cancelled");
            }
            Err(e) if e.is_stale_write() => {
                info!(worker = id, %key, "Certificate changed since it was cached, requeueing: {}", e);
                queue.add_rate_limited(key.clone());
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    worker = id,
                    %key,
                    retries = queue.num_requeues(&key),
                    "Failed to reconcile VirtualServer, requeueing: {}",
                    e
                );
                queue.add_rate_limited(key.clone());
            }
            Err(e) => {
                error!(worker = id, %key, "Failed to reconcile VirtualServer, not retrying: {}", e);
                queue.forget(&key);
            }
        }
        queue.done(&key);
    }
    debug!(worker = id, "Worker stopped");
}

/// Waits until both reflector stores hold a full list.
///
/// Returns false when `cancel` fires first or a watcher gave up before its
/// first list.
pub async fn wait_for_caches(
    virtual_servers: &Store<VirtualServer>,
    certificates: &Store<Certificate>,
    cancel: &CancellationToken,
) -> bool {
    let ready = async {
        virtual_servers.wait_until_ready().await?;
        certificates.wait_until_ready().await
    };
    tokio::select! {
        () = cancel.cancelled() => false,
        result = ready => match result {
            Ok(()) => true,
            Err(e) => {
                error!("Cache never became ready: {}", e);
                false
            }
        },
    }
}

/// Main controller for VirtualServer Certificates.
pub struct Controller {
    shutdown: CancellationToken,
    queue: WorkQueue<ObjectKey>,
    watchers: Vec<JoinHandle<Result<(), ControllerError>>>,
    workers: JoinHandle<()>,
    server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing VirtualServer certificate shim");

        let client = Client::try_default().await?;
        let (vs_cache, vs_writer) = reflector::store::<VirtualServer>();
        let (cert_cache, cert_writer) = reflector::store::<Certificate>();
        let store = Arc::new(CachedStore::new(
            KubeStore::new(client.clone()),
            vs_cache.clone(),
            cert_cache.clone(),
        ));
        let recorder = Arc::new(KubeEventRecorder::new(client.clone()));
        let metrics = Arc::new(Metrics::new().map_err(|e| ControllerError::Server(e.to_string()))?);

        let reconciler = Arc::new(
            Reconciler::new(
                store.clone(),
                store,
                recorder,
                config.issuer_defaults.clone(),
                config.ownership_policy,
            )
            .with_metrics(metrics.clone()),
        );

        let shutdown = CancellationToken::new();
        let queue = WorkQueue::with_depth_gauge(config.backoff, metrics.queue_depth());
        let state = Arc::new(ServerState::new(metrics.clone()));

        let (vs_api, cert_api): (Api<VirtualServer>, Api<Certificate>) = match config.namespace.as_deref() {
            Some(ns) => (Api::namespaced(client.clone(), ns), Api::namespaced(client, ns)),
            None => (Api::all(client.clone()), Api::all(client)),
        };

        let vs_watcher = {
            let handler: Arc<dyn ResourceEventHandler<VirtualServer>> =
                Arc::new(VirtualServerHandler::new(queue.clone()));
            let state = state.clone();
            tokio::spawn(watch_resource(
                "VirtualServer",
                vs_api,
                vs_writer,
                handler,
                move || state.mark_virtual_servers_synced(),
                shutdown.child_token(),
            ))
        };
        let cert_watcher = {
            let handler: Arc<dyn ResourceEventHandler<Certificate>> =
                Arc::new(CertificateHandler::new(queue.clone()));
            let state = state.clone();
            tokio::spawn(watch_resource(
                "Certificate",
                cert_api,
                cert_writer,
                handler,
                move || state.mark_certificates_synced(),
                shutdown.child_token(),
            ))
        };

        let workers = {
            let queue = queue.clone();
            let cancel = shutdown.child_token();
            let count = config.workers;
            tokio::spawn(async move {
                if !wait_for_caches(&vs_cache, &cert_cache, &cancel).await {
                    return;
                }
                info!("Caches synced, starting {} workers", count);
                let workers: Vec<_> = (0..count)
                    .map(|id| tokio::spawn(run_worker(id, queue.clone(), reconciler.clone(), cancel.clone())))
                    .collect();
                for worker in workers {
                    if let Err(e) = worker.await {
                        error!("Worker panicked: {}", e);
                    }
                }
            })
        };

        let server = tokio::spawn(start_server(config.metrics_port, state, shutdown.child_token()));

        Ok(Self {
            shutdown,
            queue,
            watchers: vec![vs_watcher, cert_watcher],
            workers,
            server,
        })
    }

    /// Runs the controller until a shutdown signal or a fatal task error.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("VirtualServer certificate shim running");

        let watchers = futures::future::select_all(self.watchers.iter_mut());
        let outcome = tokio::select! {
            () = shutdown_signal() => {
                info!("Shutdown signal received");
                Ok(())
            }
            (result, _, _) = watchers => {
                result
                    .map_err(|e| ControllerError::Watch(format!("watcher panicked: {e}")))
                    .and_then(|inner| inner)
            }
            result = &mut self.server => {
                result
                    .map_err(|e| ControllerError::Server(format!("server panicked: {e}")))
                    .and_then(|inner| inner)
            }
        };

        self.shutdown.cancel();
        self.queue.shut_down();
        if let Err(e) = self.workers.await {
            error!("Worker pool panicked: {}", e);
        }
        info!("All workers stopped");
        outcome
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::ExponentialBackoff;
    use crate::reconciler::OwnershipPolicy;
    use crate::test_utils::*;
    use cert_store::OperationKind;
    use crds::CertManagerConfig;
    use kube_runtime::watcher;
    use std::time::Duration;

    fn spawn_worker(harness: &TestHarness, queue: &WorkQueue<ObjectKey>) -> JoinHandle<()> {
        tokio::spawn(run_worker(
            0,
            queue.clone(),
            harness.reconciler.clone(),
            CancellationToken::new(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_reconciles_and_forgets() {
        let harness = create_test_harness(letsencrypt_defaults(), OwnershipPolicy::Advisory);
        harness.store.insert_virtual_server(create_test_virtual_server(
            "default",
            "vs1",
            "example.com",
            Some("example-tls"),
            None,
        ));
        let queue = WorkQueue::new(ExponentialBackoff::default());
        let key = ObjectKey::new("default", "vs1");
        queue.add(key.clone());

        let worker = spawn_worker(&harness, &queue);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(harness.store.certificate("default", "example-tls").is_some());
        assert_eq!(queue.num_requeues(&key), 0);

        queue.shut_down();
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_requeues_retryable_failures() {
        let harness = create_test_harness(letsencrypt_defaults(), OwnershipPolicy::Advisory);
        harness.store.insert_virtual_server(create_test_virtual_server(
            "default",
            "vs1",
            "example.com",
            Some("example-tls"),
            None,
        ));
        harness.store.fail_next(OperationKind::Create, 2, "apiserver unavailable");
        let queue = WorkQueue::new(ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(300)));
        let key = ObjectKey::new("default", "vs1");
        queue.add(key.clone());

        let worker = spawn_worker(&harness, &queue);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.num_requeues(&key), 1);
        assert!(harness.store.certificate("default", "example-tls").is_none());

        // First retry after 5s fails again, second after a further 10s succeeds
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(queue.num_requeues(&key), 2);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(harness.store.certificate("default", "example-tls").is_some());
        assert_eq!(queue.num_requeues(&key), 0);

        queue.shut_down();
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_drops_invalid_annotation() {
        let harness = create_test_harness(letsencrypt_defaults(), OwnershipPolicy::Advisory);
        harness.store.insert_virtual_server(create_test_virtual_server(
            "default",
            "vs1",
            "example.com",
            Some("example-tls"),
            Some(CertManagerConfig {
                duration: "1 year".to_string(),
                ..Default::default()
            }),
        ));
        let queue = WorkQueue::new(ExponentialBackoff::default());
        let key = ObjectKey::new("default", "vs1");
        queue.add(key.clone());

        let worker = spawn_worker(&harness, &queue);
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(queue.num_requeues(&key), 0);
        assert!(queue.is_empty());
        let lookups = harness
            .store
            .operations()
            .iter()
            .filter(|op| op.kind == OperationKind::GetVirtualServer)
            .count();
        assert_eq!(lookups, 1, "invalid configuration is not retried");

        queue.shut_down();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_caches_needs_both_initial_lists() {
        let (virtual_servers, mut vs_writer) = reflector::store::<VirtualServer>();
        let (certificates, mut cert_writer) = reflector::store::<Certificate>();
        let cancel = CancellationToken::new();

        vs_writer.apply_watcher_event(&watcher::Event::Init);
        vs_writer.apply_watcher_event(&watcher::Event::InitDone);
        let waiter = {
            let (virtual_servers, certificates, cancel) = (virtual_servers.clone(), certificates.clone(), cancel.clone());
            tokio::spawn(async move { wait_for_caches(&virtual_servers, &certificates, &cancel).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished(), "Certificate cache has not listed yet");

        cert_writer.apply_watcher_event(&watcher::Event::Init);
        cert_writer.apply_watcher_event(&watcher::Event::InitDone);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_caches_gives_up_on_shutdown() {
        let (virtual_servers, _vs_writer) = reflector::store::<VirtualServer>();
        let (certificates, _cert_writer) = reflector::store::<Certificate>();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(!wait_for_caches(&virtual_servers, &certificates, &cancel).await);
    }
}
