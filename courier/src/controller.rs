use std::sync::{Arc, LazyLock};

use courier_common::{Signal, internal, logging, tracing};
use courier_control::{ControlConfig, ControlServer, ControlState, VersionInfo};
use courier_delivery::{BatchProcessor, DeliveryConfig, HttpDeliveryProvider, ProviderConfig, Scheduler};
use courier_lock::{DistributedLock, LockConfig, LockStore, MemoryLockStore, SqliteLockStore};
use courier_queue::{QueueConfig, QueueStore, Stores};
use serde::Deserialize;
use tokio::sync::broadcast;

/// The whole process configuration, as read from `courier.config.ron`
///
/// # Example
/// ```ron
/// Courier (
///     delivery: (batch_size: 2, interval_secs: 120, autostart: true),
///     lock: Some((key: "courier:dispatch:lock", ttl_secs: 60)),
///     queue: (type: "Sqlite", path: "/var/lib/courier/courier.db"),
///     provider: (url: "http://localhost:3001/send", token: Some("secret")),
///     control: (listen_address: "[::]:8080"),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Courier {
    #[serde(default)]
    delivery: DeliveryConfig,
    /// Cross-instance exclusion; absent means every instance processes freely
    #[serde(default)]
    lock: Option<LockConfig>,
    #[serde(default)]
    queue: QueueConfig,
    #[serde(default)]
    provider: ProviderConfig,
    #[serde(default)]
    control: ControlConfig,
}

/// Everything wired up and ready to run
#[derive(Debug)]
pub struct Service {
    pub scheduler: Arc<Scheduler>,
    pub processor: Arc<BatchProcessor>,
    pub queue: Arc<dyn QueueStore>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

async fn serve_control(
    server: Option<ControlServer>,
    mut shutdown: broadcast::Receiver<Signal>,
) -> anyhow::Result<()> {
    match server {
        Some(server) => Ok(server.serve(shutdown).await?),
        None => {
            let _ = shutdown.recv().await;
            Ok(())
        }
    }
}

impl Courier {
    pub const fn delivery(&self) -> &DeliveryConfig {
        &self.delivery
    }

    pub const fn lock(&self) -> Option<&LockConfig> {
        self.lock.as_ref()
    }

    pub const fn queue(&self) -> &QueueConfig {
        &self.queue
    }

    pub const fn control(&self) -> &ControlConfig {
        &self.control
    }

    /// Reject configurations the scheduler cannot run safely
    ///
    /// # Errors
    ///
    /// If the batch size, interval or processing timeout is zero, or the lock
    /// would lapse before its first extension.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.delivery.batch_size > 0, "delivery.batch_size must be at least 1");
        anyhow::ensure!(
            self.delivery.interval_secs > 0,
            "delivery.interval_secs must be at least 1"
        );
        anyhow::ensure!(
            self.delivery.processing_timeout_secs > 0,
            "delivery.processing_timeout_secs must be at least 1"
        );

        if let Some(lock) = &self.lock {
            let extend_every = self.delivery.interval() / 2;
            anyhow::ensure!(
                lock.ttl() > extend_every,
                "lock.ttl_secs ({}s) must exceed half the delivery interval ({}s)",
                lock.ttl_secs,
                extend_every.as_secs_f64()
            );
        }

        Ok(())
    }

    /// Lock entries live next to the queue when it is durable, so every
    /// instance sharing the database also shares the lock
    fn lock_store(&self) -> anyhow::Result<Arc<dyn LockStore>> {
        let store: Arc<dyn LockStore> = match self.queue.path() {
            Some(path) => Arc::new(SqliteLockStore::open(path)?),
            None => Arc::new(MemoryLockStore::new()),
        };
        Ok(store)
    }

    /// Open the stores and build the scheduler
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, a store cannot be opened, or the
    /// provider client cannot be built.
    pub fn into_service(self) -> anyhow::Result<Service> {
        self.validate()?;

        let lock = match &self.lock {
            Some(config) => Some(Arc::new(DistributedLock::new(
                self.lock_store()?,
                config.key.clone(),
                config.ttl(),
            ))),
            None => None,
        };

        let Stores { queue, cache } = self.queue.into_stores()?;
        let provider = Arc::new(HttpDeliveryProvider::new(&self.provider)?);
        let processor = Arc::new(BatchProcessor::new(
            Arc::clone(&queue),
            cache,
            provider,
            &self.delivery,
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&processor),
            lock,
            self.delivery.interval(),
        ));

        internal!(
            level = INFO,
            batch_size = self.delivery.batch_size,
            interval = ?self.delivery.interval(),
            locking = scheduler.lock().is_some(),
            "Delivery service wired"
        );

        Ok(Service {
            scheduler,
            processor,
            queue,
        })
    }

    /// Run this controller, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if the configuration is invalid, a
    /// store cannot be opened, or the control server cannot bind.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let autostart = self.delivery.autostart;
        let control = self.control.clone();
        let service = self.into_service()?;

        internal!("Controller running");

        let server = if control.enabled {
            let state = ControlState {
                controller: service.scheduler.clone(),
                sent: service.processor.clone(),
                version: VersionInfo::from_build(),
            };
            Some(ControlServer::new(&control, state).await?)
        } else {
            internal!(level = INFO, "Control server disabled");
            None
        };

        if autostart {
            service.scheduler.start();
        }

        let ret = tokio::select! {
            r = serve_control(server, SHUTDOWN_BROADCAST.subscribe()) => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");
        service.scheduler.stop().await;

        ret
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn full_config_parses() {
        let courier: Courier = ron::from_str(
            r#"Courier (
                delivery: (batch_size: 4, interval_secs: 30, autostart: true),
                lock: Some((key: "test:lock", ttl_secs: 20)),
                queue: (type: "Sqlite", path: "/tmp/courier.db", claim_lease_secs: 90),
                provider: (url: "http://provider.test/send", token: Some("secret"), timeout_secs: 5),
                control: (enabled: false, listen_address: "127.0.0.1:9090"),
            )"#,
        )
        .unwrap();

        assert_eq!(courier.delivery().batch_size, 4);
        assert!(courier.delivery().autostart);
        assert_eq!(courier.lock().unwrap().key, "test:lock");
        assert_eq!(courier.queue().claim_lease(), Duration::from_secs(90));
        assert!(!courier.control().enabled);
        courier.validate().unwrap();
    }

    #[test]
    fn empty_config_uses_defaults() {
        let courier: Courier = ron::from_str("Courier ()").unwrap();

        assert_eq!(courier.delivery().batch_size, 2);
        assert_eq!(courier.delivery().interval(), Duration::from_secs(120));
        assert!(courier.lock().is_none());
        assert!(courier.queue().path().is_none());
        assert!(courier.control().enabled);
        courier.validate().unwrap();
    }

    #[test]
    fn default_lock_passes_validation() {
        let courier: Courier = ron::from_str("Courier (lock: Some(()))").unwrap();
        courier.validate().unwrap();
    }

    #[test]
    fn shipped_config_passes_validation() {
        let courier: Courier =
            ron::from_str(include_str!("../../courier.config.ron")).unwrap();

        assert_eq!(courier.lock().map(LockConfig::ttl), Some(Duration::from_secs(90)));
        courier.validate().unwrap();
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let courier: Courier = ron::from_str("Courier (delivery: (batch_size: 0))").unwrap();
        assert!(courier.validate().is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let courier: Courier = ron::from_str("Courier (delivery: (interval_secs: 0))").unwrap();
        assert!(courier.validate().is_err());
    }

    #[test]
    fn lock_must_outlive_the_extension_period() {
        let courier: Courier = ron::from_str(
            "Courier (delivery: (interval_secs: 120), lock: Some((ttl_secs: 60)))",
        )
        .unwrap();
        assert!(courier.validate().is_err());

        let courier: Courier = ron::from_str(
            "Courier (delivery: (interval_secs: 120), lock: Some((ttl_secs: 61)))",
        )
        .unwrap();
        courier.validate().unwrap();
    }

    #[tokio::test]
    async fn memory_service_processes_an_empty_queue() {
        let courier: Courier = ron::from_str("Courier (lock: Some(()))").unwrap();
        let service = courier.into_service().unwrap();

        assert!(service.scheduler.lock().is_some());
        let outcome = service.scheduler.process_once().await.unwrap();
        assert_eq!(outcome.claimed, 0);
    }

    #[tokio::test]
    async fn sqlite_service_shares_the_database_with_its_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.db");
        let courier: Courier = ron::from_str(&format!(
            r#"Courier (lock: Some(()), queue: (type: "Sqlite", path: "{}"))"#,
            path.display()
        ))
        .unwrap();

        let service = courier.into_service().unwrap();
        assert!(path.exists());
        assert_eq!(service.scheduler.process_once().await.unwrap().claimed, 0);
    }
}
