//! A builder for assembling a [`ControllerRuntime`].
//!
//! The [`ControllerBuilder`] wires the primary informer, its reverse indexes,
//! the event router, the optional dynamic watch registry and the worker pool
//! around one shared [`WorkQueue`].
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let runtime = ControllerBuilder::new(config, shutdown_rx)
//!     .primary(lister_watcher)
//!     .reconciler(reconciler)
//!     .patch_applier(store)
//!     .index(INDEX_NAME, index_fn)
//!     .secondary(dynamic_client, discovery, INDEX_NAME)
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .build()?;
//! runtime.run().await?;
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::error;
use tracing::info;

use super::Controller;
use crate::cache::IndexFunc;
use crate::cache::Indexer;
use crate::committer::Committer;
use crate::committer::PatchApplier;
use crate::dynamic::Discovery;
use crate::dynamic::DynamicClient;
use crate::dynamic::DynamicWatchRegistry;
use crate::informer::Informer;
use crate::informer::ListerWatcher;
use crate::metrics;
use crate::queue::default_controller_rate_limiter;
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::router::EventRouter;
use crate::utils::async_task::spawn_task;
use crate::ControllerConfig;
use crate::Error;
use crate::Resource;
use crate::Result;

struct Secondary {
    client: Arc<dyn DynamicClient>,
    discovery: Arc<dyn Discovery>,
    index_name: String,
}

pub struct ControllerBuilder<R: Resource> {
    config: ControllerConfig,
    shutdown_signal: watch::Receiver<()>,
    primary: Option<Arc<dyn ListerWatcher<R>>>,
    reconciler: Option<Arc<dyn Reconciler<R>>>,
    patch_applier: Option<Arc<dyn PatchApplier>>,
    indexers: Vec<(String, IndexFunc<R>)>,
    secondary: Option<Secondary>,
}

impl<R: Resource> ControllerBuilder<R> {
    pub fn new(
        config: ControllerConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            shutdown_signal,
            primary: None,
            reconciler: None,
            patch_applier: None,
            indexers: Vec::new(),
            secondary: None,
        }
    }

    pub fn primary(
        mut self,
        lister_watcher: Arc<dyn ListerWatcher<R>>,
    ) -> Self {
        self.primary = Some(lister_watcher);
        self
    }

    pub fn reconciler(
        mut self,
        reconciler: Arc<dyn Reconciler<R>>,
    ) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn patch_applier(
        mut self,
        patch_applier: Arc<dyn PatchApplier>,
    ) -> Self {
        self.patch_applier = Some(patch_applier);
        self
    }

    /// Adds a secondary index to the primary cache.
    pub fn index(
        mut self,
        name: impl Into<String>,
        func: IndexFunc<R>,
    ) -> Self {
        self.indexers.push((name.into(), func));
        self
    }

    /// Watches every discovered kind and routes its events through the
    /// primary index `index_name`.
    pub fn secondary(
        mut self,
        client: Arc<dyn DynamicClient>,
        discovery: Arc<dyn Discovery>,
        index_name: impl Into<String>,
    ) -> Self {
        self.secondary = Some(Secondary {
            client,
            discovery,
            index_name: index_name.into(),
        });
        self
    }

    /// Starts the Prometheus endpoint if monitoring is enabled.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        if self.config.monitoring.prometheus_enabled {
            let port = self.config.monitoring.prometheus_port;
            tokio::spawn(async move {
                metrics::start_server(port, shutdown_signal).await;
            });
        }
        self
    }

    /// Assembles the runtime. Must be called within a Tokio runtime.
    ///
    /// # Errors
    /// Fails when a required component is missing, an index is registered
    /// twice, or secondary routing names an unknown index.
    pub fn build(self) -> Result<ControllerRuntime<R>> {
        let name = self.config.controller.name.clone();
        let primary = self
            .primary
            .ok_or_else(|| Error::Fatal("primary lister/watcher is required".to_string()))?;
        let reconciler = self
            .reconciler
            .ok_or_else(|| Error::Fatal("reconciler is required".to_string()))?;
        let patch_applier = self
            .patch_applier
            .ok_or_else(|| Error::Fatal("patch applier is required".to_string()))?;

        let queue = WorkQueue::new(name.clone(), default_controller_rate_limiter(&self.config.queue));
        let informer = Arc::new(Informer::new(
            R::gvr().to_string(),
            primary,
            &self.config.watch,
            self.config.controller.resync_period(),
        ));
        let indexer = informer.indexer();
        for (index_name, func) in self.indexers {
            indexer.add_indexer(&index_name, func)?;
        }

        let index_name = self
            .secondary
            .as_ref()
            .map(|s| s.index_name.clone())
            .unwrap_or_default();
        let router = Arc::new(EventRouter::new(
            name.clone(),
            queue.clone(),
            indexer.clone(),
            index_name.clone(),
        ));
        informer.add_event_handler(router.clone());

        let dynamic = match self.secondary {
            Some(secondary) => {
                // Fails with MissingIndex when the routing index was never added.
                indexer.index_keys(&index_name, "")?;
                let registry = Arc::new(DynamicWatchRegistry::new(
                    name.clone(),
                    secondary.client,
                    Arc::new(self.config.builtin.clone()),
                    self.config.watch.clone(),
                ));
                registry.add_handler(router);
                Some((registry, secondary.discovery))
            }
            None => None,
        };

        let controller = Arc::new(Controller::new(
            name,
            queue,
            indexer,
            reconciler,
            Committer::new(patch_applier),
        ));

        Ok(ControllerRuntime {
            config: self.config,
            shutdown_signal: self.shutdown_signal,
            informer,
            dynamic,
            controller,
        })
    }
}

/// A fully wired controller, ready to run.
pub struct ControllerRuntime<R: Resource> {
    config: ControllerConfig,
    shutdown_signal: watch::Receiver<()>,
    informer: Arc<Informer<R>>,
    dynamic: Option<(Arc<DynamicWatchRegistry>, Arc<dyn Discovery>)>,
    controller: Arc<Controller<R>>,
}

impl<R: Resource> ControllerRuntime<R> {
    pub fn queue(&self) -> &Arc<WorkQueue> {
        self.controller.queue()
    }

    pub fn indexer(&self) -> Arc<Indexer<R>> {
        self.informer.indexer()
    }

    pub fn registry(&self) -> Option<&Arc<DynamicWatchRegistry>> {
        self.dynamic.as_ref().map(|(registry, _)| registry)
    }

    pub fn controller(&self) -> &Arc<Controller<R>> {
        &self.controller
    }

    /// Starts the informers, waits for the primary cache to sync, then runs
    /// the workers until shutdown.
    ///
    /// # Errors
    /// Returns a fatal error when the primary cache does not sync within
    /// `controller.cache_sync_timeout_ms`.
    pub async fn run(&self) -> Result<()> {
        let name = self.config.controller.name.clone();
        let mut shutdown = self.shutdown_signal.clone();
        let mut handles = Vec::new();

        // Background watches stop on this signal, fired on every exit path.
        let (stop_tx, stop_rx) = watch::channel(());

        let informer = self.informer.clone();
        let informer_shutdown = stop_rx.clone();
        spawn_task(
            &format!("{name}-primary-informer"),
            move || informer.run(informer_shutdown),
            Some(&mut handles),
        );
        if let Some((registry, discovery)) = &self.dynamic {
            let registry = registry.clone();
            let discovery = discovery.clone();
            let registry_shutdown = stop_rx.clone();
            spawn_task(
                &format!("{name}-dynamic-watches"),
                move || registry.run(discovery, registry_shutdown),
                Some(&mut handles),
            );
        }

        let timeout = self.config.controller.cache_sync_timeout();
        let synced = tokio::select! {
            _ = shutdown.changed() => {
                info!(controller = %name, "shutdown before caches synced");
                Ok(false)
            }
            synced = self.informer.wait_for_sync(timeout) => {
                if synced {
                    Ok(true)
                } else {
                    error!(controller = %name, ?timeout, "timed out waiting for caches to sync");
                    Err(Error::Fatal(format!("{name}: timed out waiting for caches to sync")))
                }
            }
        };

        let result = match synced {
            Ok(true) => {
                info!(controller = %name, "caches synced");
                self.controller
                    .clone()
                    .run(self.config.controller.workers, self.shutdown_signal.clone())
                    .await
            }
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };

        self.queue().shut_down();
        let _ = stop_tx.send(());
        for handle in handles {
            handle.await?;
        }
        result?;
        info!(controller = %name, "controller stopped");
        Ok(())
    }
}
