use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::core::config::ProcessConfig;
use crate::core::process::{CleanupHook, ProcessCore, ProcessKind};
use crate::error::ProcessError;
use crate::events::Bus;
use crate::listeners::Listener;
use crate::operations::Service;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`ProcessCore`].
pub struct ProcessBuilder<S: Service> {
    name: Arc<str>,
    service: S,
    cfg: ProcessConfig,
    kind: ProcessKind,
    listeners: Vec<Arc<dyn Listener<S>>>,
    cleanup: Option<CleanupHook<S>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<S: Service> ProcessCore<S> {
    /// Starts building a process serving `service`.
    pub fn builder(name: impl Into<Arc<str>>, service: S) -> ProcessBuilder<S> {
        ProcessBuilder {
            name: name.into(),
            service,
            cfg: ProcessConfig::default(),
            kind: ProcessKind::default(),
            listeners: Vec::new(),
            cleanup: None,
            subscribers: Vec::new(),
        }
    }
}

impl<S: Service> ProcessBuilder<S> {
    /// Replaces the default configuration.
    pub fn with_config(mut self, cfg: ProcessConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the process flavour.
    pub fn with_kind(mut self, kind: ProcessKind) -> Self {
        self.kind = kind;
        self
    }

    /// Initial listeners, buffered until `start_listeners`.
    pub fn with_listeners(mut self, listeners: Vec<Arc<dyn Listener<S>>>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Hook run exactly once by `stop()`, after every child has joined.
    pub fn with_cleanup<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&ProcessCore<S>) + Send + 'static,
    {
        self.cleanup = Some(Box::new(hook));
        self
    }

    /// Event subscribers.
    ///
    /// Subscribers receive runtime events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the process and attaches the initial listeners.
    ///
    /// Must be called inside a tokio runtime when subscribers are configured.
    pub fn build(self) -> Result<Arc<ProcessCore<S>>, ProcessError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let stopped = CancellationToken::new();
        if !self.subscribers.is_empty() {
            forward_to_subscribers(&bus, self.subscribers, stopped.clone());
        }

        let core = Arc::new(ProcessCore::new(
            self.name,
            self.kind,
            self.cfg,
            self.service,
            bus,
            self.cleanup,
            stopped,
        ));
        for listener in self.listeners {
            core.add_endpoint(listener)?;
        }
        Ok(core)
    }
}

/// Forwards bus events to the subscriber set until the process stopped.
fn forward_to_subscribers(bus: &Bus, subs: Vec<Arc<dyn Subscribe>>, stopped: CancellationToken) {
    let set = SubscriberSet::new(subs, bus.clone());
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber forwarding lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = stopped.cancelled() => {
                    while let Ok(ev) = rx.try_recv() {
                        set.emit(&ev);
                    }
                    break;
                }
            }
        }
        set.shutdown().await;
    });
}
