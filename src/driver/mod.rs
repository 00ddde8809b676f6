//! The DNS tunnel driver
//!
//! Owns the routing table and the UDP listener. Each incoming question is
//! matched against the registered domains and tags; the matching route's sink
//! gets the decoded payload, and its reply goes back in the records that were
//! asked for.
//!
//! ## Lifecycle
//!
//! Creating a driver doesn't touch the network. [`Driver::start`] binds and
//! spawns the listener, [`Driver::stop`] shuts it down gracefully and
//! [`Driver::kill`] aborts it. Starting a running driver, or stopping a
//! stopped one, is a [`TunnelError::Lifecycle`] error. A stopped driver can be
//! started again; routes survive restarts.
//!
//! Routes can be added and removed at any time, including while running.

mod dispatch;
mod routes;

pub(crate) use routes::check_affix;
pub use routes::{RouteKind, RouteMatch, RouteOptions, RouteTable, SinkEntry};

use crate::codec::Codec;
use crate::config::{DriverConfig, RouteConfig};
use crate::dns::{transport, Question, Record, Upstream};
use crate::random::{Randomness, ThreadRandomness};
use crate::sink::SinkHandle;
use crate::TunnelError;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

/// State shared between the driver handle and the listener's tasks
pub(crate) struct Shared {
    pub(crate) target: String,
    pub(crate) routes: RwLock<RouteTable>,
    pub(crate) randomness: Arc<dyn Randomness>,
    pub(crate) passthrough: Option<Upstream>,
    pub(crate) passthrough_timeout: Duration,
}

struct Listener {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

pub struct Driver {
    name: String,
    host: String,
    port: u16,
    shared: Arc<Shared>,
    listener: Mutex<Option<Listener>>,
    running: watch::Sender<bool>,
}

impl Driver {
    /// Create a driver from `config`. Routes in the config are not registered
    /// here, since they need sinks; see [`Driver::add_route`].
    pub fn new(config: &DriverConfig) -> Result<Self, TunnelError> {
        Self::with_randomness(config, Arc::new(ThreadRandomness))
    }

    /// Like [`Driver::new`], with the source used for ANY and MX choices
    pub fn with_randomness(
        config: &DriverConfig,
        randomness: Arc<dyn Randomness>,
    ) -> Result<Self, TunnelError> {
        config.validate()?;

        let passthrough = match &config.passthrough {
            Some(spec) => Some(Upstream::parse(spec).ok_or_else(|| {
                TunnelError::Config(format!("Invalid passthrough server: '{}'", spec))
            })?),
            None => None,
        };

        let target = format!("{}::{}", module_path!(), config.name);
        log::debug!(
            target: target.as_str(),
            "New driver: host = {}, port = {}, passthrough = {:?}",
            config.host,
            config.port,
            passthrough
        );

        let (running, _) = watch::channel(false);

        Ok(Self {
            name: config.name.clone(),
            host: config.host.clone(),
            port: config.port,
            shared: Arc::new(Shared {
                target,
                routes: RwLock::new(RouteTable::new()),
                randomness,
                passthrough,
                passthrough_timeout: config.passthrough_timeout,
            }),
            listener: Mutex::new(None),
            running,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> &str {
        &self.shared.target
    }

    /// Upstream resolver for unmatched questions, if any
    pub fn passthrough(&self) -> Option<&Upstream> {
        self.shared.passthrough.as_ref()
    }

    pub fn add_tag(&self, tag: &str, sink: SinkHandle, codec: Codec) -> Result<(), TunnelError> {
        self.add_tag_with(tag, sink, RouteOptions::with_codec(codec))
    }

    pub fn add_tag_with(
        &self,
        tag: &str,
        sink: SinkHandle,
        options: RouteOptions,
    ) -> Result<(), TunnelError> {
        self.insert(RouteKind::Tag, tag, sink, options)
    }

    pub fn add_domain(&self, domain: &str, sink: SinkHandle, codec: Codec) -> Result<(), TunnelError> {
        self.add_domain_with(domain, sink, RouteOptions::with_codec(codec))
    }

    pub fn add_domain_with(
        &self,
        domain: &str,
        sink: SinkHandle,
        options: RouteOptions,
    ) -> Result<(), TunnelError> {
        self.insert(RouteKind::Domain, domain, sink, options)
    }

    /// Register a configured route
    pub fn add_route(&self, route: &RouteConfig, sink: SinkHandle) -> Result<(), TunnelError> {
        self.insert(route.kind, &route.affix, sink, route.options())
    }

    /// Register one sink under several tags and domains. Stops at the first
    /// conflict; routes added before it stay registered.
    pub fn add_sinks(
        &self,
        tags: &[String],
        domains: &[String],
        sink: SinkHandle,
        options: RouteOptions,
    ) -> Result<(), TunnelError> {
        for tag in tags {
            self.add_tag_with(tag, Arc::clone(&sink), options)?;
        }
        for domain in domains {
            self.add_domain_with(domain, Arc::clone(&sink), options)?;
        }
        Ok(())
    }

    fn insert(
        &self,
        kind: RouteKind,
        affix: &str,
        sink: SinkHandle,
        options: RouteOptions,
    ) -> Result<(), TunnelError> {
        let mut routes = self.shared.routes.write().unwrap_or_else(PoisonError::into_inner);
        routes.insert(kind, affix, sink, options)?;
        log::info!(
            target: self.target(),
            "Now listening on {} '{}' ({}, segments of {})",
            kind,
            affix,
            options.codec,
            options.max_subdomain_length
        );
        Ok(())
    }

    /// Returns whether the tag was registered
    pub fn remove_tag(&self, tag: &str) -> bool {
        self.remove(RouteKind::Tag, tag)
    }

    /// Returns whether the domain was registered
    pub fn remove_domain(&self, domain: &str) -> bool {
        self.remove(RouteKind::Domain, domain)
    }

    fn remove(&self, kind: RouteKind, affix: &str) -> bool {
        let mut routes = self.shared.routes.write().unwrap_or_else(PoisonError::into_inner);
        let removed = routes.remove(kind, affix);
        if removed {
            log::info!(target: self.target(), "No longer listening on {} '{}'", kind, affix);
        }
        removed
    }

    pub fn tags(&self) -> Vec<String> {
        self.routes_of(RouteKind::Tag)
    }

    pub fn domains(&self) -> Vec<String> {
        self.routes_of(RouteKind::Domain)
    }

    fn routes_of(&self, kind: RouteKind) -> Vec<String> {
        self.shared
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .affixes(kind)
    }

    /// Answer one question without any networking.
    ///
    /// `Ok(None)` means the name isn't ours.
    pub fn handle_question(&self, question: &Question) -> Result<Option<Vec<Record>>, TunnelError> {
        self.shared.handle_question(question)
    }

    /// Bind the socket and start answering
    pub async fn start(&self) -> Result<(), TunnelError> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Err(TunnelError::Lifecycle("DNS tunnel is already running".to_string()));
        }

        log::info!(target: self.target(), "Starting DNS tunnel driver on {}:{}", self.host, self.port);

        let socket = UdpSocket::bind((self.host.as_str(), self.port)).await?;
        let local_addr = socket.local_addr()?;
        let (shutdown, shutdown_rx) = oneshot::channel();

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(transport::serve(Arc::new(socket), shutdown_rx, move |tx| {
            let shared = Arc::clone(&shared);
            async move { shared.handle_transaction(tx).await }
        }));

        *listener = Some(Listener {
            shutdown,
            task,
            local_addr,
        });
        self.running.send_replace(true);

        log::info!(target: self.target(), "Listening on {}", local_addr);
        Ok(())
    }

    /// Shut the listener down and wait for it to exit. Questions already being
    /// handled are allowed to finish.
    ///
    /// The lifecycle lock is held until the socket is released, so a
    /// concurrent `start` sees either the old listener or a free port.
    pub async fn stop(&self) -> Result<(), TunnelError> {
        let mut guard = self.listener.lock().await;
        let listener = guard.take().ok_or_else(not_running)?;
        log::info!(target: self.target(), "Stopping DNS tunnel driver");

        // The loop also exits if the receiver is gone, so a failed send is fine
        let _ = listener.shutdown.send(());
        if let Err(e) = listener.task.await {
            log::warn!(target: self.target(), "DNS listener ended badly: {}", e);
        }

        self.running.send_replace(false);
        Ok(())
    }

    /// Abort the listener without waiting for anything
    pub async fn kill(&self) -> Result<(), TunnelError> {
        let mut guard = self.listener.lock().await;
        let listener = guard.take().ok_or_else(not_running)?;
        log::info!(target: self.target(), "Killing DNS tunnel driver");

        listener.task.abort();
        let _ = listener.task.await;

        self.running.send_replace(false);
        Ok(())
    }

    /// Resolve once the driver is stopped (immediately if it isn't running)
    pub async fn wait(&self) {
        let mut running = self.running.subscribe();
        let _ = running.wait_for(|running| !*running).await;
    }

    pub async fn is_running(&self) -> bool {
        self.listener.lock().await.is_some()
    }

    /// Address the listener is bound to, while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(|l| l.local_addr)
    }
}

fn not_running() -> TunnelError {
    TunnelError::Lifecycle("DNS tunnel isn't running".to_string())
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.task.abort();
        }
    }
}
