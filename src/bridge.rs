//! The control loop: graph notifications, realtime issue reports and the
//! periodic device scan, all handled on one thread.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, select};

use crate::{
    adapter::GraphClientAdapter,
    aliases::PortAliases,
    config::BridgeConfig,
    device::DeviceTransport,
    error::Result,
    graph::{Flow, GraphNotification, GraphSession},
    jack_session::{JackPortHandle, JackSession},
    midi::MidirTransport,
    monitor::{DeviceMonitor, ScanSummary},
    router::{BridgeCore, BridgeProcessor, RouteTable, RtIssue},
};

pub type JackBridge = Bridge<JackSession<BridgeProcessor<JackPortHandle>>>;

/// Queues feeding the control loop.
pub struct BridgeChannels {
    pub notifications: Receiver<GraphNotification>,
    pub issues: Receiver<RtIssue>,
}

pub struct Bridge<S: GraphSession> {
    // dropped first: devices close while the graph session is still up
    core: BridgeCore<S::Port>,
    adapter: GraphClientAdapter<S>,
    monitor: DeviceMonitor,
    transport: Arc<dyn DeviceTransport>,
    channels: BridgeChannels,
    scan_interval: Duration,
}

impl<S: GraphSession> Bridge<S> {
    pub fn new(
        session: S,
        transport: Arc<dyn DeviceTransport>,
        aliases: Arc<PortAliases>,
        config: &BridgeConfig,
        routes: Arc<RouteTable<S::Port>>,
        channels: BridgeChannels,
    ) -> Self {
        let core = BridgeCore::new(
            transport.clone(),
            aliases.clone(),
            config.naming.clone(),
            config.fix_pitch_bend,
            routes,
        );
        Self {
            core,
            adapter: GraphClientAdapter::new(session),
            monitor: DeviceMonitor::new(config, aliases),
            transport,
            channels,
            scan_interval: config.scan_interval,
        }
    }

    pub fn graph(&self) -> &GraphClientAdapter<S> {
        &self.adapter
    }

    pub fn core(&self) -> &BridgeCore<S::Port> {
        &self.core
    }

    /// Runs until the graph shuts us down or the notification channel closes.
    pub fn run(&mut self) -> Result<()> {
        self.scan();
        let mut next_scan = Instant::now() + self.scan_interval;

        loop {
            select! {
                recv(self.channels.notifications) -> msg => match msg {
                    Ok(GraphNotification::Shutdown(reason)) => {
                        log::info!("shutting down: {reason}");
                        break;
                    }
                    Ok(notification) => self.handle(notification),
                    Err(_) => {
                        log::warn!("graph notification channel closed");
                        break;
                    }
                },
                recv(self.channels.issues) -> issue => {
                    if let Ok(issue) = issue {
                        log::warn!("{issue}");
                    }
                },
                recv(crossbeam_channel::at(next_scan)) -> _ => {
                    self.scan();
                    next_scan = Instant::now() + self.scan_interval;
                },
            }
        }
        Ok(())
    }

    pub fn handle(&mut self, notification: GraphNotification) {
        self.adapter.dispatch(notification, &mut self.core);
    }

    /// One device scan; failures are logged and retried next time.
    pub fn scan(&mut self) -> Option<ScanSummary> {
        let core = &mut self.core;
        let scanned = self.monitor.scan(&*self.transport, &mut self.adapter, &mut |flow: Flow, port: &str| {
            core.device_vanished(flow, port)
        });
        match scanned {
            Ok(summary) => {
                if !summary.is_quiet() {
                    log::debug!("scan: {summary:?}");
                }
                Some(summary)
            }
            Err(e) => {
                log::warn!("device scan failed: {e:#}");
                None
            }
        }
    }

    /// Logs every pending realtime issue.
    pub fn drain_issues(&self) -> usize {
        let mut count = 0;
        for issue in self.channels.issues.try_iter() {
            log::warn!("{issue}");
            count += 1;
        }
        count
    }
}

impl JackBridge {
    /// Brings up the JACK client and the midir transport. Returns the bridge
    /// and a sender that stops it.
    pub fn start(config: &BridgeConfig, aliases: PortAliases) -> Result<(Self, Sender<GraphNotification>)> {
        let routes = RouteTable::new();
        let (processor, issues) = BridgeProcessor::new(routes.clone());
        let (tx, notifications) = crossbeam_channel::unbounded();
        let session = JackSession::activate(&config.client_name, processor, tx.clone())?;
        let transport: Arc<dyn DeviceTransport> = Arc::new(MidirTransport::new(&config.client_name));

        let bridge = Bridge::new(
            session,
            transport,
            Arc::new(aliases),
            config,
            routes,
            BridgeChannels { notifications, issues },
        );
        Ok((bridge, tx))
    }
}
