// Sentinel Center - Zone Reconciler
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Keeps the firewall zone in line with the network the machine is on.
//!
//! Each known network is mapped to a trusted or untrusted bucket. When the
//! active network changes, the bucket's zone is applied. A network seen
//! for the first time is put to the user through a [`ZonePrompt`]; the
//! poll thread blocks on the answer so no second prompt can stack up.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::NetworkIdentitySource;
use crate::firewall::{BackendKind, FirewallFacade};
use crate::models::{Zone, ZoneBucket};

/// Asks the user how much to trust a network.
pub trait ZonePrompt: Send + Sync {
    /// The chosen bucket, or `None` if the question was dismissed.
    fn ask(&self, network: &str) -> Option<ZoneBucket>;
}

/// Published after a zone was actually changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneEvent {
    Changed { network: String, zone: Zone },
}

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No active zone daemon.
    Skipped,
    /// The active network could not be named.
    NoNetwork,
    /// Same network as the previous poll.
    Unchanged,
    /// The live zone already matched.
    AlreadyInZone(Zone),
    Applied(Zone),
    ApplyFailed(Zone),
    /// The user closed the prompt without choosing.
    Dismissed,
}

/// Polls the network identity and applies zones.
pub struct ZoneReconciler {
    facade: Arc<FirewallFacade>,
    identity: Arc<dyn NetworkIdentitySource>,
    prompt: Arc<dyn ZonePrompt>,
    events: broadcast::Sender<ZoneEvent>,
    last_network: Mutex<Option<String>>,
}

impl ZoneReconciler {
    pub fn new(
        facade: Arc<FirewallFacade>,
        identity: Arc<dyn NetworkIdentitySource>,
        prompt: Arc<dyn ZonePrompt>,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            facade,
            identity,
            prompt,
            events,
            last_network: Mutex::new(None),
        }
    }

    /// Subscribe to zone change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ZoneEvent> {
        self.events.subscribe()
    }

    /// Run one reconciliation step.
    pub fn poll_once(&self) -> ReconcileOutcome {
        let status = self.facade.detect();
        if status.kind != BackendKind::ZoneDaemon || !status.active {
            return ReconcileOutcome::Skipped;
        }

        let Some(network) = self.identity.current() else {
            return ReconcileOutcome::NoNetwork;
        };

        {
            let mut last = match self.last_network.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if last.as_deref() == Some(network.as_str()) {
                return ReconcileOutcome::Unchanged;
            }
            *last = Some(network.clone());
        }

        info!("Active network is now {:?}", network);
        let store = self.facade.store();

        let bucket = match store.network_bucket(&network) {
            Some(bucket) => bucket,
            None => {
                debug!("Unknown network {:?}, asking", network);
                let Some(bucket) = self.prompt.ask(&network) else {
                    info!("Zone prompt for {:?} dismissed", network);
                    return ReconcileOutcome::Dismissed;
                };
                if !store.set_network_bucket(&network, bucket) {
                    warn!("Could not remember the zone for {:?}", network);
                }
                bucket
            }
        };

        self.apply(&network, bucket.zone())
    }

    fn apply(&self, network: &str, zone: Zone) -> ReconcileOutcome {
        if self.facade.active_zone().as_ref() == Some(&zone) {
            debug!("{:?} already in zone {}", network, zone);
            return ReconcileOutcome::AlreadyInZone(zone);
        }

        if !self.facade.set_active_zone(&zone) {
            warn!("Failed to switch {:?} to zone {}", network, zone);
            return ReconcileOutcome::ApplyFailed(zone);
        }

        info!("Switched {:?} to zone {}", network, zone);
        let _ = self.events.send(ZoneEvent::Changed {
            network: network.to_string(),
            zone: zone.clone(),
        });
        ReconcileOutcome::Applied(zone)
    }

    /// Poll on a background thread every `interval` until stopped.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> ReconcilerHandle {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("zone-reconciler".into())
            .spawn(move || loop {
                let outcome = self.poll_once();
                debug!("Zone poll: {:?}", outcome);

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match thread {
            Ok(thread) => ReconcilerHandle {
                stop: Some(stop_tx),
                thread: Some(thread),
            },
            Err(e) => {
                warn!("Failed to start zone reconciler: {}", e);
                ReconcilerHandle {
                    stop: None,
                    thread: None,
                }
            }
        }
    }
}

/// Running reconciler. Dropping it stops the thread.
pub struct ReconcilerHandle {
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop polling and wait for the thread. A prompt in progress is
    /// answered first.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Zone reconciler thread panicked");
            }
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
