//! Redial bookkeeping for offline peers.
//!
//! The dialer is a passive schedule: the owning supervisor asks for
//! the next deadline, sleeps on its timer, and calls `tick`, which
//! emits the contact diffs for every peer whose turn has come. Peers
//! with known uris get a dial request; uri-less peers get handed to
//! the discovery collaborators once the cluster is announced.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bep_model::diff::ClusterDiff;
use bep_model::{Cluster, ConnectionState};
use bep_util::device::DeviceId;

const DEFAULT_REDIAL_TIMEOUT_MS: u64 = 60_000;

#[derive(Copy, Clone, Debug)]
pub struct DialerConfig {
    pub enabled: bool,
    pub redial_timeout: Duration,
}

impl Default for DialerConfig {
    fn default() -> DialerConfig {
        DialerConfig {
            enabled: true,
            redial_timeout: Duration::from_millis(DEFAULT_REDIAL_TIMEOUT_MS),
        }
    }
}

/// Tracks, per peer, when the next connection attempt is due.
pub struct Dialer {
    config: DialerConfig,
    schedule: HashMap<DeviceId, Instant>,
    announced: bool,
}

impl Dialer {
    pub fn new(config: DialerConfig) -> Dialer {
        Dialer {
            config,
            schedule: HashMap::new(),
            announced: false,
        }
    }

    /// Schedule an immediate attempt for every known remote peer.
    pub fn on_started(&mut self, cluster: &Cluster, now: Instant) {
        if !self.config.enabled {
            return;
        }

        let local_id = cluster.local_id();
        for device in cluster.devices.values() {
            if device.id != local_id {
                self.schedule.insert(device.id, now);
            }
        }
    }

    /// Record whether the cluster has been announced to discovery.
    pub fn set_announced(&mut self, announced: bool) {
        self.announced = announced;
    }

    /// React to a peer connection state change.
    pub fn on_peer_state(&mut self, device: &DeviceId, state: ConnectionState, now: Instant) {
        if !self.config.enabled {
            return;
        }

        match state {
            ConnectionState::Online => {
                self.schedule.remove(device);
            }
            ConnectionState::Offline => {
                self.schedule
                    .insert(*device, now + self.config.redial_timeout);
            }
            _ => (),
        }
    }

    /// Drop every timer belonging to a removed peer.
    pub fn on_peer_removed(&mut self, device: &DeviceId) {
        self.schedule.remove(device);
    }

    /// The soonest pending attempt, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.schedule.values().min().cloned()
    }

    /// Emit contact diffs for every peer whose attempt is due, and
    /// rearm their timers.
    pub fn tick(&mut self, cluster: &Cluster, now: Instant) -> Vec<ClusterDiff> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut due: Vec<DeviceId> = self
            .schedule
            .iter()
            .filter(|&(_, deadline)| *deadline <= now)
            .map(|(device, _)| *device)
            .collect();
        due.sort();

        let mut diffs = Vec::new();
        for device_id in due {
            self.schedule
                .insert(device_id, now + self.config.redial_timeout);

            let device = match cluster.device(&device_id) {
                Some(device) => device,
                None => {
                    self.schedule.remove(&device_id);
                    continue;
                }
            };

            let dialable = match device.state {
                ConnectionState::Offline | ConnectionState::Unknown => true,
                _ => false,
            };
            if !dialable {
                continue;
            }

            if !device.uris().is_empty() {
                debug!("redialing {:?}", device_id);
                diffs.push(ClusterDiff::DialRequest { device: device_id });
            } else if self.announced {
                debug!("asking discovery about {:?}", device_id);
                diffs.push(ClusterDiff::DiscoveryNotification { device: device_id });
            }
        }

        diffs
    }
}
