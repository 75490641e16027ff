//! Device discovery accumulator
//!
//! Collects the devices reported during one discovery pass and hands the
//! finished set to the UI exactly once.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::sync::{EventBus, SessionEvent};

/// A device reported during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundDevice {
    pub name: String,
    pub address: String,
    /// Already paired with this device
    pub known: bool,
}

/// Result of a finished discovery pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub devices: Vec<FoundDevice>,
    /// The pass was started by a remote request rather than by the local user
    pub remote_initiated: bool,
}

#[derive(Debug)]
struct DiscoveryPass {
    remote_initiated: bool,
    devices: Vec<FoundDevice>,
}

pub struct DiscoveryAccumulator {
    /// Devices already paired with us, as (name, address)
    paired: Vec<(String, String)>,
    pass: Option<DiscoveryPass>,
    events: EventBus,
}

impl DiscoveryAccumulator {
    pub fn new(events: EventBus) -> Self {
        Self {
            paired: Vec::new(),
            pass: None,
            events,
        }
    }

    /// Replace the known paired devices
    pub fn set_paired_devices(&mut self, paired: Vec<(String, String)>) {
        self.paired = paired;
    }

    /// Begin a pass, dropping anything left from a previous one
    pub fn start(&mut self, remote_initiated: bool) {
        info!("Discovery started (remote: {})", remote_initiated);
        self.pass = Some(DiscoveryPass {
            remote_initiated,
            devices: Vec::new(),
        });
    }

    pub fn found(&mut self, name: &str, address: &str) {
        let Some(pass) = self.pass.as_mut() else {
            warn!("Device {} ({}) found outside a discovery pass", name, address);
            return;
        };

        // Paired devices are reported with their paired identity
        let device = match self
            .paired
            .iter()
            .find(|(_, paired_address)| paired_address.eq_ignore_ascii_case(address))
        {
            Some((paired_name, paired_address)) => FoundDevice {
                name: paired_name.clone(),
                address: paired_address.clone(),
                known: true,
            },
            None => FoundDevice {
                name: name.to_string(),
                address: address.to_string(),
                known: false,
            },
        };

        if pass
            .devices
            .iter()
            .any(|d| d.address.eq_ignore_ascii_case(&device.address))
        {
            debug!("Device {} already reported in this pass", device.address);
            return;
        }

        debug!("Device found: {} ({}), known: {}", device.name, device.address, device.known);
        pass.devices.push(device);
    }

    /// End the pass and publish its devices. Returns None if no pass is open,
    /// so a second call publishes nothing.
    pub fn finish(&mut self) -> Option<DiscoveryReport> {
        let pass = self.pass.take()?;
        info!("Discovery finished: {} devices", pass.devices.len());

        let report = DiscoveryReport {
            devices: pass.devices,
            remote_initiated: pass.remote_initiated,
        };
        self.events.publish(SessionEvent::DiscoveryFinished {
            devices: report.devices.clone(),
            remote_initiated: report.remote_initiated,
        });
        Some(report)
    }

    pub fn is_discovering(&self) -> bool {
        self.pass.is_some()
    }
}
