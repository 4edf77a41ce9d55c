// BlueShare Device Registry
// Insertion-ordered registry of devices admitted to a BlueShare session

//! # Device Registry
//!
//! Tracks the devices admitted to a session. Enumeration order is
//! insertion (admission) order and is stable for the lifetime of the
//! session — cost allocation's stable-sum invariant depends on it.
//!
//! Peer relationships (used by the mesh topology) are plain adjacency:
//! an index-based list of `device_id`s, never an owning reference, per
//! the "linked device lists / peers array" design note.

use std::collections::HashMap;

use blueshare_consensus::TrinarySymbol;
use blueshare_payment::PaymentState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceRole {
    Host,
    Client,
    Relay,
    Observer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub display_name: String,
    pub role: DeviceRole,
    pub rssi: i16,
    pub mtu: u16,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub bandwidth_mbps: f64,
    pub cost_per_mb: f64,
    pub balance: f64,
    pub payment_state: PaymentState,
    pub consent: TrinarySymbol,
    pub peers: Vec<String>,
    pub last_seen: u64,
}

impl Device {
    pub fn new(
        device_id: impl Into<String>,
        display_name: impl Into<String>,
        role: DeviceRole,
        rssi: i16,
        consent: TrinarySymbol,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            display_name: display_name.into(),
            role,
            rssi,
            mtu: 0,
            bytes_sent: 0,
            bytes_received: 0,
            bandwidth_mbps: 0.0,
            cost_per_mb: 0.0,
            balance: 0.0,
            payment_state: PaymentState::Pending,
            consent,
            peers: Vec::new(),
            last_seen: 0,
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("device {0} is already registered in this session")]
    DuplicateDevice(String),
    #[error("device {0} not found")]
    DeviceNotFound(String),
}

/// Insertion-ordered association from `device_id` to [`Device`].
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    order: Vec<String>,
    devices: HashMap<String, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `device`. Rejects a `device_id` already present (invariant C4).
    pub fn insert(&mut self, device: Device) -> Result<(), RegistryError> {
        if self.devices.contains_key(&device.device_id) {
            return Err(RegistryError::DuplicateDevice(device.device_id));
        }
        self.order.push(device.device_id.clone());
        self.devices.insert(device.device_id.clone(), device);
        Ok(())
    }

    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn get_mut(&mut self, device_id: &str) -> Option<&mut Device> {
        self.devices.get_mut(device_id)
    }

    pub fn remove(&mut self, device_id: &str) -> Result<Device, RegistryError> {
        let device = self
            .devices
            .remove(device_id)
            .ok_or_else(|| RegistryError::DeviceNotFound(device_id.to_string()))?;
        self.order.retain(|id| id != device_id);
        Ok(device)
    }

    /// Iterate devices in admission order — stable across a session.
    pub fn iter_in_order(&self) -> impl Iterator<Item = &Device> {
        self.order.iter().map(move |id| &self.devices[id])
    }

    pub fn device_count(&self) -> usize {
        self.order.len()
    }

    pub fn host_count(&self) -> usize {
        self.iter_in_order()
            .filter(|d| d.role == DeviceRole::Host)
            .count()
    }

    pub fn total_host_bandwidth_mbps(&self) -> f64 {
        self.iter_in_order()
            .filter(|d| d.role == DeviceRole::Host)
            .map(|d| d.bandwidth_mbps)
            .sum()
    }

    /// Record a bidirectional adjacency between two already-admitted
    /// devices (mesh topology). Index-based — no owning references.
    pub fn link_peers(&mut self, a: &str, b: &str) -> Result<(), RegistryError> {
        if !self.devices.contains_key(a) {
            return Err(RegistryError::DeviceNotFound(a.to_string()));
        }
        if !self.devices.contains_key(b) {
            return Err(RegistryError::DeviceNotFound(b.to_string()));
        }
        self.devices.get_mut(a).unwrap().peers.push(b.to_string());
        self.devices.get_mut(b).unwrap().peers.push(a.to_string());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.devices.clear();
    }
}
