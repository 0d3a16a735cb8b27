//! NodePort pool
//!
//! Hands out the NodePort mappings a cluster was created with to concurrent
//! test cases, one holder per mapping at a time.

use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::config::NodePort;
use crate::error::{Error, Result};

#[derive(Debug)]
struct Slot {
    port: NodePort,
    in_use: bool,
}

/// Fixed set of NodePort mappings with exclusive allocation
#[derive(Debug)]
pub struct NodePortPool {
    slots: Mutex<Vec<Slot>>,
}

impl NodePortPool {
    pub fn new(ports: impl IntoIterator<Item = NodePort>) -> Self {
        let slots = ports
            .into_iter()
            .map(|port| Slot {
                port,
                in_use: false,
            })
            .collect();

        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Pool of `count` mappings where node and host port are equal,
    /// starting at `first`
    ///
    /// Fails when the range would include port 0 or run past 65535.
    pub fn sequential(first: u16, count: u16) -> Result<Self> {
        if first == 0 {
            return Err(Error::InvalidConfig(
                "node port range must not start at 0".to_string(),
            ));
        }

        let end = u32::from(first) + u32::from(count);
        if end > u32::from(u16::MAX) + 1 {
            return Err(Error::InvalidConfig(format!(
                "node port range {first}+{count} exceeds port 65535"
            )));
        }

        Ok(Self::new(
            (0..count).map(|offset| NodePort::new(first + offset, first + offset)),
        ))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        // a panicking holder cannot leave a slot half-updated
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the first free mapping, `None` when all are held
    pub fn allocate_port(&self) -> Option<NodePort> {
        let mut slots = self.lock();
        let slot = slots.iter_mut().find(|s| !s.in_use)?;
        slot.in_use = true;
        debug!("Allocated node port {}", slot.port);
        Some(slot.port)
    }

    /// Return a mapping; false if it was not held
    pub fn release_port(&self, port: NodePort) -> bool {
        let mut slots = self.lock();
        match slots.iter_mut().find(|s| s.port == port && s.in_use) {
            Some(slot) => {
                slot.in_use = false;
                debug!("Released node port {}", port);
                true
            }
            None => false,
        }
    }

    /// All mappings, in pool order, for the cluster options
    pub fn node_ports(&self) -> Vec<NodePort> {
        self.lock().iter().map(|s| s.port).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mappings currently free
    pub fn available(&self) -> usize {
        self.lock().iter().filter(|s| !s.in_use).count()
    }
}
