use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use crate::devices::{DeviceView, DiscoveredDevice, HostedDevice};
use crate::identifier::{Identifier, ROOTDEVICE};
use crate::ssdp::Announcement;
use crate::tasks::TaskQueue;

/// Session counters wrap at 2^24.
pub const COUNTER_MODULO: u32 = 1 << 24;

pub(crate) fn next_counter(value: u32) -> u32 {
    (value + 1) % COUNTER_MODULO
}

/// Registry entry of one USN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsnEntry {
    pub identifier: Identifier,
    pub ips: Vec<IpAddr>,
    pub ssdp_server_name: Option<String>,
    pub http_client_name: Option<String>,
    pub url_desc: Option<String>,
    pub url_desc_read: bool,
    pub bootid: Option<u32>,
    pub max_age: u32,
    pub managed: bool,
}

impl UsnEntry {
    pub(crate) fn add_ip(&mut self, ip: IpAddr) {
        if !self.ips.contains(&ip) {
            self.ips.push(ip);
        }
    }
}

/// Scheduled work of the control point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Expiry of a discovered USN
    Delete { usn: String },
    /// SSDP announcement or search result to send
    DeliverEvent(Announcement),
    /// Fetch every queued description
    ReadUpnpDescs,
    /// Purge every USN of a vanished root device
    RemoveRootdevice { device: String },
    /// Periodic `ssdp:alive` of the hosted devices
    Reannounce,
}

#[derive(Default)]
pub(crate) struct CpState {
    pub usns: HashMap<String, UsnEntry>,
    /// device key -> root hosted device containing it
    pub managed_devices: HashMap<String, Arc<HostedDevice>>,
    /// device key -> USNs sharing it
    pub devices: HashMap<String, Vec<String>>,
    pub rootdevices: HashSet<String>,
    pub tasks: TaskQueue<Task>,
    pub bootid: u32,
    pub configid: u32,
    /// description URL -> USNs waiting for it
    pub upnp_desc_unread: HashMap<String, Vec<String>>,
    /// description URL -> parsed device
    pub remote_devices: HashMap<String, Arc<DiscoveredDevice>>,
    /// Hosts seen sending searches
    pub searchers: HashSet<IpAddr>,
}

impl CpState {
    pub fn insert_usn(&mut self, entry: UsnEntry) {
        let usn = entry.identifier.usn.clone();
        let device = entry.identifier.device.clone();
        if entry.identifier.is_rootdevice() {
            self.rootdevices.insert(device.clone());
        }
        let usns = self.devices.entry(device).or_default();
        if !usns.contains(&usn) {
            usns.push(usn.clone());
        }
        self.usns.insert(usn, entry);
    }

    /// Removes one USN and its back references.
    pub fn remove_usn(&mut self, usn: &str) -> Option<UsnEntry> {
        let entry = self.usns.remove(usn)?;
        let device = &entry.identifier.device;
        if let Some(usns) = self.devices.get_mut(device) {
            usns.retain(|u| u != usn);
            if usns.is_empty() {
                self.devices.remove(device);
                self.rootdevices.remove(device);
            }
        }
        self.tasks
            .remove_where(|t| matches!(t, Task::Delete { usn: u } if u == usn));
        for usns in self.upnp_desc_unread.values_mut() {
            usns.retain(|u| u != usn);
        }
        self.upnp_desc_unread.retain(|_, usns| !usns.is_empty());
        if let Some(url) = &entry.url_desc
            && !self
                .usns
                .values()
                .any(|e| e.url_desc.as_deref() == Some(url.as_str()))
        {
            self.remote_devices.remove(url);
        }
        Some(entry)
    }

    pub fn is_managed(&self, device: &str) -> bool {
        self.managed_devices.contains_key(device)
    }

    /// Distinct hosted root devices.
    pub fn managed_roots(&self) -> Vec<Arc<HostedDevice>> {
        let mut roots: Vec<Arc<HostedDevice>> = Vec::new();
        for root in self.managed_devices.values() {
            if !roots.iter().any(|r| Arc::ptr_eq(r, root)) {
                roots.push(root.clone());
            }
        }
        roots.sort_by(|a, b| a.udn().cmp(b.udn()));
        roots
    }

    /// Remote device described at the URL of `device`'s USNs.
    pub fn remote_device(&self, device: &str) -> Option<Arc<DiscoveredDevice>> {
        self.devices.get(device)?.iter().find_map(|usn| {
            let url = self.usns.get(usn)?.url_desc.as_ref()?;
            self.remote_devices.get(url).cloned()
        })
    }
}

/// `(NT, USN)` pairs announced for one hosted device.
///
/// The root device adds its `upnp:rootdevice` alias; service types are
/// announced once each.
pub(crate) fn device_notifications(device: &HostedDevice, is_root: bool) -> Vec<(String, String)> {
    let udn = device.udn();
    let mut notifications = Vec::new();
    if is_root {
        notifications.push((
            ROOTDEVICE.to_string(),
            Identifier::rootdevice_usn(udn),
        ));
    }
    notifications.push((format!("uuid:{}", udn), Identifier::build_usn(udn, None)));
    let device_type = device.device_type();
    notifications.push((
        device_type.clone(),
        Identifier::build_usn(udn, Some(device_type.as_str())),
    ));
    for service_type in device.unique_service_types() {
        let usn = Identifier::build_usn(udn, Some(service_type.as_str()));
        notifications.push((service_type, usn));
    }
    notifications
}

/// Notifications of a whole hosted tree, grouped per device.
pub(crate) fn tree_notifications(root: &HostedDevice) -> Vec<Vec<(String, String)>> {
    root.all_devices()
        .into_iter()
        .enumerate()
        .map(|(i, device)| device_notifications(device, i == 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceInfo;
    use crate::identifier::get_identifier;
    use crate::services::ServiceBuilder;

    fn entry(usn: &str) -> UsnEntry {
        UsnEntry {
            identifier: get_identifier(usn, None, None).unwrap(),
            ips: Vec::new(),
            ssdp_server_name: None,
            http_client_name: None,
            url_desc: Some("http://h/desc".to_string()),
            url_desc_read: false,
            bootid: None,
            max_age: 1800,
            managed: false,
        }
    }

    #[test]
    fn test_counters_wrap() {
        assert_eq!(next_counter(0), 1);
        assert_eq!(next_counter(COUNTER_MODULO - 1), 0);
    }

    #[test]
    fn test_insert_and_remove_keep_indexes() {
        let mut state = CpState::default();
        state.insert_usn(entry("uuid:AB-CD::upnp:rootdevice"));
        state.insert_usn(entry("uuid:ab-cd"));
        assert!(state.rootdevices.contains("abcd"));
        assert_eq!(state.devices["abcd"].len(), 2);

        state.remove_usn("uuid:AB-CD::upnp:rootdevice").unwrap();
        assert_eq!(state.devices["abcd"], vec!["uuid:ab-cd".to_string()]);
        state.remove_usn("uuid:ab-cd").unwrap();
        assert!(state.devices.is_empty());
        assert!(state.rootdevices.is_empty());
        assert!(state.remove_usn("uuid:ab-cd").is_none());
    }

    #[test]
    fn test_device_notifications() {
        let mut device = HostedDevice::new("MediaServer", 1, DeviceInfo::default())
            .unwrap()
            .with_udn("u1");
        for id in ["A", "B"] {
            device
                .add_service(
                    ServiceBuilder::new("urn:schemas-upnp-org:service:Same:1", id)
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        let notifications = device_notifications(&device, true);
        let nts: Vec<&str> = notifications.iter().map(|(nt, _)| nt.as_str()).collect();
        assert_eq!(
            nts,
            vec![
                "upnp:rootdevice",
                "uuid:u1",
                "urn:schemas-upnp-org:device:MediaServer:1",
                "urn:schemas-upnp-org:service:Same:1",
            ]
        );
        assert_eq!(notifications[0].1, "uuid:u1::upnp:rootdevice");
        assert_eq!(device_notifications(&device, false).len(), 3);
    }
}
