//! SSDP side of the control point: registry updates, deletions, description
//! fetches and answers to searches.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::MutexGuard;
use rand::Rng;
use serde_json::json;
use tracing::{debug, info, trace, warn};

use super::registry::{CpState, Task, UsnEntry, tree_notifications};
use super::ControlPoint;
use crate::devices::{DeviceView, DiscoveredDevice};
use crate::hooks::{DEVICE_ADDED, DEVICE_REMOVED};
use crate::identifier::{Identifier, ROOTDEVICE, device_key, get_identifier, parse_urn};
use crate::ssdp::{
    Announcement, AnnouncementKind, MX_MAX, SSDP_ALL, SSDP_DISCOVER, SsdpMessage,
};

/// Delay before fetching queued descriptions, so that the burst of
/// notifications sent by a device is fetched in one request.
const DESC_READ_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notice {
    Alive,
    Update,
    SearchResponse,
}

struct Sighting<'a> {
    notice: Notice,
    location: &'a str,
    max_age: u32,
    server: Option<&'a str>,
    next_bootid: Option<u32>,
    from: SocketAddr,
}

/// True if a search for `st` is answered by a notification of type `nt`.
///
/// A versioned `urn:` target also matches any higher version of the same
/// type.
pub(crate) fn search_matches(st: &str, nt: &str) -> bool {
    if st.eq_ignore_ascii_case(SSDP_ALL) || st.eq_ignore_ascii_case(nt) {
        return true;
    }
    match (parse_urn(st), parse_urn(nt)) {
        (Some(wanted), Some(ours)) => {
            wanted.domain.eq_ignore_ascii_case(ours.domain)
                && wanted.class.eq_ignore_ascii_case(ours.class)
                && wanted.type_.eq_ignore_ascii_case(ours.type_)
                && match (wanted.version_number(), ours.version_number()) {
                    (Some(wanted), Some(ours)) => ours >= wanted,
                    _ => false,
                }
        }
        _ => false,
    }
}

/// UDNs of a discovered tree, root first.
fn tree_udns(device: &DiscoveredDevice) -> Vec<String> {
    let mut udns = vec![device.udn().to_string()];
    for embedded in device.embedded_devices() {
        udns.extend(tree_udns(embedded));
    }
    udns
}

impl ControlPoint {
    /// Entry point of every SSDP frame received by a listener.
    pub fn handle_ssdp_message(&self, message: SsdpMessage, from: SocketAddr) {
        if message.is_search() {
            self.handle_search(&message, from);
            return;
        }

        let notice = if message.is_response() {
            Notice::SearchResponse
        } else {
            match message.nts().map(|n| n.trim().to_ascii_lowercase()).as_deref() {
                Some("ssdp:alive") => Notice::Alive,
                Some("ssdp:update") => Notice::Update,
                Some("ssdp:byebye") => {
                    if let Some(usn) = message.usn() {
                        self.handle_byebye(usn);
                    }
                    return;
                }
                other => {
                    trace!("SSDP: ignoring NOTIFY with NTS {:?} from {}", other, from);
                    return;
                }
            }
        };

        let Some(identifier) = message
            .usn()
            .and_then(|usn| get_identifier(usn, message.bootid(), message.configid()))
        else {
            trace!("SSDP: missing or invalid USN from {}", from);
            return;
        };
        let Some(location) = message.location() else {
            trace!(usn = %identifier.usn, "SSDP: no LOCATION from {}", from);
            return;
        };

        self.update(
            identifier,
            Sighting {
                notice,
                location,
                max_age: message.max_age(),
                server: message.server(),
                next_bootid: message.next_bootid(),
                from,
            },
        );
    }

    fn handle_byebye(&self, usn: &str) {
        let managed = match get_identifier(usn, None, None) {
            Some(identifier) => self.state.lock().is_managed(&identifier.device),
            None => return,
        };
        if managed {
            trace!(usn = %usn, "SSDP: ignoring byebye for a hosted device");
            return;
        }
        debug!(usn = %usn, "📥 byebye");
        self.delete(usn);
    }

    /// Merges a sighting of a discovered USN into the registry.
    fn update(&self, identifier: Identifier, sighting: Sighting<'_>) {
        let usn = identifier.usn.clone();
        let location = sighting.location.to_string();
        let ip = sighting.from.ip();
        let now = Instant::now();

        let mut state = self.state.lock();
        if state.is_managed(&identifier.device) {
            trace!(usn = %usn, "SSDP: own announcement ignored");
            return;
        }

        let mut stale = false;
        let needs_read = match state.usns.get_mut(&usn) {
            Some(entry) => {
                entry.add_ip(ip);
                if let Some(server) = sighting.server {
                    entry.ssdp_server_name = Some(server.to_string());
                }
                entry.max_age = sighting.max_age;
                if entry.url_desc.as_deref() != Some(location.as_str()) {
                    entry.url_desc = Some(location.clone());
                    entry.url_desc_read = false;
                }

                if sighting.notice == Notice::Update {
                    match (entry.bootid, identifier.bootid, sighting.next_bootid) {
                        (Some(known), Some(current), Some(next)) if known == current => {
                            entry.bootid = Some(next);
                        }
                        (_, current, next) => {
                            entry.bootid = next.or(current);
                            stale = true;
                        }
                    }
                } else if let Some(bootid) = identifier.bootid {
                    if entry.bootid.is_some_and(|known| known != bootid) {
                        stale = true;
                    }
                    entry.bootid = Some(bootid);
                }

                if let Some(configid) = identifier.configid {
                    if entry.identifier.configid.is_some_and(|known| known != configid) {
                        stale = true;
                    }
                    entry.identifier.configid = Some(configid);
                }
                entry.identifier.bootid = entry.bootid;

                if stale {
                    entry.url_desc_read = false;
                }
                debug!(usn = %usn, "SSDP: USN refreshed");
                !entry.url_desc_read
            }
            None => {
                let bootid = match sighting.notice {
                    Notice::Update => sighting.next_bootid.or(identifier.bootid),
                    _ => identifier.bootid,
                };
                info!(usn = %usn, "📥 new USN at {}", location);
                state.insert_usn(UsnEntry {
                    identifier: identifier.clone(),
                    ips: vec![ip],
                    ssdp_server_name: sighting.server.map(str::to_string),
                    http_client_name: None,
                    url_desc: Some(location.clone()),
                    url_desc_read: false,
                    bootid,
                    max_age: sighting.max_age,
                    managed: false,
                });
                true
            }
        };

        state
            .tasks
            .remove_where(|t| matches!(t, Task::Delete { usn: u } if *u == usn));
        let mut head = state.tasks.add(
            now + Duration::from_secs(sighting.max_age as u64),
            Task::Delete { usn: usn.clone() },
        );

        if stale {
            state.remote_devices.remove(&location);
        }
        if needs_read {
            head |= self.queue_description(&mut state, &identifier, &location, now);
        }
        drop(state);

        if head {
            self.wake();
        }
    }

    /// Marks the USN read if its description is cached, queues a fetch otherwise.
    fn queue_description(
        &self,
        state: &mut CpState,
        identifier: &Identifier,
        location: &str,
        now: Instant,
    ) -> bool {
        let cached = state
            .remote_devices
            .get(location)
            .is_some_and(|device| device.check_describes(identifier).is_ok());
        if cached {
            if let Some(entry) = state.usns.get_mut(&identifier.usn) {
                entry.url_desc_read = true;
            }
            return false;
        }

        let waiting = state
            .upnp_desc_unread
            .entry(location.to_string())
            .or_default();
        if !waiting.contains(&identifier.usn) {
            waiting.push(identifier.usn.clone());
        }
        if state.tasks.iter().any(|t| t.payload == Task::ReadUpnpDescs) {
            return false;
        }
        state.tasks.add(now + DESC_READ_DELAY, Task::ReadUpnpDescs)
    }

    /// Removes a USN; the only removal path of the registry.
    ///
    /// Hosted devices say goodbye for their whole tree. Remote USNs drop
    /// the GENA subscriptions of their hosts, and a vanished root device
    /// takes its embedded devices with it.
    pub(crate) fn delete(&self, usn: &str) {
        self.delete_locked(self.state.lock(), usn);
    }

    /// [`delete`](Self::delete) under a guard the caller already holds.
    pub(crate) fn delete_locked(&self, mut state: MutexGuard<'_, CpState>, usn: &str) {
        let Some(entry) = state.usns.get(usn).cloned() else {
            trace!(usn = %usn, "delete: unknown USN");
            return;
        };
        let key = entry.identifier.device.clone();

        if entry.managed {
            let Some(root) = state.managed_devices.get(&key).cloned() else {
                state.remove_usn(usn);
                return;
            };
            let devices: Vec<(String, String, String)> = root
                .all_devices()
                .iter()
                .map(|d| (device_key(d.udn()), d.udn().to_string(), d.usn()))
                .collect();

            let byebyes: Vec<Announcement> = self
                .announcements(&state, &root, AnnouncementKind::ByeBye)
                .into_iter()
                .flatten()
                .collect();
            let removed: Vec<String> = devices
                .iter()
                .flat_map(|(k, _, _)| state.devices.get(k).cloned().unwrap_or_default())
                .collect();
            for usn in &removed {
                state.remove_usn(usn);
            }
            state.tasks.remove_where(|t| {
                matches!(t, Task::DeliverEvent(a) if removed.contains(&a.usn))
            });
            for (k, _, _) in &devices {
                state.managed_devices.remove(k);
            }
            let now = Instant::now();
            let mut head = false;
            for byebye in byebyes {
                head |= state.tasks.add(now, Task::DeliverEvent(byebye));
            }
            drop(state);

            if head {
                self.wake();
            }
            for (_, udn, usn) in devices {
                info!(udn = %udn, "hosted device removed");
                self.hooks.publish(
                    DEVICE_REMOVED,
                    json!({"usn": usn, "udn": udn, "managed": true}),
                );
            }
            return;
        }

        state.remove_usn(usn);
        let mut head = false;
        if entry.identifier.is_rootdevice() {
            head = state.tasks.add(
                Instant::now(),
                Task::RemoveRootdevice {
                    device: key.clone(),
                },
            );
        }
        let gone = !state.devices.contains_key(&key);
        drop(state);

        if head {
            self.wake();
        }
        for ip in &entry.ips {
            self.gena.cancel(None, *ip);
        }
        debug!(usn = %usn, "USN removed");
        if gone {
            self.publish_remote_removal(&entry.identifier);
        }
    }

    fn publish_remote_removal(&self, identifier: &Identifier) {
        info!(udn = %identifier.uuid, "remote device gone");
        self.hooks.publish(
            DEVICE_REMOVED,
            json!({
                "usn": Identifier::build_usn(&identifier.uuid, None),
                "udn": identifier.uuid,
                "managed": false,
            }),
        );
    }

    /// Purges every USN of a vanished root device and of its embedded devices.
    pub(crate) fn remove_rootdevice(&self, device: &str) {
        let usns: Vec<String> = {
            let state = self.state.lock();
            if state.is_managed(device) {
                return;
            }
            let mut keys = vec![device.to_string()];
            for described in state.remote_devices.values() {
                if device_key(described.udn()) == device {
                    keys.extend(tree_udns(described).iter().map(|u| device_key(u)));
                }
            }
            keys.sort();
            keys.dedup();
            keys.iter()
                .flat_map(|k| state.devices.get(k).cloned().unwrap_or_default())
                .collect()
        };
        if !usns.is_empty() {
            debug!("purging {} USNs of root device {}", usns.len(), device);
        }
        for usn in usns {
            self.delete(&usn);
        }
    }

    /// Fetches every queued description and binds it to its USNs.
    ///
    /// USNs whose description cannot be fetched, parsed or does not
    /// describe them are deleted.
    pub fn read_upnp_descs(&self) {
        let batch: Vec<(String, Vec<Identifier>)> = {
            let mut state = self.state.lock();
            let unread = std::mem::take(&mut state.upnp_desc_unread);
            unread
                .into_iter()
                .map(|(url, usns)| {
                    let identifiers = usns
                        .iter()
                        .filter_map(|usn| state.usns.get(usn))
                        .map(|e| e.identifier.clone())
                        .collect();
                    (url, identifiers)
                })
                .collect()
        };

        for (url, identifiers) in batch {
            let Some(first) = identifiers.first() else {
                continue;
            };
            debug!(url = %url, "fetching description for {} USNs", identifiers.len());

            let result = self
                .http
                .fetch(&url)
                .map_err(|e| e.to_string())
                .and_then(|body| {
                    DiscoveredDevice::init_xml_desc(first, &url, &body).map_err(|e| e.to_string())
                });

            let device = match result {
                Ok(device) => Arc::new(device),
                Err(e) => {
                    warn!(url = %url, "❌ cannot read description: {}", e);
                    for identifier in &identifiers {
                        self.delete(&identifier.usn);
                    }
                    continue;
                }
            };

            let (accepted, rejected): (Vec<&Identifier>, Vec<&Identifier>) = identifiers
                .iter()
                .partition(|identifier| device.check_describes(identifier).is_ok());
            {
                let mut state = self.state.lock();
                state.remote_devices.insert(url.clone(), device.clone());
                for identifier in &accepted {
                    if let Some(entry) = state.usns.get_mut(&identifier.usn)
                        && entry.url_desc.as_deref() == Some(url.as_str())
                    {
                        entry.url_desc_read = true;
                    }
                }
            }
            for identifier in rejected {
                warn!(usn = %identifier.usn, "description at {} does not describe it", url);
                self.delete(&identifier.usn);
            }

            if !accepted.is_empty() {
                info!(udn = %device.udn(), "✅ description read: {}", device.friendly_name());
                self.hooks.publish(
                    DEVICE_ADDED,
                    json!({"usn": device.usn(), "udn": device.udn(), "managed": false}),
                );
            }
        }
    }

    /// Schedules one search result per hosted notification matching the
    /// search target, each after a random delay bounded by `MX`.
    fn handle_search(&self, message: &SsdpMessage, from: SocketAddr) {
        if !message
            .man()
            .is_some_and(|man| man.trim().eq_ignore_ascii_case(SSDP_DISCOVER))
        {
            trace!("SSDP: M-SEARCH without MAN from {}", from);
            return;
        }
        let Some(st) = message.st().map(str::trim) else {
            trace!("SSDP: M-SEARCH without ST from {}", from);
            return;
        };
        // Clients that do not identify themselves get an immediate answer
        let wait = match message.user_agent() {
            None => 0,
            Some(_) => message.mx().unwrap_or(1).clamp(1, MX_MAX),
        };

        let mut rng = rand::rng();
        let now = Instant::now();
        let mut state = self.state.lock();
        state.searchers.insert(from.ip());

        let mut results = Vec::new();
        for root in state.managed_roots() {
            let location = root.location();
            for (nt, usn) in tree_notifications(&root).into_iter().flatten() {
                if !search_matches(st, &nt) {
                    continue;
                }
                let target = if st.eq_ignore_ascii_case(SSDP_ALL) || nt == ROOTDEVICE {
                    nt
                } else {
                    st.to_string()
                };
                results.push(Announcement {
                    kind: AnnouncementKind::SearchResult { target: from },
                    nt: target,
                    usn,
                    location: location.clone(),
                    max_age: self.settings.max_age,
                    bootid: state.bootid,
                    configid: state.configid,
                    search_port: self.settings.search_port,
                });
            }
        }

        let count = results.len();
        let mut head = false;
        for result in results {
            let delay = if wait == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(rng.random_range(0..=(wait as u64 * 1000)))
            };
            head |= state.tasks.add(now + delay, Task::DeliverEvent(result));
        }
        drop(state);

        if head {
            self.wake();
        }
        debug!("📥 M-SEARCH from {} (ST={}): {} results", from, st, count);
    }
}
