//! The control point: registry of announced USNs, hosted devices and the
//! scheduler driving SSDP, description fetches and GENA.
//!
//! Discovered USNs enter through [`ControlPoint::handle_ssdp_message`] and
//! expire after their `max-age`. Hosted devices are added with
//! [`ControlPoint::add_device`]; their USNs never expire and are announced
//! periodically. Inbound HTTP requests for hosted devices are answered by
//! [`ControlPoint::handle_request`].
//!
//! All registry state sits behind a single lock which is never held across
//! network I/O: sends and fetches run on a [`WorkerPool`].

mod discovery;
pub mod errors;
mod registry;
mod routing;
mod settings;

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::devices::{DeviceView, DiscoveredDevice, HostedDevice};
use crate::gena::{Gena, GenaEvent};
use crate::hooks::{DEVICE_ADDED, HookBus};
use crate::http::HttpClient;
use crate::identifier::{Identifier, device_key, get_identifier};
use crate::ssdp::{
    Announcement, AnnouncementKind, ListenerHandle, MX_MAX, SSDP_DISCOVER, SsdpListener,
    SsdpMessage, SsdpTransport, quirks,
};
use crate::tasks::{Runnable, TimerThread, WorkerError, WorkerPool};

pub use errors::ControlPointError;
pub use registry::{COUNTER_MODULO, Task, UsnEntry};
pub use settings::{ControlPointSettings, IpNetwork};

use registry::{CpState, next_counter, tree_notifications};

/// Delay before an announcement refused by a full worker queue is retried.
const DELIVERY_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Key of a hosted service in the GENA registry.
pub fn event_key(udn: &str, service_id: &str) -> String {
    format!("uuid:{}::{}", udn, service_id.to_ascii_lowercase())
}

pub struct ControlPoint {
    me: Weak<ControlPoint>,
    settings: ControlPointSettings,
    state: Mutex<CpState>,
    transport: Arc<dyn SsdpTransport>,
    http: Arc<dyn HttpClient>,
    hooks: HookBus,
    gena: Arc<Gena>,
    workers: WorkerPool,
    timer: Mutex<Option<TimerThread>>,
    listeners: Mutex<Vec<ListenerHandle>>,
}

impl ControlPoint {
    pub fn new(
        settings: ControlPointSettings,
        transport: Arc<dyn SsdpTransport>,
        http: Arc<dyn HttpClient>,
        hooks: HookBus,
    ) -> Result<Arc<Self>, ControlPointError> {
        let workers = WorkerPool::new("upnp-worker", settings.workers, settings.worker_queue)?;
        let gena = Gena::new(settings.gena_default_timeout, settings.gena_max_timeout);
        let state = CpState {
            bootid: (chrono::Utc::now().timestamp().unsigned_abs() % COUNTER_MODULO as u64) as u32,
            ..CpState::default()
        };

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            settings,
            state: Mutex::new(state),
            transport,
            http,
            hooks,
            gena,
            workers,
            timer: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }))
    }

    /// Starts the scheduler and one SSDP listener per bound address.
    pub fn start(&self) -> Result<(), ControlPointError> {
        {
            let mut timer = self.timer.lock();
            if timer.is_some() {
                return Ok(());
            }
            let weak: Weak<dyn Runnable> = self.me.clone() as Weak<dyn Runnable>;
            *timer = Some(TimerThread::start("upnp-timer", weak)?);
        }

        let mut addresses = self.settings.bind_addresses.clone();
        if addresses.is_empty() {
            addresses = upnputils::list_local_addresses(self.settings.ipv6);
        }
        if addresses.is_empty() {
            addresses.push(IpAddr::from([0, 0, 0, 0]));
            if self.settings.ipv6 {
                addresses.push(IpAddr::from([0u16; 8]));
            }
        }
        for addr in addresses {
            match SsdpListener::bind(addr) {
                Ok(listener) => self.attach_listener(listener)?,
                Err(e) => warn!("SSDP: cannot listen on {}: {}", addr, e),
            }
        }

        let interval = self.reannounce_interval();
        if self.state.lock().tasks.add(Instant::now() + interval, Task::Reannounce) {
            self.wake();
        }

        if self.settings.search_on_start
            && let Err(e) = self.search(crate::ssdp::SSDP_ALL, 3)
        {
            warn!("initial M-SEARCH failed: {}", e);
        }
        info!("✅ Control point started (bootid {})", self.bootid());
        Ok(())
    }

    /// Routes the frames received by `listener` to this control point.
    pub fn attach_listener(&self, listener: SsdpListener) -> Result<(), ControlPointError> {
        let me = self.me.clone();
        let handle = listener.start(Arc::new(move |message: SsdpMessage, from: SocketAddr| {
            if let Some(cp) = me.upgrade() {
                cp.handle_ssdp_message(message, from);
            }
        }))?;
        self.listeners.lock().push(handle);
        Ok(())
    }

    /// Says goodbye for every hosted device and stops every thread.
    pub fn stop(&self) {
        let announcements: Vec<Announcement> = {
            let state = self.state.lock();
            state
                .managed_roots()
                .iter()
                .flat_map(|root| self.announcements(&state, root, AnnouncementKind::ByeBye))
                .flatten()
                .collect()
        };
        for announcement in &announcements {
            if let Err(e) = announcement.send(self.transport.as_ref()) {
                warn!(usn = %announcement.usn, "byebye failed: {}", e);
            }
        }

        let mut listeners: Vec<ListenerHandle> = self.listeners.lock().drain(..).collect();
        for listener in &mut listeners {
            listener.stop();
        }
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            timer.stop();
        }
        self.gena.stop();
        self.workers.shutdown();
        self.state.lock().tasks.clear();
        info!("Control point stopped");
    }

    pub fn settings(&self) -> &ControlPointSettings {
        &self.settings
    }

    pub fn hooks(&self) -> &HookBus {
        &self.hooks
    }

    pub fn gena(&self) -> &Arc<Gena> {
        &self.gena
    }

    pub fn bootid(&self) -> u32 {
        self.state.lock().bootid
    }

    pub fn configid(&self) -> u32 {
        self.state.lock().configid
    }

    fn wake(&self) {
        if let Some(timer) = self.timer.lock().as_ref() {
            timer.wake();
        }
    }

    fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = self.workers.submit(job) {
            warn!("job dropped: {}", e);
        }
    }

    fn reannounce_interval(&self) -> Duration {
        let half = Duration::from_secs((self.settings.max_age / 2).max(1) as u64);
        let jitter_max = (half.as_secs_f64() / 10.0).min(30.0);
        let jitter = rand::rng().random_range(0.0..=jitter_max);
        half.saturating_sub(Duration::from_secs_f64(jitter))
    }

    /// Announcements of a hosted tree, grouped per device.
    fn announcements(
        &self,
        state: &CpState,
        root: &HostedDevice,
        kind: AnnouncementKind,
    ) -> Vec<Vec<Announcement>> {
        let location = root.location();
        tree_notifications(root)
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .map(|(nt, usn)| Announcement {
                        kind: kind.clone(),
                        nt,
                        usn,
                        location: location.clone(),
                        max_age: self.settings.max_age,
                        bootid: state.bootid,
                        configid: state.configid,
                        search_port: self.settings.search_port,
                    })
                    .collect()
            })
            .collect()
    }

    /// Schedules groups 0.2 to 0.6 s apart; returns `true` if the queue head changed.
    fn schedule_groups(state: &mut CpState, groups: Vec<Vec<Announcement>>) -> bool {
        let mut rng = rand::rng();
        let mut at = Instant::now();
        let mut head = false;
        for group in groups {
            at += Duration::from_secs_f64(rng.random_range(0.2..=0.6));
            for announcement in group {
                head |= state.tasks.add(at, Task::DeliverEvent(announcement));
            }
        }
        head
    }

    fn schedule_alive(&self, state: &mut CpState, root: &HostedDevice) -> bool {
        let groups = self.announcements(state, root, AnnouncementKind::Alive);
        Self::schedule_groups(state, groups)
    }

    /// Registers a hosted device tree and schedules its announcements.
    pub fn add_device(&self, mut device: HostedDevice) -> Result<Arc<HostedDevice>, ControlPointError> {
        device.init_device(&self.settings.base_url);
        let device = Arc::new(device);
        let keys: Vec<String> = device
            .all_devices()
            .iter()
            .map(|d| device_key(d.udn()))
            .collect();

        let (first, head) = {
            let mut state = self.state.lock();
            if keys.iter().any(|k| state.is_managed(k)) {
                return Err(ControlPointError::AlreadyRegistered(device.udn().to_string()));
            }
            let first = state.managed_devices.is_empty();
            let others = state.managed_roots();

            state.configid = next_counter(state.configid);
            let configid = state.configid;
            device.set_configid(configid);
            for other in &others {
                other.set_configid(configid);
            }

            for key in &keys {
                state.managed_devices.insert(key.clone(), device.clone());
            }
            self.register_managed_usns(&mut state, &device);

            let mut head = false;
            for other in &others {
                head |= self.schedule_alive(&mut state, other);
            }
            head |= self.schedule_alive(&mut state, &device);
            (first, head)
        };
        if head {
            self.wake();
        }

        if first && let Err(e) = self.gena.start() {
            warn!("cannot start GENA manager: {}", e);
        }
        self.install_event_sinks(&device);

        for d in device.all_devices() {
            info!(udn = %d.udn(), "✅ hosted device added: {}", d.friendly_name());
            self.hooks.publish(
                DEVICE_ADDED,
                json!({"usn": d.usn(), "udn": d.udn(), "managed": true}),
            );
        }
        Ok(device)
    }

    fn register_managed_usns(&self, state: &mut CpState, root: &HostedDevice) {
        let location = root.location();
        let server = quirks::server_string();
        for (_, usn) in tree_notifications(root).into_iter().flatten() {
            let Some(identifier) = get_identifier(&usn, Some(state.bootid), Some(state.configid))
            else {
                continue;
            };
            state.insert_usn(UsnEntry {
                identifier,
                ips: Vec::new(),
                ssdp_server_name: Some(server.clone()),
                http_client_name: None,
                url_desc: Some(location.clone()),
                url_desc_read: true,
                bootid: Some(state.bootid),
                max_age: self.settings.max_age,
                managed: true,
            });
        }
    }

    /// Unregisters a hosted root device, says goodbye and reannounces the others.
    pub fn remove_device(&self, udn: &str) -> Result<(), ControlPointError> {
        let key = device_key(udn);
        let root = self
            .state
            .lock()
            .managed_devices
            .get(&key)
            .cloned()
            .ok_or_else(|| ControlPointError::UnknownDevice(udn.to_string()))?;
        if device_key(root.udn()) != key {
            return Err(ControlPointError::EmbeddedDevice(udn.to_string()));
        }

        self.delete(&Identifier::rootdevice_usn(root.udn()));
        for device in root.all_devices() {
            for service in device.services() {
                service.set_event_sink(None);
            }
        }

        let (empty, head) = {
            let mut state = self.state.lock();
            state.configid = next_counter(state.configid);
            let configid = state.configid;
            let others = state.managed_roots();
            let mut head = false;
            for other in &others {
                other.set_configid(configid);
                head |= self.schedule_alive(&mut state, other);
            }
            (others.is_empty(), head)
        };
        if head {
            self.wake();
        }
        if empty {
            self.gena.stop();
        }
        Ok(())
    }

    /// Increments `bootid` and announces it with `ssdp:update`.
    pub fn bump_bootid(&self) -> u32 {
        let (next, head) = {
            let mut state = self.state.lock();
            let next = next_counter(state.bootid);
            let mut head = false;
            for root in state.managed_roots() {
                let groups =
                    self.announcements(&state, &root, AnnouncementKind::Update { next_bootid: next });
                head |= Self::schedule_groups(&mut state, groups);
            }
            state.bootid = next;
            for entry in state.usns.values_mut().filter(|e| e.managed) {
                entry.bootid = Some(next);
                entry.identifier.bootid = Some(next);
            }
            (next, head)
        };
        if head {
            self.wake();
        }
        info!("bootid is now {}", next);
        next
    }

    /// Multicasts an `M-SEARCH`; answers come back through the listeners.
    pub fn search(&self, st: &str, mx: u32) -> Result<(), ControlPointError> {
        let mx = mx.clamp(1, MX_MAX);
        let message = SsdpMessage::search()
            .header("MAN", SSDP_DISCOVER)
            .header("MX", mx)
            .header("ST", st)
            .header("USER-AGENT", quirks::server_string());
        self.transport.multicast(&message)?;
        info!("📤 M-SEARCH sent (ST={}, MX={})", st, mx);
        Ok(())
    }

    fn install_event_sinks(&self, root: &HostedDevice) {
        for device in root.all_devices() {
            for service in device.services() {
                let key = event_key(device.udn(), service.service_id());
                let me = self.me.clone();
                service.set_event_sink(Some(Arc::new(move |changes: Vec<(String, String)>| {
                    if let Some(cp) = me.upgrade() {
                        cp.notify_variable_changes(&key, changes);
                    }
                })));
            }
        }
    }

    /// Sends evented state changes of a hosted service to its subscribers.
    pub fn notify_variable_changes(&self, event_key: &str, changes: Vec<(String, String)>) {
        let deliveries = self
            .gena
            .prepare_deliveries(&GenaEvent::new(event_key, changes));
        for delivery in deliveries {
            let http = self.http.clone();
            self.submit(move || {
                if let Err(e) = delivery.send(http.as_ref()) {
                    warn!("{}", e);
                }
            });
        }
    }

    pub fn usn_identifiers(&self) -> Vec<Identifier> {
        self.state
            .lock()
            .usns
            .values()
            .map(|e| e.identifier.clone())
            .collect()
    }

    pub fn usn_entry(&self, usn: &str) -> Option<UsnEntry> {
        self.state.lock().usns.get(usn).cloned()
    }

    /// Pending tasks in execution order.
    pub fn pending_tasks(&self) -> Vec<(Instant, Task)> {
        self.state
            .lock()
            .tasks
            .iter()
            .map(|t| (t.timestamp, t.payload.clone()))
            .collect()
    }

    /// Root hosted device containing `udn`.
    pub fn managed_device(&self, udn: &str) -> Option<Arc<HostedDevice>> {
        self.state
            .lock()
            .managed_devices
            .get(&device_key(udn))
            .cloned()
    }

    pub fn managed_devices(&self) -> Vec<Arc<HostedDevice>> {
        self.state.lock().managed_roots()
    }

    /// Description of a discovered device, once fetched.
    pub fn get_remote_device(&self, udn: &str) -> Option<Arc<DiscoveredDevice>> {
        self.state.lock().remote_device(&device_key(udn))
    }

    /// Executes the earliest task due at `now` and returns the next wake time.
    ///
    /// An expiring USN is removed under the lock that popped its task, so a
    /// refresh cannot slip in between.
    pub fn run_due(&self, now: Instant) -> Option<Instant> {
        let mut state = self.state.lock();
        let task = state.tasks.pop_due(now);
        match task {
            Some(Task::Delete { usn }) => {
                debug!(usn = %usn, "USN expired");
                self.delete_locked(state, &usn);
            }
            Some(task) => {
                drop(state);
                self.execute(task);
            }
            None => return state.tasks.next_timestamp(),
        }
        self.state.lock().tasks.next_timestamp()
    }

    fn execute(&self, task: Task) {
        match task {
            Task::Delete { usn } => self.delete(&usn),
            Task::DeliverEvent(announcement) => {
                let retry = announcement.clone();
                let transport = self.transport.clone();
                let job = move || {
                    if let Err(e) = announcement.send(transport.as_ref()) {
                        warn!(usn = %announcement.usn, "SSDP send failed: {}", e);
                    }
                };
                match self.workers.submit(job) {
                    Ok(()) => {}
                    Err(WorkerError::QueueFull) => {
                        debug!(usn = %retry.usn, "worker queue full, announcement delayed");
                        let at = Instant::now() + DELIVERY_RETRY_DELAY;
                        if self.state.lock().tasks.add(at, Task::DeliverEvent(retry)) {
                            self.wake();
                        }
                    }
                    Err(e) => warn!(usn = %retry.usn, "announcement dropped: {}", e),
                }
            }
            Task::ReadUpnpDescs => {
                let me = self.me.clone();
                self.submit(move || {
                    if let Some(cp) = me.upgrade() {
                        cp.read_upnp_descs();
                    }
                });
            }
            Task::RemoveRootdevice { device } => self.remove_rootdevice(&device),
            Task::Reannounce => {
                let interval = self.reannounce_interval();
                let mut state = self.state.lock();
                for root in state.managed_roots() {
                    self.schedule_alive(&mut state, &root);
                }
                state.tasks.add(Instant::now() + interval, Task::Reannounce);
            }
        }
    }
}

impl Runnable for ControlPoint {
    fn run(&self) -> Option<Instant> {
        self.run_due(Instant::now())
    }
}
