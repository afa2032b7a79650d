use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Value, json};
use upnpstack::control_point::{ControlPoint, ControlPointSettings, Task};
use upnpstack::devices::{DeviceInfo, DeviceView, HostedDevice, IconSet};
use upnpstack::hooks::{DEVICE_REMOVED, HookBus};
use upnpstack::http::{HttpClient, HttpError, HttpRequest, HttpResponse, UpnpRequest};
use upnpstack::identifier::Identifier;
use upnpstack::services::callable::{CALLABLE_SERVICE_ID, CALLABLE_SERVICE_TYPE, callable_service};
use upnpstack::soap::{build_soap_request, parse_soap_response};
use upnpstack::ssdp::{SsdpError, SsdpMessage, SsdpTransport};

const MEDIA_SERVER: &str = "urn:schemas-upnp-org:device:MediaServer:1";
const REMOTE_LOCATION: &str = "http://192.168.1.20:8200/desc.xml";

const REMOTE_DESC: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>Remote server</friendlyName>
    <manufacturer>acme</manufacturer>
    <modelName>box</modelName>
    <UDN>uuid:1234</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
        <SCPDURL>/cd.xml</SCPDURL>
        <controlURL>/cd/control</controlURL>
        <eventSubURL>/cd/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

#[derive(Default)]
struct RecordingTransport {
    multicast: Mutex<Vec<SsdpMessage>>,
    unicast: Mutex<Vec<(SsdpMessage, SocketAddr)>>,
}

impl SsdpTransport for RecordingTransport {
    fn multicast(&self, message: &SsdpMessage) -> Result<(), SsdpError> {
        self.multicast.lock().push(message.clone());
        Ok(())
    }

    fn unicast(&self, message: &SsdpMessage, target: SocketAddr) -> Result<(), SsdpError> {
        self.unicast.lock().push((message.clone(), target));
        Ok(())
    }
}

/// Answers GETs from a fixed table and records every request.
#[derive(Default)]
struct CannedHttp {
    documents: Vec<(String, String)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl CannedHttp {
    fn with_document(mut self, url: &str, body: &str) -> Self {
        self.documents.push((url.to_string(), body.to_string()));
        self
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

impl HttpClient for CannedHttp {
    fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().push(request.clone());
        if request.method != "GET" {
            return Ok(HttpResponse {
                status: 200,
                ..HttpResponse::default()
            });
        }
        match self.documents.iter().find(|(url, _)| *url == request.url) {
            Some((_, body)) => Ok(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: body.clone().into_bytes(),
            }),
            None => Err(HttpError::Transport(request.url, "connection refused".into())),
        }
    }
}

fn settings() -> ControlPointSettings {
    ControlPointSettings {
        base_url: "http://127.0.0.1:8080".to_string(),
        search_on_start: false,
        ..ControlPointSettings::default()
    }
}

fn control_point(http: CannedHttp) -> (Arc<ControlPoint>, Arc<RecordingTransport>, Arc<CannedHttp>) {
    let transport = Arc::new(RecordingTransport::default());
    let http = Arc::new(http);
    let cp = ControlPoint::new(settings(), transport.clone(), http.clone(), HookBus::new()).unwrap();
    (cp, transport, http)
}

fn alive(usn: &str, nt: &str, location: &str) -> SsdpMessage {
    SsdpMessage::notify()
        .header("NT", nt)
        .header("NTS", "ssdp:alive")
        .header("USN", usn)
        .header("LOCATION", location)
        .header("CACHE-CONTROL", "max-age=1800")
}

fn remote_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::new(192, 168, 1, 20), 1900))
}

fn hosted_device(hooks: &HookBus) -> HostedDevice {
    let mut device =
        HostedDevice::new("MediaServer", 1, DeviceInfo::new("Test server", "upnpstack", "test"))
            .unwrap()
            .with_udn("uuid:5a7e1c2d-0000-4000-8000-000000000001");
    device.add_service(callable_service(hooks.clone()).unwrap()).unwrap();
    device
}

fn count(tasks: &[(Instant, Task)], pred: impl Fn(&Task) -> bool) -> usize {
    tasks.iter().filter(|(_, t)| pred(t)).count()
}

fn wait_for(pred: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn test_alive_creates_entry_and_single_description_read() {
    let (cp, _, _) = control_point(CannedHttp::default());
    let usn = format!("uuid:1234::{}", MEDIA_SERVER);

    let before = Instant::now();
    cp.handle_ssdp_message(alive(&usn, MEDIA_SERVER, REMOTE_LOCATION), remote_addr());
    cp.handle_ssdp_message(
        alive("uuid:1234::upnp:rootdevice", "upnp:rootdevice", REMOTE_LOCATION),
        remote_addr(),
    );

    let entry = cp.usn_entry(&usn).unwrap();
    assert!(!entry.managed);
    assert!(!entry.url_desc_read);
    assert_eq!(entry.url_desc.as_deref(), Some(REMOTE_LOCATION));
    assert_eq!(entry.ips, vec![remote_addr().ip()]);

    let tasks = cp.pending_tasks();
    let expiry = tasks
        .iter()
        .find(|(_, t)| *t == Task::Delete { usn: usn.clone() })
        .map(|(at, _)| *at - before)
        .unwrap();
    assert!(expiry >= Duration::from_secs(1799));
    assert!(expiry <= Duration::from_secs(1801));
    assert_eq!(count(&tasks, |t| *t == Task::ReadUpnpDescs), 1);
}

#[test]
fn test_realive_reschedules_expiry() {
    let (cp, _, _) = control_point(CannedHttp::default());
    let usn = format!("uuid:1234::{}", MEDIA_SERVER);

    cp.handle_ssdp_message(alive(&usn, MEDIA_SERVER, REMOTE_LOCATION), remote_addr());
    cp.handle_ssdp_message(alive(&usn, MEDIA_SERVER, REMOTE_LOCATION), remote_addr());

    let tasks = cp.pending_tasks();
    assert_eq!(count(&tasks, |t| matches!(t, Task::Delete { .. })), 1);
    assert_eq!(cp.usn_identifiers().len(), 1);
}

#[test]
fn test_description_read_binds_remote_device() {
    let http = CannedHttp::default().with_document(REMOTE_LOCATION, REMOTE_DESC);
    let (cp, _, http) = control_point(http);
    let usn = format!("uuid:1234::{}", MEDIA_SERVER);

    cp.handle_ssdp_message(alive(&usn, MEDIA_SERVER, REMOTE_LOCATION), remote_addr());
    cp.handle_ssdp_message(
        alive("uuid:1234::upnp:rootdevice", "upnp:rootdevice", REMOTE_LOCATION),
        remote_addr(),
    );
    cp.read_upnp_descs();

    assert_eq!(http.requests().len(), 1);
    assert!(cp.usn_entry(&usn).unwrap().url_desc_read);
    let device = cp.get_remote_device("1234").unwrap();
    assert_eq!(device.friendly_name(), "Remote server");
    assert_eq!(device.services().len(), 1);
    assert_eq!(
        device.services()[0].info().control_url,
        "http://192.168.1.20:8200/cd/control"
    );
}

fn update(usn: &str, nt: &str, bootid: u32, next_bootid: u32) -> SsdpMessage {
    SsdpMessage::notify()
        .header("NT", nt)
        .header("NTS", "ssdp:update")
        .header("USN", usn)
        .header("LOCATION", REMOTE_LOCATION)
        .header("BOOTID.UPNP.ORG", bootid)
        .header("NEXTBOOTID.UPNP.ORG", next_bootid)
}

/// Announces uuid:1234 with the given headers and reads its description.
fn discover_remote(cp: &ControlPoint, extra: &[(&str, u32)]) -> String {
    let usn = format!("uuid:1234::{}", MEDIA_SERVER);
    let mut server = alive(&usn, MEDIA_SERVER, REMOTE_LOCATION);
    let mut root = alive("uuid:1234::upnp:rootdevice", "upnp:rootdevice", REMOTE_LOCATION);
    for (name, value) in extra {
        server = server.header(name, value);
        root = root.header(name, value);
    }
    cp.handle_ssdp_message(server, remote_addr());
    cp.handle_ssdp_message(root, remote_addr());
    cp.read_upnp_descs();
    usn
}

#[test]
fn test_update_with_known_bootid_keeps_description() {
    let http = CannedHttp::default().with_document(REMOTE_LOCATION, REMOTE_DESC);
    let (cp, _, http) = control_point(http);
    let usn = discover_remote(&cp, &[("BOOTID.UPNP.ORG", 1)]);
    assert_eq!(http.requests().len(), 1);

    cp.handle_ssdp_message(update(&usn, MEDIA_SERVER, 1, 2), remote_addr());

    let entry = cp.usn_entry(&usn).unwrap();
    assert_eq!(entry.bootid, Some(2));
    assert!(entry.url_desc_read);
    assert!(cp.get_remote_device("1234").is_some());
    cp.read_upnp_descs();
    assert_eq!(http.requests().len(), 1);
}

#[test]
fn test_update_with_unknown_bootid_rereads_description() {
    let http = CannedHttp::default().with_document(REMOTE_LOCATION, REMOTE_DESC);
    let (cp, _, http) = control_point(http);
    let usn = discover_remote(&cp, &[("BOOTID.UPNP.ORG", 1)]);

    cp.handle_ssdp_message(update(&usn, MEDIA_SERVER, 5, 6), remote_addr());

    let entry = cp.usn_entry(&usn).unwrap();
    assert_eq!(entry.bootid, Some(6));
    assert!(!entry.url_desc_read);
    assert!(cp.get_remote_device("1234").is_none());

    cp.read_upnp_descs();
    assert_eq!(http.requests().len(), 2);
    assert!(cp.usn_entry(&usn).unwrap().url_desc_read);
    assert!(cp.get_remote_device("1234").is_some());
}

#[test]
fn test_configid_change_drops_cached_description() {
    let http = CannedHttp::default().with_document(REMOTE_LOCATION, REMOTE_DESC);
    let (cp, _, http) = control_point(http);
    let usn = discover_remote(&cp, &[("CONFIGID.UPNP.ORG", 1)]);
    assert!(cp.get_remote_device("1234").is_some());

    // same configid: nothing to fetch
    cp.handle_ssdp_message(
        alive(&usn, MEDIA_SERVER, REMOTE_LOCATION).header("CONFIGID.UPNP.ORG", 1),
        remote_addr(),
    );
    cp.read_upnp_descs();
    assert_eq!(http.requests().len(), 1);

    cp.handle_ssdp_message(
        alive(&usn, MEDIA_SERVER, REMOTE_LOCATION).header("CONFIGID.UPNP.ORG", 2),
        remote_addr(),
    );
    let entry = cp.usn_entry(&usn).unwrap();
    assert_eq!(entry.identifier.configid, Some(2));
    assert!(!entry.url_desc_read);
    assert!(cp.get_remote_device("1234").is_none());

    cp.read_upnp_descs();
    assert_eq!(http.requests().len(), 2);
    assert!(cp.get_remote_device("1234").is_some());
}

#[test]
fn test_expiry_spares_refreshed_usn() {
    let http = CannedHttp::default().with_document(REMOTE_LOCATION, REMOTE_DESC);
    let (cp, _, _) = control_point(http);
    let server = format!("uuid:1234::{}", MEDIA_SERVER);
    let service = "uuid:1234::urn:schemas-upnp-org:service:ContentDirectory:1";
    let short = |usn: &str, nt: &str| {
        alive(usn, nt, REMOTE_LOCATION).header("CACHE-CONTROL", "max-age=1")
    };

    cp.handle_ssdp_message(short(&server, MEDIA_SERVER), remote_addr());
    cp.handle_ssdp_message(
        short(service, "urn:schemas-upnp-org:service:ContentDirectory:1"),
        remote_addr(),
    );
    cp.read_upnp_descs();
    // refreshed before its first expiry
    cp.handle_ssdp_message(alive(&server, MEDIA_SERVER, REMOTE_LOCATION), remote_addr());

    let later = Instant::now() + Duration::from_secs(2);
    while cp.run_due(later).is_some_and(|next| next <= later) {}

    assert!(cp.usn_entry(service).is_none());
    let entry = cp.usn_entry(&server).unwrap();
    assert_eq!(entry.max_age, 1800);
    assert_eq!(
        count(&cp.pending_tasks(), |t| *t == Task::Delete { usn: server.clone() }),
        1
    );
}

#[test]
fn test_failed_description_read_deletes_usns() {
    let (cp, _, _) = control_point(CannedHttp::default());
    let usn = format!("uuid:1234::{}", MEDIA_SERVER);

    cp.handle_ssdp_message(alive(&usn, MEDIA_SERVER, REMOTE_LOCATION), remote_addr());
    cp.read_upnp_descs();

    assert!(cp.usn_entry(&usn).is_none());
    assert_eq!(count(&cp.pending_tasks(), |t| matches!(t, Task::Delete { .. })), 0);
}

#[test]
fn test_byebye_removes_whole_root_device() {
    let http = CannedHttp::default().with_document(REMOTE_LOCATION, REMOTE_DESC);
    let (cp, _, _) = control_point(http);
    let removed = Arc::new(Mutex::new(Vec::<Value>::new()));
    let sink = removed.clone();
    cp.hooks().register(DEVICE_REMOVED, move |args: Value| {
        sink.lock().push(args);
        Ok(Value::Null)
    });

    let usn = format!("uuid:1234::{}", MEDIA_SERVER);
    cp.handle_ssdp_message(alive(&usn, MEDIA_SERVER, REMOTE_LOCATION), remote_addr());
    cp.handle_ssdp_message(
        alive("uuid:1234::upnp:rootdevice", "upnp:rootdevice", REMOTE_LOCATION),
        remote_addr(),
    );
    cp.read_upnp_descs();

    let byebye = SsdpMessage::notify()
        .header("NT", "upnp:rootdevice")
        .header("NTS", "ssdp:byebye")
        .header("USN", "uuid:1234::upnp:rootdevice");
    cp.handle_ssdp_message(byebye, remote_addr());

    // the rootdevice purge is a scheduled task
    cp.run_due(Instant::now());
    assert!(cp.usn_identifiers().is_empty());
    assert_eq!(removed.lock().len(), 1);
    assert_eq!(removed.lock()[0]["managed"], json!(false));
}

#[test]
fn test_search_schedules_one_result_per_notification() {
    let hooks = HookBus::new();
    let (cp, transport, _) = control_point(CannedHttp::default());
    let device = cp.add_device(hosted_device(&hooks)).unwrap();

    let search = SsdpMessage::search()
        .header("MAN", "\"ssdp:discover\"")
        .header("MX", 10)
        .header("ST", "ssdp:all");
    let client = SocketAddr::from((Ipv4Addr::new(192, 168, 1, 50), 50000));
    let before = Instant::now();
    cp.handle_ssdp_message(search, client);

    let results: Vec<(Instant, Task)> = cp
        .pending_tasks()
        .into_iter()
        .filter(|(_, t)| {
            matches!(t, Task::DeliverEvent(a)
                if matches!(a.kind, upnpstack::ssdp::AnnouncementKind::SearchResult { .. }))
        })
        .collect();
    // rootdevice alias, uuid, device type, one service type
    assert_eq!(results.len(), 4);
    for (at, _) in &results {
        // no USER-AGENT: answered without waiting
        assert!(*at - before < Duration::from_secs(1));
    }

    let usns: Vec<String> = results
        .iter()
        .filter_map(|(_, t)| match t {
            Task::DeliverEvent(a) => Some(a.usn.clone()),
            _ => None,
        })
        .collect();
    assert!(usns.contains(&Identifier::rootdevice_usn(device.udn())));
    assert!(usns.contains(&Identifier::build_usn(device.udn(), Some(CALLABLE_SERVICE_TYPE))));

    while cp.run_due(Instant::now()).is_some_and(|next| next <= Instant::now()) {}
    assert!(wait_for(|| transport.unicast.lock().len() >= 4));
    assert!(transport.unicast.lock().iter().all(|(_, to)| *to == client));
    assert!(cp.is_ip_allowed(client.ip()));
}

/// Records what is sent; unicasts wait until the gate is released.
#[derive(Default)]
struct GatedTransport {
    gate: Mutex<()>,
    unicast: Mutex<Vec<(SsdpMessage, SocketAddr)>>,
}

impl SsdpTransport for GatedTransport {
    fn multicast(&self, _message: &SsdpMessage) -> Result<(), SsdpError> {
        Ok(())
    }

    fn unicast(&self, message: &SsdpMessage, target: SocketAddr) -> Result<(), SsdpError> {
        let _open = self.gate.lock();
        self.unicast.lock().push((message.clone(), target));
        Ok(())
    }
}

#[test]
fn test_search_results_survive_full_worker_queue() {
    let hooks = HookBus::new();
    let transport = Arc::new(GatedTransport::default());
    let settings = ControlPointSettings {
        workers: 1,
        worker_queue: 1,
        ..settings()
    };
    let cp = ControlPoint::new(
        settings,
        transport.clone(),
        Arc::new(CannedHttp::default()),
        HookBus::new(),
    )
    .unwrap();
    cp.add_device(hosted_device(&hooks)).unwrap();

    let closed = transport.gate.lock();
    let search = SsdpMessage::search()
        .header("MAN", "\"ssdp:discover\"")
        .header("MX", 1)
        .header("ST", "ssdp:all");
    let client = SocketAddr::from((Ipv4Addr::new(192, 168, 1, 50), 50000));
    cp.handle_ssdp_message(search, client);

    let now = Instant::now();
    while cp.run_due(now).is_some_and(|next| next <= now) {}
    // one result blocked in the worker, at most one queued, the rest delayed
    let delayed = count(&cp.pending_tasks(), |t| {
        matches!(t, Task::DeliverEvent(a)
            if matches!(a.kind, upnpstack::ssdp::AnnouncementKind::SearchResult { .. }))
    });
    assert!(delayed >= 2);

    drop(closed);
    assert!(wait_for(|| {
        cp.run_due(Instant::now());
        transport.unicast.lock().len() >= 4
    }));
    assert!(transport.unicast.lock().iter().all(|(_, to)| *to == client));
    cp.stop();
}

#[test]
fn test_search_for_other_type_is_ignored() {
    let hooks = HookBus::new();
    let (cp, _, _) = control_point(CannedHttp::default());
    cp.add_device(hosted_device(&hooks)).unwrap();
    let before = cp.pending_tasks().len();

    let search = SsdpMessage::search()
        .header("MAN", "\"ssdp:discover\"")
        .header("MX", 2)
        .header("ST", "urn:schemas-upnp-org:device:MediaRenderer:1")
        .header("USER-AGENT", "test/1.0 UPnP/2.0 client/1.0");
    cp.handle_ssdp_message(search, remote_addr());
    assert_eq!(cp.pending_tasks().len(), before);
}

#[test]
fn test_add_then_remove_device() {
    let hooks = HookBus::new();
    let (cp, _, _) = control_point(CannedHttp::default());
    let device = cp.add_device(hosted_device(&hooks)).unwrap();
    let udn = device.udn().to_string();

    let usns = cp.usn_identifiers();
    assert_eq!(usns.len(), 4);
    assert!(usns.iter().all(|id| id.device == upnpstack::identifier::device_key(&udn)));
    assert!(cp.usn_entry(&Identifier::rootdevice_usn(&udn)).unwrap().managed);
    assert_eq!(cp.configid(), 1);

    assert!(cp.add_device(hosted_device(&hooks)).is_err());

    cp.remove_device(&udn).unwrap();
    assert!(cp.usn_identifiers().is_empty());
    assert!(cp.managed_device(&udn).is_none());
    assert_eq!(cp.configid(), 2);

    let byebyes = count(&cp.pending_tasks(), |t| {
        matches!(t, Task::DeliverEvent(a) if a.kind == upnpstack::ssdp::AnnouncementKind::ByeBye)
    });
    assert_eq!(byebyes, 4);
    assert!(cp.remove_device(&udn).is_err());
}

#[test]
fn test_description_is_served() {
    let hooks = HookBus::new();
    let (cp, _, _) = control_point(CannedHttp::default());
    let device = cp.add_device(hosted_device(&hooks)).unwrap();
    let loopback = IpAddr::from(Ipv4Addr::LOCALHOST);

    let response = cp.handle_request(&UpnpRequest::new("GET", &device.description_path(), loopback));
    assert_eq!(response.status, 200);
    let body = String::from_utf8(response.body).unwrap();
    assert!(body.contains(MEDIA_SERVER));
    assert!(body.contains(&format!("uuid:{}", device.udn())));

    let scpd_path = format!("{}/{}/xml", device.path(), CALLABLE_SERVICE_ID);
    let response = cp.handle_request(&UpnpRequest::new("GET", &scpd_path, loopback));
    assert_eq!(response.status, 200);

    let response = cp.handle_request(&UpnpRequest::new("GET", "/upnp/unknown/desc", loopback));
    assert_eq!(response.status, 404);
}

#[test]
fn test_advertised_icons_are_served() {
    let hooks = HookBus::new();
    let (cp, _, _) = control_point(CannedHttp::default());
    let icons = IconSet::new("logo").with_source(|name, icon| {
        (name == "logo" && icon.mimetype == "image/png").then(|| vec![0x89, b'P', b'N', b'G'])
    });
    let device = cp.add_device(hosted_device(&hooks).with_icons(icons)).unwrap();
    let loopback = IpAddr::from(Ipv4Addr::LOCALHOST);

    let url = device.icons()[0].url.clone();
    assert_eq!(url, format!("{}/icons/logo_48x48_24.png", device.path()));
    let response = cp.handle_request(&UpnpRequest::new("GET", &url, loopback));
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("Content-Type"), Some("image/png"));
    assert_eq!(response.body, vec![0x89, b'P', b'N', b'G']);

    let jpeg = format!("{}/icons/logo_48x48_24.jpg", device.path());
    assert_eq!(cp.handle_request(&UpnpRequest::new("GET", &jpeg, loopback)).status, 404);
    let unknown = format!("{}/icons/other_48x48_24.png", device.path());
    assert_eq!(cp.handle_request(&UpnpRequest::new("GET", &unknown, loopback)).status, 404);
}

#[test]
fn test_unservable_icons_are_not_advertised() {
    let hooks = HookBus::new();
    let (cp, _, _) = control_point(CannedHttp::default());
    let device = cp
        .add_device(hosted_device(&hooks).with_icons(IconSet::new("logo")))
        .unwrap();
    assert!(device.icons().is_empty());
    assert!(!device.get_xml().unwrap().contains("iconList"));
}

#[test]
fn test_soap_call_hook() {
    let hooks = HookBus::new();
    hooks.register("status", |_| Ok(json!({"result": "ok"})));
    let (cp, _, _) = control_point(CannedHttp::default());
    let device = cp.add_device(hosted_device(&hooks)).unwrap();

    let body = build_soap_request(
        CALLABLE_SERVICE_TYPE,
        "CallHook",
        &[("Hook", "status"), ("JsonArguments", "{}")],
    )
    .unwrap();
    let path = format!("{}/{}/control", device.path(), CALLABLE_SERVICE_ID);
    let request = UpnpRequest::new("POST", &path, IpAddr::from(Ipv4Addr::LOCALHOST))
        .header("SOAPACTION", &format!("\"{}#CallHook\"", CALLABLE_SERVICE_TYPE))
        .body(body);

    let response = cp.handle_request(&request);
    assert_eq!(response.status, 200);
    let values = parse_soap_response(&response.body, "CallHook").unwrap();
    let (name, json_result) = &values[0];
    assert_eq!(name, "JsonResult");
    let value: Value = serde_json::from_str(json_result).unwrap();
    assert_eq!(value, json!({"result": "ok"}));
}

#[test]
fn test_soap_unknown_action_is_a_fault() {
    let hooks = HookBus::new();
    let (cp, _, _) = control_point(CannedHttp::default());
    let device = cp.add_device(hosted_device(&hooks)).unwrap();

    let body = build_soap_request(CALLABLE_SERVICE_TYPE, "Nope", &[]).unwrap();
    let path = format!("{}/{}/control", device.path(), CALLABLE_SERVICE_ID);
    let request = UpnpRequest::new("POST", &path, IpAddr::from(Ipv4Addr::LOCALHOST)).body(body);

    let response = cp.handle_request(&request);
    assert_eq!(response.status, 500);
    assert!(String::from_utf8(response.body).unwrap().contains("401"));
}

#[test]
fn test_control_from_unknown_host_is_refused() {
    let hooks = HookBus::new();
    let (cp, _, _) = control_point(CannedHttp::default());
    let device = cp.add_device(hosted_device(&hooks)).unwrap();

    let body = build_soap_request(CALLABLE_SERVICE_TYPE, "CallHook", &[("Hook", "x")]).unwrap();
    let path = format!("{}/{}/control", device.path(), CALLABLE_SERVICE_ID);
    let stranger = IpAddr::from(Ipv4Addr::new(203, 0, 113, 9));
    let response = cp.handle_request(&UpnpRequest::new("POST", &path, stranger).body(body));
    assert_eq!(response.status, 403);
}

#[test]
fn test_subscribe_then_renew() {
    let hooks = HookBus::new();
    let (cp, _, http) = control_point(CannedHttp::default());
    let device = cp.add_device(hosted_device(&hooks)).unwrap();
    let path = format!("{}/{}/eventsub", device.path(), CALLABLE_SERVICE_ID);
    let loopback = IpAddr::from(Ipv4Addr::LOCALHOST);

    let subscribe = UpnpRequest::new("SUBSCRIBE", &path, loopback)
        .header("CALLBACK", "<http://127.0.0.1:1/cb>")
        .header("NT", "upnp:event")
        .header("TIMEOUT", "Second-300");
    let response = cp.handle_request(&subscribe);
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("TIMEOUT"), Some("Second-300"));
    let sid = response.get_header("SID").unwrap().to_string();
    assert!(sid.starts_with("uuid:"));

    // initial event, SEQ 0
    assert!(wait_for(|| http.requests().iter().any(|r| r.method == "NOTIFY")));
    let notify = http
        .requests()
        .into_iter()
        .find(|r| r.method == "NOTIFY")
        .unwrap();
    assert_eq!(notify.url, "http://127.0.0.1:1/cb");
    assert_eq!(notify.get_header("SEQ"), Some("0"));
    assert_eq!(notify.get_header("SID"), Some(sid.as_str()));

    let renew = UpnpRequest::new("SUBSCRIBE", &path, loopback)
        .header("SID", &sid)
        .header("TIMEOUT", "Second-300");
    let response = cp.handle_request(&renew);
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("SID"), Some(sid.as_str()));
    assert_eq!(response.get_header("TIMEOUT"), Some("Second-300"));
    assert_eq!(cp.gena().subscription_count(), 1);

    let unknown = UpnpRequest::new("SUBSCRIBE", &path, loopback).header("SID", "uuid:nope");
    assert_eq!(cp.handle_request(&unknown).status, 412);

    let unsubscribe = UpnpRequest::new("UNSUBSCRIBE", &path, loopback).header("SID", &sid);
    assert_eq!(cp.handle_request(&unsubscribe).status, 200);
    assert_eq!(cp.gena().subscription_count(), 0);
}

#[test]
fn test_subscribe_without_callback_fails() {
    let hooks = HookBus::new();
    let (cp, _, _) = control_point(CannedHttp::default());
    let device = cp.add_device(hosted_device(&hooks)).unwrap();
    let path = format!("{}/{}/eventsub", device.path(), CALLABLE_SERVICE_ID);

    let request = UpnpRequest::new("SUBSCRIBE", &path, IpAddr::from(Ipv4Addr::LOCALHOST))
        .header("NT", "upnp:event");
    assert_eq!(cp.handle_request(&request).status, 412);
}

#[test]
fn test_bump_bootid_announces_update() {
    let hooks = HookBus::new();
    let (cp, _, _) = control_point(CannedHttp::default());
    cp.add_device(hosted_device(&hooks)).unwrap();
    let previous = cp.bootid();

    let next = cp.bump_bootid();
    assert_eq!(cp.bootid(), next);
    let updates: Vec<Task> = cp
        .pending_tasks()
        .into_iter()
        .map(|(_, t)| t)
        .filter(|t| {
            matches!(t, Task::DeliverEvent(a)
                if matches!(a.kind, upnpstack::ssdp::AnnouncementKind::Update { .. }))
        })
        .collect();
    assert_eq!(updates.len(), 4);
    for task in updates {
        if let Task::DeliverEvent(a) = task {
            assert_eq!(a.bootid, previous);
            assert_eq!(
                a.kind,
                upnpstack::ssdp::AnnouncementKind::Update { next_bootid: next }
            );
        }
    }
}
