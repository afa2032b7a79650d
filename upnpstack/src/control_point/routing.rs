//! HTTP side of the hosted devices: descriptions, SOAP control and GENA
//! subscriptions.
//!
//! Paths follow the URLs advertised in the descriptions:
//!
//! ```text
//! /upnp/<udn>/desc
//! /upnp/<udn>/icons/<file>
//! /upnp/<udn>/<serviceId>/xml
//! /upnp/<udn>/<serviceId>/control
//! /upnp/<udn>/<serviceId>/eventsub
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ControlPoint, event_key};
use crate::devices::DeviceView;
use crate::gena::{Gena, GenaError, parse_timeout_header};
use crate::http::{UpnpRequest, UpnpResponse};
use crate::identifier::device_key;
use crate::services::HostedService;
use crate::soap::{build_soap_response, parse_soap_action};

/// GENA notification type accepted by `SUBSCRIBE`.
const UPNP_EVENT: &str = "upnp:event";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint<'a> {
    Description { udn: &'a str },
    Icon { udn: &'a str, file: &'a str },
    Scpd { udn: &'a str, service_id: &'a str },
    Control { udn: &'a str, service_id: &'a str },
    EventSub { udn: &'a str, service_id: &'a str },
}

fn parse_path(path: &str) -> Option<Endpoint<'_>> {
    let path = path.split('?').next().unwrap_or(path);
    let segments: Vec<&str> = path
        .strip_prefix("/upnp/")?
        .trim_end_matches('/')
        .split('/')
        .collect();
    match segments.as_slice() {
        [udn, "desc"] => Some(Endpoint::Description { udn: *udn }),
        [udn, service_id, "xml"] => Some(Endpoint::Scpd {
            udn: *udn,
            service_id: *service_id,
        }),
        [udn, service_id, "control"] => Some(Endpoint::Control {
            udn: *udn,
            service_id: *service_id,
        }),
        [udn, service_id, "eventsub"] => Some(Endpoint::EventSub {
            udn: *udn,
            service_id: *service_id,
        }),
        [udn, "icons", file] => Some(Endpoint::Icon {
            udn: *udn,
            file: *file,
        }),
        _ => None,
    }
}

fn timeout_value(timeout: u32) -> String {
    if timeout == u32::MAX {
        "Second-infinite".to_string()
    } else {
        format!("Second-{}", timeout)
    }
}

impl ControlPoint {
    /// True if `ip` may control or subscribe to the hosted devices.
    ///
    /// With configured networks only those are accepted. Otherwise the
    /// host must have announced itself over SSDP, or searched.
    pub fn is_ip_allowed(&self, ip: IpAddr) -> bool {
        if ip.is_loopback() {
            return true;
        }
        if !self.settings.allowed_networks.is_empty() {
            return self
                .settings
                .allowed_networks
                .iter()
                .any(|net| net.contains(&ip));
        }
        let state = self.state.lock();
        state.searchers.contains(&ip) || state.usns.values().any(|e| e.ips.contains(&ip))
    }

    /// Answers an HTTP request addressed to a hosted device.
    pub fn handle_request(&self, request: &UpnpRequest) -> UpnpResponse {
        let Some(endpoint) = parse_path(&request.path) else {
            return UpnpResponse::status(404);
        };
        let udn = match endpoint {
            Endpoint::Description { udn }
            | Endpoint::Icon { udn, .. }
            | Endpoint::Scpd { udn, .. }
            | Endpoint::Control { udn, .. }
            | Endpoint::EventSub { udn, .. } => udn,
        };
        let Some(root) = self.managed_device(udn) else {
            debug!("HTTP: no hosted device {}", udn);
            return UpnpResponse::status(404);
        };
        let Some(device) = root.find_device(udn) else {
            return UpnpResponse::status(404);
        };

        match endpoint {
            Endpoint::Description { .. } => {
                if !request.method.eq_ignore_ascii_case("GET") {
                    return UpnpResponse::status(400);
                }
                if device_key(root.udn()) != device_key(udn) {
                    return UpnpResponse::status(404);
                }
                match root.get_xml() {
                    Ok(xml) => UpnpResponse::xml(200, xml),
                    Err(e) => {
                        warn!(udn = %udn, "cannot serialise description: {}", e);
                        UpnpResponse::status(500)
                    }
                }
            }
            Endpoint::Icon { file, .. } => {
                if !request.method.eq_ignore_ascii_case("GET") {
                    return UpnpResponse::status(400);
                }
                match device.icon(file) {
                    Some((mimetype, bytes)) => {
                        let mut response =
                            UpnpResponse::status(200).header("Content-Type", &mimetype);
                        response.body = bytes;
                        response
                    }
                    None => UpnpResponse::status(404),
                }
            }
            Endpoint::Scpd { service_id, .. } => {
                if !request.method.eq_ignore_ascii_case("GET") {
                    return UpnpResponse::status(400);
                }
                let Some(service) = device.service(service_id) else {
                    return UpnpResponse::status(404);
                };
                match service.scpd_xml() {
                    Ok(xml) => UpnpResponse::xml(200, xml),
                    Err(e) => {
                        warn!(service = %service_id, "cannot serialise SCPD: {}", e);
                        UpnpResponse::status(500)
                    }
                }
            }
            Endpoint::Control { service_id, .. } => {
                let Some(service) = device.service(service_id) else {
                    return UpnpResponse::status(404);
                };
                if !request.method.eq_ignore_ascii_case("POST") {
                    return UpnpResponse::status(400);
                }
                if !self.is_ip_allowed(request.remote_ip) {
                    warn!("HTTP: control from {} refused", request.remote_ip);
                    return UpnpResponse::status(403);
                }
                self.handle_control(service, request)
            }
            Endpoint::EventSub { service_id, .. } => {
                let Some(service) = device.service(service_id) else {
                    return UpnpResponse::status(404);
                };
                if !self.is_ip_allowed(request.remote_ip) {
                    warn!("HTTP: subscription from {} refused", request.remote_ip);
                    return UpnpResponse::status(403);
                }
                let key = event_key(device.udn(), service.service_id());
                match request.method.to_ascii_uppercase().as_str() {
                    "SUBSCRIBE" => self.handle_subscribe(&key, service, request),
                    "UNSUBSCRIBE" => self.handle_unsubscribe(&key, request),
                    _ => UpnpResponse::status(400),
                }
            }
        }
    }

    fn handle_control(&self, service: &HostedService, request: &UpnpRequest) -> UpnpResponse {
        let action = match parse_soap_action(&request.body) {
            Ok(action) => action,
            Err(e) => {
                debug!("HTTP: malformed SOAP request: {}", e);
                return UpnpResponse::status(400);
            }
        };

        match service.handle_soap_call(&action.name, &action.args) {
            Ok(values) => match build_soap_response(service.service_type(), &action.name, &values) {
                Ok(xml) => UpnpResponse::xml(200, xml),
                Err(e) => {
                    warn!(action = %action.name, "cannot serialise SOAP response: {}", e);
                    UpnpResponse::status(500)
                }
            },
            Err(e) => {
                debug!(action = %action.name, "action failed: {}", e);
                match e.to_fault().to_xml() {
                    Ok(xml) => UpnpResponse::xml(500, xml),
                    Err(_) => UpnpResponse::status(500),
                }
            }
        }
    }

    fn handle_subscribe(
        &self,
        key: &str,
        service: &Arc<HostedService>,
        request: &UpnpRequest,
    ) -> UpnpResponse {
        let timeout = request
            .get_header("TIMEOUT")
            .and_then(|t| parse_timeout_header(t).ok());

        if let Some(sid) = request.get_header("SID") {
            if request.get_header("CALLBACK").is_some() || request.get_header("NT").is_some() {
                return UpnpResponse::status(400);
            }
            return match self.gena.reregister(key, sid.trim(), timeout) {
                Ok(granted) => UpnpResponse::status(200)
                    .header("SID", sid.trim())
                    .header("TIMEOUT", &timeout_value(granted)),
                Err(_) => UpnpResponse::status(412),
            };
        }

        let (Some(callback), Some(nt)) = (request.get_header("CALLBACK"), request.get_header("NT"))
        else {
            return UpnpResponse::status(412);
        };
        if !nt.trim().eq_ignore_ascii_case(UPNP_EVENT) {
            return UpnpResponse::status(412);
        }

        let evented = service.evented_values();
        let variables: Option<Vec<String>> = request.get_header("STATEVAR").map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|name| evented.iter().any(|(n, _)| n == name))
                .map(str::to_string)
                .collect()
        });

        let subscription = match self.gena.register(key, callback, timeout, variables) {
            Ok(subscription) => subscription,
            Err(GenaError::InvalidCallback(reason)) => {
                debug!("HTTP: invalid callback: {}", reason);
                return UpnpResponse::status(412);
            }
            Err(e) => {
                warn!("subscription failed: {}", e);
                return UpnpResponse::status(500);
            }
        };

        let mut response = UpnpResponse::status(200)
            .header("SID", &subscription.sid)
            .header("TIMEOUT", &timeout_value(subscription.timeout));
        let initial: Vec<(String, String)> = match &subscription.variables {
            Some(filter) => {
                response = response.header("ACCEPTED-STATEVAR", &filter.join(","));
                evented
                    .into_iter()
                    .filter(|(n, _)| filter.contains(n))
                    .collect()
            }
            None => evented,
        };

        let delivery = Gena::initial_delivery(&subscription, &initial);
        let http = self.http.clone();
        self.submit(move || {
            if let Err(e) = delivery.send(http.as_ref()) {
                warn!("{}", e);
            }
        });
        response
    }

    fn handle_unsubscribe(&self, key: &str, request: &UpnpRequest) -> UpnpResponse {
        let Some(sid) = request.get_header("SID") else {
            return UpnpResponse::status(412);
        };
        if request.get_header("CALLBACK").is_some() || request.get_header("NT").is_some() {
            return UpnpResponse::status(400);
        }
        match self.gena.deregister(key, sid.trim()) {
            Ok(()) => UpnpResponse::status(200),
            Err(_) => UpnpResponse::status(412),
        }
    }
}
