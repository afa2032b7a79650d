//! Proxy for a service of a discovered device.

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::http::{HttpClient, HttpRequest};
use crate::identifier::parse_urn;
use crate::services::{ActionError, Scpd, ScpdError, ServiceInfo};
use crate::soap::{SoapParseError, build_soap_request, parse_soap_response};
use crate::variable_types::{StateValue, get_upnp_value};

/// Service announced by a remote device.
///
/// The SCPD is fetched on first use and kept; concurrent first accesses
/// wait for a single fetch.
#[derive(Debug)]
pub struct RemoteService {
    info: ServiceInfo,
    scpd: OnceCell<Scpd>,
}

impl RemoteService {
    /// `info` URLs must already be absolute.
    pub fn new(info: ServiceInfo) -> Self {
        Self {
            info,
            scpd: OnceCell::new(),
        }
    }

    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    pub fn service_type(&self) -> &str {
        &self.info.service_type
    }

    pub fn service_id(&self) -> &str {
        self.info.service_id()
    }

    pub fn version(&self) -> Option<u32> {
        parse_urn(&self.info.service_type).and_then(|u| u.version_number())
    }

    pub fn is_initialized(&self) -> bool {
        self.scpd.get().is_some()
    }

    /// Fetches and parses the SCPD once.
    pub fn init_scpd(&self, http: &dyn HttpClient) -> Result<&Scpd, ScpdError> {
        self.scpd.get_or_try_init(|| {
            debug!(url = %self.info.scpd_url, "fetching SCPD");
            let body = http.fetch(&self.info.scpd_url)?;
            Scpd::parse(&body).inspect_err(|e| {
                warn!(url = %self.info.scpd_url, "invalid SCPD: {}", e);
            })
        })
    }

    /// Calls `action` on the remote service.
    ///
    /// Inputs are encoded with the types declared in the SCPD and outputs
    /// decoded the same way. A SOAP fault becomes [`ActionError::Remote`].
    pub fn call_action(
        &self,
        http: &dyn HttpClient,
        action_name: &str,
        args: &[(&str, StateValue)],
    ) -> Result<HashMap<String, StateValue>, ActionError> {
        let scpd = self
            .init_scpd(http)
            .map_err(|e| ActionError::Transport(e.to_string()))?;
        let action = scpd
            .action(action_name)
            .ok_or_else(|| ActionError::InvalidAction(action_name.to_string()))?;

        let mut encoded = Vec::new();
        for arg in action.argument_variables() {
            let value = args
                .iter()
                .find(|(name, _)| *name == arg.name)
                .map(|(_, v)| v)
                .ok_or_else(|| ActionError::MissingArgument(arg.name.clone()))?;
            let var = scpd
                .variable(&arg.related_state_variable)
                .ok_or_else(|| ActionError::InvalidVariable(arg.related_state_variable.clone()))?;
            let wire = get_upnp_value(&var.native_type, value).map_err(|e| {
                ActionError::ArgumentValueInvalid {
                    argument: arg.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            encoded.push((arg.name.as_str(), wire));
        }

        let pairs: Vec<(&str, &str)> = encoded.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let body = build_soap_request(&self.info.service_type, action_name, &pairs)
            .map_err(|e| ActionError::Transport(e.to_string()))?;

        let request = HttpRequest::post(&self.info.control_url, body)
            .header("Content-Type", r#"text/xml; charset="utf-8""#)
            .header(
                "SOAPAction",
                &format!(r#""{}#{}""#, self.info.service_type, action_name),
            );
        let response = http
            .request(request)
            .map_err(|e| ActionError::Transport(e.to_string()))?;

        let values = match parse_soap_response(&response.body, action_name) {
            Ok(values) => values,
            Err(SoapParseError::Fault(fault)) => {
                let (code, description) = match &fault.upnp_error {
                    Some(e) => (e.error_code, e.error_description.clone()),
                    None => (response.status, fault.fault_string.clone()),
                };
                return Err(ActionError::Remote { code, description });
            }
            Err(e) => {
                return Err(ActionError::Transport(format!(
                    "HTTP {} from {}: {}",
                    response.status, self.info.control_url, e
                )));
            }
        };

        let mut result = HashMap::new();
        for (name, wire) in values {
            let declared = action.outputs().into_iter().find(|a| a.name == name);
            let value = match declared.and_then(|a| scpd.variable(&a.related_state_variable)) {
                Some(var) => var.decode(&wire).map_err(|e| {
                    ActionError::failed(format!("invalid value for {}: {}", name, e))
                })?,
                None => StateValue::String(wire),
            };
            result.insert(name, value);
        }
        Ok(result)
    }
}
