//! Services hosted by this process.

use std::{
    collections::HashMap,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::identifier::parse_urn;
use crate::services::{
    ActionDef, ActionError, QUERY_STATE_VARIABLE, Scpd, ScpdError, StateVariableDef,
};
use crate::variable_types::{StateValue, get_upnp_value};

/// Decoded input arguments, keyed by argument name.
pub type ActionArgs = HashMap<String, StateValue>;

/// What a handler returns.
///
/// A single value is only accepted by actions with exactly one output;
/// otherwise outputs are looked up by argument name.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Empty,
    Value(StateValue),
    Values(HashMap<String, StateValue>),
}

impl ActionResult {
    pub fn values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<StateValue>,
    {
        ActionResult::Values(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

pub type ActionHandler =
    Arc<dyn Fn(&HostedService, &ActionArgs) -> Result<ActionResult, ActionError> + Send + Sync>;

/// Receives `(variable, wire value)` pairs of evented changes.
pub type EventSink = Arc<dyn Fn(Vec<(String, String)>) + Send + Sync>;

/// A service implemented in process.
///
/// The action table is fixed at construction: every declared action has a
/// handler (see [`ServiceBuilder`]).
pub struct HostedService {
    service_type: String,
    service_id: String,
    service_id_urn: String,
    scpd: Scpd,
    handlers: HashMap<String, ActionHandler>,
    values: RwLock<HashMap<String, String>>,
    event_sink: RwLock<Option<EventSink>>,
    /// Held from the write of a value until its sink call returns
    event_order: Mutex<()>,
}

impl fmt::Debug for HostedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedService")
            .field("service_type", &self.service_type)
            .field("service_id", &self.service_id)
            .finish()
    }
}

impl HostedService {
    /// Service type URN, e.g. `urn:schemas-upnp-org:service:AVTransport:1`.
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Short service id, used in URLs.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn service_id_urn(&self) -> &str {
        &self.service_id_urn
    }

    pub fn version(&self) -> Option<u32> {
        parse_urn(&self.service_type).and_then(|u| u.version_number())
    }

    pub fn scpd(&self) -> &Scpd {
        &self.scpd
    }

    pub fn scpd_xml(&self) -> Result<String, ScpdError> {
        self.scpd.to_xml()
    }

    /// Current wire value of a state variable.
    pub fn variable_value(&self, name: &str) -> Option<String> {
        self.values.read().get(name).cloned()
    }

    /// Current values of every evented variable, for the initial event.
    pub fn evented_values(&self) -> Vec<(String, String)> {
        let values = self.values.read();
        self.scpd
            .variables()
            .iter()
            .filter(|v| v.send_events)
            .map(|v| {
                (
                    v.name.clone(),
                    values.get(&v.name).cloned().unwrap_or_default(),
                )
            })
            .collect()
    }

    pub fn set_event_sink(&self, sink: Option<EventSink>) {
        *self.event_sink.write() = sink;
    }

    /// Updates a state variable.
    ///
    /// The value is encoded and checked against the declared constraints.
    /// Returns true when an evented variable changed; the change is then
    /// pushed to the event sink.
    pub fn set_variable(&self, name: &str, value: impl Into<StateValue>) -> Result<bool, ActionError> {
        let def = self
            .scpd
            .variable(name)
            .ok_or_else(|| ActionError::InvalidVariable(name.to_string()))?;
        let wire = encode_variable(def, &value.into())?;
        def.decode_argument(name, &wire)?;

        let _order = self.event_order.lock();
        let changed = {
            let mut values = self.values.write();
            let previous = values.insert(name.to_string(), wire.clone());
            previous.as_deref() != Some(wire.as_str())
        };

        if changed && def.send_events {
            let sink = self.event_sink.read().clone();
            if let Some(sink) = sink {
                sink(vec![(name.to_string(), wire)]);
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Dispatches a SOAP call.
    ///
    /// Input arguments fall back on the default value of their variable.
    /// Outputs are returned encoded, return value first.
    pub fn handle_soap_call(
        &self,
        action_name: &str,
        args: &HashMap<String, String>,
    ) -> Result<Vec<(String, String)>, ActionError> {
        let Some(action) = self.scpd.action(action_name) else {
            if action_name == QUERY_STATE_VARIABLE {
                return self.query_state_variable(args);
            }
            return Err(ActionError::InvalidAction(action_name.to_string()));
        };

        let mut inputs = ActionArgs::new();
        for arg in action.argument_variables() {
            let var = self.related_variable(action, &arg.related_state_variable)?;
            let wire = args
                .get(&arg.name)
                .or(var.default_value.as_ref())
                .ok_or_else(|| ActionError::MissingArgument(arg.name.clone()))?;
            inputs.insert(arg.name.clone(), var.decode_argument(&arg.name, wire)?);
        }

        let handler = self
            .handlers
            .get(action_name)
            .ok_or_else(|| ActionError::InvalidAction(action_name.to_string()))?;

        let result = catch_unwind(AssertUnwindSafe(|| handler(self, &inputs))).map_err(|_| {
            warn!(action = action_name, "action handler panicked");
            ActionError::failed(format!("{} handler panicked", action_name))
        })??;

        let outputs = action.outputs();
        let mut encoded = Vec::with_capacity(outputs.len());
        match result {
            ActionResult::Empty if outputs.is_empty() => {}
            ActionResult::Value(value) if outputs.len() == 1 => {
                let arg = outputs[0];
                let var = self.related_variable(action, &arg.related_state_variable)?;
                encoded.push((arg.name.clone(), encode_variable(var, &value)?));
            }
            ActionResult::Values(mut values) => {
                for arg in outputs {
                    let value = values.remove(&arg.name).ok_or_else(|| {
                        ActionError::failed(format!("missing output argument {}", arg.name))
                    })?;
                    let var = self.related_variable(action, &arg.related_state_variable)?;
                    encoded.push((arg.name.clone(), encode_variable(var, &value)?));
                }
            }
            other => {
                return Err(ActionError::failed(format!(
                    "{} returned {:?} for {} output argument(s)",
                    action_name,
                    other,
                    outputs.len()
                )));
            }
        }

        debug!(action = action_name, "action executed");
        Ok(encoded)
    }

    fn query_state_variable(
        &self,
        args: &HashMap<String, String>,
    ) -> Result<Vec<(String, String)>, ActionError> {
        let name = args
            .get("varName")
            .ok_or_else(|| ActionError::MissingArgument("varName".to_string()))?;
        if self.scpd.variable(name).is_none() {
            return Err(ActionError::InvalidVariable(name.clone()));
        }
        let value = self.variable_value(name).unwrap_or_default();
        Ok(vec![("return".to_string(), value)])
    }

    fn related_variable(
        &self,
        action: &ActionDef,
        name: &str,
    ) -> Result<&StateVariableDef, ActionError> {
        // Construction guarantees the reference exists
        self.scpd.variable(name).ok_or_else(|| {
            ActionError::failed(format!("{} references unknown variable {}", action.name, name))
        })
    }
}

fn encode_variable(var: &StateVariableDef, value: &StateValue) -> Result<String, ActionError> {
    get_upnp_value(&var.native_type, value)
        .map_err(|e| ActionError::failed(format!("cannot encode {}: {}", var.name, e)))
}

/// Builds a [`HostedService`] from its variables, actions and handlers.
pub struct ServiceBuilder {
    service_type: String,
    service_id: String,
    service_id_urn: Option<String>,
    variables: Vec<StateVariableDef>,
    actions: Vec<ActionDef>,
    handlers: HashMap<String, ActionHandler>,
}

impl ServiceBuilder {
    pub fn new(service_type: &str, service_id: &str) -> Self {
        Self {
            service_type: service_type.to_string(),
            service_id: service_id.to_string(),
            service_id_urn: None,
            variables: Vec::new(),
            actions: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Overrides the `urn:<domain>:serviceId:<id>` derived from the service type.
    pub fn service_id_urn(mut self, urn: &str) -> Self {
        self.service_id_urn = Some(urn.to_string());
        self
    }

    pub fn variable(mut self, variable: StateVariableDef) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn action(mut self, action: ActionDef) -> Self {
        self.actions.push(action);
        self
    }

    pub fn handler<F>(mut self, action: &str, handler: F) -> Self
    where
        F: Fn(&HostedService, &ActionArgs) -> Result<ActionResult, ActionError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(action.to_string(), Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<HostedService, ScpdError> {
        for action in &self.actions {
            if !self.handlers.contains_key(&action.name) {
                return Err(ScpdError::MissingHandler(action.name.clone()));
            }
        }
        for name in self.handlers.keys() {
            if !self.actions.iter().any(|a| &a.name == name) {
                return Err(ScpdError::UnknownAction(name.clone()));
            }
        }

        let mut values = HashMap::new();
        for var in &self.variables {
            if let Some(default) = &var.default_value {
                var.decode(default)
                    .map_err(|source| ScpdError::InvalidValue {
                        variable: var.name.clone(),
                        source,
                    })?;
                values.insert(var.name.clone(), default.clone());
            }
        }

        let scpd = Scpd::new(self.variables, self.actions)?;

        let service_id_urn = self.service_id_urn.unwrap_or_else(|| {
            let domain = match parse_urn(&self.service_type).map(|u| u.domain) {
                Some("schemas-upnp-org") | None => "upnp-org".to_string(),
                Some(domain) => domain.to_string(),
            };
            format!("urn:{}:serviceId:{}", domain, self.service_id)
        });

        Ok(HostedService {
            service_type: self.service_type,
            service_id: self.service_id,
            service_id_urn,
            scpd,
            handlers: self.handlers,
            values: RwLock::new(values),
            event_sink: RwLock::new(None),
            event_order: Mutex::new(()),
        })
    }
}
