//! `CallableService`: exposes the hook bus over SOAP.
//!
//! `CallHook(Hook, JsonArguments) -> JsonResult` calls the named hook with
//! the decoded JSON arguments and returns its result encoded as JSON.

use serde_json::Value;
use tracing::debug;

use crate::hooks::HookBus;
use crate::services::{
    ActionDef, ActionError, ActionResult, HostedService, ScpdError, ServiceBuilder,
    StateVariableDef,
};
use crate::variable_types::{StateValue, StateVarType};

pub const CALLABLE_SERVICE_TYPE: &str = "urn:schemas-upnpstack-org:service:CallableService:1";
pub const CALLABLE_SERVICE_ID: &str = "CallableService";

pub fn callable_service(hooks: HookBus) -> Result<HostedService, ScpdError> {
    ServiceBuilder::new(CALLABLE_SERVICE_TYPE, CALLABLE_SERVICE_ID)
        .variable(StateVariableDef::argument("A_ARG_TYPE_Hook", StateVarType::String))
        .variable(StateVariableDef::argument("A_ARG_TYPE_Json", StateVarType::String).default_value(""))
        .action(
            ActionDef::new("CallHook")
                .input("Hook", "A_ARG_TYPE_Hook")
                .input("JsonArguments", "A_ARG_TYPE_Json")
                .output("JsonResult", "A_ARG_TYPE_Json"),
        )
        .handler("CallHook", move |_, args| {
            let hook = args
                .get("Hook")
                .and_then(StateValue::as_str)
                .ok_or_else(|| ActionError::MissingArgument("Hook".to_string()))?;
            let raw = args
                .get("JsonArguments")
                .and_then(StateValue::as_str)
                .unwrap_or_default();

            let arguments = if raw.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(raw).map_err(|e| ActionError::ArgumentValueInvalid {
                    argument: "JsonArguments".to_string(),
                    reason: e.to_string(),
                })?
            };

            debug!(hook, "calling hook over SOAP");
            let result = hooks.call(hook, arguments).map_err(ActionError::Failed)?;
            let json = serde_json::to_string(&result).map_err(|e| ActionError::failed(e.to_string()))?;
            Ok(ActionResult::Value(StateValue::String(json)))
        })
        .build()
}
