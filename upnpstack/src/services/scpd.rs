//! Service Control Protocol Description: parsing and serialisation.

use xmltree::{Element, XMLNode};

use crate::services::{ActionDef, ArgumentDef, Direction, ScpdError, StateVariableDef};
use crate::value_ranges::ValueRange;
use crate::variable_types::{NativeType, StateVarType, get_native, get_native_type, get_upnp_value};
use crate::xml::{child_elements, child_text, element_to_string, parse_element, push_text_child};

pub const SERVICE_NS: &str = "urn:schemas-upnp-org:service-1-0";
pub const QUERY_STATE_VARIABLE: &str = "QueryStateVariable";

/// Parsed SCPD: ordered action and state variable tables.
///
/// Every argument references an existing variable; a value of this type is
/// never half built.
#[derive(Debug, Clone, PartialEq)]
pub struct Scpd {
    pub spec_version: (u32, u32),
    actions: Vec<ActionDef>,
    variables: Vec<StateVariableDef>,
}

/// Definition of the implicit `QueryStateVariable` action.
pub fn query_state_variable_action() -> ActionDef {
    ActionDef::new(QUERY_STATE_VARIABLE)
        .input("varName", "A_ARG_TYPE_VarName")
        .retval("return", "A_ARG_TYPE_return")
}

impl Scpd {
    /// Checks the tables and builds the description.
    pub fn new(
        variables: Vec<StateVariableDef>,
        actions: Vec<ActionDef>,
    ) -> Result<Self, ScpdError> {
        for (i, var) in variables.iter().enumerate() {
            if variables[..i].iter().any(|v| v.name == var.name) {
                return Err(ScpdError::Duplicate(format!("state variable {}", var.name)));
            }
            check_constraints(var)?;
        }

        for (i, action) in actions.iter().enumerate() {
            if actions[..i].iter().any(|a| a.name == action.name) {
                return Err(ScpdError::Duplicate(format!("action {}", action.name)));
            }
            if action.arguments.iter().filter(|a| a.retval).count() > 1 {
                return Err(ScpdError::MultipleReturnValues(action.name.clone()));
            }
            for argument in &action.arguments {
                if !variables
                    .iter()
                    .any(|v| v.name == argument.related_state_variable)
                {
                    return Err(ScpdError::UnknownRelatedVariable {
                        action: action.name.clone(),
                        argument: argument.name.clone(),
                        variable: argument.related_state_variable.clone(),
                    });
                }
            }
        }

        Ok(Self {
            spec_version: (1, 0),
            actions,
            variables,
        })
    }

    pub fn actions(&self) -> &[ActionDef] {
        &self.actions
    }

    pub fn variables(&self) -> &[StateVariableDef] {
        &self.variables
    }

    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&StateVariableDef> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Parses an SCPD document.
    pub fn parse(xml: &[u8]) -> Result<Self, ScpdError> {
        let root = parse_element(xml)?;
        if root.name != "scpd" {
            return Err(ScpdError::NotScpd(root.name.clone()));
        }

        let spec_version = parse_spec_version(&root);

        let variables = match root.get_child("serviceStateTable") {
            Some(table) => child_elements(table)
                .filter(|e| e.name == "stateVariable")
                .map(parse_state_variable)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let actions = match root.get_child("actionList") {
            Some(list) => child_elements(list)
                .filter(|e| e.name == "action")
                .map(parse_action)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let mut scpd = Self::new(variables, actions)?;
        scpd.spec_version = spec_version;
        Ok(scpd)
    }

    /// Serialises the description as served on the SCPD URL.
    pub fn to_xml(&self) -> Result<String, ScpdError> {
        let mut root = Element::new("scpd");
        root.attributes
            .insert("xmlns".to_string(), SERVICE_NS.to_string());
        root.children
            .push(XMLNode::Element(spec_version_element(self.spec_version)));

        if !self.actions.is_empty() {
            let mut list = Element::new("actionList");
            for action in &self.actions {
                list.children.push(XMLNode::Element(action_element(action)));
            }
            root.children.push(XMLNode::Element(list));
        }

        let mut table = Element::new("serviceStateTable");
        for var in &self.variables {
            table.children.push(XMLNode::Element(variable_element(var)?));
        }
        root.children.push(XMLNode::Element(table));

        element_to_string(&root).map_err(|e| ScpdError::XmlWrite(e.to_string()))
    }
}

pub(crate) fn parse_spec_version(parent: &Element) -> (u32, u32) {
    let Some(spec) = parent.get_child("specVersion") else {
        return (1, 0);
    };
    let major = child_text(spec, "major")
        .and_then(|m| m.parse().ok())
        .unwrap_or(1);
    let minor = child_text(spec, "minor")
        .and_then(|m| m.parse().ok())
        .unwrap_or(0);
    (major, minor)
}

pub(crate) fn spec_version_element(version: (u32, u32)) -> Element {
    let mut spec = Element::new("specVersion");
    push_text_child(&mut spec, "major", &version.0.to_string());
    push_text_child(&mut spec, "minor", &version.1.to_string());
    spec
}

fn check_constraints(var: &StateVariableDef) -> Result<(), ScpdError> {
    match (&var.allowed_values, &var.value_range) {
        (Some(_), Some(_)) => Err(ScpdError::ConflictingConstraints(var.name.clone())),
        (Some(_), None) if var.data_type != StateVarType::String => {
            Err(ScpdError::AllowedValuesOnNonString(var.name.clone()))
        }
        (None, Some(_)) if !var.data_type.is_numeric() => {
            Err(ScpdError::RangeOnNonNumeric(var.name.clone()))
        }
        _ => Ok(()),
    }
}

fn yes_no(value: Option<&String>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "yes" || v == "1" || v == "true" => true,
        Some(v) if v == "no" || v == "0" || v == "false" => false,
        _ => default,
    }
}

fn parse_state_variable(elem: &Element) -> Result<StateVariableDef, ScpdError> {
    let name = child_text(elem, "name")
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ScpdError::MissingElement("stateVariable/name".to_string()))?;

    let data_type_elem = elem
        .get_child("dataType")
        .ok_or_else(|| ScpdError::MissingElement(format!("{}/dataType", name)))?;
    let data_type_text = data_type_elem
        .get_text()
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    let unknown = || ScpdError::UnknownDataType {
        variable: name.clone(),
        data_type: data_type_text.clone(),
    };
    let data_type: StateVarType = data_type_text.parse().map_err(|_| unknown())?;
    let native_type = get_native_type(
        &data_type_text,
        data_type_elem.attributes.get("type").map(String::as_str),
    )
    .ok_or_else(unknown)?;

    let allowed_values = elem.get_child("allowedValueList").map(|list| {
        child_elements(list)
            .filter(|e| e.name == "allowedValue")
            .map(|e| e.get_text().unwrap_or_default().trim().to_string())
            .collect::<Vec<_>>()
    });

    let value_range = match elem.get_child("allowedValueRange") {
        Some(range) => Some(parse_range(&name, &native_type, range)?),
        None => None,
    };

    let var = StateVariableDef {
        send_events: yes_no(elem.attributes.get("sendEvents"), true),
        multicast: yes_no(elem.attributes.get("multicast"), false),
        default_value: child_text(elem, "defaultValue"),
        name,
        data_type,
        native_type,
        allowed_values,
        value_range,
    };
    check_constraints(&var)?;
    Ok(var)
}

fn parse_range(name: &str, native: &NativeType, range: &Element) -> Result<ValueRange, ScpdError> {
    let bound = |tag: &str| -> Result<Option<_>, ScpdError> {
        match child_text(range, tag) {
            Some(text) => get_native(native, &text)
                .map(Some)
                .map_err(|source| ScpdError::InvalidValue {
                    variable: name.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    };

    let invalid = |source| ScpdError::InvalidValue {
        variable: name.to_string(),
        source,
    };

    let minimum = bound("minimum")?
        .ok_or_else(|| ScpdError::MissingElement(format!("{}/allowedValueRange/minimum", name)))?;
    let maximum = bound("maximum")?
        .ok_or_else(|| ScpdError::MissingElement(format!("{}/allowedValueRange/maximum", name)))?;

    let mut value_range = ValueRange::new(minimum, maximum).map_err(invalid)?;
    if let Some(step) = bound("step")? {
        value_range = value_range.with_step(step).map_err(invalid)?;
    }
    Ok(value_range)
}

fn parse_action(elem: &Element) -> Result<ActionDef, ScpdError> {
    let name = child_text(elem, "name")
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ScpdError::MissingElement("action/name".to_string()))?;

    let mut arguments = Vec::new();
    if let Some(list) = elem.get_child("argumentList") {
        for arg in child_elements(list).filter(|e| e.name == "argument") {
            let arg_name = child_text(arg, "name")
                .ok_or_else(|| ScpdError::MissingElement(format!("{}/argument/name", name)))?;
            let direction_text = child_text(arg, "direction").unwrap_or_default();
            let direction = match direction_text.to_ascii_lowercase().as_str() {
                "in" => Direction::In,
                "out" => Direction::Out,
                _ => {
                    return Err(ScpdError::InvalidDirection {
                        action: name.clone(),
                        argument: arg_name,
                        direction: direction_text,
                    });
                }
            };
            let related_state_variable = child_text(arg, "relatedStateVariable")
                .ok_or_else(|| {
                    ScpdError::MissingElement(format!("{}/{}/relatedStateVariable", name, arg_name))
                })?;

            arguments.push(ArgumentDef {
                retval: direction == Direction::Out && arg.get_child("retval").is_some(),
                name: arg_name,
                direction,
                related_state_variable,
            });
        }
    }

    Ok(ActionDef { name, arguments })
}

fn action_element(action: &ActionDef) -> Element {
    let mut elem = Element::new("action");
    push_text_child(&mut elem, "name", &action.name);

    if !action.arguments.is_empty() {
        let mut list = Element::new("argumentList");
        for arg in &action.arguments {
            let mut a = Element::new("argument");
            push_text_child(&mut a, "name", &arg.name);
            push_text_child(&mut a, "direction", &arg.direction.to_string());
            if arg.retval {
                a.children.push(XMLNode::Element(Element::new("retval")));
            }
            push_text_child(&mut a, "relatedStateVariable", &arg.related_state_variable);
            list.children.push(XMLNode::Element(a));
        }
        elem.children.push(XMLNode::Element(list));
    }
    elem
}

fn variable_element(var: &StateVariableDef) -> Result<Element, ScpdError> {
    let mut elem = Element::new("stateVariable");
    elem.attributes.insert(
        "sendEvents".to_string(),
        if var.send_events { "yes" } else { "no" }.to_string(),
    );
    if var.multicast {
        elem.attributes
            .insert("multicast".to_string(), "yes".to_string());
    }
    push_text_child(&mut elem, "name", &var.name);

    let mut data_type = Element::new("dataType");
    if let NativeType::Xmlns { urn } = &var.native_type {
        data_type.attributes.insert("type".to_string(), urn.clone());
    }
    data_type
        .children
        .push(XMLNode::Text(var.data_type.to_string()));
    elem.children.push(XMLNode::Element(data_type));

    if let Some(default) = &var.default_value {
        push_text_child(&mut elem, "defaultValue", default);
    }

    if let Some(allowed) = &var.allowed_values {
        let mut list = Element::new("allowedValueList");
        for value in allowed {
            push_text_child(&mut list, "allowedValue", value);
        }
        elem.children.push(XMLNode::Element(list));
    }

    if let Some(range) = &var.value_range {
        let encode = |v| {
            get_upnp_value(&var.native_type, v).map_err(|source| ScpdError::InvalidValue {
                variable: var.name.clone(),
                source,
            })
        };
        let mut r = Element::new("allowedValueRange");
        push_text_child(&mut r, "minimum", &encode(range.minimum())?);
        push_text_child(&mut r, "maximum", &encode(range.maximum())?);
        if let Some(step) = range.step() {
            push_text_child(&mut r, "step", &encode(step)?);
        }
        elem.children.push(XMLNode::Element(r));
    }

    Ok(elem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable_types::StateValue;

    const SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <actionList>
    <action>
      <name>SetVolume</name>
      <argumentList>
        <argument>
          <name>InstanceID</name>
          <direction>in</direction>
          <relatedStateVariable>A_ARG_TYPE_InstanceID</relatedStateVariable>
        </argument>
        <argument>
          <name>DesiredVolume</name>
          <direction>in</direction>
          <relatedStateVariable>Volume</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
    <action>
      <name>GetVolume</name>
      <argumentList>
        <argument>
          <name>CurrentVolume</name>
          <direction>out</direction>
          <retval/>
          <relatedStateVariable>Volume</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="no">
      <name>A_ARG_TYPE_InstanceID</name>
      <dataType>ui4</dataType>
    </stateVariable>
    <stateVariable>
      <name>Volume</name>
      <dataType>ui2</dataType>
      <defaultValue>20</defaultValue>
      <allowedValueRange>
        <minimum>0</minimum>
        <maximum>100</maximum>
        <step>1</step>
      </allowedValueRange>
    </stateVariable>
    <stateVariable sendEvents="yes" multicast="yes">
      <name>Mode</name>
      <dataType>string</dataType>
      <allowedValueList>
        <allowedValue>NORMAL</allowedValue>
        <allowedValue>SHUFFLE</allowedValue>
      </allowedValueList>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

    #[test]
    fn test_parse_scpd() {
        let scpd = Scpd::parse(SCPD.as_bytes()).unwrap();
        assert_eq!(scpd.spec_version, (1, 1));
        assert_eq!(scpd.actions().len(), 2);

        let instance = scpd.variable("A_ARG_TYPE_InstanceID").unwrap();
        assert!(!instance.send_events);
        assert!(!instance.multicast);

        let volume = scpd.variable("Volume").unwrap();
        assert!(volume.send_events);
        assert_eq!(volume.data_type, StateVarType::UI2);
        assert_eq!(volume.default_value.as_deref(), Some("20"));
        assert!(volume.value_range.as_ref().unwrap().is_in_range(&StateValue::UI2(100)));

        let mode = scpd.variable("Mode").unwrap();
        assert!(mode.multicast);
        assert_eq!(mode.allowed_values.as_ref().unwrap().len(), 2);

        let get = scpd.action("GetVolume").unwrap();
        assert_eq!(get.return_variable().unwrap().name, "CurrentVolume");
    }

    #[test]
    fn test_unknown_related_variable_fails() {
        let xml = SCPD.replace(
            "<relatedStateVariable>Volume</relatedStateVariable>\n        </argument>\n      </argumentList>\n    </action>\n    <action>",
            "<relatedStateVariable>Missing</relatedStateVariable>\n        </argument>\n      </argumentList>\n    </action>\n    <action>",
        );
        assert!(matches!(
            Scpd::parse(xml.as_bytes()),
            Err(ScpdError::UnknownRelatedVariable { .. })
        ));
    }

    #[test]
    fn test_allowed_list_on_integer_fails() {
        let xml = SCPD.replace(
            "<dataType>string</dataType>",
            "<dataType>ui4</dataType>",
        );
        assert!(matches!(
            Scpd::parse(xml.as_bytes()),
            Err(ScpdError::AllowedValuesOnNonString(_))
        ));
    }

    #[test]
    fn test_conflicting_constraints_fail() {
        let xml = SCPD.replace(
            "<defaultValue>20</defaultValue>",
            "<defaultValue>20</defaultValue><allowedValueList><allowedValue>1</allowedValue></allowedValueList>",
        );
        assert!(matches!(
            Scpd::parse(xml.as_bytes()),
            Err(ScpdError::ConflictingConstraints(_))
        ));
    }

    #[test]
    fn test_unknown_data_type_fails() {
        let xml = SCPD.replace("<dataType>ui2</dataType>", "<dataType>ui3</dataType>");
        assert!(matches!(
            Scpd::parse(xml.as_bytes()),
            Err(ScpdError::UnknownDataType { .. })
        ));
    }

    #[test]
    fn test_to_xml_round_trip() {
        let scpd = Scpd::parse(SCPD.as_bytes()).unwrap();
        let xml = scpd.to_xml().unwrap();
        let reparsed = Scpd::parse(xml.as_bytes()).unwrap();
        assert_eq!(scpd, reparsed);
    }

    #[test]
    fn test_query_state_variable_shape() {
        let action = query_state_variable_action();
        assert_eq!(action.argument_variables().count(), 1);
        assert_eq!(action.return_variable().unwrap().name, "return");
    }
}
