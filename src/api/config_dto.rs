use serde::Deserialize;

use crate::db::value::{DataType, Value};
use crate::domain::NAME_LENGTH;
use crate::domain::application_class::ClassOrder;
use crate::domain::attribute::{AttributeAccess, AttributeDef};
use crate::error::{Error, Result};

/// Root of the JSON configuration: the declarations the engine accepts.
/// Manager hooks and the veto hook are code, not configuration, and are
/// installed through the in-process API.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfigDto {
    #[serde(default)]
    pub zone_attributes: Vec<AttributeDefDto>,
    #[serde(default)]
    pub zones: Vec<ZoneDto>,
    #[serde(default)]
    pub application_classes: Vec<ApplicationClassDto>,
    #[serde(default)]
    pub resources: Vec<ResourceDefDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeDefDto {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default = "default_access")]
    pub access: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

fn default_access() -> String {
    "rw".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeValueDto {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneDto {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeValueDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationClassDto {
    pub name: String,
    pub priority: u32,
    #[serde(default)]
    pub modal: bool,
    #[serde(default)]
    pub share: bool,
    #[serde(default = "default_order")]
    pub order: String,
}

fn default_order() -> String {
    "fifo".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDefDto {
    pub name: String,
    #[serde(default)]
    pub shareable: bool,
    #[serde(default)]
    pub attributes: Vec<AttributeDefDto>,
}

impl AttributeDefDto {
    pub fn to_domain(&self) -> Result<AttributeDef> {
        let data_type = parse_data_type(&self.typ)?;

        let access = match self.access.to_ascii_lowercase().as_str() {
            "r" => AttributeAccess::Read,
            "w" => AttributeAccess::Write,
            "rw" => AttributeAccess::ReadWrite,
            "none" => AttributeAccess::None,
            other => {
                return Err(Error::InvalidArg(format!(
                    "attribute access '{}' of '{}'",
                    other, self.name
                )));
            }
        };

        let default = match &self.default {
            Some(json) => value_from_json(json, &data_type)?,
            None => Value::default_for(&data_type),
        };

        Ok(AttributeDef::new(self.name.clone(), data_type, access, default))
    }
}

impl ApplicationClassDto {
    pub fn parsed_order(&self) -> Result<ClassOrder> {
        match self.order.to_ascii_lowercase().as_str() {
            "fifo" => Ok(ClassOrder::Fifo),
            "lifo" => Ok(ClassOrder::Lifo),
            other => Err(Error::InvalidArg(format!(
                "order '{}' of class '{}'",
                other, self.name
            ))),
        }
    }
}

fn parse_data_type(name: &str) -> Result<DataType> {
    match name.to_ascii_lowercase().as_str() {
        "string" => Ok(DataType::varchar(NAME_LENGTH)),
        "int" | "integer" => Ok(DataType::Integer),
        "uint" | "unsigned" => Ok(DataType::Unsigned),
        "double" | "floating" => Ok(DataType::Floating),
        other => Err(Error::InvalidArg(format!("attribute type '{}'", other))),
    }
}

/// Converts a JSON scalar into a typed value, guided by the declared type.
pub fn value_from_json(json: &serde_json::Value, data_type: &DataType) -> Result<Value> {
    let value = match (json, data_type) {
        (serde_json::Value::String(s), DataType::String { .. }) => Value::String(s.clone()),
        (serde_json::Value::Number(n), DataType::Integer) => {
            Value::Integer(n.as_i64().and_then(|v| i32::try_from(v).ok()).ok_or_else(|| {
                Error::InvalidArg(format!("{} is not a 32-bit integer", n))
            })?)
        }
        (serde_json::Value::Number(n), DataType::Unsigned) => {
            Value::Unsigned(n.as_u64().and_then(|v| u32::try_from(v).ok()).ok_or_else(|| {
                Error::InvalidArg(format!("{} is not a 32-bit unsigned", n))
            })?)
        }
        (serde_json::Value::Number(n), DataType::Floating) => {
            Value::Floating(n.as_f64().ok_or_else(|| {
                Error::InvalidArg(format!("{} is not a double", n))
            })?)
        }
        (json, data_type) => {
            return Err(Error::InvalidArg(format!(
                "JSON value {} does not fit declared type {:?}",
                json, data_type
            )));
        }
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let json = r#"{
            "zone_attributes": [
                { "name": "occupants", "type": "uint", "default": 1 }
            ],
            "zones": [
                { "name": "driver", "attributes": [ { "name": "occupants", "value": 2 } ] }
            ],
            "application_classes": [
                { "name": "alert", "priority": 7, "modal": true },
                { "name": "player", "priority": 1, "share": true, "order": "lifo" }
            ],
            "resources": [
                { "name": "audio_playback", "shareable": true,
                  "attributes": [ { "name": "role", "type": "string", "default": "music" } ] }
            ]
        }"#;

        let config: SystemConfigDto = serde_json::from_str(json).unwrap();
        assert_eq!(config.zones.len(), 1);
        assert_eq!(config.application_classes[1].parsed_order().unwrap(), ClassOrder::Lifo);

        let def = config.resources[0].attributes[0].to_domain().unwrap();
        assert_eq!(def.default, Value::String("music".to_string()));
        assert!(def.access.readable() && def.access.writable());
    }

    #[test]
    fn bad_declarations_are_rejected() {
        let dto = AttributeDefDto {
            name: "x".to_string(),
            typ: "quaternion".to_string(),
            access: "rw".to_string(),
            default: None,
        };
        assert!(dto.to_domain().is_err());

        assert!(value_from_json(&serde_json::json!(-1), &DataType::Unsigned).is_err());
        assert!(value_from_json(&serde_json::json!("x"), &DataType::Integer).is_err());
    }
}
