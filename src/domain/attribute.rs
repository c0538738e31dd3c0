use crate::db::value::{DataType, Value};

/// Access mask of an attribute definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeAccess {
    None,
    Read,
    Write,
    ReadWrite,
}

impl AttributeAccess {
    pub fn readable(self) -> bool {
        matches!(self, AttributeAccess::Read | AttributeAccess::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, AttributeAccess::Write | AttributeAccess::ReadWrite)
    }
}

/// A typed attribute declaration: name, type, access mask and the default
/// value substituted whenever a write does not (or may not) supply one.
#[derive(Debug, Clone)]
pub struct AttributeDef {
    pub name: String,
    pub data_type: DataType,
    pub access: AttributeAccess,
    pub default: Value,
}

impl AttributeDef {
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        access: AttributeAccess,
        default: Value,
    ) -> Self {
        let default = if default.matches_type(&data_type) {
            default
        } else {
            Value::default_for(&data_type)
        };
        Self { name: name.into(), data_type, access, default }
    }
}

/// A named value, the unit of the attribute read/write API.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: Value,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self { name: name.into(), value }
    }
}

/// Deep copy of a definition vector.
pub fn copy_definitions(from: &[AttributeDef]) -> Vec<AttributeDef> {
    from.to_vec()
}

/// Reads one attribute. Returns `None` past the end of the definitions;
/// when read access is denied the result is a zero-valued attribute with
/// an empty name.
pub fn get_value(idx: usize, defs: &[AttributeDef], values: &[Value]) -> Option<Attribute> {
    let def = defs.get(idx)?;

    if !def.access.readable() {
        return Some(Attribute::new("", Value::default_for(&def.data_type)));
    }

    Some(Attribute::new(def.name.clone(), values[idx].clone()))
}

/// Reads all attributes, excluding the ones lacking read access.
pub fn get_all_values(defs: &[AttributeDef], values: &[Value]) -> Vec<Attribute> {
    defs.iter()
        .zip(values.iter())
        .filter(|(def, _)| def.access.readable())
        .map(|(def, value)| Attribute::new(def.name.clone(), value.clone()))
        .collect()
}

/// Fills `values` from an input list: for each definition, a writable
/// attribute named in the input with a matching type is taken, anything
/// else falls back to the definition's default. A type-mismatching input
/// is ignored in favor of the default.
pub fn set_values(inputs: &[Attribute], defs: &[AttributeDef], values: &mut Vec<Value>) {
    values.clear();

    for def in defs {
        let supplied = if def.access.writable() {
            inputs
                .iter()
                .find(|a| a.name == def.name && a.value.matches_type(&def.data_type))
                .map(|a| a.value.clone())
        } else {
            None
        };

        values.push(supplied.unwrap_or_else(|| def.default.clone()));
    }
}
