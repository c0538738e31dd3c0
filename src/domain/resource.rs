use std::rc::Rc;

use crate::db::table::ColumnDef;
use crate::db::value::{DataType, Value};
use crate::db::{Database, TableId};
use crate::domain::NAME_LENGTH;
use crate::domain::attribute::{self, Attribute, AttributeDef};
use crate::domain::zone::Zone;
use crate::error::{Error, Result};

/// Resource ids are bit indexes into a [`ResourceMask`].
pub const RESOURCE_MAX: usize = 32;
pub const RESOURCE_ID_INVALID: u32 = u32::MAX;

pub type ResourceMask = u32;

/// Optional per-resource-definition policy hooks consulted by the
/// arbitration engine: `init` at the start of a recomputation, `allocate`
/// and `free` around tentative grants, `advice` for the weaker
/// would-it-be-grantable check, and `commit` when the recomputation is
/// done. A hook that keeps state does so behind interior mutability.
pub trait ManagerHook {
    fn init(&self, _zone: &Zone) {}

    fn allocate(&self, _zone: &Zone, _resource: &ResourceInstance) -> bool {
        true
    }

    fn free(&self, _zone: &Zone, _resource: &ResourceInstance) {}

    fn advice(&self, _zone: &Zone, _resource: &ResourceInstance) -> bool {
        true
    }

    fn commit(&self, _zone: &Zone) {}
}

/// A system-wide resource declaration, immutable once registered.
#[derive(Clone)]
pub struct ResourceDefinition {
    pub id: u32,
    pub name: String,
    pub shareable: bool,
    /// Declared but unused upstream; reserved.
    pub sync_release: bool,
    pub attrdefs: Vec<AttributeDef>,
    pub manager: Option<Rc<dyn ManagerHook>>,
    pub owner_table: TableId,
}

/// One member of a resource set: a reference to a definition, the
/// per-instance `shared` flag and the instance attribute values.
#[derive(Debug, Clone)]
pub struct ResourceInstance {
    pub def_id: u32,
    pub shared: bool,
    pub attrs: Vec<Value>,
}

#[derive(Clone, Default)]
pub struct ResourceRegistry {
    defs: Vec<ResourceDefinition>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource definition, assigns the next dense id and
    /// creates its `<name>_owner` table. Re-registering a name fails with
    /// `EXISTS`; the 33rd registration fails with `OVERFLOW`.
    pub fn register(
        &mut self,
        db: &mut Database,
        name: &str,
        shareable: bool,
        attrdefs: Vec<AttributeDef>,
        manager: Option<Rc<dyn ManagerHook>>,
    ) -> Result<u32> {
        if self.find_by_name(name).is_some() {
            log::error!("attempt to redefine resource '{}'", name);
            return Err(Error::Exists(format!("resource '{}'", name)));
        }

        if self.defs.len() >= RESOURCE_MAX {
            return Err(Error::Overflow("resource definition"));
        }

        let owner_table = Self::create_owner_table(db, name, &attrdefs)?;

        let id = self.defs.len() as u32;
        self.defs.push(ResourceDefinition {
            id,
            name: name.to_string(),
            shareable,
            sync_release: false,
            attrdefs,
            manager,
            owner_table,
        });

        Ok(id)
    }

    /// `<name>_owner`, non-alphanumeric characters mapped to `_`, with the
    /// base ownership columns followed by one column per attribute.
    fn create_owner_table(
        db: &mut Database,
        name: &str,
        attrdefs: &[AttributeDef],
    ) -> Result<TableId> {
        let table_name: String = format!("{}_owner", name)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();

        let mut columns = vec![
            ColumnDef::new("zone_id", DataType::Unsigned),
            ColumnDef::new("zone_name", DataType::varchar(NAME_LENGTH)),
            ColumnDef::new("application_class", DataType::varchar(NAME_LENGTH)),
            ColumnDef::new("resource_set_id", DataType::Unsigned),
        ];
        for def in attrdefs {
            let data_type = match &def.data_type {
                DataType::String { .. } => DataType::varchar(NAME_LENGTH),
                other => other.clone(),
            };
            columns.push(ColumnDef::new(def.name.clone(), data_type));
        }

        db.create_table(&table_name, columns, &["zone_id"], true)
    }

    pub fn count(&self) -> usize {
        self.defs.len()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ResourceDefinition> {
        self.defs.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn find_by_id(&self, id: u32) -> Option<&ResourceDefinition> {
        self.defs.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.defs.iter()
    }

    /// Definitions carrying a manager hook table, in registration order.
    pub fn iter_managed(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.defs.iter().filter(|d| d.manager.is_some())
    }

    /// Builds a resource instance of the named definition with a copy of
    /// the provided attribute values, defaults filling the rest. The
    /// instance is shared only if the definition is shareable.
    pub fn create_instance(
        &self,
        name: &str,
        shared: bool,
        attrs: &[Attribute],
    ) -> Result<ResourceInstance> {
        let def = self.find_by_name(name).ok_or_else(|| {
            log::warn!("Can't find resource definition '{}'. No resource created", name);
            Error::NotFound(format!("resource definition '{}'", name))
        })?;

        let mut values = Vec::new();
        attribute::set_values(attrs, &def.attrdefs, &mut values);

        Ok(ResourceInstance { def_id: def.id, shared: def.shareable && shared, attrs: values })
    }
}
