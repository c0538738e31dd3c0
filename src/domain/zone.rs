use crate::db::table::ColumnDef;
use crate::db::value::{DataType, Value};
use crate::db::{Database, TableId};
use crate::domain::NAME_LENGTH;
use crate::domain::attribute::{self, Attribute, AttributeDef};
use crate::error::{Error, Result};

/// Zone ids are bit indexes into a zone mask.
pub const ZONE_MAX: usize = 8;
pub const ZONE_ID_INVALID: u32 = u32::MAX;

/// The shared attribute schema of all zones, declared exactly once.
#[derive(Debug, Clone)]
pub struct ZoneDef {
    pub attrdefs: Vec<AttributeDef>,
}

/// A named arbitration boundary with concrete attribute values and a
/// dense id, stable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: u32,
    pub name: String,
    pub attrs: Vec<Value>,
}

#[derive(Clone, Default)]
pub struct ZoneRegistry {
    def: Option<ZoneDef>,
    zones: Vec<Zone>,
    table: Option<TableId>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the zone attribute schema and creates the backing `zones`
    /// table. A second declaration is an error.
    pub fn define(&mut self, db: &mut Database, attrdefs: Vec<AttributeDef>) -> Result<()> {
        if self.def.is_some() {
            return Err(Error::Exists("zone definition".to_string()));
        }

        let mut columns = vec![
            ColumnDef::new("zone_id", DataType::Unsigned),
            ColumnDef::new("zone_name", DataType::varchar(NAME_LENGTH)),
        ];
        for def in &attrdefs {
            let data_type = match &def.data_type {
                DataType::String { .. } => DataType::varchar(NAME_LENGTH),
                other => other.clone(),
            };
            columns.push(ColumnDef::new(def.name.clone(), data_type));
        }

        let table = db.create_table("zones", columns, &["zone_id"], true)?;

        self.def = Some(ZoneDef { attrdefs });
        self.table = Some(table);

        Ok(())
    }

    /// Creates a zone, assigns the next dense id and inserts its row into
    /// the `zones` table.
    pub fn create(&mut self, db: &mut Database, name: &str, attrs: &[Attribute]) -> Result<u32> {
        let def = self.def.as_ref().ok_or_else(|| {
            Error::WrongState(format!(
                "zone definition must precede zone creation, can't create zone '{}'",
                name
            ))
        })?;

        if self.zones.len() >= ZONE_MAX {
            log::error!("Zone table overflow. Can't create zone '{}'", name);
            return Err(Error::Overflow("zone"));
        }

        let mut values = Vec::new();
        attribute::set_values(attrs, &def.attrdefs, &mut values);

        let zone = Zone { id: self.zones.len() as u32, name: name.to_string(), attrs: values };

        let mut row = vec![Value::Unsigned(zone.id), Value::String(zone.name.clone())];
        row.extend(zone.attrs.iter().cloned());
        db.insert_rows(self.table.expect("zones table exists"), vec![row])?;

        let id = zone.id;
        self.zones.push(zone);

        Ok(id)
    }

    pub fn definition(&self) -> Option<&ZoneDef> {
        self.def.as_ref()
    }

    pub fn count(&self) -> usize {
        self.zones.len()
    }

    pub fn find_by_id(&self, id: u32) -> Option<&Zone> {
        self.zones.get(id as usize)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attribute::AttributeAccess;

    fn registry_with_def() -> (Database, ZoneRegistry) {
        let mut db = Database::new();
        let mut zones = ZoneRegistry::new();
        zones
            .define(
                &mut db,
                vec![AttributeDef::new(
                    "occupants",
                    DataType::Unsigned,
                    AttributeAccess::ReadWrite,
                    Value::Unsigned(1),
                )],
            )
            .unwrap();
        (db, zones)
    }

    #[test]
    fn second_definition_is_rejected() {
        let (mut db, mut zones) = registry_with_def();
        assert!(matches!(zones.define(&mut db, vec![]), Err(Error::Exists(_))));
    }

    #[test]
    fn create_assigns_dense_ids_and_writes_the_table() {
        let (mut db, mut zones) = registry_with_def();

        assert_eq!(zones.create(&mut db, "driver", &[]).unwrap(), 0);
        assert_eq!(
            zones
                .create(&mut db, "passenger", &[Attribute::new("occupants", Value::Unsigned(3))])
                .unwrap(),
            1
        );

        let table = db.find_table("zones").unwrap();
        let rows = db.select_rows(table, None, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], Value::String("passenger".to_string()));
        assert_eq!(rows[1][2], Value::Unsigned(3));
    }

    #[test]
    fn ninth_zone_overflows() {
        let (mut db, mut zones) = registry_with_def();
        for i in 0..ZONE_MAX {
            zones.create(&mut db, &format!("zone-{}", i), &[]).unwrap();
        }
        assert!(matches!(
            zones.create(&mut db, "one-too-many", &[]),
            Err(Error::Overflow("zone"))
        ));
    }
}
