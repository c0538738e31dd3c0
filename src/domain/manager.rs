use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::api::config_dto::{SystemConfigDto, value_from_json};
use crate::db::Database;
use crate::domain::application_class::{ClassOrder, ClassRegistry, PRIORITY_MAX, sorting_key};
use crate::domain::attribute::{self, Attribute, AttributeDef};
use crate::domain::client::ClientRegistry;
use crate::domain::events::{
    BusListener, EVENT_ACQUIRE, EVENT_CREATED, EVENT_DESTROYED, EVENT_RELEASE, EventBus,
};
use crate::domain::owner::{OwnerSlot, Owners};
use crate::domain::resource::{ManagerHook, RESOURCE_MAX, ResourceMask, ResourceRegistry};
use crate::domain::resource_set::{
    REQNO_INVALID, ResourceSet, ResourceSetCallback, ResourceSetState, STAMP_LIMIT,
};
use crate::domain::zone::{Zone, ZoneRegistry};
use crate::error::{Error, Result};

/// The external policy predicate consulted after a set's tentative grant.
/// Returning `false` is a soft denial: the set's grants for this round are
/// rolled back and advice is recomputed.
pub trait VetoPolicy {
    fn veto(&self, zone: &Zone, rset: &ResourceSet, grant: ResourceMask, owners: &[OwnerSlot])
    -> bool;
}

/// A request that arrived from an event callback while its zone was being
/// arbitrated; replayed once the outer arbitration is done.
enum PendingOp {
    Acquire { rset: u32, request_id: u32 },
    Release { rset: u32, request_id: u32 },
    Destroy { rset: u32 },
    Attach { rset: u32, class_name: String, zone_name: String, request_id: u32 },
    Recalc { zone: u32 },
}

/// Registry snapshot taken at `begin_transaction`. The table store rolls
/// itself back through its change log; this covers the in-memory side so
/// queues and owners restore exactly. Dense id counters are deliberately
/// left out: rolled-back ids are never reused.
struct Snapshot {
    zones: ZoneRegistry,
    resources: ResourceRegistry,
    classes: ClassRegistry,
    clients: ClientRegistry,
    rsets: HashMap<u32, ResourceSet>,
    owners: Owners,
    stamp: u32,
}

/// The engine context. Every registry, the owner vectors, the event bus
/// and the table store live behind this one type; all public entry points
/// go through it and nothing is process-global.
pub struct ResourceManager {
    pub(crate) db: Database,
    pub(crate) zones: ZoneRegistry,
    pub(crate) resources: ResourceRegistry,
    pub(crate) classes: ClassRegistry,
    pub(crate) clients: ClientRegistry,
    pub(crate) rsets: HashMap<u32, ResourceSet>,
    pub(crate) owners: Owners,
    pub(crate) bus: EventBus,
    pub(crate) veto: Option<Rc<dyn VetoPolicy>>,
    pub(crate) stamp: u32,
    /// Zone bits currently inside `update_zone`; entry points defer into
    /// `pending` instead of recursing.
    pub(crate) arbitrating: u8,
    pending: VecDeque<PendingOp>,
    next_rset_id: u32,
    snapshots: Vec<Snapshot>,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            db: Database::new(),
            zones: ZoneRegistry::new(),
            resources: ResourceRegistry::new(),
            classes: ClassRegistry::new(),
            clients: ClientRegistry::new(),
            rsets: HashMap::new(),
            owners: Owners::new(),
            bus: EventBus::new(),
            veto: None,
            stamp: 0,
            arbitrating: 0,
            pending: VecDeque::new(),
            next_rset_id: 0,
            snapshots: Vec::new(),
        }
    }

    /// Applies a configuration: zone attribute schema, zones, application
    /// classes and resource definitions, in that order.
    pub fn from_config(config: &SystemConfigDto) -> Result<Self> {
        let mut manager = Self::new();

        let zone_defs: Vec<AttributeDef> = config
            .zone_attributes
            .iter()
            .map(|dto| dto.to_domain())
            .collect::<Result<_>>()?;
        manager.define_zone_attributes(zone_defs)?;

        for zone in &config.zones {
            let defs = manager
                .zones
                .definition()
                .map(|d| d.attrdefs.clone())
                .unwrap_or_default();
            let mut attrs = Vec::new();
            for value in &zone.attributes {
                let def = defs.iter().find(|d| d.name == value.name).ok_or_else(|| {
                    Error::NotFound(format!("zone attribute '{}'", value.name))
                })?;
                attrs.push(Attribute::new(
                    value.name.clone(),
                    value_from_json(&value.value, &def.data_type)?,
                ));
            }
            manager.create_zone(&zone.name, &attrs)?;
        }

        for class in &config.application_classes {
            manager.create_application_class(
                &class.name,
                class.priority,
                class.modal,
                class.share,
                class.parsed_order()?,
            )?;
        }

        for resource in &config.resources {
            let attrdefs: Vec<AttributeDef> = resource
                .attributes
                .iter()
                .map(|dto| dto.to_domain())
                .collect::<Result<_>>()?;
            manager.register_resource(&resource.name, resource.shareable, attrdefs, None)?;
        }

        Ok(manager)
    }

    //--------------------------
    // --- Configuration API ---
    //--------------------------

    pub fn define_zone_attributes(&mut self, attrdefs: Vec<AttributeDef>) -> Result<()> {
        self.zones.define(&mut self.db, attrdefs)
    }

    pub fn create_zone(&mut self, name: &str, attrs: &[Attribute]) -> Result<u32> {
        self.zones.create(&mut self.db, name, attrs)
    }

    pub fn create_application_class(
        &mut self,
        name: &str,
        priority: u32,
        modal: bool,
        share: bool,
        order: ClassOrder,
    ) -> Result<()> {
        self.classes.create(&mut self.db, name, priority, modal, share, order)?;
        Ok(())
    }

    pub fn register_resource(
        &mut self,
        name: &str,
        shareable: bool,
        attrdefs: Vec<AttributeDef>,
        manager: Option<Rc<dyn ManagerHook>>,
    ) -> Result<u32> {
        self.resources.register(&mut self.db, name, shareable, attrdefs, manager)
    }

    pub fn set_veto_policy(&mut self, policy: Rc<dyn VetoPolicy>) {
        self.veto = Some(policy);
    }

    pub fn subscribe(&mut self, event: &str, listener: Rc<dyn BusListener>) -> u32 {
        self.bus.subscribe(event, listener)
    }

    pub fn unsubscribe(&mut self, event: &str, listener: &Rc<dyn BusListener>) {
        self.bus.unsubscribe(event, listener);
    }

    //--------------------------
    // --- Clients and sets ---
    //--------------------------

    pub fn create_client(&mut self, name: &str) -> Result<u32> {
        self.clients.create(name)
    }

    /// Destroys a client and every resource set it owns.
    pub fn destroy_client(&mut self, client_id: u32) -> Result<()> {
        let rsets = self
            .clients
            .get(client_id)
            .ok_or_else(|| Error::NotFound("client".to_string()))?
            .rsets
            .clone();

        for rset in rsets {
            if let Err(e) = self.destroy_resource_set(rset) {
                log::error!("destroying resource set #{} failed: {}", rset, e);
            }
        }
        self.clients.remove(client_id);

        Ok(())
    }

    /// Creates a resource set owned by `client` and broadcasts CREATED.
    /// Ids are dense and never reused.
    pub fn create_resource_set(
        &mut self,
        client: u32,
        auto_release: bool,
        dont_wait: bool,
        priority: u32,
        event: Option<ResourceSetCallback>,
    ) -> Result<u32> {
        if self.clients.get(client).is_none() {
            return Err(Error::NotFound("client".to_string()));
        }

        let priority = priority.min(PRIORITY_MAX);

        self.next_rset_id += 1;
        let id = self.next_rset_id;
        self.rsets
            .insert(id, ResourceSet::new(id, client, auto_release, dont_wait, priority, event));
        self.clients.attach_rset(client, id)?;

        self.bus.emit(EVENT_CREATED, id);

        Ok(id)
    }

    /// Destroys a set: broadcasts DESTROYED, releases it if it was
    /// acquired (which rearbitrates the zone), and removes it from its
    /// queue and client.
    pub fn destroy_resource_set(&mut self, rset_id: u32) -> Result<()> {
        let (zone, attached, state) = {
            let rset = self
                .rsets
                .get(&rset_id)
                .ok_or_else(|| Error::NotFound("resource set".to_string()))?;
            (rset.zone, rset.class.is_some(), rset.state)
        };

        if attached && self.arbitrating & (1u8 << zone) != 0 {
            self.pending.push_back(PendingOp::Destroy { rset: rset_id });
            return Ok(());
        }

        self.rsets.get_mut(&rset_id).expect("checked above").event = None;
        self.bus.emit(EVENT_DESTROYED, rset_id);

        if state == ResourceSetState::Acquire {
            self.release(rset_id, REQNO_INVALID)?;
        }

        let (class, zone, queue_key, client) = {
            let rset = &self.rsets[&rset_id];
            (rset.class, rset.zone, rset.queue_key, rset.client)
        };
        if let (Some(class_idx), Some(key)) = (class, queue_key) {
            self.classes.remove_from_queue(class_idx, zone, key, rset_id);
        }
        self.clients.detach_rset(client, rset_id);
        self.rsets.remove(&rset_id);

        Ok(())
    }

    /// Adds a resource instance to a set: the named definition must exist,
    /// the provided attributes are copied with defaults filling the rest.
    pub fn add_resource(
        &mut self,
        rset_id: u32,
        name: &str,
        shared: bool,
        attrs: &[Attribute],
        mandatory: bool,
    ) -> Result<()> {
        if !self.rsets.contains_key(&rset_id) {
            return Err(Error::NotFound("resource set".to_string()));
        }

        let instance = self.resources.create_instance(name, shared, attrs).map_err(|e| {
            log::error!("Can't add resource '{}' to resource set {}", name, rset_id);
            e
        })?;

        self.rsets
            .get_mut(&rset_id)
            .expect("checked above")
            .add_instance(instance, mandatory)
    }

    /// Binds a set to its `(class, zone)`, queues it and arbitrates. A set
    /// already placed into `acquire` is acquired right away.
    pub fn add_resource_set_to_class(
        &mut self,
        rset_id: u32,
        class_name: &str,
        zone_name: &str,
        request_id: u32,
    ) -> Result<()> {
        let class_idx = self
            .classes
            .find_index(class_name)
            .ok_or_else(|| Error::NotFound(format!("application class '{}'", class_name)))?;
        let zone_id = self
            .zones
            .find_by_name(zone_name)
            .map(|z| z.id)
            .ok_or_else(|| Error::NotFound(format!("zone '{}'", zone_name)))?;
        let state = {
            let rset = self
                .rsets
                .get(&rset_id)
                .ok_or_else(|| Error::NotFound("resource set".to_string()))?;
            if rset.class.is_some() {
                return Err(Error::WrongState(format!(
                    "resource set {} is already in a class",
                    rset_id
                )));
            }
            rset.state
        };

        if self.arbitrating & (1u8 << zone_id) != 0 {
            self.pending.push_back(PendingOp::Attach {
                rset: rset_id,
                class_name: class_name.to_string(),
                zone_name: zone_name.to_string(),
                request_id,
            });
            return Ok(());
        }

        {
            let rset = self.rsets.get_mut(&rset_id).expect("checked above");
            rset.class = Some(class_idx);
            rset.zone = zone_id;
        }

        if state == ResourceSetState::Acquire {
            self.acquire(rset_id, request_id)
        } else {
            {
                let rset = self.rsets.get_mut(&rset_id).expect("checked above");
                rset.request_id = request_id;
                if rset.state == ResourceSetState::NoRequest {
                    rset.state = ResourceSetState::Release;
                }
            }
            self.move_resource_set(rset_id);
            self.notify_set(rset_id, EVENT_CREATED);
            self.run_zone_arbitration(zone_id, Some((rset_id, request_id)))
        }
    }

    //--------------------------
    // --- Request API ---
    //--------------------------

    /// Moves a set to `acquire`, re-files it under a fresh request stamp
    /// and rearbitrates its zone.
    pub fn acquire(&mut self, rset_id: u32, request_id: u32) -> Result<()> {
        let (zone, attached, old_state) = {
            let rset = self
                .rsets
                .get(&rset_id)
                .ok_or_else(|| Error::NotFound("resource set".to_string()))?;
            (rset.zone, rset.class.is_some(), rset.state)
        };

        if attached && self.arbitrating & (1u8 << zone) != 0 {
            self.pending.push_back(PendingOp::Acquire { rset: rset_id, request_id });
            return Ok(());
        }

        log::debug!("acquiring resource set #{}", rset_id);

        self.rsets.get_mut(&rset_id).expect("checked above").state = ResourceSetState::Acquire;

        if attached {
            let stamp = self.next_request_stamp();
            {
                let rset = self.rsets.get_mut(&rset_id).expect("checked above");
                rset.request_id = request_id;
                rset.request_stamp = stamp;
            }
            self.move_resource_set(rset_id);

            if old_state != ResourceSetState::Acquire {
                self.notify_set(rset_id, EVENT_ACQUIRE);
            }

            self.run_zone_arbitration(zone, Some((rset_id, request_id)))?;
        }

        Ok(())
    }

    /// Moves a set to `release` and rearbitrates. Releasing an already
    /// released set only invokes its callback with the given request id;
    /// no rearbitration, no bus emission.
    pub fn release(&mut self, rset_id: u32, request_id: u32) -> Result<()> {
        let (zone, attached, state) = {
            let rset = self
                .rsets
                .get(&rset_id)
                .ok_or_else(|| Error::NotFound("resource set".to_string()))?;
            (rset.zone, rset.class.is_some(), rset.state)
        };

        if !attached {
            self.rsets.get_mut(&rset_id).expect("checked above").state = ResourceSetState::Release;
            return Ok(());
        }

        if self.arbitrating & (1u8 << zone) != 0 {
            self.pending.push_back(PendingOp::Release { rset: rset_id, request_id });
            return Ok(());
        }

        log::debug!("releasing resource set #{}", rset_id);

        if state == ResourceSetState::Release || state == ResourceSetState::PendingRelease {
            let cb = self.rsets.get(&rset_id).and_then(|r| r.event.clone());
            if let Some(cb) = cb {
                cb(self, request_id, rset_id);
            }
        } else {
            let stamp = self.next_request_stamp();
            {
                let rset = self.rsets.get_mut(&rset_id).expect("checked above");
                rset.state = ResourceSetState::Release;
                rset.request_id = request_id;
                rset.request_stamp = stamp;
            }
            self.move_resource_set(rset_id);
            self.notify_set(rset_id, EVENT_RELEASE);
            self.run_zone_arbitration(zone, Some((rset_id, request_id)))?;
        }

        Ok(())
    }

    /// Runs arbitration for a zone without a requesting set.
    pub fn recalc(&mut self, zone_id: u32) -> Result<()> {
        if self.zones.find_by_id(zone_id).is_none() {
            return Err(Error::NotFound(format!("zone {}", zone_id)));
        }

        if self.arbitrating & (1u8 << zone_id) != 0 {
            self.pending.push_back(PendingOp::Recalc { zone: zone_id });
            return Ok(());
        }

        self.run_zone_arbitration(zone_id, None)
    }

    /// Updates the effective half of the auto-release flag pair.
    pub fn request_auto_release(&mut self, rset_id: u32, auto_release: bool) -> Result<()> {
        let rset = self
            .rsets
            .get_mut(&rset_id)
            .ok_or_else(|| Error::NotFound("resource set".to_string()))?;
        rset.auto_release.current = auto_release;
        Ok(())
    }

    /// Updates the effective half of the dont-wait flag pair.
    pub fn request_dont_wait(&mut self, rset_id: u32, dont_wait: bool) -> Result<()> {
        let rset = self
            .rsets
            .get_mut(&rset_id)
            .ok_or_else(|| Error::NotFound("resource set".to_string()))?;
        rset.dont_wait.current = dont_wait;
        Ok(())
    }

    //--------------------------
    // --- Attribute access ---
    //--------------------------

    pub fn read_attribute(&self, rset_id: u32, resource: &str, idx: usize) -> Result<Attribute> {
        let (def_id, attrdefs) = self.resource_def_of(resource)?;
        let rset = self
            .rsets
            .get(&rset_id)
            .ok_or_else(|| Error::NotFound("resource set".to_string()))?;
        let inst = rset
            .find_resource(def_id)
            .ok_or_else(|| Error::NotFound(format!("resource '{}' in set {}", resource, rset_id)))?;

        attribute::get_value(idx, &attrdefs, &inst.attrs)
            .ok_or_else(|| Error::InvalidArg(format!("attribute index {}", idx)))
    }

    pub fn read_all_attributes(&self, rset_id: u32, resource: &str) -> Result<Vec<Attribute>> {
        let (def_id, attrdefs) = self.resource_def_of(resource)?;
        let rset = self
            .rsets
            .get(&rset_id)
            .ok_or_else(|| Error::NotFound("resource set".to_string()))?;
        let inst = rset
            .find_resource(def_id)
            .ok_or_else(|| Error::NotFound(format!("resource '{}' in set {}", resource, rset_id)))?;

        Ok(attribute::get_all_values(&attrdefs, &inst.attrs))
    }

    /// Rewrites an instance's attributes with the write-masked,
    /// type-checked, default-filled semantics of the attribute engine.
    pub fn write_attributes(&mut self, rset_id: u32, resource: &str, values: &[Attribute]) -> Result<()> {
        let (def_id, attrdefs) = self.resource_def_of(resource)?;
        let rset = self
            .rsets
            .get_mut(&rset_id)
            .ok_or_else(|| Error::NotFound("resource set".to_string()))?;
        let inst = rset
            .find_resource_mut(def_id)
            .ok_or_else(|| Error::NotFound(format!("resource '{}' in set {}", resource, rset_id)))?;

        let mut out = Vec::new();
        attribute::set_values(values, &attrdefs, &mut out);
        inst.attrs = out;

        Ok(())
    }

    fn resource_def_of(&self, resource: &str) -> Result<(u32, Vec<AttributeDef>)> {
        let def = self
            .resources
            .find_by_name(resource)
            .ok_or_else(|| Error::NotFound(format!("resource definition '{}'", resource)))?;
        Ok((def.id, def.attrdefs.clone()))
    }

    //--------------------------
    // --- Transactions ---
    //--------------------------

    /// Opens an engine transaction: a table-store transaction plus a
    /// registry snapshot, so rollback restores every observable exactly.
    pub fn begin_transaction(&mut self) -> u32 {
        let handle = self.db.begin_transaction();
        self.snapshots.push(Snapshot {
            zones: self.zones.clone(),
            resources: self.resources.clone(),
            classes: self.classes.clone(),
            clients: self.clients.clone(),
            rsets: self.rsets.clone(),
            owners: self.owners.clone(),
            stamp: self.stamp,
        });
        handle
    }

    pub fn commit_transaction(&mut self, handle: u32) -> Result<()> {
        self.db.commit_transaction(handle)?;
        self.snapshots.pop();
        Ok(())
    }

    pub fn rollback_transaction(&mut self, handle: u32) -> Result<()> {
        self.db.rollback_transaction(handle)?;
        if let Some(snapshot) = self.snapshots.pop() {
            self.zones = snapshot.zones;
            self.resources = snapshot.resources;
            self.classes = snapshot.classes;
            self.clients = snapshot.clients;
            self.rsets = snapshot.rsets;
            self.owners = snapshot.owners;
            self.stamp = snapshot.stamp;
        }
        Ok(())
    }

    //--------------------------
    // --- Introspection ---
    //--------------------------

    pub fn resource_set(&self, rset_id: u32) -> Option<&ResourceSet> {
        self.rsets.get(&rset_id)
    }

    pub fn resource_set_count(&self) -> usize {
        self.rsets.len()
    }

    pub fn owner(&self, zone_id: u32, resource_id: u32) -> Option<&OwnerSlot> {
        if (zone_id as usize) < crate::domain::zone::ZONE_MAX
            && (resource_id as usize) < RESOURCE_MAX
        {
            Some(self.owners.get(zone_id, resource_id))
        } else {
            None
        }
    }

    pub fn resource_set_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.rsets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Mutable store access, the registration point for table triggers on
    /// watched tables. The engine-owned tables themselves are fed by the
    /// arbitration loop only.
    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Human-readable owner dump, one block per zone.
    pub fn print_owners(&self) -> String {
        let mut out = String::from("Resource owners:\n");

        for zone in self.zones.iter() {
            out.push_str(&format!("   Zone {}:\n", zone.name));

            for def in self.resources.iter() {
                let slot = self.owners.get(zone.id, def.id);
                let owner = match (slot.class, slot.rset) {
                    (Some(class), Some(rset)) => format!(
                        "{} (set #{})",
                        self.classes.get(class as usize).map(|c| c.name.as_str()).unwrap_or("?"),
                        rset
                    ),
                    _ => "<nobody>".to_string(),
                };
                out.push_str(&format!("      {:<15}: {}\n", def.name, owner));
            }
        }

        out
    }

    /// Human-readable class dump with the queued sets of every zone.
    pub fn print_classes(&self) -> String {
        let mut out = String::from("Application classes:\n");

        for class_idx in self.classes.indexes_by_priority() {
            let class = self.classes.get(class_idx).expect("listed class");
            out.push_str(&format!("  {:3} - {}", class.priority, class.name));
            if class.modal {
                out.push_str(" modal");
            }
            if class.share {
                out.push_str(" share");
            }
            out.push('\n');

            for zone in self.zones.iter() {
                let queue = class.queue(zone.id);
                if queue.is_empty() {
                    continue;
                }
                out.push_str(&format!("           Resource-sets in {} zone:\n", zone.name));
                for &(key, rset_id) in queue.iter().rev() {
                    if let Some(rset) = self.rsets.get(&rset_id) {
                        out.push_str(&format!(
                            "             {:3} - 0x{:02x}/0x{:02x} 0x{:02x}/0x{:02x} 0x{:08x} {} {}\n",
                            rset.id,
                            rset.mask_all,
                            rset.mask_mandatory,
                            rset.mask_grant,
                            rset.mask_advice,
                            key,
                            if rset.share { "shared" } else { "exclusive" },
                            rset.state,
                        ));
                    }
                }
            }
        }

        out
    }

    //--------------------------
    // --- Internals ---
    //--------------------------

    /// Re-files a set in its `(class, zone)` queue under its current
    /// sorting key.
    pub(crate) fn move_resource_set(&mut self, rset_id: u32) {
        let Some(rset) = self.rsets.get(&rset_id) else { return };
        let Some(class_idx) = rset.class else { return };

        let zone = rset.zone;
        let old_key = rset.queue_key;
        let class = self.classes.get(class_idx).expect("class of queued set");
        let key = sorting_key(
            class.order,
            rset.priority,
            rset.share,
            rset.state == ResourceSetState::Acquire,
            rset.request_stamp,
        );

        if let Some(old) = old_key {
            self.classes.remove_from_queue(class_idx, zone, old, rset_id);
        }
        self.classes.insert_into_queue(class_idx, zone, key, rset_id);
        self.rsets.get_mut(&rset_id).expect("re-filed set").queue_key = Some(key);
    }

    pub(crate) fn notify_set(&mut self, rset_id: u32, event: &str) {
        self.bus.emit(event, rset_id);
    }

    /// Wraps one arbitration in a table-store transaction and replays the
    /// requests deferred from its callbacks.
    fn run_zone_arbitration(&mut self, zone_id: u32, request: Option<(u32, u32)>) -> Result<()> {
        let tx = self.db.begin_transaction();
        self.update_zone(zone_id, request);
        self.db.commit_transaction(tx)?;

        self.drain_pending();

        Ok(())
    }

    fn drain_pending(&mut self) {
        if self.arbitrating != 0 {
            return;
        }

        while let Some(op) = self.pending.pop_front() {
            let result = match op {
                PendingOp::Acquire { rset, request_id } => self.acquire(rset, request_id),
                PendingOp::Release { rset, request_id } => self.release(rset, request_id),
                PendingOp::Destroy { rset } => self.destroy_resource_set(rset),
                PendingOp::Attach { rset, class_name, zone_name, request_id } => {
                    self.add_resource_set_to_class(rset, &class_name, &zone_name, request_id)
                }
                PendingOp::Recalc { zone } => self.recalc(zone),
            };
            if let Err(e) = result {
                log::error!("deferred request failed: {}", e);
            }
        }
    }

    /// The next request stamp. Close to overflow the counter is rebased by
    /// the minimum live stamp and every queued set is re-filed, which
    /// preserves the relative order of all live stamps.
    fn next_request_stamp(&mut self) -> u32 {
        if self.stamp >= STAMP_LIMIT {
            log::info!("rebasing resource set stamps");

            let mut min = self.stamp;
            for rset in self.rsets.values() {
                min = min.min(rset.request_stamp);
            }

            self.stamp -= min;
            for rset in self.rsets.values_mut() {
                rset.request_stamp -= min;
            }

            let queued: Vec<u32> = self
                .rsets
                .values()
                .filter(|r| r.queue_key.is_some())
                .map(|r| r.id)
                .collect();
            for rset_id in queued {
                self.move_resource_set(rset_id);
            }

            if self.stamp >= STAMP_LIMIT {
                log::warn!("request stamp counter still at limit after rebase");
            }
        }

        let stamp = self.stamp;
        self.stamp += 1;
        stamp
    }
}
