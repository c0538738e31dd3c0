//! The arbitration loop: for one zone, walk every class in priority order
//! and every set in sorting-key order, attempt grants against the owner
//! slots, validate with the veto policy, roll back per set on failure,
//! buffer event records, deliver revokes before grants, and persist the
//! owner tables through the table store.

use crate::db::cond::Cond;
use crate::db::value::Value;
use crate::domain::application_class::ClassOrder;
use crate::domain::events::EVENT_RELEASE;
use crate::domain::manager::ResourceManager;
use crate::domain::resource::{RESOURCE_MAX, ResourceMask};
use crate::domain::resource_set::ResourceSetState;
use crate::domain::zone::ZONE_MAX;

/// Ownership of one `(zone, resource)` slot: ids into the set and class
/// registries, never references. `share` tells whether the current owner
/// admits sharers; `modal` blocks every other set while held.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerSlot {
    pub class: Option<u32>,
    pub rset: Option<u32>,
    pub share: bool,
    pub modal: bool,
}

impl OwnerSlot {
    pub fn is_empty(&self) -> bool {
        self.class.is_none() && self.rset.is_none()
    }

    /// The sharer-friendly default a zone row is reset to before a
    /// recomputation.
    fn vacant() -> Self {
        Self { share: true, ..Self::default() }
    }
}

/// The per-zone owner vectors, dense arrays indexed by zone id and
/// resource id.
#[derive(Clone)]
pub struct Owners {
    slots: [[OwnerSlot; RESOURCE_MAX]; ZONE_MAX],
}

impl Owners {
    pub fn new() -> Self {
        Self { slots: std::array::from_fn(|_| std::array::from_fn(|_| OwnerSlot::default())) }
    }

    pub fn get(&self, zone: u32, resource: u32) -> &OwnerSlot {
        &self.slots[zone as usize][resource as usize]
    }

    pub fn get_mut(&mut self, zone: u32, resource: u32) -> &mut OwnerSlot {
        &mut self.slots[zone as usize][resource as usize]
    }

    pub fn zone(&self, zone: u32) -> &[OwnerSlot; RESOURCE_MAX] {
        &self.slots[zone as usize]
    }

    /// Copies the zone row out and resets it to the vacant default.
    fn reset_zone(&mut self, zone: u32) -> [OwnerSlot; RESOURCE_MAX] {
        let old = self.slots[zone as usize].clone();
        for slot in self.slots[zone as usize].iter_mut() {
            *slot = OwnerSlot::vacant();
        }
        old
    }
}

impl Default for Owners {
    fn default() -> Self {
        Self::new()
    }
}

/// One buffered delivery record of a recomputation.
struct EventRecord {
    reply_id: u32,
    rset: u32,
    moved: bool,
}

impl ResourceManager {
    /// Recomputes ownership for one zone. `request` names the set whose
    /// callback should carry the request id, if any.
    pub(crate) fn update_zone(&mut self, zone_id: u32, request: Option<(u32, u32)>) {
        if self.zones.find_by_id(zone_id).is_none() {
            log::error!("can't update zone {}: zone is not defined", zone_id);
            return;
        }
        if self.rsets.is_empty() {
            return;
        }

        let bit = 1u8 << zone_id;
        if self.arbitrating & bit != 0 {
            // the public entry points defer instead of getting here
            log::warn!("arbitration re-entered for zone {}, ignored", zone_id);
            return;
        }
        self.arbitrating |= bit;

        // Phase 1: snapshot and reset the owner row, run init hooks.
        let oldowners = self.owners.reset_zone(zone_id);
        self.manager_init_hooks(zone_id);

        // Phase 2 + 3: walk classes in priority order, sets in key order.
        let mut events: Vec<EventRecord> = Vec::with_capacity(self.rsets.len());
        for class_idx in self.classes.indexes_by_priority() {
            let rset_ids = match self.classes.get(class_idx) {
                Some(class) => class.rsets_desc(zone_id),
                None => continue,
            };
            for rset_id in rset_ids {
                self.arbitrate_rset(zone_id, class_idx, rset_id, request, &mut events);
            }
        }

        // Phase 4: commit hooks.
        self.manager_commit_hooks(zone_id);

        // Phase 5: reposition moved sets, then deliver revokes before
        // grants.
        for ev in &events {
            if ev.moved {
                self.move_resource_set(ev.rset);
            }
            if let Some(rset) = self.rsets.get(&ev.rset) {
                log::debug!("resource set #{} updated", ev.rset);
                if rset.mask_grant == 0 {
                    if let Some(cb) = rset.event.clone() {
                        cb(self, ev.reply_id, ev.rset);
                    }
                }
            }
        }
        for ev in &events {
            if let Some(rset) = self.rsets.get(&ev.rset) {
                if rset.mask_grant != 0 {
                    if let Some(cb) = rset.event.clone() {
                        cb(self, ev.reply_id, ev.rset);
                    }
                }
            }
        }

        // Phase 6: persist owner-table deltas.
        self.write_owner_tables(zone_id, &oldowners);

        self.arbitrating &= !bit;
    }

    fn arbitrate_rset(
        &mut self,
        zone_id: u32,
        class_idx: usize,
        rset_id: u32,
        request: Option<(u32, u32)>,
        events: &mut Vec<EventRecord>,
    ) {
        let Some((state, mandatory, request_id)) = self
            .rsets
            .get(&rset_id)
            .map(|r| (r.state, r.mask_mandatory, r.request_id))
        else {
            return;
        };

        let mut grant: ResourceMask = 0;
        let mut advice: ResourceMask = 0;
        let mut force_release = false;

        match state {
            ResourceSetState::Acquire => {
                let nres = self.rsets[&rset_id].resources.len();
                let mut backup: Vec<(u32, OwnerSlot)> = Vec::with_capacity(nres);

                for res_idx in 0..nres {
                    let rid = self.rsets[&rset_id].resources[res_idx].def_id;
                    backup.push((rid, self.owners.get(zone_id, rid).clone()));

                    if self.try_grant(zone_id, class_idx, rset_id, res_idx) {
                        grant |= 1 << rid;
                    } else {
                        let slot = self.owners.get(zone_id, rid);
                        if slot.rset != Some(rset_id) {
                            force_release |= slot.modal;
                        }
                    }
                }

                if (grant & mandatory) == mandatory && self.call_veto(zone_id, rset_id, grant) {
                    advice = grant;
                } else {
                    // roll back this set's grants only
                    for (res_idx, (rid, old_slot)) in backup.into_iter().enumerate() {
                        *self.owners.get_mut(zone_id, rid) = old_slot;

                        if grant & (1 << rid) != 0 {
                            self.call_free(zone_id, rset_id, res_idx);
                        }
                        if self.advice_ownership(zone_id, class_idx, rset_id, res_idx) {
                            advice |= 1 << rid;
                        }
                    }

                    grant = 0;
                    if (advice & mandatory) != mandatory {
                        advice = 0;
                    }
                }
            }

            ResourceSetState::Release | ResourceSetState::PendingRelease => {
                let nres = self.rsets[&rset_id].resources.len();
                for res_idx in 0..nres {
                    let rid = self.rsets[&rset_id].resources[res_idx].def_id;
                    if self.advice_ownership(zone_id, class_idx, rset_id, res_idx) {
                        advice |= 1 << rid;
                    }
                }
                if (advice & mandatory) != mandatory {
                    advice = 0;
                }
            }

            ResourceSetState::NoRequest => {}
        }

        let reply_id = match request {
            Some((req_set, req_id)) if req_set == rset_id && req_id == request_id => req_id,
            _ => 0,
        };

        let mut changed = false;
        let mut moved = false;
        let mut notify = None;

        let rset = self.rsets.get_mut(&rset_id).expect("set vanished mid-arbitration");

        if force_release {
            moved = rset.state != ResourceSetState::Release;
            notify = if moved { Some(EVENT_RELEASE) } else { None };
            changed = moved || rset.mask_grant != 0;
            rset.state = ResourceSetState::Release;
            rset.mask_grant = 0;
        } else if grant == rset.mask_grant {
            if rset.state == ResourceSetState::Acquire && grant == 0 && rset.dont_wait.current {
                rset.state = ResourceSetState::Release;
                rset.dont_wait.current = rset.dont_wait.client;
                notify = Some(EVENT_RELEASE);
                moved = true;
            }
        } else {
            rset.mask_grant = grant;
            changed = true;

            if rset.state != ResourceSetState::Release && grant == 0 && rset.auto_release.current {
                rset.state = ResourceSetState::Release;
                rset.auto_release.current = rset.auto_release.client;
                notify = Some(EVENT_RELEASE);
                moved = true;
            }
        }

        if rset.mask_advice != advice {
            rset.mask_advice = advice;
            changed = true;
        }

        if let Some(event) = notify {
            self.notify_set(rset_id, event);
        }

        if reply_id != 0 || changed {
            events.push(EventRecord { reply_id, rset: rset_id, moved });
        }
    }

    /// Attempts to grant one resource to one set. Granting succeeds when
    /// the slot is vacant, the requester already holds it, or the current
    /// owner admits sharing of a shareable resource; a manager `allocate`
    /// hook may still refuse. On a fresh grant the slot takes the
    /// requester's ids and modality; the slot's `share` always reflects
    /// the requester's policy.
    fn try_grant(&mut self, zone_id: u32, class_idx: usize, rset_id: u32, res_idx: usize) -> bool {
        let (def_id, res_shared) = {
            let inst = &self.rsets[&rset_id].resources[res_idx];
            (inst.def_id, inst.shared)
        };
        let def = self.resources.find_by_id(def_id).expect("definition of member resource");
        let shareable = def.shareable;
        let manager = def.manager.clone();

        let class = self.classes.get(class_idx).expect("class of queued set");
        let class_modal = class.modal;
        let class_share = class.share;

        let slot = self.owners.get(zone_id, def_id);
        if slot.modal {
            return false;
        }

        let set_owner;
        if slot.is_empty() {
            // nobody owns this, so grab it
            set_owner = true;
        } else if slot.class == Some(class_idx as u32) && slot.rset == Some(rset_id) {
            // we happen to already own it
            set_owner = false;
        } else if shareable && slot.share {
            // someone else owns it but is ready to share it with us
            set_owner = false;
        } else {
            return false;
        }

        if let Some(hook) = manager {
            let zone = self.zones.find_by_id(zone_id).expect("arbitrated zone");
            let inst = &self.rsets[&rset_id].resources[res_idx];
            if !hook.allocate(zone, inst) {
                return false;
            }
        }

        let slot = self.owners.get_mut(zone_id, def_id);
        if set_owner {
            slot.class = Some(class_idx as u32);
            slot.rset = Some(rset_id);
            slot.modal = class_modal;
        }
        slot.share = class_share && res_shared;

        true
    }

    /// The weaker would-it-be-grantable check that never allocates: vacant
    /// or sharing owners advise positively; a same-class owner of equal
    /// priority yields under LIFO.
    fn advice_ownership(&self, zone_id: u32, class_idx: usize, rset_id: u32, res_idx: usize) -> bool {
        let def_id = self.rsets[&rset_id].resources[res_idx].def_id;
        let def = self.resources.find_by_id(def_id).expect("definition of member resource");

        let slot = self.owners.get(zone_id, def_id);
        if slot.modal {
            return false;
        }

        let admissible = if slot.is_empty() {
            true
        } else if slot.share {
            true
        } else if slot.class == Some(class_idx as u32) {
            let owner_priority = slot
                .rset
                .and_then(|id| self.rsets.get(&id))
                .map(|owner| owner.priority);
            let order = self.classes.get(class_idx).map(|c| c.order);
            owner_priority == Some(self.rsets[&rset_id].priority) && order == Some(ClassOrder::Lifo)
        } else {
            false
        };

        if !admissible {
            return false;
        }

        if let Some(hook) = &def.manager {
            let zone = self.zones.find_by_id(zone_id).expect("arbitrated zone");
            let inst = &self.rsets[&rset_id].resources[res_idx];
            if !hook.advice(zone, inst) {
                return false;
            }
        }

        true
    }

    fn call_veto(&self, zone_id: u32, rset_id: u32, grant: ResourceMask) -> bool {
        match &self.veto {
            None => true,
            Some(policy) => {
                let zone = self.zones.find_by_id(zone_id).expect("arbitrated zone");
                let rset = &self.rsets[&rset_id];
                policy.veto(zone, rset, grant, self.owners.zone(zone_id))
            }
        }
    }

    fn call_free(&self, zone_id: u32, rset_id: u32, res_idx: usize) {
        let inst = &self.rsets[&rset_id].resources[res_idx];
        let def = self.resources.find_by_id(inst.def_id).expect("definition of member resource");
        if let Some(hook) = &def.manager {
            let zone = self.zones.find_by_id(zone_id).expect("arbitrated zone");
            hook.free(zone, inst);
        }
    }

    fn manager_init_hooks(&self, zone_id: u32) {
        let zone = self.zones.find_by_id(zone_id).expect("arbitrated zone");
        for def in self.resources.iter_managed() {
            def.manager.as_ref().expect("managed definition").init(zone);
        }
    }

    fn manager_commit_hooks(&self, zone_id: u32) {
        let zone = self.zones.find_by_id(zone_id).expect("arbitrated zone");
        for def in self.resources.iter_managed() {
            def.manager.as_ref().expect("managed definition").commit(zone);
        }
    }

    /// Emits delete/insert/update DML against each owner table whose slot
    /// changed, inside the transaction opened by the caller.
    fn write_owner_tables(&mut self, zone_id: u32, oldowners: &[OwnerSlot; RESOURCE_MAX]) {
        for rid in 0..self.resources.count() as u32 {
            let new = self.owners.get(zone_id, rid).clone();
            let old = &oldowners[rid as usize];

            if new.class == old.class && new.rset == old.rset {
                continue;
            }

            let Some(def) = self.resources.find_by_id(rid) else { continue };
            let table = def.owner_table;
            let nattr = def.attrdefs.len();
            let where_zone = Cond::eq(0, Value::Unsigned(zone_id));

            if new.rset.is_none() {
                match self.db.delete_rows(table, Some(&where_zone)) {
                    Ok(1) => {}
                    _ => log::error!("could not delete resource owner"),
                }
            } else {
                let Some((class_name, rset_id, attrs)) = self.owner_row_fields(zone_id, rid, &new)
                else {
                    log::error!("owner slot of resource {} names an unknown set", rid);
                    continue;
                };

                if old.rset.is_none() {
                    let zone_name = self
                        .zones
                        .find_by_id(zone_id)
                        .map(|z| z.name.clone())
                        .unwrap_or_default();
                    let mut row = vec![
                        Value::Unsigned(zone_id),
                        Value::String(zone_name),
                        Value::String(class_name),
                        Value::Unsigned(rset_id),
                    ];
                    row.extend(attrs);
                    if self.db.insert_rows(table, vec![row]).is_err() {
                        log::error!("can't insert row into owner table");
                    }
                } else {
                    let mut assignments = vec![
                        (2usize, Value::String(class_name)),
                        (3usize, Value::Unsigned(rset_id)),
                    ];
                    for (i, attr) in attrs.into_iter().enumerate().take(nattr) {
                        assignments.push((4 + i, attr));
                    }
                    match self.db.update_rows(table, Some(&where_zone), &assignments) {
                        Ok(_) => {}
                        Err(e) => log::error!("can't update row in owner table: {}", e),
                    }
                }
            }
        }
    }

    /// Class name, set id and instance attribute values for the owner row
    /// of one slot.
    fn owner_row_fields(
        &self,
        _zone_id: u32,
        rid: u32,
        slot: &OwnerSlot,
    ) -> Option<(String, u32, Vec<Value>)> {
        let rset_id = slot.rset?;
        let rset = self.rsets.get(&rset_id)?;
        let class_name = slot
            .class
            .and_then(|c| self.classes.get(c as usize))
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let attrs = rset.find_resource(rid).map(|inst| inst.attrs.clone())?;

        Some((class_name, rset_id, attrs))
    }
}
