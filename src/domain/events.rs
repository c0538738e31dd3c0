use std::rc::Rc;

use bimap::BiMap;

/// Lifecycle event names emitted on the bus. Identifiers are interned by
/// name on first use.
pub const EVENT_CREATED: &str = "resource_set_created";
pub const EVENT_DESTROYED: &str = "resource_set_destroyed";
pub const EVENT_ACQUIRE: &str = "resource_set_acquire";
pub const EVENT_RELEASE: &str = "resource_set_release";

/// Message tag of the resource-set id payload field.
pub const TAG_RSET_ID: u16 = 1;

/// The payload of every resource-set lifecycle event. The id is enough:
/// the full set can be looked up with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusEvent {
    pub event: u32,
    pub rset_id: u32,
}

/// A bus subscriber. Delivery is synchronous within the emitting call;
/// listeners accumulate state behind their own interior mutability.
pub trait BusListener {
    fn on_event(&self, event: &BusEvent);
}

/// The engine-wide event bus: an interning table from event name to dense
/// id plus the per-event subscriber lists.
#[derive(Default)]
pub struct EventBus {
    ids: BiMap<String, u32>,
    next_id: u32,
    subscribers: Vec<(u32, Rc<dyn BusListener>)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of a named event, assigned on first use.
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(id) = self.ids.get_by_left(name) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.ids.get_by_left(name).copied()
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.ids.get_by_right(&id).map(|s| s.as_str())
    }

    /// Subscribes a listener to a named event. Subscribing the same
    /// listener twice to the same event is a no-op.
    pub fn subscribe(&mut self, name: &str, listener: Rc<dyn BusListener>) -> u32 {
        let event = self.intern(name);
        if !self
            .subscribers
            .iter()
            .any(|(e, l)| *e == event && Rc::ptr_eq(l, &listener))
        {
            self.subscribers.push((event, listener));
        }
        event
    }

    pub fn unsubscribe(&mut self, name: &str, listener: &Rc<dyn BusListener>) {
        if let Some(event) = self.lookup(name) {
            self.subscribers.retain(|(e, l)| *e != event || !Rc::ptr_eq(l, listener));
        }
    }

    /// Emits an event; every subscriber of that event runs before this
    /// returns.
    pub fn emit(&mut self, name: &str, rset_id: u32) {
        let event = self.intern(name);
        log::debug!("emit event {} for rset {}", event, rset_id);

        let payload = BusEvent { event, rset_id };
        let listeners: Vec<Rc<dyn BusListener>> = self
            .subscribers
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, l)| l.clone())
            .collect();

        for listener in listeners {
            listener.on_event(&payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Sink {
        seen: RefCell<Vec<BusEvent>>,
    }

    impl BusListener for Sink {
        fn on_event(&self, event: &BusEvent) {
            self.seen.borrow_mut().push(*event);
        }
    }

    #[test]
    fn ids_are_interned_by_name_on_first_use() {
        let mut bus = EventBus::new();
        let created = bus.intern(EVENT_CREATED);
        let destroyed = bus.intern(EVENT_DESTROYED);
        assert_ne!(created, destroyed);
        assert_eq!(bus.intern(EVENT_CREATED), created);
        assert_eq!(bus.name_of(created), Some(EVENT_CREATED));
    }

    #[test]
    fn delivery_is_synchronous_and_per_event() {
        let mut bus = EventBus::new();
        let sink = Rc::new(Sink::default());
        bus.subscribe(EVENT_CREATED, sink.clone());

        bus.emit(EVENT_CREATED, 7);
        bus.emit(EVENT_RELEASE, 7);

        let seen = sink.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].rset_id, 7);
    }

    #[test]
    fn duplicate_subscription_is_a_noop() {
        let mut bus = EventBus::new();
        let sink = Rc::new(Sink::default());
        bus.subscribe(EVENT_CREATED, sink.clone());
        bus.subscribe(EVENT_CREATED, sink.clone());

        bus.emit(EVENT_CREATED, 1);
        assert_eq!(sink.seen.borrow().len(), 1);
    }
}
