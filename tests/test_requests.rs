use std::cell::RefCell;
use std::rc::Rc;

use resource_arbiter::domain::application_class::ClassOrder;
use resource_arbiter::domain::events::{BusEvent, BusListener, EVENT_RELEASE};
use resource_arbiter::domain::manager::ResourceManager;
use resource_arbiter::domain::resource_set::ResourceSetState;

fn manager_with_zones(zones: &[&str]) -> ResourceManager {
    let mut manager = ResourceManager::new();
    manager.define_zone_attributes(Vec::new()).unwrap();
    for zone in zones {
        manager.create_zone(zone, &[]).unwrap();
    }
    manager
}

#[derive(Default)]
struct ReleaseCounter {
    count: RefCell<usize>,
}

impl BusListener for ReleaseCounter {
    fn on_event(&self, _event: &BusEvent) {
        *self.count.borrow_mut() += 1;
    }
}

#[test]
fn zones_are_isolated_arbitration_boundaries() {
    let mut manager = manager_with_zones(&["driver", "passenger"]);
    manager.create_application_class("player", 3, false, false, ClassOrder::Fifo).unwrap();
    manager.register_resource("audio", false, Vec::new(), None).unwrap();

    let client = manager.create_client("app").unwrap();

    let front = manager.create_resource_set(client, false, false, 3, None).unwrap();
    manager.add_resource(front, "audio", false, &[], true).unwrap();
    manager.add_resource_set_to_class(front, "player", "driver", 0).unwrap();

    let rear = manager.create_resource_set(client, false, false, 3, None).unwrap();
    manager.add_resource(rear, "audio", false, &[], true).unwrap();
    manager.add_resource_set_to_class(rear, "player", "passenger", 0).unwrap();

    manager.acquire(front, 1).unwrap();
    manager.acquire(rear, 2).unwrap();

    // the same exclusive resource is granted once per zone
    assert_eq!(manager.resource_set(front).unwrap().mask_grant, 1);
    assert_eq!(manager.resource_set(rear).unwrap().mask_grant, 1);

    assert_eq!(manager.owner(0, 0).unwrap().rset, Some(front));
    assert_eq!(manager.owner(1, 0).unwrap().rset, Some(rear));

    // releasing in one zone leaves the other untouched
    manager.release(front, 3).unwrap();
    assert_eq!(manager.owner(0, 0).unwrap().rset, None);
    assert_eq!(manager.owner(1, 0).unwrap().rset, Some(rear));
}

#[test]
fn dont_wait_demotes_an_empty_handed_acquire() {
    let mut manager = manager_with_zones(&["driver"]);
    manager.create_application_class("phone", 5, false, false, ClassOrder::Fifo).unwrap();
    manager.create_application_class("player", 2, false, false, ClassOrder::Fifo).unwrap();
    manager.register_resource("audio", false, Vec::new(), None).unwrap();

    let counter = Rc::new(ReleaseCounter::default());
    manager.subscribe(EVENT_RELEASE, counter.clone());

    let client = manager.create_client("app").unwrap();

    let holder = manager.create_resource_set(client, false, false, 5, None).unwrap();
    manager.add_resource(holder, "audio", false, &[], true).unwrap();
    manager.add_resource_set_to_class(holder, "phone", "driver", 0).unwrap();
    manager.acquire(holder, 1).unwrap();

    // client half is false; the effective half is turned on so the
    // reset-to-client is observable
    let impatient = manager.create_resource_set(client, false, false, 2, None).unwrap();
    manager.add_resource(impatient, "audio", false, &[], true).unwrap();
    manager.add_resource_set_to_class(impatient, "player", "driver", 0).unwrap();
    manager.request_dont_wait(impatient, true).unwrap();

    let releases = *counter.count.borrow();
    manager.acquire(impatient, 2).unwrap();

    let demoted = manager.resource_set(impatient).unwrap();
    assert_eq!(demoted.state, ResourceSetState::Release);
    assert_eq!(demoted.mask_grant, 0);
    assert!(!demoted.dont_wait.current, "current resets to the client value");
    assert_eq!(*counter.count.borrow(), releases + 1);

    // the holder was not disturbed
    assert_eq!(manager.resource_set(holder).unwrap().mask_grant, 1);
}

#[test]
fn optional_resources_may_be_granted_partially() {
    let mut manager = manager_with_zones(&["driver"]);
    manager.create_application_class("phone", 5, false, false, ClassOrder::Fifo).unwrap();
    manager.create_application_class("player", 2, false, false, ClassOrder::Fifo).unwrap();
    manager.register_resource("audio", false, Vec::new(), None).unwrap();
    manager.register_resource("video", false, Vec::new(), None).unwrap();

    let client = manager.create_client("app").unwrap();

    let peer = manager.create_resource_set(client, false, false, 5, None).unwrap();
    manager.add_resource(peer, "video", false, &[], true).unwrap();
    manager.add_resource_set_to_class(peer, "phone", "driver", 0).unwrap();
    manager.acquire(peer, 1).unwrap();

    // audio is mandatory, video merely desirable
    let rset = manager.create_resource_set(client, false, false, 2, None).unwrap();
    manager.add_resource(rset, "audio", false, &[], true).unwrap();
    manager.add_resource(rset, "video", false, &[], false).unwrap();
    manager.add_resource_set_to_class(rset, "player", "driver", 0).unwrap();
    manager.acquire(rset, 2).unwrap();

    let partial = manager.resource_set(rset).unwrap();
    assert_eq!(partial.mask_grant, 0b01, "mandatory audio granted, optional video not");
    assert_eq!(partial.state, ResourceSetState::Acquire);

    // once the peer lets go, a recomputation completes the grant
    manager.release(peer, 3).unwrap();
    assert_eq!(manager.resource_set(rset).unwrap().mask_grant, 0b11);
}
