use resource_arbiter::domain::manager::ResourceManager;
use resource_arbiter::domain::resource::RESOURCE_MAX;
use resource_arbiter::domain::zone::ZONE_MAX;
use resource_arbiter::error::ErrorCode;

#[test]
fn the_thirtythird_resource_registration_overflows() {
    let mut manager = ResourceManager::new();
    for i in 0..RESOURCE_MAX {
        manager.register_resource(&format!("res-{}", i), false, Vec::new(), None).unwrap();
    }

    let err = manager.register_resource("res-32", false, Vec::new(), None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Overflow);
    assert_eq!(manager.resources().count(), RESOURCE_MAX);
}

#[test]
fn the_ninth_zone_overflows() {
    let mut manager = ResourceManager::new();
    manager.define_zone_attributes(Vec::new()).unwrap();
    for i in 0..ZONE_MAX {
        manager.create_zone(&format!("zone-{}", i), &[]).unwrap();
    }

    let err = manager.create_zone("zone-8", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Overflow);
    assert_eq!(manager.zones().count(), ZONE_MAX);
}

#[test]
fn duplicate_registrations_surface_as_exists() {
    let mut manager = ResourceManager::new();
    manager.define_zone_attributes(Vec::new()).unwrap();

    manager.register_resource("audio", false, Vec::new(), None).unwrap();
    assert_eq!(
        manager.register_resource("audio", true, Vec::new(), None).unwrap_err().code(),
        ErrorCode::Exists
    );

    assert_eq!(manager.define_zone_attributes(Vec::new()).unwrap_err().code(), ErrorCode::Exists);

    manager.create_client("app").unwrap();
    assert_eq!(manager.create_client("app").unwrap_err().code(), ErrorCode::Exists);
}

#[test]
fn sync_release_stays_reserved() {
    let mut manager = ResourceManager::new();
    let id = manager.register_resource("audio", false, Vec::new(), None).unwrap();

    // the field is declared, defaults to off, and nothing flips it
    assert!(!manager.resources().find_by_id(id).unwrap().sync_release);
}
