use std::fmt;
use std::rc::Rc;

use crate::domain::application_class::KEY_STAMP_BITS;
use crate::domain::manager::ResourceManager;
use crate::domain::resource::{ResourceInstance, ResourceMask};
use crate::error::{Error, Result};

/// Request number carried by engine-initiated transitions.
pub const REQNO_INVALID: u32 = u32::MAX;

/// When the request stamp counter would reach this limit it is rebased by
/// the minimum live stamp.
pub const STAMP_LIMIT: u32 = 1 << KEY_STAMP_BITS;

/// Per-set event callback: `(manager, reply_id, rset_id)`. Invoked only
/// during the delivery phase of an arbitration, revokes before grants.
/// The callback may re-enter the manager API; a call that would re-trigger
/// arbitration for the zone being arbitrated is deferred.
pub type ResourceSetCallback = Rc<dyn Fn(&mut ResourceManager, u32, u32)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSetState {
    NoRequest,
    Release,
    Acquire,
    /// Release committed locally, downstream acknowledgement outstanding.
    /// Arbitration treats it exactly like `Release`.
    PendingRelease,
}

impl fmt::Display for ResourceSetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceSetState::NoRequest => "no-request",
            ResourceSetState::Release => "release",
            ResourceSetState::Acquire => "acquire",
            ResourceSetState::PendingRelease => "pending-release",
        };
        f.write_str(s)
    }
}

/// A client-requested flag and its currently effective value. The engine
/// may flip `current` (auto-release, dont-wait demotions) and resets it to
/// `client` at the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagPair {
    pub current: bool,
    pub client: bool,
}

impl FlagPair {
    pub fn new(value: bool) -> Self {
        Self { current: value, client: value }
    }
}

/// The unit of arbitration: a bundle of resource instances owned by a
/// client, with the compound mandatory/optional policy, the request
/// bookkeeping and the grant/advice outcome of the last arbitration.
#[derive(Clone)]
pub struct ResourceSet {
    pub id: u32,
    pub client: u32,
    /// Index of the application class, set when the set is attached.
    pub class: Option<usize>,
    pub zone: u32,
    pub resources: Vec<ResourceInstance>,
    pub mask_all: ResourceMask,
    pub mask_mandatory: ResourceMask,
    pub mask_grant: ResourceMask,
    pub mask_advice: ResourceMask,
    /// OR of the member instances' `shared` flags.
    pub share: bool,
    pub state: ResourceSetState,
    pub auto_release: FlagPair,
    pub dont_wait: FlagPair,
    pub request_id: u32,
    pub request_stamp: u32,
    pub priority: u32,
    /// The key under which the set is currently filed in its class queue.
    pub queue_key: Option<u32>,
    pub event: Option<ResourceSetCallback>,
}

impl ResourceSet {
    pub(crate) fn new(
        id: u32,
        client: u32,
        auto_release: bool,
        dont_wait: bool,
        priority: u32,
        event: Option<ResourceSetCallback>,
    ) -> Self {
        Self {
            id,
            client,
            class: None,
            zone: 0,
            resources: Vec::new(),
            mask_all: 0,
            mask_mandatory: 0,
            mask_grant: 0,
            mask_advice: 0,
            share: false,
            state: ResourceSetState::NoRequest,
            auto_release: FlagPair::new(auto_release),
            dont_wait: FlagPair::new(dont_wait),
            request_id: REQNO_INVALID,
            request_stamp: 0,
            priority,
            queue_key: None,
            event,
        }
    }

    /// Adds an instance. The resource-id→instance map of a set is
    /// injective: a second instance of the same definition is rejected.
    pub(crate) fn add_instance(&mut self, instance: ResourceInstance, mandatory: bool) -> Result<()> {
        if self.find_resource(instance.def_id).is_some() {
            return Err(Error::Exists(format!(
                "resource {} in resource set {}",
                instance.def_id, self.id
            )));
        }

        let mask: ResourceMask = 1 << instance.def_id;
        self.mask_all |= mask;
        if mandatory {
            self.mask_mandatory |= mask;
        }
        self.share |= instance.shared;
        self.resources.push(instance);

        Ok(())
    }

    pub fn find_resource(&self, def_id: u32) -> Option<&ResourceInstance> {
        self.resources.iter().find(|r| r.def_id == def_id)
    }

    pub fn find_resource_mut(&mut self, def_id: u32) -> Option<&mut ResourceInstance> {
        self.resources.iter_mut().find(|r| r.def_id == def_id)
    }

    pub fn is_acquiring(&self) -> bool {
        self.state == ResourceSetState::Acquire
    }
}

impl fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSet")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("all", &format_args!("{:#x}", self.mask_all))
            .field("mandatory", &format_args!("{:#x}", self.mask_mandatory))
            .field("grant", &format_args!("{:#x}", self.mask_grant))
            .field("advice", &format_args!("{:#x}", self.mask_advice))
            .field("share", &self.share)
            .finish()
    }
}
