pub mod application_class;
pub mod attribute;
pub mod client;
pub mod events;
pub mod manager;
pub mod owner;
pub mod resource;
pub mod resource_set;
pub mod zone;

/// Declared length of name-valued table columns.
pub const NAME_LENGTH: usize = 24;
