use crate::domain::manager::ResourceManager;
use crate::error::Result;
use crate::loader::parser;

pub mod api;
pub mod db;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Builds a [`ResourceManager`] from a JSON declaration file: zone
/// attribute schema, zones, application classes and resource definitions,
/// applied in that order.
pub fn manager_from_config_file(file_path: &str) -> Result<ResourceManager> {
    let config = parser::load_declarations(file_path)?;
    log::info!("Configuration file parsed successfully.");

    let manager = ResourceManager::from_config(&config)?;
    log::info!("Resource manager constructed successfully.");

    Ok(manager)
}
