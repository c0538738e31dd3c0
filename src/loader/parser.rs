use std::fs;

use crate::api::config_dto::SystemConfigDto;
use crate::error::Result;

/// Reads a declaration file and deserializes it into the configuration
/// DTO the engine consumes: zone attribute schema, zones, application
/// classes and resource definitions.
///
/// Fails with `Error::Io` when the file cannot be read and with
/// `Error::Deserialization` when it is not a valid declaration document.
pub fn load_declarations(path: &str) -> Result<SystemConfigDto> {
    let text = fs::read_to_string(path)?;
    let config: SystemConfigDto = serde_json::from_str(&text)?;

    log::debug!(
        "declaration file '{}': {} zone(s), {} class(es), {} resource(s)",
        path,
        config.zones.len(),
        config.application_classes.len(),
        config.resources.len()
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::io::Write;

    #[test]
    fn a_declaration_file_round_trips() {
        let path = std::env::temp_dir().join("arbiter-declarations.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{ "zones": [ {{ "name": "driver" }} ] }}"#).unwrap();

        let config = load_declarations(path.to_str().unwrap()).unwrap();
        assert_eq!(config.zones[0].name, "driver");
        assert!(config.resources.is_empty());
    }

    #[test]
    fn failures_carry_the_io_code() {
        let err = load_declarations("/nonexistent/declarations.json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Io);
    }
}
