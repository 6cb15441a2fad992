// crates/core/src/config/mod.rs
pub mod loader_config;

pub use loader_config::{LoaderConfig, DEFAULT_MACROBATCH_SIZE};

/// Convert YAML to JSON - utility for CLI validation
pub fn yaml_to_json(yaml_str: &str) -> Result<String, crate::error::ConfigError> {
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(yaml_str)?;
    serde_json::to_string_pretty(&yaml_value).map_err(|e| crate::error::ConfigError::Invalid {
        field: "document",
        reason: format!("not representable as JSON: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_converts_to_json() {
        let json = yaml_to_json("manifest: /data/train.csv\nmacrobatch_size: 8\n").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["manifest"], "/data/train.csv");
        assert_eq!(value["macrobatch_size"], 8);
    }

    #[test]
    fn bad_yaml_is_reported() {
        assert!(yaml_to_json("manifest: [unclosed").is_err());
    }
}
