use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use whisper_common::{AggregationMethod, CreateOptions, DEFAULT_X_FILES_FACTOR};
use whisper_merge::MergeConfig;

/// Defaults loaded from a TOML file; command-line flags override them.
///
/// ```toml
/// [create]
/// aggregation_method = "sum"
/// x_files_factor = 0.0
/// archives = ["60:1d", "300:7d"]
///
/// [aggregate]
/// mode = "delta"
/// reuse_destination = true
/// ```
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub create: CreateConfig,
    pub aggregate: MergeConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateConfig {
    pub aggregation_method: Option<AggregationMethod>,
    pub x_files_factor: Option<f32>,
    pub archives: Vec<String>,
    pub sparse: bool,
}

impl CreateConfig {
    /// Options from this section, with command-line values taking priority.
    pub fn options(
        &self,
        aggregation_method: Option<AggregationMethod>,
        x_files_factor: Option<f32>,
        sparse: bool,
    ) -> CreateOptions {
        CreateOptions {
            x_files_factor: x_files_factor
                .or(self.x_files_factor)
                .unwrap_or(DEFAULT_X_FILES_FACTOR),
            aggregation_method: aggregation_method
                .or(self.aggregation_method)
                .unwrap_or_default(),
            sparse: sparse || self.sparse,
        }
    }
}

impl ToolConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_optional(path: Option<&Path>) -> anyhow::Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisper_common::MergeMode;

    #[test]
    fn test_parse_full_config() {
        let config = ToolConfig::parse(
            r#"
            [create]
            aggregation_method = "sum"
            x_files_factor = 0.0
            archives = ["60:1d", "300:7d"]

            [aggregate]
            mode = "delta"
            reuse_destination = false
            "#,
        )
        .unwrap();

        assert_eq!(config.create.aggregation_method, Some(AggregationMethod::Sum));
        assert_eq!(config.create.archives, vec!["60:1d", "300:7d"]);
        assert_eq!(config.aggregate.mode, MergeMode::Delta);
        assert!(!config.aggregate.reuse_destination);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = ToolConfig::parse("").unwrap();
        assert_eq!(config, ToolConfig::default());
        assert!(config.aggregate.reuse_destination);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(ToolConfig::parse("[aggregate]\nmod = \"sum\"\n").is_err());
        assert!(ToolConfig::parse("[aggregate]\nmode = \"rate\"\n").is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let section = CreateConfig {
            aggregation_method: Some(AggregationMethod::Max),
            x_files_factor: Some(0.1),
            archives: Vec::new(),
            sparse: false,
        };
        let options = section.options(Some(AggregationMethod::Min), None, true);
        assert_eq!(options.aggregation_method, AggregationMethod::Min);
        assert_eq!(options.x_files_factor, 0.1);
        assert!(options.sparse);

        let defaults = CreateConfig::default().options(None, None, false);
        assert_eq!(defaults, CreateOptions::default());
    }
}
