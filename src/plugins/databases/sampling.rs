use serde::Deserialize;

use crate::plugins::databases::scope::{glob_match, matches_any, string_or_list};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingIncludeRule {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub schemas: Option<Vec<String>>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub tables: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingExcludeRule {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub schemas: Option<Vec<String>>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub tables: Option<Vec<String>>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub except_schemas: Option<Vec<String>>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub except_tables: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingScope {
    #[serde(default)]
    pub include: Vec<SamplingIncludeRule>,
    #[serde(default)]
    pub exclude: Vec<SamplingExcludeRule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub scope: Option<SamplingScope>,
}

fn default_enabled() -> bool {
    true
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: None,
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<(), String> {
        let Some(scope) = &self.scope else {
            return Ok(());
        };
        for rule in &scope.include {
            if rule.catalog.is_none() && rule.schemas.is_none() && rule.tables.is_none() {
                return Err(
                    "sampling include rule must specify at least one of: catalog, schemas, tables"
                        .to_string(),
                );
            }
        }
        for rule in &scope.exclude {
            if rule.catalog.is_none() && rule.schemas.is_none() && rule.tables.is_none() {
                return Err(
                    "sampling exclude rule must specify at least one of: catalog, schemas, tables"
                        .to_string(),
                );
            }
        }
        Ok(())
    }
}

/// Decides which tables get sampled; the same include/exclude/except shape as
/// the introspection scope, one level deeper.
pub struct SamplingScopeMatcher {
    enabled: bool,
    scope: SamplingScope,
}

impl SamplingScopeMatcher {
    pub fn new(config: Option<SamplingConfig>) -> Self {
        let config = config.unwrap_or_default();
        Self {
            enabled: config.enabled,
            scope: config.scope.unwrap_or_default(),
        }
    }

    pub fn should_sample(&self, catalog: &str, schema: &str, table: &str) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.scope.include.is_empty() && !self.is_included(catalog, schema, table) {
            return false;
        }
        !self.is_excluded(catalog, schema, table)
    }

    fn is_included(&self, catalog: &str, schema: &str, table: &str) -> bool {
        self.scope.include.iter().any(|rule| {
            if let Some(pattern) = &rule.catalog {
                if !glob_match(pattern, catalog) {
                    return false;
                }
            }
            matches_any(rule.schemas.as_ref(), schema) && matches_any(rule.tables.as_ref(), table)
        })
    }

    fn is_excluded(&self, catalog: &str, schema: &str, table: &str) -> bool {
        self.scope.exclude.iter().any(|rule| {
            if let Some(pattern) = &rule.catalog {
                if !glob_match(pattern, catalog) {
                    return false;
                }
            }
            if !matches_any(rule.schemas.as_ref(), schema) {
                return false;
            }
            if !matches_any(rule.tables.as_ref(), table) {
                return false;
            }
            if let Some(except) = &rule.except_schemas {
                if except.iter().any(|p| glob_match(p, schema)) {
                    return false;
                }
            }
            if let Some(except) = &rule.except_tables {
                if except.iter().any(|p| glob_match(p, table)) {
                    return false;
                }
            }
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from_yaml(yaml: &str) -> SamplingConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn sampling_defaults_to_everything() {
        let matcher = SamplingScopeMatcher::new(None);
        assert!(matcher.should_sample("main", "public", "users"));
    }

    #[test]
    fn disabled_sampling_samples_nothing() {
        let matcher = SamplingScopeMatcher::new(Some(config_from_yaml("enabled: false\n")));
        assert!(!matcher.should_sample("main", "public", "users"));
    }

    #[test]
    fn table_globs_restrict_sampling() {
        let config = config_from_yaml(
            "enabled: true\nscope:\n  include:\n    - tables: ['dim_*']\n  exclude:\n    - tables: ['dim_secret']\n",
        );
        let matcher = SamplingScopeMatcher::new(Some(config));

        assert!(matcher.should_sample("main", "public", "dim_users"));
        assert!(!matcher.should_sample("main", "public", "fact_orders"));
        assert!(!matcher.should_sample("main", "public", "dim_secret"));
    }

    #[test]
    fn except_tables_punch_holes_in_excludes() {
        let config = config_from_yaml(
            "scope:\n  exclude:\n    - schemas: ['raw']\n      except_tables: ['raw_keep']\n",
        );
        let matcher = SamplingScopeMatcher::new(Some(config));

        assert!(!matcher.should_sample("main", "raw", "raw_events"));
        assert!(matcher.should_sample("main", "raw", "raw_keep"));
    }
}
