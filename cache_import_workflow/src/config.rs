//! Settings shared by every component of the workflow.

/// Validated import settings.
///
/// Built once at startup and handed to each component; nothing in this crate reads the
/// process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    pub project_id: String,
    pub instance: String,
    /// Bigtable cluster of `instance`. Carried for scaling, which is not performed.
    pub cluster: String,
    pub dataflow_template: String,
    /// Resource bucket holding the imports.
    pub bucket: String,
    pub controller_trigger_topic: String,
}

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not set in environment")]
    Missing { name: &'static str },
}

impl ImportConfig {
    /// Fail on the first empty setting.
    pub fn validate(self) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("projectID", &self.project_id),
            ("instance", &self.instance),
            ("cluster", &self.cluster),
            ("dataflowTemplate", &self.dataflow_template),
            ("bucket", &self.bucket),
            ("controllerTriggerTopic", &self.controller_trigger_topic),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing { name });
            }
        }
        Ok(self)
    }
}
