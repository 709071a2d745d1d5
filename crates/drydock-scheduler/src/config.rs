//! Construction-time scheduler configuration.

use crate::classify::{ChangeFilter, CustomPredicate, ImportancePolicy};
use crate::error::{Result, SchedulerError};
use crate::priority::Priority;

/// Configuration shared by every scheduler kind: identity, target
/// builders, importance filtering and priority policy.
#[derive(Clone, Default)]
pub struct SchedulerConfig {
    pub name: String,
    pub builder_names: Vec<String>,
    pub branch: Option<String>,
    pub categories: Vec<String>,
    pub priority: Priority,
    custom_policy: Option<CustomPredicate>,
}

impl SchedulerConfig {
    pub fn new(
        name: impl Into<String>,
        builder_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            builder_names: builder_names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Only changes on this branch count as important.
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Only changes in one of these categories count as important.
    pub fn categories(mut self, categories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Replace the branch/category filter with a custom predicate.
    /// Conflicts with `branch`/`categories`; validation rejects both.
    pub fn custom_policy(mut self, predicate: CustomPredicate) -> Self {
        self.custom_policy = Some(predicate);
        self
    }

    /// Validate at construction. Errors here are fatal to scheduler
    /// startup, never defaulted away.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SchedulerError::Configuration(
                "scheduler name must not be empty".into(),
            ));
        }
        if self.builder_names.is_empty() {
            return Err(SchedulerError::Configuration(format!(
                "scheduler '{}' has an empty builder set",
                self.name
            )));
        }
        if self.custom_policy.is_some() && (self.branch.is_some() || !self.categories.is_empty()) {
            return Err(SchedulerError::Configuration(format!(
                "scheduler '{}' combines a custom predicate with branch/category filters",
                self.name
            )));
        }
        Ok(())
    }

    /// The importance policy this configuration describes.
    pub fn policy(&self) -> ImportancePolicy {
        match &self.custom_policy {
            Some(predicate) => ImportancePolicy::Custom(predicate.clone()),
            None => ImportancePolicy::Filter(ChangeFilter {
                branch: self.branch.clone(),
                categories: self.categories.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("name", &self.name)
            .field("builder_names", &self.builder_names)
            .field("branch", &self.branch)
            .field("categories", &self.categories)
            .field("priority", &self.priority)
            .field("custom_policy", &self.custom_policy.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_empty_builder_set_is_rejected() {
        let config = SchedulerConfig::new("tsched", Vec::<String>::new());
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::Configuration(_))
        ));
    }

    #[test]
    fn test_conflicting_filters_are_rejected() {
        let config = SchedulerConfig::new("tsched", ["tbuild"])
            .branch("main")
            .custom_policy(Arc::new(|_| Ok(true)));
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::Configuration(_))
        ));
    }

    #[test]
    fn test_plain_config_is_valid() {
        let config = SchedulerConfig::new("tsched", ["tbuild"]).branch("main");
        assert!(config.validate().is_ok());
    }
}
