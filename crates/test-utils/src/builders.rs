#![allow(dead_code)]

use builddag::config::{ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
use builddag::types::UpToDatePolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.config.config.jobs = Some(jobs);
        self
    }

    pub fn with_db(mut self, path: &str) -> Self {
        self.config.config.db = Some(path.to_string());
        self
    }

    pub fn with_default_policy(mut self, policy: UpToDatePolicy) -> Self {
        self.config.config.up_to_date = policy;
        self
    }

    pub fn section(&self) -> &ConfigSection {
        &self.config.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    /// Validation result, for tests that expect a rejection.
    pub fn try_build(self) -> builddag::errors::Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(cmd.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    /// A task without a command.
    pub fn phony() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn target(mut self, path: &str) -> Self {
        self.task.targets.push(path.to_string());
        self
    }

    pub fn dep(mut self, path: &str) -> Self {
        self.task.deps.push(path.to_string());
        self
    }

    pub fn after(mut self, task: &str) -> Self {
        self.task.after.push(task.to_string());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn exclusive(mut self, group: &str) -> Self {
        self.task.exclusive = Some(group.to_string());
        self
    }

    pub fn greedy(mut self, val: bool) -> Self {
        self.task.greedy = val;
        self
    }

    pub fn up_to_date(mut self, policy: UpToDatePolicy) -> Self {
        self.task.up_to_date = Some(policy);
        self
    }

    pub fn always(mut self, val: bool) -> Self {
        self.task.always = val;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
