/*
 * Copyright 2019 OysterPack Inc.
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! Log config

use log::Level;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Log config
/// - is serializable, so it can be loaded from the application's configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    root_level: Level,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    target_levels: Option<BTreeMap<Target, Level>>,
    #[serde(default)]
    output: LogOutput,
}

impl LogConfig {
    /// Returns the root log level.
    pub fn root_level(&self) -> Level {
        self.root_level
    }

    /// Returns the configured target log levels
    pub fn target_levels(&self) -> Option<&BTreeMap<Target, Level>> {
        self.target_levels.as_ref()
    }

    /// Returns where log records are written to
    pub fn output(&self) -> LogOutput {
        self.output
    }
}

impl Default for LogConfig {
    /// Creates a default LogConfig with the root log level set to Warn, logging to stdout
    fn default() -> Self {
        LogConfig {
            root_level: Level::Warn,
            target_levels: None,
            output: LogOutput::default(),
        }
    }
}

/// LogConfig builder
#[derive(Debug)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    /// Constructs a new LogConfigBuilder with the specified root log level
    pub fn new(root_level: Level) -> Self {
        LogConfigBuilder {
            config: LogConfig {
                root_level,
                ..LogConfig::default()
            },
        }
    }

    /// Sets the log level for the specified target
    /// - setting the level for the same target again replaces the previous level
    pub fn target_level(mut self, target: Target, level: Level) -> Self {
        self.config
            .target_levels
            .get_or_insert_with(BTreeMap::new)
            .insert(target, level);
        self
    }

    /// Sets the log output
    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    /// Builds and returns the LogConfig
    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Where log records are written to
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum LogOutput {
    /// stdout
    Stdout,
    /// stderr
    Stderr,
}

impl Default for LogOutput {
    fn default() -> Self {
        LogOutput::Stdout
    }
}

/// Represents a log target, e.g., a crate or module path
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Target(pub String);

impl Target {
    /// Constructs a new Target by appending the specified target.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// # use oysterpack_log::config::Target;
    /// let foo = Target::from("foo");
    /// let foo_bar = foo.append(&Target::from("bar"));
    /// assert_eq!(Target::from("foo::bar"), foo_bar);
    /// ```
    pub fn append(&self, target: &Target) -> Target {
        Target(format!("{}::{}", self.0, target.0))
    }
}

impl AsRef<str> for Target {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'a> From<&'a str> for Target {
    fn from(target: &'a str) -> Self {
        Target(target.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::info;
    use pretty_assertions::assert_eq;

    #[test]
    fn root_log_level_configured() {
        crate::run_test("root_log_level_configured", || {
            let config = LogConfigBuilder::new(Level::Info).build();
            info!("{}", serde_json::to_string(&config).unwrap());
            assert_eq!(config.root_level(), Level::Info);
            assert_eq!(config.output(), LogOutput::Stdout);
        });
    }

    #[test]
    fn default_log_config() {
        crate::run_test("default_log_config", || {
            let config: LogConfig = Default::default();
            assert_eq!(config.root_level(), Level::Warn);
            assert!(config.target_levels().is_none());
            assert_eq!(config.output(), LogOutput::Stdout);
        });
    }

    #[test]
    fn target_levels_are_replaced_per_target() {
        crate::run_test("target_levels_are_replaced_per_target", || {
            let config = LogConfigBuilder::new(Level::Info)
                .target_level(Target::from("a"), Level::Info)
                .target_level(Target::from("a"), Level::Warn)
                .target_level(Target::from("b"), Level::Error)
                .output(LogOutput::Stderr)
                .build();
            assert_eq!(*config.target_levels().unwrap(), {
                let mut map = BTreeMap::new();
                map.insert(Target::from("a"), Level::Warn);
                map.insert(Target::from("b"), Level::Error);
                map
            });
            assert_eq!(config.output(), LogOutput::Stderr);
        });
    }

    #[test]
    fn log_config_loaded_from_json() {
        crate::run_test("log_config_loaded_from_json", || {
            let json = r#"{"root_level":"Error","target_levels":{"oysterpack_promise":"Debug"}}"#;
            let config: LogConfig = serde_json::from_str(json).unwrap();
            assert_eq!(config.root_level(), Level::Error);
            assert_eq!(
                config
                    .target_levels()
                    .and_then(|levels| levels.get(&Target::from("oysterpack_promise")))
                    .cloned(),
                Some(Level::Debug)
            );
            // output falls back to the default when not configured
            assert_eq!(config.output(), LogOutput::Stdout);
        });
    }
}
