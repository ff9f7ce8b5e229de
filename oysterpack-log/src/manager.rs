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

//! This module is the anchor point for configuring and initializing the [log](https://crates.io/crates/log) system.

use crate::config::{LogConfig, LogOutput};
use fern::Dispatch;
use lazy_static::lazy_static;
use log::{info, warn};
use parking_lot::Mutex;

lazy_static! {
    /// The config that was used to initialize the log system
    static ref LOG_CONFIG: Mutex<Option<LogConfig>> = Mutex::new(None);
}

/// Initializes the logging system.
/// - the logging system can only be initialized once per process
/// - returns true if this call initialized the logging system
/// - returns false if logging has already been initialized, or if some other logger has already
///   been installed
pub fn init(config: LogConfig) -> bool {
    let mut log_config = LOG_CONFIG.lock();
    if log_config.is_some() {
        warn!("logging has already been initialized - the config is ignored: {:?}", config);
        return false;
    }

    let mut dispatch = Dispatch::new().level(config.root_level().to_level_filter());
    if let Some(target_levels) = config.target_levels() {
        for (target, level) in target_levels {
            dispatch = dispatch.level_for(target.as_ref().to_string(), level.to_level_filter());
        }
    }
    let dispatch = match config.output() {
        LogOutput::Stdout => format(dispatch).chain(std::io::stdout()),
        LogOutput::Stderr => format(dispatch).chain(std::io::stderr()),
    };

    if let Err(err) = dispatch.apply() {
        warn!("logging could not be initialized: {}", err);
        return false;
    }

    match serde_json::to_string(&config) {
        Ok(config_json) => info!("logging has been initialized using config: {}", config_json),
        Err(_) => info!("logging has been initialized using config: {:?}", config),
    }
    *log_config = Some(config);
    true
}

fn format(dispatch: Dispatch) -> Dispatch {
    dispatch.format(|out, message, record| {
        out.finish(format_args!(
            "{}[{}][{}][{}:{}] {}",
            chrono::Local::now().format("[%H:%M:%S%.3f]"),
            record.level(),
            record.target(),
            record.file().unwrap_or("<unknown>"),
            record.line().unwrap_or(0),
            message
        ))
    })
}

/// Returns true if the logging system has been initialized via [init](fn.init.html)
pub fn is_initialized() -> bool {
    LOG_CONFIG.lock().is_some()
}

/// Returns the LogConfig used to initialize the log system.
pub fn config() -> Option<LogConfig> {
    LOG_CONFIG.lock().clone()
}
