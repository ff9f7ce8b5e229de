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

//! Standardizes logging for OysterPack crates on top of [log](https://crates.io/crates/log).
//! Given a LogConfig, this crate knows how to initialize the logging system. The log macros are
//! re-exported, so crates only need to `use oysterpack_log::*;`.
//!
//! ```rust
//! use oysterpack_log::*;
//!
//! let log_config = LogConfigBuilder::new(Level::Info)
//!     .target_level(Target::from("oysterpack_promise"), Level::Debug)
//!     .output(LogOutput::Stderr)
//!     .build();
//! oysterpack_log::init(log_config);
//! // The LogConfig used to initialize the log system can be retrieved.
//! let log_config = oysterpack_log::config().unwrap();
//! info!("logging with: {:?}", log_config);
//! ```

#![deny(missing_docs, missing_debug_implementations)]
#![doc(html_root_url = "https://docs.rs/oysterpack_log/0.2.0")]

pub mod config;
pub mod manager;

pub use crate::config::{LogConfig, LogConfigBuilder, LogOutput, Target};
pub use crate::manager::{config, init, is_initialized};

pub use log::{
    // re-export the log macros
    debug,
    error,
    info,
    log,
    log_enabled,
    trace,
    warn,
    // re-export some other common log members
    Level,
    LevelFilter,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// - ensures logging is configured and initialized
    /// - collects test execution time and logs it
    pub fn run_test<F: FnOnce()>(name: &str, test: F) {
        let log_config = LogConfigBuilder::new(Level::Warn)
            .target_level(Target::from(env!("CARGO_PKG_NAME")), Level::Debug)
            .build();
        init(log_config);
        let before = std::time::Instant::now();
        test();
        info!("{}: test run time: {:?}", name, before.elapsed());
    }

    #[test]
    fn compiles() {
        run_test("compiles", || info!("it compiles :)"));
    }
}

#[cfg(test)]
pub(crate) use crate::tests::run_test;
