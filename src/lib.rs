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

//! **OysterPack Promise** provides composable promises: asynchronous computations that run on
//! thread pool [executors](execution/struct.Executor.html) and that can be chained, raced and
//! recovered from failure.
//!
//! - a [Promise](promise/struct.Promise.html) is a handle to the eventual outcome of a unit of
//!   work: it is either pending, succeeded with a value, or failed with a
//!   [PromiseError](errors/enum.PromiseError.html)
//! - a promise settles exactly once
//! - combinators derive new promises from existing ones, e.g., `map`, `recover`, `observe`,
//!   `and_then`, [race](promise/fn.race.html), [race_all](promise/fn.race_all.html)
//! - [join](promise/struct.Promise.html#method.join) blocks the calling thread until the promise
//!   settles
//!
//! ```rust
//! use oysterpack_promise::{execution, promise::Promise};
//!
//! let executor = execution::global_executor();
//! let words = Promise::supply_async(&executor, || vec!["a".to_string(), "b".to_string()])
//!     .try_map(|_words| -> Result<Vec<String>, failure::Error> {
//!         Err(failure::err_msg("exception thrown!!"))
//!     })
//!     .recover(|err| vec![err.to_string()]);
//! assert_eq!(words.join().unwrap(), vec!["exception thrown!!".to_string()]);
//! ```

#![deny(missing_docs, missing_debug_implementations)]
#![doc(html_root_url = "https://docs.rs/oysterpack_promise/0.1.0")]

pub mod errors;
pub mod execution;
pub mod promise;

pub use crate::errors::{PromiseError, ProducerError};
pub use crate::execution::{bounded_executor, global_executor, Executor, ExecutorBuilder, ExecutorId};
pub use crate::promise::{race, race_all, Promise, PromiseState};

/// initializes logging for unit tests
#[cfg(test)]
pub(crate) fn configure_logging() {
    use oysterpack_log::*;

    let log_config = LogConfigBuilder::new(Level::Warn)
        .target_level(Target::from(env!("CARGO_PKG_NAME")), Level::Debug)
        .output(LogOutput::Stderr)
        .build();
    oysterpack_log::init(log_config);
}
