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

//! Promise related errors

use crate::execution::{ExecutorError, ExecutorId};
use failure::Fail;
use std::{any::Any, fmt, sync::Arc};

/// The failure outcome of a [Promise](../promise/struct.Promise.html).
///
/// Errors are cloned to every stage that depends on the failed promise, which is why producer
/// errors are shared behind an `Arc`.
#[derive(Fail, Debug, Clone)]
pub enum PromiseError {
    /// The producer or a combinator callback failed, i.e., returned an error or panicked.
    #[fail(display = "{}", _0)]
    Producer(#[fail(cause)] ProducerError),
    /// [race_all](../promise/fn.race_all.html) was given no promises to race.
    #[fail(display = "race_all requires at least one promise")]
    EmptyInput,
    /// Work was scheduled on an Executor that has been shut down.
    #[fail(display = "Executor has been shut down: {}", _0)]
    ExecutorClosed(ExecutorId),
}

impl PromiseError {
    /// Wraps the error that a producer or callback failed with.
    pub fn producer<E: Into<failure::Error>>(err: E) -> PromiseError {
        PromiseError::Producer(ProducerError::new(err))
    }

    /// Converts a caught panic payload into a producer failure.
    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> PromiseError {
        PromiseError::producer(ProducerPanic(panic_message(&*payload)))
    }

    /// Returns the producer error, if this is a producer failure.
    pub fn producer_error(&self) -> Option<&ProducerError> {
        match self {
            PromiseError::Producer(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if the failure was caused by a panic.
    pub fn is_panic(&self) -> bool {
        self.producer_error()
            .map(ProducerError::is_panic)
            .unwrap_or(false)
    }
}

impl From<ProducerError> for PromiseError {
    fn from(err: ProducerError) -> Self {
        PromiseError::Producer(err)
    }
}

impl From<ExecutorError> for PromiseError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::ExecutorClosed(id) => PromiseError::ExecutorClosed(id),
            err => PromiseError::producer(err),
        }
    }
}

/// The error a producer or combinator callback failed with.
/// - the original error is preserved and can be recovered via [downcast_ref](#method.downcast_ref)
#[derive(Clone)]
pub struct ProducerError(Arc<failure::Error>);

impl ProducerError {
    /// constructor
    pub fn new<E: Into<failure::Error>>(err: E) -> ProducerError {
        ProducerError(Arc::new(err.into()))
    }

    /// Attempts to downcast to the original error type.
    pub fn downcast_ref<E: Fail>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// Returns true if the producer panicked.
    pub fn is_panic(&self) -> bool {
        self.downcast_ref::<ProducerPanic>().is_some()
    }

    /// Returns the underlying error as a `Fail` trait object.
    pub fn as_fail(&self) -> &dyn Fail {
        self.0.as_fail()
    }
}

impl fmt::Display for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ProducerError({})", self.0)
    }
}

impl Fail for ProducerError {
    fn cause(&self) -> Option<&dyn Fail> {
        Some(self.0.as_fail())
    }
}

/// A producer or combinator callback panicked while running.
#[derive(Fail, Debug, Clone, Eq, PartialEq)]
#[fail(display = "producer panicked: {}", _0)]
pub struct ProducerPanic(pub String);

/// An `observe` callback panicked.
///
/// There is no slot to report it without corrupting the observed outcome, which is passed through
/// unchanged. The error is logged and then dropped.
#[derive(Fail, Debug, Clone, Eq, PartialEq)]
#[fail(display = "promise observer failed: {}", _0)]
pub struct SecondaryObserverError(pub String);

impl SecondaryObserverError {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> SecondaryObserverError {
        SecondaryObserverError(panic_message(&*payload))
    }
}

/// Extracts the message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{io, panic};

    #[derive(Fail, Debug)]
    #[fail(display = "invalid order: {}", _0)]
    struct InvalidOrder(u32);

    #[test]
    fn producer_error_preserves_original_error() {
        let err = PromiseError::producer(InvalidOrder(7));
        assert_eq!(err.to_string(), "invalid order: 7");
        let producer_error = err.producer_error().unwrap();
        assert_eq!(producer_error.downcast_ref::<InvalidOrder>().unwrap().0, 7);
        assert!(producer_error.downcast_ref::<ProducerPanic>().is_none());
        assert!(!err.is_panic());
        // the cause chain leads back to the original error
        assert_eq!(
            err.cause().map(|cause| cause.to_string()),
            Some("invalid order: 7".to_string())
        );
    }

    #[test]
    fn std_errors_are_wrapped() {
        let err = PromiseError::producer(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        let io_err = err
            .producer_error()
            .and_then(|err| err.downcast_ref::<io::Error>())
            .unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn cloned_errors_share_the_original() {
        let err = PromiseError::producer(InvalidOrder(1));
        let clone = err.clone();
        match (err, clone) {
            (PromiseError::Producer(a), PromiseError::Producer(b)) => assert!(Arc::ptr_eq(&a.0, &b.0)),
            other => panic!("unexpected errors: {:?}", other),
        }
    }

    #[test]
    fn panic_payloads_become_producer_panics() {
        let payload = panic::catch_unwind(|| panic!("BOOM({})!", 1)).unwrap_err();
        let err = PromiseError::panicked(payload);
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "producer panicked: BOOM(1)!");

        let payload = panic::catch_unwind(|| panic!("static BOOM!")).unwrap_err();
        assert_eq!(
            SecondaryObserverError::from_panic(payload),
            SecondaryObserverError("static BOOM!".to_string())
        );
    }

    #[test]
    fn executor_closed_maps_to_promise_error() {
        let id = ExecutorId::generate();
        match PromiseError::from(ExecutorError::ExecutorClosed(id)) {
            PromiseError::ExecutorClosed(closed_id) => assert_eq!(closed_id, id),
            err => panic!("unexpected error: {:?}", err),
        }
    }
}
