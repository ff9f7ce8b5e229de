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

//! Combinators derive new promises from existing ones.
//!
//! Each combinator comes in two flavors:
//! - `stage(f)` runs `f` on the thread that settles the upstream promise, i.e., on the upstream's
//!   executor. If the upstream has already settled, `f` runs on the current thread before the
//!   combinator returns.
//! - `stage_async(executor, f)` runs `f` on the specified executor. If the executor has been shut
//!   down by the time `f` is due, the derived promise fails with `PromiseError::ExecutorClosed`.
//!   To run `f` on the shared pool, pass the [global executor](../../execution/fn.global_executor.html).
//!
//! If `f` panics, the derived promise fails with a `ProducerPanic` producer error.
//!
//! Failures short-circuit: stages that transform values are skipped when the upstream failed, and
//! the error is propagated as is, until a [recover](../struct.Promise.html#method.recover) or
//! [handle](../struct.Promise.html#method.handle) stage intercepts it.

use super::{guarded, Promise};
use crate::{
    errors::{PromiseError, SecondaryObserverError},
    execution::Executor,
};
use oysterpack_log::*;
use std::panic::{catch_unwind, AssertUnwindSafe};

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// Derives a new promise whose outcome is computed by `stage` from this promise's outcome.
    fn derive<U, F>(&self, executor: Option<&Executor>, stage: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Result<T, PromiseError>) -> Result<U, PromiseError> + Send + 'static,
    {
        let derived = Promise::new();
        let completer = derived.clone();
        match executor {
            None => self.on_settle(move |outcome| {
                completer.settle(run_stage(stage, outcome));
            }),
            Some(executor) => {
                let executor = executor.clone();
                self.on_settle(move |outcome| {
                    let stage_completer = completer.clone();
                    if let Err(err) = executor.spawn(move || {
                        stage_completer.settle(run_stage(stage, outcome));
                    }) {
                        completer.settle(Err(err.into()));
                    }
                });
            }
        }
        derived
    }

    /// On success, applies `f` to the value. On failure, `f` is not called and the error is propagated.
    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.derive(None, move |outcome| outcome.map(f))
    }

    /// [map](#method.map) with `f` running on the specified executor
    pub fn map_async<U, F>(&self, executor: &Executor, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.derive(Some(executor), move |outcome| outcome.map(f))
    }

    /// Like [map](#method.map), but `f` may fail, in which case the derived promise fails with
    /// `PromiseError::Producer`.
    pub fn try_map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, failure::Error> + Send + 'static,
    {
        self.derive(None, move |outcome| outcome.and_then(|value| guarded(|| f(value))))
    }

    /// [try_map](#method.try_map) with `f` running on the specified executor
    pub fn try_map_async<U, F>(&self, executor: &Executor, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, failure::Error> + Send + 'static,
    {
        self.derive(Some(executor), move |outcome| {
            outcome.and_then(|value| guarded(|| f(value)))
        })
    }

    /// On failure, the handler converts the error into a value, i.e., the failure is swallowed.
    /// On success, this stage is transparent.
    pub fn recover<F>(&self, handler: F) -> Promise<T>
    where
        F: FnOnce(PromiseError) -> T + Send + 'static,
    {
        self.derive(None, move |outcome| outcome.or_else(|err| Ok(handler(err))))
    }

    /// [recover](#method.recover) with the handler running on the specified executor
    pub fn recover_async<F>(&self, executor: &Executor, handler: F) -> Promise<T>
    where
        F: FnOnce(PromiseError) -> T + Send + 'static,
    {
        self.derive(Some(executor), move |outcome| {
            outcome.or_else(|err| Ok(handler(err)))
        })
    }

    /// Handles either outcome, always producing a value.
    pub fn handle<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Result<T, PromiseError>) -> U + Send + 'static,
    {
        self.derive(None, move |outcome| Ok(f(outcome)))
    }

    /// [handle](#method.handle) with `f` running on the specified executor
    pub fn handle_async<U, F>(&self, executor: &Executor, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Result<T, PromiseError>) -> U + Send + 'static,
    {
        self.derive(Some(executor), move |outcome| Ok(f(outcome)))
    }

    /// Observes the outcome for side effects, passing the outcome through unchanged.
    /// - if the observer panics, the panic is logged as a `SecondaryObserverError` and the original
    ///   outcome is still passed through
    pub fn observe<F>(&self, observer: F) -> Promise<T>
    where
        F: FnOnce(Result<&T, &PromiseError>) + Send + 'static,
    {
        self.derive(None, move |outcome| notify_observer(observer, outcome))
    }

    /// [observe](#method.observe) with the observer running on the specified executor
    /// - if the executor has been shut down, the observer is not run, and the returned promise fails
    ///   with `PromiseError::ExecutorClosed` instead of passing the outcome through
    pub fn observe_async<F>(&self, executor: &Executor, observer: F) -> Promise<T>
    where
        F: FnOnce(Result<&T, &PromiseError>) + Send + 'static,
    {
        self.derive(Some(executor), move |outcome| notify_observer(observer, outcome))
    }

    /// Chains an asynchronous stage: `f` returns a promise, whose outcome becomes the outcome of
    /// the returned promise.
    pub fn and_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.derive(None, move |outcome| outcome.map(f)).flatten()
    }

    /// [and_then](#method.and_then) with `f` running on the specified executor
    pub fn and_then_async<U, F>(&self, executor: &Executor, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.derive(Some(executor), move |outcome| outcome.map(f))
            .flatten()
    }

    /// Consumes the value. On failure, the consumer is not called and the error is propagated.
    pub fn then_accept<F>(&self, consumer: F) -> Promise<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.map(consumer)
    }

    /// [then_accept](#method.then_accept) with the consumer running on the specified executor
    pub fn then_accept_async<F>(&self, executor: &Executor, consumer: F) -> Promise<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.map_async(executor, consumer)
    }

    /// Runs the action after this promise succeeds. On failure, the action is not run and the error
    /// is propagated.
    pub fn then_run<F>(&self, action: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.map(move |_| action())
    }

    /// [then_run](#method.then_run) with the action running on the specified executor
    pub fn then_run_async<F>(&self, executor: &Executor, action: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.map_async(executor, move |_| action())
    }
}

impl<T> Promise<Promise<T>>
where
    T: Clone + Send + 'static,
{
    /// Flattens a promise of a promise.
    pub fn flatten(&self) -> Promise<T> {
        let flattened = Promise::new();
        let completer = flattened.clone();
        self.on_settle(move |outcome| match outcome {
            Ok(inner) => inner.on_settle(move |outcome| {
                completer.settle(outcome);
            }),
            Err(err) => {
                completer.settle(Err(err));
            }
        });
        flattened
    }
}

/// Returns a promise that settles with the outcome of whichever promise settles first.
/// - the loser keeps running, but its outcome is discarded
pub fn race<T>(first: &Promise<T>, second: &Promise<T>) -> Promise<T>
where
    T: Clone + Send + 'static,
{
    race_all(vec![first.clone(), second.clone()])
}

/// Returns a promise that settles with the outcome of the first of the promises to settle.
/// - if no promises are specified, then the returned promise fails with `PromiseError::EmptyInput`
/// - the losers keep running, but their outcomes are discarded
/// - if some of the promises have already settled, the first of those, in iteration order, wins
pub fn race_all<T, I>(promises: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let winner = Promise::new();
    let mut racers = 0_usize;
    for promise in promises {
        racers += 1;
        let winner = winner.clone();
        promise.on_settle(move |outcome| {
            winner.settle(outcome);
        });
    }
    if racers == 0 {
        winner.fail(PromiseError::EmptyInput);
    }
    winner
}

fn run_stage<T, U, F>(stage: F, outcome: Result<T, PromiseError>) -> Result<U, PromiseError>
where
    F: FnOnce(Result<T, PromiseError>) -> Result<U, PromiseError>,
{
    catch_unwind(AssertUnwindSafe(move || stage(outcome)))
        .unwrap_or_else(|panic| Err(PromiseError::panicked(panic)))
}

fn notify_observer<T, F>(observer: F, outcome: Result<T, PromiseError>) -> Result<T, PromiseError>
where
    F: FnOnce(Result<&T, &PromiseError>),
{
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer(outcome.as_ref()))) {
        let err = SecondaryObserverError::from_panic(panic);
        error!("{}", err);
    }
    outcome
}
