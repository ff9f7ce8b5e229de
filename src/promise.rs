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

//! Promises represent the eventual outcome of a unit of work.
//!
//! A promise is created pending, and settles exactly once, either succeeding with a value or failing
//! with a [PromiseError](../errors/enum.PromiseError.html). Once settled, a promise never changes.
//!
//! ## Continuations
//! Work that depends on the outcome of a promise is registered as a continuation, which is how the
//! [combinators](combinators/index.html) are built.
//! - continuations registered while the promise is pending are run in registration order by the
//!   thread that settles the promise
//! - continuations registered after the promise has settled run immediately on the registering thread
//! - combinators that take an [Executor](../execution/struct.Executor.html) re-schedule their work
//!   onto that executor
//!
//! - a settlement that happens while the thread is already running continuations does not recurse.
//!   Its continuations are queued on the thread and run, in order, once the current continuation
//!   returns. Thus chains of any depth settle in constant stack space.
//!
//! ## Blocking
//! [join](struct.Promise.html#method.join) blocks the calling thread until the promise settles.
//! If continuations are queued on the joining thread, they are run first.
//! Joining from a task running on a small bounded executor on a promise whose producer still needs a
//! worker thread from that same executor will deadlock. This is not detected.
//!
//! ## Failures
//! A promise that fails, but is never joined or recovered, simply discards its error.
//!
//! ## Dropping
//! Pending continuations own the promises they derive. Dropping a long chain of stages that never
//! settles releases it recursively, which can exhaust the stack for chains in the order of thousands
//! of stages. Settle or fail the head of such a chain before letting go of it.

use crate::{errors::PromiseError, execution::Executor};
use oysterpack_log::*;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt, mem,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

pub mod combinators;


pub use self::combinators::{race, race_all};

/// A callback that is invoked once with the promise's outcome.
type Continuation<T> = Box<dyn FnOnce(Result<T, PromiseError>) + Send>;

/// A continuation bound to its outcome, waiting to be run on the current thread
type QueuedContinuation = Box<dyn FnOnce()>;

thread_local! {
    /// Some while the thread is running continuations: settlements made by those continuations
    /// append to the queue, and the outermost settlement drains it.
    static QUEUED_CONTINUATIONS: RefCell<Option<VecDeque<QueuedContinuation>>> = RefCell::new(None);
}

enum State<T> {
    /// continuations are owned by the promise until it settles
    Pending(SmallVec<[Continuation<T>; 2]>),
    Settled(Result<T, PromiseError>),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
}

/// Promise states
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PromiseState {
    /// The promise has not yet settled
    Pending,
    /// The promise settled with a value
    Succeeded,
    /// The promise settled with an error
    Failed,
}

/// A handle to the eventual outcome of a unit of work.
/// - cloning a Promise only creates a new handle to the same underlying promise
/// - the outcome is cloned for each continuation and each join, thus large values should be wrapped
///   in an `Arc`
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match &*self.inner.state.lock() {
            State::Pending(continuations) => format!("Pending(continuations = {})", continuations.len()),
            State::Settled(Ok(_)) => "Succeeded".to_string(),
            State::Settled(Err(err)) => format!("Failed({})", err),
        };
        write!(f, "Promise({})", state)
    }
}

impl<T> Default for Promise<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Promise::new()
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a new pending promise, which is settled via [complete](#method.complete) or
    /// [fail](#method.fail).
    pub fn new() -> Promise<T> {
        Promise {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending(SmallVec::new())),
                settled: Condvar::new(),
            }),
        }
    }

    /// Creates a promise that has already succeeded with the specified value
    pub fn completed(value: T) -> Promise<T> {
        let promise = Promise::new();
        promise.complete(value);
        promise
    }

    /// Creates a promise that has already failed with the specified error
    pub fn failed(err: PromiseError) -> Promise<T> {
        let promise = Promise::new();
        promise.fail(err);
        promise
    }

    /// Schedules the producer on the executor, and returns a pending promise for its outcome.
    /// - if the producer returns an error, the promise fails with `PromiseError::Producer`
    /// - if the producer panics, the promise fails with a `ProducerPanic` producer error
    /// - if the executor has been shut down, the returned promise has already failed with
    ///   `PromiseError::ExecutorClosed`
    pub fn submit<F>(executor: &Executor, producer: F) -> Promise<T>
    where
        F: FnOnce() -> Result<T, failure::Error> + Send + 'static,
    {
        let promise = Promise::new();
        let completer = promise.clone();
        if let Err(err) = executor.spawn(move || {
            completer.settle(guarded(producer));
        }) {
            promise.fail(err.into());
        }
        promise
    }

    /// Schedules a producer that cannot fail on the executor. Panics still fail the promise.
    pub fn supply_async<F>(executor: &Executor, supplier: F) -> Promise<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Promise::submit(executor, move || Ok(supplier()))
    }

    /// Settles the promise with the value.
    /// - returns true if this call settled the promise
    /// - if the promise has already settled, then this is a no-op and false is returned
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles the promise with the error.
    /// - returns true if this call settled the promise
    /// - if the promise has already settled, then this is a no-op and false is returned
    pub fn fail(&self, err: PromiseError) -> bool {
        self.settle(Err(err))
    }

    /// Settles the promise, and then invokes the continuations in registration order.
    /// - returns false if the promise was already settled, i.e., the first settlement wins
    /// - when called from within a continuation, the continuations are queued and run after the
    ///   calling continuation returns
    pub(crate) fn settle(&self, outcome: Result<T, PromiseError>) -> bool {
        let continuations = {
            let mut state = self.inner.state.lock();
            let continuations = match &mut *state {
                State::Pending(continuations) => mem::take(continuations),
                State::Settled(_) => return false,
            };
            *state = State::Settled(outcome.clone());
            continuations
        };
        self.inner.settled.notify_all();

        if let Err(err) = &outcome {
            trace!("promise failed: {}", err);
        }
        if !continuations.is_empty() {
            run_continuations(continuations.into_iter().map(|continuation| {
                let outcome = outcome.clone();
                Box::new(move || continuation(outcome)) as QueuedContinuation
            }));
        }
        true
    }

    /// Registers the continuation.
    /// - if the promise is pending, then the continuation is invoked by the thread that settles it
    /// - if the promise has already settled, then the continuation is invoked immediately on the
    ///   current thread
    pub(crate) fn on_settle<F>(&self, continuation: F)
    where
        F: FnOnce(Result<T, PromiseError>) + Send + 'static,
    {
        let outcome = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending(continuations) => {
                    continuations.push(Box::new(continuation));
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        continuation(outcome);
    }

    /// Blocks the current thread until the promise settles.
    /// - returns the value if the promise succeeded
    /// - returns the error if the promise failed
    pub fn join(&self) -> Result<T, PromiseError> {
        self.run_queued_continuations();
        let mut state = self.inner.state.lock();
        loop {
            if let State::Settled(outcome) = &*state {
                return outcome.clone();
            }
            self.inner.settled.wait(&mut state);
        }
    }

    /// Blocks the current thread until the promise settles, or the timeout expires.
    /// - returns None if the promise did not settle in time
    pub fn join_timeout(&self, timeout: Duration) -> Option<Result<T, PromiseError>> {
        let deadline = Instant::now() + timeout;
        self.run_queued_continuations();
        let mut state = self.inner.state.lock();
        loop {
            if let State::Settled(outcome) = &*state {
                return Some(outcome.clone());
            }
            if self.inner.settled.wait_until(&mut state, deadline).timed_out() {
                return match &*state {
                    State::Settled(outcome) => Some(outcome.clone()),
                    State::Pending(_) => None,
                };
            }
        }
    }

    /// The continuation that settles this promise may be queued on the current thread, in which
    /// case blocking before running it would never return.
    fn run_queued_continuations(&self) {
        while !self.is_done() && run_queued_continuation() {}
    }

    /// Returns the outcome without blocking, or None if the promise is still pending
    pub fn outcome(&self) -> Option<Result<T, PromiseError>> {
        match &*self.inner.state.lock() {
            State::Settled(outcome) => Some(outcome.clone()),
            State::Pending(_) => None,
        }
    }

    /// Returns the promise's current state
    pub fn state(&self) -> PromiseState {
        match &*self.inner.state.lock() {
            State::Pending(_) => PromiseState::Pending,
            State::Settled(Ok(_)) => PromiseState::Succeeded,
            State::Settled(Err(_)) => PromiseState::Failed,
        }
    }

    /// Returns true if the promise has settled
    pub fn is_done(&self) -> bool {
        self.state() != PromiseState::Pending
    }

    /// Returns true if the promise has failed
    pub fn is_failed(&self) -> bool {
        self.state() == PromiseState::Failed
    }
}

impl Promise<()> {
    /// Schedules a fire-and-forget action on the executor. The returned promise settles once the
    /// action has run.
    pub fn run_async<F>(executor: &Executor, action: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        Promise::submit(executor, move || {
            action();
            Ok(())
        })
    }
}

/// Runs the continuations on the current thread.
/// - if the thread is already running continuations, they are appended to its queue
/// - otherwise, the queue is drained before returning
fn run_continuations<I>(continuations: I)
where
    I: Iterator<Item = QueuedContinuation>,
{
    let draining = QUEUED_CONTINUATIONS.with(|queue| {
        let mut queue = queue.borrow_mut();
        if let Some(queued) = queue.as_mut() {
            queued.extend(continuations);
            return true;
        }
        *queue = Some(continuations.collect());
        false
    });
    if draining {
        return;
    }

    let _drained = QueueDrained;
    while run_queued_continuation() {}
}

/// Runs the next continuation queued on the current thread.
/// - returns false if there is none
fn run_queued_continuation() -> bool {
    let continuation =
        QUEUED_CONTINUATIONS.with(|queue| queue.borrow_mut().as_mut().and_then(VecDeque::pop_front));
    match continuation {
        Some(continuation) => {
            continuation();
            true
        }
        None => false,
    }
}

/// Clears the queue once the outermost settlement is done with it, even if a continuation panicked
struct QueueDrained;

impl Drop for QueueDrained {
    fn drop(&mut self) {
        QUEUED_CONTINUATIONS.with(|queue| queue.borrow_mut().take());
    }
}

/// Runs the producer, converting errors and panics into a failed outcome
pub(crate) fn guarded<T, F>(producer: F) -> Result<T, PromiseError>
where
    F: FnOnce() -> Result<T, failure::Error>,
{
    match catch_unwind(AssertUnwindSafe(producer)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(PromiseError::producer(err)),
        Err(panic) => Err(PromiseError::panicked(panic)),
    }
}
