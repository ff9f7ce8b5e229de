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

//! Executors run promise producers and continuations on thread pools.
//! - the [global executor](fn.global_executor.html) is shared process wide. It is created lazily on
//!   first use and lives for the life of the app.
//! - [bounded executors](fn.bounded_executor.html) are owned by the caller, who is responsible for
//!   shutting them down
//! - executors can be registered in the global registry and looked up by [ExecutorId](struct.ExecutorId.html)

use crate::errors::panic_message;
use failure::Fail;
use futures::executor::{ThreadPool, ThreadPoolBuilder};
use lazy_static::lazy_static;
use oysterpack_log::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    fmt, io,
    num::NonZeroUsize,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

pub mod metrics;

lazy_static! {
    /// Global Executor registry
    static ref EXECUTORS: RwLock<ExecutorRegistry> = RwLock::new(ExecutorRegistry::default());
}

/// An executor can only be registered once, and once it is registered, it stays registered for the
/// life of the app.
/// - returns an error if an executor with the same ID is already registered
pub fn register(builder: &ExecutorBuilder) -> Result<Executor, ExecutorRegistryError> {
    EXECUTORS.write().register(builder)
}

/// Returns the registered executor IDs
pub fn executor_ids() -> smallvec::SmallVec<[ExecutorId; 16]> {
    EXECUTORS.read().executor_ids()
}

/// returns the Executor for the specified ID
pub fn executor(id: ExecutorId) -> Option<Executor> {
    if id == Executor::GLOBAL_EXECUTOR_ID {
        return Some(global_executor());
    }
    EXECUTORS.read().executor(id)
}

/// Returns the global executor, which is provided by default.
/// - the global executor is created on first use. Unless configured otherwise via
///   [configure_global_executor](fn.configure_global_executor.html), its thread pool size is the
///   number of CPUs.
///
/// ## Panics
/// If the global executor's thread pool cannot be created.
pub fn global_executor() -> Executor {
    if let Some(executor) = EXECUTORS.read().global_executor.as_ref() {
        return executor.clone();
    }
    EXECUTORS
        .write()
        .global_executor()
        .expect("failed to create the global executor")
}

/// Configures the global executor. This must be called before the global executor is first used.
pub fn configure_global_executor(builder: ExecutorBuilder) -> Result<(), ExecutorRegistryError> {
    let mut executors = EXECUTORS.write();
    if executors.global_executor.is_some() {
        return Err(ExecutorRegistryError::GlobalExecutorAlreadyInitialized);
    }
    executors.global_executor_builder = ExecutorBuilder {
        id: Executor::GLOBAL_EXECUTOR_ID,
        ..builder
    };
    Ok(())
}

/// Creates a new Executor backed by a pool of `pool_size` worker threads.
/// - the Executor is not registered. The caller owns it and is responsible for shutting it down.
pub fn bounded_executor(pool_size: NonZeroUsize) -> Result<Executor, ExecutorError> {
    ExecutorBuilder::new(ExecutorId::generate())
        .set_pool_size(pool_size)
        .build()
}

/// Executor registry
pub struct ExecutorRegistry {
    global_executor_builder: ExecutorBuilder,
    global_executor: Option<Executor>,
    thread_pools: fnv::FnvHashMap<ExecutorId, Executor>,
}

impl ExecutorRegistry {
    /// An executor can only be registered once, and once it is registered, it stays registered for the
    /// life of the app.
    /// - returns an error if an executor with the same ID is already registered
    pub fn register(&mut self, builder: &ExecutorBuilder) -> Result<Executor, ExecutorRegistryError> {
        let id = builder.executor_id();
        if id == Executor::GLOBAL_EXECUTOR_ID || self.thread_pools.contains_key(&id) {
            return Err(ExecutorRegistryError::ExecutorAlreadyRegistered(id));
        }
        let executor = builder.build()?;
        self.thread_pools.insert(id, executor.clone());
        info!("registered {:?}", executor);
        Ok(executor)
    }

    /// Returns the registered executor IDs
    /// - the global executor is not included
    pub fn executor_ids(&self) -> smallvec::SmallVec<[ExecutorId; 16]> {
        self.thread_pools.keys().cloned().collect()
    }

    /// returns the registered Executor for the specified ID
    pub fn executor(&self, id: ExecutorId) -> Option<Executor> {
        self.thread_pools.get(&id).cloned()
    }

    /// Returns the global executor, creating it if needed.
    pub fn global_executor(&mut self) -> Result<Executor, ExecutorError> {
        if let Some(executor) = self.global_executor.as_ref() {
            return Ok(executor.clone());
        }
        let executor = Executor::new(&self.global_executor_builder, true)?;
        self.global_executor = Some(executor.clone());
        Ok(executor)
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self {
            global_executor_builder: ExecutorBuilder::new(Executor::GLOBAL_EXECUTOR_ID),
            global_executor: None,
            thread_pools: fnv::FnvHashMap::default(),
        }
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Executors(thread pool count = {}, global executor initialized = {})",
            self.thread_pools.len(),
            self.global_executor.is_some()
        )
    }
}

/// A thread pool based executor that runs promise producers and continuations.
/// - The thread pool multiplexes any number of tasks onto a fixed number of worker threads.
/// - This type is a clonable handle to the thread pool itself. Cloning it will only create a new
///   reference, not a new thread pool.
/// - is a thin wrapper around the futures [ThreadPool](https://docs.rs/futures/0.3/futures/executor/struct.ThreadPool.html)
/// - tasks that panic are caught and counted, i.e., a panicking task never takes down a worker thread
///
/// ## Shutdown
/// Once shut down, the Executor rejects new tasks with `ExecutorError::ExecutorClosed`. Tasks that
/// were spawned before the shutdown still run to completion. The thread pool is released once
/// all of its tasks have completed. The executor's metric series are removed on shutdown, or when
/// the last handle is dropped.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    id: ExecutorId,
    global: bool,
    pool_size: usize,
    thread_pool: RwLock<Option<ThreadPool>>,
    spawned_task_counter: prometheus::IntCounter,
    completed_task_counter: prometheus::IntCounter,
    panic_counter: prometheus::IntCounter,
    thread_pool_size_gauge: prometheus::IntGauge,
}

impl Drop for ExecutorInner {
    fn drop(&mut self) {
        if self.thread_pool.get_mut().is_some() {
            metrics::remove_executor_metrics(&self.id.to_string());
            debug!("Executor({}) has been dropped", self.id);
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Executor({})", self.inner.id)
    }
}

impl Executor {
    /// Global ExecutorId, i.e., for the global Executor
    pub const GLOBAL_EXECUTOR_ID: ExecutorId = ExecutorId(1873760146620367373290104413358512170);

    /// constructor
    fn new(builder: &ExecutorBuilder, global: bool) -> Result<Self, ExecutorError> {
        let id = builder.executor_id();
        let pool_size = builder.pool_size().unwrap_or_else(num_cpus::get);
        let thread_pool = builder
            .thread_pool_builder(pool_size)
            .create()
            .map_err(ExecutorError::ThreadPoolCreateFailed)?;
        let label = id.to_string();
        let thread_pool_size_gauge = metrics::THREAD_POOL_SIZE_GAUGE.with_label_values(&[&label]);
        thread_pool_size_gauge.set(pool_size as i64);
        info!("Executor({}) has been created with thread pool size = {}", id, pool_size);
        Ok(Self {
            inner: Arc::new(ExecutorInner {
                id,
                global,
                pool_size,
                thread_pool: RwLock::new(Some(thread_pool)),
                spawned_task_counter: metrics::TASK_SPAWNED_COUNTER.with_label_values(&[&label]),
                completed_task_counter: metrics::TASK_COMPLETED_COUNTER.with_label_values(&[&label]),
                panic_counter: metrics::TASK_PANIC_COUNTER.with_label_values(&[&label]),
                thread_pool_size_gauge,
            }),
        })
    }

    /// Returns the ExecutorId
    pub fn id(&self) -> ExecutorId {
        self.inner.id
    }

    /// Returns the number of worker threads
    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Returns true if this is the global Executor
    pub fn is_global(&self) -> bool {
        self.inner.global
    }

    /// Spawns the job onto a worker thread.
    /// - if the job panics, the panic is caught, logged and counted
    ///
    /// ## Errors
    /// `ExecutorError::ExecutorClosed` if the Executor has been shut down
    pub fn spawn<F>(&self, job: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let thread_pool = self.inner.thread_pool.read();
        let thread_pool = thread_pool
            .as_ref()
            .ok_or(ExecutorError::ExecutorClosed(self.inner.id))?;
        let id = self.inner.id;
        let completed_task_counter = self.inner.completed_task_counter.clone();
        let panic_counter = self.inner.panic_counter.clone();
        thread_pool.spawn_ok(async move {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                panic_counter.inc();
                error!("Executor({}) task panicked: {}", id, panic_message(&*panic));
            }
            completed_task_counter.inc();
        });
        self.inner.spawned_task_counter.inc();
        Ok(())
    }

    /// Shuts down the Executor: new tasks are rejected, while tasks that have already been spawned
    /// run to completion.
    /// - shutting down an Executor more than once has no effect
    ///
    /// ## Errors
    /// `ExecutorError::GlobalExecutorShutdownRefused` - the global executor lives for the life of
    /// the app
    pub fn shutdown(&self) -> Result<(), ExecutorError> {
        if self.inner.global {
            warn!("the global executor cannot be shut down");
            return Err(ExecutorError::GlobalExecutorShutdownRefused);
        }
        if self.inner.thread_pool.write().take().is_some() {
            self.inner.thread_pool_size_gauge.set(0);
            metrics::remove_executor_metrics(&self.inner.id.to_string());
            info!("Executor({}) has been shut down", self.inner.id);
        }
        Ok(())
    }

    /// Returns true if the Executor has been shut down
    pub fn is_shutdown(&self) -> bool {
        self.inner.thread_pool.read().is_none()
    }

    /// returns the number of tasks that have been spawned by this Executor
    pub fn spawned_task_count(&self) -> u64 {
        self.inner.spawned_task_counter.get()
    }

    /// returns the number of spawned tasks that have run to completion, including tasks that panicked
    pub fn completed_task_count(&self) -> u64 {
        self.inner.completed_task_counter.get()
    }

    /// returns the number of spawned tasks that panicked
    pub fn task_panic_count(&self) -> u64 {
        self.inner.panic_counter.get()
    }
}

/// Unique Executor ID
/// - ULID based, which is how the id is displayed
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ExecutorId(pub u128);

impl ExecutorId {
    /// generates a new unique ExecutorId
    pub fn generate() -> ExecutorId {
        ExecutorId(rusty_ulid::Ulid::generate().into())
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", rusty_ulid::Ulid::from(self.0))
    }
}

/// Executor registry related errors
#[derive(Fail, Debug)]
pub enum ExecutorRegistryError {
    /// When trying to register an Executor using an ID that is already registered.
    #[fail(display = "Executor is already registered: {}", _0)]
    ExecutorAlreadyRegistered(ExecutorId),
    /// The global executor can only be configured before it is first used.
    #[fail(display = "The global executor has already been initialized")]
    GlobalExecutorAlreadyInitialized,
    /// The Executor could not be created
    #[fail(display = "{}", _0)]
    Executor(#[fail(cause)] ExecutorError),
}

impl From<ExecutorError> for ExecutorRegistryError {
    fn from(err: ExecutorError) -> Self {
        ExecutorRegistryError::Executor(err)
    }
}

/// Executor related errors
#[derive(Fail, Debug)]
pub enum ExecutorError {
    /// When a ThreadPool creation failure occurs.
    #[fail(display = "Failed to create ThreadPool: {}", _0)]
    ThreadPoolCreateFailed(#[fail(cause)] io::Error),
    /// Spawning failed because the Executor has been shut down
    #[fail(display = "Executor has been shut down: {}", _0)]
    ExecutorClosed(ExecutorId),
    /// The global executor lives for the life of the app
    #[fail(display = "The global executor cannot be shut down")]
    GlobalExecutorShutdownRefused,
}

/// Executor config
/// - worker threads are named `{ExecutorId}-{thread index}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorBuilder {
    id: ExecutorId,
    #[serde(default)]
    stack_size: Option<NonZeroUsize>,
    #[serde(default)]
    pool_size: Option<NonZeroUsize>,
}

impl ExecutorBuilder {
    /// constructor
    pub fn new(id: ExecutorId) -> Self {
        Self {
            id,
            stack_size: None,
            pool_size: None,
        }
    }

    /// Sets the thread stack size
    pub fn set_stack_size(self, size: NonZeroUsize) -> Self {
        let mut this = self;
        this.stack_size = Some(size);
        this
    }

    /// Sets the thread pool size
    pub fn set_pool_size(self, size: NonZeroUsize) -> Self {
        let mut this = self;
        this.pool_size = Some(size);
        this
    }

    /// Returns the ExecutorId
    pub fn executor_id(&self) -> ExecutorId {
        self.id
    }

    /// Returns the thread stack size
    pub fn stack_size(&self) -> Option<usize> {
        self.stack_size.map(NonZeroUsize::get)
    }

    /// Returns the thread pool size
    /// - if not set, then the thread pool size will match the number of CPUs
    pub fn pool_size(&self) -> Option<usize> {
        self.pool_size.map(NonZeroUsize::get)
    }

    fn thread_pool_builder(&self, pool_size: usize) -> ThreadPoolBuilder {
        let mut builder = ThreadPool::builder();
        let id = self.id;
        builder
            .name_prefix(format!("{}-", id))
            .pool_size(pool_size)
            .after_start(move |thread_index| {
                debug!("Executor thread has started: {}-{}", id, thread_index)
            })
            .before_stop(move |thread_index| {
                debug!("Executor thread is stopping: {}-{}", id, thread_index)
            });
        if let Some(size) = self.stack_size {
            builder.stack_size(size.get());
        }
        builder
    }

    /// Builds a new unregistered Executor. The caller owns the Executor.
    pub fn build(&self) -> Result<Executor, ExecutorError> {
        Executor::new(self, false)
    }

    /// Tries to build and register the Executor with the global ExecutorRegistry
    pub fn register(&self) -> Result<Executor, ExecutorRegistryError> {
        register(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure_logging;
    use pretty_assertions::assert_eq;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc,
        },
        thread,
        time::Duration,
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn global_executor() {
        configure_logging();

        let executor = super::global_executor();
        assert_eq!(executor.id(), Executor::GLOBAL_EXECUTOR_ID);
        assert!(executor.is_global());
        assert!(executor.pool_size() > 0);
        assert_eq!(
            super::executor(Executor::GLOBAL_EXECUTOR_ID).unwrap().id(),
            Executor::GLOBAL_EXECUTOR_ID
        );
        // the global executor is created once
        assert!(Arc::ptr_eq(&executor.inner, &super::global_executor().inner));

        let (tx, rx) = mpsc::channel();
        executor
            .spawn(move || {
                info!("global_executor(): task #1");
                tx.send(thread::current().name().map(str::to_string)).unwrap();
            })
            .unwrap();
        let thread_name = rx.recv_timeout(TIMEOUT).unwrap().unwrap();
        assert!(thread_name.starts_with(&Executor::GLOBAL_EXECUTOR_ID.to_string()));

        match executor.shutdown() {
            Err(ExecutorError::GlobalExecutorShutdownRefused) => info!("shutdown refused as expected"),
            other => panic!("unexpected shutdown result: {:?}", other),
        }
        assert!(!executor.is_shutdown());

        match configure_global_executor(ExecutorBuilder::new(ExecutorId::generate())) {
            Err(ExecutorRegistryError::GlobalExecutorAlreadyInitialized) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn bounded_executor_shutdown() {
        configure_logging();

        let executor = bounded_executor(NonZeroUsize::new(2).unwrap()).unwrap();
        assert_eq!(executor.pool_size(), 2);
        assert!(!executor.is_global());

        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        for _ in 0..4 {
            let counter = counter.clone();
            let tx = tx.clone();
            executor
                .spawn(move || {
                    thread::sleep(Duration::from_millis(20));
                    counter.fetch_add(1, Ordering::SeqCst);
                    tx.send(()).unwrap();
                })
                .unwrap();
        }
        executor.shutdown().unwrap();
        assert!(executor.is_shutdown());
        // shutting down again is a no-op
        executor.shutdown().unwrap();

        match executor.spawn(|| ()) {
            Err(ExecutorError::ExecutorClosed(id)) => assert_eq!(id, executor.id()),
            other => panic!("expected ExecutorClosed, but got: {:?}", other),
        }

        // tasks that were spawned before the shutdown run to completion
        for _ in 0..4 {
            rx.recv_timeout(TIMEOUT).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(executor.spawned_task_count(), 4);
    }

    // threads that panic in the pool are not lost, because panics are caught
    #[test]
    fn spawned_task_panics_all_threads() {
        configure_logging();

        let executor = bounded_executor(NonZeroUsize::new(2).unwrap()).unwrap();
        let panic_task_count = executor.pool_size() * 2;
        for i in 0..panic_task_count {
            executor.spawn(move || panic!("BOOM({})!", i)).unwrap();
        }
        let (tx, rx) = mpsc::channel();
        executor.spawn(move || tx.send(()).unwrap()).unwrap();
        rx.recv_timeout(TIMEOUT).unwrap();

        while executor.completed_task_count() < (panic_task_count + 1) as u64 {
            thread::yield_now();
        }
        assert_eq!(executor.task_panic_count(), panic_task_count as u64);
        executor.shutdown().unwrap();
    }

    #[test]
    fn registered_executors() {
        configure_logging();

        let ids: Vec<ExecutorId> = (0..4).map(|_| ExecutorId::generate()).collect();
        for id in ids.iter() {
            let executor = ExecutorBuilder::new(*id)
                .set_pool_size(NonZeroUsize::new(1).unwrap())
                .register()
                .unwrap();
            assert_eq!(executor.id(), *id);
        }
        let registered_ids = executor_ids();
        for id in ids.iter() {
            assert!(registered_ids.contains(id));
            assert_eq!(super::executor(*id).unwrap().id(), *id);
        }

        let builder = ExecutorBuilder::new(ids[0]);
        match builder.register().expect_err("expected ExecutorAlreadyRegistered") {
            ExecutorRegistryError::ExecutorAlreadyRegistered(id) => assert_eq!(id, ids[0]),
            err => panic!("expected ExecutorAlreadyRegistered, but error was : {:?}", err),
        }
        match ExecutorBuilder::new(Executor::GLOBAL_EXECUTOR_ID).register() {
            Err(ExecutorRegistryError::ExecutorAlreadyRegistered(id)) => {
                assert_eq!(id, Executor::GLOBAL_EXECUTOR_ID)
            }
            other => panic!("expected ExecutorAlreadyRegistered, but got : {:?}", other),
        }
        assert!(super::executor(ExecutorId::generate()).is_none());
    }

    #[test]
    fn executor_builder() {
        let id = ExecutorId::generate();
        let config = ExecutorBuilder::new(id);
        assert_eq!(config.executor_id(), id);
        assert!(config.stack_size().is_none());
        assert!(config.pool_size().is_none());
        let config = config.set_stack_size(NonZeroUsize::new(1024 * 1024).unwrap());
        assert_eq!(config.stack_size().unwrap(), 1024 * 1024);
        assert!(config.pool_size().is_none());
        let config = config.set_pool_size(NonZeroUsize::new(64).unwrap());
        assert_eq!(config.stack_size().unwrap(), 1024 * 1024);
        assert_eq!(config.pool_size().unwrap(), 64);
    }

    #[test]
    fn executor_builder_loaded_from_json() {
        let id = ExecutorId::generate();
        let json = format!(r#"{{"id":{},"pool_size":3}}"#, id.0);
        let config: ExecutorBuilder = serde_json::from_str(&json).unwrap();
        assert_eq!(config.executor_id(), id);
        assert_eq!(config.pool_size(), Some(3));
        assert!(config.stack_size().is_none());
    }

    #[test]
    fn executor_id_display_is_ulid() {
        let id = ExecutorId::generate();
        let ulid = id.to_string();
        assert_eq!(ulid.len(), 26);
        assert_eq!(ulid.parse::<rusty_ulid::Ulid>().map(u128::from).unwrap(), id.0);
        assert_ne!(ExecutorId::generate(), id);
    }
}
