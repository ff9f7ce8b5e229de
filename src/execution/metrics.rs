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

//! execution related metrics
//! - metrics are registered with the prometheus default registry
//! - all metrics are labeled by executor id, see [EXECUTOR_ID_LABEL](constant.EXECUTOR_ID_LABEL.html)
//! - an executor's series are removed once it is shut down, or once its last handle is dropped

use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounterVec, IntGaugeVec, Opts};

lazy_static! {
    /// Metric: Number of tasks that the Executor has spawned
    pub(super) static ref TASK_SPAWNED_COUNTER: IntCounterVec = register_int_counter_vec(
        TASK_SPAWNED_COUNTER_METRIC,
        "Number of tasks that the Executor has spawned"
    );

    /// Metric: Number of tasks that the Executor has run to completion, including tasks that panicked
    pub(super) static ref TASK_COMPLETED_COUNTER: IntCounterVec = register_int_counter_vec(
        TASK_COMPLETED_COUNTER_METRIC,
        "Number of tasks that the Executor has completed"
    );

    /// Metric: Number of spawned tasks that panicked
    pub(super) static ref TASK_PANIC_COUNTER: IntCounterVec = register_int_counter_vec(
        TASK_PANIC_COUNTER_METRIC,
        "Number of spawned tasks that panicked"
    );

    /// Metric: Executor thread pool sizes
    pub(super) static ref THREAD_POOL_SIZE_GAUGE: IntGaugeVec = {
        let gauge = IntGaugeVec::new(
            Opts::new(THREAD_POOL_SIZE_GAUGE_METRIC, "Executor thread pool size"),
            &[EXECUTOR_ID_LABEL],
        )
        .expect("invalid thread pool size gauge");
        prometheus::register(Box::new(gauge.clone()))
            .expect("thread pool size gauge could not be registered");
        gauge
    };
}

/// Metric name for the spawned task counter
pub const TASK_SPAWNED_COUNTER_METRIC: &str = "oysterpack_promise_executor_task_spawned_total";
/// Metric name for the completed task counter
pub const TASK_COMPLETED_COUNTER_METRIC: &str = "oysterpack_promise_executor_task_completed_total";
/// Metric name for the task panic counter
pub const TASK_PANIC_COUNTER_METRIC: &str = "oysterpack_promise_executor_task_panic_total";
/// Metric name for the thread pool size gauge
pub const THREAD_POOL_SIZE_GAUGE_METRIC: &str = "oysterpack_promise_executor_thread_pool_size";
/// The ExecutorId will be used as the label value
pub const EXECUTOR_ID_LABEL: &str = "executor_id";

fn register_int_counter_vec(name: &str, help: &str) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), &[EXECUTOR_ID_LABEL])
        .expect("invalid executor counter");
    prometheus::register(Box::new(counter.clone()))
        .expect("executor counter could not be registered");
    counter
}

/// Removes the executor's labelled series from the executor metrics.
/// - the executor keeps counting through the metric handles it holds, but they are no longer gathered
pub(super) fn remove_executor_metrics(executor_id: &str) {
    let label_values = [executor_id];
    // missing series have already been removed
    let _ = TASK_SPAWNED_COUNTER.remove_label_values(&label_values);
    let _ = TASK_COMPLETED_COUNTER.remove_label_values(&label_values);
    let _ = TASK_PANIC_COUNTER.remove_label_values(&label_values);
    let _ = THREAD_POOL_SIZE_GAUGE.remove_label_values(&label_values);
}

/// Gathers Executor related metrics
pub fn gather_metrics() -> Vec<prometheus::proto::MetricFamily> {
    let mut mfs = Vec::with_capacity(4);
    mfs.extend(TASK_SPAWNED_COUNTER.collect());
    mfs.extend(TASK_COMPLETED_COUNTER.collect());
    mfs.extend(TASK_PANIC_COUNTER.collect());
    mfs.extend(THREAD_POOL_SIZE_GAUGE.collect());
    mfs
}

/// Returns Executor related metric descriptors
pub fn metric_descs() -> Vec<&'static prometheus::core::Desc> {
    let mut descs = Vec::with_capacity(4);
    descs.extend(TASK_SPAWNED_COUNTER.desc());
    descs.extend(TASK_COMPLETED_COUNTER.desc());
    descs.extend(TASK_PANIC_COUNTER.desc());
    descs.extend(THREAD_POOL_SIZE_GAUGE.desc());
    descs
}
