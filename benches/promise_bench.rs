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

//! promise bench tests

#[macro_use]
extern crate criterion;

use criterion::Criterion;

use oysterpack_promise::*;
use std::num::NonZeroUsize;

criterion_group!(
    benches,
    executor_spawn_bench,
    promise_submit_join_bench,
    promise_chain_bench,
    settled_promise_map_bench,
    race_all_bench
);

criterion_main!(benches);

fn executor_spawn_bench(c: &mut Criterion) {
    let executor = global_executor();
    c.bench_function("executor_spawn_bench", move |b| {
        b.iter(|| executor.spawn(|| {}).unwrap());
    });
}

fn promise_submit_join_bench(c: &mut Criterion) {
    let executor = global_executor();
    c.bench_function("promise_submit_join_bench", move |b| {
        b.iter(|| Promise::supply_async(&executor, || 1).join().unwrap());
    });
}

/// ## Summary
/// - inline stages run on the producer's worker thread, while async stages each pay for a spawn
fn promise_chain_bench(c: &mut Criterion) {
    let executor = bounded_executor(NonZeroUsize::new(4).unwrap()).unwrap();

    let inline_executor = executor.clone();
    c.bench_function("promise_chain_inline_bench", move |b| {
        b.iter(|| {
            Promise::supply_async(&inline_executor, || 1)
                .map(|i| i + 1)
                .try_map(|i| -> Result<i32, failure::Error> { Ok(i * 2) })
                .recover(|_| 0)
                .join()
                .unwrap()
        });
    });

    let async_executor = executor.clone();
    c.bench_function("promise_chain_async_bench", move |b| {
        b.iter(|| {
            Promise::supply_async(&async_executor, || 1)
                .map_async(&async_executor, |i| i + 1)
                .try_map_async(&async_executor, |i| -> Result<i32, failure::Error> { Ok(i * 2) })
                .recover_async(&async_executor, |_| 0)
                .join()
                .unwrap()
        });
    });
}

fn settled_promise_map_bench(c: &mut Criterion) {
    let promise = Promise::completed(1);
    c.bench_function("settled_promise_map_bench", move |b| {
        b.iter(|| promise.map(|i| i + 1).join().unwrap());
    });
}

fn race_all_bench(c: &mut Criterion) {
    c.bench_function("race_all_bench", move |b| {
        b.iter(|| {
            let promises: Vec<Promise<usize>> = (0..10).map(|_| Promise::new()).collect();
            let winner = race_all(promises.clone());
            for (i, promise) in promises.iter().enumerate().rev() {
                promise.complete(i);
            }
            winner.join().unwrap()
        });
    });
}
