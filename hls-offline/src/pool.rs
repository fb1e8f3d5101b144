//! Bounded-concurrency task pool
//!
//! A pending queue feeds an in-flight set; a freed slot is refilled
//! immediately. The first failure aborts the whole batch and drops the
//! remaining in-flight futures.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::future::Future;

/// Segment downloads in flight at once
pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct BoundedPool {
    limit: usize,
}

impl Default for BoundedPool {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl BoundedPool {
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `start(item)` for every item with at most `limit` futures in
    /// flight
    ///
    /// `on_settled` sees each result as it completes. Results come back in
    /// completion order.
    pub async fn run<I, F, Fut, T, E, P>(&self, items: I, mut start: F, mut on_settled: P) -> Result<Vec<T>, E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&T),
    {
        let mut pending: VecDeque<I::Item> = items.into_iter().collect();
        let mut in_flight = FuturesUnordered::new();
        let mut results = Vec::with_capacity(pending.len());

        loop {
            while in_flight.len() < self.limit {
                match pending.pop_front() {
                    Some(item) => in_flight.push(start(item)),
                    None => break,
                }
            }

            match in_flight.next().await {
                Some(Ok(value)) => {
                    on_settled(&value);
                    results.push(value);
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        Ok(results)
    }
}
