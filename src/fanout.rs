//! Order-preserving concurrent fan-out.
//!
//! Every input gets its own future; results come back in input order no matter
//! which future completes first. An optional bound limits how many are in flight.

use std::future::Future;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// One failure fails the whole batch. Remaining requests are dropped.
    #[default]
    #[serde(alias = "abort")]
    AbortOnFirst,
    /// Keep every success and report failures per position.
    #[serde(alias = "collect")]
    CollectPartial,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FanOut {
    /// `None` puts every request in flight at once.
    pub max_concurrency: Option<usize>,
    pub failure_policy: FailurePolicy,
}

impl FanOut {
    fn limit(&self) -> usize {
        self.max_concurrency.unwrap_or(usize::MAX).max(1)
    }

    /// Run `f` for every input and keep each outcome at its input position.
    pub async fn all<I, F, Fut, T, E>(&self, inputs: I, f: F) -> Vec<Result<T, E>>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        stream::iter(inputs)
            .map(f)
            .buffered(self.limit())
            .collect()
            .await
    }

    /// Run `f` for every input, stopping at the first error.
    pub async fn try_all<I, F, Fut, T, E>(&self, inputs: I, f: F) -> Result<Vec<T>, E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        stream::iter(inputs)
            .map(f)
            .buffered(self.limit())
            .try_collect()
            .await
    }
}
