//! Batch extraction: many images, one independent pipeline run each.
//!
//! Images share nothing but the [`Extractor`] (which is stateless), so they
//! can run side by side. [`Extractor::extract_stream`] yields results in
//! completion order with at most `config.concurrency` images in flight;
//! [`Extractor::extract_batch`] waits for all of them and returns input
//! order. A failing image never aborts the others.

use crate::extract::Extractor;
use crate::output::BatchItem;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-image results.
pub type BatchStream = Pin<Box<dyn Stream<Item = BatchItem> + Send>>;

impl Extractor {
    /// Extract many images, streaming results as each one finishes.
    ///
    /// Items arrive in completion order; use [`BatchItem::index`] to map
    /// them back to the input list. Batch start/complete callbacks are only
    /// fired by [`Extractor::extract_batch`].
    pub fn extract_stream<I, S>(&self, inputs: I) -> BatchStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
        let concurrency = self.config().concurrency.max(1);
        let this = self.clone();
        info!(
            "Starting batch of {} images ({} at a time)",
            inputs.len(),
            concurrency
        );

        stream::iter(inputs.into_iter().enumerate())
            .map(move |(index, input)| {
                let extractor = this.clone();
                async move {
                    let result = extractor.extract(&input).await;
                    BatchItem {
                        index,
                        input,
                        result,
                    }
                }
            })
            .buffer_unordered(concurrency)
            .boxed()
    }

    /// Extract many images and return every result in input order.
    pub async fn extract_batch<I, S>(&self, inputs: I) -> Vec<BatchItem>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
        let total = inputs.len();
        let cb = self.config().progress_callback.clone();

        if let Some(ref cb) = cb {
            cb.on_batch_start(total);
        }

        let mut items: Vec<BatchItem> = self.extract_stream(inputs).collect().await;
        items.sort_by_key(|item| item.index);

        let ok = items.iter().filter(|item| item.is_ok()).count();
        info!("Batch complete: {}/{} images extracted", ok, total);
        if let Some(ref cb) = cb {
            cb.on_batch_complete(total, ok);
        }
        items
    }
}
