//! Metered streaming responses.
//!
//! [`MeteredStream`] forwards upstream chunks untouched and runs its
//! finalizer exactly once: when the upstream is exhausted, when it yields an
//! error, or when the consumer drops the stream early.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;
use tracing::{debug, warn};

use super::pipeline::record_request;
use crate::Result;
use crate::energy::EnergyLedger;
use crate::types::ByteStream;

/// Accounting to perform once a stream ends.
pub(crate) struct StreamFinalizer {
    pub ledger: Arc<EnergyLedger>,
    pub provider: String,
    pub energy_joules: f64,
    pub prompt_tokens: u32,
    pub telemetry_enabled: bool,
}

impl StreamFinalizer {
    fn run(self) {
        if self.telemetry_enabled {
            record_request(&self.provider, "miss", "200", self.energy_joules, 0.0);
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    provider = %self.provider,
                    energy_joules = self.energy_joules,
                    "no async runtime available, streaming energy record lost"
                );
                return;
            }
        };
        handle.spawn(async move {
            match self
                .ledger
                .record(self.energy_joules, 0.0, self.prompt_tokens, 0)
                .await
            {
                Ok(()) => debug!(provider = %self.provider, "streaming request recorded"),
                Err(e) => warn!(provider = %self.provider, error = %e, "failed to record streaming request"),
            }
        });
    }
}

pin_project! {
    /// Upstream chunk stream with guaranteed ledger accounting.
    pub struct MeteredStream {
        #[pin]
        inner: ByteStream,
        finalizer: Option<StreamFinalizer>,
        done: bool,
    }

    impl PinnedDrop for MeteredStream {
        fn drop(this: Pin<&mut Self>) {
            if let Some(finalizer) = this.project().finalizer.take() {
                finalizer.run();
            }
        }
    }
}

impl MeteredStream {
    pub(crate) fn new(inner: ByteStream, finalizer: StreamFinalizer) -> Self {
        Self {
            inner,
            finalizer: Some(finalizer),
            done: false,
        }
    }
}

impl Stream for MeteredStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        let item = std::task::ready!(this.inner.poll_next(cx));
        match &item {
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "upstream stream failed");
                *this.done = true;
                if let Some(finalizer) = this.finalizer.take() {
                    finalizer.run();
                }
            }
            None => {
                *this.done = true;
                if let Some(finalizer) = this.finalizer.take() {
                    finalizer.run();
                }
            }
        }
        Poll::Ready(item)
    }
}

impl std::fmt::Debug for MeteredStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteredStream")
            .field("done", &self.done)
            .field("finalized", &self.finalizer.is_none())
            .finish()
    }
}
