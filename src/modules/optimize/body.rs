use crate::common::fs::TempArtifacts;
use bytes::Bytes;
use futures_util::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{info, warn, Instrument, Span};

/// Streams the encoded file to the client and releases the request's temp
/// files once: when the stream ends, fails, or is dropped by a disconnect.
pub struct ArtifactStream {
    inner: Option<ReaderStream<File>>,
    artifacts: Option<TempArtifacts>,
    span: Span,
}

impl ArtifactStream {
    pub fn new(file: File, artifacts: TempArtifacts, span: Span) -> Self {
        Self {
            inner: Some(ReaderStream::new(file)),
            artifacts: Some(artifacts),
            span,
        }
    }

    fn finish(&mut self, error: Option<&str>) {
        // Close the file before its path is unlinked.
        self.inner = None;
        let Some(artifacts) = self.artifacts.take() else {
            return;
        };

        {
            let _enter = self.span.enter();
            match error {
                None => info!("response download completed"),
                Some(e) => warn!(error = %e, "response download failed"),
            }
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(
                    async move {
                        artifacts.release().await;
                    }
                    .instrument(self.span.clone()),
                );
            }
            // Outside a runtime the guard's Drop removes the files synchronously.
            Err(_) => drop(artifacts),
        }
    }
}

impl Stream for ArtifactStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(inner).poll_next(cx) {
            Poll::Ready(None) => {
                this.finish(None);
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish(Some(&e.to_string()));
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        if self.artifacts.is_some() {
            self.finish(Some("client disconnected before the download finished"));
        }
    }
}
