//! Request body type for the HTTP transport.
//!
//! Every call streams its request body: the envelopes are produced while the
//! call is running, and the end of the stream is the caller's half-close.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame};
use pin_project_lite::pin_project;

use crate::ClientError;

type BoxFrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

pin_project! {
    /// A streaming request body.
    ///
    /// An `Err` item aborts the request stream.
    pub struct TransportBody {
        #[pin]
        stream: BoxFrameStream,
        done: bool,
    }
}

impl TransportBody {
    /// Create a body from a stream of already framed chunks.
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        TransportBody {
            stream: Box::pin(stream),
            done: false,
        }
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = ClientError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        match this.stream.poll_next(cx) {
            Poll::Ready(Some(Ok(data))) => Poll::Ready(Some(Ok(Frame::data(data)))),
            Poll::Ready(Some(Err(e))) => {
                *this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                *this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBody")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_streaming_body_yields_chunks_in_order() {
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"one")),
            Ok(Bytes::from_static(b"two")),
        ]);
        let body = TransportBody::streaming(chunks);

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"onetwo");
    }

    #[tokio::test]
    async fn test_streaming_body_error_ends_stream() {
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"one")),
            Err(ClientError::Transport("aborted".into())),
            Ok(Bytes::from_static(b"never")),
        ]);
        let mut body = TransportBody::streaming(chunks);

        assert!(body.frame().await.unwrap().is_ok());
        assert!(body.frame().await.unwrap().is_err());
        assert!(body.frame().await.is_none());
        assert!(body.is_end_stream());
    }
}
