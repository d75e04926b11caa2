//! A [`hyper::body::Body`] wrapper that taps data frames as they are polled.

use bodytap_core::{BodyInfo, Exchange, Tap};
use bytes::Bytes;
use hyper::body::{Body, Frame, SizeHint};
use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pin_project_lite::pin_project! {
    /// Forwards every frame of `inner` unchanged and copies data frames
    /// into a [`Tap`].
    ///
    /// The capture completes when the inner body reports its end, when it
    /// errors, or when the wrapper is dropped. An error also fails the
    /// exchange, unless a response was already recorded.
    pub struct TapBody<B> {
        #[pin]
        inner: B,
        tap: Tap,
        exchange: Option<Exchange>,
    }
}

impl<B> TapBody<B> {
    /// Wrap `inner`, capturing into `tap`.
    pub fn new(inner: B, tap: Tap) -> Self {
        Self {
            inner,
            tap,
            exchange: None,
        }
    }

    /// Forward `inner` without capturing.
    pub fn passthrough(inner: B) -> Self {
        Self::new(inner, Tap::disabled())
    }

    /// Whether frames are still being captured.
    pub fn is_capturing(&self) -> bool {
        self.tap.is_capturing()
    }

    pub fn get_ref(&self) -> &B {
        &self.inner
    }

    /// Consume the wrapper, completing the capture.
    pub fn into_inner(self) -> B {
        let Self {
            inner, mut tap, ..
        } = self;
        tap.complete();
        inner
    }
}

impl<B: Body> TapBody<B> {
    /// Tap an outgoing request body.
    ///
    /// A body that is already at its end publishes the request milestone
    /// immediately.
    pub fn request(exchange: &Exchange, inner: B, info: BodyInfo) -> Self {
        if inner.is_end_stream() {
            exchange.request_sent();
            return Self::passthrough(inner);
        }
        Self {
            tap: exchange.request_tap(info),
            inner,
            exchange: Some(exchange.clone()),
        }
    }

    /// Tap an inbound response body.
    ///
    /// Call after [`Exchange::response_received`].
    pub fn response(exchange: &Exchange, inner: B, info: BodyInfo) -> Self {
        if inner.is_end_stream() {
            exchange.response_complete();
            return Self::passthrough(inner);
        }
        Self {
            tap: exchange.response_tap(info),
            inner,
            exchange: Some(exchange.clone()),
        }
    }
}

impl<B> Body for TapBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let polled = ready!(this.inner.poll_frame(cx));

        match &polled {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.tap.capture_bytes(data);
                }
            }
            Some(Err(err)) => {
                tracing::debug!(error = %err, "body stream failed");
                if let Some(exchange) = this.exchange.take() {
                    exchange.fail(err);
                }
                this.tap.complete();
            }
            None => this.tap.complete(),
        }

        Poll::Ready(polled)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> fmt::Debug for TapBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapBody")
            .field("tap", &self.tap)
            .finish_non_exhaustive()
    }
}
