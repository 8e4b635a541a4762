//! Tower middleware applying global interceptors to every call.
//!
//! The gRPC status of a successful call travels in the body trailers, so the
//! middleware wraps response bodies and watches frames for the status. Three
//! completion paths exist: a `grpc-status` response header (trailers-only
//! responses, typically immediate errors), a trailers frame in the body, or
//! the body being dropped before end of stream, which reports `CANCELLED`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use http::header::HeaderValue;
use http::{HeaderMap, Request, Response};
use http_body::{Body, Frame, SizeHint};
use tonic::body::BoxBody;
use tonic::Status;
use tower::{Layer, Service};

use crate::interceptors::{CallDetails, CallInterceptor, CallOutcome};

const GRPC_STATUS_HEADER: &str = "grpc-status";

/// Layer that installs [`ObservationStack`] around the routed services.
#[derive(Clone)]
pub(crate) struct ObservationLayer {
    interceptors: Arc<[Arc<dyn CallInterceptor>]>,
}

impl ObservationLayer {
    pub(crate) fn new(interceptors: Arc<[Arc<dyn CallInterceptor>]>) -> Self {
        Self { interceptors }
    }
}

impl<S> Layer<S> for ObservationLayer {
    type Service = ObservationStack<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObservationStack {
            inner,
            interceptors: self.interceptors.clone(),
        }
    }
}

/// Service wrapper that notifies interceptors around each call.
#[derive(Clone)]
pub(crate) struct ObservationStack<S> {
    inner: S,
    interceptors: Arc<[Arc<dyn CallInterceptor>]>,
}

impl<S> Service<Request<BoxBody>> for ObservationStack<S>
where
    S: Service<Request<BoxBody>, Response = Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response<ObservedBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<BoxBody>) -> Self::Future {
        // Take the service that was driven to readiness, leave the clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let interceptors = self.interceptors.clone();
        let details = CallDetails::from_path(request.uri().path());

        Box::pin(async move {
            if interceptors.is_empty() {
                let response = inner.call(request).await?;
                return Ok(response.map(ObservedBody::passthrough));
            }

            for interceptor in interceptors.iter() {
                interceptor.on_call(&details);
            }
            let mut watch = CallWatch::new(details, interceptors);

            let response = match inner.call(request).await {
                Ok(response) => response,
                Err(e) => {
                    watch.finish("UNKNOWN");
                    return Err(e);
                }
            };

            if let Some(code) = status_from_headers(response.headers()) {
                // Trailers-only response, the status is already decided.
                watch.finish(code);
                Ok(response.map(ObservedBody::passthrough))
            } else {
                Ok(response.map(move |body| ObservedBody::watched(body, watch)))
            }
        })
    }
}

/// Completion tracker for one call. Fires `on_complete` exactly once; if the
/// call is abandoned before a status is seen, drop reports `CANCELLED`.
struct CallWatch {
    details: CallDetails,
    interceptors: Arc<[Arc<dyn CallInterceptor>]>,
    started: Instant,
    finished: bool,
}

impl CallWatch {
    fn new(details: CallDetails, interceptors: Arc<[Arc<dyn CallInterceptor>]>) -> Self {
        Self {
            details,
            interceptors,
            started: Instant::now(),
            finished: false,
        }
    }

    fn finish(&mut self, code: &'static str) {
        if self.finished {
            return;
        }
        self.finished = true;
        let outcome = CallOutcome {
            code,
            elapsed: self.started.elapsed(),
        };
        for interceptor in self.interceptors.iter() {
            interceptor.on_complete(&self.details, &outcome);
        }
    }
}

impl Drop for CallWatch {
    fn drop(&mut self) {
        self.finish("CANCELLED");
    }
}

/// Response body wrapper that resolves the call outcome from frame traffic.
pub(crate) struct ObservedBody {
    inner: BoxBody,
    watch: Option<CallWatch>,
}

impl ObservedBody {
    fn passthrough(inner: BoxBody) -> Self {
        Self { inner, watch: None }
    }

    fn watched(inner: BoxBody, watch: CallWatch) -> Self {
        Self {
            inner,
            watch: Some(watch),
        }
    }
}

impl Body for ObservedBody {
    type Data = Bytes;
    type Error = Status;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(trailers) = frame.trailers_ref() {
                    if let Some(watch) = this.watch.as_mut() {
                        watch.finish(status_from_trailers(trailers));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(status))) => {
                if let Some(watch) = this.watch.as_mut() {
                    watch.finish(code_label(status.code() as i32));
                }
                Poll::Ready(Some(Err(status)))
            }
            Poll::Ready(None) => {
                // Stream ended without trailers; nothing contradicted success.
                if let Some(watch) = this.watch.as_mut() {
                    watch.finish("OK");
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

fn status_from_headers(headers: &HeaderMap) -> Option<&'static str> {
    headers.get(GRPC_STATUS_HEADER).map(parse_status_value)
}

fn status_from_trailers(trailers: &HeaderMap) -> &'static str {
    trailers
        .get(GRPC_STATUS_HEADER)
        .map(parse_status_value)
        .unwrap_or("OK")
}

fn parse_status_value(value: &HeaderValue) -> &'static str {
    value
        .to_str()
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .map(code_label)
        .unwrap_or("UNKNOWN")
}

/// Stable label for a numeric gRPC status code.
pub(crate) fn code_label(code: i32) -> &'static str {
    match code {
        0 => "OK",
        1 => "CANCELLED",
        2 => "UNKNOWN",
        3 => "INVALID_ARGUMENT",
        4 => "DEADLINE_EXCEEDED",
        5 => "NOT_FOUND",
        6 => "ALREADY_EXISTS",
        7 => "PERMISSION_DENIED",
        8 => "RESOURCE_EXHAUSTED",
        9 => "FAILED_PRECONDITION",
        10 => "ABORTED",
        11 => "OUT_OF_RANGE",
        12 => "UNIMPLEMENTED",
        13 => "INTERNAL",
        14 => "UNAVAILABLE",
        15 => "DATA_LOSS",
        16 => "UNAUTHENTICATED",
        _ => "UNKNOWN",
    }
}
