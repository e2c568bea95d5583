// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP ingestion boundary.
//!
//! Every `POST` body, whatever the path, becomes one payload handed to the
//! [`PayloadSink`]. The listener stops on its cancellation token, lets open
//! connections finish and then drops the sink so the aggregator can drain.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aggregator_service::PayloadSink;
use crate::errors::IntakeError;

pub use crate::tls::TlsConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeConfig {
    pub addr: SocketAddr,
    pub max_payload_bytes: usize,
    /// Plain HTTP when `None`.
    pub tls: Option<TlsConfig>,
}

pub type HttpResponse = Response<Full<Bytes>>;

pub struct HttpIntake {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    handler: Arc<IntakeHandler>,
    cancel_token: CancellationToken,
}

impl HttpIntake {
    /// Loads the TLS material, if any, and binds the listener.
    pub async fn bind(config: IntakeConfig, sink: PayloadSink) -> Result<Self, IntakeError> {
        let acceptor = config.tls.as_ref().map(TlsConfig::acceptor).transpose()?;
        let listener = TcpListener::bind(config.addr)
            .await
            .map_err(|source| IntakeError::Bind {
                addr: config.addr,
                source,
            })?;

        Ok(HttpIntake {
            listener,
            acceptor,
            handler: Arc::new(IntakeHandler::new(sink, config.max_payload_bytes)),
            cancel_token: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Accepts connections until the cancellation token fires.
    pub async fn serve(self) -> Result<(), IntakeError> {
        let HttpIntake {
            listener,
            acceptor,
            handler,
            cancel_token,
        } = self;
        let scheme = if acceptor.is_some() { "https" } else { "http" };
        info!(
            "Listening for logs on {scheme}://{}",
            listener.local_addr().map_err(IntakeError::Accept)?
        );

        let server = http1::Builder::new();
        let mut joinset = JoinSet::new();

        loop {
            let (conn, peer) = tokio::select! {
                biased;
                () = cancel_token.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(IntakeError::Accept(e));
                    }
                    Ok(accepted) => accepted,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!("Connection handler panicked: {e:?}");
                        }
                    }
                    continue;
                },
            };

            let server = server.clone();
            let handler = handler.clone();
            let cancel = cancel_token.clone();
            match acceptor.clone() {
                Some(acceptor) => {
                    joinset.spawn(async move {
                        let stream = tokio::select! {
                            () = cancel.cancelled() => return,
                            res = acceptor.accept(conn) => match res {
                                Ok(stream) => stream,
                                Err(e) => {
                                    debug!("TLS handshake with {peer} failed: {e}");
                                    return;
                                }
                            },
                        };
                        serve_connection(server, TokioIo::new(stream), handler, cancel).await;
                    });
                }
                None => {
                    joinset.spawn(serve_connection(
                        server,
                        TokioIo::new(conn),
                        handler,
                        cancel,
                    ));
                }
            }
        }

        drop(listener);
        debug!("Intake stopped accepting, waiting for {} connections", joinset.len());
        while let Some(finished) = joinset.join_next().await {
            if let Err(e) = finished {
                if e.is_panic() {
                    error!("Connection handler panicked: {e:?}");
                }
            }
        }
        info!("Intake stopped");
        Ok(())
    }
}

async fn serve_connection<I>(
    server: http1::Builder,
    io: I,
    handler: Arc<IntakeHandler>,
    cancel: CancellationToken,
) where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler.handle(req).await) }
    });
    let conn = server.serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = cancel.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        debug!("Connection error: {e}");
    }
}

/// Turns one request into one payload.
#[derive(Debug, Clone)]
pub struct IntakeHandler {
    sink: PayloadSink,
    max_payload_bytes: usize,
}

impl IntakeHandler {
    pub fn new(sink: PayloadSink, max_payload_bytes: usize) -> Self {
        IntakeHandler {
            sink,
            max_payload_bytes,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if req.method() != Method::POST {
            return log_and_create_http_response(
                "unsupported HTTP method",
                StatusCode::BAD_REQUEST,
            );
        }
        if let Some(response) = verify_request_content_length(req.headers(), self.max_payload_bytes)
        {
            return response;
        }

        let body = match Limited::new(req.into_body(), self.max_payload_bytes)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return log_and_create_http_response(
                    "Payload too large",
                    StatusCode::PAYLOAD_TOO_LARGE,
                );
            }
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading request body: {e}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                );
            }
        };

        match self.sink.submit(body).await {
            Ok(size) => log_and_create_http_response(&format!("{size} bytes\n"), StatusCode::OK),
            Err(closed) => {
                log_and_create_http_response(&closed.to_string(), StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    }
}

/// Logs the message, at debug level for a success status and error level
/// otherwise, and returns it as a `text/plain` body with the given status.
pub fn log_and_create_http_response(message: &str, status: StatusCode) -> HttpResponse {
    if status.is_success() {
        debug!("{}", message.trim_end());
    } else {
        error!("{message}");
    }
    let mut response = Response::new(Full::new(Bytes::copy_from_slice(message.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Rejects a request whose declared `Content-Length` is unparsable or above
/// `max_content_length`. A missing header is fine, the body limit still
/// applies while reading.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
) -> Option<HttpResponse> {
    let content_length = header_map.get(header::CONTENT_LENGTH)?;
    let Some(content_length) = content_length
        .to_str()
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    else {
        return Some(log_and_create_http_response(
            "Invalid Content-Length header",
            StatusCode::BAD_REQUEST,
        ));
    };
    if content_length > max_content_length {
        return Some(log_and_create_http_response(
            "Payload too large",
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    }
    None
}
