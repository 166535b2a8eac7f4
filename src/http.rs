use std::convert::Infallible;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;

use crate::encoding;
use crate::redis::{Exporter, Target};

/// Shared by all connections
pub struct State {
    pub exporter: Exporter,
    /// Scraped by `/metrics`
    pub target: Target,
}

/// Accept connections until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, state: Arc<State>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut shutdown => break,
            result = listener.accept() => match result {
                Ok(conn) => conn,
                Err(err) => {
                    error!(message = "accept new connection failed", %err);
                    continue;
                }
            }
        };

        let state = Arc::clone(&state);
        let service = service_fn(move |req: Request<Incoming>| {
            let state = Arc::clone(&state);
            async move { Ok::<_, Infallible>(handle(req, &state).await) }
        });

        tokio::spawn(async move {
            let builder = Builder::new(TokioExecutor::new());
            if let Err(err) = builder
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(message = "failed to serve http connection", %peer, %err);
            }
        });
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

/// The `target` query parameter
fn scrape_target(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "target")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

async fn handle<B>(req: Request<B>, state: &State) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
    }

    let mut metrics = match req.uri().path() {
        "/metrics" => state.exporter.scrape(&state.target).await,
        // the configured credentials are sent to the requested target too
        "/scrape" => {
            let Some(target) = scrape_target(req.uri().query()) else {
                return text(
                    StatusCode::BAD_REQUEST,
                    "'target' parameter must be specified\n",
                );
            };

            match target.parse::<Target>() {
                Ok(target) => state.exporter.scrape(&target).await,
                Err(err) => {
                    debug!(message = "invalid scrape target", %target, %err);
                    return text(StatusCode::BAD_REQUEST, "invalid 'target' parameter\n");
                }
            }
        }
        "/health" => return text(StatusCode::OK, "ok\n"),
        _ => return text(StatusCode::NOT_FOUND, "not found\n"),
    };
    metrics.extend(state.exporter.exporter_metrics());

    let body = match encoding::encode(&metrics) {
        Ok(body) => body,
        Err(err) => {
            error!(message = "encode metrics failed", %err);
            return text(StatusCode::INTERNAL_SERVER_ERROR, "encode metrics failed\n");
        }
    };
    let mut resp = if should_compress(req.headers()) {
        match compress(body.as_bytes()) {
            Ok(compressed) => {
                let mut resp = Response::new(Full::new(compressed));
                resp.headers_mut()
                    .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                resp
            }
            Err(err) => {
                warn!(message = "gzip metrics failed", %err);
                Response::new(Full::new(Bytes::from(body)))
            }
        }
    } else {
        Response::new(Full::new(Bytes::from(body)))
    };

    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static(encoding::CONTENT_TYPE),
    );
    resp
}

fn should_compress(headers: &HeaderMap) -> bool {
    match headers.get(ACCEPT_ENCODING) {
        Some(value) => match value.to_str() {
            Ok(value) => value.contains("gzip"),
            Err(_err) => false,
        },
        None => false,
    }
}

fn compress(data: &[u8]) -> std::io::Result<Bytes> {
    let mut encoder =
        flate2::write::GzEncoder::new(BytesMut::new().writer(), flate2::Compression::default());
    encoder.write_all(data)?;

    Ok(encoder.finish()?.into_inner().freeze())
}
