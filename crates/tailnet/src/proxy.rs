//! Forwarding proxy: relays HTTP requests from the public tailnet listener
//! to the local service, verbatim and streaming in both directions.

use std::fmt;

use bytes::Bytes;
use http::{Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{backend::TailnetListener, error::TailnetError};

type ProxyBody = BoxBody<Bytes, hyper::Error>;
type ProxyClient = Client<HttpConnector, ProxyBody>;

/// Local address requests are forwarded to. Parsed once from configuration
/// when an exposure starts; immutable for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    authority: String,
}

impl ForwardTarget {
    /// Parse a configured bind address into a dialable forward target.
    ///
    /// A bare `:port` bind address is reachable on loopback but not dialable
    /// as written, so it is rewritten to `localhost:port`.
    pub fn parse(listen_address: &str) -> Result<Self, TailnetError> {
        let trimmed = listen_address.trim();
        if trimmed.is_empty() {
            return Err(TailnetError::Config("listen address is empty".into()));
        }
        let authority = if trimmed.starts_with(':') {
            format!("localhost{trimmed}")
        } else {
            trimmed.to_string()
        };
        authority.parse::<http::uri::Authority>().map_err(|e| {
            TailnetError::Config(format!("invalid listen address {listen_address:?}: {e}"))
        })?;
        Ok(Self { authority })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }
}

impl fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority)
    }
}

/// Accept connections until cancelled, serving each with the forwarding
/// service. Returns `Ok(())` on cancellation; an accept failure is returned
/// as [`TailnetError::Forwarding`] so the controller can record it.
pub(crate) async fn forward_loop(
    mut listener: Box<dyn TailnetListener>,
    target: ForwardTarget,
    cancel: CancellationToken,
) -> Result<(), TailnetError> {
    let client: ProxyClient = Client::builder(TokioExecutor::new()).build_http();

    loop {
        let (stream, remote) = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("forwarding loop cancelled");
                return Ok(());
            },
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => return Err(TailnetError::Forwarding(format!("accept failed: {e}"))),
            },
        };
        debug!(%remote, "accepted connection");

        let client = client.clone();
        let target = target.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                forward_request(client.clone(), target.clone(), req)
            });
            let builder = auto::Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
            if let Err(e) = conn.await {
                debug!(%remote, error = %e, "connection closed with error");
            }
        });
    }
}

/// Relay one request to the target and its response back. Method, path,
/// query, headers, and bodies pass through unmodified; only the request URI
/// authority is rewritten to point at the local service.
async fn forward_request(
    client: ProxyClient,
    target: ForwardTarget,
    req: Request<Incoming>,
) -> Result<Response<ProxyBody>, std::convert::Infallible> {
    debug!(method = %req.method(), path = %req.uri().path(), "forwarding request");

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = match format!("http://{}{}", target.authority(), path_and_query).parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => return Ok(bad_gateway(format!("invalid forward URI: {e}"))),
    };

    let mut req = req.map(|body| body.boxed());
    *req.uri_mut() = uri;

    match client.request(req).await {
        Ok(resp) => Ok(resp.map(|body| body.boxed())),
        Err(e) => {
            warn!(target = %target, error = %e, "request to local service failed");
            Ok(bad_gateway(format!("forward to {target} failed: {e}")))
        },
    }
}

fn bad_gateway(msg: String) -> Response<ProxyBody> {
    let body = Full::new(Bytes::from(msg))
        .map_err(|never| match never {})
        .boxed();
    let mut resp = Response::new(body);
    *resp.status_mut() = StatusCode::BAD_GATEWAY;
    resp
}
