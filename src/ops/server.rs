// * HTTP surface
// * Start/cancel batches, poll progress, list sources, expose Prometheus metrics

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::controller::{AdmissionError, JobController};
use crate::ops::telemetry::get_metrics_string;
use crate::persistence::schema::RegNo;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid bind address {addr}: {source}")]
    InvalidAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("HTTP server failed: {0}")]
    Hyper(#[from] hyper::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartStatus {
    BatchInitiated,
    Busy,
    Error,
}

/// Body of the start-batch response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartResponse {
    pub status: StartStatus,
    pub message: String,
}

pub fn parse_bind_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    addr.parse().map_err(|source| ServerError::InvalidAddr {
        addr: addr.to_string(),
        source,
    })
}

/// Serves the API until `shutdown` resolves
pub async fn serve<F>(controller: JobController, addr: SocketAddr, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let make_svc = make_service_fn(move |_conn| {
        let controller = controller.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| route(controller.clone(), req)))
        }
    });

    let server = Server::try_bind(&addr)?
        .serve(make_svc)
        .with_graceful_shutdown(shutdown);

    info!(%addr, "Ingestion API listening");
    server.await?;
    info!("Ingestion API stopped");
    Ok(())
}

/// Dispatches one request
pub async fn route(controller: JobController, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let query = query_params(&req);
    debug!(method = %req.method(), path = req.uri().path(), "API request");

    let response = match (req.method(), req.uri().path()) {
        (&Method::POST, "/api/ingestion/start-batch") => start_batch(&controller, &query),
        (&Method::GET, "/api/ingestion/progress") => json_response(StatusCode::OK, &controller.telemetry()),
        (&Method::POST, "/api/ingestion/cancel") => {
            let cancelled = controller.cancel();
            json_response(StatusCode::OK, &serde_json::json!({ "cancelled": cancelled }))
        }
        (&Method::GET, "/api/sources") => {
            json_response(StatusCode::OK, &controller.registry().list_active())
        }
        (&Method::GET, "/metrics") => text_response(
            StatusCode::OK,
            "text/plain; version=0.0.4",
            get_metrics_string(),
        ),
        (&Method::GET, "/health") => text_response(StatusCode::OK, "text/plain", "OK".to_string()),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };
    Ok(response)
}

fn start_batch(controller: &JobController, query: &HashMap<String, String>) -> Response<Body> {
    let link_key = query.get("linkKey").map(String::as_str).unwrap_or_default();
    let start = query.get("startReg").and_then(|v| v.trim().parse::<RegNo>().ok());
    let end = query.get("endReg").and_then(|v| v.trim().parse::<RegNo>().ok());

    let (Some(start), Some(end)) = (start, end) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            &StartResponse {
                status: StartStatus::Error,
                message: "startReg and endReg must be non-negative integers".to_string(),
            },
        );
    };

    match controller.try_start(link_key, start, end) {
        Ok(_) => json_response(
            StatusCode::OK,
            &StartResponse {
                status: StartStatus::BatchInitiated,
                message: format!("Ingestion started for {} records", (end - start).saturating_add(1)),
            },
        ),
        Err(AdmissionError::Busy) => json_response(
            StatusCode::CONFLICT,
            &StartResponse {
                status: StartStatus::Busy,
                message: AdmissionError::Busy.to_string(),
            },
        ),
        Err(e) => json_response(
            StatusCode::BAD_REQUEST,
            &StartResponse {
                status: StartStatus::Error,
                message: e.to_string(),
            },
        ),
    }
}

fn query_params(req: &Request<Body>) -> HashMap<String, String> {
    let raw = req.uri().query().unwrap_or_default();
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            format!("Serialization failed: {e}"),
        ),
    }
}

fn text_response(status: StatusCode, content_type: &'static str, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_addr() {
        assert!(parse_bind_addr("127.0.0.1:8080").is_ok());
        assert!(matches!(
            parse_bind_addr("localhost"),
            Err(ServerError::InvalidAddr { .. })
        ));
    }

    #[test]
    fn test_start_status_wire_names() {
        let body = StartResponse {
            status: StartStatus::BatchInitiated,
            message: String::new(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"BATCH_INITIATED\""));
        assert_eq!(serde_json::to_string(&StartStatus::Busy).unwrap(), "\"BUSY\"");
    }
}
