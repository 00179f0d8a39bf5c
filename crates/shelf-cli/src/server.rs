//! HTTP adapter over the streaming gateway.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{self, header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use shelf_core::gateway::{
    Endpoint, GatewayError, GatewayMethod, StreamRequest, StreamResponse, StreamingGateway,
};
use shelf_core::storage::Database;
use std::fs::File;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};

const PASSWORD_HEADER: &str = "x-file-password";

/// Gateway answer plus the opened file for its body.
type Planned = Result<(StreamResponse, Option<File>), GatewayError>;

#[derive(Clone)]
struct ServerState {
    db: Arc<Mutex<Database>>,
}

#[derive(Debug, Default, Deserialize)]
struct Credentials {
    password: Option<String>,
}

/// Query parameter first, then the password header.
fn password_from(query: Credentials, headers: &HeaderMap) -> Option<String> {
    query.password.or_else(|| {
        headers
            .get(PASSWORD_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/stream/:id", get(stream))
        .route("/download/:id", get(download))
        .with_state(state)
}

pub async fn serve(db: Database, listen_addr: &str) -> anyhow::Result<()> {
    let state = ServerState {
        db: Arc::new(Mutex::new(db)),
    };
    let listener = TcpListener::bind(listen_addr).await?;
    info!("Serving catalog on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn stream(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Query(query): Query<Credentials>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    respond(state, Endpoint::Stream, id, query, method, headers).await
}

async fn download(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Query(query): Query<Credentials>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    respond(state, Endpoint::Download, id, query, method, headers).await
}

async fn respond(
    state: ServerState,
    endpoint: Endpoint,
    id: String,
    query: Credentials,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let password = password_from(query, &headers);
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let method = if method == Method::HEAD {
        GatewayMethod::Head
    } else {
        GatewayMethod::Get
    };

    // SQLite and Argon2 both block.
    let db = state.db.clone();
    let planned = tokio::task::spawn_blocking(move || -> Planned {
        let db = db.lock().map_err(|_| {
            GatewayError::Internal(shelf_core::Error::Other("database lock poisoned".into()))
        })?;
        let response = StreamingGateway::new(&db).handle(&StreamRequest {
            id: &id,
            method,
            endpoint,
            password: password.as_deref(),
            range: range.as_deref(),
        })?;
        let file = match &response.body {
            Some(slice) => Some(
                slice
                    .open()
                    .map_err(|e| GatewayError::Internal(e.into()))?
                    .into_inner(),
            ),
            None => None,
        };
        Ok((response, file))
    })
    .await;

    match planned {
        Ok(Ok((response, file))) => build_response(response, file),
        Ok(Err(err)) => error_response(err),
        Err(join_error) => {
            error!("Gateway task failed: {}", join_error);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `file` is already positioned at the start of the slice.
fn build_response(response: StreamResponse, file: Option<File>) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    let mut builder = http::Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(*name, value.as_str());
    }

    let body = match (file, &response.body) {
        (Some(file), Some(slice)) => {
            let reader = tokio::fs::File::from_std(file).take(slice.length);
            Body::from_stream(ReaderStream::new(reader))
        }
        _ => Body::empty(),
    };

    builder.body(body).unwrap_or_else(|e| {
        error!("Error building response: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

fn error_response(err: GatewayError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match &err {
        GatewayError::Internal(e) => error!("Gateway failure: {}", e),
        other => debug!("Gateway refused request: {}", other),
    }

    let mut response = (status, err.to_string()).into_response();
    if let Some(range) = err.content_range() {
        if let Ok(value) = HeaderValue::from_str(&range) {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_password_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(PASSWORD_HEADER, HeaderValue::from_static("from-header"));

        let query = Credentials {
            password: Some("from-query".into()),
        };
        assert_eq!(password_from(query, &headers).as_deref(), Some("from-query"));
        assert_eq!(
            password_from(Credentials::default(), &headers).as_deref(),
            Some("from-header")
        );
        assert_eq!(password_from(Credentials::default(), &HeaderMap::new()), None);
    }

    #[test]
    fn unsatisfiable_range_carries_content_range() {
        let response = error_response(GatewayError::RangeNotSatisfiable {
            total: 1000,
            reason: "no range".into(),
        });
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }

    #[test]
    fn gateway_statuses_pass_through() {
        assert_eq!(error_response(GatewayError::Unauthorized).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_response(GatewayError::Forbidden).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            error_response(GatewayError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
    }
}
