use hyper::{header::CONTENT_TYPE, Body, Method, Request, Response, StatusCode};
use pylon_mempool::UoPool;
use pylon_primitives::{UserOpStatus, UserOperationHash};
use serde_json::json;
use std::{
    error::Error,
    future::Future,
    pin::Pin,
    str::FromStr,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Serves the read-only operator endpoints (`GET /health`, `GET /mempool`,
/// `GET /userOp/:hash`) in front of the JSON-RPC service, and tags every
/// request with a correlation id for the logs.
#[derive(Clone)]
pub struct OperatorLayer {
    uopool: Arc<UoPool>,
}

impl OperatorLayer {
    pub fn new(uopool: Arc<UoPool>) -> Self {
        Self { uopool }
    }
}

impl<S> Layer<S> for OperatorLayer {
    type Service = OperatorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OperatorService { inner, uopool: self.uopool.clone() }
    }
}

#[derive(Clone)]
pub struct OperatorService<S> {
    inner: S,
    uopool: Arc<UoPool>,
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("static response parts are valid")
}

impl<S> Service<Request<Body>> for OperatorService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Error: Into<Box<dyn Error + Send + Sync>> + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = Box<dyn Error + Send + Sync + 'static>;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let uopool = self.uopool.clone();
        let mut inner = self.inner.clone();

        let correlation_id = Uuid::new_v4();
        let span = tracing::info_span!("rpc_request", %correlation_id);

        Box::pin(
            async move {
                if req.method() != Method::GET {
                    return inner.call(req).await.map_err(Into::into);
                }

                let path = req.uri().path().to_string();
                let res = match path.as_str() {
                    // the stored count doubles as a persistence liveness probe
                    "/health" => match uopool.stored_count(UserOpStatus::Confirmed).await {
                        Ok(confirmed) => json_response(
                            StatusCode::OK,
                            json!({
                                "status": "ok",
                                "chainId": uopool.chain_id(),
                                "entryPoint": uopool.supported_entry_points(),
                                "pendingUserOps": uopool.pending_count().await,
                                "confirmedUserOps": confirmed,
                            }),
                        ),
                        Err(err) => json_response(
                            StatusCode::SERVICE_UNAVAILABLE,
                            json!({ "status": "error", "error": err.to_string() }),
                        ),
                    },
                    "/mempool" => {
                        let hashes: Vec<String> = uopool
                            .pending_hashes()
                            .await
                            .iter()
                            .map(|h| h.to_string())
                            .collect();
                        json_response(
                            StatusCode::OK,
                            json!({ "pendingCount": hashes.len(), "userOpHashes": hashes }),
                        )
                    }
                    _ => match path.strip_prefix("/userOp/") {
                        Some(raw) => match UserOperationHash::from_str(raw) {
                            Ok(hash) => match uopool.get_user_operation_by_hash(&hash).await {
                                Ok(Some(record)) => json_response(
                                    StatusCode::OK,
                                    serde_json::to_value(&record)
                                        .unwrap_or_else(|_| json!({ "error": "serialization" })),
                                ),
                                Ok(None) => json_response(
                                    StatusCode::NOT_FOUND,
                                    json!({ "error": "user operation not found" }),
                                ),
                                Err(err) => json_response(
                                    StatusCode::INTERNAL_SERVER_ERROR,
                                    json!({ "error": err.to_string() }),
                                ),
                            },
                            Err(_) => json_response(
                                StatusCode::BAD_REQUEST,
                                json!({ "error": "invalid userOpHash" }),
                            ),
                        },
                        None => json_response(
                            StatusCode::NOT_FOUND,
                            json!({ "error": "not found" }),
                        ),
                    },
                };
                Ok(res)
            }
            .instrument(span),
        )
    }
}
