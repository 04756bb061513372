use crate::middleware::OperatorLayer;
use hyper::{http::HeaderValue, Method};
use jsonrpsee::{
    server::{ServerBuilder, ServerHandle},
    Methods,
};
use std::net::{IpAddr, SocketAddr};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Request body cap for `POST /`.
const MAX_REQUEST_BODY_SIZE: u32 = 10 * 1024 * 1024;

/// JsonRpcServer is a wrapper around the `jsonrpsee`
/// [ServerBuilder](jsonrpsee::server::ServerBuilder): HTTP only, with the
/// CORS and operator layers in front.
pub struct JsonRpcServer {
    /// HTTP address to listen on.
    http_addr: IpAddr,
    /// HTTP port to listen on.
    http_port: u16,
    /// The RPC methods to be exposed.
    http_methods: Methods,
    /// The [cors layer](CorsLayer) to filter requests.
    http_cors_layer: Option<CorsLayer>,
    /// The [operator layer](OperatorLayer) answering the read-only endpoints.
    operator_layer: Option<OperatorLayer>,
}

impl JsonRpcServer {
    pub fn new(http_addr: IpAddr, http_port: u16) -> Self {
        Self {
            http_addr,
            http_port,
            http_methods: Methods::new(),
            http_cors_layer: None,
            operator_layer: None,
        }
    }

    /// Add a cors layer to the server.
    pub fn with_cors(mut self, cors_domain: &[String]) -> Self {
        let cors_layer = if cors_domain.iter().any(|d| d == "*") {
            CorsLayer::new().allow_headers(Any).allow_methods([Method::POST]).allow_origin(Any)
        } else {
            let mut origins: Vec<HeaderValue> = vec![];

            for domain in cors_domain.iter() {
                if let Ok(origin) = domain.parse::<HeaderValue>() {
                    origins.push(origin);
                }
            }

            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::POST])
                .allow_origin(AllowOrigin::list(origins))
        };

        self.http_cors_layer = Some(cors_layer);
        self
    }

    /// Add the operator endpoints layer to the server.
    pub fn with_operator(mut self, layer: OperatorLayer) -> Self {
        self.operator_layer = Some(layer);
        self
    }

    /// Add methods to the RPC server.
    pub fn add_methods(&mut self, methods: impl Into<Methods>) -> eyre::Result<()> {
        self.http_methods
            .merge(methods)
            .map_err(|err| eyre::eyre!("failed to merge RPC methods: {err}"))
    }

    /// Starts the JSON-RPC server; returns the bound address and the handle.
    pub async fn start(&self) -> eyre::Result<(SocketAddr, ServerHandle)> {
        let service = ServiceBuilder::new()
            .option_layer(self.http_cors_layer.clone())
            .option_layer(self.operator_layer.clone());

        let server = ServerBuilder::new()
            .http_only()
            .max_request_body_size(MAX_REQUEST_BODY_SIZE)
            .set_http_middleware(service)
            .build(SocketAddr::new(self.http_addr, self.http_port))
            .await?;

        let addr = server.local_addr()?;
        Ok((addr, server.start(self.http_methods.clone())))
    }
}
