//! Cloud sync server: routing, authentication and envelopes.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler, ServerStats};
use branchsync_protocol::{
    endpoints, Method, PullQuery, PushRequest, WireHandler, WireRequest, WireResponse,
};
use branchsync_store::RecordStore;
use std::sync::Arc;
use tracing::{error, warn};

/// The cloud side of branch synchronization.
///
/// Serves push, pull and health as a [`WireHandler`], so it can sit behind
/// any HTTP front end or be called in-process.
pub struct CloudServer {
    handler: RequestHandler,
}

impl CloudServer {
    /// Creates a server over `store`.
    pub fn new(config: ServerConfig, store: Arc<dyn RecordStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        Self {
            handler: RequestHandler::new(context),
        }
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Returns the cloud store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.handler.context().store
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> ServerStats {
        self.handler.context().stats()
    }

    fn route(&self, request: &WireRequest) -> ServerResult<WireResponse> {
        let expected = match request.path.as_str() {
            endpoints::PUSH => Method::Post,
            endpoints::PULL | endpoints::HEALTH => Method::Get,
            other => return Err(ServerError::NotFound(other.to_string())),
        };
        if request.method != expected {
            return Err(ServerError::MethodNotAllowed(request.method.as_str().to_string()));
        }

        match request.path.as_str() {
            endpoints::HEALTH => Ok(WireResponse::ok(
                "Service is healthy",
                self.handler.handle_health(),
            )),
            endpoints::PUSH => {
                let branch = self
                    .handler
                    .context()
                    .authenticator
                    .authenticate(request.bearer.as_deref())?;
                let push = PushRequest::from_json_lenient(&request.body)
                    .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
                let response = self.handler.handle_lenient_push(branch, push)?;
                Ok(WireResponse::ok("Sync completed successfully", response))
            }
            _ => {
                self.handler
                    .context()
                    .authenticator
                    .authenticate(request.bearer.as_deref())?;
                let query = PullQuery::from_query_pairs(&request.query)
                    .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
                let response = self.handler.handle_pull(query)?;
                Ok(WireResponse::ok("Pull completed successfully", response))
            }
        }
    }
}

impl WireHandler for CloudServer {
    fn handle(&self, request: &WireRequest) -> WireResponse {
        match self.route(request) {
            Ok(response) => response,
            Err(e) => {
                if e.is_server_error() {
                    error!(path = %request.path, error = %e, "request failed");
                } else {
                    warn!(path = %request.path, error = %e, "request rejected");
                }
                WireResponse::error(e.status_code(), e.public_message())
            }
        }
    }
}
