use crate::codec::{self, AdmissionRequest, AdmissionResponse, AdmissionReview};
use crate::core::{self, ResourceKind};
use bytes::Bytes;
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use std::{convert::Infallible, path::PathBuf, sync::Arc};
use tracing::{debug, error, info, trace, warn};

/// Serves the mutating and validating admission endpoints.
///
/// The policy file is read anew for every validating request.
#[derive(Clone, Debug)]
pub struct Admission {
    config_path: Arc<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Route {
    Mutating,
    Validating,
}

type Body = http_body_util::Full<Bytes>;

const JSON: &str = "application/json";

// === impl Admission ===

impl<B> tower::Service<Request<B>> for Admission
where
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        trace!(method = %req.method(), uri = %req.uri());
        let route = match Route::from_path(req.uri().path()) {
            Some(route) => route,
            None => {
                info!(path = %req.uri().path(), "No admission handler for path");
                return Box::pin(future::ok(text_response(
                    http::StatusCode::NOT_FOUND,
                    "404 page not found",
                )));
            }
        };
        if req.method() != http::Method::POST {
            info!(method = %req.method(), ?route, "Unsupported method");
            return Box::pin(future::ok(text_response(
                http::StatusCode::METHOD_NOT_ALLOWED,
                "method not allowed",
            )));
        }

        let admission = self.clone();
        Box::pin(async move { Ok(admission.serve(route, req).await) })
    }
}

impl Admission {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Arc::new(config_path.into()),
        }
    }

    async fn serve<B>(self, route: Route, req: Request<B>) -> Response<Body>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let content_type = req.headers().get(http::header::CONTENT_TYPE).cloned();

        let body = match req.into_body().collect().await {
            Ok(body) => body.to_bytes(),
            Err(error) => {
                warn!(%error, "Failed to read request body");
                Bytes::new()
            }
        };
        if body.is_empty() {
            error!(?route, "Empty request body");
            return text_response(http::StatusCode::BAD_REQUEST, "empty body");
        }

        if content_type.as_ref().and_then(|v| v.to_str().ok()) != Some(JSON) {
            error!(?route, ?content_type, "Unsupported Content-Type");
            return text_response(
                http::StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "invalid Content-Type, expect `application/json`",
            );
        }

        let review = self.review(route, &body);
        debug!(?review);
        match codec::encode(&review) {
            Ok(bytes) => json_response(bytes),
            Err(error) => {
                error!(%error, "Failed to encode admission review");
                text_response(http::StatusCode::INTERNAL_SERVER_ERROR, error)
            }
        }
    }

    fn review(&self, route: Route, body: &[u8]) -> AdmissionReview {
        let (api_version, req) = match codec::decode(body) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(%error, "Failed to decode admission review");
                return AdmissionResponse::invalid(error).into_review(codec::API_VERSION_V1);
            }
        };

        info!(
            kind = %req.kind.kind,
            namespace = req.namespace.as_deref().unwrap_or_default(),
            name = req.name.as_deref().unwrap_or_default(),
            uid = %req.uid,
            operation = ?req.operation,
            user = req.user_info.username.as_deref().unwrap_or_default(),
            ?route,
            "AdmissionReview"
        );

        let rsp = match route {
            Route::Mutating => AdmissionResponse::from_verdict(core::mutate()),
            Route::Validating => self.validate(&req),
        };
        rsp.with_uid(req.uid).into_review(api_version)
    }

    fn validate(&self, req: &AdmissionRequest) -> AdmissionResponse {
        let config = match core::load_config(self.config_path.as_path()) {
            Ok(config) => config,
            Err(error) => {
                error!(%error, "Failed to load policy");
                return AdmissionResponse::invalid(error);
            }
        };

        let kind = ResourceKind::from_kind(&req.kind.kind);
        match core::validate(&kind, req.object.as_ref(), &config) {
            Ok(verdict) => {
                info!(%kind, allowed = verdict.allowed, reason = ?verdict.reason, "Validated");
                AdmissionResponse::from_verdict(verdict)
            }
            Err(error) => {
                error!(%error, %kind, "Failed to read admitted object");
                AdmissionResponse::invalid(error)
            }
        }
    }
}

// === impl Route ===

impl Route {
    fn from_path(path: &str) -> Option<Self> {
        match path {
            "/mutating" => Some(Self::Mutating),
            "/validating" => Some(Self::Validating),
            _ => None,
        }
    }
}

fn json_response(bytes: Vec<u8>) -> Response<Body> {
    Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, JSON)
        .body(Body::from(bytes))
        .expect("admission review response must be valid")
}

fn text_response(status: http::StatusCode, msg: impl std::fmt::Display) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(http::header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(Body::from(format!("{msg}\n")))
        .expect("error response must be valid")
}
