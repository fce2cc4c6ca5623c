//! Access log for the API.
//!
//! One line per finished request, keyed by the matched route pattern rather
//! than the raw path, with the project id and the authenticated caller when
//! the handler resolved them.

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::StatusCode;
use actix_web::{Error, HttpMessage, HttpRequest};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::auth::{AdminAuth, RequestContext};

/// Who a finished request was served for.
pub fn caller_label(req: &HttpRequest) -> String {
    let extensions = req.extensions();
    if let Some(ctx) = extensions.get::<RequestContext>() {
        format!("user:{}", ctx.user_id)
    } else if extensions.get::<AdminAuth>().is_some() {
        "admin".to_string()
    } else {
        "anonymous".to_string()
    }
}

pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware { service }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let method = req.method().to_string();
        let remote_addr = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        debug!(target: "api", method = %method, path = %req.path(), "request received");

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            let request = res.request();
            let route = request
                .match_pattern()
                .unwrap_or_else(|| request.path().to_string());
            let project = request.match_info().get("project_id").unwrap_or("-").to_string();
            let caller = caller_label(request);
            let status = res.status();
            let duration_ms = start.elapsed().as_millis() as u64;

            macro_rules! access_line {
                ($level:ident) => {
                    $level!(
                        target: "api",
                        method = %method,
                        route = %route,
                        project = %project,
                        caller = %caller,
                        remote_addr = %remote_addr,
                        status = status.as_u16(),
                        duration_ms = duration_ms,
                        "{}",
                        summary(status)
                    )
                };
            }

            if status.is_server_error() {
                access_line!(error);
            } else if status.is_client_error() {
                access_line!(warn);
            } else {
                access_line!(info);
            }

            Ok(res)
        })
    }
}

fn summary(status: StatusCode) -> &'static str {
    match status.as_u16() {
        401 | 403 => "request refused",
        400..=499 => "request rejected",
        500..=599 => "request failed",
        _ => "request served",
    }
}
