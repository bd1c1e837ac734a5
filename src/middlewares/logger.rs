use crate::api::identity::USER_ID_HEADER;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures::future::LocalBoxFuture;
use log::{info, warn};
use std::future::{ready, Ready};
use std::time::{Duration, Instant};

/// Access log: method, path, status, caller and latency of every request.
/// Requests slower than `slow_after` are logged as warnings.
#[derive(Debug, Clone, Copy)]
pub struct RequestLogger {
    slow_after: Duration,
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self {
            slow_after: Duration::from_millis(500),
        }
    }
}

impl RequestLogger {
    pub fn slow_after(slow_after: Duration) -> Self {
        Self { slow_after }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware {
            service,
            slow_after: self.slow_after,
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
    slow_after: Duration,
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
        let method = req.method().clone();
        let path = req.path().to_string();
        let caller = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let slow_after = self.slow_after;

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            let elapsed = start.elapsed();
            let status = res.status().as_u16();

            if elapsed > slow_after {
                warn!("{} {} {} user={} {}ms (slow)", method, path, status, caller, elapsed.as_millis());
            } else {
                info!("{} {} {} user={} {}ms", method, path, status, caller, elapsed.as_millis());
            }

            Ok(res)
        })
    }
}
