use crate::error::TrackerError;
use crate::queries::_structs::UserId;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use std::future::{ready, Ready};

/// Header the upstream auth layer sets to the authenticated account id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Caller identity; `None` when the request is anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub Option<UserId>);

impl Identity {
    pub fn from_request_headers(req: &HttpRequest) -> Self {
        let id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<UserId>().ok());
        Identity(id)
    }

    /// The account id, or `Unauthorized` for anonymous callers.
    pub fn require(self) -> Result<UserId, TrackerError> {
        self.0.ok_or(TrackerError::Unauthorized)
    }
}

impl FromRequest for Identity {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(Identity::from_request_headers(req)))
    }
}
