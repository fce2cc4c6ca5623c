//! Actix-web extractors for session and admin authentication.

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpMessage, HttpRequest, HttpResponse, ResponseError, web};
use secrecy::{ExposeSecret, SecretString};
use std::future::{Ready, ready};
use uuid::Uuid;

use super::{AdminKey, SessionSecret};
use crate::config::ADMIN_KEY_HEADER;
use crate::error::ErrorResponse;

/// Authentication error for extractors.
#[derive(Debug)]
pub struct AuthError {
    message: String,
}

impl AuthError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::UNAUTHORIZED).json(ErrorResponse {
            success: false,
            error: "UNAUTHORIZED".to_string(),
            message: self.message.clone(),
        })
    }
}

/// The authenticated caller of a request.
///
/// Built from `Authorization: Bearer <session token>`. Handlers receive it
/// as an explicit parameter instead of reading ambient session state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
}

impl FromRequest for RequestContext {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = context_from_request(req);
        if let Ok(ctx) = &result {
            // Read back by the request logger.
            req.extensions_mut().insert(ctx.clone());
        }
        ready(result)
    }
}

fn context_from_request(req: &HttpRequest) -> Result<RequestContext, AuthError> {
    let secret = req
        .app_data::<web::Data<SessionSecret>>()
        .ok_or_else(|| AuthError::new("Internal configuration error"))?;

    let token: SecretString = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| SecretString::from(t.trim().to_string()))
        .ok_or_else(|| AuthError::new("Missing session token. Provide Authorization: Bearer <token>."))?;

    let claims = secret.verify(token.expose_secret()).map_err(AuthError::new)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AuthError::new("Session token subject is not a user id"))?;

    Ok(RequestContext {
        user_id,
        username: claims.username,
        role: claims.role,
    })
}

/// Extractor that requires the admin key in `X-Admin-Key`.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequest for AdminAuth {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(stored) = req.app_data::<web::Data<AdminKey>>() else {
            return ready(Err(AuthError::new("Internal configuration error")));
        };

        // Wrapped immediately so the value is zeroized with the request.
        let provided: Option<SecretString> = req
            .headers()
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| SecretString::from(s.to_string()));

        match provided {
            Some(ref key) if stored.verify(key.expose_secret()) => {
                req.extensions_mut().insert(AdminAuth);
                ready(Ok(AdminAuth))
            }
            Some(_) => ready(Err(AuthError::new("Invalid admin key"))),
            None => ready(Err(AuthError::new(
                "Missing admin key. Provide X-Admin-Key header.",
            ))),
        }
    }
}
