//! Actix-web request extractors
//!
//! Extractors fail with `AppError` so rejected requests get the same JSON
//! error body as every other endpoint.

use crate::jwt::JwtService;
use crate::Claims;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use derlg_core::error::AppError;
use derlg_core::models::RequesterRole;
use futures::future::{ready, Ready};
use std::sync::Arc;
use tracing::{debug, warn};

/// Extract the bearer token from the Authorization header
fn extract_token_from_request(req: &HttpRequest) -> Option<String> {
    let auth_header = req.headers().get("Authorization")?;
    let auth_str = auth_header.to_str().ok()?;
    auth_str
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn jwt_service(req: &HttpRequest) -> Result<Arc<JwtService>, AppError> {
    req.app_data::<web::Data<Arc<JwtService>>>()
        .map(|service| service.get_ref().clone())
        .ok_or_else(|| {
            warn!("JwtService not found in app data");
            AppError::Unauthenticated("Authentication service not configured".to_string())
        })
}

/// Authenticated requester
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub requester_id: String,
    pub role: RequesterRole,
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn is_operator(&self) -> bool {
        self.role.is_operator()
    }

    fn from_http(req: &HttpRequest) -> Result<Self, AppError> {
        let jwt_service = jwt_service(req)?;

        let token = extract_token_from_request(req).ok_or_else(|| {
            debug!("No authentication token found in request");
            AppError::Unauthenticated("No authentication token provided".to_string())
        })?;

        let claims = jwt_service.validate_token(&token)?;
        debug!(
            requester_id = %claims.sub,
            role = %claims.role,
            "Requester authenticated"
        );

        Ok(AuthenticatedUser {
            requester_id: claims.sub.clone(),
            role: claims.role,
            claims,
        })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(AuthenticatedUser::from_http(req))
    }
}

/// Requester if a token was sent
///
/// A missing token yields `None`; a present but invalid token is still rejected.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<AuthenticatedUser>);

impl FromRequest for OptionalUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        if extract_token_from_request(req).is_none() {
            return ready(Ok(OptionalUser(None)));
        }

        ready(AuthenticatedUser::from_http(req).map(|user| OptionalUser(Some(user))))
    }
}

/// Operator (hotel admin or super admin)
#[derive(Debug, Clone)]
pub struct OperatorUser(pub AuthenticatedUser);

impl std::ops::Deref for OperatorUser {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for OperatorUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user = match AuthenticatedUser::from_http(req) {
            Ok(user) => user,
            Err(e) => return ready(Err(e)),
        };

        if !user.is_operator() {
            warn!(
                requester_id = %user.requester_id,
                role = %user.role,
                "Requester attempted operator action without privileges"
            );
            return ready(Err(AppError::Forbidden(
                "Operator role required".to_string(),
            )));
        }

        ready(Ok(OperatorUser(user)))
    }
}
