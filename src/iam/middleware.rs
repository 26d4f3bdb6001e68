// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::web::Data;
use actix_web::{Error, HttpMessage, HttpRequest};
use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::rc::Rc; // Services are per-thread
use std::sync::Arc;

use super::{TokenVerifier, User};

/// Trait to add authentication methods to HttpRequest
pub trait AuthRequest {
    fn user_info(&self) -> Option<User>;
    fn has_role(&self, role: &str) -> bool;
    fn is_authenticated(&self) -> bool;
}

impl AuthRequest for HttpRequest {
    fn user_info(&self) -> Option<User> {
        self.extensions().get::<User>().cloned()
    }

    fn has_role(&self, role: &str) -> bool {
        self.user_info()
            .map(|info| info.roles.iter().any(|r| r == role))
            .unwrap_or(false)
    }

    fn is_authenticated(&self) -> bool {
        self.user_info().is_some()
    }
}

// Bearer-token authentication middleware. Resolution failures are not
// errors here: the request simply proceeds unauthenticated and handlers
// decide what that means.
pub struct TokenAuthMiddlewareFactory;

impl<S, B> Transform<S, ServiceRequest> for TokenAuthMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TokenAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TokenAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct TokenAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for TokenAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let verifier = req.app_data::<Data<Arc<dyn TokenVerifier>>>().cloned();
        let service = self.service.clone();

        Box::pin(async move {
            if let Some(verifier) = verifier {
                if let Some(token) = bearer_token(req.request()) {
                    match verifier.verify(&token) {
                        Some(user) => {
                            log::trace!("Authenticated request for user {}", user.id);
                            req.extensions_mut().insert(user);
                        }
                        None => {
                            log::debug!("Rejected unknown bearer token");
                        }
                    }
                }
            }
            service.call(req).await
        })
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::iam::StaticTokenVerifier;
    use actix_web::{test, web, App, HttpResponse};

    async fn whoami(req: HttpRequest) -> HttpResponse {
        match req.user_info() {
            Some(user) => HttpResponse::Ok().body(user.id),
            None => HttpResponse::Unauthorized().finish(),
        }
    }

    fn verifier() -> Data<Arc<dyn TokenVerifier>> {
        let verifier: Arc<dyn TokenVerifier> =
            Arc::new(StaticTokenVerifier::from_config(&test_config().users));
        Data::new(verifier)
    }

    #[actix_web::test]
    async fn valid_bearer_token_resolves_user() {
        let app = test::init_service(
            App::new()
                .app_data(verifier())
                .wrap(TokenAuthMiddlewareFactory)
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", "Bearer alice-token"))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body.as_ref(), b"alice");
    }

    #[actix_web::test]
    async fn missing_or_bad_token_stays_unauthenticated() {
        let app = test::init_service(
            App::new()
                .app_data(verifier())
                .wrap(TokenAuthMiddlewareFactory)
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::get().uri("/whoami").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), actix_web::http::StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", "Bearer nope"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }
}
