//! Passkey request handlers
//!
//! Validates request bodies and delegates to [`PasskeyService`]. Missing
//! fields are a 400 before the service is called; every service failure is a
//! 500 carrying the error kind and message.

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::passkey::{CeremonyResponse, PasskeyError, PasskeyService};
use crate::webauthn::user_handle_uuid;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptionsBody {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct VerifyRegistrationBody {
    pub username: Option<String>,
    pub credential: Option<Value>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AuthenticationOptionsBody {
    pub username: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct VerifyAuthenticationBody {
    pub username: Option<String>,
    pub credential: Option<Value>,
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "error": "bad_request",
        "message": message
    }))
}

/// Convert `PasskeyError` to HTTP response
fn error_to_response(error: &PasskeyError) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({
        "error": error.kind(),
        "message": error.to_string()
    }))
}

/// Take a required, non-blank string field
fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, HttpResponse> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(bad_request(&format!("Missing required field: {name}"))),
    }
}

/// Blank usernames select the discoverable flow
fn optional(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// JSON extractor config returning the same error shape as the handlers
#[must_use]
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        let response = bad_request(&format!("Invalid JSON body: {err}"));
        InternalError::from_response(err, response).into()
    })
}

/// Any non-POST method on a ceremony path
///
/// # Errors
///
/// This handler never fails
pub async fn method_not_allowed() -> Result<HttpResponse> {
    Ok(HttpResponse::MethodNotAllowed()
        .insert_header((header::ALLOW, "POST"))
        .json(json!({
            "error": "method_not_allowed",
            "message": "Only POST is supported on this endpoint"
        })))
}

/// POST /register/options
///
/// # Errors
///
/// Failures are rendered as responses; the `Result` is for extractor errors
pub async fn registration_options(
    service: web::Data<PasskeyService>,
    body: web::Json<RegistrationOptionsBody>,
) -> Result<HttpResponse> {
    let username = match required(body.username.as_deref(), "username") {
        Ok(v) => v,
        Err(response) => return Ok(response),
    };
    let display_name = match required(body.display_name.as_deref(), "displayName") {
        Ok(v) => v,
        Err(response) => return Ok(response),
    };

    let user_id = optional(body.user_id.as_deref());
    if let Some(id) = user_id {
        if user_handle_uuid(id).is_err() {
            return Ok(bad_request(
                "userId must be a base64url-encoded 16-byte user handle",
            ));
        }
    }

    match service
        .generate_registration_options(username, display_name, user_id)
        .await
    {
        Ok(options) => Ok(HttpResponse::Ok().json(options)),
        Err(e) => Ok(error_to_response(&e)),
    }
}

/// POST /register/verify
///
/// # Errors
///
/// Failures are rendered as responses; the `Result` is for extractor errors
pub async fn verify_registration(
    service: web::Data<PasskeyService>,
    body: web::Json<VerifyRegistrationBody>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let username = match required(body.username.as_deref(), "username") {
        Ok(v) => v.to_string(),
        Err(response) => return Ok(response),
    };
    let Some(credential) = body.credential.filter(|c| !c.is_null()) else {
        return Ok(bad_request("Missing required field: credential"));
    };

    match service
        .verify_registration(&username, &CeremonyResponse::new(credential))
        .await
    {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e) => Ok(error_to_response(&e)),
    }
}

/// POST /authenticate/options
///
/// # Errors
///
/// Failures are rendered as responses; the `Result` is for extractor errors
pub async fn authentication_options(
    service: web::Data<PasskeyService>,
    body: Option<web::Json<AuthenticationOptionsBody>>,
) -> Result<HttpResponse> {
    // An empty body is a discoverable request
    let body = body.map(web::Json::into_inner).unwrap_or_default();

    match service
        .generate_authentication_options(optional(body.username.as_deref()))
        .await
    {
        Ok(options) => Ok(HttpResponse::Ok().json(options)),
        Err(e) => Ok(error_to_response(&e)),
    }
}

/// POST /authenticate/verify
///
/// # Errors
///
/// Failures are rendered as responses; the `Result` is for extractor errors
pub async fn verify_authentication(
    service: web::Data<PasskeyService>,
    body: web::Json<VerifyAuthenticationBody>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let Some(credential) = body.credential.filter(|c| !c.is_null()) else {
        return Ok(bad_request("Missing required field: credential"));
    };

    match service
        .verify_authentication(
            optional(body.username.as_deref()),
            &CeremonyResponse::new(credential),
        )
        .await
    {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e) => Ok(error_to_response(&e)),
    }
}
