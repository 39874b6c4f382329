// HTTP binding of the passkey ceremonies
pub mod health;
pub mod passkey;


use actix_web::web;

pub use health::health;
pub use passkey::{
    authentication_options, method_not_allowed, registration_options, verify_authentication,
    verify_registration,
};

/// Register every route; expects `web::Data<PasskeyService>` in app data
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.app_data(passkey::json_config())
        .service(
            web::resource("/register/options")
                .route(web::post().to(registration_options))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/register/verify")
                .route(web::post().to(verify_registration))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/authenticate/options")
                .route(web::post().to(authentication_options))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/authenticate/verify")
                .route(web::post().to(verify_authentication))
                .default_service(web::to(method_not_allowed)),
        )
        // Health endpoint
        .route("/ping", web::get().to(health));
}
