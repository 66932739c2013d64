pub mod auth;
pub mod client;
pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod polling;
pub mod routes;
pub mod service;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;

use crate::db::stage_db;
use crate::middleware::RequestLogger;
use crate::middleware::rate_limit::RateLimiter;
use crate::routes as app_routes;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `log_level`, e.g.
///   RUST_LOG=centro_virtual::polling=debug     - poller ticks
///   RUST_LOG=info,centro_virtual::routes=debug - global info, routes at debug
///   RUST_LOG=notifier=debug                    - desktop notifications
/// Calling it again keeps the first subscriber.
pub fn init_tracing(log_level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    let installed = if json_format { subscriber.json().try_init() } else { subscriber.try_init() };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

fn ensure_rocket_secret_key() {
    let profile = std::env::var("ROCKET_PROFILE").unwrap_or_else(|_| "debug".to_string());

    // Only enforce ROCKET_SECRET_KEY requirement for non-debug profiles
    if profile != "debug" && std::env::var("ROCKET_SECRET_KEY").is_err() {
        panic!(
            "ROCKET_SECRET_KEY is required for profile '{}'. Generate one with: openssl rand -base64 32",
            profile
        );
    }
}

fn build_cors(cors_config: &config::CorsConfig) -> CorsOptions {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    // Validate that wildcard origins are not combined with credentials
    if is_wildcard && cors_config.allow_credentials {
        panic!(
            "Invalid CORS configuration: Cannot use wildcard origins (*) with credentials enabled. \
            Either set specific origins or disable credentials."
        );
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Patch,
            Method::Options,
            Method::Head,
        ]
        .into_iter()
        .map(From::from)
        .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Accept", middleware::REQUEST_ID_HEADER, auth::REQUESTER_TOKEN_HEADER]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
}

fn get_swagger_config(openapi_url: &str) -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: openapi_url.to_string(),
        ..Default::default()
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return config::DEFAULT_API_BASE_PATH.to_string();
    }

    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }

    normalized
}

fn join_base_path(base_path: &str, path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    let suffix = path.trim_start_matches('/');

    if base.is_empty() {
        format!("/{}", suffix)
    } else {
        format!("{}/{}", base, suffix)
    }
}

fn collect_base_paths(api_config: &config::ApiConfig) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    let mut push_unique = |path: String| {
        if !normalized.contains(&path) {
            normalized.push(path);
        }
    };

    push_unique(normalize_base_path(&api_config.base_path));

    for extra in &api_config.additional_base_paths {
        let normalized_extra = normalize_base_path(extra);
        if !normalized_extra.is_empty() {
            push_unique(normalized_extra);
        }
    }

    normalized
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: rocket_okapi::okapi::openapi3::OpenApi,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (session_routes, session_openapi) = app_routes::session::routes();
    let (message_routes, message_openapi) = app_routes::message::routes();
    let (volunteer_routes, volunteer_openapi) = app_routes::volunteer::routes();
    let (survey_routes, survey_openapi) = app_routes::survey::routes();
    let (topic_routes, topic_openapi) = app_routes::topic::routes();
    let (health_routes, health_openapi) = app_routes::health::routes();

    vec![
        RouteSpec {
            path: "/sessions",
            routes: session_routes,
            openapi: session_openapi,
        },
        RouteSpec {
            path: "/sessions",
            routes: message_routes,
            openapi: message_openapi,
        },
        RouteSpec {
            path: "/volunteers",
            routes: volunteer_routes,
            openapi: volunteer_openapi,
        },
        RouteSpec {
            path: "/surveys",
            routes: survey_routes,
            openapi: survey_openapi,
        },
        RouteSpec {
            path: "/topics",
            routes: topic_routes,
            openapi: topic_openapi,
        },
        RouteSpec {
            path: "/health",
            routes: health_routes,
            openapi: health_openapi,
        },
    ]
}

fn mount_api_routes(mut rocket: Rocket<Build>, base_path: &str, enable_swagger: bool) -> Rocket<Build> {
    let route_specs = collect_route_specs();

    if enable_swagger {
        let mut openapi_list = Vec::new();
        for spec in route_specs {
            rocket = rocket.mount(format!("{}{}", base_path, spec.path), spec.routes);
            openapi_list.push((spec.path, spec.openapi));
        }

        let openapi_docs = match marge_spec_list(&openapi_list) {
            Ok(docs) => docs,
            Err(err) => panic!("Could not merge OpenAPI spec: {}", err),
        };

        let settings = rocket_okapi::settings::OpenApiSettings::default();
        rocket = rocket.mount(base_path, vec![get_openapi_route(openapi_docs, &settings)]);

        let docs_path = join_base_path(base_path, "docs");
        let openapi_url = join_base_path(base_path, "openapi.json");
        rocket = rocket.mount(docs_path, make_swagger_ui(&get_swagger_config(&openapi_url)));
    } else {
        for spec in route_specs {
            rocket = rocket.mount(format!("{}{}", base_path, spec.path), spec.routes);
        }
    }

    rocket
}

fn stage_rate_limiter(rate_limit_config: config::RateLimitConfig) -> AdHoc {
    AdHoc::on_ignite("Rate Limiter", move |rocket| {
        let limiter = Arc::new(RateLimiter::new(rate_limit_config.clone()));
        limiter.clone().spawn_sweeper();

        Box::pin(async move { rocket.manage(limiter) })
    })
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);
    ensure_rocket_secret_key();

    let cors = build_cors(&config.cors).to_cors().expect("Failed to create CORS fairing");

    let base_paths = collect_base_paths(&config.api);

    let figment = rocket::Config::figment()
        .merge(("address", config.server.address.as_str()))
        .merge(("port", config.server.port));

    let mut rocket = rocket::custom(figment)
        .attach(stage_rate_limiter(config.rate_limit.clone()))
        .attach(cors)
        .attach(RequestLogger)
        .attach(stage_db(config.database));

    let (primary_base_path, additional_base_paths) = base_paths.split_first().expect("API base paths must include at least one entry");
    let enable_swagger = config.api.enable_swagger;
    rocket = mount_api_routes(rocket, primary_base_path, enable_swagger);

    rocket = rocket.register(
        primary_base_path.as_str(),
        catchers![app_routes::error::not_found, app_routes::error::conflict, app_routes::error::too_many_requests],
    );

    for base_path in additional_base_paths {
        rocket = mount_api_routes(rocket, base_path, enable_swagger);

        rocket = rocket.register(
            base_path.as_str(),
            catchers![app_routes::error::not_found, app_routes::error::conflict, app_routes::error::too_many_requests],
        );
    }

    rocket
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_path_is_normalized() {
        assert_eq!(normalize_base_path(""), "/api");
        assert_eq!(normalize_base_path("  "), "/api");
        assert_eq!(normalize_base_path("v1/"), "/v1");
        assert_eq!(normalize_base_path("/centro//"), "/centro");
        assert_eq!(normalize_base_path("/"), "/");
    }

    #[test]
    fn join_handles_root_and_nested_bases() {
        assert_eq!(join_base_path("/", "docs"), "/docs");
        assert_eq!(join_base_path("/api", "/openapi.json"), "/api/openapi.json");
    }

    #[test]
    fn additional_base_paths_are_deduplicated() {
        let api = config::ApiConfig {
            base_path: "/api/".to_string(),
            additional_base_paths: vec!["api".to_string(), "/legacy".to_string()],
            enable_swagger: false,
        };
        assert_eq!(collect_base_paths(&api), vec!["/api".to_string(), "/legacy".to_string()]);
    }

    #[test]
    #[should_panic(expected = "wildcard origins")]
    fn wildcard_cors_with_credentials_is_rejected() {
        let cors = config::CorsConfig {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
        };
        build_cors(&cors);
    }

    #[test]
    fn every_resource_is_mounted() {
        let paths: Vec<&str> = collect_route_specs().iter().map(|spec| spec.path).collect();
        for expected in ["/sessions", "/volunteers", "/surveys", "/topics", "/health"] {
            assert!(paths.contains(&expected), "{} missing", expected);
        }
    }
}
