//! src/routing.rs
use actix_web::http::Method;
use actix_web::web::ServiceConfig;
use actix_web::{web, FromRequest, Handler, Responder};

/// Register a handler so clients can use the path with or without a trailing
/// slash. The canonical registration is the trimmed path; a `path/` alternate
/// points at the same handler.
pub fn route<F, Args>(config: &mut ServiceConfig, path: &str, method: Method, handler: F)
where
    F: Handler<Args>,
    Args: FromRequest + 'static,
    F::Output: Responder + 'static,
{
    let canonical = canonical_path(path);
    if canonical == "/" {
        config.route(&canonical, web::method(method).to(handler));
        return;
    }

    let alternate = format!("{}/", canonical);
    config.route(&canonical, web::method(method.clone()).to(handler.clone()));
    config.route(&alternate, web::method(method).to(handler));
}

pub fn get<F, Args>(config: &mut ServiceConfig, path: &str, handler: F)
where
    F: Handler<Args>,
    Args: FromRequest + 'static,
    F::Output: Responder + 'static,
{
    route(config, path, Method::GET, handler);
}

pub fn post<F, Args>(config: &mut ServiceConfig, path: &str, handler: F)
where
    F: Handler<Args>,
    Args: FromRequest + 'static,
    F::Output: Responder + 'static,
{
    route(config, path, Method::POST, handler);
}

pub fn put<F, Args>(config: &mut ServiceConfig, path: &str, handler: F)
where
    F: Handler<Args>,
    Args: FromRequest + 'static,
    F::Output: Responder + 'static,
{
    route(config, path, Method::PUT, handler);
}

pub fn delete<F, Args>(config: &mut ServiceConfig, path: &str, handler: F)
where
    F: Handler<Args>,
    Args: FromRequest + 'static,
    F::Output: Responder + 'static,
{
    route(config, path, Method::DELETE, handler);
}

fn canonical_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_trimmed() {
        assert_eq!(canonical_path("/subscriptions/"), "/subscriptions");
        assert_eq!(canonical_path("/subscriptions///"), "/subscriptions");
        assert_eq!(canonical_path("/subscriptions"), "/subscriptions");
    }

    #[test]
    fn the_root_path_stays_a_single_slash() {
        assert_eq!(canonical_path("/"), "/");
        assert_eq!(canonical_path(""), "/");
    }
}
