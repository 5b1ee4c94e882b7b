/// CORS for the dashboard frontend: any origin, JSON bodies, the methods the
/// API actually exposes.
pub fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_headers(vec![
            "Origin",
            "Accept",
            "Content-Type",
            "Content-Length",
            "Access-Control-Request-Method",
            "Access-Control-Request-Headers",
        ])
        .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
}
