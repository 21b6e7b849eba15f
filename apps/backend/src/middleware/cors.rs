use actix_cors::Cors;
use actix_web::http::header;

const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:8080"];

/// Parse a comma-separated origin list, dropping empty, `null` and
/// non-http(s) entries. Falls back to the local frontend origins.
pub fn allowed_origins(raw: Option<&str>) -> Vec<String> {
    let parsed: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "null")
        .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
        .map(|s| s.trim_end_matches('/').to_owned())
        .collect();

    if parsed.is_empty() {
        DEFAULT_ORIGINS.iter().map(|s| (*s).to_owned()).collect()
    } else {
        parsed
    }
}

/// CORS policy driven by `CORS_ALLOWED_ORIGINS`.
pub fn cors_middleware() -> Cors {
    let raw = std::env::var("CORS_ALLOWED_ORIGINS").ok();

    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .supports_credentials()
        .max_age(3600);

    for origin in allowed_origins(raw.as_deref()) {
        cors = cors.allowed_origin(&origin);
    }
    cors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_local_origins() {
        assert_eq!(allowed_origins(None), DEFAULT_ORIGINS.to_vec());
        assert_eq!(allowed_origins(Some(" , null,ftp://x")), DEFAULT_ORIGINS.to_vec());
    }

    #[test]
    fn keeps_configured_origins() {
        assert_eq!(
            allowed_origins(Some("https://saucebottle.example/, http://127.0.0.1:5173")),
            vec!["https://saucebottle.example", "http://127.0.0.1:5173"]
        );
    }
}
