use axum::http::{HeaderMap, HeaderValue};
use sha2::{Digest, Sha256};
use std::net::IpAddr;

/// Creates a truncated, salted hash of an identifier for safe logging.
///
/// # Arguments
/// * `id` - The identifier to hash (e.g., client IP, e-mail address).
/// * `salt` - A salt value from the application's configuration.
///
/// # Returns
/// A short, hexadecimal string representing the salted hash.
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    let hash = hasher.finalize();

    hex::encode(&hash[..4])
}

/// SHA-256 hex digest, used for API key storage
pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Adds security headers to HTTP responses
///
/// - Clickjacking (X-Frame-Options)
/// - MIME sniffing (X-Content-Type-Options)
/// - Script injection (Content-Security-Policy; the API never serves HTML)
/// - Referrer leakage (Referrer-Policy)
/// - Browser features (Permissions-Policy)
/// - HSTS, only when the request arrived over HTTPS
pub fn add_security_headers(headers: &mut HeaderMap, is_https: bool) {
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Permissions-Policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=(), payment=()"),
    );

    if is_https {
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
}

/// Extracts client IP address from HTTP request headers
///
/// Checks headers in order of priority:
/// 1. X-Forwarded-For (first IP in the chain, if present)
/// 2. X-Real-IP (single IP, if present)
/// 3. Falls back to provided direct IP (from connection)
///
/// X-Forwarded-For can be spoofed; the reverse proxy in front of the service
/// must overwrite it.
pub fn extract_client_ip(headers: &HeaderMap, direct_ip: Option<IpAddr>) -> String {
    if let Some(forwarded_for) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        // "client, proxy1, proxy2"
        let first_ip = forwarded_for.split(',').next().unwrap_or("").trim();
        if let Ok(ip) = first_ip.parse::<IpAddr>() {
            return ip.to_string();
        }
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return ip.to_string();
    }

    match direct_ip {
        Some(ip) => ip.to_string(),
        None => "unknown".to_string(),
    }
}

/// Lowercase, ASCII-only, hyphen-separated slug
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 200
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Pragmatic e-mail check: one `@`, non-empty local part, dotted domain,
/// no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

pub fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.chars().any(char::is_whitespace))
}

/// Check that a trimmed field has between `min` and `max` characters.
pub fn validate_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.trim().chars().count();
    if len < min {
        if min == 1 {
            return Err(format!("{} is required", field));
        }
        return Err(format!("{} must be at least {} characters", field, min));
    }
    if len > max {
        return Err(format!("{} must not exceed {} characters", field, max));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_safe_id_is_stable_and_salted() {
        let a = log_safe_id("203.0.113.7", "salt-a");
        assert_eq!(a.len(), 8);
        assert_eq!(a, log_safe_id("203.0.113.7", "salt-a"));
        assert_ne!(a, log_safe_id("203.0.113.7", "salt-b"));
    }

    #[test]
    fn test_extract_client_ip_priority() {
        let mut headers = HeaderMap::new();
        let direct: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(extract_client_ip(&headers, Some(direct)), "10.0.0.1");
        assert_eq!(extract_client_ip(&headers, None), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(extract_client_ip(&headers, Some(direct)), "198.51.100.4");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.2"),
        );
        assert_eq!(extract_client_ip(&headers, Some(direct)), "203.0.113.9");
    }

    #[test]
    fn test_extract_client_ip_ignores_garbage_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        assert_eq!(extract_client_ip(&headers, None), "unknown");
    }

    #[test]
    fn test_ipv6_has_no_brackets() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(extract_client_ip(&headers, None), "2001:db8::1");
    }

    #[test]
    fn test_security_headers() {
        let mut headers = HeaderMap::new();
        add_security_headers(&mut headers, false);
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert!(headers.get("Strict-Transport-Security").is_none());

        add_security_headers(&mut headers, true);
        assert!(headers.get("Strict-Transport-Security").is_some());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust & MySQL: 2024  "), "rust-mysql-2024");
        assert_eq!(slugify("Déjà vu"), "d-j-vu");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("my-first-post"));
        assert!(!is_valid_slug("My-Post"));
        assert!(!is_valid_slug("has space"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("a.b+tag@sub.example.org"));
        assert!(!is_valid_email("jane@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("jane doe@example.com"));
        assert!(!is_valid_email("jane@@example.com"));
    }

    #[test]
    fn test_http_url() {
        assert!(is_http_url("https://github.com/me/repo"));
        assert!(is_http_url("http://localhost:3000"));
        assert!(!is_http_url("javascript:alert(1)"));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("ftp://example.com"));
    }

    #[test]
    fn test_validate_length() {
        assert!(validate_length("title", "Hello", 1, 200).is_ok());
        assert_eq!(
            validate_length("title", "   ", 1, 200).unwrap_err(),
            "title is required"
        );
        assert!(validate_length("message", "short", 10, 5000).is_err());
        assert!(validate_length("name", &"x".repeat(101), 1, 100).is_err());
    }
}
