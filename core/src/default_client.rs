use reqwest::header::HeaderValue;

pub const DEFAULT_ORIGINATOR: &str = "quill_rs";

pub fn get_quill_user_agent() -> String {
    let build_version = env!("CARGO_PKG_VERSION");
    let candidate = format!(
        "{DEFAULT_ORIGINATOR}/{build_version} ({} {})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    sanitize_user_agent(candidate)
}

/// Invalid header characters are replaced with an underscore; a user agent
/// that still fails to parse falls back to the bare originator.
fn sanitize_user_agent(candidate: String) -> String {
    if HeaderValue::from_str(candidate.as_str()).is_ok() {
        return candidate;
    }

    let sanitized: String = candidate
        .chars()
        .map(|ch| if matches!(ch, ' '..='~') { ch } else { '_' })
        .collect();
    if HeaderValue::from_str(sanitized.as_str()).is_ok() {
        sanitized
    } else {
        DEFAULT_ORIGINATOR.to_string()
    }
}

/// Create an HTTP client with the default `User-Agent` header set.
pub fn create_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(get_quill_user_agent())
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
