//! Bearer-token passthrough.
//!
//! Authentication itself is an external collaborator's job: whatever sits
//! in front of the gateway validates tokens and forwards the resolved
//! user id. This layer only carries that id into the request extensions
//! so handlers can attribute logs to it. No policy is enforced here.

use axum::{extract::Request, http::header, middleware::Next, response::Response};
use llm::AuthenticatedUser;

/// Header the fronting auth layer uses to forward the resolved user id.
const AUTHENTICATED_USER_HEADER: &str = "x-authenticated-user";

pub(crate) async fn authenticate(mut request: Request, next: Next) -> Response {
    let user_id = request
        .headers()
        .get(AUTHENTICATED_USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| bearer_fingerprint(&request));

    if let Some(user_id) = user_id {
        request.extensions_mut().insert(AuthenticatedUser(user_id));
    }

    next.run(request).await
}

/// Without a forwarded id, fall back to a short stable fingerprint of the
/// bearer token for log attribution. The token itself never leaves this
/// function.
fn bearer_fingerprint(request: &Request) -> Option<String> {
    let authorization = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = authorization.strip_prefix("Bearer ")?;

    if token.is_empty() {
        return None;
    }

    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }

    Some(format!("token-{hash:016x}"))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request_with_header(name: &str, value: &str) -> Request {
        Request::builder().header(name, value).body(Body::empty()).unwrap()
    }

    #[test]
    fn fingerprint_is_stable_and_opaque() {
        let first = bearer_fingerprint(&request_with_header("authorization", "Bearer secret-token"));
        let second = bearer_fingerprint(&request_with_header("authorization", "Bearer secret-token"));
        let other = bearer_fingerprint(&request_with_header("authorization", "Bearer other-token"));

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert!(!first.unwrap().contains("secret"));
    }

    #[test]
    fn missing_or_malformed_tokens_yield_no_identity() {
        assert_eq!(bearer_fingerprint(&request_with_header("authorization", "Basic abc")), None);
        assert_eq!(bearer_fingerprint(&request_with_header("authorization", "Bearer ")), None);
        assert_eq!(bearer_fingerprint(&Request::builder().body(Body::empty()).unwrap()), None);
    }
}
