//! Translation of external HTTP/transport errors into [`FailureReason`].
//!
//! Every provider client funnels its failures through here so that no
//! reqwest or provider error type crosses the client trait boundary.

use reqwest::StatusCode;

use crate::domain::{FailureCategory, FailureReason, ProviderId};

const BODY_PREVIEW_LEN: usize = 500;

/// Classify a non-success HTTP response.
pub(crate) fn classify_http(
    provider: ProviderId,
    status: StatusCode,
    body: &str,
) -> FailureReason {
    let category = match status.as_u16() {
        401 | 403 => FailureCategory::AuthenticationError,
        402 => FailureCategory::CreditLimitExceeded,
        408 => FailureCategory::NetworkTimeout,
        429 => FailureCategory::RateLimitExceeded,
        400 => {
            if body_indicates_schema_issue(body) {
                FailureCategory::ParsingError
            } else {
                FailureCategory::ConfigurationError
            }
        }
        500..=599 => FailureCategory::Unknown,
        _ => FailureCategory::Unknown,
    };

    let description = match category {
        FailureCategory::AuthenticationError => {
            format!("Authentication with {} failed", provider)
        }
        FailureCategory::CreditLimitExceeded => {
            format!("{} account is out of credits", provider)
        }
        FailureCategory::NetworkTimeout => format!("{} request timed out", provider),
        FailureCategory::RateLimitExceeded => format!("{} rate limit exceeded", provider),
        FailureCategory::ParsingError => {
            format!("{} rejected the structured-output request", provider)
        }
        FailureCategory::ConfigurationError => format!("{} rejected the request", provider),
        _ => format!("{} returned HTTP {}", provider, status.as_u16()),
    };

    FailureReason::new(
        category,
        description,
        format!(
            "provider: {}\nstatus: {}\nbody: {}",
            provider,
            status,
            truncate(body, BODY_PREVIEW_LEN)
        ),
    )
}

/// Classify a transport-level reqwest error (no HTTP response received).
pub(crate) fn classify_transport(provider: ProviderId, err: &reqwest::Error) -> FailureReason {
    if err.is_timeout() || err.is_connect() {
        FailureReason::new(
            FailureCategory::NetworkTimeout,
            format!("{} request timed out", provider),
            format!("provider: {}\ntransport error: {}", provider, err),
        )
    } else {
        FailureReason::new(
            FailureCategory::Unknown,
            format!("{} request failed", provider),
            format!("provider: {}\ntransport error: {}", provider, err),
        )
    }
}

/// Classify a response body that could not be decoded as the provider's
/// wire format.
pub(crate) fn malformed_body(provider: ProviderId, err: &serde_json::Error, body: &str) -> FailureReason {
    FailureReason::new(
        FailureCategory::Unknown,
        format!("{} returned an unrecognized response", provider),
        format!(
            "provider: {}\ndecode error: {}\nbody: {}",
            provider,
            err,
            truncate(body, BODY_PREVIEW_LEN)
        ),
    )
}

/// Map a terminal finish reason to a failure, when it signals one.
///
/// `content_filter` is the provider-side safety block; an explicit refusal
/// text is the model declining; `length` with no content means the token
/// budget was consumed before any output.
pub(crate) fn classify_finish(
    provider: ProviderId,
    finish_reason: Option<&str>,
    refusal: Option<&str>,
    content: &str,
) -> Option<FailureReason> {
    if let Some(refusal) = refusal {
        if !refusal.trim().is_empty() {
            return Some(FailureReason::new(
                FailureCategory::ModelRefusal,
                "Model refused to answer",
                format!("provider: {}\nrefusal: {}", provider, truncate(refusal, BODY_PREVIEW_LEN)),
            ));
        }
    }

    match finish_reason {
        Some("content_filter") => Some(FailureReason::new(
            FailureCategory::ContentGuardrail,
            "Response blocked by provider content guardrail",
            format!("provider: {}\nfinish_reason: content_filter", provider),
        )),
        Some(reason @ ("length" | "max_tokens")) if content.trim().is_empty() => {
            Some(FailureReason::new(
                FailureCategory::TokenLimitExceeded,
                "Token limit exhausted before any output",
                format!("provider: {}\nfinish_reason: {}", provider, reason),
            ))
        }
        _ => None,
    }
}

fn body_indicates_schema_issue(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["schema", "json", "response_format", "structured"]
        .iter()
        .any(|needle| lower.contains(needle))
}

pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let reason = classify_http(ProviderId::OpenAi, status, "{}");
            assert_eq!(reason.category, FailureCategory::AuthenticationError);
            assert!(!reason.recoverable);
        }
    }

    #[test]
    fn test_credit_limit() {
        let reason = classify_http(ProviderId::OpenRouter, StatusCode::PAYMENT_REQUIRED, "{}");
        assert_eq!(reason.category, FailureCategory::CreditLimitExceeded);
        assert!(!reason.recoverable);
    }

    #[test]
    fn test_rate_limit_recoverable() {
        let reason = classify_http(ProviderId::Anthropic, StatusCode::TOO_MANY_REQUESTS, "{}");
        assert_eq!(reason.category, FailureCategory::RateLimitExceeded);
        assert!(reason.recoverable);
    }

    #[test]
    fn test_bad_request_schema_vs_config() {
        let schema = classify_http(
            ProviderId::OpenAi,
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"Invalid response_format schema"}}"#,
        );
        assert_eq!(schema.category, FailureCategory::ParsingError);

        let config = classify_http(
            ProviderId::OpenAi,
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"Unknown model"}}"#,
        );
        assert_eq!(config.category, FailureCategory::ConfigurationError);
        assert!(!config.recoverable);
    }

    #[test]
    fn test_server_errors_unknown_recoverable() {
        let reason = classify_http(ProviderId::LiteLlm, StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(reason.category, FailureCategory::Unknown);
        assert!(reason.recoverable);
    }

    #[test]
    fn test_finish_reason_guardrail() {
        let reason =
            classify_finish(ProviderId::OpenAi, Some("content_filter"), None, "").unwrap();
        assert_eq!(reason.category, FailureCategory::ContentGuardrail);
        assert!(!reason.recoverable);
    }

    #[test]
    fn test_finish_reason_refusal() {
        let reason =
            classify_finish(ProviderId::OpenAi, Some("stop"), Some("I cannot help"), "").unwrap();
        assert_eq!(reason.category, FailureCategory::ModelRefusal);
    }

    #[test]
    fn test_finish_reason_token_limit_only_when_empty() {
        let empty = classify_finish(ProviderId::Anthropic, Some("max_tokens"), None, "");
        assert_eq!(
            empty.unwrap().category,
            FailureCategory::TokenLimitExceeded
        );

        // Truncated-but-present content is left for the parser to judge.
        let partial = classify_finish(ProviderId::Anthropic, Some("max_tokens"), None, "{\"ans");
        assert!(partial.is_none());
    }

    #[test]
    fn test_normal_finish_is_not_a_failure() {
        assert!(classify_finish(ProviderId::OpenAi, Some("stop"), None, "4").is_none());
        assert!(classify_finish(ProviderId::Anthropic, Some("end_turn"), None, "4").is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let truncated = truncate(s, 3);
        assert!(truncated.ends_with("..."));
    }
}
