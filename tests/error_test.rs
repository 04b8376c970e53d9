use greengate::{GatewayError, Result};

#[test]
fn test_error_display() {
    let err = GatewayError::NoProviderAvailable {
        model: "gpt-5".to_string(),
    };
    assert!(err.to_string().contains("gpt-5"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(GatewayError::EmptyResponse)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(GatewayError::Transport("connection reset".into()).is_transient());
    for status in [500, 502, 503, 504] {
        assert!(
            GatewayError::Upstream {
                status,
                body: String::new()
            }
            .is_transient(),
            "{status} should be transient"
        );
    }
}

#[test]
fn permanent_errors() {
    for status in [400, 401, 403, 404, 429] {
        assert!(
            !GatewayError::Upstream {
                status,
                body: String::new()
            }
            .is_transient(),
            "{status} should be permanent"
        );
    }
    assert!(!GatewayError::Validation("bad".into()).is_transient());
    assert!(!GatewayError::UpstreamUnreachable("gone".into()).is_transient());
    assert!(!GatewayError::RateLimitExceeded.is_transient());
}

// ============================================================================
// Status mapping
// ============================================================================

#[test]
fn status_codes() {
    assert_eq!(GatewayError::Validation("x".into()).status_code(), 400);
    assert_eq!(GatewayError::Configuration("x".into()).status_code(), 400);
    assert_eq!(GatewayError::Unauthorized.status_code(), 401);
    assert_eq!(GatewayError::RateLimitExceeded.status_code(), 429);
    assert_eq!(
        GatewayError::NoProviderAvailable { model: "m".into() }.status_code(),
        503
    );
    assert_eq!(GatewayError::UpstreamUnreachable("x".into()).status_code(), 502);
    assert_eq!(GatewayError::Ledger("x".into()).status_code(), 500);
}

#[test]
fn upstream_status_and_body_pass_through() {
    let err = GatewayError::Upstream {
        status: 418,
        body: "{\"error\":\"teapot\"}".into(),
    };
    assert_eq!(err.status_code(), 418);
    assert_eq!(err.detail(), "{\"error\":\"teapot\"}");
}
