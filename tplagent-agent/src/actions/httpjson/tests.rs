use super::*;

fn env_for(template: &str) -> ActionEnv {
    ActionEnv::for_template(template)
}

#[test]
fn test_decode_config_from_payload() {
    let payload: RawPayload = serde_json::from_str(
        r#"{
            "base_url": "http://localhost:9000",
            "timeout": "5s",
            "headers": {"X-Env": "prod"},
            "error_statuses": [500, 502],
            "auth": {"bearer_token": "tok"}
        }"#,
    )
    .unwrap();

    let conf: Config = payload.decode().unwrap();
    assert_eq!(conf.base_url, "http://localhost:9000");
    assert_eq!(conf.timeout, Some(Duration::from_secs(5)));
    assert_eq!(conf.headers["X-Env"], "prod");
    assert_eq!(conf.error_statuses, vec![500, 502]);
    assert_eq!(conf.auth.unwrap().bearer_token.as_deref(), Some("tok"));
}

#[test]
fn test_env_overrides_base_url_and_timeout() {
    std::env::set_var("TPLA_OVR1_HTTPJSON_BASE_URL", "http://override:1234");
    std::env::set_var("TPLA_OVR1_HTTPJSON_TIMEOUT", "2s");

    let mut conf = Config {
        base_url: "http://original:80".to_string(),
        ..Config::default()
    };
    override_from_env(&env_for("ovr1"), &mut conf).unwrap();

    assert_eq!(conf.base_url, "http://override:1234");
    assert_eq!(conf.timeout, Some(Duration::from_secs(2)));

    std::env::remove_var("TPLA_OVR1_HTTPJSON_BASE_URL");
    std::env::remove_var("TPLA_OVR1_HTTPJSON_TIMEOUT");
}

#[test]
fn test_env_overrides_headers_and_statuses() {
    std::env::set_var("TPLA_OVR2_HTTPJSON_HEADERS", "X-A: 1; X-B: 2");
    std::env::set_var("TPLA_OVR2_HTTPJSON_ERROR_STATUSES", "500;503");

    let mut conf = Config::default();
    override_from_env(&env_for("ovr2"), &mut conf).unwrap();

    assert_eq!(conf.headers["X-A"], "1");
    assert_eq!(conf.headers["X-B"], "2");
    assert_eq!(conf.error_statuses, vec![500, 503]);

    std::env::remove_var("TPLA_OVR2_HTTPJSON_HEADERS");
    std::env::remove_var("TPLA_OVR2_HTTPJSON_ERROR_STATUSES");
}

#[test]
fn test_env_override_bad_status_errors() {
    std::env::set_var("TPLA_OVR3_HTTPJSON_ERROR_STATUSES", "50x");
    let mut conf = Config::default();
    let err = override_from_env(&env_for("ovr3"), &mut conf).unwrap_err();
    assert!(err.to_string().contains("HTTPJSON_ERROR_STATUSES"));
    std::env::remove_var("TPLA_OVR3_HTTPJSON_ERROR_STATUSES");
}

#[test]
fn test_env_override_basic_auth_creates_auth() {
    std::env::set_var("TPLA_OVR6_HTTPJSON_AUTH_USER", "svc-user");
    std::env::set_var("TPLA_OVR6_HTTPJSON_AUTH_PASS", "svc-pass");

    // no auth block in the decoded config; the override must still apply
    let mut conf = Config::default();
    override_from_env(&env_for("ovr6"), &mut conf).unwrap();

    let auth = conf.auth.unwrap();
    assert_eq!(auth.basic_auth["username"], "svc-user");
    assert_eq!(auth.basic_auth["password"], "svc-pass");

    std::env::remove_var("TPLA_OVR6_HTTPJSON_AUTH_USER");
    std::env::remove_var("TPLA_OVR6_HTTPJSON_AUTH_PASS");
}

#[test]
fn test_env_override_bearer_token_creates_auth() {
    std::env::set_var("TPLA_OVR4_HTTPJSON_AUTH_TOKEN", "secret");
    let mut conf = Config::default();
    override_from_env(&env_for("ovr4"), &mut conf).unwrap();
    assert_eq!(
        conf.auth.unwrap().bearer_token.as_deref(),
        Some("secret")
    );
    std::env::remove_var("TPLA_OVR4_HTTPJSON_AUTH_TOKEN");
}

#[test]
fn test_full_url_joins_and_bypasses() {
    let action = HttpJson {
        conf: Config {
            base_url: "http://localhost:9000/api/".to_string(),
            ..Config::default()
        },
        client: Mutex::new(None),
        span: Span::none(),
    };

    assert_eq!(action.full_url("/status"), "http://localhost:9000/api/status");
    assert_eq!(action.full_url("status"), "http://localhost:9000/api/status");
    assert_eq!(
        action.full_url("https://elsewhere/x"),
        "https://elsewhere/x"
    );
}
