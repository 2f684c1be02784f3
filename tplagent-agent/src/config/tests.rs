use super::duration::{format_duration, parse_duration};
use super::*;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_parse_duration() {
    assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
    assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
    assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
    assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
    assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    assert_eq!(parse_duration(" 2s ").unwrap(), Duration::from_secs(2));
}

#[test]
fn test_parse_duration_rejects_garbage() {
    assert!(parse_duration("").is_err());
    assert!(parse_duration("abc").is_err());
    assert!(parse_duration("10x").is_err());
    assert!(parse_duration("s10").is_err());
}

#[test]
fn test_format_duration() {
    assert_eq!(format_duration(&Duration::from_secs(10)), "10s");
    assert_eq!(format_duration(&Duration::from_secs(90)), "90s");
    assert_eq!(format_duration(&Duration::from_secs(120)), "2m");
    assert_eq!(format_duration(&Duration::from_millis(250)), "250ms");
    assert_eq!(format_duration(&Duration::ZERO), "0s");
}

fn minimal_template() -> TemplateSpec {
    TemplateSpec {
        actions: Vec::new(),
        template_delimiters: None,
        source: None,
        raw: Some("hello".to_string()),
        destination: "/tmp/out".to_string(),
        html: false,
        static_data: serde_json::Value::Null,
        refresh_interval: Duration::from_secs(1),
        refresh_on_trigger: false,
        render_once: false,
        missing_key: MissingKeyPolicy::EngineDefault,
        exec: None,
    }
}

fn config_with(name: &str, spec: TemplateSpec) -> AgentConfig {
    let mut templates = BTreeMap::new();
    templates.insert(name.to_string(), spec);
    AgentConfig {
        agent: AgentSpec {
            log_level: LogLevel::Info,
            log_fmt: LogFmt::Text,
            max_consecutive_failures: 0,
            http_listener_addr: None,
        },
        templates,
    }
}

#[test]
fn test_validate_accepts_minimal_config() {
    let config = config_with("my-template_1", minimal_template());
    assert!(validate(&config).is_ok());
}

#[test]
fn test_validate_rejects_bad_template_name() {
    let config = config_with("bad name!", minimal_template());
    let err = validate(&config).unwrap_err();
    assert!(err.to_string().contains("invalid template name"));
    assert!(err.is_fatal());
}

#[test]
fn test_validate_rejects_short_interval() {
    let mut spec = minimal_template();
    spec.refresh_interval = Duration::from_millis(500);
    let err = validate(&config_with("t", spec)).unwrap_err();
    assert!(err.to_string().contains("refresh_interval"));
}

#[test]
fn test_validate_allows_zero_interval() {
    let mut spec = minimal_template();
    spec.refresh_interval = Duration::ZERO;
    assert!(validate(&config_with("t", spec)).is_ok());
}

#[test]
fn test_validate_requires_exactly_one_source() {
    let mut both = minimal_template();
    both.source = Some("/some/path".to_string());
    let err = validate(&config_with("t", both)).unwrap_err();
    assert!(err.to_string().contains("exactly one of raw or source"));

    let mut neither = minimal_template();
    neither.raw = None;
    let err = validate(&config_with("t", neither)).unwrap_err();
    assert!(err.to_string().contains("exactly one of raw or source"));
}

#[test]
fn test_validate_rejects_one_sided_delimiters() {
    let mut spec = minimal_template();
    spec.template_delimiters = Some(vec!["<<".to_string()]);
    let err = validate(&config_with("t", spec)).unwrap_err();
    assert!(err.to_string().contains("template_delimiters"));
}

#[test]
fn test_validate_rejects_empty_action_name() {
    let mut spec = minimal_template();
    spec.actions = vec![ActionConfig {
        name: String::new(),
        config: RawPayload::default(),
    }];
    let err = validate(&config_with("t", spec)).unwrap_err();
    assert!(err.to_string().contains("name cannot be empty"));
}

#[test]
fn test_validate_collects_all_issues() {
    let mut spec = minimal_template();
    spec.refresh_interval = Duration::from_millis(10);
    spec.template_delimiters = Some(vec![]);
    let err = validate(&config_with("t", spec)).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("refresh_interval"));
    assert!(msg.contains("template_delimiters"));
}

const JSON_CONFIG: &str = r#"{
  "agent": {
    "log_level": "DEBUG",
    "log_fmt": "json",
    "max_consecutive_failures": 5,
    "http_listener_addr": "127.0.0.1:5500"
  },
  "templates": {
    "nginx-conf": {
      "raw": "server {{ port }}",
      "destination": "/tmp/nginx.conf",
      "refresh_interval": "10s",
      "missing_key": "error",
      "static_data": {"port": 8080},
      "actions": [
        {"name": "httpjson", "config": {"base_url": "http://localhost:9000"}}
      ],
      "exec": {"cmd": "nginx", "cmd_args": ["-s", "reload"], "cmd_timeout": "5s"}
    }
  }
}"#;

#[test]
fn test_read_json_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, JSON_CONFIG).unwrap();

    let config = read_from_file(&path).unwrap();
    assert_eq!(config.agent.log_level, LogLevel::Debug);
    assert_eq!(config.agent.log_fmt, LogFmt::Json);
    assert_eq!(config.agent.max_consecutive_failures, 5);
    assert_eq!(
        config.agent.http_listener_addr.as_deref(),
        Some("127.0.0.1:5500")
    );

    let spec = &config.templates["nginx-conf"];
    assert_eq!(spec.refresh_interval, Duration::from_secs(10));
    assert_eq!(spec.missing_key, MissingKeyPolicy::Error);
    assert_eq!(spec.actions.len(), 1);
    let exec = spec.exec.as_ref().unwrap();
    assert_eq!(exec.cmd, "nginx");
    assert_eq!(exec.cmd_timeout, Some(Duration::from_secs(5)));
}

const YAML_CONFIG: &str = r#"
agent:
  log_level: INFO
  log_fmt: text
templates:
  app-config:
    source: /tmp/app.tmpl
    destination: /tmp/app.conf
    refresh_interval: 1m
    render_once: false
    missing_key: zero
    actions:
      - name: httpjson
        config:
          base_url: http://localhost:9000
          timeout: 5s
"#;

#[test]
fn test_read_yaml_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, YAML_CONFIG).unwrap();

    let config = read_from_file(&path).unwrap();
    let spec = &config.templates["app-config"];
    assert_eq!(spec.refresh_interval, Duration::from_secs(60));
    assert_eq!(spec.missing_key, MissingKeyPolicy::Zero);

    #[derive(serde::Deserialize)]
    struct Probe {
        base_url: String,
        timeout: String,
    }
    let probe: Probe = spec.actions[0].config.decode().unwrap();
    assert_eq!(probe.base_url, "http://localhost:9000");
    assert_eq!(probe.timeout, "5s");
}

#[test]
fn test_payload_decode_is_format_blind() {
    #[derive(serde::Deserialize, PartialEq, Debug)]
    struct Probe {
        key: String,
        count: u32,
    }

    let from_json: ActionConfig =
        serde_json::from_str(r#"{"name": "x", "config": {"key": "v", "count": 3}}"#).unwrap();
    let from_yaml: ActionConfig =
        serde_yaml::from_str("name: x\nconfig:\n  key: v\n  count: 3\n").unwrap();

    let expected = Probe {
        key: "v".to_string(),
        count: 3,
    };
    assert_eq!(from_json.config.decode::<Probe>().unwrap(), expected);
    assert_eq!(from_yaml.config.decode::<Probe>().unwrap(), expected);
}

#[test]
fn test_read_rejects_unknown_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "x = 1").unwrap();

    let err = read_from_file(&path).unwrap_err();
    assert!(matches!(err, crate::errors::AgentError::ConfigFormat { .. }));
}

#[test]
fn test_read_missing_file_is_not_found() {
    let err = read_from_file(std::path::Path::new("/definitely/not/here.json")).unwrap_err();
    assert!(matches!(err, crate::errors::AgentError::ConfigNotFound(_)));
}

#[test]
fn test_read_expands_env_in_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, JSON_CONFIG).unwrap();

    std::env::set_var("TPLAGENT_TEST_CONF_DIR", dir.path());
    let config = read_from_file(std::path::Path::new("$TPLAGENT_TEST_CONF_DIR/config.json"));
    std::env::remove_var("TPLAGENT_TEST_CONF_DIR");
    assert!(config.is_ok());
}

#[test]
fn test_parse_error_includes_field_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"agent": {"log_fmt": "xml"}, "templates": {}}"#,
    )
    .unwrap();

    let err = read_from_file(&path).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("log_fmt"), "missing path in: {}", msg);
}

#[test]
fn test_unknown_missing_key_is_engine_default() {
    let spec: TemplateSpec = serde_json::from_str(
        r#"{"raw": "x", "destination": "/tmp/x", "missing_key": "bogus"}"#,
    )
    .unwrap();
    assert_eq!(spec.missing_key, MissingKeyPolicy::EngineDefault);
}

#[test]
fn test_genconf_round_trips_through_start_path() {
    let mut buf = Vec::new();
    write_starter_config(&mut buf, 2, 4).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("starter.json");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&buf).unwrap();

    let config = read_from_file(&path).unwrap();
    assert_eq!(config.templates.len(), 2);
    assert!(config.templates.contains_key("myapp-config1"));
    assert!(config.templates.contains_key("myapp-config2"));
    let spec = &config.templates["myapp-config1"];
    assert_eq!(spec.refresh_interval, Duration::from_secs(1));
    assert_eq!(spec.missing_key, MissingKeyPolicy::Error);
    assert_eq!(spec.exec.as_ref().unwrap().cmd, "echo");
}

#[test]
fn test_genconf_respects_indent() {
    let mut two = Vec::new();
    write_starter_config(&mut two, 1, 2).unwrap();
    let text = String::from_utf8(two).unwrap();
    assert!(text.contains("\n  \"agent\""));

    let mut four = Vec::new();
    write_starter_config(&mut four, 1, 4).unwrap();
    let text = String::from_utf8(four).unwrap();
    assert!(text.contains("\n    \"agent\""));
}
