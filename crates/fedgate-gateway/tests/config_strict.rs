#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use fedgate_core::Environment;
use fedgate_gateway::config::{self, CheckKind, CostRuleSpec, EvaluationMode, SinkConfig};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
admission:
  max_depht: 10 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config_uses_defaults() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.gateway.identity_header, "userid");
    assert_eq!(cfg.gateway.bypass_header, "override");
    assert_eq!(cfg.admission.max_depth, 10);
    assert_eq!(cfg.admission.max_cost, 1500.0);
    assert_eq!(cfg.admission.cost_lookback_window, Duration::from_secs(604_800));
    assert_eq!(cfg.admission.cost_percentile, 1.0);
    assert!(!cfg.admission.debug_mode);
    assert!(cfg.admission.enforce_in_production);
    assert_eq!(cfg.admission.environment, Environment::Development);
    assert_eq!(
        cfg.admission.check_order,
        vec![CheckKind::Depth, CheckKind::Safelist, CheckKind::Cost]
    );
    assert_eq!(cfg.admission.evaluation, EvaluationMode::ShortCircuit);
    assert!(matches!(cfg.reporter.sink, SinkConfig::Tracing));
    assert_eq!(cfg.reporter.flush_timeout, Duration::from_secs(5));
    assert!(cfg.admission.strict_operations.require_operation_name);
    assert!(!cfg.admission.strict_operations.allow_subscriptions);
}

#[test]
fn full_config_parses() {
    let ok = r#"
version: 1
gateway:
  listen: "127.0.0.1:4100"
  identity_header: "x-user-id"
admission:
  max_depth: 8
  max_cost: 90
  cost_lookback_window: "3d 12h"
  cost_percentile: 0.95
  debug_mode: true
  environment: production
  check_order: [strict_operations, cost, depth]
  evaluation: collect_all
  strict_operations:
    allow_subscriptions: true
cost_rules:
  Query.products: { kind: paginated, argument: first, default_count: 10 }
  Query.me: { kind: fixed, cost: 1 }
  Product.reviews: { kind: scaled, factor: 2.5 }
  User.name: { kind: baseline }
schema:
  field_types:
    Query.products: Product
reporter:
  sink: { kind: json_lines, path: /tmp/rejections.jsonl }
  buffer: 16
  flush_timeout: 500ms
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.admission.cost_lookback_window, Duration::from_secs(302_400));
    assert_eq!(cfg.admission.environment, Environment::Production);
    assert_eq!(
        cfg.admission.check_order,
        vec![CheckKind::StrictOperations, CheckKind::Cost, CheckKind::Depth]
    );
    assert!(cfg.admission.strict_operations.require_operation_name);
    assert!(cfg.admission.strict_operations.allow_subscriptions);
    assert_eq!(cfg.reporter.flush_timeout, Duration::from_millis(500));
    assert_eq!(
        cfg.cost_rules["Query.products"],
        CostRuleSpec::Paginated { argument: "first".into(), default_count: 10.0 }
    );
    assert_eq!(cfg.cost_rules.len(), 4);
    assert!(matches!(cfg.reporter.sink, SinkConfig::JsonLines { .. }));
}

#[test]
fn unsupported_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn invalid_values_are_config_errors() {
    for bad in [
        "version: 1\nadmission: { max_depth: 0 }\n",
        "version: 1\nadmission: { max_cost: -1 }\n",
        "version: 1\nadmission: { cost_percentile: 1.5 }\n",
        "version: 1\nadmission: { cost_lookback_window: \"soon\" }\n",
        "version: 1\nadmission: { check_order: [] }\n",
        "version: 1\nadmission: { check_order: [depth, cost, depth] }\n",
        "version: 1\ncost_rules: { products: { kind: baseline } }\n",
        "version: 1\ncost_rules: { Query.products: { kind: paginated, argument: first, default_count: 0 } }\n",
        "version: 1\ncost_rules: { Query.products: { kind: guess } }\n",
        "version: 1\ngateway: { listen: \"nowhere\" }\n",
        "version: 1\ngateway: { identity_header: \"user id\" }\n",
        "version: 1\nhistory: { source: stats.json, refresh_interval: \"10ms\" }\n",
        "version: 1\nreporter: { buffer: 0 }\n",
        "version: 1\nreporter: { flush_timeout: \"later\" }\n",
        "version: 1\nadmission: { strict_operations: { allow_mutations: false } }\n",
    ] {
        let err = config::load_from_str(bad).expect_err(bad);
        assert_eq!(err.client_code().as_str(), "CONFIG", "{bad}");
    }
}

#[test]
fn load_from_file_reads_yaml() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fedgate.yaml");
    std::fs::write(&path, "version: 1\nadmission: { max_cost: 150 }\n").expect("write");
    let cfg = config::load_from_file(&path).expect("load");
    assert_eq!(cfg.admission.max_cost, 150.0);

    let err = config::load_from_file(dir.path().join("missing.yaml")).expect_err("missing");
    assert_eq!(err.client_code().as_str(), "CONFIG");
}
