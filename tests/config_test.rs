//! Loading configuration from disk and building a gateway from it.

use std::io::Write;

use greengate::config::{ApiKeySecret, AzureSecret};
use greengate::{Config, GatewayBuilder, ProviderKind, Secrets};
use tempfile::{NamedTempFile, TempDir};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn load_explicit_path() {
    let file = write_config(
        r#"
[gateway]
project_name = "GreenGate"
environment = "staging"

[cache]
similarity_threshold = 0.9

[limits]
rate_limit_per_minute = 30
"#,
    );

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.gateway.environment, "staging");
    assert_eq!(config.cache.similarity_threshold, 0.9);
    assert_eq!(config.limits.rate_limit_per_minute, 30);
    // Unspecified sections keep their defaults.
    assert_eq!(config.retry.attempts, 3);
}

#[test]
fn invalid_file_is_rejected() {
    let file = write_config("[cache]\nsimilarity_threshold = 2.0\n");
    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("similarity_threshold"));

    let file = write_config("not = [valid");
    assert!(Config::load(Some(file.path())).is_err());
}

#[test]
fn gateway_from_config_registers_credentialed_providers() {
    let dir = TempDir::new().unwrap();
    let file = write_config(&format!(
        r#"
[ledger]
path = "{}"

[router]
provider_sequence = ["azure-openai", "anthropic"]

[providers.azure_openai]
deployments = "gpt-4o=prod-gpt,gpt-4o-mini=mini"
"#,
        dir.path().join("energy.db").display()
    ));
    let config = Config::load(Some(file.path())).unwrap();

    let secrets = Secrets {
        anthropic: Some(ApiKeySecret {
            api_key: "ant-test".into(),
        }),
        azure_openai: Some(AzureSecret {
            api_key: "az-test".into(),
            endpoint: Some("https://res.openai.azure.com/".into()),
        }),
        gateway: Some(ApiKeySecret {
            api_key: "gw-secret".into(),
        }),
        ..Default::default()
    };

    let gateway = GatewayBuilder::from_config(&config, &secrets).build().unwrap();

    let names: Vec<_> = gateway
        .dispatcher()
        .profiles()
        .iter()
        .map(|p| p.name.as_str())
        .filter(|n| *n == "azure-openai" || *n == "anthropic")
        .collect();
    assert_eq!(names, ["azure-openai", "anthropic"]);

    let azure = gateway
        .dispatcher()
        .profiles()
        .iter()
        .find(|p| p.kind == ProviderKind::AzureOpenAi)
        .unwrap();
    assert_eq!(azure.base_url, "https://res.openai.azure.com");
    assert_eq!(azure.deployments["gpt-4o"], "prod-gpt");
    assert!(azure.supports_model("gpt-4o-mini"));
    assert!(!azure.supports_model("claude-3-haiku"));

    assert!(gateway.authorize(None, Some("gw-secret")).is_ok());
    assert!(gateway.authorize(None, None).is_err());
    assert_eq!(gateway.ledger().path(), dir.path().join("energy.db"));
}
