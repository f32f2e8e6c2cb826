// tests/ai_adapter_mode.rs
//
// Client factory behavior: AI_TEST_MODE=mock wins over config, and a
// disabled config yields a client that can never succeed. Serial because
// both tests mutate process env.

use jobpulse::classify::ai_adapter::{build_client_from_config, AiConfig, EnrichClient as _};

#[serial_test::serial]
#[tokio::test]
async fn mock_mode_overrides_config() {
    std::env::set_var("AI_TEST_MODE", "mock");
    let client = build_client_from_config(&AiConfig::default());
    assert_eq!(client.provider_name(), "mock");

    let out = client.enrich("any posting text").await.unwrap();
    assert!(!out.summary.is_empty());

    std::env::remove_var("AI_TEST_MODE");
}

#[serial_test::serial]
#[tokio::test]
async fn disabled_config_yields_disabled_client() {
    std::env::remove_var("AI_TEST_MODE");
    let client = build_client_from_config(&AiConfig {
        enabled: false,
        ..Default::default()
    });
    assert!(!client.enabled());
    assert_eq!(client.provider_name(), "disabled");
    assert!(client.enrich("text").await.is_err());
}
