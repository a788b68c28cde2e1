//! Integration tests for trellis-config

use serde::Deserialize;
use trellis_config::*;
use trellis_core::Container;

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Deserialize)]
struct MailSettings {
    mail_host: String,
    mail_retries: u32,
}

impl Validate for MailSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.mail_host, "mail_host")?;
        ConfigValidator::in_range(self.mail_retries, 1, 5, "mail_retries")
    }
}

#[test]
fn test_config_manager_with_prefix() {
    let manager = ConfigManager::with_prefix("APP");
    manager.load_vars(vars(&[
        ("APP_EVENTS_LOG_EMITS", "true"),
        ("APP_EVENTS_DRAIN_TIMEOUT_MS", "250"),
        ("OTHER_KEY", "ignored"),
    ]));

    assert!(manager.get_bool("events_log_emits").unwrap());
    assert_eq!(manager.get_parsed::<u64>("events_drain_timeout_ms").unwrap(), 250);
    assert!(!manager.has("other_key"));
}

#[test]
fn test_load_validated() {
    let manager = ConfigManager::new();
    manager.set("mail_host", "smtp.example.com").unwrap();
    manager.set("mail_retries", 3).unwrap();

    let settings: MailSettings = manager.load_validated().unwrap();
    assert_eq!(settings.mail_host, "smtp.example.com");
    assert_eq!(settings.mail_retries, 3);

    manager.set("mail_retries", 9).unwrap();
    let err = manager.load_validated::<MailSettings>().unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
}

#[test]
fn test_missing_dotenv_file_is_an_error() {
    let manager = ConfigManager::new();
    let result = manager.load_dotenv(Some("/nonexistent/trellis/.env"));
    assert!(matches!(result, Err(ConfigError::LoadError(_))));
}

#[test]
fn test_provide_registers_in_container() {
    let container = Container::new();
    let manager = ConfigManager::new();
    manager.set("answer", 42).unwrap();

    manager.provide(&container);

    let resolved = container.resolve::<ConfigManager>().unwrap();
    assert_eq!(resolved.get::<i64>("answer").unwrap(), 42);
}

#[test]
fn test_config_error_display() {
    let err = ConfigError::KeyNotFound("test_key".to_string());
    assert!(err.to_string().contains("test_key"));
}
