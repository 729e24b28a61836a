use super::*;
use figment::Jail;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_config_loads_defaults() {
    Jail::expect_with(|_jail| {
        let config = RegistryConfig::load().map_err(|e| e.to_string())?;
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.thread_name_prefix, "worker");
        assert_eq!(config.stack_size, None);
        Ok(())
    });
}

#[test]
fn test_config_file_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            CONFIG_FILE,
            r#"
            thread_name_prefix = "reaper"
            stack_size = 1048576
            "#,
        )?;

        let config = RegistryConfig::load().map_err(|e| e.to_string())?;
        assert_eq!(config.thread_name_prefix, "reaper");
        assert_eq!(config.stack_size, Some(1_048_576));
        Ok(())
    });
}

#[test]
fn test_environment_has_highest_priority() {
    Jail::expect_with(|jail| {
        jail.create_file(CONFIG_FILE, r#"thread_name_prefix = "from-file""#)?;
        jail.set_env("THREADENGINE_THREAD_NAME_PREFIX", "from-env");
        jail.set_env("THREADENGINE_STACK_SIZE", "65536");

        let config = RegistryConfig::load().map_err(|e| e.to_string())?;
        assert_eq!(config.thread_name_prefix, "from-env");
        assert_eq!(config.stack_size, Some(65_536));
        Ok(())
    });
}

#[test]
fn test_custom_config_loading() {
    Jail::expect_with(|_jail| {
        let temp_dir = TempDir::new().map_err(|e| e.to_string())?;
        let config_path = temp_dir.path().join("custom.toml");
        fs::write(&config_path, r#"thread_name_prefix = "custom""#).map_err(|e| e.to_string())?;

        let config = RegistryConfig::load_from(Some(config_path.as_path())).map_err(|e| e.to_string())?;
        assert_eq!(config.thread_name_prefix, "custom");

        // Missing custom config falls back to defaults
        let missing = temp_dir.path().join("non_existent.toml");
        let config = RegistryConfig::load_from(Some(missing.as_path())).map_err(|e| e.to_string())?;
        assert_eq!(config, RegistryConfig::default());
        Ok(())
    });
}

#[test]
fn test_invalid_values_are_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file(CONFIG_FILE, "stack_size = 0")?;
        let err = RegistryConfig::load().unwrap_err();
        assert!(err.to_string().contains("Stack size cannot be 0"));

        jail.create_file(CONFIG_FILE, r#"stack_size = "large""#)?;
        assert!(RegistryConfig::load().is_err());
        Ok(())
    });
}

#[test]
fn test_validate() {
    assert!(RegistryConfig::default().validate().is_ok());

    let config = RegistryConfig {
        thread_name_prefix: "  ".to_string(),
        ..RegistryConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_to_toml_round_trips_through_figment() {
    let config = RegistryConfig {
        thread_name_prefix: "io".to_string(),
        stack_size: Some(4096),
    };
    let rendered = config.to_toml().unwrap();
    assert!(rendered.contains(r#"thread_name_prefix = "io""#));

    let parsed: RegistryConfig = Figment::from(Toml::string(&rendered)).extract().unwrap();
    assert_eq!(parsed, config);

    // Unset stack size is omitted rather than rendered
    assert!(!RegistryConfig::default().to_toml().unwrap().contains("stack_size"));
}
