//! Environment-driven config. Kept in its own binary so the process
//! environment is not shared with other config tests.

use busflow_loading::config::{Config, EngineConfig};

#[test]
fn env_overrides_and_defaults() {
    unsafe {
        std::env::set_var("LOADING_REVEAL_DELAY_MS", "120");
        std::env::set_var("LOADING_SHORT_VARIANT_THRESHOLD_MS", "600");
        std::env::remove_var("LOADING_RAPID_RESUME_WINDOW_MS");
        std::env::remove_var("LOADING_DEFAULT_MESSAGE");
        std::env::remove_var("LOADING_CONFIG");
        std::env::remove_var("LOG_LEVEL");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.log_level, "info");
    assert!(config.engine_config_path.is_none());

    let engine = EngineConfig::from_env().unwrap();
    assert_eq!(engine.reveal_delay_ms, 120);
    assert_eq!(engine.short_variant_threshold_ms, 600);
    assert_eq!(engine.rapid_resume_window_ms, 800);

    unsafe {
        std::env::set_var("LOADING_REVEAL_DELAY_MS", "-1");
    }
    assert!(EngineConfig::from_env().is_err());

    unsafe {
        std::env::remove_var("LOADING_REVEAL_DELAY_MS");
        std::env::remove_var("LOADING_SHORT_VARIANT_THRESHOLD_MS");
    }
}
