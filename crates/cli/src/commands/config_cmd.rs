//! `quill config`: show the effective configuration or write a default one.

use quill_config::AppConfig;

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let has_key = config.has_api_key();
    if has_key {
        config.provider.api_key = Some("[REDACTED]".into());
    }

    println!("# {}", AppConfig::config_path().display());
    if !has_key {
        println!("# no API key set (provider.api_key, QUILL_API_KEY or OPENAI_API_KEY)");
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created {}", config_path.display());
    println!("Add your API key under [provider], then run `quill chat`.");
    Ok(())
}
