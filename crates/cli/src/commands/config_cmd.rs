//! `mediguard config`: print or check configuration.

use mediguard_config::AppConfig;

/// Print the default configuration as TOML.
pub fn show() {
    print!("{}", AppConfig::default_toml());
}

/// Load and validate the current configuration, then summarize it.
pub fn check() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("   Config parsed and validated");

    let mut warnings = Vec::new();
    if !config.has_api_key() && config.reasoner.provider != "ollama" {
        warnings.push("No API key set (set MEDIGUARD_API_KEY or OPENROUTER_API_KEY)");
    }
    if !config.data.records_path.exists() {
        warnings.push("Record snapshot not found at data.records_path");
    }
    for w in &warnings {
        println!("   warning: {w}");
    }

    println!();
    println!("   Provider:    {}", config.reasoner.provider);
    println!("   Model:       {}", config.reasoner.model);
    println!("   Records:     {}", config.data.records_path.display());
    println!("   Max retries: {}", config.pipeline.max_retries);
    println!("   Timeout:     {}s", config.pipeline.reasoning_timeout_secs);
    let stages: Vec<&str> = config.pipeline.stages.iter().map(|s| s.name.as_str()).collect();
    println!("   Stages:      {}", stages.join(" -> "));

    Ok(())
}
