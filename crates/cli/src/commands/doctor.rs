//! `pitchpal doctor` — Diagnose config and model availability.

use pitchpal_config::AppConfig;
use pitchpal_engine::local::available_presets;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 PitchPal Doctor — System Diagnostics");
    println!("=======================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    let config = if config_path.exists() {
        match AppConfig::load() {
            Ok(config) => {
                println!("  ✅ Config file valid ({})", config_path.display());
                Some(config)
            }
            Err(e) => {
                println!("  ❌ Config file invalid: {e}");
                issues += 1;
                None
            }
        }
    } else {
        println!("  ℹ️  No config file at {} — defaults in effect", config_path.display());
        Some(AppConfig::default())
    };

    if let Some(config) = config {
        let name = &config.model.name;
        let is_preset = available_presets().contains(&name.as_str());
        let is_gguf_path =
            name.ends_with(".gguf") && std::path::Path::new(name).exists();
        if is_preset {
            println!("  ✅ Model '{name}' is a known preset (downloaded on first use)");
        } else if is_gguf_path {
            println!("  ✅ Model file exists: {name}");
        } else {
            println!(
                "  ❌ Model '{name}' is neither a preset ({}) nor an existing .gguf file",
                available_presets().join(", ")
            );
            issues += 1;
        }

        println!(
            "  ✅ Context budget: {} tokens, {} usable for the prompt",
            config.context.max_tokens,
            config.context.prompt_budget()
        );
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
