use agentboard_core::config::{config_path, Settings};

pub fn cmd_config(args: &[String]) -> i32 {
    match args.first().map(|s| s.as_str()) {
        Some("path") => cmd_path(),
        Some("init") => cmd_init(args.get(1).is_some_and(|a| a == "--force")),
        _ => {
            eprintln!("Usage: agentboard config <path|init [--force]>");
            1
        }
    }
}

fn cmd_path() -> i32 {
    match config_path() {
        Some(path) => {
            println!("{}", path.display());
            0
        }
        None => {
            eprintln!("Could not determine config directory.");
            1
        }
    }
}

fn cmd_init(force: bool) -> i32 {
    let Some(path) = config_path() else {
        eprintln!("Could not determine config directory.");
        return 1;
    };
    if path.exists() && !force {
        eprintln!("Config already exists: {} (use --force to overwrite)", path.display());
        return 1;
    }
    let toml = match toml::to_string_pretty(&Settings::default()) {
        Ok(toml) => toml,
        Err(e) => {
            eprintln!("Serialize error: {e}");
            return 1;
        }
    };
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create {}: {e}", parent.display());
            return 1;
        }
    }
    match std::fs::write(&path, toml) {
        Ok(()) => {
            println!("Wrote {}", path.display());
            0
        }
        Err(e) => {
            eprintln!("Failed to write {}: {e}", path.display());
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_without_subcommand_errors() {
        assert_eq!(cmd_config(&[]), 1);
        assert_eq!(cmd_config(&["bogus".into()]), 1);
    }

    #[test]
    fn default_settings_serialize_to_toml() {
        let toml = toml::to_string_pretty(&Settings::default()).unwrap();
        assert!(toml.contains("max_sessions"));
        assert!(toml.contains("agent_command"));
    }
}
