use anyhow::{Context, Result, bail};
use romweave_config::Config;
use romweave_engine::{ChangeToken, Model, ModelSettings, Run, RunKind, StoredMetadata, decode, io};
use std::{env, path::PathBuf, process};

const USAGE: &str = "\
Usage: romweave <rom> <command> [args]

Commands:
  summary                    counts of runs, anchors and pointers
  runs                       every run with its format and sources
  anchors                    every named anchor
  text <address>             decode the text run at an address
  anchor <address> <text>   name an address, e.g. `messages\"\"`
  relocate <name> <length>   grow a named run, moving it if needed
  export                     print the metadata file";

fn settings_from_config(config: &Config) -> ModelSettings {
    ModelSettings {
        earliest_allowed_anchor: config.earliest_allowed_anchor,
        free_space_search_start: config.free_space_search_start,
        free_space_buffer: config.free_space_buffer,
        expansion_slack: config.expansion_slack,
        zero_is_free: config.zero_is_free,
        grow_fill: config.grow_fill,
        max_store_length: config.max_store_length,
    }
}

/// Accepts `0x1A0`, `1A0h` style hex or plain decimal.
fn parse_address(text: &str) -> Result<usize> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16)
    } else if let Some(hex) = text.strip_suffix('h') {
        usize::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.with_context(|| format!("'{text}' is not an address"))
}

fn describe(run: &Run) -> &'static str {
    match run.kind {
        RunKind::Unformatted => "placeholder",
        RunKind::Pointer => "pointer",
        RunKind::Text { .. } => "text",
        RunKind::Table(_) => "table",
    }
}

fn print_summary(model: &Model) {
    let runs = model.runs();
    let pointers = runs.iter().filter(|run| run.is_pointer()).count();
    let text = runs
        .iter()
        .filter(|run| matches!(run.kind, RunKind::Text { .. }))
        .count();
    println!("length:   {:#08X}", model.len());
    println!("runs:     {}", runs.len());
    println!("pointers: {pointers}");
    println!("strings:  {text}");
    println!("anchors:  {}", model.anchors().len());
    println!(
        "unmapped: {}",
        model.anchors().unmapped_pointers().count()
    );
}

fn print_runs(model: &Model) {
    for run in model.runs().iter() {
        let name = model.anchors().name_at(run.start).unwrap_or("");
        println!(
            "{:#08X} {:>6} {:<11} {:<16} {}{}",
            run.start,
            run.length(),
            describe(run),
            name,
            run.format_string(),
            if run.pointer_sources.is_empty() {
                String::new()
            } else {
                format!("  <- {} sources", run.pointer_sources.len())
            }
        );
    }
}

fn print_anchors(model: &Model) {
    for (address, name) in model.anchors().iter() {
        let format = model.run_at(address).map(Run::format_string).unwrap_or_default();
        println!("{address:#08X} {name}{format}");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("{USAGE}");
        process::exit(1);
    }

    let config = match Config::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            eprintln!("Fix or remove {}", Config::config_path().display());
            process::exit(1);
        }
    };

    let rom_path = PathBuf::from(&args[1]);
    let metadata_path = io::metadata_path(&rom_path, config.metadata_dir.as_deref());
    let mut model = io::open_model(&rom_path, &metadata_path, settings_from_config(&config))
        .with_context(|| format!("Failed to open '{}'", rom_path.display()))?;

    match (args[2].as_str(), &args[3..]) {
        ("summary", []) => print_summary(&model),
        ("runs", []) => print_runs(&model),
        ("anchors", []) => print_anchors(&model),
        ("text", [address]) => {
            let address = parse_address(address)?;
            let Some(run) = model.run_at(address) else {
                bail!("no run starts at {address:#08X}");
            };
            let RunKind::Text { length } = run.kind else {
                bail!("the run at {address:#08X} is a {}, not text", describe(run));
            };
            match decode(model.data(), address, length) {
                Some(text) => println!("{text}"),
                None => bail!("the text at {address:#08X} does not decode"),
            }
        }
        ("anchor", [address, text]) => {
            let address = parse_address(address)?;
            let mut token = ChangeToken::new();
            let run = model.apply_anchor(&mut token, address, text, false)?;
            io::save_model(&rom_path, &metadata_path, &model)?;
            println!(
                "{address:#08X} is now {}{}",
                model.get_anchor_from_address(Some(address), None),
                run.format_string()
            );
        }
        ("relocate", [name, length]) => {
            let length = parse_address(length)?;
            let Some(address) = model.anchors().address_of(name) else {
                bail!("no anchor named '{name}'");
            };
            let Some(run) = model.run_at(address).cloned() else {
                bail!("anchor '{name}' has no run");
            };
            let mut token = ChangeToken::new();
            let moved = model.relocate_for_expansion(&mut token, &run, length)?;
            io::save_model(&rom_path, &metadata_path, &model)?;
            if moved.start == run.start {
                println!("'{name}' grew in place to {:#X} bytes", moved.length());
            } else {
                println!(
                    "'{name}' moved from {:#08X} to {:#08X}, {} pointers updated",
                    run.start,
                    moved.start,
                    moved.pointer_sources.len()
                );
            }
        }
        ("export", []) => print!("{}", StoredMetadata::from_model(&model).to_toml()?),
        _ => {
            eprintln!("{USAGE}");
            process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_forms() {
        assert_eq!(parse_address("0x1A0").unwrap(), 0x1A0);
        assert_eq!(parse_address("1A0h").unwrap(), 0x1A0);
        assert_eq!(parse_address("416").unwrap(), 416);
        assert!(parse_address("zz").is_err());
    }

    #[test]
    fn test_settings_follow_config() {
        let config = Config {
            free_space_buffer: 0x10,
            zero_is_free: false,
            ..Config::default()
        };

        let settings = settings_from_config(&config);

        assert_eq!(settings.free_space_buffer, 0x10);
        assert!(!settings.zero_is_free);
        assert_eq!(settings.max_store_length, ModelSettings::default().max_store_length);
    }
}
