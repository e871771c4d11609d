use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::json;

use matchdb_store::{ObjectStore, StoreConfig};
use matchdb_types::{
    LongKey, MatchRecord, PeptideMatch, ProteinMatch, Spectrum, SpectrumMatch, StoredRecord,
    TypeTag,
};

use crate::cli::{Cli, Command, OutputFormat};

pub fn run_command(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Info(args) => info(&cli, &args.path),
        Command::Count(args) => count(&cli, &args.path, &args.tag),
        Command::Exists(args) => exists(&cli, &args.path, &args.key),
        Command::Show(args) => show(&cli, &args.path, &args.key),
    }
}

/// Open an existing store by its directory path.
fn open_existing(path: &str) -> Result<ObjectStore> {
    let path = Path::new(path);
    if !path.join("store.json").is_file() {
        bail!("no matchdb store at {}", path.display());
    }
    let parent = path
        .parent()
        .context("store path has no parent directory")?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("store path has no directory name")?;
    let store = ObjectStore::open(parent, name, false, StoreConfig::default())?;
    Ok(store)
}

fn info(cli: &Cli, path: &str) -> Result<()> {
    let store = open_existing(path)?;
    let counts = store.type_counts()?;
    let total: u64 = counts.iter().map(|(_, n)| n).sum();

    match cli.format {
        OutputFormat::Json => {
            let types: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(tag, n)| (tag.as_str().to_string(), json!(n)))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "name": store.name(),
                    "records": total,
                    "types": types,
                }))?
            );
        }
        OutputFormat::Text => {
            println!("{} {}", "store".bold(), store.name());
            println!("{} {total}", "records".bold());
            for (tag, n) in &counts {
                println!("  {:<24} {n}", tag.as_str());
            }
        }
    }
    store.close()?;
    Ok(())
}

fn count(cli: &Cli, path: &str, tag: &str) -> Result<()> {
    let store = open_existing(path)?;
    let n = store.count(&TypeTag::new(tag))?;
    match cli.format {
        OutputFormat::Json => println!("{}", json!({ "tag": tag, "count": n })),
        OutputFormat::Text => println!("{n}"),
    }
    store.close()?;
    Ok(())
}

fn exists(cli: &Cli, path: &str, key: &str) -> Result<()> {
    let store = open_existing(path)?;
    let present = store.exists(key)?;
    match cli.format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "key": key, "long_key": LongKey::derive(key).to_string(), "exists": present })
        ),
        OutputFormat::Text => {
            if present {
                println!("{}", "present".green());
            } else {
                println!("{}", "absent".red());
            }
        }
    }
    store.close()?;
    Ok(())
}

fn show(cli: &Cli, path: &str, key: &str) -> Result<()> {
    let store = open_existing(path)?;
    let long_key = LongKey::derive(key);
    let Some(record) = store.get(long_key)? else {
        bail!("no record for key {key:?}");
    };

    let body = record_json(&record)?;
    match cli.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "key": key,
                "long_key": long_key.to_string(),
                "tag": record.tag.as_str(),
                "size": record.size,
                "record": body,
            }))?
        ),
        OutputFormat::Text => {
            println!("{} {key}", "key".bold());
            println!("{} {long_key}", "long key".bold());
            println!("{} {}", "tag".bold(), record.tag);
            println!("{} {} bytes", "size".bold(), record.size);
            println!("{body:#}");
        }
    }
    store.close()?;
    Ok(())
}

/// Decode the record through its domain type when the tag is known;
/// otherwise fall back to a byte preview.
fn record_json(record: &StoredRecord) -> Result<serde_json::Value> {
    let value = match record.tag.as_str() {
        SpectrumMatch::TAG => serde_json::to_value(SpectrumMatch::decode(record)?)?,
        PeptideMatch::TAG => serde_json::to_value(PeptideMatch::decode(record)?)?,
        ProteinMatch::TAG => serde_json::to_value(ProteinMatch::decode(record)?)?,
        Spectrum::TAG => serde_json::to_value(Spectrum::decode(record)?)?,
        _ => {
            let preview = &record.data[..record.data.len().min(32)];
            json!({ "data_prefix": hex::encode(preview) })
        }
    };
    Ok(value)
}
