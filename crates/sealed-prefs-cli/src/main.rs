mod cli;
mod config;
mod storage;

use std::collections::BTreeSet;

use clap::Parser;
use color_eyre::{
    eyre::{bail, eyre, WrapErr},
    Result,
};
use sealed_prefs_core::{KeyValueStore, StoreEditor, StoredValue};
use sealed_prefs_storage::{encrypted_store::EncryptedStore, key_store::KeyStore};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand, ValueType};

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Health => {
            let store = storage::store_from_config(&config)?;
            run_store_health(&store)?;
            println!("Storage: ok");
        }
        command => {
            let store = storage::store_from_config(&config)?;
            for line in run(&store, command)? {
                println!("{line}");
            }
            let failures = store.proxy().fail_open_count();
            if failures > 0 {
                warn!(failures, "key store was unavailable; some values were handled unencrypted");
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("sealed-prefs {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

/// Execute a store command and return the lines to print.
fn run<S: KeyValueStore>(store: &S, command: Command) -> Result<Vec<String>> {
    let lines = match command {
        Command::Get { key, value_type } => {
            if !store.contains(&key) {
                bail!("no value stored under {key}");
            }
            vec![read_value(store, &key, value_type)?]
        }
        Command::Put {
            key,
            values,
            value_type,
        } => {
            stage_put(store.edit(), &key, values, value_type)?.commit()?;
            vec![format!("Stored {key}")]
        }
        Command::Remove { key } => {
            store.edit().remove(&key).commit()?;
            vec![format!("Removed {key}")]
        }
        Command::Clear => {
            store.edit().clear().commit()?;
            vec!["Store cleared".to_string()]
        }
        Command::List => {
            let entries = store.get_all()?;
            if entries.is_empty() {
                vec!["Store is empty. Add a value with `sealed-prefs put <key> <value>`.".to_string()]
            } else {
                entries
                    .into_iter()
                    .map(|(key, value)| format!("{key} = {}", render(&value)))
                    .collect()
            }
        }
        Command::Health | Command::Version | Command::Config(_) => {
            return Err(eyre!("command does not operate on a store"));
        }
    };
    Ok(lines)
}

fn read_value<S: KeyValueStore>(store: &S, key: &str, value_type: ValueType) -> Result<String> {
    let rendered = match value_type {
        ValueType::String => store.get_string(key)?.unwrap_or_default(),
        ValueType::StringSet => render(&StoredValue::StringSet(
            store.get_string_set(key)?.unwrap_or_default(),
        )),
        ValueType::Int => store.get_i32_or(key, 0)?.to_string(),
        ValueType::Long => store.get_i64_or(key, 0)?.to_string(),
        ValueType::Float => store.get_f32_or(key, 0.0)?.to_string(),
        ValueType::Bool => store.get_bool_or(key, false)?.to_string(),
    };
    Ok(rendered)
}

fn stage_put<E: StoreEditor>(
    editor: E,
    key: &str,
    values: Vec<String>,
    value_type: ValueType,
) -> Result<E> {
    if value_type == ValueType::StringSet {
        return Ok(editor.put_string_set(key, values.into_iter().collect::<BTreeSet<_>>()));
    }

    let [value] = values.as_slice() else {
        bail!("expected exactly one value for a {value_type:?} put");
    };
    let editor = match value_type {
        ValueType::String => editor.put_string(key, value),
        ValueType::Int => editor.put_i32(key, value.parse().wrap_err("not an int")?),
        ValueType::Long => editor.put_i64(key, value.parse().wrap_err("not a long")?),
        ValueType::Float => editor.put_f32(key, value.parse().wrap_err("not a float")?),
        ValueType::Bool => editor.put_bool(key, value.parse().wrap_err("not a bool")?),
        ValueType::StringSet => unreachable!("handled above"),
    };
    Ok(editor)
}

fn render(value: &StoredValue) -> String {
    match value {
        StoredValue::StringSet(values) => {
            let items: Vec<&str> = values.iter().map(String::as_str).collect();
            format!("[{}]", items.join(", "))
        }
        scalar => scalar.canonical_string().unwrap_or_default(),
    }
}

/// Writes and reads back a marker value through the encrypting store.
///
/// Fails if the value did not round-trip, if the key store fell back to
/// plaintext while handling it, or if the backing store holds it unencrypted.
fn run_store_health<B, K>(store: &EncryptedStore<B, K>) -> Result<()>
where
    B: KeyValueStore,
    K: KeyStore,
{
    let check_key = "health/check";
    let payload = "ok";
    let failures_before = store.proxy().fail_open_count();

    store.edit().put_string(check_key, payload).commit()?;
    let round_trip = store.get_string(check_key);
    let raw = store.backing().get_string(check_key);
    store.edit().remove(check_key).commit()?;

    if round_trip?.as_deref() != Some(payload) {
        bail!("storage round-trip failed");
    }
    if store.proxy().fail_open_count() != failures_before {
        bail!("key store is unavailable; values would be stored unencrypted");
    }
    if raw?.as_deref() == Some(payload) {
        bail!("backing store holds the health check value in plaintext");
    }
    Ok(())
}
