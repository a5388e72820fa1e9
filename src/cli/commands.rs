use std::io::Write;

use crate::domain::cache::{make_cache_key, CacheBackend, Value};
use crate::infrastructure::services::CacheService;

use super::Command;

/// Interprets a command line value: integers and bools keep their type,
/// anything else is a string
pub fn parse_value(raw: &str) -> Value {
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Int(v);
    }

    if let Ok(v) = raw.parse::<u64>() {
        return Value::Uint(v);
    }

    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Str(raw.to_string()),
    }
}

pub(super) fn derive_key(identity: &str, version: i64, args: &[String]) -> anyhow::Result<String> {
    let args: Vec<Value> = args.iter().map(|arg| parse_value(arg)).collect();
    Ok(make_cache_key(identity, version, &args)?)
}

fn display(value: Option<&Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "(nil)".to_string(),
    }
}

/// Runs one command against `cache`, writing its result to `out`
pub async fn execute<B, W>(cache: &CacheService<B>, command: Command, out: &mut W) -> anyhow::Result<()>
where
    B: CacheBackend,
    W: Write,
{
    match command {
        Command::Get { key } => {
            let value = cache.get(&key).await?;
            writeln!(out, "{}", display(value.as_ref()))?;
        }
        Command::Set { key, value, ttl, string } => {
            let value = if string {
                Value::Str(value)
            } else {
                parse_value(&value)
            };
            cache.set(&key, &value, ttl).await?;
            writeln!(out, "OK")?;
        }
        Command::GetMany { keys } => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            for value in cache.get_many(&keys).await? {
                writeln!(out, "{}", display(value.as_ref()))?;
            }
        }
        Command::Delete { keys } => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            writeln!(out, "{}", cache.delete_many(&keys).await?)?;
        }
        Command::Expire { key, ttl } => {
            writeln!(out, "{}", cache.expire(&key, ttl).await?)?;
        }
        Command::Ttl { key } => {
            writeln!(out, "{}", cache.ttl(&key).await?)?;
        }
        Command::Exists { key } => {
            writeln!(out, "{}", cache.exists(&key).await?)?;
        }
        Command::Clear => {
            writeln!(out, "{}", cache.clear().await?)?;
        }
        Command::Key { identity, key_version, args } => {
            writeln!(out, "{}", derive_key(&identity, key_version, &args)?)?;
        }
        Command::Ping => {
            cache.ping().await?;
            writeln!(out, "PONG")?;
        }
    }

    Ok(())
}
