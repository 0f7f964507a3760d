//! `-c key=value` overrides layered on top of `config.toml`.

use clap::ArgAction;
use clap::Parser;
use toml::Value;

#[derive(Parser, Debug, Default, Clone)]
pub struct CliConfigOverrides {
    /// Override a value from `$WARDEN_HOME/config.toml`. Use a dotted path
    /// (`risk.high`) for nested keys. The value is parsed as TOML and falls
    /// back to a plain string, so `-c approval_policy=full-auto` works
    /// without quotes.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "key=value",
        action = ArgAction::Append
    )]
    pub raw_overrides: Vec<String>,
}

impl CliConfigOverrides {
    pub fn parse_overrides(&self) -> Result<Vec<(String, Value)>, String> {
        self.raw_overrides
            .iter()
            .map(String::as_str)
            .map(parse_override)
            .collect()
    }
}

fn parse_override(raw: &str) -> Result<(String, Value), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("invalid override (missing '='): {raw}"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in override: {raw}"));
    }

    let value = value.trim();
    let value = parse_toml_value(value).unwrap_or_else(|| {
        Value::String(value.trim_matches(|c| c == '"' || c == '\'').to_string())
    });
    Ok((key.to_string(), value))
}

/// Parses a bare TOML value by giving it a key.
fn parse_toml_value(raw: &str) -> Option<Value> {
    const SENTINEL: &str = "_warden_override_";
    let table: toml::Table = toml::from_str(&format!("{SENTINEL} = {raw}")).ok()?;
    table.get(SENTINEL).cloned()
}
