use crate::cli::Output;
use crate::config::WriterConfig;
use anyhow::Result;

pub fn show(config: &WriterConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    if config.checks_disabled {
        Output::warning("checks_disabled is set: no output will be validated");
    }
    if config.similar_size_disabled {
        Output::warning("similar_size_disabled is set: size change limits are ignored");
    }
    Ok(())
}

pub fn get(config: &WriterConfig, key: &str) -> Result<()> {
    let value = toml::Value::try_from(config)?;
    match value.get(key) {
        Some(toml::Value::Boolean(b)) => println!("{}", b),
        Some(toml::Value::Float(f)) => println!("{}", f),
        Some(toml::Value::Integer(i)) => println!("{}", i),
        Some(other) => println!("{}", other),
        None => anyhow::bail!("Key '{}' not found in config", key),
    }
    Ok(())
}

pub fn path() -> Result<()> {
    println!("{}", WriterConfig::config_path()?.display());
    Ok(())
}
