use std::path::Path;

use cartbrawl_core::Config;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

const DEFAULT_CONFIG_FILE: &str = "cartbrawl.toml";
const ENV_PREFIX: &str = "CARTBRAWL_";

/// Layer the configuration: defaults, then the TOML file, then environment
/// variables. Nested keys use `__`, e.g. `CARTBRAWL_LEDGER__API_KEY`.
pub(crate) fn load(path: Option<&Path>) -> eyre::Result<Config> {
    let figment = Figment::from(Serialized::defaults(Config::default()));
    // An explicitly given file must exist; the default one is optional.
    let figment = match path {
        Some(path) => figment.merge(Toml::file_exact(path)),
        None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
    };
    let config = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    Ok(config)
}
