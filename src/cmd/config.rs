use std::path::Path;

use anyhow::Result;

use shortsmith::config::config_path;
use shortsmith::Config;

pub fn cmd_config(path: Option<&Path>) -> Result<()> {
    let config = Config::load(path)?;
    let source = path.map_or_else(config_path, Path::to_path_buf);
    println!("# {}", source.display());
    print!("{}", config.to_toml_string()?);
    Ok(())
}
