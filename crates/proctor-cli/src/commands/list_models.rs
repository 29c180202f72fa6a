//! The `proctor list-models` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use proctor_providers::ProviderRegistry;

pub fn execute(registry_path: Option<PathBuf>) -> Result<()> {
    let registry = match &registry_path {
        Some(path) => ProviderRegistry::load(path)?,
        None => ProviderRegistry::builtin(),
    };

    let mut table = Table::new();
    table.set_header(vec!["Provider", "Model", "Vision", "Key env var"]);

    for (name, entry) in &registry.entries {
        for model in &entry.models {
            let vision = entry.models_with_vision.contains(model);
            table.add_row(vec![
                Cell::new(name),
                Cell::new(model),
                Cell::new(if vision { "yes" } else { "no" }),
                Cell::new(&entry.api_key_env_var),
            ]);
        }
    }

    println!("{table}");
    Ok(())
}
