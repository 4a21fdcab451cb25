use anyhow::Result;
use serde::Serialize;
use veil_core::{ObfuscationConfig, Scheme};

#[derive(Serialize)]
pub struct SchemeInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub config: ObfuscationConfig,
}

pub fn scheme_infos() -> Vec<SchemeInfo> {
    Scheme::ALL
        .into_iter()
        .map(|scheme| SchemeInfo {
            name: scheme.name(),
            description: scheme.description(),
            config: scheme.config(),
        })
        .collect()
}

/// List the named presets.
pub fn list_schemes_command(json: bool) -> Result<()> {
    let infos = scheme_infos();
    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    println!("Schemes:");
    for info in infos {
        println!("- {}: {}", info.name, info.description);
    }
    Ok(())
}
