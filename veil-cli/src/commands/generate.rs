use std::path::Path;

use serde::Serialize;
use veil::{generate_decoder_unit, DECODER_CLASS};

use crate::{app::GlobalOptions, commands::common::load_config, output::print_output};

#[derive(Debug, Serialize)]
struct GeneratedUnit {
    class: &'static str,
    path: String,
    variant: String,
}

pub fn run(config: Option<&Path>, out: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let path = generate_decoder_unit(out, &config)?;

    let unit = GeneratedUnit {
        class: DECODER_CLASS,
        path: path.display().to_string(),
        variant: config.variant.to_string(),
    };
    print_output(&unit, opts, |unit| {
        println!("{} ({}) -> {}", unit.class, unit.variant, unit.path);
    })
}
