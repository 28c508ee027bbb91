use std::path::Path;

use anyhow::Context;
use log::warn;
use veil::{TransformInput, TransformPass, TransformReport};

use crate::{
    app::GlobalOptions,
    commands::common::{assign_changes, load_changes, load_config, parse_mapping},
    output::{print_output, Align, TabWriter},
};

pub struct TransformOptions<'a> {
    pub config: Option<&'a Path>,
    pub incremental: bool,
    pub changes: Option<&'a Path>,
    pub dirs: &'a [String],
    pub jars: &'a [String],
    pub state: Option<&'a Path>,
}

pub fn run(opts: &TransformOptions, global: &GlobalOptions) -> anyhow::Result<()> {
    let config = load_config(opts.config)?;

    let mut inputs = Vec::with_capacity(opts.dirs.len() + opts.jars.len());
    for value in opts.dirs {
        let (input, output) = parse_mapping(value)?;
        inputs.push(TransformInput::directory(input, output));
    }
    for value in opts.jars {
        let (input, output) = parse_mapping(value)?;
        inputs.push(TransformInput::archive(input, output));
    }
    if inputs.is_empty() {
        anyhow::bail!("nothing to transform, pass at least one --dir or --jar");
    }

    if let Some(path) = opts.changes {
        for change in assign_changes(&mut inputs, load_changes(path)?) {
            warn!(
                "Change {} ({}) belongs to no input",
                change.path.display(),
                change.status
            );
        }
    }

    let mut pass = TransformPass::new(config);
    if let Some(state) = opts.state {
        pass = pass.with_state_file(state);
    }
    let report = pass
        .run(&inputs, opts.incremental)
        .context("transform pass failed")?;

    print_output(&report, global, print_report)
}

fn print_report(report: &TransformReport) {
    println!(
        "{} build, fingerprint {}",
        if report.incremental {
            "Incremental"
        } else {
            "Full"
        },
        report.fingerprint
    );
    println!();

    let mut table = TabWriter::new(&[("Counter", Align::Left), ("Value", Align::Right)]);
    for (name, value) in [
        ("classes patched", report.classes_patched),
        ("files copied", report.files_copied),
        ("files removed", report.files_removed),
        ("archives written", report.archives_written),
        ("literals", report.literals),
        ("fields", report.fields),
        ("skipped literals", report.skipped_literals),
        ("skipped methods", report.skipped_methods),
        ("texts scrubbed", report.scrubbed),
    ] {
        table.row(vec![name.to_string(), value.to_string()]);
    }
    table.print();
}
