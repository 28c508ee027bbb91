use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use veil::{obfuscation::locate, ClassFile};

use crate::{
    app::GlobalOptions,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct Inspection {
    class: String,
    literals: Vec<LiteralInfo>,
    fields: Vec<FieldInfo>,
}

#[derive(Debug, Serialize)]
struct LiteralInfo {
    method: String,
    index: usize,
    value: String,
}

#[derive(Debug, Serialize)]
struct FieldInfo {
    name: String,
    value: String,
}

fn text(class: &ClassFile, index: u16) -> anyhow::Result<String> {
    let units = class.constant_pool.string_units(index)?;
    Ok(String::from_utf16_lossy(&units))
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let class = ClassFile::from_path(path)
        .with_context(|| format!("failed to load class file: {}", path.display()))?;
    let sites = locate(&class)?;
    let pool = &class.constant_pool;

    let mut literals = Vec::with_capacity(sites.instructions.len());
    for site in &sites.instructions {
        let method = &class.methods[site.method];
        literals.push(LiteralInfo {
            method: format!("{}{}", method.name(pool)?, method.descriptor(pool)?),
            index: site.index,
            value: text(&class, site.value)?,
        });
    }

    let mut fields = Vec::with_capacity(sites.fields.len());
    for site in &sites.fields {
        fields.push(FieldInfo {
            name: class.fields[site.field].name(pool)?,
            value: text(&class, site.value)?,
        });
    }

    let inspection = Inspection {
        class: class.name()?,
        literals,
        fields,
    };
    print_output(&inspection, opts, print_inspection)
}

fn print_inspection(inspection: &Inspection) {
    println!("Class: {}", inspection.class);
    println!();

    if inspection.literals.is_empty() {
        println!("No literal loads.");
    } else {
        let mut table = TabWriter::new(&[
            ("Method", Align::Left),
            ("Index", Align::Right),
            ("Literal", Align::Left),
        ]);
        for literal in &inspection.literals {
            table.row(vec![
                literal.method.clone(),
                literal.index.to_string(),
                format!("{:?}", literal.value),
            ]);
        }
        table.print();
    }

    if !inspection.fields.is_empty() {
        println!();
        let mut table = TabWriter::new(&[("Field", Align::Left), ("Constant", Align::Left)]);
        for field in &inspection.fields {
            table.row(vec![field.name.clone(), format!("{:?}", field.value)]);
        }
        table.print();
    }
}
