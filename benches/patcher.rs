//! Benchmarks for class rewriting.
//!
//! Builds a synthetic class with many literal getters and measures:
//! - Locating literal sites
//! - Patching a parsed class
//! - The full parse, locate, patch and serialize cycle of one unit

extern crate veil;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use veil::{
    assembly::{opcodes::ARETURN, Instruction},
    build::UnitTransformer,
    classfile::{ClassAccessFlags, Code, FieldAccessFlags, MethodAccessFlags},
    obfuscation::{locate, Patcher},
    ClassFile, Codec, Config, File, Variant,
};

/// A class with `getters` literal-returning methods and as many string constants.
fn synthetic_class(getters: usize) -> ClassFile {
    let mut class = ClassFile::new(
        "bench/Strings",
        "java/lang/Object",
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        52,
    )
    .unwrap();
    for i in 0..getters {
        let value = class
            .constant_pool
            .add_string(&format!("literal number {i} with some padding"))
            .unwrap();
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                &format!("get{i}"),
                "()Ljava/lang/String;",
                Some(Code::new(
                    0,
                    vec![Instruction::Ldc(value), Instruction::Simple(ARETURN)],
                )),
            )
            .unwrap();

        let field = class
            .add_field(
                FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
                &format!("CONST_{i}"),
                "Ljava/lang/String;",
            )
            .unwrap();
        let constant = class
            .constant_pool
            .add_string(&format!("constant {i}"))
            .unwrap();
        class.fields[field]
            .set_constant_value(&mut class.constant_pool, constant)
            .unwrap();
    }
    class
}

fn bench_locate(c: &mut Criterion) {
    let class = synthetic_class(200);
    c.bench_function("patcher_locate_200", |b| {
        b.iter(|| black_box(locate(black_box(&class)).unwrap()));
    });
}

fn bench_patch(c: &mut Criterion) {
    let class = synthetic_class(200);
    let sites = locate(&class).unwrap();
    for variant in [Variant::ShiftCipher, Variant::ArraySplit] {
        let patcher = Patcher::new(Codec::new(2021, variant));
        c.bench_function(&format!("patcher_patch_200_{variant}"), |b| {
            b.iter_batched(
                || class.clone(),
                |mut class| black_box(patcher.patch(&mut class, &sites).unwrap()),
                criterion::BatchSize::SmallInput,
            );
        });
    }
}

fn bench_unit(c: &mut Criterion) {
    let bytes = synthetic_class(200).to_bytes().unwrap();
    let file = File::from_mem(bytes).unwrap();
    let unit = UnitTransformer::new(&Config::default());
    c.bench_function("patcher_unit_200", |b| {
        b.iter(|| black_box(unit.transform(black_box(&file)).unwrap()));
    });
}

criterion_group!(benches, bench_locate, bench_patch, bench_unit);
criterion_main!(benches);
