//! Class builders and decoding helpers shared by the integration tests.
#![allow(dead_code)]

use std::path::Path;

use veil::{
    assembly::{opcodes::*, Instruction},
    classfile::{
        ClassAccessFlags, Code, Constant, FieldAccessFlags, MethodAccessFlags, CLINIT,
        CLINIT_DESCRIPTOR,
    },
    obfuscation::{Codec, EncodedLiteral, DECODE_METHOD},
    ClassFile, DECODER_CLASS,
};

pub const STRING: &str = "Ljava/lang/String;";
pub const GETTER: &str = "()Ljava/lang/String;";

// Helper function to build a class with one getter per literal and optional string constants
pub fn class_with(name: &str, getters: &[(&str, &str)], constants: &[(&str, &str)]) -> ClassFile {
    let mut class = ClassFile::new(
        name,
        "java/lang/Object",
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        52,
    )
    .unwrap();

    for (field, value) in constants {
        let index = class
            .add_field(
                FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
                field,
                STRING,
            )
            .unwrap();
        let value = class.constant_pool.add_string(value).unwrap();
        class.fields[index]
            .set_constant_value(&mut class.constant_pool, value)
            .unwrap();
    }

    for (method, literal) in getters {
        let value = class.constant_pool.add_string(literal).unwrap();
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                method,
                GETTER,
                Some(Code::new(
                    0,
                    vec![Instruction::Ldc(value), Instruction::Simple(ARETURN)],
                )),
            )
            .unwrap();
    }
    class
}

// Helper function to write a class below `root` at its binary name
pub fn write_class(root: &Path, class: &ClassFile) {
    let path = root.join(format!("{}.class", class.name().unwrap()));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, class.to_bytes().unwrap()).unwrap();
}

// Helper function to load a class written below `root`
pub fn read_class(root: &Path, name: &str) -> ClassFile {
    ClassFile::from_path(&root.join(format!("{name}.class"))).unwrap()
}

fn instructions(class: &ClassFile, name: &str, descriptor: &str) -> Vec<Instruction> {
    let index = class.find_method(name, descriptor).unwrap();
    class.methods[index]
        .code()
        .unwrap()
        .instructions
        .iter()
        .filter(|insn| !insn.is_label())
        .cloned()
        .collect()
}

fn int_value(class: &ClassFile, insn: &Instruction) -> i64 {
    match insn {
        Instruction::Simple(op) if (ICONST_M1..=ICONST_5).contains(op) => {
            i64::from(*op) - i64::from(ICONST_0)
        }
        Instruction::Push { value, .. } => i64::from(*value),
        Instruction::Ldc(index) => match class.constant_pool.get(*index).unwrap() {
            Constant::Integer(value) => i64::from(*value),
            other => panic!("expected integer constant, found {other:?}"),
        },
        other => panic!("expected int push, found {other}"),
    }
}

fn long_value(class: &ClassFile, insn: &Instruction) -> i64 {
    match insn {
        Instruction::Simple(LCONST_0) => 0,
        Instruction::Simple(LCONST_1) => 1,
        Instruction::Ldc2(index) => match class.constant_pool.get(*index).unwrap() {
            Constant::Long(value) => *value,
            other => panic!("expected long constant, found {other:?}"),
        },
        other => panic!("expected long push, found {other}"),
    }
}

// Helper function to read back the encoded operand a decode call receives
fn encoded_operand(class: &ClassFile, body: &[Instruction]) -> EncodedLiteral {
    match body {
        [Instruction::Ldc(index)] => {
            EncodedLiteral::Text(class.constant_pool.string_units(*index).unwrap())
        }
        [len, Instruction::NewArray(_), elements @ ..] => {
            let len = usize::try_from(int_value(class, len)).unwrap();
            let mut values = vec![0_i64; len];
            for chunk in elements.chunks(4) {
                let [Instruction::Simple(DUP), index, value, Instruction::Simple(LASTORE)] = chunk
                else {
                    panic!("unexpected array store sequence {chunk:?}");
                };
                let slot = usize::try_from(int_value(class, index)).unwrap();
                values[slot] = long_value(class, value);
            }
            EncodedLiteral::Array(values)
        }
        other => panic!("unexpected decode operand {other:?}"),
    }
}

fn is_decode_call(class: &ClassFile, insn: &Instruction) -> bool {
    let Instruction::Invoke {
        opcode: INVOKESTATIC,
        index,
    } = insn
    else {
        return false;
    };
    let pool = &class.constant_pool;
    let Ok(Constant::MethodRef {
        class: owner,
        name_and_type,
    }) = pool.get(*index)
    else {
        return false;
    };
    let Ok(Constant::NameAndType { name, .. }) = pool.get(*name_and_type) else {
        return false;
    };
    pool.class_name(*owner).is_ok_and(|owner| owner == DECODER_CLASS)
        && pool.utf8_str(*name).is_ok_and(|name| name == DECODE_METHOD)
}

// Helper function to evaluate a rewritten getter back to the text it returns
pub fn getter_value(class: &ClassFile, method: &str, codec: &Codec) -> String {
    let body = instructions(class, method, GETTER);
    let (last, rest) = body.split_last().unwrap();
    assert_eq!(*last, Instruction::Simple(ARETURN));
    match rest {
        [Instruction::Ldc(index)] => {
            String::from_utf16(&class.constant_pool.string_units(*index).unwrap()).unwrap()
        }
        [operand @ .., call] => {
            assert!(is_decode_call(class, call), "expected decode call, found {call}");
            let units = codec.decode(&encoded_operand(class, operand)).unwrap();
            String::from_utf16(&units).unwrap()
        }
        [] => panic!("empty getter"),
    }
}

// Helper function to evaluate the `putstatic` assignments the static initializer performs
pub fn clinit_values(class: &ClassFile, codec: &Codec) -> Vec<(String, String)> {
    let Some(index) = class.find_method(CLINIT, CLINIT_DESCRIPTOR) else {
        return Vec::new();
    };
    let body: Vec<Instruction> = class.methods[index]
        .code()
        .unwrap()
        .instructions
        .iter()
        .filter(|insn| !insn.is_label())
        .cloned()
        .collect();

    let mut values = Vec::new();
    let mut start = 0;
    for (position, insn) in body.iter().enumerate() {
        let Instruction::Field {
            opcode: PUTSTATIC,
            index,
        } = insn
        else {
            continue;
        };
        let Constant::FieldRef { name_and_type, .. } = class.constant_pool.get(*index).unwrap()
        else {
            panic!("expected field reference");
        };
        let Constant::NameAndType { name, .. } = class.constant_pool.get(*name_and_type).unwrap()
        else {
            panic!("expected name and type");
        };
        let field = class.constant_pool.utf8_str(*name).unwrap();

        let call = &body[position - 1];
        assert!(is_decode_call(class, call), "expected decode call, found {call}");
        let units = codec
            .decode(&encoded_operand(class, &body[start..position - 1]))
            .unwrap();
        values.push((field, String::from_utf16(&units).unwrap()));
        start = position + 1;
    }
    values
}

// Helper function to check whether `text` is a string constant of `class`
pub fn pool_contains(class: &ClassFile, text: &str) -> bool {
    class.constant_pool.iter().any(|(index, constant)| {
        matches!(constant, Constant::String(_))
            && class
                .constant_pool
                .string_units(index)
                .is_ok_and(|units| String::from_utf16_lossy(&units) == text)
    })
}
