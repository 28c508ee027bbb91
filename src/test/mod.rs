
use crate::{
    assembly::{Instruction, Label},
    classfile::{ClassFile, Code},
};

// Helper function to collect the non-label instructions of a method
pub fn body(class: &ClassFile, name: &str, descriptor: &str) -> Vec<Instruction> {
    let index = class
        .find_method(name, descriptor)
        .unwrap_or_else(|| panic!("method {name}{descriptor} not found"));
    class.methods[index]
        .code()
        .unwrap()
        .instructions
        .iter()
        .filter(|insn| !insn.is_label())
        .cloned()
        .collect()
}

// Helper function to decode the text of a string constant
pub fn string_at(class: &ClassFile, index: u16) -> String {
    String::from_utf16(&class.constant_pool.string_units(index).unwrap()).unwrap()
}

// Helper function to find the instruction a label marker precedes
pub fn labelled(code: &Code, label: Label) -> &Instruction {
    let position = code.label_position(label).unwrap();
    code.instructions[position..]
        .iter()
        .find(|insn| !insn.is_label())
        .unwrap()
}

// Helper function to serialize and parse a class again
pub fn reparse(class: &ClassFile) -> ClassFile {
    ClassFile::from_bytes(&class.to_bytes().unwrap()).unwrap()
}
