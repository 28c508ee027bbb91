#![no_main]

use libfuzzer_sys::fuzz_target;
use veil::{obfuscation::{locate, Patcher}, ClassFile, Codec, Variant};

fuzz_target!(|data: &[u8]| {
    let Ok(mut class) = ClassFile::from_bytes(data) else {
        return;
    };
    let _ = class.to_bytes();
    if let Ok(sites) = locate(&class) {
        if Patcher::new(Codec::new(7, Variant::ArraySplit))
            .patch(&mut class, &sites)
            .is_ok()
        {
            let _ = class.to_bytes();
        }
    }
});
