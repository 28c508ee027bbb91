mod common;

use veil::{
    obfuscation::{locate, EncodedLiteral, Patcher, MAX_ARRAY_LENGTH},
    Codec, Filter, Variant,
};

fn units(len: usize) -> Vec<u16> {
    (0..len).map(|i| u16::try_from(i % 0xD7FF).unwrap()).collect()
}

#[test]
fn round_trips() {
    let samples = ["", "a", "secret-token", "héllo ✓", "\u{1F512} locked", "\0nul"];
    for variant in [Variant::ShiftCipher, Variant::ArraySplit] {
        for key in [0, 7, -1, 2021, i32::MAX, i32::MIN] {
            let codec = Codec::new(key, variant);
            for sample in samples {
                let plain: Vec<u16> = sample.encode_utf16().collect();
                let Some(encoded) = codec.encode(&plain) else {
                    assert!(plain.is_empty() && variant == Variant::ArraySplit);
                    continue;
                };
                assert_eq!(codec.decode(&encoded).unwrap(), plain, "{variant} {key}");
            }
        }
    }
}

#[test]
fn array_length_boundary() {
    let codec = Codec::new(2021, Variant::ArraySplit);
    assert_eq!(MAX_ARRAY_LENGTH, 65535);

    let longest = units(MAX_ARRAY_LENGTH);
    let Some(EncodedLiteral::Array(values)) = codec.encode(&longest) else {
        panic!("65535 units must be encoded");
    };
    assert_eq!(values.len(), MAX_ARRAY_LENGTH);
    assert_eq!(
        codec.decode(&EncodedLiteral::Array(values)).unwrap(),
        longest
    );

    assert!(codec.encode(&units(MAX_ARRAY_LENGTH + 1)).is_none());
    assert!(codec.encode(&[]).is_none());
}

#[test]
fn wrong_variant_is_rejected() {
    let shift = Codec::new(7, Variant::ShiftCipher);
    let split = Codec::new(7, Variant::ArraySplit);
    let encoded = split.encode(&[0x61]).unwrap();
    assert!(shift.decode(&encoded).is_err());
}

#[test]
fn oversized_literal_leaves_method_alone() {
    let literal = "x".repeat(20_000);
    let mut class = common::class_with("com/app/Big", &[("big", &literal), ("small", "ok")], &[]);
    let sites = locate(&class).unwrap();

    let codec = Codec::new(7, Variant::ArraySplit);
    let stats = Patcher::new(codec).patch(&mut class, &sites).unwrap();
    assert_eq!(stats.skipped_methods, 1);
    assert_eq!(stats.literals, 1);

    let class = veil::ClassFile::from_bytes(&class.to_bytes().unwrap()).unwrap();
    assert_eq!(common::getter_value(&class, "big", &codec), literal);
    assert_eq!(common::getter_value(&class, "small", &codec), "ok");
}

#[test]
fn filter_semantics() {
    let include = Filter::new(["com/app/secret"], Vec::<String>::new());
    assert!(include.admits("com/app/secret/Foo"));
    assert!(!include.admits("com/app/other/Bar"));

    let exclude = Filter::new(Vec::<String>::new(), ["com/app/public"]);
    assert!(!exclude.admits("com/app/public/Bar"));
    assert!(exclude.admits("com/app/secret/Foo"));

    let everything = Filter::new(Vec::<String>::new(), Vec::<String>::new());
    assert!(everything.admits("any/Thing"));

    let dotted = Filter::new(["com.app.secret"], ["com.app.secret.Open"]);
    assert!(dotted.admits("com/app/secret/Foo"));
    assert!(!dotted.admits("com/app/secret/Open"));
}
