//! Synthesis of the runtime decoder class.
//!
//! Every rewritten call site invokes `veil/runtime/Veil.decode`. This module assembles that
//! class from scratch for a given [`crate::obfuscation::Codec`]:
//!
//! ```java
//! public final class Veil {
//!     private static final java.util.Map cache = new java.util.concurrent.ConcurrentHashMap();
//!     private Veil() {}
//!     public static String decode(String encoded)   // shift cipher
//!     public static String decode(long[] encoded)   // array split
//! }
//! ```
//!
//! `decode` returns the cached plaintext for a previously seen input, otherwise it
//! reverses the codec with the embedded key and caches the result. Array inputs are keyed
//! through `java.nio.LongBuffer.wrap`, which compares contents. The class is emitted as
//! version 49.0, which the verifier accepts without stack map frames.

use crate::{
    assembly::{opcodes::*, Instruction},
    classfile::{
        ClassAccessFlags, ClassFile, Code, FieldAccessFlags, MethodAccessFlags, CLINIT,
        CLINIT_DESCRIPTOR,
    },
    obfuscation::{Codec, Variant},
    Result,
};

/// Internal name of the decoder class.
pub const DECODER_CLASS: &str = "veil/runtime/Veil";
/// Name of the decoding method.
pub const DECODE_METHOD: &str = "decode";
/// Class file version of the decoder unit (Java 5).
pub const DECODER_VERSION: u16 = 49;

const CACHE_FIELD: &str = "cache";
const MAP: &str = "java/util/Map";
const MAP_DESCRIPTOR: &str = "Ljava/util/Map;";
const CACHE_IMPL: &str = "java/util/concurrent/ConcurrentHashMap";
const OBJECT: &str = "java/lang/Object";
const STRING_CLASS: &str = "java/lang/String";
const LONG_BUFFER: &str = "java/nio/LongBuffer";

/// Returns the descriptor of `decode` for `variant`.
#[must_use]
pub fn decode_descriptor(variant: Variant) -> &'static str {
    match variant {
        Variant::ShiftCipher => "(Ljava/lang/String;)Ljava/lang/String;",
        Variant::ArraySplit => "([J)Ljava/lang/String;",
    }
}

/// Returns `true` if `name` is the internal name of the decoder class.
#[must_use]
pub fn is_decoder_class(name: &str) -> bool {
    name == DECODER_CLASS
}

/// Builds the decoder class for `codec`.
///
/// # Errors
/// Returns an error only if the generated code cannot be laid out, which does not happen
/// for the fixed shapes produced here.
pub fn synthesize(codec: &Codec) -> Result<ClassFile> {
    let mut class = ClassFile::new(
        DECODER_CLASS,
        OBJECT,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::SUPER,
        DECODER_VERSION,
    )?;

    class.add_field(
        FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        CACHE_FIELD,
        MAP_DESCRIPTOR,
    )?;

    let clinit = static_initializer(&mut class)?;
    class.add_method(MethodAccessFlags::STATIC, CLINIT, CLINIT_DESCRIPTOR, Some(clinit))?;

    let init = constructor(&mut class)?;
    class.add_method(MethodAccessFlags::PRIVATE, "<init>", "()V", Some(init))?;

    let decode = match codec.variant() {
        Variant::ShiftCipher => shift_decode(&mut class, codec.key())?,
        Variant::ArraySplit => array_decode(&mut class, codec.key())?,
    };
    class.add_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        DECODE_METHOD,
        decode_descriptor(codec.variant()),
        Some(decode),
    )?;

    Ok(class)
}

/// Builds the serialized decoder class for `codec`.
///
/// # Errors
/// See [`synthesize`].
pub fn synthesize_bytes(codec: &Codec) -> Result<Vec<u8>> {
    synthesize(codec)?.to_bytes()
}

fn static_initializer(class: &mut ClassFile) -> Result<Code> {
    let pool = &mut class.constant_pool;
    let cache_impl = pool.add_class(CACHE_IMPL)?;
    let cache_init = pool.add_method_ref(CACHE_IMPL, "<init>", "()V")?;
    let cache = pool.add_field_ref(DECODER_CLASS, CACHE_FIELD, MAP_DESCRIPTOR)?;

    Ok(Code::new(
        0,
        vec![
            Instruction::Type {
                opcode: NEW,
                index: cache_impl,
            },
            Instruction::Simple(DUP),
            Instruction::Invoke {
                opcode: INVOKESPECIAL,
                index: cache_init,
            },
            Instruction::Field {
                opcode: PUTSTATIC,
                index: cache,
            },
            Instruction::Simple(RETURN),
        ],
    ))
}

fn constructor(class: &mut ClassFile) -> Result<Code> {
    let object_init = class.constant_pool.add_method_ref(OBJECT, "<init>", "()V")?;
    Ok(Code::new(
        1,
        vec![
            Instruction::Simple(ALOAD_0),
            Instruction::Invoke {
                opcode: INVOKESPECIAL,
                index: object_init,
            },
            Instruction::Simple(RETURN),
        ],
    ))
}

/// Constant pool references shared by both decode bodies.
struct Refs {
    cache: u16,
    get: u16,
    put: u16,
    string: u16,
    string_init: u16,
    key: Instruction,
}

impl Refs {
    fn add(class: &mut ClassFile, key: i32) -> Result<Self> {
        let pool = &mut class.constant_pool;
        let key = match Instruction::push_int(key) {
            Some(push) => push,
            None => Instruction::Ldc(pool.add_integer(key)?),
        };
        Ok(Refs {
            cache: pool.add_field_ref(DECODER_CLASS, CACHE_FIELD, MAP_DESCRIPTOR)?,
            get: pool.add_interface_method_ref(MAP, "get", "(Ljava/lang/Object;)Ljava/lang/Object;")?,
            put: pool.add_interface_method_ref(
                MAP,
                "put",
                "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
            )?,
            string: pool.add_class(STRING_CLASS)?,
            string_init: pool.add_method_ref(STRING_CLASS, "<init>", "([C)V")?,
            key,
        })
    }

    /// `getstatic cache; <key>; invokeinterface get; checkcast String; astore result;
    /// aload result; ifnull miss; aload result; areturn; miss:`
    fn lookup(&self, code: &mut Code, load_key: Instruction, result: u16) {
        let miss = code.new_label();
        code.instructions.extend([
            Instruction::Field {
                opcode: GETSTATIC,
                index: self.cache,
            },
            load_key,
            Instruction::InvokeInterface {
                index: self.get,
                count: 2,
            },
            Instruction::Type {
                opcode: CHECKCAST,
                index: self.string,
            },
            Instruction::Local {
                opcode: ASTORE,
                index: result,
            },
            Instruction::Local {
                opcode: ALOAD,
                index: result,
            },
            Instruction::Jump {
                opcode: IFNULL,
                target: miss,
            },
            Instruction::Local {
                opcode: ALOAD,
                index: result,
            },
            Instruction::Simple(ARETURN),
            Instruction::Label(miss),
        ]);
    }

    /// `new String(chars)`, stored in the cache under the key and returned.
    fn store(&self, code: &mut Code, load_key: Instruction, chars: u16, result: u16) {
        code.instructions.extend([
            Instruction::Type {
                opcode: NEW,
                index: self.string,
            },
            Instruction::Simple(DUP),
            Instruction::Local {
                opcode: ALOAD,
                index: chars,
            },
            Instruction::Invoke {
                opcode: INVOKESPECIAL,
                index: self.string_init,
            },
            Instruction::Local {
                opcode: ASTORE,
                index: result,
            },
            Instruction::Field {
                opcode: GETSTATIC,
                index: self.cache,
            },
            load_key,
            Instruction::Local {
                opcode: ALOAD,
                index: result,
            },
            Instruction::InvokeInterface {
                index: self.put,
                count: 3,
            },
            Instruction::Simple(POP),
            Instruction::Local {
                opcode: ALOAD,
                index: result,
            },
            Instruction::Simple(ARETURN),
        ]);
    }
}

/// `decode(String)`. Locals: 0 encoded, 1 result, 2 chars, 3 i.
fn shift_decode(class: &mut ClassFile, key: i32) -> Result<Code> {
    const ENCODED: u16 = 0;
    const RESULT: u16 = 1;
    const CHARS: u16 = 2;
    const INDEX: u16 = 3;

    let refs = Refs::add(class, key)?;
    let to_char_array = class
        .constant_pool
        .add_method_ref(STRING_CLASS, "toCharArray", "()[C")?;

    let load_encoded = Instruction::Local {
        opcode: ALOAD,
        index: ENCODED,
    };

    let mut code = Code::new(4, Vec::new());
    refs.lookup(&mut code, load_encoded.clone(), RESULT);

    let head = code.new_label();
    let done = code.new_label();
    code.instructions.extend([
        load_encoded.clone(),
        Instruction::Invoke {
            opcode: INVOKEVIRTUAL,
            index: to_char_array,
        },
        Instruction::Local {
            opcode: ASTORE,
            index: CHARS,
        },
        Instruction::Simple(ICONST_0),
        Instruction::Local {
            opcode: ISTORE,
            index: INDEX,
        },
        Instruction::Label(head),
        Instruction::Local {
            opcode: ILOAD,
            index: INDEX,
        },
        Instruction::Local {
            opcode: ALOAD,
            index: CHARS,
        },
        Instruction::Simple(ARRAYLENGTH),
        Instruction::Jump {
            opcode: IF_ICMPGE,
            target: done,
        },
        // chars[i] = (char) (chars[i] ^ key)
        Instruction::Local {
            opcode: ALOAD,
            index: CHARS,
        },
        Instruction::Local {
            opcode: ILOAD,
            index: INDEX,
        },
        Instruction::Local {
            opcode: ALOAD,
            index: CHARS,
        },
        Instruction::Local {
            opcode: ILOAD,
            index: INDEX,
        },
        Instruction::Simple(CALOAD),
        refs.key.clone(),
        Instruction::Simple(IXOR),
        Instruction::Simple(I2C),
        Instruction::Simple(CASTORE),
        Instruction::Iinc {
            index: INDEX,
            delta: 1,
        },
        Instruction::Jump {
            opcode: GOTO,
            target: head,
        },
        Instruction::Label(done),
    ]);

    refs.store(&mut code, load_encoded, CHARS, RESULT);
    Ok(code)
}

/// `decode(long[])`. Locals: 0 encoded, 1 cache key, 2 result, 3 chars, 4 i,
/// 5-6 element, 7 position.
fn array_decode(class: &mut ClassFile, key: i32) -> Result<Code> {
    const ENCODED: u16 = 0;
    const CACHE_KEY: u16 = 1;
    const RESULT: u16 = 2;
    const CHARS: u16 = 3;
    const INDEX: u16 = 4;
    const ELEMENT: u16 = 5;
    const POSITION: u16 = 7;

    let refs = Refs::add(class, key)?;
    let wrap = class.constant_pool.add_method_ref(
        LONG_BUFFER,
        "wrap",
        "([J)Ljava/nio/LongBuffer;",
    )?;

    let load_cache_key = Instruction::Local {
        opcode: ALOAD,
        index: CACHE_KEY,
    };

    let mut code = Code::new(8, Vec::new());
    code.instructions.extend([
        Instruction::Local {
            opcode: ALOAD,
            index: ENCODED,
        },
        Instruction::Invoke {
            opcode: INVOKESTATIC,
            index: wrap,
        },
        Instruction::Local {
            opcode: ASTORE,
            index: CACHE_KEY,
        },
    ]);
    refs.lookup(&mut code, load_cache_key.clone(), RESULT);

    let head = code.new_label();
    let done = code.new_label();
    code.instructions.extend([
        Instruction::Local {
            opcode: ALOAD,
            index: ENCODED,
        },
        Instruction::Simple(ARRAYLENGTH),
        Instruction::NewArray(T_CHAR),
        Instruction::Local {
            opcode: ASTORE,
            index: CHARS,
        },
        Instruction::Simple(ICONST_0),
        Instruction::Local {
            opcode: ISTORE,
            index: INDEX,
        },
        Instruction::Label(head),
        Instruction::Local {
            opcode: ILOAD,
            index: INDEX,
        },
        Instruction::Local {
            opcode: ALOAD,
            index: ENCODED,
        },
        Instruction::Simple(ARRAYLENGTH),
        Instruction::Jump {
            opcode: IF_ICMPGE,
            target: done,
        },
        // long v = encoded[i]; int p = (int) (v >>> 32);
        Instruction::Local {
            opcode: ALOAD,
            index: ENCODED,
        },
        Instruction::Local {
            opcode: ILOAD,
            index: INDEX,
        },
        Instruction::Simple(LALOAD),
        Instruction::Local {
            opcode: LSTORE,
            index: ELEMENT,
        },
        Instruction::Local {
            opcode: LLOAD,
            index: ELEMENT,
        },
        Instruction::Push {
            opcode: BIPUSH,
            value: 32,
        },
        Instruction::Simple(LUSHR),
        Instruction::Simple(L2I),
        Instruction::Local {
            opcode: ISTORE,
            index: POSITION,
        },
        // chars[p] = (char) ((int) v ^ key ^ p)
        Instruction::Local {
            opcode: ALOAD,
            index: CHARS,
        },
        Instruction::Local {
            opcode: ILOAD,
            index: POSITION,
        },
        Instruction::Local {
            opcode: LLOAD,
            index: ELEMENT,
        },
        Instruction::Simple(L2I),
        refs.key.clone(),
        Instruction::Simple(IXOR),
        Instruction::Local {
            opcode: ILOAD,
            index: POSITION,
        },
        Instruction::Simple(IXOR),
        Instruction::Simple(I2C),
        Instruction::Simple(CASTORE),
        Instruction::Iinc {
            index: INDEX,
            delta: 1,
        },
        Instruction::Jump {
            opcode: GOTO,
            target: head,
        },
        Instruction::Label(done),
    ]);

    refs.store(&mut code, load_cache_key, CHARS, RESULT);
    Ok(code)
}
