//! Access flag sets for classes, fields and methods.

use bitflags::bitflags;

bitflags! {
    /// `access_flags` of a class or interface
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ClassAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared final
        const FINAL = 0x0010;
        /// Treat superclass methods specially in `invokespecial`
        const SUPER = 0x0020;
        /// An interface
        const INTERFACE = 0x0200;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// An annotation interface
        const ANNOTATION = 0x2000;
        /// An enum class
        const ENUM = 0x4000;
        /// A module descriptor
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// `access_flags` of a field
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FieldAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Declared volatile
        const VOLATILE = 0x0040;
        /// Declared transient
        const TRANSIENT = 0x0080;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// An enum constant
        const ENUM = 0x4000;
    }
}

impl FieldAccessFlags {
    /// Visibility modifiers
    pub const VISIBILITY: Self = Self::PUBLIC.union(Self::PRIVATE).union(Self::PROTECTED);

    /// Returns `true` for a compile-time constant field eligible for rewriting.
    ///
    /// The field must be exactly `static final` plus at most one visibility modifier.
    /// Anything else (volatile, transient, synthetic, enum) disqualifies it.
    #[must_use]
    pub fn is_plain_constant(self) -> bool {
        let rest = self.difference(Self::STATIC | Self::FINAL);
        self.contains(Self::STATIC | Self::FINAL)
            && Self::VISIBILITY.contains(rest)
            && rest.bits().count_ones() <= 1
    }
}

bitflags! {
    /// `access_flags` of a method
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MethodAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Declared synchronized
        const SYNCHRONIZED = 0x0020;
        /// A compiler-generated bridge method
        const BRIDGE = 0x0040;
        /// Declared with variable arity
        const VARARGS = 0x0080;
        /// Declared native
        const NATIVE = 0x0100;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Declared strictfp
        const STRICT = 0x0800;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_constants() {
        let sf = FieldAccessFlags::STATIC | FieldAccessFlags::FINAL;
        assert!(sf.is_plain_constant());
        assert!((sf | FieldAccessFlags::PUBLIC).is_plain_constant());
        assert!((sf | FieldAccessFlags::PRIVATE).is_plain_constant());
        assert!((sf | FieldAccessFlags::PROTECTED).is_plain_constant());

        assert!(!(sf | FieldAccessFlags::PUBLIC | FieldAccessFlags::PRIVATE).is_plain_constant());
        assert!(!(sf | FieldAccessFlags::SYNTHETIC).is_plain_constant());
        assert!(!(sf | FieldAccessFlags::VOLATILE).is_plain_constant());
        assert!(!FieldAccessFlags::STATIC.is_plain_constant());
        assert!(!(FieldAccessFlags::FINAL | FieldAccessFlags::PUBLIC).is_plain_constant());
    }
}
