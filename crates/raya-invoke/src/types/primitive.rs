//! Primitive value types and widening conversions
//!
//! Primitive payloads are stored in boxes and argument slots using their
//! native Rust representation. Widening follows the usual reflection binder
//! rules: a narrower integer may be passed where a wider integer or a float
//! is expected, never the other way round.

/// A UTF-16 code unit, the payload of the `Char` primitive
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Char16(pub u16);

/// The closed set of primitive value types known to the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// `bool`
    Boolean,
    /// [`Char16`]
    Char,
    /// `i8`
    SByte,
    /// `u8`
    Byte,
    /// `i16`
    Int16,
    /// `u16`
    UInt16,
    /// `i32`
    Int32,
    /// `u32`
    UInt32,
    /// `i64`
    Int64,
    /// `u64`
    UInt64,
    /// `f32`
    Single,
    /// `f64`
    Double,
    /// `isize`
    IntPtr,
    /// `usize`
    UIntPtr,
}

impl PrimitiveKind {
    /// All primitive kinds, in registration order
    pub const ALL: [PrimitiveKind; 14] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Char,
        PrimitiveKind::SByte,
        PrimitiveKind::Byte,
        PrimitiveKind::Int16,
        PrimitiveKind::UInt16,
        PrimitiveKind::Int32,
        PrimitiveKind::UInt32,
        PrimitiveKind::Int64,
        PrimitiveKind::UInt64,
        PrimitiveKind::Single,
        PrimitiveKind::Double,
        PrimitiveKind::IntPtr,
        PrimitiveKind::UIntPtr,
    ];

    /// Runtime type name
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::SByte => "SByte",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Int16 => "Int16",
            PrimitiveKind::UInt16 => "UInt16",
            PrimitiveKind::Int32 => "Int32",
            PrimitiveKind::UInt32 => "UInt32",
            PrimitiveKind::Int64 => "Int64",
            PrimitiveKind::UInt64 => "UInt64",
            PrimitiveKind::Single => "Single",
            PrimitiveKind::Double => "Double",
            PrimitiveKind::IntPtr => "IntPtr",
            PrimitiveKind::UIntPtr => "UIntPtr",
        }
    }

    /// Payload size in bytes
    pub fn size(self) -> usize {
        match self {
            PrimitiveKind::Boolean | PrimitiveKind::SByte | PrimitiveKind::Byte => 1,
            PrimitiveKind::Char | PrimitiveKind::Int16 | PrimitiveKind::UInt16 => 2,
            PrimitiveKind::Int32 | PrimitiveKind::UInt32 | PrimitiveKind::Single => 4,
            PrimitiveKind::Int64 | PrimitiveKind::UInt64 | PrimitiveKind::Double => 8,
            PrimitiveKind::IntPtr | PrimitiveKind::UIntPtr => std::mem::size_of::<usize>(),
        }
    }

    /// Whether a value of this kind may be passed where `target` is expected
    pub fn can_widen_to(self, target: PrimitiveKind) -> bool {
        use PrimitiveKind::*;
        if self == target {
            return true;
        }
        match self {
            Byte => matches!(
                target,
                Char | UInt16 | Int16 | UInt32 | Int32 | UInt64 | Int64 | Single | Double
            ),
            Char => matches!(target, UInt16 | UInt32 | Int32 | UInt64 | Int64 | Single | Double),
            SByte => matches!(target, Int16 | Int32 | Int64 | Single | Double),
            UInt16 => matches!(
                target,
                Char | UInt32 | Int32 | UInt64 | Int64 | Single | Double
            ),
            Int16 => matches!(target, Int32 | Int64 | Single | Double),
            UInt32 => matches!(target, UInt64 | Int64 | Single | Double),
            Int32 => matches!(target, Int64 | Single | Double),
            UInt64 | Int64 => matches!(target, Single | Double),
            Single => target == Double,
            Boolean | Double | IntPtr | UIntPtr => false,
        }
    }
}

/// A primitive value read out of (or about to be written into) a payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitiveValue {
    /// `bool`
    Boolean(bool),
    /// [`Char16`]
    Char(Char16),
    /// `i8`
    SByte(i8),
    /// `u8`
    Byte(u8),
    /// `i16`
    Int16(i16),
    /// `u16`
    UInt16(u16),
    /// `i32`
    Int32(i32),
    /// `u32`
    UInt32(u32),
    /// `i64`
    Int64(i64),
    /// `u64`
    UInt64(u64),
    /// `f32`
    Single(f32),
    /// `f64`
    Double(f64),
    /// `isize`
    IntPtr(isize),
    /// `usize`
    UIntPtr(usize),
}

impl PrimitiveValue {
    /// The kind of this value
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveKind::Boolean,
            PrimitiveValue::Char(_) => PrimitiveKind::Char,
            PrimitiveValue::SByte(_) => PrimitiveKind::SByte,
            PrimitiveValue::Byte(_) => PrimitiveKind::Byte,
            PrimitiveValue::Int16(_) => PrimitiveKind::Int16,
            PrimitiveValue::UInt16(_) => PrimitiveKind::UInt16,
            PrimitiveValue::Int32(_) => PrimitiveKind::Int32,
            PrimitiveValue::UInt32(_) => PrimitiveKind::UInt32,
            PrimitiveValue::Int64(_) => PrimitiveKind::Int64,
            PrimitiveValue::UInt64(_) => PrimitiveKind::UInt64,
            PrimitiveValue::Single(_) => PrimitiveKind::Single,
            PrimitiveValue::Double(_) => PrimitiveKind::Double,
            PrimitiveValue::IntPtr(_) => PrimitiveKind::IntPtr,
            PrimitiveValue::UIntPtr(_) => PrimitiveKind::UIntPtr,
        }
    }

    /// Read a primitive of `kind` from a payload address
    ///
    /// # Safety
    ///
    /// `ptr` must point to at least `kind.size()` readable bytes holding a
    /// valid value of that kind, aligned for it.
    pub unsafe fn read(kind: PrimitiveKind, ptr: *const u8) -> Self {
        match kind {
            PrimitiveKind::Boolean => PrimitiveValue::Boolean(*ptr != 0),
            PrimitiveKind::Char => PrimitiveValue::Char(Char16(*(ptr as *const u16))),
            PrimitiveKind::SByte => PrimitiveValue::SByte(*(ptr as *const i8)),
            PrimitiveKind::Byte => PrimitiveValue::Byte(*ptr),
            PrimitiveKind::Int16 => PrimitiveValue::Int16(*(ptr as *const i16)),
            PrimitiveKind::UInt16 => PrimitiveValue::UInt16(*(ptr as *const u16)),
            PrimitiveKind::Int32 => PrimitiveValue::Int32(*(ptr as *const i32)),
            PrimitiveKind::UInt32 => PrimitiveValue::UInt32(*(ptr as *const u32)),
            PrimitiveKind::Int64 => PrimitiveValue::Int64(*(ptr as *const i64)),
            PrimitiveKind::UInt64 => PrimitiveValue::UInt64(*(ptr as *const u64)),
            PrimitiveKind::Single => PrimitiveValue::Single(*(ptr as *const f32)),
            PrimitiveKind::Double => PrimitiveValue::Double(*(ptr as *const f64)),
            PrimitiveKind::IntPtr => PrimitiveValue::IntPtr(*(ptr as *const isize)),
            PrimitiveKind::UIntPtr => PrimitiveValue::UIntPtr(*(ptr as *const usize)),
        }
    }

    /// Write this value to a payload address
    ///
    /// # Safety
    ///
    /// `ptr` must point to at least `self.kind().size()` writable bytes,
    /// aligned for the value.
    pub unsafe fn write(&self, ptr: *mut u8) {
        match *self {
            PrimitiveValue::Boolean(v) => *ptr = v as u8,
            PrimitiveValue::Char(v) => *(ptr as *mut u16) = v.0,
            PrimitiveValue::SByte(v) => *(ptr as *mut i8) = v,
            PrimitiveValue::Byte(v) => *ptr = v,
            PrimitiveValue::Int16(v) => *(ptr as *mut i16) = v,
            PrimitiveValue::UInt16(v) => *(ptr as *mut u16) = v,
            PrimitiveValue::Int32(v) => *(ptr as *mut i32) = v,
            PrimitiveValue::UInt32(v) => *(ptr as *mut u32) = v,
            PrimitiveValue::Int64(v) => *(ptr as *mut i64) = v,
            PrimitiveValue::UInt64(v) => *(ptr as *mut u64) = v,
            PrimitiveValue::Single(v) => *(ptr as *mut f32) = v,
            PrimitiveValue::Double(v) => *(ptr as *mut f64) = v,
            PrimitiveValue::IntPtr(v) => *(ptr as *mut isize) = v,
            PrimitiveValue::UIntPtr(v) => *(ptr as *mut usize) = v,
        }
    }

    /// Convert to `target` if the conversion is a widening one
    pub fn widen(self, target: PrimitiveKind) -> Option<PrimitiveValue> {
        if !self.kind().can_widen_to(target) {
            return None;
        }
        if self.kind() == target {
            return Some(self);
        }

        // Every widening source fits losslessly in i128 or is a float.
        let float = match self {
            PrimitiveValue::Single(v) => Some(v as f64),
            _ => None,
        };
        let int: i128 = match self {
            PrimitiveValue::SByte(v) => v as i128,
            PrimitiveValue::Byte(v) => v as i128,
            PrimitiveValue::Char(v) => v.0 as i128,
            PrimitiveValue::Int16(v) => v as i128,
            PrimitiveValue::UInt16(v) => v as i128,
            PrimitiveValue::Int32(v) => v as i128,
            PrimitiveValue::UInt32(v) => v as i128,
            PrimitiveValue::Int64(v) => v as i128,
            PrimitiveValue::UInt64(v) => v as i128,
            _ => 0,
        };

        let widened = match target {
            PrimitiveKind::Char => PrimitiveValue::Char(Char16(int as u16)),
            PrimitiveKind::Int16 => PrimitiveValue::Int16(int as i16),
            PrimitiveKind::UInt16 => PrimitiveValue::UInt16(int as u16),
            PrimitiveKind::Int32 => PrimitiveValue::Int32(int as i32),
            PrimitiveKind::UInt32 => PrimitiveValue::UInt32(int as u32),
            PrimitiveKind::Int64 => PrimitiveValue::Int64(int as i64),
            PrimitiveKind::UInt64 => PrimitiveValue::UInt64(int as u64),
            PrimitiveKind::Single => PrimitiveValue::Single(int as f32),
            PrimitiveKind::Double => PrimitiveValue::Double(float.unwrap_or(int as f64)),
            _ => return None,
        };
        Some(widened)
    }
}
