use strum::{EnumIter, EnumString};

use super::ty::Type;

/// Builtin type names as they are spelled in source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveKind {
    Void,
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
}

impl PrimitiveKind {
    pub fn ty(self) -> Type {
        match self {
            PrimitiveKind::Void => Type::Void,
            PrimitiveKind::Bool => Type::Bool,
            PrimitiveKind::Int | PrimitiveKind::Int64 => Type::Int(IntKind::I64),
            PrimitiveKind::Int8 => Type::Int(IntKind::I8),
            PrimitiveKind::Int16 => Type::Int(IntKind::I16),
            PrimitiveKind::Int32 => Type::Int(IntKind::I32),
            PrimitiveKind::UInt | PrimitiveKind::UInt64 => Type::Int(IntKind::U64),
            PrimitiveKind::UInt8 => Type::Int(IntKind::U8),
            PrimitiveKind::UInt16 => Type::Int(IntKind::U16),
            PrimitiveKind::UInt32 => Type::Int(IntKind::U32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntKind {
    pub fn bits(self) -> u32 {
        match self {
            IntKind::I8 | IntKind::U8 => 8,
            IntKind::I16 | IntKind::U16 => 16,
            IntKind::I32 | IntKind::U32 => 32,
            IntKind::I64 | IntKind::U64 => 64,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IntKind::I8 | IntKind::I16 | IntKind::I32 | IntKind::I64)
    }

    /// Maps an integer literal suffix (`i8`, `u`, ...) to its kind
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "i" | "i64" => IntKind::I64,
            "i8" => IntKind::I8,
            "i16" => IntKind::I16,
            "i32" => IntKind::I32,
            "u" | "u64" => IntKind::U64,
            "u8" => IntKind::U8,
            "u16" => IntKind::U16,
            "u32" => IntKind::U32,
            _ => return None,
        })
    }
}

impl core::fmt::Display for IntKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntKind::I8 => write!(f, "int8"),
            IntKind::I16 => write!(f, "int16"),
            IntKind::I32 => write!(f, "int32"),
            IntKind::I64 => write!(f, "int"),
            IntKind::U8 => write!(f, "uint8"),
            IntKind::U16 => write!(f, "uint16"),
            IntKind::U32 => write!(f, "uint32"),
            IntKind::U64 => write!(f, "uint"),
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn primitive_names_round_trip_through_strum() {
        for kind in PrimitiveKind::iter() {
            assert_eq!(kind.to_string().parse::<PrimitiveKind>(), Ok(kind));
        }

        assert_eq!("uint16".parse::<PrimitiveKind>(), Ok(PrimitiveKind::UInt16));
        assert!("Point".parse::<PrimitiveKind>().is_err());
    }

    #[test]
    fn int_aliases_are_64_bit() {
        assert_eq!(PrimitiveKind::Int.ty(), Type::Int(IntKind::I64));
        assert_eq!(PrimitiveKind::UInt.ty(), Type::Int(IntKind::U64));
        assert_eq!(IntKind::from_suffix("u8"), Some(IntKind::U8));
        assert_eq!(IntKind::from_suffix("f"), None);
    }
}
