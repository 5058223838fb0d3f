use std::rc::Rc;

use crate::{
    frontend::{ast::NodeId, intern::InternedSymbol},
    middle::primitive::IntKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// void
    Void,
    // true, false
    Bool,
    /// int8, uint, etc.
    Int(IntKind),
    /// An instance of a class, stored by value
    Class { id: NodeId, name: InternedSymbol },
    /// Point&
    ///
    /// Reference to an instance stored elsewhere. Receivers of methods have
    /// this type.
    Reference(Box<Type>),
    /// The signature of something callable. Methods include their receiver
    /// as the first parameter.
    Function {
        parameters: Rc<[Type]>,
        return_type: Box<Type>,
        is_variadic: bool,
    },
    /// The type which is created as a result of some illegal operation which we
    /// can't compute the type of. If you find this in your type, there is no
    /// use emitting another error since one has already been created.
    Error,
}

impl Type {
    pub fn class(id: NodeId, name: InternedSymbol) -> Self {
        Type::Class { id, name }
    }

    pub fn reference(self) -> Self {
        Type::Reference(Box::new(self))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    /// The class whose members are reachable through a value of this type
    pub fn class_id(&self) -> Option<NodeId> {
        match self {
            Type::Class { id, .. } => Some(*id),
            Type::Reference(inner) => inner.class_id(),
            _ => None,
        }
    }

    /// Whether a value of type `other` may be stored where `self` is expected.
    /// Integers convert freely between widths and an error type converts to
    /// anything since it has already been reported.
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Error, _) | (_, Type::Error) => true,
            (Type::Int(_), Type::Int(_)) => true,
            (Type::Reference(expected), Type::Reference(found)) => expected == found,
            (Type::Reference(expected), found) => **expected == *found,
            (expected, found) => expected == found,
        }
    }

    /// Applies `remap` to every class identity inside the type
    pub fn remap_classes(&mut self, remap: &impl Fn(NodeId) -> NodeId) {
        match self {
            Type::Class { id, .. } => *id = remap(*id),
            Type::Reference(inner) => inner.remap_classes(remap),
            Type::Function {
                parameters,
                return_type,
                ..
            } => {
                let mut remapped = parameters.to_vec();
                for parameter in &mut remapped {
                    parameter.remap_classes(remap);
                }
                *parameters = remapped.into();
                return_type.remap_classes(remap);
            }
            Type::Void | Type::Bool | Type::Int(_) | Type::Error => {}
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Bool => write!(f, "bool"),
            Self::Int(kind) => write!(f, "{kind}"),
            Self::Class { name, .. } => write!(f, "{name}"),
            Self::Reference(inner) => write!(f, "{inner}&"),
            Self::Function {
                parameters,
                return_type,
                is_variadic,
            } => {
                write!(f, "def(")?;
                for (i, ty) in parameters.iter().enumerate() {
                    write!(f, "{ty}")?;

                    if i != parameters.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                if *is_variadic {
                    write!(f, ", ...")?;
                }
                write!(f, ") -> {return_type}")
            }
            Self::Error => write!(f, "{{unknown}}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;

    #[test]
    fn receiver_types_display_as_references() {
        let point = Type::class(NodeId::new(3), InternedSymbol::new("Point"));

        assert_eq!(point.clone().reference().to_string(), "Point&");
        assert_eq!(point.clone().reference().class_id(), Some(NodeId::new(3)));
        assert_eq!(
            Type::Function {
                parameters: Rc::from([point.reference(), Type::Int(IntKind::I32)]),
                return_type: Box::new(Type::Void),
                is_variadic: false,
            }
            .to_string(),
            "def(Point&, int32) -> void"
        );
    }

    #[test]
    fn integers_are_mutually_assignable() {
        let byte = Type::Int(IntKind::U8);
        let int = Type::Int(IntKind::I64);

        assert!(byte.is_assignable_from(&int));
        assert!(!Type::Bool.is_assignable_from(&int));
        assert!(Type::Bool.is_assignable_from(&Type::Error));
    }

    #[test]
    fn remapping_follows_references() {
        let mut ty = Type::class(NodeId::new(1), InternedSymbol::new("Point")).reference();
        ty.remap_classes(&|id| if id == NodeId::new(1) { NodeId::new(9) } else { id });

        assert_eq!(ty.class_id(), Some(NodeId::new(9)));
    }
}
