//! Type model
//!
//! Value types for primitives, class/array/wildcard/type-variable references and
//! function signatures. Equality is structural: two class types are equal iff their
//! package and every component name and argument list match.

use std::fmt;

use crate::consts::{JAVA_LANG, OBJECT, STRING};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveType {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Void => "void",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Char => "char",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "void" => PrimitiveType::Void,
            "boolean" => PrimitiveType::Boolean,
            "byte" => PrimitiveType::Byte,
            "char" => PrimitiveType::Char,
            "short" => PrimitiveType::Short,
            "int" => PrimitiveType::Int,
            "long" => PrimitiveType::Long,
            "float" => PrimitiveType::Float,
            "double" => PrimitiveType::Double,
            _ => return None,
        })
    }

    pub fn descriptor(&self) -> char {
        match self {
            PrimitiveType::Void => 'V',
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Char => 'C',
            PrimitiveType::Short => 'S',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, PrimitiveType::Void | PrimitiveType::Boolean)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            PrimitiveType::Byte
                | PrimitiveType::Char
                | PrimitiveType::Short
                | PrimitiveType::Int
                | PrimitiveType::Long
        )
    }

    /// Local-variable slots taken by a value of this type
    pub fn width(&self) -> u16 {
        match self {
            PrimitiveType::Void => 0,
            PrimitiveType::Long | PrimitiveType::Double => 2,
            _ => 1,
        }
    }

    /// Position on the promotion ladder `int < long < float < double`
    fn rank(&self) -> u8 {
        match self {
            PrimitiveType::Byte | PrimitiveType::Short | PrimitiveType::Char | PrimitiveType::Int => 0,
            PrimitiveType::Long => 1,
            PrimitiveType::Float => 2,
            PrimitiveType::Double => 3,
            PrimitiveType::Void | PrimitiveType::Boolean => 0,
        }
    }

    /// Unary numeric promotion: byte/short/char widen to int
    pub fn unary_promote(self) -> Option<PrimitiveType> {
        match self {
            PrimitiveType::Byte | PrimitiveType::Short | PrimitiveType::Char | PrimitiveType::Int => {
                Some(PrimitiveType::Int)
            }
            PrimitiveType::Long | PrimitiveType::Float | PrimitiveType::Double => Some(self),
            PrimitiveType::Void | PrimitiveType::Boolean => None,
        }
    }

    /// Binary numeric promotion to the narrowest common type on the ladder
    pub fn binary_promote(a: PrimitiveType, b: PrimitiveType) -> Option<PrimitiveType> {
        let a = a.unary_promote()?;
        let b = b.unary_promote()?;
        Some(if a.rank() >= b.rank() { a } else { b })
    }

    /// Widening primitive conversion (identity included)
    pub fn widens_to(self, target: PrimitiveType) -> bool {
        use PrimitiveType::*;
        if self == target {
            return true;
        }
        match self {
            Byte => matches!(target, Short | Int | Long | Float | Double),
            Short => matches!(target, Int | Long | Float | Double),
            Char => matches!(target, Int | Long | Float | Double),
            Int => matches!(target, Long | Float | Double),
            Long => matches!(target, Float | Double),
            Float => matches!(target, Double),
            _ => false,
        }
    }

    /// Wrapper class of this primitive
    pub fn boxed(&self) -> Option<ClassType> {
        let name = match self {
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Byte => "Byte",
            PrimitiveType::Char => "Character",
            PrimitiveType::Short => "Short",
            PrimitiveType::Int => "Integer",
            PrimitiveType::Long => "Long",
            PrimitiveType::Float => "Float",
            PrimitiveType::Double => "Double",
            PrimitiveType::Void => return None,
        };
        Some(ClassType::java_lang(name))
    }

    /// Name of the wrapper's unboxing accessor, e.g. `intValue`
    pub fn unbox_method(&self) -> Option<String> {
        match self {
            PrimitiveType::Void => None,
            _ => Some(format!("{}Value", self.name())),
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One segment of a nested class name with its type arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeComponent {
    pub name: String,
    pub args: Vec<Type>,
}

impl TypeComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), args: Vec::new() }
    }
}

/// A class, interface or enum reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassType {
    /// Dotted package name, empty for the default package
    pub package: String,
    /// Outermost class first
    pub components: Vec<TypeComponent>,
}

impl ClassType {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            components: vec![TypeComponent::new(name)],
        }
    }

    pub fn java_lang(name: &str) -> Self {
        Self::new(JAVA_LANG, name)
    }

    pub fn object() -> Self {
        Self::java_lang(OBJECT)
    }

    pub fn string() -> Self {
        Self::java_lang(STRING)
    }

    /// Build from a dotted name whose last segment is a top-level class
    pub fn from_qualified(name: &str) -> Self {
        match name.rsplit_once('.') {
            Some((package, simple)) => Self::new(package, simple),
            None => Self::new("", name),
        }
    }

    /// Build from an internal name such as `java/util/Map$Entry`
    pub fn from_internal(name: &str) -> Self {
        let (package, rest) = match name.rsplit_once('/') {
            Some((package, rest)) => (package.replace('/', "."), rest),
            None => (String::new(), name),
        };
        Self {
            package,
            components: rest.split('$').map(TypeComponent::new).collect(),
        }
    }

    /// Nested member type of this class
    pub fn nested(&self, name: impl Into<String>) -> Self {
        let mut erased = self.erased();
        erased.components.push(TypeComponent::new(name));
        erased
    }

    /// Identity of the declaration: all type arguments removed
    pub fn erased(&self) -> Self {
        Self {
            package: self.package.clone(),
            components: self
                .components
                .iter()
                .map(|c| TypeComponent::new(c.name.clone()))
                .collect(),
        }
    }

    pub fn simple_name(&self) -> &str {
        self.components.last().map(|c| c.name.as_str()).unwrap_or("")
    }

    /// Type arguments of the innermost component
    pub fn args(&self) -> &[Type] {
        self.components.last().map(|c| c.args.as_slice()).unwrap_or(&[])
    }

    pub fn with_args(&self, args: Vec<Type>) -> Self {
        let mut ty = self.clone();
        if let Some(last) = ty.components.last_mut() {
            last.args = args;
        }
        ty
    }

    /// Lexically enclosing class, if nested
    pub fn outer(&self) -> Option<ClassType> {
        if self.components.len() < 2 {
            return None;
        }
        let mut outer = self.erased();
        outer.components.pop();
        Some(outer)
    }

    /// Outermost class of the nest this class belongs to
    pub fn top_level(&self) -> ClassType {
        let mut top = self.erased();
        top.components.truncate(1);
        top
    }

    pub fn is_nested(&self) -> bool {
        self.components.len() > 1
    }

    /// `java.util.Map.Entry`
    pub fn qualified_name(&self) -> String {
        let names: Vec<&str> = self.components.iter().map(|c| c.name.as_str()).collect();
        if self.package.is_empty() {
            names.join(".")
        } else {
            format!("{}.{}", self.package, names.join("."))
        }
    }

    /// `java/util/Map$Entry`
    pub fn internal_name(&self) -> String {
        let names: Vec<&str> = self.components.iter().map(|c| c.name.as_str()).collect();
        if self.package.is_empty() {
            names.join("$")
        } else {
            format!("{}/{}", self.package.replace('.', "/"), names.join("$"))
        }
    }

    /// `java.util.Map$Entry`
    pub fn binary_name(&self) -> String {
        self.internal_name().replace('/', ".")
    }

    pub fn is_java_lang(&self, name: &str) -> bool {
        self.package == JAVA_LANG && self.components.len() == 1 && self.components[0].name == name
    }

    pub fn is_object(&self) -> bool {
        self.is_java_lang(OBJECT)
    }

    pub fn is_string(&self) -> bool {
        self.is_java_lang(STRING)
    }

    /// Primitive wrapped by this class, if it is a boxing wrapper
    pub fn unboxed(&self) -> Option<PrimitiveType> {
        if self.package != JAVA_LANG || self.components.len() != 1 {
            return None;
        }
        Some(match self.components[0].name.as_str() {
            "Boolean" => PrimitiveType::Boolean,
            "Byte" => PrimitiveType::Byte,
            "Character" => PrimitiveType::Char,
            "Short" => PrimitiveType::Short,
            "Integer" => PrimitiveType::Int,
            "Long" => PrimitiveType::Long,
            "Float" => PrimitiveType::Float,
            "Double" => PrimitiveType::Double,
            _ => return None,
        })
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.package.is_empty() {
            write!(f, "{}.", self.package)?;
        }
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&component.name)?;
            if !component.args.is_empty() {
                f.write_str("<")?;
                for (j, arg) in component.args.iter().enumerate() {
                    if j > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(">")?;
            }
        }
        Ok(())
    }
}

/// A method signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub return_type: Box<Type>,
    pub params: Vec<Type>,
    /// Declared method type parameters, as `Type::TypeVariable`
    pub type_params: Vec<Type>,
}

impl FunctionType {
    pub fn new(return_type: Type, params: Vec<Type>) -> Self {
        Self {
            return_type: Box::new(return_type),
            params,
            type_params: Vec::new(),
        }
    }

    /// Erased JVM method descriptor
    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for param in &self.params {
            out.push_str(&param.descriptor());
        }
        out.push(')');
        out.push_str(&self.return_type.descriptor());
        out
    }

    pub fn erased(&self) -> FunctionType {
        FunctionType {
            return_type: Box::new(self.return_type.erasure()),
            params: self.params.iter().map(Type::erasure).collect(),
            type_params: Vec::new(),
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveType),
    Array(Box<Type>),
    Class(ClassType),
    Wildcard {
        lower: Option<Box<Type>>,
        upper: Option<Box<Type>>,
    },
    TypeVariable {
        name: String,
        bound: Option<Box<Type>>,
    },
    Function(FunctionType),
    /// Type of the `null` literal
    Null,
}

impl Type {
    pub const VOID: Type = Type::Primitive(PrimitiveType::Void);
    pub const BOOLEAN: Type = Type::Primitive(PrimitiveType::Boolean);
    pub const INT: Type = Type::Primitive(PrimitiveType::Int);
    pub const LONG: Type = Type::Primitive(PrimitiveType::Long);

    pub fn object() -> Type {
        Type::Class(ClassType::object())
    }

    pub fn string() -> Type {
        Type::Class(ClassType::string())
    }

    pub fn array_of(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassType> {
        match self {
            Type::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Void))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Boolean))
    }

    pub fn is_numeric(&self) -> bool {
        self.as_primitive().map(|p| p.is_numeric()).unwrap_or(false)
    }

    pub fn is_integral(&self) -> bool {
        self.as_primitive().map(|p| p.is_integral()).unwrap_or(false)
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Array(_) | Type::Class(_) | Type::TypeVariable { .. } | Type::Wildcard { .. } | Type::Null
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::Class(c) if c.is_string())
    }

    /// Primitive obtained by unboxing, or the primitive itself
    pub fn unboxed_primitive(&self) -> Option<PrimitiveType> {
        match self {
            Type::Primitive(p) => Some(*p),
            Type::Class(c) => c.unboxed(),
            _ => None,
        }
    }

    /// Erasure: type variables become their bound, arguments are dropped
    pub fn erasure(&self) -> Type {
        match self {
            Type::Primitive(_) | Type::Null => self.clone(),
            Type::Array(element) => Type::Array(Box::new(element.erasure())),
            Type::Class(c) => Type::Class(c.erased()),
            Type::Wildcard { upper, .. } => match upper {
                Some(bound) => bound.erasure(),
                None => Type::object(),
            },
            Type::TypeVariable { bound, .. } => match bound {
                Some(bound) => bound.erasure(),
                None => Type::object(),
            },
            Type::Function(f) => Type::Function(f.erased()),
        }
    }

    /// Erased JVM field descriptor
    pub fn descriptor(&self) -> String {
        match self.erasure() {
            Type::Primitive(p) => p.descriptor().to_string(),
            Type::Array(element) => format!("[{}", element.descriptor()),
            Type::Class(c) => format!("L{};", c.internal_name()),
            Type::Function(f) => f.descriptor(),
            _ => "Ljava/lang/Object;".to_string(),
        }
    }

    /// Local-variable slots taken by a value of this type
    pub fn width(&self) -> u16 {
        match self {
            Type::Primitive(p) => p.width(),
            _ => 1,
        }
    }

    /// Replace type variables named in `bindings` with their arguments
    pub fn substitute(&self, bindings: &[(String, Type)]) -> Type {
        if bindings.is_empty() {
            return self.clone();
        }
        match self {
            Type::TypeVariable { name, .. } => bindings
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, ty)| match ty {
                    Type::Wildcard { upper: Some(bound), .. } => (**bound).clone(),
                    Type::Wildcard { .. } => self.erasure(),
                    other => other.clone(),
                })
                .unwrap_or_else(|| self.clone()),
            Type::Array(element) => Type::Array(Box::new(element.substitute(bindings))),
            Type::Class(c) => Type::Class(ClassType {
                package: c.package.clone(),
                components: c
                    .components
                    .iter()
                    .map(|comp| TypeComponent {
                        name: comp.name.clone(),
                        args: comp.args.iter().map(|a| a.substitute(bindings)).collect(),
                    })
                    .collect(),
            }),
            Type::Wildcard { lower, upper } => Type::Wildcard {
                lower: lower.as_ref().map(|t| Box::new(t.substitute(bindings))),
                upper: upper.as_ref().map(|t| Box::new(t.substitute(bindings))),
            },
            Type::Function(f) => Type::Function(FunctionType {
                return_type: Box::new(f.return_type.substitute(bindings)),
                params: f.params.iter().map(|p| p.substitute(bindings)).collect(),
                type_params: f.type_params.clone(),
            }),
            Type::Primitive(_) | Type::Null => self.clone(),
        }
    }
}

impl From<PrimitiveType> for Type {
    fn from(p: PrimitiveType) -> Self {
        Type::Primitive(p)
    }
}

impl From<ClassType> for Type {
    fn from(c: ClassType) -> Self {
        Type::Class(c)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p),
            Type::Array(element) => write!(f, "{}[]", element),
            Type::Class(c) => write!(f, "{}", c),
            Type::Wildcard { lower: Some(lower), .. } => write!(f, "? super {}", lower),
            Type::Wildcard { upper: Some(upper), .. } => write!(f, "? extends {}", upper),
            Type::Wildcard { .. } => f.write_str("?"),
            Type::TypeVariable { name, .. } => f.write_str(name),
            Type::Function(func) => write!(f, "{}", func),
            Type::Null => f.write_str("null"),
        }
    }
}

/// Parse a JVM field descriptor such as `[Ljava/lang/String;`
pub fn parse_field_descriptor(descriptor: &str) -> Option<Type> {
    let (ty, rest) = parse_descriptor_prefix(descriptor)?;
    if rest.is_empty() {
        Some(ty)
    } else {
        None
    }
}

/// Parse a JVM method descriptor such as `(IJ)V`
pub fn parse_method_descriptor(descriptor: &str) -> Option<FunctionType> {
    let mut rest = descriptor.strip_prefix('(')?;
    let mut params = Vec::new();
    while !rest.starts_with(')') {
        let (ty, tail) = parse_descriptor_prefix(rest)?;
        params.push(ty);
        rest = tail;
    }
    let (ret, tail) = parse_descriptor_prefix(&rest[1..])?;
    if !tail.is_empty() {
        return None;
    }
    Some(FunctionType::new(ret, params))
}

fn parse_descriptor_prefix(input: &str) -> Option<(Type, &str)> {
    let first = input.chars().next()?;
    let rest = &input[first.len_utf8()..];
    let prim = |p| Some((Type::Primitive(p), rest));
    match first {
        'V' => prim(PrimitiveType::Void),
        'Z' => prim(PrimitiveType::Boolean),
        'B' => prim(PrimitiveType::Byte),
        'C' => prim(PrimitiveType::Char),
        'S' => prim(PrimitiveType::Short),
        'I' => prim(PrimitiveType::Int),
        'J' => prim(PrimitiveType::Long),
        'F' => prim(PrimitiveType::Float),
        'D' => prim(PrimitiveType::Double),
        '[' => {
            let (element, tail) = parse_descriptor_prefix(rest)?;
            Some((Type::array_of(element), tail))
        }
        'L' => {
            let end = rest.find(';')?;
            Some((Type::Class(ClassType::from_internal(&rest[..end])), &rest[end + 1..]))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PrimitiveType::*;

    #[test]
    fn test_binary_promotion_ladder() {
        let numeric = [Byte, Short, Char, Int, Long, Float, Double];
        let rank = |p: PrimitiveType| match p {
            Long => 1,
            Float => 2,
            Double => 3,
            _ => 0,
        };
        for a in numeric {
            for b in numeric {
                let promoted = PrimitiveType::binary_promote(a, b).unwrap();
                let expected = match rank(a).max(rank(b)) {
                    0 => Int,
                    1 => Long,
                    2 => Float,
                    _ => Double,
                };
                assert_eq!(promoted, expected, "{a} op {b}");
            }
        }
        assert_eq!(PrimitiveType::binary_promote(Boolean, Int), None);
    }

    #[test]
    fn test_unary_promotion() {
        assert_eq!(Byte.unary_promote(), Some(Int));
        assert_eq!(Short.unary_promote(), Some(Int));
        assert_eq!(Char.unary_promote(), Some(Int));
        assert_eq!(Long.unary_promote(), Some(Long));
        assert_eq!(Boolean.unary_promote(), None);
    }

    #[test]
    fn test_class_type_names() {
        let entry = ClassType::new("java.util", "Map").nested("Entry");
        assert_eq!(entry.qualified_name(), "java.util.Map.Entry");
        assert_eq!(entry.internal_name(), "java/util/Map$Entry");
        assert_eq!(entry.outer(), Some(ClassType::new("java.util", "Map")));
        assert_eq!(ClassType::from_internal("java/util/Map$Entry"), entry);
    }

    #[test]
    fn test_structural_equality_includes_arguments() {
        let list = ClassType::new("java.util", "List");
        let of_string = list.with_args(vec![Type::string()]);
        assert_ne!(Type::Class(list.clone()), Type::Class(of_string.clone()));
        assert_eq!(of_string.erased(), list);
        assert_eq!(of_string.to_string(), "java.util.List<java.lang.String>");
    }

    #[test]
    fn test_descriptors() {
        let sig = FunctionType::new(
            Type::VOID,
            vec![Type::INT, Type::array_of(Type::string()), Type::LONG],
        );
        assert_eq!(sig.descriptor(), "(I[Ljava/lang/String;J)V");
        assert_eq!(parse_method_descriptor("(I[Ljava/lang/String;J)V"), Some(sig));
        assert_eq!(parse_field_descriptor("Q"), None);
    }

    #[test]
    fn test_substitute_type_variable() {
        let t = Type::TypeVariable { name: "T".into(), bound: None };
        let list_t = Type::Class(ClassType::new("java.util", "List").with_args(vec![t.clone()]));
        let bound = list_t.substitute(&[("T".into(), Type::string())]);
        assert_eq!(bound.to_string(), "java.util.List<java.lang.String>");
        assert_eq!(t.erasure(), Type::object());
    }
}
