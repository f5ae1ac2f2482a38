// Well-known names shared by the pipeline stages

pub const JAVA_LANG: &str = "java.lang";

pub const OBJECT: &str = "Object";
pub const STRING: &str = "String";
pub const ENUM: &str = "Enum";
pub const ITERABLE: &str = "Iterable";
pub const ITERATOR_PACKAGE: &str = "java.util";
pub const ITERATOR: &str = "Iterator";
pub const THROWABLE: &str = "Throwable";
pub const ILLEGAL_ARGUMENT_EXCEPTION: &str = "IllegalArgumentException";

// JVM method names
pub const CONSTRUCTOR_METHOD_NAME: &str = "<init>";
pub const STATIC_INITIALIZER_METHOD_NAME: &str = "<clinit>";

// Synthetic member names
pub const OUTER_THIS_FIELD: &str = "this$0";
pub const CAPTURED_FIELD_PREFIX: &str = "val$";
pub const ACCESSOR_PREFIX: &str = "access$";
pub const ENUM_VALUES_FIELD: &str = "$VALUES";
pub const ENUM_NAME_PARAM: &str = "$enum$name";
pub const ENUM_ORDINAL_PARAM: &str = "$enum$ordinal";
pub const TEMP_PREFIX: &str = "$tmp";

// Source file suffixes looked up on the search path
pub const SOURCE_SUFFIX: &str = "java";
pub const CLASS_SUFFIX: &str = "class";

// Parser: maximum nesting depth of expressions and statements
pub const PARSER_MAX_DEPTH: usize = 512;

// Registry: maximum length of a superclass chain before it is reported as cyclic
pub const MAX_HIERARCHY_DEPTH: usize = 256;
