//! Built-in platform stubs
//!
//! Signature-only sources for the part of the platform library the front end
//! needs to type-check ordinary programs. Prelude units only go through the
//! header stages, so method bodies are never looked at; most members are
//! declared `native` to keep the stubs short.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::common::types::ClassType;

/// Path prefix of prelude compilation units
pub const PRELUDE_ROOT: &str = "<prelude>";

const OBJECT: &str = r#"
package java.lang;
public class Object {
    public Object() { }
    public native boolean equals(Object other);
    public native int hashCode();
    public native String toString();
}
"#;

const STRING: &str = r#"
package java.lang;
public final class String implements CharSequence, Comparable<String> {
    public String() { }
    public String(String original) { }
    public native int length();
    public native char charAt(int index);
    public native boolean isEmpty();
    public native boolean equals(Object other);
    public native int hashCode();
    public native String toString();
    public native int compareTo(String other);
    public native String concat(String other);
    public native String substring(int begin);
    public native String substring(int begin, int end);
    public native int indexOf(String other);
    public native boolean startsWith(String prefix);
    public native String trim();
    public static native String valueOf(Object value);
    public static native String valueOf(boolean value);
    public static native String valueOf(char value);
    public static native String valueOf(int value);
    public static native String valueOf(long value);
    public static native String valueOf(float value);
    public static native String valueOf(double value);
}
"#;

const CHAR_SEQUENCE: &str = r#"
package java.lang;
public interface CharSequence {
    int length();
    char charAt(int index);
    String toString();
}
"#;

const COMPARABLE: &str = r#"
package java.lang;
public interface Comparable<T> {
    int compareTo(T other);
}
"#;

const RUNNABLE: &str = r#"
package java.lang;
public interface Runnable {
    void run();
}
"#;

const ITERABLE: &str = r#"
package java.lang;
import java.util.Iterator;
public interface Iterable<T> {
    Iterator<T> iterator();
}
"#;

const NUMBER: &str = r#"
package java.lang;
public abstract class Number {
    public Number() { }
    public abstract int intValue();
    public abstract long longValue();
    public abstract float floatValue();
    public abstract double doubleValue();
    public native byte byteValue();
    public native short shortValue();
}
"#;

const BOOLEAN: &str = r#"
package java.lang;
public final class Boolean implements Comparable<Boolean> {
    public static final Boolean TRUE = null;
    public static final Boolean FALSE = null;
    public Boolean(boolean value) { }
    public static native Boolean valueOf(boolean value);
    public static native boolean parseBoolean(String text);
    public native boolean booleanValue();
    public native int compareTo(Boolean other);
}
"#;

const CHARACTER: &str = r#"
package java.lang;
public final class Character implements Comparable<Character> {
    public static final char MIN_VALUE = '\u0000';
    public static final char MAX_VALUE = '\uffff';
    public Character(char value) { }
    public static native Character valueOf(char value);
    public static native boolean isDigit(char ch);
    public static native boolean isLetter(char ch);
    public native char charValue();
    public native int compareTo(Character other);
}
"#;

const ENUM: &str = r#"
package java.lang;
public abstract class Enum<E extends Enum<E>> implements Comparable<E> {
    protected Enum(String name, int ordinal) { }
    public final native String name();
    public final native int ordinal();
    public native String toString();
    public final native int compareTo(E other);
}
"#;

const STRING_BUILDER: &str = r#"
package java.lang;
public final class StringBuilder implements CharSequence {
    public StringBuilder() { }
    public StringBuilder(String initial) { }
    public native StringBuilder append(String value);
    public native StringBuilder append(Object value);
    public native StringBuilder append(boolean value);
    public native StringBuilder append(char value);
    public native StringBuilder append(int value);
    public native StringBuilder append(long value);
    public native StringBuilder append(float value);
    public native StringBuilder append(double value);
    public native int length();
    public native char charAt(int index);
    public native String toString();
}
"#;

const MATH: &str = r#"
package java.lang;
public final class Math {
    public static final double E = 2.718281828459045;
    public static final double PI = 3.141592653589793;
    private Math() { }
    public static native int abs(int value);
    public static native long abs(long value);
    public static native double abs(double value);
    public static native int max(int a, int b);
    public static native long max(long a, long b);
    public static native double max(double a, double b);
    public static native int min(int a, int b);
    public static native long min(long a, long b);
    public static native double min(double a, double b);
    public static native double sqrt(double value);
    public static native double pow(double a, double b);
}
"#;

const SYSTEM: &str = r#"
package java.lang;
import java.io.PrintStream;
public final class System {
    public static final PrintStream out = null;
    public static final PrintStream err = null;
    private System() { }
    public static native long currentTimeMillis();
    public static native void arraycopy(Object src, int srcPos, Object dest, int destPos, int length);
}
"#;

const THROWABLE: &str = r#"
package java.lang;
public class Throwable {
    public Throwable() { }
    public Throwable(String message) { }
    public Throwable(String message, Throwable cause) { }
    public native String getMessage();
    public native Throwable getCause();
    public native void printStackTrace();
}
"#;

const ITERATOR: &str = r#"
package java.util;
public interface Iterator<E> {
    boolean hasNext();
    E next();
}
"#;

const LIST: &str = r#"
package java.util;
public interface List<E> extends Iterable<E> {
    int size();
    boolean isEmpty();
    E get(int index);
    E set(int index, E element);
    boolean add(E element);
    Iterator<E> iterator();
}
"#;

const ARRAY_LIST: &str = r#"
package java.util;
public class ArrayList<E> implements List<E> {
    public ArrayList() { }
    public ArrayList(int capacity) { }
    public native int size();
    public native boolean isEmpty();
    public native E get(int index);
    public native E set(int index, E element);
    public native boolean add(E element);
    public native Iterator<E> iterator();
}
"#;

const PRINT_STREAM: &str = r#"
package java.io;
public class PrintStream {
    public PrintStream() { }
    public native void println();
    public native void println(String value);
    public native void println(Object value);
    public native void println(boolean value);
    public native void println(char value);
    public native void println(int value);
    public native void println(long value);
    public native void println(float value);
    public native void println(double value);
    public native void print(String value);
    public native void print(Object value);
    public native void print(int value);
}
"#;

/// Numeric wrappers: (class, primitive, min, max)
const NUMERIC_WRAPPERS: &[(&str, &str, &str, &str)] = &[
    ("Byte", "byte", "-128", "127"),
    ("Short", "short", "-32768", "32767"),
    ("Integer", "int", "0x80000000", "0x7fffffff"),
    ("Long", "long", "0x8000000000000000L", "0x7fffffffffffffffL"),
    ("Float", "float", "1.4e-45f", "3.4028235e38f"),
    ("Double", "double", "4.9e-324", "1.7976931348623157e308"),
];

const EXCEPTIONS: &[(&str, &str)] = &[
    ("Exception", "Throwable"),
    ("Error", "Throwable"),
    ("RuntimeException", "Exception"),
    ("IllegalArgumentException", "RuntimeException"),
    ("IllegalStateException", "RuntimeException"),
    ("NullPointerException", "RuntimeException"),
    ("ArithmeticException", "RuntimeException"),
    ("ClassCastException", "RuntimeException"),
    ("UnsupportedOperationException", "RuntimeException"),
    ("IndexOutOfBoundsException", "RuntimeException"),
    ("ArrayIndexOutOfBoundsException", "IndexOutOfBoundsException"),
    ("InterruptedException", "Exception"),
];

fn numeric_wrapper(name: &str, primitive: &str, min: &str, max: &str) -> String {
    let mut source = format!(
        "package java.lang;\npublic final class {name} extends Number implements Comparable<{name}> {{\n    public static final {primitive} MIN_VALUE = {min};\n    public static final {primitive} MAX_VALUE = {max};\n    public {name}({primitive} value) {{ }}\n    public static native {name} valueOf({primitive} value);\n    public native int compareTo({name} other);\n"
    );
    for (accessor, result) in [
        ("byteValue", "byte"),
        ("shortValue", "short"),
        ("intValue", "int"),
        ("longValue", "long"),
        ("floatValue", "float"),
        ("doubleValue", "double"),
    ] {
        source.push_str(&format!("    public native {result} {accessor}();\n"));
    }
    if name == "Integer" {
        source.push_str("    public static native int parseInt(String text);\n");
        source.push_str("    public static native String toString(int value);\n");
    }
    if name == "Long" {
        source.push_str("    public static native long parseLong(String text);\n");
    }
    source.push_str("}\n");
    source
}

fn exception(name: &str, super_name: &str) -> String {
    format!(
        "package java.lang;\npublic class {name} extends {super_name} {{\n    public {name}() {{ }}\n    public {name}(String message) {{ }}\n}}\n"
    )
}

static PRELUDE: Lazy<HashMap<String, String>> = Lazy::new(|| {
    let mut sources: HashMap<String, String> = [
        ("java.lang.Object", OBJECT),
        ("java.lang.String", STRING),
        ("java.lang.CharSequence", CHAR_SEQUENCE),
        ("java.lang.Comparable", COMPARABLE),
        ("java.lang.Runnable", RUNNABLE),
        ("java.lang.Iterable", ITERABLE),
        ("java.lang.Number", NUMBER),
        ("java.lang.Boolean", BOOLEAN),
        ("java.lang.Character", CHARACTER),
        ("java.lang.Enum", ENUM),
        ("java.lang.StringBuilder", STRING_BUILDER),
        ("java.lang.Math", MATH),
        ("java.lang.System", SYSTEM),
        ("java.lang.Throwable", THROWABLE),
        ("java.util.Iterator", ITERATOR),
        ("java.util.List", LIST),
        ("java.util.ArrayList", ARRAY_LIST),
        ("java.io.PrintStream", PRINT_STREAM),
    ]
    .into_iter()
    .map(|(name, source)| (name.to_string(), source.to_string()))
    .collect();
    for (name, primitive, min, max) in NUMERIC_WRAPPERS {
        sources.insert(format!("java.lang.{name}"), numeric_wrapper(name, primitive, min, max));
    }
    for (name, super_name) in EXCEPTIONS {
        sources.insert(format!("java.lang.{name}"), exception(name, super_name));
    }
    sources
});

/// Source text of a prelude top-level class
pub fn source_for(ty: &ClassType) -> Option<&'static str> {
    PRELUDE.get(&ty.qualified_name()).map(String::as_str)
}

/// Whether `name` is a prelude package or a prefix of one
pub fn is_package(name: &str) -> bool {
    PRELUDE.keys().any(|qualified| {
        let package = qualified.rsplit_once('.').map(|(p, _)| p).unwrap_or("");
        package == name || package.starts_with(&format!("{}.", name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_every_stub_parses_and_declares_its_class() {
        for (name, source) in PRELUDE.iter() {
            let ast = parse(source).unwrap_or_else(|e| panic!("{name}: {e}"));
            let simple = name.rsplit('.').next().unwrap();
            assert_eq!(ast.type_decls.len(), 1, "{name}");
            assert_eq!(ast.type_decls[0].name, simple, "{name}");
        }
    }

    #[test]
    fn test_packages() {
        assert!(is_package("java"));
        assert!(is_package("java.lang"));
        assert!(is_package("java.util"));
        assert!(!is_package("java.nio"));
        assert!(source_for(&ClassType::java_lang("Integer")).is_some());
    }
}
