//! Tipos, ámbitos y nombres.
//!
//! La inferencia es local. El tipo de un valor alcanza para
//! elegir declaraciones de C++, decidir cómo se recorre un
//! `range` y resolver a qué paquete pertenece un método.

use std::borrow::Cow;

use crate::{
    ast::{Aggregate, ArrayLen, Type},
    lex::Identifier,
    source::{Located, Location},
};

use super::{CodegenError, Gen, Generator, Import};

/// Tipo inferido de un valor.
#[derive(Clone, Debug)]
pub(super) enum Ty<'a> {
    Go(Type),

    /// Valor producido por una función de un paquete externo. Sus métodos
    /// se resuelven en ese paquete.
    Handle(&'a str),

    /// Resultado múltiple sin desestructurar.
    Aggregate(&'a Aggregate),

    Unknown,
}

impl Ty<'_> {
    pub(super) fn named(name: &str) -> Self {
        Ty::Go(Type::Named(Identifier::new(name)))
    }

    pub(super) fn is_unknown(&self) -> bool {
        matches!(self, Ty::Unknown)
    }

    pub(super) fn is_named(&self, name: &str) -> bool {
        matches!(self, Ty::Go(Type::Named(id)) if id.as_ref() == name)
    }

    pub(super) fn is_string(&self) -> bool {
        self.is_named("string")
    }

    pub(super) fn is_integer(&self) -> bool {
        matches!(self, Ty::Go(Type::Named(id)) if INTEGERS.contains(&id.as_ref()))
    }
}

/// Un nombre visible en un ámbito.
#[derive(Clone, Debug)]
pub(super) struct Binding<'a> {
    pub ty: Ty<'a>,
    pub constant: bool,
}

const INTEGERS: &[&str] = &[
    "int", "int8", "int16", "int32", "int64", "uint", "uint8", "uint16", "uint32", "uint64", "uintptr",
    "byte", "rune",
];

/// Tipos predeclarados de Go y su equivalente exacto en C++.
pub(super) fn builtin_type(name: &str) -> Option<&'static str> {
    let cpp = match name {
        "int" => "int",
        "int8" => "int8_t",
        "int16" => "int16_t",
        "int32" => "int32_t",
        "int64" => "int64_t",
        "uint" => "unsigned int",
        "uint8" | "byte" => "uint8_t",
        "uint16" => "uint16_t",
        "uint32" => "uint32_t",
        "uint64" => "uint64_t",
        "uintptr" => "uintptr_t",
        "rune" => "int32_t",
        "float32" => "float",
        "float64" => "double",
        "string" => "String",
        "bool" => "bool",
        _ => return None,
    };

    Some(cpp)
}

/// Palabras reservadas de C++ que son identificadores válidos en Go.
const RESERVED: &[&str] = &[
    "alignas", "alignof", "and", "asm", "auto", "bitand", "bitor", "catch", "char", "class", "compl",
    "constexpr", "delete", "do", "double", "enum", "explicit", "export", "extern", "float", "friend",
    "inline", "long", "mutable", "namespace", "new", "noexcept", "not", "nullptr", "operator", "or",
    "private", "protected", "public", "register", "short", "signed", "sizeof", "static", "template",
    "this", "throw", "try", "typedef", "typeid", "typename", "union", "unsigned", "using", "virtual",
    "void", "volatile", "while", "xor",
];

/// Nombre de C++ para un identificador de usuario.
pub(super) fn mangle(name: &str) -> Cow<'_, str> {
    if RESERVED.contains(&name) || name.starts_with("_tsuki") {
        Cow::Owned(format!("{}_", name))
    } else {
        Cow::Borrowed(name)
    }
}

impl<'a> Generator<'a> {
    pub(super) fn enter(&mut self) {
        self.scopes.push(Default::default());
    }

    pub(super) fn leave(&mut self) {
        self.scopes.pop();
    }

    pub(super) fn bind(&mut self, name: &'a str, ty: Ty<'a>, constant: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, Binding { ty, constant });
        } else {
            self.globals.insert(name, Binding { ty, constant });
        }
    }

    /// Determina si un nombre ya está declarado en el ámbito más interno.
    pub(super) fn declared_here(&self, name: &str) -> bool {
        match self.scopes.last() {
            Some(scope) => scope.contains_key(name),
            None => self.globals.contains_key(name),
        }
    }

    pub(super) fn lookup(&self, name: &str) -> Option<&Binding<'a>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
    }

    /// Paquete importado con este nombre local, salvo que una variable lo
    /// oculte.
    pub(super) fn import(&self, name: &str) -> Option<Import<'a>> {
        match self.lookup(name) {
            Some(_) => None,
            None => self.imports.get(name).copied(),
        }
    }

    /// Nombres visibles, para sugerencias.
    pub(super) fn visible_names(&self) -> Vec<&'a str> {
        let mut names: Vec<&'a str> = self
            .scopes
            .iter()
            .flat_map(|scope| scope.keys().copied())
            .chain(self.globals.keys().copied())
            .chain(self.funcs.keys().copied())
            .collect();

        names.sort_unstable();
        names.dedup();
        names
    }

    /// Traduce un tipo que no es un arreglo.
    pub(super) fn cpp_type(&self, typ: &Type, location: &Location) -> Gen<String> {
        let unknown = || Err(Located::at(CodegenError::UnknownType(type_name(typ)), location.clone()));

        let cpp = match typ {
            Type::Named(name) => {
                let name = name.as_ref();
                if let Some(cpp) = builtin_type(name) {
                    String::from(cpp)
                } else if self.structs.contains_key(name) || self.typedefs.contains_key(name) {
                    mangle(name).into_owned()
                } else if self.interfaces.contains(name) {
                    let error = CodegenError::InterfaceValue(name.to_owned());
                    return Err(Located::at(error, location.clone()));
                } else {
                    return unknown();
                }
            }

            Type::Qualified { package, name } => {
                let cpp = match self.imports.get(package.as_ref()) {
                    Some(Import::Intrinsic(intrinsic)) => intrinsic.types.get(name.as_ref()).copied(),
                    Some(Import::Mapped(mapped)) => mapped.typ(name.as_ref()),
                    None => None,
                };

                match cpp {
                    Some(cpp) => String::from(cpp),
                    None => return unknown(),
                }
            }

            Type::Pointer(inner) | Type::Slice(inner) => format!("{}*", self.cpp_type(inner, location)?),

            Type::Array { .. } => {
                let error = CodegenError::ArrayValue(type_name(typ));
                return Err(Located::at(error, location.clone()));
            }
        };

        Ok(cpp)
    }

    /// Declarador completo, incluyendo dimensiones de arreglos:
    /// `uint8_t frame[4][8]`.
    pub(super) fn declarator(&self, typ: &Type, name: &str, location: &Location) -> Gen<String> {
        let mut dimensions = String::new();
        let mut elem = typ;

        while let Type::Array { len, elem: inner } = elem {
            dimensions.push('[');
            match len {
                ArrayLen::Literal(len) => dimensions.push_str(&len.to_string()),
                ArrayLen::Const(name) => dimensions.push_str(&mangle(name.as_ref())),
                ArrayLen::Inferred => (),
            }

            dimensions.push(']');
            elem = inner;
        }

        let base = self.cpp_type(elem, location)?;
        Ok(format!("{} {}{}", base, name, dimensions))
    }

    /// Declarador de parámetro. Los arreglos se pasan por referencia para
    /// conservar su longitud.
    pub(super) fn parameter(&self, typ: &Type, name: &str, location: &Location) -> Gen<String> {
        match typ {
            Type::Array { .. } => {
                let reference = format!("(&{})", name);
                self.declarator(typ, &reference, location)
            }

            _ => self.declarator(typ, name, location).map(|declarator| declarator.trim_end().to_owned()),
        }
    }
}

/// Forma de Go de un tipo, para mensajes.
pub(super) fn type_name(typ: &Type) -> String {
    match typ {
        Type::Named(name) => name.to_string(),
        Type::Qualified { package, name } => format!("{}.{}", package, name),
        Type::Array { len, elem } => {
            let len = match len {
                ArrayLen::Literal(len) => len.to_string(),
                ArrayLen::Const(name) => name.to_string(),
                ArrayLen::Inferred => String::from("..."),
            };

            format!("[{}]{}", len, type_name(elem))
        }

        Type::Slice(elem) => format!("[]{}", type_name(elem)),
        Type::Pointer(elem) => format!("*{}", type_name(elem)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reserved_words_are_renamed() {
        assert_eq!(mangle("new"), "new_");
        assert_eq!(mangle("class"), "class_");
        assert_eq!(mangle("_tsuki_tmp0"), "_tsuki_tmp0_");
        assert_eq!(mangle("count"), "count");
    }

    #[test]
    fn builtin_types_keep_their_width() {
        assert_eq!(builtin_type("uint8"), Some("uint8_t"));
        assert_eq!(builtin_type("byte"), Some("uint8_t"));
        assert_eq!(builtin_type("rune"), Some("int32_t"));
        assert_eq!(builtin_type("float32"), Some("float"));
        assert_eq!(builtin_type("float64"), Some("double"));
        assert_eq!(builtin_type("uint"), Some("unsigned int"));
        assert_eq!(builtin_type("complex64"), None);
    }

    #[test]
    fn go_type_names() {
        let typ = Type::Array {
            len: ArrayLen::Literal(4),
            elem: Box::new(Type::Pointer(Box::new(Type::Named(Identifier::new("Point"))))),
        };

        assert_eq!(type_name(&typ), "[4]*Point");
    }
}
