//! Expresiones y resolución de llamadas.

use unicase::UniCase;

use crate::{
    ast::{BinOp, Element, Expr, Results, Type, UnOp},
    intrinsics::{self, Lowering},
    lex::{Identifier, IntLiteral},
    pkgmap::Template,
    source::{Located, Location},
};

use super::{
    scope::{builtin_type, mangle, type_name, Ty},
    CodegenError, Gen, Generator, Import,
};

impl<'a> Generator<'a> {
    pub(super) fn expr(&self, expr: &'a Located<Expr>) -> Gen<String> {
        let location = expr.location();

        let code = match expr.val() {
            Expr::Int(literal) => int_literal(*literal),
            Expr::Float(text) => text.replace('_', ""),
            Expr::Str(text) => quote(text),
            Expr::Rune(c) => rune(*c),
            Expr::Ident(name) => self.ident(name, location)?,
            Expr::Binary(lhs, op, rhs) => self.binary(lhs, *op, rhs)?,
            Expr::Unary(op, operand) => format!("{}{}", op.to_cpp(), self.operand(operand)?),
            Expr::Call { callee, args } => self.call(callee, args)?,
            Expr::Selector { operand, member } => self.selector(operand, member)?,

            Expr::Index { operand, index } => {
                format!("{}[{}]", self.operand(operand)?, self.expr(index)?)
            }

            Expr::Composite { typ, elements } => {
                self.composite(typ.as_ref().map(Located::val), elements, location)?
            }

            Expr::Conversion { typ, value } => self.conversion(typ.val(), value, typ.location())?,
            Expr::Paren(inner) => format!("({})", self.expr(inner)?),

            // Ya reportado por el lexer; el texto se descarta
            Expr::Invalid => String::from("/* invalid */"),
        };

        Ok(code)
    }

    /// Expresión en posición de operando de un operador unario o postfijo.
    pub(super) fn operand(&self, expr: &'a Located<Expr>) -> Gen<String> {
        let code = self.expr(expr)?;
        match expr.val() {
            Expr::Binary(..) | Expr::Unary(..) => Ok(format!("({})", code)),
            _ => Ok(code),
        }
    }

    fn ident(&self, name: &'a Identifier, location: &Location) -> Gen<String> {
        if let (Some(iota), "iota") = (self.iota, name.as_ref()) {
            return Ok(iota.to_string());
        }

        let code = match name.as_ref() {
            "true" | "false" if self.lookup(name.as_ref()).is_none() => name.to_string(),
            "nil" => String::from("nullptr"),

            other if self.lookup(other).is_some() || self.funcs.contains_key(other) => {
                if self.entry && other == "main" && self.lookup(other).is_none() {
                    String::from("setup")
                } else {
                    mangle(other).into_owned()
                }
            }

            other => {
                let error = CodegenError::UnresolvedName {
                    name: other.to_owned(),
                    suggestion: suggest(other, self.visible_names()),
                };

                return Err(Located::at(error, location.clone()));
            }
        };

        Ok(code)
    }

    fn binary(&self, lhs: &'a Located<Expr>, op: BinOp, rhs: &'a Located<Expr>) -> Gen<String> {
        // "a" + b no es válido en C++ si ambos son punteros a char
        let promote = op == BinOp::Add && (is_string_literal(lhs) || is_string_literal(rhs));

        let left = self.side(lhs, op, false, promote)?;
        match op {
            BinOp::AndNot => Ok(format!("{} & ~({})", left, self.expr(rhs)?)),
            _ => {
                let right = self.side(rhs, op, true, promote)?;
                Ok(format!("{} {} {}", left, op.to_cpp(), right))
            }
        }
    }

    fn side(&self, expr: &'a Located<Expr>, parent: BinOp, right: bool, promote: bool) -> Gen<String> {
        match expr.val() {
            Expr::Str(text) if promote => Ok(format!("String({})", quote(text))),

            Expr::Binary(_, child, _) => {
                let code = self.expr(expr)?;
                let (child, parent) = (cpp_precedence(*child), cpp_precedence(parent));

                if child < parent || (child == parent && right) {
                    Ok(format!("({})", code))
                } else {
                    Ok(code)
                }
            }

            _ => self.expr(expr),
        }
    }

    fn selector(&self, operand: &'a Located<Expr>, member: &'a Located<Identifier>) -> Gen<String> {
        if let Expr::Ident(package) = operand.val() {
            if let Some(import) = self.import(package.as_ref()) {
                return self.package_constant(package, import, member);
            }
        }

        let access = match self.type_of(operand) {
            Ty::Go(Type::Pointer(_)) => "->",
            _ => ".",
        };

        Ok(format!("{}{}{}", self.operand(operand)?, access, mangle(member.val().as_ref())))
    }

    fn package_constant(
        &self,
        package: &Identifier,
        import: Import<'a>,
        member: &Located<Identifier>,
    ) -> Gen<String> {
        let name = member.val().as_ref();
        let constant = match import {
            Import::Intrinsic(intrinsic) => intrinsic.constant_of(name),
            Import::Mapped(mapped) => mapped.constant(name),
        };

        match constant {
            Some(cpp) => Ok(String::from(cpp)),
            None => {
                let error = CodegenError::UnresolvedName {
                    name: format!("{}.{}", package, name),
                    suggestion: suggest(name, members(import)).map(|found| format!("{}.{}", package, found)),
                };

                Err(Located::at(error, member.location().clone()))
            }
        }
    }

    fn call(&self, callee: &'a Located<Expr>, args: &'a [Located<Expr>]) -> Gen<String> {
        match callee.val() {
            Expr::Ident(name) => self.call_name(name, args, callee.location()),
            Expr::Selector { operand, member } => self.call_member(operand, member, args, callee.location()),
            Expr::Paren(inner) => self.call(inner, args),

            _ => {
                let error = CodegenError::UnresolvedCall {
                    call: callee.location().text().to_owned(),
                    suggestion: None,
                };

                Err(Located::at(error, callee.location().clone()))
            }
        }
    }

    /// Llamada a un nombre simple: función del archivo, conversión de tipo
    /// o función predeclarada, en ese orden.
    fn call_name(&self, name: &'a Identifier, args: &'a [Located<Expr>], location: &Location) -> Gen<String> {
        let name = name.as_ref();
        let shadowed = self.lookup(name).is_some();

        if !shadowed {
            if let Some(func) = self.funcs.get(name) {
                return Ok(format!("{}({})", self.function_name(func), self.arguments(args)?));
            }

            if let [value] = args {
                let conversion = if name == "string" {
                    Some(String::from("String"))
                } else if let Some(cpp) = builtin_type(name) {
                    Some(format!("static_cast<{}>", cpp))
                } else if self.structs.contains_key(name) || self.typedefs.contains_key(name) {
                    Some(format!("static_cast<{}>", mangle(name)))
                } else {
                    None
                };

                if let Some(conversion) = conversion {
                    return Ok(format!("{}({})", conversion, self.expr(value)?));
                }
            }

            if let Some(lowering) = intrinsics::builtin(name) {
                if let ("len" | "cap", [value]) = (name, args) {
                    match self.type_of(value) {
                        ty if ty.is_string() => return Ok(format!("{}.length()", self.operand(value)?)),
                        Ty::Go(Type::Slice(_)) => {
                            let error = CodegenError::SliceLength(value.location().text().to_owned());
                            return Err(Located::at(error, value.location().clone()));
                        }

                        _ => (),
                    }
                }

                if let ("new", [typ], Lowering::Template(template)) = (name, args, lowering) {
                    return render(name, template, &[self.type_operand(typ)?], location);
                }

                return self.lower(name, lowering, None, args, location);
            }
        }

        let candidates = self
            .visible_names()
            .into_iter()
            .chain(intrinsics::builtins().map(|builtin| -> &'a str { builtin }));

        let error = CodegenError::UnresolvedCall {
            call: name.to_owned(),
            suggestion: suggest(name, candidates),
        };

        Err(Located::at(error, location.clone()))
    }

    /// Llamada con selector: función de un paquete, método de una
    /// estructura del archivo o método de un valor de un paquete.
    fn call_member(
        &self,
        operand: &'a Located<Expr>,
        member: &'a Located<Identifier>,
        args: &'a [Located<Expr>],
        location: &Location,
    ) -> Gen<String> {
        let method = member.val().as_ref();

        if let Expr::Ident(package) = operand.val() {
            if let Some(import) = self.import(package.as_ref()) {
                let call = format!("{}.{}", package, method);
                return self.package_call(&call, import, method, None, args, location, || {
                    suggest(method, members(import)).map(|found| format!("{}.{}", package, found))
                });
            }
        }

        let ty = self.type_of(operand);
        let (typ, pointer) = match &ty {
            Ty::Go(Type::Pointer(inner)) => (Some(&**inner), true),
            Ty::Go(typ) => (Some(typ), false),
            _ => (None, false),
        };

        let receiver = || -> Gen<String> {
            let code = self.operand(operand)?;
            Ok(if pointer { format!("(*{})", code) } else { code })
        };

        let unresolved = |receiver: &str, suggestion: Option<String>| -> Gen<String> {
            let error = CodegenError::UnresolvedCall {
                call: format!("{}.{}", receiver, method),
                suggestion,
            };

            Err(Located::at(error, location.clone()))
        };

        match typ {
            Some(Type::Named(structure)) if self.structs.contains_key(structure.as_ref()) => {
                let structure = structure.as_ref();
                if self.methods.contains_key(&(structure, method)) {
                    let access = if pointer { "->" } else { "." };
                    return Ok(format!(
                        "{}{}{}({})",
                        self.operand(operand)?,
                        access,
                        mangle(method),
                        self.arguments(args)?
                    ));
                }

                let methods = self
                    .methods
                    .keys()
                    .filter(|(owner, _)| *owner == structure)
                    .map(|(_, name)| *name);

                unresolved(structure, suggest(method, methods))
            }

            Some(Type::Qualified { package, name }) => match self.import(package.as_ref()) {
                Some(import) => {
                    let call = format!("{}.{}.{}", package, name, method);
                    self.package_call(&call, import, method, Some(receiver()?), args, location, || {
                        suggest(method, members(import))
                    })
                }

                None => unresolved(&type_name(&Type::Qualified {
                    package: package.clone(),
                    name: name.clone(),
                }), None),
            },

            _ => {
                let package = match &ty {
                    Ty::Handle(package) => Some(*package),
                    _ => self.unique_owner(method),
                };

                match package.and_then(|package| self.import(package).map(|import| (package, import))) {
                    Some((package, import)) => {
                        let call = format!("{}.{}", package, method);
                        self.package_call(&call, import, method, Some(receiver()?), args, location, || {
                            suggest(method, members(import))
                        })
                    }

                    None => {
                        let text = operand.location().text();
                        unresolved(text, None)
                    }
                }
            }
        }
    }

    /// Único paquete externo importado que define una función, para
    /// resolver métodos sobre valores cuyo tipo no se conoce.
    fn unique_owner(&self, method: &str) -> Option<&'a str> {
        let mut owners = self.imports.iter().filter_map(|(&local, import)| match import {
            Import::Mapped(mapped) if mapped.function(method).is_some() => Some(local),
            _ => None,
        });

        let owner = owners.next()?;
        match owners.next() {
            Some(_) => None,
            None => Some(owner),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn package_call<S>(
        &self,
        call: &str,
        import: Import<'a>,
        member: &str,
        receiver: Option<String>,
        args: &'a [Located<Expr>],
        location: &Location,
        suggestion: S,
    ) -> Gen<String>
    where
        S: FnOnce() -> Option<String>,
    {
        match import {
            Import::Intrinsic(package) => {
                if let Some(lowering) = package.function(member) {
                    return self.lower(call, lowering, receiver, args, location);
                }
            }

            Import::Mapped(mapped) => {
                if let Some(template) = mapped.function(member) {
                    let values = self.values_with(receiver, args)?;
                    return render(call, template, &values, location);
                }
            }
        }

        // pkg.T(x) es una conversión al tipo del paquete
        let typ = match import {
            Import::Intrinsic(package) => package.types.get(member).copied(),
            Import::Mapped(mapped) => mapped.typ(member),
        };

        if let (Some(cpp), None, [value]) = (typ, &receiver, args) {
            return Ok(format!("static_cast<{}>({})", cpp, self.expr(value)?));
        }

        let error = CodegenError::UnresolvedCall {
            call: call.to_owned(),
            suggestion: suggestion(),
        };

        Err(Located::at(error, location.clone()))
    }

    fn lower(
        &self,
        call: &str,
        lowering: &Lowering,
        receiver: Option<String>,
        args: &'a [Located<Expr>],
        location: &Location,
    ) -> Gen<String> {
        let values = self.values_with(receiver, args)?;

        match lowering {
            Lowering::Template(template) => render(call, template, &values, location),
            Lowering::Chain { each, last, separator } => Ok(chain(each, last, *separator, &values)),
        }
    }

    /// Argumento de `new`: un tipo escrito como identificador.
    fn type_operand(&self, typ: &'a Located<Expr>) -> Gen<String> {
        match typ.val() {
            Expr::Ident(name) => match builtin_type(name.as_ref()) {
                Some(cpp) => Ok(cpp.to_owned()),
                None if self.structs.contains_key(name.as_ref()) || self.typedefs.contains_key(name.as_ref()) => {
                    Ok(mangle(name.as_ref()).into_owned())
                }

                None => self.expr(typ),
            },

            _ => self.expr(typ),
        }
    }

    fn values_with(&self, receiver: Option<String>, args: &'a [Located<Expr>]) -> Gen<Vec<String>> {
        let mut values: Vec<String> = receiver.into_iter().collect();
        for arg in args {
            values.push(self.expr(arg)?);
        }

        Ok(values)
    }

    fn arguments(&self, args: &'a [Located<Expr>]) -> Gen<String> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.expr(arg)?);
        }

        Ok(values.join(", "))
    }

    /// Literal compuesto. `typ` es el tipo explícito o, en literales
    /// anidados, el tipo de elemento esperado.
    fn composite(&self, typ: Option<&Type>, elements: &'a [Element], location: &Location) -> Gen<String> {
        let typ = match typ {
            Some(typ) => typ,
            None => return Ok(format!("{{{}}}", self.elements(None, elements)?)),
        };

        match self.underlying(typ) {
            Type::Named(name) if self.structs.contains_key(name.as_ref()) => {
                let fields = self.fields(name, elements)?;
                Ok(format!("{}{{{}}}", self.cpp_type(typ, location)?, fields))
            }

            Type::Array { elem, .. } | Type::Slice(elem) => {
                Ok(format!("{{{}}}", self.elements(Some(elem), elements)?))
            }

            _ => {
                let cpp = self.cpp_type(typ, location)?;
                Ok(format!("{}{{{}}}", cpp, self.elements(None, elements)?))
            }
        }
    }

    fn elements(&self, elem: Option<&Type>, elements: &'a [Element]) -> Gen<String> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.element(elem, &element.value)?);
        }

        Ok(values.join(", "))
    }

    fn element(&self, expected: Option<&Type>, value: &'a Located<Expr>) -> Gen<String> {
        match value.val() {
            Expr::Composite { typ: None, elements } => self.composite(expected, elements, value.location()),
            _ => self.expr(value),
        }
    }

    /// Valores de un literal de estructura en orden de declaración. Los
    /// campos omitidos se inicializan con su valor cero.
    fn fields(&self, structure: &Identifier, elements: &'a [Element]) -> Gen<String> {
        let decl = match self.structs.get(structure.as_ref()) {
            Some(decl) => decl,
            None => return self.elements(None, elements),
        };

        if elements.iter().all(|element| element.key.is_none()) {
            let mut values = Vec::with_capacity(elements.len());
            for (index, element) in elements.iter().enumerate() {
                let expected = decl.fields.get(index).map(|field| field.typ.val());
                values.push(self.element(expected, &element.value)?);
            }

            return Ok(values.join(", "));
        }

        for element in elements {
            let key = match &element.key {
                Some(key) => key,
                None => continue,
            };

            if !decl.fields.iter().any(|field| field.name.val() == key.val()) {
                let error = CodegenError::UnknownField {
                    structure: structure.to_string(),
                    field: key.val().to_string(),
                };

                return Err(Located::at(error, key.location().clone()));
            }
        }

        let mut values = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            let element = elements
                .iter()
                .find(|element| element.key.as_ref().map(Located::val) == Some(field.name.val()));

            match element {
                Some(element) => values.push(self.element(Some(field.typ.val()), &element.value)?),
                None => values.push(String::from("{}")),
            }
        }

        Ok(values.join(", "))
    }

    fn conversion(&self, typ: &Type, value: &'a Located<Expr>, location: &Location) -> Gen<String> {
        match typ {
            Type::Array { .. } | Type::Slice(_) => {
                let error = CodegenError::ArrayValue(type_name(typ));
                Err(Located::at(error, location.clone()))
            }

            _ => Ok(format!("static_cast<{}>({})", self.cpp_type(typ, location)?, self.expr(value)?)),
        }
    }

    /// Sigue tipos definidos hasta su representación.
    pub(super) fn underlying<'t>(&'t self, typ: &'t Type) -> &'t Type {
        let mut typ = typ;
        for _ in 0..16 {
            match typ {
                Type::Named(name) => match self.typedefs.get(name.as_ref()) {
                    Some(decl) => typ = decl.typ.val(),
                    None => break,
                },

                _ => break,
            }
        }

        typ
    }

    /// Tipo de una expresión, tan preciso como permite la información
    /// local.
    pub(super) fn type_of(&self, expr: &'a Located<Expr>) -> Ty<'a> {
        match expr.val() {
            Expr::Int(_) => Ty::named("int"),
            Expr::Float(_) => Ty::named("float64"),
            Expr::Str(_) => Ty::named("string"),
            Expr::Rune(_) => Ty::named("rune"),

            Expr::Ident(name) => match self.lookup(name.as_ref()) {
                Some(binding) => binding.ty.clone(),
                None => match name.as_ref() {
                    "true" | "false" => Ty::named("bool"),
                    "iota" => Ty::named("int"),
                    _ => Ty::Unknown,
                },
            },

            Expr::Binary(lhs, op, rhs) => {
                if op.precedence() <= 3 {
                    return Ty::named("bool");
                }

                let left = self.type_of(lhs);
                if matches!(op, BinOp::Shl | BinOp::Shr) {
                    return left;
                }

                let right = self.type_of(rhs);
                let untyped = matches!(lhs.val(), Expr::Int(_) | Expr::Float(_) | Expr::Rune(_));

                if (untyped || left.is_unknown()) && !right.is_unknown() {
                    right
                } else {
                    left
                }
            }

            Expr::Unary(op, operand) => match (op, self.type_of(operand)) {
                (UnOp::Not, _) => Ty::named("bool"),
                (UnOp::Addr, Ty::Go(typ)) => Ty::Go(Type::Pointer(Box::new(typ))),
                (UnOp::Deref, Ty::Go(Type::Pointer(inner))) => Ty::Go(*inner),
                (UnOp::Addr | UnOp::Deref, _) => Ty::Unknown,
                (_, ty) => ty,
            },

            Expr::Call { callee, .. } => self.call_type(callee),

            Expr::Selector { operand, member } => {
                if let Expr::Ident(package) = operand.val() {
                    if self.import(package.as_ref()).is_some() {
                        return Ty::Unknown;
                    }
                }

                let typ = match self.type_of(operand) {
                    Ty::Go(Type::Pointer(inner)) => *inner,
                    Ty::Go(typ) => typ,
                    _ => return Ty::Unknown,
                };

                match &typ {
                    Type::Named(name) => self
                        .structs
                        .get(name.as_ref())
                        .and_then(|decl| decl.fields.iter().find(|field| field.name.val() == member.val()))
                        .map_or(Ty::Unknown, |field| Ty::Go(field.typ.val().clone())),

                    _ => Ty::Unknown,
                }
            }

            Expr::Index { operand, .. } => match self.type_of(operand) {
                ty if ty.is_string() => Ty::named("byte"),
                Ty::Go(typ) => match self.underlying(&typ) {
                    Type::Array { elem, .. } | Type::Slice(elem) => Ty::Go((**elem).clone()),
                    _ => Ty::Unknown,
                },

                _ => Ty::Unknown,
            },

            Expr::Composite { typ: Some(typ), .. } => Ty::Go(typ.val().clone()),
            Expr::Conversion { typ, .. } => Ty::Go(typ.val().clone()),
            Expr::Paren(inner) => self.type_of(inner),
            _ => Ty::Unknown,
        }
    }

    fn call_type(&self, callee: &'a Located<Expr>) -> Ty<'a> {
        match callee.val() {
            Expr::Ident(name) if self.lookup(name.as_ref()).is_none() => {
                let name_str = name.as_ref();
                if let Some(func) = self.funcs.get(name_str) {
                    result_type(&func.results)
                } else if builtin_type(name_str).is_some()
                    || self.structs.contains_key(name_str)
                    || self.typedefs.contains_key(name_str)
                {
                    Ty::Go(Type::Named(name.clone()))
                } else if name_str == "len" || name_str == "cap" {
                    Ty::named("int")
                } else {
                    Ty::Unknown
                }
            }

            Expr::Selector { operand, member } => {
                if let Expr::Ident(package) = operand.val() {
                    match self.import(package.as_ref()) {
                        Some(Import::Mapped(_)) => return Ty::Handle(package.as_ref()),
                        Some(Import::Intrinsic(_)) => return Ty::Unknown,
                        None => (),
                    }
                }

                let structure = match self.type_of(operand) {
                    Ty::Go(Type::Named(name)) => name,
                    Ty::Go(Type::Pointer(inner)) => match *inner {
                        Type::Named(name) => name,
                        _ => return Ty::Unknown,
                    },

                    _ => return Ty::Unknown,
                };

                self.methods
                    .get(&(structure.as_ref(), member.val().as_ref()))
                    .map_or(Ty::Unknown, |method| result_type(&method.results))
            }

            Expr::Paren(inner) => self.call_type(inner),
            _ => Ty::Unknown,
        }
    }

    /// Valor de una expresión constante entera.
    pub(super) fn const_int(&self, expr: &Located<Expr>) -> Option<i128> {
        match expr.val() {
            Expr::Int(literal) => Some(i128::from(literal.value)),
            Expr::Rune(c) => Some(i128::from(u32::from(*c))),
            Expr::Ident(name) if name.as_ref() == "iota" => self.iota.map(i128::from),
            Expr::Ident(name) => self.values.get(name.as_ref()).copied(),
            Expr::Paren(inner) => self.const_int(inner),

            Expr::Unary(op, operand) => {
                let value = self.const_int(operand)?;
                match op {
                    UnOp::Neg => value.checked_neg(),
                    UnOp::Plus => Some(value),
                    UnOp::BitNot => Some(!value),
                    _ => None,
                }
            }

            Expr::Binary(lhs, op, rhs) => {
                let (lhs, rhs) = (self.const_int(lhs)?, self.const_int(rhs)?);
                match op {
                    BinOp::Add => lhs.checked_add(rhs),
                    BinOp::Sub => lhs.checked_sub(rhs),
                    BinOp::Mul => lhs.checked_mul(rhs),
                    BinOp::Div => lhs.checked_div(rhs),
                    BinOp::Rem => lhs.checked_rem(rhs),
                    BinOp::Shl => u32::try_from(rhs).ok().filter(|&shift| shift < 64).map(|shift| lhs << shift),
                    BinOp::Shr => u32::try_from(rhs).ok().filter(|&shift| shift < 128).map(|shift| lhs >> shift),
                    BinOp::And => Some(lhs & rhs),
                    BinOp::Or => Some(lhs | rhs),
                    BinOp::Xor => Some(lhs ^ rhs),
                    BinOp::AndNot => Some(lhs & !rhs),
                    _ => None,
                }
            }

            _ => None,
        }
    }

    /// Tipo entero de C++ para una constante sin tipo explícito: `int` si
    /// cabe en el `int` de la tarjeta, `long` si cabe en 32 bits.
    pub(super) fn int_type(&self, value: i128) -> &'static str {
        let bits = self.options.board.int_bits();
        let fits = |bits: u32| {
            let max = (1i128 << (bits - 1)) - 1;
            (-max - 1..=max).contains(&value)
        };

        if fits(bits) {
            "int"
        } else if fits(32) {
            "long"
        } else if fits(64) {
            "long long"
        } else {
            "unsigned long long"
        }
    }

    /// Literal plegado de una constante sin tipo, con el sufijo que pide
    /// [`int_type`](Self::int_type) para que C++ no lo evalúe en `int`.
    pub(super) fn folded_literal(&self, value: i128) -> String {
        let suffix = match self.int_type(value) {
            "int" => "",
            "long" => "L",
            "long long" => "LL",
            _ => "ULL",
        };

        format!("{}{}", value, suffix)
    }
}

fn result_type(results: &Results) -> Ty<'_> {
    match results {
        Results::Void => Ty::Unknown,
        Results::Single(param) => Ty::Go(param.typ.val().clone()),
        Results::Multiple(aggregate) => Ty::Aggregate(aggregate),
    }
}

fn is_string_literal(expr: &Located<Expr>) -> bool {
    matches!(expr.val(), Expr::Str(_))
}

/// Precedencia de C++, mayor liga más fuerte.
fn cpp_precedence(op: BinOp) -> u8 {
    use BinOp::*;

    match op {
        Mul | Div | Rem => 10,
        Add | Sub => 9,
        Shl | Shr => 8,
        Lt | Le | Gt | Ge => 7,
        Eq | Ne => 6,
        And | AndNot => 5,
        Xor => 4,
        Or => 3,
        LogicalAnd => 2,
        LogicalOr => 1,
    }
}

fn render(call: &str, template: &Template, values: &[String], location: &Location) -> Gen<String> {
    template.render(values).map_err(|arity| {
        let error = CodegenError::Placeholders {
            call: call.to_owned(),
            expected: arity.expected,
            variadic: arity.variadic,
            found: arity.found,
        };

        Located::at(error, location.clone())
    })
}

/// `Serial.print(a), Serial.print(" "), Serial.println(b)`
fn chain(each: &str, last: &str, separator: Option<&str>, values: &[String]) -> String {
    if values.is_empty() {
        return if last == each {
            format!("{}(\"\")", last)
        } else {
            format!("{}()", last)
        };
    }

    let mut calls = Vec::with_capacity(values.len() * 2);
    for (index, value) in values.iter().enumerate() {
        if index + 1 == values.len() {
            calls.push(format!("{}({})", last, value));
        } else {
            calls.push(format!("{}({})", each, value));
            if let Some(separator) = separator {
                calls.push(format!("{}({})", each, separator));
            }
        }
    }

    match calls.len() {
        1 => calls.remove(0),
        _ => format!("({})", calls.join(", ")),
    }
}

/// Funciones y constantes de un paquete, para sugerencias.
fn members<'p>(import: Import<'p>) -> Vec<&'p str> {
    match import {
        Import::Intrinsic(package) => package
            .functions
            .keys()
            .chain(package.constants.keys())
            .copied()
            .collect(),

        Import::Mapped(mapped) => mapped.members().collect(),
    }
}

/// Candidato más cercano por distancia de edición, sin distinguir
/// mayúsculas. Los empates se resuelven alfabéticamente.
pub(super) fn suggest<'s, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'s str>,
{
    let limit = (name.chars().count() + 2) / 3;
    let lowered = name.to_lowercase();

    let mut best: Option<(usize, &str)> = None;
    for candidate in candidates {
        if candidate == name {
            continue;
        }

        let distance = if UniCase::new(candidate) == UniCase::new(name) {
            0
        } else {
            levenshtein(&lowered, &candidate.to_lowercase())
        };

        let better = match best {
            Some(current) => (distance, candidate) < current,
            None => true,
        };

        if distance <= limit.max(1) && better {
            best = Some((distance, candidate));
        }
    }

    best.map(|(_, candidate)| candidate.to_owned())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;

        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = if ca == cb { 0 } else { 1 };

            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }

    row[b.len()]
}

fn int_literal(literal: IntLiteral) -> String {
    let IntLiteral { value, radix } = literal;

    let digits = match radix {
        16 => format!("0x{:X}", value),
        8 if value != 0 => format!("0{:o}", value),
        2 => format!("0b{:b}", value),
        _ => value.to_string(),
    };

    if value > i64::MAX as u64 {
        format!("{}ULL", digits)
    } else {
        digits
    }
}

/// Literal de cadena de C++. Los caracteres de control se escapan en
/// octal, que no absorbe dígitos siguientes.
pub(super) fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');

    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => quoted.push_str(&format!("\\{:03o}", u32::from(c) & 0o777)),
            c => quoted.push(c),
        }
    }

    quoted.push('"');
    quoted
}

fn rune(c: char) -> String {
    match c {
        '\'' => String::from("'\\''"),
        '\\' => String::from("'\\\\'"),
        '\n' => String::from("'\\n'"),
        '\r' => String::from("'\\r'"),
        '\t' => String::from("'\\t'"),
        c if c == ' ' || c.is_ascii_graphic() => format!("'{}'", c),
        c => u32::from(c).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn suggestions_ignore_case_and_prefer_closest() {
        let candidates = ["digitalWrite", "digitalRead", "delay"];
        assert_eq!(suggest("DigitalWrit", candidates), Some(String::from("digitalWrite")));
        assert_eq!(suggest("Delay", candidates), Some(String::from("delay")));
        assert_eq!(suggest("Blink", candidates), None);
    }

    #[test]
    fn suggestion_ties_are_alphabetical() {
        assert_eq!(suggest("cat", ["cut", "bat"]), Some(String::from("bat")));
    }

    #[test]
    fn edit_distance() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn literals_keep_their_radix() {
        assert_eq!(int_literal(IntLiteral { value: 255, radix: 16 }), "0xFF");
        assert_eq!(int_literal(IntLiteral { value: 8, radix: 8 }), "010");
        assert_eq!(int_literal(IntLiteral { value: 5, radix: 2 }), "0b101");
        assert_eq!(int_literal(IntLiteral { value: 0, radix: 8 }), "0");
        assert_eq!(int_literal(IntLiteral { value: u64::MAX, radix: 10 }), "18446744073709551615ULL");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(quote("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
        assert_eq!(quote("\u{1}7"), "\"\\0017\"");
        assert_eq!(quote("año"), "\"año\"");
        assert_eq!(rune('a'), "'a'");
        assert_eq!(rune('\''), "'\\''");
        assert_eq!(rune('ñ'), "241");
    }

    #[test]
    fn chains_join_with_separators() {
        let values = vec![String::from("a"), String::from("b")];
        assert_eq!(
            chain("Serial.print", "Serial.println", Some("\" \""), &values),
            "(Serial.print(a), Serial.print(\" \"), Serial.println(b))"
        );

        assert_eq!(chain("Serial.print", "Serial.println", None, &[]), "Serial.println()");
        assert_eq!(chain("Serial.print", "Serial.print", None, &[]), "Serial.print(\"\")");
        assert_eq!(chain("Serial.print", "Serial.print", None, &values[..1]), "Serial.print(a)");
    }
}
