//! Sentencias y declaraciones.

use crate::{
    ast::{
        Aggregate, ArrayLen, BinOp, Block, Case, ConstSpec, Else, Expr, If, Results, Stmt, Switch, Type, UnOp, VarSpec,
    },
    lex::Identifier,
    source::{Located, Location},
};

use super::{
    scope::{mangle, Ty},
    BreakTarget, CodegenError, Gen, Generator,
};

impl<'a> Generator<'a> {
    pub(super) fn statements(&mut self, block: &'a Block) {
        for stmt in block {
            self.statement(stmt);
        }
    }

    /// Cuerpo entre llaves ya emitidas, con su propio ámbito.
    fn body(&mut self, block: &'a Block) {
        self.depth += 1;
        self.enter();
        self.statements(block);
        self.leave();
        self.depth -= 1;
    }

    fn loop_body(&mut self, block: &'a Block) {
        self.breaks.push(BreakTarget::Native);
        self.body(block);
        self.breaks.pop();
    }

    fn statement(&mut self, stmt: &'a Located<Stmt>) {
        self.mark(stmt.location());
        let result = self.try_statement(stmt);
        self.record(result);
    }

    fn try_statement(&mut self, stmt: &'a Located<Stmt>) -> Gen<()> {
        let location = stmt.location();

        match stmt.val() {
            Stmt::Var(specs) => {
                for spec in specs {
                    self.var_spec(spec)?;
                }
            }

            Stmt::Const(specs) => {
                for spec in specs {
                    self.const_spec(spec)?;
                }
            }

            Stmt::Define { names, values } => self.define(names, values, location)?,
            Stmt::Assign { targets, op, values } => self.assign(targets, *op, values, location)?,

            Stmt::IncDec { target, increment } => {
                let target = self.expr(target)?;
                let op = if *increment { "++" } else { "--" };
                emit!(self, "{}{};", target, op);
            }

            Stmt::Expr(expr) => {
                let code = self.expr(expr)?;
                emit!(self, "{};", code);
            }

            Stmt::Return(values) => self.ret(values, location)?,
            Stmt::If(stmt) => self.if_statement(stmt)?,

            Stmt::ForClassic {
                init,
                condition,
                post,
                body,
            } => {
                self.enter();
                let header = self.loop_header(init.as_deref(), condition.as_ref(), post.as_deref());
                let result = header.map(|header| {
                    emit!(self, "{} {{", header);
                    self.loop_body(body);
                    emit!(self, "}}");
                });

                self.leave();
                result?;
            }

            Stmt::ForRange {
                key,
                value,
                define,
                iterable,
                body,
            } => self.for_range(key.as_ref(), value.as_ref(), *define, iterable, body)?,

            Stmt::Switch(switch) => self.switch(switch)?,

            Stmt::Break => match self.breaks.last_mut() {
                Some(BreakTarget::Label { name, used }) => {
                    *used = true;
                    let jump = format!("goto {};", name);
                    emit!(self, "{}", jump);
                }

                _ => emit!(self, "break;"),
            },

            Stmt::Continue => emit!(self, "continue;"),
            Stmt::Fallthrough => return Err(Located::at(CodegenError::Fallthrough, location.clone())),

            Stmt::Block(block) => {
                emit!(self, "{{");
                self.body(block);
                emit!(self, "}}");
            }

            Stmt::Unsupported { kind, text } => {
                let text: Vec<&str> = text.lines().map(str::trim).collect();
                emit!(self, "// TSUKI-UNSUPPORTED: {}", text.join(" "));

                let warning = CodegenError::Unsupported(kind.keyword());
                self.errors.push(Located::at(warning, location.clone()));
            }
        }

        Ok(())
    }

    pub(super) fn var_spec(&mut self, spec: &'a VarSpec) -> Gen<()> {
        let location = match spec.names.first() {
            Some(name) => name.location(),
            None => return Ok(()),
        };

        let typ = spec.typ.as_ref();
        match (spec.names.len(), spec.values.len()) {
            (_, 0) => {
                for name in &spec.names {
                    let typ = match typ {
                        Some(typ) => typ,
                        None => continue,
                    };

                    if name.val().is_blank() {
                        continue;
                    }

                    let declarator = self.declarator(typ.val(), &mangle(name.val().as_ref()), typ.location())?;
                    emit!(self, "{}{{}};", declarator);
                    self.bind(name.val().as_ref(), Ty::Go(typ.val().clone()), false);
                }

                Ok(())
            }

            (targets, 1) if targets > 1 => self.unpack(&spec.names, &spec.values[0], location),

            (targets, values) if targets == values => {
                for (name, value) in spec.names.iter().zip(&spec.values) {
                    self.declare(name, typ, value)?;
                }

                Ok(())
            }

            (targets, values) => Err(Located::at(CodegenError::Mismatch { targets, values }, location.clone())),
        }
    }

    pub(super) fn const_spec(&mut self, spec: &'a ConstSpec) -> Gen<()> {
        self.iota = Some(spec.iota);
        let result = self.constants(spec);
        self.iota = None;

        result
    }

    fn constants(&mut self, spec: &'a ConstSpec) -> Gen<()> {
        if spec.names.len() != spec.values.len() {
            let error = CodegenError::Mismatch {
                targets: spec.names.len(),
                values: spec.values.len(),
            };

            let location = spec.names.first().map(Located::location);
            return match location {
                Some(location) => Err(Located::at(error, location.clone())),
                None => Ok(()),
            };
        }

        for (name, value) in spec.names.iter().zip(&spec.values) {
            if name.val().is_blank() {
                continue;
            }

            let cpp_name = mangle(name.val().as_ref());
            let (declarator, ty) = match &spec.typ {
                Some(typ) => {
                    let declarator = self.declarator(typ.val(), &cpp_name, typ.location())?;
                    (declarator, Ty::Go(typ.val().clone()))
                }

                None => self.inferred(value, &cpp_name)?,
            };

            let folded = self.const_int(value);
            let code = match folded {
                Some(constant) if spec.typ.is_none() && ty.is_named("int") => self.folded_literal(constant),
                _ => self.expr(value)?,
            };

            emit!(self, "const {} = {};", declarator, code);

            if let Some(value) = folded {
                self.values.insert(name.val().as_ref(), value);
            }

            self.bind(name.val().as_ref(), ty, true);
        }

        Ok(())
    }

    /// Declara una variable con valor inicial. El nombre se liga después
    /// de evaluar el valor, como en Go.
    fn declare(
        &mut self,
        name: &'a Located<Identifier>,
        typ: Option<&'a Located<Type>>,
        value: &'a Located<Expr>,
    ) -> Gen<()> {
        if name.val().is_blank() {
            let code = self.expr(value)?;
            emit!(self, "(void)({});", code);
            return Ok(());
        }

        let cpp_name = mangle(name.val().as_ref());
        let (declarator, ty) = match typ {
            Some(typ) => {
                let declarator = self.declarator(typ.val(), &cpp_name, typ.location())?;
                (declarator, Ty::Go(typ.val().clone()))
            }

            None => self.inferred(value, &cpp_name)?,
        };

        let code = self.expr(value)?;
        emit!(self, "{} = {};", declarator, code);
        self.bind(name.val().as_ref(), ty, false);

        Ok(())
    }

    /// Tipo con el que se declara una variable a partir de su valor. Los
    /// literales de slice se declaran como arreglos de longitud inferida.
    pub(super) fn declared_type(&self, value: &'a Located<Expr>) -> Ty<'a> {
        match value.val() {
            Expr::Composite { typ: Some(typ), .. } => match typ.val() {
                Type::Slice(elem) => Ty::Go(Type::Array {
                    len: ArrayLen::Inferred,
                    elem: elem.clone(),
                }),

                other => Ty::Go(other.clone()),
            },

            _ => self.type_of(value),
        }
    }

    /// Declarador para un valor sin tipo explícito. Las constantes enteras
    /// eligen el ancho según la tarjeta y lo desconocido cae en `auto`.
    fn inferred(&self, value: &'a Located<Expr>, name: &str) -> Gen<(String, Ty<'a>)> {
        let ty = self.declared_type(value);

        let declarator = match &ty {
            Ty::Go(typ @ Type::Array { .. }) => self.declarator(typ, name, value.location())?,

            Ty::Go(typ) => match self.const_int(value) {
                Some(constant) if ty.is_named("int") => format!("{} {}", self.int_type(constant), name),
                _ => match self.cpp_type(typ, value.location()) {
                    Ok(cpp) => format!("{} {}", cpp, name),
                    Err(_) => format!("auto {}", name),
                },
            },

            _ => format!("auto {}", name),
        };

        Ok((declarator, ty))
    }

    fn define(
        &mut self,
        names: &'a [Located<Identifier>],
        values: &'a [Located<Expr>],
        location: &Location,
    ) -> Gen<()> {
        match (names.len(), values.len()) {
            (targets, 1) if targets > 1 => self.unpack(names, &values[0], location),
            (1, 1) => self.declare(&names[0], None, &values[0]),

            (targets, count) if targets == count => {
                let visible = names.iter().any(|name| self.lookup(name.val().as_ref()).is_some());
                if !visible {
                    for (name, value) in names.iter().zip(values) {
                        self.declare(name, None, value)?;
                    }

                    return Ok(());
                }

                // Algún nombre ya existe: los valores se evalúan antes de asignar
                let mut temps = Vec::with_capacity(values.len());
                for value in values {
                    let code = self.expr(value)?;
                    let temp = self.temp("tmp");
                    emit!(self, "auto {} = {};", temp, code);
                    temps.push(temp);
                }

                for ((name, value), temp) in names.iter().zip(values).zip(temps) {
                    if name.val().is_blank() {
                        continue;
                    }

                    let cpp_name = mangle(name.val().as_ref());
                    if self.declared_here(name.val().as_ref()) {
                        emit!(self, "{} = {};", cpp_name, temp);
                    } else {
                        let (declarator, ty) = self.inferred(value, &cpp_name)?;
                        emit!(self, "{} = {};", declarator, temp);
                        self.bind(name.val().as_ref(), ty, false);
                    }
                }

                Ok(())
            }

            (targets, values) => Err(Located::at(CodegenError::Mismatch { targets, values }, location.clone())),
        }
    }

    /// Evalúa una llamada con retorno múltiple en un temporal.
    fn multi_value(
        &mut self,
        value: &'a Located<Expr>,
        targets: usize,
        location: &Location,
    ) -> Gen<(String, &'a Aggregate)> {
        let aggregate = match self.type_of(value) {
            Ty::Aggregate(aggregate) => aggregate,
            _ => {
                let error = CodegenError::Mismatch { targets, values: 1 };
                return Err(Located::at(error, location.clone()));
            }
        };

        if aggregate.fields.len() != targets {
            let error = CodegenError::Mismatch {
                targets,
                values: aggregate.fields.len(),
            };

            return Err(Located::at(error, location.clone()));
        }

        let code = self.expr(value)?;
        let temp = self.temp("tmp");
        emit!(self, "{} {} = {};", aggregate.name, temp, code);

        Ok((temp, aggregate))
    }

    /// `q, r := divmod(a, b)`: cada nombre toma el campo del agregado en la
    /// misma posición.
    fn unpack(
        &mut self,
        names: &'a [Located<Identifier>],
        value: &'a Located<Expr>,
        location: &Location,
    ) -> Gen<()> {
        let (temp, aggregate) = self.multi_value(value, names.len(), location)?;

        for (name, field) in names.iter().zip(&aggregate.fields) {
            if name.val().is_blank() {
                continue;
            }

            let cpp_name = mangle(name.val().as_ref());
            let access = format!("{}.{}", temp, mangle(field.name.val().as_ref()));

            if self.declared_here(name.val().as_ref()) {
                emit!(self, "{} = {};", cpp_name, access);
            } else {
                let declarator = self.declarator(field.typ.val(), &cpp_name, field.typ.location())?;
                emit!(self, "{} = {};", declarator, access);
                self.bind(name.val().as_ref(), Ty::Go(field.typ.val().clone()), false);
            }
        }

        Ok(())
    }

    fn assign(
        &mut self,
        targets: &'a [Located<Expr>],
        op: Option<BinOp>,
        values: &'a [Located<Expr>],
        location: &Location,
    ) -> Gen<()> {
        if let Some(op) = op {
            let line = self.compound(targets, op, values, location)?;
            emit!(self, "{};", line);
            return Ok(());
        }

        match (targets.len(), values.len()) {
            (count, 1) if count > 1 => {
                let (temp, aggregate) = self.multi_value(&values[0], count, location)?;
                for (target, field) in targets.iter().zip(&aggregate.fields) {
                    if !is_blank(target) {
                        let target = self.expr(target)?;
                        emit!(self, "{} = {}.{};", target, temp, mangle(field.name.val().as_ref()));
                    }
                }

                Ok(())
            }

            (1, 1) => {
                let value = self.expr(&values[0])?;
                if is_blank(&targets[0]) {
                    emit!(self, "(void)({});", value);
                } else {
                    let target = self.expr(&targets[0])?;
                    emit!(self, "{} = {};", target, value);
                }

                Ok(())
            }

            // a, b = b, a
            (count, values_count) if count == values_count => {
                let mut temps = Vec::with_capacity(count);
                for value in values {
                    let code = self.expr(value)?;
                    let temp = self.temp("tmp");
                    emit!(self, "auto {} = {};", temp, code);
                    temps.push(temp);
                }

                for (target, temp) in targets.iter().zip(temps) {
                    if !is_blank(target) {
                        let target = self.expr(target)?;
                        emit!(self, "{} = {};", target, temp);
                    }
                }

                Ok(())
            }

            (targets, values) => Err(Located::at(CodegenError::Mismatch { targets, values }, location.clone())),
        }
    }

    fn compound(
        &self,
        targets: &'a [Located<Expr>],
        op: BinOp,
        values: &'a [Located<Expr>],
        location: &Location,
    ) -> Gen<String> {
        let (target, value) = match (targets, values) {
            ([target], [value]) => (target, value),
            _ => {
                let error = CodegenError::Mismatch {
                    targets: targets.len(),
                    values: values.len(),
                };

                return Err(Located::at(error, location.clone()));
            }
        };

        let target = self.expr(target)?;
        let value = self.expr(value)?;

        Ok(match op {
            BinOp::AndNot => format!("{} &= ~({})", target, value),
            _ => format!("{} {}= {}", target, op.to_cpp(), value),
        })
    }

    fn ret(&mut self, values: &'a [Located<Expr>], location: &Location) -> Gen<()> {
        let mismatch = |targets: usize| {
            let error = CodegenError::Mismatch {
                targets,
                values: values.len(),
            };

            Err(Located::at(error, location.clone()))
        };

        let results = self.results;
        match results {
            None | Some(Results::Void) => match values {
                [] => emit!(self, "return;"),
                _ => return mismatch(0),
            },

            Some(Results::Single(param)) => match (values, &param.name) {
                ([value], _) => {
                    let code = self.expr(value)?;
                    emit!(self, "return {};", code);
                }

                ([], Some(name)) => emit!(self, "return {};", mangle(name.val().as_ref())),
                _ => return mismatch(1),
            },

            Some(Results::Multiple(aggregate)) => {
                let fields = aggregate.fields.len();

                if values.is_empty() && aggregate.named {
                    let names: Vec<_> = aggregate
                        .fields
                        .iter()
                        .map(|field| mangle(field.name.val().as_ref()).into_owned())
                        .collect();

                    emit!(self, "return {}{{{}}};", aggregate.name, names.join(", "));
                } else if values.len() == fields {
                    let mut codes = Vec::with_capacity(fields);
                    for value in values {
                        codes.push(self.expr(value)?);
                    }

                    emit!(self, "return {}{{{}}};", aggregate.name, codes.join(", "));
                } else if let [value] = values {
                    match self.type_of(value) {
                        Ty::Aggregate(other) if other.name == aggregate.name => {
                            let code = self.expr(value)?;
                            emit!(self, "return {};", code);
                        }

                        Ty::Aggregate(other) if other.fields.len() == fields => {
                            let (temp, other) = self.multi_value(value, fields, location)?;
                            let access: Vec<_> = other
                                .fields
                                .iter()
                                .map(|field| format!("{}.{}", temp, mangle(field.name.val().as_ref())))
                                .collect();

                            emit!(self, "return {}{{{}}};", aggregate.name, access.join(", "));
                        }

                        _ => return mismatch(fields),
                    }
                } else {
                    return mismatch(fields);
                }
            }
        }

        Ok(())
    }

    fn if_statement(&mut self, stmt: &'a If) -> Gen<()> {
        match &stmt.init {
            Some(init) => {
                emit!(self, "{{");
                self.depth += 1;
                self.enter();

                self.statement(init);
                let result = self.if_chain(stmt);

                self.leave();
                self.depth -= 1;
                emit!(self, "}}");

                result
            }

            None => self.if_chain(stmt),
        }
    }

    fn if_chain(&mut self, stmt: &'a If) -> Gen<()> {
        let condition = self.expr(&stmt.condition)?;
        emit!(self, "if ({}) {{", condition);
        self.body(&stmt.then);

        let mut otherwise = &stmt.otherwise;
        loop {
            match otherwise {
                None => {
                    emit!(self, "}}");
                    return Ok(());
                }

                Some(Else::Block(block)) => {
                    emit!(self, "}} else {{");
                    self.body(block);
                    emit!(self, "}}");
                    return Ok(());
                }

                Some(Else::If(next)) if next.val().init.is_some() => {
                    emit!(self, "}} else {{");
                    self.depth += 1;
                    let result = self.if_statement(next.val());
                    self.depth -= 1;
                    emit!(self, "}}");

                    return result;
                }

                Some(Else::If(next)) => {
                    let next = next.val();
                    let condition = self.expr(&next.condition)?;

                    emit!(self, "}} else if ({}) {{", condition);
                    self.body(&next.then);
                    otherwise = &next.otherwise;
                }
            }
        }
    }

    /// Cabecera de un ciclo clásico. Las variables de la inicialización
    /// quedan en el ámbito que el llamador abrió para el ciclo.
    fn loop_header(
        &mut self,
        init: Option<&'a Located<Stmt>>,
        condition: Option<&'a Located<Expr>>,
        post: Option<&'a Located<Stmt>>,
    ) -> Gen<String> {
        let init = match init {
            Some(init) => self.simple(init)?,
            None => String::new(),
        };

        let condition = match condition {
            Some(condition) => self.expr(condition)?,
            None => String::new(),
        };

        let post = match post {
            Some(post) => self.simple(post)?,
            None => String::new(),
        };

        let header = match (init.is_empty(), condition.is_empty(), post.is_empty()) {
            (true, true, true) => String::from("for (;;)"),
            (true, false, true) => format!("while ({})", condition),
            _ => format!("for ({}; {}; {})", init, condition, post),
        };

        Ok(header)
    }

    /// Sentencia simple sin `;`, para cabeceras de ciclos.
    fn simple(&mut self, stmt: &'a Located<Stmt>) -> Gen<String> {
        match stmt.val() {
            Stmt::Define { names, values } if names.len() == values.len() => {
                let mut declarators = Vec::with_capacity(names.len());
                let mut bindings = Vec::with_capacity(names.len());

                for (name, value) in names.iter().zip(values) {
                    let cpp_name = mangle(name.val().as_ref());
                    let code = self.expr(value)?;

                    if names.len() == 1 {
                        let (declarator, ty) = self.inferred(value, &cpp_name)?;
                        declarators.push(format!("{} = {}", declarator, code));
                        bindings.push((name, ty));
                    } else {
                        declarators.push(format!("{} = {}", cpp_name, code));
                        bindings.push((name, self.declared_type(value)));
                    }
                }

                for (name, ty) in bindings {
                    self.bind(name.val().as_ref(), ty, false);
                }

                match declarators.len() {
                    1 => Ok(declarators.remove(0)),
                    _ => Ok(format!("auto {}", declarators.join(", "))),
                }
            }

            Stmt::Assign {
                targets,
                op: Some(op),
                values,
            } => self.compound(targets, *op, values, stmt.location()),

            Stmt::Assign { targets, op: None, values } if targets.len() == values.len() => {
                let mut assignments = Vec::with_capacity(targets.len());
                for (target, value) in targets.iter().zip(values) {
                    assignments.push(format!("{} = {}", self.expr(target)?, self.expr(value)?));
                }

                Ok(assignments.join(", "))
            }

            Stmt::IncDec { target, increment } => {
                let op = if *increment { "++" } else { "--" };
                Ok(format!("{}{}", self.expr(target)?, op))
            }

            Stmt::Expr(expr) => self.expr(expr),

            Stmt::Define { names, values } => {
                let error = CodegenError::Mismatch {
                    targets: names.len(),
                    values: values.len(),
                };

                Err(Located::at(error, stmt.location().clone()))
            }

            Stmt::Assign { targets, values, .. } => {
                let error = CodegenError::Mismatch {
                    targets: targets.len(),
                    values: values.len(),
                };

                Err(Located::at(error, stmt.location().clone()))
            }

            _ => Ok(String::new()),
        }
    }
}

impl<'a> Generator<'a> {
    /// `for ... range` como ciclo indexado. Los arreglos se recorren con
    /// `sizeof`, las cadenas con `length()` y los enteros de 0 a n.
    fn for_range(
        &mut self,
        key: Option<&'a Located<Identifier>>,
        value: Option<&'a Located<Identifier>>,
        define: bool,
        iterable: &'a Located<Expr>,
        body: &'a Block,
    ) -> Gen<()> {
        let named = |name: Option<&'a Located<Identifier>>| name.filter(|name| !name.val().is_blank());
        let (key, value) = (named(key), named(value));

        let ty = self.type_of(iterable);
        let code = self.operand(iterable)?;
        let text = iterable.location().text().to_owned();

        let index = match key {
            Some(key) => mangle(key.val().as_ref()).into_owned(),
            None => self.temp("i"),
        };

        // El índice se declara en la cabecera salvo que sea una variable existente
        let declare = define || key.is_none();

        let (header, element) = match &ty {
            ty if ty.is_string() => {
                let kind = if declare { "unsigned int " } else { "" };
                let header = format!(
                    "for ({kind}{i} = 0; {i} < {s}.length(); {i}++)",
                    kind = kind,
                    i = index,
                    s = code
                );

                let element = (Type::Named(Identifier::new("rune")), format!("{}[{}]", code, index));
                (header, Some(element))
            }

            ty if ty.is_integer() => {
                if value.is_some() {
                    return Err(Located::at(CodegenError::Range(text), iterable.location().clone()));
                }

                let header = if declare {
                    let bound = self.temp("n");
                    format!(
                        "for (int {i} = 0, {n} = {c}; {i} < {n}; {i}++)",
                        i = index,
                        n = bound,
                        c = code
                    )
                } else {
                    format!("for ({i} = 0; {i} < {c}; {i}++)", i = index, c = code)
                };

                (header, None)
            }

            Ty::Go(typ) => match self.underlying(typ) {
                Type::Array { elem, .. } => {
                    let kind = if declare { "int " } else { "" };
                    let header = format!(
                        "for ({kind}{i} = 0; {i} < (int)(sizeof({c}) / sizeof({c}[0])); {i}++)",
                        kind = kind,
                        i = index,
                        c = code
                    );

                    let element = ((**elem).clone(), format!("{}[{}]", code, index));
                    (header, Some(element))
                }

                Type::Slice(_) => {
                    return Err(Located::at(CodegenError::SliceLength(text), iterable.location().clone()));
                }

                _ => return Err(Located::at(CodegenError::Range(text), iterable.location().clone())),
            },

            _ => return Err(Located::at(CodegenError::Range(text), iterable.location().clone())),
        };

        self.enter();
        if let (Some(key), true) = (key, define) {
            self.bind(key.val().as_ref(), Ty::named("int"), false);
        }

        emit!(self, "{} {{", header);
        self.depth += 1;

        if let (Some(value), Some((elem, access))) = (value, element) {
            let cpp_name = mangle(value.val().as_ref()).into_owned();
            if define {
                // Los arreglos de C++ no se copian por asignación
                let declarator = match &elem {
                    Type::Array { .. } => format!("auto& {}", cpp_name),
                    _ => self
                        .declarator(&elem, &cpp_name, value.location())
                        .unwrap_or_else(|_| format!("auto {}", cpp_name)),
                };

                emit!(self, "{} = {};", declarator, access);
                self.bind(value.val().as_ref(), Ty::Go(elem), false);
            } else {
                emit!(self, "{} = {};", cpp_name, access);
            }
        }

        self.breaks.push(BreakTarget::Native);
        self.enter();
        self.statements(body);
        self.leave();
        self.breaks.pop();

        self.depth -= 1;
        emit!(self, "}}");
        self.leave();

        Ok(())
    }

    fn switch(&mut self, switch: &'a Switch) -> Gen<()> {
        match &switch.init {
            Some(init) => {
                emit!(self, "{{");
                self.depth += 1;
                self.enter();

                self.statement(init);
                let result = self.switch_body(switch);

                self.leave();
                self.depth -= 1;
                emit!(self, "}}");

                result
            }

            None => self.switch_body(switch),
        }
    }

    fn switch_body(&mut self, switch: &'a Switch) -> Gen<()> {
        match &switch.tag {
            Some(tag) if self.is_native_switch(tag, &switch.cases) => self.native_switch(tag, &switch.cases),
            tag => self.if_switch(tag.as_ref(), &switch.cases),
        }
    }

    /// Un `switch` de C++ requiere un sujeto entero y casos constantes.
    fn is_native_switch(&self, tag: &'a Located<Expr>, cases: &'a [Case]) -> bool {
        let ty = self.type_of(tag);

        (ty.is_integer() || ty.is_unknown())
            && cases
                .iter()
                .flat_map(|case| &case.values)
                .all(|value| self.is_case_constant(value))
    }

    fn is_case_constant(&self, value: &'a Located<Expr>) -> bool {
        match value.val() {
            Expr::Int(_) | Expr::Rune(_) => true,
            Expr::Paren(inner) | Expr::Unary(UnOp::Neg, inner) => self.is_case_constant(inner),

            Expr::Ident(name) => {
                let constant = self.lookup(name.as_ref()).map_or(false, |binding| binding.constant);
                constant && self.const_int(value).is_some()
            }

            Expr::Binary(..) => self.const_int(value).is_some(),
            _ => false,
        }
    }

    fn native_switch(&mut self, tag: &'a Located<Expr>, cases: &'a [Case]) -> Gen<()> {
        let subject = self.expr(tag)?;

        let mut labels = Vec::with_capacity(cases.len());
        for case in cases {
            if case.is_default() {
                labels.push(String::from("default:"));
                continue;
            }

            let mut label = Vec::with_capacity(case.values.len());
            for value in &case.values {
                label.push(format!("case {}:", self.expr(value)?));
            }

            labels.push(label.join(" "));
        }

        emit!(self, "switch ({}) {{", subject);

        for (case, label) in cases.iter().zip(labels) {
            let (body, falls) = match case.body.split_last() {
                Some((last, rest)) if matches!(last.val(), Stmt::Fallthrough) => (rest, true),
                _ => (&case.body[..], false),
            };

            emit!(self, "{} {{", label);
            self.depth += 1;
            self.breaks.push(BreakTarget::Native);
            self.enter();

            for stmt in body {
                self.statement(stmt);
            }

            self.leave();
            self.breaks.pop();

            if !falls {
                emit!(self, "break;");
            }

            self.depth -= 1;
            emit!(self, "}}");
        }

        emit!(self, "}}");
        Ok(())
    }

    /// `switch` como cadena de `if`. El sujeto se evalúa una sola vez y
    /// `default` siempre va al final, sin importar su posición.
    fn if_switch(&mut self, tag: Option<&'a Located<Expr>>, cases: &'a [Case]) -> Gen<()> {
        for case in cases {
            if let Some(last) = case.body.last() {
                if matches!(last.val(), Stmt::Fallthrough) {
                    return Err(Located::at(CodegenError::Fallthrough, last.location().clone()));
                }
            }
        }

        let subject = match tag {
            Some(tag) => {
                let kind = if self.type_of(tag).is_string() { "String" } else { "auto" };
                let code = self.expr(tag)?;
                Some((self.temp("tag"), kind, code))
            }

            None => None,
        };

        let mut branches = Vec::with_capacity(cases.len());
        for case in cases.iter().filter(|case| !case.is_default()) {
            let several = case.values.len() > 1;
            let mut parts = Vec::with_capacity(case.values.len());
            for value in &case.values {
                let code = self.expr(value)?;
                let code = match value.val() {
                    Expr::Binary(..) if several || subject.is_some() => format!("({})", code),
                    _ => code,
                };

                parts.push(match &subject {
                    Some((name, _, _)) => format!("{} == {}", name, code),
                    None => code,
                });
            }

            branches.push((parts.join(" || "), case));
        }

        let default = cases.iter().find(|case| case.is_default());
        let end = self.temp("end");

        if let Some((name, kind, code)) = &subject {
            emit!(self, "{{");
            self.depth += 1;
            emit!(self, "{} {} = {};", kind, name, code);
        }

        self.breaks.push(BreakTarget::Label {
            name: end.clone(),
            used: false,
        });

        for (index, (condition, case)) in branches.iter().enumerate() {
            if index == 0 {
                emit!(self, "if ({}) {{", condition);
            } else {
                emit!(self, "}} else if ({}) {{", condition);
            }

            self.body(&case.body);
        }

        match default {
            Some(case) if branches.is_empty() => {
                emit!(self, "{{");
                self.body(&case.body);
                emit!(self, "}}");
            }

            Some(case) => {
                emit!(self, "}} else {{");
                self.body(&case.body);
                emit!(self, "}}");
            }

            None if !branches.is_empty() => emit!(self, "}}"),
            None => (),
        }

        if let Some(BreakTarget::Label { used: true, .. }) = self.breaks.pop() {
            emit!(self, "{}: ;", end);
        }

        if subject.is_some() {
            self.depth -= 1;
            emit!(self, "}}");
        }

        Ok(())
    }
}

fn is_blank(expr: &Located<Expr>) -> bool {
    matches!(expr.val(), Expr::Ident(name) if name.is_blank())
}
