//! Árbol de sintaxis abstracta.
//!
//! Todos los nodos son variantes cerradas: agregar una producción a la
//! gramática obliga a tratarla en cada `match` exhaustivo del generador.
//! Cada nodo es dueño exclusivo de sus hijos y conserva su ubicación de
//! origen por medio de [`Located`].

use crate::{
    lex::{Identifier, IntLiteral, Op},
    source::{Located, Location},
};

#[derive(Debug, Clone)]
pub struct Ast {
    pub package: Located<Identifier>,
    pub imports: Vec<Import>,
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub alias: Option<Located<Identifier>>,
    pub path: Located<String>,
}

impl Import {
    /// Nombre bajo el cual el paquete es visible en el archivo.
    pub fn local_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias.as_ref().as_ref(),
            None => self.package_name(),
        }
    }

    /// Último segmento de la ruta de importación.
    pub fn package_name(&self) -> &str {
        let path = self.path.as_ref();
        path.rsplit('/').next().unwrap_or(path)
    }
}

#[derive(Debug, Clone)]
pub enum Decl {
    Func(FuncDecl),
    Var(Located<Vec<VarSpec>>),
    Const(Located<Vec<ConstSpec>>),
    Struct(StructDecl),
    Interface(InterfaceDecl),
    Type(TypeDecl),
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: Located<Identifier>,
    pub receiver: Option<Receiver>,
    pub params: Vec<Param>,
    pub results: Results,
    pub body: Block,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct Receiver {
    pub name: Option<Located<Identifier>>,
    pub typ: Located<Identifier>,
    pub pointer: bool,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Option<Located<Identifier>>,
    pub typ: Located<Type>,
}

/// Forma del retorno de una función.
#[derive(Debug, Clone)]
pub enum Results {
    Void,
    Single(Param),

    /// Dos o más valores, reescritos como un único tipo agregado.
    Multiple(Aggregate),
}

/// Agregado sintético que sustituye a los retornos múltiples.
///
/// Los campos conservan el orden de declaración. Se llaman como los
/// resultados nombrados, o `ret0`, `ret1`, ... si no tienen nombre.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub name: String,
    pub fields: Vec<Field>,
    pub named: bool,
}

impl Aggregate {
    /// Nombre del tipo agregado, único por función o método.
    pub fn name_for(function: &str, receiver: Option<&str>) -> String {
        match receiver {
            Some(receiver) => format!("{}_{}_result", receiver, function),
            None => format!("{}_result", function),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: Located<Identifier>,
    pub typ: Located<Type>,
}

#[derive(Debug, Clone)]
pub struct VarSpec {
    pub names: Vec<Located<Identifier>>,
    pub typ: Option<Located<Type>>,
    pub values: Vec<Located<Expr>>,
}

/// Una especificación de constante.
///
/// `iota` es el índice de la especificación dentro de su grupo.
#[derive(Debug, Clone)]
pub struct ConstSpec {
    pub names: Vec<Located<Identifier>>,
    pub typ: Option<Located<Type>>,
    pub values: Vec<Located<Expr>>,
    pub iota: u64,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: Located<Identifier>,
    pub fields: Vec<Field>,
}

/// Interfaz. Su conjunto de métodos se registra pero nunca se despacha.
#[derive(Debug, Clone)]
pub struct InterfaceDecl {
    pub name: Located<Identifier>,
    pub methods: Vec<Located<Identifier>>,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: Located<Identifier>,
    pub typ: Located<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Tipo predeclarado o definido en el mismo archivo.
    Named(Identifier),

    /// Tipo exportado por un paquete, como `ws2812.Strip`.
    Qualified {
        package: Identifier,
        name: Identifier,
    },

    Array {
        len: ArrayLen,
        elem: Box<Type>,
    },

    Slice(Box<Type>),
    Pointer(Box<Type>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayLen {
    Literal(u64),
    Const(Identifier),

    /// `[...]T`, la longitud sale del literal compuesto.
    Inferred,
}

pub type Block = Vec<Located<Stmt>>;

#[derive(Debug, Clone)]
pub enum Stmt {
    Var(Vec<VarSpec>),
    Const(Vec<ConstSpec>),

    /// `a, b := ...`
    Define {
        names: Vec<Located<Identifier>>,
        values: Vec<Located<Expr>>,
    },

    Assign {
        targets: Vec<Located<Expr>>,
        op: Option<BinOp>,
        values: Vec<Located<Expr>>,
    },

    IncDec {
        target: Located<Expr>,
        increment: bool,
    },

    Expr(Located<Expr>),
    Return(Vec<Located<Expr>>),
    If(If),

    /// Ciclo de tres cláusulas, de solo condición o infinito.
    ForClassic {
        init: Option<Box<Located<Stmt>>>,
        condition: Option<Located<Expr>>,
        post: Option<Box<Located<Stmt>>>,
        body: Block,
    },

    ForRange {
        key: Option<Located<Identifier>>,
        value: Option<Located<Identifier>>,
        define: bool,
        iterable: Located<Expr>,
        body: Block,
    },

    Switch(Switch),
    Break,
    Continue,
    Fallthrough,
    Block(Block),

    /// `go` o `defer`, preservado como texto original.
    Unsupported {
        kind: Unsupported,
        text: String,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Unsupported {
    Go,
    Defer,
}

impl Unsupported {
    pub fn keyword(self) -> &'static str {
        match self {
            Unsupported::Go => "go",
            Unsupported::Defer => "defer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct If {
    pub init: Option<Box<Located<Stmt>>>,
    pub condition: Located<Expr>,
    pub then: Block,
    pub otherwise: Option<Else>,
}

#[derive(Debug, Clone)]
pub enum Else {
    If(Box<Located<If>>),
    Block(Block),
}

#[derive(Debug, Clone)]
pub struct Switch {
    pub init: Option<Box<Located<Stmt>>>,
    pub tag: Option<Located<Expr>>,
    pub cases: Vec<Case>,
}

/// Una cláusula `case`. Sin valores, es la cláusula `default`.
#[derive(Debug, Clone)]
pub struct Case {
    pub values: Vec<Located<Expr>>,
    pub body: Block,
    pub location: Location,
}

impl Case {
    pub fn is_default(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(IntLiteral),
    Float(String),
    Str(String),
    Rune(char),
    Ident(Identifier),
    Binary(Box<Located<Expr>>, BinOp, Box<Located<Expr>>),
    Unary(UnOp, Box<Located<Expr>>),

    Call {
        callee: Box<Located<Expr>>,
        args: Vec<Located<Expr>>,
    },

    /// `pkg.Member` o `valor.Campo`; el generador decide cuál.
    Selector {
        operand: Box<Located<Expr>>,
        member: Located<Identifier>,
    },

    Index {
        operand: Box<Located<Expr>>,
        index: Box<Located<Expr>>,
    },

    /// Literal compuesto. El tipo se omite en literales anidados.
    Composite {
        typ: Option<Located<Type>>,
        elements: Vec<Element>,
    },

    /// Conversión a un tipo que no es un identificador, como `[]byte(s)`.
    Conversion {
        typ: Located<Type>,
        value: Box<Located<Expr>>,
    },

    Paren(Box<Located<Expr>>),

    /// Posición de un token léxico inválido, ya reportado.
    Invalid,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub key: Option<Located<Identifier>>,
    pub value: Located<Expr>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    AndNot,
    Add,
    Sub,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
}

impl BinOp {
    /// Operador binario correspondiente a un token.
    pub fn from_op(op: Op) -> Option<Self> {
        let binary = match op {
            Op::Mul => BinOp::Mul,
            Op::Div => BinOp::Div,
            Op::Rem => BinOp::Rem,
            Op::Shl => BinOp::Shl,
            Op::Shr => BinOp::Shr,
            Op::And => BinOp::And,
            Op::AndNot => BinOp::AndNot,
            Op::Add => BinOp::Add,
            Op::Sub => BinOp::Sub,
            Op::Or => BinOp::Or,
            Op::Xor => BinOp::Xor,
            Op::Eq => BinOp::Eq,
            Op::Ne => BinOp::Ne,
            Op::Lt => BinOp::Lt,
            Op::Le => BinOp::Le,
            Op::Gt => BinOp::Gt,
            Op::Ge => BinOp::Ge,
            Op::LogicalAnd => BinOp::LogicalAnd,
            Op::LogicalOr => BinOp::LogicalOr,
            _ => return None,
        };

        Some(binary)
    }

    /// Operador de una asignación compuesta, como `+=`.
    pub fn from_assign(op: Op) -> Option<Self> {
        let binary = match op {
            Op::AddAssign => BinOp::Add,
            Op::SubAssign => BinOp::Sub,
            Op::MulAssign => BinOp::Mul,
            Op::DivAssign => BinOp::Div,
            Op::RemAssign => BinOp::Rem,
            Op::AndAssign => BinOp::And,
            Op::OrAssign => BinOp::Or,
            Op::XorAssign => BinOp::Xor,
            Op::ShlAssign => BinOp::Shl,
            Op::ShrAssign => BinOp::Shr,
            Op::AndNotAssign => BinOp::AndNot,
            _ => return None,
        };

        Some(binary)
    }

    /// Precedencia según Go, de 1 (`||`) a 5 (multiplicativos).
    pub fn precedence(self) -> u8 {
        use BinOp::*;

        match self {
            Mul | Div | Rem | Shl | Shr | And | AndNot => 5,
            Add | Sub | Or | Xor => 4,
            Eq | Ne | Lt | Le | Gt | Ge => 3,
            LogicalAnd => 2,
            LogicalOr => 1,
        }
    }

    /// Símbolo C++. `&^` no tiene equivalente directo y se descompone
    /// en el generador.
    pub fn to_cpp(self) -> &'static str {
        use BinOp::*;

        match self {
            Mul => "*",
            Div => "/",
            Rem => "%",
            Shl => "<<",
            Shr => ">>",
            And => "&",
            AndNot => "& ~",
            Add => "+",
            Sub => "-",
            Or => "|",
            Xor => "^",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            LogicalAnd => "&&",
            LogicalOr => "||",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Deref,
    Addr,
}

impl UnOp {
    pub fn to_cpp(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Plus => "+",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
            UnOp::Deref => "*",
            UnOp::Addr => "&",
        }
    }
}
