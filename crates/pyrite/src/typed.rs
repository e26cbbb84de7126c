use crate::{error::CodeLoc, objects::ObjectId, parse::Literal};

/// An expression after inference.
///
/// Every node carries a non-null `referent` into the object arena: the class
/// of a literal, the object a name resolves to, the attribute object of an
/// attribute access, the result type of a call. Operator expressions do not
/// survive inference; double dispatch lowers them to method-call nodes whose
/// callee carries any call-site rewriter.
#[derive(Debug, Clone)]
pub struct TypedExpr {
    pub loc: CodeLoc,
    pub referent: ObjectId,
    pub kind: TypedExprKind,
}

impl TypedExpr {
    pub fn new(loc: CodeLoc, referent: ObjectId, kind: TypedExprKind) -> Self {
        Self { loc, referent, kind }
    }
}

#[derive(Debug, Clone)]
pub enum TypedExprKind {
    Literal(Literal),
    Name(String),
    Attribute {
        value: Box<TypedExpr>,
        attr: String,
    },
    Call {
        func: Box<TypedExpr>,
        args: Vec<TypedExpr>,
        keywords: Vec<(String, TypedExpr)>,
    },
    /// Boolean negation of an already bool-typed operand.
    Not(Box<TypedExpr>),
    List(Vec<TypedExpr>),
    Tuple(Vec<TypedExpr>),
    Dict(Vec<(TypedExpr, TypedExpr)>),
    Subscript {
        value: Box<TypedExpr>,
        index: Box<TypedExpr>,
    },
    Starred(Box<TypedExpr>),
    Lambda {
        params: Vec<String>,
        body: Box<TypedExpr>,
    },
    FString(Vec<TypedFStringPart>),
    IfExp {
        test: Box<TypedExpr>,
        body: Box<TypedExpr>,
        orelse: Box<TypedExpr>,
    },
    ListComp {
        elt: Box<TypedExpr>,
        target: String,
        iter: Box<TypedExpr>,
    },
}

#[derive(Debug, Clone)]
pub enum TypedFStringPart {
    Literal(String),
    Interpolation(TypedExpr),
}

/// A loop binding with its inferred element type(s).
#[derive(Debug, Clone)]
pub enum ForBinding {
    Name { name: String, ty: ObjectId },
    Tuple(Vec<(String, ObjectId)>),
}

/// A statement after inference.
#[derive(Debug, Clone)]
pub enum TypedNode {
    Pass,
    Expr(TypedExpr),
    /// Re-assignment of an existing binding (no declaration emitted).
    Assign { target: TypedExpr, value: TypedExpr },
    /// First binding of a name, carrying its inferred annotation.
    Declare {
        target: TypedExpr,
        annotation: ObjectId,
        value: TypedExpr,
    },
    Return { value: Option<TypedExpr> },
    If {
        test: TypedExpr,
        body: Vec<TypedNode>,
        or_else: Vec<TypedNode>,
    },
    While { test: TypedExpr, body: Vec<TypedNode> },
    For {
        target: ForBinding,
        iter: TypedExpr,
        body: Vec<TypedNode>,
    },
    Break,
    Continue,
    Raise { exc: Option<String> },
    /// Kept for narrowing bookkeeping; never emitted.
    Assert { test: TypedExpr },
}
