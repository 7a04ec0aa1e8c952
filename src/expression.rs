// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result};
use std::rc::Rc;

/// A reference-counted node of the shared expression DAG. Two expressions are
/// semantically equal iff they are structurally equal, so subtrees may be
/// shared freely.
pub type ExprRef = Rc<Expression>;

/// A named symbolic bit-vector array with fixed domain (index) and range
/// (element) widths. Arrays come in two flavours: originals created by the
/// executor, and shadows created by the shadow registry when an interpolant
/// is generalised. Identity is by name and widths.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Array {
    pub name: Rc<str>,
    pub domain_width: u32,
    pub range_width: u32,
}

impl Array {
    pub fn new(name: &str, domain_width: u32, range_width: u32) -> Rc<Array> {
        Rc::new(Array {
            name: Rc::from(name),
            domain_width,
            range_width,
        })
    }
}

impl Display for Array {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(&self.name)
    }
}

/// The discriminant of an expression, used where behaviour is dispatched on
/// the kind alone (marker maps, rebuilding a binary node of the same kind).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ExpressionKind {
    Constant,
    Read,
    Concat,
    Select,
    Extract,
    ZeroExtend,
    SignExtend,
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Not,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
    Exists,
}

/// A symbolic bit-vector formula over a fixed, closed set of kinds. The enum
/// is deliberately sealed so that every consumer matches exhaustively; a new
/// kind is a crate-wide decision, not a local one.
///
/// Width-1 expressions are booleans. All comparison kinds produce width 1.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Expression {
    /// A constant bit-vector value of the given width. Width-1 constants are
    /// the booleans; see `is_true` and `is_false`.
    Constant { value: u64, width: u32 },

    /// A read of one element of a symbolic array.
    Read { array: Rc<Array>, index: ExprRef },

    /// Bit-vector concatenation; the left operand occupies the high bits.
    Concat { left: ExprRef, right: ExprRef },

    /// An if-then-else over a width-1 condition.
    Select {
        condition: ExprRef,
        true_expr: ExprRef,
        false_expr: ExprRef,
    },

    /// The `width` bits of the operand starting at bit `offset`.
    Extract {
        operand: ExprRef,
        offset: u32,
        width: u32,
    },

    /// The operand zero-extended to the given width.
    ZeroExtend { operand: ExprRef, width: u32 },

    /// The operand sign-extended to the given width.
    SignExtend { operand: ExprRef, width: u32 },

    Add { left: ExprRef, right: ExprRef },
    Sub { left: ExprRef, right: ExprRef },
    Mul { left: ExprRef, right: ExprRef },
    UDiv { left: ExprRef, right: ExprRef },
    SDiv { left: ExprRef, right: ExprRef },
    URem { left: ExprRef, right: ExprRef },
    SRem { left: ExprRef, right: ExprRef },

    /// Bitwise complement; on width 1 this is logical negation.
    Not { operand: ExprRef },

    /// Bitwise and; on width 1 this is conjunction.
    And { left: ExprRef, right: ExprRef },
    /// Bitwise or; on width 1 this is disjunction.
    Or { left: ExprRef, right: ExprRef },
    Xor { left: ExprRef, right: ExprRef },
    Shl { left: ExprRef, right: ExprRef },
    LShr { left: ExprRef, right: ExprRef },
    AShr { left: ExprRef, right: ExprRef },

    Eq { left: ExprRef, right: ExprRef },
    Ne { left: ExprRef, right: ExprRef },
    Ult { left: ExprRef, right: ExprRef },
    Ule { left: ExprRef, right: ExprRef },
    Ugt { left: ExprRef, right: ExprRef },
    Uge { left: ExprRef, right: ExprRef },
    Slt { left: ExprRef, right: ExprRef },
    Sle { left: ExprRef, right: ExprRef },
    Sgt { left: ExprRef, right: ExprRef },
    Sge { left: ExprRef, right: ExprRef },

    /// An existential quantification over shadow arrays. Only produced when a
    /// subsumption-table entry is generalised; the body is always width 1.
    Exists {
        variables: Vec<Rc<Array>>,
        body: ExprRef,
    },
}

/// Constructors. All constructors are pure: they allocate a new node without
/// simplification, mirroring the executor's expression builder. Folding of
/// constant subterms happens in the subsumption simplifier, not here.
impl Expression {
    pub fn constant(value: u64, width: u32) -> ExprRef {
        assert!(width > 0 && width <= 64);
        let value = if width == 64 {
            value
        } else {
            value & ((1u64 << width) - 1)
        };
        Rc::new(Expression::Constant { value, width })
    }

    pub fn bool_true() -> ExprRef {
        Self::constant(1, 1)
    }

    pub fn bool_false() -> ExprRef {
        Self::constant(0, 1)
    }

    pub fn from_bool(value: bool) -> ExprRef {
        if value {
            Self::bool_true()
        } else {
            Self::bool_false()
        }
    }

    pub fn read(array: Rc<Array>, index: ExprRef) -> ExprRef {
        assert_eq!(index.width(), array.domain_width);
        Rc::new(Expression::Read { array, index })
    }

    pub fn concat(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Concat { left, right })
    }

    pub fn select(condition: ExprRef, true_expr: ExprRef, false_expr: ExprRef) -> ExprRef {
        assert_eq!(condition.width(), 1);
        assert_eq!(true_expr.width(), false_expr.width());
        Rc::new(Expression::Select {
            condition,
            true_expr,
            false_expr,
        })
    }

    pub fn extract(operand: ExprRef, offset: u32, width: u32) -> ExprRef {
        assert!(offset + width <= operand.width());
        Rc::new(Expression::Extract {
            operand,
            offset,
            width,
        })
    }

    pub fn zext(operand: ExprRef, width: u32) -> ExprRef {
        assert!(width >= operand.width());
        Rc::new(Expression::ZeroExtend { operand, width })
    }

    pub fn sext(operand: ExprRef, width: u32) -> ExprRef {
        assert!(width >= operand.width());
        Rc::new(Expression::SignExtend { operand, width })
    }

    pub fn add(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Add { left, right })
    }

    pub fn sub(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Sub { left, right })
    }

    pub fn mul(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Mul { left, right })
    }

    pub fn udiv(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::UDiv { left, right })
    }

    pub fn sdiv(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::SDiv { left, right })
    }

    pub fn urem(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::URem { left, right })
    }

    pub fn srem(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::SRem { left, right })
    }

    pub fn not(operand: ExprRef) -> ExprRef {
        Rc::new(Expression::Not { operand })
    }

    pub fn and(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::And { left, right })
    }

    pub fn or(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Or { left, right })
    }

    pub fn xor(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Xor { left, right })
    }

    pub fn shl(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Shl { left, right })
    }

    pub fn lshr(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::LShr { left, right })
    }

    pub fn ashr(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::AShr { left, right })
    }

    pub fn eq(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Eq { left, right })
    }

    pub fn ne(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Ne { left, right })
    }

    pub fn ult(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Ult { left, right })
    }

    pub fn ule(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Ule { left, right })
    }

    pub fn ugt(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Ugt { left, right })
    }

    pub fn uge(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Uge { left, right })
    }

    pub fn slt(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Slt { left, right })
    }

    pub fn sle(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Sle { left, right })
    }

    pub fn sgt(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Sgt { left, right })
    }

    pub fn sge(left: ExprRef, right: ExprRef) -> ExprRef {
        Rc::new(Expression::Sge { left, right })
    }

    pub fn exists(variables: Vec<Rc<Array>>, body: ExprRef) -> ExprRef {
        assert_eq!(body.width(), 1);
        assert!(!variables.is_empty());
        Rc::new(Expression::Exists { variables, body })
    }

    /// Builds a two-kid node of the given kind over the given operands,
    /// preserving the kind of an expression being rewritten. Only valid for
    /// kinds with exactly two expression kids.
    pub fn binary_of_kind(kind: ExpressionKind, left: ExprRef, right: ExprRef) -> ExprRef {
        use ExpressionKind::*;
        match kind {
            Concat => Self::concat(left, right),
            Add => Self::add(left, right),
            Sub => Self::sub(left, right),
            Mul => Self::mul(left, right),
            UDiv => Self::udiv(left, right),
            SDiv => Self::sdiv(left, right),
            URem => Self::urem(left, right),
            SRem => Self::srem(left, right),
            And => Self::and(left, right),
            Or => Self::or(left, right),
            Xor => Self::xor(left, right),
            Shl => Self::shl(left, right),
            LShr => Self::lshr(left, right),
            AShr => Self::ashr(left, right),
            Eq => Self::eq(left, right),
            Ne => Self::ne(left, right),
            Ult => Self::ult(left, right),
            Ule => Self::ule(left, right),
            Ugt => Self::ugt(left, right),
            Uge => Self::uge(left, right),
            Slt => Self::slt(left, right),
            Sle => Self::sle(left, right),
            Sgt => Self::sgt(left, right),
            Sge => Self::sge(left, right),
            _ => unreachable!("binary_of_kind on non-binary kind {:?}", kind),
        }
    }
}

/// Read-only traversal and pure-functional rewriting.
impl Expression {
    pub fn kind(&self) -> ExpressionKind {
        use Expression::*;
        match self {
            Constant { .. } => ExpressionKind::Constant,
            Read { .. } => ExpressionKind::Read,
            Concat { .. } => ExpressionKind::Concat,
            Select { .. } => ExpressionKind::Select,
            Extract { .. } => ExpressionKind::Extract,
            ZeroExtend { .. } => ExpressionKind::ZeroExtend,
            SignExtend { .. } => ExpressionKind::SignExtend,
            Add { .. } => ExpressionKind::Add,
            Sub { .. } => ExpressionKind::Sub,
            Mul { .. } => ExpressionKind::Mul,
            UDiv { .. } => ExpressionKind::UDiv,
            SDiv { .. } => ExpressionKind::SDiv,
            URem { .. } => ExpressionKind::URem,
            SRem { .. } => ExpressionKind::SRem,
            Not { .. } => ExpressionKind::Not,
            And { .. } => ExpressionKind::And,
            Or { .. } => ExpressionKind::Or,
            Xor { .. } => ExpressionKind::Xor,
            Shl { .. } => ExpressionKind::Shl,
            LShr { .. } => ExpressionKind::LShr,
            AShr { .. } => ExpressionKind::AShr,
            Eq { .. } => ExpressionKind::Eq,
            Ne { .. } => ExpressionKind::Ne,
            Ult { .. } => ExpressionKind::Ult,
            Ule { .. } => ExpressionKind::Ule,
            Ugt { .. } => ExpressionKind::Ugt,
            Uge { .. } => ExpressionKind::Uge,
            Slt { .. } => ExpressionKind::Slt,
            Sle { .. } => ExpressionKind::Sle,
            Sgt { .. } => ExpressionKind::Sgt,
            Sge { .. } => ExpressionKind::Sge,
            Exists { .. } => ExpressionKind::Exists,
        }
    }

    /// The width in bits of the value this expression denotes.
    pub fn width(&self) -> u32 {
        use Expression::*;
        match self {
            Constant { width, .. } => *width,
            Read { array, .. } => array.range_width,
            Concat { left, right } => left.width() + right.width(),
            Select { true_expr, .. } => true_expr.width(),
            Extract { width, .. } => *width,
            ZeroExtend { width, .. } | SignExtend { width, .. } => *width,
            Add { left, .. }
            | Sub { left, .. }
            | Mul { left, .. }
            | UDiv { left, .. }
            | SDiv { left, .. }
            | URem { left, .. }
            | SRem { left, .. }
            | And { left, .. }
            | Or { left, .. }
            | Xor { left, .. }
            | Shl { left, .. }
            | LShr { left, .. }
            | AShr { left, .. } => left.width(),
            Not { operand } => operand.width(),
            Eq { .. }
            | Ne { .. }
            | Ult { .. }
            | Ule { .. }
            | Ugt { .. }
            | Uge { .. }
            | Slt { .. }
            | Sle { .. }
            | Sgt { .. }
            | Sge { .. } => 1,
            Exists { body, .. } => body.width(),
        }
    }

    /// The direct expression children, in operand order.
    pub fn kids(&self) -> Vec<ExprRef> {
        use Expression::*;
        match self {
            Constant { .. } => vec![],
            Read { index, .. } => vec![index.clone()],
            Concat { left, right }
            | Add { left, right }
            | Sub { left, right }
            | Mul { left, right }
            | UDiv { left, right }
            | SDiv { left, right }
            | URem { left, right }
            | SRem { left, right }
            | And { left, right }
            | Or { left, right }
            | Xor { left, right }
            | Shl { left, right }
            | LShr { left, right }
            | AShr { left, right }
            | Eq { left, right }
            | Ne { left, right }
            | Ult { left, right }
            | Ule { left, right }
            | Ugt { left, right }
            | Uge { left, right }
            | Slt { left, right }
            | Sle { left, right }
            | Sgt { left, right }
            | Sge { left, right } => vec![left.clone(), right.clone()],
            Select {
                condition,
                true_expr,
                false_expr,
            } => vec![condition.clone(), true_expr.clone(), false_expr.clone()],
            Extract { operand, .. }
            | ZeroExtend { operand, .. }
            | SignExtend { operand, .. }
            | Not { operand } => vec![operand.clone()],
            Exists { body, .. } => vec![body.clone()],
        }
    }

    /// Produces a new expression of the same kind and width with the children
    /// replaced. `kids` must have the arity of `self.kids()`.
    pub fn rebuild(&self, kids: &[ExprRef]) -> ExprRef {
        use Expression::*;
        match self {
            Constant { value, width } => Self::constant(*value, *width),
            Read { array, .. } => Self::read(array.clone(), kids[0].clone()),
            Select { .. } => Self::select(kids[0].clone(), kids[1].clone(), kids[2].clone()),
            Extract { offset, width, .. } => Self::extract(kids[0].clone(), *offset, *width),
            ZeroExtend { width, .. } => Self::zext(kids[0].clone(), *width),
            SignExtend { width, .. } => Self::sext(kids[0].clone(), *width),
            Not { .. } => Self::not(kids[0].clone()),
            Exists { variables, .. } => Self::exists(variables.clone(), kids[0].clone()),
            _ => Self::binary_of_kind(self.kind(), kids[0].clone(), kids[1].clone()),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant { .. })
    }

    /// True iff this is the width-1 constant 1.
    pub fn is_true(&self) -> bool {
        matches!(self, Expression::Constant { value: 1, width: 1 })
    }

    /// True iff this is the width-1 constant 0.
    pub fn is_false(&self) -> bool {
        matches!(self, Expression::Constant { value: 0, width: 1 })
    }

    /// The boolean value of a width-1 constant, if this is one.
    pub fn as_bool_if_known(&self) -> Option<bool> {
        match self {
            Expression::Constant { value, width: 1 } => Some(*value != 0),
            _ => None,
        }
    }

    /// The constant value, if this is a constant of any width.
    pub fn as_constant(&self) -> Option<u64> {
        match self {
            Expression::Constant { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Collects every array read anywhere in this expression.
    pub fn extract_arrays(&self, into: &mut BTreeSet<Rc<Array>>) {
        if let Expression::Read { array, .. } = self {
            into.insert(array.clone());
        }
        for kid in self.kids() {
            kid.extract_arrays(into);
        }
    }

    /// True iff `sub` occurs as a (structural) subexpression of `self`.
    pub fn contains(&self, sub: &ExprRef) -> bool {
        if *self == **sub {
            return true;
        }
        self.kids().iter().any(|kid| kid.contains(sub))
    }

    /// True iff this expression reads any of the given arrays.
    pub fn references_any_array(&self, arrays: &BTreeSet<Rc<Array>>) -> bool {
        if let Expression::Read { array, .. } = self {
            if arrays.contains(array) {
                return true;
            }
        }
        self.kids().iter().any(|kid| kid.references_any_array(arrays))
    }
}

/// Substitutes every structural occurrence of `old` in `expr` with `new`,
/// rebuilding the spine and sharing untouched subtrees.
pub fn substitute(expr: &ExprRef, old: &ExprRef, new: &ExprRef) -> ExprRef {
    if expr == old {
        return new.clone();
    }
    let kids = expr.kids();
    if kids.is_empty() {
        return expr.clone();
    }
    let new_kids: Vec<ExprRef> = kids.iter().map(|kid| substitute(kid, old, new)).collect();
    if new_kids == kids {
        expr.clone()
    } else {
        expr.rebuild(&new_kids)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        use Expression::*;
        match self {
            Constant { value, width } => {
                if *width == 1 {
                    f.write_str(if *value != 0 { "true" } else { "false" })
                } else {
                    write!(f, "{}", value)
                }
            }
            Read { array, index } => write!(f, "{}[{}]", array, index),
            Concat { left, right } => write!(f, "concat({},{})", left, right),
            Select {
                condition,
                true_expr,
                false_expr,
            } => write!(f, "ite({},{},{})", condition, true_expr, false_expr),
            Extract {
                operand,
                offset,
                width,
            } => write!(f, "{}[{},{}]", operand, offset + width - 1, offset),
            ZeroExtend { operand, .. } => write!(f, "zext({})", operand),
            SignExtend { operand, .. } => write!(f, "sext({})", operand),
            Add { left, right } => write!(f, "({} + {})", left, right),
            Sub { left, right } => write!(f, "({} - {})", left, right),
            Mul { left, right } => write!(f, "({} * {})", left, right),
            UDiv { left, right } | SDiv { left, right } => write!(f, "({} / {})", left, right),
            URem { left, right } | SRem { left, right } => write!(f, "({} % {})", left, right),
            Not { operand } => write!(f, "!({})", operand),
            And { left, right } => write!(f, "({} & {})", left, right),
            Or { left, right } => write!(f, "({} | {})", left, right),
            Xor { left, right } => write!(f, "({} xor {})", left, right),
            Shl { left, right } => write!(f, "({} << {})", left, right),
            LShr { left, right } | AShr { left, right } => write!(f, "({} >> {})", left, right),
            Eq { left, right } => {
                if left.is_false() {
                    write!(f, "!{}", right)
                } else {
                    write!(f, "({} = {})", left, right)
                }
            }
            Ne { left, right } => write!(f, "({} != {})", left, right),
            Ult { left, right } | Slt { left, right } => write!(f, "({} < {})", left, right),
            Ule { left, right } | Sle { left, right } => write!(f, "({} <= {})", left, right),
            Ugt { left, right } | Sgt { left, right } => write!(f, "({} > {})", left, right),
            Uge { left, right } | Sge { left, right } => write!(f, "({} >= {})", left, right),
            Exists { variables, body } => {
                f.write_str("(exists (")?;
                for (i, array) in variables.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", array)?;
                }
                write!(f, ") {})", body)
            }
        }
    }
}
