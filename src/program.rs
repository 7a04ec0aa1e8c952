// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};
use std::rc::Rc;

/// A stable identifier for an instruction of the interpreted program.
/// Instruction ids double as program points: the id of the first instruction
/// of a basic block labels the subsumption-table bucket for that block.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct InstrId(pub u64);

impl Display for InstrId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "%i{}", self.0)
    }
}

/// A stable identifier for an SSA value of the interpreted program.
/// Values produced by instructions conventionally reuse the instruction id.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ValueId(pub u64);

impl Display for ValueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "%v{}", self.0)
    }
}

/// The ordered list of call-site instruction ids that reached the current
/// activation, outermost first. Memory locations are keyed by the call
/// history active at their allocation.
pub type CallHistory = Vec<InstrId>;

/// The unary conversions the transfer function accepts. Integer-to-pointer
/// casts derive a memory location from the integer operand; pointer-to-integer
/// casts keep the flow but drop the location; all others are pure flow.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CastKind {
    Trunc,
    ZExt,
    SExt,
    IntToPtr,
    PtrToInt,
    BitCast,
    FPTrunc,
    FPExt,
    FPToUI,
    FPToSI,
    UIToFP,
    SIToFP,
}

/// Two-operand instructions. The dependency transfer treats all of these the
/// same way: the result value flows from both operands.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    ICmp,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
    FCmp,
    InsertValue,
}

/// Closely based on the instructions found in an LLVM-like SSA IR, reduced to
/// the closed set of opcode kinds the dependency transfer function dispatches
/// on. Anything the symbolic executor runs that is not in this set must be
/// lowered by the executor before it reaches the tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Opcode {
    /// A branch terminator. Only conditional branches affect the dependency
    /// state: the condition value's flow is marked as core.
    Branch {
        conditional: bool,
    },
    /// A stack allocation of the given size in bytes.
    Alloca {
        size: u64,
    },
    Load,
    Store,
    /// Pointer arithmetic: the result's locations offset the base pointer's
    /// locations by the delta operand.
    GetElementPtr,
    Cast(CastKind),
    Binary(BinaryOp),
    Select,
    /// A phi node carrying the candidate incoming values, ordered by
    /// predecessor block index.
    Phi {
        incoming: Vec<ValueId>,
    },
    /// A function call. `callee` is the symbol name when known (used to look
    /// up recognised external functions); `parameters` are the callee's
    /// parameter value ids, in order, used to rebind arguments on entry.
    /// An external call has no parameters.
    Call {
        callee: Option<Rc<str>>,
        parameters: Vec<ValueId>,
    },
    Return,
    ExtractValue,
}

/// One instruction of the interpreted program, as described by the symbolic
/// executor. The function name and line number feed the reason strings
/// recorded with core values and the labels of the rendered search tree;
/// they carry no semantics.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    pub id: InstrId,
    pub opcode: Opcode,
    /// Name of the enclosing function.
    pub function: Rc<str>,
    /// Source line of the instruction.
    pub line: u32,
    /// The SSA operands, in instruction order.
    pub operands: Vec<ValueId>,
    /// The value defined by this instruction, if any.
    pub result: Option<ValueId>,
}

impl Instruction {
    /// A short human-readable tag used in core reasons, e.g. "[main: Line 7]".
    pub fn location_tag(&self) -> String {
        format!("[{}: Line {}]", self.function, self.line)
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{} = {:?} {}", self.id, self.opcode, self.location_tag())
    }
}

/// The executor's program counter at the time a tree operation runs. The
/// instruction id is the program point used for subsumption-table indexing;
/// the rest is used for naming nodes in diagnostics and the rendered tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgramPoint {
    pub instruction: InstrId,
    pub basic_block: u64,
    pub function: Rc<str>,
    pub line: u32,
}

impl Display for ProgramPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "{}:{} in {} at line {}",
            self.basic_block, self.instruction.0, self.function, self.line
        )
    }
}

/// The slice of the executor's state the tree consumes: the program counter,
/// the call history of the current activation, and the path-condition
/// constraint set used as the solver context for subsumption queries.
#[derive(Clone, Debug)]
pub struct ExecutionState {
    pub pc: ProgramPoint,
    pub call_history: CallHistory,
    pub constraints: Vec<crate::expression::ExprRef>,
}

/// Data-layout facts of the analysis target needed for sizing: the width of
/// pointers, which is the width of every memory-location base and offset
/// expression.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub struct TargetData {
    pointer_width: u32,
}

impl TargetData {
    pub fn new(pointer_width: u32) -> TargetData {
        assert!(pointer_width % 8 == 0, "pointer width must be whole bytes");
        TargetData { pointer_width }
    }

    /// The width in bits of a pointer on the target.
    pub fn pointer_width(&self) -> u32 {
        self.pointer_width
    }

    /// The size in bytes of a pointer on the target.
    pub fn pointer_size(&self) -> u64 {
        u64::from(self.pointer_width / 8)
    }
}

impl Default for TargetData {
    fn default() -> TargetData {
        TargetData { pointer_width: 64 }
    }
}
