//! LIR (Low-level Intermediate Representation). Structured control flow is
//! gone at this level: every function is a set of basic blocks ending in a
//! branch, jump or return, and every expression has been flattened into
//! instructions over virtual registers.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    frontend::{ast::BinaryOperatorKind, intern::InternedSymbol},
    index::{IndexVec, simple_index},
};

pub mod eval;
pub mod pretty_print;

#[derive(Debug)]
pub struct Module {
    pub name: InternedSymbol,
    pub globals: IndexVec<GlobalId, Global>,
    /// Functions provided by the C runtime which user code may call
    pub external_functions: Vec<FunctionSignature>,
    /// User defined functions in declaration order
    pub function_definitions: Vec<FunctionDefinition>,
    pub static_strings: BTreeMap<StaticLabelId, InternedSymbol>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: InternedSymbol::new(name),
            globals: IndexVec::new(),
            external_functions: Vec::new(),
            function_definitions: Vec::new(),
            static_strings: BTreeMap::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.function_definitions
            .iter()
            .find(|f| f.signature.name.value() == name)
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name.value() == name)
    }

    pub fn is_external(&self, name: InternedSymbol) -> bool {
        self.external_functions.iter().any(|f| f.name == name)
    }
}

simple_index! {
    /// Identifies a module level variable
    pub struct GlobalId;
}

/// Storage which lives for the whole process
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub id: GlobalId,
    pub name: InternedSymbol,
    pub ty: Type,
    pub initializer: Immediate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: InternedSymbol,
    pub parameters: Vec<Type>,
    /// `None` for functions returning nothing
    pub return_type: Option<Type>,
    pub is_variadic: bool,
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub signature: FunctionSignature,
    /// Allocated virtual registers used to store temporary data
    pub registers: BTreeMap<RegisterId, Register>,
    /// Registers receiving the incoming arguments, in parameter order
    pub arguments: Vec<RegisterId>,
    pub blocks: BTreeMap<BlockId, Block>,
}

impl FunctionDefinition {
    pub fn entry_block(&self) -> &Block {
        &self.blocks[&BlockId::ENTRY]
    }

    pub fn type_of_operand(&self, operand: Operand) -> Type {
        match operand {
            Operand::Register(register_id) => self.registers[&register_id].ty,
            Operand::Immediate(immediate) => immediate.ty(),
        }
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.values().flat_map(|b| b.instructions.iter())
    }

    /// Blocks whose last instruction is not a branch, jump or return
    pub fn unterminated_blocks(&self) -> Vec<BlockId> {
        self.blocks
            .values()
            .filter(|b| !b.is_terminated())
            .map(|b| b.id)
            .collect()
    }

    /// Blocks this block may transfer control to
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        match self.blocks[&block].terminator() {
            Some(Instruction::Branch {
                positive, negative, ..
            }) => vec![*positive, *negative],
            Some(Instruction::Jump { destination }) => vec![*destination],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub predecessors: BTreeSet<BlockId>,
}

impl Block {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            instructions: Vec::new(),
            predecessors: BTreeSet::new(),
        }
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }

    pub fn returns(&self) -> bool {
        matches!(self.terminator(), Some(Instruction::Return { .. }))
    }
}

simple_index! {
    /// Identifies an LIR block
    pub struct BlockId;
}

impl BlockId {
    pub const ENTRY: Self = Self(0);
}

simple_index! {
    /// Identifies a NUL terminated string in read-only static memory
    pub struct StaticLabelId;
}

/// A temporary virtual register of some type
#[derive(Debug, Clone, PartialEq, Hash)]
pub struct Register {
    pub id: RegisterId,
    pub ty: Type,
}

simple_index! {
    /// Identifies a virtual LIR register which holds a temporary value
    pub struct RegisterId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// 32-bit signed integer
    Int,
    /// 64-bit IEEE float
    Double,
    /// Result of a comparison
    Bool,
    /// Pointer to a static NUL terminated string
    Str,
    /// Address of a storage slot (stack or global)
    Pointer,
}

impl Type {
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Double)
    }

    pub fn size(self) -> usize {
        match self {
            Type::Int => 4,
            Type::Double | Type::Str | Type::Pointer => 8,
            Type::Bool => 1,
        }
    }

    /// The value every fresh storage slot of this type starts with
    pub fn zero(self) -> Immediate {
        match self {
            Type::Double => Immediate::Double(0.0),
            Type::Bool => Immediate::Bool(false),
            _ => Immediate::Int(0),
        }
    }
}

pub fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Reserves a slot in the current frame, `destination` receives its
    /// address
    AllocStack {
        destination: RegisterId,
        ty: Type,
    },
    Load {
        destination: RegisterId,
        source: Operand,
    },
    Store {
        destination: Operand,
        source: Operand,
    },
    IntToDouble {
        destination: RegisterId,
        operand: Operand,
    },
    IntegerOperation {
        operator: BinaryOperatorKind,
        destination: RegisterId,
        lhs: Operand,
        rhs: Operand,
    },
    FloatOperation {
        operator: BinaryOperatorKind,
        destination: RegisterId,
        lhs: Operand,
        rhs: Operand,
    },
    Branch {
        condition: Operand,
        positive: BlockId,
        negative: BlockId,
    },
    Jump {
        destination: BlockId,
    },
    Return {
        value: Option<Operand>,
    },
    FunctionCall {
        target: InternedSymbol,
        arguments: Vec<Operand>,
        destination: Option<RegisterId>,
    },
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Branch { .. } | Instruction::Jump { .. } | Instruction::Return { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    Int(i32),
    Double(f64),
    Bool(bool),
    StaticString(StaticLabelId),
    /// Address of a module level variable
    Global(GlobalId),
}

impl Immediate {
    pub fn ty(self) -> Type {
        match self {
            Immediate::Int(_) => Type::Int,
            Immediate::Double(_) => Type::Double,
            Immediate::Bool(_) => Type::Bool,
            Immediate::StaticString(_) => Type::Str,
            Immediate::Global(_) => Type::Pointer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Immediate(Immediate),
    Register(RegisterId),
}

impl From<Immediate> for Operand {
    fn from(value: Immediate) -> Self {
        Operand::Immediate(value)
    }
}

impl From<RegisterId> for Operand {
    fn from(value: RegisterId) -> Self {
        Operand::Register(value)
    }
}
