//! Lowers a program tree into LIR in a single pass.
//!
//! The pass keeps exactly two pieces of mutable state besides the module
//! being built: the [`ScopeStack`] used for name resolution and, while inside
//! a function, a stack of open basic blocks whose top is the insertion point
//! for new instructions. Both are only ever pushed and popped through
//! [`LoweringContext::with_scope`] and [`LoweringContext::with_block`], so
//! every push is matched by a pop even when lowering bails out with an error.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::{
    frontend::{ast, intern::InternedSymbol},
    index::{Index, IndexVec},
    middle::{
        lir::{self, BlockId, RegisterId},
        scope::ScopeStack,
    },
};

pub mod error;
mod expr;
mod stmt;

pub use self::{
    error::{LowerError, LowerErrorKind, LowerResult},
    expr::{Lowered, Place, Value},
};

/// Lowers every top level declaration of `program` into a fresh module
pub fn lower_program(program: &ast::Program, module_name: &str) -> LowerResult<lir::Module> {
    let mut ctx = LoweringContext::new(module_name);

    for statement in &program.statements {
        ctx.lower_top_level_statement(statement)?;
    }

    Ok(ctx.into_output())
}

pub struct LoweringContext {
    module: lir::Module,
    scopes: ScopeStack<Place>,
    /// Signatures of every callable function, external ones included
    functions: HashMap<InternedSymbol, lir::FunctionSignature>,
    /// The function currently being lowered, if any
    function: Option<FunctionBuilder>,
}

/// Per function lowering state
struct FunctionBuilder {
    signature: lir::FunctionSignature,
    register_map: IndexVec<RegisterId, lir::Register>,
    arguments: Vec<RegisterId>,
    block_map: IndexVec<BlockId, lir::Block>,
    block_stack: Vec<BlockId>,
}

impl FunctionBuilder {
    fn new(signature: lir::FunctionSignature) -> Self {
        Self {
            signature,
            register_map: IndexVec::new(),
            arguments: Vec::new(),
            block_map: IndexVec::new(),
            block_stack: Vec::new(),
        }
    }

    fn into_output(self) -> lir::FunctionDefinition {
        lir::FunctionDefinition {
            signature: self.signature,
            registers: self.register_map.into_entries().collect(),
            arguments: self.arguments,
            blocks: self.block_map.into_entries().collect::<BTreeMap<_, _>>(),
        }
    }
}

impl LoweringContext {
    pub fn new(module_name: &str) -> Self {
        let mut ctx = Self {
            module: lir::Module::new(module_name),
            scopes: ScopeStack::new(),
            functions: HashMap::new(),
            function: None,
        };

        ctx.declare_runtime_functions();

        ctx
    }

    pub fn into_output(self) -> lir::Module {
        self.module
    }

    /// `printf` and `scanf` back the language's built-in I/O and are declared
    /// in every module
    fn declare_runtime_functions(&mut self) {
        for name in ["printf", "scanf"] {
            let signature = lir::FunctionSignature {
                name: InternedSymbol::new(name),
                parameters: vec![lir::Type::Str],
                return_type: Some(lir::Type::Int),
                is_variadic: true,
            };

            self.functions.insert(signature.name, signature.clone());
            self.module.external_functions.push(signature);
        }
    }

    fn builder(&self) -> &FunctionBuilder {
        self.function
            .as_ref()
            .expect("Instructions may only be emitted inside a function body")
    }

    fn builder_mut(&mut self) -> &mut FunctionBuilder {
        self.function
            .as_mut()
            .expect("Instructions may only be emitted inside a function body")
    }

    fn in_function(&self) -> bool {
        self.function.is_some()
    }

    /* Scopes */

    /// Runs `f` inside a fresh lexical scope which is closed again afterwards,
    /// whether or not `f` succeeded
    fn with_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> LowerResult<T>) -> LowerResult<T> {
        self.scopes.push_scope();
        let result = f(self);
        self.scopes.pop_scope();

        result
    }

    /* Registers */

    fn create_register(&mut self, ty: lir::Type) -> RegisterId {
        let builder = self.builder_mut();
        let id = builder.register_map.next_index();

        builder.register_map.push(lir::Register { id, ty })
    }

    /* Blocks */

    fn create_block(&mut self) -> BlockId {
        let builder = self.builder_mut();
        let id = builder.block_map.next_index();

        lowering_log!("created block {id}");

        builder.block_map.push(lir::Block::new(id))
    }

    /// The block new instructions are appended to
    fn current_block(&self) -> BlockId {
        *self
            .builder()
            .block_stack
            .last()
            .expect("No block is open for instruction insertion")
    }

    /// Makes `block` the insertion point until the matching
    /// [`Self::close_block`]
    fn open_block(&mut self, block: BlockId) {
        self.builder_mut().block_stack.push(block);
    }

    /// Resumes insertion in the block below the current one
    fn close_block(&mut self) {
        let popped = self.builder_mut().block_stack.pop();

        assert!(popped.is_some(), "Attempted to close a block that was never opened");
    }

    /// Replaces the current insertion point, used once control flow from the
    /// current block has been wired up and lowering continues in a follow
    /// block
    fn switch_block(&mut self, block: BlockId) {
        self.close_block();
        self.open_block(block);
    }

    /// Runs `f` with `block` as the insertion point and closes it afterwards,
    /// whether or not `f` succeeded
    fn with_block<T>(
        &mut self,
        block: BlockId,
        f: impl FnOnce(&mut Self) -> LowerResult<T>,
    ) -> LowerResult<T> {
        self.open_block(block);
        let result = f(self);
        self.close_block();

        result
    }

    fn is_terminated(&self, block: BlockId) -> bool {
        self.builder().block_map[block].is_terminated()
    }

    /// Appends an instruction to the current block. Code following a return
    /// can never run, it is placed in a fresh block without predecessors so
    /// the terminated block stays well formed.
    fn push_instruction(&mut self, instruction: lir::Instruction) {
        if self.is_terminated(self.current_block()) {
            let unreachable = self.create_block();
            self.switch_block(unreachable);
        }

        let current = self.current_block();
        self.push_instruction_into(current, instruction);
    }

    /// Appends an instruction to a specific block, recording control flow
    /// edges for terminators
    fn push_instruction_into(&mut self, block: BlockId, instruction: lir::Instruction) {
        let builder = self.builder_mut();

        let successors = match &instruction {
            lir::Instruction::Branch {
                positive, negative, ..
            } => vec![*positive, *negative],
            lir::Instruction::Jump { destination } => vec![*destination],
            _ => Vec::new(),
        };

        for successor in successors {
            builder.block_map[successor].predecessors.insert(block);
        }

        builder.block_map[block].instructions.push(instruction);
    }

    /// Ends `block` with a jump to `destination` unless it already ends in a
    /// terminator (typically a return)
    fn jump_from(&mut self, block: BlockId, destination: BlockId) {
        if !self.is_terminated(block) {
            self.push_instruction_into(block, lir::Instruction::Jump { destination });
        }
    }

    fn create_static_string(&mut self, symbol: InternedSymbol) -> lir::StaticLabelId {
        if let Some((id, _)) = self
            .module
            .static_strings
            .iter()
            .find(|(_, existing)| **existing == symbol)
        {
            return *id;
        }

        let id = lir::StaticLabelId::new(self.module.static_strings.len());
        self.module.static_strings.insert(id, symbol);

        id
    }
}
