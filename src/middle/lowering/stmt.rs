use std::str::FromStr;

use crate::{
    frontend::{
        SourcePosition,
        ast::{
            CompoundStatement, Expression, ExpressionKind, FuncDecl, Identifier, Statement,
            StatementKind, TypeName, VarDecl,
        },
    },
    middle::{
        lir,
        lowering::{
            FunctionBuilder, LowerErrorKind, LowerResult, LoweringContext,
            expr::Place,
        },
    },
};

impl LoweringContext {
    /// Lowers a statement found directly in the program root. Only variable
    /// and function declarations may appear here.
    pub(super) fn lower_top_level_statement(&mut self, statement: &Statement) -> LowerResult<()> {
        lowering_log!("top level statement at {}", statement.position);

        self.lower_top_level_statement_kind(statement)
            .map_err(|error| error.or_at(statement.position))
    }

    fn lower_top_level_statement_kind(&mut self, statement: &Statement) -> LowerResult<()> {
        match &statement.kind {
            StatementKind::VarDecl(declaration) => {
                if !declaration.is_top_level {
                    return Err(LowerErrorKind::codegen(format!(
                        "declaration of `{}` in the program root is not marked as top level",
                        declaration.name.symbol
                    ))
                    .at(statement.position));
                }

                self.lower_global(declaration, statement.position)
            }
            StatementKind::FuncDecl(function) => self.lower_function(function, statement.position),
            StatementKind::Stmts(statements) => {
                for statement in statements {
                    self.lower_top_level_statement(statement)?;
                }

                Ok(())
            }
            StatementKind::Expr(_)
            | StatementKind::Compound(_)
            | StatementKind::Return(_)
            | StatementKind::If { .. }
            | StatementKind::While { .. } => Err(LowerErrorKind::Scope {
                message: "statements are only allowed inside a function body".to_owned(),
            }
            .at(statement.position)),
        }
    }

    /// Lowers a statement inside a function body
    fn lower_statement(&mut self, statement: &Statement) -> LowerResult<()> {
        lowering_log!("statement at {}", statement.position);

        self.lower_statement_kind(statement)
            .map_err(|error| error.or_at(statement.position))
    }

    fn lower_statement_kind(&mut self, statement: &Statement) -> LowerResult<()> {
        match &statement.kind {
            StatementKind::VarDecl(declaration) => {
                if declaration.is_top_level {
                    return Err(LowerErrorKind::codegen(format!(
                        "declaration of `{}` inside a function is marked as top level",
                        declaration.name.symbol
                    ))
                    .at(statement.position));
                }

                self.lower_local(declaration, statement.position)
            }
            StatementKind::Stmts(statements) => self.lower_statements(statements),
            StatementKind::Expr(expression) => self.lower_expression_statement(expression),
            StatementKind::Compound(compound) => self.lower_compound(compound),
            StatementKind::Return(value) => self.lower_return(value.as_deref(), statement.position),
            StatementKind::FuncDecl(function) => Err(LowerErrorKind::NestedFunction {
                name: function.name.symbol.value().to_owned(),
            }
            .at(statement.position)),
            StatementKind::If {
                condition,
                positive,
                negative,
            } => self.lower_if(condition, positive, negative.as_deref()),
            StatementKind::While { condition, body } => self.lower_while(condition, body),
        }
    }

    /// A compound statement opens its own scope, except for the function body
    /// which shares the scope holding the parameters
    fn lower_compound(&mut self, compound: &CompoundStatement) -> LowerResult<()> {
        if compound.is_function_body {
            return self.lower_statements(&compound.statements);
        }

        self.with_scope(|ctx| ctx.lower_statements(&compound.statements))
    }

    fn lower_statements(&mut self, statements: &[Statement]) -> LowerResult<()> {
        for statement in statements {
            self.lower_statement(statement)?;
        }

        Ok(())
    }

    /* Control flow */

    /// Lowers a condition which must produce a comparison result
    fn lower_condition(&mut self, condition: &Expression) -> LowerResult<lir::Operand> {
        let value = self.lower_value(condition)?;

        if value.ty != lir::Type::Bool {
            return Err(LowerErrorKind::type_mismatch(format!(
                "condition must be a comparison, found a value of type `{}`",
                value.ty
            ))
            .at(condition.position));
        }

        Ok(value.operand)
    }

    /// Produces a diamond (with else) or triangle (without) of blocks which
    /// all converge on a single follow block
    fn lower_if(
        &mut self,
        condition: &Expression,
        positive: &Statement,
        negative: Option<&Statement>,
    ) -> LowerResult<()> {
        let condition = self.lower_condition(condition)?;

        let positive_block = self.create_block();
        let negative_block = negative.map(|_| self.create_block());
        let follow_block = self.create_block();

        self.push_instruction(lir::Instruction::Branch {
            condition,
            positive: positive_block,
            negative: negative_block.unwrap_or(follow_block),
        });

        // the block control falls out of may differ from the one we started
        // in when the branch itself contains control flow
        let positive_end = self.with_block(positive_block, |ctx| {
            ctx.lower_statement(positive)?;
            Ok(ctx.current_block())
        })?;
        self.jump_from(positive_end, follow_block);

        if let (Some(negative), Some(negative_block)) = (negative, negative_block) {
            let negative_end = self.with_block(negative_block, |ctx| {
                ctx.lower_statement(negative)?;
                Ok(ctx.current_block())
            })?;
            self.jump_from(negative_end, follow_block);
        }

        self.switch_block(follow_block);

        Ok(())
    }

    /// Pre-test loop:
    ///
    /// ```text
    /// .cond:
    ///     %c = icmp ...
    ///     br %c .body .follow
    /// .body:
    ///     ...
    ///     jmp .cond
    /// .follow:
    /// ```
    fn lower_while(&mut self, condition: &Expression, body: &Statement) -> LowerResult<()> {
        let condition_block = self.create_block();
        let body_block = self.create_block();
        let follow_block = self.create_block();

        self.push_instruction(lir::Instruction::Jump {
            destination: condition_block,
        });

        self.with_block(condition_block, |ctx| {
            let condition = ctx.lower_condition(condition)?;

            ctx.push_instruction(lir::Instruction::Branch {
                condition,
                positive: body_block,
                negative: follow_block,
            });

            Ok(())
        })?;

        let body_end = self.with_block(body_block, |ctx| {
            ctx.lower_statement(body)?;
            Ok(ctx.current_block())
        })?;
        self.jump_from(body_end, condition_block);

        self.switch_block(follow_block);

        Ok(())
    }

    fn lower_return(
        &mut self,
        value: Option<&Expression>,
        position: SourcePosition,
    ) -> LowerResult<()> {
        let signature = &self.builder().signature;
        let function_name = signature.name;
        let return_type = signature.return_type;

        let value = match (value, return_type) {
            (Some(value), Some(return_type)) => {
                let lowered = self.lower_value(value)?;
                let context = format!("the return value of `{function_name}`");

                Some(self.coerce(lowered, return_type, value.position, &context)?)
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(LowerErrorKind::type_mismatch(format!(
                    "void function `{function_name}` cannot return a value"
                ))
                .at(position));
            }
            (None, Some(_)) => {
                return Err(LowerErrorKind::type_mismatch(format!(
                    "function `{function_name}` must return a value"
                ))
                .at(position));
            }
        };

        self.push_instruction(lir::Instruction::Return { value });

        Ok(())
    }

    /* Declarations */

    fn lower_global(&mut self, declaration: &VarDecl, position: SourcePosition) -> LowerResult<()> {
        let ty = resolve_variable_type(&declaration.ty, position)?;
        let name = declaration.name.symbol;

        let initializer = match declaration.initializer.as_deref() {
            Some(initializer) => constant_initializer(initializer, ty, &declaration.name)?,
            None => ty.zero(),
        };

        let id = self.module.globals.next_index();

        self.scopes
            .declare_global(
                name,
                Place {
                    pointer: lir::Operand::Immediate(lir::Immediate::Global(id)),
                    ty,
                },
            )
            .map_err(|kind| kind.at(declaration.name.position.or(position)))?;

        lowering_log!("global {name}: {ty} = {initializer}");

        self.module.globals.push(lir::Global {
            id,
            name,
            ty,
            initializer,
        });

        Ok(())
    }

    fn lower_local(&mut self, declaration: &VarDecl, position: SourcePosition) -> LowerResult<()> {
        let ty = resolve_variable_type(&declaration.ty, position)?;

        // the initializer is lowered before the name is bound, so
        // `int x = x;` refers to an outer `x`
        let initial_value = match declaration.initializer.as_deref() {
            Some(initializer) => Some((self.lower_value(initializer)?, initializer.position)),
            None => None,
        };

        let place = self.allocate_local(ty);

        self.scopes
            .declare(declaration.name.symbol, place)
            .map_err(|kind| kind.at(declaration.name.position.or(position)))?;

        if let Some((value, value_position)) = initial_value {
            let context = format!("the initializer of `{}`", declaration.name.symbol);
            let source = self.coerce(value, ty, value_position, &context)?;

            self.push_instruction(lir::Instruction::Store {
                destination: place.pointer,
                source,
            });
        }

        Ok(())
    }

    fn allocate_local(&mut self, ty: lir::Type) -> Place {
        let destination = self.create_register(lir::Type::Pointer);

        self.push_instruction(lir::Instruction::AllocStack { destination, ty });

        Place {
            pointer: lir::Operand::Register(destination),
            ty,
        }
    }

    fn lower_function(&mut self, function: &FuncDecl, position: SourcePosition) -> LowerResult<()> {
        let name = function.name.symbol;
        let name_position = function.name.position.or(position);

        if self.functions.contains_key(&name) {
            return Err(LowerErrorKind::Redefinition {
                name: name.value().to_owned(),
            }
            .at(name_position));
        }

        let return_type = resolve_return_type(&function.return_type, position)?;
        let parameter_types = function
            .parameters
            .iter()
            .map(|parameter| resolve_variable_type(&parameter.ty, parameter.position.or(position)))
            .collect::<LowerResult<Vec<_>>>()?;

        let signature = lir::FunctionSignature {
            name,
            parameters: parameter_types.clone(),
            return_type,
            is_variadic: false,
        };

        // registered before the body so the function may call itself
        self.functions.insert(name, signature.clone());
        self.function = Some(FunctionBuilder::new(signature));

        lowering_log!("function {name} ({} parameter(s))", parameter_types.len());

        let entry_block = self.create_block();

        let result = self.with_block(entry_block, |ctx| {
            ctx.with_scope(|ctx| {
                for (parameter, ty) in function.parameters.iter().zip(&parameter_types) {
                    let argument = ctx.create_register(*ty);
                    ctx.builder_mut().arguments.push(argument);

                    let place = ctx.allocate_local(*ty);

                    ctx.push_instruction(lir::Instruction::Store {
                        destination: place.pointer,
                        source: lir::Operand::Register(argument),
                    });

                    ctx.scopes
                        .declare(parameter.name.symbol, place)
                        .map_err(|kind| kind.at(parameter.name.position.or(parameter.position)))?;
                }

                ctx.lower_compound(&function.body)?;
                ctx.finish_function_body();

                Ok(())
            })
        });

        let builder = self.function.take();
        result?;

        if let Some(builder) = builder {
            let definition = builder.into_output();

            debug_assert!(
                definition.unterminated_blocks().is_empty(),
                "every block of `{name}` must end in a terminator"
            );

            self.module.function_definitions.push(definition);
        }

        Ok(())
    }

    /// Falling off the end of a function returns nothing for void functions
    /// and zero otherwise
    fn finish_function_body(&mut self) {
        if self.is_terminated(self.current_block()) {
            return;
        }

        let value = self
            .builder()
            .signature
            .return_type
            .map(|ty| lir::Operand::Immediate(ty.zero()));

        self.push_instruction(lir::Instruction::Return { value });
    }
}

/// Storage types: `int` and `double`
fn resolve_variable_type(ty: &Identifier, position: SourcePosition) -> LowerResult<lir::Type> {
    match TypeName::from_str(ty.symbol.value()) {
        Ok(TypeName::Int) => Ok(lir::Type::Int),
        Ok(TypeName::Double) => Ok(lir::Type::Double),
        Ok(TypeName::Void) | Err(_) => Err(LowerErrorKind::UnknownType {
            name: ty.symbol.value().to_owned(),
        }
        .at(ty.position.or(position))),
    }
}

/// Return types additionally allow `void`
fn resolve_return_type(ty: &Identifier, position: SourcePosition) -> LowerResult<Option<lir::Type>> {
    match TypeName::from_str(ty.symbol.value()) {
        Ok(TypeName::Void) => Ok(None),
        _ => resolve_variable_type(ty, position).map(Some),
    }
}

/// Globals are initialized statically, so their initializer must be a
/// literal of a compatible type
fn constant_initializer(
    initializer: &Expression,
    ty: lir::Type,
    name: &Identifier,
) -> LowerResult<lir::Immediate> {
    let constant = match (&initializer.kind, ty) {
        (ExpressionKind::IntegerLiteral(value), lir::Type::Int) => lir::Immediate::Int(*value),
        (ExpressionKind::IntegerLiteral(value), lir::Type::Double) => {
            lir::Immediate::Double(f64::from(*value))
        }
        (ExpressionKind::DoubleLiteral(value), lir::Type::Double) => {
            lir::Immediate::Double(*value)
        }
        (ExpressionKind::DoubleLiteral(_), _) => {
            return Err(LowerErrorKind::type_mismatch(format!(
                "cannot initialize `{}` of type `{ty}` with a double",
                name.symbol
            ))
            .at(initializer.position));
        }
        _ => {
            return Err(LowerErrorKind::type_mismatch(format!(
                "the initializer of global `{}` must be a numeric literal",
                name.symbol
            ))
            .at(initializer.position));
        }
    };

    Ok(constant)
}
