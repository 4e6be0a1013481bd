use crate::{
    frontend::{
        SourcePosition,
        ast::{BinaryOperatorClass, BinaryOperatorKind, Expression, ExpressionKind, Identifier},
    },
    middle::{
        lir,
        lowering::{LowerErrorKind, LowerResult, LoweringContext},
    },
};

/// What lowering an expression produces: either a plain value, or a place
/// (an addressable storage location) which has to be loaded before its
/// contents can be used
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lowered {
    Value(Value),
    Place(Place),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Value {
    pub operand: lir::Operand,
    pub ty: lir::Type,
}

/// Storage for a variable: its address plus the type stored there
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Place {
    pub pointer: lir::Operand,
    pub ty: lir::Type,
}

impl Place {
    pub fn is_global(&self) -> bool {
        matches!(
            self.pointer,
            lir::Operand::Immediate(lir::Immediate::Global(_))
        )
    }
}

impl Value {
    fn immediate(immediate: lir::Immediate) -> Self {
        Self {
            operand: lir::Operand::Immediate(immediate),
            ty: immediate.ty(),
        }
    }
}

impl LoweringContext {
    pub(super) fn lower_expression(&mut self, expression: &Expression) -> LowerResult<Lowered> {
        match &expression.kind {
            ExpressionKind::IntegerLiteral(value) => Ok(Lowered::Value(Value::immediate(
                lir::Immediate::Int(*value),
            ))),
            ExpressionKind::DoubleLiteral(value) => Ok(Lowered::Value(Value::immediate(
                lir::Immediate::Double(*value),
            ))),
            ExpressionKind::StringLiteral(symbol) => {
                let id = self.create_static_string(*symbol);

                Ok(Lowered::Value(Value::immediate(
                    lir::Immediate::StaticString(id),
                )))
            }
            ExpressionKind::Identifier(identifier) => {
                self.lower_identifier(identifier, expression.position)
            }
            ExpressionKind::Binary { operator, lhs, rhs } => {
                self.lower_binary(*operator, lhs, rhs, expression.position)
            }
            ExpressionKind::Call { callee, arguments } => {
                match self.lower_call(callee, arguments, expression.position)? {
                    Some(value) => Ok(Lowered::Value(value)),
                    None => Err(LowerErrorKind::type_mismatch(format!(
                        "function `{}` returns void and cannot be used as a value",
                        callee.symbol
                    ))
                    .at(expression.position)),
                }
            }
        }
    }

    /// Lowers an expression used only for its side effects. Calls to void
    /// functions are allowed here.
    pub(super) fn lower_expression_statement(&mut self, expression: &Expression) -> LowerResult<()> {
        match &expression.kind {
            ExpressionKind::Call { callee, arguments } => {
                self.lower_call(callee, arguments, expression.position)?;
            }
            _ => {
                self.lower_expression(expression)?;
            }
        }

        Ok(())
    }

    /// Lowers an expression in a context that needs its current value,
    /// loading from storage if it produced a place
    pub(super) fn lower_value(&mut self, expression: &Expression) -> LowerResult<Value> {
        let lowered = self.lower_expression(expression)?;

        Ok(self.materialize(lowered))
    }

    pub(super) fn materialize(&mut self, lowered: Lowered) -> Value {
        match lowered {
            Lowered::Value(value) => value,
            Lowered::Place(place) => self.load(place),
        }
    }

    fn load(&mut self, place: Place) -> Value {
        let destination = self.create_register(place.ty);

        self.push_instruction(lir::Instruction::Load {
            destination,
            source: place.pointer,
        });

        Value {
            operand: lir::Operand::Register(destination),
            ty: place.ty,
        }
    }

    /// Converts `value` to `target`, promoting integers to doubles where
    /// needed. Every other mismatch is an error.
    pub(super) fn coerce(
        &mut self,
        value: Value,
        target: lir::Type,
        position: SourcePosition,
        context: &str,
    ) -> LowerResult<lir::Operand> {
        match (value.ty, target) {
            (from, to) if from == to => Ok(value.operand),
            (lir::Type::Int, lir::Type::Double) => Ok(self.promote(value).operand),
            (from, to) => Err(LowerErrorKind::type_mismatch(format!(
                "cannot use a value of type `{from}` as `{to}` in {context}"
            ))
            .at(position)),
        }
    }

    /// Integer to floating point conversion. Constants are converted in place.
    fn promote(&mut self, value: Value) -> Value {
        if let lir::Operand::Immediate(lir::Immediate::Int(constant)) = value.operand {
            return Value::immediate(lir::Immediate::Double(f64::from(constant)));
        }

        let destination = self.create_register(lir::Type::Double);

        self.push_instruction(lir::Instruction::IntToDouble {
            destination,
            operand: value.operand,
        });

        Value {
            operand: lir::Operand::Register(destination),
            ty: lir::Type::Double,
        }
    }

    fn lower_identifier(
        &mut self,
        identifier: &Identifier,
        position: SourcePosition,
    ) -> LowerResult<Lowered> {
        let position = identifier.position.or(position);

        if identifier.is_type_name {
            return Err(LowerErrorKind::codegen(format!(
                "type name `{}` cannot be used as a value",
                identifier.symbol
            ))
            .at(position));
        }

        if !identifier.is_reference {
            return Err(LowerErrorKind::codegen(format!(
                "`{}` names a declaration, not a use of a variable",
                identifier.symbol
            ))
            .at(position));
        }

        let place = *self
            .scopes
            .resolve(identifier.symbol)
            .map_err(|kind| kind.at(position))?;

        // local scopes only exist while a function body is open, outside of
        // one the only `Scope` errors come from misplaced top level statements
        debug_assert!(
            place.is_global() || self.in_function(),
            "local `{}` resolved outside of a function",
            identifier.symbol
        );

        Ok(Lowered::Place(place))
    }

    fn lower_binary(
        &mut self,
        operator: BinaryOperatorKind,
        lhs: &Expression,
        rhs: &Expression,
        position: SourcePosition,
    ) -> LowerResult<Lowered> {
        if operator.class() == BinaryOperatorClass::Assignment {
            return self.lower_assignment(lhs, rhs, position);
        }

        let lhs = self.lower_value(lhs)?;
        let rhs = self.lower_value(rhs)?;

        for operand in [lhs, rhs] {
            if !operand.ty.is_numeric() {
                return Err(LowerErrorKind::type_mismatch(format!(
                    "operator `{operator}` cannot be applied to a value of type `{}`",
                    operand.ty
                ))
                .at(position));
            }
        }

        let is_float = lhs.ty == lir::Type::Double || rhs.ty == lir::Type::Double;

        let (lhs, rhs, operand_ty) = if is_float {
            (self.promote_if_int(lhs), self.promote_if_int(rhs), lir::Type::Double)
        } else {
            (lhs, rhs, lir::Type::Int)
        };

        let result_ty = match operator.class() {
            BinaryOperatorClass::Arithmetic => operand_ty,
            BinaryOperatorClass::Comparison => lir::Type::Bool,
            BinaryOperatorClass::Assignment => {
                return Err(LowerErrorKind::codegen(format!(
                    "unrecognized binary operator `{operator}`"
                ))
                .at(position));
            }
        };

        let destination = self.create_register(result_ty);

        let instruction = if is_float {
            lir::Instruction::FloatOperation {
                operator,
                destination,
                lhs: lhs.operand,
                rhs: rhs.operand,
            }
        } else {
            lir::Instruction::IntegerOperation {
                operator,
                destination,
                lhs: lhs.operand,
                rhs: rhs.operand,
            }
        };

        self.push_instruction(instruction);

        Ok(Lowered::Value(Value {
            operand: lir::Operand::Register(destination),
            ty: result_ty,
        }))
    }

    fn promote_if_int(&mut self, value: Value) -> Value {
        match value.ty {
            lir::Type::Int => self.promote(value),
            _ => value,
        }
    }

    /// `lhs = rhs` stores into the place produced by `lhs` and evaluates to
    /// that same place, so assignments can be chained
    fn lower_assignment(
        &mut self,
        lhs: &Expression,
        rhs: &Expression,
        position: SourcePosition,
    ) -> LowerResult<Lowered> {
        let Lowered::Place(place) = self.lower_expression(lhs)? else {
            return Err(LowerErrorKind::NotAssignable {
                target: describe_expression(lhs),
            }
            .at(position));
        };

        let value = self.lower_value(rhs)?;
        let source = self.coerce(value, place.ty, position, "an assignment")?;

        self.push_instruction(lir::Instruction::Store {
            destination: place.pointer,
            source,
        });

        Ok(Lowered::Place(place))
    }

    /// Lowers a call, returning its result value or `None` for functions
    /// returning void
    fn lower_call(
        &mut self,
        callee: &Identifier,
        arguments: &[Expression],
        position: SourcePosition,
    ) -> LowerResult<Option<Value>> {
        let Some(signature) = self.functions.get(&callee.symbol).cloned() else {
            return Err(LowerErrorKind::UndefinedFunction {
                name: callee.symbol.value().to_owned(),
            }
            .at(position));
        };

        let arity_matches = if signature.is_variadic {
            arguments.len() >= signature.parameters.len()
        } else {
            arguments.len() == signature.parameters.len()
        };

        if !arity_matches {
            return Err(LowerErrorKind::ArgumentCount {
                name: callee.symbol.value().to_owned(),
                expected: signature.parameters.len(),
                found: arguments.len(),
            }
            .at(position));
        }

        // scanf writes through its trailing arguments, so those are passed by
        // address instead of by value
        let passes_addresses = signature.is_variadic && callee.symbol.value() == "scanf";

        let mut operands = Vec::with_capacity(arguments.len());

        for (index, argument) in arguments.iter().enumerate() {
            let operand = match signature.parameters.get(index) {
                Some(parameter_ty) => {
                    let value = self.lower_value(argument)?;
                    let context = format!("argument {} of `{}`", index + 1, callee.symbol);

                    self.coerce(value, *parameter_ty, argument.position, &context)?
                }
                None if passes_addresses => match self.lower_expression(argument)? {
                    Lowered::Place(place) => place.pointer,
                    Lowered::Value(_) => {
                        return Err(LowerErrorKind::NotAssignable {
                            target: describe_expression(argument),
                        }
                        .at(argument.position));
                    }
                },
                None => self.lower_value(argument)?.operand,
            };

            operands.push(operand);
        }

        let destination = signature.return_type.map(|ty| self.create_register(ty));

        lowering_log!("call {} with {} argument(s)", callee.symbol, operands.len());

        self.push_instruction(lir::Instruction::FunctionCall {
            target: signature.name,
            arguments: operands,
            destination,
        });

        Ok(destination.zip(signature.return_type).map(|(register, ty)| Value {
            operand: lir::Operand::Register(register),
            ty,
        }))
    }
}

/// Human readable description of an expression for diagnostics
fn describe_expression(expression: &Expression) -> String {
    match &expression.kind {
        ExpressionKind::IntegerLiteral(value) => format!("the integer literal `{value}`"),
        ExpressionKind::DoubleLiteral(value) => format!("the double literal `{value:?}`"),
        ExpressionKind::StringLiteral(_) => "a string literal".to_owned(),
        ExpressionKind::Identifier(identifier) => format!("`{}`", identifier.symbol),
        ExpressionKind::Binary { operator, .. } => {
            format!("the result of operator `{operator}`")
        }
        ExpressionKind::Call { callee, .. } => {
            format!("the result of calling `{}`", callee.symbol)
        }
    }
}
