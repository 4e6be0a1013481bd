//! Reference evaluator for LIR modules.
//!
//! Walks the basic blocks of a function directly, without going through the
//! assembler. Every stack slot and global lives in one flat memory so that
//! addresses (the operands of `scanf`) stay valid across calls. `printf` and
//! `scanf` are emulated against in-memory buffers.

use std::collections::VecDeque;

use hashbrown::HashMap;
use thiserror::Error;

use crate::{
    frontend::{ast::BinaryOperatorKind, intern::InternedSymbol},
    index::Index,
    middle::lir::{self, BlockId, RegisterId},
};

/// Upper bound on executed instructions before evaluation is abandoned
const MAX_STEPS: usize = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeValue {
    Int(i32),
    Double(f64),
    Bool(bool),
    Str(lir::StaticLabelId),
    /// Index of a slot in the evaluator's memory
    Pointer(usize),
}

impl core::fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeValue::Int(value) => write!(f, "{value}"),
            RuntimeValue::Double(value) => write!(f, "{value:?}"),
            RuntimeValue::Bool(value) => write!(f, "{value}"),
            RuntimeValue::Str(id) => write!(f, "@str{}", id.index()),
            RuntimeValue::Pointer(address) => write!(f, "&{address}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("call to undefined function `{name}`")]
    UndefinedFunction { name: String },

    #[error("function `{name}` expects {expected} argument(s) but {found} were given")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("register {register} read before it was written")]
    UndefinedRegister { register: String },

    #[error("invalid memory access at address {address}")]
    InvalidAddress { address: usize },

    #[error("type error: {detail}")]
    TypeError { detail: String },

    #[error("unsupported: {detail}")]
    Unsupported { detail: String },

    #[error("exceeded the step limit of {} instructions", MAX_STEPS)]
    StepLimit,
}

type EvalResult<T> = Result<T, EvalError>;

pub struct Evaluator<'m> {
    module: &'m lir::Module,
    memory: Vec<RuntimeValue>,
    input: VecDeque<char>,
    output: String,
    steps: usize,
}

/// Activation record of one call
struct Frame<'f> {
    function: &'f lir::FunctionDefinition,
    registers: HashMap<RegisterId, RuntimeValue>,
}

impl<'m> Evaluator<'m> {
    pub fn new(module: &'m lir::Module) -> Self {
        let memory = module
            .globals
            .iter()
            .map(|global| immediate_value(global.initializer))
            .collect();

        Self {
            module,
            memory,
            input: VecDeque::new(),
            output: String::new(),
            steps: 0,
        }
    }

    /// Text consumed by `scanf`
    pub fn with_input(mut self, input: &str) -> Self {
        self.input = input.chars().collect();
        self
    }

    /// Everything written through `printf` so far
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Current contents of a global variable
    pub fn global(&self, name: &str) -> Option<RuntimeValue> {
        let global = self.module.global(name)?;

        self.memory.get(global.id.index()).copied()
    }

    /// Calls a user defined function, returning its result for non-void
    /// functions
    pub fn call(
        &mut self,
        name: &str,
        arguments: &[RuntimeValue],
    ) -> EvalResult<Option<RuntimeValue>> {
        let module = self.module;
        let function = module
            .function(name)
            .ok_or_else(|| EvalError::UndefinedFunction {
                name: name.to_owned(),
            })?;

        self.call_definition(function, arguments)
    }

    fn call_definition(
        &mut self,
        function: &'m lir::FunctionDefinition,
        arguments: &[RuntimeValue],
    ) -> EvalResult<Option<RuntimeValue>> {
        if function.arguments.len() != arguments.len() {
            return Err(EvalError::ArgumentCount {
                name: function.signature.name.value().to_owned(),
                expected: function.arguments.len(),
                found: arguments.len(),
            });
        }

        let mut frame = Frame {
            function,
            registers: function
                .arguments
                .iter()
                .copied()
                .zip(arguments.iter().copied())
                .collect(),
        };

        // stack slots allocated by this call are released on return
        let frame_base = self.memory.len();
        let result = self.execute(&mut frame);
        self.memory.truncate(frame_base);

        result
    }

    fn execute(&mut self, frame: &mut Frame<'m>) -> EvalResult<Option<RuntimeValue>> {
        let function = frame.function;
        let mut current = BlockId::ENTRY;

        loop {
            let block = function.blocks.get(&current).ok_or_else(|| {
                EvalError::Unsupported {
                    detail: format!("jump to missing block {current}"),
                }
            })?;

            let mut next = None;

            for instruction in &block.instructions {
                self.steps += 1;

                if self.steps > MAX_STEPS {
                    return Err(EvalError::StepLimit);
                }

                match instruction {
                    lir::Instruction::AllocStack { destination, ty } => {
                        let address = self.memory.len();
                        self.memory.push(immediate_value(ty.zero()));
                        frame
                            .registers
                            .insert(*destination, RuntimeValue::Pointer(address));
                    }
                    lir::Instruction::Load {
                        destination,
                        source,
                    } => {
                        let address = self.address(frame, *source)?;
                        let value = *self
                            .memory
                            .get(address)
                            .ok_or(EvalError::InvalidAddress { address })?;

                        frame.registers.insert(*destination, value);
                    }
                    lir::Instruction::Store {
                        destination,
                        source,
                    } => {
                        let address = self.address(frame, *destination)?;
                        let value = self.operand(frame, *source)?;

                        *self
                            .memory
                            .get_mut(address)
                            .ok_or(EvalError::InvalidAddress { address })? = value;
                    }
                    lir::Instruction::IntToDouble {
                        destination,
                        operand,
                    } => {
                        let value = match self.operand(frame, *operand)? {
                            RuntimeValue::Int(value) => RuntimeValue::Double(f64::from(value)),
                            other => {
                                return Err(EvalError::TypeError {
                                    detail: format!("sitofp applied to {other}"),
                                });
                            }
                        };

                        frame.registers.insert(*destination, value);
                    }
                    lir::Instruction::IntegerOperation {
                        operator,
                        destination,
                        lhs,
                        rhs,
                    }
                    | lir::Instruction::FloatOperation {
                        operator,
                        destination,
                        lhs,
                        rhs,
                    } => {
                        let lhs = self.operand(frame, *lhs)?;
                        let rhs = self.operand(frame, *rhs)?;

                        frame
                            .registers
                            .insert(*destination, evaluate_operation(*operator, lhs, rhs)?);
                    }
                    lir::Instruction::Branch {
                        condition,
                        positive,
                        negative,
                    } => {
                        next = Some(match self.operand(frame, *condition)? {
                            RuntimeValue::Bool(true) => *positive,
                            RuntimeValue::Bool(false) => *negative,
                            other => {
                                return Err(EvalError::TypeError {
                                    detail: format!("branch on non boolean {other}"),
                                });
                            }
                        });
                        break;
                    }
                    lir::Instruction::Jump { destination } => {
                        next = Some(*destination);
                        break;
                    }
                    lir::Instruction::Return { value } => {
                        return value.map(|value| self.operand(frame, value)).transpose();
                    }
                    lir::Instruction::FunctionCall {
                        target,
                        arguments,
                        destination,
                    } => {
                        let arguments = arguments
                            .iter()
                            .map(|argument| self.operand(frame, *argument))
                            .collect::<EvalResult<Vec<_>>>()?;

                        let result = self.dispatch_call(*target, &arguments)?;

                        if let (Some(destination), Some(result)) = (destination, result) {
                            frame.registers.insert(*destination, result);
                        }
                    }
                }
            }

            current = next.ok_or_else(|| EvalError::Unsupported {
                detail: format!("control fell off the end of block {current}"),
            })?;
        }
    }

    fn dispatch_call(
        &mut self,
        target: InternedSymbol,
        arguments: &[RuntimeValue],
    ) -> EvalResult<Option<RuntimeValue>> {
        let module = self.module;

        if let Some(function) = module.function(target.value()) {
            return self.call_definition(function, arguments);
        }

        match target.value() {
            "printf" => self.printf(arguments).map(Some),
            "scanf" => self.scanf(arguments).map(Some),
            name => Err(EvalError::UndefinedFunction {
                name: name.to_owned(),
            }),
        }
    }

    fn operand(&self, frame: &Frame<'_>, operand: lir::Operand) -> EvalResult<RuntimeValue> {
        match operand {
            lir::Operand::Immediate(immediate) => Ok(immediate_value(immediate)),
            lir::Operand::Register(register) => {
                frame.registers.get(&register).copied().ok_or_else(|| {
                    EvalError::UndefinedRegister {
                        register: format!("%{}", register.index()),
                    }
                })
            }
        }
    }

    fn address(&self, frame: &Frame<'_>, operand: lir::Operand) -> EvalResult<usize> {
        match self.operand(frame, operand)? {
            RuntimeValue::Pointer(address) => Ok(address),
            other => Err(EvalError::TypeError {
                detail: format!("{other} used as an address"),
            }),
        }
    }

    fn string(&self, value: RuntimeValue) -> EvalResult<&'static str> {
        match value {
            RuntimeValue::Str(id) => self
                .module
                .static_strings
                .get(&id)
                .map(|symbol| symbol.value())
                .ok_or_else(|| EvalError::TypeError {
                    detail: format!("unknown string {value}"),
                }),
            other => Err(EvalError::TypeError {
                detail: format!("expected a string, found {other}"),
            }),
        }
    }

    /* C runtime */

    fn printf(&mut self, arguments: &[RuntimeValue]) -> EvalResult<RuntimeValue> {
        let Some((format, mut rest)) = arguments.split_first() else {
            return Err(EvalError::TypeError {
                detail: "printf requires a format string".to_owned(),
            });
        };

        let format = self.string(*format)?;
        let mut written = String::new();
        let mut chars = format.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                written.push(c);
                continue;
            }

            let mut spec = ConversionSpec::default();

            while let Some(&flag) = chars.peek() {
                match flag {
                    '-' => spec.left_align = true,
                    '0' => spec.zero_pad = true,
                    '+' => spec.plus_sign = true,
                    ' ' => spec.space_sign = true,
                    '#' => {}
                    _ => break,
                }
                chars.next();
            }

            spec.width = take_number(&mut chars);

            if chars.peek() == Some(&'.') {
                chars.next();
                spec.precision = Some(take_number(&mut chars).unwrap_or(0));
            }

            while matches!(chars.peek(), Some('l' | 'h')) {
                chars.next();
            }

            let Some(conversion) = chars.next() else {
                written.push('%');
                break;
            };

            if conversion == '%' {
                written.push('%');
                continue;
            }

            let Some((argument, remaining)) = rest.split_first() else {
                return Err(EvalError::TypeError {
                    detail: format!("missing argument for `%{conversion}`"),
                });
            };
            rest = remaining;

            // with an explicit precision the `0` flag is ignored for integers
            if spec.precision.is_some() && matches!(conversion, 'd' | 'i' | 'u' | 'x' | 'X') {
                spec.zero_pad = false;
            }

            let text = match (conversion, integer_argument(*argument)) {
                ('d' | 'i', Some(value)) => spec.signed(i64::from(value)),
                ('u', Some(value)) => spec.unsigned((value as u32).to_string()),
                ('x', Some(value)) => spec.unsigned(format!("{:x}", value as u32)),
                ('X', Some(value)) => spec.unsigned(format!("{:X}", value as u32)),
                ('c', Some(value)) => char::from_u32(value as u32)
                    .map(String::from)
                    .unwrap_or_default(),
                ('f' | 'F' | 'e' | 'E' | 'g' | 'G', _) => match argument {
                    RuntimeValue::Double(value) => spec.double(*value, conversion),
                    other => {
                        return Err(EvalError::Unsupported {
                            detail: format!("printf conversion `%{conversion}` for {other}"),
                        });
                    }
                },
                ('s', _) => self.string(*argument)?.to_owned(),
                (conversion, _) => {
                    return Err(EvalError::Unsupported {
                        detail: format!("printf conversion `%{conversion}` for {argument}"),
                    });
                }
            };

            written.push_str(&spec.pad(text));
        }

        let count = written.len();
        self.output.push_str(&written);

        Ok(RuntimeValue::Int(count as i32))
    }

    fn scanf(&mut self, arguments: &[RuntimeValue]) -> EvalResult<RuntimeValue> {
        let Some((format, targets)) = arguments.split_first() else {
            return Err(EvalError::TypeError {
                detail: "scanf requires a format string".to_owned(),
            });
        };

        let format = self.string(*format)?;
        let mut targets = targets.iter();
        let mut assigned = 0;
        let mut chars = format.chars().peekable();

        while let Some(c) = chars.next() {
            if c.is_whitespace() {
                self.skip_input_whitespace();
                continue;
            }

            if c != '%' {
                if self.input.front() == Some(&c) {
                    self.input.pop_front();
                    continue;
                }
                break;
            }

            let mut is_long = false;
            while let Some(&(modifier @ ('l' | 'h'))) = chars.peek() {
                is_long |= modifier == 'l';
                chars.next();
            }

            let Some(conversion) = chars.next() else {
                break;
            };

            self.skip_input_whitespace();

            if self.input.is_empty() {
                return Ok(RuntimeValue::Int(if assigned == 0 { -1 } else { assigned }));
            }

            let value = match conversion {
                'd' | 'i' => self
                    .read_token(|c, first| c.is_ascii_digit() || (first && matches!(c, '-' | '+')))
                    .parse::<i32>()
                    .ok()
                    .map(RuntimeValue::Int),
                'f' | 'e' | 'g' => self
                    .read_token(|c, first| {
                        c.is_ascii_digit()
                            || matches!(c, '.' | 'e' | 'E')
                            || (first && matches!(c, '-' | '+'))
                    })
                    .parse::<f64>()
                    .ok()
                    .map(RuntimeValue::Double),
                conversion => {
                    return Err(EvalError::Unsupported {
                        detail: format!("scanf conversion `%{conversion}`"),
                    });
                }
            };

            let Some(value) = value else {
                break;
            };

            // `%f` without `l` writes a float, which this language cannot
            // declare
            if matches!(value, RuntimeValue::Double(_)) && !is_long {
                return Err(EvalError::Unsupported {
                    detail: "scanf `%f` into a double, use `%lf`".to_owned(),
                });
            }

            let Some(target) = targets.next() else {
                return Err(EvalError::TypeError {
                    detail: format!("missing argument for `%{conversion}`"),
                });
            };

            let RuntimeValue::Pointer(address) = *target else {
                return Err(EvalError::TypeError {
                    detail: format!("scanf target {target} is not an address"),
                });
            };

            *self
                .memory
                .get_mut(address)
                .ok_or(EvalError::InvalidAddress { address })? = value;
            assigned += 1;
        }

        Ok(RuntimeValue::Int(assigned))
    }

    fn skip_input_whitespace(&mut self) {
        while self.input.front().is_some_and(|c| c.is_whitespace()) {
            self.input.pop_front();
        }
    }

    fn read_token(&mut self, accepts: impl Fn(char, bool) -> bool) -> String {
        let mut token = String::new();

        while let Some(&c) = self.input.front() {
            if !accepts(c, token.is_empty()) {
                break;
            }

            token.push(c);
            self.input.pop_front();
        }

        token
    }
}

#[derive(Debug, Default)]
struct ConversionSpec {
    left_align: bool,
    zero_pad: bool,
    plus_sign: bool,
    space_sign: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

impl ConversionSpec {
    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus_sign {
            "+"
        } else if self.space_sign {
            " "
        } else {
            ""
        }
    }

    /// Precision is the minimum number of digits; `%.0d` of zero prints
    /// nothing
    fn minimum_digits(&self, digits: String) -> String {
        match self.precision {
            Some(0) if digits == "0" => String::new(),
            Some(precision) if digits.len() < precision => {
                format!("{}{digits}", "0".repeat(precision - digits.len()))
            }
            _ => digits,
        }
    }

    fn signed(&self, value: i64) -> String {
        let digits = self.minimum_digits(value.unsigned_abs().to_string());

        format!("{}{digits}", self.sign(value < 0))
    }

    fn unsigned(&self, digits: String) -> String {
        self.minimum_digits(digits)
    }

    fn double(&self, value: f64, conversion: char) -> String {
        let precision = self.precision.unwrap_or(6);
        let magnitude = value.abs();

        let body = if value.is_nan() {
            "nan".to_owned()
        } else if value.is_infinite() {
            "inf".to_owned()
        } else {
            match conversion.to_ascii_lowercase() {
                'e' => format_exponential(magnitude, precision),
                'g' => format_general(magnitude, precision),
                _ => format!("{magnitude:.precision$}"),
            }
        };

        let body = if conversion.is_ascii_uppercase() {
            body.to_ascii_uppercase()
        } else {
            body
        };

        format!("{}{body}", self.sign(value.is_sign_negative() && !value.is_nan()))
    }

    fn pad(&self, text: String) -> String {
        let Some(width) = self.width.filter(|width| *width > text.len()) else {
            return text;
        };

        let fill = width - text.len();

        if self.left_align {
            return format!("{text}{}", " ".repeat(fill));
        }

        let is_numeric = text.chars().any(|c| c.is_ascii_digit());

        if !self.zero_pad || !is_numeric {
            return format!("{}{text}", " ".repeat(fill));
        }

        // zeros go between the sign and the digits
        let sign_length = text.starts_with(['-', '+', ' ']) as usize;
        let (sign, digits) = text.split_at(sign_length);

        format!("{sign}{}{digits}", "0".repeat(fill))
    }
}

/// Ints and comparison results both travel as C `int`
fn integer_argument(value: RuntimeValue) -> Option<i32> {
    match value {
        RuntimeValue::Int(value) => Some(value),
        RuntimeValue::Bool(value) => Some(i32::from(value)),
        _ => None,
    }
}

/// `%e`: one digit before the point and an exponent of at least two digits
fn format_exponential(magnitude: f64, precision: usize) -> String {
    let formatted = format!("{magnitude:.precision$e}");
    let (mantissa, exponent) = split_exponent(&formatted);
    let sign = if exponent < 0 { '-' } else { '+' };

    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

/// `%g`: `%e` when the exponent is below -4 or not below the precision,
/// `%f` otherwise, with trailing zeros removed in both cases
fn format_general(magnitude: f64, precision: usize) -> String {
    let precision = precision.max(1);

    let exponent = if magnitude == 0.0 {
        0
    } else {
        let digits = precision - 1;
        split_exponent(&format!("{magnitude:.digits$e}")).1
    };

    if exponent < -4 || exponent >= precision as i32 {
        let formatted = format_exponential(magnitude, precision - 1);

        match formatted.split_once('e') {
            Some((mantissa, exponent)) => format!("{}e{exponent}", trim_fraction(mantissa)),
            None => formatted,
        }
    } else {
        let decimals = (precision as i32 - 1 - exponent) as usize;

        trim_fraction(&format!("{magnitude:.decimals$}")).to_owned()
    }
}

/// Splits Rust's `1.5e-3` style output into mantissa and exponent
fn split_exponent(formatted: &str) -> (&str, i32) {
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse().unwrap_or(0)),
        None => (formatted, 0),
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut number = None;

    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        number = Some(number.unwrap_or(0) * 10 + digit as usize);
        chars.next();
    }

    number
}

fn immediate_value(immediate: lir::Immediate) -> RuntimeValue {
    match immediate {
        lir::Immediate::Int(value) => RuntimeValue::Int(value),
        lir::Immediate::Double(value) => RuntimeValue::Double(value),
        lir::Immediate::Bool(value) => RuntimeValue::Bool(value),
        lir::Immediate::StaticString(id) => RuntimeValue::Str(id),
        lir::Immediate::Global(id) => RuntimeValue::Pointer(id.index()),
    }
}

fn evaluate_operation(
    operator: BinaryOperatorKind,
    lhs: RuntimeValue,
    rhs: RuntimeValue,
) -> EvalResult<RuntimeValue> {
    use RuntimeValue::{Bool, Double, Int};

    let result = match (operator, lhs, rhs) {
        (BinaryOperatorKind::Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (BinaryOperatorKind::Subtract, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (BinaryOperatorKind::Multiply, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (BinaryOperatorKind::Divide | BinaryOperatorKind::Modulus, Int(_), Int(0)) => {
            return Err(EvalError::DivisionByZero);
        }
        (BinaryOperatorKind::Divide, Int(a), Int(b)) => Int(a.wrapping_div(b)),
        (BinaryOperatorKind::Modulus, Int(a), Int(b)) => Int(a.wrapping_rem(b)),
        (BinaryOperatorKind::GreaterThan, Int(a), Int(b)) => Bool(a > b),
        (BinaryOperatorKind::GreaterThanOrEqualTo, Int(a), Int(b)) => Bool(a >= b),
        (BinaryOperatorKind::LessThan, Int(a), Int(b)) => Bool(a < b),
        (BinaryOperatorKind::LessThanOrEqualTo, Int(a), Int(b)) => Bool(a <= b),
        (BinaryOperatorKind::Equals, Int(a), Int(b)) => Bool(a == b),

        (BinaryOperatorKind::Add, Double(a), Double(b)) => Double(a + b),
        (BinaryOperatorKind::Subtract, Double(a), Double(b)) => Double(a - b),
        (BinaryOperatorKind::Multiply, Double(a), Double(b)) => Double(a * b),
        (BinaryOperatorKind::Divide, Double(a), Double(b)) => Double(a / b),
        (BinaryOperatorKind::Modulus, Double(a), Double(b)) => Double(a % b),
        (BinaryOperatorKind::GreaterThan, Double(a), Double(b)) => Bool(a > b),
        (BinaryOperatorKind::GreaterThanOrEqualTo, Double(a), Double(b)) => Bool(a >= b),
        (BinaryOperatorKind::LessThan, Double(a), Double(b)) => Bool(a < b),
        (BinaryOperatorKind::LessThanOrEqualTo, Double(a), Double(b)) => Bool(a <= b),
        (BinaryOperatorKind::Equals, Double(a), Double(b)) => Bool(a == b),

        (operator, lhs, rhs) => {
            return Err(EvalError::TypeError {
                detail: format!("operator `{operator}` applied to {lhs} and {rhs}"),
            });
        }
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::ast::{Expression, ParamDecl, Program, Statement},
        middle::lowering::lower_program,
    };

    fn lower(statements: Vec<Statement>) -> lir::Module {
        lower_program(&Program { statements }, "test").unwrap()
    }

    #[test]
    fn integer_division_truncates() {
        let module = lower(vec![Statement::function(
            "int",
            "f",
            vec![],
            vec![Statement::ret(Some(Expression::binary(
                BinaryOperatorKind::Divide,
                Expression::integer(5),
                Expression::integer(2),
            )))],
        )]);

        let result = Evaluator::new(&module).call("f", &[]);

        assert_eq!(result, Ok(Some(RuntimeValue::Int(2))));
    }

    #[test]
    fn integer_division_by_zero_is_reported() {
        let module = lower(vec![Statement::function(
            "int",
            "f",
            vec![ParamDecl::new("int", "d")],
            vec![Statement::ret(Some(Expression::binary(
                BinaryOperatorKind::Modulus,
                Expression::integer(1),
                Expression::identifier("d"),
            )))],
        )]);

        let result = Evaluator::new(&module).call("f", &[RuntimeValue::Int(0)]);

        assert_eq!(result, Err(EvalError::DivisionByZero));
    }

    #[test]
    fn printf_formats_integers_and_doubles() {
        let module = lower(vec![Statement::function(
            "void",
            "main",
            vec![],
            vec![Statement::expression(Expression::call(
                "printf",
                vec![
                    Expression::string("%d|%5.2f|%-3d|%s%%\n"),
                    Expression::integer(42),
                    Expression::double(3.14159),
                    Expression::integer(7),
                    Expression::string("ok"),
                ],
            ))],
        )]);

        let mut evaluator = Evaluator::new(&module);
        evaluator.call("main", &[]).unwrap();

        assert_eq!(evaluator.output(), "42| 3.14|7  |ok%\n");
    }

    /// Runs `printf(format, arguments...)` from a void `main`
    fn printf_output(format: &str, arguments: Vec<Expression>) -> String {
        let mut call_arguments = vec![Expression::string(format)];
        call_arguments.extend(arguments);

        let module = lower(vec![Statement::function(
            "void",
            "main",
            vec![],
            vec![Statement::expression(Expression::call("printf", call_arguments))],
        )]);

        let mut evaluator = Evaluator::new(&module);
        evaluator.call("main", &[]).unwrap();

        evaluator.output().to_owned()
    }

    #[test]
    fn printf_prints_comparison_results_as_int() {
        let comparison = |operator, lhs, rhs| {
            Expression::binary(operator, Expression::integer(lhs), Expression::integer(rhs))
        };

        assert_eq!(
            printf_output(
                "%d %i %x",
                vec![
                    comparison(BinaryOperatorKind::LessThan, 1, 2),
                    comparison(BinaryOperatorKind::Equals, 1, 2),
                    comparison(BinaryOperatorKind::GreaterThanOrEqualTo, 3, 3),
                ],
            ),
            "1 0 1"
        );
    }

    #[test]
    fn printf_exponent_has_sign_and_two_digits() {
        assert_eq!(
            printf_output(
                "%e|%.2e|%E|%e",
                vec![
                    Expression::double(1.5),
                    Expression::double(0.000123),
                    Expression::double(-12345.678),
                    Expression::double(0.0),
                ],
            ),
            "1.500000e+00|1.23e-04|-1.234568E+04|0.000000e+00"
        );
    }

    #[test]
    fn printf_general_picks_the_shorter_notation() {
        assert_eq!(
            printf_output(
                "%g|%g|%g|%g|%g|%.3g",
                vec![
                    Expression::double(1234567.0),
                    Expression::double(0.00001),
                    Expression::double(2.5),
                    Expression::double(100.0),
                    Expression::double(0.0001),
                    Expression::double(3.14159),
                ],
            ),
            "1.23457e+06|1e-05|2.5|100|0.0001|3.14"
        );
    }

    #[test]
    fn printf_integer_precision_and_sign_flags() {
        assert_eq!(
            printf_output(
                "%.3d|%+d|% d|%+d|%05d|%08.3d|%.0d|",
                vec![
                    Expression::integer(7),
                    Expression::integer(5),
                    Expression::integer(5),
                    Expression::integer(-5),
                    Expression::integer(-42),
                    Expression::integer(7),
                    Expression::integer(0),
                ],
            ),
            "007|+5| 5|-5|-0042|     007||"
        );
    }

    #[test]
    fn printf_sign_flags_apply_to_doubles() {
        assert_eq!(
            printf_output(
                "%+.1f|% .2f|%+08.2f",
                vec![
                    Expression::double(2.0),
                    Expression::double(1.5),
                    Expression::double(3.14159),
                ],
            ),
            "+2.0| 1.50|+0003.14"
        );
    }

    #[test]
    fn scanf_writes_through_addresses() {
        let module = lower(vec![
            Statement::global("int", "n", None),
            Statement::function(
                "double",
                "read",
                vec![],
                vec![
                    Statement::local("double", "d", None),
                    Statement::expression(Expression::call(
                        "scanf",
                        vec![
                            Expression::string("%d %lf"),
                            Expression::identifier("n"),
                            Expression::identifier("d"),
                        ],
                    )),
                    Statement::ret(Some(Expression::identifier("d"))),
                ],
            ),
        ]);

        let mut evaluator = Evaluator::new(&module).with_input("  12\n2.5");

        assert_eq!(
            evaluator.call("read", &[]),
            Ok(Some(RuntimeValue::Double(2.5)))
        );
        assert_eq!(evaluator.global("n"), Some(RuntimeValue::Int(12)));
    }

    #[test]
    fn runaway_loops_hit_the_step_limit() {
        let module = lower(vec![Statement::function(
            "void",
            "spin",
            vec![],
            vec![Statement::while_loop(
                Expression::binary(
                    BinaryOperatorKind::LessThan,
                    Expression::integer(0),
                    Expression::integer(1),
                ),
                Statement::block(vec![]),
            )],
        )]);

        assert_eq!(
            Evaluator::new(&module).call("spin", &[]),
            Err(EvalError::StepLimit)
        );
    }
}
