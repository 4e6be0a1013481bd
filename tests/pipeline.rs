use microcc::{
    backend::{CodeGenerator, CodegenOptions, Target},
    frontend::{
        self,
        ast::{BinaryOperatorKind, Expression, ParamDecl, Program, Statement},
    },
    middle::{
        lir::{
            self,
            eval::{Evaluator, RuntimeValue},
            pretty_print::pretty_print_module,
        },
        lowering::{LowerErrorKind, lower_program},
    },
};

fn load(json: &str) -> Program {
    frontend::load_program(json).unwrap()
}

fn lower(program: &Program) -> lir::Module {
    match lower_program(program, "test") {
        Ok(module) => module,
        Err(error) => panic!("lowering failed: {}", error.diagnostic()),
    }
}

fn plain(text: String) -> String {
    strip_ansi_escapes::strip_str(text)
}

fn asm(module: &lir::Module) -> String {
    Target::x86_64LinuxGnu
        .get_code_generator()
        .translate_to_asm(module, &CodegenOptions::default())
        .unwrap()
}

#[test]
fn summing_program_runs_end_to_end() {
    let module = lower(&load(include_str!("programs/sum.json")));

    let mut evaluator = Evaluator::new(&module).with_input("4\n");
    let status = evaluator.call("main", &[]).unwrap();

    assert_eq!(status, Some(RuntimeValue::Int(0)));
    assert_eq!(evaluator.output(), "sum=10 avg=5.000000\n");
    assert_eq!(evaluator.global("total"), Some(RuntimeValue::Int(10)));
}

#[test]
fn summing_program_lowers_to_well_formed_ir() {
    let module = lower(&load(include_str!("programs/sum.json")));
    let ir = plain(pretty_print_module(&module));

    assert!(ir.contains("@g0 = global total: i32 = 0"), "{ir}");
    assert!(ir.contains("declare printf(str, ...) -> i32"), "{ir}");
    assert!(ir.contains("declare scanf(str, ...) -> i32"), "{ir}");

    for function in &module.function_definitions {
        assert!(
            function.unterminated_blocks().is_empty(),
            "unterminated block in `{}`",
            function.signature.name
        );

        for block in function.blocks.values() {
            for successor in function.successors(block.id) {
                assert!(function.blocks[&successor].predecessors.contains(&block.id));
            }
        }
    }

    // the loop header is entered from the function entry and from the body
    let sum = module.function("sum").unwrap();
    assert!(
        sum.blocks
            .values()
            .any(|block| block.predecessors.len() == 2)
    );
}

#[test]
fn summing_program_translates_to_assembly() {
    let module = lower(&load(include_str!("programs/sum.json")));
    let text = asm(&module);
    let lines = text.lines().map(str::trim).collect::<Vec<_>>();

    for expected in [
        "global sum",
        "global main",
        "extern printf",
        "extern scanf",
        "call sum",
        "call scanf wrt ..plt",
        "call printf wrt ..plt",
        "cvtsi2sd xmm0, eax",
        "divsd xmm0, xmm1",
        "setle al",
        "__global_0: dd 0 ; total",
        "__static_str_0: db \"%d\", 0",
        "__static_str_1: db \"sum=%d avg=%f\", 10, 0",
    ] {
        assert!(lines.contains(&expected), "missing `{expected}` in:\n{text}");
    }
}

#[test]
fn undefined_variable_is_reported_with_its_line() {
    let program = load(include_str!("programs/undefined_variable.json"));
    let error = lower_program(&program, "test").unwrap_err();

    assert_eq!(
        error.kind,
        LowerErrorKind::UndefinedName {
            name: "y".to_owned()
        }
    );
    assert_eq!(error.diagnostic(), "Error: undefined variable `y` at line 2");
}

#[test]
fn malformed_trees_are_rejected_by_the_loader() {
    assert!(frontend::load_program(r#"{ "statements": [ { "kind": { "goto": 1 } } ] }"#).is_err());
    assert!(frontend::load_program("not json").is_err());
}

#[test]
fn double_arithmetic_is_promoted_and_evaluated() {
    // double half(int x) { return x / 2.0; }
    let program = Program {
        statements: vec![Statement::function(
            "double",
            "half",
            vec![ParamDecl::new("int", "x")],
            vec![Statement::ret(Some(Expression::binary(
                BinaryOperatorKind::Divide,
                Expression::identifier("x"),
                Expression::double(2.0),
            )))],
        )],
    };

    let module = lower(&program);

    assert_eq!(
        Evaluator::new(&module)
            .call("half", &[RuntimeValue::Int(5)])
            .unwrap(),
        Some(RuntimeValue::Double(2.5))
    );

    let text = asm(&module);
    assert!(text.contains("cvtsi2sd xmm0, eax"));
    assert!(text.contains("divsd xmm0, xmm1"));
}

#[test]
fn every_lowered_function_ends_each_block_with_a_terminator() {
    // int sign(int x) { if (x < 0) return -1; else if (x == 0) return 0; return 1; }
    let program = Program {
        statements: vec![Statement::function(
            "int",
            "sign",
            vec![ParamDecl::new("int", "x")],
            vec![
                Statement::if_else(
                    Expression::binary(
                        BinaryOperatorKind::LessThan,
                        Expression::identifier("x"),
                        Expression::integer(0),
                    ),
                    Statement::ret(Some(Expression::integer(-1))),
                    Some(Statement::if_else(
                        Expression::binary(
                            BinaryOperatorKind::Equals,
                            Expression::identifier("x"),
                            Expression::integer(0),
                        ),
                        Statement::ret(Some(Expression::integer(0))),
                        None,
                    )),
                ),
                Statement::ret(Some(Expression::integer(1))),
            ],
        )],
    };

    let module = lower(&program);
    let sign = module.function("sign").unwrap();

    assert!(sign.unterminated_blocks().is_empty());

    for (argument, expected) in [(-7, -1), (0, 0), (3, 1)] {
        assert_eq!(
            Evaluator::new(&module)
                .call("sign", &[RuntimeValue::Int(argument)])
                .unwrap(),
            Some(RuntimeValue::Int(expected))
        );
    }
}
