use super::*;
use crate::lexer::Lexer;
use expect_test::{expect, Expect};

fn check(input: &str, expect: Expect) {
    let tokens = match Lexer::new(input).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            expect.assert_eq(&format!(
                "Lex error: {} at {}:{}",
                e.message, e.line, e.column
            ));
            return;
        }
    };
    let output = match Parser::new(tokens).parse_program() {
        Ok(program) => dump_program(&program),
        Err(e) => format!("Error: {} at {}:{}", e.message, e.span.line, e.span.column),
    };
    expect.assert_eq(&output);
}

fn dump_program(program: &Program) -> String {
    program
        .statements
        .iter()
        .map(|s| dump_stmt(s, 0))
        .collect::<Vec<_>>()
        .join("\n")
}

fn dump_stmt(stmt: &SpannedStmt, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    match &stmt.node {
        Stmt::FuncDef { arg, body, name } => {
            let mut out = format!("{pad}funcdef {name}({arg})");
            for inner in body.iter() {
                out.push('\n');
                out.push_str(&dump_stmt(inner, indent + 1));
            }
            out
        }
        Stmt::Loop {
            var,
            iterable,
            body,
            label,
        } => {
            let mut out = format!("{pad}loop {var} & {}", dump_expr(iterable));
            if let Some(label) = label {
                out.push_str(&format!(" pool:{label}"));
            }
            for inner in body.iter() {
                out.push('\n');
                out.push_str(&dump_stmt(inner, indent + 1));
            }
            out
        }
        Stmt::Conditional {
            condition,
            consequent,
        } => match consequent {
            Consequent::Break => format!("{pad}when {} break", dump_expr(condition)),
            Consequent::Stmt(inner) => format!(
                "{pad}when {}\n{}",
                dump_expr(condition),
                dump_stmt(inner, indent + 1)
            ),
        },
        Stmt::CodeblockDef {
            name,
            delayed,
            body,
        } => {
            let mut out = format!(
                "{pad}codeblock {name}{}",
                if *delayed { " delayed" } else { "" }
            );
            for inner in body.iter() {
                out.push('\n');
                out.push_str(&dump_stmt(inner, indent + 1));
            }
            out
        }
        Stmt::CodeblockRun { name } => format!("{pad}run {name}"),
        Stmt::Assignment { value, target } => match target {
            AssignTarget::Variable(name) => {
                format!("{pad}assign {} -> {name}", dump_expr(value))
            }
            AssignTarget::Literal(text) => {
                format!("{pad}assign {} -> literal {text}", dump_expr(value))
            }
        },
        Stmt::Print { expr, marks } => format!("{pad}print{marks} {}", dump_expr(expr)),
        Stmt::PrintNewline { marks } => format!("{pad}newline x{marks}"),
        Stmt::Expr(expr) => format!("{pad}expr {}", dump_expr(expr)),
    }
}

fn dump_expr(expr: &SpannedExpr) -> String {
    let mut out = dump_term(&expr.node.first);
    for item in &expr.node.rest {
        match item {
            ChainItem::Apply { .. } => out.push_str(" %>()"),
            ChainItem::Op { op, spaced, term } => {
                // `_` marks a spaced operator.
                out.push_str(&format!(
                    " {}{} {}",
                    op,
                    if *spaced { "_" } else { "" },
                    dump_term(term)
                ));
            }
        }
    }
    out
}

fn dump_term(term: &SpannedTerm) -> String {
    match &term.node {
        Term::Number { text, .. } => text.clone(),
        Term::Variable(name) => name.clone(),
        Term::Str { value, reversed } => {
            if *reversed {
                format!("!{value:?}")
            } else {
                format!("{value:?}")
            }
        }
        Term::Special(code) => format!("~{code}"),
        Term::List(elements) => format!(
            "[{}]",
            elements.iter().map(dump_expr).collect::<Vec<_>>().join(", ")
        ),
        Term::GenConst(value) => format!("[{} ,..]", dump_expr(value)),
        Term::GenArith(first, second) => {
            format!("[{}, {} ,..]", dump_expr(first), dump_expr(second))
        }
        Term::GenFunc { seeds, func } => {
            let mut parts: Vec<String> = seeds.iter().map(dump_expr).collect();
            parts.push(func.clone());
            format!("[{} ,..]", parts.join(", "))
        }
        Term::Group(inner) => format!("({})", dump_expr(inner)),
        Term::FuncPrep { args, name } => format!(
            "[{}]({name})",
            args.iter().map(dump_expr).collect::<Vec<_>>().join(", ")
        ),
    }
}

#[test]
fn parse_chain_keeps_spacing_tags() {
    check(
        "2+3 * 4",
        expect![[r#"expr 2 + 3 *_ 4"#]],
    );
}

#[test]
fn parse_assignments() {
    check(
        "1 + 2 -> x\n5 -> 2",
        expect![[r#"
            assign 1 +_ 2 -> x
            assign 5 -> literal 2"#]],
    );
}

#[test]
fn parse_print_forms() {
    check(
        "a ?\nb ??\n@ ???",
        expect![[r#"
            print1 a
            print2 b
            newline x3"#]],
    );
}

#[test]
fn parse_function_definition() {
    check(
        "(a)\n-1 []> a + -2 []> a\nfib ()",
        expect![[r#"
            funcdef fib(a)
              expr -1 []>_ a +_ -2 []>_ a"#]],
    );
}

#[test]
fn parse_loop_with_break_and_label() {
    check(
        "loop i & [1, 2]\ni == 2 ?%> pool\ni ?\npool out",
        expect![[r#"
            loop i & [1, 2] pool:out
              when i ==_ 2 break
              print1 i"#]],
    );
}

#[test]
fn parse_codeblocks() {
    check(
        "#inc{\nx -> y\n}\n#later@{\n1\n}\n#inc#",
        expect![[r#"
            codeblock inc
              assign x -> y
            codeblock later delayed
              expr 1
            run inc"#]],
    );
}

#[test]
fn parse_generator_forms() {
    check(
        "[5 ,..]\n[0, 2 ,..]\n[0, 1, fib ,..]",
        expect![[r#"
            expr [5 ,..]
            expr [0, 2 ,..]
            expr [0, 1, fib ,..]"#]],
    );
}

#[test]
fn parse_function_prep_and_apply() {
    check(
        "[1, 2](add) %> ()",
        expect![[r#"expr [1, 2](add) %>()"#]],
    );
}

#[test]
fn parse_grouping() {
    check(
        "(1 + 2)*3",
        expect![[r#"expr (1 +_ 2) * 3"#]],
    );
}

#[test]
fn parse_conditional_with_statement_consequent() {
    check(
        "x ?%> y -> z",
        expect![[r#"
            when x
              assign y -> z"#]],
    );
}

#[test]
fn parse_strings_and_specials() {
    check(
        "\"hi\" + !\"hi\"\n~8",
        expect![[r#"
            expr "hi" +_ !"hi"
            expr ~8"#]],
    );
}

#[test]
fn parse_error_unterminated_loop() {
    check(
        "loop i & xs\n1 ?",
        expect!["Error: Unterminated loop body: expected 'pool' at 2:4"],
    );
}

#[test]
fn parse_error_invalid_generator() {
    check(
        "[1, 2, 3 ,..]",
        expect!["Error: Invalid generator: expected '[value ,..]', '[first, second ,..]' or seeds followed by a function name at 1:1"],
    );
}

#[test]
fn parse_error_missing_value() {
    check(
        "1 + ",
        expect!["Error: Expected a value, found 'EOF' at 1:5"],
    );
}
