//! Lowering of the mago AST into the owned IR
//!
//! Operators are identified by their token text, and a few constructs are
//! taken apart from their source text and re-parsed as small fragments.

use crate::ir::{
    self, BinaryOp, CastKind, ExprKind, IncludeKind, InterpolatedPart, Stmt, StmtKind, UnaryOp,
};
use bumpalo::Bump;
use mago_database::file::FileId;
use mago_span::{HasSpan, Span};
use mago_syntax::ast::*;
use std::path::Path;
use std::rc::Rc;

/// Lower a parsed program into an owned [`ir::Program`]
pub fn lower_program(program: &Program<'_>, source: &str, path: &Path) -> ir::Program {
    let lowerer = Lowerer::new(source, path, 1);
    let statements = lowerer.lower_each(program.statements.iter());
    let mut functions = Vec::new();
    collect_functions(&statements, &mut functions);
    ir::Program {
        path: path.to_path_buf(),
        statements,
        functions,
    }
}

/// Function declarations that run unconditionally when the unit starts
fn collect_functions(statements: &[Stmt], out: &mut Vec<Rc<ir::FunctionDecl>>) {
    for stmt in statements {
        match &stmt.kind {
            StmtKind::Function(decl) => out.push(Rc::clone(decl)),
            StmtKind::Block(inner) => collect_functions(inner, out),
            _ => {}
        }
    }
}

struct Lowerer<'s> {
    source: &'s str,
    path: &'s Path,
    line_starts: Vec<usize>,
    first_line: u32,
}

impl<'s> Lowerer<'s> {
    fn new(source: &'s str, path: &'s Path, first_line: u32) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            source,
            path,
            line_starts,
            first_line,
        }
    }

    fn text(&self, span: Span) -> &'s str {
        &self.source[span.start.offset as usize..span.end.offset as usize]
    }

    fn line_of(&self, span: Span) -> u32 {
        let offset = span.start.offset as usize;
        let index = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        self.first_line + index as u32
    }

    // ==================== Statements ====================

    fn lower_each<'x, 'a: 'x>(&self, statements: impl IntoIterator<Item = &'x Statement<'a>>) -> Vec<Stmt> {
        statements.into_iter().map(|s| self.lower_stmt(s)).collect()
    }

    /// Lower a statement used as a body, unwrapping a braced block
    fn lower_body(&self, stmt: &Statement<'_>) -> Vec<Stmt> {
        match stmt {
            Statement::Block(block) => self.lower_each(block.statements.iter()),
            other => vec![self.lower_stmt(other)],
        }
    }

    fn lower_stmt(&self, stmt: &Statement<'_>) -> Stmt {
        let line = self.line_of(stmt.span());
        let kind = match stmt {
            Statement::Expression(expr_stmt) => StmtKind::Expr(self.lower_expr(&expr_stmt.expression)),
            Statement::Echo(echo) => {
                StmtKind::Echo(echo.values.iter().map(|v| self.lower_expr(v)).collect())
            }
            Statement::Block(block) => StmtKind::Block(self.lower_each(block.statements.iter())),
            Statement::If(if_stmt) => {
                let first = self.lower_expr(&if_stmt.condition);
                self.lower_if(first, &if_stmt.body)
            }
            Statement::While(while_stmt) => StmtKind::While {
                condition: self.lower_expr(&while_stmt.condition),
                body: match &while_stmt.body {
                    WhileBody::Statement(inner) => self.lower_body(inner),
                    WhileBody::ColonDelimited(block) => self.lower_each(block.statements.iter()),
                },
            },
            Statement::DoWhile(do_while) => StmtKind::DoWhile {
                body: self.lower_body(&do_while.statement),
                condition: self.lower_expr(&do_while.condition),
            },
            Statement::For(for_stmt) => StmtKind::For {
                init: for_stmt.initializations.iter().map(|e| self.lower_expr(e)).collect(),
                conditions: for_stmt.conditions.iter().map(|e| self.lower_expr(e)).collect(),
                step: for_stmt.increments.iter().map(|e| self.lower_expr(e)).collect(),
                body: match &for_stmt.body {
                    ForBody::Statement(inner) => self.lower_body(inner),
                    ForBody::ColonDelimited(block) => self.lower_each(block.statements.iter()),
                },
            },
            Statement::Foreach(foreach) => {
                let (key, value) = match &foreach.target {
                    ForeachTarget::KeyValue(kv) => {
                        (Some(self.lower_expr(&kv.key)), self.lower_expr(&kv.value))
                    }
                    ForeachTarget::Value(v) => (None, self.lower_expr(&v.value)),
                };
                StmtKind::Foreach {
                    subject: self.lower_expr(&foreach.expression),
                    key,
                    value,
                    body: match &foreach.body {
                        ForeachBody::Statement(inner) => self.lower_body(inner),
                        ForeachBody::ColonDelimited(block) => self.lower_each(block.statements.iter()),
                    },
                }
            }
            Statement::Switch(switch) => {
                let cases = match &switch.body {
                    SwitchBody::BraceDelimited(block) => {
                        block.cases.iter().map(|c| self.lower_case(c)).collect()
                    }
                    SwitchBody::ColonDelimited(block) => {
                        block.cases.iter().map(|c| self.lower_case(c)).collect()
                    }
                };
                StmtKind::Switch {
                    subject: self.lower_expr(&switch.expression),
                    cases,
                }
            }
            Statement::Break(break_stmt) => StmtKind::Break(self.lower_level(break_stmt.level.as_ref())),
            Statement::Continue(continue_stmt) => {
                StmtKind::Continue(self.lower_level(continue_stmt.level.as_ref()))
            }
            Statement::Return(ret) => StmtKind::Return(ret.value.as_ref().map(|v| self.lower_expr(v))),
            Statement::Function(func) => {
                let params = func
                    .parameter_list
                    .parameters
                    .iter()
                    .map(|param| ir::Param {
                        name: variable_name(param.variable.name),
                        default: if param.default_value.is_some() {
                            initializer_text(self.text(param.span()))
                                .and_then(|code| self.lower_fragment_expr(code, line))
                        } else {
                            None
                        },
                    })
                    .collect();
                StmtKind::Function(Rc::new(ir::FunctionDecl {
                    name: self.text(func.name.span).trim_start_matches('\\').to_string(),
                    params,
                    body: self.lower_each(func.body.statements.iter()),
                    line,
                }))
            }
            Statement::Global(global) => StmtKind::Global(
                global
                    .variables
                    .iter()
                    .map(|var| variable_name(self.text(var.span())))
                    .collect(),
            ),
            Statement::Static(static_stmt) => StmtKind::Static(
                static_stmt
                    .items
                    .iter()
                    .map(|item| {
                        let name = variable_name(self.text(item.variable().span()));
                        let initializer = initializer_text(self.text(item.span()))
                            .and_then(|code| self.lower_fragment_expr(code, line));
                        (name, initializer)
                    })
                    .collect(),
            ),
            Statement::Unset(_) => self.lower_unset(self.text(stmt.span()), line),
            Statement::Namespace(ns) => match &ns.body {
                NamespaceBody::Implicit(body) => StmtKind::Block(self.lower_each(body.statements.iter())),
                NamespaceBody::BraceDelimited(body) => {
                    StmtKind::Block(self.lower_each(body.statements.iter()))
                }
            },
            Statement::Try(try_stmt) => StmtKind::Try {
                body: self.lower_each(try_stmt.block.statements.iter()),
                finally: try_stmt
                    .finally_clause
                    .as_ref()
                    .map(|f| self.lower_each(f.block.statements.iter())),
            },
            Statement::Use(_) => StmtKind::Nop,
            _ => self.lower_other(stmt.span(), line),
        };
        Stmt::new(line, kind)
    }

    /// Statements told apart by their source text: tags, inline text and `const`
    fn lower_other(&self, span: Span, line: u32) -> StmtKind {
        let start = span.start.offset as usize;
        let raw = self.text(span);
        let text = raw.trim();
        let before = &self.source[..start];

        if text.starts_with("<?=") {
            return self.lower_echo_tag(text, line);
        }
        if text.is_empty() || text == ";" || text.starts_with("<?") || text.starts_with("?>") {
            return StmtKind::Nop;
        }
        if start == 0 || before.trim_end_matches(['\r', '\n']).ends_with("?>") {
            // a newline directly after `?>` belongs to the tag
            let inline = if before.ends_with("?>") {
                raw.strip_prefix("\r\n")
                    .or_else(|| raw.strip_prefix('\n'))
                    .unwrap_or(raw)
            } else {
                raw
            };
            return StmtKind::Inline(inline.to_string());
        }
        if let Some(rest) = strip_keyword(text, "const") {
            let items = split_top_level(rest.trim_end_matches(';'))
                .into_iter()
                .filter_map(|item| {
                    let (name, value) = item.split_once('=')?;
                    let value = self.lower_fragment_expr(value, line)?;
                    Some((name.trim().to_string(), value))
                })
                .collect();
            return StmtKind::Const(items);
        }
        StmtKind::Unsupported(first_line(text))
    }

    fn lower_if(&self, first: ir::Expr, body: &IfBody<'_>) -> StmtKind {
        let mut branches = Vec::new();
        let otherwise = match body {
            IfBody::Statement(stmt_body) => {
                branches.push((first, self.lower_body(stmt_body.statement)));
                for else_if in stmt_body.else_if_clauses.iter() {
                    branches.push((
                        self.lower_expr(&else_if.condition),
                        self.lower_body(else_if.statement),
                    ));
                }
                stmt_body
                    .else_clause
                    .as_ref()
                    .map(|clause| self.lower_body(clause.statement))
            }
            IfBody::ColonDelimited(block) => {
                branches.push((first, self.lower_each(block.statements.iter())));
                for else_if in block.else_if_clauses.iter() {
                    branches.push((
                        self.lower_expr(&else_if.condition),
                        self.lower_each(else_if.statements.iter()),
                    ));
                }
                block
                    .else_clause
                    .as_ref()
                    .map(|clause| self.lower_each(clause.statements.iter()))
            }
        };
        StmtKind::If { branches, otherwise }
    }

    fn lower_case(&self, case: &SwitchCase<'_>) -> ir::SwitchCase {
        let test = match case {
            SwitchCase::Expression(c) => Some(self.lower_expr(&c.expression)),
            SwitchCase::Default(_) => None,
        };
        ir::SwitchCase {
            test,
            body: self.lower_each(case.statements().iter()),
        }
    }

    fn lower_level(&self, level: Option<&Expression<'_>>) -> u32 {
        level
            .and_then(|expr| self.text(expr.span()).trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }

    /// `<?= a, b ?>` is `echo a, b;`
    fn lower_echo_tag(&self, text: &str, line: u32) -> StmtKind {
        let inner = text.trim().trim_start_matches("<?=");
        let inner = inner.trim_end();
        let inner = inner.strip_suffix("?>").unwrap_or(inner);
        let inner = inner.trim_end().trim_end_matches(';');
        match self.lower_fragment(&format!("echo {};", inner), line) {
            Some(stmt) => stmt.kind,
            None => StmtKind::Unsupported(first_line(text)),
        }
    }

    fn lower_unset(&self, text: &str, line: u32) -> StmtKind {
        let (Some(open), Some(close)) = (text.find('('), text.rfind(')')) else {
            return StmtKind::Unsupported(first_line(text));
        };
        if close <= open {
            return StmtKind::Unsupported(first_line(text));
        }
        let targets = split_top_level(&text[open + 1..close])
            .into_iter()
            .filter_map(|item| self.lower_fragment_expr(item, line))
            .collect();
        StmtKind::Unset(targets)
    }

    /// Parse and lower a standalone piece of PHP source
    fn lower_fragment(&self, code: &str, line: u32) -> Option<Stmt> {
        let wrapped = format!("<?php {}", code);
        let arena = Bump::new();
        let (program, error) =
            mago_syntax::parser::parse_file_content(&arena, FileId::new("fragment"), &wrapped);
        if error.is_some() {
            return None;
        }
        let nested = Lowerer::new(&wrapped, self.path, line);
        program
            .statements
            .iter()
            .map(|s| nested.lower_stmt(s))
            .find(|s| !matches!(s.kind, StmtKind::Nop))
    }

    fn lower_fragment_expr(&self, code: &str, line: u32) -> Option<ir::Expr> {
        let code = code.trim();
        if code.is_empty() {
            return None;
        }
        match self.lower_fragment(&format!("{};", code), line)?.kind {
            StmtKind::Expr(expr) => Some(expr),
            _ => None,
        }
    }

    // ==================== Expressions ====================

    fn lower_expr(&self, expr: &Expression<'_>) -> ir::Expr {
        let span = expr.span();
        let line = self.line_of(span);
        let text = self.text(span);
        let kind = match expr {
            Expression::Literal(literal) => self.lower_literal(literal, text, line),
            Expression::Parenthesized(paren) => return self.lower_expr(&paren.expression),
            Expression::Variable(Variable::Direct(_)) => ExprKind::Variable(variable_name(text)),
            Expression::ArrayAccess(access) => ExprKind::ArrayAccess {
                array: Box::new(self.lower_expr(&access.array)),
                index: Some(Box::new(self.lower_expr(&access.index))),
            },
            Expression::Array(array) => ExprKind::Array(
                array
                    .elements
                    .iter()
                    .filter_map(|element| self.lower_array_element(element))
                    .collect(),
            ),
            Expression::LegacyArray(array) => ExprKind::Array(
                array
                    .elements
                    .iter()
                    .filter_map(|element| self.lower_array_element(element))
                    .collect(),
            ),
            Expression::Identifier(_) | Expression::ConstantAccess(_) => {
                ExprKind::Constant(text.trim().trim_start_matches('\\').to_string())
            }
            Expression::MagicConstant(magic) => match magic {
                MagicConstant::File(_) => ExprKind::Str(self.path.display().to_string()),
                MagicConstant::Directory(_) => ExprKind::Str(
                    self.path
                        .parent()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| ".".to_string()),
                ),
                _ if text.trim().eq_ignore_ascii_case("__LINE__") => ExprKind::Int(i64::from(line)),
                _ => ExprKind::Constant(text.trim().to_string()),
            },
            Expression::Binary(binary) => match BinaryOp::from_token(self.text(binary.operator.span())) {
                Some(op) => ExprKind::Binary {
                    op,
                    lhs: Box::new(self.lower_expr(&binary.lhs)),
                    rhs: Box::new(self.lower_expr(&binary.rhs)),
                },
                None => ExprKind::Unsupported,
            },
            Expression::UnaryPrefix(unary) => {
                let token = self.text(unary.operator.span()).trim();
                let operand = self.lower_expr(&unary.operand);
                match token {
                    "!" => unary_kind(UnaryOp::Not, operand),
                    "-" => unary_kind(UnaryOp::Negate, operand),
                    "+" => unary_kind(UnaryOp::Plus, operand),
                    "~" => unary_kind(UnaryOp::BitNot, operand),
                    "++" | "--" => ExprKind::IncDec {
                        increment: token == "++",
                        prefix: true,
                        target: Box::new(operand),
                    },
                    "@" | "&" => operand.kind,
                    other => match CastKind::from_token(other) {
                        Some(kind) => ExprKind::Cast {
                            kind,
                            operand: Box::new(operand),
                        },
                        None => ExprKind::Unsupported,
                    },
                }
            }
            Expression::UnaryPostfix(unary) => match self.text(unary.operator.span()).trim() {
                token @ ("++" | "--") => ExprKind::IncDec {
                    increment: token == "++",
                    prefix: false,
                    target: Box::new(self.lower_expr(&unary.operand)),
                },
                _ => ExprKind::Unsupported,
            },
            Expression::Assignment(assign) => {
                let token = self.text(assign.operator.span()).trim();
                let op = match token {
                    "=" => None,
                    compound => match compound.strip_suffix('=').and_then(BinaryOp::from_token) {
                        Some(op) => Some(op),
                        None => {
                            return ir::Expr::new(line, text, ExprKind::Unsupported);
                        }
                    },
                };
                ExprKind::Assign {
                    target: Box::new(self.lower_expr(&assign.lhs)),
                    op,
                    value: Box::new(self.lower_expr(&assign.rhs)),
                }
            }
            Expression::Conditional(ternary) => ExprKind::Ternary {
                condition: Box::new(self.lower_expr(&ternary.condition)),
                then: ternary.then.as_ref().map(|t| Box::new(self.lower_expr(t))),
                otherwise: Box::new(self.lower_expr(&ternary.r#else)),
            },
            Expression::Call(Call::Function(call)) => {
                if matches!(call.function, Expression::Identifier(_)) {
                    ExprKind::Call {
                        name: self
                            .text(call.function.span())
                            .trim()
                            .trim_start_matches('\\')
                            .to_string(),
                        args: call
                            .argument_list
                            .arguments
                            .iter()
                            .map(|arg| self.lower_expr(arg.value()))
                            .collect(),
                    }
                } else {
                    ExprKind::Unsupported
                }
            }
            Expression::Construct(construct) => match construct {
                Construct::Isset(isset) => {
                    ExprKind::Isset(isset.values.iter().map(|v| self.lower_expr(v)).collect())
                }
                Construct::Empty(empty) => ExprKind::Empty(Box::new(self.lower_expr(&empty.value))),
                Construct::Include(inc) => self.lower_include(IncludeKind::Include, &inc.value),
                Construct::IncludeOnce(inc) => self.lower_include(IncludeKind::IncludeOnce, &inc.value),
                Construct::Require(req) => self.lower_include(IncludeKind::Require, &req.value),
                Construct::RequireOnce(req) => self.lower_include(IncludeKind::RequireOnce, &req.value),
                _ => self.lower_construct_text(text, line),
            },
            _ => self.lower_append(text, line),
        };
        ir::Expr::new(line, text, kind)
    }

    /// `$a[]` as a write target
    fn lower_append(&self, text: &str, line: u32) -> ExprKind {
        let base = text
            .trim_end()
            .strip_suffix(']')
            .map(str::trim_end)
            .and_then(|b| b.strip_suffix('['));
        match base.and_then(|b| self.lower_fragment_expr(b, line)) {
            Some(array) => ExprKind::ArrayAccess {
                array: Box::new(array),
                index: None,
            },
            None => ExprKind::Unsupported,
        }
    }

    fn lower_include(&self, kind: IncludeKind, target: &Expression<'_>) -> ExprKind {
        ExprKind::Include {
            kind,
            target: Box::new(self.lower_expr(target)),
        }
    }

    /// `exit`, `die` and `print`, taken apart from their source text
    fn lower_construct_text(&self, text: &str, line: u32) -> ExprKind {
        let trimmed = text.trim();
        let lower = trimmed.to_ascii_lowercase();
        let keyword = ["exit", "die", "print"]
            .into_iter()
            .find(|k| lower.starts_with(k));
        match keyword {
            Some("print") => match self.lower_fragment_expr(&trimmed[5..], line) {
                Some(value) => ExprKind::Print(Box::new(value)),
                None => ExprKind::Unsupported,
            },
            Some(k) => {
                let rest = trimmed[k.len()..].trim();
                let argument = rest
                    .strip_prefix('(')
                    .and_then(|r| r.strip_suffix(')'))
                    .and_then(|inner| self.lower_fragment_expr(inner, line));
                ExprKind::Exit(argument.map(Box::new))
            }
            None => ExprKind::Unsupported,
        }
    }

    fn lower_array_element(&self, element: &ArrayElement<'_>) -> Option<ir::ArrayItem> {
        match element {
            ArrayElement::KeyValue(kv) => Some(ir::ArrayItem {
                key: Some(self.lower_expr(&kv.key)),
                value: self.lower_expr(&kv.value),
            }),
            ArrayElement::Value(v) => Some(ir::ArrayItem {
                key: None,
                value: self.lower_expr(&v.value),
            }),
            _ => None,
        }
    }

    fn lower_literal(&self, literal: &Literal<'_>, text: &str, line: u32) -> ExprKind {
        match literal {
            Literal::True(_) => ExprKind::Bool(true),
            Literal::False(_) => ExprKind::Bool(false),
            Literal::Null(_) => ExprKind::Null,
            Literal::Integer(_) => match parse_int(text) {
                Some(n) => ExprKind::Int(n),
                None => parse_float(text).map_or(ExprKind::Unsupported, ExprKind::Float),
            },
            Literal::Float(_) => parse_float(text).map_or(ExprKind::Unsupported, ExprKind::Float),
            Literal::String(_) => match unquote(text) {
                Some(value) => ExprKind::Str(value),
                None => ExprKind::Unsupported,
            },
            _ => self.lower_composite_string(text, line),
        }
    }

    /// Double-quoted and heredoc strings with embedded variables
    fn lower_composite_string(&self, text: &str, line: u32) -> ExprKind {
        let trimmed = text.trim();
        let (body, interpolate) = if let Some(rest) = trimmed.strip_prefix("<<<") {
            match heredoc_body(rest) {
                Some(body) => body,
                None => return ExprKind::Unsupported,
            }
        } else if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            (trimmed[1..trimmed.len() - 1].to_string(), true)
        } else {
            return ExprKind::Unsupported;
        };
        if !interpolate {
            return ExprKind::Str(body);
        }

        let mut parts = Vec::new();
        for piece in split_interpolation(&body) {
            match piece {
                Piece::Text(t) => match parts.last_mut() {
                    Some(InterpolatedPart::Text(prev)) => prev.push_str(&t),
                    _ => parts.push(InterpolatedPart::Text(t)),
                },
                Piece::Code(code) => match self.lower_fragment_expr(&code, line) {
                    Some(expr) => parts.push(InterpolatedPart::Expr(expr)),
                    None => parts.push(InterpolatedPart::Text(code)),
                },
            }
        }
        match parts.as_slice() {
            [] => ExprKind::Str(String::new()),
            [InterpolatedPart::Text(t)] => ExprKind::Str(t.clone()),
            _ => ExprKind::Interpolated(parts),
        }
    }
}

fn unary_kind(op: UnaryOp, operand: ir::Expr) -> ExprKind {
    ExprKind::Unary {
        op,
        operand: Box::new(operand),
    }
}

fn variable_name(text: &str) -> String {
    text.trim().trim_start_matches('$').to_string()
}

fn strip_keyword<'t>(text: &'t str, keyword: &str) -> Option<&'t str> {
    let head = text.get(..keyword.len())?;
    let rest = &text[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace)).then_some(rest)
}

fn first_line(text: &str) -> String {
    text.trim().lines().next().unwrap_or_default().to_string()
}

/// The right-hand side of `name = value`
fn initializer_text(text: &str) -> Option<&str> {
    let (_, value) = text.split_once('=')?;
    Some(value.trim().trim_end_matches(';'))
}

/// Split on commas outside of brackets and quotes
fn split_top_level(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                items.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    items
}

pub(crate) fn parse_int(text: &str) -> Option<i64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if lower.len() > 1 && lower.starts_with('0') {
        i64::from_str_radix(&lower[1..], 8).ok()
    } else {
        lower.parse().ok()
    }
}

fn parse_float(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
    cleaned.parse().ok()
}

/// Value of a quoted string literal without interpolation
fn unquote(text: &str) -> Option<String> {
    let text = text.trim();
    if text.len() < 2 {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    if text.starts_with('\'') && text.ends_with('\'') {
        Some(unescape_single(inner))
    } else if text.starts_with('"') && text.ends_with('"') {
        Some(unescape_double(inner))
    } else {
        None
    }
}

fn unescape_single(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '\'' || next == '\\' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn unescape_double(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('n') => push_escaped(&mut out, &mut chars, '\n'),
            Some('t') => push_escaped(&mut out, &mut chars, '\t'),
            Some('r') => push_escaped(&mut out, &mut chars, '\r'),
            Some('v') => push_escaped(&mut out, &mut chars, '\u{0b}'),
            Some('e') => push_escaped(&mut out, &mut chars, '\u{1b}'),
            Some('f') => push_escaped(&mut out, &mut chars, '\u{0c}'),
            Some('\\') => push_escaped(&mut out, &mut chars, '\\'),
            Some('$') => push_escaped(&mut out, &mut chars, '$'),
            Some('"') => push_escaped(&mut out, &mut chars, '"'),
            Some('x') => {
                chars.next();
                let mut digits = String::new();
                while digits.len() < 2 && chars.peek().is_some_and(|d| d.is_ascii_hexdigit()) {
                    digits.extend(chars.next());
                }
                match u8::from_str_radix(&digits, 16) {
                    Ok(byte) => out.push(char::from(byte)),
                    Err(_) => out.push_str("\\x"),
                }
            }
            Some(d) if d.is_digit(8) => {
                let mut digits = String::new();
                while digits.len() < 3 && chars.peek().is_some_and(|d| d.is_digit(8)) {
                    digits.extend(chars.next());
                }
                match u8::from_str_radix(&digits, 8) {
                    Ok(byte) => out.push(char::from(byte)),
                    Err(_) => out.push('\\'),
                }
            }
            _ => out.push('\\'),
        }
    }
    out
}

fn push_escaped(out: &mut String, chars: &mut std::iter::Peekable<std::str::Chars<'_>>, value: char) {
    chars.next();
    out.push(value);
}

/// Body of a heredoc after `<<<`, and whether it interpolates
fn heredoc_body(rest: &str) -> Option<(String, bool)> {
    let (header, body) = rest.split_once('\n')?;
    let header = header.trim();
    let nowdoc = header.starts_with('\'');
    let mut lines: Vec<&str> = body.lines().collect();
    let closing = lines.pop()?;
    let indent = closing.len() - closing.trim_start().len();
    let content: Vec<&str> = lines
        .iter()
        .map(|line| if line.len() >= indent { &line[indent..] } else { line.trim_start() })
        .collect();
    Some((content.join("\n"), !nowdoc))
}

enum Piece {
    Text(String),
    Code(String),
}

/// Split an interpolating string body into text and embedded expressions
fn split_interpolation(body: &str) -> Vec<Piece> {
    let chars: Vec<char> = body.chars().collect();
    let mut pieces = Vec::new();
    let mut raw = String::new();
    let mut i = 0;

    let flush = |raw: &mut String, pieces: &mut Vec<Piece>| {
        if !raw.is_empty() {
            pieces.push(Piece::Text(unescape_double(raw)));
            raw.clear();
        }
    };

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            raw.push(c);
            raw.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if c == '{' && chars.get(i + 1) == Some(&'$') {
            if let Some(end) = matching_brace(&chars, i) {
                flush(&mut raw, &mut pieces);
                pieces.push(Piece::Code(chars[i + 1..end].iter().collect()));
                i = end + 1;
                continue;
            }
        }
        if c == '$' && chars.get(i + 1) == Some(&'{') {
            if let Some(end) = matching_brace(&chars, i + 1) {
                flush(&mut raw, &mut pieces);
                let name: String = chars[i + 2..end].iter().collect();
                pieces.push(Piece::Code(format!("${}", name.trim())));
                i = end + 1;
                continue;
            }
        }
        if c == '$' && chars.get(i + 1).is_some_and(|n| n.is_alphabetic() || *n == '_') {
            flush(&mut raw, &mut pieces);
            let mut j = i + 1;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let mut code: String = chars[i..j].iter().collect();
            if chars.get(j) == Some(&'[') {
                if let Some(close) = chars[j..].iter().position(|c| *c == ']').map(|p| p + j) {
                    let key: String = chars[j + 1..close].iter().collect();
                    let key = key.trim();
                    let is_name = key.chars().next().is_some_and(|k| k.is_alphabetic() || k == '_');
                    if is_name {
                        code.push_str(&format!("['{}']", key));
                    } else {
                        code.push_str(&format!("[{}]", key));
                    }
                    j = close + 1;
                }
            }
            pieces.push(Piece::Code(code));
            i = j;
            continue;
        }
        raw.push(c);
        i += 1;
    }
    flush(&mut raw, &mut pieces);
    pieces
}

fn matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0;
    for (offset, c) in chars[open..].iter().enumerate() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(source: &str) -> ir::Program {
        let arena = Bump::new();
        let path = Path::new("/app/index.php");
        let (program, error) =
            mago_syntax::parser::parse_file_content(&arena, FileId::new("index.php"), source);
        assert!(error.is_none(), "fixture must parse");
        lower_program(program, source, path)
    }

    fn php_statements(program: &ir::Program) -> Vec<&StmtKind> {
        program
            .statements
            .iter()
            .map(|s| &s.kind)
            .filter(|k| !matches!(k, StmtKind::Nop))
            .collect()
    }

    #[test]
    fn test_lower_if_else() {
        let program = lower("<?php\nif (cond) { echo \"A\"; } else { echo \"B\"; }\n");
        let statements = php_statements(&program);
        let StmtKind::If { branches, otherwise } = statements[0] else {
            panic!("expected if, got {:?}", statements[0]);
        };
        assert_eq!(branches.len(), 1);
        assert!(matches!(&branches[0].0.kind, ExprKind::Constant(name) if name == "cond"));
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_elseif_chain() {
        let program = lower("<?php\nif ($a) { echo 1; } elseif ($b) { echo 2; } else { echo 3; }\n");
        let statements = php_statements(&program);
        let StmtKind::If { branches, otherwise } = statements[0] else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_functions_are_collected() {
        let program = lower("<?php\nfunction greet($name, $greeting = 'Hi') { return $greeting . $name; }\n");
        assert_eq!(program.functions.len(), 1);
        let decl = &program.functions[0];
        assert_eq!(decl.name, "greet");
        assert_eq!(decl.params.len(), 2);
        assert_eq!(decl.params[0].name, "name");
        assert!(decl.params[1].default.is_some());
    }

    #[test]
    fn test_operators_from_tokens() {
        let program = lower("<?php\n$x = $a . 'b';\n$y .= 'c';\n$i++;\n");
        let statements = php_statements(&program);
        let StmtKind::Expr(expr) = statements[0] else {
            panic!("expected expression statement");
        };
        let ExprKind::Assign { op: None, value, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Binary { op: BinaryOp::Concat, .. }));

        let StmtKind::Expr(compound) = statements[1] else {
            panic!("expected expression statement");
        };
        assert!(matches!(compound.kind, ExprKind::Assign { op: Some(BinaryOp::Concat), .. }));

        let StmtKind::Expr(increment) = statements[2] else {
            panic!("expected expression statement");
        };
        assert!(matches!(
            increment.kind,
            ExprKind::IncDec { increment: true, prefix: false, .. }
        ));
    }

    #[test]
    fn test_magic_constants_resolve_to_paths() {
        let program = lower("<?php\nrequire __DIR__ . '/lib.php';\n");
        let statements = php_statements(&program);
        let StmtKind::Expr(expr) = statements[0] else {
            panic!("expected expression statement");
        };
        let ExprKind::Include { kind, target } = &expr.kind else {
            panic!("expected include");
        };
        assert_eq!(*kind, IncludeKind::Require);
        let ExprKind::Binary { lhs, .. } = &target.kind else {
            panic!("expected concatenation");
        };
        assert!(matches!(&lhs.kind, ExprKind::Str(dir) if dir == "/app"));
    }

    #[test]
    fn test_line_numbers() {
        let program = lower("<?php\n\necho 'a';\n\necho 'b';\n");
        let lines: Vec<u32> = program
            .statements
            .iter()
            .filter(|s| matches!(s.kind, StmtKind::Echo(_)))
            .map(|s| s.line)
            .collect();
        assert_eq!(lines, vec![3, 5]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(unquote("'it\\'s'"), Some("it's".to_string()));
        assert_eq!(unquote("\"a\\tb\\n\""), Some("a\tb\n".to_string()));
        assert_eq!(unquote("'\\n'"), Some("\\n".to_string()));
    }

    #[test]
    fn test_split_interpolation() {
        let pieces = split_interpolation("Hi $name, {$user['id']} and $row[key]!");
        let rendered: Vec<String> = pieces
            .iter()
            .map(|p| match p {
                Piece::Text(t) => format!("T:{}", t),
                Piece::Code(c) => format!("C:{}", c),
            })
            .collect();
        assert_eq!(
            rendered,
            vec!["T:Hi ", "C:$name", "T:, ", "C:$user['id']", "T: and ", "C:$row['key']", "T:!"]
        );
    }

    #[test]
    fn test_int_literals() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("0x1F"), Some(31));
        assert_eq!(parse_int("0b101"), Some(5));
        assert_eq!(parse_int("017"), Some(15));
        assert_eq!(parse_int("1_000"), Some(1000));
    }

    #[test]
    fn test_heredoc_body() {
        let (body, interpolate) = heredoc_body("EOT\n    Hello\n      World\n    EOT").unwrap();
        assert_eq!(body, "Hello\n  World");
        assert!(interpolate);
        let (_, nowdoc) = heredoc_body("'EOT'\nraw\nEOT").unwrap();
        assert!(!nowdoc);
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("$a, $b['x,y'], f($c, $d)"), vec!["$a", "$b['x,y']", "f($c, $d)"]);
    }
}
