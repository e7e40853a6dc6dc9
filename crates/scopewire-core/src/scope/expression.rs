//! Scope expressions
//!
//! Small statement language used by event-handling directives, e.g.
//! `selected = pair; rates.del(pair)`. Names resolve against the scope chain
//! the expression is evaluated in.
//!
//! Supported syntax:
//!
//! - statements separated by `;`, the value of the last one is returned
//! - assignment to names, dotted paths and `container[index]`
//! - `||`, `&&`, `==`, `!=`, `+`, `-`, unary `!` and `-`
//! - member access, indexing and calls, including the container methods
//!   `push`, `unshift`, `pop`, `shift`, `splice`, `get`, `set` and `del`
//! - string, number, `true`/`false`/`null` and list literals
//!
//! The grammar is parsed with `nom` combinators. A syntax error reports the
//! byte offset where parsing stopped.

use std::fmt;
use std::rc::Rc;

use nom::{
	IResult, Parser,
	branch::alt,
	bytes::complete::{is_not, tag, take_while},
	character::complete::{anychar, char, digit1, one_of, satisfy},
	combinator::{eof, map, not, opt, recognize, value},
	error::{ErrorKind, ParseError},
	multi::{fold_many0, many0, many0_count, many1_count, separated_list0},
	sequence::{delimited, pair, preceded, terminated},
};

use crate::error::ExpressionError;
use crate::observer::Observer;
use crate::scope::Scope;
use crate::value::{Key, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogicalOp {
	Or,
	And,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
	Eq,
	Ne,
	Add,
	Sub,
}

#[derive(Debug, Clone, Copy)]
enum Operator {
	Logical(LogicalOp),
	Binary(BinaryOp),
}

impl Operator {
	fn apply(self, lhs: Expr, rhs: Expr) -> Expr {
		match self {
			Self::Logical(op) => Expr::Logical(op, Box::new(lhs), Box::new(rhs)),
			Self::Binary(op) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
		}
	}
}

#[derive(Debug, Clone)]
enum Expr {
	Literal(Value),
	Name(String),
	Member(Box<Expr>, String),
	Index(Box<Expr>, Box<Expr>),
	Call(Box<Expr>, Vec<Expr>),
	Not(Box<Expr>),
	Neg(Box<Expr>),
	Logical(LogicalOp, Box<Expr>, Box<Expr>),
	Binary(BinaryOp, Box<Expr>, Box<Expr>),
	List(Vec<Expr>),
}

impl Expr {
	/// Source-like rendering used in error messages.
	fn describe(&self) -> String {
		match self {
			Self::Literal(value) => value.to_display_string(),
			Self::Name(name) => name.clone(),
			Self::Member(base, name) => format!("{}.{name}", base.describe()),
			Self::Index(base, index) => format!("{}[{}]", base.describe(), index.describe()),
			Self::Call(callee, _) => format!("{}(..)", callee.describe()),
			Self::Not(inner) => format!("!{}", inner.describe()),
			Self::Neg(inner) => format!("-{}", inner.describe()),
			Self::Logical(..) | Self::Binary(..) => "<expression>".to_string(),
			Self::List(_) => "[..]".to_string(),
		}
	}

	fn is_assignable(&self) -> bool {
		matches!(self, Self::Name(_) | Self::Member(..) | Self::Index(..))
	}
}

#[derive(Debug, Clone)]
enum Statement {
	Expr(Expr),
	Assign(Expr, Expr),
}

/// Postfix operation applied to a primary expression
enum Suffix {
	Member(String),
	Call(Vec<Expr>),
	Index(Expr),
}

impl Suffix {
	fn apply(self, base: Expr) -> Expr {
		match self {
			Self::Member(name) => Expr::Member(Box::new(base), name),
			Self::Call(args) => Expr::Call(Box::new(base), args),
			Self::Index(index) => Expr::Index(Box::new(base), Box::new(index)),
		}
	}
}

// ============================================================================
// Nom Parsers
// ============================================================================

/// Parser error carrying the unparsed input, from which the position is
/// derived
#[derive(Debug)]
struct SyntaxError<'a> {
	input: &'a str,
	message: String,
}

impl<'a> SyntaxError<'a> {
	fn new(input: &'a str, message: impl Into<String>) -> Self {
		Self {
			input,
			message: message.into(),
		}
	}

	fn expected(input: &'a str, what: &str) -> Self {
		Self::new(input, format!("expected {what}, found {}", found(input)))
	}
}

impl<'a> ParseError<&'a str> for SyntaxError<'a> {
	fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
		Self::new(input, format!("unexpected {}", found(input)))
	}

	fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
		other
	}
}

fn found(input: &str) -> String {
	input
		.chars()
		.next()
		.map_or_else(|| "end of input".to_string(), |c| format!("`{c}`"))
}

type PResult<'a, O> = IResult<&'a str, O, SyntaxError<'a>>;

fn ws(input: &str) -> PResult<'_, &str> {
	take_while(|c: char| c.is_whitespace()).parse(input)
}

/// Skips leading whitespace before `parser`
fn token<'a, O>(
	parser: impl Parser<&'a str, Output = O, Error = SyntaxError<'a>>,
) -> impl Parser<&'a str, Output = O, Error = SyntaxError<'a>> {
	preceded(ws, parser)
}

/// Turns a recoverable error of `parser` into a failure naming `what` was
/// expected.
fn required<'a, O>(
	mut parser: impl Parser<&'a str, Output = O, Error = SyntaxError<'a>>,
	what: &'static str,
) -> impl FnMut(&'a str) -> PResult<'a, O> {
	move |input: &'a str| match parser.parse(input) {
		Err(nom::Err::Error(_)) => Err(nom::Err::Failure(SyntaxError::expected(input.trim_start(), what))),
		result => result,
	}
}

fn is_ident_start(c: char) -> bool {
	c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
	c.is_alphanumeric() || c == '_' || c == '$'
}

fn identifier(input: &str) -> PResult<'_, &str> {
	recognize(pair(satisfy(is_ident_start), take_while(is_ident_continue))).parse(input)
}

fn name_or_keyword(name: &str) -> Expr {
	match name {
		"true" => Expr::Literal(Value::Bool(true)),
		"false" => Expr::Literal(Value::Bool(false)),
		"null" | "undefined" => Expr::Literal(Value::Null),
		_ => Expr::Name(name.to_string()),
	}
}

fn number(input: &str) -> PResult<'_, Expr> {
	let (rest, literal) =
		recognize(pair(digit1, take_while(|c: char| c.is_ascii_digit() || c == '.'))).parse(input)?;
	match literal.parse::<f64>() {
		Ok(number) => Ok((rest, Expr::Literal(Value::Number(number)))),
		Err(_) => Err(nom::Err::Failure(SyntaxError::new(
			input,
			format!("invalid number `{literal}`"),
		))),
	}
}

/// Run of a string literal between escapes
enum Piece<'a> {
	Text(&'a str),
	Escape(char),
}

/// Single or double quoted string with `\n`, `\t` and literal escapes.
fn string(input: &str) -> PResult<'_, String> {
	let (body, quote) = one_of("'\"").parse(input)?;
	let stop = if quote == '"' { "\\\"" } else { "\\'" };
	let (rest, text) = fold_many0(
		alt((
			map(is_not(stop), Piece::Text),
			map(preceded(char('\\'), anychar), Piece::Escape),
		)),
		String::new,
		|mut text, piece| {
			match piece {
				Piece::Text(run) => text.push_str(run),
				Piece::Escape('n') => text.push('\n'),
				Piece::Escape('t') => text.push('\t'),
				Piece::Escape(other) => text.push(other),
			}
			text
		},
	)
	.parse(body)?;
	match char::<_, SyntaxError<'_>>(quote).parse(rest) {
		Ok((rest, _)) => Ok((rest, text)),
		Err(_) => Err(nom::Err::Failure(SyntaxError::new(input, "unterminated string literal"))),
	}
}

/// Comma separated expressions up to `close`
fn items<'a>(close: char, what: &'static str) -> impl Parser<&'a str, Output = Vec<Expr>, Error = SyntaxError<'a>> {
	terminated(
		separated_list0(token(char(',')), expression),
		required(token(char(close)), what),
	)
}

fn primary(input: &str) -> PResult<'_, Expr> {
	preceded(
		ws,
		alt((
			number,
			map(string, |text| Expr::Literal(Value::String(text))),
			map(identifier, name_or_keyword),
			delimited(
				char('('),
				required(expression, "an expression"),
				required(token(char(')')), "`)`"),
			),
			map(preceded(char('['), items(']', "`]`")), Expr::List),
		)),
	)
	.parse(input)
}

fn suffix(input: &str) -> PResult<'_, Suffix> {
	alt((
		map(
			preceded(
				token(char('.')),
				required(token(alt((identifier, digit1))), "a member name after `.`"),
			),
			|name: &str| Suffix::Member(name.to_string()),
		),
		map(preceded(token(char('(')), items(')', "`)`")), Suffix::Call),
		map(
			delimited(
				token(char('[')),
				required(expression, "an expression"),
				required(token(char(']')), "`]`"),
			),
			Suffix::Index,
		),
	))
	.parse(input)
}

fn postfix(input: &str) -> PResult<'_, Expr> {
	let (input, base) = primary(input)?;
	fold_many0(suffix, move || base.clone(), |expr, suffix| suffix.apply(expr)).parse(input)
}

fn unary(input: &str) -> PResult<'_, Expr> {
	alt((
		map(
			preceded(token(terminated(char('!'), not(char('=')))), required(unary, "an operand")),
			|inner| Expr::Not(Box::new(inner)),
		),
		map(
			preceded(token(char('-')), required(unary, "an operand")),
			|inner| Expr::Neg(Box::new(inner)),
		),
		postfix,
	))
	.parse(input)
}

/// Left-associative chain of `operand`s joined by `operator`
fn chain<'a>(
	input: &'a str,
	operand: fn(&'a str) -> PResult<'a, Expr>,
	operator: impl Parser<&'a str, Output = Operator, Error = SyntaxError<'a>>,
) -> PResult<'a, Expr> {
	let (input, first) = operand(input)?;
	fold_many0(
		pair(token(operator), required(operand, "an operand")),
		move || first.clone(),
		|lhs, (op, rhs)| op.apply(lhs, rhs),
	)
	.parse(input)
}

fn additive(input: &str) -> PResult<'_, Expr> {
	chain(
		input,
		unary,
		alt((
			value(Operator::Binary(BinaryOp::Add), char('+')),
			value(Operator::Binary(BinaryOp::Sub), char('-')),
		)),
	)
}

fn equality(input: &str) -> PResult<'_, Expr> {
	chain(
		input,
		additive,
		alt((
			value(Operator::Binary(BinaryOp::Eq), tag("==")),
			value(Operator::Binary(BinaryOp::Ne), tag("!=")),
		)),
	)
}

fn conjunction(input: &str) -> PResult<'_, Expr> {
	chain(input, equality, value(Operator::Logical(LogicalOp::And), tag("&&")))
}

fn expression(input: &str) -> PResult<'_, Expr> {
	chain(input, conjunction, value(Operator::Logical(LogicalOp::Or), tag("||")))
}

fn statement(input: &str) -> PResult<'_, Statement> {
	let (start, _) = ws(input)?;
	let (rest, target) = expression(start)?;
	let (rest, assignment) = opt(token(terminated(char('='), not(char('='))))).parse(rest)?;
	if assignment.is_none() {
		return Ok((rest, Statement::Expr(target)));
	}
	if !target.is_assignable() {
		return Err(nom::Err::Failure(SyntaxError::new(
			start,
			format!("cannot assign to `{}`", target.describe()),
		)));
	}
	let (rest, value) = required(expression, "an expression").parse(rest)?;
	Ok((rest, Statement::Assign(target, value)))
}

/// Statements separated by one or more `;`
fn program(input: &str) -> PResult<'_, Vec<Statement>> {
	let end_of_statement = required(
		alt((
			value((), many1_count(token(char(';')))),
			value((), preceded(ws, eof)),
		)),
		"`;`",
	);
	delimited(
		many0_count(token(char(';'))),
		many0(terminated(statement, end_of_statement)),
		required(preceded(ws, eof), "a statement"),
	)
	.parse(input)
}

/// A compiled statement list.
///
/// Compiling once and evaluating many times is cheap: clones share the
/// parsed statements.
#[derive(Clone)]
pub struct Expression {
	source: Rc<str>,
	statements: Rc<[Statement]>,
}

impl Expression {
	/// Parses `source`.
	pub fn compile(source: &str) -> Result<Self, ExpressionError> {
		let statements = match program(source) {
			Ok((_, statements)) => statements,
			Err(nom::Err::Error(error) | nom::Err::Failure(error)) => {
				return Err(ExpressionError::Parse {
					position: source.len() - error.input.len(),
					message: error.message,
				});
			}
			Err(nom::Err::Incomplete(_)) => {
				return Err(ExpressionError::Parse {
					position: source.len(),
					message: "incomplete expression".to_string(),
				});
			}
		};
		Ok(Self {
			source: source.into(),
			statements: statements.into(),
		})
	}

	/// The source the expression was compiled from.
	pub fn source(&self) -> &str {
		&self.source
	}

	/// Evaluates every statement against `scope` and returns the value of
	/// the last one (`null` for an empty expression).
	pub fn eval(&self, scope: &Scope) -> Result<Value, ExpressionError> {
		let mut last = Value::Null;
		for statement in self.statements.iter() {
			last = match statement {
				Statement::Expr(expr) => eval(expr, scope)?,
				Statement::Assign(target, value) => {
					let value = eval(value, scope)?;
					assign(target, value.clone(), scope)?;
					value
				}
			};
		}
		Ok(last)
	}
}

impl fmt::Debug for Expression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Expression")
			.field("source", &self.source)
			.field("statements", &self.statements.len())
			.finish()
	}
}

fn eval(expr: &Expr, scope: &Scope) -> Result<Value, ExpressionError> {
	match expr {
		Expr::Literal(value) => Ok(value.clone()),
		Expr::Name(name) => scope
			.lookup(name)
			.ok_or_else(|| ExpressionError::UnknownName(name.clone())),
		Expr::Member(base, name) => Ok(eval(base, scope)?.member(name).unwrap_or_default()),
		Expr::Index(base, index) => {
			let base = eval(base, scope)?;
			let index = eval(index, scope)?;
			Ok(base.member(&index.to_display_string()).unwrap_or_default())
		}
		Expr::Call(callee, args) => call(callee, args, scope),
		Expr::Not(inner) => Ok(Value::Bool(!eval(inner, scope)?.is_truthy())),
		Expr::Neg(inner) => Ok(Value::Number(-to_number(&eval(inner, scope)?))),
		Expr::Logical(op, lhs, rhs) => {
			let left = eval(lhs, scope)?;
			match (op, left.is_truthy()) {
				(LogicalOp::Or, true) | (LogicalOp::And, false) => Ok(left),
				_ => eval(rhs, scope),
			}
		}
		Expr::Binary(op, lhs, rhs) => Ok(binary(*op, eval(lhs, scope)?, eval(rhs, scope)?)),
		Expr::List(items) => items
			.iter()
			.map(|item| eval(item, scope))
			.collect::<Result<Vec<_>, _>>()
			.map(Value::List),
	}
}

fn to_number(value: &Value) -> f64 {
	match value {
		Value::Number(n) => *n,
		Value::Bool(b) => f64::from(u8::from(*b)),
		Value::Null => 0.0,
		Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
		_ => f64::NAN,
	}
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Value {
	match op {
		BinaryOp::Eq => Value::Bool(left == right),
		BinaryOp::Ne => Value::Bool(left != right),
		BinaryOp::Add => match (&left, &right) {
			(Value::Number(a), Value::Number(b)) => Value::Number(a + b),
			(Value::String(_), _) | (_, Value::String(_)) => {
				Value::String(left.to_display_string() + &right.to_display_string())
			}
			_ => Value::Number(to_number(&left) + to_number(&right)),
		},
		BinaryOp::Sub => Value::Number(to_number(&left) - to_number(&right)),
	}
}

fn call(callee: &Expr, args: &[Expr], scope: &Scope) -> Result<Value, ExpressionError> {
	let args = args
		.iter()
		.map(|arg| eval(arg, scope))
		.collect::<Result<Vec<_>, _>>()?;

	if let Expr::Member(base, method) = callee {
		let receiver = eval(base, scope)?;
		if let Some(Value::Function(function)) = receiver.member(method) {
			return Ok(function.call(&args)?);
		}
		if let Value::Container(container) = &receiver
			&& let Some(result) = container_method(container, method, &args)
		{
			return result;
		}
		return Err(ExpressionError::NotCallable(callee.describe()));
	}

	match eval(callee, scope)? {
		Value::Function(function) => Ok(function.call(&args)?),
		_ => Err(ExpressionError::NotCallable(callee.describe())),
	}
}

/// Built-in methods available on containers. Returns `None` for unknown
/// method names.
fn container_method(
	container: &Observer,
	method: &str,
	args: &[Value],
) -> Option<Result<Value, ExpressionError>> {
	let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
	let result = match method {
		"push" => container.push(arg(0)).map(Value::from),
		"unshift" => container.unshift(arg(0)).map(Value::from),
		"pop" => container.pop().map(Value::from),
		"shift" => container.shift().map(Value::from),
		"splice" => {
			let start = to_number(&arg(0)).max(0.0) as usize;
			let count = to_number(&arg(1)).max(0.0) as usize;
			let inserted = args.iter().skip(2).cloned();
			container.splice(start, count, inserted).map(Value::List)
		}
		"get" => Ok(container.get(value_key(&arg(0))).unwrap_or_default()),
		"set" => {
			container.set(value_key(&arg(0)), arg(1));
			Ok(arg(1))
		}
		"del" => Ok(container.del(value_key(&arg(0))).unwrap_or_default()),
		_ => return None,
	};
	Some(result.map_err(ExpressionError::from))
}

fn value_key(value: &Value) -> Key {
	match value {
		Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Key::Index(*n as usize),
		other => Key::Name(other.to_display_string()),
	}
}

fn assign(target: &Expr, value: Value, scope: &Scope) -> Result<(), ExpressionError> {
	match target {
		Expr::Name(name) => scope.assign(name, value),
		Expr::Member(base, name) => match eval(base, scope)? {
			Value::Container(container) => {
				container.set(name.as_str(), value);
				Ok(())
			}
			_ => Err(ExpressionError::NotAssignable(target.describe())),
		},
		Expr::Index(base, index) => {
			let base = eval(base, scope)?;
			let key = value_key(&eval(index, scope)?);
			match base {
				Value::Container(container) => {
					container.set(key, value);
					Ok(())
				}
				_ => Err(ExpressionError::NotAssignable(target.describe())),
			}
		}
		_ => Err(ExpressionError::NotAssignable(target.describe())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::CallbackError;
	use crate::value::ScopeFunction;
	use rstest::{fixture, rstest};
	use std::cell::RefCell;

	#[fixture]
	fn scope() -> Scope {
		let scope = Scope::new();
		scope.set("count", 2);
		scope.set("name", "EURUSD");
		scope.set("flag", false);
		scope.set("rates", Observer::sequence_from([1, 2]));
		scope
	}

	#[rstest]
	#[case("count + 1", Value::from(3))]
	#[case("count - 3", Value::from(-1))]
	#[case("name + '!'", Value::from("EURUSD!"))]
	#[case("count == 2", Value::from(true))]
	#[case("name != \"EURUSD\"", Value::from(false))]
	#[case("!flag", Value::from(true))]
	#[case("flag || name", Value::from("EURUSD"))]
	#[case("flag && missing", Value::from(false))]
	#[case("rates.length", Value::from(2))]
	#[case("rates[1]", Value::from(2))]
	#[case("-(count + 1)", Value::from(-3))]
	#[case("1; 2; 3", Value::from(3))]
	#[case(";; count ;", Value::from(2))]
	#[case("'it\\'s' + \"\\tx\"", Value::from("it's\tx"))]
	#[case("count == 2 && name == 'EURUSD'", Value::from(true))]
	#[case("true != null", Value::from(true))]
	#[case("", Value::Null)]
	fn test_eval(scope: Scope, #[case] source: &str, #[case] expected: Value) {
		// Act
		let value = scope.eval(source).unwrap();

		// Assert
		assert_eq!(value, expected);
	}

	#[rstest]
	fn test_assignment_updates_scope(scope: Scope) {
		// Act
		scope.eval("count = count + 1; label = name + ' ' + count").unwrap();

		// Assert
		assert_eq!(scope.get("count"), Some(Value::from(3)));
		assert_eq!(scope.get("label"), Some(Value::from("EURUSD 3")));
	}

	#[rstest]
	fn test_container_methods(scope: Scope) {
		// Act
		scope.eval("rates.push(3); rates.shift(); rates[0] = 20").unwrap();

		// Assert
		let rates = scope.get("rates").and_then(|v| v.as_container().cloned()).unwrap();
		assert_eq!(rates.values(), vec![Value::from(20), Value::from(3)]);
	}

	#[rstest]
	fn test_calls_scope_function_with_arguments(scope: Scope) {
		// Arrange
		let received = Rc::new(RefCell::new(Vec::new()));
		let sink = received.clone();
		scope.set(
			"addSymbol",
			ScopeFunction::action(move |args| sink.borrow_mut().extend_from_slice(args)),
		);

		// Act
		scope.eval("addSymbol(name, count)").unwrap();

		// Assert
		assert_eq!(*received.borrow(), vec![Value::from("EURUSD"), Value::from(2)]);
	}

	#[rstest]
	fn test_function_error_is_returned(scope: Scope) {
		// Arrange
		scope.set("fail", ScopeFunction::new(|_| Err(CallbackError::new("boom"))));

		// Act
		let result = scope.eval("fail()");

		// Assert
		assert_eq!(result, Err(ExpressionError::Function(CallbackError::new("boom"))));
	}

	#[rstest]
	#[case("missing + 1", ExpressionError::UnknownName("missing".to_string()))]
	#[case("count()", ExpressionError::NotCallable("count".to_string()))]
	#[case("rates.frobnicate()", ExpressionError::NotCallable("rates.frobnicate".to_string()))]
	fn test_evaluation_errors(scope: Scope, #[case] source: &str, #[case] expected: ExpressionError) {
		assert_eq!(scope.eval(source), Err(expected));
	}

	#[rstest]
	#[case("count +", 7)]
	#[case("(count", 6)]
	#[case("'open", 0)]
	#[case("1 = 2", 0)]
	#[case("a # b", 2)]
	#[case("rates.", 6)]
	#[case("[1, 2", 5)]
	#[case("count + -", 9)]
	#[case("a b", 2)]
	#[case("f(1,)", 3)]
	fn test_parse_errors_report_position(#[case] source: &str, #[case] expected_position: usize) {
		// Act
		let error = Expression::compile(source).unwrap_err();

		// Assert
		let ExpressionError::Parse { position, .. } = error else {
			panic!("expected a parse error, got {error:?}");
		};
		assert_eq!(position, expected_position);
	}

	#[rstest]
	fn test_nested_scope_resolves_parent_functions() {
		// Arrange
		let root = Scope::new();
		let calls = Rc::new(RefCell::new(0));
		let counter = calls.clone();
		root.set("select", ScopeFunction::action(move |_| *counter.borrow_mut() += 1));
		let item = Scope::child_of(&root);
		item.set("item", "GBPUSD");

		// Act
		item.eval("select(item)").unwrap();

		// Assert
		assert_eq!(*calls.borrow(), 1);
	}
}
