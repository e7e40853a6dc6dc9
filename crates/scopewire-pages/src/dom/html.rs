//! HTML fragment parsing and escaping
//!
//! The parser is lenient in the way browsers are: unknown closing tags are
//! ignored, unclosed elements are closed at the end of input and void
//! elements never take children. Only input that cannot be tokenized at all
//! (an unterminated tag, comment or quoted attribute) is an error.
//!
//! Tokens are read with `nom` combinators; a small stack then builds the
//! tree from them.

use nom::{
	IResult, Parser,
	branch::alt,
	bytes::complete::{tag, take_till, take_till1, take_until, take_while},
	character::complete::{anychar, char, one_of, satisfy},
	combinator::{map, not, opt, recognize, value},
	error::{ErrorKind, ParseError},
	multi::many0,
	sequence::{pair, preceded, terminated},
};

use crate::error::DomError;

/// Parsed node, detached from any document
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fragment {
	Element {
		tag: String,
		attributes: Vec<(String, String)>,
		children: Vec<Fragment>,
	},
	Text(String),
	Comment(String),
}

const VOID_ELEMENTS: &[&str] = &[
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
	"wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub(crate) fn is_void(tag: &str) -> bool {
	VOID_ELEMENTS.contains(&tag)
}

pub(crate) fn is_raw_text(tag: &str) -> bool {
	RAW_TEXT_ELEMENTS.contains(&tag)
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
	Comment(&'a str),
	/// `<!doctype ...>` or `<?...?>`, dropped
	Declaration,
	EndTag(String),
	StartTag {
		tag: String,
		attributes: Vec<(String, String)>,
		self_closing: bool,
	},
	Text(&'a str),
}

#[derive(Debug)]
struct MarkupError<'a> {
	input: &'a str,
	message: &'static str,
}

impl<'a> ParseError<&'a str> for MarkupError<'a> {
	fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
		Self {
			input,
			message: "unexpected input",
		}
	}

	fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
		other
	}
}

type MResult<'a, O> = IResult<&'a str, O, MarkupError<'a>>;

/// Reports any error inside a construct as a failure at its `start`. A
/// failure raised further in keeps its message.
fn unterminated<'a>(
	start: &'a str,
	message: &'static str,
) -> impl FnOnce(nom::Err<MarkupError<'a>>) -> nom::Err<MarkupError<'a>> {
	move |error| {
		let message = match error {
			nom::Err::Failure(inner) => inner.message,
			_ => message,
		};
		nom::Err::Failure(MarkupError { input: start, message })
	}
}

fn ws(input: &str) -> MResult<'_, &str> {
	take_while(|c: char| c.is_ascii_whitespace()).parse(input)
}

fn is_name_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

fn comment(input: &str) -> MResult<'_, Token<'_>> {
	let (body, _) = tag("<!--").parse(input)?;
	let (rest, text) = terminated(take_until("-->"), tag("-->"))
		.parse(body)
		.map_err(unterminated(input, "unterminated comment"))?;
	Ok((rest, Token::Comment(text)))
}

fn declaration(input: &str) -> MResult<'_, Token<'_>> {
	let (body, _) = alt((tag("<!"), tag("<?"))).parse(input)?;
	let (rest, _) = terminated(take_until(">"), char('>'))
		.parse(body)
		.map_err(unterminated(input, "unterminated declaration"))?;
	Ok((rest, Token::Declaration))
}

fn end_tag(input: &str) -> MResult<'_, Token<'_>> {
	let (rest, name) = preceded(tag("</"), take_while(is_name_char)).parse(input)?;
	let (rest, _) = terminated(take_until(">"), char('>'))
		.parse(rest)
		.map_err(unterminated(input, "unterminated end tag"))?;
	Ok((rest, Token::EndTag(name.to_ascii_lowercase())))
}

fn quoted_value(input: &str) -> MResult<'_, String> {
	let (body, quote) = one_of("\"'").parse(input)?;
	let (rest, text) = terminated(take_till(|c: char| c == quote), char(quote))
		.parse(body)
		.map_err(unterminated(input, "unterminated attribute value"))?;
	Ok((rest, decode_entities(text)))
}

fn attribute(input: &str) -> MResult<'_, (String, String)> {
	let (rest, name) =
		take_till1(|c: char| c.is_ascii_whitespace() || matches!(c, '=' | '>' | '/')).parse(input)?;
	let unquoted = map(take_till(|c: char| c.is_ascii_whitespace() || c == '>'), decode_entities);
	let (rest, value) = opt(preceded((ws, char('='), ws), alt((quoted_value, unquoted)))).parse(rest)?;
	Ok((rest, (name.to_ascii_lowercase(), value.unwrap_or_default())))
}

/// One item inside a start tag. A lone `/` or a stray `=` yields nothing.
fn tag_item(input: &str) -> MResult<'_, Option<(String, String)>> {
	preceded(
		ws,
		alt((
			map(attribute, Some),
			value(None, terminated(char('/'), not(char('>')))),
			value(None, char('=')),
		)),
	)
	.parse(input)
}

fn start_tag(input: &str) -> MResult<'_, Token<'_>> {
	let (rest, name) = preceded(
		char('<'),
		recognize(pair(satisfy(|c: char| c.is_ascii_alphabetic()), take_while(is_name_char))),
	)
	.parse(input)?;
	let (rest, (items, self_closing)) = (
		many0(tag_item),
		preceded(ws, alt((value(false, char('>')), value(true, tag("/>"))))),
	)
		.parse(rest)
		.map_err(unterminated(input, "unterminated start tag"))?;

	let mut attributes: Vec<(String, String)> = Vec::new();
	for (name, value) in items.into_iter().flatten() {
		if !attributes.iter().any(|(existing, _)| *existing == name) {
			attributes.push((name, value));
		}
	}
	Ok((
		rest,
		Token::StartTag {
			tag: name.to_ascii_lowercase(),
			attributes,
			self_closing,
		},
	))
}

/// Text up to the next `<`. The first character is always taken, so a `<`
/// that opens no tag becomes text.
fn text(input: &str) -> MResult<'_, Token<'_>> {
	map(recognize(pair(anychar, take_till(|c: char| c == '<'))), Token::Text).parse(input)
}

fn token(input: &str) -> MResult<'_, Token<'_>> {
	alt((comment, declaration, end_tag, start_tag, text)).parse(input)
}

/// Content of a `script` or `style` element, up to its end tag in any case.
/// Returns the input after the end tag and the raw content.
fn raw_text<'a>(input: &'a str, tag: &str) -> (&'a str, &'a str) {
	let closing = format!("</{tag}");
	let end = input.to_ascii_lowercase().find(&closing).unwrap_or(input.len());
	let (content, rest) = input.split_at(end);
	let rest = rest.find('>').map_or(rest, |close| &rest[close + 1..]);
	(rest, content)
}

// ============================================================================
// Tree building
// ============================================================================

struct OpenElement {
	tag: String,
	attributes: Vec<(String, String)>,
	children: Vec<Fragment>,
}

#[derive(Default)]
struct TreeBuilder {
	stack: Vec<OpenElement>,
	roots: Vec<Fragment>,
}

impl TreeBuilder {
	fn siblings(&mut self) -> &mut Vec<Fragment> {
		match self.stack.last_mut() {
			Some(open) => &mut open.children,
			None => &mut self.roots,
		}
	}

	fn push(&mut self, fragment: Fragment) {
		self.siblings().push(fragment);
	}

	/// Appends text, merging it with a preceding text node.
	fn text(&mut self, text: String) {
		let siblings = self.siblings();
		if let Some(Fragment::Text(previous)) = siblings.last_mut() {
			previous.push_str(&text);
		} else {
			siblings.push(Fragment::Text(text));
		}
	}

	fn open(&mut self, tag: String, attributes: Vec<(String, String)>) {
		self.stack.push(OpenElement {
			tag,
			attributes,
			children: Vec::new(),
		});
	}

	fn close_top(&mut self) {
		if let Some(open) = self.stack.pop() {
			self.push(Fragment::Element {
				tag: open.tag,
				attributes: open.attributes,
				children: open.children,
			});
		}
	}

	/// Closes `tag` and everything opened inside it; unknown tags are ignored.
	fn close(&mut self, tag: &str) {
		if let Some(depth) = self.stack.iter().rposition(|open| open.tag == tag) {
			while self.stack.len() > depth {
				self.close_top();
			}
		}
	}

	fn finish(mut self) -> Vec<Fragment> {
		while !self.stack.is_empty() {
			self.close_top();
		}
		self.roots
	}
}

/// Parses an HTML fragment into detached nodes.
pub(crate) fn parse(input: &str) -> Result<Vec<Fragment>, DomError> {
	let mut tree = TreeBuilder::default();
	let mut rest = input;
	while !rest.is_empty() {
		let (next, token) = token(rest).map_err(|error| match error {
			nom::Err::Error(error) | nom::Err::Failure(error) => DomError::Parse {
				position: input.len() - error.input.len(),
				message: error.message.to_string(),
			},
			nom::Err::Incomplete(_) => DomError::Parse {
				position: input.len(),
				message: "incomplete markup".to_string(),
			},
		})?;
		rest = next;
		match token {
			Token::Comment(body) => tree.push(Fragment::Comment(body.to_string())),
			Token::Declaration => {}
			Token::EndTag(tag) => tree.close(&tag),
			Token::Text(text) => tree.text(decode_entities(text)),
			Token::StartTag {
				tag,
				attributes,
				self_closing,
			} => {
				if self_closing || is_void(&tag) {
					tree.push(Fragment::Element {
						tag,
						attributes,
						children: Vec::new(),
					});
				} else if is_raw_text(&tag) {
					let (next, content) = raw_text(rest, &tag);
					rest = next;
					let children = if content.is_empty() {
						Vec::new()
					} else {
						vec![Fragment::Text(content.to_string())]
					};
					tree.push(Fragment::Element {
						tag,
						attributes,
						children,
					});
				} else {
					tree.open(tag, attributes);
				}
			}
		}
	}
	Ok(tree.finish())
}

/// Decodes the character references used in practice.
pub(crate) fn decode_entities(input: &str) -> String {
	if !input.contains('&') {
		return input.to_string();
	}
	let mut out = String::with_capacity(input.len());
	let mut rest = input;
	while let Some(amp) = rest.find('&') {
		out.push_str(&rest[..amp]);
		rest = &rest[amp..];
		let decoded = rest.find(';').filter(|&end| end <= 10).and_then(|end| {
			let entity = &rest[1..end];
			let c = match entity {
				"amp" => Some('&'),
				"lt" => Some('<'),
				"gt" => Some('>'),
				"quot" => Some('"'),
				"apos" => Some('\''),
				"nbsp" => Some('\u{a0}'),
				_ => entity.strip_prefix('#').and_then(|code| {
					let number = match code.strip_prefix(['x', 'X']) {
						Some(hex) => u32::from_str_radix(hex, 16).ok(),
						None => code.parse().ok(),
					};
					number.and_then(char::from_u32)
				}),
			};
			c.map(|c| (c, end))
		});
		match decoded {
			Some((c, end)) => {
				out.push(c);
				rest = &rest[end + 1..];
			}
			None => {
				out.push('&');
				rest = &rest[1..];
			}
		}
	}
	out.push_str(rest);
	out
}

/// Escapes text content.
pub(crate) fn escape_text(text: &str, out: &mut String) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			c => out.push(c),
		}
	}
}

/// Escapes a double-quoted attribute value.
pub(crate) fn escape_attribute(value: &str, out: &mut String) {
	for c in value.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'"' => out.push_str("&quot;"),
			c => out.push(c),
		}
	}
}
