//! Hand-written lexer and recursive-descent parser for the query language
//!
//! Grammar (keywords case-insensitive, tags case-sensitive):
//!
//! ```text
//! query      := select | set
//! select     := "select" selection "where" pred
//! selection  := "data" dataspec | "distinct" tag | "*" | tag ("," tag)*
//! dataspec   := "in" "(" num "," num ")" mods
//!             | "before" num mods
//!             | "after" num mods
//! mods       := ("limit" num | "streamlimit" num)*
//! set        := "set" tag "=" literal ("," tag "=" literal)* "where" pred
//! pred       := andexpr ("or" andexpr)*
//! andexpr    := unary ("and" unary)*
//! unary      := "not" unary | "(" pred ")" | "has" tag | tag op literal
//! op         := "=" | "!=" | "like"
//! literal    := string | number | "true" | "false"
//! ```
//!
//! Time literals are epoch milliseconds.

use serde_json::{Map, Number, Value};

use crate::ast::{Ast, DataQueryKind, DataTarget, SetTarget, TagsTarget, Target, NO_LIMIT};
use crate::error::ParseError;
use crate::predicate::{Operator, Predicate};
use crate::Result;

/// Parse a query string into its AST
pub fn parse(input: &str) -> Result<Ast> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.query()?;
    parser.expect_end()?;
    Ok(ast)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    LParen,
    RParen,
    Comma,
    Star,
    Eq,
    Neq,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Str(s) => format!("\"{s}\""),
            Token::Num(n) => n.to_string(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
            Token::Star => "*".into(),
            Token::Eq => "=".into(),
            Token::Neq => "!=".into(),
        }
    }
}

fn lex(input: &str) -> Result<Vec<(Token, usize)>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::LParen, i));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, i));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, i));
                i += 1;
            }
            '*' => {
                tokens.push((Token::Star, i));
                i += 1;
            }
            '=' => {
                tokens.push((Token::Eq, i));
                i += 1;
            }
            '!' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push((Token::Neq, i));
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let start = i;
                i += 1;
                let mut s = String::new();
                loop {
                    let mut rest = input[i..].chars();
                    match rest.next() {
                        None => return Err(ParseError::UnterminatedString { pos: start }),
                        Some('\\') => match rest.next() {
                            None => return Err(ParseError::UnterminatedString { pos: start }),
                            Some(escaped) => {
                                s.push(escaped);
                                i += 1 + escaped.len_utf8();
                            }
                        },
                        Some(q) if q == quote => {
                            i += 1;
                            break;
                        }
                        Some(other) => {
                            s.push(other);
                            i += other.len_utf8();
                        }
                    }
                }
                tokens.push((Token::Str(s), start));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < bytes.len() && matches!(bytes[i] as char, '0'..='9' | '.' | 'e' | 'E' | '+' | '-')
                {
                    i += 1;
                }
                let text = &input[start..i];
                let num = parse_number(text).ok_or_else(|| ParseError::InvalidNumber {
                    text: text.to_string(),
                    pos: start,
                })?;
                tokens.push((Token::Num(num), start));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '/' => {
                let start = i;
                while i < bytes.len()
                    && matches!(bytes[i] as char,
                        'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '/' | '-')
                {
                    i += 1;
                }
                tokens.push((Token::Ident(input[start..i].to_string()), start));
            }
            other => {
                return Err(ParseError::Unexpected {
                    found: other.to_string(),
                    expected: "a token",
                    pos: i,
                })
            }
        }
    }
    Ok(tokens)
}

fn parse_number(text: &str) -> Option<Number> {
    if let Ok(n) = text.parse::<u64>() {
        return Some(Number::from(n));
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Number::from(n));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self, expected: &'static str) -> Result<(Token, usize)> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ParseError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(tok)
    }

    /// Consume the next token if it is the given keyword (case-insensitive)
    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(kw))
    }

    fn expect_keyword(&mut self, kw: &'static str) -> Result<()> {
        let (tok, pos) = self.next(kw)?;
        match tok {
            Token::Ident(ref s) if s.eq_ignore_ascii_case(kw) => Ok(()),
            other => Err(ParseError::Unexpected {
                found: other.describe(),
                expected: kw,
                pos,
            }),
        }
    }

    fn expect(&mut self, want: Token, expected: &'static str) -> Result<()> {
        let (tok, pos) = self.next(expected)?;
        if tok == want {
            Ok(())
        } else {
            Err(ParseError::Unexpected {
                found: tok.describe(),
                expected,
                pos,
            })
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some((tok, pos)) => Err(ParseError::TrailingInput {
                found: tok.describe(),
                pos: *pos,
            }),
        }
    }

    fn query(&mut self) -> Result<Ast> {
        if self.eat_keyword("select") {
            let target = self.selection()?;
            self.expect_keyword("where")?;
            let where_clause = self.predicate()?;
            Ok(Ast {
                where_clause,
                target,
            })
        } else if self.eat_keyword("set") {
            let target = self.assignments()?;
            self.expect_keyword("where")?;
            let where_clause = self.predicate()?;
            Ok(Ast {
                where_clause,
                target,
            })
        } else {
            let (tok, pos) = self.next("'select' or 'set'")?;
            Err(ParseError::Unexpected {
                found: tok.describe(),
                expected: "'select' or 'set'",
                pos,
            })
        }
    }

    fn selection(&mut self) -> Result<Target> {
        if self.peek_keyword("data") {
            self.pos += 1;
            return self.data_target().map(Target::Data);
        }
        if self.eat_keyword("distinct") {
            let tag = self.tag()?;
            return Ok(Target::Tags(TagsTarget {
                contents: vec![tag],
                distinct: true,
            }));
        }
        if matches!(self.peek(), Some(Token::Star)) {
            self.pos += 1;
            return Ok(Target::Tags(TagsTarget::default()));
        }
        let mut contents = vec![self.tag()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.pos += 1;
            contents.push(self.tag()?);
        }
        Ok(Target::Tags(TagsTarget {
            contents,
            distinct: false,
        }))
    }

    fn data_target(&mut self) -> Result<DataTarget> {
        let mut target = if self.eat_keyword("in") {
            self.expect(Token::LParen, "'('")?;
            let start_ms = self.timestamp()?;
            self.expect(Token::Comma, "','")?;
            let end_ms = self.timestamp()?;
            self.expect(Token::RParen, "')'")?;
            DataTarget::range(start_ms, end_ms)
        } else if self.eat_keyword("before") {
            DataTarget::anchored(DataQueryKind::Before, self.timestamp()?)
        } else if self.eat_keyword("after") {
            DataTarget::anchored(DataQueryKind::After, self.timestamp()?)
        } else {
            let (tok, pos) = self.next("'in', 'before' or 'after'")?;
            return Err(ParseError::Unexpected {
                found: tok.describe(),
                expected: "'in', 'before' or 'after'",
                pos,
            });
        };
        loop {
            if self.eat_keyword("limit") {
                target.limit = self.timestamp()? as i32;
            } else if self.eat_keyword("streamlimit") {
                target.streamlimit = self.timestamp()? as i32;
            } else {
                break;
            }
        }
        Ok(target)
    }

    fn assignments(&mut self) -> Result<Target> {
        let mut updates = Map::new();
        loop {
            let tag = self.tag()?;
            self.expect(Token::Eq, "'='")?;
            let value = self.literal()?;
            updates.insert(tag, value);
            if matches!(self.peek(), Some(Token::Comma)) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(Target::Set(SetTarget { updates }))
    }

    fn predicate(&mut self) -> Result<Predicate> {
        let first = self.and_expr()?;
        if !self.peek_keyword("or") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_keyword("or") {
            operands.push(self.and_expr()?);
        }
        Ok(Predicate::Or(operands))
    }

    fn and_expr(&mut self) -> Result<Predicate> {
        let first = self.unary()?;
        if !self.peek_keyword("and") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_keyword("and") {
            operands.push(self.unary()?);
        }
        Ok(Predicate::And(operands))
    }

    fn unary(&mut self) -> Result<Predicate> {
        if self.eat_keyword("not") {
            return Ok(Predicate::Not(Box::new(self.unary()?)));
        }
        if matches!(self.peek(), Some(Token::LParen)) {
            self.pos += 1;
            let inner = self.predicate()?;
            self.expect(Token::RParen, "')'")?;
            return Ok(inner);
        }
        if self.eat_keyword("has") {
            return Ok(Predicate::has(self.tag()?));
        }
        let tag = self.tag()?;
        let (tok, pos) = self.next("'=', '!=' or 'like'")?;
        let op = match tok {
            Token::Eq => Operator::Eq,
            Token::Neq => Operator::Ne,
            Token::Ident(ref s) if s.eq_ignore_ascii_case("like") => Operator::Like,
            other => {
                return Err(ParseError::Unexpected {
                    found: other.describe(),
                    expected: "'=', '!=' or 'like'",
                    pos,
                })
            }
        };
        let value = self.literal()?;
        Ok(Predicate::Cmp { tag, op, value })
    }

    fn tag(&mut self) -> Result<String> {
        let (tok, pos) = self.next("a tag name")?;
        match tok {
            Token::Ident(s) => Ok(s),
            other => Err(ParseError::Unexpected {
                found: other.describe(),
                expected: "a tag name",
                pos,
            }),
        }
    }

    fn literal(&mut self) -> Result<Value> {
        let (tok, pos) = self.next("a literal")?;
        match tok {
            Token::Str(s) => Ok(Value::String(s)),
            Token::Num(n) => Ok(Value::Number(n)),
            Token::Ident(ref s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Token::Ident(ref s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => Err(ParseError::Unexpected {
                found: other.describe(),
                expected: "a literal",
                pos,
            }),
        }
    }

    fn timestamp(&mut self) -> Result<u64> {
        let (tok, pos) = self.next("a timestamp")?;
        match tok {
            Token::Num(ref n) => n
                .as_u64()
                .or_else(|| n.as_f64().map(|f| f as u64))
                .ok_or_else(|| ParseError::InvalidNumber {
                    text: n.to_string(),
                    pos,
                }),
            other => Err(ParseError::Unexpected {
                found: other.describe(),
                expected: "a timestamp",
                pos,
            }),
        }
    }
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
