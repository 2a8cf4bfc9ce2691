//! Parser for prior expressions such as `uniform(0, 1, discrete=True)`.
//!
//! The grammar is the call-expression subset of Python literals accepted by
//! the space builder:
//!
//! ```text
//! call    := ident '(' [arg (',' arg)*] [','] ')'
//! arg     := ident '=' literal | literal
//! literal := number | string | True | False | None | list | dict
//! list    := ('[' | '(') [literal (',' literal)*] [','] (']' | ')')
//! dict    := '{' [literal ':' literal (',' literal ':' literal)*] [','] '}'
//! ```

use std::iter::Peekable;
use std::str::CharIndices;

use crate::number::Number;

/// A Python literal appearing in a prior expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

impl Literal {
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Int(v) => Some(Number::Int(*v)),
            Self::Float(v) => Some(Number::Float(*v)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Int(v) => Value::from(*v),
            Self::Float(v) => Value::from(*v),
            Self::Str(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::None => Value::Null,
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Dict(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|(k, v)| {
                        let key = match k {
                            Self::Str(s) => s.clone(),
                            other => other.to_json().to_string(),
                        };
                        (key, v.to_json())
                    })
                    .collect(),
            ),
        }
    }
}

/// A parsed `function(positional..., key=value...)` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorCall {
    pub function: String,
    pub positional: Vec<Literal>,
    pub kwargs: Vec<(String, Literal)>,
}

impl PriorCall {
    pub fn kwarg(&self, key: &str) -> Option<&Literal> {
        self.kwargs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn positional_numbers<const N: usize>(&self) -> Result<[Number; N], String> {
        if self.positional.len() != N {
            return Err(format!(
                "{} expects {N} positional arguments, got {}",
                self.function,
                self.positional.len()
            ));
        }
        let mut out = [Number::Int(0); N];
        for (slot, literal) in out.iter_mut().zip(&self.positional) {
            *slot = literal
                .as_number()
                .ok_or_else(|| format!("{literal:?} is not a number"))?;
        }
        Ok(out)
    }

    pub fn bool_kwarg(&self, key: &str) -> Result<Option<bool>, String> {
        match self.kwarg(key) {
            None => Ok(None),
            Some(Literal::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(format!("{key} must be True or False, got {other:?}")),
        }
    }

    pub fn int_kwarg(&self, key: &str) -> Result<Option<i64>, String> {
        match self.kwarg(key) {
            None => Ok(None),
            Some(Literal::Int(v)) if *v >= 0 => Ok(Some(*v)),
            Some(other) => Err(format!("{key} must be a non-negative integer, got {other:?}")),
        }
    }

    pub fn number_kwarg(&self, key: &str) -> Result<Option<Number>, String> {
        match self.kwarg(key) {
            None => Ok(None),
            Some(literal) => literal
                .as_number()
                .map(Some)
                .ok_or_else(|| format!("{key} must be a number, got {literal:?}")),
        }
    }

    pub fn shape_kwarg(&self) -> Result<Option<Vec<usize>>, String> {
        match self.kwarg("shape") {
            None | Some(Literal::None) => Ok(None),
            Some(Literal::Int(v)) if *v > 0 => Ok(Some(vec![*v as usize])),
            Some(Literal::List(items)) => items
                .iter()
                .map(|item| match item {
                    Literal::Int(v) if *v > 0 => Ok(*v as usize),
                    other => Err(format!("shape entries must be positive integers, got {other:?}")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(format!("invalid shape {other:?}")),
        }
    }

    pub fn reject_unknown_kwargs(&self, allowed: &[&str]) -> Result<(), String> {
        match self.kwargs.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            Some((key, _)) => Err(format!("{} got an unexpected keyword `{key}`", self.function)),
            None => Ok(()),
        }
    }
}

/// Parse a complete prior expression.
pub fn parse_prior(expression: &str) -> Result<PriorCall, String> {
    let mut parser = Parser {
        src: expression,
        chars: expression.char_indices().peekable(),
    };
    let call = parser.call()?;
    parser.skip_ws();
    match parser.chars.peek() {
        None => Ok(call),
        Some((pos, _)) => Err(format!("trailing input at {pos}: `{}`", &expression[*pos..])),
    }
}

struct Parser<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn call(&mut self) -> Result<PriorCall, String> {
        self.skip_ws();
        let function = self.ident()?;
        self.expect('(')?;

        let mut positional = Vec::new();
        let mut kwargs: Vec<(String, Literal)> = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(')') {
                break;
            }

            if self.at_keyword() {
                let key = self.ident()?;
                self.expect('=')?;
                let value = self.literal()?;
                if kwargs.iter().any(|(k, _)| *k == key) {
                    return Err(format!("keyword `{key}` given twice"));
                }
                kwargs.push((key, value));
            } else {
                if !kwargs.is_empty() {
                    return Err("positional argument follows keyword argument".to_string());
                }
                positional.push(self.literal()?);
            }

            self.skip_ws();
            if self.eat(')') {
                break;
            }
            self.expect(',')?;
        }

        Ok(PriorCall {
            function,
            positional,
            kwargs,
        })
    }

    fn literal(&mut self) -> Result<Literal, String> {
        self.skip_ws();
        match self.chars.peek().map(|(_, c)| *c) {
            Some('[') | Some('(') => {
                let close = if self.eat('[') { ']' } else { self.bump(); ')' };
                self.sequence(close)
            }
            Some('{') => {
                self.bump();
                self.dict()
            }
            Some('\'') | Some('"') => self.string(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => match self.ident()?.as_str() {
                "True" => Ok(Literal::Bool(true)),
                "False" => Ok(Literal::Bool(false)),
                "None" => Ok(Literal::None),
                "inf" => Ok(Literal::Float(f64::INFINITY)),
                other => Err(format!("unexpected name `{other}`")),
            },
            Some(c) => Err(format!("unexpected character `{c}`")),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn sequence(&mut self, close: char) -> Result<Literal, String> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok(Literal::List(items));
            }
            items.push(self.literal()?);
            self.skip_ws();
            if self.eat(close) {
                return Ok(Literal::List(items));
            }
            self.expect(',')?;
        }
    }

    fn dict(&mut self) -> Result<Literal, String> {
        let mut pairs = Vec::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Ok(Literal::Dict(pairs));
            }
            let key = self.literal()?;
            self.skip_ws();
            self.expect(':')?;
            let value = self.literal()?;
            pairs.push((key, value));
            self.skip_ws();
            if self.eat('}') {
                return Ok(Literal::Dict(pairs));
            }
            self.expect(',')?;
        }
    }

    fn string(&mut self) -> Result<Literal, String> {
        let Some((_, quote)) = self.chars.next() else {
            return Err("unexpected end of expression".to_string());
        };
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => return Err("unterminated string".to_string()),
                Some((_, c)) if c == quote => return Ok(Literal::Str(out)),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, c)) => out.push(c),
                    None => return Err("unterminated string".to_string()),
                },
                Some((_, c)) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Literal, String> {
        let start = self.position();
        let mut is_float = false;
        let mut prev = ' ';
        while let Some(&(_, c)) = self.chars.peek() {
            let sign = (c == '-' || c == '+')
                && (self.position() == start || prev == 'e' || prev == 'E');
            let accept = c.is_ascii_digit() || c == '_' || sign;
            let float_part = c == '.' || c == 'e' || c == 'E';
            if !(accept || float_part) {
                break;
            }
            is_float |= float_part;
            prev = c;
            self.bump();
        }
        let text: String = self.src[start..self.position()]
            .chars()
            .filter(|c| *c != '_')
            .collect();

        if is_float {
            text.parse::<f64>()
                .map(Literal::Float)
                .map_err(|e| format!("invalid number `{text}`: {e}"))
        } else {
            text.parse::<i64>()
                .map(Literal::Int)
                .map_err(|e| format!("invalid number `{text}`: {e}"))
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        self.skip_ws();
        let start = self.position();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.position();
        if start == end {
            return Err(format!("expected a name at {start}"));
        }
        Ok(self.src[start..end].to_string())
    }

    /// An identifier directly followed by `=` (and not `==`).
    fn at_keyword(&self) -> bool {
        let rest = &self.src[self.position()..];
        let name_len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if name_len == 0 || rest.starts_with(|c: char| c.is_ascii_digit()) {
            return false;
        }
        let after = rest[name_len..].trim_start();
        after.starts_with('=') && !after.starts_with("==")
    }

    fn position(&self) -> usize {
        self.chars.clone().peek().map_or(self.src.len(), |(i, _)| *i)
    }

    fn skip_ws(&mut self) {
        while self.chars.peek().map_or(false, |(_, c)| c.is_whitespace()) {
            self.bump();
        }
    }

    fn bump(&mut self) {
        self.chars.next();
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek().map(|(_, c)| *c) == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        self.skip_ws();
        if self.eat(expected) {
            Ok(())
        } else {
            match self.chars.peek() {
                Some((pos, c)) => Err(format!("expected `{expected}` at {pos}, found `{c}`")),
                None => Err(format!("expected `{expected}`, found end of expression")),
            }
        }
    }
}
