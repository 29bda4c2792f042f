use crate::error::ArborError;
use crate::node::{LineInfo, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One event of the depth-first, pre-order stream a tree is written as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "token", content = "value", rename_all = "snake_case")]
pub enum Token {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    StartConstructor(String),
    EndConstructor,
    PropertyName(String),
    Value(Scalar),
    Comment(String),
    Raw(String),
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::StartObject => TokenKind::StartObject,
            Token::EndObject => TokenKind::EndObject,
            Token::StartArray => TokenKind::StartArray,
            Token::EndArray => TokenKind::EndArray,
            Token::StartConstructor(_) => TokenKind::StartConstructor,
            Token::EndConstructor => TokenKind::EndConstructor,
            Token::PropertyName(_) => TokenKind::PropertyName,
            Token::Comment(_) => TokenKind::Comment,
            Token::Raw(_) => TokenKind::Raw,
            Token::Value(s) => match s {
                Scalar::Null => TokenKind::Null,
                Scalar::Undefined => TokenKind::Undefined,
                Scalar::Boolean(_) => TokenKind::Boolean,
                Scalar::Integer(_) => TokenKind::Integer,
                Scalar::Float(_) => TokenKind::Float,
                Scalar::String(_) => TokenKind::String,
                Scalar::Date(_) => TokenKind::Date,
                Scalar::Bytes(_) => TokenKind::Bytes,
                Scalar::Guid(_) => TokenKind::Guid,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// No token has been read yet, or the stream is exhausted.
    None,
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    StartConstructor,
    EndConstructor,
    PropertyName,
    String,
    Integer,
    Float,
    Boolean,
    Null,
    Undefined,
    Date,
    Bytes,
    Guid,
    Comment,
    Raw,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Sink for the token stream produced by [`Document::write_to`](crate::Document::write_to).
pub trait TokenWriter {
    fn write_start_object(&mut self) -> Result<(), ArborError>;
    fn write_end_object(&mut self) -> Result<(), ArborError>;
    fn write_start_array(&mut self) -> Result<(), ArborError>;
    fn write_end_array(&mut self) -> Result<(), ArborError>;
    fn write_start_constructor(&mut self, name: &str) -> Result<(), ArborError>;
    fn write_end_constructor(&mut self) -> Result<(), ArborError>;
    fn write_property_name(&mut self, name: &str) -> Result<(), ArborError>;
    fn write_value(&mut self, value: &Scalar) -> Result<(), ArborError>;
    fn write_comment(&mut self, text: &str) -> Result<(), ArborError>;
    fn write_raw(&mut self, text: &str) -> Result<(), ArborError>;
}

/// Cursor over a token stream.
pub trait TokenReader {
    /// Advances to the next token. Returns `false` once the stream is exhausted.
    fn read(&mut self) -> Result<bool, ArborError>;

    fn token(&self) -> Option<&Token>;

    fn token_kind(&self) -> TokenKind {
        self.token().map_or(TokenKind::None, Token::kind)
    }

    /// Scalar payload of the current token.
    fn value(&self) -> Option<&Scalar> {
        match self.token() {
            Some(Token::Value(s)) => Some(s),
            _ => None,
        }
    }

    fn line_info(&self) -> Option<LineInfo> {
        None
    }

    /// Skips leading and comment tokens. Returns `false` if the stream ran out.
    fn move_to_content(&mut self) -> Result<bool, ArborError> {
        loop {
            match self.token_kind() {
                TokenKind::None | TokenKind::Comment => {
                    if !self.read()? {
                        return Ok(false);
                    }
                }
                _ => return Ok(true),
            }
        }
    }
}

/// In-memory [`TokenWriter`] recording every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenBuffer {
    tokens: Vec<Token>,
}

impl TokenBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    pub fn reader(&self) -> TokenBufferReader<'_> {
        TokenBufferReader::new(&self.tokens)
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }
}

impl TokenWriter for TokenBuffer {
    fn write_start_object(&mut self) -> Result<(), ArborError> {
        self.push(Token::StartObject);
        Ok(())
    }

    fn write_end_object(&mut self) -> Result<(), ArborError> {
        self.push(Token::EndObject);
        Ok(())
    }

    fn write_start_array(&mut self) -> Result<(), ArborError> {
        self.push(Token::StartArray);
        Ok(())
    }

    fn write_end_array(&mut self) -> Result<(), ArborError> {
        self.push(Token::EndArray);
        Ok(())
    }

    fn write_start_constructor(&mut self, name: &str) -> Result<(), ArborError> {
        self.push(Token::StartConstructor(name.to_string()));
        Ok(())
    }

    fn write_end_constructor(&mut self) -> Result<(), ArborError> {
        self.push(Token::EndConstructor);
        Ok(())
    }

    fn write_property_name(&mut self, name: &str) -> Result<(), ArborError> {
        self.push(Token::PropertyName(name.to_string()));
        Ok(())
    }

    fn write_value(&mut self, value: &Scalar) -> Result<(), ArborError> {
        self.push(Token::Value(value.clone()));
        Ok(())
    }

    fn write_comment(&mut self, text: &str) -> Result<(), ArborError> {
        self.push(Token::Comment(text.to_string()));
        Ok(())
    }

    fn write_raw(&mut self, text: &str) -> Result<(), ArborError> {
        self.push(Token::Raw(text.to_string()));
        Ok(())
    }
}

/// Replays a token slice. Line info reports line 1 and the 1-based
/// ordinal of the current token as the position.
#[derive(Debug, Clone)]
pub struct TokenBufferReader<'a> {
    tokens: &'a [Token],
    next: usize,
    current: Option<usize>,
}

impl<'a> TokenBufferReader<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            next: 0,
            current: None,
        }
    }
}

impl TokenReader for TokenBufferReader<'_> {
    fn read(&mut self) -> Result<bool, ArborError> {
        if self.next >= self.tokens.len() {
            self.current = None;
            return Ok(false);
        }
        self.current = Some(self.next);
        self.next += 1;
        Ok(true)
    }

    fn token(&self) -> Option<&Token> {
        self.current.and_then(|i| self.tokens.get(i))
    }

    fn line_info(&self) -> Option<LineInfo> {
        self.current.map(|i| LineInfo {
            line: 1,
            position: u32::try_from(i + 1).unwrap_or(u32::MAX),
        })
    }
}
