//! Selector parser.
//!
//! Single pass, recursive descent, one token of lookahead:
//!
//! ```text
//! document      := selection_set EOF
//! selection_set := '{' selection* '}'
//! selection     := '*' | name (':' name)? selection_set?
//! name          := identifier | quoted-string
//! ```
//!
//! Whitespace and commas separate tokens and are otherwise ignored.

use std::iter::Peekable;
use std::str::CharIndices;

use super::ast::{Document, Field, Selection, SelectionSet};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LBrace,
    RBrace,
    Colon,
    Star,
    Ident(String),
    Str(String),
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LBrace => "'{'".to_string(),
            Token::RBrace => "'}'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::Str(s) => format!("string {s:?}"),
            Token::Eof => "end of input".to_string(),
        }
    }
}

struct Lexer<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
        }
    }

    /// Next token and the byte offset it starts at.
    fn next_token(&mut self) -> Result<(Token, usize)> {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() || c == ',' {
                self.chars.next();
            } else {
                break;
            }
        }

        let Some((start, c)) = self.chars.next() else {
            return Ok((Token::Eof, self.text.len()));
        };

        let token = match c {
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ':' => Token::Colon,
            '*' => Token::Star,
            '"' => Token::Str(self.string(start)?),
            c if is_ident_char(c) => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, c)) = self.chars.peek() {
                    if !is_ident_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    self.chars.next();
                }
                Token::Ident(self.text[start..end].to_string())
            }
            other => return Err(Error::syntax(format!("unexpected character {other:?}"), start)),
        };
        Ok((token, start))
    }

    fn string(&mut self, start: usize) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => return Err(Error::syntax("unterminated string", start)),
                Some((_, '"')) => return Ok(out),
                Some((i, '\\')) => match self.chars.next() {
                    Some((_, '"')) => out.push('"'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, other)) => {
                        return Err(Error::syntax(format!("invalid escape '\\{other}'"), i))
                    }
                    None => return Err(Error::syntax("unterminated string", start)),
                },
                Some((_, c)) => out.push(c),
            }
        }
    }
}

pub(super) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '-'
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    offset: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(text);
        let (current, offset) = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            offset,
        })
    }

    fn advance(&mut self) -> Result<Token> {
        let (next, offset) = self.lexer.next_token()?;
        self.offset = offset;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.current == token {
            self.advance()?;
            Ok(())
        } else {
            Err(self.unexpected(&token.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        Error::syntax(
            format!("expected {expected}, found {}", self.current.describe()),
            self.offset,
        )
    }

    fn document(&mut self) -> Result<Document> {
        let selection_set = self.selection_set()?;
        if self.current != Token::Eof {
            return Err(self.unexpected("end of input"));
        }
        Ok(Document { selection_set })
    }

    fn selection_set(&mut self) -> Result<SelectionSet> {
        self.expect(Token::LBrace)?;
        let mut selections = Vec::new();
        loop {
            match self.current {
                Token::RBrace => {
                    self.advance()?;
                    return Ok(SelectionSet { selections });
                }
                Token::Eof => return Err(self.unexpected("'}'")),
                _ => selections.push(self.selection()?),
            }
        }
    }

    fn selection(&mut self) -> Result<Selection> {
        if self.current == Token::Star {
            self.advance()?;
            return Ok(Selection::Wildcard);
        }

        let (mut name, mut quoted) = self.name()?;
        let mut alias = None;
        if self.current == Token::Colon {
            self.advance()?;
            alias = Some(name);
            (name, quoted) = self.name()?;
        }

        let selection_set = if self.current == Token::LBrace {
            Some(self.selection_set()?)
        } else {
            None
        };

        Ok(Selection::Field(Field {
            name,
            alias,
            quoted,
            selection_set,
        }))
    }

    fn name(&mut self) -> Result<(String, bool)> {
        let quoted = match self.current {
            Token::Ident(_) => false,
            Token::Str(_) => true,
            _ => return Err(self.unexpected("field name")),
        };
        match self.advance()? {
            Token::Ident(name) | Token::Str(name) => Ok((name, quoted)),
            other => Err(Error::syntax(format!("expected field name, found {}", other.describe()), self.offset)),
        }
    }
}

/// Parse selector text into a [`Document`].
pub fn parse(text: &str) -> Result<Document> {
    Parser::new(text)?.document()
}
