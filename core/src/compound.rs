//! Compound expression parser.
//!
//! ```text
//! expr := term ( ( 'and' | 'or' )? term )*
//! term := 'not' term | '(' expr ')' | WORD
//! ```
//!
//! Tokens are whitespace-delimited, so parentheses must stand alone. A missing
//! operator between two terms means `and`. `and` and `or` have equal precedence
//! and associate to the left; a run of one operator becomes a single n-ary node.
//!
//! The tree height, counting every `not` and every switch between `and` and
//! `or`, is bounded by [`MAX_DEPTH`], and so is the nesting of `(` and `not`.

use crate::{Expr, TargetError, MAX_DEPTH};
use std::fmt;

/// A lexical token of a compound expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// Anything else: a matcher reference or a bare glob.
    Word(String),
}

impl Token {
    /// Classify one whitespace-free word.
    #[must_use]
    pub fn from_word(word: &str) -> Self {
        match word {
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "(" => Self::LParen,
            ")" => Self::RParen,
            w => Self::Word(w.to_owned()),
        }
    }

    /// Returns `true` for the reserved words `and`, `or`, `not`, `(`, `)`.
    #[must_use]
    pub fn is_operator(&self) -> bool {
        !matches!(self, Self::Word(_))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Word(w) => w,
        })
    }
}

/// Split an expression into tokens.
#[must_use]
pub fn tokenize(expr: &str) -> Vec<Token> {
    expr.split_whitespace().map(Token::from_word).collect()
}

/// Parse a compound expression string.
///
/// # Errors
///
/// [`TargetError::Parse`] for an empty expression, unbalanced parentheses,
/// an empty group, or a leading, doubled or trailing operator;
/// [`TargetError::DepthExceeded`] for nesting deeper than [`MAX_DEPTH`].
pub fn parse_compound(expr: &str) -> Result<Expr, TargetError> {
    Parser::new(expr, tokenize(expr)).parse()
}

/// Parse an expression given as a list of words.
///
/// Each word is taken as one token, even if it contains whitespace.
///
/// # Errors
///
/// Same as [`parse_compound`].
pub fn parse_words<S: AsRef<str>>(words: &[S]) -> Result<Expr, TargetError> {
    let tokens: Vec<Token> = words.iter().map(|w| Token::from_word(w.as_ref())).collect();
    let source = words
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(" ");
    Parser::new(&source, tokens).parse()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Expr, TargetError> {
        if self.tokens.is_empty() {
            return Err(self.error("empty expression"));
        }
        let (expr, _) = self.expr(0)?;
        if let Some(tok) = self.tokens.get(self.pos) {
            let reason = format!("unexpected '{tok}'");
            return Err(self.error(reason));
        }
        Ok(expr)
    }

    /// Parse a chain of terms. Returns the expression and its height.
    fn expr(&mut self, nesting: usize) -> Result<(Expr, usize), TargetError> {
        let (mut lhs, mut height) = self.term(nesting)?;
        loop {
            let is_and = match self.peek() {
                None | Some(Token::RParen) => return Ok((lhs, height)),
                Some(Token::And) => {
                    self.pos += 1;
                    true
                }
                Some(Token::Or) => {
                    self.pos += 1;
                    false
                }
                // Juxtaposition is an implicit `and`.
                Some(_) => true,
            };
            let (rhs, rhs_height) = self.term(nesting)?;
            let extends = match &lhs {
                Expr::And(_) => is_and,
                Expr::Or(_) => !is_and,
                _ => false,
            };
            // Switching operator wraps everything parsed so far in a new node.
            height = if extends {
                height.max(rhs_height + 1)
            } else {
                height.max(rhs_height) + 1
            };
            check_height(height)?;
            lhs = if is_and { lhs.and(rhs) } else { lhs.or(rhs) };
        }
    }

    fn term(&mut self, nesting: usize) -> Result<(Expr, usize), TargetError> {
        let prev = self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)).cloned();
        let Some(tok) = self.tokens.get(self.pos).cloned() else {
            let reason = match prev {
                Some(p) => format!("expression ends after '{p}'"),
                None => "empty expression".to_owned(),
            };
            return Err(self.error(reason));
        };
        self.pos += 1;

        match tok {
            Token::Word(w) => Ok((Expr::atom(&w), 1)),
            Token::Not => {
                let nesting = self.descend(nesting)?;
                let (inner, height) = self.term(nesting)?;
                check_height(height + 1)?;
                Ok((inner.not(), height + 1))
            }
            Token::LParen => {
                let nesting = self.descend(nesting)?;
                if self.peek() == Some(&Token::RParen) {
                    return Err(self.error("empty group '( )'"));
                }
                let inner = self.expr(nesting)?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.error("unclosed '('"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Token::And | Token::Or => {
                let reason = match prev {
                    None => format!("expression begins with binary operator '{tok}'"),
                    Some(p) => format!("unexpected '{tok}' after '{p}'"),
                };
                Err(self.error(reason))
            }
            Token::RParen => {
                let reason = match prev {
                    Some(p) => format!("unexpected ')' after '{p}'"),
                    None => "unexpected ')'".to_owned(),
                };
                Err(self.error(reason))
            }
        }
    }

    /// Parser recursion through `(` and `not` is bounded like the tree itself.
    fn descend(&self, nesting: usize) -> Result<usize, TargetError> {
        let nesting = nesting + 1;
        if nesting > MAX_DEPTH {
            return Err(TargetError::DepthExceeded {
                depth: nesting,
                max: MAX_DEPTH,
            });
        }
        Ok(nesting)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error(&self, reason: impl Into<String>) -> TargetError {
        TargetError::parse(self.source, reason)
    }
}

fn check_height(height: usize) -> Result<(), TargetError> {
    if height > MAX_DEPTH {
        return Err(TargetError::DepthExceeded {
            depth: height,
            max: MAX_DEPTH,
        });
    }
    Ok(())
}
