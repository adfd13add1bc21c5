//! Tag expressions.
//!
//! The cucumber grammar (`@a and not (@b or @c)`) is parsed by
//! `gherkin::tagexpr`. Expressions without its keywords or parentheses use the
//! legacy grammar: comma for OR, `~` for NOT, whitespace for AND, binding from
//! tightest `~`, `,`, adjacency. The two cannot be mixed in one expression.

use crate::{Result, TestError};
use ::gherkin::tagexpr::TagOperation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagExpression {
    /// The empty expression; matches everything.
    Any,
    Tag(String),
    Not(Box<TagExpression>),
    And(Vec<TagExpression>),
    Or(Vec<TagExpression>),
}

impl TagExpression {
    pub fn parse(expression: &str) -> Result<Self> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Ok(TagExpression::Any);
        }

        if tokens.iter().any(Token::is_cucumber) {
            if let Some(token) = tokens.iter().find(|token| token.is_legacy()) {
                return Err(TestError::TagExpression(format!(
                    "legacy {} mixed with cucumber syntax in '{}'",
                    token.describe(),
                    expression
                )));
            }
            let operation = expression.trim().parse::<TagOperation>().map_err(|e| {
                TestError::TagExpression(format!("invalid tag expression '{}': {}", expression, e))
            })?;
            return Ok(Self::from(operation));
        }

        let mut parser = LegacyParser { tokens, pos: 0 };
        let parsed = parser.parse_and()?;
        if let Some(token) = parser.peek() {
            return Err(TestError::TagExpression(format!(
                "unexpected {} in '{}'",
                token.describe(),
                expression
            )));
        }
        Ok(parsed)
    }

    pub fn evaluate<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        match self {
            TagExpression::Any => true,
            TagExpression::Tag(name) => tags.iter().any(|tag| normalize(tag.as_ref()) == *name),
            TagExpression::Not(inner) => !inner.evaluate(tags),
            TagExpression::And(all) => all.iter().all(|expr| expr.evaluate(tags)),
            TagExpression::Or(any) => any.iter().any(|expr| expr.evaluate(tags)),
        }
    }
}

impl From<TagOperation> for TagExpression {
    fn from(operation: TagOperation) -> Self {
        match operation {
            TagOperation::Tag(name) => TagExpression::Tag(normalize(&name)),
            TagOperation::Not(inner) => TagExpression::Not(Box::new(Self::from(*inner))),
            TagOperation::And(left, right) => {
                TagExpression::And(vec![Self::from(*left), Self::from(*right)])
            }
            TagOperation::Or(left, right) => {
                TagExpression::Or(vec![Self::from(*left), Self::from(*right)])
            }
        }
    }
}

/// Decides whether `tags` satisfy `expression`.
///
/// An empty expression always matches; an expression that does not parse never does.
pub fn matches<S: AsRef<str>>(expression: &str, tags: &[S]) -> bool {
    if expression.trim().is_empty() {
        return true;
    }
    TagExpression::parse(expression)
        .map(|parsed| parsed.evaluate(tags))
        .unwrap_or(false)
}

fn normalize(tag: &str) -> String {
    if tag.starts_with('@') {
        tag.to_string()
    } else {
        format!("@{}", tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    And,
    Or,
    Not,
    /// `~` prefix of a legacy tag
    Negate,
    Comma,
    Open,
    Close,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Tag(name) => format!("tag '{}'", name),
            Token::And => "'and'".to_string(),
            Token::Or => "'or'".to_string(),
            Token::Not => "'not'".to_string(),
            Token::Negate => "'~'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Open => "'('".to_string(),
            Token::Close => "')'".to_string(),
        }
    }

    fn is_cucumber(&self) -> bool {
        matches!(
            self,
            Token::And | Token::Or | Token::Not | Token::Open | Token::Close
        )
    }

    fn is_legacy(&self) -> bool {
        matches!(self, Token::Negate | Token::Comma)
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    let flush = |word: &mut String, tokens: &mut Vec<Token>| -> Result<()> {
        if word.is_empty() {
            return Ok(());
        }
        let token = match word.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            other => {
                let (negated, name) = match other.strip_prefix('~') {
                    Some(rest) => (true, rest),
                    None => (false, other),
                };
                if name.is_empty() || name == "@" {
                    return Err(TestError::TagExpression(format!("empty tag in '{}'", other)));
                }
                if negated {
                    tokens.push(Token::Negate);
                }
                Token::Tag(normalize(name))
            }
        };
        tokens.push(token);
        word.clear();
        Ok(())
    };

    let mut chars = expression.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    word.push(escaped);
                }
            }
            '(' | ')' | ',' => {
                flush(&mut word, &mut tokens)?;
                tokens.push(match ch {
                    '(' => Token::Open,
                    ')' => Token::Close,
                    _ => Token::Comma,
                });
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens)?,
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens)?;

    Ok(tokens)
}

/// Parser for the legacy grammar: `~`, `,` and adjacency.
struct LegacyParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl LegacyParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_and(&mut self) -> Result<TagExpression> {
        let mut terms = vec![self.parse_alternatives()?];
        while matches!(self.peek(), Some(Token::Tag(_) | Token::Negate)) {
            terms.push(self.parse_alternatives()?);
        }
        Ok(collapse(terms, TagExpression::And))
    }

    fn parse_alternatives(&mut self) -> Result<TagExpression> {
        let mut terms = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            terms.push(self.parse_unary()?);
        }
        Ok(collapse(terms, TagExpression::Or))
    }

    fn parse_unary(&mut self) -> Result<TagExpression> {
        match self.next() {
            Some(Token::Negate) => Ok(TagExpression::Not(Box::new(self.parse_unary()?))),
            Some(Token::Tag(name)) => Ok(TagExpression::Tag(name)),
            Some(token) => Err(TestError::TagExpression(format!(
                "expected a tag but found {}",
                token.describe()
            ))),
            None => Err(TestError::TagExpression(
                "expression ends where a tag was expected".to_string(),
            )),
        }
    }
}

fn collapse(
    mut terms: Vec<TagExpression>,
    combine: fn(Vec<TagExpression>) -> TagExpression,
) -> TagExpression {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        combine(terms)
    }
}
