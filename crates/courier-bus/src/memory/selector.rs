//! Message selectors for the in-memory broker.
//!
//! Supports the subset of the SQL-92 selector grammar that covers property
//! equality filters:
//!
//! ```text
//! selector   := comparison ( AND comparison )*
//! comparison := identifier ( "=" | "<>" ) literal
//! literal    := 'quoted text' | integer | decimal | TRUE | FALSE
//! ```
//!
//! A comparison against a missing property, or against a property of a
//! different type, is unknown and never selects the message.

use std::collections::BTreeMap;

use thiserror::Error;

use courier_types::FieldValue;

/// Selector parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("Unexpected end of selector")]
    UnexpectedEnd,

    #[error("Unexpected token '{0}' in selector")]
    UnexpectedToken(String),

    #[error("Unterminated string literal in selector")]
    UnterminatedString,

    #[error("Invalid number '{0}' in selector")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    Text(String),
    Number(String),
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq)]
struct Comparison {
    property: String,
    operator: Operator,
    literal: Literal,
}

/// A parsed selector expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    comparisons: Vec<Comparison>,
}

impl Selector {
    /// Parse a selector expression.
    pub fn parse(expression: &str) -> Result<Self, SelectorError> {
        let tokens = tokenize(expression)?;
        let mut tokens = tokens.into_iter().peekable();
        let mut comparisons = Vec::new();

        loop {
            let property = match tokens.next() {
                Some(Token::Identifier(name)) if !is_keyword(&name) => name,
                Some(other) => return Err(SelectorError::UnexpectedToken(describe(&other))),
                None => return Err(SelectorError::UnexpectedEnd),
            };

            let operator = match tokens.next() {
                Some(Token::Equal) => Operator::Equal,
                Some(Token::NotEqual) => Operator::NotEqual,
                Some(other) => return Err(SelectorError::UnexpectedToken(describe(&other))),
                None => return Err(SelectorError::UnexpectedEnd),
            };

            let literal = match tokens.next() {
                Some(Token::Text(text)) => Literal::Text(text),
                Some(Token::Number(number)) => parse_number(&number)?,
                Some(Token::Identifier(word)) if word.eq_ignore_ascii_case("true") => {
                    Literal::Bool(true)
                }
                Some(Token::Identifier(word)) if word.eq_ignore_ascii_case("false") => {
                    Literal::Bool(false)
                }
                Some(other) => return Err(SelectorError::UnexpectedToken(describe(&other))),
                None => return Err(SelectorError::UnexpectedEnd),
            };

            comparisons.push(Comparison {
                property,
                operator,
                literal,
            });

            match tokens.next() {
                None => break,
                Some(Token::Identifier(word)) if word.eq_ignore_ascii_case("and") => continue,
                Some(other) => return Err(SelectorError::UnexpectedToken(describe(&other))),
            }
        }

        Ok(Self { comparisons })
    }

    /// Evaluate against message properties.
    pub fn matches(&self, properties: &BTreeMap<String, FieldValue>) -> bool {
        self.comparisons.iter().all(|comparison| {
            let Some(value) = properties.get(&comparison.property) else {
                return false;
            };
            match (compare(value, &comparison.literal), comparison.operator) {
                (Some(equal), Operator::Equal) => equal,
                (Some(equal), Operator::NotEqual) => !equal,
                (None, _) => false,
            }
        })
    }
}

/// `Some(equal)` when the types are comparable, `None` otherwise.
fn compare(value: &FieldValue, literal: &Literal) -> Option<bool> {
    match (value, literal) {
        (FieldValue::Text(left), Literal::Text(right)) => Some(left == right),
        (FieldValue::Bool(left), Literal::Bool(right)) => Some(left == right),
        (FieldValue::Int(left), Literal::Int(right)) => Some(left == right),
        (FieldValue::Int(left), Literal::Float(right)) => Some((*left as f64) == *right),
        (FieldValue::Float(left), Literal::Int(right)) => Some(*left == (*right as f64)),
        (FieldValue::Float(left), Literal::Float(right)) => Some(left == right),
        _ => None,
    }
}

fn is_keyword(word: &str) -> bool {
    ["and", "true", "false"]
        .iter()
        .any(|keyword| word.eq_ignore_ascii_case(keyword))
}

fn describe(token: &Token) -> String {
    match token {
        Token::Identifier(text) | Token::Number(text) => text.clone(),
        Token::Text(text) => format!("'{}'", text),
        Token::Equal => "=".to_string(),
        Token::NotEqual => "<>".to_string(),
    }
}

fn parse_number(text: &str) -> Result<Literal, SelectorError> {
    if text.contains('.') {
        text.parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| SelectorError::InvalidNumber(text.to_string()))
    } else {
        text.parse::<i64>()
            .map(Literal::Int)
            .map_err(|_| SelectorError::InvalidNumber(text.to_string()))
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, SelectorError> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&next) = chars.peek() {
        match next {
            c if c.is_whitespace() => {
                chars.next();
            }
            '=' => {
                chars.next();
                tokens.push(Token::Equal);
            }
            '<' => {
                chars.next();
                match chars.next() {
                    Some('>') => tokens.push(Token::NotEqual),
                    Some(other) => return Err(SelectorError::UnexpectedToken(format!("<{}", other))),
                    None => return Err(SelectorError::UnexpectedEnd),
                }
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        // '' is an escaped quote
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            text.push('\'');
                        }
                        Some('\'') => break,
                        Some(c) => text.push(c),
                        None => return Err(SelectorError::UnterminatedString),
                    }
                }
                tokens.push(Token::Text(text));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut number = String::new();
                number.push(c);
                chars.next();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Identifier(word));
            }
            other => return Err(SelectorError::UnexpectedToken(other.to_string())),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_single_equality() {
        let selector = Selector::parse("region = 'eu'").unwrap();
        assert!(selector.matches(&properties(&[("region", FieldValue::from("eu"))])));
        assert!(!selector.matches(&properties(&[("region", FieldValue::from("us"))])));
    }

    #[test]
    fn test_conjunction_and_inequality() {
        let selector = Selector::parse("region = 'eu' AND attempt <> 3 and urgent = TRUE").unwrap();
        let matching = properties(&[
            ("region", FieldValue::from("eu")),
            ("attempt", FieldValue::Int(1)),
            ("urgent", FieldValue::Bool(true)),
        ]);
        assert!(selector.matches(&matching));

        let third_attempt = properties(&[
            ("region", FieldValue::from("eu")),
            ("attempt", FieldValue::Int(3)),
            ("urgent", FieldValue::Bool(true)),
        ]);
        assert!(!selector.matches(&third_attempt));
    }

    #[test]
    fn test_missing_property_never_selects() {
        let selector = Selector::parse("region <> 'eu'").unwrap();
        assert!(!selector.matches(&BTreeMap::new()));
    }

    #[test]
    fn test_type_mismatch_never_selects() {
        let selector = Selector::parse("attempt <> '3'").unwrap();
        assert!(!selector.matches(&properties(&[("attempt", FieldValue::Int(3))])));
    }

    #[test]
    fn test_numeric_widening() {
        let selector = Selector::parse("score = 2.5").unwrap();
        assert!(selector.matches(&properties(&[("score", FieldValue::Float(2.5))])));

        let selector = Selector::parse("score = 2").unwrap();
        assert!(selector.matches(&properties(&[("score", FieldValue::Float(2.0))])));
    }

    #[test]
    fn test_escaped_quote() {
        let selector = Selector::parse("name = 'o''brien'").unwrap();
        assert!(selector.matches(&properties(&[("name", FieldValue::from("o'brien"))])));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Selector::parse(""), Err(SelectorError::UnexpectedEnd));
        assert_eq!(Selector::parse("region ="), Err(SelectorError::UnexpectedEnd));
        assert_eq!(
            Selector::parse("region = 'eu"),
            Err(SelectorError::UnterminatedString)
        );
        assert_eq!(
            Selector::parse("region = 'eu' OR x = 1"),
            Err(SelectorError::UnexpectedToken("OR".to_string()))
        );
        assert!(matches!(
            Selector::parse("n = 1.2.3"),
            Err(SelectorError::InvalidNumber(_))
        ));
    }
}
