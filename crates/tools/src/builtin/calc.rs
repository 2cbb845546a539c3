use config::ToolsConfig;
use serde_json::{Value, json};

use crate::{OutputKind, Tool, ToolContext, ToolDescriptor, ToolError, ToolOutput};

/// Arithmetic expression evaluator.
///
/// Supports `+ - * / % ^`, parentheses and unary minus over 64-bit floats.
/// No variables, no functions, no I/O.
pub struct CalculateTool {
    descriptor: ToolDescriptor,
}

impl CalculateTool {
    /// Build the tool.
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "calculate".to_string(),
                description: "Evaluate an arithmetic expression, e.g. '2 * (3 + 4) ^ 2'. \
                              Supports + - * / % ^ and parentheses."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "expression": {
                            "type": "string",
                            "description": "The expression to evaluate"
                        }
                    },
                    "required": ["expression"],
                    "additionalProperties": false
                }),
                output_kind: OutputKind::Text,
                max_execution_ms: 1_000,
                max_output_bytes: config.max_output_bytes,
                cacheable: false,
                cache_ttl_seconds: 0,
                idempotency_key_fields: Vec::new(),
            },
        }
    }
}

#[async_trait::async_trait]
impl Tool for CalculateTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let expression = arguments
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::new("Missing 'expression'"))?;

        let value = eval(expression).map_err(ToolError::new)?;

        Ok(ToolOutput::text(format_number(value)))
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

/// Evaluate with a recursive descent parser: addition < multiplication <
/// unary minus < power (right associative) < atoms.
fn eval(input: &str) -> Result<f64, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, position: 0 };
    let value = parser.expression()?;

    if parser.position != parser.tokens.len() {
        return Err(format!("Unexpected trailing input at token {}", parser.position + 1));
    }

    if !value.is_finite() {
        return Err("Expression did not evaluate to a finite number".to_string());
    }

    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            ' ' | '\t' | '\n' => continue,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '^' => Token::Caret,
            '(' => Token::Open,
            ')' => Token::Close,
            '0'..='9' | '.' => {
                let mut end = start + c.len_utf8();

                while let Some((i, next)) = chars.peek().copied() {
                    if next.is_ascii_digit() || next == '.' {
                        end = i + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }

                let literal = &input[start..end];
                let number: f64 = literal.parse().map_err(|_| format!("Invalid number '{literal}'"))?;
                tokens.push(Token::Number(number));
                continue;
            }
            other => return Err(format!("Unexpected character '{other}'")),
        };

        tokens.push(token);
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expression(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;

        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.advance();
                    value += self.term()?;
                }
                Token::Minus => {
                    self.advance();
                    value -= self.term()?;
                }
                _ => break,
            }
        }

        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;

        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.advance();
                    value *= self.unary()?;
                }
                Token::Slash => {
                    self.advance();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err("Division by zero".to_string());
                    }
                    value /= divisor;
                }
                Token::Percent => {
                    self.advance();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err("Division by zero".to_string());
                    }
                    value %= divisor;
                }
                _ => break,
            }
        }

        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.peek() == Some(Token::Minus) {
            self.advance();
            return Ok(-self.unary()?);
        }

        self.power()
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;

        if self.peek() == Some(Token::Caret) {
            self.advance();
            // Right associative: 2 ^ 3 ^ 2 is 2 ^ (3 ^ 2).
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }

        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Open) => {
                let value = self.expression()?;
                if self.advance() != Some(Token::Close) {
                    return Err("Missing closing parenthesis".to_string());
                }
                Ok(value)
            }
            Some(token) => Err(format!("Unexpected token {token:?}")),
            None => Err("Unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(eval("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(eval("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(eval("2 * (3 + 4) ^ 2").unwrap(), 98.0);
        assert_eq!(eval("10 % 3").unwrap(), 1.0);
    }

    #[test]
    fn unary_minus_and_right_associative_power() {
        assert_eq!(eval("-3 + 5").unwrap(), 2.0);
        assert_eq!(eval("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(eval("-2 ^ 2").unwrap(), -4.0);
    }

    #[test]
    fn errors_are_descriptive() {
        assert!(eval("1 / 0").unwrap_err().contains("Division by zero"));
        assert!(eval("2 +").unwrap_err().contains("end of expression"));
        assert!(eval("(1 + 2").unwrap_err().contains("closing parenthesis"));
        assert!(eval("1 $ 2").unwrap_err().contains("Unexpected character"));
        assert!(eval("1 2").unwrap_err().contains("trailing"));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-7.0), "-7");
    }

    #[tokio::test]
    async fn tool_wiring() {
        let tool = CalculateTool::new(&ToolsConfig::default());
        let ctx = ToolContext::new(reqwest::Client::new());

        let output = tool
            .invoke(serde_json::json!({ "expression": "6 * 7" }), &ctx)
            .await
            .unwrap();

        assert_eq!(output.content, "42");
    }
}
