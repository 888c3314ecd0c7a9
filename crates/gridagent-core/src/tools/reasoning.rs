//! Reasoning tools: always registered, no side effects beyond text.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{ToolContext, ToolDefinition, ToolHandler, ToolRegistry};

/// Register the reasoning family: think, web_search, calculator.
pub fn register_reasoning_tools(registry: &mut ToolRegistry) {
    registry.register(ToolDefinition::new(
        "think",
        "Record an intermediate reasoning step without taking any action",
        "the thought to record",
        Arc::new(ThinkTool),
    ));
    registry.register(ToolDefinition::new(
        "web_search",
        "Search the web for information (stub: suggests rephrasing as reasoning)",
        "the search query",
        Arc::new(WebSearchTool),
    ));
    registry.register(ToolDefinition::new(
        "calculator",
        "Evaluate an arithmetic expression (+, -, *, /, parentheses)",
        "the expression, e.g. (2 + 3) * 4",
        Arc::new(CalculatorTool),
    ));
}

struct ThinkTool;

#[async_trait]
impl ToolHandler for ThinkTool {
    async fn call(&self, input: &str, _ctx: &ToolContext) -> Result<String> {
        Ok(format!("Thought recorded: {input}"))
    }
}

struct WebSearchTool;

#[async_trait]
impl ToolHandler for WebSearchTool {
    async fn call(&self, input: &str, _ctx: &ToolContext) -> Result<String> {
        // No network access in the execution core; the agent must reason
        // from its own knowledge instead.
        Ok(format!(
            "Web search is not available on this node. Answer from your own knowledge \
             or use another tool. (query was: {input})"
        ))
    }
}

struct CalculatorTool;

#[async_trait]
impl ToolHandler for CalculatorTool {
    async fn call(&self, input: &str, _ctx: &ToolContext) -> Result<String> {
        Ok(evaluate(input))
    }
}

/// Evaluate an arithmetic expression after stripping everything outside
/// the numeric/operator character set. No general-purpose evaluator is
/// ever handed unsanitized input; failures come back as a structured
/// error string, never as an error.
fn evaluate(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || "+-*/(). ".contains(*c))
        .collect();
    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        return "Calculation error: no numeric expression found".to_string();
    }

    let mut parser = Parser {
        chars: sanitized.as_bytes(),
        pos: 0,
    };
    match parser.expression() {
        Ok(value) => {
            parser.skip_spaces();
            if parser.pos != parser.chars.len() {
                return format!(
                    "Calculation error: unexpected input at position {}",
                    parser.pos
                );
            }
            if value.fract() == 0.0 && value.abs() < 1e15 {
                format!("{sanitized} = {}", value as i64)
            } else {
                format!("{sanitized} = {value}")
            }
        }
        Err(e) => format!("Calculation error: {e}"),
    }
}

/// Recursive-descent parser over `expr := term (('+'|'-') term)*`,
/// `term := factor (('*'|'/') factor)*`, `factor := number | '(' expr ')'
/// | '-' factor`.
struct Parser<'a> {
    chars: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn skip_spaces(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] == b' ' {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_spaces();
        self.chars.get(self.pos).copied()
    }

    fn expression(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                b'+' => {
                    self.pos += 1;
                    value += self.term()?;
                }
                b'-' => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                b'*' => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                b'/' => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err("division by zero".into());
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> std::result::Result<f64, String> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(b'(') => {
                self.pos += 1;
                let value = self.expression()?;
                if self.peek() != Some(b')') {
                    return Err("missing closing parenthesis".into());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(format!("unexpected character '{}'", c as char)),
            None => Err("unexpected end of expression".into()),
        }
    }

    fn number(&mut self) -> std::result::Result<f64, String> {
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || *c == b'.')
        {
            self.pos += 1;
        }
        let literal = std::str::from_utf8(&self.chars[start..self.pos])
            .map_err(|_| "invalid number".to_string())?;
        literal
            .parse::<f64>()
            .map_err(|_| format!("invalid number '{literal}'"))
    }
}
