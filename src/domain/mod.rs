//! Arithmetic domain shared by the math tools.

use std::fmt;

use serde::{Deserialize, Deserializer};

use crate::core::error::ToolError;

/// A JSON number kept exact when it is an integer. Integers cover the whole
/// i64 and u64 ranges and results widen to i128.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i128),
    Float(f64),
}

impl From<serde_json::Number> for Number {
    fn from(n: serde_json::Number) -> Self {
        if let Some(i) = n.as_i64() {
            return Number::Int(i.into());
        }
        if let Some(u) = n.as_u64() {
            return Number::Int(u.into());
        }
        Number::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

impl<'de> Deserialize<'de> for Number {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        serde_json::Number::deserialize(d).map(Number::from)
    }
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

/// Shortest round-trip float text: positional for decimal exponents in
/// `-4..16`, otherwise `<mantissa>e<sign><two or more digits>` (`1e-07`,
/// `1.5e+300`). Whole values keep a trailing `.0`.
fn format_float(x: f64) -> String {
    if !x.is_finite() {
        return x.to_string();
    }
    let sci = format!("{x:e}");
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if (-4..16).contains(&exp) {
        let plain = x.to_string();
        if plain.contains('.') { plain } else { format!("{plain}.0") }
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// Arguments of a binary arithmetic tool.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Operands {
    pub a: Number,
    pub b: Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Multiply,
}

impl BinaryOp {
    /// Integers use checked 128-bit math; any float operand switches to f64.
    pub fn apply(self, ops: Operands) -> Result<Number, ToolError> {
        match (ops.a, ops.b) {
            (Number::Int(a), Number::Int(b)) => {
                let out = match self {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Multiply => a.checked_mul(b),
                };
                out.map(Number::Int)
                    .ok_or_else(|| ToolError::Execution(format!("integer overflow computing {self:?} of {a} and {b}")))
            }
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                let out = match self {
                    BinaryOp::Add => a + b,
                    BinaryOp::Multiply => a * b,
                };
                if out.is_finite() {
                    Ok(Number::Float(out))
                } else {
                    Err(ToolError::Execution(format!("result of {self:?} of {a} and {b} is not finite")))
                }
            }
        }
    }
}
