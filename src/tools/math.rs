use async_trait::async_trait;
use rmcp::model::CallToolResult;

use crate::core::content::text_result;
use crate::core::error::ToolError;
use crate::core::tool::{InputSchema, ParamType, ToolSpec, TypedTool};
use crate::domain::{BinaryOp, Operands};

fn operand_schema(verb: &str) -> InputSchema {
    InputSchema::object()
        .required("a", ParamType::Number, &format!("First number to {verb}"))
        .required("b", ParamType::Number, &format!("Second number to {verb}"))
}

#[derive(Clone, Default)]
pub struct AddTool;

impl ToolSpec for AddTool {
    fn name(&self) -> &'static str {
        "add"
    }
    fn description(&self) -> &'static str {
        "Adds two numbers"
    }
    fn input_schema(&self) -> InputSchema {
        operand_schema("add")
    }
}

#[async_trait]
impl TypedTool for AddTool {
    type Args = Operands;

    async fn run(&self, args: Operands) -> Result<CallToolResult, ToolError> {
        let sum = BinaryOp::Add.apply(args)?;
        Ok(text_result(sum.to_string()))
    }
}

#[derive(Clone, Default)]
pub struct MultiplyTool;

impl ToolSpec for MultiplyTool {
    fn name(&self) -> &'static str {
        "multiply"
    }
    fn description(&self) -> &'static str {
        "Multiplies two numbers"
    }
    fn input_schema(&self) -> InputSchema {
        operand_schema("multiply")
    }
}

#[async_trait]
impl TypedTool for MultiplyTool {
    type Args = Operands;

    async fn run(&self, args: Operands) -> Result<CallToolResult, ToolError> {
        let product = BinaryOp::Multiply.apply(args)?;
        Ok(text_result(product.to_string()))
    }
}
