//! Parser for converting formula strings into [`Expr`] trees
//!
//! evalexpr builds the operator tree; this module maps it onto our expression
//! types. `t` and `time` read model time, `pi` is the constant, and any other
//! identifier is a model parameter.

use super::ast::{BinaryOperator, Expr, Function};
use super::error::ExpressionError;
use evalexpr::{Node, Operator};

const TIME_IDENTIFIERS: &[&str] = &["t", "time"];

/// Converts Python-style `**` to evalexpr's `^`.
fn preprocess_formula(formula: &str) -> String {
    formula.replace("**", "^")
}

/// Parse a formula string into an expression tree
pub fn parse_expression(formula: &str) -> Result<Expr, ExpressionError> {
    let tree = evalexpr::build_operator_tree(&preprocess_formula(formula))?;
    convert_node(&tree)
}

fn binary_operands(node: &Node, name: &str) -> Result<(Expr, Expr), ExpressionError> {
    let children = node.children();
    if children.len() != 2 {
        return Err(ExpressionError::InvalidExpression(format!(
            "{} requires exactly 2 operands",
            name
        )));
    }
    Ok((convert_node(&children[0])?, convert_node(&children[1])?))
}

/// Convert an evalexpr Node to our Expr
fn convert_node(node: &Node) -> Result<Expr, ExpressionError> {
    let binary = |op: BinaryOperator, name: &str| {
        binary_operands(node, name).map(|(left, right)| Expr::binary(op, left, right))
    };

    match node.operator() {
        // RootNode - just unwrap and convert the child
        Operator::RootNode => match node.children() {
            [child] => convert_node(child),
            [] => Err(ExpressionError::InvalidExpression(
                "empty expression".to_string(),
            )),
            _ => Err(ExpressionError::InvalidExpression(
                "RootNode should have exactly 1 child".to_string(),
            )),
        },

        Operator::Const { value } => match value {
            evalexpr::Value::Float(f) => Ok(Expr::Constant(*f)),
            evalexpr::Value::Int(i) => Ok(Expr::Constant(*i as f64)),
            _ => Err(ExpressionError::InvalidExpression(
                "Unsupported constant type".to_string(),
            )),
        },

        Operator::VariableIdentifierRead { identifier } => {
            if TIME_IDENTIFIERS.contains(&identifier.as_str()) {
                Ok(Expr::Time)
            } else if identifier == "pi" {
                Ok(Expr::Constant(std::f64::consts::PI))
            } else {
                Ok(Expr::Parameter(identifier.clone()))
            }
        }

        Operator::Add => binary(BinaryOperator::Add, "Add"),
        Operator::Sub => binary(BinaryOperator::Sub, "Sub"),
        Operator::Mul => binary(BinaryOperator::Mul, "Mul"),
        Operator::Div => binary(BinaryOperator::Div, "Div"),
        Operator::Exp => binary(BinaryOperator::Pow, "Exp"),

        Operator::Neg => match node.children() {
            [operand] => Ok(-convert_node(operand)?),
            _ => Err(ExpressionError::InvalidExpression(
                "Neg requires exactly 1 operand".to_string(),
            )),
        },

        Operator::FunctionIdentifier { identifier } => {
            let function = Function::from_name(identifier)
                .ok_or_else(|| ExpressionError::UnknownFunction(identifier.clone()))?;
            let args = function_arguments(node)?;
            Expr::call(function, args)
        }

        // A parenthesised single value
        Operator::Tuple => match node.children() {
            [child] => convert_node(child),
            children => Err(ExpressionError::InvalidExpression(format!(
                "Unexpected tuple with {} elements in expression",
                children.len()
            ))),
        },

        _ => Err(ExpressionError::InvalidExpression(format!(
            "Unsupported operator: {:?}",
            node.operator()
        ))),
    }
}

/// Extract call arguments.
///
/// evalexpr represents multi-argument calls as
/// `FunctionIdentifier -> RootNode -> Tuple -> [args]`.
fn function_arguments(node: &Node) -> Result<Vec<Expr>, ExpressionError> {
    let children = node.children();
    let [child] = children else {
        return children.iter().map(convert_node).collect();
    };

    let tuple = match child.operator() {
        Operator::Tuple => Some(child),
        Operator::RootNode => match child.children() {
            [grandchild] if matches!(grandchild.operator(), Operator::Tuple) => Some(grandchild),
            _ => None,
        },
        _ => None,
    };

    match tuple {
        Some(tuple) => tuple.children().iter().map(convert_node).collect(),
        None => Ok(vec![convert_node(child)?]),
    }
}
