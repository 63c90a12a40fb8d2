use std::fmt;

/// Name given to the synthetic prototype wrapping a top-level expression.
pub const ANON_FN_NAME: &str = "__anon_expr";

#[derive(Debug, PartialEq, Clone)]
pub struct Prototype {
    pub name: String,
    pub args: Vec<String>,
}

impl Prototype {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANON_FN_NAME, Vec::new())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Literal(f64),
    Variable(String),
    Binary(char, Box<Expression>, Box<Expression>),
    Call(String, Vec<Expression>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub prototype: Prototype,
    pub body: Expression,
}

#[derive(Debug, PartialEq, Clone)]
pub enum ASTNode {
    Extern(Prototype),
    Function(Function),
    /// A bare expression wrapped in an anonymous zero-argument function.
    TopLevel(Function),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{}", value),
            Expression::Variable(name) => write!(f, "{}", name),
            Expression::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op, rhs),
            Expression::Call(callee, args) => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(" "))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {} {}", self.prototype, self.body)
    }
}

impl fmt::Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ASTNode::Extern(proto) => write!(f, "extern {}", proto),
            ASTNode::Function(func) => write!(f, "{}", func),
            ASTNode::TopLevel(func) => write!(f, "{}", func.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_prints_fully_parenthesized() {
        let expr = Expression::Binary(
            '*',
            Box::new(Expression::Binary(
                '+',
                Box::new(Expression::Variable("a".to_string())),
                Box::new(Expression::Literal(1.5)),
            )),
            Box::new(Expression::Call(
                "f".to_string(),
                vec![Expression::Literal(2.0), Expression::Variable("b".to_string())],
            )),
        );
        assert_eq!(expr.to_string(), "((a + 1.5) * f(2, b))");
    }

    #[test]
    fn prints_definitions_and_externs() {
        let proto = Prototype::new("add", vec!["x".to_string(), "y".to_string()]);
        let func = Function {
            prototype: proto.clone(),
            body: Expression::Variable("x".to_string()),
        };
        assert_eq!(ASTNode::Extern(proto).to_string(), "extern add(x y)");
        assert_eq!(ASTNode::Function(func).to_string(), "def add(x y) x");
    }
}
