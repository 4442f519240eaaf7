use super::lexer::{Spanned, Token};
use super::value::Value;
use super::EvalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Logical(Box<Expr>, LogicalOp, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Member(Box<Expr>, String),
    Block(Vec<Stmt>),
    If {
        cond: Box<Expr>,
        then: Vec<Stmt>,
        otherwise: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign(String, Expr),
    Expr(Expr),
}

/// Deepest expression tree the parser will build.
///
/// Parsing, evaluation and dropping an `Expr` all recurse once per level, so
/// this keeps them well inside a 2 MiB thread stack.
pub const MAX_NESTING: usize = 128;

pub fn parse(tokens: Vec<Spanned>) -> Result<Vec<Stmt>, EvalError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let program = parser.statements(&Token::Eof)?;
    parser.expect(&Token::Eof, "end of input")?;
    Ok(program)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Open nesting levels: groups, blocks, unary operators and chained operands
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map_or(&Token::Eof, |spanned| &spanned.token)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map_or(&Token::Eof, |spanned| &spanned.token)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> EvalError {
        let (line, column) = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or((1, 1), |s| (s.line, s.column));
        EvalError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), EvalError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", what, describe(self.peek()))))
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn skip_separators(&mut self) {
        while self.eat(&Token::Newline) || self.eat(&Token::Semi) {}
    }

    /// Statements up to (not including) `end`
    fn statements(&mut self, end: &Token) -> Result<Vec<Stmt>, EvalError> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while !self.check(end) && !self.check(&Token::Eof) {
            stmts.push(self.statement()?);
            if !self.check(end) && !matches!(self.peek(), Token::Newline | Token::Semi) {
                return Err(self.error(format!(
                    "expected end of statement, found {}",
                    describe(self.peek())
                )));
            }
            self.skip_separators();
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, EvalError> {
        if let (Token::Ident(name), Token::Assign) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.advance();
            self.advance();
            self.skip_newlines();
            return Ok(Stmt::Assign(name, self.expression()?));
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, EvalError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.and()?;
        let mut chained = 0;
        while self.eat(&Token::OrOr) {
            self.enter()?;
            chained += 1;
            self.skip_newlines();
            let right = self.and()?;
            left = Expr::Logical(Box::new(left), LogicalOp::Or, Box::new(right));
        }
        self.leave(chained);
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.equality()?;
        let mut chained = 0;
        while self.eat(&Token::AndAnd) {
            self.enter()?;
            chained += 1;
            self.skip_newlines();
            let right = self.equality()?;
            left = Expr::Logical(Box::new(left), LogicalOp::And, Box::new(right));
        }
        self.leave(chained);
        Ok(left)
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, EvalError>,
    ) -> Result<Expr, EvalError> {
        let mut left = next(self)?;
        let mut chained = 0;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    // Each operand deepens the left-leaning tree by one
                    self.enter()?;
                    chained += 1;
                    self.skip_newlines();
                    let right = next(self)?;
                    left = Expr::Binary(Box::new(left), *op, Box::new(right));
                    continue 'outer;
                }
            }
            self.leave(chained);
            return Ok(left);
        }
    }

    fn equality(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[(Token::EqEq, BinaryOp::Eq), (Token::NotEq, BinaryOp::Ne)],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[
                (Token::Lt, BinaryOp::Lt),
                (Token::Le, BinaryOp::Le),
                (Token::Gt, BinaryOp::Gt),
                (Token::Ge, BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        let op = if self.eat(&Token::Minus) {
            UnaryOp::Neg
        } else if self.eat(&Token::Bang) {
            UnaryOp::Not
        } else {
            return self.postfix();
        };
        self.enter()?;
        let operand = self.unary()?;
        self.leave(1);
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.primary()?;
        let mut chained = 0;
        loop {
            if self.eat(&Token::LParen) {
                self.enter()?;
                chained += 1;
                expr = Expr::Call(Box::new(expr), self.arguments()?);
            } else if self.eat(&Token::Dot) {
                self.enter()?;
                chained += 1;
                self.skip_newlines();
                match self.advance() {
                    Token::Ident(name) => expr = Expr::Member(Box::new(expr), name),
                    other => {
                        self.pos -= 1;
                        return Err(self.error(format!(
                            "expected member name, found {}",
                            describe(&other)
                        )));
                    }
                }
            } else {
                self.leave(chained);
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut args = Vec::new();
        self.skip_newlines();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            self.skip_newlines();
            if self.eat(&Token::Comma) {
                self.skip_newlines();
                continue;
            }
            self.expect(&Token::RParen, "')'")?;
            return Ok(args);
        }
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Nil => Ok(Expr::Literal(Value::Nil)),
            Token::Ident(name) => Ok(Expr::Var(name)),
            Token::LParen => {
                self.enter()?;
                self.skip_newlines();
                let inner = self.expression()?;
                self.skip_newlines();
                self.expect(&Token::RParen, "')'")?;
                self.leave(1);
                Ok(inner)
            }
            Token::LBrace => Ok(Expr::Block(self.block_body()?)),
            Token::If => self.if_expr(),
            other => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("unexpected {}", describe(&other))))
            }
        }
    }

    /// Body of a block whose `{` was already consumed
    fn block_body(&mut self) -> Result<Vec<Stmt>, EvalError> {
        self.enter()?;
        let body = self.statements(&Token::RBrace)?;
        self.expect(&Token::RBrace, "'}'")?;
        self.leave(1);
        Ok(body)
    }

    fn if_expr(&mut self) -> Result<Expr, EvalError> {
        self.enter()?;
        let expr = self.if_chain();
        self.leave(1);
        expr
    }

    fn if_chain(&mut self) -> Result<Expr, EvalError> {
        let cond = self.expression()?;
        self.expect(&Token::LBrace, "'{' after if condition")?;
        let then = self.block_body()?;

        // `else` may start the next line
        let mark = self.pos;
        self.skip_newlines();
        if !self.eat(&Token::Else) {
            self.pos = mark;
            return Ok(Expr::If {
                cond: Box::new(cond),
                then,
                otherwise: None,
            });
        }

        let otherwise = if self.eat(&Token::If) {
            self.if_expr()?
        } else {
            self.expect(&Token::LBrace, "'{' after else")?;
            Expr::Block(self.block_body()?)
        };

        Ok(Expr::If {
            cond: Box::new(cond),
            then,
            otherwise: Some(Box::new(otherwise)),
        })
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(i) => format!("number {}", i),
        Token::Float(x) => format!("number {}", x),
        Token::Str(_) => "string".to_string(),
        Token::Ident(name) => format!("'{}'", name),
        Token::Newline => "end of line".to_string(),
        Token::Eof => "end of input".to_string(),
        other => format!("'{}'", symbol(other)),
    }
}

fn symbol(token: &Token) -> &'static str {
    match token {
        Token::True => "true",
        Token::False => "false",
        Token::Nil => "nil",
        Token::If => "if",
        Token::Else => "else",
        Token::LParen => "(",
        Token::RParen => ")",
        Token::LBrace => "{",
        Token::RBrace => "}",
        Token::Comma => ",",
        Token::Semi => ";",
        Token::Dot => ".",
        Token::Assign => "=",
        Token::Plus => "+",
        Token::Minus => "-",
        Token::Star => "*",
        Token::Slash => "/",
        Token::Percent => "%",
        Token::EqEq => "==",
        Token::NotEq => "!=",
        Token::Lt => "<",
        Token::Le => "<=",
        Token::Gt => ">",
        Token::Ge => ">=",
        Token::AndAnd => "&&",
        Token::OrOr => "||",
        Token::Bang => "!",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse_str(source: &str) -> Result<Vec<Stmt>, EvalError> {
        parse(tokenize(source)?)
    }

    #[test]
    fn test_precedence() {
        let program = parse_str("1 + 2 * 3").expect("parse");
        assert_eq!(
            program,
            vec![Stmt::Expr(Expr::Binary(
                Box::new(Expr::Literal(Value::Int(1))),
                BinaryOp::Add,
                Box::new(Expr::Binary(
                    Box::new(Expr::Literal(Value::Int(2))),
                    BinaryOp::Mul,
                    Box::new(Expr::Literal(Value::Int(3))),
                )),
            ))]
        );
    }

    #[test]
    fn test_assignment_and_comparison_differ() {
        let program = parse_str("x = 1\nx == 1\n").expect("parse");
        assert!(matches!(program[0], Stmt::Assign(ref name, _) if name == "x"));
        assert!(matches!(
            program[1],
            Stmt::Expr(Expr::Binary(_, BinaryOp::Eq, _))
        ));
    }

    #[test]
    fn test_operator_at_line_end_joins_next_line() {
        let program = parse_str("x = 1 +\n2\n").expect("parse");
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn test_else_on_next_line() {
        let program = parse_str("if true {\n1\n}\nelse {\n2\n}\n").expect("parse");
        assert_eq!(program.len(), 1);
        assert!(matches!(
            program[0],
            Stmt::Expr(Expr::If { otherwise: Some(_), .. })
        ));
    }

    #[test]
    fn test_member_call() {
        let program = parse_str("host.greet(\"a\",\n  \"b\")").expect("parse");
        let Stmt::Expr(Expr::Call(callee, args)) = &program[0] else {
            panic!("expected call, got {:?}", program);
        };
        assert!(matches!(**callee, Expr::Member(_, ref name) if name == "greet"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_missing_paren_reports_position() {
        let err = parse_str("f(1, 2").unwrap_err();
        let EvalError::Syntax { line, message, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(line, 1);
        assert!(message.contains("')'"), "{message}");
    }

    #[test]
    fn test_two_expressions_on_one_line_is_an_error() {
        assert!(parse_str("1 2").is_err());
    }

    fn assert_too_deep(source: &str) {
        match parse_str(source) {
            Err(EvalError::Syntax { message, .. }) => {
                assert_eq!(message, "expression nested too deeply")
            }
            other => panic!("expected nesting error, got {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_deep_parentheses_are_rejected() {
        let n = 100_000;
        assert_too_deep(&format!("{}1{}", "(".repeat(n), ")".repeat(n)));
        // Unbalanced input hits the limit before the missing ')'
        assert_too_deep(&"(".repeat(n));
    }

    #[test]
    fn test_deep_unary_is_rejected() {
        assert_too_deep(&format!("{}1", "-".repeat(100_000)));
        assert_too_deep(&format!("{}true", "!".repeat(100_000)));
    }

    #[test]
    fn test_long_operator_chains_are_rejected() {
        assert_too_deep(&format!("1{}", "+1".repeat(100_000)));
        assert_too_deep(&format!("f{}", "()".repeat(100_000)));
        assert_too_deep(&format!("{}1{}", "{".repeat(100_000), "}".repeat(100_000)));
    }

    #[test]
    fn test_nesting_below_limit_parses() {
        let n = MAX_NESTING / 2;
        let program = parse_str(&format!("{}1{}", "(".repeat(n), ")".repeat(n))).expect("parse");
        assert_eq!(program, vec![Stmt::Expr(Expr::Literal(Value::Int(1)))]);

        parse_str(&format!("{}1", "-".repeat(n))).expect("parse");
        parse_str(&format!("1{}", "+1".repeat(n))).expect("parse");
    }

    #[test]
    fn test_depth_is_released_between_siblings() {
        let group = format!("{}1{}", "(".repeat(90), ")".repeat(90));
        let source = vec![group; 20].join(" + ");
        parse_str(&source).expect("parse");
    }
}
