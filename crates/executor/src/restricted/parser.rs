//! Recursive-descent parser for the restricted scripting subset.

use super::lexer::Tok;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    NoneLit,
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// Call to a name in the builtin namespace; nothing else is callable.
    Call(String, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign {
        name: String,
        op: Option<BinOp>,
        value: Expr,
    },
    IndexAssign {
        name: String,
        index: Expr,
        value: Expr,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
}

pub struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Tok>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> Result<Vec<Stmt>, String> {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !self.check(&Tok::Eof) {
            stmts.push(self.parse_stmt()?);
            self.skip_newlines();
        }
        Ok(stmts)
    }

    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).unwrap_or(&Tok::Eof)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<(), String> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(format!("expected {}, found {:?}", what, self.peek()))
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&Tok::Newline) {
            self.advance();
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        match self.peek() {
            Tok::If => self.parse_if(),
            Tok::While => self.parse_while(),
            Tok::For => self.parse_for(),
            Tok::Break => {
                self.advance();
                self.end_of_stmt()?;
                Ok(Stmt::Break)
            }
            Tok::Continue => {
                self.advance();
                self.end_of_stmt()?;
                Ok(Stmt::Continue)
            }
            _ => self.parse_simple_stmt(),
        }
    }

    fn end_of_stmt(&mut self) -> Result<(), String> {
        if self.check(&Tok::Eof) || self.check(&Tok::Dedent) {
            return Ok(());
        }
        self.expect(&Tok::Newline, "end of statement")
    }

    fn parse_simple_stmt(&mut self) -> Result<Stmt, String> {
        let expr = self.parse_expr()?;

        let aug: Option<BinOp> = match self.peek() {
            Tok::Assign => None,
            Tok::PlusAssign => Some(BinOp::Add),
            Tok::MinusAssign => Some(BinOp::Sub),
            Tok::StarAssign => Some(BinOp::Mul),
            Tok::SlashAssign => Some(BinOp::Div),
            _ => {
                self.end_of_stmt()?;
                return Ok(Stmt::Expr(expr));
            }
        };
        self.advance();
        let value = self.parse_expr()?;
        self.end_of_stmt()?;

        match expr {
            Expr::Name(name) => Ok(Stmt::Assign {
                name,
                op: aug,
                value,
            }),
            Expr::Index(obj, index) => {
                if aug.is_some() {
                    return Err("augmented assignment to an index is not supported".to_string());
                }
                match *obj {
                    Expr::Name(name) => Ok(Stmt::IndexAssign {
                        name,
                        index: *index,
                        value,
                    }),
                    _ => Err("can only assign to an index on a variable".to_string()),
                }
            }
            _ => Err("invalid assignment target".to_string()),
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, String> {
        self.expect(&Tok::Colon, "':'")?;
        self.expect(&Tok::Newline, "newline after ':'")?;
        self.skip_newlines();
        self.expect(&Tok::Indent, "indented block")?;
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !self.check(&Tok::Dedent) && !self.check(&Tok::Eof) {
            stmts.push(self.parse_stmt()?);
            self.skip_newlines();
        }
        self.eat(&Tok::Dedent);
        Ok(stmts)
    }

    fn parse_if(&mut self) -> Result<Stmt, String> {
        self.expect(&Tok::If, "'if'")?;
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        branches.push((cond, self.parse_block()?));

        let mut else_body = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(&Tok::Elif) {
                let cond = self.parse_expr()?;
                branches.push((cond, self.parse_block()?));
            } else if self.eat(&Tok::Else) {
                else_body = self.parse_block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If {
            branches,
            else_body,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, String> {
        self.expect(&Tok::While, "'while'")?;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_for(&mut self) -> Result<Stmt, String> {
        self.expect(&Tok::For, "'for'")?;
        let var = match self.advance() {
            Tok::Ident(name) => name,
            other => return Err(format!("expected loop variable, found {:?}", other)),
        };
        self.expect(&Tok::In, "'in'")?;
        let iter = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::For { var, iter, body })
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_not()?;
        while self.eat(&Tok::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.eat(&Tok::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_arith()?;
        loop {
            let op = match self.peek() {
                Tok::EqEq => BinOp::Eq,
                Tok::NotEq => BinOp::Ne,
                Tok::Lt => BinOp::Lt,
                Tok::LtEq => BinOp::Le,
                Tok::Gt => BinOp::Gt,
                Tok::GtEq => BinOp::Ge,
                Tok::In => BinOp::In,
                Tok::Not => {
                    // "not in"
                    self.advance();
                    self.expect(&Tok::In, "'in' after 'not'")?;
                    let right = self.parse_arith()?;
                    left = Expr::Binary(BinOp::NotIn, Box::new(left), Box::new(right));
                    continue;
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_arith()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_arith(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::SlashSlash => BinOp::FloorDiv,
                Tok::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Tok::Minus => {
                self.advance();
                let operand = self.parse_factor()?;
                Ok(Expr::Unary(UnOp::Neg, Box::new(operand)))
            }
            Tok::Plus => {
                self.advance();
                let operand = self.parse_factor()?;
                Ok(Expr::Unary(UnOp::Pos, Box::new(operand)))
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_postfix()?;
        if self.eat(&Tok::StarStar) {
            // right associative
            let exp = self.parse_factor()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat(&Tok::LParen) {
                let name = match expr {
                    Expr::Name(ref name) => name.clone(),
                    _ => return Err("only builtin names are callable".to_string()),
                };
                let mut args = Vec::new();
                if !self.check(&Tok::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Tok::RParen, "')'")?;
                expr = Expr::Call(name, args);
            } else if self.eat(&Tok::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&Tok::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Tok::Int(n) => Ok(Expr::Int(n)),
            Tok::Float(f) => Ok(Expr::Float(f)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::True => Ok(Expr::Bool(true)),
            Tok::False => Ok(Expr::Bool(false)),
            Tok::NoneKw => Ok(Expr::NoneLit),
            Tok::Ident(name) => Ok(Expr::Name(name)),
            Tok::LParen => {
                if self.eat(&Tok::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.eat(&Tok::Comma) {
                    let mut items = vec![first];
                    while !self.check(&Tok::RParen) {
                        items.push(self.parse_expr()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                    self.expect(&Tok::RParen, "')'")?;
                    Ok(Expr::Tuple(items))
                } else {
                    self.expect(&Tok::RParen, "')'")?;
                    Ok(first)
                }
            }
            Tok::LBracket => {
                let mut items = Vec::new();
                while !self.check(&Tok::RBracket) {
                    items.push(self.parse_expr()?);
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(&Tok::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Tok::LBrace => {
                let mut items = Vec::new();
                while !self.check(&Tok::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(&Tok::Colon, "':' in dict literal")?;
                    let value = self.parse_expr()?;
                    items.push((key, value));
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(&Tok::RBrace, "'}'")?;
                Ok(Expr::Dict(items))
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse(source: &str) -> Result<Vec<Stmt>, String> {
        Parser::new(tokenize(source)?).parse_program()
    }

    #[test]
    fn test_call_statement() {
        let stmts = parse("print(2+2)").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(&stmts[0], Stmt::Expr(Expr::Call(name, args)) if name == "print" && args.len() == 1));
    }

    #[test]
    fn test_assignment_and_augmented() {
        let stmts = parse("x = 1\nx += 2").unwrap();
        assert!(matches!(&stmts[0], Stmt::Assign { op: None, .. }));
        assert!(matches!(&stmts[1], Stmt::Assign { op: Some(BinOp::Add), .. }));
    }

    #[test]
    fn test_if_elif_else() {
        let stmts = parse("if x > 0:\n    print(1)\nelif x < 0:\n    print(2)\nelse:\n    print(3)").unwrap();
        match &stmts[0] {
            Stmt::If {
                branches,
                else_body,
            } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(else_body.len(), 1);
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_for_and_while() {
        let stmts = parse("for i in range(3):\n    print(i)\nwhile False:\n    break").unwrap();
        assert!(matches!(&stmts[0], Stmt::For { .. }));
        assert!(matches!(&stmts[1], Stmt::While { .. }));
    }

    #[test]
    fn test_index_assignment() {
        let stmts = parse("d['k'] = 5").unwrap();
        assert!(matches!(&stmts[0], Stmt::IndexAssign { name, .. } if name == "d"));
    }

    #[test]
    fn test_only_names_are_callable() {
        assert!(parse("(1)(2)").is_err());
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse("1 = 2").is_err());
    }
}
