//! 条件表达式语法分析
//!
//! 采用优先级爬升（Pratt）解析，优先级从低到高：
//! `||` < `&&` < 比较/成员运算 < `+ -` < `* / %` < 一元运算 < 后缀（`.`、`[]`、调用）

use super::error::SyntaxError;
use super::lexer::{tokenize, Spanned, Token};
use regex::Regex;
use serde_json::Value;

/// 一元运算符
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

/// 二元运算符
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// 内置函数
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Builtin {
    Len,
    Lower,
    Upper,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "len" => Some(Builtin::Len),
            "lower" => Some(Builtin::Lower),
            "upper" => Some(Builtin::Upper),
            _ => None,
        }
    }
}

/// `matches` 右侧：字面量正则在编译期预编译
#[derive(Debug, Clone)]
pub(crate) enum Pattern {
    Static(Regex),
    Dynamic(Box<Expr>),
}

/// 语法树
#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Matches(Box<Expr>, Pattern),
    Call(Builtin, Vec<Expr>),
}

/// 解析整段条件文本
pub(crate) fn parse(source: &str) -> Result<Expr, SyntaxError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(SyntaxError::new(0, "empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
        depth: 0,
    };
    let expr = parser.parse_expr(0)?;
    if let Some(extra) = parser.peek_spanned() {
        return Err(SyntaxError::new(
            extra.position,
            format!("unexpected token {:?}", extra.token),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    /// 当前语法树深度
    depth: usize,
}

/// 中缀运算符的绑定强度
fn infix_binding(token: &Token, next: Option<&Token>) -> Option<(u8, BinaryOp, usize)> {
    let found = match token {
        Token::Or => (1, BinaryOp::Or, 1),
        Token::And => (2, BinaryOp::And, 1),
        Token::Eq => (3, BinaryOp::Eq, 1),
        Token::Ne => (3, BinaryOp::Ne, 1),
        Token::Lt => (3, BinaryOp::Lt, 1),
        Token::Le => (3, BinaryOp::Le, 1),
        Token::Gt => (3, BinaryOp::Gt, 1),
        Token::Ge => (3, BinaryOp::Ge, 1),
        Token::In => (3, BinaryOp::In, 1),
        Token::Not if next == Some(&Token::In) => (3, BinaryOp::NotIn, 2),
        Token::Contains => (3, BinaryOp::Contains, 1),
        Token::StartsWith => (3, BinaryOp::StartsWith, 1),
        Token::EndsWith => (3, BinaryOp::EndsWith, 1),
        Token::Plus => (4, BinaryOp::Add, 1),
        Token::Minus => (4, BinaryOp::Sub, 1),
        Token::Star => (5, BinaryOp::Mul, 1),
        Token::Slash => (5, BinaryOp::Div, 1),
        Token::Percent => (5, BinaryOp::Rem, 1),
        _ => return None,
    };
    Some(found)
}

const MATCHES_BINDING: u8 = 3;
const UNARY_BINDING: u8 = 6;

/// 语法树最大深度，括号、一元运算、运算符链与成员访问都计入
pub(crate) const MAX_NESTING_DEPTH: usize = 128;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|s| s.position)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), SyntaxError> {
        let position = self.position();
        match self.advance() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(SyntaxError::new(
                position,
                format!("expected {:?}, found {:?}", expected, t),
            )),
            None => Err(SyntaxError::new(
                position,
                format!("expected {:?}, found end of input", expected),
            )),
        }
    }

    fn descend(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(SyntaxError::new(
                self.position(),
                format!("expression nested deeper than {} levels", MAX_NESTING_DEPTH),
            ));
        }
        Ok(())
    }

    fn parse_expr(&mut self, min_binding: u8) -> Result<Expr, SyntaxError> {
        let entry = self.depth;
        let result = self.parse_operators(min_binding);
        self.depth = entry;
        result
    }

    fn parse_operators(&mut self, min_binding: u8) -> Result<Expr, SyntaxError> {
        self.descend()?;
        let mut lhs = self.parse_prefix()?;

        loop {
            let Some(token) = self.peek() else {
                break;
            };

            if *token == Token::Matches {
                if MATCHES_BINDING < min_binding {
                    break;
                }
                let position = self.position();
                self.pos += 1;
                self.descend()?;
                let rhs = self.parse_expr(MATCHES_BINDING + 1)?;
                let pattern = match rhs {
                    Expr::Literal(Value::String(ref source)) => {
                        let regex = Regex::new(source).map_err(|e| {
                            SyntaxError::new(position, format!("invalid regex: {}", e))
                        })?;
                        Pattern::Static(regex)
                    }
                    other => Pattern::Dynamic(Box::new(other)),
                };
                lhs = Expr::Matches(Box::new(lhs), pattern);
                continue;
            }

            let Some((binding, op, width)) = infix_binding(token, self.peek_at(1)) else {
                break;
            };
            if binding < min_binding {
                break;
            }
            self.pos += width;
            self.descend()?;
            let rhs = self.parse_expr(binding + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, SyntaxError> {
        let position = self.position();
        let Some(token) = self.advance() else {
            return Err(SyntaxError::new(position, "unexpected end of input"));
        };

        let expr = match token {
            Token::Int(n) => Expr::Literal(Value::from(n)),
            Token::Float(f) => Expr::Literal(Value::from(f)),
            Token::Str(s) => Expr::Literal(Value::String(s)),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Nil => Expr::Literal(Value::Null),
            Token::Not => {
                let operand = self.parse_expr(UNARY_BINDING)?;
                Expr::Unary(UnaryOp::Not, Box::new(operand))
            }
            Token::Minus => {
                let operand = self.parse_expr(UNARY_BINDING)?;
                Expr::Unary(UnaryOp::Neg, Box::new(operand))
            }
            Token::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen)?;
                inner
            }
            Token::LBracket => {
                let items = self.parse_list(Token::RBracket)?;
                Expr::Array(items)
            }
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    let builtin = Builtin::lookup(&name).ok_or_else(|| {
                        SyntaxError::new(position, format!("unknown function '{}'", name))
                    })?;
                    self.pos += 1;
                    let args = self.parse_list(Token::RParen)?;
                    if args.len() != 1 {
                        return Err(SyntaxError::new(
                            position,
                            format!("function '{}' expects 1 argument, got {}", name, args.len()),
                        ));
                    }
                    Expr::Call(builtin, args)
                } else {
                    Expr::Ident(name)
                }
            }
            other => {
                return Err(SyntaxError::new(
                    position,
                    format!("unexpected token {:?}", other),
                ))
            }
        };

        self.parse_postfix(expr)
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, SyntaxError> {
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    self.descend()?;
                    let position = self.position();
                    match self.advance() {
                        Some(Token::Ident(field)) => {
                            expr = Expr::Member(Box::new(expr), field);
                        }
                        _ => {
                            return Err(SyntaxError::new(
                                position,
                                "expected field name after '.'",
                            ))
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    self.descend()?;
                    let index = self.parse_expr(0)?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_list(&mut self, close: Token) -> Result<Vec<Expr>, SyntaxError> {
        let mut items = Vec::new();
        if self.peek() == Some(&close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr(0)?);
            let position = self.position();
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(ref t) if *t == close => return Ok(items),
                _ => {
                    return Err(SyntaxError::new(
                        position,
                        format!("expected ',' or {:?}", close),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_precedence() {
        // a || b && c  =>  a || (b && c)
        let expr = parse("a || b && c").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Or, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(BinaryOp::And, _, _)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_parse_not_in() {
        let expr = parse("Provider not in ['a', 'b']").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::NotIn, _, _)));
    }

    #[test]
    fn test_parse_static_regex() {
        let expr = parse("Model matches '^gpt-'").unwrap();
        assert!(matches!(expr, Expr::Matches(_, Pattern::Static(_))));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("Intent ==").is_err());
        assert!(parse("(a && b").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("unknown(a)").is_err());
        assert!(parse("Model matches '['").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |n: usize| format!("{}true{}", "(".repeat(n), ")".repeat(n));
        assert!(parse(&nested(MAX_NESTING_DEPTH / 2)).is_ok());

        let err = parse(&nested(200_000)).unwrap_err();
        assert!(err.to_string().contains("nested deeper"));

        let chain = vec!["1"; 200_000].join(" + ");
        assert!(parse(&chain).is_err());
        let negations = format!("{}true", "!".repeat(200_000));
        assert!(parse(&negations).is_err());
        let members = format!("a{}", ".b".repeat(200_000));
        assert!(parse(&members).is_err());

        // 平铺的长列表不受深度限制
        let list = format!("x in [{}]", vec!["1"; 1000].join(", "));
        assert!(parse(&list).is_ok());
    }
}
