//! Recursive-descent parser producing [`Expr`] trees.
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, `|`, `^`, `&`, equality,
//! relational and membership, shifts, additive, multiplicative, unary,
//! postfix calls.

use crate::error::ExpressionError;

use super::ast::{
    ArithmeticOp, BinaryOp, BitwiseOp, ComparisonOp, Expr, Literal, LogicalOp, MemberOp, UnaryOp,
    DEFAULT_TARGET, MAX_TIME_FILTER_SECONDS,
};
use super::lexer::{lex, Spanned, Token};

type ParseResult = Result<Expr, ExpressionError>;

/// Deepest syntax tree a condition may produce. Evaluation recurses over
/// the tree, so this also bounds evaluator stack use.
pub const MAX_NESTING: usize = 128;

/// Compile a condition string into a syntax tree.
pub fn parse(src: &str) -> ParseResult {
    let tokens = lex(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.conditional()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected token {other:?}"))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Tree depth of the node being parsed.
    depth: usize,
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

impl Parser {
    fn peek(&self) -> &Token {
        // lex() always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::syntax(self.offset(), message)
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ExpressionError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    /// Enter one more tree level.
    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(format!(
                "expression nests deeper than {MAX_NESTING} levels"
            )));
        }
        Ok(())
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(w) if w == word)
    }

    // ── Binary levels ───────────────────────────────────────────

    fn conditional(&mut self) -> ParseResult {
        let base = self.depth;
        self.descend()?;
        let predicate = self.logical_or()?;
        if *self.peek() != Token::Question {
            self.depth = base;
            return Ok(predicate);
        }
        self.advance();
        let if_true = self.conditional()?;
        self.expect(Token::Colon, "`:` in conditional")?;
        let if_false = self.conditional()?;
        self.depth = base;
        Ok(Expr::Conditional {
            predicate: Box::new(predicate),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        })
    }

    fn logical_or(&mut self) -> ParseResult {
        let base = self.depth;
        let mut left = self.logical_and()?;
        while *self.peek() == Token::OrOr {
            self.advance();
            self.descend()?;
            let right = self.logical_and()?;
            left = binary(BinaryOp::Logical(LogicalOp::Or), left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn logical_and(&mut self) -> ParseResult {
        let base = self.depth;
        let mut left = self.bit_or()?;
        while *self.peek() == Token::AndAnd {
            self.advance();
            self.descend()?;
            let right = self.bit_or()?;
            left = binary(BinaryOp::Logical(LogicalOp::And), left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn bit_or(&mut self) -> ParseResult {
        let base = self.depth;
        let mut left = self.bit_xor()?;
        while *self.peek() == Token::Pipe {
            self.advance();
            self.descend()?;
            let right = self.bit_xor()?;
            left = binary(BinaryOp::Bitwise(BitwiseOp::Or), left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn bit_xor(&mut self) -> ParseResult {
        let base = self.depth;
        let mut left = self.bit_and()?;
        while *self.peek() == Token::Caret {
            self.advance();
            self.descend()?;
            let right = self.bit_and()?;
            left = binary(BinaryOp::Bitwise(BitwiseOp::Xor), left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn bit_and(&mut self) -> ParseResult {
        let base = self.depth;
        let mut left = self.equality()?;
        while *self.peek() == Token::Amp {
            self.advance();
            self.descend()?;
            let right = self.equality()?;
            left = binary(BinaryOp::Bitwise(BitwiseOp::And), left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn equality(&mut self) -> ParseResult {
        let base = self.depth;
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => ComparisonOp::Eq,
                Token::NotEq => ComparisonOp::Ne,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.relational()?;
            left = binary(BinaryOp::Comparison(op), left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn relational(&mut self) -> ParseResult {
        let base = self.depth;
        let mut left = self.shift()?;
        loop {
            let op = match self.peek() {
                Token::Gt => BinaryOp::Comparison(ComparisonOp::Gt),
                Token::Lt => BinaryOp::Comparison(ComparisonOp::Lt),
                Token::Ge => BinaryOp::Comparison(ComparisonOp::Ge),
                Token::Le => BinaryOp::Comparison(ComparisonOp::Le),
                _ if self.is_keyword("in") => BinaryOp::Member(MemberOp::In),
                _ if self.is_keyword("notin") => BinaryOp::Member(MemberOp::NotIn),
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.shift()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn shift(&mut self) -> ParseResult {
        let base = self.depth;
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Shl => BitwiseOp::Shl,
                Token::Shr => BitwiseOp::Shr,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.additive()?;
            left = binary(BinaryOp::Bitwise(op), left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn additive(&mut self) -> ParseResult {
        let base = self.depth;
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithmeticOp::Add,
                Token::Minus => ArithmeticOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.multiplicative()?;
            left = binary(BinaryOp::Arithmetic(op), left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn multiplicative(&mut self) -> ParseResult {
        let base = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithmeticOp::Mul,
                Token::Slash => ArithmeticOp::Div,
                Token::Percent => ArithmeticOp::Mod,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.unary()?;
            left = binary(BinaryOp::Arithmetic(op), left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult {
        let op = match self.peek() {
            Token::Plus => UnaryOp::Plus,
            Token::Minus => UnaryOp::Minus,
            Token::Bang => UnaryOp::Not,
            Token::Tilde => UnaryOp::Invert,
            _ => return self.postfix(),
        };
        self.advance();
        let base = self.depth;
        self.descend()?;
        let operand = self.unary()?;
        self.depth = base;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    // ── Primaries ───────────────────────────────────────────────

    fn postfix(&mut self) -> ParseResult {
        let primary = self.primary()?;
        if *self.peek() != Token::Dot {
            return Ok(primary);
        }
        let Expr::Name(target) = primary else {
            return Err(self.error("only data names can be call targets"));
        };
        self.advance();
        let name = match self.advance() {
            Token::Ident(name) => name,
            other => return Err(self.error(format!("expected function name, found {other:?}"))),
        };
        let args = self.arguments()?;
        Ok(Expr::FunctionCall { name, target, args })
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        self.expect(Token::LParen, "`(`")?;
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.conditional()?);
            match self.advance() {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => return Err(self.error(format!("expected `,` or `)`, found {other:?}"))),
            }
        }
    }

    fn primary(&mut self) -> ParseResult {
        let offset = self.offset();
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Literal::Int(n))),
            Token::Float(f) => Ok(Expr::Literal(Literal::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::Time(amount, unit) => {
                let seconds = amount * unit.multiplier();
                if !seconds.is_finite() || seconds > MAX_TIME_FILTER_SECONDS as f64 {
                    return Err(ExpressionError::syntax(
                        offset,
                        format!("time filter exceeds {MAX_TIME_FILTER_SECONDS}s"),
                    ));
                }
                Ok(Expr::TimeFilter { amount, unit })
            }
            Token::Macro(name) => Ok(Expr::Name(name)),
            Token::Ident(word) => {
                if word.eq_ignore_ascii_case("true") {
                    return Ok(Expr::Literal(Literal::Bool(true)));
                }
                if word.eq_ignore_ascii_case("false") {
                    return Ok(Expr::Literal(Literal::Bool(false)));
                }
                if word == "null" {
                    return Ok(Expr::Literal(Literal::Null));
                }
                if word == "in" || word == "notin" {
                    return Err(ExpressionError::syntax(
                        offset,
                        format!("unexpected keyword `{word}`"),
                    ));
                }
                if *self.peek() == Token::LParen {
                    let args = self.arguments()?;
                    return Ok(Expr::FunctionCall {
                        name: word,
                        target: DEFAULT_TARGET.to_string(),
                        args,
                    });
                }
                Ok(Expr::Name(word))
            }
            Token::LParen => {
                let inner = self.conditional()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::LBrace => self.dict(),
            Token::Eof => Err(ExpressionError::syntax(offset, "unexpected end of input")),
            other => Err(ExpressionError::syntax(
                offset,
                format!("unexpected token {other:?}"),
            )),
        }
    }

    fn dict(&mut self) -> ParseResult {
        let mut pairs = Vec::new();
        if *self.peek() == Token::RBrace {
            self.advance();
            return Ok(Expr::Dict(pairs));
        }
        loop {
            let key = self.logical_or()?;
            self.expect(Token::Colon, "`:` in dict entry")?;
            let value = self.conditional()?;
            pairs.push(Expr::Pair(Box::new(key), Box::new(value)));
            match self.advance() {
                Token::Comma => continue,
                Token::RBrace => return Ok(Expr::Dict(pairs)),
                other => return Err(self.error(format!("expected `,` or `}}`, found {other:?}"))),
            }
        }
    }
}
