//! Tokenizer for condition strings.

use crate::error::ExpressionError;

use super::ast::TimeUnit;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// Time filter literal such as `50s`.
    Time(f64, TimeUnit),
    /// Data macro such as `$0`.
    Macro(String),
    /// Identifiers and keywords, told apart by the parser.
    Ident(String),
    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Question,
    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    // Comparison
    Gt,
    Lt,
    Ge,
    Le,
    EqEq,
    NotEq,
    // Logical
    AndAnd,
    OrOr,
    Bang,
    // Bitwise
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    Eof,
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn lex(src: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    let peek = |i: usize| chars.get(i).map(|&(_, c)| c);

    while pos < chars.len() {
        let (offset, c) = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        // Numbers, optionally followed by a time unit
        if c.is_ascii_digit() || (c == '.' && peek(pos + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = pos;
            let mut is_float = false;
            while peek(pos).is_some_and(|n| n.is_ascii_digit()) {
                pos += 1;
            }
            if peek(pos) == Some('.') && peek(pos + 1).is_some_and(|n| n.is_ascii_digit()) {
                is_float = true;
                pos += 1;
                while peek(pos).is_some_and(|n| n.is_ascii_digit()) {
                    pos += 1;
                }
            } else if peek(pos) == Some('.') && c != '.' && !peek(pos + 1).is_some_and(is_ident_start) {
                // `1.` is a float; `1.max` is not
                is_float = true;
                pos += 1;
            }
            if matches!(peek(pos), Some('e') | Some('E')) {
                let sign = matches!(peek(pos + 1), Some('+') | Some('-'));
                let digit_at = if sign { pos + 2 } else { pos + 1 };
                if peek(digit_at).is_some_and(|n| n.is_ascii_digit()) {
                    is_float = true;
                    pos = digit_at;
                    while peek(pos).is_some_and(|n| n.is_ascii_digit()) {
                        pos += 1;
                    }
                }
            }
            let end = chars.get(pos).map(|&(o, _)| o).unwrap_or(src.len());
            let text = &src[chars[start].0..end];

            let unit = peek(pos).and_then(TimeUnit::from_char);
            if let Some(unit) = unit {
                if !peek(pos + 1).is_some_and(is_ident_continue) {
                    let amount: f64 = text
                        .parse()
                        .map_err(|_| ExpressionError::syntax(offset, "invalid time filter"))?;
                    tokens.push(Spanned {
                        token: Token::Time(amount, unit),
                        offset,
                    });
                    pos += 1;
                    continue;
                }
            }

            let token = if is_float {
                Token::Float(
                    text.parse()
                        .map_err(|_| ExpressionError::syntax(offset, "invalid number"))?,
                )
            } else {
                Token::Int(
                    text.parse()
                        .map_err(|_| ExpressionError::syntax(offset, "integer literal out of range"))?,
                )
            };
            tokens.push(Spanned { token, offset });
            continue;
        }

        // String literal
        if c == '"' || c == '\'' {
            let quote = c;
            pos += 1;
            let mut s = String::new();
            loop {
                let Some(sc) = peek(pos) else {
                    return Err(ExpressionError::syntax(offset, "unterminated string literal"));
                };
                pos += 1;
                if sc == quote {
                    break;
                }
                if sc == '\\' {
                    let Some(esc) = peek(pos) else {
                        return Err(ExpressionError::syntax(offset, "unterminated escape in string"));
                    };
                    pos += 1;
                    match esc {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        other => s.push(other),
                    }
                    continue;
                }
                s.push(sc);
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                offset,
            });
            continue;
        }

        // Data macro
        if c == '$' {
            let start = pos;
            pos += 1;
            while peek(pos).is_some_and(is_ident_continue) {
                pos += 1;
            }
            if pos == start + 1 {
                return Err(ExpressionError::syntax(offset, "expected a name after `$`"));
            }
            let end = chars.get(pos).map(|&(o, _)| o).unwrap_or(src.len());
            tokens.push(Spanned {
                token: Token::Macro(src[offset..end].to_string()),
                offset,
            });
            continue;
        }

        // Identifier or keyword
        if is_ident_start(c) {
            while peek(pos).is_some_and(is_ident_continue) {
                pos += 1;
            }
            let end = chars.get(pos).map(|&(o, _)| o).unwrap_or(src.len());
            tokens.push(Spanned {
                token: Token::Ident(src[offset..end].to_string()),
                offset,
            });
            continue;
        }

        let next = peek(pos + 1);
        let (token, width) = match (c, next) {
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('<', Some('<')) => (Token::Shl, 2),
            ('>', Some('>')) => (Token::Shr, 2),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            (',', _) => (Token::Comma, 1),
            (':', _) => (Token::Colon, 1),
            ('.', _) => (Token::Dot, 1),
            ('?', _) => (Token::Question, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('>', _) => (Token::Gt, 1),
            ('<', _) => (Token::Lt, 1),
            ('!', _) => (Token::Bang, 1),
            ('&', _) => (Token::Amp, 1),
            ('|', _) => (Token::Pipe, 1),
            ('^', _) => (Token::Caret, 1),
            ('~', _) => (Token::Tilde, 1),
            _ => {
                return Err(ExpressionError::syntax(
                    offset,
                    format!("unexpected character `{c}`"),
                ))
            }
        };
        tokens.push(Spanned { token, offset });
        pos += width;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: src.len(),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        lex(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lexes_macro_call_with_time_filter() {
        assert_eq!(
            kinds("$1.max(50s)"),
            vec![
                Token::Macro("$1".into()),
                Token::Dot,
                Token::Ident("max".into()),
                Token::LParen,
                Token::Time(50.0, TimeUnit::Seconds),
                Token::RParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(
            kinds("12 1.5 2e3 1.5E-2"),
            vec![
                Token::Int(12),
                Token::Float(1.5),
                Token::Float(2000.0),
                Token::Float(0.015),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn unit_followed_by_letters_is_not_a_time_filter() {
        // `5ms` is not a valid unit, so the number stays a number
        assert_eq!(
            kinds("5ms"),
            vec![Token::Int(5), Token::Ident("ms".into()), Token::Eof]
        );
    }

    #[test]
    fn lexes_two_char_operators() {
        assert_eq!(
            kinds("a<<b>=c&&d||e!=f"),
            vec![
                Token::Ident("a".into()),
                Token::Shl,
                Token::Ident("b".into()),
                Token::Ge,
                Token::Ident("c".into()),
                Token::AndAnd,
                Token::Ident("d".into()),
                Token::OrOr,
                Token::Ident("e".into()),
                Token::NotEq,
                Token::Ident("f".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_both_quote_styles() {
        assert_eq!(
            kinds(r#"'a' "b\"c""#),
            vec![Token::Str("a".into()), Token::Str("b\"c".into()), Token::Eof]
        );
    }

    #[test]
    fn reports_byte_offset_of_bad_character() {
        let err = lex("$0 = 1").unwrap_err();
        assert_eq!(
            err,
            ExpressionError::Syntax {
                position: 3,
                message: "unexpected character `=`".into()
            }
        );
    }

    #[test]
    fn unterminated_string_fails() {
        assert!(matches!(
            lex("'abc"),
            Err(ExpressionError::Syntax { position: 0, .. })
        ));
    }
}
