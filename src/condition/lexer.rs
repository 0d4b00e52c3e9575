//! 条件表达式词法分析

use super::error::SyntaxError;

/// 词法单元
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Nil,
    And,
    Or,
    Not,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

/// 带位置的词法单元
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// 将条件文本切分为词法单元
pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // 字符串字面量，支持单双引号与反斜杠转义
        if c == '\'' || c == '"' {
            let quote = c;
            let mut value = String::new();
            i += 1;
            let mut closed = false;
            while i < chars.len() {
                let (_, ch) = chars[i];
                if ch == '\\' && i + 1 < chars.len() {
                    let (_, next) = chars[i + 1];
                    value.push(match next {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                    i += 2;
                    continue;
                }
                if ch == quote {
                    closed = true;
                    i += 1;
                    break;
                }
                value.push(ch);
                i += 1;
            }
            if !closed {
                return Err(SyntaxError::new(pos, "unterminated string literal"));
            }
            tokens.push(Spanned {
                token: Token::Str(value),
                position: pos,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < chars.len() {
                let (_, ch) = chars[i];
                if ch.is_ascii_digit() || ch == '_' {
                    i += 1;
                } else if ch == '.'
                    && !is_float
                    && i + 1 < chars.len()
                    && chars[i + 1].1.is_ascii_digit()
                {
                    is_float = true;
                    i += 1;
                } else {
                    break;
                }
            }
            let text: String = chars[start..i]
                .iter()
                .map(|(_, ch)| *ch)
                .filter(|ch| *ch != '_')
                .collect();
            let token = if is_float {
                text.parse::<f64>()
                    .map(Token::Float)
                    .map_err(|e| SyntaxError::new(pos, format!("invalid number: {}", e)))?
            } else {
                text.parse::<i64>()
                    .map(Token::Int)
                    .map_err(|e| SyntaxError::new(pos, format!("invalid number: {}", e)))?
            };
            tokens.push(Spanned {
                token,
                position: pos,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() {
                let (_, ch) = chars[i];
                if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                    i += 1;
                } else {
                    break;
                }
            }
            let word: String = chars[start..i].iter().map(|(_, ch)| *ch).collect();
            let token = match word.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "nil" | "null" => Token::Nil,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                "contains" => Token::Contains,
                "startsWith" => Token::StartsWith,
                "endsWith" => Token::EndsWith,
                "matches" => Token::Matches,
                _ => Token::Ident(word),
            };
            tokens.push(Spanned {
                token,
                position: pos,
            });
            continue;
        }

        let next = chars.get(i + 1).map(|(_, ch)| *ch);
        let (token, width) = match (c, next) {
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Not, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('.', _) => (Token::Dot, 1),
            _ => {
                return Err(SyntaxError::new(
                    pos,
                    format!("unexpected character '{}'", c),
                ))
            }
        };
        tokens.push(Spanned {
            token,
            position: pos,
        });
        i += width;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_tokenize_comparison() {
        assert_eq!(
            kinds("Intent == 'coding'"),
            vec![
                Token::Ident("Intent".to_string()),
                Token::Eq,
                Token::Str("coding".to_string())
            ]
        );
    }

    #[test]
    fn test_tokenize_numbers_and_members() {
        assert_eq!(
            kinds("Data.usage >= 80.5"),
            vec![
                Token::Ident("Data".to_string()),
                Token::Dot,
                Token::Ident("usage".to_string()),
                Token::Ge,
                Token::Float(80.5)
            ]
        );
    }

    #[test]
    fn test_tokenize_keywords() {
        assert_eq!(
            kinds("a and not b or c"),
            vec![
                Token::Ident("a".to_string()),
                Token::And,
                Token::Not,
                Token::Ident("b".to_string()),
                Token::Or,
                Token::Ident("c".to_string())
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("Intent == 'coding").unwrap_err();
        assert_eq!(err.position, 10);
    }

    #[test]
    fn test_unexpected_character() {
        assert!(tokenize("Intent # 1").is_err());
    }
}
