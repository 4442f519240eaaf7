use super::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Nil,
    If,
    Else,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Dot,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, EvalError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> EvalError {
        EvalError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    fn run(mut self) -> Result<Vec<Spanned>, EvalError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_blanks_and_comments();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.bump() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    line,
                    column,
                });
                return Ok(tokens);
            };

            let token = match c {
                '\n' => Token::Newline,
                '(' => Token::LParen,
                ')' => Token::RParen,
                '{' => Token::LBrace,
                '}' => Token::RBrace,
                ',' => Token::Comma,
                ';' => Token::Semi,
                '.' => Token::Dot,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '=' => self.pick('=', Token::EqEq, Token::Assign),
                '!' => self.pick('=', Token::NotEq, Token::Bang),
                '<' => self.pick('=', Token::Le, Token::Lt),
                '>' => self.pick('=', Token::Ge, Token::Gt),
                '&' if self.peek() == Some('&') => {
                    self.bump();
                    Token::AndAnd
                }
                '|' if self.peek() == Some('|') => {
                    self.bump();
                    Token::OrOr
                }
                '"' | '\'' => Token::Str(self.quoted(c, line, column)?),
                '`' => Token::Str(self.raw(line, column)?),
                c if c.is_ascii_digit() => self.number(c, line, column)?,
                c if c.is_alphabetic() || c == '_' => self.word(c),
                other => return Err(self.error(line, column, format!("unexpected character '{}'", other))),
            };

            tokens.push(Spanned {
                token,
                line,
                column,
            });
        }
    }

    fn skip_blanks_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if c == ' ' || c == '\t' || c == '\r' {
                self.bump();
            } else if c == '/' && self.peek_next() == Some('/') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn pick(&mut self, next: char, matched: Token, otherwise: Token) -> Token {
        if self.peek() == Some(next) {
            self.bump();
            matched
        } else {
            otherwise
        }
    }

    fn quoted(&mut self, quote: char, line: usize, column: usize) -> Result<String, EvalError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(line, column, "unterminated string")),
                Some(c) if c == quote => return Ok(text),
                Some('\\') => {
                    let escaped = self
                        .bump()
                        .ok_or_else(|| self.error(line, column, "unterminated string"))?;
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn raw(&mut self, line: usize, column: usize) -> Result<String, EvalError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(line, column, "unterminated raw string")),
                Some('`') => return Ok(text),
                Some(c) => text.push(c),
            }
        }
    }

    fn number(&mut self, first: char, line: usize, column: usize) -> Result<Token, EvalError> {
        let mut text = String::from(first);
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit() || *c == '_') {
            self.bump();
            if c != '_' {
                text.push(c);
            }
        }

        let is_float = self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit());
        if !is_float {
            return text
                .parse()
                .map(Token::Int)
                .map_err(|_| self.error(line, column, format!("integer literal {} is out of range", text)));
        }

        self.bump();
        text.push('.');
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
            self.bump();
            text.push(c);
        }
        text.parse()
            .map(Token::Float)
            .map_err(|_| self.error(line, column, format!("invalid number {}", text)))
    }

    fn word(&mut self, first: char) -> Token {
        let mut text = String::from(first);
        while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            self.bump();
            text.push(c);
        }

        match text.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "nil" => Token::Nil,
            "if" => Token::If,
            "else" => Token::Else,
            _ => Token::Ident(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            kinds("x = 1_000 + 2.5 >= y"),
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::Int(1000),
                Token::Plus,
                Token::Float(2.5),
                Token::Ge,
                Token::Ident("y".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(
            kinds(r#""a\tb" 'c\'d' `e\n`"#),
            vec![
                Token::Str("a\tb".into()),
                Token::Str("c'd".into()),
                Token::Str("e\\n".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_raw_string_keeps_newlines_and_tracks_lines() {
        let tokens = tokenize("`a\nb`\nc").expect("tokenize");
        assert_eq!(tokens[0].token, Token::Str("a\nb".into()));
        assert_eq!(tokens[1].token, Token::Newline);
        assert_eq!(tokens[2].token, Token::Ident("c".into()));
        assert_eq!(tokens[2].line, 3);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(kinds("1 // note\n"), vec![Token::Int(1), Token::Newline, Token::Eof]);
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        let err = tokenize("\"abc").unwrap_err();
        assert!(matches!(err, EvalError::Syntax { line: 1, column: 1, .. }));
    }

    #[test]
    fn test_member_access_is_not_a_float() {
        assert_eq!(
            kinds("1.x"),
            vec![Token::Int(1), Token::Dot, Token::Ident("x".into()), Token::Eof]
        );
    }

    #[test]
    fn test_unknown_character() {
        let err = tokenize("a @ b").unwrap_err();
        assert!(err.to_string().contains("'@'"));
    }
}
