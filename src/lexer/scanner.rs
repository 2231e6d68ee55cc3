//! Lexer/Scanner for source scripts.

use crate::error::LexerError;
use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// The lexer transforms source code into a stream of tokens.
///
/// Comment stripping happens here: both `--` line comments and
/// `--[[ ... ]]` block comments are consumed as whitespace.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: usize,
    column: usize,
    start_pos: usize,
    start_line: usize,
    start_column: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
            start_pos: 0,
            start_line: 1,
            start_column: 1,
        }
    }

    /// Scan all tokens from the source.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.scan_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Scan the next token.
    pub fn scan_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace_and_comments();
        self.mark_start();

        let Some((_, c)) = self.advance() else {
            return Ok(Token::eof(self.current_pos, self.line, self.column));
        };

        match c {
            '(' => Ok(self.make_token(TokenKind::LeftParen)),
            ')' => Ok(self.make_token(TokenKind::RightParen)),
            '{' => Ok(self.make_token(TokenKind::LeftBrace)),
            '}' => Ok(self.make_token(TokenKind::RightBrace)),
            '[' => Ok(self.make_token(TokenKind::LeftBracket)),
            ']' => Ok(self.make_token(TokenKind::RightBracket)),
            ',' => Ok(self.make_token(TokenKind::Comma)),
            ';' => Ok(self.make_token(TokenKind::Semicolon)),
            ':' => Ok(self.make_token(TokenKind::Colon)),
            '+' => Ok(self.make_token(TokenKind::Plus)),
            '-' => Ok(self.make_token(TokenKind::Minus)),
            '*' => Ok(self.make_token(TokenKind::Star)),
            '%' => Ok(self.make_token(TokenKind::Percent)),
            '^' => Ok(self.make_token(TokenKind::Caret)),
            '#' => Ok(self.make_token(TokenKind::Hash)),

            '/' => {
                if self.match_char('/') {
                    Ok(self.make_token(TokenKind::DoubleSlash))
                } else {
                    Ok(self.make_token(TokenKind::Slash))
                }
            }
            '.' => {
                if self.match_char('.') {
                    if self.match_char('.') {
                        Ok(self.make_token(TokenKind::Ellipsis))
                    } else {
                        Ok(self.make_token(TokenKind::Concat))
                    }
                } else if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    // .5 is a numeric lexeme
                    self.scan_number('.')
                } else {
                    Ok(self.make_token(TokenKind::Dot))
                }
            }
            '=' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::EqualEqual))
                } else {
                    Ok(self.make_token(TokenKind::Equal))
                }
            }
            '~' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::NotEqual))
                } else {
                    Err(LexerError::unexpected_char(c, self.current_span()))
                }
            }
            '<' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::LessEqual))
                } else {
                    Ok(self.make_token(TokenKind::Less))
                }
            }
            '>' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::GreaterEqual))
                } else {
                    Ok(self.make_token(TokenKind::Greater))
                }
            }

            // String literals
            '"' | '\'' => self.scan_string(c),

            // Numbers
            c if c.is_ascii_digit() => self.scan_number(c),

            // Identifiers and keywords
            c if c.is_ascii_alphabetic() || c == '_' => self.scan_identifier(c),

            _ => Err(LexerError::unexpected_char(c, self.current_span())),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                Some('-') => {
                    if self.peek_next() != Some('-') {
                        break;
                    }
                    self.advance(); // consume -
                    self.advance(); // consume -
                    if self.peek() == Some('[') && self.peek_next() == Some('[') {
                        // Block comment, balanced against nested [[ ]]
                        self.advance();
                        self.advance();
                        let mut depth = 1;
                        while depth > 0 {
                            match self.peek() {
                                None => break,
                                Some(']') if self.peek_next() == Some(']') => {
                                    self.advance();
                                    self.advance();
                                    depth -= 1;
                                }
                                Some('[') if self.peek_next() == Some('[') => {
                                    self.advance();
                                    self.advance();
                                    depth += 1;
                                }
                                Some('\n') => {
                                    self.advance();
                                    self.line += 1;
                                    self.column = 1;
                                }
                                _ => {
                                    self.advance();
                                }
                            }
                        }
                    } else {
                        // Line comment
                        while self.peek().is_some() && self.peek() != Some('\n') {
                            self.advance();
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<Token, LexerError> {
        let mut value = String::new();

        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(LexerError::unterminated_string(self.current_span()));
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => {
                            self.advance();
                            value.push('\n');
                        }
                        Some('t') => {
                            self.advance();
                            value.push('\t');
                        }
                        Some('r') => {
                            self.advance();
                            value.push('\r');
                        }
                        Some('\\') => {
                            self.advance();
                            value.push('\\');
                        }
                        Some('"') => {
                            self.advance();
                            value.push('"');
                        }
                        Some('\'') => {
                            self.advance();
                            value.push('\'');
                        }
                        Some(c) => {
                            // Unknown escapes keep the escaped character
                            self.advance();
                            value.push(c);
                        }
                        None => {
                            return Err(LexerError::unterminated_string(self.current_span()));
                        }
                    }
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        Ok(self.make_token(TokenKind::StringLiteral(value)))
    }

    fn scan_number(&mut self, first: char) -> Result<Token, LexerError> {
        let mut value = String::from(first);

        // Hexadecimal: 0x...
        if first == '0' && matches!(self.peek(), Some('x') | Some('X')) {
            value.push(self.advance().map(|(_, c)| c).unwrap_or('x'));
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    value.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            if self
                .peek()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(LexerError::invalid_number(value, self.current_span()));
            }
            let digits = &value[2..];
            let n = i64::from_str_radix(digits, 16)
                .map_err(|_| LexerError::invalid_number(value.clone(), self.current_span()))?;
            return Ok(self.make_token(TokenKind::NumberLiteral(n as f64)));
        }

        let mut seen_dot = first == '.';
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                value.push(c);
                self.advance();
            } else if c == '.' && !seen_dot {
                // A second dot starts a concat operator, not a fraction
                if self.peek_next() == Some('.') {
                    break;
                }
                seen_dot = true;
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // Exponent part: 1e10, 2.5e-3
        if matches!(self.peek(), Some('e') | Some('E')) {
            value.push('e');
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                value.push(self.peek().unwrap());
                self.advance();
            }
            let mut exp_digits = false;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    value.push(c);
                    self.advance();
                    exp_digits = true;
                } else {
                    break;
                }
            }
            if !exp_digits {
                return Err(LexerError::invalid_number(value, self.current_span()));
            }
        }

        // A trailing identifier character makes the lexeme malformed (1abc)
        if self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    value.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            return Err(LexerError::invalid_number(value, self.current_span()));
        }

        let n: f64 = value
            .parse()
            .map_err(|_| LexerError::invalid_number(value.clone(), self.current_span()))?;
        Ok(self.make_token(TokenKind::NumberLiteral(n)))
    }

    fn scan_identifier(&mut self, first: char) -> Result<Token, LexerError> {
        let mut value = String::from(first);

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = TokenKind::keyword(&value).unwrap_or(TokenKind::Identifier(value));
        Ok(self.make_token(kind))
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        if let Some((pos, c)) = self.chars.next() {
            self.current_pos = pos + c.len_utf8();
            self.column += 1;
            Some((pos, c))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        self.source[self.current_pos..].chars().nth(1)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn mark_start(&mut self) {
        self.start_pos = self.current_pos;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current_pos,
            self.start_line,
            self.start_column,
        )
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.current_span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            scan("(){}"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            scan("42 3.14 1e3 0xff"),
            vec![
                TokenKind::NumberLiteral(42.0),
                TokenKind::NumberLiteral(3.14),
                TokenKind::NumberLiteral(1000.0),
                TokenKind::NumberLiteral(255.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_invalid_number() {
        let err = Scanner::new("0x").scan_tokens().unwrap_err();
        assert!(matches!(err, LexerError::InvalidNumber(_, _)));
        let err = Scanner::new("1e+").scan_tokens().unwrap_err();
        assert!(matches!(err, LexerError::InvalidNumber(_, _)));
    }

    #[test]
    fn test_string() {
        assert_eq!(
            scan(r#""hello" 'world'"#),
            vec![
                TokenKind::StringLiteral("hello".to_string()),
                TokenKind::StringLiteral("world".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            scan(r#""a\nb\t\"c\"""#),
            vec![
                TokenKind::StringLiteral("a\nb\t\"c\"".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Scanner::new("\"oops").scan_tokens().unwrap_err();
        assert!(matches!(err, LexerError::UnterminatedString(_)));
        let err = Scanner::new("\"split\nline\"").scan_tokens().unwrap_err();
        assert!(matches!(err, LexerError::UnterminatedString(_)));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            scan("local function if elseif end"),
            vec![
                TokenKind::Local,
                TokenKind::Function,
                TokenKind::If,
                TokenKind::Elseif,
                TokenKind::End,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            scan("== ~= <= >= .. ... //"),
            vec![
                TokenKind::EqualEqual,
                TokenKind::NotEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Concat,
                TokenKind::Ellipsis,
                TokenKind::DoubleSlash,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_concat_after_number() {
        assert_eq!(
            scan("1..2"),
            vec![
                TokenKind::NumberLiteral(1.0),
                TokenKind::Concat,
                TokenKind::NumberLiteral(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_line_comment() {
        assert_eq!(
            scan("1 -- comment\n2"),
            vec![
                TokenKind::NumberLiteral(1.0),
                TokenKind::NumberLiteral(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_block_comment() {
        assert_eq!(
            scan("1 --[[ multi\nline ]] 2"),
            vec![
                TokenKind::NumberLiteral(1.0),
                TokenKind::NumberLiteral(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comment_lines_counted() {
        let tokens = Scanner::new("--[[ a\nb ]]\nx").scan_tokens().unwrap();
        assert_eq!(tokens[0].span.line, 3);
    }

    #[test]
    fn test_unexpected_char() {
        let err = Scanner::new("@").scan_tokens().unwrap_err();
        assert!(matches!(err, LexerError::UnexpectedChar('@', _)));
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            scan("true false nil"),
            vec![
                TokenKind::BoolLiteral(true),
                TokenKind::BoolLiteral(false),
                TokenKind::Nil,
                TokenKind::Eof,
            ]
        );
    }
}
