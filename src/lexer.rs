//! Hand-written character-at-a-time lexer.
//!
//! Mirrors the teacher's `tokenize()` shape (index into a char vector,
//! a line counter, recursive comment/whitespace skipping) but reads one
//! token per call instead of tokenizing the whole source up front, since
//! the parser only ever needs one token of lookahead.

use crate::token::{Keyword, Operator, Punct, Token, TokenKind};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// One-character rewind, decrementing the line counter if the
    /// rewound character was a newline.
    fn rewind(&mut self) {
        self.pos -= 1;
        if self.chars[self.pos] == '\n' {
            self.line -= 1;
        }
    }

    /// Produce the next token. Never fails: malformed input becomes one
    /// of the three lexical error token kinds.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let start_line = self.line;
        let Some(c) = self.peek() else {
            return Token::eof(start_line);
        };

        if c == '/' {
            if let Some(tok) = self.try_comment(start_line) {
                return tok;
            }
        }

        if c.is_ascii_digit() {
            return self.scan_number(start_line);
        }

        if c.is_alphabetic() || c == '_' {
            return self.scan_identifier(start_line);
        }

        if let Some(tok) = self.try_operator_or_punct(start_line) {
            return tok;
        }

        self.advance();
        tracing::trace!(line = start_line, char = %c, "invalid character");
        Token::new(TokenKind::InvalidChar, c.to_string(), start_line)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Handles `//` line comments and nested `/* */` block comments.
    /// Returns `Some(next token)` if `/` turned out to start a comment
    /// (in which case we recurse for the following token); `None` if it
    /// was a bare division operator so the caller should fall through.
    fn try_comment(&mut self, start_line: usize) -> Option<Token> {
        if self.peek_at(1) == Some('/') {
            self.advance();
            self.advance();
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                self.advance();
            }
            return Some(self.next_token());
        }
        if self.peek_at(1) == Some('*') {
            self.advance();
            self.advance();
            let mut depth = 1usize;
            while depth > 0 {
                match self.peek() {
                    None => break,
                    Some('*') if self.peek_at(1) == Some('/') => {
                        self.advance();
                        self.advance();
                        depth -= 1;
                    }
                    Some('/') if self.peek_at(1) == Some('*') => {
                        self.advance();
                        self.advance();
                        depth += 1;
                    }
                    Some(_) => {
                        self.advance();
                    }
                }
            }
            return Some(self.next_token());
        }
        let _ = start_line;
        None
    }

    /// Reads a maximal `[A-Za-z0-9_]*` run starting at a letter or `_`.
    fn scan_identifier(&mut self, start_line: usize) -> Token {
        let mut lexeme = String::new();
        let starts_with_underscore = self.peek() == Some('_');
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                lexeme.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if starts_with_underscore {
            return Token::new(TokenKind::InvalidIdentifier, lexeme, start_line);
        }

        if let Some(kw) = Keyword::lookup(&lexeme) {
            return Token::new(TokenKind::Keyword(kw), lexeme, start_line);
        }
        if let Some(op) = Operator::lookup_word(&lexeme) {
            return Token::new(TokenKind::Operator(op), lexeme, start_line);
        }
        Token::new(TokenKind::Id, lexeme, start_line)
    }

    /// Integer part, optional fraction, optional exponent. Leading zeros
    /// (other than a bare `0`) and trailing-zero fractions (other than a
    /// bare `.0`) are illegal; a malformed numeric becomes one
    /// `invalid-number` token holding everything consumed. Letters
    /// immediately following an otherwise-valid integer glue on as an
    /// `invalid-identifier` covering both runs.
    fn scan_number(&mut self, start_line: usize) -> Token {
        let mut lexeme = String::new();
        let mut valid = true;

        let int_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                lexeme.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let int_digits = self.pos - int_start;
        if int_digits > 1 && lexeme.as_bytes()[0] == b'0' {
            valid = false;
        }

        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            lexeme.push('.');
            self.advance();
            let frac_start = self.pos;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    lexeme.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            let frac_len = self.pos - frac_start;
            let frac = &lexeme[lexeme.len() - frac_len..];
            if frac_len > 1 && frac.ends_with('0') && frac != "0" {
                valid = false;
            }
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut exp_lexeme = String::new();
            exp_lexeme.push(self.peek().unwrap());
            let save_pos = self.pos;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                exp_lexeme.push(self.peek().unwrap());
                self.advance();
            }
            let exp_digit_start = self.pos;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    exp_lexeme.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            if self.pos == exp_digit_start {
                // no digits followed `e`/`e+`/`e-`: not actually an exponent,
                // rewind and leave it for the next token.
                while self.pos > save_pos {
                    self.rewind();
                }
            } else {
                let exp_digits = &exp_lexeme[exp_lexeme.trim_start_matches(['+', '-']).len()..];
                let digit_part = &exp_lexeme[exp_lexeme.len() - (self.pos - exp_digit_start)..];
                let _ = exp_digits;
                if digit_part.len() > 1 && digit_part.as_bytes()[0] == b'0' {
                    valid = false;
                }
                lexeme.push_str(&exp_lexeme);
            }
        }

        // Letters glued directly onto a number form an invalid identifier.
        if let Some(c) = self.peek() {
            if c.is_alphabetic() || c == '_' {
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        lexeme.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                tracing::trace!(line = start_line, lexeme = %lexeme, "invalid identifier glued to number");
                return Token::new(TokenKind::InvalidIdentifier, lexeme, start_line);
            }
        }

        if !valid {
            tracing::trace!(line = start_line, lexeme = %lexeme, "invalid number literal");
            return Token::new(TokenKind::InvalidNumber, lexeme, start_line);
        }

        if lexeme.contains('.') || lexeme.contains('e') || lexeme.contains('E') {
            Token::new(TokenKind::FloatLit, lexeme, start_line)
        } else {
            Token::new(TokenKind::IntLit, lexeme, start_line)
        }
    }

    /// Greedily prefers the two-character operator/punctuation form
    /// before falling back to the single-character form.
    fn try_operator_or_punct(&mut self, start_line: usize) -> Option<Token> {
        if let Some(c0) = self.peek() {
            if let Some(c1) = self.peek_at(1) {
                let two: String = [c0, c1].iter().collect();
                if let Some(op) = Operator::lookup_symbol2(&two) {
                    self.advance();
                    self.advance();
                    return Some(Token::new(TokenKind::Operator(op), two, start_line));
                }
                if let Some(p) = Punct::lookup_symbol2(&two) {
                    self.advance();
                    self.advance();
                    return Some(Token::new(TokenKind::Punct(p), two, start_line));
                }
            }
            if let Some(op) = Operator::lookup_symbol1(c0) {
                self.advance();
                return Some(Token::new(TokenKind::Operator(op), c0.to_string(), start_line));
            }
            if let Some(p) = Punct::lookup_symbol1(c0) {
                self.advance();
                return Some(Token::new(TokenKind::Punct(p), c0.to_string(), start_line));
            }
        }
        None
    }

    /// Scan the entire source into a token stream, terminated by one
    /// end-of-input token. Used by callers (the parser included) that
    /// want the whole stream rather than pulling one token at a time.
    pub fn tokenize_all(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token();
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize_all(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn skips_whitespace_and_line_comments() {
        let toks = Lexer::tokenize_all("  // hello\n  x");
        assert_eq!(toks.len(), 2); // id, eof
        assert_eq!(toks[0].kind, TokenKind::Id);
        assert_eq!(toks[0].line, 2);
    }

    #[test]
    fn nested_block_comments() {
        let toks = Lexer::tokenize_all("/* /* nested */ still comment */ x");
        assert_eq!(toks[0].kind, TokenKind::Id);
    }

    #[test]
    fn plain_division_is_not_a_comment() {
        assert_eq!(kinds("a / b"), vec![
            TokenKind::Id,
            TokenKind::Operator(Operator::Slash),
            TokenKind::Id,
            TokenKind::Eof
        ]);
    }

    #[test]
    fn leading_underscore_is_invalid_identifier() {
        let toks = Lexer::tokenize_all("_foo");
        assert_eq!(toks[0].kind, TokenKind::InvalidIdentifier);
        assert_eq!(toks[0].lexeme, "_foo");
    }

    #[test]
    fn leading_zero_is_invalid_unless_bare_zero() {
        assert_eq!(kinds("0")[0], TokenKind::IntLit);
        assert_eq!(kinds("01")[0], TokenKind::InvalidNumber);
    }

    #[test]
    fn float_literal_parses_fraction_and_exponent() {
        assert_eq!(kinds("3.14")[0], TokenKind::FloatLit);
        assert_eq!(kinds("1.0e10")[0], TokenKind::FloatLit);
        assert_eq!(kinds("1.0e+3")[0], TokenKind::FloatLit);
    }

    #[test]
    fn trailing_zero_fraction_is_invalid_unless_bare() {
        assert_eq!(kinds("1.0")[0], TokenKind::FloatLit);
        assert_eq!(kinds("1.10")[0], TokenKind::InvalidNumber);
    }

    #[test]
    fn digits_followed_by_letters_is_invalid_identifier() {
        let toks = Lexer::tokenize_all("123abc");
        assert_eq!(toks[0].kind, TokenKind::InvalidIdentifier);
        assert_eq!(toks[0].lexeme, "123abc");
    }

    #[test]
    fn two_char_operators_preferred() {
        assert_eq!(kinds(":= == <= >= <> =>"), vec![
            TokenKind::Operator(Operator::Assign),
            TokenKind::Operator(Operator::Eq),
            TokenKind::Operator(Operator::Le),
            TokenKind::Operator(Operator::Ge),
            TokenKind::Operator(Operator::Ne),
            TokenKind::Punct(Punct::Arrow),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn unknown_char_is_invalid_char_token() {
        let toks = Lexer::tokenize_all("$");
        assert_eq!(toks[0].kind, TokenKind::InvalidChar);
    }

    #[test]
    fn lexer_is_total_and_terminates() {
        for src in ["", "   ", "/* unterminated", "class A isa B { };"] {
            let toks = Lexer::tokenize_all(src);
            assert_eq!(toks.last().unwrap().kind, TokenKind::Eof);
        }
    }
}
