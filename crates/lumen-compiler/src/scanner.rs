//! scanner.rs — producteur de jetons sans état de lookahead au-delà d'un
//! caractère. Toute la logique de récupération d'erreur vit dans le
//! compilateur (`synchronize`), pas ici : le scanner se contente d'émettre
//! `TokenKind::Error` et de continuer.

use crate::token::{Token, TokenKind};

pub struct Scanner<'a> {
    chars: std::str::CharIndices<'a>,
    peeked: Option<(usize, char)>,
    line: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { chars: source.char_indices(), peeked: None, line: 1 }
    }

    fn peek_raw(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn advance_raw(&mut self) -> Option<char> {
        let next = self.peek_raw();
        self.peeked = None;
        next.map(|(_, c)| c)
    }

    fn peek(&mut self) -> Option<char> {
        self.peek_raw().map(|(_, c)| c)
    }

    fn peek_next(&mut self) -> Option<char> {
        self.peek_raw()?;
        // on sauvegarde un itérateur séparé pour ne consommer que la lecture
        let mut lookahead = self.chars.clone();
        lookahead.next().map(|(_, c)| c)
    }

    fn advance_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance_raw();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c == ' ' || c == '\r' || c == '\t' => {
                    self.advance_raw();
                }
                Some('\n') => {
                    self.line += 1;
                    self.advance_raw();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance_raw();
                    }
                }
                _ => return,
            }
        }
    }

    pub fn scan_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        let line = self.line;

        let Some(c) = self.advance_raw() else {
            return Token { kind: TokenKind::Eof, line };
        };

        let kind = match c {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '-' => TokenKind::Minus,
            '+' => TokenKind::Plus,
            '/' => TokenKind::Slash,
            '*' => TokenKind::Star,
            '%' => TokenKind::Percent,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '!' => if self.advance_if('=') { TokenKind::BangEqual } else { TokenKind::Bang },
            '=' => if self.advance_if('=') { TokenKind::EqualEqual } else { TokenKind::Equal },
            '<' => if self.advance_if('=') { TokenKind::LessEqual } else { TokenKind::Less },
            '>' => if self.advance_if('=') { TokenKind::GreaterEqual } else { TokenKind::Greater },
            '"' => return self.string(line),
            c if c.is_ascii_digit() => return self.number(c, line),
            c if is_ident_start(c) => return self.identifier(c, line),
            other => TokenKind::Error(format!("Unexpected character '{other}'.")),
        };

        Token { kind, line }
    }

    fn string(&mut self, start_line: u32) -> Token {
        let mut s = String::new();
        loop {
            match self.peek() {
                None => return Token { kind: TokenKind::Error("Unterminated string.".to_string()), line: self.line },
                Some('"') => {
                    self.advance_raw();
                    break;
                }
                Some('\n') => {
                    self.line += 1;
                    s.push(self.advance_raw().unwrap());
                }
                Some(_) => s.push(self.advance_raw().unwrap()),
            }
        }
        Token { kind: TokenKind::String(s), line: start_line }
    }

    fn number(&mut self, first: char, line: u32) -> Token {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.advance_raw();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            s.push('.');
            self.advance_raw();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    s.push(c);
                    self.advance_raw();
                } else {
                    break;
                }
            }
        }
        Token { kind: TokenKind::Number(s.parse().unwrap_or(f64::NAN)), line }
    }

    fn identifier(&mut self, first: char, line: u32) -> Token {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                s.push(c);
                self.advance_raw();
            } else {
                break;
            }
        }
        let kind = keyword_kind(&s).unwrap_or(TokenKind::Identifier(s));
        Token { kind, line }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn keyword_kind(s: &str) -> Option<TokenKind> {
    Some(match s {
        "and" => TokenKind::And,
        "class" => TokenKind::Class,
        "else" => TokenKind::Else,
        "false" => TokenKind::False,
        "for" => TokenKind::For,
        "fun" => TokenKind::Fun,
        "if" => TokenKind::If,
        "nil" => TokenKind::Nil,
        "or" => TokenKind::Or,
        "print" => TokenKind::Print,
        "return" => TokenKind::Return,
        "super" => TokenKind::Super,
        "this" => TokenKind::This,
        "true" => TokenKind::True,
        "var" => TokenKind::Var,
        "while" => TokenKind::While,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "continue" => TokenKind::Continue,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut s = Scanner::new(src);
        let mut out = Vec::new();
        loop {
            let t = s.scan_token();
            let done = matches!(t.kind, TokenKind::Eof);
            out.push(t.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn scans_arithmetic() {
        assert_eq!(
            kinds("1 + 2 * 3"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Plus,
                TokenKind::Number(2.0),
                TokenKind::Star,
                TokenKind::Number(3.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_keywords_not_prefixes() {
        assert_eq!(kinds("classy"), vec![TokenKind::Identifier("classy".to_string()), TokenKind::Eof]);
    }

    #[test]
    fn tracks_line_numbers_across_newlines() {
        let mut s = Scanner::new("1\n2");
        let first = s.scan_token();
        let second = s.scan_token();
        assert_eq!(first.line, 1);
        assert_eq!(second.line, 2);
    }

    #[test]
    fn reports_unterminated_string() {
        let mut s = Scanner::new("\"abc");
        assert!(matches!(s.scan_token().kind, TokenKind::Error(_)));
    }
}
