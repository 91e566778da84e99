use super::ast::Span;
use super::error::CompileError;
use crate::diagnostics::codes;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,

    // Identifiers & keywords
    Ident(String),
    Using,
    Namespace,
    Class,
    Struct,
    Public,
    Private,
    Internal,
    Static,
    Let,
    Fn,
    New,
    This,
    If,
    Else,
    While,
    Break,
    Continue,
    Return,
    Throw,

    // Type names
    IntTy,
    FloatTy,
    BoolTy,
    StringTy,
    VoidTy,
    ObjectTy,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Arrow, // ->

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Gt,
    Le,   // <=
    Ge,   // >=
    EqEq, // ==
    Ne,   // !=
    And,  // &&
    Or,   // ||
    Bang, // !
    Eq,

    Eof,
}

impl Token {
    /// How the token reads in a diagnostic.
    pub fn describe(&self) -> String {
        match self {
            Token::Int(v) => v.to_string(),
            Token::Float(v) => v.to_string(),
            Token::Str(s) => format!("\"{s}\""),
            Token::Ident(name) => name.clone(),
            Token::Eof => "end-of-file".into(),
            other => keyword_or_symbol(other).to_string(),
        }
    }
}

fn keyword_or_symbol(token: &Token) -> &'static str {
    match token {
        Token::True => "true",
        Token::False => "false",
        Token::Null => "null",
        Token::Using => "using",
        Token::Namespace => "namespace",
        Token::Class => "class",
        Token::Struct => "struct",
        Token::Public => "public",
        Token::Private => "private",
        Token::Internal => "internal",
        Token::Static => "static",
        Token::Let => "let",
        Token::Fn => "fn",
        Token::New => "new",
        Token::This => "this",
        Token::If => "if",
        Token::Else => "else",
        Token::While => "while",
        Token::Break => "break",
        Token::Continue => "continue",
        Token::Return => "return",
        Token::Throw => "throw",
        Token::IntTy => "int",
        Token::FloatTy => "float",
        Token::BoolTy => "bool",
        Token::StringTy => "string",
        Token::VoidTy => "void",
        Token::ObjectTy => "object",
        Token::LParen => "(",
        Token::RParen => ")",
        Token::LBrace => "{",
        Token::RBrace => "}",
        Token::Comma => ",",
        Token::Dot => ".",
        Token::Colon => ":",
        Token::Semicolon => ";",
        Token::Arrow => "->",
        Token::Plus => "+",
        Token::Minus => "-",
        Token::Star => "*",
        Token::Slash => "/",
        Token::Percent => "%",
        Token::Lt => "<",
        Token::Gt => ">",
        Token::Le => "<=",
        Token::Ge => ">=",
        Token::EqEq => "==",
        Token::Ne => "!=",
        Token::And => "&&",
        Token::Or => "||",
        Token::Bang => "!",
        Token::Eq => "=",
        Token::Int(_) | Token::Float(_) | Token::Str(_) | Token::Ident(_) | Token::Eof => "",
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenize `source`, evaluating `#if`/`#else`/`#endif` against `defines`.
pub fn lex(source: &str, defines: &[String]) -> Result<Vec<SpannedToken>, Vec<CompileError>> {
    let mut lexer = Lexer::new(source, defines);
    lexer.tokenize()
}

/// One open `#if` region.
struct Conditional {
    parent_active: bool,
    condition: bool,
    seen_else: bool,
    span: Span,
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<SpannedToken>,
    errors: Vec<CompileError>,
    defines: Vec<String>,
    conditionals: Vec<Conditional>,
    active: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, defines: &[String]) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
            defines: defines.to_vec(),
            conditionals: Vec::new(),
            active: true,
        }
    }

    fn tokenize(&mut self) -> Result<Vec<SpannedToken>, Vec<CompileError>> {
        while self.pos < self.bytes.len() {
            if !self.active {
                self.skip_inactive_line();
                continue;
            }
            self.skip_whitespace_and_comments();
            if self.pos >= self.bytes.len() {
                break;
            }

            let start = self.pos;
            let ch = self.bytes[self.pos];

            match ch {
                b'#' if self.at_line_start(start) => self.lex_directive(),
                b'(' => self.single(Token::LParen),
                b')' => self.single(Token::RParen),
                b'{' => self.single(Token::LBrace),
                b'}' => self.single(Token::RBrace),
                b',' => self.single(Token::Comma),
                b'.' => self.single(Token::Dot),
                b':' => self.single(Token::Colon),
                b';' => self.single(Token::Semicolon),
                b'+' => self.single(Token::Plus),
                b'*' => self.single(Token::Star),
                b'/' => self.single(Token::Slash),
                b'%' => self.single(Token::Percent),
                b'-' => self.one_or_two(b'>', Token::Arrow, Token::Minus),
                b'<' => self.one_or_two(b'=', Token::Le, Token::Lt),
                b'>' => self.one_or_two(b'=', Token::Ge, Token::Gt),
                b'=' => self.one_or_two(b'=', Token::EqEq, Token::Eq),
                b'!' => self.one_or_two(b'=', Token::Ne, Token::Bang),
                b'|' | b'&' => {
                    self.pos += 1;
                    if self.peek() == Some(ch) {
                        self.pos += 1;
                        let token = if ch == b'|' { Token::Or } else { Token::And };
                        self.push(token, start, self.pos);
                    } else {
                        self.errors.push(CompileError::lexer(
                            codes::UNEXPECTED_CHARACTER,
                            format!("Unexpected character `{}'", char::from(ch)),
                            Span::new(start, self.pos),
                        ));
                    }
                }
                b'"' => {
                    self.pos += 1;
                    self.lex_string(start);
                }
                b'0'..=b'9' => {
                    self.lex_number(start);
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    self.lex_ident(start);
                }
                _ => {
                    let bad = self.source[start..].chars().next().unwrap_or('?');
                    self.errors.push(CompileError::lexer(
                        codes::UNEXPECTED_CHARACTER,
                        format!("Unexpected character `{bad}'"),
                        Span::new(start, start + bad.len_utf8()),
                    ));
                    self.pos += bad.len_utf8();
                }
            }
        }

        if let Some(open) = self.conditionals.last() {
            self.errors.push(CompileError::lexer(
                codes::ENDIF_EXPECTED,
                "#endif directive expected",
                open.span,
            ));
        }

        self.tokens.push(SpannedToken {
            token: Token::Eof,
            span: Span::new(self.pos, self.pos),
        });

        if self.errors.is_empty() {
            Ok(std::mem::take(&mut self.tokens))
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn push(&mut self, token: Token, start: usize, end: usize) {
        self.tokens.push(SpannedToken {
            token,
            span: Span::new(start, end),
        });
    }

    fn single(&mut self, token: Token) {
        let start = self.pos;
        self.pos += 1;
        self.push(token, start, self.pos);
    }

    fn one_or_two(&mut self, second: u8, long: Token, short: Token) {
        let start = self.pos;
        self.pos += 1;
        if self.peek() == Some(second) {
            self.pos += 1;
            self.push(long, start, self.pos);
        } else {
            self.push(short, start, self.pos);
        }
    }

    fn at_line_start(&self, pos: usize) -> bool {
        self.source[..pos]
            .bytes()
            .rev()
            .take_while(|&b| b != b'\n')
            .all(|b| b == b' ' || b == b'\t' || b == b'\r')
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    match self.source[self.pos..].find("*/") {
                        Some(end) => self.pos += end + 2,
                        None => {
                            self.pos = self.bytes.len();
                            self.errors.push(CompileError::lexer(
                                codes::UNTERMINATED_COMMENT,
                                "End-of-file found, `*/' expected",
                                Span::new(start, self.pos),
                            ));
                        }
                    }
                }
                _ => break,
            }
        }
    }

    // ── Preprocessor ──────────────────────────────────────────────

    /// Skip one line of a disabled region, handling directives on it.
    fn skip_inactive_line(&mut self) {
        while self.pos < self.bytes.len() && matches!(self.bytes[self.pos], b' ' | b'\t' | b'\r') {
            self.pos += 1;
        }
        if self.peek() == Some(b'#') {
            self.lex_directive();
            return;
        }
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
            self.pos += 1;
        }
        if self.pos < self.bytes.len() {
            self.pos += 1;
        }
    }

    fn lex_directive(&mut self) {
        let start = self.pos;
        let line_end = self.source[start..].find('\n').map_or(self.bytes.len(), |i| start + i);
        let line = &self.source[start + 1..line_end];
        let line = line.split("//").next().unwrap_or("").trim();
        let span = Span::new(start, line_end);
        self.pos = line_end;

        let (directive, arg) = match line.split_once(char::is_whitespace) {
            Some((d, rest)) => (d, rest.trim()),
            None => (line, ""),
        };

        match directive {
            "if" => {
                let condition = self.evaluate(arg, span);
                self.conditionals.push(Conditional {
                    parent_active: self.active,
                    condition,
                    seen_else: false,
                    span,
                });
                self.active = self.active && condition;
            }
            "else" => match self.conditionals.last_mut() {
                Some(open) if !open.seen_else => {
                    open.seen_else = true;
                    self.active = open.parent_active && !open.condition;
                }
                _ => self.errors.push(CompileError::lexer(
                    codes::UNEXPECTED_DIRECTIVE,
                    "Unexpected processor directive",
                    span,
                )),
            },
            "endif" => match self.conditionals.pop() {
                Some(open) => self.active = open.parent_active,
                None => self.errors.push(CompileError::lexer(
                    codes::UNEXPECTED_DIRECTIVE,
                    "Unexpected processor directive",
                    span,
                )),
            },
            "define" if self.active => {
                if !arg.is_empty() && !self.defines.iter().any(|d| d == arg) {
                    self.defines.push(arg.to_string());
                }
            }
            "undef" if self.active => self.defines.retain(|d| d != arg),
            "define" | "undef" => {}
            _ if !self.active => {}
            _ => self.errors.push(CompileError::lexer(
                codes::BAD_DIRECTIVE,
                format!("Preprocessor directive expected, found `#{directive}'"),
                span,
            )),
        }
    }

    /// `SYMBOL`, `!SYMBOL`, `true` or `false`.
    fn evaluate(&mut self, expr: &str, span: Span) -> bool {
        let (negate, symbol) = match expr.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, expr),
        };
        let valid = !symbol.is_empty()
            && symbol.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if !valid {
            self.errors.push(CompileError::lexer(
                codes::BAD_DIRECTIVE,
                format!("Invalid preprocessor expression `{expr}'"),
                span,
            ));
            return false;
        }
        let value = match symbol {
            "true" => true,
            "false" => false,
            s => self.defines.iter().any(|d| d == s),
        };
        value != negate
    }

    // ── Literals ──────────────────────────────────────────────────

    fn lex_string(&mut self, start: usize) {
        let mut s = String::new();
        loop {
            let Some(c) = self.source[self.pos..].chars().next() else {
                self.errors.push(CompileError::lexer(
                    codes::NEWLINE_IN_CONSTANT,
                    "Newline in constant",
                    Span::new(start, self.pos),
                ));
                break;
            };
            match c {
                '"' => {
                    self.pos += 1;
                    break;
                }
                '\n' => {
                    self.errors.push(CompileError::lexer(
                        codes::NEWLINE_IN_CONSTANT,
                        "Newline in constant",
                        Span::new(start, self.pos),
                    ));
                    break;
                }
                '\\' => {
                    let esc_start = self.pos;
                    self.pos += 1;
                    let escaped = self.source[self.pos..].chars().next();
                    match escaped {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('r') => s.push('\r'),
                        Some('0') => s.push('\0'),
                        Some('"') => s.push('"'),
                        Some('\\') => s.push('\\'),
                        _ => self.errors.push(CompileError::lexer(
                            codes::BAD_ESCAPE,
                            "Unrecognized escape sequence",
                            Span::new(esc_start, self.pos + 1),
                        )),
                    }
                    self.pos += escaped.map_or(0, char::len_utf8);
                }
                other => {
                    s.push(other);
                    self.pos += other.len_utf8();
                }
            }
        }
        self.push(Token::Str(s), start, self.pos);
    }

    fn lex_number(&mut self, start: usize) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        // Check for decimal point
        if self.pos < self.bytes.len() && self.bytes[self.pos] == b'.'
            && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit)
        {
            self.pos += 1;
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
            let text = &self.source[start..self.pos];
            match text.parse::<f64>() {
                Ok(v) => self.push(Token::Float(v), start, self.pos),
                Err(_) => self.errors.push(CompileError::lexer(
                    codes::UNEXPECTED_CHARACTER,
                    format!("Invalid real literal `{text}'"),
                    Span::new(start, self.pos),
                )),
            }
        } else {
            let text = &self.source[start..self.pos];
            match text.parse::<i64>() {
                Ok(v) => self.push(Token::Int(v), start, self.pos),
                Err(_) => self.errors.push(CompileError::lexer(
                    codes::INTEGER_TOO_LARGE,
                    "Integral constant is too large",
                    Span::new(start, self.pos),
                )),
            }
        }
    }

    fn lex_ident(&mut self, start: usize) {
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let word = &self.source[start..self.pos];
        let token = match word {
            "using" => Token::Using,
            "namespace" => Token::Namespace,
            "class" => Token::Class,
            "struct" => Token::Struct,
            "public" => Token::Public,
            "private" => Token::Private,
            "internal" => Token::Internal,
            "static" => Token::Static,
            "let" => Token::Let,
            "fn" => Token::Fn,
            "new" => Token::New,
            "this" => Token::This,
            "null" => Token::Null,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "return" => Token::Return,
            "throw" => Token::Throw,
            "true" => Token::True,
            "false" => Token::False,
            "int" => Token::IntTy,
            "float" => Token::FloatTy,
            "bool" => Token::BoolTy,
            "string" => Token::StringTy,
            "void" => Token::VoidTy,
            "object" => Token::ObjectTy,
            _ => Token::Ident(word.to_string()),
        };
        self.push(token, start, self.pos);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tok(s: &str) -> Vec<Token> {
        tok_with(s, &[])
    }

    fn tok_with(s: &str, defines: &[&str]) -> Vec<Token> {
        let defines: Vec<String> = defines.iter().map(|d| (*d).to_string()).collect();
        lex(s, &defines).unwrap().into_iter().map(|t| t.token).collect()
    }

    fn codes_of(s: &str) -> Vec<u32> {
        lex(s, &[]).unwrap_err().into_iter().map(|e| e.code).collect()
    }

    #[test]
    fn simple_tokens() {
        let tokens = tok("1 + 2.5;");
        assert_eq!(tokens, vec![
            Token::Int(1), Token::Plus, Token::Float(2.5), Token::Semicolon, Token::Eof,
        ]);
    }

    #[test]
    fn keywords() {
        let tokens = tok("using namespace class struct let fn new this null");
        assert_eq!(tokens, vec![
            Token::Using, Token::Namespace, Token::Class, Token::Struct, Token::Let,
            Token::Fn, Token::New, Token::This, Token::Null, Token::Eof,
        ]);
    }

    #[test]
    fn type_keywords() {
        let tokens = tok("int float bool string void object");
        assert_eq!(tokens, vec![
            Token::IntTy, Token::FloatTy, Token::BoolTy, Token::StringTy,
            Token::VoidTy, Token::ObjectTy, Token::Eof,
        ]);
    }

    #[test]
    fn operators() {
        let tokens = tok("+ - * / % < > <= >= == != && || ! = ->");
        assert_eq!(tokens, vec![
            Token::Plus, Token::Minus, Token::Star, Token::Slash, Token::Percent,
            Token::Lt, Token::Gt, Token::Le, Token::Ge, Token::EqEq, Token::Ne,
            Token::And, Token::Or, Token::Bang, Token::Eq, Token::Arrow, Token::Eof,
        ]);
    }

    #[test]
    fn string_escapes() {
        let tokens = tok(r#""a\"b\n""#);
        assert_eq!(tokens, vec![Token::Str("a\"b\n".into()), Token::Eof]);
    }

    #[test]
    fn newline_in_string_is_an_error() {
        assert_eq!(codes_of("\"abc\nlet"), vec![codes::NEWLINE_IN_CONSTANT]);
    }

    #[test]
    fn comments_stripped() {
        let tokens = tok("a // line\n/* block\n spanning */ b");
        assert_eq!(tokens, vec![Token::Ident("a".into()), Token::Ident("b".into()), Token::Eof]);
    }

    #[test]
    fn unexpected_character() {
        assert_eq!(codes_of("let x = $;"), vec![codes::UNEXPECTED_CHARACTER]);
        assert_eq!(codes_of("a & b"), vec![codes::UNEXPECTED_CHARACTER]);
    }

    #[test]
    fn huge_integer_is_rejected() {
        assert_eq!(codes_of("99999999999999999999"), vec![codes::INTEGER_TOO_LARGE]);
    }

    #[test]
    fn conditional_regions() {
        let src = "#if DEBUG\na\n#else\nb\n#endif\nc";
        assert_eq!(tok(src), vec![Token::Ident("b".into()), Token::Ident("c".into()), Token::Eof]);
        assert_eq!(
            tok_with(src, &["DEBUG"]),
            vec![Token::Ident("a".into()), Token::Ident("c".into()), Token::Eof]
        );
    }

    #[test]
    fn nested_and_negated_conditionals() {
        let src = "#if !A\n#if B\nx\n#endif\ny\n#endif";
        assert_eq!(tok_with(src, &["B"]), vec![
            Token::Ident("x".into()), Token::Ident("y".into()), Token::Eof,
        ]);
        assert_eq!(tok_with(src, &["A", "B"]), vec![Token::Eof]);
    }

    #[test]
    fn define_inside_source() {
        let src = "#define FAST\n#if FAST\nquick\n#endif";
        assert_eq!(tok(src), vec![Token::Ident("quick".into()), Token::Eof]);
    }

    #[test]
    fn directive_errors() {
        assert_eq!(codes_of("#if X\na"), vec![codes::ENDIF_EXPECTED]);
        assert_eq!(codes_of("#endif"), vec![codes::UNEXPECTED_DIRECTIVE]);
        assert_eq!(codes_of("#if X\n#else\n#else\n#endif"), vec![codes::UNEXPECTED_DIRECTIVE]);
        assert_eq!(codes_of("#pragma once"), vec![codes::BAD_DIRECTIVE]);
    }
}
