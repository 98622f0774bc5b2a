//! Lexer for nair8
//!
//! Converts source code into a stream of tokens. Indentation is significant:
//! a deeper line opens a block with `Indent`, a shallower one closes blocks
//! with one `Dedent` per level. Inside brackets line breaks are ignored.

use crate::error::{LexError, LexErrorKind};
use crate::token::{lookup_keyword, Span, TemplatePiece, Token, TokenKind};

type Result<T> = std::result::Result<T, LexError>;

/// The lexer state
pub struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: usize,
    column: usize,
    /// Byte offset added to every span (non-zero for embedded expressions)
    offset: usize,
    indent_stack: Vec<usize>,
    at_line_start: bool,
    /// Open brackets, innermost last
    nesting: Vec<(char, Span)>,
    /// False when lexing an expression embedded in a string
    layout: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer from source code
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
            offset: 0,
            indent_stack: vec![0],
            at_line_start: true,
            nesting: Vec::new(),
            layout: true,
        }
    }

    /// Lexer for the code inside a `{...}` string interpolation. No layout
    /// tokens are produced and positions are reported relative to `origin`.
    pub fn embedded(source: &'a str, origin: Span) -> Self {
        Self {
            line: origin.line,
            column: origin.column,
            offset: origin.start,
            at_line_start: false,
            layout: false,
            ..Self::new(source)
        }
    }

    /// Tokenize the entire source
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            if self.at_line_start {
                self.at_line_start = false;
                if let Some(level) = self.line_indentation()? {
                    self.apply_indentation(level, &mut tokens)?;
                }
            }

            self.skip_whitespace_and_comments();

            let Some(&(_, ch)) = self.chars.peek() else {
                break;
            };

            if ch == '\n' {
                let span = self.span_here();
                self.advance();
                self.line += 1;
                self.column = 1;
                if self.layout && self.nesting.is_empty() {
                    self.push_newline(&mut tokens, span);
                    self.at_line_start = true;
                }
                continue;
            }

            tokens.push(self.next_token()?);
        }

        if let Some(&(open, span)) = self.nesting.last() {
            return Err(LexError::new(LexErrorKind::UnmatchedDelimiter(open), span));
        }

        let end = self.span_here();
        if self.layout {
            self.push_newline(&mut tokens, end);
            while self.indent_stack.len() > 1 {
                self.indent_stack.pop();
                tokens.push(Token::new(TokenKind::Dedent, end, String::new()));
            }
        }

        tokens.push(Token::new(TokenKind::Eof, end, String::new()));

        Ok(tokens)
    }

    /// Emit a statement separator unless the previous token already ends one
    fn push_newline(&self, tokens: &mut Vec<Token>, span: Span) {
        match tokens.last().map(|t| &t.kind) {
            None | Some(TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent) => {}
            _ => tokens.push(Token::new(TokenKind::Newline, span, String::new())),
        }
    }

    /// Measure the indentation of the line about to be read.
    /// Returns `None` for blank and comment-only lines, which never affect layout.
    fn line_indentation(&mut self) -> Result<Option<usize>> {
        let mut lookahead = self.chars.clone();
        let mut width = 0;

        while let Some(&(pos, c)) = lookahead.peek() {
            match c {
                ' ' => {
                    width += 1;
                    lookahead.next();
                }
                '\t' => {
                    return Err(LexError::new(
                        LexErrorKind::TabIndentation,
                        Span::new(self.offset + pos, self.offset + pos + 1, self.line, width + 1),
                    ));
                }
                '\r' => {
                    lookahead.next();
                }
                '\n' => return Ok(None),
                '/' if self.source[pos..].starts_with("//") => return Ok(None),
                _ => return Ok(Some(width)),
            }
        }

        Ok(None)
    }

    fn apply_indentation(&mut self, level: usize, tokens: &mut Vec<Token>) -> Result<()> {
        let current = self.indent_stack.last().copied().unwrap_or(0);
        let span = Span::new(
            self.offset + self.current_pos,
            self.offset + self.current_pos + level,
            self.line,
            level + 1,
        );

        if level > current {
            self.indent_stack.push(level);
            tokens.push(Token::new(TokenKind::Indent, span, String::new()));
        } else if level < current {
            while self.indent_stack.last().is_some_and(|&top| top > level) {
                self.indent_stack.pop();
                tokens.push(Token::new(TokenKind::Dedent, span, String::new()));
            }
            if self.indent_stack.last().copied().unwrap_or(0) != level {
                return Err(LexError::new(LexErrorKind::InvalidDedent(level), span));
            }
        }

        Ok(())
    }

    /// Get the next token
    fn next_token(&mut self) -> Result<Token> {
        let Some(&(start_pos, ch)) = self.chars.peek() else {
            return Ok(Token::new(TokenKind::Eof, self.span_here(), String::new()));
        };

        let start_line = self.line;
        let start_column = self.column;
        let start_span = Span::new(
            self.offset + start_pos,
            self.offset + start_pos + ch.len_utf8(),
            start_line,
            start_column,
        );

        let kind = match ch {
            '(' | '[' | '{' => {
                self.advance();
                self.nesting.push((ch, start_span));
                match ch {
                    '(' => TokenKind::LeftParen,
                    '[' => TokenKind::LeftBracket,
                    _ => TokenKind::LeftBrace,
                }
            }
            ')' | ']' | '}' => {
                self.advance();
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match self.nesting.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => {
                        return Err(LexError::new(LexErrorKind::UnmatchedDelimiter(ch), start_span));
                    }
                }
                match ch {
                    ')' => TokenKind::RightParen,
                    ']' => TokenKind::RightBracket,
                    _ => TokenKind::RightBrace,
                }
            }
            ',' => { self.advance(); TokenKind::Comma }
            ':' => { self.advance(); TokenKind::Colon }
            '.' => { self.advance(); TokenKind::Dot }
            '+' => { self.advance(); TokenKind::Plus }
            '-' => { self.advance(); TokenKind::Minus }
            '*' => { self.advance(); TokenKind::Star }
            '/' => { self.advance(); TokenKind::Slash }
            '%' => { self.advance(); TokenKind::Percent }

            '=' | '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    if ch == '=' { TokenKind::EqualEqual } else { TokenKind::BangEqual }
                } else {
                    return Err(LexError::new(LexErrorKind::UnexpectedCharacter(ch), start_span));
                }
            }
            '<' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }

            '"' => self.scan_string()?,

            c if c.is_ascii_digit() => self.scan_number()?,

            c if c.is_alphabetic() || c == '_' => self.scan_identifier(),

            _ => {
                self.advance();
                return Err(LexError::new(LexErrorKind::UnexpectedCharacter(ch), start_span));
            }
        };

        let lexeme = self.source[start_pos..self.current_pos].to_string();

        Ok(Token::new(
            kind,
            Span::new(
                self.offset + start_pos,
                self.offset + self.current_pos,
                start_line,
                start_column,
            ),
            lexeme,
        ))
    }

    /// Advance and return the current character
    fn advance(&mut self) -> Option<char> {
        if let Some((pos, ch)) = self.chars.next() {
            self.current_pos = pos + ch.len_utf8();
            self.column += 1;
            Some(ch)
        } else {
            None
        }
    }

    /// Peek at the next character without advancing
    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, ch)| ch)
    }

    fn span_here(&self) -> Span {
        let pos = self.offset + self.current_pos;
        Span::new(pos, pos, self.line, self.column)
    }

    /// Skip whitespace (except newlines) and comments
    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&(pos, ch)) = self.chars.peek() {
            match ch {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '/' if self.source[pos..].starts_with("//") => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Scan a string literal, splitting out `{expr}` interpolations
    fn scan_string(&mut self) -> Result<TokenKind> {
        let start = Span::new(self.offset + self.current_pos, self.offset + self.current_pos + 1, self.line, self.column);

        // Consume opening quote
        self.advance();

        let mut pieces = Vec::new();
        let mut literal = String::new();

        loop {
            match self.peek_char() {
                Some('"') => {
                    self.advance();
                    if pieces.is_empty() {
                        return Ok(TokenKind::Text(literal));
                    }
                    if !literal.is_empty() {
                        pieces.push(TemplatePiece::Literal(literal));
                    }
                    return Ok(TokenKind::Template(pieces));
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('n') => literal.push('\n'),
                        Some('t') => literal.push('\t'),
                        Some('r') => literal.push('\r'),
                        Some(c) => literal.push(c),
                        None => break,
                    }
                }
                Some('{') => {
                    self.advance();
                    if !literal.is_empty() {
                        pieces.push(TemplatePiece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(self.scan_interpolation()?);
                }
                Some('\n') => {
                    literal.push('\n');
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                Some(c) => {
                    literal.push(c);
                    self.advance();
                }
                None => break,
            }
        }

        Err(LexError::new(LexErrorKind::UnterminatedString, start))
    }

    /// Read the code of one `{...}` segment; the opening brace is consumed
    fn scan_interpolation(&mut self) -> Result<TemplatePiece> {
        let span = self.span_here();
        let code_start = self.current_pos;
        let mut depth = 0usize;
        let mut in_string = false;

        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return Err(LexError::new(LexErrorKind::UnterminatedInterpolation, span));
                }
                Some('"') => in_string = !in_string,
                Some('{') if !in_string => depth += 1,
                Some('}') if !in_string => {
                    if depth == 0 {
                        let source = self.source[code_start..self.current_pos].to_string();
                        self.advance();
                        return Ok(TemplatePiece::Code { source, span });
                    }
                    depth -= 1;
                }
                Some(_) => {}
            }
            self.advance();
        }
    }

    /// Scan a number literal
    fn scan_number(&mut self) -> Result<TokenKind> {
        let start = self.current_pos;
        let start_column = self.column;

        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        let mut is_decimal = false;
        if self.peek_char() == Some('.') {
            let remaining = &self.source[self.current_pos..];
            if remaining.chars().nth(1).is_some_and(|c| c.is_ascii_digit()) {
                is_decimal = true;
                self.advance();
                while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let text = &self.source[start..self.current_pos];
        let invalid = || {
            LexError::new(
                LexErrorKind::InvalidNumber(text.to_string()),
                Span::new(
                    self.offset + start,
                    self.offset + self.current_pos,
                    self.line,
                    start_column,
                ),
            )
        };

        if is_decimal {
            text.parse::<f64>().map(TokenKind::Decimal).map_err(|_| invalid())
        } else {
            text.parse::<i64>().map(TokenKind::Whole).map_err(|_| invalid())
        }
    }

    /// Scan an identifier or keyword
    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.current_pos;

        while self.peek_char().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }

        let text = &self.source[start..self.current_pos];
        lookup_keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        lexer.tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Ident(name.to_string())
    }

    #[test]
    fn test_keywords() {
        let tokens = tokenize("as is when or requires returning returns awaiting");
        assert_eq!(tokens, vec![
            TokenKind::As,
            TokenKind::Is,
            TokenKind::When,
            TokenKind::Or,
            TokenKind::Requires,
            TokenKind::Returning,
            TokenKind::Returning,
            TokenKind::Await,
            TokenKind::Newline,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("42 3.14 0 7.");
        assert_eq!(&tokens[..5], &[
            TokenKind::Whole(42),
            TokenKind::Decimal(3.14),
            TokenKind::Whole(0),
            TokenKind::Whole(7),
            TokenKind::Dot,
        ]);
    }

    #[test]
    fn test_declaration_line() {
        let tokens = tokenize("count as Whole is 2");
        assert_eq!(tokens, vec![
            ident("count"),
            TokenKind::As,
            ident("Whole"),
            TokenKind::Is,
            TokenKind::Whole(2),
            TokenKind::Newline,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_indent_and_dedent() {
        let tokens = tokenize("when x:\n    show 1\nshow 2\n");
        assert_eq!(tokens, vec![
            TokenKind::When,
            ident("x"),
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Show,
            TokenKind::Whole(1),
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Show,
            TokenKind::Whole(2),
            TokenKind::Newline,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_blank_and_comment_lines_keep_layout() {
        let tokens = tokenize("do:\n    show 1\n\n  // note\n    show 2\n");
        let dedents = tokens.iter().filter(|k| **k == TokenKind::Dedent).count();
        let indents = tokens.iter().filter(|k| **k == TokenKind::Indent).count();
        assert_eq!((indents, dedents), (1, 1));
    }

    #[test]
    fn test_nested_blocks_close_at_eof() {
        let tokens = tokenize("loop while a:\n  when b:\n    show 1");
        let tail: Vec<_> = tokens.iter().rev().take(3).cloned().collect();
        assert_eq!(tail, vec![TokenKind::Eof, TokenKind::Dedent, TokenKind::Dedent]);
    }

    #[test]
    fn test_brackets_suppress_layout() {
        let tokens = tokenize("xs as List is [1,\n      2]\n");
        assert!(!tokens.contains(&TokenKind::Indent));
        assert_eq!(tokens.iter().filter(|k| **k == TokenKind::Newline).count(), 1);
    }

    #[test]
    fn test_inconsistent_dedent() {
        let mut lexer = Lexer::new("do:\n    show 1\n  show 2\n");
        let err = lexer.tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::InvalidDedent(2));
        assert_eq!(err.span.line, 3);
    }

    #[test]
    fn test_tab_indentation() {
        let mut lexer = Lexer::new("do:\n\tshow 1\n");
        assert_eq!(lexer.tokenize().unwrap_err().kind, LexErrorKind::TabIndentation);
    }

    #[test]
    fn test_template_string() {
        let tokens = tokenize(r#""Hi {name}!""#);
        match &tokens[0] {
            TokenKind::Template(pieces) => {
                assert_eq!(pieces.len(), 3);
                assert_eq!(pieces[0], TemplatePiece::Literal("Hi ".to_string()));
                assert!(matches!(&pieces[1], TemplatePiece::Code { source, .. } if source == "name"));
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_escaped_brace_is_plain_text() {
        let tokens = tokenize(r#""\{x\}""#);
        assert_eq!(tokens[0], TokenKind::Text("{x}".to_string()));
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("show \"oops");
        assert_eq!(lexer.tokenize().unwrap_err().kind, LexErrorKind::UnterminatedString);
    }

    #[test]
    fn test_unexpected_character() {
        let mut lexer = Lexer::new("x is 1 = 2");
        assert_eq!(lexer.tokenize().unwrap_err().kind, LexErrorKind::UnexpectedCharacter('='));
    }

    #[test]
    fn test_whole_overflow_is_invalid() {
        let mut lexer = Lexer::new("99999999999999999999");
        assert!(matches!(lexer.tokenize().unwrap_err().kind, LexErrorKind::InvalidNumber(_)));
    }
}
