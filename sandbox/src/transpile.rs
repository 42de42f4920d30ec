//! TypeScript to JavaScript by type erasure.
//!
//! This is a source-to-source pass over a token stream, not a type checker:
//! annotations, type-only declarations, generic parameter lists and casts
//! are removed and everything else is copied through untouched. Erased text
//! is replaced by its newlines only, so line numbers in runtime errors still
//! point into the participant's buffer.
//!
//! The one construct that needs real code generation, `enum`, is lowered to
//! the same IIFE the TypeScript compiler emits. `namespace` and `module`
//! blocks are rejected instead of being translated wrongly.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("unterminated {what} starting on line {line}")]
    Unterminated { what: &'static str, line: usize },
    #[error("unexpected `{found}` on line {line}")]
    Unbalanced { found: char, line: usize },
    #[error("missing `{expected}` for the bracket opened on line {line}")]
    Unclosed { expected: char, line: usize },
    #[error("`{construct}` declarations are not supported (line {line})")]
    Unsupported { construct: &'static str, line: usize },
}

pub fn transpile(source: &str) -> Result<String, TranslationError> {
    let tokens = Lexer::new(source).tokenize()?;
    Eraser::new(source, tokens).run()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemplatePart {
    Full,
    Head,
    Middle,
    Tail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Str,
    Template(TemplatePart),
    Regex,
    Punct,
    Comment,
    Space,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

impl Token {
    fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Space | TokenKind::Comment)
    }
}

const PUNCTUATORS: [&str; 36] = [
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "+", "-", "*",
];

/// Keywords after which a `/` starts a regular expression rather than a division.
const EXPRESSION_KEYWORDS: [&str; 14] = [
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

const MODIFIERS: [&str; 7] = [
    "public",
    "private",
    "protected",
    "readonly",
    "override",
    "abstract",
    "declare",
];

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    // `true` marks a brace opened by `${` inside a template literal.
    braces: Vec<bool>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            braces: Vec::new(),
            tokens: Vec::new(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, TranslationError> {
        while self.pos < self.bytes.len() {
            let start = self.pos;
            let kind = self.next_kind()?;
            self.tokens.push(Token {
                kind,
                start,
                end: self.pos,
            });
        }
        Ok(self.tokens)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn unterminated(&self, what: &'static str, start: usize) -> TranslationError {
        TranslationError::Unterminated {
            what,
            line: line_of(self.src, start),
        }
    }

    fn next_kind(&mut self) -> Result<TokenKind, TranslationError> {
        let start = self.pos;
        let c = self.bytes[self.pos];
        if c.is_ascii_whitespace() {
            while self.peek(0).map_or(false, |b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            return Ok(TokenKind::Space);
        }
        if c == b'/' && self.peek(1) == Some(b'/') {
            while self.peek(0).map_or(false, |b| b != b'\n') {
                self.pos += 1;
            }
            return Ok(TokenKind::Comment);
        }
        if c == b'/' && self.peek(1) == Some(b'*') {
            return match self.src[self.pos + 2..].find("*/") {
                Some(end) => {
                    self.pos += end + 4;
                    Ok(TokenKind::Comment)
                }
                None => Err(self.unterminated("comment", start)),
            };
        }
        if c == b'"' || c == b'\'' {
            self.string(c, start)?;
            return Ok(TokenKind::Str);
        }
        if c == b'`' {
            self.pos += 1;
            return self.template(start, false);
        }
        if is_ident_byte(c) && !c.is_ascii_digit() || c == b'#' {
            self.pos += 1;
            while self.peek(0).map_or(false, is_ident_byte) {
                self.pos += 1;
            }
            return Ok(TokenKind::Ident);
        }
        if c.is_ascii_digit() || (c == b'.' && self.peek(1).map_or(false, |b| b.is_ascii_digit())) {
            self.number();
            return Ok(TokenKind::Number);
        }
        if c == b'/' && self.regex_allowed() {
            self.regex(start)?;
            return Ok(TokenKind::Regex);
        }
        match c {
            b'{' => {
                self.braces.push(false);
                self.pos += 1;
                Ok(TokenKind::Punct)
            }
            b'}' => {
                self.pos += 1;
                if self.braces.pop() == Some(true) {
                    self.template(start, true)
                } else {
                    Ok(TokenKind::Punct)
                }
            }
            _ => {
                self.punct();
                Ok(TokenKind::Punct)
            }
        }
    }

    fn string(&mut self, quote: u8, start: usize) -> Result<(), TranslationError> {
        self.pos += 1;
        loop {
            match self.peek(0) {
                Some(b'\\') => self.pos += 2,
                Some(b'\n') | None => return Err(self.unterminated("string literal", start)),
                Some(b) => {
                    self.pos += 1;
                    if b == quote {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn template(&mut self, start: usize, continued: bool) -> Result<TokenKind, TranslationError> {
        loop {
            match self.peek(0) {
                Some(b'\\') => self.pos += 2,
                Some(b'`') => {
                    self.pos += 1;
                    let part = if continued {
                        TemplatePart::Tail
                    } else {
                        TemplatePart::Full
                    };
                    return Ok(TokenKind::Template(part));
                }
                Some(b'$') if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.braces.push(true);
                    let part = if continued {
                        TemplatePart::Middle
                    } else {
                        TemplatePart::Head
                    };
                    return Ok(TokenKind::Template(part));
                }
                Some(_) => self.pos += 1,
                None => return Err(self.unterminated("template literal", start)),
            }
        }
    }

    fn number(&mut self) {
        let hex = self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x') | Some(b'X'));
        while let Some(b) = self.peek(0) {
            let exponent_sign = (b == b'+' || b == b'-')
                && !hex
                && matches!(self.bytes[self.pos - 1], b'e' | b'E');
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn regex(&mut self, start: usize) -> Result<(), TranslationError> {
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.peek(0) {
                Some(b'\\') => self.pos += 2,
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(b'\n') | None => {
                    return Err(self.unterminated("regular expression", start))
                }
                Some(_) => self.pos += 1,
            }
        }
        while self.peek(0).map_or(false, is_ident_byte) {
            self.pos += 1;
        }
        Ok(())
    }

    fn punct(&mut self) {
        let rest = &self.src[self.pos..];
        for candidate in PUNCTUATORS.iter() {
            if rest.starts_with(candidate) {
                // `a ? .5 : 1` is a conditional, not optional chaining.
                if *candidate == "?."
                    && self.peek(2).map_or(false, |b| b.is_ascii_digit())
                {
                    continue;
                }
                self.pos += candidate.len();
                return;
            }
        }
        // Single byte punctuators; multi-byte characters are consumed whole.
        let width = rest.chars().next().map_or(1, char::len_utf8);
        self.pos += width;
    }

    fn regex_allowed(&self) -> bool {
        let previous = self.tokens.iter().rev().find(|t| !t.is_trivia());
        match previous {
            None => true,
            Some(token) => {
                let text = &self.src[token.start..token.end];
                match token.kind {
                    TokenKind::Punct => !matches!(text, ")" | "]" | "}"),
                    TokenKind::Ident => EXPRESSION_KEYWORDS.contains(&text),
                    TokenKind::Template(TemplatePart::Head)
                    | TokenKind::Template(TemplatePart::Middle) => true,
                    _ => false,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Block,
    Object,
    Class,
    Params,
    Paren,
    Bracket,
    Template,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    opened_at: usize,
    ternaries: u32,
    // Class frames: inside a field initializer, where `(` is a call.
    initializer: bool,
    constructor: bool,
    parameter_properties: Vec<String>,
}

impl Frame {
    fn new(kind: FrameKind, opened_at: usize) -> Self {
        Self {
            kind,
            opened_at,
            ternaries: 0,
            initializer: false,
            constructor: false,
            parameter_properties: Vec::new(),
        }
    }
}

/// Value of the next enum member that has no initializer.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EnumCounter {
    Next(i64),
    /// One more than the member with this key.
    After(String),
    /// The previous member was a string.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeContext {
    Annotation,
    Cast,
}

struct Eraser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    // Indices of non-trivia tokens.
    sig: Vec<usize>,
    erased: Vec<bool>,
    injections: HashMap<usize, String>,
    frames: Vec<Frame>,
    // Kept significant tokens, as indices into `sig`.
    history: Vec<usize>,
    closed_params_at: Option<usize>,
    forced_statement_start: Option<usize>,
    class_header: bool,
    declaration_depth: Option<usize>,
    in_import: bool,
    pending_parameter_property: bool,
    pending_constructor_properties: Vec<String>,
}

impl<'a> Eraser<'a> {
    fn new(src: &'a str, tokens: Vec<Token>) -> Self {
        let sig = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_trivia())
            .map(|(i, _)| i)
            .collect();
        let erased = vec![false; tokens.len()];
        Self {
            src,
            tokens,
            sig,
            erased,
            injections: HashMap::new(),
            frames: vec![Frame::new(FrameKind::Block, 0)],
            history: Vec::new(),
            closed_params_at: None,
            forced_statement_start: None,
            class_header: false,
            declaration_depth: None,
            in_import: false,
            pending_parameter_property: false,
            pending_constructor_properties: Vec::new(),
        }
    }

    fn run(mut self) -> Result<String, TranslationError> {
        let mut p = 0;
        while p < self.sig.len() {
            p = self.step(p)?;
        }
        if self.frames.len() > 1 {
            let frame = &self.frames[self.frames.len() - 1];
            let expected = match frame.kind {
                FrameKind::Params | FrameKind::Paren => ')',
                FrameKind::Bracket => ']',
                FrameKind::Template => '`',
                _ => '}',
            };
            return Err(TranslationError::Unclosed {
                expected,
                line: self.line(frame.opened_at),
            });
        }
        Ok(self.render())
    }

    fn render(&self) -> String {
        let mut out = String::with_capacity(self.src.len());
        for (i, token) in self.tokens.iter().enumerate() {
            let text = &self.src[token.start..token.end];
            if self.erased[i] {
                out.extend(text.matches('\n'));
            } else {
                out.push_str(text);
            }
            if let Some(extra) = self.injections.get(&i) {
                out.push_str(extra);
            }
        }
        out
    }

    // ---- token accessors -------------------------------------------------

    fn token(&self, p: usize) -> Token {
        self.tokens[self.sig[p]]
    }

    fn text(&self, p: usize) -> &'a str {
        let src = self.src;
        let token = self.token(p);
        &src[token.start..token.end]
    }

    fn kind(&self, p: usize) -> Option<TokenKind> {
        if p < self.sig.len() {
            Some(self.token(p).kind)
        } else {
            None
        }
    }

    fn is(&self, p: usize, text: &str) -> bool {
        p < self.sig.len()
            && matches!(self.token(p).kind, TokenKind::Punct | TokenKind::Ident)
            && self.text(p) == text
    }

    fn is_ident(&self, p: usize) -> bool {
        self.kind(p) == Some(TokenKind::Ident)
    }

    fn line(&self, p: usize) -> usize {
        line_of(self.src, self.token(p).start)
    }

    fn newline_before(&self, p: usize) -> bool {
        let from = if p == 0 { 0 } else { self.sig[p - 1] + 1 };
        self.tokens[from..self.sig[p]]
            .iter()
            .any(|t| self.src[t.start..t.end].contains('\n'))
    }

    fn prev(&self, n: usize) -> Option<usize> {
        self.history.len().checked_sub(n + 1).map(|i| self.history[i])
    }

    fn prev_is(&self, n: usize, text: &str) -> bool {
        self.prev(n).map_or(false, |p| self.is(p, text))
    }

    fn prev_is_ident(&self, n: usize) -> bool {
        self.prev(n).map_or(false, |p| self.is_ident(p))
    }

    fn prev_ends_expression(&self) -> bool {
        match self.prev(0) {
            None => false,
            Some(p) => match self.token(p).kind {
                TokenKind::Ident => !EXPRESSION_KEYWORDS.contains(&self.text(p)),
                TokenKind::Number | TokenKind::Str | TokenKind::Regex => true,
                TokenKind::Template(part) => {
                    matches!(part, TemplatePart::Full | TemplatePart::Tail)
                }
                TokenKind::Punct => matches!(self.text(p), ")" | "]" | "}"),
                _ => false,
            },
        }
    }

    fn top(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn at_statement_start(&self, p: usize) -> bool {
        self.forced_statement_start == Some(p)
            || self.history.is_empty()
            || self.prev_is(0, ";")
            || self.prev_is(0, "{")
            || self.prev_is(0, "}")
            || self.newline_before(p)
    }

    // ---- output bookkeeping ----------------------------------------------

    fn keep(&mut self, p: usize) -> usize {
        self.history.push(p);
        p + 1
    }

    fn erase_raw(&mut self, lo: usize, hi: usize) {
        for flag in &mut self.erased[lo..hi] {
            *flag = true;
        }
    }

    /// Erases significant tokens `from..to` and the trivia between them.
    fn erase(&mut self, from: usize, to: usize) -> usize {
        let to = to.min(self.sig.len());
        if from < to {
            self.erase_raw(self.sig[from], self.sig[to - 1] + 1);
        }
        to
    }

    /// Like `erase`, also taking the trivia before `from`.
    fn erase_leading(&mut self, from: usize, to: usize) -> usize {
        let to = to.min(self.sig.len());
        if from < to {
            let lo = if from == 0 { 0 } else { self.sig[from - 1] + 1 };
            self.erase_raw(lo, self.sig[to - 1] + 1);
        }
        to
    }

    /// Like `erase`, also taking the trivia after the last erased token.
    fn erase_trailing(&mut self, from: usize, to: usize) -> usize {
        let to = to.min(self.sig.len());
        if from < to {
            let hi = if to < self.sig.len() {
                self.sig[to]
            } else {
                self.tokens.len()
            };
            self.erase_raw(self.sig[from], hi);
        }
        to
    }

    // ---- the pass --------------------------------------------------------

    fn step(&mut self, p: usize) -> Result<usize, TranslationError> {
        match self.token(p).kind {
            TokenKind::Ident => self.ident(p),
            TokenKind::Punct => self.punct(p),
            TokenKind::Template(part) => {
                match part {
                    TemplatePart::Head => self.frames.push(Frame::new(FrameKind::Template, p)),
                    TemplatePart::Middle | TemplatePart::Tail => {
                        if self.top().kind != FrameKind::Template {
                            return Err(TranslationError::Unbalanced {
                                found: '}',
                                line: self.line(p),
                            });
                        }
                        if part == TemplatePart::Tail {
                            self.frames.pop();
                        }
                    }
                    TemplatePart::Full => {}
                }
                Ok(self.keep(p))
            }
            TokenKind::Str => {
                if self.in_import && self.prev_is(0, "from") {
                    self.in_import = false;
                }
                Ok(self.keep(p))
            }
            _ => Ok(self.keep(p)),
        }
    }

    fn ident(&mut self, p: usize) -> Result<usize, TranslationError> {
        let word = self.text(p);
        let after_dot = self.prev_is(0, ".") || self.prev_is(0, "?.");
        if after_dot {
            return Ok(self.keep_ident(p));
        }

        let top = self.top().kind;
        if top == FrameKind::Block && self.at_statement_start(p) {
            if let Some(next) = self.statement_keyword(p, word)? {
                return Ok(next);
            }
        }

        if matches!(top, FrameKind::Class | FrameKind::Params)
            && MODIFIERS.contains(&word)
            && self.starts_member(p + 1)
        {
            // Bodiless members have nothing left to emit.
            if top == FrameKind::Class && (word == "abstract" || word == "declare") {
                let end = self.skip_statement(p)?;
                return Ok(self.erase(p, end));
            }
            if top == FrameKind::Params {
                self.pending_parameter_property = true;
            }
            return Ok(self.erase_trailing(p, p + 1));
        }

        if (word == "as" || word == "satisfies") && !self.in_import && self.prev_ends_expression()
        {
            let end = self.skip_type(p + 1, TypeContext::Cast);
            return Ok(self.erase_leading(p, end));
        }

        if self.class_header && word == "implements" {
            let mut end = p + 1;
            while end < self.sig.len() && !self.is(end, "{") {
                end += 1;
            }
            return Ok(self.erase_leading(p, end));
        }

        match word {
            "class" => self.class_header = true,
            "let" | "const" | "var" => self.declaration_depth = Some(self.frames.len()),
            _ => {}
        }
        if top == FrameKind::Class && self.newline_before(p) && self.prev_ends_expression() {
            self.top_mut().initializer = false;
        }
        Ok(self.keep_ident(p))
    }

    fn keep_ident(&mut self, p: usize) -> usize {
        if self.pending_parameter_property && self.top().kind == FrameKind::Params {
            self.pending_parameter_property = false;
            let name = self.text(p).to_owned();
            self.top_mut().parameter_properties.push(name);
        }
        let next = self.keep(p);
        // Type arguments: `identity<T>(x)`, `new Map<K, V>()`, `class Box<T> {`.
        if self.is(next, "<") {
            if let Some(end) = self.generic_args_end(next) {
                let closes_declaration = self.class_header
                    && (self.is(end, "{") || self.is(end, "extends") || self.is(end, "implements"));
                if self.is(end, "(") || closes_declaration {
                    return self.erase(next, end);
                }
            }
        }
        next
    }

    /// Statement-level TypeScript keywords. `None` means "not special here".
    fn statement_keyword(
        &mut self,
        p: usize,
        word: &str,
    ) -> Result<Option<usize>, TranslationError> {
        let next = match word {
            "interface" if self.is_ident(p + 1) => {
                let mut open = p + 1;
                while open < self.sig.len() && !self.is(open, "{") {
                    open += 1;
                }
                let close = self.matching_close(open)?;
                self.erase(p, close + 1)
            }
            "type" if self.is_ident(p + 1) && (self.is(p + 2, "=") || self.is(p + 2, "<")) => {
                let mut eq = p + 2;
                let mut angle = 0usize;
                while eq < self.sig.len() && !(angle == 0 && self.is(eq, "=")) {
                    angle = adjust_angle(angle, self.text(eq));
                    eq += 1;
                }
                let mut end = self.skip_type(eq + 1, TypeContext::Annotation);
                if self.is(end, ";") {
                    end += 1;
                }
                self.erase(p, end)
            }
            "declare" if self.is_ident(p + 1) => {
                let end = self.skip_statement(p)?;
                self.erase(p, end)
            }
            "enum" if self.is_ident(p + 1) && self.is(p + 2, "{") => self.lower_enum(p, p)?,
            "const" if self.is(p + 1, "enum") && self.is_ident(p + 2) && self.is(p + 3, "{") => {
                self.lower_enum(p, p + 1)?
            }
            "namespace" | "module"
                if matches!(self.kind(p + 1), Some(TokenKind::Ident) | Some(TokenKind::Str))
                    && (self.is(p + 2, "{") || self.is(p + 2, ".")) =>
            {
                return Err(self.unsupported(if word == "module" { "module" } else { "namespace" }, p))
            }
            "abstract" if self.is(p + 1, "class") => {
                self.forced_statement_start = Some(p + 1);
                self.erase_trailing(p, p + 1)
            }
            "export" => {
                let list = self.is(p + 1, "{")
                    || self.is(p + 1, "*")
                    || (self.is(p + 1, "type") && self.is(p + 2, "{"));
                if list {
                    let end = self.skip_statement(p)?;
                    self.erase(p, end)
                } else if self.is(p + 1, "default") {
                    self.forced_statement_start = Some(p + 2);
                    self.erase_trailing(p, p + 2)
                } else {
                    self.forced_statement_start = Some(p + 1);
                    self.erase_trailing(p, p + 1)
                }
            }
            "import" if self.is(p + 1, "type") && !self.is(p + 2, "=") => {
                let end = self.skip_statement(p)?;
                self.erase(p, end)
            }
            "import" => {
                self.in_import = true;
                return Ok(None);
            }
            _ => return Ok(None),
        };
        Ok(Some(next))
    }

    /// `enum E { A, B = 4 }` becomes an IIFE filling `E` with forward
    /// mappings, plus reverse mappings for numeric members. Every generated
    /// statement sits on the line of the member it came from.
    fn lower_enum(&mut self, start: usize, keyword: usize) -> Result<usize, TranslationError> {
        let name = self.text(keyword + 1);
        let open = keyword + 2;
        let close = self.matching_close(open)?;
        self.erase(start, close + 1);
        self.inject(open, &format!(" var {0}; (function ({0}) {{", name));

        let mut members: Vec<&'a str> = Vec::new();
        let mut counter = EnumCounter::Next(0);
        let mut q = open + 1;
        while q < close {
            let key = match self.kind(q) {
                Some(TokenKind::Ident) => format!("\"{}\"", self.text(q)),
                Some(TokenKind::Str) => self.text(q).to_owned(),
                _ => return Err(self.unsupported("enum", q)),
            };
            let mut end = q + 1;
            let mut depth = 0usize;
            while end < close && !(depth == 0 && self.is(end, ",")) {
                depth = adjust_depth(depth, self.token(end).kind, self.text(end));
                end += 1;
            }

            let statement = if end == q + 1 {
                let value = match &counter {
                    EnumCounter::Next(n) => n.to_string(),
                    EnumCounter::After(prev) => format!("{}[{}] + 1", name, prev),
                    // A member after a string member needs an initializer.
                    EnumCounter::Unknown => return Err(self.unsupported("enum", q)),
                };
                counter = match &counter {
                    EnumCounter::Next(n) => EnumCounter::Next(n + 1),
                    _ => EnumCounter::After(key.clone()),
                };
                format!(" {0}[{0}[{1}] = {2}] = {1};", name, key, value)
            } else if self.is(q + 1, "=") && end > q + 2 {
                let value = self.enum_initializer(name, &members, q + 2, end);
                let string_valued = end == q + 3
                    && matches!(
                        self.kind(q + 2),
                        Some(TokenKind::Str) | Some(TokenKind::Template(TemplatePart::Full))
                    );
                if string_valued {
                    counter = EnumCounter::Unknown;
                    format!(" {}[{}] = {};", name, key, value)
                } else {
                    counter = match self.enum_literal(q + 2, end) {
                        Some(n) => EnumCounter::Next(n + 1),
                        None => EnumCounter::After(key.clone()),
                    };
                    format!(" {0}[{0}[{1}] = {2}] = {1};", name, key, value)
                }
            } else {
                return Err(self.unsupported("enum", q));
            };
            self.inject(q, &statement);
            if self.is_ident(q) {
                members.push(self.text(q));
            }
            q = end + 1;
        }
        self.inject(close, &format!(" }})({0} || ({0} = {{}}));", name));
        Ok(close + 1)
    }

    /// Initializer source with earlier members qualified by the enum name.
    fn enum_initializer(&self, name: &str, members: &[&str], from: usize, to: usize) -> String {
        let mut out = String::new();
        let mut after_dot = false;
        for token in &self.tokens[self.sig[from]..=self.sig[to - 1]] {
            if token.is_trivia() {
                out.push(' ');
                continue;
            }
            let text = &self.src[token.start..token.end];
            if token.kind == TokenKind::Ident && !after_dot && members.contains(&text) {
                out.push_str(name);
                out.push('.');
            }
            out.push_str(text);
            after_dot = token.kind == TokenKind::Punct && (text == "." || text == "?.");
        }
        out
    }

    /// The value of an initializer that is a plain integer literal.
    fn enum_literal(&self, from: usize, to: usize) -> Option<i64> {
        match to - from {
            1 if self.kind(from) == Some(TokenKind::Number) => integer_literal(self.text(from)),
            2 if self.is(from, "-") && self.kind(from + 1) == Some(TokenKind::Number) => {
                integer_literal(self.text(from + 1)).map(|n| -n)
            }
            _ => None,
        }
    }

    fn inject(&mut self, p: usize, text: &str) {
        self.injections
            .entry(self.sig[p])
            .or_default()
            .push_str(text);
    }

    fn unsupported(&self, construct: &'static str, p: usize) -> TranslationError {
        TranslationError::Unsupported {
            construct,
            line: self.line(p),
        }
    }

    /// Whether `p` begins a class member or parameter name, so a preceding
    /// word is a modifier rather than a member called `readonly` or `public`.
    fn starts_member(&self, p: usize) -> bool {
        match self.kind(p) {
            Some(TokenKind::Ident) | Some(TokenKind::Str) | Some(TokenKind::Number) => true,
            Some(TokenKind::Punct) => matches!(self.text(p), "[" | "*" | "{"),
            _ => false,
        }
    }

    fn punct(&mut self, p: usize) -> Result<usize, TranslationError> {
        let text = self.text(p);
        match text {
            "(" => {
                let kind = if self.is_params_open(p) {
                    FrameKind::Params
                } else {
                    FrameKind::Paren
                };
                let mut frame = Frame::new(kind, p);
                frame.constructor = kind == FrameKind::Params && self.prev_is(0, "constructor");
                self.frames.push(frame);
                Ok(self.keep(p))
            }
            "[" => {
                self.frames.push(Frame::new(FrameKind::Bracket, p));
                Ok(self.keep(p))
            }
            "{" => {
                let kind = if self.class_header {
                    self.class_header = false;
                    FrameKind::Class
                } else if self.is_object_open() {
                    FrameKind::Object
                } else {
                    FrameKind::Block
                };
                if kind == FrameKind::Block && !self.pending_constructor_properties.is_empty() {
                    let assignments: String = self
                        .pending_constructor_properties
                        .drain(..)
                        .map(|name| format!(" this.{} = {};", name, name))
                        .collect();
                    self.inject(p, &assignments);
                }
                self.frames.push(Frame::new(kind, p));
                Ok(self.keep(p))
            }
            ")" | "]" | "}" => {
                let found = text.chars().next().unwrap_or('}');
                let matches_top = match (found, self.top().kind) {
                    (')', FrameKind::Params) | (')', FrameKind::Paren) => true,
                    (']', FrameKind::Bracket) => true,
                    ('}', FrameKind::Block) | ('}', FrameKind::Object) | ('}', FrameKind::Class) => {
                        true
                    }
                    _ => false,
                };
                if self.frames.len() == 1 || !matches_top {
                    return Err(TranslationError::Unbalanced {
                        found,
                        line: self.line(p),
                    });
                }
                if let Some(frame) = self.frames.pop() {
                    if frame.kind == FrameKind::Params && frame.constructor {
                        self.pending_constructor_properties = frame.parameter_properties;
                    }
                    if self.declaration_depth.map_or(false, |d| d > self.frames.len()) {
                        self.declaration_depth = None;
                    }
                    let next = self.keep(p);
                    if frame.kind == FrameKind::Params {
                        self.closed_params_at = Some(self.history.len());
                    }
                    return Ok(next);
                }
                Ok(self.keep(p))
            }
            ":" => Ok(self.colon(p)),
            "?" => {
                let optional_marker = matches!(self.top().kind, FrameKind::Params | FrameKind::Class)
                    && (self.is(p + 1, ":")
                        || (self.top().kind == FrameKind::Params
                            && (self.is(p + 1, ")") || self.is(p + 1, ",") || self.is(p + 1, "="))));
                if optional_marker {
                    return Ok(self.erase(p, p + 1));
                }
                self.top_mut().ternaries += 1;
                Ok(self.keep(p))
            }
            "!" => {
                let next_closes = [".", "?.", ")", "]", ",", ";", "[", "}", ":", "="]
                    .iter()
                    .any(|t| self.is(p + 1, t));
                if self.prev_ends_expression() && next_closes {
                    return Ok(self.erase(p, p + 1));
                }
                Ok(self.keep(p))
            }
            "<" if !self.prev_ends_expression() => {
                // `<T>(x: T) => x`
                if let Some(end) = self.generic_args_end(p) {
                    if self.is(end, "(") {
                        return Ok(self.erase(p, end));
                    }
                }
                Ok(self.keep(p))
            }
            ";" => {
                self.in_import = false;
                if self.declaration_depth == Some(self.frames.len()) {
                    self.declaration_depth = None;
                }
                if self.top().kind == FrameKind::Class {
                    self.top_mut().initializer = false;
                }
                Ok(self.keep(p))
            }
            "=" => {
                if self.top().kind == FrameKind::Class {
                    self.top_mut().initializer = true;
                }
                Ok(self.keep(p))
            }
            _ => Ok(self.keep(p)),
        }
    }

    fn colon(&mut self, p: usize) -> usize {
        if self.top().ternaries > 0 {
            self.top_mut().ternaries -= 1;
            return self.keep(p);
        }
        let binding_end = self.prev_is_ident(0) || self.prev_is(0, "}") || self.prev_is(0, "]");
        let annotation = match self.top().kind {
            FrameKind::Params => binding_end,
            FrameKind::Class => {
                !self.top().initializer
                    && (binding_end
                        || matches!(
                            self.prev(0).and_then(|q| self.kind(q)),
                            Some(TokenKind::Str) | Some(TokenKind::Number)
                        ))
            }
            _ => false,
        };
        let return_type = self.prev_is(0, ")") && self.closed_params_at == Some(self.history.len());
        let declaration = self.prev_is_ident(0)
            && (self.prev_is(1, "let")
                || self.prev_is(1, "const")
                || self.prev_is(1, "var")
                || (self.prev_is(1, ",") && self.declaration_depth == Some(self.frames.len())));
        if annotation || return_type || declaration {
            let end = self.skip_type(p + 1, TypeContext::Annotation);
            return self.erase(p, end);
        }
        self.keep(p)
    }

    fn is_params_open(&self, p: usize) -> bool {
        if self.prev_is(0, "function") || (self.prev_is(0, "*") && self.prev_is(1, "function")) {
            return true;
        }
        if self.prev_is_ident(0)
            && (self.prev_is(1, "function") || (self.prev_is(1, "*") && self.prev_is(2, "function")))
        {
            return true;
        }
        let top = self.top();
        let named = self.prev_is_ident(0)
            || self.prev_is(0, "]")
            || matches!(self.prev(0).and_then(|q| self.kind(q)), Some(TokenKind::Str));
        if top.kind == FrameKind::Class && !top.initializer && named {
            return true;
        }
        if top.kind == FrameKind::Object
            && self.prev_is_ident(0)
            && ["{", ",", "async", "get", "set", "*"]
                .iter()
                .any(|t| self.prev_is(1, t))
        {
            return true;
        }
        self.arrow_params_ahead(p)
    }

    /// Looks past the parenthesised group at `p` for `=>`, optionally after a
    /// return type annotation.
    fn arrow_params_ahead(&self, p: usize) -> bool {
        let close = match self.matching_close(p) {
            Ok(close) => close,
            Err(_) => return false,
        };
        if self.is(close + 1, "=>") {
            return true;
        }
        if !self.is(close + 1, ":") {
            return false;
        }
        let mut depth = 0usize;
        let mut q = close + 2;
        while q < self.sig.len() {
            let text = self.text(q);
            if depth == 0 {
                match text {
                    "=>" => return true,
                    ";" | "," | ")" | "]" | "}" => return false,
                    _ => {}
                }
            }
            depth = adjust_depth(depth, self.token(q).kind, text);
            q += 1;
        }
        false
    }

    fn is_object_open(&self) -> bool {
        let prev = match self.prev(0) {
            None => return false,
            Some(prev) => prev,
        };
        let text = self.text(prev);
        match self.token(prev).kind {
            TokenKind::Punct => match text {
                ")" | "}" | "]" | ";" | "=>" | "{" => false,
                ":" => !matches!(self.top().kind, FrameKind::Block | FrameKind::Class),
                _ => true,
            },
            TokenKind::Ident => matches!(
                text,
                "return" | "typeof" | "void" | "yield" | "await" | "in" | "of" | "case"
                    | "throw" | "delete" | "instanceof"
            ),
            TokenKind::Template(TemplatePart::Head) | TokenKind::Template(TemplatePart::Middle) => {
                true
            }
            _ => false,
        }
    }

    // ---- forward scans -----------------------------------------------------

    fn matching_close(&self, open: usize) -> Result<usize, TranslationError> {
        if open >= self.sig.len() {
            return Err(TranslationError::Unclosed {
                expected: '}',
                line: line_of(self.src, self.src.len()),
            });
        }
        let mut depth = 0usize;
        let mut q = open;
        while q < self.sig.len() {
            let token = self.token(q);
            depth = adjust_depth(depth, token.kind, self.text(q));
            if depth == 0 {
                return Ok(q);
            }
            q += 1;
        }
        let expected = match self.text(open) {
            "(" => ')',
            "[" => ']',
            _ => '}',
        };
        Err(TranslationError::Unclosed {
            expected,
            line: self.line(open),
        })
    }

    /// End (exclusive) of a statement beginning at `p`: through `;` or up to
    /// the next line once all brackets are closed.
    fn skip_statement(&self, p: usize) -> Result<usize, TranslationError> {
        let mut depth = 0usize;
        let mut q = p;
        while q < self.sig.len() {
            let text = self.text(q);
            if depth == 0 {
                if text == ";" {
                    return Ok(q + 1);
                }
                if q > p + 1 && self.newline_before(q) && !continues_type(self.text(q - 1)) {
                    return Ok(q);
                }
            }
            depth = adjust_depth(depth, self.token(q).kind, text);
            q += 1;
        }
        if depth > 0 {
            return Err(TranslationError::Unclosed {
                expected: '}',
                line: self.line(p),
            });
        }
        Ok(q)
    }

    /// End (exclusive) of the type expression starting at `p`.
    fn skip_type(&self, p: usize, context: TypeContext) -> usize {
        let mut depth = 0usize;
        let mut angle = 0usize;
        let mut last: Option<&str> = None;
        let mut q = p;
        while q < self.sig.len() {
            let token = self.token(q);
            let text = self.text(q);
            if let TokenKind::Template(TemplatePart::Middle) | TokenKind::Template(TemplatePart::Tail) =
                token.kind
            {
                break;
            }
            if depth == 0 && angle == 0 {
                if let Some(last) = last {
                    if self.newline_before(q)
                        && !continues_type(last)
                        && !text.starts_with('|')
                        && !text.starts_with('&')
                    {
                        break;
                    }
                }
                if token.kind == TokenKind::Punct {
                    let stop = match text {
                        "," | ")" | "]" | "}" | ";" | "=" => true,
                        "{" => last.map_or(false, |l| !continues_type(l)),
                        "=>" => last.map_or(false, |l| l != ")"),
                        _ if text.starts_with('>') && text.chars().all(|c| c == '>') => true,
                        "?" | ":" => context == TypeContext::Cast,
                        "|" | "&" | "." | "[" | "(" | "<" | "..." | "-" => false,
                        _ => context == TypeContext::Cast,
                    };
                    if stop {
                        break;
                    }
                }
            }
            if token.kind == TokenKind::Punct {
                if text.chars().all(|c| c == '<') {
                    angle += text.len();
                } else if text.chars().all(|c| c == '>') {
                    angle = angle.saturating_sub(text.len());
                } else {
                    match text {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => {
                            if depth == 0 {
                                break;
                            }
                            depth -= 1;
                        }
                        _ => {}
                    }
                }
            }
            last = Some(text);
            q += 1;
        }
        q
    }

    /// End (exclusive) of a `<...>` type argument list at `open`, if the
    /// tokens inside can only be types.
    fn generic_args_end(&self, open: usize) -> Option<usize> {
        let mut angle = 0usize;
        let mut depth = 0usize;
        let mut q = open;
        while q < self.sig.len() && q - open < 256 {
            let text = self.text(q);
            match self.token(q).kind {
                TokenKind::Ident | TokenKind::Number | TokenKind::Str => {}
                TokenKind::Punct if text.chars().all(|c| c == '<') => angle += text.len(),
                TokenKind::Punct if text.chars().all(|c| c == '>') => {
                    if text.len() > angle {
                        return None;
                    }
                    angle -= text.len();
                    if angle == 0 {
                        return if depth == 0 { Some(q + 1) } else { None };
                    }
                }
                TokenKind::Punct if matches!(text, "(" | "[" | "{") => depth += 1,
                TokenKind::Punct if matches!(text, ")" | "]" | "}") => {
                    depth = depth.checked_sub(1)?;
                }
                TokenKind::Punct
                    if matches!(text, "," | "." | "|" | "&" | ":" | "?" | "=>" | "=" | "...") => {}
                _ => return None,
            }
            q += 1;
        }
        None
    }
}

fn continues_type(text: &str) -> bool {
    matches!(
        text,
        "|" | "&" | "=>" | "," | ":" | "<" | "." | "?" | "(" | "[" | "{" | "=" | "keyof" | "typeof"
            | "extends" | "readonly" | "infer"
    )
}

fn integer_literal(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|&c| c != '_').collect();
    let radix = match digits.get(..2).map(str::to_ascii_lowercase).as_deref() {
        Some("0x") => 16,
        Some("0o") => 8,
        Some("0b") => 2,
        _ => return digits.parse().ok(),
    };
    i64::from_str_radix(&digits[2..], radix).ok()
}

fn adjust_angle(angle: usize, text: &str) -> usize {
    if !text.is_empty() && text.chars().all(|c| c == '<') {
        angle + text.len()
    } else if !text.is_empty() && text.chars().all(|c| c == '>') {
        angle.saturating_sub(text.len())
    } else {
        angle
    }
}

fn adjust_depth(depth: usize, kind: TokenKind, text: &str) -> usize {
    match kind {
        TokenKind::Template(TemplatePart::Head) => depth + 1,
        TokenKind::Template(TemplatePart::Tail) => depth.saturating_sub(1),
        TokenKind::Punct => match text {
            "(" | "[" | "{" => depth + 1,
            ")" | "]" | "}" => depth.saturating_sub(1),
            _ => depth,
        },
        _ => depth,
    }
}
