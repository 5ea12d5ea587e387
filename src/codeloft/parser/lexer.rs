//! Tokenizer for free-text AI responses.
//!
//! The response is split into prose tokens and fenced code blocks. Fences are
//! recognized anywhere, including mid-line (`containing ```js`), so the token
//! stream keeps code and prose strictly apart.
//!
//! ```text
//! token := CodeBlock | Quoted | Word | Colon | Break
//! CodeBlock := "```" info "\n" body "```"      (unterminated: body runs to EOF)
//! Quoted := '"' .. '"' | "'" .. "'" | '`' .. '`' | smart quotes   (single line)
//! Break := newline or sentence-ending punctuation
//! ```

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Quoted(String),
    CodeBlock {
        /// First word of the fence info string (`js` in ```` ```js ````).
        language: Option<String>,
        /// Remainder of the info string, e.g. `src/App.tsx` in ```` ```tsx src/App.tsx ````.
        label: Option<String>,
        content: String,
    },
    Colon,
    Break,
}

impl Token {
    /// Word or quoted text, if this is a prose token.
    pub fn text(&self) -> Option<&str> {
        match self {
            Token::Word(s) | Token::Quoted(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_keyword(&self, words: &[&str]) -> bool {
        match self {
            Token::Word(w) => words.iter().any(|k| w.eq_ignore_ascii_case(k)),
            _ => false,
        }
    }
}

pub fn tokenize(input: &str) -> Vec<Token> {
    Lexer::new(input).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.chars.len() {
            if self.at_fence(self.pos) {
                self.read_code_block();
                continue;
            }
            let ch = self.chars[self.pos];
            match ch {
                '\n' => {
                    self.push_break();
                    self.pos += 1;
                }
                c if c.is_whitespace() => self.pos += 1,
                ':' => {
                    self.tokens.push(Token::Colon);
                    self.pos += 1;
                }
                '"' | '\'' | '`' | '\u{201c}' | '\u{2018}' => {
                    if !self.read_quoted(ch) {
                        self.read_word();
                    }
                }
                _ => self.read_word(),
            }
        }
        if self.tokens.last() == Some(&Token::Break) {
            self.tokens.pop();
        }
        self.tokens
    }

    fn at_fence(&self, at: usize) -> bool {
        at + 3 <= self.chars.len() && self.chars[at..at + 3].iter().all(|c| *c == '`')
    }

    fn push_break(&mut self) {
        if matches!(self.tokens.last(), Some(t) if *t != Token::Break) {
            self.tokens.push(Token::Break);
        }
    }

    fn skip_backticks(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] == '`' {
            self.pos += 1;
        }
    }

    fn read_code_block(&mut self) {
        self.skip_backticks();

        let mut info = String::new();
        while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
            if self.at_fence(self.pos) {
                // Single-line fence: ```code```
                self.skip_backticks();
                self.tokens.push(Token::CodeBlock {
                    language: None,
                    label: None,
                    content: info.trim().to_string(),
                });
                return;
            }
            info.push(self.chars[self.pos]);
            self.pos += 1;
        }
        // Step over the newline ending the info string.
        self.pos = (self.pos + 1).min(self.chars.len());

        let start = self.pos;
        let mut end = self.chars.len();
        let mut scan = start;
        while scan < self.chars.len() {
            if self.at_fence(scan) {
                end = scan;
                break;
            }
            scan += 1;
        }

        let body: String = self.chars[start..end].iter().collect();
        self.pos = end;
        self.skip_backticks();

        let (language, label) = split_info(&info);
        self.tokens.push(Token::CodeBlock {
            language,
            label,
            content: body.trim_end_matches(['\n', '\r']).to_string(),
        });
    }

    /// Quoted text closed on the same line. Returns false if the quote never closes.
    fn read_quoted(&mut self, open: char) -> bool {
        let close = match open {
            '\u{201c}' => '\u{201d}',
            '\u{2018}' => '\u{2019}',
            other => other,
        };
        let mut scan = self.pos + 1;
        while scan < self.chars.len() && self.chars[scan] != '\n' {
            if self.chars[scan] == close {
                let text: String = self.chars[self.pos + 1..scan].iter().collect();
                self.tokens.push(Token::Quoted(text));
                self.pos = scan + 1;
                return true;
            }
            scan += 1;
        }
        false
    }

    fn read_word(&mut self) {
        let mut raw = String::new();
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if c.is_whitespace() || self.at_fence(self.pos) {
                break;
            }
            raw.push(c);
            self.pos += 1;
        }

        let mut word = raw.as_str();
        let mut colon = false;
        let mut sentence_end = false;
        while let Some(last) = word.chars().last() {
            match last {
                ':' => colon = true,
                '.' | '!' | '?' => sentence_end = true,
                ',' | ';' | ')' | ']' | '*' | '`' | '"' | '\'' => {}
                _ => break,
            }
            word = &word[..word.len() - last.len_utf8()];
        }
        let word = word.trim_start_matches(['(', '[', '*', '`', '"', '\'']);

        if !word.is_empty() {
            self.tokens.push(Token::Word(word.to_string()));
        }
        if colon {
            self.tokens.push(Token::Colon);
        } else if sentence_end {
            self.push_break();
        }
    }
}

fn split_info(info: &str) -> (Option<String>, Option<String>) {
    let info = info.trim();
    if info.is_empty() {
        return (None, None);
    }
    let (lang, rest) = match info.split_once(|c: char| c.is_whitespace() || c == ':') {
        Some((lang, rest)) => (lang, rest.trim()),
        None => (info, ""),
    };
    let label = (!rest.is_empty()).then(|| rest.to_string());
    let language = (!lang.is_empty()).then(|| lang.to_lowercase());
    (language, label)
}
