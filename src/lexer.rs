//! A module implementing lexical analysis (tokenization) for the shell's command language.

use thiserror::Error;

/// A part of a word, which can be either literal text, a command substitution, or a parameter substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPart {
    /// Literal text that requires no further processing.
    Literal(String),
    /// Command substitution in the format `$(...)`. Contains the text inside the parentheses.
    CmdSubst(String),
    /// Parameter substitution in the format `$NAME` or `${NAME}`. Contains the name.
    ParamSubst(String),
}

/// A word as the lexer saw it: its parts, plus the source text it came from
/// (quotes included), which aliases and scripts see as the raw argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub parts: Vec<WordPart>,
    pub raw: String,
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(Word),
    /// The pipe operator, `|`.
    PipeOp,
    /// The statement separator, `;`.
    Semicolon,
    /// Input redirection symbol, `<`.
    RedirectLeft,
    /// Output redirection symbol, `>`.
    RedirectRight,
    /// Appending output redirection, `>>`.
    RedirectAppend,
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexingError {
    #[error("unterminated quote")]
    UnfinishedQuote,
    #[error("unterminated $(...)")]
    UnfinishedCmdSubst,
    #[error("unterminated ${{...}}")]
    UnfinishedParamSubst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    current_word: Vec<WordPart>,
    buffer: String,
    word_start: usize,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            current_word: Vec::new(),
            buffer: String::new(),
            word_start: 0,
        }
    }

    fn make_tokens(&mut self) -> Result<Vec<Token>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out)?,
                LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote => {
                return Err(LexingError::UnfinishedQuote);
            }
            LexingState::ReadingWord => self.finish_word(self.input.len(), &mut out),
            LexingState::Start => {}
        }

        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexingError> {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {}
            '|' => out.push(Token::PipeOp),
            ';' => out.push(Token::Semicolon),
            '<' => out.push(Token::RedirectLeft),
            '>' => {
                if self.peek_char() == Some('>') {
                    self.read_char();
                    out.push(Token::RedirectAppend);
                } else {
                    out.push(Token::RedirectRight);
                }
            }
            c => {
                self.word_start = self.pos - 1;
                self.state = LexingState::ReadingWord;
                self.handle_word(c, out)?;
            }
        }
        Ok(())
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexingError> {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                self.finish_word(self.pos - 1, out);
                self.state = LexingState::Start;
            }
            '|' | ';' | '<' | '>' => {
                self.finish_word(self.pos - 1, out);
                self.state = LexingState::Start;
                self.handle_start(ch, out)?;
            }
            '\'' => self.state = LexingState::ReadingSingleQuote,
            '"' => self.state = LexingState::ReadingDoubleQuote,
            '\\' => {
                if let Some(next) = self.read_char() {
                    self.buffer.push(next);
                }
            }
            '$' => self.handle_dollar()?,
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => {
                // Keep `''` as an (empty) argument.
                self.current_word
                    .push(WordPart::Literal(std::mem::take(&mut self.buffer)));
                self.state = LexingState::ReadingWord;
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            '"' => {
                self.current_word
                    .push(WordPart::Literal(std::mem::take(&mut self.buffer)));
                self.state = LexingState::ReadingWord;
            }
            '\\' if matches!(self.peek_char(), Some('"' | '\\' | '$')) => {
                if let Some(next) = self.read_char() {
                    self.buffer.push(next);
                }
            }
            '$' => self.handle_dollar()?,
            c => self.buffer.push(c),
        }
        Ok(())
    }

    /// Called right after a `$` has been read.
    fn handle_dollar(&mut self) -> Result<(), LexingError> {
        match self.peek_char() {
            Some('(') => {
                self.read_char();
                self.flush_literal();
                let nested = self.collect_nested('(', ')', LexingError::UnfinishedCmdSubst)?;
                self.current_word.push(WordPart::CmdSubst(nested));
            }
            Some('{') => {
                self.read_char();
                self.flush_literal();
                let nested = self.collect_nested('{', '}', LexingError::UnfinishedParamSubst)?;
                self.current_word.push(WordPart::ParamSubst(nested));
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                self.flush_literal();
                let mut name = String::new();
                while let Some(c) = self.peek_char() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        self.read_char();
                    } else {
                        break;
                    }
                }
                self.current_word.push(WordPart::ParamSubst(name));
            }
            _ => self.buffer.push('$'),
        }
        Ok(())
    }

    /// Collects characters up to the bracket closing an already-consumed `open`,
    /// tracking nesting depth.
    fn collect_nested(
        &mut self,
        open: char,
        close: char,
        unfinished: LexingError,
    ) -> Result<String, LexingError> {
        let mut depth = 1usize;
        let mut s = String::new();
        while let Some(ch) = self.read_char() {
            if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(s);
                }
            }
            s.push(ch);
        }
        Err(unfinished)
    }

    fn flush_literal(&mut self) {
        if !self.buffer.is_empty() {
            self.current_word
                .push(WordPart::Literal(std::mem::take(&mut self.buffer)));
        }
    }

    fn finish_word(&mut self, end: usize, out: &mut Vec<Token>) {
        self.flush_literal();
        if !self.current_word.is_empty() {
            let raw = self.input[self.word_start..end].iter().collect();
            out.push(Token::Word(Word {
                parts: std::mem::take(&mut self.current_word),
                raw,
            }));
        }
    }
}

/// The main entry point function to perform lexical analysis.
///
/// Creates and runs the finite state machine to tokenize the input line.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    LexingFSM::new(line).make_tokens()
}
