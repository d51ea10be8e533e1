use crate::lexer::{Token, Word, WordPart};
use thiserror::Error;

/// AST node for the shell
///
/// Represents a single element in the Abstract Syntax Tree (AST) constructed
/// from the parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
    /// Statements separated by `;`, run one after another.
    Sequence(Vec<AstNode>),

    /// A **pipeline** of commands connected by the pipe operator (`|`).
    /// The inner `Vec<AstNode>` contains the individual commands in execution order.
    Pipeline(Vec<AstNode>),

    /// A **simple command** unit, which includes the command name and its arguments,
    /// variable assignments preceding the command, and I/O redirections.
    Command {
        /// The words forming the command name and its arguments (`argv[0]`, `argv[1]`, etc.).
        argv: Vec<Word>,
        /// Leading `NAME=value` words.
        assignments: Vec<AstNode>,
        /// I/O redirections, in the order they were written.
        redirects: Vec<AstNode>,
    },

    /// A **variable assignment** in the form `name=value`.
    Assignment { name: String, value: Word },

    /// An **I/O redirection** specification (`<`, `>`, `>>`).
    Redirect { kind: RedirectKind, target: Word },
}

/// Kind of redirection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Input redirection (`<`): Reads standard input from a specified file.
    Input,
    /// Output redirection (`>`): Writes standard output to a file, **overwriting** the file if it exists.
    Output,
    /// Output redirection with append (`>>`): Writes standard output to a file, **appending** to the file if it exists.
    Append,
}

/// Errors that can occur during the AST construction (parsing) phase.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsingError {
    /// Encountered a token that was not expected at the current position according to the grammar.
    #[error("unexpected token {0:?}")]
    UnexpectedToken(Token),
    /// Reached the end of the token stream prematurely.
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// A pipeline stage contained nothing (e.g., `| cmd` or `cmd |`).
    #[error("empty command in pipeline")]
    EmptyPipeline,
}

struct AstBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl AstBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        AstBuilder { tokens, pos: 0 }
    }

    fn build_ast(mut self) -> Result<AstNode, ParsingError> {
        let mut statements = Vec::new();

        while self.peek().is_some() {
            if let Some(Token::Semicolon) = self.peek() {
                self.consume();
                continue;
            }
            statements.push(self.parse_pipeline()?);
            match self.consume() {
                Some(Token::Semicolon) | None => {}
                Some(token) => return Err(ParsingError::UnexpectedToken(token)),
            }
        }

        Ok(AstNode::Sequence(statements))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse a pipeline: command ('|' command)*
    fn parse_pipeline(&mut self) -> Result<AstNode, ParsingError> {
        let mut commands = vec![self.parse_command()?];

        while let Some(Token::PipeOp) = self.peek() {
            self.consume();
            commands.push(self.parse_command()?);
        }

        if commands.len() == 1 {
            Ok(commands.remove(0))
        } else {
            Ok(AstNode::Pipeline(commands))
        }
    }

    /// Parse a command: (assignment* word* redirect*)
    fn parse_command(&mut self) -> Result<AstNode, ParsingError> {
        let mut assignments = Vec::new();
        let mut argv = Vec::new();
        let mut redirects = Vec::new();

        while let Some(token) = self.peek() {
            match token {
                Token::PipeOp | Token::Semicolon => break,
                Token::Word(word) => {
                    let word = word.clone();
                    self.consume();
                    match split_assignment(&word) {
                        Some(assignment) if argv.is_empty() => assignments.push(assignment),
                        _ => argv.push(word),
                    }
                }
                Token::RedirectLeft | Token::RedirectRight | Token::RedirectAppend => {
                    redirects.push(self.parse_redirect()?);
                }
            }
        }

        // A command must have at least something (argv, assignment, or redirect)
        if assignments.is_empty() && argv.is_empty() && redirects.is_empty() {
            return match self.peek() {
                Some(token) => Err(ParsingError::UnexpectedToken(token.clone())),
                None if self.pos == 0 => Err(ParsingError::UnexpectedEnd),
                None => Err(ParsingError::EmptyPipeline),
            };
        }

        Ok(AstNode::Command {
            argv,
            assignments,
            redirects,
        })
    }

    /// Parse a redirect: ('<' | '>' | '>>') word
    fn parse_redirect(&mut self) -> Result<AstNode, ParsingError> {
        let kind = match self.consume() {
            Some(Token::RedirectLeft) => RedirectKind::Input,
            Some(Token::RedirectRight) => RedirectKind::Output,
            Some(Token::RedirectAppend) => RedirectKind::Append,
            Some(token) => return Err(ParsingError::UnexpectedToken(token)),
            None => return Err(ParsingError::UnexpectedEnd),
        };

        match self.consume() {
            Some(Token::Word(target)) => Ok(AstNode::Redirect { kind, target }),
            Some(token) => Err(ParsingError::UnexpectedToken(token)),
            None => Err(ParsingError::UnexpectedEnd),
        }
    }
}

/// Recognize `NAME=value`: the first part must be an unquoted literal whose
/// text before `=` is a valid variable name.
fn split_assignment(word: &Word) -> Option<AstNode> {
    let WordPart::Literal(first) = word.parts.first()? else {
        return None;
    };
    let (name, rest) = first.split_once('=')?;
    // Quoted names do not count: the raw text must start with the name.
    if !word.raw.starts_with(&format!("{name}=")) || !is_valid_name(name) {
        return None;
    }

    let mut parts = Vec::with_capacity(word.parts.len());
    if !rest.is_empty() {
        parts.push(WordPart::Literal(rest.to_string()));
    }
    parts.extend(word.parts[1..].iter().cloned());
    if parts.is_empty() {
        parts.push(WordPart::Literal(String::new()));
    }

    Some(AstNode::Assignment {
        name: name.to_string(),
        value: Word {
            parts,
            raw: word.raw[name.len() + 1..].to_string(),
        },
    })
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Builds the AST for a whole command line from its tokens.
pub fn construct_ast(tokens: Vec<Token>) -> Result<AstNode, ParsingError> {
    AstBuilder::from(tokens).build_ast()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::split_into_tokens;

    fn parse(line: &str) -> AstNode {
        construct_ast(split_into_tokens(line).unwrap()).unwrap()
    }

    fn statements(node: AstNode) -> Vec<AstNode> {
        match node {
            AstNode::Sequence(s) => s,
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_command() {
        let stmts = statements(parse("echo a b"));
        assert_eq!(stmts.len(), 1);
        let AstNode::Command { argv, assignments, redirects } = &stmts[0] else {
            panic!("expected command");
        };
        assert_eq!(argv.len(), 3);
        assert!(assignments.is_empty());
        assert!(redirects.is_empty());
    }

    #[test]
    fn test_sequence_and_pipeline() {
        let stmts = statements(parse("echo a | wc -c; pwd;"));
        assert_eq!(stmts.len(), 2);
        assert!(matches!(&stmts[0], AstNode::Pipeline(cmds) if cmds.len() == 2));
        assert!(matches!(&stmts[1], AstNode::Command { .. }));
    }

    #[test]
    fn test_assignments_only_lead() {
        let stmts = statements(parse("A=1 B= echo C=3"));
        let AstNode::Command { argv, assignments, .. } = &stmts[0] else {
            panic!("expected command");
        };
        assert_eq!(assignments.len(), 2);
        assert!(matches!(&assignments[0], AstNode::Assignment { name, value }
            if name == "A" && value.parts == vec![WordPart::Literal("1".into())]));
        assert!(matches!(&assignments[1], AstNode::Assignment { name, value }
            if name == "B" && value.parts == vec![WordPart::Literal(String::new())]));
        assert_eq!(argv.len(), 2);
        assert_eq!(argv[1].raw, "C=3");
    }

    #[test]
    fn test_quoted_name_is_not_assignment() {
        let stmts = statements(parse("'A=1'"));
        let AstNode::Command { argv, assignments, .. } = &stmts[0] else {
            panic!("expected command");
        };
        assert!(assignments.is_empty());
        assert_eq!(argv.len(), 1);
    }

    #[test]
    fn test_redirects() {
        let stmts = statements(parse("cat < in > out >> log"));
        let AstNode::Command { redirects, .. } = &stmts[0] else {
            panic!("expected command");
        };
        let kinds: Vec<RedirectKind> = redirects
            .iter()
            .map(|r| match r {
                AstNode::Redirect { kind, .. } => *kind,
                _ => panic!("expected redirect"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![RedirectKind::Input, RedirectKind::Output, RedirectKind::Append]
        );
    }

    #[test]
    fn test_empty_line_is_empty_sequence() {
        assert_eq!(parse("   "), AstNode::Sequence(Vec::new()));
    }

    #[test]
    fn test_parse_errors() {
        let tokens = split_into_tokens("| wc").unwrap();
        assert!(matches!(
            construct_ast(tokens),
            Err(ParsingError::UnexpectedToken(Token::PipeOp))
        ));
        let tokens = split_into_tokens("echo |").unwrap();
        assert_eq!(construct_ast(tokens), Err(ParsingError::EmptyPipeline));
        let tokens = split_into_tokens("cat >").unwrap();
        assert_eq!(construct_ast(tokens), Err(ParsingError::UnexpectedEnd));
    }
}
