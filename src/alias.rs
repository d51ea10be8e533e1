use crate::command::{ExecutableCommand, ExitCode};
use crate::context::ExecContext;
use crate::error::Result;
use crate::script::AliasCommand;
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `$1`..`$9` pick one raw argument, `$*` all of them.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\*|[0-9])").expect("placeholder pattern is valid"));

/// An entry of the shell's alias table.
#[derive(Debug, Clone)]
pub enum Alias {
    /// A command line with argument placeholders.
    Macro(String),
    /// A compiled script chunk.
    Script(AliasCommand),
}

/// Fill the placeholders of `template` from `raw_args` (`raw_args[0]` is the alias name).
///
/// When the template has no placeholder the arguments are appended.
pub fn expand_macro(template: &str, raw_args: &[String]) -> String {
    let rest = raw_args.get(1..).unwrap_or_default();
    if !PLACEHOLDER.is_match(template) {
        return std::iter::once(template)
            .chain(rest.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
    }
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "*" => rest.join(" "),
            digit => digit
                .parse::<usize>()
                .ok()
                .and_then(|i| raw_args.get(i))
                .cloned()
                .unwrap_or_default(),
        })
        .into_owned()
}

/// One run of an alias, created by the shell when a command name matches.
pub(crate) struct AliasInvocation {
    name: String,
    alias: Alias,
}

impl AliasInvocation {
    pub fn new(name: String, alias: Alias) -> Self {
        Self { name, alias }
    }
}

impl ExecutableCommand for AliasInvocation {
    fn execute(self: Box<Self>, ctx: &mut ExecContext) -> Result<ExitCode> {
        let _hidden = ctx.shell().suppress_alias(&self.name);
        match self.alias {
            Alias::Macro(template) => {
                let line = expand_macro(&template, &ctx.raw_args);
                ctx.interpret(&line)
            }
            Alias::Script(command) => command.call(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_appends_arguments_without_placeholders() {
        assert_eq!(expand_macro("ls -l", &raw(&["ll", "/tmp", "'a b'"])), "ls -l /tmp 'a b'");
        assert_eq!(expand_macro("ls -l", &raw(&["ll"])), "ls -l");
    }

    #[test]
    fn test_fills_placeholders() {
        let args = raw(&["g", "one", "two"]);
        assert_eq!(expand_macro("echo $2 $1", &args), "echo two one");
        assert_eq!(expand_macro("echo [$*]", &args), "echo [one two]");
        assert_eq!(expand_macro("echo $0 $5.", &args), "echo g .");
    }
}
