//! Command safety policy for verifier shell commands.
//!
//! The policy is an ordered list of independent rules. Each rule either
//! passes or returns a deny reason; the first deny wins and the default is
//! allow. Built-in order:
//!
//! 1. file removal primitives (`rm`, `rmdir`, `unlink`)
//! 2. `git clean`
//! 3. `git` subcommands outside the read-only allow-list, checked in every
//!    simple command: separators, background `&`, subshells, command
//!    substitution and `env`/`VAR=value` prefixes do not hide a call
//! 4. removal or move of a configured protected path
//! 5. configured denied commands, then any rules added with
//!    [`CommandPolicy::with_rule`]

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::types::CommandDecision;

/// Git subcommands the verifier may run.
pub const READONLY_GIT: [&str; 4] = ["status", "diff", "log", "show"];

static REMOVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(rm|rmdir|unlink)\b").expect("removal regex is valid"));
static GIT_CLEAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bgit\s+clean\b").expect("git clean regex is valid"));
static SEGMENT_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&&|\|\||;|\||&|\n|\$\(|\(|\)|`").expect("segment regex is valid")
});
static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=").expect("assignment regex is valid")
});

/// User-tunable inputs to the built-in rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Paths the verifier must not delete or move.
    pub protected_paths: Vec<String>,
    /// Extra command names denied outright (e.g. `curl`).
    pub denied_commands: Vec<String>,
}

type RuleFn = dyn Fn(&str) -> Option<String> + Send + Sync;

/// One named rule in the chain.
pub struct Rule {
    name: &'static str,
    check: Box<RuleFn>,
}

impl Rule {
    pub fn new<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name,
            check: Box::new(check),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

/// Ordered rule chain evaluated against a single shell command string.
#[derive(Debug)]
pub struct CommandPolicy {
    rules: Vec<Rule>,
}

impl CommandPolicy {
    /// Build the built-in chain for the given configuration.
    pub fn new(config: &PolicyConfig) -> Result<Self> {
        let mut rules = vec![
            Rule::new("removal", deny_removal),
            Rule::new("git-clean", deny_git_clean),
            Rule::new("git-subcommand", deny_mutating_git),
        ];

        let protected = compile_protected(&config.protected_paths)?;
        if !protected.is_empty() {
            rules.push(Rule::new("protected-paths", move |cmd| {
                deny_protected(&protected, cmd)
            }));
        }

        let denied = compile_denied(&config.denied_commands)?;
        if !denied.is_empty() {
            rules.push(Rule::new("denied-commands", move |cmd| {
                deny_listed(&denied, cmd)
            }));
        }

        Ok(Self { rules })
    }

    /// Append a rule after every existing rule.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(Rule::name).collect()
    }

    /// Evaluate `command`; the first rule that denies decides.
    pub fn evaluate(&self, command: &str) -> CommandDecision {
        for rule in &self.rules {
            if let Some(reason) = (rule.check)(command) {
                tracing::debug!(rule = rule.name, command, "command denied");
                return CommandDecision::deny(reason);
            }
        }
        CommandDecision::Allow
    }
}

fn deny_removal(cmd: &str) -> Option<String> {
    let caps = REMOVAL_RE.captures(cmd)?;
    let primitive = caps.get(1).map_or("rm", |m| m.as_str());
    Some(format!(
        "Blocked `{primitive}` in `{}`: rm/rmdir/unlink commands are not allowed in verifier mode.",
        cmd.trim()
    ))
}

fn deny_git_clean(cmd: &str) -> Option<String> {
    GIT_CLEAN_RE.is_match(cmd).then(|| {
        format!(
            "Blocked `git clean` in `{}`: it deletes untracked files and is not allowed in verifier mode.",
            cmd.trim()
        )
    })
}

/// Subcommand of a segment that invokes git (`""` for bare `git`).
fn git_subcommand(segment: &str) -> Option<&str> {
    let mut words = segment
        .split_whitespace()
        .skip_while(|word| *word == "env" || ASSIGNMENT_RE.is_match(word));
    (words.next()? == "git").then(|| words.next().unwrap_or(""))
}

fn deny_mutating_git(cmd: &str) -> Option<String> {
    SEGMENT_SPLIT_RE
        .split(cmd)
        .filter_map(git_subcommand)
        .find_map(|sub| {
            if READONLY_GIT.contains(&sub) {
                return None;
            }
            let shown = if sub.is_empty() { "(unknown)" } else { sub };
            Some(format!(
                "Blocked git command: git {shown}. Only git status/diff/log/show are allowed in verifier mode."
            ))
        })
}

struct ProtectedPath {
    path: String,
    before: Regex,
    after: Regex,
}

fn compile_protected(paths: &[String]) -> Result<Vec<ProtectedPath>> {
    paths
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|path| {
            let escaped = regex::escape(path);
            let before = Regex::new(&format!(r"(?s)\b(rm|rmdir|unlink|mv)\b.*{escaped}"))
                .with_context(|| format!("compile protected path rule for {path}"))?;
            let after = Regex::new(&format!(r"(?s){escaped}.*\b(rm|rmdir|unlink|mv)\b"))
                .with_context(|| format!("compile protected path rule for {path}"))?;
            Ok(ProtectedPath {
                path: path.to_string(),
                before,
                after,
            })
        })
        .collect()
}

fn deny_protected(protected: &[ProtectedPath], cmd: &str) -> Option<String> {
    protected.iter().find_map(|entry| {
        let caps = entry
            .before
            .captures(cmd)
            .or_else(|| entry.after.captures(cmd))?;
        let primitive = caps.get(1).map_or("rm", |m| m.as_str());
        let verb = if primitive == "mv" { "move" } else { "delete" };
        Some(format!(
            "Blocked: cannot {verb} {}/ (protected data) with `{primitive}`. This path must remain unchanged.",
            entry.path.trim_end_matches('/')
        ))
    })
}

fn compile_denied(commands: &[String]) -> Result<Vec<(String, Regex)>> {
    commands
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|name| {
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(name)))
                .with_context(|| format!("compile denied command rule for {name}"))?;
            Ok((name.to_string(), re))
        })
        .collect()
}

fn deny_listed(denied: &[(String, Regex)], cmd: &str) -> Option<String> {
    denied.iter().find(|(_, re)| re.is_match(cmd)).map(|(name, _)| {
        format!(
            "Blocked `{name}` in `{}`: this command is denied in verifier mode.",
            cmd.trim()
        )
    })
}
