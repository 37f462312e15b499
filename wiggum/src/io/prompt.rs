//! Builder and verifier prompts.
//!
//! The built-in templates ship inside the binary; a harness can point
//! `builder_template` / `verifier_template` at its own files instead. The
//! latest verifier report is appended to the builder prompt verbatim.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::signals::{BUILDER_DONE, REPORT_CLOSE, REPORT_OPEN, VERIFIER_DONE};
use crate::io::config::Settings;

const BUILDER_TEMPLATE: &str = include_str!("prompts/builder.md");
const VERIFIER_TEMPLATE: &str = include_str!("prompts/verifier.md");

pub const SANITY_FILE: &str = "/tmp/wiggum-sanity-test.txt";
pub const SANITY_CONTENT: &str = "wiggum-ok";

/// Source of the prompts handed to each session.
pub trait PromptSource {
    /// Builder prompt, carrying the previous verifier report when there is one.
    fn builder_prompt(&self, report: Option<&str>) -> Result<String>;

    fn verifier_prompt(&self) -> Result<String>;
}

/// Prompts rendered from minijinja templates.
#[derive(Debug, Clone)]
pub struct TemplatePrompts {
    builder: String,
    verifier: String,
    plan_file: String,
    max_loops: u32,
}

impl TemplatePrompts {
    /// Build from template sources, rejecting ones that do not parse.
    pub fn new(
        builder: String,
        verifier: String,
        plan_file: impl Into<String>,
        max_loops: u32,
    ) -> Result<Self> {
        check_template(&builder).context("parse builder prompt template")?;
        check_template(&verifier).context("parse verifier prompt template")?;
        Ok(Self {
            builder,
            verifier,
            plan_file: plan_file.into(),
            max_loops,
        })
    }

    /// Built-in templates, or the configured replacement files.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let builder = match &settings.builder_template {
            Some(path) => read_template(path)?,
            None => BUILDER_TEMPLATE.to_string(),
        };
        let verifier = match &settings.verifier_template {
            Some(path) => read_template(path)?,
            None => VERIFIER_TEMPLATE.to_string(),
        };
        let plan_file = settings.plan_file();
        let shown = plan_file
            .strip_prefix(&settings.repo_root)
            .unwrap_or(&plan_file);
        Self::new(
            builder,
            verifier,
            shown.display().to_string(),
            settings.max_loops,
        )
    }
}

fn check_template(source: &str) -> Result<(), minijinja::Error> {
    let env = Environment::new();
    env.template_from_str(source)?;
    Ok(())
}

fn read_template(path: &Path) -> Result<String> {
    debug!(path = %path.display(), "loading prompt template");
    fs::read_to_string(path).with_context(|| format!("read prompt template {}", path.display()))
}

impl PromptSource for TemplatePrompts {
    fn builder_prompt(&self, report: Option<&str>) -> Result<String> {
        let rendered = Environment::new()
            .render_str(
                &self.builder,
                context! {
                    plan_file => self.plan_file.as_str(),
                    max_loops => self.max_loops,
                    builder_marker => BUILDER_DONE,
                    report => report.filter(|r| !r.trim().is_empty()),
                },
            )
            .context("render builder prompt")?;
        Ok(rendered.trim().to_string())
    }

    fn verifier_prompt(&self) -> Result<String> {
        let rendered = Environment::new()
            .render_str(
                &self.verifier,
                context! {
                    plan_file => self.plan_file.as_str(),
                    verifier_marker => VERIFIER_DONE,
                    report_open => REPORT_OPEN,
                    report_close => REPORT_CLOSE,
                },
            )
            .context("render verifier prompt")?;
        Ok(rendered.trim().to_string())
    }
}

/// Fixed prompts for `--sanity-check`: write one file, then confirm it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SanityPrompts;

impl PromptSource for SanityPrompts {
    fn builder_prompt(&self, _report: Option<&str>) -> Result<String> {
        Ok(format!(
            "Create the file {SANITY_FILE} containing exactly the text \"{SANITY_CONTENT}\" \
             (no trailing newline). Then print exactly, on its own line:\n{BUILDER_DONE}"
        ))
    }

    fn verifier_prompt(&self) -> Result<String> {
        Ok(format!(
            "Check that the file {SANITY_FILE} exists and contains exactly \"{SANITY_CONTENT}\". \
             If it does, print exactly, on its own line:\n{VERIFIER_DONE}\n\
             Otherwise explain what is wrong inside {REPORT_OPEN}...{REPORT_CLOSE}."
        ))
    }
}
