//! Cookbook validators selected by name: `ruby` and `foodcritic`.

use std::path::PathBuf;
use std::process::Command;

use chefsync_core::{
    ports::{LintOptions, ValidationOutcome, Validator},
    ConfigError, ValidatorError,
};

use crate::knife::{cookbook_search_path, existing_cookbook_dirs, Knife};

/// Names accepted in the `tests` setting.
pub const KNOWN_VALIDATORS: &[&str] = &["ruby", "foodcritic"];

/// Build the validators named in configuration, in the given order.
pub fn validators_by_name(
    names: &[String],
    knife: &Knife,
) -> Result<Vec<Box<dyn Validator>>, ConfigError> {
    names
        .iter()
        .map(|name| -> Result<Box<dyn Validator>, ConfigError> {
            match name.as_str() {
                "ruby" => Ok(Box::new(KnifeCookbookTest::new(knife.clone()))),
                "foodcritic" => Ok(Box::new(Foodcritic::new())),
                other => Err(ConfigError::Invalid(format!(
                    "unknown test '{other}'; expected one of: {}",
                    KNOWN_VALIDATORS.join(", ")
                ))),
            }
        })
        .collect()
}

fn run(program: &str, mut cmd: Command) -> Result<ValidationOutcome, ValidatorError> {
    let output = cmd.output().map_err(|source| ValidatorError::Io {
        program: program.to_string(),
        source,
    })?;
    let mut summary = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !summary.is_empty() {
            summary.push('\n');
        }
        summary.push_str(stderr.trim());
    }
    Ok(ValidationOutcome {
        passed: output.status.success(),
        summary,
    })
}

// ---------------------------------------------------------------------------
// knife cookbook test
// ---------------------------------------------------------------------------

/// Ruby syntax and template checks via `knife cookbook test`.
pub struct KnifeCookbookTest {
    knife: Knife,
}

impl KnifeCookbookTest {
    pub fn new(knife: Knife) -> Self {
        Self { knife }
    }

    pub fn args(cookbooks: &[String], search_path: &[PathBuf]) -> Vec<String> {
        let mut args = vec!["cookbook".to_string(), "test".to_string()];
        if !search_path.is_empty() {
            args.push("-o".to_string());
            args.push(cookbook_search_path(search_path));
        }
        args.extend(cookbooks.iter().cloned());
        args
    }
}

impl Validator for KnifeCookbookTest {
    fn name(&self) -> &str {
        "ruby"
    }

    fn check(
        &self,
        cookbooks: &[String],
        search_path: &[PathBuf],
        _options: &LintOptions,
    ) -> Result<ValidationOutcome, ValidatorError> {
        let args = Self::args(cookbooks, search_path);
        run(self.knife.program(), self.knife.command(args.as_slice()))
    }
}

// ---------------------------------------------------------------------------
// foodcritic
// ---------------------------------------------------------------------------

/// Style and correctness lint via `foodcritic`. Exits non-zero when a
/// `fail_tags` rule matches.
pub struct Foodcritic {
    program: String,
}

impl Foodcritic {
    pub fn new() -> Self {
        Self {
            program: "foodcritic".to_string(),
        }
    }

    /// foodcritic wants cookbook directories, so names are resolved against
    /// every search root and missing ones dropped.
    pub fn args(cookbooks: &[String], search_path: &[PathBuf], options: &LintOptions) -> Vec<String> {
        let mut args = Vec::new();
        for tag in &options.fail_tags {
            args.push("-f".to_string());
            args.push(tag.clone());
        }
        for tag in &options.tags {
            args.push("-t".to_string());
            args.push(tag.clone());
        }
        for rules in &options.include_rules {
            args.push("-I".to_string());
            args.push(rules.display().to_string());
        }
        args.extend(
            existing_cookbook_dirs(search_path, cookbooks)
                .iter()
                .map(|d| d.display().to_string()),
        );
        args
    }
}

impl Default for Foodcritic {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for Foodcritic {
    fn name(&self) -> &str {
        "foodcritic"
    }

    fn check(
        &self,
        cookbooks: &[String],
        search_path: &[PathBuf],
        options: &LintOptions,
    ) -> Result<ValidationOutcome, ValidatorError> {
        let args = Self::args(cookbooks, search_path, options);
        tracing::info!("foodcritic options: {}", args.join(" "));
        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        run(&self.program, cmd)
    }
}
