//! Question primitives used by the guided builder.

use dialoguer::{Confirm, Input, MultiSelect, Password, Select};

use crate::error::InstallerError;

pub trait Prompt {
    /// Free text; `default` is returned when the answer is left blank.
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String, InstallerError>;
    /// Hidden input; may be empty. With `confirm` the secret is typed twice.
    fn password(&self, prompt: &str, confirm: bool) -> Result<String, InstallerError>;
    fn select(&self, prompt: &str, items: &[String], default: usize)
        -> Result<usize, InstallerError>;
    fn multi_select(
        &self,
        prompt: &str,
        items: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>, InstallerError>;
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, InstallerError>;
}

// ── Terminal ──────────────────────────────────────────────────────────────────

/// Arrow-key prompts on the controlling terminal.
pub struct Terminal;

impl Prompt for Terminal {
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String, InstallerError> {
        let mut input = Input::<String>::new().with_prompt(prompt).allow_empty(true);
        if let Some(d) = default {
            input = input.default(d.to_string());
        }
        Ok(input.interact_text()?.trim().to_string())
    }

    fn password(&self, prompt: &str, confirm: bool) -> Result<String, InstallerError> {
        let mut password = Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true);
        if confirm {
            password = password.with_confirmation("Repeat to confirm", "Secrets do not match.");
        }
        Ok(password.interact()?)
    }

    fn select(
        &self,
        prompt: &str,
        items: &[String],
        default: usize,
    ) -> Result<usize, InstallerError> {
        Ok(Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()?)
    }

    fn multi_select(
        &self,
        prompt: &str,
        items: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>, InstallerError> {
        Ok(MultiSelect::new()
            .with_prompt(prompt)
            .items(items)
            .defaults(defaults)
            .interact()?)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, InstallerError> {
        Ok(Confirm::new().with_prompt(prompt).default(default).interact()?)
    }
}

// ── Silent ────────────────────────────────────────────────────────────────────

/// Used with `--silent`: every question is an error, so a run either
/// completes from the pre-seeded configuration or names what is missing.
pub struct NonInteractive;

impl NonInteractive {
    fn missing<T>(prompt: &str) -> Result<T, InstallerError> {
        Err(InstallerError::MissingAnswer(prompt.to_string()))
    }
}

impl Prompt for NonInteractive {
    fn input(&self, prompt: &str, _default: Option<&str>) -> Result<String, InstallerError> {
        Self::missing(prompt)
    }

    fn password(&self, prompt: &str, _confirm: bool) -> Result<String, InstallerError> {
        Self::missing(prompt)
    }

    fn select(&self, prompt: &str, _: &[String], _: usize) -> Result<usize, InstallerError> {
        Self::missing(prompt)
    }

    fn multi_select(
        &self,
        prompt: &str,
        _: &[String],
        _: &[bool],
    ) -> Result<Vec<usize>, InstallerError> {
        Self::missing(prompt)
    }

    fn confirm(&self, prompt: &str, _default: bool) -> Result<bool, InstallerError> {
        Self::missing(prompt)
    }
}
