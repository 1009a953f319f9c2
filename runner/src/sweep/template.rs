use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// argument replaced by the model's own argument list
pub const MODEL_ARGS: &str = "{args}";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),
    #[error("Unclosed placeholder in '{0}'")]
    Unclosed(String),
}

/// Arguments passed to the benchmark, `{name}` is substituted per grid point.
/// An argument that is exactly `{args}` expands to the model's arguments.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct CommandTemplate(pub Vec<String>);

impl Default for CommandTemplate {
    fn default() -> Self {
        Self::new([
            "-e", "{exetime}", "-c", "{events}", "-t", "{threads}", "-n", "{kind}", "-g", "{param}",
        ])
    }
}

impl CommandTemplate {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    /// every placeholder name used, `{args}` excluded
    pub fn placeholders(&self) -> Result<BTreeSet<&str>, TemplateError> {
        let mut names = BTreeSet::new();

        for arg in self.0.iter().filter(|arg| *arg != MODEL_ARGS) {
            substitute(arg, |name| {
                names.insert(name);
                Some(String::new())
            })?;
        }

        Ok(names)
    }

    pub fn render<F>(&self, mut lookup: F, model_args: &[String]) -> Result<Vec<String>, TemplateError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut rendered = Vec::with_capacity(self.0.len() + model_args.len());

        for arg in self.0.iter() {
            if arg == MODEL_ARGS {
                rendered.extend(model_args.iter().cloned());
            } else {
                rendered.push(substitute(arg, &mut lookup)?);
            }
        }

        Ok(rendered)
    }
}

fn substitute<'a, F>(arg: &'a str, mut lookup: F) -> Result<String, TemplateError>
where
    F: FnMut(&'a str) -> Option<String>,
{
    let mut rendered = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);

        let Some(close) = rest[open..].find('}') else {
            return Err(TemplateError::Unclosed(arg.to_string()));
        };
        let name = &rest[open + 1..open + close];
        let value = lookup(name).ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
        rendered.push_str(&value);

        rest = &rest[open + close + 1..];
    }
    rendered.push_str(rest);

    Ok(rendered)
}
