//! Typed SQL templates with `{{var}}` placeholders.
//!
//! A template declares its variable set when it is registered. The
//! placeholders found in the text must match that declaration exactly, so
//! a typo in either the SQL or the registry fails at startup rather than
//! rendering an empty string into a live query.
//!
//! `{{var}}` substitutes the value with markup and quote characters
//! entity-escaped. `{{{var}}}` substitutes it verbatim and is reserved for
//! `GeoJSON` documents.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::params::{ParameterMap, SUMMARY_VAR};
use crate::store::TemplateName;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\{ *([A-Za-z_][A-Za-z0-9_]*) *\}\}\}|\{\{ *([A-Za-z_][A-Za-z0-9_]*) *\}\}")
        .expect("valid regex")
});

/// Errors raised while registering or rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The text uses a placeholder the registration does not declare.
    #[error("Template '{template}' uses undeclared variable '{variable}'")]
    Undeclared {
        /// Template being registered.
        template: TemplateName,
        /// Offending placeholder.
        variable: String,
    },

    /// The registration declares a variable the text never uses.
    #[error("Template '{template}' declares unused variable '{variable}'")]
    Unused {
        /// Template being registered.
        template: TemplateName,
        /// Declared variable.
        variable: String,
    },

    /// An aggregation template lacks the summary-columns placeholder.
    #[error("Aggregation template '{template}' has no '{{{{additionalSelect}}}}' placeholder")]
    MissingSummary {
        /// Template being registered.
        template: TemplateName,
    },

    /// Rendering was attempted without a binding for a declared variable.
    #[error("Template '{template}' rendered without a value for '{variable}'")]
    Unbound {
        /// Template being rendered.
        template: TemplateName,
        /// Missing variable.
        variable: String,
    },
}

/// An immutable SQL template and the variables it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    name: TemplateName,
    text: &'static str,
    variables: BTreeSet<&'static str>,
}

impl QueryTemplate {
    /// Registers `text` under `name`, checking its placeholders against
    /// `declared`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if a placeholder is undeclared, a declared
    /// variable is unused, or an aggregation template lacks the summary
    /// placeholder.
    pub fn new(
        name: TemplateName,
        text: &'static str,
        declared: &[&'static str],
    ) -> Result<Self, TemplateError> {
        let variables: BTreeSet<&'static str> = declared.iter().copied().collect();
        let used = placeholders(text);

        if let Some(variable) = used.iter().find(|v| !variables.contains(v.as_str())) {
            return Err(TemplateError::Undeclared {
                template: name,
                variable: variable.clone(),
            });
        }
        if let Some(variable) = variables.iter().find(|v| !used.contains(**v)) {
            return Err(TemplateError::Unused {
                template: name,
                variable: (*variable).to_string(),
            });
        }
        if name.is_aggregation() && !variables.contains(SUMMARY_VAR) {
            return Err(TemplateError::MissingSummary { template: name });
        }

        Ok(Self {
            name,
            text,
            variables,
        })
    }

    /// Logical name of this template.
    #[must_use]
    pub const fn name(&self) -> TemplateName {
        self.name
    }

    /// Raw template text.
    #[must_use]
    pub const fn text(&self) -> &'static str {
        self.text
    }

    /// Declared variables, in name order.
    pub fn variables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.variables.iter().copied()
    }

    /// Substitutes every placeholder with its binding from `params`.
    ///
    /// Bindings for variables the template does not declare are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Unbound`] if a declared variable has no
    /// binding.
    pub fn render(&self, params: &ParameterMap) -> Result<String, TemplateError> {
        if let Some(variable) = self.variables.iter().find(|v| params.get(v).is_none()) {
            return Err(TemplateError::Unbound {
                template: self.name,
                variable: (*variable).to_string(),
            });
        }

        let rendered = PLACEHOLDER_RE.replace_all(self.text, |caps: &Captures<'_>| {
            caps.get(1).map_or_else(
                || escape(caps.get(2).and_then(|m| params.get(m.as_str())).unwrap_or("")),
                |raw| params.get(raw.as_str()).unwrap_or("").to_string(),
            )
        });

        Ok(rendered.into_owned())
    }
}

/// Placeholder names used in `text`.
fn placeholders(text: &str) -> BTreeSet<String> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Entity-escapes the characters a double-brace placeholder must not emit.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            other => out.push(other),
        }
    }
    out
}
