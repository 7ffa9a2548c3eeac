//! Positional prompt builder with per-section token reservations.
//!
//! Sections are declared up front in the order they must appear in the
//! final text and are addressed afterwards through a [`SectionId`] handle.
//! Callers fill them in whatever order reflects content priority; the
//! rendered prompt always follows declaration order.
//!
//! Budget accounting:
//! - the prompt budget is `max_tokens - reserved_output_tokens`;
//! - a reserved section commits its whole reservation immediately and its
//!   lines may only draw from that reservation;
//! - an unreserved section commits exactly what it has used and draws from
//!   whatever the budget has left after all commitments.

use std::fmt::{self, Display, Write as _};
use std::sync::Arc;

use thiserror::Error;

use crate::token::TokenCounter;

/// Handle to a declared section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionId(usize);

/// Whether a line must be present in the final prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Required,
    Optional,
}

/// Outcome of appending content to a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddResult {
    pub did_fit: bool,
    pub tokens: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt section '{0}' declared twice")]
    DuplicateSection(String),

    #[error("section '{section}' reserves {requested} tokens but only {available} remain")]
    ReservationTooLarge {
        section: String,
        requested: usize,
        available: usize,
    },

    #[error(
        "required content for section '{section}' needs {needed} tokens but only {available} remain\n{usage}"
    )]
    RequiredContentTooLarge {
        section: String,
        needed: usize,
        available: usize,
        usage: String,
    },

    #[error("unknown prompt section handle {0}")]
    UnknownSection(usize),
}

#[derive(Debug)]
struct Section {
    name: String,
    reserved: Option<usize>,
    used: usize,
    content: String,
}

impl Section {
    fn committed(&self) -> usize {
        self.reserved.unwrap_or(self.used)
    }
}

/// Final prompt text plus its token cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub text: String,
    pub total_tokens: usize,
    /// [`PromptBuilder::usage_summary`] at build time.
    pub usage: String,
}

pub struct PromptBuilder {
    max_tokens: usize,
    reserved_output_tokens: usize,
    counter: Arc<dyn TokenCounter>,
    sections: Vec<Section>,
}

impl PromptBuilder {
    pub fn new(
        max_tokens: usize,
        reserved_output_tokens: usize,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            max_tokens,
            reserved_output_tokens,
            counter,
            sections: Vec::new(),
        }
    }

    /// Tokens the prompt itself may use.
    pub fn budget(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserved_output_tokens)
    }

    pub fn reserved_output_tokens(&self) -> usize {
        self.reserved_output_tokens
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Declare the next section in output order.
    ///
    /// A reservation is subtracted from the remaining budget right away,
    /// even though the section is still empty.
    pub fn add_section(
        &mut self,
        name: impl Into<String>,
        reserve_tokens: Option<usize>,
    ) -> Result<SectionId, PromptError> {
        let name = name.into();
        if self.sections.iter().any(|s| s.name == name) {
            return Err(PromptError::DuplicateSection(name));
        }

        if let Some(requested) = reserve_tokens {
            let available = self.remaining();
            if requested > available {
                return Err(PromptError::ReservationTooLarge {
                    section: name,
                    requested,
                    available,
                });
            }
        }

        self.sections.push(Section {
            name,
            reserved: reserve_tokens,
            used: 0,
            content: String::new(),
        });
        Ok(SectionId(self.sections.len() - 1))
    }

    /// Budget not yet committed to any section.
    pub fn remaining(&self) -> usize {
        let committed: usize = self.sections.iter().map(Section::committed).sum();
        self.budget().saturating_sub(committed)
    }

    /// Tokens the given section can still take.
    pub fn available(&self, id: SectionId) -> Result<usize, PromptError> {
        let section = self.section(id)?;
        Ok(match section.reserved {
            Some(reserved) => reserved.saturating_sub(section.used),
            None => self.remaining(),
        })
    }

    pub fn used(&self, id: SectionId) -> Result<usize, PromptError> {
        Ok(self.section(id)?.used)
    }

    pub fn section_name(&self, id: SectionId) -> Result<&str, PromptError> {
        Ok(self.section(id)?.name.as_str())
    }

    /// Append raw text to a section.
    ///
    /// Optional text that does not fit is dropped and reported through
    /// [`AddResult::did_fit`]; required text that does not fit is an error.
    pub fn add_text(
        &mut self,
        id: SectionId,
        text: &str,
        kind: LineKind,
    ) -> Result<AddResult, PromptError> {
        let tokens = self.counter.count(text);
        let available = self.available(id)?;

        if tokens > available {
            return match kind {
                LineKind::Optional => Ok(AddResult {
                    did_fit: false,
                    tokens,
                }),
                LineKind::Required => Err(PromptError::RequiredContentTooLarge {
                    section: self.section(id)?.name.clone(),
                    needed: tokens,
                    available,
                    usage: self.usage_summary(),
                }),
            };
        }

        let section = self.section_mut(id)?;
        section.content.push_str(text);
        section.used += tokens;
        Ok(AddResult {
            did_fit: true,
            tokens,
        })
    }

    /// Append a required line.
    pub fn add_line(&mut self, id: SectionId, line: &str) -> Result<AddResult, PromptError> {
        self.add_text(id, &format!("{line}\n"), LineKind::Required)
    }

    /// Append a line that may be dropped when the budget runs out.
    pub fn add_optional_line(
        &mut self,
        id: SectionId,
        line: &str,
    ) -> Result<AddResult, PromptError> {
        self.add_text(id, &format!("{line}\n"), LineKind::Optional)
    }

    /// Append a required `label: value` line.
    pub fn add_value(
        &mut self,
        id: SectionId,
        label: &str,
        value: impl Display,
    ) -> Result<AddResult, PromptError> {
        self.add_line(id, &format!("{label}: {value}"))
    }

    /// Append a compact JSON value, optionally inside a ```json fence.
    pub fn add_json_line(
        &mut self,
        id: SectionId,
        value: &serde_json::Value,
        fenced: bool,
        kind: LineKind,
    ) -> Result<AddResult, PromptError> {
        let text = if fenced {
            format!("```json\n{value}\n```\n")
        } else {
            format!("{value}\n")
        };
        self.add_text(id, &text, kind)
    }

    /// Tokens used across all sections.
    pub fn total_tokens(&self) -> usize {
        self.sections.iter().map(|s| s.used).sum()
    }

    /// Per-section usage table, for diagnostics and budget errors.
    pub fn usage_summary(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            let _ = match section.reserved {
                Some(reserved) => writeln!(
                    out,
                    "  {}: {} / {} reserved",
                    section.name, section.used, reserved
                ),
                None => writeln!(out, "  {}: {}", section.name, section.used),
            };
        }
        let _ = write!(
            out,
            "  total: {} / {} (output reserve {}, uncommitted {})",
            self.total_tokens(),
            self.budget(),
            self.reserved_output_tokens,
            self.remaining()
        );
        out
    }

    /// Concatenate all sections in declaration order.
    pub fn build(&self) -> BuiltPrompt {
        let text = self
            .sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<String>();
        BuiltPrompt {
            text,
            total_tokens: self.total_tokens(),
            usage: self.usage_summary(),
        }
    }

    fn section(&self, id: SectionId) -> Result<&Section, PromptError> {
        self.sections
            .get(id.0)
            .ok_or(PromptError::UnknownSection(id.0))
    }

    fn section_mut(&mut self, id: SectionId) -> Result<&mut Section, PromptError> {
        self.sections
            .get_mut(id.0)
            .ok_or(PromptError::UnknownSection(id.0))
    }
}

impl fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptBuilder")
            .field("max_tokens", &self.max_tokens)
            .field("reserved_output_tokens", &self.reserved_output_tokens)
            .field("sections", &self.sections)
            .finish()
    }
}
