//! Filter definitions and chains
//!
//! Inbound mail passes pacing, HELO/envelope sanity and spam
//! classification in that order. Submitted mail is only DKIM signed. The
//! two chains share no filter.

use super::quoted;
use mailcraft_common::config::DkimConfig;
use std::fmt;
use std::path::Path;

/// Chain attached to the inbound listeners
pub const INBOUND_CHAIN: &str = "inbound";

/// Chain attached to the submission listeners
pub const OUTBOUND_CHAIN: &str = "outbound";

/// A processing stage of the filter chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    /// Connection pacing, slows down clients that talk before their turn
    Pacing,
    /// HELO and envelope format checks
    Sanity,
    /// Spam scoring and tagging
    SpamClassification,
    /// DKIM signing of outgoing mail
    DkimSigning,
}

impl FilterStage {
    /// Inbound stages in application order
    pub const INBOUND: [FilterStage; 3] = [
        FilterStage::Pacing,
        FilterStage::Sanity,
        FilterStage::SpamClassification,
    ];

    /// Outbound stages in application order
    pub const OUTBOUND: [FilterStage; 1] = [FilterStage::DkimSigning];

    /// Filter name used in smtpd.conf
    pub fn name(&self) -> &'static str {
        match self {
            FilterStage::Pacing => "pause",
            FilterStage::Sanity => "regex",
            FilterStage::SpamClassification => "rspamd",
            FilterStage::DkimSigning => "dkimsign",
        }
    }
}

/// Parameters the filter commands are built from
pub struct FilterContext<'a> {
    pub domain: &'a str,
    pub dkim: &'a DkimConfig,
    pub header_rules: &'a Path,
}

/// `filter "<name>" proc-exec "<command>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub stage: FilterStage,
    pub command: String,
}

impl Filter {
    /// Build the filter for a stage
    pub fn for_stage(stage: FilterStage, ctx: &FilterContext<'_>) -> Self {
        let command = match stage {
            FilterStage::Pacing => "filter-pause".to_string(),
            FilterStage::Sanity => format!("filter-regex {}", ctx.header_rules.display()),
            FilterStage::SpamClassification => "filter-rspamd".to_string(),
            FilterStage::DkimSigning => format!(
                "filter-dkimsign -a rsa-sha256 -d {} -s {} -k {}",
                ctx.domain,
                ctx.dkim.selector,
                ctx.dkim.private_key_path(ctx.domain).display()
            ),
        };
        Self { stage, command }
    }

    pub fn name(&self) -> &'static str {
        self.stage.name()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "filter {} proc-exec {}",
            quoted(self.name()),
            quoted(&self.command)
        )
    }
}

/// `filter "<name>" chain { "<a>", "<b>" }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    pub name: &'static str,
    pub stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn inbound() -> Self {
        Self {
            name: INBOUND_CHAIN,
            stages: FilterStage::INBOUND.to_vec(),
        }
    }

    pub fn outbound() -> Self {
        Self {
            name: OUTBOUND_CHAIN,
            stages: FilterStage::OUTBOUND.to_vec(),
        }
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<String> = self.stages.iter().map(|s| quoted(s.name())).collect();
        write!(
            f,
            "filter {} chain {{ {} }}",
            quoted(self.name),
            members.join(", ")
        )
    }
}
