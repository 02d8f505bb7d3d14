//! Static HELO and envelope sanity rules
//!
//! Rendered in `filter-regex` syntax: one `<phase> [!] <pattern>` line per
//! rule, a session is rejected when a rule matches (or, with `!`, when it
//! does not match).
//!
//! `filter-regex` compiles patterns as POSIX extended regular expressions.
//! Patterns are restricted to the part of ERE that the `regex` crate reads
//! the same way, so rules can be compiled and tested here.

use mailcraft_common::{Error, Result};
use regex::Regex;
use std::fmt;

/// SMTP phase a rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Helo,
    MailFrom,
    RcptTo,
}

impl Phase {
    fn keyword(&self) -> &'static str {
        match self {
            Phase::Helo => "helo",
            Phase::MailFrom => "mail-from",
            Phase::RcptTo => "rcpt-to",
        }
    }
}

/// A sanity rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityRule {
    /// Rule name/identifier
    pub name: &'static str,
    pub phase: Phase,
    /// Reject when the pattern does NOT match
    pub negate: bool,
    pub pattern: &'static str,
}

impl SanityRule {
    /// Whether a value would be rejected by this rule
    pub fn rejects(&self, value: &str) -> Result<bool> {
        let re = compile_pattern(self)?;
        Ok(re.is_match(value) != self.negate)
    }
}

impl fmt::Display for SanityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            write!(f, "{} ! {}", self.phase.keyword(), self.pattern)
        } else {
            write!(f, "{} {}", self.phase.keyword(), self.pattern)
        }
    }
}

/// Built-in rules
pub fn default_rules() -> Vec<SanityRule> {
    vec![
        // Hostname or bracketed address literal
        SanityRule {
            name: "HELO_CHARSET",
            phase: Phase::Helo,
            negate: true,
            pattern: r"^([A-Za-z0-9.-]+|\[[A-Za-z0-9.:]+])$",
        },
        // Single label
        SanityRule {
            name: "HELO_NOT_FQDN",
            phase: Phase::Helo,
            negate: false,
            pattern: r"^[A-Za-z0-9-]+$",
        },
        SanityRule {
            name: "HELO_DOT_EDGE",
            phase: Phase::Helo,
            negate: false,
            pattern: r"^\.|\.$",
        },
        // Remote client claiming to be us
        SanityRule {
            name: "HELO_LOCALHOST",
            phase: Phase::Helo,
            negate: false,
            pattern: r"^[Ll][Oo][Cc][Aa][Ll][Hh][Oo][Ss][Tt](\.[Ll][Oo][Cc][Aa][Ll][Dd][Oo][Mm][Aa][Ii][Nn])?$",
        },
        SanityRule {
            name: "MAIL_FROM_DOUBLE_AT",
            phase: Phase::MailFrom,
            negate: false,
            pattern: r"@.*@",
        },
        // % and ! relay hacks
        SanityRule {
            name: "RCPT_TO_SOURCE_ROUTE",
            phase: Phase::RcptTo,
            negate: false,
            pattern: r"[%!]",
        },
    ]
}

/// Reject constructs that POSIX ERE and the `regex` crate read differently:
/// inline flags, Perl classes and escapes, and backslashes or nested `[`
/// inside a bracket expression.
fn check_dialect(rule: &SanityRule) -> Result<()> {
    let unportable = |what: &str| {
        Err(Error::Render(format!(
            "Rule {} uses {} which filter-regex does not support: {}",
            rule.name, what, rule.pattern
        )))
    };

    let chars: Vec<char> = rule.pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '(' if chars.get(i + 1) == Some(&'?') => return unportable("an inline group flag"),
            '\\' => match chars.get(i + 1) {
                Some(c) if c.is_ascii_alphanumeric() => return unportable("a backslash class"),
                Some(_) => i += 1,
                None => return unportable("a trailing backslash"),
            },
            '[' => {
                i += 1;
                if chars.get(i) == Some(&'^') {
                    i += 1;
                }
                // a leading ] is a member of the set
                if chars.get(i) == Some(&']') {
                    i += 1;
                }
                loop {
                    match chars.get(i) {
                        Some(']') => break,
                        Some('\\') => return unportable("a backslash inside brackets"),
                        Some('[') => return unportable("a nested bracket"),
                        Some(_) => i += 1,
                        None => return unportable("an unclosed bracket"),
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

fn compile_pattern(rule: &SanityRule) -> Result<Regex> {
    Regex::new(rule.pattern)
        .map_err(|e| Error::Render(format!("Invalid pattern in rule {}: {}", rule.name, e)))
}

/// Render rules as a `filter-regex` configuration. Every pattern is
/// checked and compiled first so a broken rule fails the build instead of
/// the filter.
pub fn render(rules: &[SanityRule]) -> Result<String> {
    let mut out = String::new();
    for rule in rules {
        check_dialect(rule)?;
        compile_pattern(rule)?;
        out.push_str(&rule.to_string());
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule(name: &str) -> SanityRule {
        default_rules()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap()
    }

    fn rejected_helo(helo: &str) -> bool {
        default_rules()
            .iter()
            .filter(|r| r.phase == Phase::Helo)
            .any(|r| r.rejects(helo).unwrap())
    }

    #[test]
    fn test_render_default_rules() {
        let expected = concat!(
            "helo ! ^([A-Za-z0-9.-]+|\\[[A-Za-z0-9.:]+])$\n",
            "helo ^[A-Za-z0-9-]+$\n",
            "helo ^\\.|\\.$\n",
            "helo ^[Ll][Oo][Cc][Aa][Ll][Hh][Oo][Ss][Tt](\\.[Ll][Oo][Cc][Aa][Ll][Dd][Oo][Mm][Aa][Ii][Nn])?$\n",
            "mail-from @.*@\n",
            "rcpt-to [%!]\n",
        );
        assert_eq!(render(&default_rules()).unwrap(), expected);
    }

    #[test]
    fn test_default_rules_are_portable() {
        for rule in default_rules() {
            assert!(check_dialect(&rule).is_ok(), "{}", rule.name);
        }
    }

    #[test]
    fn test_non_posix_syntax_rejected() {
        for pattern in [
            r"(?i)^localhost$",
            r"^\d+$",
            r"^\w+\.example$",
            r"^[A-Za-z0-9.:\[\]-]+$",
            r"^[a[b]]$",
            r"^[abc",
            r"abc\",
        ] {
            let rule = SanityRule {
                name: "UNPORTABLE",
                phase: Phase::Helo,
                negate: false,
                pattern,
            };
            assert!(
                matches!(render(&[rule]), Err(Error::Render(_))),
                "{} accepted",
                pattern
            );
        }
    }

    #[test]
    fn test_leading_bracket_member_is_portable() {
        let rule = SanityRule {
            name: "BRACKETS",
            phase: Phase::Helo,
            negate: false,
            pattern: r"^[]a-z]+$",
        };
        assert!(check_dialect(&rule).is_ok());
    }

    #[test]
    fn test_valid_helo_passes() {
        assert!(!rejected_helo("mail.example.org"));
        assert!(!rejected_helo("[192.0.2.1]"));
        assert!(!rejected_helo("[IPv6:2001:db8::1]"));
    }

    #[test]
    fn test_bad_helo_rejected() {
        assert!(rejected_helo("mailserver"));
        assert!(rejected_helo(".example.org"));
        assert!(rejected_helo("example.org."));
        assert!(rejected_helo("localhost"));
        assert!(rejected_helo("LOCALHOST.localdomain"));
        assert!(rejected_helo("bad host.example.org"));
        assert!(rejected_helo("bad\"host.example.org"));
    }

    #[test]
    fn test_envelope_rules() {
        assert!(rule("MAIL_FROM_DOUBLE_AT").rejects("a@b@example.org").unwrap());
        assert!(!rule("MAIL_FROM_DOUBLE_AT").rejects("a@example.org").unwrap());
        assert!(rule("RCPT_TO_SOURCE_ROUTE").rejects("foo%bar@example.com").unwrap());
        assert!(!rule("RCPT_TO_SOURCE_ROUTE").rejects("foo@example.com").unwrap());
    }

    #[test]
    fn test_broken_pattern_fails_render() {
        let broken = SanityRule {
            name: "BROKEN",
            phase: Phase::Helo,
            negate: false,
            pattern: "(",
        };
        assert!(matches!(render(&[broken]), Err(Error::Render(_))));
    }
}
