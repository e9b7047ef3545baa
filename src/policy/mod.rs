//! Service permission rules and the policy-sufficiency check.
//!
//! An ACL policy is raw rule text attached to a credential. [`parse_rules`]
//! reduces it to a [`RuleModel`] holding only the service rules relevant to
//! minting service identity tokens; [`allows`] decides whether that model
//! grants `write` on a given service name.

pub mod evaluator;
pub mod parser;

pub use evaluator::{allows, PolicyEvaluator};
pub use parser::parse_rules;

/// Permission string that grants the capability checked here.
pub const POLICY_WRITE: &str = "write";

/// Exact-rule name matching every service.
pub const SERVICE_WILDCARD: &str = "*";

/// Permission carried by a service rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    /// `policy = "write"`.
    Write,
    /// Any other value (`read`, `deny`, ...), already lowercased.
    Other(String),
}

impl Permission {
    /// Parse a permission value, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        if lowered == POLICY_WRITE {
            Self::Write
        } else {
            Self::Other(lowered)
        }
    }

    /// Whether this permission is `write`.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write)
    }
}

/// How a rule's name is matched against a service name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// `service "<name>"`, including the `"*"` wildcard.
    Exact,
    /// `service_prefix "<prefix>"`, where the empty prefix matches everything.
    Prefix,
}

/// A single service rule. The name is lowercased at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Service name or prefix.
    pub name: String,
    /// Granted permission.
    pub permission: Permission,
}

impl Rule {
    /// Build a rule, lowercasing the name and permission.
    pub fn new(name: &str, permission: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            permission: Permission::parse(permission),
        }
    }
}

/// Service rules extracted from one policy, in source order.
///
/// Never empty when produced by [`parse_rules`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleModel {
    /// Exact-name rules.
    pub exact: Vec<Rule>,
    /// Prefix-name rules.
    pub prefix: Vec<Rule>,
}

impl RuleModel {
    /// Append a rule of the given kind.
    pub fn push(&mut self, kind: RuleKind, rule: Rule) {
        match kind {
            RuleKind::Exact => self.exact.push(rule),
            RuleKind::Prefix => self.prefix.push(rule),
        }
    }

    /// Whether the model holds no rules at all.
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefix.is_empty()
    }

    /// Total number of rules.
    pub fn len(&self) -> usize {
        self.exact.len().saturating_add(self.prefix.len())
    }
}

/// Rule text could not be turned into a usable [`RuleModel`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The text is not valid HCL or JSON.
    #[error("failed to parse ACL policy: {0}")]
    Syntax(String),
    /// The text is valid but a service block is shaped wrongly.
    #[error("failed to parse ACL policy: {0}")]
    Structure(String),
    /// The text parsed but contains no service rules.
    #[error("ACL policy contains no service rules")]
    Empty,
}
