use std::collections::BTreeSet;
use std::str::FromStr;

use super::error::FormError;

/// A state that, once reached, makes a control's errors visible.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum DisplayFlag {
    Touched,
    Submitted,
    Dirty,
}

impl FromStr for DisplayFlag {
    type Err = FormError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "touched" => Ok(DisplayFlag::Touched),
            "submitted" => Ok(DisplayFlag::Submitted),
            "dirty" => Ok(DisplayFlag::Dirty),
            other => Err(FormError::InvalidDisplayPolicy(other.to_owned())),
        }
    }
}

/// Flags of one node, as seen by an [`ErrorDisplayPolicy`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NodeFlags {
    pub touched: bool,
    pub submitted: bool,
    pub dirty: bool,
}

impl NodeFlags {
    pub fn has(&self, flag: DisplayFlag) -> bool {
        match flag {
            DisplayFlag::Touched => self.touched,
            DisplayFlag::Submitted => self.submitted,
            DisplayFlag::Dirty => self.dirty,
        }
    }
}

/// When a form shows its controls' errors.
///
/// Parsed from comma or space separated tokens, e.g. `"touched, submitted"`.
/// An empty policy shows errors as soon as a control is invalid.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorDisplayPolicy {
    flags: BTreeSet<DisplayFlag>,
}

impl ErrorDisplayPolicy {
    pub fn new(flags: impl IntoIterator<Item = DisplayFlag>) -> Self {
        Self {
            flags: flags.into_iter().collect(),
        }
    }

    pub fn flags(&self) -> impl Iterator<Item = DisplayFlag> + '_ {
        self.flags.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// True when any configured flag is set on any of `nodes`.
    pub fn allows(&self, nodes: &[NodeFlags]) -> bool {
        self.is_empty()
            || self
                .flags
                .iter()
                .any(|flag| nodes.iter().any(|node| node.has(*flag)))
    }
}

impl FromStr for ErrorDisplayPolicy {
    type Err = FormError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let flags = source
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(DisplayFlag::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { flags })
    }
}
