//! Version ranges in the comma-separated HashiCorp style.
//!
//! A range is a list of `<op> <version>` entries that must all hold, e.g.
//! `">= 1.2, < 2.0.0-0"`. Operators are `=`, `!=`, `>`, `<`, `>=`, `<=` and
//! the pessimistic `~>`. Versions may omit trailing segments or carry more
//! than three (`1.2.3.4`), plus a leading `v`. Prereleases order the way
//! [`semver::Prerelease`] does.
//!
//! A prerelease version only satisfies an entry whose own version is a
//! prerelease of the same release segments.

use std::cmp::Ordering;

use semver::{BuildMetadata, Prerelease};

use crate::constraint::ConstraintError;

/// A parsed version with every numeric segment that was written.
///
/// Missing segments compare as zero, so `1.2` equals `1.2.0` and `1.2.3.4`
/// sorts after `1.2.3`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Loose {
    parts: Vec<u64>,
    pre: Prerelease,
}

impl Loose {
    fn parse(input: &str) -> Result<Self, ConstraintError> {
        let invalid = || ConstraintError::InvalidVersion(input.to_string());
        let s = input.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let s = match s.split_once('+') {
            Some((s, build)) => {
                BuildMetadata::new(build).map_err(|_| invalid())?;
                s
            }
            None => s,
        };
        let (core, pre) = match s.split_once('-') {
            Some((c, p)) => (c, Prerelease::new(p).map_err(|_| invalid())?),
            None => (s, Prerelease::EMPTY),
        };

        let parts = core
            .split('.')
            .map(|p| p.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parts, pre })
    }

    fn segment(&self, i: usize) -> u64 {
        self.parts.get(i).copied().unwrap_or(0)
    }

    fn cmp_release(&self, other: &Self) -> Ordering {
        (0..self.parts.len().max(other.parts.len()))
            .map(|i| self.segment(i).cmp(&other.segment(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Ordering by release segments, then prerelease. Build metadata is ignored.
    fn compare(&self, other: &Self) -> Ordering {
        self.cmp_release(other).then_with(|| self.pre.cmp(&other.pre))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Pessimistic,
}

#[derive(Debug, Clone)]
struct Entry {
    op: Op,
    bound: Loose,
}

impl Entry {
    fn parse(input: &str) -> Result<Self, ConstraintError> {
        let s = input.trim();
        let ops = [
            (">=", Op::Ge),
            ("<=", Op::Le),
            ("!=", Op::Ne),
            ("~>", Op::Pessimistic),
            ("=", Op::Eq),
            (">", Op::Gt),
            ("<", Op::Lt),
        ];
        let (op, rest) = ops
            .iter()
            .find_map(|(p, op)| s.strip_prefix(*p).map(|r| (*op, r)))
            .unwrap_or((Op::Eq, s));
        if rest.trim().is_empty() {
            return Err(ConstraintError::InvalidRange(input.to_string()));
        }
        Ok(Self {
            op,
            bound: Loose::parse(rest)?,
        })
    }

    fn check(&self, v: &Loose) -> bool {
        let c = &self.bound;
        let pre_ok = match (c.pre.is_empty(), v.pre.is_empty()) {
            (false, false) => c.cmp_release(v).is_eq(),
            (true, false) => false,
            _ => true,
        };
        let cmp = v.compare(c);
        match self.op {
            Op::Eq => cmp.is_eq(),
            Op::Ne => cmp.is_ne(),
            Op::Gt => pre_ok && cmp.is_gt(),
            Op::Lt => pre_ok && cmp.is_lt(),
            Op::Ge => pre_ok && cmp.is_ge(),
            Op::Le => pre_ok && cmp.is_le(),
            Op::Pessimistic => {
                pre_ok
                    && cmp.is_ge()
                    && (0..c.parts.len().saturating_sub(1)).all(|i| v.segment(i) == c.segment(i))
            }
        }
    }
}

/// A parsed range, reusable across versions.
#[derive(Debug, Clone)]
pub struct VersionRange {
    entries: Vec<Entry>,
}

impl VersionRange {
    /// Parse a comma-separated range.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::InvalidRange`] or
    /// [`ConstraintError::InvalidVersion`] if any entry is malformed.
    pub fn parse(range: &str) -> Result<Self, ConstraintError> {
        let entries = range
            .split(',')
            .map(Entry::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Check a version (leading `v` allowed) against every entry.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::InvalidVersion`] if `version` does not parse.
    pub fn matches(&self, version: &str) -> Result<bool, ConstraintError> {
        let v = Loose::parse(version)?;
        Ok(self.entries.iter().all(|e| e.check(&v)))
    }
}

/// Parse `range` and check `version` against it.
///
/// # Errors
///
/// Returns a [`ConstraintError`] if either side is malformed.
pub fn matches(range: &str, version: &str) -> Result<bool, ConstraintError> {
    VersionRange::parse(range)?.matches(version)
}
