//! Full paths through the combination hierarchy

use crate::core::comb::Combination;
use crate::core::error::{GeomDbError, Result};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Resolves names to objects while walking paths
pub trait PathResolver {
    /// Whether an object with this name exists
    fn exists(&self, name: &str) -> bool;

    /// Decode the named combination; `Ok(None)` if the object is not one
    fn combination(&self, name: &str) -> Result<Option<Combination>>;
}

/// Names from a root object down through nested membership
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FullPath {
    names: Vec<String>,
}

impl FullPath {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FullPath {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse `/a/b/c` (leading slash optional, empty segments ignored)
    pub fn parse(text: &str) -> Self {
        FullPath::new(text.split('/').filter(|segment| !segment.is_empty()))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn root(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.names.push(name.into());
    }

    /// This path extended by one element
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.push(name);
        child
    }

    /// True if any name occurs more than once
    pub fn has_cycle(&self) -> bool {
        self.names
            .iter()
            .enumerate()
            .any(|(i, name)| self.names[..i].contains(name))
    }
}

impl fmt::Display for FullPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.names.is_empty() {
            return write!(f, "/");
        }
        for name in &self.names {
            write!(f, "/{}", name)?;
        }
        Ok(())
    }
}

/// Check a path, reporting the first inconsistent element
///
/// Works from the tail upward: every element must exist, every element but
/// the last must be a combination, and each element must be a leaf of its
/// parent's tree. A parent that fails to decode counts as inconsistent at the
/// parent's position.
pub fn check_path<R: PathResolver + ?Sized>(resolver: &R, path: &FullPath) -> Result<()> {
    let inconsistent = |index: usize| GeomDbError::InconsistentPath {
        path: path.to_string(),
        index,
    };

    let last = match path.names.len().checked_sub(1) {
        Some(last) => last,
        None => return Err(inconsistent(0)),
    };
    if !resolver.exists(&path.names[last]) {
        return Err(inconsistent(last));
    }

    for index in (1..=last).rev() {
        let parent = match resolver.combination(&path.names[index - 1]) {
            Ok(Some(parent)) => parent,
            Ok(None) | Err(_) => return Err(inconsistent(index - 1)),
        };
        if !parent.contains_member(&path.names[index]) {
            return Err(inconsistent(index));
        }
    }

    Ok(())
}

/// Boolean form of [`check_path`]
pub fn validate_path<R: PathResolver + ?Sized>(resolver: &R, path: &FullPath) -> bool {
    check_path(resolver, path).is_ok()
}

/// Every path from `root` down to a non-combination (or empty combination)
///
/// Members that do not exist are skipped, as are members that would revisit
/// an object already on the current path.
pub fn full_paths<R: PathResolver + ?Sized>(resolver: &R, root: &str) -> Result<Vec<FullPath>> {
    if !resolver.exists(root) {
        return Err(GeomDbError::NotFound(root.to_string()));
    }

    let mut out = Vec::new();
    walk(resolver, FullPath::new([root]), &mut out)?;
    Ok(out)
}

fn walk<R: PathResolver + ?Sized>(
    resolver: &R,
    current: FullPath,
    out: &mut Vec<FullPath>,
) -> Result<()> {
    let name = match current.last() {
        Some(name) => name.to_string(),
        None => return Ok(()),
    };

    let combination = match resolver.combination(&name)? {
        Some(combination) => combination,
        None => {
            out.push(current);
            return Ok(());
        }
    };

    let mut members: Vec<&str> = combination.members();
    let mut seen = HashSet::new();
    members.retain(|member| seen.insert(*member));

    let mut descended = false;
    for member in members {
        if !resolver.exists(member) {
            warn!("{}: member {} does not exist, skipping", current, member);
            continue;
        }
        if current.names.iter().any(|n| n == member) {
            warn!("{}: member {} forms a cycle, skipping", current, member);
            continue;
        }
        descended = true;
        walk(resolver, current.child(member), out)?;
    }

    if !descended {
        out.push(current);
    }
    Ok(())
}

/// Every object reachable from `root`, members before the combinations
/// that hold them
///
/// Each object appears once even when shared by several combinations, and
/// a member that leads back to an object already collected is not followed
/// again. Missing members are skipped.
pub fn tree_members<R: PathResolver + ?Sized>(resolver: &R, root: &str) -> Result<Vec<String>> {
    if !resolver.exists(root) {
        return Err(GeomDbError::NotFound(root.to_string()));
    }

    let mut visited = HashSet::new();
    let mut out = Vec::new();
    visited.insert(root.to_string());
    collect_post_order(resolver, root, &mut visited, &mut out)?;
    Ok(out)
}

fn collect_post_order<R: PathResolver + ?Sized>(
    resolver: &R,
    name: &str,
    visited: &mut HashSet<String>,
    out: &mut Vec<String>,
) -> Result<()> {
    if let Some(combination) = resolver.combination(name)? {
        for member in combination.members() {
            if !resolver.exists(member) {
                warn!("{}: member {} does not exist, skipping", name, member);
                continue;
            }
            if visited.insert(member.to_string()) {
                collect_post_order(resolver, member, visited, out)?;
            }
        }
    }
    out.push(name.to_string());
    Ok(())
}
