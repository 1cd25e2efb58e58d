//! Dependency resolution between formula driven refsets.
//!
//! A refset's formula may select members of other formula driven refsets
//! (`^ otherRefset`). Because those refsets are themselves being reconciled
//! in the same run, their distributed membership cannot be trusted while
//! diffing; every such reference is substituted with the referenced refset's
//! own formula until each effective formula is self-contained.
//!
//! Resolution runs as a worklist over referenced ids: an id is either pending
//! or resolved, never both. Entries resolve only once every reference they
//! expand is itself resolved, so the result is independent of iteration
//! order; a bounded pass count turns circular references into a hard error
//! instead of an endless loop.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use refset_ecl::{parse, walk_member_of};

use crate::error::{SyncError, SyncResult};
use crate::model::RefsetDefinition;

/// Upper bound on fixed-point passes before resolution is declared circular.
const MAX_RESOLUTION_PASSES: usize = 100;

/// Member-of marker in a raw formula: `^ 32570071000036102 |term|`, the term
/// being optional. Substitution replaces the whole marker.
static MEMBER_OF_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\^\s?(\d{6,})(?:\s?\|\s?([\w\s\-.]+)\|)?").expect("member-of marker pattern")
});

/// Resolves every refset's formula into a self-contained effective formula.
pub struct DependencyResolver<'a> {
    definitions: &'a BTreeMap<String, RefsetDefinition>,
}

impl<'a> DependencyResolver<'a> {
    /// Creates a resolver over the governing refset's definitions.
    pub fn new(definitions: &'a BTreeMap<String, RefsetDefinition>) -> Self {
        DependencyResolver { definitions }
    }

    /// Validates every formula, resolves referenced formulas to a fixed
    /// point, and returns each refset's fully expanded effective formula.
    ///
    /// Self-references and references to refsets outside the governing list
    /// are terminal: they stay as member-of constraints in the output.
    pub fn resolve(&self) -> SyncResult<BTreeMap<String, String>> {
        let pending = self.discover_references()?;
        let resolved = self.fixed_point(pending)?;

        let mut effective = BTreeMap::new();
        for (refset_id, definition) in self.definitions {
            effective.insert(
                refset_id.clone(),
                substitute(&definition.formula, refset_id, &resolved),
            );
        }
        Ok(effective)
    }

    /// Parses every formula and collects the refset ids that need their own
    /// formula resolved before substitution can happen.
    fn discover_references(&self) -> SyncResult<BTreeSet<String>> {
        let mut pending = BTreeSet::new();
        for (refset_id, definition) in self.definitions {
            let expr = parse(&definition.formula).map_err(|source| SyncError::InvalidFormula {
                refset_id: refset_id.clone(),
                source,
            })?;
            walk_member_of(&expr, &mut |referenced| {
                let referenced = referenced.to_string();
                if referenced != *refset_id && self.definitions.contains_key(&referenced) {
                    pending.insert(referenced);
                }
            });
        }
        Ok(pending)
    }

    fn fixed_point(
        &self,
        mut pending: BTreeSet<String>,
    ) -> SyncResult<BTreeMap<String, String>> {
        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        let mut passes = 0;

        while !pending.is_empty() {
            passes += 1;
            if passes > MAX_RESOLUTION_PASSES {
                return Err(SyncError::CircularDependency {
                    iterations: MAX_RESOLUTION_PASSES,
                    unresolved: pending.into_iter().collect(),
                    resolved,
                });
            }

            let mut completed = Vec::new();
            for refset_id in &pending {
                let definition = self
                    .definitions
                    .get(refset_id)
                    .ok_or_else(|| SyncError::MissingDefinition(refset_id.clone()))?;

                let expandable =
                    expandable_references(&definition.formula, refset_id, self.definitions);
                if expandable.is_empty() {
                    // Only self-references or refsets outside the governing
                    // list: the raw formula is already terminal.
                    completed.push((refset_id.clone(), definition.formula.clone()));
                } else if expandable.iter().all(|dep| resolved.contains_key(dep)) {
                    completed.push((
                        refset_id.clone(),
                        substitute(&definition.formula, refset_id, &resolved),
                    ));
                }
                // Otherwise: deferred until its references resolve.
            }

            for (refset_id, formula) in completed {
                pending.remove(&refset_id);
                resolved.insert(refset_id, formula);
            }
        }

        Ok(resolved)
    }
}

/// The member-of references in `formula` that must be expanded: anything
/// other than a self-reference that names a known formula driven refset.
fn expandable_references(
    formula: &str,
    self_id: &str,
    definitions: &BTreeMap<String, RefsetDefinition>,
) -> BTreeSet<String> {
    MEMBER_OF_MARKER
        .captures_iter(formula)
        .filter_map(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .filter(|id| id != self_id && definitions.contains_key(id))
        .collect()
}

/// Replaces each expandable marker occurrence in `formula` with the
/// referenced refset's resolved formula, parenthesised. Self-references and
/// unknown refsets are left untouched.
fn substitute(formula: &str, self_id: &str, resolved: &BTreeMap<String, String>) -> String {
    let mut expanded = String::with_capacity(formula.len());
    let mut tail_start = 0;

    for captures in MEMBER_OF_MARKER.captures_iter(formula) {
        let (Some(whole), Some(id)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if id.as_str() == self_id {
            continue;
        }
        if let Some(replacement) = resolved.get(id.as_str()) {
            expanded.push_str(&formula[tail_start..whole.start()]);
            expanded.push('(');
            expanded.push_str(replacement);
            expanded.push(')');
            tail_start = whole.end();
        }
    }

    expanded.push_str(&formula[tail_start..]);
    expanded
}
