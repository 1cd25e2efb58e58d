//! Recursive visitor over ECL expression trees.
//!
//! The reconciliation engine needs to know which other reference sets a
//! formula draws membership from. [`walk_member_of`] visits every reachable
//! sub-expression of a parsed constraint and reports each member-of target
//! that names an explicit concept id. Exhaustive matching over every grammar
//! category means a new expression shape fails to compile here instead of
//! being silently skipped.

use crate::ast::{AttributeConstraint, EclExpression, Refinement};
use crate::SctId;

/// Walks `expr` and invokes `on_member_of` for every member-of constraint
/// whose target is an explicit concept reference.
///
/// Targets that are wildcards or nested expressions do not trigger the
/// callback themselves; their sub-expressions are still visited.
///
/// # Example
///
/// ```rust
/// use refset_ecl::{parse, walk_member_of};
///
/// let expr = parse("(^ 111) MINUS (^ 222)").unwrap();
/// let mut seen = Vec::new();
/// walk_member_of(&expr, &mut |id| seen.push(id));
/// assert_eq!(seen, vec![111, 222]);
/// ```
pub fn walk_member_of<F>(expr: &EclExpression, on_member_of: &mut F)
where
    F: FnMut(SctId),
{
    match expr {
        EclExpression::ConceptReference { .. }
        | EclExpression::Any
        | EclExpression::Concrete(_) => {}

        EclExpression::MemberOf(target) => match target.unwrap_nested() {
            EclExpression::ConceptReference { concept_id, .. } => on_member_of(*concept_id),
            _ => walk_member_of(target, on_member_of),
        },

        EclExpression::DescendantOf(inner)
        | EclExpression::DescendantOrSelfOf(inner)
        | EclExpression::ChildOf(inner)
        | EclExpression::ChildOrSelfOf(inner)
        | EclExpression::AncestorOf(inner)
        | EclExpression::AncestorOrSelfOf(inner)
        | EclExpression::ParentOf(inner)
        | EclExpression::ParentOrSelfOf(inner)
        | EclExpression::Nested(inner) => walk_member_of(inner, on_member_of),

        EclExpression::And(left, right)
        | EclExpression::Or(left, right)
        | EclExpression::Minus(left, right) => {
            walk_member_of(left, on_member_of);
            walk_member_of(right, on_member_of);
        }

        EclExpression::Refined { focus, refinement } => {
            walk_member_of(focus, on_member_of);
            walk_refinement(refinement, on_member_of);
        }

        EclExpression::DotNotation {
            source,
            attribute_type,
        } => {
            walk_member_of(source, on_member_of);
            walk_member_of(attribute_type, on_member_of);
        }

        // Filter interiors are opaque strings evaluated remotely; only the
        // filtered expression itself is walked.
        EclExpression::Filtered { expression, .. } => walk_member_of(expression, on_member_of),
    }
}

fn walk_refinement<F>(refinement: &Refinement, on_member_of: &mut F)
where
    F: FnMut(SctId),
{
    for constraint in &refinement.ungrouped {
        walk_constraint(constraint, on_member_of);
    }
    for group in &refinement.groups {
        for constraint in &group.constraints {
            walk_constraint(constraint, on_member_of);
        }
    }
}

fn walk_constraint<F>(constraint: &AttributeConstraint, on_member_of: &mut F)
where
    F: FnMut(SctId),
{
    walk_member_of(&constraint.attribute_type, on_member_of);
    walk_member_of(&constraint.value, on_member_of);
}
