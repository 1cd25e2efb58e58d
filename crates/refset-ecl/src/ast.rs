//! Abstract Syntax Tree types for ECL expression constraints.

use crate::SctId;

// =============================================================================
// Refinement types
// =============================================================================

/// Comparison operators used in attribute constraints and concrete values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    /// Equal: `=`
    Equal,
    /// Not equal: `!=`
    NotEqual,
    /// Less than: `<`
    LessThan,
    /// Less than or equal: `<=`
    LessThanOrEqual,
    /// Greater than: `>`
    GreaterThan,
    /// Greater than or equal: `>=`
    GreaterThanOrEqual,
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparisonOperator::Equal => write!(f, "="),
            ComparisonOperator::NotEqual => write!(f, "!="),
            ComparisonOperator::LessThan => write!(f, "<"),
            ComparisonOperator::LessThanOrEqual => write!(f, "<="),
            ComparisonOperator::GreaterThan => write!(f, ">"),
            ComparisonOperator::GreaterThanOrEqual => write!(f, ">="),
        }
    }
}

/// Cardinality constraint for attributes: `[min..max]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cardinality {
    /// Minimum occurrences.
    pub min: usize,
    /// Maximum occurrences (None = unbounded `*`).
    pub max: Option<usize>,
}

impl Cardinality {
    /// Creates a cardinality constraint.
    pub fn new(min: usize, max: Option<usize>) -> Self {
        Self { min, max }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}..{}]", self.min, max),
            None => write!(f, "[{}..*]", self.min),
        }
    }
}

/// Concrete value attached to an attribute comparison: `#250`, `#"text"`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConcreteValue {
    /// Integer value: `#250`
    Integer(i64),
    /// Decimal value: `#3.14`
    Decimal(f64),
    /// String value: `#"text"`
    String(String),
}

impl std::fmt::Display for ConcreteValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConcreteValue::Integer(n) => write!(f, "#{}", n),
            ConcreteValue::Decimal(n) => write!(f, "#{}", n),
            ConcreteValue::String(s) => write!(f, "#\"{}\"", s),
        }
    }
}

/// A single attribute constraint within a refinement.
///
/// Example: `363698007 |Finding site| = << 39057004 |Pulmonary structure|`
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeConstraint {
    /// Optional cardinality constraint.
    pub cardinality: Option<Cardinality>,
    /// Whether the attribute reverses the relationship direction (`R`).
    pub reverse: bool,
    /// The attribute name (relationship type expression).
    pub attribute_type: Box<EclExpression>,
    /// Comparison operator between attribute and value.
    pub operator: ComparisonOperator,
    /// The target value: an expression or a concrete value.
    pub value: Box<EclExpression>,
}

impl std::fmt::Display for AttributeConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref card) = self.cardinality {
            write!(f, "{} ", card)?;
        }
        if self.reverse {
            write!(f, "R ")?;
        }
        write!(f, "{} {} {}", self.attribute_type, self.operator, self.value)
    }
}

/// A group of attribute constraints scoped to one relationship group.
///
/// Example: `{ 363698007 = << 39057004, 116676008 = << 415582006 }`
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeGroup {
    /// Optional cardinality for the group itself.
    pub cardinality: Option<Cardinality>,
    /// The attribute constraints in this group.
    pub constraints: Vec<AttributeConstraint>,
}

impl std::fmt::Display for AttributeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref card) = self.cardinality {
            write!(f, "{} ", card)?;
        }
        write!(f, "{{ ")?;
        for (i, c) in self.constraints.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, " }}")
    }
}

/// Refinement clause: ungrouped attribute constraints plus attribute groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    /// Ungrouped attribute constraints (AND-combined).
    pub ungrouped: Vec<AttributeConstraint>,
    /// Grouped attribute constraints.
    pub groups: Vec<AttributeGroup>,
}

impl std::fmt::Display for Refinement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for c in &self.ungrouped {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
            first = false;
        }
        for g in &self.groups {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", g)?;
            first = false;
        }
        Ok(())
    }
}

// =============================================================================
// Expression constraints
// =============================================================================

/// Abstract Syntax Tree for ECL expression constraints.
///
/// One variant per grammatical category of the constraint language, so that a
/// recursive visitor can match exhaustively; a new grammar shape is a
/// compile-time error at every match site rather than a silently skipped node.
#[derive(Debug, Clone, PartialEq)]
pub enum EclExpression {
    /// A single concept reference: `404684003` or `404684003 |Clinical finding|`.
    ConceptReference {
        /// The SNOMED CT concept ID.
        concept_id: SctId,
        /// Optional term in pipe notation.
        term: Option<String>,
    },

    /// Descendants of a concept: `< expr`
    DescendantOf(Box<EclExpression>),

    /// Descendants or self: `<< expr`
    DescendantOrSelfOf(Box<EclExpression>),

    /// Direct children: `<! expr`
    ChildOf(Box<EclExpression>),

    /// Direct children or self: `<<! expr`
    ChildOrSelfOf(Box<EclExpression>),

    /// Ancestors of a concept: `> expr`
    AncestorOf(Box<EclExpression>),

    /// Ancestors or self: `>> expr`
    AncestorOrSelfOf(Box<EclExpression>),

    /// Direct parents: `>! expr`
    ParentOf(Box<EclExpression>),

    /// Direct parents or self: `>>! expr`
    ParentOrSelfOf(Box<EclExpression>),

    /// Reference set membership: `^ 700043003` or `^ (expr)`.
    ///
    /// The target is usually a concept reference but the grammar also allows
    /// a wildcard or a nested expression.
    MemberOf(Box<EclExpression>),

    /// Wildcard matching any concept: `*`
    Any,

    /// Conjunction: `expr AND expr`
    And(Box<EclExpression>, Box<EclExpression>),

    /// Disjunction: `expr OR expr`
    Or(Box<EclExpression>, Box<EclExpression>),

    /// Exclusion: `expr MINUS expr`
    Minus(Box<EclExpression>, Box<EclExpression>),

    /// Parenthesised sub-expression.
    Nested(Box<EclExpression>),

    /// Refined expression: `focus : refinement`
    Refined {
        /// The focus expression.
        focus: Box<EclExpression>,
        /// The refinement clause.
        refinement: Refinement,
    },

    /// Dot notation attribute walk: `expr . attributeType`
    DotNotation {
        /// The source expression.
        source: Box<EclExpression>,
        /// The attribute type to follow.
        attribute_type: Box<EclExpression>,
    },

    /// Concrete value on the right-hand side of an attribute comparison.
    Concrete(ConcreteValue),

    /// Expression with one or more `{{ … }}` filter blocks attached.
    ///
    /// Filter interiors are kept verbatim: filters are evaluated by the
    /// terminology service, never locally, so the tree only has to carry them
    /// through unchanged.
    Filtered {
        /// The filtered expression.
        expression: Box<EclExpression>,
        /// Raw interior of each `{{ … }}` block, in order.
        filters: Vec<String>,
    },
}

impl EclExpression {
    /// Creates a concept reference without a term.
    pub fn concept(id: SctId) -> Self {
        EclExpression::ConceptReference {
            concept_id: id,
            term: None,
        }
    }

    /// Creates a concept reference with a term.
    pub fn concept_with_term(id: SctId, term: impl Into<String>) -> Self {
        EclExpression::ConceptReference {
            concept_id: id,
            term: Some(term.into()),
        }
    }

    /// Creates a member-of expression targeting a concept reference.
    pub fn member_of(refset_id: SctId) -> Self {
        EclExpression::MemberOf(Box::new(EclExpression::concept(refset_id)))
    }

    /// Creates a descendant-or-self-of expression.
    pub fn descendant_or_self_of(inner: EclExpression) -> Self {
        EclExpression::DescendantOrSelfOf(Box::new(inner))
    }

    /// Creates an AND expression.
    pub fn and(left: EclExpression, right: EclExpression) -> Self {
        EclExpression::And(Box::new(left), Box::new(right))
    }

    /// Creates an OR expression.
    pub fn or(left: EclExpression, right: EclExpression) -> Self {
        EclExpression::Or(Box::new(left), Box::new(right))
    }

    /// Creates a MINUS expression.
    pub fn minus(left: EclExpression, right: EclExpression) -> Self {
        EclExpression::Minus(Box::new(left), Box::new(right))
    }

    /// Returns the concept ID if this is a simple concept reference.
    pub fn as_concept_id(&self) -> Option<SctId> {
        match self {
            EclExpression::ConceptReference { concept_id, .. } => Some(*concept_id),
            _ => None,
        }
    }

    /// Strips parentheses, returning the innermost expression.
    pub fn unwrap_nested(&self) -> &EclExpression {
        match self {
            EclExpression::Nested(inner) => inner.unwrap_nested(),
            other => other,
        }
    }
}

impl std::fmt::Display for EclExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EclExpression::ConceptReference { concept_id, term } => {
                if let Some(t) = term {
                    write!(f, "{} |{}|", concept_id, t)
                } else {
                    write!(f, "{}", concept_id)
                }
            }
            EclExpression::DescendantOf(inner) => write!(f, "< {}", inner),
            EclExpression::DescendantOrSelfOf(inner) => write!(f, "<< {}", inner),
            EclExpression::ChildOf(inner) => write!(f, "<! {}", inner),
            EclExpression::ChildOrSelfOf(inner) => write!(f, "<<! {}", inner),
            EclExpression::AncestorOf(inner) => write!(f, "> {}", inner),
            EclExpression::AncestorOrSelfOf(inner) => write!(f, ">> {}", inner),
            EclExpression::ParentOf(inner) => write!(f, ">! {}", inner),
            EclExpression::ParentOrSelfOf(inner) => write!(f, ">>! {}", inner),
            EclExpression::MemberOf(target) => write!(f, "^ {}", target),
            EclExpression::Any => write!(f, "*"),
            EclExpression::And(left, right) => write!(f, "{} AND {}", left, right),
            EclExpression::Or(left, right) => write!(f, "{} OR {}", left, right),
            EclExpression::Minus(left, right) => write!(f, "{} MINUS {}", left, right),
            EclExpression::Nested(inner) => write!(f, "({})", inner),
            EclExpression::Refined { focus, refinement } => {
                write!(f, "{} : {}", focus, refinement)
            }
            EclExpression::DotNotation {
                source,
                attribute_type,
            } => write!(f, "{} . {}", source, attribute_type),
            EclExpression::Concrete(value) => write!(f, "{}", value),
            EclExpression::Filtered {
                expression,
                filters,
            } => {
                write!(f, "{}", expression)?;
                for filter in filters {
                    write!(f, " {{{{ {} }}}}", filter)?;
                }
                Ok(())
            }
        }
    }
}
