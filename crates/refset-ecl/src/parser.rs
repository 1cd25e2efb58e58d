//! ECL parser implementation using nom.
//!
//! Parses the subset of the Expression Constraint Language used by formula
//! driven reference sets: concept references, hierarchy operators, member-of,
//! compound operators, refinements, dot notation and `{{ … }}` filter blocks.
//! Filter interiors are captured verbatim; they are evaluated remotely.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_until, take_while},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, opt, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::{
    AttributeConstraint, AttributeGroup, Cardinality, ComparisonOperator, ConcreteValue,
    EclExpression, Refinement,
};
use crate::error::{EclError, EclResult};
use crate::SctId;

/// Parse an ECL expression string into its AST.
///
/// # Examples
///
/// ```rust
/// use refset_ecl::parse;
///
/// let expr = parse("<< 404684003 |Clinical finding|").unwrap();
/// let expr = parse("(^ 32570271000036106) MINUS (^ 929360051000036108)").unwrap();
/// ```
pub fn parse(input: &str) -> EclResult<EclExpression> {
    let input = input.trim();
    if input.is_empty() {
        return Err(EclError::Empty);
    }

    match all_consuming(expression_constraint)(input) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let position = input.len() - e.input.len();
            Err(EclError::Parse {
                position,
                message: format!("unexpected input at: '{}'", truncate(e.input, 24)),
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(EclError::Incomplete("expression".to_string())),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// ============================================================================
// Top-level expression constraint
// ============================================================================

fn expression_constraint(input: &str) -> IResult<&str, EclExpression> {
    delimited(ws, compound_expression, ws)(input)
}

fn compound_expression(input: &str) -> IResult<&str, EclExpression> {
    // A refinement binds tighter than AND/OR/MINUS, so the first operand may
    // carry one; operands after an operator are plain sub-expressions.
    let (input, first) = refined_expression(input)?;
    compound_tail(input, first)
}

fn compound_tail(input: &str, left: EclExpression) -> IResult<&str, EclExpression> {
    // Word operators need preceding whitespace, the comma form does not.
    let attempt: IResult<&str, CompoundOp> = alt((
        preceded(mws, word_compound_operator),
        preceded(ws, comma_operator),
    ))(input);

    match attempt {
        Ok((rest, op)) => {
            let (rest, right) = preceded(ws, sub_expression)(rest)?;
            let combined = match op {
                CompoundOp::And => EclExpression::And(Box::new(left), Box::new(right)),
                CompoundOp::Or => EclExpression::Or(Box::new(left), Box::new(right)),
                CompoundOp::Minus => EclExpression::Minus(Box::new(left), Box::new(right)),
            };
            // Left associative: keep folding further operators into `combined`.
            compound_tail(rest, combined)
        }
        Err(_) => Ok((input, left)),
    }
}

#[derive(Debug, Clone, Copy)]
enum CompoundOp {
    And,
    Or,
    Minus,
}

fn word_compound_operator(input: &str) -> IResult<&str, CompoundOp> {
    alt((
        value(CompoundOp::And, tag_no_case("AND")),
        value(CompoundOp::Or, tag_no_case("OR")),
        value(CompoundOp::Minus, tag_no_case("MINUS")),
    ))(input)
}

fn comma_operator(input: &str) -> IResult<&str, CompoundOp> {
    value(CompoundOp::And, char(','))(input)
}

// ============================================================================
// Refined expression
// ============================================================================

fn refined_expression(input: &str) -> IResult<&str, EclExpression> {
    let (input, focus) = sub_expression(input)?;

    let attempt: IResult<&str, Refinement> =
        preceded(tuple((ws, char(':'), ws)), refinement_clause)(input);

    match attempt {
        Ok((rest, refinement)) => Ok((
            rest,
            EclExpression::Refined {
                focus: Box::new(focus),
                refinement,
            },
        )),
        Err(_) => Ok((input, focus)),
    }
}

// ============================================================================
// Sub-expression constraint
// ============================================================================

fn sub_expression(input: &str) -> IResult<&str, EclExpression> {
    let (input, expr) = base_expression(input)?;
    let (input, expr) = dot_tail(input, expr)?;
    filter_tail(input, expr)
}

fn base_expression(input: &str) -> IResult<&str, EclExpression> {
    alt((
        parenthesised,
        hierarchy_expression,
        member_of_expression,
        wildcard,
        concept_reference,
    ))(input)
}

fn parenthesised(input: &str) -> IResult<&str, EclExpression> {
    map(
        delimited(
            pair(char('('), ws),
            compound_expression,
            pair(ws, char(')')),
        ),
        |inner| EclExpression::Nested(Box::new(inner)),
    )(input)
}

fn hierarchy_expression(input: &str) -> IResult<&str, EclExpression> {
    let (input, op) = hierarchy_operator(input)?;
    let (input, _) = ws(input)?;
    let (input, inner) = base_expression(input)?;

    let expr = match op {
        HierarchyOp::DescendantOf => EclExpression::DescendantOf(Box::new(inner)),
        HierarchyOp::DescendantOrSelfOf => EclExpression::DescendantOrSelfOf(Box::new(inner)),
        HierarchyOp::ChildOf => EclExpression::ChildOf(Box::new(inner)),
        HierarchyOp::ChildOrSelfOf => EclExpression::ChildOrSelfOf(Box::new(inner)),
        HierarchyOp::AncestorOf => EclExpression::AncestorOf(Box::new(inner)),
        HierarchyOp::AncestorOrSelfOf => EclExpression::AncestorOrSelfOf(Box::new(inner)),
        HierarchyOp::ParentOf => EclExpression::ParentOf(Box::new(inner)),
        HierarchyOp::ParentOrSelfOf => EclExpression::ParentOrSelfOf(Box::new(inner)),
    };

    Ok((input, expr))
}

#[derive(Debug, Clone, Copy)]
enum HierarchyOp {
    DescendantOf,
    DescendantOrSelfOf,
    ChildOf,
    ChildOrSelfOf,
    AncestorOf,
    AncestorOrSelfOf,
    ParentOf,
    ParentOrSelfOf,
}

fn hierarchy_operator(input: &str) -> IResult<&str, HierarchyOp> {
    alt((
        // Longest operators first.
        value(HierarchyOp::ChildOrSelfOf, tag("<<!")),
        value(HierarchyOp::DescendantOrSelfOf, tag("<<")),
        value(HierarchyOp::ChildOf, tag("<!")),
        value(HierarchyOp::DescendantOf, tag("<")),
        value(HierarchyOp::ParentOrSelfOf, tag(">>!")),
        value(HierarchyOp::AncestorOrSelfOf, tag(">>")),
        value(HierarchyOp::ParentOf, tag(">!")),
        value(HierarchyOp::AncestorOf, tag(">")),
    ))(input)
}

fn member_of_expression(input: &str) -> IResult<&str, EclExpression> {
    let (input, _) = char('^')(input)?;
    let (input, _) = ws(input)?;
    let (input, target) = alt((wildcard, concept_reference, parenthesised))(input)?;
    Ok((input, EclExpression::MemberOf(Box::new(target))))
}

// ============================================================================
// Focus concepts
// ============================================================================

fn wildcard(input: &str) -> IResult<&str, EclExpression> {
    value(EclExpression::Any, char('*'))(input)
}

fn concept_reference(input: &str) -> IResult<&str, EclExpression> {
    let (input, id) = sct_id(input)?;
    let (input, term) = opt(preceded(ws, term_in_pipes))(input)?;

    Ok((
        input,
        EclExpression::ConceptReference {
            concept_id: id,
            term,
        },
    ))
}

fn sct_id(input: &str) -> IResult<&str, SctId> {
    let (input, digits) = digit1(input)?;
    match digits.parse::<SctId>() {
        Ok(id) => Ok((input, id)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

fn term_in_pipes(input: &str) -> IResult<&str, String> {
    let (input, _) = char('|')(input)?;
    let (input, term) = take_while(|c| c != '|')(input)?;
    let (input, _) = char('|')(input)?;

    Ok((input, term.trim().to_string()))
}

// ============================================================================
// Dot notation and filters
// ============================================================================

fn dot_tail(input: &str, left: EclExpression) -> IResult<&str, EclExpression> {
    let mut input = input;
    let mut expr = left;
    loop {
        let attempt: IResult<&str, EclExpression> = preceded(
            tuple((ws, char('.'), ws)),
            alt((wildcard, concept_reference)),
        )(input);
        match attempt {
            Ok((rest, attribute_type)) => {
                expr = EclExpression::DotNotation {
                    source: Box::new(expr),
                    attribute_type: Box::new(attribute_type),
                };
                input = rest;
            }
            Err(_) => return Ok((input, expr)),
        }
    }
}

fn filter_tail(input: &str, expr: EclExpression) -> IResult<&str, EclExpression> {
    let (input, filters) = many0(preceded(ws, filter_block))(input)?;
    if filters.is_empty() {
        Ok((input, expr))
    } else {
        Ok((
            input,
            EclExpression::Filtered {
                expression: Box::new(expr),
                filters,
            },
        ))
    }
}

/// One `{{ … }}` block; the interior is kept verbatim (trimmed).
fn filter_block(input: &str) -> IResult<&str, String> {
    let (input, _) = tag("{{")(input)?;
    let (input, interior) = take_until("}}")(input)?;
    let (input, _) = tag("}}")(input)?;
    Ok((input, interior.trim().to_string()))
}

// ============================================================================
// Refinements
// ============================================================================

fn cardinality(input: &str) -> IResult<&str, Cardinality> {
    let (input, _) = char('[')(input)?;
    let (input, _) = ws(input)?;
    let (input, min) = map(digit1, |s: &str| s.parse::<usize>().unwrap_or(0))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = tag("..")(input)?;
    let (input, _) = ws(input)?;
    let (input, max) = alt((
        map(char('*'), |_| None),
        map(digit1, |s: &str| Some(s.parse::<usize>().unwrap_or(0))),
    ))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(']')(input)?;
    Ok((input, Cardinality::new(min, max)))
}

enum RefinementItem {
    Constraint(AttributeConstraint),
    Group(AttributeGroup),
}

fn refinement_clause(input: &str) -> IResult<&str, Refinement> {
    let (input, items) = separated_list1(
        preceded(ws, char(',')),
        preceded(ws, refinement_item),
    )(input)?;

    let mut refinement = Refinement {
        ungrouped: Vec::new(),
        groups: Vec::new(),
    };
    for item in items {
        match item {
            RefinementItem::Constraint(c) => refinement.ungrouped.push(c),
            RefinementItem::Group(g) => refinement.groups.push(g),
        }
    }
    Ok((input, refinement))
}

fn refinement_item(input: &str) -> IResult<&str, RefinementItem> {
    alt((
        map(attribute_group, RefinementItem::Group),
        map(attribute_constraint, RefinementItem::Constraint),
    ))(input)
}

fn attribute_group(input: &str) -> IResult<&str, AttributeGroup> {
    let (input, cardinality) = opt(terminated(cardinality, ws))(input)?;
    let (input, _) = char('{')(input)?;
    let (input, _) = ws(input)?;
    let (input, constraints) = separated_list1(
        preceded(ws, char(',')),
        preceded(ws, attribute_constraint),
    )(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char('}')(input)?;

    Ok((
        input,
        AttributeGroup {
            cardinality,
            constraints,
        },
    ))
}

fn attribute_constraint(input: &str) -> IResult<&str, AttributeConstraint> {
    let (input, cardinality) = opt(terminated(cardinality, ws))(input)?;
    let (input, reverse) = opt(terminated(tag_no_case("R"), mws))(input)?;
    let (input, attribute_type) = attribute_name(input)?;
    let (input, _) = ws(input)?;
    let (input, (operator, value_expr)) = attribute_comparison(input)?;

    Ok((
        input,
        AttributeConstraint {
            cardinality,
            reverse: reverse.is_some(),
            attribute_type: Box::new(attribute_type),
            operator,
            value: Box::new(value_expr),
        },
    ))
}

fn attribute_name(input: &str) -> IResult<&str, EclExpression> {
    alt((
        hierarchy_expression,
        wildcard,
        concept_reference,
        parenthesised,
    ))(input)
}

fn attribute_comparison(input: &str) -> IResult<&str, (ComparisonOperator, EclExpression)> {
    alt((
        // Ordering operators only ever compare concrete values.
        pair(ordering_operator, preceded(ws, concrete_expression)),
        // Equality operators take a concrete value or an expression.
        pair(
            equality_operator,
            preceded(ws, alt((concrete_expression, sub_expression))),
        ),
    ))(input)
}

fn ordering_operator(input: &str) -> IResult<&str, ComparisonOperator> {
    alt((
        value(ComparisonOperator::LessThanOrEqual, tag("<=")),
        value(ComparisonOperator::GreaterThanOrEqual, tag(">=")),
        value(ComparisonOperator::LessThan, char('<')),
        value(ComparisonOperator::GreaterThan, char('>')),
    ))(input)
}

fn equality_operator(input: &str) -> IResult<&str, ComparisonOperator> {
    alt((
        value(ComparisonOperator::NotEqual, tag("!=")),
        value(ComparisonOperator::Equal, char('=')),
    ))(input)
}

fn concrete_expression(input: &str) -> IResult<&str, EclExpression> {
    map(concrete_value, EclExpression::Concrete)(input)
}

fn concrete_value(input: &str) -> IResult<&str, ConcreteValue> {
    let (input, _) = char('#')(input)?;

    alt((
        map(
            delimited(char('"'), take_until("\""), char('"')),
            |s: &str| ConcreteValue::String(s.to_string()),
        ),
        map(
            recognize(tuple((
                opt(char('-')),
                digit1,
                opt(pair(char('.'), digit1)),
            ))),
            |s: &str| {
                if s.contains('.') {
                    ConcreteValue::Decimal(s.parse().unwrap_or(0.0))
                } else {
                    ConcreteValue::Integer(s.parse().unwrap_or(0))
                }
            },
        ),
    ))(input)
}

// ============================================================================
// Whitespace handling
// ============================================================================

/// Optional whitespace.
fn ws(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}

/// Mandatory whitespace.
fn mws(input: &str) -> IResult<&str, &str> {
    multispace1(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EclExpression as E;

    #[test]
    fn test_parse_concept_reference() {
        assert_eq!(parse("404684003").unwrap(), E::concept(404684003));
    }

    #[test]
    fn test_parse_concept_with_term() {
        assert_eq!(
            parse("404684003 |Clinical finding|").unwrap(),
            E::concept_with_term(404684003, "Clinical finding")
        );
    }

    #[test]
    fn test_parse_descendant_or_self() {
        assert_eq!(
            parse("<< 404684003").unwrap(),
            E::descendant_or_self_of(E::concept(404684003))
        );
    }

    #[test]
    fn test_parse_member_of() {
        assert_eq!(parse("^ 700043003").unwrap(), E::member_of(700043003));
    }

    #[test]
    fn test_parse_member_of_with_term() {
        let expr = parse("^ 700043003 |Problem list|").unwrap();
        assert_eq!(
            expr,
            E::MemberOf(Box::new(E::concept_with_term(700043003, "Problem list")))
        );
    }

    #[test]
    fn test_parse_minus_of_parenthesised() {
        let expr = parse("(<< 404684003) MINUS (^ 700043003)").unwrap();
        match expr {
            E::Minus(left, right) => {
                assert_eq!(
                    *left,
                    E::Nested(Box::new(E::descendant_or_self_of(E::concept(404684003))))
                );
                assert_eq!(*right, E::Nested(Box::new(E::member_of(700043003))));
            }
            other => panic!("expected MINUS, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_compound_is_left_associative() {
        let expr = parse("1 AND 2 OR 3").unwrap();
        assert_eq!(
            expr,
            E::or(E::and(E::concept(1), E::concept(2)), E::concept(3))
        );
    }

    #[test]
    fn test_parse_comma_means_and() {
        let expr = parse("(1) , (2)").unwrap();
        assert!(matches!(expr, E::And(_, _)));
    }

    #[test]
    fn test_parse_refinement() {
        let expr = parse("< 19829001 : 116676008 = << 79654002").unwrap();
        match expr {
            E::Refined { focus, refinement } => {
                assert_eq!(*focus, E::DescendantOf(Box::new(E::concept(19829001))));
                assert_eq!(refinement.ungrouped.len(), 1);
                assert!(refinement.groups.is_empty());
                let constraint = &refinement.ungrouped[0];
                assert_eq!(constraint.operator, ComparisonOperator::Equal);
                assert_eq!(
                    *constraint.value,
                    E::descendant_or_self_of(E::concept(79654002))
                );
            }
            other => panic!("expected refined expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_attribute_group() {
        let expr =
            parse("< 404684003 : { 363698007 = << 39057004, 116676008 = << 415582006 }").unwrap();
        match expr {
            E::Refined { refinement, .. } => {
                assert!(refinement.ungrouped.is_empty());
                assert_eq!(refinement.groups.len(), 1);
                assert_eq!(refinement.groups[0].constraints.len(), 2);
            }
            other => panic!("expected refined expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_cardinality_and_reverse() {
        let expr = parse("< 404684003 : [1..*] R 363698007 = *").unwrap();
        match expr {
            E::Refined { refinement, .. } => {
                let constraint = &refinement.ungrouped[0];
                assert_eq!(constraint.cardinality, Some(Cardinality::new(1, None)));
                assert!(constraint.reverse);
                assert_eq!(*constraint.value, E::Any);
            }
            other => panic!("expected refined expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_concrete_value_comparison() {
        let expr = parse("< 27658006 : 1142135004 >= #500").unwrap();
        match expr {
            E::Refined { refinement, .. } => {
                let constraint = &refinement.ungrouped[0];
                assert_eq!(constraint.operator, ComparisonOperator::GreaterThanOrEqual);
                assert_eq!(*constraint.value, E::Concrete(ConcreteValue::Integer(500)));
            }
            other => panic!("expected refined expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_dot_notation() {
        let expr = parse("(< 125605004) . 363698007").unwrap();
        assert!(matches!(expr, E::DotNotation { .. }));
    }

    #[test]
    fn test_parse_filter_block_kept_verbatim() {
        let expr = parse("^ 929360051000036108 {{ C active = 0 }}").unwrap();
        match expr {
            E::Filtered {
                expression,
                filters,
            } => {
                assert_eq!(*expression, E::member_of(929360051000036108));
                assert_eq!(filters, vec!["C active = 0".to_string()]);
            }
            other => panic!("expected filtered expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_chained_filter_blocks() {
        let expr = parse("< 64572001 {{ term = \"heart\" }} {{ language = en }}").unwrap();
        match expr {
            E::Filtered { filters, .. } => assert_eq!(filters.len(), 2),
            other => panic!("expected filtered expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert_eq!(parse("   "), Err(EclError::Empty));
    }

    #[test]
    fn test_parse_garbage_reports_position() {
        let err = parse("<< 404684003 nonsense").unwrap_err();
        assert!(matches!(err, EclError::Parse { .. }));
    }

    #[test]
    fn test_parse_display_round_trip() {
        for ecl in [
            "<< 404684003 |Clinical finding|",
            "(^ 32570271000036106) MINUS (^ 929360051000036108)",
            "^ 929360051000036108 {{ C active = 0 }}",
            "< 19829001 : 116676008 = << 79654002",
        ] {
            let expr = parse(ecl).unwrap();
            let rendered = expr.to_string();
            assert_eq!(parse(&rendered).unwrap(), expr, "round trip for {}", ecl);
        }
    }
}
