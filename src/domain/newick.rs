//! Newick parsing into a [`PhyloTree`].
//!
//! Supports nested children, unquoted and single-quoted labels, optional
//! `:length` suffixes and free whitespace. Unnamed internal nodes are named
//! `edge.N` in post-order; an unnamed root becomes `root`.

use generational_arena::Index;
use nom::branch::alt;
use nom::bytes::complete::{is_not, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{all_consuming, map, opt};
use nom::error::ParseError;
use nom::multi::separated_list1;
use nom::number::complete::double;
use nom::sequence::{delimited, preceded, terminated};
use nom::{IResult, Parser};
use tracing::{debug, instrument};

use crate::domain::arena::{NodeData, PhyloTree};
use crate::domain::error::{DomainError, DomainResult};

const ROOT_NAME: &str = "root";

/// Deepest parenthesis nesting accepted; the combinators below recurse once per level.
pub const MAX_NESTING: usize = 1024;

#[derive(Debug)]
struct RawNode {
    name: Option<String>,
    length: Option<f64>,
    children: Vec<RawNode>,
}

/// A parsed node addressed by its preorder position.
#[derive(Debug)]
struct FlatNode {
    name: Option<String>,
    length: Option<f64>,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// A combinator that takes a parser `inner` and produces a parser that also consumes both leading and
/// trailing whitespace, returning the output of `inner`.
fn ws<'a, F, O, E: ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where
    F: Parser<&'a str, O, E>,
{
    delimited(multispace0, inner, multispace0)
}

fn unquoted(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| !"(),:;[]'".contains(c) && !c.is_whitespace()),
        |s: &str| s.to_string(),
    )(input)
}

fn quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('\''), opt(is_not("'")), char('\'')),
        |s: Option<&str>| s.unwrap_or_default().to_string(),
    )(input)
}

fn label(input: &str) -> IResult<&str, String> {
    alt((quoted, unquoted))(input)
}

fn branch_length(input: &str) -> IResult<&str, f64> {
    preceded(ws(char(':')), double)(input)
}

fn subtree(input: &str) -> IResult<&str, RawNode> {
    let (input, children) = opt(delimited(
        ws(char('(')),
        separated_list1(ws(char(',')), subtree),
        ws(char(')')),
    ))(input)?;
    let (input, name) = opt(label)(input)?;
    let (input, length) = opt(branch_length)(input)?;
    Ok((
        input,
        RawNode {
            name: name.filter(|n| !n.is_empty()),
            length,
            children: children.unwrap_or_default(),
        },
    ))
}

/// Parses newick text; the trailing `;` is optional.
#[instrument(level = "debug", skip(text))]
pub fn parse_newick(text: &str) -> DomainResult<PhyloTree> {
    let depth = nesting_depth(text);
    if depth > MAX_NESTING {
        return Err(DomainError::InvalidTree(format!(
            "nesting depth {depth} exceeds {MAX_NESTING}"
        )));
    }

    let result = all_consuming(terminated(ws(subtree), opt(ws(char(';')))))(text);
    let raw = match result {
        Ok((_, raw)) => raw,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            return Err(DomainError::NewickParse {
                position: text.len() - e.input.len(),
                message: format!("unexpected input near {:?}", preview(e.input)),
            })
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(DomainError::NewickParse {
                position: text.len(),
                message: "incomplete input".to_string(),
            })
        }
    };

    let mut nodes = flatten(raw);
    assign_names(&mut nodes)?;

    let mut tree = PhyloTree::new();
    let mut indices: Vec<Index> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let data = NodeData::new(node.name.unwrap_or_default()).with_length(node.length);
        let parent = node.parent.map(|p| indices[p]);
        indices.push(tree.insert_node(data, parent)?);
    }
    tree.validate()?;
    debug!(
        "parsed newick: {} nodes, {} tips, nesting {}",
        tree.len(),
        tree.tips().len(),
        depth
    );
    Ok(tree)
}

/// Deepest unquoted parenthesis nesting in `text`.
fn nesting_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0;
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            ')' if !quoted => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

fn preview(input: &str) -> String {
    input.chars().take(16).collect()
}

/// Unnests the parse result into preorder; children keep their order.
fn flatten(raw: RawNode) -> Vec<FlatNode> {
    let mut nodes: Vec<FlatNode> = Vec::new();
    let mut stack: Vec<(RawNode, Option<usize>)> = vec![(raw, None)];
    while let Some((mut raw, parent)) = stack.pop() {
        let id = nodes.len();
        if let Some(p) = parent {
            nodes[p].children.push(id);
        }
        let children = std::mem::take(&mut raw.children);
        stack.extend(children.into_iter().rev().map(|child| (child, Some(id))));
        nodes.push(FlatNode {
            name: raw.name,
            length: raw.length,
            parent,
            children: Vec::new(),
        });
    }
    nodes
}

/// Names unnamed internal nodes `edge.N` in post-order; node 0 is the root.
fn assign_names(nodes: &mut [FlatNode]) -> DomainResult<()> {
    let mut counter = 0;
    let mut stack = vec![(0usize, false)];
    while let Some((id, expanded)) = stack.pop() {
        if !expanded {
            stack.push((id, true));
            stack.extend(nodes[id].children.iter().rev().map(|&c| (c, false)));
            continue;
        }
        let node = &mut nodes[id];
        if node.name.is_some() {
            continue;
        }
        if node.children.is_empty() {
            return Err(DomainError::InvalidTree("unnamed tip".to_string()));
        }
        node.name = Some(if id == 0 {
            ROOT_NAME.to_string()
        } else {
            let name = format!("edge.{counter}");
            counter += 1;
            name
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn given_named_tree_when_parsing_then_names_kept() {
        let tree = parse_newick("((A,B)X,(C,D)Y)root;").unwrap();
        assert_eq!(tree.tip_names(), vec!["A", "B", "C", "D"]);
        assert_eq!(tree.internal_names(), vec!["root", "X", "Y"]);
    }

    #[rstest]
    #[case("((A,B),(C,D));", vec!["root", "edge.0", "edge.1"])]
    #[case("(A,B,(C,(D,E)));", vec!["root", "edge.1", "edge.0"])]
    fn given_unnamed_internals_when_parsing_then_numbered_in_postorder(
        #[case] newick: &str,
        #[case] expected: Vec<&str>,
    ) {
        let tree = parse_newick(newick).unwrap();
        assert_eq!(tree.internal_names(), expected);
    }

    #[test]
    fn given_lengths_and_whitespace_when_parsing_then_lengths_recorded() {
        let tree = parse_newick(" ( A:0.1 , B:2e-1 , 'long name':1 ) ;").unwrap();
        let a = tree.node_index("A").unwrap();
        assert_eq!(tree.get_node(a).unwrap().data.length, Some(0.1));
        let b = tree.node_index("B").unwrap();
        assert_eq!(tree.get_node(b).unwrap().data.length, Some(0.2));
        assert!(tree.node_index("long name").is_ok());
    }

    #[test]
    fn given_missing_semicolon_when_parsing_then_accepted() {
        assert!(parse_newick("(A,B,C)").is_ok());
    }

    #[rstest]
    #[case("((A,B)X,(C,D)Y")]
    #[case("(A,B));")]
    #[case("(A,B)X;junk")]
    fn given_malformed_newick_when_parsing_then_parse_error(#[case] newick: &str) {
        assert!(matches!(
            parse_newick(newick),
            Err(DomainError::NewickParse { .. })
        ));
    }

    #[test]
    fn given_unnamed_tip_when_parsing_then_invalid() {
        assert!(matches!(
            parse_newick("(A,,C);"),
            Err(DomainError::InvalidTree(_))
        ));
    }

    #[test]
    fn given_duplicate_names_when_parsing_then_rejected() {
        assert_eq!(
            parse_newick("(A,A,B);").unwrap_err(),
            DomainError::DuplicateNode("A".to_string())
        );
    }

    fn caterpillar(n: usize) -> String {
        let mut newick = "(T0,T1)N1".to_string();
        for i in 2..=n {
            newick = format!("({newick},T{i})N{i}");
        }
        newick + ";"
    }

    #[test]
    fn given_deep_caterpillar_when_parsing_then_built_without_recursion() {
        let tree = parse_newick(&caterpillar(300)).unwrap();
        assert_eq!(tree.len(), 601);
        assert_eq!(tree.tips().len(), 301);
        assert_eq!(tree.ancestors(tree.node_index("T0").unwrap()).len(), 300);
        assert_eq!(parse_newick(&tree.to_newick()).unwrap().len(), 601);
    }

    #[test]
    fn given_nesting_beyond_limit_when_parsing_then_rejected_before_parsing() {
        let err = parse_newick(&caterpillar(MAX_NESTING + 1)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTree(ref m) if m.contains("nesting depth")));
    }

    #[rstest]
    #[case("((A,B)X,C);", 2)]
    #[case("('a(b',B,C);", 1)]
    #[case("A;", 0)]
    fn given_text_when_measuring_nesting_then_quoted_parens_ignored(
        #[case] newick: &str,
        #[case] expected: usize,
    ) {
        assert_eq!(nesting_depth(newick), expected);
    }
}
