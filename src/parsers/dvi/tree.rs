//! Parser for the nested-bracket DVI mini-language.
//!
//! Starting from the literal `[DVI]` line, each line either opens a node
//! (`[[Name]]`-style, nesting depth given by the number of leading `[`
//! characters) or contributes a `tag = value` data pair to the deepest open
//! node. The result is a tree addressed by name-path, which lets the
//! interpreter walk named subtrees declaratively instead of positionally.

use indexmap::IndexMap;

use crate::cursor::LineStream;
use crate::error::FamError;

/// One node of the DVI bracket tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DviNode {
    pub name: String,
    /// `tag = value` pairs, in file order.
    pub data: Vec<(String, String)>,
    pub children: IndexMap<String, DviNode>,
}

impl DviNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
            children: IndexMap::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&DviNode> {
        self.children.get(name)
    }

    /// Walk a name-path below this node.
    pub fn get(&self, path: &[&str]) -> Option<&DviNode> {
        let mut node = self;
        for name in path {
            node = node.child(name)?;
        }
        Some(node)
    }

    /// The first value with tag `tag`, if any.
    pub fn value(&self, tag: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }
}

/// Classify one line of the DVI section.
enum DviLine<'a> {
    Blank,
    Open { depth: usize, name: &'a str },
    Data { tag: &'a str, value: &'a str },
}

fn classify(line: &str, lineno: usize) -> Result<DviLine<'_>, FamError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(DviLine::Blank);
    }
    if trimmed.starts_with('[') {
        let depth = trimmed.chars().take_while(|&c| c == '[').count();
        let open = &trimmed[..depth];
        let close = "]".repeat(depth);
        let name = trimmed
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close.as_str()))
            .ok_or_else(|| {
                FamError::format(lineno, "a bracket-wrapped node name", trimmed)
            })?;
        if name.contains('[') || name.contains(']') {
            return Err(FamError::format(
                lineno,
                "a bracket-wrapped node name",
                trimmed,
            ));
        }
        return Ok(DviLine::Open { depth, name });
    }
    let (tag, value) = trimmed
        .split_once('=')
        .ok_or_else(|| FamError::format(lineno, "a 'tag = value' data line", trimmed))?;
    Ok(DviLine::Data {
        tag: tag.trim(),
        value: value.trim(),
    })
}

/// Parse the DVI section beginning at 1-based position `start` (the `[DVI]`
/// line itself) through the end of the stream.
pub fn parse_dvi_tree(stream: &LineStream, start: usize) -> Result<DviNode, FamError> {
    let first = stream.get(start).unwrap_or_default();
    if first != "[DVI]" {
        return Err(FamError::format(start, "the literal line '[DVI]'", first));
    }
    let mut root = DviNode::new("DVI");
    // The open-node path below the root, by child name.
    let mut path: Vec<String> = Vec::new();

    for pos in (start + 1)..=stream.len() {
        let line = stream.get(pos).unwrap_or_default();
        match classify(line, pos)? {
            DviLine::Blank => continue,
            DviLine::Open { depth, name } => {
                if depth == 1 {
                    return Err(FamError::format(
                        pos,
                        "a nested node (the [DVI] root is unique)",
                        line,
                    ));
                }
                // A node at depth d is a child of the path truncated to d-1
                // entries (the root itself is depth 1, path entry 0).
                if depth - 2 > path.len() {
                    return Err(FamError::format(
                        pos,
                        format!("a node no deeper than level {}", path.len() + 2),
                        line,
                    ));
                }
                path.truncate(depth - 2);
                let parent = node_at_path_mut(&mut root, &path);
                if parent.children.contains_key(name) {
                    return Err(FamError::format(pos, "a unique node name", line));
                }
                parent
                    .children
                    .insert(name.to_string(), DviNode::new(name));
                path.push(name.to_string());
            }
            DviLine::Data { tag, value } => {
                let node = node_at_path_mut(&mut root, &path);
                node.data.push((tag.to_string(), value.to_string()));
            }
        }
    }
    Ok(root)
}

fn node_at_path_mut<'a>(root: &'a mut DviNode, path: &[String]) -> &'a mut DviNode {
    let mut node = root;
    for name in path {
        node = node.children.get_mut(name).expect("open path is valid");
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(lines: &[&str]) -> LineStream {
        lines.iter().copied().collect()
    }

    #[test]
    fn test_nested_tree() {
        let s = stream(&[
            "[DVI]",
            "Case = demo",
            "[[Unidentified persons]]",
            "[[[PM1]]]",
            "Name = PM1",
            "Gender = Male",
            "[[[[DNA data]]]]",
            "SystemName = VWA",
            "Allele 1 = 14",
            "Allele 2 = 15",
            "[[[PM2]]]",
            "Name = PM2",
        ]);
        let root = parse_dvi_tree(&s, 1).unwrap();
        assert_eq!(root.value("Case"), Some("demo"));

        let pm1 = root.get(&["Unidentified persons", "PM1"]).unwrap();
        assert_eq!(pm1.value("Gender"), Some("Male"));

        let dna = pm1.child("DNA data").unwrap();
        assert_eq!(
            dna.data,
            vec![
                ("SystemName".to_string(), "VWA".to_string()),
                ("Allele 1".to_string(), "14".to_string()),
                ("Allele 2".to_string(), "15".to_string()),
            ]
        );

        // PM2 closed the deeper DNA data level and opened a sibling.
        assert!(root.get(&["Unidentified persons", "PM2"]).is_some());
    }

    #[test]
    fn test_depth_truncation() {
        let s = stream(&[
            "[DVI]",
            "[[A]]",
            "[[[B]]]",
            "[[C]]",
            "tag = value",
        ]);
        let root = parse_dvi_tree(&s, 1).unwrap();
        assert!(root.get(&["A", "B"]).is_some());
        assert_eq!(root.get(&["C"]).unwrap().value("tag"), Some("value"));
        assert!(root.get(&["A", "C"]).is_none());
    }

    #[test]
    fn test_blank_lines_skipped() {
        let s = stream(&["[DVI]", "", "[[A]]", "", "x = 1"]);
        let root = parse_dvi_tree(&s, 1).unwrap();
        assert_eq!(root.get(&["A"]).unwrap().value("x"), Some("1"));
    }

    #[test]
    fn test_depth_jump_is_error() {
        let s = stream(&["[DVI]", "[[[too deep]]]"]);
        assert!(matches!(
            parse_dvi_tree(&s, 1),
            Err(FamError::FormatError { line: 2, .. })
        ));
    }

    #[test]
    fn test_unbalanced_brackets_are_error() {
        let s = stream(&["[DVI]", "[[A]"]);
        assert!(parse_dvi_tree(&s, 1).is_err());
    }

    #[test]
    fn test_data_line_without_equals_is_error() {
        let s = stream(&["[DVI]", "[[A]]", "no separator here"]);
        assert!(matches!(
            parse_dvi_tree(&s, 1),
            Err(FamError::FormatError { line: 3, .. })
        ));
    }

    #[test]
    fn test_wrong_start_line() {
        let s = stream(&["not dvi"]);
        assert!(parse_dvi_tree(&s, 1).is_err());
    }
}
