// ============================================================
// Layer 4 — Syntax-based SRD
// ============================================================
// With `use_syntax_based_SRD` the distance of a word to the
// aspect is measured in the dependency tree instead of by word
// position: build an undirected graph with one edge per
// (word, head) pair and run a breadth-first search from every
// aspect word.
//
// Parses come from a CoNLL-U file. Each sentence is looked up by
// its lowercased, space-joined word forms, so the file must be
// tokenised the same way as the dataset.

use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::Path;

use crate::data::srd::UNREACHABLE;
use crate::domain::error::{AbsaError, AbsaResult};
use crate::domain::traits::DependencyParser;

/// Tree distance from each word to the closest aspect word.
/// Words in a different component than the aspect get `UNREACHABLE`.
pub fn tree_distances(heads: &[Option<usize>], aspect: &Range<usize>) -> Vec<usize> {
    let n = heads.len();
    let mut graph = UnGraph::<(), ()>::with_capacity(n, n);
    let nodes: Vec<NodeIndex> = (0..n).map(|_| graph.add_node(())).collect();
    for (i, head) in heads.iter().enumerate() {
        if let Some(h) = *head {
            if h < n && h != i {
                graph.add_edge(nodes[i], nodes[h], ());
            }
        }
    }

    let mut best = vec![UNREACHABLE; n];
    for a in aspect.clone().filter(|a| *a < n) {
        // unit edge weights, so this is a plain BFS
        for (node, dist) in dijkstra(&graph, nodes[a], None, |_| 1usize) {
            let i = node.index();
            best[i] = best[i].min(dist);
        }
    }
    best
}

// ─── ConlluParser ─────────────────────────────────────────────────────────────
/// Pre-computed dependency parses read from a CoNLL-U file.
#[derive(Debug, Default)]
pub struct ConlluParser {
    sentences: HashMap<String, Vec<Option<usize>>>,
}

impl ConlluParser {
    pub fn from_file(path: &Path) -> AbsaResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            AbsaError::config(format!("cannot read dependency file '{}': {e}", path.display()))
        })?;
        let parser = Self::parse_str(&text)?;
        tracing::info!(
            "Loaded {} dependency parses from '{}'",
            parser.sentences.len(),
            path.display()
        );
        Ok(parser)
    }

    pub fn parse_str(text: &str) -> AbsaResult<Self> {
        let mut sentences = HashMap::new();
        let mut forms: Vec<String> = Vec::new();
        let mut heads: Vec<Option<usize>> = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                if !forms.is_empty() {
                    sentences.insert(sentence_key(&forms), std::mem::take(&mut heads));
                    forms.clear();
                }
                continue;
            }
            if line.starts_with('#') {
                continue;
            }

            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 7 {
                return Err(AbsaError::data(format!(
                    "dependency line {} has {} columns, expected at least 7",
                    lineno + 1,
                    cols.len()
                )));
            }
            // multiword tokens (1-2) and empty nodes (1.1) carry no head
            if cols[0].contains('-') || cols[0].contains('.') {
                continue;
            }
            let head: usize = cols[6].parse().map_err(|_| {
                AbsaError::data(format!("dependency line {}: bad head '{}'", lineno + 1, cols[6]))
            })?;
            forms.push(cols[1].to_string());
            heads.push(head.checked_sub(1));
        }
        if !forms.is_empty() {
            sentences.insert(sentence_key(&forms), heads);
        }

        Ok(Self { sentences })
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

impl DependencyParser for ConlluParser {
    fn heads(&self, words: &[String]) -> AbsaResult<Vec<Option<usize>>> {
        let key = sentence_key(words);
        self.sentences
            .get(&key)
            .cloned()
            .ok_or_else(|| AbsaError::data(format!("no dependency parse for sentence '{key}'")))
    }
}

fn sentence_key(words: &[String]) -> String {
    words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>().join(" ")
}
