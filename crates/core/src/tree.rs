//! Proposed folder hierarchy built from slash-delimited category paths.

use crate::report::format_size;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTree {
    pub label: String,
    /// Files at this node or anywhere below it.
    pub count: usize,
    pub size: u64,
    pub children: Vec<CategoryTree>,
}

impl CategoryTree {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Adds `count` files totalling `size` bytes under `category`.
    pub fn insert(&mut self, category: &str, count: usize, size: u64) {
        self.count += count;
        self.size += size;
        let mut node = self;
        for segment in category.split('/').filter(|s| !s.is_empty()) {
            let idx = match node.children.iter().position(|c| c.label == segment) {
                Some(i) => i,
                None => {
                    node.children.push(CategoryTree::new(segment));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx];
            node.count += count;
            node.size += size;
        }
    }

    /// Orders children by count descending, then label, at every level.
    pub fn sort(&mut self) {
        self.children
            .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        for child in &mut self.children {
            child.sort();
        }
    }

    pub fn find(&self, category: &str) -> Option<&CategoryTree> {
        category
            .split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, segment| {
                node.children.iter().find(|c| c.label == segment)
            })
    }

    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.label);
        render_children(&self.children, "", &mut out);
        out
    }
}

fn render_children(children: &[CategoryTree], prefix: &str, out: &mut String) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let (branch, extend) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
        out.push_str(&format!(
            "{}{}{} ({} files, {})\n",
            prefix,
            branch,
            child.label,
            child.count,
            format_size(child.size)
        ));
        render_children(&child.children, &format!("{}{}", prefix, extend), out);
    }
}
