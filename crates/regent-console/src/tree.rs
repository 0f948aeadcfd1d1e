//! Command trie with unambiguous-prefix resolution.
//!
//! Every node is either a routing node (next token -> child) or a leaf
//! holding a [`CommandEntry`]. Keys live in `BTreeMap`s, so all keys sharing
//! a prefix form one contiguous range and candidate lists come out sorted.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use regent_types::error::{RegentError, Result};

use crate::command::{CommandEntry, CommandHandler, CommandSpec};

/// Candidate shown by completion when the typed path is already runnable.
pub const RUNNABLE_MARKER: &str = "<cr>";

enum Node {
    Branch(BTreeMap<String, Node>),
    Leaf(CommandEntry),
}

/// Result of resolving a token sequence against the tree.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// No tokens.
    Empty,
    /// A leaf was reached. `tokens` is the input with every matched token
    /// replaced by its full key; tokens past the leaf are arguments.
    Command {
        entry: CommandEntry,
        tokens: Vec<String>,
    },
    /// Input ran out on a routing node.
    Incomplete {
        matched: Vec<String>,
        options: Vec<String>,
    },
    /// `token` matches no key below `matched`.
    NoMatch { matched: Vec<String>, token: String },
    /// `token` is a prefix of several keys below `matched`.
    Ambiguous {
        matched: Vec<String>,
        token: String,
        candidates: Vec<String>,
    },
}

/// One matching step at a single level.
enum Step<'a> {
    Found(&'a String, &'a Node),
    Missing,
    Ambiguous(Vec<String>),
}

/// Outcome of walking the tree, borrowing the node where the walk stopped.
enum Walk<'a> {
    Leaf {
        entry: &'a CommandEntry,
        consumed: usize,
        canonical: Vec<String>,
    },
    Branch {
        children: &'a BTreeMap<String, Node>,
        canonical: Vec<String>,
    },
    Missing {
        canonical: Vec<String>,
        token: String,
    },
    Ambiguous {
        canonical: Vec<String>,
        token: String,
        candidates: Vec<String>,
    },
}

/// The command trie.
pub struct CommandTree {
    root: BTreeMap<String, Node>,
    case_sensitive: bool,
    leaves: usize,
}

impl CommandTree {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            root: BTreeMap::new(),
            case_sensitive,
            leaves: 0,
        }
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.leaves == 0
    }

    fn normalize(&self, token: &str) -> String {
        if self.case_sensitive {
            token.to_string()
        } else {
            token.to_lowercase()
        }
    }

    /// Bind `handler` to `spec.path`. A second registration of the same path
    /// appends its handler to the existing entry.
    pub fn insert(&mut self, mut spec: CommandSpec, handler: Arc<dyn CommandHandler>) -> Result<()> {
        let keys: Vec<String> = spec.path.iter().map(|t| self.normalize(t)).collect();
        let Some((last, prefix)) = keys.split_last() else {
            return Err(RegentError::Registration("empty command path".to_string()));
        };
        self.check_insertable(&keys)?;
        spec.path = keys.clone();

        let mut current = &mut self.root;
        for key in prefix {
            let node = current
                .entry(key.clone())
                .or_insert_with(|| Node::Branch(BTreeMap::new()));
            let Node::Branch(children) = node else {
                return Err(conflict(&keys, key));
            };
            current = children;
        }

        match current.entry(last.clone()) {
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Node::Leaf(entry) => {
                    log::debug!(
                        "adding handler {} to existing command '{}'",
                        entry.handlers.len() + 1,
                        keys.join(" ")
                    );
                    entry.handlers.push(handler);
                },
                Node::Branch(_) => return Err(conflict(&keys, last)),
            },
            Entry::Vacant(slot) => {
                slot.insert(Node::Leaf(CommandEntry {
                    spec,
                    handlers: vec![handler],
                }));
                self.leaves += 1;
            },
        }
        Ok(())
    }

    /// Reject paths that would route through a leaf or turn a routing node
    /// into a leaf, before anything is mutated.
    fn check_insertable(&self, keys: &[String]) -> Result<()> {
        let mut current = &self.root;
        for (depth, key) in keys.iter().enumerate() {
            let is_last = depth + 1 == keys.len();
            match current.get(key) {
                None => return Ok(()),
                Some(Node::Branch(children)) if !is_last => current = children,
                Some(Node::Leaf(_)) if is_last => return Ok(()),
                Some(_) => return Err(conflict(keys, key)),
            }
        }
        Ok(())
    }

    fn step<'a>(&self, children: &'a BTreeMap<String, Node>, token: &str) -> Step<'a> {
        let needle = self.normalize(token);
        if let Some((key, node)) = children.get_key_value(&needle) {
            return Step::Found(key, node);
        }
        let mut matches = children
            .range(needle.clone()..)
            .take_while(|(key, _)| key.starts_with(&needle));
        match (matches.next(), matches.next()) {
            (None, _) => Step::Missing,
            (Some((key, node)), None) => Step::Found(key, node),
            (Some((first, _)), Some((second, _))) => {
                let mut candidates = vec![first.clone(), second.clone()];
                candidates.extend(matches.map(|(key, _)| key.clone()));
                Step::Ambiguous(candidates)
            },
        }
    }

    fn walk(&self, tokens: &[String]) -> Walk<'_> {
        let mut current = &self.root;
        let mut canonical = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            match self.step(current, token) {
                Step::Found(key, node) => {
                    canonical.push(key.clone());
                    match node {
                        Node::Leaf(entry) => {
                            return Walk::Leaf {
                                entry,
                                consumed: i + 1,
                                canonical,
                            };
                        },
                        Node::Branch(children) => current = children,
                    }
                },
                Step::Missing => {
                    return Walk::Missing {
                        canonical,
                        token: token.clone(),
                    };
                },
                Step::Ambiguous(candidates) => {
                    return Walk::Ambiguous {
                        canonical,
                        token: token.clone(),
                        candidates,
                    };
                },
            }
        }
        Walk::Branch {
            children: current,
            canonical,
        }
    }

    /// Resolve `tokens` to at most one command.
    pub fn resolve(&self, tokens: &[String]) -> Resolution {
        if tokens.is_empty() {
            return Resolution::Empty;
        }
        match self.walk(tokens) {
            Walk::Leaf {
                entry,
                consumed,
                mut canonical,
            } => {
                canonical.extend(tokens[consumed..].iter().cloned());
                Resolution::Command {
                    entry: entry.clone(),
                    tokens: canonical,
                }
            },
            Walk::Branch {
                children,
                canonical,
            } => Resolution::Incomplete {
                matched: canonical,
                options: children.keys().cloned().collect(),
            },
            Walk::Missing { canonical, token } => Resolution::NoMatch {
                matched: canonical,
                token,
            },
            Walk::Ambiguous {
                canonical,
                token,
                candidates,
            } => Resolution::Ambiguous {
                matched: canonical,
                token,
                candidates,
            },
        }
    }

    /// Keys that may follow `tokens`, or [`RUNNABLE_MARKER`] when `tokens`
    /// already names a command with handlers.
    pub fn find_next_option(&self, tokens: &[String]) -> Vec<String> {
        match self.walk(tokens) {
            Walk::Leaf { entry, .. } => runnable(entry),
            Walk::Branch { children, .. } => children.keys().cloned().collect(),
            Walk::Ambiguous { candidates, .. } => candidates,
            Walk::Missing { .. } => Vec::new(),
        }
    }

    /// Candidates for a partially typed last token.
    pub fn complete_partial(&self, complete: &[String], partial: &str) -> Vec<String> {
        match self.walk(complete) {
            Walk::Branch { children, .. } => {
                let needle = self.normalize(partial);
                children
                    .range(needle.clone()..)
                    .take_while(|(key, _)| key.starts_with(&needle))
                    .map(|(key, _)| key.clone())
                    .collect()
            },
            Walk::Leaf { entry, .. } => runnable(entry),
            Walk::Missing { .. } | Walk::Ambiguous { .. } => Vec::new(),
        }
    }

    /// Every entry, in path order.
    pub fn entries(&self) -> Vec<&CommandEntry> {
        let mut out = Vec::with_capacity(self.leaves);
        collect_entries(&self.root, &mut out);
        out
    }

    /// Best-effort lookup for help. `None` if `tokens` matches nothing.
    pub fn help_target(&self, tokens: &[String]) -> Option<HelpTarget<'_>> {
        match self.walk(tokens) {
            Walk::Leaf { entry, .. } => Some(HelpTarget::Command(entry)),
            Walk::Branch { children, .. } => {
                let mut out = Vec::new();
                collect_entries(children, &mut out);
                Some(HelpTarget::Group(out))
            },
            Walk::Missing { .. } | Walk::Ambiguous { .. } => None,
        }
    }
}

/// What `help <path>` should describe.
pub enum HelpTarget<'a> {
    /// The path names a command.
    Command(&'a CommandEntry),
    /// The path names a routing node; all commands below it.
    Group(Vec<&'a CommandEntry>),
}

fn runnable(entry: &CommandEntry) -> Vec<String> {
    if entry.handlers.is_empty() {
        Vec::new()
    } else {
        vec![RUNNABLE_MARKER.to_string()]
    }
}

fn collect_entries<'a>(children: &'a BTreeMap<String, Node>, out: &mut Vec<&'a CommandEntry>) {
    for node in children.values() {
        match node {
            Node::Leaf(entry) => out.push(entry),
            Node::Branch(grandchildren) => collect_entries(grandchildren, out),
        }
    }
}

fn conflict(keys: &[String], at: &str) -> RegentError {
    RegentError::Registration(format!(
        "'{}' conflicts with an existing command at '{at}'",
        keys.join(" ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Environment;

    fn noop() -> Arc<dyn CommandHandler> {
        Arc::new(|_: &Environment<'_>, _: &[String]| Ok(()))
    }

    fn toks(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn tree_with(paths: &[&str]) -> CommandTree {
        let mut tree = CommandTree::new(false);
        for p in paths {
            tree.insert(CommandSpec::new("Test", p), noop()).unwrap();
        }
        tree
    }

    fn resolved_path(tree: &CommandTree, line: &str) -> Option<String> {
        match tree.resolve(&toks(line)) {
            Resolution::Command { entry, .. } => Some(entry.path_string()),
            _ => None,
        }
    }

    #[test]
    fn exact_path_resolves() {
        let tree = tree_with(&["show info", "show uptime", "quit"]);
        assert_eq!(resolved_path(&tree, "show info").as_deref(), Some("show info"));
        assert_eq!(resolved_path(&tree, "quit").as_deref(), Some("quit"));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn unique_prefix_resolves_at_every_level() {
        let tree = tree_with(&["show info", "quit"]);
        assert_eq!(resolved_path(&tree, "sh in").as_deref(), Some("show info"));
        assert_eq!(resolved_path(&tree, "s i").as_deref(), Some("show info"));
    }

    #[test]
    fn canonical_tokens_keep_arguments() {
        let tree = tree_with(&["show info", "quit"]);
        match tree.resolve(&toks("sh in Extra ARGS")) {
            Resolution::Command { tokens, .. } => {
                assert_eq!(tokens, vec!["show", "info", "Extra", "ARGS"]);
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exact_beats_prefix() {
        let tree = tree_with(&["showall", "show"]);
        assert_eq!(resolved_path(&tree, "show").as_deref(), Some("show"));
        assert_eq!(resolved_path(&tree, "showa").as_deref(), Some("showall"));
    }

    #[test]
    fn ambiguous_prefix_lists_candidates() {
        let tree = tree_with(&["show info", "shutdown"]);
        match tree.resolve(&toks("sh")) {
            Resolution::Ambiguous {
                matched,
                token,
                candidates,
            } => {
                assert!(matched.is_empty());
                assert_eq!(token, "sh");
                assert_eq!(candidates, vec!["show", "shutdown"]);
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn no_match_reports_deepest_path() {
        let tree = tree_with(&["show info"]);
        match tree.resolve(&toks("show bogus")) {
            Resolution::NoMatch { matched, token } => {
                assert_eq!(matched, vec!["show"]);
                assert_eq!(token, "bogus");
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn routing_node_is_not_executable() {
        let tree = tree_with(&["show info", "show uptime"]);
        match tree.resolve(&toks("show")) {
            Resolution::Incomplete { matched, options } => {
                assert_eq!(matched, vec!["show"]);
                assert_eq!(options, vec!["info", "uptime"]);
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(tree.resolve(&[]), Resolution::Empty));
    }

    #[test]
    fn repeated_registration_appends_handlers() {
        let mut tree = tree_with(&["backup"]);
        tree.insert(CommandSpec::new("Other", "backup"), noop())
            .unwrap();
        assert_eq!(tree.len(), 1);
        match tree.resolve(&toks("backup")) {
            Resolution::Command { entry, .. } => {
                assert_eq!(entry.handlers.len(), 2);
                assert_eq!(entry.spec.module, "Test");
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn conflicting_paths_rejected_without_side_effects() {
        let mut tree = tree_with(&["show info"]);
        assert!(tree.insert(CommandSpec::new("T", "show"), noop()).is_err());
        assert!(tree.insert(CommandSpec::new("T", "show info extra"), noop()).is_err());
        assert!(tree.insert(CommandSpec::new("T", ""), noop()).is_err());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.find_next_option(&toks("show")), vec!["info"]);
    }

    #[test]
    fn case_insensitive_merges_paths() {
        let mut tree = CommandTree::new(false);
        tree.insert(CommandSpec::new("T", "Show Info"), noop()).unwrap();
        tree.insert(CommandSpec::new("T", "show INFO"), noop()).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(resolved_path(&tree, "SHOW info").as_deref(), Some("show info"));
    }

    #[test]
    fn case_sensitive_keeps_paths_apart() {
        let mut tree = CommandTree::new(true);
        tree.insert(CommandSpec::new("T", "Show"), noop()).unwrap();
        tree.insert(CommandSpec::new("T", "show"), noop()).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(resolved_path(&tree, "Show").as_deref(), Some("Show"));
        assert!(matches!(
            tree.resolve(&toks("SHOW")),
            Resolution::NoMatch { .. }
        ));
    }

    #[test]
    fn next_options_for_routing_node() {
        let tree = tree_with(&["show info", "show uptime", "quit"]);
        assert_eq!(tree.find_next_option(&toks("show")), vec!["info", "uptime"]);
        assert_eq!(tree.find_next_option(&[]), vec!["quit", "show"]);
    }

    #[test]
    fn next_options_for_runnable_command() {
        let tree = tree_with(&["show info"]);
        assert_eq!(tree.find_next_option(&toks("show info")), vec![RUNNABLE_MARKER]);
        assert_eq!(tree.find_next_option(&toks("show info x")), vec![RUNNABLE_MARKER]);
        assert!(tree.find_next_option(&toks("nothing")).is_empty());
    }

    #[test]
    fn complete_partial_token() {
        let tree = tree_with(&["show info", "show uptime", "show users"]);
        assert_eq!(
            tree.complete_partial(&toks("show"), "u"),
            vec!["uptime", "users"]
        );
        assert_eq!(tree.complete_partial(&[], "s"), vec!["show"]);
        assert!(tree.complete_partial(&toks("show"), "z").is_empty());
    }

    #[test]
    fn every_path_resolves_to_itself() {
        let paths = [
            "show info",
            "show uptime",
            "show",
            "showall",
            "set log level",
            "threads abort",
        ];
        let mut tree = CommandTree::new(false);
        for p in &paths {
            let _ = tree.insert(CommandSpec::new("T", p), noop());
        }
        for entry in tree.entries() {
            let path = entry.path_string();
            assert_eq!(resolved_path(&tree, &path), Some(path.clone()));
        }
    }

    #[test]
    fn help_target_for_leaf_and_group() {
        let tree = tree_with(&["show info", "show uptime", "quit"]);
        match tree.help_target(&toks("show")) {
            Some(HelpTarget::Group(entries)) => assert_eq!(entries.len(), 2),
            _ => panic!("expected group"),
        }
        match tree.help_target(&toks("q")) {
            Some(HelpTarget::Command(entry)) => assert_eq!(entry.path_string(), "quit"),
            _ => panic!("expected command"),
        }
        assert!(tree.help_target(&toks("bogus")).is_none());
    }
}
