//! Execution pointers
//!
//! Tokens form a tree: the root token is created with the instance, forks
//! attach children under the forking token, joins end them again. The tree is
//! stored as an arena inside [`TokenTree`] and addressed by [`TokenId`].

use crate::error::{ProcessError, Result};
use crate::instance::ProcessInstance;
use crate::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable index of a token inside its instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub(crate) usize);

impl TokenId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct Token {
    pub(crate) id: TokenId,
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<TokenId>,
    pub(crate) children: Vec<TokenId>,
    pub(crate) node: Option<NodeId>,
    pub(crate) start: DateTime<Utc>,
    pub(crate) end: Option<DateTime<Utc>>,
    pub(crate) node_enter: Option<DateTime<Utc>>,
    pub(crate) lock: Option<String>,
    pub(crate) suspended: bool,
    pub(crate) able_to_reactivate_parent: bool,
    /// Fork rounds this token has started
    pub(crate) forks: u32,
    /// Fork round of the parent that created this token
    pub(crate) round: u32,
    pub(crate) sub_process: Option<Box<ProcessInstance>>,
}

impl Token {
    pub(crate) fn new(id: TokenId, name: Option<String>, parent: Option<TokenId>) -> Self {
        Self {
            id,
            name,
            parent,
            children: Vec::new(),
            node: None,
            start: Utc::now(),
            end: None,
            node_enter: None,
            lock: None,
            suspended: false,
            able_to_reactivate_parent: true,
            forks: 0,
            round: 0,
            sub_process: None,
        }
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    /// Name among siblings; the root token is unnamed
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<TokenId> {
        self.parent
    }

    pub fn children(&self) -> &[TokenId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn has_ended(&self) -> bool {
        self.end.is_some()
    }

    pub fn node_enter(&self) -> Option<DateTime<Utc>> {
        self.node_enter
    }

    pub fn lock_reason(&self) -> Option<&str> {
        self.lock.as_deref()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether arriving at a join may still reactivate the parent
    pub fn is_able_to_reactivate_parent(&self) -> bool {
        self.able_to_reactivate_parent
    }

    /// Fork round this token was created in
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Sub-process instance started from this token
    pub fn sub_process(&self) -> Option<&ProcessInstance> {
        self.sub_process.as_deref()
    }

    /// Lock against external signals
    ///
    /// Re-locking with the same reason is a no-op.
    pub fn lock(&mut self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        match &self.lock {
            Some(existing) if *existing != reason => Err(ProcessError::illegal_state(format!(
                "token {} is locked by '{}', cannot lock for '{}'",
                self.id.0, existing, reason
            ))),
            _ => {
                self.lock = Some(reason);
                Ok(())
            }
        }
    }

    /// Release a lock taken with `reason`; unlocking an unlocked token is a no-op
    pub fn unlock(&mut self, reason: &str) -> Result<()> {
        match &self.lock {
            None => Ok(()),
            Some(existing) if existing == reason => {
                self.lock = None;
                Ok(())
            }
            Some(existing) => Err(ProcessError::illegal_state(format!(
                "token {} is locked by '{}', not by '{}'",
                self.id.0, existing, reason
            ))),
        }
    }

    pub fn force_unlock(&mut self) {
        self.lock = None;
    }
}

/// Arena of tokens belonging to one instance
#[derive(Debug)]
pub struct TokenTree {
    tokens: Vec<Token>,
}

impl TokenTree {
    /// Tree with an unnamed root token
    pub(crate) fn new() -> Self {
        Self {
            tokens: vec![Token::new(TokenId(0), None, None)],
        }
    }

    pub(crate) fn from_tokens(tokens: Vec<Token>) -> Result<Self> {
        let ordered = tokens.iter().enumerate().all(|(i, t)| t.id.0 == i);
        if tokens.is_empty() || !ordered || tokens[0].parent.is_some() {
            return Err(ProcessError::illegal_state(
                "token arena must start with the root and be indexed densely",
            ));
        }
        Ok(Self { tokens })
    }

    pub fn root(&self) -> TokenId {
        TokenId(0)
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(id.0)
    }

    pub fn get_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.tokens.get_mut(id.0)
    }

    /// Token by an id handed out by this tree
    pub(crate) fn at(&self, id: TokenId) -> &Token {
        &self.tokens[id.0]
    }

    pub(crate) fn at_mut(&mut self, id: TokenId) -> &mut Token {
        &mut self.tokens[id.0]
    }

    pub(crate) fn token(&self, id: TokenId) -> Result<&Token> {
        self.get(id)
            .ok_or_else(|| ProcessError::illegal_state(format!("unknown token {}", id.0)))
    }

    pub(crate) fn token_mut(&mut self, id: TokenId) -> Result<&mut Token> {
        self.get_mut(id)
            .ok_or_else(|| ProcessError::illegal_state(format!("unknown token {}", id.0)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Token> {
        self.tokens.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn child_named(&self, parent: TokenId, name: &str) -> Option<TokenId> {
        self.get(parent)?
            .children
            .iter()
            .copied()
            .find(|c| self.tokens[c.0].name.as_deref() == Some(name))
    }

    /// Name for a new child of `parent`
    ///
    /// A taken base name gets a numeric suffix starting at 2 (`"to b"`,
    /// `"to b2"`); unnamed children are numbered by ordinal.
    pub fn unique_child_name(&self, parent: TokenId, base: Option<&str>) -> String {
        let children = self.get(parent).map(|t| t.children.len()).unwrap_or(0);
        let (base, mut candidate) = match base {
            Some(base) => (base.to_string(), base.to_string()),
            None => (String::new(), (children + 1).to_string()),
        };
        let mut suffix = if base.is_empty() { children + 2 } else { 2 };
        while self.child_named(parent, &candidate).is_some() {
            candidate = format!("{}{}", base, suffix);
            suffix += 1;
        }
        candidate
    }

    /// Open a new fork round under `parent`
    ///
    /// Ended children of earlier rounds are detached from the parent, so their
    /// names become free again. They stay in the arena.
    pub(crate) fn begin_fork_round(&mut self, parent: TokenId) -> Result<u32> {
        let live: Vec<TokenId> = self
            .token(parent)?
            .children
            .iter()
            .copied()
            .filter(|c| !self.tokens[c.0].has_ended())
            .collect();
        let parent = self.at_mut(parent);
        parent.children = live;
        parent.forks += 1;
        Ok(parent.forks)
    }

    /// Children created by the latest fork round of `parent`
    pub fn current_round(&self, parent: TokenId) -> impl Iterator<Item = TokenId> + '_ {
        let (children, round) = self
            .get(parent)
            .map(|t| (t.children.as_slice(), t.forks))
            .unwrap_or((&[], 0));
        children
            .iter()
            .copied()
            .filter(move |c| self.tokens[c.0].round == round)
    }

    /// Child of the latest fork round with the given name
    pub fn round_child_named(&self, parent: TokenId, name: &str) -> Option<TokenId> {
        self.current_round(parent)
            .find(|c| self.tokens[c.0].name.as_deref() == Some(name))
    }

    /// Attach a child under `parent`, positioned at the parent's node
    pub(crate) fn create_child(&mut self, parent: TokenId, base_name: Option<&str>) -> Result<TokenId> {
        let name = self.unique_child_name(parent, base_name);
        let id = TokenId(self.tokens.len());
        let parent_token = self.token_mut(parent)?;
        parent_token.children.push(id);
        let node = parent_token.node;
        let round = parent_token.forks;
        let mut child = Token::new(id, Some(name), Some(parent));
        child.node = node;
        child.round = round;
        self.tokens.push(child);
        Ok(id)
    }

    /// `/`-joined names from the root; the root itself is `/`
    pub fn full_name(&self, id: TokenId) -> String {
        let mut names: Vec<&str> = self
            .lineage(id)
            .filter_map(|t| self.tokens[t.0].name.as_deref())
            .collect();
        if names.is_empty() {
            return "/".to_string();
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Token by path relative to the root (`"/"`, `"/a/b"`, `"a/b"`)
    pub fn find(&self, path: &str) -> Option<TokenId> {
        self.find_from(self.root(), path)
    }

    /// Token by path relative to `from`
    pub fn find_from(&self, from: TokenId, path: &str) -> Option<TokenId> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(from, |current, segment| match segment {
                ".." => self.get(current)?.parent,
                name => self.child_named(current, name),
            })
    }

    pub fn has_active_children(&self, id: TokenId) -> bool {
        self.active_children(id).next().is_some()
    }

    /// Children that have not ended, in creation order
    pub fn active_children(&self, id: TokenId) -> impl Iterator<Item = TokenId> + '_ {
        self.get(id)
            .map(|t| t.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(|c| !self.tokens[c.0].has_ended())
    }

    /// `id` followed by its ancestors up to the root
    pub fn lineage(&self, id: TokenId) -> impl Iterator<Item = TokenId> + '_ {
        std::iter::successors(self.get(id).map(|t| t.id), move |t| {
            self.tokens[t.0].parent
        })
    }

    /// `id` followed by every descendant, depth first
    pub fn descendants(&self, id: TokenId) -> Vec<TokenId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(token) = self.get(current) {
                result.push(current);
                stack.extend(token.children.iter().rev().copied());
            }
        }
        result
    }
}
