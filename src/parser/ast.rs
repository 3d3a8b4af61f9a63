//! Node tree produced by the parser

use std::fmt;
use std::sync::Arc;

use crate::template::CustomTag;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Stable identity the parser assigns to variables and conditional branches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Literal value written directly in markup
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Expression inside a tag or variable
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// `name.member[index]...`
    Lookup { root: String, path: Vec<Accessor> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Member(String),
    Index(Box<Expr>),
}

impl Expr {
    /// Collect every context name this expression reads
    pub fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        if let Expr::Lookup { root, path } = self {
            names.push(root.as_str());
            for accessor in path {
                if let Accessor::Index(inner) = accessor {
                    inner.collect_names(names);
                }
            }
        }
    }
}

/// `| name: arg, arg`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
}

/// Output expression `{{ expr | filter }}`
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: NodeId,
    /// Markup as written between the delimiters, trimmed
    pub markup: String,
    pub expr: Expr,
    pub filters: Vec<FilterCall>,
    pub span: Span,
}

impl Variable {
    /// Every context name read by the expression or its filter arguments
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.expr.collect_names(&mut names);
        for filter in &self.filters {
            for arg in &filter.args {
                arg.collect_names(&mut names);
            }
        }
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Contains => "contains",
        };
        f.write_str(s)
    }
}

/// `left op right`, or a bare truthiness test when `op` is absent
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: Expr,
    pub op: Option<(Operator, Expr)>,
}

/// Boolean expression of an `if`/`elsif` branch
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare(Comparison),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Every context name read by any operand
    pub fn referenced_names(&self) -> Vec<&str> {
        fn walk<'a>(cond: &'a Condition, names: &mut Vec<&'a str>) {
            match cond {
                Condition::Compare(cmp) => {
                    cmp.left.collect_names(names);
                    if let Some((_, right)) = &cmp.op {
                        right.collect_names(names);
                    }
                }
                Condition::And(l, r) | Condition::Or(l, r) => {
                    walk(l, names);
                    walk(r, names);
                }
            }
        }
        let mut names = Vec::new();
        walk(self, &mut names);
        names
    }
}

/// Control signal that stops the rest of the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Break,
    Continue,
}

/// Leaf tag node
#[derive(Debug, Clone)]
pub struct Tag {
    pub name: String,
    pub markup: String,
    pub span: Span,
    pub kind: TagKind,
}

#[derive(Clone)]
pub enum TagKind {
    Interrupt(Interrupt),
    Custom(Arc<dyn CustomTag>),
}

impl fmt::Debug for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagKind::Interrupt(i) => f.debug_tuple("Interrupt").field(i).finish(),
            TagKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Composite node owning child nodes
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub markup: String,
    pub span: Span,
    pub kind: BlockKind,
}

#[derive(Debug, Clone)]
pub enum BlockKind {
    /// Renders its nodelist unchanged
    Plain(Vec<Node>),
    If(If),
}

/// One `if`/`elsif`/`else` arm
#[derive(Debug, Clone)]
pub struct ConditionBranch {
    pub id: NodeId,
    /// `None` for `else`
    pub predicate: Option<Arc<Condition>>,
    pub body: Vec<Node>,
}

impl ConditionBranch {
    pub fn is_else(&self) -> bool {
        self.predicate.is_none()
    }
}

/// Conditional block; branches are tested in declaration order
#[derive(Debug, Clone)]
pub struct If {
    pub branches: Vec<ConditionBranch>,
}

impl If {
    /// Identified by its first branch
    pub fn id(&self) -> Option<NodeId> {
        self.branches.first().map(|branch| branch.id)
    }

    /// Branches up to and including the first `else`. Anything after it can
    /// never be selected.
    pub fn reachable_branches(&self) -> &[ConditionBranch] {
        let end = self
            .branches
            .iter()
            .position(ConditionBranch::is_else)
            .map_or(self.branches.len(), |index| index + 1);
        &self.branches[..end]
    }
}

/// Node of the compiled tree
#[derive(Debug, Clone)]
pub enum Node {
    Literal(String),
    Variable(Variable),
    Tag(Tag),
    Block(Block),
}

/// Root of a parsed template
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub nodelist: Vec<Node>,
}

impl Document {
    /// Number of nodes in the whole tree, branches included
    pub fn node_count(&self) -> usize {
        fn count(nodes: &[Node]) -> usize {
            nodes
                .iter()
                .map(|node| match node {
                    Node::Block(Block {
                        kind: BlockKind::Plain(children),
                        ..
                    }) => 1 + count(children),
                    Node::Block(Block {
                        kind: BlockKind::If(if_node),
                        ..
                    }) => 1 + if_node.branches.iter().map(|b| count(&b.body)).sum::<usize>(),
                    _ => 1,
                })
                .sum()
        }
        count(&self.nodelist)
    }
}
