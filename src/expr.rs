//! Symbolic integrand expressions.
//!
//! Expressions are stored as a directed acyclic graph inside an [`ExprArena`] and referred to by
//! [`NodeId`]. Children are always created before their parents, so node IDs are a topological
//! order of the graph, and sharing a subexpression is just a matter of reusing its ID.
use rustc_hash::FxHashMap;
use std::fmt;
use std::fmt::Display;
use std::slice;
use weakform_deriv::{FunctionId, MultiIndex, MAX_SPATIAL_DIM};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The role a symbolic function plays in a weak form.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FunctionRole {
    /// An unknown (trial) function, the second-order derivatives of which form matrix columns.
    Unknown,
    /// A variational (test) function, the first-order derivatives of which form vector rows.
    Variational,
}

/// The point at which a symbolic function is evaluated before differentiating.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EvalPoint {
    /// The function is evaluated at zero, as for linear problems.
    Zero,
    /// The function is evaluated at a discrete function, given by its node, as for the
    /// linearization of nonlinear problems.
    Discrete(NodeId),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UnaryFunction {
    Exp,
    Log,
    Sin,
    Cos,
    Sqrt,
    /// Power with a constant exponent.
    Pow(f64),
}

impl Display for UnaryFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryFunction::Exp => write!(f, "exp"),
            UnaryFunction::Log => write!(f, "log"),
            UnaryFunction::Sin => write!(f, "sin"),
            UnaryFunction::Cos => write!(f, "cos"),
            UnaryFunction::Sqrt => write!(f, "sqrt"),
            UnaryFunction::Pow(p) => write!(f, "pow[{}]", p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(f64),
    /// The spatial coordinate in the given direction.
    Coordinate(usize),
    SymbolicFunction {
        name: String,
        id: FunctionId,
        role: FunctionRole,
        eval_point: EvalPoint,
    },
    /// A known function, e.g. the current iterate of a nonlinear solve.
    DiscreteFunction { name: String, id: FunctionId },
    /// First-order spatial derivative of `arg` in the given direction.
    Diff { direction: usize, arg: NodeId },
    Sum(Vec<NodeId>),
    Neg(NodeId),
    Product([NodeId; 2]),
    Nonlinear { function: UnaryFunction, arg: NodeId },
}

impl ExprKind {
    pub fn children(&self) -> &[NodeId] {
        match self {
            ExprKind::Constant(_)
            | ExprKind::Coordinate(_)
            | ExprKind::SymbolicFunction { .. }
            | ExprKind::DiscreteFunction { .. } => &[],
            ExprKind::Diff { arg, .. } | ExprKind::Neg(arg) | ExprKind::Nonlinear { arg, .. } => {
                slice::from_ref(arg)
            }
            ExprKind::Sum(terms) => terms,
            ExprKind::Product(factors) => factors,
        }
    }
}

/// Owner of all expression nodes of a problem.
#[derive(Debug, Clone)]
pub struct ExprArena {
    spatial_dim: usize,
    nodes: Vec<ExprKind>,
    functions: FxHashMap<FunctionId, NodeId>,
}

impl ExprArena {
    /// # Panics
    ///
    /// Panics if the spatial dimension is zero or exceeds [`MAX_SPATIAL_DIM`].
    pub fn new(spatial_dim: usize) -> Self {
        assert!(
            spatial_dim > 0 && spatial_dim <= MAX_SPATIAL_DIM,
            "Spatial dimension must be in 1..={}.",
            MAX_SPATIAL_DIM
        );
        Self {
            spatial_dim,
            nodes: Vec::new(),
            functions: FxHashMap::default(),
        }
    }

    pub fn spatial_dim(&self) -> usize {
        self.spatial_dim
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// # Panics
    ///
    /// Panics if the node does not belong to this arena.
    pub fn kind(&self, node: NodeId) -> &ExprKind {
        &self.nodes[node.0]
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.kind(node).children()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// The node of the symbolic or discrete function with the given ID.
    pub fn function(&self, id: FunctionId) -> Option<NodeId> {
        self.functions.get(&id).copied()
    }

    /// The role of the symbolic function with the given ID, or `None` for discrete functions and
    /// unregistered IDs.
    pub fn function_role(&self, id: FunctionId) -> Option<FunctionRole> {
        match self.kind(self.function(id)?) {
            ExprKind::SymbolicFunction { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// The evaluation point of the symbolic function with the given ID.
    pub fn eval_point(&self, id: FunctionId) -> Option<EvalPoint> {
        match self.kind(self.function(id)?) {
            ExprKind::SymbolicFunction { eval_point, .. } => Some(*eval_point),
            _ => None,
        }
    }

    /// The ID of the discrete function a symbolic function is evaluated at, if any.
    pub fn discrete_eval_point(&self, id: FunctionId) -> Option<FunctionId> {
        match self.eval_point(id)? {
            EvalPoint::Zero => None,
            EvalPoint::Discrete(node) => match self.kind(node) {
                ExprKind::DiscreteFunction { id, .. } => Some(*id),
                _ => None,
            },
        }
    }

    pub fn is_zero_constant(&self, node: NodeId) -> bool {
        matches!(self.kind(node), ExprKind::Constant(c) if *c == 0.0)
    }

    fn push(&mut self, kind: ExprKind) -> NodeId {
        for child in kind.children() {
            assert!(child.0 < self.nodes.len(), "Child node {:?} does not exist.", child);
        }
        self.nodes.push(kind);
        NodeId(self.nodes.len() - 1)
    }

    fn register_function(&mut self, id: FunctionId, kind: ExprKind) -> NodeId {
        assert!(
            !self.functions.contains_key(&id),
            "Function ID {} is already in use.",
            id
        );
        let node = self.push(kind);
        self.functions.insert(id, node);
        node
    }

    pub fn constant(&mut self, value: f64) -> NodeId {
        self.push(ExprKind::Constant(value))
    }

    pub fn zero(&mut self) -> NodeId {
        self.constant(0.0)
    }

    pub fn coordinate(&mut self, direction: usize) -> NodeId {
        assert!(direction < self.spatial_dim, "Coordinate direction out of bounds.");
        self.push(ExprKind::Coordinate(direction))
    }

    /// An unknown function evaluated at zero.
    pub fn unknown_function(&mut self, name: &str, id: FunctionId) -> NodeId {
        self.symbolic_function(name, id, FunctionRole::Unknown, EvalPoint::Zero)
    }

    /// An unknown function evaluated at the given discrete function.
    pub fn unknown_function_at(&mut self, name: &str, id: FunctionId, eval_point: NodeId) -> NodeId {
        assert!(
            matches!(self.kind(eval_point), ExprKind::DiscreteFunction { .. }),
            "Evaluation point must be a discrete function."
        );
        self.symbolic_function(name, id, FunctionRole::Unknown, EvalPoint::Discrete(eval_point))
    }

    /// A variational (test) function. Test functions are always evaluated at zero.
    pub fn test_function(&mut self, name: &str, id: FunctionId) -> NodeId {
        self.symbolic_function(name, id, FunctionRole::Variational, EvalPoint::Zero)
    }

    pub fn symbolic_function(
        &mut self,
        name: &str,
        id: FunctionId,
        role: FunctionRole,
        eval_point: EvalPoint,
    ) -> NodeId {
        self.register_function(
            id,
            ExprKind::SymbolicFunction {
                name: name.to_string(),
                id,
                role,
                eval_point,
            },
        )
    }

    pub fn discrete_function(&mut self, name: &str, id: FunctionId) -> NodeId {
        self.register_function(
            id,
            ExprKind::DiscreteFunction {
                name: name.to_string(),
                id,
            },
        )
    }

    /// The first-order spatial derivative of `arg` with respect to the given direction.
    pub fn diff(&mut self, direction: usize, arg: NodeId) -> NodeId {
        assert!(direction < self.spatial_dim, "Differentiation direction out of bounds.");
        self.push(ExprKind::Diff { direction, arg })
    }

    /// The spatial derivative of `arg` described by a first-order multi-index.
    ///
    /// # Panics
    ///
    /// Panics if the multi-index is not of order one.
    pub fn diff_multi_index(&mut self, mi: MultiIndex, arg: NodeId) -> NodeId {
        let direction = mi
            .first_order_direction()
            .unwrap_or_else(|| panic!("Spatial derivative multi-index {} must be of order one.", mi));
        self.diff(direction, arg)
    }

    /// The sum of the given terms.
    ///
    /// # Panics
    ///
    /// Panics if `terms` is empty.
    pub fn sum(&mut self, terms: &[NodeId]) -> NodeId {
        assert!(!terms.is_empty(), "Sum must have at least one term.");
        self.push(ExprKind::Sum(terms.to_vec()))
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.sum(&[a, b])
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let neg_b = self.neg(b);
        self.sum(&[a, neg_b])
    }

    pub fn neg(&mut self, arg: NodeId) -> NodeId {
        self.push(ExprKind::Neg(arg))
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(ExprKind::Product([a, b]))
    }

    /// The left-associated product of the given factors.
    ///
    /// # Panics
    ///
    /// Panics if `factors` is empty.
    pub fn product(&mut self, factors: &[NodeId]) -> NodeId {
        let (first, rest) = factors
            .split_first()
            .expect("Product must have at least one factor.");
        rest.iter().fold(*first, |acc, &factor| self.mul(acc, factor))
    }

    pub fn nonlinear(&mut self, function: UnaryFunction, arg: NodeId) -> NodeId {
        self.push(ExprKind::Nonlinear { function, arg })
    }

    pub fn exp(&mut self, arg: NodeId) -> NodeId {
        self.nonlinear(UnaryFunction::Exp, arg)
    }

    pub fn sin(&mut self, arg: NodeId) -> NodeId {
        self.nonlinear(UnaryFunction::Sin, arg)
    }

    pub fn pow(&mut self, arg: NodeId, exponent: f64) -> NodeId {
        self.nonlinear(UnaryFunction::Pow(exponent), arg)
    }

    /// The gradient-dot-gradient term $\sum_i \partial_i a \, \partial_i b$.
    pub fn grad_dot_grad(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let terms: Vec<_> = (0..self.spatial_dim)
            .map(|i| {
                let da = self.diff(i, a);
                let db = self.diff(i, b);
                self.mul(da, db)
            })
            .collect();
        self.sum(&terms)
    }

    /// Textual form of the expression rooted at `node`.
    pub fn display(&self, node: NodeId) -> ExprDisplay {
        ExprDisplay { arena: self, node }
    }
}

pub struct ExprDisplay<'a> {
    arena: &'a ExprArena,
    node: NodeId,
}

impl<'a> ExprDisplay<'a> {
    fn child(&self, node: NodeId) -> ExprDisplay<'a> {
        self.arena.display(node)
    }
}

impl<'a> Display for ExprDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arena.kind(self.node) {
            ExprKind::Constant(c) => write!(f, "{}", c),
            ExprKind::Coordinate(direction) => write!(f, "x{}", direction),
            ExprKind::SymbolicFunction { name, .. } | ExprKind::DiscreteFunction { name, .. } => {
                write!(f, "{}", name)
            }
            ExprKind::Diff { direction, arg } => write!(f, "D{}[{}]", direction, self.child(*arg)),
            ExprKind::Sum(terms) => {
                write!(f, "(")?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", self.child(*term))?;
                }
                write!(f, ")")
            }
            ExprKind::Neg(arg) => write!(f, "-{}", self.child(*arg)),
            ExprKind::Product([a, b]) => write!(f, "{}*{}", self.child(*a), self.child(*b)),
            ExprKind::Nonlinear { function, arg } => write!(f, "{}({})", function, self.child(*arg)),
        }
    }
}
