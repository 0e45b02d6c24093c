//! Operator visitors: one handler per supported operator identity.
//!
//! Visitors translate a single call node into backend value and operator
//! records through the [`LowerContext`]. Support for a new operator means
//! registering one new visitor; nothing else changes.

mod activation;
mod arithmetic;
mod linear;
mod softmax;
mod transpose;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::graph::{AttrValue, Node};

use super::{LowerContext, LowerError};

/// Lowers one operator kind into backend records.
pub trait NodeVisitor: Send + Sync {
    /// Operator identity this visitor is registered under.
    fn name(&self) -> &str;

    /// Appends the value and operator records for `node`.
    fn define_node(
        &self,
        node: &Node,
        debug_handle: u32,
        ctx: &mut LowerContext<'_>,
    ) -> Result<(), LowerError>;
}

struct VisitorRegistry {
    visitors: RwLock<HashMap<String, Arc<dyn NodeVisitor>>>,
}

impl VisitorRegistry {
    fn new() -> Self {
        Self {
            visitors: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, visitor: Arc<dyn NodeVisitor>) {
        self.visitors
            .write()
            .expect("visitor registry poisoned")
            .insert(visitor.name().to_string(), visitor);
    }

    fn get(&self, name: &str) -> Option<Arc<dyn NodeVisitor>> {
        self.visitors
            .read()
            .expect("visitor registry poisoned")
            .get(name)
            .cloned()
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .visitors
            .read()
            .expect("visitor registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

static GLOBAL_REGISTRY: OnceLock<VisitorRegistry> = OnceLock::new();

fn registry() -> &'static VisitorRegistry {
    GLOBAL_REGISTRY.get_or_init(VisitorRegistry::new)
}

/// Registers a visitor under its operator identity. Later registrations for
/// the same identity replace earlier ones.
pub fn register_visitor(visitor: Arc<dyn NodeVisitor>) {
    registry().register(visitor);
}

/// Looks up the visitor for an operator identity.
pub fn visitor_for(name: &str) -> Option<Arc<dyn NodeVisitor>> {
    registry().get(name)
}

/// Sorted list of registered operator identities.
pub fn list_visitors() -> Vec<String> {
    registry().list()
}

static BUILTINS: OnceLock<()> = OnceLock::new();

/// Installs the built-in visitor set exactly once per process.
pub fn ensure_builtin_visitors() {
    BUILTINS.get_or_init(|| {
        for visitor in arithmetic::visitors() {
            register_visitor(visitor);
        }
        for visitor in activation::visitors() {
            register_visitor(visitor);
        }
        register_visitor(Arc::new(linear::LinearVisitor));
        register_visitor(Arc::new(softmax::SoftmaxVisitor));
        register_visitor(Arc::new(transpose::TransposeVisitor));
    });
}

pub(super) fn require_attr_i64(node: &Node, key: &str) -> Result<i64, LowerError> {
    match node.attr(key) {
        Some(AttrValue::I64(value)) => Ok(*value),
        Some(_) => Err(invalid_attr(node, key, "expected an integer")),
        None => Err(invalid_attr(node, key, "attribute is missing")),
    }
}

pub(super) fn attr_f64_or(node: &Node, key: &str, default: f64) -> Result<f64, LowerError> {
    match node.attr(key) {
        Some(AttrValue::F64(value)) => Ok(*value),
        Some(AttrValue::I64(value)) => Ok(*value as f64),
        Some(_) => Err(invalid_attr(node, key, "expected a number")),
        None => Ok(default),
    }
}

pub(super) fn require_attr_i64_array<'a>(
    node: &'a Node,
    key: &str,
) -> Result<&'a [i64], LowerError> {
    match node.attr(key) {
        Some(AttrValue::I64Array(values)) => Ok(values),
        Some(_) => Err(invalid_attr(node, key, "expected an integer array")),
        None => Err(invalid_attr(node, key, "attribute is missing")),
    }
}

pub(super) fn invalid_attr(node: &Node, key: &str, message: impl Into<String>) -> LowerError {
    LowerError::InvalidAttribute {
        node: node.name.clone(),
        attr: key.to_string(),
        message: message.into(),
    }
}
