use sxd_document::dom;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value, XPath};
use thiserror::Error;

/// Errors raised while compiling or evaluating a path expression.
#[derive(Debug, Error)]
pub enum PathError {
    /// The expression is not valid XPath 1.0.
    #[error("invalid path expression `{expr}`: {message}")]
    Syntax { expr: String, message: String },
    /// The expression compiled but failed against the document
    /// (unknown function, wrong argument type, ...).
    #[error("evaluating `{expr}` failed: {message}")]
    Execution { expr: String, message: String },
    /// An expression used to select item containers returned a scalar.
    #[error("`{0}` must select nodes, not a string, number or boolean")]
    NotNodes(String),
}

/// A validated XPath expression.
///
/// Only the source text is stored: compiled `sxd_xpath::XPath` values are not
/// `Send`, and a resolved configuration has to travel to whichever worker
/// processes its source. [`PathExpr::compile`] guarantees that
/// [`PathExpr::build`] cannot fail with a syntax error later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    source: String,
}

impl PathExpr {
    pub fn compile(source: &str) -> Result<Self, PathError> {
        build_xpath(source)?;
        Ok(Self {
            source: source.to_owned(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn build(&self) -> Result<XPath, PathError> {
        build_xpath(&self.source)
    }
}

fn build_xpath(source: &str) -> Result<XPath, PathError> {
    Factory::new()
        .build(source)
        .map_err(|e| PathError::Syntax {
            expr: source.to_owned(),
            message: e.to_string(),
        })?
        .ok_or_else(|| PathError::Syntax {
            expr: source.to_owned(),
            message: "empty expression".to_owned(),
        })
}

/// How a feed field obtains its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldBinding {
    /// Not configured; always yields [`ExtractedValue::Absent`].
    Absent,
    /// A fixed value that does not depend on the document.
    Constant(String),
    /// A path evaluated against the document or an item element.
    Compiled(PathExpr),
}

impl FieldBinding {
    /// Compiles the binding for one response.
    pub fn compile(&self) -> Result<CompiledBinding<'_>, PathError> {
        Ok(match self {
            FieldBinding::Absent => CompiledBinding::Absent,
            FieldBinding::Constant(value) => CompiledBinding::Constant(value),
            FieldBinding::Compiled(expr) => CompiledBinding::Path {
                expr: expr.as_str(),
                xpath: expr.build()?,
            },
        })
    }
}

/// A [`FieldBinding`] ready to be evaluated within a single response.
#[derive(Debug)]
pub enum CompiledBinding<'a> {
    Absent,
    Constant(&'a str),
    Path { expr: &'a str, xpath: XPath },
}

/// The result of evaluating a path.
///
/// Attribute, text and comment nodes are reduced to their string values; only
/// elements stay nodes, since they are the only results that carry markup.
/// Members of a `NodeList` are always `Text` or `Node`.
#[derive(Debug, Clone)]
pub enum ExtractedValue<'d> {
    Absent,
    Text(String),
    Node(dom::Element<'d>),
    NodeList(Vec<ExtractedValue<'d>>),
}

impl<'a> CompiledBinding<'a> {
    /// Evaluates the binding with `node` as the context node.
    ///
    /// Absent bindings never reach the query engine.
    pub fn evaluate<'d>(
        &self,
        context: &Context<'d>,
        node: Node<'d>,
    ) -> Result<ExtractedValue<'d>, PathError> {
        match self {
            CompiledBinding::Absent => Ok(ExtractedValue::Absent),
            CompiledBinding::Constant(value) => Ok(ExtractedValue::Text((*value).to_owned())),
            CompiledBinding::Path { expr, xpath } => {
                let value = run(expr, xpath, context, node)?;
                Ok(extract(value))
            }
        }
    }

    /// Evaluates the binding and returns the selected nodes in document order.
    ///
    /// Used for the item container path, whose members become the context
    /// nodes of the per-item fields.
    pub fn select<'d>(
        &self,
        context: &Context<'d>,
        node: Node<'d>,
    ) -> Result<Vec<Node<'d>>, PathError> {
        match self {
            CompiledBinding::Absent => Ok(Vec::new()),
            CompiledBinding::Constant(value) => Err(PathError::NotNodes((*value).to_owned())),
            CompiledBinding::Path { expr, xpath } => match run(expr, xpath, context, node)? {
                Value::Nodeset(nodes) => Ok(nodes.document_order()),
                _ => Err(PathError::NotNodes((*expr).to_owned())),
            },
        }
    }
}

fn run<'d>(
    expr: &str,
    xpath: &XPath,
    context: &Context<'d>,
    node: Node<'d>,
) -> Result<Value<'d>, PathError> {
    xpath
        .evaluate(context, node)
        .map_err(|e| PathError::Execution {
            expr: expr.to_owned(),
            message: e.to_string(),
        })
}

fn extract(value: Value<'_>) -> ExtractedValue<'_> {
    match value {
        Value::String(s) => ExtractedValue::Text(s),
        Value::Number(n) => ExtractedValue::Text(format_number(n)),
        Value::Boolean(b) => ExtractedValue::Text(b.to_string()),
        Value::Nodeset(nodes) => {
            let members = nodes.document_order().into_iter().map(member).collect();
            ExtractedValue::NodeList(members)
        }
    }
}

fn member(node: Node<'_>) -> ExtractedValue<'_> {
    match node {
        Node::Element(element) => ExtractedValue::Node(element),
        Node::Root(root) => root
            .children()
            .into_iter()
            .find_map(|child| match child {
                dom::ChildOfRoot::Element(element) => Some(element),
                _ => None,
            })
            .map_or(ExtractedValue::Absent, ExtractedValue::Node),
        other => ExtractedValue::Text(other.string_value()),
    }
}

/// XPath numbers are doubles; integral values print without a fraction.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
