//! GraphQL text -> `QueryTree` lowering.
//!
//! Parsing rules:
//! - Fragments are expanded in place; unknown fragments and cycles are invalid.
//! - Lowering uses explicit work stacks and stops at `max_nodes`.
//! - Variables are resolved into JSON argument values (missing -> null).

use std::collections::HashMap;

use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, Field, FragmentDefinition, OperationDefinition,
    OperationType, Selection, SelectionSet,
};
use async_graphql_parser::Positioned;
use async_graphql_value::{Name, Value as GqlValue};
use serde_json::{Map, Value};

use crate::error::{FedgateError, Result};

use super::tree::{FieldKey, NodeId, QueryTree};

/// Knobs for lowering, built once from gateway configuration.
#[derive(Debug, Clone, Copy)]
pub struct LowerOptions<'a> {
    /// `Type.field -> ReturnType`, used to name the parent type of nested fields.
    pub field_types: &'a HashMap<String, String>,
    pub max_nodes: usize,
}

/// Result of lowering one operation out of a document.
#[derive(Debug, Clone)]
pub struct LoweredOperation {
    pub tree: QueryTree,
    pub operation_type: &'static str,
    pub operation_name: Option<String>,
}

type Fragments = HashMap<Name, Positioned<FragmentDefinition>>;

pub fn lower_operation(
    text: &str,
    operation_name: Option<&str>,
    variables: &Map<String, Value>,
    opts: LowerOptions<'_>,
) -> Result<LoweredOperation> {
    let doc: ExecutableDocument = async_graphql_parser::parse_query(text)
        .map_err(|e| FedgateError::QueryInvalid(e.to_string()))?;

    let (name, op) = select_operation(&doc.operations, operation_name)?;
    reject_fragment_cycles(&doc.fragments)?;

    let root_type = match op.ty {
        OperationType::Query => "Query",
        OperationType::Mutation => "Mutation",
        OperationType::Subscription => "Subscription",
    };

    let mut tree = QueryTree::new();
    let mut pending: Vec<(&SelectionSet, Option<NodeId>, String)> =
        vec![(&op.selection_set.node, None, root_type.to_string())];

    while let Some((set, parent, parent_type)) = pending.pop() {
        let budget = Budget {
            remaining: opts.max_nodes.saturating_sub(tree.len()),
            max_nodes: opts.max_nodes,
        };
        for (field, ty) in flatten(set, parent_type, &doc.fragments, budget)? {

            let key = FieldKey::new(&ty, field.name.node.as_str());
            let arguments = field
                .arguments
                .iter()
                .map(|(n, v)| (n.node.to_string(), to_json(&v.node, variables)))
                .collect();

            let id = match parent {
                None => tree.push_root(key.clone(), arguments),
                Some(p) => tree.push_child(p, key.clone(), arguments)?,
            };
            tree.set_alias(id, field.alias.as_ref().map(|a| a.node.to_string()));

            if !field.selection_set.node.items.is_empty() {
                let child_type = opts
                    .field_types
                    .get(key.as_str())
                    .cloned()
                    .unwrap_or_else(|| field.name.node.to_string());
                pending.push((&field.selection_set.node, Some(id), child_type));
            }
        }
    }

    Ok(LoweredOperation {
        tree,
        operation_type: match op.ty {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        },
        operation_name: name,
    })
}

fn select_operation<'a>(
    ops: &'a DocumentOperations,
    wanted: Option<&str>,
) -> Result<(Option<String>, &'a OperationDefinition)> {
    match ops {
        // the parser only produces `Single` for an anonymous operation
        DocumentOperations::Single(op) => match wanted {
            None => Ok((None, &op.node)),
            Some(w) => Err(FedgateError::QueryInvalid(format!("unknown operation: {w}"))),
        },
        DocumentOperations::Multiple(map) => match wanted {
            Some(w) => map
                .iter()
                .find(|(n, _)| n.as_str() == w)
                .map(|(n, op)| (Some(n.to_string()), &op.node))
                .ok_or_else(|| FedgateError::QueryInvalid(format!("unknown operation: {w}"))),
            None if map.len() == 1 => map
                .iter()
                .next()
                .map(|(n, op)| (Some(n.to_string()), &op.node))
                .ok_or_else(|| FedgateError::QueryInvalid("document has no operation".into())),
            None => Err(FedgateError::QueryInvalid(
                "operationName is required when the document has several operations".into(),
            )),
        },
    }
}

#[derive(Clone, Copy)]
struct Budget {
    remaining: usize,
    max_nodes: usize,
}

impl Budget {
    fn exceeded(self) -> FedgateError {
        FedgateError::QueryInvalid(format!("query selects more than {} fields", self.max_nodes))
    }
}

/// Inline fragments into the fields of one selection set, keeping document order.
/// Each field is paired with the parent type it was selected on. Stops as soon
/// as the set would yield more fields than `budget.remaining`.
fn flatten<'a>(
    set: &'a SelectionSet,
    parent_type: String,
    fragments: &'a Fragments,
    budget: Budget,
) -> Result<Vec<(&'a Field, String)>> {
    let mut out = Vec::new();
    let mut stack = vec![(set.items.iter(), parent_type)];

    loop {
        let Some((items, ty)) = stack.last_mut() else { break };
        let Some(sel) = items.next() else {
            stack.pop();
            continue;
        };
        let ty = ty.clone();

        match &sel.node {
            Selection::Field(f) => {
                if out.len() >= budget.remaining {
                    return Err(budget.exceeded());
                }
                out.push((&f.node, ty));
            }
            Selection::InlineFragment(inline) => {
                let cond = inline
                    .node
                    .type_condition
                    .as_ref()
                    .map(|c| c.node.on.node.to_string())
                    .unwrap_or(ty);
                stack.push((inline.node.selection_set.node.items.iter(), cond));
            }
            Selection::FragmentSpread(spread) => {
                let name = spread.node.fragment_name.node.as_str();
                let def = fragments
                    .iter()
                    .find(|(n, _)| n.as_str() == name)
                    .map(|(_, d)| &d.node)
                    .ok_or_else(|| FedgateError::QueryInvalid(format!("unknown fragment: {name}")))?;
                stack.push((
                    def.selection_set.node.items.iter(),
                    def.type_condition.node.on.node.to_string(),
                ));
            }
        }
    }

    Ok(out)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Active,
    Done,
}

fn reject_fragment_cycles(fragments: &Fragments) -> Result<()> {
    let mut spreads: HashMap<&str, Vec<&str>> = HashMap::new();
    for (name, def) in fragments {
        let mut found = Vec::new();
        let mut sets = vec![&def.node.selection_set.node];
        while let Some(set) = sets.pop() {
            for item in &set.items {
                match &item.node {
                    Selection::Field(f) => sets.push(&f.node.selection_set.node),
                    Selection::InlineFragment(i) => sets.push(&i.node.selection_set.node),
                    Selection::FragmentSpread(s) => found.push(s.node.fragment_name.node.as_str()),
                }
            }
        }
        spreads.insert(name.as_str(), found);
    }

    let mut state: HashMap<&str, Visit> = HashMap::new();
    for start in spreads.keys().copied() {
        if state.contains_key(start) {
            continue;
        }
        state.insert(start, Visit::Active);
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];

        loop {
            let Some(top) = stack.last_mut() else { break };
            let node = top.0;
            let next = spreads.get(node).and_then(|v| v.get(top.1)).copied();
            top.1 += 1;

            match next {
                None => {
                    state.insert(node, Visit::Done);
                    stack.pop();
                }
                Some(child) => match state.get(child) {
                    Some(Visit::Active) => {
                        return Err(FedgateError::QueryInvalid(format!(
                            "fragment cycle through {child}"
                        )));
                    }
                    Some(Visit::Done) => {}
                    // unknown names surface later as "unknown fragment" if actually spread
                    None if spreads.contains_key(child) => {
                        state.insert(child, Visit::Active);
                        stack.push((child, 0));
                    }
                    None => {}
                },
            }
        }
    }
    Ok(())
}

fn to_json(v: &GqlValue, variables: &Map<String, Value>) -> Value {
    match v {
        GqlValue::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or(Value::Null),
        GqlValue::Null => Value::Null,
        GqlValue::Number(n) => Value::Number(n.clone()),
        GqlValue::String(s) => Value::String(s.clone()),
        GqlValue::Boolean(b) => Value::Bool(*b),
        GqlValue::Binary(_) => Value::Null,
        GqlValue::Enum(e) => Value::String(e.to_string()),
        GqlValue::List(items) => Value::Array(items.iter().map(|i| to_json(i, variables)).collect()),
        GqlValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), to_json(v, variables)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn lower(text: &str) -> Result<LoweredOperation> {
        lower_with(text, None, &Map::new())
    }

    fn lower_with(text: &str, name: Option<&str>, vars: &Map<String, Value>) -> Result<LoweredOperation> {
        let types: HashMap<String, String> = [
            ("Query.products".to_string(), "Product".to_string()),
            ("Product.reviews".to_string(), "Review".to_string()),
        ]
        .into_iter()
        .collect();
        lower_operation(text, name, vars, LowerOptions { field_types: &types, max_nodes: 100 })
    }

    fn keys(op: &LoweredOperation) -> Vec<String> {
        op.tree.walk().map(|(n, _)| n.key.to_string()).collect()
    }

    #[test]
    fn resolves_parent_types() {
        let op = lower("{ products(first: 20) { name reviews { body } } me { id } }").unwrap();
        assert_eq!(
            keys(&op),
            vec![
                "Query.products",
                "Product.name",
                "Product.reviews",
                "Review.body",
                "Query.me",
                "me.id",
            ]
        );
        assert_eq!(op.operation_type, "query");
        assert_eq!(op.tree.max_depth(), 3);

        let root = op.tree.node(op.tree.roots()[0]).unwrap();
        assert_eq!(root.argument("first"), Some(&json!(20)));
    }

    #[test]
    fn expands_fragments_in_order() {
        let op = lower(
            "query Q { products { ...P sku } } fragment P on Product { name ... on Product { price } }",
        )
        .unwrap();
        assert_eq!(
            keys(&op),
            vec!["Query.products", "Product.name", "Product.price", "Product.sku"]
        );
        assert_eq!(op.operation_name.as_deref(), Some("Q"));
    }

    #[test]
    fn resolves_variables() {
        let vars: Map<String, Value> = [("n".to_string(), json!(5))].into_iter().collect();
        let op = lower_with("query Q($n: Int, $m: Int) { products(first: $n, last: $m) { name } }", None, &vars).unwrap();
        let root = op.tree.node(op.tree.roots()[0]).unwrap();
        assert_eq!(root.argument("first"), Some(&json!(5)));
        assert_eq!(root.argument("last"), Some(&Value::Null));
    }

    #[test]
    fn mutation_root_type() {
        let op = lower("mutation { addProduct(name: \"x\") { id } }").unwrap();
        assert_eq!(keys(&op)[0], "Mutation.addProduct");
        assert_eq!(op.operation_type, "mutation");
    }

    #[test]
    fn selects_named_operation() {
        let doc = "query A { a } query B { b }";
        let op = lower_with(doc, Some("B"), &Map::new()).unwrap();
        assert_eq!(keys(&op), vec!["Query.b"]);

        let err = lower(doc).unwrap_err();
        assert_eq!(err.client_code().as_str(), "QUERY_INVALID");
        assert!(lower_with(doc, Some("C"), &Map::new()).is_err());
    }

    #[test]
    fn rejects_malformed_text() {
        let err = lower("{ products { ").unwrap_err();
        assert_eq!(err.client_code().as_str(), "QUERY_INVALID");
    }

    #[test]
    fn rejects_unknown_fragment_and_cycles() {
        assert!(lower("{ products { ...Missing } }").is_err());
        let cyclic = "{ products { ...A } } fragment A on Product { ...B } fragment B on Product { ...A }";
        let err = lower(cyclic).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn node_budget_is_enforced() {
        let fields: String = (0..150).map(|i| format!(" f{i}")).collect();
        let err = lower(&format!("{{{fields} }}")).unwrap_err();
        assert_eq!(err.client_code().as_str(), "QUERY_INVALID");
    }

    #[test]
    fn doubling_fragments_stop_at_the_node_budget() {
        let levels = 40;
        let mut doc = String::from("{ products { ...F0 } }");
        for i in 0..levels {
            doc.push_str(&format!(" fragment F{i} on Product {{ ...F{n} ...F{n} }}", n = i + 1));
        }
        doc.push_str(&format!(" fragment F{levels} on Product {{ name }}"));

        let started = std::time::Instant::now();
        let err = lower(&doc).unwrap_err();
        assert_eq!(err.client_code().as_str(), "QUERY_INVALID");
        assert!(err.to_string().contains("more than 100 fields"));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn fragments_within_budget_still_expand() {
        let doc = "{ products { ...A } } fragment A on Product { ...B ...B } fragment B on Product { name sku }";
        let op = lower(doc).unwrap();
        assert_eq!(op.tree.len(), 5);
    }

    #[test]
    fn anonymous_operation_rejects_an_operation_name() {
        let err = lower_with("{ products { name } }", Some("Nope"), &Map::new()).unwrap_err();
        assert_eq!(err.client_code().as_str(), "QUERY_INVALID");
        assert!(err.to_string().contains("Nope"));

        let op = lower("{ products { name } }").unwrap();
        assert_eq!(op.operation_name, None);
    }
}
