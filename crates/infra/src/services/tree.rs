//! Parent/child helpers shared by menus and departments.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

use super::{ServiceError, ServiceResult};

/// A record with its children, serialised flat (`{...record, children: []}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode<T> {
    #[serde(flatten)]
    pub item: T,
    pub children: Vec<TreeNode<T>>,
}

/// Assemble a forest. Items whose parent is missing become roots; sibling
/// order follows input order. Items caught in a parent cycle are never lost:
/// each cycle is broken at its earliest item, which becomes a root.
pub fn build_tree<T, K>(items: Vec<T>, id: impl Fn(&T) -> K, parent: impl Fn(&T) -> Option<K>) -> Vec<TreeNode<T>>
where
    K: Copy + Eq + Hash,
{
    let order: HashMap<K, usize> = items.iter().enumerate().map(|(i, item)| (id(item), i)).collect();
    let mut children: HashMap<K, Vec<T>> = HashMap::new();
    let mut roots = Vec::new();

    for item in items {
        match parent(&item).filter(|p| order.contains_key(p) && *p != id(&item)) {
            Some(p) => children.entry(p).or_default().push(item),
            None => roots.push(item),
        }
    }

    fn attach<T, K: Copy + Eq + Hash>(
        item: T,
        id: &impl Fn(&T) -> K,
        children: &mut HashMap<K, Vec<T>>,
    ) -> TreeNode<T> {
        let kids = children.remove(&id(&item)).unwrap_or_default();
        TreeNode {
            children: kids.into_iter().map(|k| attach(k, id, children)).collect(),
            item,
        }
    }

    let mut forest: Vec<TreeNode<T>> = roots.into_iter().map(|r| attach(r, &id, &mut children)).collect();
    while let Some(item) = take_earliest(&mut children, &order, &id) {
        forest.push(attach(item, &id, &mut children));
    }
    forest
}

/// Remove the leftover child that came first in the input.
fn take_earliest<T, K: Copy + Eq + Hash>(
    children: &mut HashMap<K, Vec<T>>,
    order: &HashMap<K, usize>,
    id: &impl Fn(&T) -> K,
) -> Option<T> {
    let (parent, pos) = children
        .iter()
        .flat_map(|(p, kids)| kids.iter().enumerate().map(move |(i, kid)| (*p, i, kid)))
        .min_by_key(|(_, _, kid)| order.get(&id(*kid)).copied().unwrap_or(usize::MAX))
        .map(|(p, i, _)| (p, i))?;
    let kids = children.get_mut(&parent)?;
    let item = kids.remove(pos);
    if kids.is_empty() {
        children.remove(&parent);
    }
    Some(item)
}

/// Reject a parent assignment that would make `id` its own ancestor.
///
/// `parent_of` returns the current parent of any node. The walk is bounded
/// by `limit` so pre-existing corrupt cycles cannot spin forever.
pub fn check_parent<K>(
    entity: &str,
    id: K,
    new_parent: Option<K>,
    limit: usize,
    parent_of: impl Fn(K) -> Option<K>,
) -> ServiceResult<()>
where
    K: Copy + Eq,
{
    let Some(mut cursor) = new_parent else {
        return Ok(());
    };
    if cursor == id {
        return Err(ServiceError::validation(format!("{entity} cannot be its own parent")));
    }
    for _ in 0..=limit {
        match parent_of(cursor) {
            Some(p) if p == id => {
                return Err(ServiceError::validation(format!(
                    "{entity} parent would create a circular reference"
                )));
            }
            Some(p) => cursor = p,
            None => return Ok(()),
        }
    }
    Err(ServiceError::validation(format!("{entity} hierarchy is too deep or already cyclic")))
}
