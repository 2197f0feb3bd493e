use proptest::prelude::*;
use statreg_core::model::ClassificationNode;

/// One step applied to an enterprise unit that may belong to a fixed group.
#[derive(Debug, Clone)]
pub enum UnitOp {
    Rename(String),
    SetStatId(Option<String>),
    Delete,
    Undelete,
    Link,
    Unlink,
}

pub fn arb_unit_op() -> impl Strategy<Value = UnitOp> + Clone {
    prop_oneof![
        "[A-Za-z ]{1,12}".prop_map(UnitOp::Rename),
        prop::option::of("[0-9]{4}").prop_map(UnitOp::SetStatId),
        Just(UnitOp::Delete),
        Just(UnitOp::Undelete),
        Just(UnitOp::Link),
        Just(UnitOp::Unlink),
    ]
}

pub fn arb_unit_ops() -> impl Strategy<Value = Vec<UnitOp>> {
    prop::collection::vec(arb_unit_op(), 1..24)
}

/// Parent index for each node; node `i` can only hang under a node `< i`,
/// so every generated forest is acyclic.
pub fn arb_forest() -> impl Strategy<Value = Vec<Option<usize>>> {
    (1usize..24).prop_flat_map(|len| {
        (0..len)
            .map(|i| {
                if i == 0 {
                    Just(None).boxed()
                } else {
                    prop::option::weighted(0.85, 0..i).boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

/// A forest plus a list of re-parenting moves `(node, new_parent)` that keep
/// the `parent < child` ordering.
pub fn arb_forest_with_moves() -> impl Strategy<Value = (Vec<Option<usize>>, Vec<(usize, usize)>)>
{
    arb_forest().prop_flat_map(|parents| {
        let len = parents.len();
        let moves = if len < 2 {
            Just(Vec::new()).boxed()
        } else {
            prop::collection::vec((1..len).prop_flat_map(|i| (Just(i), 0..i)), 0..6).boxed()
        };
        (Just(parents), moves)
    })
}

pub const NODE_ID_BASE: i64 = 100;

pub fn node_id(index: usize) -> i64 {
    NODE_ID_BASE + i64::try_from(index).unwrap()
}

pub fn forest_nodes(parents: &[Option<usize>]) -> Vec<ClassificationNode> {
    let mut levels: Vec<i64> = Vec::with_capacity(parents.len());
    parents
        .iter()
        .enumerate()
        .map(|(i, parent)| {
            let level = parent.map_or(0, |p| levels[p] + 1);
            levels.push(level);
            ClassificationNode {
                id: node_id(i),
                code: format!("N{i}"),
                name: format!("Node {i}"),
                parent_id: parent.map(node_id),
                level,
            }
        })
        .collect()
}
