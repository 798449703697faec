use std::collections::HashMap;

use types::primitives::{Epoch, Gwei, Slot, H256};

use crate::Error;

/// One block in the flat tree. Nodes refer to each other by index into
/// [`ProtoArray::nodes`], never by pointer; parents always precede their
/// children in the vector.
#[derive(Clone, PartialEq, Debug)]
pub struct ProtoNode {
    pub slot: Slot,
    pub root: H256,
    pub parent: Option<usize>,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    pub weight: Gwei,
    pub best_child: Option<usize>,
    pub best_descendant: Option<usize>,
}

/// The flat LMD-GHOST block tree.
///
/// Weight changes arrive as per-node deltas and are back-propagated in one
/// reverse sweep; the head is then a walk down best-descendant pointers.
#[derive(Default)]
pub struct ProtoArray {
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    nodes: Vec<ProtoNode>,
    indices: HashMap<H256, usize>,
}

impl ProtoArray {
    pub fn new(
        anchor_slot: Slot,
        anchor_root: H256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Self {
        let mut array = Self {
            justified_epoch,
            finalized_epoch,
            nodes: Vec::new(),
            indices: HashMap::new(),
        };
        array.insert_node(ProtoNode {
            slot: anchor_slot,
            root: anchor_root,
            parent: None,
            justified_epoch,
            finalized_epoch,
            weight: 0,
            best_child: None,
            best_descendant: None,
        });
        array
    }

    pub fn contains_block(&self, root: &H256) -> bool {
        self.indices.contains_key(root)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn index_of(&self, root: &H256) -> Option<usize> {
        self.indices.get(root).copied()
    }

    pub fn block_slot(&self, root: &H256) -> Option<Slot> {
        self.index_of(root).map(|index| self.nodes[index].slot)
    }

    /// Whether `descendant` sits in the subtree rooted at `ancestor`. A
    /// block is its own descendant.
    pub fn is_descendant(&self, ancestor: &H256, descendant: &H256) -> bool {
        let ancestor_index = match self.index_of(ancestor) {
            Some(index) => index,
            None => return false,
        };
        let mut cursor = self.index_of(descendant);
        while let Some(index) = cursor {
            if index == ancestor_index {
                return true;
            }
            cursor = self.nodes[index].parent;
        }
        false
    }

    /// Registers a block whose parent is already known.
    pub fn on_block(
        &mut self,
        slot: Slot,
        root: H256,
        parent_root: H256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error> {
        if self.indices.contains_key(&root) {
            return Err(Error::DuplicateBlock(root));
        }
        let parent = self
            .indices
            .get(&parent_root)
            .copied()
            .ok_or(Error::UnknownParent(parent_root))?;

        let node_index = self.insert_node(ProtoNode {
            slot,
            root,
            parent: Some(parent),
            justified_epoch,
            finalized_epoch,
            weight: 0,
            best_child: None,
            best_descendant: None,
        });

        self.update_best_child_and_descendant(parent, node_index)?;
        Ok(())
    }

    fn insert_node(&mut self, node: ProtoNode) -> usize {
        let node_index = self.nodes.len();
        self.indices.insert(node.root, node_index);
        self.nodes.push(node);
        node_index
    }

    /// Applies one delta per node and back-propagates the sums to parents,
    /// re-evaluating every parent's best child along the way. The reverse
    /// sweep touches each child before its parent because children always
    /// come later in the vector.
    pub fn apply_score_changes(
        &mut self,
        mut deltas: Vec<i64>,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error> {
        if deltas.len() != self.nodes.len() {
            return Err(Error::InvalidDeltaLength {
                deltas: deltas.len(),
                nodes: self.nodes.len(),
            });
        }

        self.justified_epoch = justified_epoch;
        self.finalized_epoch = finalized_epoch;

        for node_index in (0..self.nodes.len()).rev() {
            let node_delta = deltas[node_index];
            let node = &mut self.nodes[node_index];

            if node_delta < 0 {
                node.weight = node
                    .weight
                    .checked_sub(node_delta.unsigned_abs())
                    .ok_or(Error::DeltaOverflow(node_index))?;
            } else {
                node.weight = node
                    .weight
                    .checked_add(node_delta as u64)
                    .ok_or(Error::DeltaOverflow(node_index))?;
            }

            if let Some(parent_index) = node.parent {
                deltas[parent_index] += node_delta;
                self.update_best_child_and_descendant(parent_index, node_index)?;
            }
        }

        Ok(())
    }

    /// Walks down from the justified root along best-descendant pointers.
    pub fn find_head(&self, justified_root: &H256) -> Result<H256, Error> {
        let justified_index = self
            .indices
            .get(justified_root)
            .copied()
            .ok_or(Error::UnknownJustifiedRoot(*justified_root))?;
        let justified_node = &self.nodes[justified_index];

        let best_index = justified_node.best_descendant.unwrap_or(justified_index);
        let best_node = &self.nodes[best_index];

        if !self.node_is_viable_for_head(best_node) {
            return Err(Error::NoViableHead {
                justified_epoch: self.justified_epoch,
                finalized_epoch: self.finalized_epoch,
            });
        }

        Ok(best_node.root)
    }

    /// Drops everything that does not descend from the new finalized root
    /// and makes that root the tree root. Index references are remapped in
    /// one forward pass; parents precede children, so a node's fate is
    /// known by the time its children are visited.
    pub fn prune(&mut self, finalized_root: H256) -> Result<(), Error> {
        let finalized_index = self
            .indices
            .get(&finalized_root)
            .copied()
            .ok_or(Error::UnknownFinalizedRoot(finalized_root))?;

        let mut new_indices: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut kept = Vec::with_capacity(self.nodes.len() - finalized_index);

        for (index, mut node) in self.nodes.drain(..).enumerate() {
            let keep = if index == finalized_index {
                node.parent = None;
                true
            } else {
                match node.parent {
                    Some(parent) => new_indices[parent].is_some(),
                    None => false,
                }
            };

            if keep {
                new_indices[index] = Some(kept.len());
                if index != finalized_index {
                    node.parent = node.parent.and_then(|parent| new_indices[parent]);
                }
                kept.push(node);
            }
        }

        for node in kept.iter_mut() {
            node.best_child = node.best_child.and_then(|child| new_indices[child]);
            node.best_descendant = node
                .best_descendant
                .and_then(|descendant| new_indices[descendant]);
        }

        self.indices = kept
            .iter()
            .enumerate()
            .map(|(index, node)| (node.root, index))
            .collect();
        self.nodes = kept;

        Ok(())
    }

    /// Re-evaluates `parent.best_child` and `parent.best_descendant` with
    /// respect to one child. Ties between viable children break towards the
    /// lexicographically higher root.
    fn update_best_child_and_descendant(
        &mut self,
        parent_index: usize,
        child_index: usize,
    ) -> Result<(), Error> {
        let child = &self.nodes[child_index];
        let parent = &self.nodes[parent_index];

        let child_viable = self.node_leads_to_viable_head(child);
        let child_option = (
            Some(child_index),
            child.best_descendant.or(Some(child_index)),
        );
        let no_change = (parent.best_child, parent.best_descendant);

        let (new_best_child, new_best_descendant) = match parent.best_child {
            Some(best_child_index) if best_child_index == child_index => {
                if child_viable {
                    // Re-linking refreshes the parent's best-descendant.
                    child_option
                } else {
                    (None, None)
                }
            }
            Some(best_child_index) => {
                let best_child = &self.nodes[best_child_index];
                let best_child_viable = self.node_leads_to_viable_head(best_child);

                if child_viable && !best_child_viable {
                    child_option
                } else if !child_viable && best_child_viable {
                    no_change
                } else if child.weight > best_child.weight
                    || (child.weight == best_child.weight && child.root >= best_child.root)
                {
                    child_option
                } else {
                    no_change
                }
            }
            None => {
                if child_viable {
                    child_option
                } else {
                    no_change
                }
            }
        };

        let parent = &mut self.nodes[parent_index];
        parent.best_child = new_best_child;
        parent.best_descendant = new_best_descendant;

        Ok(())
    }

    fn node_leads_to_viable_head(&self, node: &ProtoNode) -> bool {
        let descendant_viable = node
            .best_descendant
            .map(|index| self.node_is_viable_for_head(&self.nodes[index]))
            .unwrap_or(false);

        descendant_viable || self.node_is_viable_for_head(node)
    }

    /// The Casper filter: a node disagreeing with the store about
    /// justification or finalization cannot become the head.
    fn node_is_viable_for_head(&self, node: &ProtoNode) -> bool {
        (node.justified_epoch == self.justified_epoch || self.justified_epoch == 0)
            && (node.finalized_epoch == self.finalized_epoch || self.finalized_epoch == 0)
    }
}
