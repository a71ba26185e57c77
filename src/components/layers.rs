// ============================================================================
// LAYER GROUPS: named bundles of layer ids
// ============================================================================

use uuid::Uuid;

use crate::canvas::{CanvasState, LayerId};

pub type GroupId = Uuid;

/// A named set of layers sharing bulk visibility. Member order is independent
/// of stack order; a layer is in at most one group.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub member_layer_ids: Vec<LayerId>,
    pub visible: bool,
    /// Presentation only.
    pub collapsed: bool,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            member_layer_ids: Vec::new(),
            visible: true,
            collapsed: false,
        }
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.member_layer_ids.contains(&id)
    }
}

impl CanvasState {
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == id)
    }

    pub fn group_of(&self, layer: LayerId) -> Option<GroupId> {
        self.layer(layer).and_then(|l| l.group_id)
    }

    /// Bundle `ids` into a new group. Members leave whatever group they were in.
    /// Unknown ids are skipped; with no live ids nothing is created.
    pub fn create_group(&mut self, name: &str, ids: &[LayerId]) -> Option<GroupId> {
        let live: Vec<LayerId> = ids
            .iter()
            .copied()
            .filter(|id| self.index_of(*id).is_some())
            .collect();
        if live.is_empty() {
            return None;
        }
        let group = Group::new(name);
        let gid = group.id;
        self.groups.push(group);
        for id in live {
            self.attach_to_group(id, gid);
        }
        self.prune_empty_groups();
        log_info!("Created group '{}'", name);
        Some(gid)
    }

    /// Remove a group. Its members stay in the stack, ungrouped.
    pub fn ungroup(&mut self, gid: GroupId) -> bool {
        let Some(pos) = self.groups.iter().position(|g| g.id == gid) else { return false };
        let group = self.groups.remove(pos);
        for id in group.member_layer_ids {
            if let Some(layer) = self.layer_mut(id) {
                layer.group_id = None;
            }
        }
        true
    }

    /// Move a layer into `gid`, leaving its previous group.
    pub fn add_layer_to_group(&mut self, layer: LayerId, gid: GroupId) -> bool {
        if self.index_of(layer).is_none() || self.group(gid).is_none() {
            return false;
        }
        self.attach_to_group(layer, gid);
        self.prune_empty_groups();
        true
    }

    /// Set a group's visibility and fan it out to every member layer.
    pub fn set_group_visible(&mut self, gid: GroupId, visible: bool) -> bool {
        let Some(group) = self.group_mut(gid) else { return false };
        group.visible = visible;
        let members = group.member_layer_ids.clone();
        for id in members {
            self.set_layer_visible(id, visible);
        }
        true
    }

    pub fn toggle_group_collapsed(&mut self, gid: GroupId) -> bool {
        match self.group_mut(gid) {
            Some(group) => {
                group.collapsed = !group.collapsed;
                true
            }
            None => false,
        }
    }

    pub fn set_group_collapsed(&mut self, gid: GroupId, collapsed: bool) {
        if let Some(group) = self.group_mut(gid) {
            group.collapsed = collapsed;
        }
    }

    pub(crate) fn attach_to_group(&mut self, layer: LayerId, gid: GroupId) {
        self.detach_from_group(layer);
        if let Some(group) = self.group_mut(gid) {
            group.member_layer_ids.push(layer);
        }
        if let Some(l) = self.layer_mut(layer) {
            l.group_id = Some(gid);
        }
    }

    pub(crate) fn detach_from_group(&mut self, layer: LayerId) {
        for group in &mut self.groups {
            group.member_layer_ids.retain(|id| *id != layer);
        }
        if let Some(l) = self.layer_mut(layer) {
            l.group_id = None;
        }
    }

    pub(crate) fn prune_empty_groups(&mut self) {
        self.groups.retain(|g| !g.member_layer_ids.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(n: usize) -> (CanvasState, Vec<LayerId>) {
        let mut canvas = CanvasState::new(2, 2);
        let ids = (0..n).map(|_| canvas.add_layer(None, None, None, None)).collect();
        (canvas, ids)
    }

    #[test]
    fn group_visibility_fans_out() {
        let (mut canvas, ids) = stack(3);
        let gid = canvas.create_group("Pair", &ids[..2]).unwrap();
        assert!(canvas.set_group_visible(gid, false));
        assert!(!canvas.layer(ids[0]).unwrap().visible);
        assert!(!canvas.layer(ids[1]).unwrap().visible);
        assert!(canvas.layer(ids[2]).unwrap().visible);
    }

    #[test]
    fn ungroup_keeps_members() {
        let (mut canvas, ids) = stack(2);
        let gid = canvas.create_group("G", &ids).unwrap();
        assert!(canvas.ungroup(gid));
        assert_eq!(canvas.layers.len(), 2);
        assert!(canvas.groups.is_empty());
        assert_eq!(canvas.group_of(ids[0]), None);
    }

    #[test]
    fn layer_belongs_to_one_group() {
        let (mut canvas, ids) = stack(3);
        let g1 = canvas.create_group("one", &ids[..2]).unwrap();
        let g2 = canvas.create_group("two", &ids[2..]).unwrap();
        assert!(canvas.add_layer_to_group(ids[0], g2));
        assert_eq!(canvas.group_of(ids[0]), Some(g2));
        assert!(!canvas.group(g1).unwrap().contains(ids[0]));
        assert_eq!(canvas.group(g2).unwrap().member_layer_ids, vec![ids[2], ids[0]]);
    }

    #[test]
    fn emptied_groups_are_removed() {
        let (mut canvas, ids) = stack(3);
        canvas.create_group("solo", &ids[..1]).unwrap();
        assert!(canvas.delete_layer(ids[0]));
        assert!(canvas.groups.is_empty());

        let gid = canvas.create_group("pair", &ids[1..]).unwrap();
        let merged = canvas.merge(&ids[1..]).unwrap();
        assert!(canvas.group(gid).is_none());
        assert_eq!(canvas.group_of(merged), None);
    }

    #[test]
    fn new_layer_joins_active_group() {
        let (mut canvas, ids) = stack(1);
        let gid = canvas.create_group("G", &ids).unwrap();
        let fresh = canvas.add_layer(None, None, None, None);
        assert_eq!(canvas.group_of(fresh), Some(gid));
        assert!(canvas.toggle_group_collapsed(gid));
        assert!(canvas.group(gid).unwrap().collapsed);
    }
}
