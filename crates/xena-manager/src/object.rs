//! Object tree
//!
//! Every remote object lives in an arena owned by the session. Nodes are
//! addressed by [`ObjectId`]; the parent link is a plain id and children are
//! owned through the parent's child map, so removing a node drops its whole
//! subtree. Each node carries its own attribute cache and the set of child
//! kinds it has already discovered.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use xena_protocol::{Location, ModifierConfig, ModifierType, ObjectKind};

use crate::error::{XenaError, XenaResult};

/// Arena key of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

/// Key of a child inside its parent
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChildKey {
    /// Chassis under the session, keyed by address
    Chassis(String),
    /// Module, port, stream or modifier keyed by its last index
    Indexed(ObjectKind, u32),
}

/// Kind-specific state carried by a node
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectData {
    Session,
    Chassis {
        /// TCP port the chassis was added with
        port: u16,
    },
    Module,
    Port,
    Stream {
        /// Extended modifier support, once probed
        extended_modifiers: Option<bool>,
    },
    Modifier {
        /// Last configuration written to or read from the device
        config: Option<ModifierConfig>,
    },
}

impl ObjectData {
    fn for_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Session => ObjectData::Session,
            ObjectKind::Chassis => ObjectData::Chassis { port: 0 },
            ObjectKind::Module => ObjectData::Module,
            ObjectKind::Port => ObjectData::Port,
            ObjectKind::Stream => ObjectData::Stream {
                extended_modifiers: None,
            },
            ObjectKind::Modifier(_) => ObjectData::Modifier { config: None },
        }
    }
}

/// One node of the object tree
#[derive(Debug, Clone)]
pub struct XenaObject {
    id: ObjectId,
    reference: String,
    kind: ObjectKind,
    chassis: String,
    location: Location,
    parent: Option<ObjectId>,
    children: BTreeMap<ChildKey, ObjectId>,
    attributes: BTreeMap<String, String>,
    discovered: BTreeSet<ObjectKind>,
    pub(crate) data: ObjectData,
}

impl XenaObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Full hierarchical reference, unique within the session
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Address of the owning chassis; empty for the session
    pub fn chassis(&self) -> &str {
        &self.chassis
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Last index of the location (module, port, stream or modifier number)
    pub fn index(&self) -> Option<u32> {
        self.location.last()
    }

    /// Cached attribute values, keyed by lower-case attribute name
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn data(&self) -> &ObjectData {
        &self.data
    }

    /// Whether children of `kind` have been discovered from the device
    pub fn is_discovered(&self, kind: ObjectKind) -> bool {
        self.discovered.contains(&kind)
    }
}

/// Arena of all objects in a session
#[derive(Debug)]
pub struct ObjectTree {
    objects: HashMap<ObjectId, XenaObject>,
    by_reference: HashMap<String, ObjectId>,
    next_id: u64,
    root: ObjectId,
}

impl ObjectTree {
    /// Create a tree holding only the session root named after `owner`
    pub fn new(owner: &str) -> Self {
        let root = ObjectId(0);
        let session = XenaObject {
            id: root,
            reference: owner.to_string(),
            kind: ObjectKind::Session,
            chassis: String::new(),
            location: Location::session(),
            parent: None,
            children: BTreeMap::new(),
            attributes: BTreeMap::new(),
            discovered: BTreeSet::new(),
            data: ObjectData::Session,
        };

        let mut objects = HashMap::new();
        objects.insert(root, session);
        let mut by_reference = HashMap::new();
        by_reference.insert(owner.to_string(), root);

        Self {
            objects,
            by_reference,
            next_id: 1,
            root,
        }
    }

    /// Id of the session root
    pub fn root(&self) -> ObjectId {
        self.root
    }

    /// Number of live objects, including the root
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn get(&self, id: ObjectId) -> XenaResult<&XenaObject> {
        self.objects
            .get(&id)
            .ok_or_else(|| XenaError::ObjectNotFound(format!("object #{}", id.0)))
    }

    pub(crate) fn get_mut(&mut self, id: ObjectId) -> XenaResult<&mut XenaObject> {
        self.objects
            .get_mut(&id)
            .ok_or_else(|| XenaError::ObjectNotFound(format!("object #{}", id.0)))
    }

    /// Look an object up by its reference
    pub fn find(&self, reference: &str) -> Option<ObjectId> {
        self.by_reference.get(reference).copied()
    }

    /// Get an object and check its kind
    pub fn expect_kind(&self, id: ObjectId, kind: ObjectKind) -> XenaResult<&XenaObject> {
        let object = self.get(id)?;
        if object.kind != kind {
            return Err(XenaError::WrongKind {
                reference: object.reference.clone(),
                expected: kind,
                actual: object.kind,
            });
        }
        Ok(object)
    }

    /// Add a chassis node under the root
    pub fn insert_chassis(&mut self, address: &str, port: u16) -> XenaResult<ObjectId> {
        let root = self.root;
        let reference = format!("{}/chassis/{}", self.get(root)?.reference, address);
        let id = self.insert(
            root,
            ChildKey::Chassis(address.to_string()),
            reference,
            address.to_string(),
            Location::chassis(),
        )?;
        self.get_mut(id)?.data = ObjectData::Chassis { port };
        Ok(id)
    }

    /// Add a numbered child of `kind` under `parent`
    pub fn insert_indexed(&mut self, parent: ObjectId, kind: ObjectKind, index: u32) -> XenaResult<ObjectId> {
        let (reference, chassis, location) = {
            let parent_object = self.get(parent)?;
            (
                format!("{}/{}/{}", parent_object.reference, kind.name(), index),
                parent_object.chassis.clone(),
                parent_object.location.child(kind, index),
            )
        };
        self.insert(parent, ChildKey::Indexed(kind, index), reference, chassis, location)
    }

    fn insert(
        &mut self,
        parent: ObjectId,
        key: ChildKey,
        reference: String,
        chassis: String,
        location: Location,
    ) -> XenaResult<ObjectId> {
        if self.by_reference.contains_key(&reference) {
            return Err(XenaError::ObjectExists(reference));
        }

        let id = ObjectId(self.next_id);
        self.next_id += 1;
        let kind = location.kind();

        self.get_mut(parent)?.children.insert(key, id);
        self.by_reference.insert(reference.clone(), id);
        self.objects.insert(
            id,
            XenaObject {
                id,
                reference,
                kind,
                chassis,
                location,
                parent: Some(parent),
                children: BTreeMap::new(),
                attributes: BTreeMap::new(),
                discovered: BTreeSet::new(),
                data: ObjectData::for_kind(kind),
            },
        );
        Ok(id)
    }

    /// Remove an object and its whole subtree
    pub fn remove(&mut self, id: ObjectId) -> XenaResult<()> {
        if id == self.root {
            return Err(XenaError::WrongKind {
                reference: self.get(id)?.reference.clone(),
                expected: ObjectKind::Chassis,
                actual: ObjectKind::Session,
            });
        }

        let parent = self.get(id)?.parent;
        if let Some(parent) = parent.and_then(|p| self.objects.get_mut(&p)) {
            parent.children.retain(|_, child| *child != id);
        }

        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(object) = self.objects.remove(&next) {
                self.by_reference.remove(&object.reference);
                pending.extend(object.children.into_values());
            }
        }
        Ok(())
    }

    /// Remove every child of `kind` under `parent`
    pub fn remove_children(&mut self, parent: ObjectId, kind: ObjectKind) -> XenaResult<()> {
        for (_, child) in self.children_of(parent, kind)? {
            self.remove(child)?;
        }
        Ok(())
    }

    /// Indexed child of `parent`
    pub fn child(&self, parent: ObjectId, kind: ObjectKind, index: u32) -> Option<ObjectId> {
        self.objects
            .get(&parent)?
            .children
            .get(&ChildKey::Indexed(kind, index))
            .copied()
    }

    /// Chassis node for `address`
    pub fn chassis(&self, address: &str) -> Option<ObjectId> {
        self.objects
            .get(&self.root)?
            .children
            .get(&ChildKey::Chassis(address.to_string()))
            .copied()
    }

    /// Numbered children of `kind`, in ascending index order
    pub fn children_of(&self, parent: ObjectId, kind: ObjectKind) -> XenaResult<Vec<(u32, ObjectId)>> {
        Ok(self
            .get(parent)?
            .children
            .iter()
            .filter_map(|(key, id)| match key {
                ChildKey::Indexed(k, index) if *k == kind => Some((*index, *id)),
                _ => None,
            })
            .collect())
    }

    /// Chassis children of the root, keyed by address
    pub fn chassis_children(&self) -> Vec<(String, ObjectId)> {
        self.objects
            .get(&self.root)
            .map(|root| {
                root.children
                    .iter()
                    .filter_map(|(key, id)| match key {
                        ChildKey::Chassis(address) => Some((address.clone(), *id)),
                        ChildKey::Indexed(..) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All live objects of `kind`, ordered by reference
    pub fn objects_of_kind(&self, kind: ObjectKind) -> Vec<&XenaObject> {
        let mut found: Vec<&XenaObject> = self.objects.values().filter(|o| o.kind == kind).collect();
        found.sort_by(|a, b| a.reference.cmp(&b.reference));
        found
    }

    /// Modifier type of a modifier node
    pub fn modifier_type(&self, id: ObjectId) -> XenaResult<ModifierType> {
        let object = self.get(id)?;
        match object.kind {
            ObjectKind::Modifier(modifier_type) => Ok(modifier_type),
            actual => Err(XenaError::WrongKind {
                reference: object.reference.clone(),
                expected: ObjectKind::Modifier(ModifierType::Standard),
                actual,
            }),
        }
    }

    pub(crate) fn cache_attribute(&mut self, id: ObjectId, name: &str, value: &str) -> XenaResult<()> {
        self.get_mut(id)?
            .attributes
            .insert(name.to_ascii_lowercase(), value.to_string());
        Ok(())
    }

    pub(crate) fn set_discovered(&mut self, id: ObjectId, kind: ObjectKind, discovered: bool) -> XenaResult<()> {
        let object = self.get_mut(id)?;
        if discovered {
            object.discovered.insert(kind);
        } else {
            object.discovered.remove(&kind);
        }
        Ok(())
    }
}

/// Typed handles
///
/// A handle is a copyable id that remembers which kind of object it points
/// at. Handles outlive the objects they name; using a handle after its
/// object was removed fails with [`XenaError::ObjectNotFound`].
macro_rules! object_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) ObjectId);

        impl $name {
            /// Arena id behind this handle
            pub fn id(&self) -> ObjectId {
                self.0
            }
        }

        impl From<$name> for ObjectId {
            fn from(handle: $name) -> Self {
                handle.0
            }
        }
    };
}

object_handle!(
    /// Handle to a chassis
    ChassisHandle
);
object_handle!(
    /// Handle to a module
    ModuleHandle
);
object_handle!(
    /// Handle to a port
    PortHandle
);
object_handle!(
    /// Handle to a stream
    StreamHandle
);
object_handle!(
    /// Handle to a standard or extended modifier
    ModifierHandle
);

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (ObjectTree, ObjectId, ObjectId, ObjectId) {
        let mut tree = ObjectTree::new("tester");
        let chassis = tree.insert_chassis("10.0.0.1", 22611).unwrap();
        let module = tree.insert_indexed(chassis, ObjectKind::Module, 0).unwrap();
        let port = tree.insert_indexed(module, ObjectKind::Port, 1).unwrap();
        (tree, chassis, module, port)
    }

    #[test]
    fn test_references_follow_hierarchy() {
        let (mut tree, chassis, _module, port) = sample_tree();
        let stream = tree.insert_indexed(port, ObjectKind::Stream, 3).unwrap();
        let modifier = tree
            .insert_indexed(stream, ObjectKind::Modifier(ModifierType::Extended), 0)
            .unwrap();

        assert_eq!(tree.get(chassis).unwrap().reference(), "tester/chassis/10.0.0.1");
        assert_eq!(
            tree.get(port).unwrap().reference(),
            "tester/chassis/10.0.0.1/module/0/port/1"
        );
        assert_eq!(
            tree.get(modifier).unwrap().reference(),
            "tester/chassis/10.0.0.1/module/0/port/1/stream/3/xmodifier/0"
        );
        assert_eq!(tree.get(modifier).unwrap().location().index(), &[0, 1, 3, 0]);
        assert_eq!(tree.get(modifier).unwrap().chassis(), "10.0.0.1");
        assert_eq!(tree.find("tester/chassis/10.0.0.1/module/0/port/1"), Some(port));
    }

    #[test]
    fn test_duplicate_reference_rejected() {
        let (mut tree, _chassis, module, _port) = sample_tree();
        let result = tree.insert_indexed(module, ObjectKind::Port, 1);
        assert!(matches!(result, Err(XenaError::ObjectExists(_))));
    }

    #[test]
    fn test_remove_drops_subtree() {
        let (mut tree, _chassis, module, port) = sample_tree();
        let stream = tree.insert_indexed(port, ObjectKind::Stream, 0).unwrap();

        tree.remove(module).unwrap();

        assert!(!tree.contains(port));
        assert!(matches!(tree.get(stream), Err(XenaError::ObjectNotFound(_))));
        assert_eq!(tree.find("tester/chassis/10.0.0.1/module/0"), None);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut tree = ObjectTree::new("tester");
        let root = tree.root();
        assert!(tree.remove(root).is_err());
        assert!(tree.contains(root));
    }

    #[test]
    fn test_children_sorted_by_index() {
        let (mut tree, _chassis, _module, port) = sample_tree();
        for index in [5, 0, 2] {
            tree.insert_indexed(port, ObjectKind::Stream, index).unwrap();
        }
        let indices: Vec<u32> = tree
            .children_of(port, ObjectKind::Stream)
            .unwrap()
            .into_iter()
            .map(|(index, _)| index)
            .collect();
        assert_eq!(indices, vec![0, 2, 5]);
    }

    #[test]
    fn test_modifier_kinds_are_separate_children() {
        let (mut tree, _chassis, _module, port) = sample_tree();
        let stream = tree.insert_indexed(port, ObjectKind::Stream, 0).unwrap();
        tree.insert_indexed(stream, ObjectKind::Modifier(ModifierType::Standard), 0)
            .unwrap();
        tree.insert_indexed(stream, ObjectKind::Modifier(ModifierType::Extended), 0)
            .unwrap();

        tree.remove_children(stream, ObjectKind::Modifier(ModifierType::Standard))
            .unwrap();

        assert!(tree
            .children_of(stream, ObjectKind::Modifier(ModifierType::Standard))
            .unwrap()
            .is_empty());
        assert_eq!(
            tree.children_of(stream, ObjectKind::Modifier(ModifierType::Extended))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_expect_kind() {
        let (tree, _chassis, module, _port) = sample_tree();
        assert!(tree.expect_kind(module, ObjectKind::Module).is_ok());
        let err = tree.expect_kind(module, ObjectKind::Port).unwrap_err();
        assert!(matches!(err, XenaError::WrongKind { .. }));
    }

    #[test]
    fn test_attribute_cache_is_lowercase() {
        let (mut tree, _chassis, _module, port) = sample_tree();
        tree.cache_attribute(port, "P_COMMENT", "\"x\"").unwrap();
        assert_eq!(
            tree.get(port).unwrap().attributes().get("p_comment").map(String::as_str),
            Some("\"x\"")
        );
    }
}
