//! Embedded in-memory repository.
//!
//! Single-threaded: every handle shares one `Rc<RefCell<Store>>`. Transient
//! changes live in the working tree until `save` copies them to the saved tree
//! or `refresh(false)` throws them away. Registries apply immediately.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Map;
use tracing::debug;

use crate::repo::registry::{
    NamespaceRegistry, NodeTypeRegistry, PrivilegeRegistry, MIX_VERSIONABLE, NT_UNSTRUCTURED,
};
use crate::repo::{
    path, query, AccessEntry, Node, NodeIter, NodeTypeDef, PrivilegeDef, Property, PropertyIter,
    PropertyValue, QueryResult, RepoError, RepoResult, Repository, Session, Value, JCR_IS_CHECKED_OUT,
    JCR_MIXIN_TYPES, JCR_PRIMARY_TYPE,
};

const PROTECTED: &[&str] = &[JCR_PRIMARY_TYPE, JCR_MIXIN_TYPES, JCR_IS_CHECKED_OUT];
const MIX_SIMPLE_VERSIONABLE: &str = "mix:simpleVersionable";

#[derive(Debug, Clone, Default)]
struct NodeState {
    properties: BTreeMap<String, PropertyValue>,
    children: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Tree {
    nodes: BTreeMap<String, NodeState>,
    acl: BTreeMap<String, Vec<AccessEntry>>,
}

impl Tree {
    fn with_root() -> Self {
        let mut root = NodeState::default();
        root.properties
            .insert(JCR_PRIMARY_TYPE.to_string(), PropertyValue::name("rep:root"));
        let mut tree = Tree::default();
        tree.nodes.insert(path::ROOT.to_string(), root);
        tree
    }
}

#[derive(Debug)]
struct Store {
    saved: Tree,
    working: Tree,
    dirty: bool,
    live: bool,
    namespaces: NamespaceRegistry,
    node_types: NodeTypeRegistry,
    privileges: PrivilegeRegistry,
}

type SharedStore = Rc<RefCell<Store>>;

impl Store {
    fn ensure_live(&self) -> RepoResult<()> {
        if self.live {
            Ok(())
        } else {
            Err(RepoError::SessionClosed)
        }
    }

    fn state(&self, p: &str) -> RepoResult<&NodeState> {
        self.ensure_live()?;
        self.working
            .nodes
            .get(p)
            .ok_or_else(|| RepoError::PathNotFound(p.to_string()))
    }

    fn state_mut(&mut self, p: &str) -> RepoResult<&mut NodeState> {
        self.ensure_live()?;
        self.working
            .nodes
            .get_mut(p)
            .ok_or_else(|| RepoError::PathNotFound(p.to_string()))
    }

    fn primary_type(&self, p: &str) -> RepoResult<String> {
        Ok(self
            .state(p)?
            .properties
            .get(JCR_PRIMARY_TYPE)
            .and_then(PropertyValue::first)
            .map(Value::as_string)
            .unwrap_or_else(|| NT_UNSTRUCTURED.to_string()))
    }

    fn mixins(&self, p: &str) -> RepoResult<Vec<String>> {
        Ok(self
            .state(p)?
            .properties
            .get(JCR_MIXIN_TYPES)
            .map(PropertyValue::strings)
            .unwrap_or_default())
    }

    fn is_node_type(&self, p: &str, name: &str) -> RepoResult<bool> {
        let primary = self.primary_type(p)?;
        if self.node_types.is_subtype(&primary, name) {
            return Ok(true);
        }
        Ok(self
            .mixins(p)?
            .iter()
            .any(|m| self.node_types.is_subtype(m, name)))
    }

    fn is_checked_out(&self, p: &str) -> RepoResult<bool> {
        Ok(!matches!(
            self.state(p)?.properties.get(JCR_IS_CHECKED_OUT),
            Some(PropertyValue::Single(Value::Boolean(false)))
        ))
    }

    fn ensure_checked_out(&self, p: &str) -> RepoResult<()> {
        if self.is_checked_out(p)? {
            Ok(())
        } else {
            Err(RepoError::CheckedIn(p.to_string()))
        }
    }

    fn add_node(&mut self, parent: &str, name: &str, primary_type: Option<&str>) -> RepoResult<String> {
        self.namespaces.check_name(name)?;
        self.ensure_checked_out(parent)?;
        let child = path::join(parent, name);
        if self.working.nodes.contains_key(&child) {
            return Err(RepoError::ItemExists(child));
        }
        let node_type = primary_type.unwrap_or(NT_UNSTRUCTURED);
        self.node_types.check_primary(node_type)?;
        let mut state = NodeState::default();
        state
            .properties
            .insert(JCR_PRIMARY_TYPE.to_string(), PropertyValue::name(node_type));
        self.state_mut(parent)?.children.push(name.to_string());
        self.working.nodes.insert(child.clone(), state);
        self.dirty = true;
        Ok(child)
    }

    fn set_property(&mut self, node: &str, name: &str, value: PropertyValue) -> RepoResult<()> {
        self.namespaces.check_name(name)?;
        if PROTECTED.contains(&name) {
            return Err(RepoError::Protected(path::join(node, name)));
        }
        self.ensure_checked_out(node)?;
        self.state_mut(node)?.properties.insert(name.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    fn remove_property(&mut self, node: &str, name: &str) -> RepoResult<()> {
        if PROTECTED.contains(&name) {
            return Err(RepoError::Protected(path::join(node, name)));
        }
        self.ensure_checked_out(node)?;
        self.state_mut(node)?
            .properties
            .remove(name)
            .ok_or_else(|| RepoError::PathNotFound(path::join(node, name)))?;
        self.dirty = true;
        Ok(())
    }

    fn set_primary_type(&mut self, p: &str, node_type: &str) -> RepoResult<()> {
        self.node_types.check_primary(node_type)?;
        self.ensure_checked_out(p)?;
        self.state_mut(p)?
            .properties
            .insert(JCR_PRIMARY_TYPE.to_string(), PropertyValue::name(node_type));
        self.dirty = true;
        Ok(())
    }

    fn add_mixin(&mut self, p: &str, mixin: &str) -> RepoResult<()> {
        self.node_types.check_mixin(mixin)?;
        self.ensure_checked_out(p)?;
        let mut mixins = self.mixins(p)?;
        if mixins.iter().any(|m| m == mixin) {
            return Ok(());
        }
        mixins.push(mixin.to_string());
        let versionable = self.node_types.is_subtype(mixin, MIX_SIMPLE_VERSIONABLE);
        let state = self.state_mut(p)?;
        state
            .properties
            .insert(JCR_MIXIN_TYPES.to_string(), PropertyValue::names(mixins));
        if versionable {
            state.properties.insert(
                JCR_IS_CHECKED_OUT.to_string(),
                PropertyValue::Single(Value::Boolean(true)),
            );
        }
        self.dirty = true;
        Ok(())
    }

    fn remove_mixin(&mut self, p: &str, mixin: &str) -> RepoResult<()> {
        self.ensure_checked_out(p)?;
        let mut mixins = self.mixins(p)?;
        let before = mixins.len();
        mixins.retain(|m| m != mixin);
        if mixins.len() == before {
            return Err(RepoError::NoSuchNodeType(mixin.to_string()));
        }
        let state = self.state_mut(p)?;
        if mixins.is_empty() {
            state.properties.remove(JCR_MIXIN_TYPES);
        } else {
            state
                .properties
                .insert(JCR_MIXIN_TYPES.to_string(), PropertyValue::names(mixins));
        }
        self.dirty = true;
        Ok(())
    }

    fn remove_node(&mut self, p: &str) -> RepoResult<()> {
        let parent = path::parent(p).ok_or_else(|| RepoError::Protected(p.to_string()))?;
        self.state(p)?;
        self.ensure_checked_out(parent)?;
        let doomed: Vec<String> = self
            .working
            .nodes
            .keys()
            .filter(|k| path::is_same_or_descendant(k, p))
            .cloned()
            .collect();
        for key in &doomed {
            self.working.nodes.remove(key);
            self.working.acl.remove(key);
        }
        let name = path::name(p).to_string();
        self.state_mut(parent)?.children.retain(|c| *c != name);
        self.dirty = true;
        Ok(())
    }

    fn move_node(&mut self, src: &str, dest: &str) -> RepoResult<()> {
        let src_parent = path::parent(src).ok_or_else(|| RepoError::Protected(src.to_string()))?;
        let dest_parent = path::parent(dest).ok_or_else(|| RepoError::InvalidPath(dest.to_string()))?;
        self.state(src)?;
        self.state(dest_parent)?;
        self.namespaces.check_name(path::name(dest))?;
        if self.working.nodes.contains_key(dest) {
            return Err(RepoError::ItemExists(dest.to_string()));
        }
        if path::is_same_or_descendant(dest, src) {
            return Err(RepoError::InvalidPath(format!("cannot move {src} below itself")));
        }
        let moved: Vec<String> = self
            .working
            .nodes
            .keys()
            .filter(|k| path::is_same_or_descendant(k, src))
            .cloned()
            .collect();
        for key in moved {
            let target = format!("{dest}{}", &key[src.len()..]);
            if let Some(state) = self.working.nodes.remove(&key) {
                self.working.nodes.insert(target.clone(), state);
            }
            if let Some(entries) = self.working.acl.remove(&key) {
                self.working.acl.insert(target, entries);
            }
        }
        let src_name = path::name(src).to_string();
        self.state_mut(src_parent)?.children.retain(|c| *c != src_name);
        self.state_mut(dest_parent)?
            .children
            .push(path::name(dest).to_string());
        self.dirty = true;
        Ok(())
    }

    fn set_checked_out(&mut self, p: &str, checked_out: bool) -> RepoResult<()> {
        if !self.is_node_type(p, MIX_SIMPLE_VERSIONABLE)? {
            return Err(RepoError::InvalidNodeType(format!("{p} is not {MIX_VERSIONABLE}")));
        }
        self.state_mut(p)?.properties.insert(
            JCR_IS_CHECKED_OUT.to_string(),
            PropertyValue::Single(Value::Boolean(checked_out)),
        );
        self.dirty = true;
        Ok(())
    }

    fn grant(&mut self, p: &str, principal: &str, privileges: &[String]) -> RepoResult<()> {
        self.state(p)?;
        if let Some(unknown) = privileges.iter().find(|name| !self.privileges.contains(name)) {
            return Err(RepoError::NoSuchPrivilege(unknown.clone()));
        }
        let entries = self.working.acl.entry(p.to_string()).or_default();
        match entries.iter_mut().find(|e| e.principal == principal) {
            Some(entry) => {
                for privilege in privileges {
                    if !entry.privileges.contains(privilege) {
                        entry.privileges.push(privilege.clone());
                    }
                }
            }
            None => entries.push(AccessEntry {
                principal: principal.to_string(),
                privileges: privileges.to_vec(),
            }),
        }
        self.dirty = true;
        Ok(())
    }

    fn export(&self, p: &str) -> RepoResult<serde_json::Value> {
        let state = self.state(p)?;
        let mut out = Map::new();
        for (name, value) in &state.properties {
            out.insert(name.clone(), value.to_json());
        }
        for child in &state.children {
            out.insert(child.clone(), self.export(&path::join(p, child))?);
        }
        Ok(serde_json::Value::Object(out))
    }
}

/// Disposable repository backing one scan.
#[derive(Debug, Clone)]
pub struct MemRepository {
    store: SharedStore,
}

impl Default for MemRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemRepository {
    pub fn new() -> Self {
        Self {
            store: Rc::new(RefCell::new(Store {
                saved: Tree::with_root(),
                working: Tree::with_root(),
                dirty: false,
                live: false,
                namespaces: NamespaceRegistry::default(),
                node_types: NodeTypeRegistry::default(),
                privileges: PrivilegeRegistry::default(),
            })),
        }
    }
}

impl Repository for MemRepository {
    fn login(&self) -> RepoResult<Box<dyn Session>> {
        self.store.borrow_mut().live = true;
        debug!("repository session opened");
        Ok(Box::new(MemSession {
            store: self.store.clone(),
        }))
    }
}

pub struct MemSession {
    store: SharedStore,
}

impl MemSession {
    fn node_handle(&self, p: String) -> Box<dyn Node> {
        Box::new(MemNode {
            store: self.store.clone(),
            path: p,
        })
    }

    fn split_property_path(p: &str) -> RepoResult<(String, String)> {
        let normalized = path::normalize(p)?;
        let parent = path::parent(&normalized)
            .ok_or_else(|| RepoError::InvalidPath(p.to_string()))?
            .to_string();
        Ok((parent, path::name(&normalized).to_string()))
    }
}

impl Session for MemSession {
    fn is_live(&self) -> bool {
        self.store.borrow().live
    }

    fn clone_session(&self) -> Box<dyn Session> {
        Box::new(MemSession {
            store: self.store.clone(),
        })
    }

    fn root_node(&self) -> RepoResult<Box<dyn Node>> {
        self.node(path::ROOT)
    }

    fn node(&self, p: &str) -> RepoResult<Box<dyn Node>> {
        let normalized = path::normalize(p)?;
        self.store.borrow().state(&normalized)?;
        Ok(self.node_handle(normalized))
    }

    fn node_exists(&self, p: &str) -> bool {
        path::normalize(p)
            .map(|n| self.store.borrow().state(&n).is_ok())
            .unwrap_or(false)
    }

    fn property(&self, p: &str) -> RepoResult<Box<dyn Property>> {
        let (node, name) = Self::split_property_path(p)?;
        if !self.store.borrow().state(&node)?.properties.contains_key(&name) {
            return Err(RepoError::PathNotFound(p.to_string()));
        }
        Ok(Box::new(MemProperty {
            store: self.store.clone(),
            node,
            name,
        }))
    }

    fn property_exists(&self, p: &str) -> bool {
        self.property(p).is_ok()
    }

    fn has_pending_changes(&self) -> bool {
        self.store.borrow().dirty
    }

    fn namespace_prefixes(&self) -> Vec<String> {
        self.store.borrow().namespaces.prefixes()
    }

    fn namespace_uri(&self, prefix: &str) -> RepoResult<String> {
        self.store
            .borrow()
            .namespaces
            .uri(prefix)
            .map(str::to_string)
            .ok_or_else(|| RepoError::NamespaceNotFound(prefix.to_string()))
    }

    fn namespace_prefix(&self, uri: &str) -> RepoResult<String> {
        self.store
            .borrow()
            .namespaces
            .prefix_for(uri)
            .map(str::to_string)
            .ok_or_else(|| RepoError::NamespaceNotFound(uri.to_string()))
    }

    fn node_type(&self, name: &str) -> RepoResult<NodeTypeDef> {
        self.store
            .borrow()
            .node_types
            .get(name)
            .cloned()
            .ok_or_else(|| RepoError::NoSuchNodeType(name.to_string()))
    }

    fn has_privilege(&self, name: &str) -> bool {
        self.store.borrow().privileges.contains(name)
    }

    fn access_entries(&self, p: &str) -> RepoResult<Vec<AccessEntry>> {
        let store = self.store.borrow();
        store.state(p)?;
        Ok(store.working.acl.get(p).cloned().unwrap_or_default())
    }

    fn query(&self, statement: &str) -> RepoResult<Box<dyn QueryResult>> {
        self.store.borrow().ensure_live()?;
        query::execute(self.clone_session(), statement)
    }

    fn export(&self, p: &str) -> RepoResult<serde_json::Value> {
        self.store.borrow().export(&path::normalize(p)?)
    }

    fn save(&self) -> RepoResult<()> {
        let mut store = self.store.borrow_mut();
        store.ensure_live()?;
        store.saved = store.working.clone();
        store.dirty = false;
        Ok(())
    }

    fn refresh(&self, keep_changes: bool) -> RepoResult<()> {
        let mut store = self.store.borrow_mut();
        store.ensure_live()?;
        if !keep_changes {
            store.working = store.saved.clone();
            store.dirty = false;
        }
        Ok(())
    }

    fn remove_item(&self, p: &str) -> RepoResult<()> {
        let normalized = path::normalize(p)?;
        let mut store = self.store.borrow_mut();
        if store.state(&normalized).is_ok() {
            return store.remove_node(&normalized);
        }
        let (node, name) = Self::split_property_path(&normalized)?;
        store.remove_property(&node, &name)
    }

    fn move_node(&self, src: &str, dest: &str) -> RepoResult<()> {
        let (src, dest) = (path::normalize(src)?, path::normalize(dest)?);
        self.store.borrow_mut().move_node(&src, &dest)
    }

    fn register_namespace(&self, prefix: &str, uri: &str) -> RepoResult<()> {
        let mut store = self.store.borrow_mut();
        store.ensure_live()?;
        let change = store.namespaces.register(prefix, uri)?;
        debug!(prefix, uri, ?change, "namespace registration");
        Ok(())
    }

    fn register_node_types(&self, defs: &[NodeTypeDef]) -> RepoResult<()> {
        let mut store = self.store.borrow_mut();
        store.ensure_live()?;
        let Store {
            node_types, namespaces, ..
        } = &mut *store;
        node_types.register_all(defs.to_vec(), namespaces)
    }

    fn register_privilege(&self, def: &PrivilegeDef) -> RepoResult<()> {
        let mut store = self.store.borrow_mut();
        store.ensure_live()?;
        let Store {
            privileges, namespaces, ..
        } = &mut *store;
        if !privileges.register(def, namespaces)? {
            debug!(privilege = def.name(), "privilege already registered");
        }
        Ok(())
    }

    fn grant(&self, p: &str, principal: &str, privileges: &[String]) -> RepoResult<()> {
        let normalized = path::normalize(p)?;
        self.store.borrow_mut().grant(&normalized, principal, privileges)
    }

    fn logout(&self) {
        let mut store = self.store.borrow_mut();
        if store.live {
            store.live = false;
            debug!("repository session released");
        }
    }
}

pub struct MemNode {
    store: SharedStore,
    path: String,
}

impl MemNode {
    fn handle(&self, p: String) -> Box<dyn Node> {
        Box::new(MemNode {
            store: self.store.clone(),
            path: p,
        })
    }
}

impl Node for MemNode {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn name(&self) -> String {
        path::name(&self.path).to_string()
    }

    fn depth(&self) -> usize {
        path::depth(&self.path)
    }

    fn session(&self) -> Box<dyn Session> {
        Box::new(MemSession {
            store: self.store.clone(),
        })
    }

    fn primary_type(&self) -> RepoResult<String> {
        self.store.borrow().primary_type(&self.path)
    }

    fn mixin_types(&self) -> RepoResult<Vec<String>> {
        self.store.borrow().mixins(&self.path)
    }

    fn is_node_type(&self, name: &str) -> RepoResult<bool> {
        self.store.borrow().is_node_type(&self.path, name)
    }

    fn parent(&self) -> RepoResult<Box<dyn Node>> {
        let parent = path::parent(&self.path)
            .ok_or_else(|| RepoError::PathNotFound(format!("parent of {}", self.path)))?;
        self.store.borrow().state(parent)?;
        Ok(self.handle(parent.to_string()))
    }

    fn has_node(&self, rel_path: &str) -> bool {
        self.node(rel_path).is_ok()
    }

    fn node(&self, rel_path: &str) -> RepoResult<Box<dyn Node>> {
        let target = path::resolve(&self.path, rel_path)?;
        self.store.borrow().state(&target)?;
        Ok(self.handle(target))
    }

    fn nodes(&self) -> RepoResult<NodeIter> {
        let children: Vec<String> = self
            .store
            .borrow()
            .state(&self.path)?
            .children
            .iter()
            .map(|c| path::join(&self.path, c))
            .collect();
        let store = self.store.clone();
        Ok(Box::new(children.into_iter().map(move |p| {
            Box::new(MemNode {
                store: store.clone(),
                path: p,
            }) as Box<dyn Node>
        })))
    }

    fn has_property(&self, name: &str) -> bool {
        self.store
            .borrow()
            .state(&self.path)
            .map(|s| s.properties.contains_key(name))
            .unwrap_or(false)
    }

    fn property(&self, name: &str) -> RepoResult<Box<dyn Property>> {
        if !self.store.borrow().state(&self.path)?.properties.contains_key(name) {
            return Err(RepoError::PathNotFound(path::join(&self.path, name)));
        }
        Ok(Box::new(MemProperty {
            store: self.store.clone(),
            node: self.path.clone(),
            name: name.to_string(),
        }))
    }

    fn properties(&self) -> RepoResult<PropertyIter> {
        let names: Vec<String> = self
            .store
            .borrow()
            .state(&self.path)?
            .properties
            .keys()
            .cloned()
            .collect();
        let store = self.store.clone();
        let node = self.path.clone();
        Ok(Box::new(names.into_iter().map(move |name| {
            Box::new(MemProperty {
                store: store.clone(),
                node: node.clone(),
                name,
            }) as Box<dyn Property>
        })))
    }

    fn is_checked_out(&self) -> RepoResult<bool> {
        self.store.borrow().is_checked_out(&self.path)
    }

    fn add_node(&self, name: &str, primary_type: Option<&str>) -> RepoResult<Box<dyn Node>> {
        let child = self.store.borrow_mut().add_node(&self.path, name, primary_type)?;
        Ok(self.handle(child))
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> RepoResult<Box<dyn Property>> {
        self.store.borrow_mut().set_property(&self.path, name, value)?;
        self.property(name)
    }

    fn set_primary_type(&self, name: &str) -> RepoResult<()> {
        self.store.borrow_mut().set_primary_type(&self.path, name)
    }

    fn add_mixin(&self, name: &str) -> RepoResult<()> {
        self.store.borrow_mut().add_mixin(&self.path, name)
    }

    fn remove_mixin(&self, name: &str) -> RepoResult<()> {
        self.store.borrow_mut().remove_mixin(&self.path, name)
    }

    fn remove(&self) -> RepoResult<()> {
        self.store.borrow_mut().remove_node(&self.path)
    }

    fn checkout(&self) -> RepoResult<()> {
        self.store.borrow_mut().set_checked_out(&self.path, true)
    }

    fn checkin(&self) -> RepoResult<()> {
        self.store.borrow_mut().set_checked_out(&self.path, false)
    }
}

pub struct MemProperty {
    store: SharedStore,
    node: String,
    name: String,
}

impl Property for MemProperty {
    fn path(&self) -> String {
        path::join(&self.node, &self.name)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn session(&self) -> Box<dyn Session> {
        Box::new(MemSession {
            store: self.store.clone(),
        })
    }

    fn value(&self) -> RepoResult<PropertyValue> {
        self.store
            .borrow()
            .state(&self.node)?
            .properties
            .get(&self.name)
            .cloned()
            .ok_or_else(|| RepoError::PathNotFound(self.path()))
    }

    fn is_multiple(&self) -> RepoResult<bool> {
        Ok(self.value()?.is_multiple())
    }

    fn parent(&self) -> RepoResult<Box<dyn Node>> {
        self.store.borrow().state(&self.node)?;
        Ok(Box::new(MemNode {
            store: self.store.clone(),
            path: self.node.clone(),
        }))
    }

    fn set_value(&self, value: PropertyValue) -> RepoResult<()> {
        self.store.borrow_mut().set_property(&self.node, &self.name, value)
    }

    fn remove(&self) -> RepoResult<()> {
        self.store.borrow_mut().remove_property(&self.node, &self.name)
    }
}
