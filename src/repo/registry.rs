//! Workspace-level registries: namespaces, node types and privileges.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::repo::{RepoError, RepoResult};

const BUILTIN_NAMESPACES: &[(&str, &str)] = &[
    ("", ""),
    ("jcr", "http://www.jcp.org/jcr/1.0"),
    ("nt", "http://www.jcp.org/jcr/nt/1.0"),
    ("mix", "http://www.jcp.org/jcr/mix/1.0"),
    ("xml", "http://www.w3.org/XML/1998/namespace"),
    ("sv", "http://www.jcp.org/jcr/sv/1.0"),
    ("rep", "internal"),
];

pub const NT_BASE: &str = "nt:base";
pub const NT_UNSTRUCTURED: &str = "nt:unstructured";
pub const NT_FOLDER: &str = "nt:folder";
pub const NT_FILE: &str = "nt:file";
pub const NT_RESOURCE: &str = "nt:resource";
pub const MIX_VERSIONABLE: &str = "mix:versionable";

/// Outcome of a namespace registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceChange {
    Registered,
    /// The URI was already mapped under the given prefix.
    Remapped { from: String },
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct NamespaceRegistry {
    by_prefix: BTreeMap<String, String>,
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self {
            by_prefix: BUILTIN_NAMESPACES
                .iter()
                .map(|(p, u)| (p.to_string(), u.to_string()))
                .collect(),
        }
    }
}

impl NamespaceRegistry {
    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.by_prefix.get(prefix).map(String::as_str)
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.by_prefix
            .iter()
            .find(|(_, u)| u.as_str() == uri)
            .map(|(p, _)| p.as_str())
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.by_prefix.keys().cloned().collect()
    }

    pub fn register(&mut self, prefix: &str, uri: &str) -> RepoResult<NamespaceChange> {
        if prefix.is_empty() || uri.is_empty() || prefix.contains(':') {
            return Err(RepoError::NamespaceConflict(format!("invalid mapping {prefix:?} -> {uri:?}")));
        }
        let builtin = |p: &str| BUILTIN_NAMESPACES.iter().any(|(b, _)| *b == p);
        match self.by_prefix.get(prefix) {
            Some(existing) if existing == uri => return Ok(NamespaceChange::Unchanged),
            Some(existing) => {
                return Err(RepoError::NamespaceConflict(format!(
                    "prefix {prefix} is already mapped to {existing}"
                )))
            }
            None if prefix.to_ascii_lowercase().starts_with("xml") => {
                return Err(RepoError::NamespaceConflict(format!("prefix {prefix} is reserved")))
            }
            None => {}
        }
        let previous = self.prefix_for(uri).map(str::to_string);
        match previous {
            Some(old) if builtin(&old) => Err(RepoError::NamespaceConflict(format!(
                "uri {uri} belongs to built-in prefix {old}"
            ))),
            Some(old) => {
                self.by_prefix.remove(&old);
                self.by_prefix.insert(prefix.to_string(), uri.to_string());
                Ok(NamespaceChange::Remapped { from: old })
            }
            None => {
                self.by_prefix.insert(prefix.to_string(), uri.to_string());
                Ok(NamespaceChange::Registered)
            }
        }
    }

    /// Rejects malformed names and names using an unregistered prefix.
    pub fn check_name(&self, name: &str) -> RepoResult<()> {
        if name.is_empty() || name.contains(['/', '[', ']', '|', '*']) {
            return Err(RepoError::InvalidPath(name.to_string()));
        }
        if let Some((prefix, local)) = name.split_once(':') {
            if local.is_empty() {
                return Err(RepoError::InvalidPath(name.to_string()));
            }
            if !self.by_prefix.contains_key(prefix) {
                return Err(RepoError::NamespaceNotFound(prefix.to_string()));
            }
        }
        Ok(())
    }
}

/// A registered node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeDef {
    pub name: String,
    #[serde(default)]
    pub supertypes: Vec<String>,
    #[serde(default)]
    pub mixin: bool,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
}

impl NodeTypeDef {
    pub fn primary(name: &str, supertypes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            supertypes: supertypes.iter().map(|s| s.to_string()).collect(),
            mixin: false,
            is_abstract: false,
        }
    }

    pub fn mixin(name: &str, supertypes: &[&str]) -> Self {
        Self {
            mixin: true,
            ..Self::primary(name, supertypes)
        }
    }

    fn abstract_type(self) -> Self {
        Self {
            is_abstract: true,
            ..self
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    types: BTreeMap<String, NodeTypeDef>,
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        let builtin = [
            NodeTypeDef::primary(NT_BASE, &[]).abstract_type(),
            NodeTypeDef::primary("nt:hierarchyNode", &[NT_BASE, "mix:created"]).abstract_type(),
            NodeTypeDef::primary(NT_FOLDER, &["nt:hierarchyNode"]),
            NodeTypeDef::primary(NT_FILE, &["nt:hierarchyNode"]),
            NodeTypeDef::primary(NT_RESOURCE, &[NT_BASE, "mix:mimeType", "mix:lastModified"]),
            NodeTypeDef::primary(NT_UNSTRUCTURED, &[NT_BASE]),
            NodeTypeDef::primary("rep:root", &[NT_UNSTRUCTURED]),
            NodeTypeDef::mixin("mix:created", &[]),
            NodeTypeDef::mixin("mix:lastModified", &[]),
            NodeTypeDef::mixin("mix:mimeType", &[]),
            NodeTypeDef::mixin("mix:title", &[]),
            NodeTypeDef::mixin("mix:language", &[]),
            NodeTypeDef::mixin("mix:lockable", &[]),
            NodeTypeDef::mixin("mix:referenceable", &[]),
            NodeTypeDef::mixin("mix:simpleVersionable", &[]),
            NodeTypeDef::mixin(MIX_VERSIONABLE, &["mix:simpleVersionable", "mix:referenceable"]),
            NodeTypeDef::mixin("rep:AccessControllable", &[]),
        ];
        Self {
            types: builtin.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }
}

impl NodeTypeRegistry {
    pub fn get(&self, name: &str) -> Option<&NodeTypeDef> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    /// `t` is `of` or inherits from it.
    pub fn is_subtype(&self, t: &str, of: &str) -> bool {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([t.to_string()]);
        while let Some(current) = queue.pop_front() {
            if current == of {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(def) = self.types.get(&current) {
                queue.extend(def.supertypes.iter().cloned());
            }
        }
        // every primary type is an nt:base
        of == NT_BASE && self.types.get(t).is_some_and(|d| !d.mixin)
    }

    pub fn check_primary(&self, name: &str) -> RepoResult<()> {
        let def = self
            .types
            .get(name)
            .ok_or_else(|| RepoError::NoSuchNodeType(name.to_string()))?;
        if def.mixin {
            return Err(RepoError::InvalidNodeType(format!("{name} is a mixin")));
        }
        if def.is_abstract {
            return Err(RepoError::InvalidNodeType(format!("{name} is abstract")));
        }
        Ok(())
    }

    pub fn check_mixin(&self, name: &str) -> RepoResult<()> {
        match self.types.get(name) {
            Some(def) if def.mixin => Ok(()),
            Some(_) => Err(RepoError::InvalidNodeType(format!("{name} is not a mixin"))),
            None => Err(RepoError::NoSuchNodeType(name.to_string())),
        }
    }

    pub fn register(&mut self, def: NodeTypeDef, namespaces: &NamespaceRegistry) -> RepoResult<()> {
        namespaces.check_name(&def.name)?;
        if let Some(existing) = self.types.get(&def.name) {
            if *existing == def {
                return Ok(());
            }
            if NodeTypeRegistry::default().contains(&def.name) {
                return Err(RepoError::InvalidNodeType(format!("cannot redefine built-in type {}", def.name)));
            }
        }
        for supertype in &def.supertypes {
            let parent = self
                .types
                .get(supertype)
                .ok_or_else(|| RepoError::NoSuchNodeType(supertype.clone()))?;
            if def.mixin && !parent.mixin {
                return Err(RepoError::InvalidNodeType(format!(
                    "mixin {} cannot extend primary type {}",
                    def.name, supertype
                )));
            }
            if supertype == &def.name || self.is_subtype(supertype, &def.name) {
                return Err(RepoError::InvalidNodeType(format!(
                    "{} has a cyclic supertype {}",
                    def.name, supertype
                )));
            }
        }
        self.types.insert(def.name.clone(), def);
        Ok(())
    }

    /// Registers a batch, ordering definitions so supertypes come first.
    pub fn register_all(&mut self, defs: Vec<NodeTypeDef>, namespaces: &NamespaceRegistry) -> RepoResult<()> {
        let mut pending = defs;
        while !pending.is_empty() {
            let ready = pending.iter().position(|def| {
                def.supertypes
                    .iter()
                    .all(|s| self.contains(s) && !pending.iter().any(|p| &p.name == s && p != def))
            });
            match ready {
                Some(i) => {
                    let def = pending.remove(i);
                    self.register(def, namespaces)?;
                }
                // nothing can be ordered; surface the first failure
                None => return self.register(pending.remove(0), namespaces),
            }
        }
        Ok(())
    }
}

/// A privilege definition: a bare name or a full object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrivilegeDef {
    Name(String),
    Full {
        name: String,
        #[serde(default, rename = "abstract")]
        is_abstract: bool,
        #[serde(default)]
        contains: Vec<String>,
    },
}

impl PrivilegeDef {
    pub fn name(&self) -> &str {
        match self {
            PrivilegeDef::Name(name) | PrivilegeDef::Full { name, .. } => name,
        }
    }

    pub fn aggregates(&self) -> &[String] {
        match self {
            PrivilegeDef::Name(_) => &[],
            PrivilegeDef::Full { contains, .. } => contains,
        }
    }
}

const BUILTIN_PRIVILEGES: &[&str] = &[
    "jcr:read",
    "jcr:modifyProperties",
    "jcr:addChildNodes",
    "jcr:removeNode",
    "jcr:removeChildNodes",
    "jcr:write",
    "jcr:readAccessControl",
    "jcr:modifyAccessControl",
    "jcr:lockManagement",
    "jcr:versionManagement",
    "jcr:nodeTypeManagement",
    "jcr:namespaceManagement",
    "jcr:retentionManagement",
    "jcr:lifecycleManagement",
    "jcr:all",
    "rep:write",
    "rep:privilegeManagement",
    "rep:userManagement",
];

#[derive(Debug, Clone)]
pub struct PrivilegeRegistry {
    names: BTreeMap<String, Vec<String>>,
}

impl Default for PrivilegeRegistry {
    fn default() -> Self {
        Self {
            names: BUILTIN_PRIVILEGES.iter().map(|n| (n.to_string(), Vec::new())).collect(),
        }
    }
}

impl PrivilegeRegistry {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.names.keys().cloned().collect()
    }

    /// Returns false when the privilege already existed.
    pub fn register(&mut self, def: &PrivilegeDef, namespaces: &NamespaceRegistry) -> RepoResult<bool> {
        namespaces.check_name(def.name())?;
        if self.contains(def.name()) {
            return Ok(false);
        }
        if let Some(missing) = def.aggregates().iter().find(|a| !self.contains(a)) {
            return Err(RepoError::NoSuchPrivilege(missing.clone()));
        }
        self.names.insert(def.name().to_string(), def.aggregates().to_vec());
        Ok(true)
    }
}

/// An access control entry granted on a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub principal: String,
    pub privileges: Vec<String>,
}
