//! Tree-structured content repository.
//!
//! The capability traits below are what the scan engine and checks program
//! against. [`mem`] provides the embedded, disposable implementation used for
//! scans, and [`facade`] wraps any implementation in a read-only view.

pub mod facade;
pub mod import;
pub mod mem;
pub mod path;
pub mod query;
pub mod registry;
mod value;

pub use registry::{AccessEntry, NodeTypeDef, PrivilegeDef};
pub use value::{PropertyValue, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepoError {
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("item already exists: {0}")]
    ItemExists(String),
    #[error("invalid path or name: {0}")]
    InvalidPath(String),
    #[error("unknown namespace prefix: {0}")]
    NamespaceNotFound(String),
    #[error("namespace conflict: {0}")]
    NamespaceConflict(String),
    #[error("no such node type: {0}")]
    NoSuchNodeType(String),
    #[error("invalid node type: {0}")]
    InvalidNodeType(String),
    #[error("no such privilege: {0}")]
    NoSuchPrivilege(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("invalid value: {0}")]
    ValueFormat(String),
    #[error("node is checked in: {0}")]
    CheckedIn(String),
    #[error("item is protected: {0}")]
    Protected(String),
    #[error("unsupported operation on a read-only session: {0}")]
    ReadOnly(&'static str),
    #[error("session is closed")]
    SessionClosed,
}

pub type RepoResult<T> = Result<T, RepoError>;

pub type NodeIter = Box<dyn Iterator<Item = Box<dyn Node>>>;
pub type PropertyIter = Box<dyn Iterator<Item = Box<dyn Property>>>;
pub type RowIter = Box<dyn Iterator<Item = Box<dyn Row>>>;

pub const JCR_PRIMARY_TYPE: &str = "jcr:primaryType";
pub const JCR_MIXIN_TYPES: &str = "jcr:mixinTypes";
pub const JCR_IS_CHECKED_OUT: &str = "jcr:isCheckedOut";

/// Entry point: hands out sessions.
pub trait Repository {
    fn login(&self) -> RepoResult<Box<dyn Session>>;
}

pub trait Session {
    fn is_live(&self) -> bool;
    /// Another handle onto this same session.
    fn clone_session(&self) -> Box<dyn Session>;
    fn root_node(&self) -> RepoResult<Box<dyn Node>>;
    fn node(&self, path: &str) -> RepoResult<Box<dyn Node>>;
    fn node_exists(&self, path: &str) -> bool;
    fn property(&self, path: &str) -> RepoResult<Box<dyn Property>>;
    fn property_exists(&self, path: &str) -> bool;
    fn has_pending_changes(&self) -> bool;
    fn namespace_prefixes(&self) -> Vec<String>;
    fn namespace_uri(&self, prefix: &str) -> RepoResult<String>;
    fn namespace_prefix(&self, uri: &str) -> RepoResult<String>;
    fn node_type(&self, name: &str) -> RepoResult<NodeTypeDef>;
    fn has_privilege(&self, name: &str) -> bool;
    fn access_entries(&self, path: &str) -> RepoResult<Vec<AccessEntry>>;
    fn query(&self, statement: &str) -> RepoResult<Box<dyn QueryResult>>;
    /// Full subtree export as JSON.
    fn export(&self, path: &str) -> RepoResult<serde_json::Value>;

    fn save(&self) -> RepoResult<()>;
    fn refresh(&self, keep_changes: bool) -> RepoResult<()>;
    fn remove_item(&self, path: &str) -> RepoResult<()>;
    fn move_node(&self, src: &str, dest: &str) -> RepoResult<()>;
    fn register_namespace(&self, prefix: &str, uri: &str) -> RepoResult<()>;
    fn register_node_types(&self, defs: &[NodeTypeDef]) -> RepoResult<()>;
    fn register_privilege(&self, def: &PrivilegeDef) -> RepoResult<()>;
    fn grant(&self, path: &str, principal: &str, privileges: &[String]) -> RepoResult<()>;
    fn logout(&self);
}

pub trait Node {
    fn path(&self) -> String;
    fn name(&self) -> String;
    fn depth(&self) -> usize;
    fn session(&self) -> Box<dyn Session>;
    fn primary_type(&self) -> RepoResult<String>;
    fn mixin_types(&self) -> RepoResult<Vec<String>>;
    fn is_node_type(&self, name: &str) -> RepoResult<bool>;
    fn parent(&self) -> RepoResult<Box<dyn Node>>;
    fn has_node(&self, rel_path: &str) -> bool;
    fn node(&self, rel_path: &str) -> RepoResult<Box<dyn Node>>;
    fn nodes(&self) -> RepoResult<NodeIter>;
    fn has_property(&self, name: &str) -> bool;
    fn property(&self, name: &str) -> RepoResult<Box<dyn Property>>;
    fn properties(&self) -> RepoResult<PropertyIter>;
    fn is_checked_out(&self) -> RepoResult<bool>;

    fn add_node(&self, name: &str, primary_type: Option<&str>) -> RepoResult<Box<dyn Node>>;
    fn set_property(&self, name: &str, value: PropertyValue) -> RepoResult<Box<dyn Property>>;
    fn set_primary_type(&self, name: &str) -> RepoResult<()>;
    fn add_mixin(&self, name: &str) -> RepoResult<()>;
    fn remove_mixin(&self, name: &str) -> RepoResult<()>;
    fn remove(&self) -> RepoResult<()>;
    fn checkout(&self) -> RepoResult<()>;
    fn checkin(&self) -> RepoResult<()>;
}

pub trait Property {
    fn path(&self) -> String;
    fn name(&self) -> String;
    fn session(&self) -> Box<dyn Session>;
    fn value(&self) -> RepoResult<PropertyValue>;
    fn is_multiple(&self) -> RepoResult<bool>;
    fn parent(&self) -> RepoResult<Box<dyn Node>>;

    fn set_value(&self, value: PropertyValue) -> RepoResult<()>;
    fn remove(&self) -> RepoResult<()>;
}

pub trait QueryResult {
    fn column_names(&self) -> Vec<String>;
    fn selector_names(&self) -> Vec<String>;
    fn rows(&self) -> RepoResult<RowIter>;
    fn nodes(&self) -> RepoResult<NodeIter>;
}

pub trait Row {
    fn values(&self) -> RepoResult<Vec<Option<Value>>>;
    fn value(&self, column: &str) -> RepoResult<Option<Value>>;
    fn path(&self) -> RepoResult<String>;
    fn score(&self) -> f64;
    fn node(&self) -> RepoResult<Box<dyn Node>>;
    fn node_for(&self, selector: &str) -> RepoResult<Box<dyn Node>>;
}
