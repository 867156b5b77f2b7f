//! Read-only views over repository handles.
//!
//! Every handle reachable from a facade is itself a facade: child nodes,
//! parents, properties, iterators, query rows and the owning session. Mutating
//! calls fail with [`RepoError::ReadOnly`] without touching the wrapped handle.
//! `refresh` and `logout` are accepted and ignored so callers cannot discard
//! or end the scan's session.

use crate::repo::{
    AccessEntry, Node, NodeIter, NodeTypeDef, PrivilegeDef, Property, PropertyIter, PropertyValue,
    QueryResult, RepoError, RepoResult, Row, RowIter, Session, Value,
};

fn read_only<T>(op: &'static str) -> RepoResult<T> {
    Err(RepoError::ReadOnly(op))
}

fn wrap_nodes(iter: NodeIter) -> NodeIter {
    Box::new(iter.map(NodeFacade::boxed))
}

pub struct SessionFacade {
    inner: Box<dyn Session>,
}

impl SessionFacade {
    pub fn new(inner: Box<dyn Session>) -> Self {
        Self { inner }
    }

    pub fn boxed(inner: Box<dyn Session>) -> Box<dyn Session> {
        Box::new(Self::new(inner))
    }
}

impl Session for SessionFacade {
    fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    fn clone_session(&self) -> Box<dyn Session> {
        SessionFacade::boxed(self.inner.clone_session())
    }

    fn root_node(&self) -> RepoResult<Box<dyn Node>> {
        self.inner.root_node().map(NodeFacade::boxed)
    }

    fn node(&self, path: &str) -> RepoResult<Box<dyn Node>> {
        self.inner.node(path).map(NodeFacade::boxed)
    }

    fn node_exists(&self, path: &str) -> bool {
        self.inner.node_exists(path)
    }

    fn property(&self, path: &str) -> RepoResult<Box<dyn Property>> {
        self.inner.property(path).map(PropertyFacade::boxed)
    }

    fn property_exists(&self, path: &str) -> bool {
        self.inner.property_exists(path)
    }

    fn has_pending_changes(&self) -> bool {
        self.inner.has_pending_changes()
    }

    fn namespace_prefixes(&self) -> Vec<String> {
        self.inner.namespace_prefixes()
    }

    fn namespace_uri(&self, prefix: &str) -> RepoResult<String> {
        self.inner.namespace_uri(prefix)
    }

    fn namespace_prefix(&self, uri: &str) -> RepoResult<String> {
        self.inner.namespace_prefix(uri)
    }

    fn node_type(&self, name: &str) -> RepoResult<NodeTypeDef> {
        self.inner.node_type(name)
    }

    fn has_privilege(&self, name: &str) -> bool {
        self.inner.has_privilege(name)
    }

    fn access_entries(&self, path: &str) -> RepoResult<Vec<AccessEntry>> {
        self.inner.access_entries(path)
    }

    fn query(&self, statement: &str) -> RepoResult<Box<dyn QueryResult>> {
        self.inner
            .query(statement)
            .map(|inner| Box::new(QueryResultFacade { inner }) as Box<dyn QueryResult>)
    }

    fn export(&self, path: &str) -> RepoResult<serde_json::Value> {
        self.inner.export(path)
    }

    fn save(&self) -> RepoResult<()> {
        read_only("save")
    }

    fn refresh(&self, _keep_changes: bool) -> RepoResult<()> {
        Ok(())
    }

    fn remove_item(&self, _path: &str) -> RepoResult<()> {
        read_only("remove_item")
    }

    fn move_node(&self, _src: &str, _dest: &str) -> RepoResult<()> {
        read_only("move_node")
    }

    fn register_namespace(&self, _prefix: &str, _uri: &str) -> RepoResult<()> {
        read_only("register_namespace")
    }

    fn register_node_types(&self, _defs: &[NodeTypeDef]) -> RepoResult<()> {
        read_only("register_node_types")
    }

    fn register_privilege(&self, _def: &PrivilegeDef) -> RepoResult<()> {
        read_only("register_privilege")
    }

    fn grant(&self, _path: &str, _principal: &str, _privileges: &[String]) -> RepoResult<()> {
        read_only("grant")
    }

    fn logout(&self) {}
}

pub struct NodeFacade {
    inner: Box<dyn Node>,
}

impl NodeFacade {
    pub fn boxed(inner: Box<dyn Node>) -> Box<dyn Node> {
        Box::new(NodeFacade { inner })
    }
}

impl Node for NodeFacade {
    fn path(&self) -> String {
        self.inner.path()
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    fn depth(&self) -> usize {
        self.inner.depth()
    }

    fn session(&self) -> Box<dyn Session> {
        SessionFacade::boxed(self.inner.session())
    }

    fn primary_type(&self) -> RepoResult<String> {
        self.inner.primary_type()
    }

    fn mixin_types(&self) -> RepoResult<Vec<String>> {
        self.inner.mixin_types()
    }

    fn is_node_type(&self, name: &str) -> RepoResult<bool> {
        self.inner.is_node_type(name)
    }

    fn parent(&self) -> RepoResult<Box<dyn Node>> {
        self.inner.parent().map(NodeFacade::boxed)
    }

    fn has_node(&self, rel_path: &str) -> bool {
        self.inner.has_node(rel_path)
    }

    fn node(&self, rel_path: &str) -> RepoResult<Box<dyn Node>> {
        self.inner.node(rel_path).map(NodeFacade::boxed)
    }

    fn nodes(&self) -> RepoResult<NodeIter> {
        self.inner.nodes().map(wrap_nodes)
    }

    fn has_property(&self, name: &str) -> bool {
        self.inner.has_property(name)
    }

    fn property(&self, name: &str) -> RepoResult<Box<dyn Property>> {
        self.inner.property(name).map(PropertyFacade::boxed)
    }

    fn properties(&self) -> RepoResult<PropertyIter> {
        let iter = self.inner.properties()?;
        Ok(Box::new(iter.map(PropertyFacade::boxed)))
    }

    fn is_checked_out(&self) -> RepoResult<bool> {
        self.inner.is_checked_out()
    }

    fn add_node(&self, _name: &str, _primary_type: Option<&str>) -> RepoResult<Box<dyn Node>> {
        read_only("add_node")
    }

    fn set_property(&self, _name: &str, _value: PropertyValue) -> RepoResult<Box<dyn Property>> {
        read_only("set_property")
    }

    fn set_primary_type(&self, _name: &str) -> RepoResult<()> {
        read_only("set_primary_type")
    }

    fn add_mixin(&self, _name: &str) -> RepoResult<()> {
        read_only("add_mixin")
    }

    fn remove_mixin(&self, _name: &str) -> RepoResult<()> {
        read_only("remove_mixin")
    }

    fn remove(&self) -> RepoResult<()> {
        read_only("remove")
    }

    fn checkout(&self) -> RepoResult<()> {
        read_only("checkout")
    }

    fn checkin(&self) -> RepoResult<()> {
        read_only("checkin")
    }
}

pub struct PropertyFacade {
    inner: Box<dyn Property>,
}

impl PropertyFacade {
    pub fn boxed(inner: Box<dyn Property>) -> Box<dyn Property> {
        Box::new(PropertyFacade { inner })
    }
}

impl Property for PropertyFacade {
    fn path(&self) -> String {
        self.inner.path()
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    fn session(&self) -> Box<dyn Session> {
        SessionFacade::boxed(self.inner.session())
    }

    fn value(&self) -> RepoResult<PropertyValue> {
        self.inner.value()
    }

    fn is_multiple(&self) -> RepoResult<bool> {
        self.inner.is_multiple()
    }

    fn parent(&self) -> RepoResult<Box<dyn Node>> {
        self.inner.parent().map(NodeFacade::boxed)
    }

    fn set_value(&self, _value: PropertyValue) -> RepoResult<()> {
        read_only("set_value")
    }

    fn remove(&self) -> RepoResult<()> {
        read_only("remove")
    }
}

pub struct QueryResultFacade {
    inner: Box<dyn QueryResult>,
}

impl QueryResult for QueryResultFacade {
    fn column_names(&self) -> Vec<String> {
        self.inner.column_names()
    }

    fn selector_names(&self) -> Vec<String> {
        self.inner.selector_names()
    }

    fn rows(&self) -> RepoResult<RowIter> {
        let iter = self.inner.rows()?;
        Ok(Box::new(
            iter.map(|inner| Box::new(RowFacade { inner }) as Box<dyn Row>),
        ))
    }

    fn nodes(&self) -> RepoResult<NodeIter> {
        self.inner.nodes().map(wrap_nodes)
    }
}

pub struct RowFacade {
    inner: Box<dyn Row>,
}

impl Row for RowFacade {
    fn values(&self) -> RepoResult<Vec<Option<Value>>> {
        self.inner.values()
    }

    fn value(&self, column: &str) -> RepoResult<Option<Value>> {
        self.inner.value(column)
    }

    fn path(&self) -> RepoResult<String> {
        self.inner.path()
    }

    fn score(&self) -> f64 {
        self.inner.score()
    }

    fn node(&self) -> RepoResult<Box<dyn Node>> {
        self.inner.node().map(NodeFacade::boxed)
    }

    fn node_for(&self, selector: &str) -> RepoResult<Box<dyn Node>> {
        self.inner.node_for(selector).map(NodeFacade::boxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::mem::MemRepository;
    use crate::repo::Repository;

    fn setup() -> (Box<dyn Session>, Box<dyn Session>) {
        let session = MemRepository::new().login().unwrap();
        let a = session.root_node().unwrap().add_node("a", None).unwrap();
        a.set_property("title", PropertyValue::string("A")).unwrap();
        a.add_node("b", None).unwrap();
        session.save().unwrap();
        let facade = SessionFacade::boxed(session.clone_session());
        (session, facade)
    }

    fn assert_read_only<T>(result: RepoResult<T>) {
        assert!(matches!(result, Err(RepoError::ReadOnly(_))));
    }

    #[test]
    fn reads_pass_through() {
        let (_, facade) = setup();
        assert!(facade.node_exists("/a/b"));
        let a = facade.node("/a").unwrap();
        assert_eq!(a.property("title").unwrap().value().unwrap(), PropertyValue::string("A"));
        assert_eq!(a.nodes().unwrap().count(), 1);
        assert!(facade.namespace_prefixes().contains(&"jcr".to_string()));
    }

    #[test]
    fn every_mutator_is_rejected_and_state_is_untouched() {
        let (session, facade) = setup();
        let a = facade.node("/a").unwrap();
        assert_read_only(a.add_node("c", None));
        assert_read_only(a.set_property("x", PropertyValue::string("y")));
        assert_read_only(a.set_primary_type("nt:folder"));
        assert_read_only(a.add_mixin("mix:title"));
        assert_read_only(a.remove_mixin("mix:title"));
        assert_read_only(a.remove());
        assert_read_only(a.checkin());
        assert_read_only(a.checkout());
        assert_read_only(a.property("title").unwrap().set_value(PropertyValue::string("B")));
        assert_read_only(a.property("title").unwrap().remove());
        assert_read_only(facade.save());
        assert_read_only(facade.remove_item("/a"));
        assert_read_only(facade.move_node("/a", "/z"));
        assert_read_only(facade.register_namespace("acme", "urn:acme"));
        assert_read_only(facade.register_node_types(&[]));
        assert_read_only(facade.register_privilege(&PrivilegeDef::Name("acme:p".into())));
        assert_read_only(facade.grant("/a", "everyone", &[]));

        assert!(!session.has_pending_changes());
        assert!(!session.node_exists("/a/c"));
        assert!(!session.node_exists("/z"));
        assert_eq!(
            session.property("/a/title").unwrap().value().unwrap(),
            PropertyValue::string("A")
        );
        assert!(session.namespace_uri("acme").is_err());
    }

    #[test]
    fn derived_handles_stay_wrapped() {
        let (_, facade) = setup();
        let a = facade.node("/a").unwrap();
        for child in a.nodes().unwrap() {
            assert_read_only(child.add_node("x", None));
            assert_read_only(child.parent().unwrap().remove());
            assert_read_only(child.session().save());
        }
        for prop in a.properties().unwrap() {
            assert_read_only(prop.parent().unwrap().add_node("x", None));
            assert_read_only(prop.set_value(PropertyValue::string("z")));
        }
        assert_read_only(facade.clone_session().save());
        assert_read_only(facade.root_node().unwrap().node("a/b").unwrap().remove());
    }

    #[test]
    fn query_results_hand_out_wrapped_nodes() {
        let (_, facade) = setup();
        let result = facade.query("SELECT * FROM [nt:unstructured] WHERE ISDESCENDANTNODE([/a])").unwrap();
        for row in result.rows().unwrap() {
            assert_read_only(row.node().unwrap().remove());
            let selector = result.selector_names()[0].clone();
            assert_read_only(row.node_for(&selector).unwrap().add_mixin("mix:title"));
        }
        for node in result.nodes().unwrap() {
            assert_read_only(node.set_property("x", PropertyValue::string("y")));
        }
    }

    #[test]
    fn refresh_and_logout_are_ignored() {
        let (session, facade) = setup();
        session.root_node().unwrap().add_node("pending", None).unwrap();
        facade.refresh(false).unwrap();
        assert!(session.node_exists("/pending"));
        facade.logout();
        assert!(session.is_live());
        assert!(facade.is_live());
    }
}
