//! A small JCR-SQL2 subset evaluated against any [`Session`].
//!
//! Supported shape:
//!
//! ```text
//! SELECT * | [col], s.[col] FROM [node:type] [AS s]
//!   [WHERE cond AND cond ...]
//! ```
//!
//! where `cond` is one of `ISDESCENDANTNODE(s, [/path])`, `ISCHILDNODE(...)`,
//! `ISSAMENODE(...)`, `[prop] = 'value'`, `[prop] LIKE 'pat%'` or
//! `[prop] IS NOT NULL`. Rows come back in document order.

use std::sync::OnceLock;

use regex::Regex;

use crate::repo::{
    path, Node, NodeIter, QueryResult, RepoError, RepoResult, Row, RowIter, Session, Value,
    JCR_PRIMARY_TYPE,
};

const JCR_PATH: &str = "jcr:path";
const JCR_SCORE: &str = "jcr:score";

static STATEMENT: OnceLock<Regex> = OnceLock::new();
static PATH_TEST: OnceLock<Regex> = OnceLock::new();
static COMPARISON: OnceLock<Regex> = OnceLock::new();
static NOT_NULL: OnceLock<Regex> = OnceLock::new();
static AND: OnceLock<Regex> = OnceLock::new();

fn statement_re() -> &'static Regex {
    STATEMENT.get_or_init(|| {
        Regex::new(
            r"(?is)^\s*SELECT\s+(?P<cols>.+?)\s+FROM\s+\[(?P<type>[^\]]+)\](?:\s+AS\s+\[?(?P<sel>\w+)\]?)?(?:\s+WHERE\s+(?P<where>.+?))?\s*$",
        )
        .expect("statement pattern")
    })
}

fn path_test_re() -> &'static Regex {
    PATH_TEST.get_or_init(|| {
        Regex::new(
            r"(?i)^(?P<op>ISDESCENDANTNODE|ISCHILDNODE|ISSAMENODE)\s*\(\s*(?:\[?\w+\]?\s*,\s*)?(?:\[(?P<bracket>[^\]]+)\]|'(?P<quoted>[^']*)')\s*\)$",
        )
        .expect("path test pattern")
    })
}

fn comparison_re() -> &'static Regex {
    COMPARISON.get_or_init(|| {
        Regex::new(r"(?i)^(?:\[?\w+\]?\.)?\[(?P<prop>[^\]]+)\]\s*(?P<op>=|LIKE)\s*'(?P<value>(?:[^']|'')*)'$")
            .expect("comparison pattern")
    })
}

fn not_null_re() -> &'static Regex {
    NOT_NULL.get_or_init(|| {
        Regex::new(r"(?i)^(?:\[?\w+\]?\.)?\[(?P<prop>[^\]]+)\]\s+IS\s+NOT\s+NULL$").expect("not null pattern")
    })
}

fn and_re() -> &'static Regex {
    AND.get_or_init(|| Regex::new(r"(?i)\s+AND\s+").expect("and pattern"))
}

#[derive(Debug, Clone)]
enum Condition {
    Descendant(String),
    Child(String),
    Same(String),
    Equals(String, String),
    Like(String, Regex),
    NotNull(String),
}

impl Condition {
    fn parse(raw: &str) -> RepoResult<Condition> {
        let raw = raw.trim();
        if let Some(caps) = path_test_re().captures(raw) {
            let target = caps
                .name("bracket")
                .or_else(|| caps.name("quoted"))
                .map(|m| m.as_str())
                .unwrap_or_default();
            let target = path::normalize(target).map_err(|_| RepoError::InvalidQuery(raw.to_string()))?;
            return Ok(match caps["op"].to_ascii_uppercase().as_str() {
                "ISDESCENDANTNODE" => Condition::Descendant(target),
                "ISCHILDNODE" => Condition::Child(target),
                _ => Condition::Same(target),
            });
        }
        if let Some(caps) = comparison_re().captures(raw) {
            let prop = caps["prop"].to_string();
            let value = caps["value"].replace("''", "'");
            if caps["op"].eq_ignore_ascii_case("LIKE") {
                let pattern = like_to_regex(&value).map_err(|_| RepoError::InvalidQuery(raw.to_string()))?;
                return Ok(Condition::Like(prop, pattern));
            }
            return Ok(Condition::Equals(prop, value));
        }
        if let Some(caps) = not_null_re().captures(raw) {
            return Ok(Condition::NotNull(caps["prop"].to_string()));
        }
        Err(RepoError::InvalidQuery(raw.to_string()))
    }

    fn matches(&self, node: &dyn Node) -> bool {
        let p = node.path();
        match self {
            Condition::Descendant(ancestor) => path::is_descendant(&p, ancestor),
            Condition::Child(parent) => path::parent(&p) == Some(parent.as_str()),
            Condition::Same(target) => p == *target,
            Condition::Equals(prop, expected) => property_strings(node, prop).iter().any(|v| v == expected),
            Condition::Like(prop, pattern) => property_strings(node, prop).iter().any(|v| pattern.is_match(v)),
            Condition::NotNull(prop) => node.has_property(prop),
        }
    }
}

fn like_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}

fn property_strings(node: &dyn Node, name: &str) -> Vec<String> {
    node.property(name)
        .and_then(|p| p.value())
        .map(|v| v.strings())
        .unwrap_or_default()
}

/// A parsed statement.
#[derive(Debug, Clone)]
pub struct Statement {
    columns: Vec<String>,
    node_type: String,
    selector: String,
    conditions: Vec<Condition>,
}

impl Statement {
    pub fn parse(statement: &str) -> RepoResult<Statement> {
        let caps = statement_re()
            .captures(statement)
            .ok_or_else(|| RepoError::InvalidQuery(statement.trim().to_string()))?;
        let selector = caps
            .name("sel")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| caps["type"].to_string());
        let columns = parse_columns(&caps["cols"])
            .ok_or_else(|| RepoError::InvalidQuery(format!("bad column list in {}", statement.trim())))?;
        let conditions = match caps.name("where") {
            Some(clause) => and_re()
                .split(clause.as_str())
                .map(Condition::parse)
                .collect::<RepoResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Statement {
            columns,
            node_type: caps["type"].to_string(),
            selector,
            conditions,
        })
    }
}

fn parse_columns(raw: &str) -> Option<Vec<String>> {
    let raw = raw.trim();
    if raw == "*" {
        return Some(vec![JCR_PATH.to_string(), JCR_PRIMARY_TYPE.to_string()]);
    }
    raw.split(',')
        .map(|col| {
            let col = col.trim();
            let col = col.rsplit_once('.').map(|(_, c)| c).unwrap_or(col).trim();
            col.strip_prefix('[')
                .and_then(|c| c.strip_suffix(']'))
                .filter(|c| !c.is_empty())
                .map(str::to_string)
        })
        .collect()
}

/// Runs `statement` over the tree visible to `session`.
pub fn execute(session: Box<dyn Session>, statement: &str) -> RepoResult<Box<dyn QueryResult>> {
    let parsed = Statement::parse(statement)?;
    session
        .node_type(&parsed.node_type)
        .map_err(|_| RepoError::InvalidQuery(format!("unknown node type {}", parsed.node_type)))?;
    let mut paths = Vec::new();
    let mut stack = vec![session.root_node()?];
    while let Some(node) = stack.pop() {
        if node.is_node_type(&parsed.node_type)? && parsed.conditions.iter().all(|c| c.matches(node.as_ref())) {
            paths.push(node.path());
        }
        let mut children: Vec<Box<dyn Node>> = node.nodes()?.collect();
        children.reverse();
        stack.extend(children);
    }
    Ok(Box::new(StaticQueryResult {
        session,
        columns: parsed.columns,
        selector: parsed.selector,
        paths,
    }))
}

/// Result rows captured as paths; values are read when asked for.
pub struct StaticQueryResult {
    session: Box<dyn Session>,
    columns: Vec<String>,
    selector: String,
    paths: Vec<String>,
}

impl QueryResult for StaticQueryResult {
    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn selector_names(&self) -> Vec<String> {
        vec![self.selector.clone()]
    }

    fn rows(&self) -> RepoResult<RowIter> {
        let session = self.session.clone_session();
        let columns = self.columns.clone();
        let selector = self.selector.clone();
        Ok(Box::new(self.paths.clone().into_iter().map(move |p| {
            Box::new(StaticRow {
                session: session.clone_session(),
                columns: columns.clone(),
                selector: selector.clone(),
                path: p,
            }) as Box<dyn Row>
        })))
    }

    fn nodes(&self) -> RepoResult<NodeIter> {
        let session = self.session.clone_session();
        Ok(Box::new(
            self.paths
                .clone()
                .into_iter()
                .filter_map(move |p| session.node(&p).ok()),
        ))
    }
}

pub struct StaticRow {
    session: Box<dyn Session>,
    columns: Vec<String>,
    selector: String,
    path: String,
}

impl Row for StaticRow {
    fn values(&self) -> RepoResult<Vec<Option<Value>>> {
        self.columns.iter().map(|c| self.value(c)).collect()
    }

    fn value(&self, column: &str) -> RepoResult<Option<Value>> {
        match column {
            JCR_PATH => Ok(Some(Value::Path(self.path.clone()))),
            JCR_SCORE => Ok(Some(Value::Double(self.score()))),
            name => {
                let node = self.session.node(&self.path)?;
                if !node.has_property(name) {
                    return Ok(None);
                }
                Ok(node.property(name)?.value()?.first().cloned())
            }
        }
    }

    fn path(&self) -> RepoResult<String> {
        Ok(self.path.clone())
    }

    fn score(&self) -> f64 {
        1.0
    }

    fn node(&self) -> RepoResult<Box<dyn Node>> {
        self.session.node(&self.path)
    }

    fn node_for(&self, selector: &str) -> RepoResult<Box<dyn Node>> {
        if selector != self.selector {
            return Err(RepoError::InvalidQuery(format!("unknown selector {selector}")));
        }
        self.node()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::mem::MemRepository;
    use crate::repo::{PropertyValue, Repository};

    fn populated() -> Box<dyn Session> {
        let s = MemRepository::new().login().unwrap();
        let content = s.root_node().unwrap().add_node("content", Some("nt:folder")).unwrap();
        let a = content.add_node("a", Some("nt:unstructured")).unwrap();
        a.set_property("kind", PropertyValue::string("page")).unwrap();
        let b = a.add_node("b", Some("nt:unstructured")).unwrap();
        b.set_property("kind", PropertyValue::string("component")).unwrap();
        s.root_node().unwrap().add_node("apps", Some("nt:folder")).unwrap();
        s
    }

    fn paths(result: &dyn QueryResult) -> Vec<String> {
        result.rows().unwrap().map(|r| r.path().unwrap()).collect()
    }

    #[test]
    fn selects_by_type_in_document_order() {
        let s = populated();
        let result = s.query("SELECT * FROM [nt:folder]").unwrap();
        assert_eq!(paths(result.as_ref()), vec!["/content", "/apps"]);
        assert_eq!(result.column_names(), vec![JCR_PATH, JCR_PRIMARY_TYPE]);
    }

    #[test]
    fn filters_by_path_and_property() {
        let s = populated();
        let result = s
            .query("SELECT [kind] FROM [nt:unstructured] AS s WHERE ISDESCENDANTNODE(s, [/content]) AND s.[kind] = 'page'")
            .unwrap();
        assert_eq!(paths(result.as_ref()), vec!["/content/a"]);
        let row = result.rows().unwrap().next().unwrap();
        assert_eq!(row.values().unwrap(), vec![Some(Value::String("page".into()))]);
        assert_eq!(row.node_for("s").unwrap().path(), "/content/a");
        assert!(row.node_for("t").is_err());
    }

    #[test]
    fn child_like_and_not_null() {
        let s = populated();
        let children = s.query("SELECT * FROM [nt:base] WHERE ISCHILDNODE('/content')").unwrap();
        assert_eq!(paths(children.as_ref()), vec!["/content/a"]);
        let like = s.query("select * from [nt:unstructured] where [kind] like 'comp%'").unwrap();
        assert_eq!(paths(like.as_ref()), vec!["/content/a/b"]);
        let with_kind = s.query("SELECT * FROM [nt:unstructured] WHERE [kind] IS NOT NULL").unwrap();
        assert_eq!(with_kind.nodes().unwrap().count(), 2);
    }

    #[test]
    fn rejects_unsupported_statements() {
        let s = populated();
        assert!(matches!(s.query("DELETE FROM x"), Err(RepoError::InvalidQuery(_))));
        assert!(matches!(s.query("SELECT * FROM [acme:Nope]"), Err(RepoError::InvalidQuery(_))));
        assert!(matches!(
            s.query("SELECT * FROM [nt:base] WHERE CONTAINS(*, 'x')"),
            Err(RepoError::InvalidQuery(_))
        ));
    }
}
