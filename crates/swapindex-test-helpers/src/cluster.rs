//! In-memory search cluster
//!
//! Follows the engine rules the lifecycle depends on: external versions
//! (strictly greater wins, ties rejected), atomic alias updates, writes
//! through an alias only when it resolves to a single index, and
//! `_type` required on legacy clusters and rejected on modern ones.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use swapindex::cluster::{
    AliasAction, ClusterError, ClusterResult, DeleteByQueryResponse, IndexInfo, SearchCluster,
};
use swapindex::wire::{
    BulkDirective, BulkRequest, BulkResponse, BulkResponseItem, ItemError, ItemResult,
};

/// A document as stored, with its external version
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    pub index: String,
    pub id: String,
    pub version: u64,
    pub doc_type: Option<String>,
    pub source: Map<String, Value>,
}

/// Administrative calls that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminOp {
    CreateIndex,
    PutAlias,
    GetAlias,
    UpdateAliases,
    DeleteIndices,
    CatIndices,
    Count,
    DeleteByQuery,
}

#[derive(Debug, Default)]
struct IndexData {
    body: Value,
    docs: BTreeMap<String, StoredDoc>,
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, IndexData>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    bulk_failure: Option<ClusterError>,
    item_failures: HashMap<String, (u16, ItemError)>,
    admin_failures: HashMap<AdminOp, ClusterError>,
    bulk_calls: usize,
    alias_updates: usize,
    alias_history: Vec<BTreeMap<String, BTreeSet<String>>>,
}

impl State {
    fn check(&self, op: AdminOp) -> ClusterResult<()> {
        self.admin_failures.get(&op).cloned().map_or(Ok(()), Err)
    }

    fn bound(&self, alias: &str) -> Vec<String> {
        self.aliases
            .get(alias)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Concrete indices behind a name (index or alias).
    fn resolve(&self, name: &str) -> ClusterResult<Vec<String>> {
        if self.indices.contains_key(name) {
            return Ok(vec![name.to_owned()]);
        }
        let bound = self.bound(name);
        if bound.is_empty() {
            return Err(not_found(name));
        }
        Ok(bound)
    }

    fn record_aliases(&mut self) {
        let snapshot = self.aliases.clone();
        self.alias_history.push(snapshot);
    }

    fn unbind_index(&mut self, index: &str) {
        for set in self.aliases.values_mut() {
            set.remove(index);
        }
        self.aliases.retain(|_, set| !set.is_empty());
    }
}

fn not_found(name: &str) -> ClusterError {
    ClusterError::new(404, "index_not_found_exception", format!("no such index [{name}]"))
}

/// In-memory [`SearchCluster`] with fault injection
#[derive(Debug)]
pub struct MemoryCluster {
    name: String,
    legacy: bool,
    state: Mutex<State>,
}

impl MemoryCluster {
    /// A modern cluster; directives must not carry `_type`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            legacy: false,
            state: Mutex::new(State::default()),
        }
    }

    /// A legacy cluster; every directive must carry `_type`.
    #[must_use]
    pub fn legacy(name: impl Into<String>) -> Self {
        Self {
            legacy: true,
            ..Self::new(name)
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Fault injection ──

    /// Fail every bulk call with `error` until cleared with `None`.
    pub fn set_bulk_failure(&self, error: Option<ClusterError>) {
        self.lock().bulk_failure = error;
    }

    /// Reject every directive for document `id` with `error`.
    pub fn fail_item(&self, id: &str, status: u16, error: ItemError) {
        self.lock()
            .item_failures
            .insert(id.to_owned(), (status, error));
    }

    pub fn clear_item_failures(&self) {
        self.lock().item_failures.clear();
    }

    /// Fail `op` with `error` until cleared.
    pub fn fail_admin(&self, op: AdminOp, error: ClusterError) {
        self.lock().admin_failures.insert(op, error);
    }

    pub fn clear_admin_failure(&self, op: AdminOp) {
        self.lock().admin_failures.remove(&op);
    }

    // ── Inspection ──

    /// Every document reachable through `name`, ordered by index then id.
    pub fn search_all(&self, name: &str) -> ClusterResult<Vec<StoredDoc>> {
        let state = self.lock();
        let indices = state.resolve(name)?;
        Ok(indices
            .iter()
            .filter_map(|index| state.indices.get(index))
            .flat_map(|data| data.docs.values().cloned())
            .collect())
    }

    #[must_use]
    pub fn get_doc(&self, index: &str, id: &str) -> Option<StoredDoc> {
        self.lock()
            .indices
            .get(index)
            .and_then(|data| data.docs.get(id).cloned())
    }

    /// Physical index names, sorted
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.lock().indices.keys().cloned().collect()
    }

    /// Body the index was created with
    #[must_use]
    pub fn index_body(&self, index: &str) -> Option<Value> {
        self.lock().indices.get(index).map(|data| data.body.clone())
    }

    #[must_use]
    pub fn bindings(&self, alias: &str) -> Vec<String> {
        self.lock().bound(alias)
    }

    #[must_use]
    pub fn bulk_calls(&self) -> usize {
        self.lock().bulk_calls
    }

    /// Number of `update_aliases` calls that were applied
    #[must_use]
    pub fn alias_updates(&self) -> usize {
        self.lock().alias_updates
    }

    /// Bindings of `alias` after every alias mutation, oldest first
    #[must_use]
    pub fn alias_history(&self, alias: &str) -> Vec<Vec<String>> {
        self.lock()
            .alias_history
            .iter()
            .map(|snapshot| {
                snapshot
                    .get(alias)
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .collect()
    }

    fn apply_directive(&self, state: &mut State, directive: &BulkDirective) -> BulkResponseItem {
        let action = directive.action();
        let id = directive.id();
        let requested = directive.target_index();

        if let Some((status, error)) = state.item_failures.get(id) {
            return BulkResponseItem::new(
                action,
                ItemResult::failed(requested, id, *status, error.clone()),
            );
        }

        let doc_type = match directive {
            BulkDirective::Index { doc_type, .. } | BulkDirective::Delete { doc_type, .. } => {
                doc_type.as_deref()
            }
        };
        if let Some(error) = self.type_error(doc_type) {
            return BulkResponseItem::new(action, ItemResult::failed(requested, id, 400, error));
        }

        let index = match state.resolve(requested) {
            Ok(indices) if indices.len() == 1 => indices[0].clone(),
            Ok(_) => {
                let error = ItemError::new(
                    "illegal_argument_exception",
                    format!(
                        "no write index is defined for alias [{requested}]. The write index may be explicitly disabled using is_write_index=false or the alias points to multiple indices without one being designated as a write index"
                    ),
                );
                return BulkResponseItem::new(action, ItemResult::failed(requested, id, 400, error));
            }
            Err(err) => {
                let error = ItemError::new(err.error_type, err.reason);
                return BulkResponseItem::new(action, ItemResult::failed(requested, id, 404, error));
            }
        };
        let Some(data) = state.indices.get_mut(&index) else {
            let err = not_found(&index);
            let error = ItemError::new(err.error_type, err.reason);
            return BulkResponseItem::new(action, ItemResult::failed(requested, id, 404, error));
        };

        match directive {
            BulkDirective::Index {
                version,
                doc_type,
                data: source,
                ..
            } => {
                let (status, result) = match data.docs.get(id) {
                    Some(existing) if existing.version >= *version => {
                        let prefix = doc_type
                            .as_deref()
                            .map(|t| format!("[{t}]"))
                            .unwrap_or_default();
                        let error = ItemError::new(
                            "version_conflict_engine_exception",
                            format!(
                                "{prefix}[{id}]: version conflict, current version [{}] is higher or equal to the one provided [{version}]",
                                existing.version
                            ),
                        );
                        return BulkResponseItem::new(
                            action,
                            ItemResult::failed(&index, id, 409, error),
                        );
                    }
                    Some(_) => (200, "updated"),
                    None => (201, "created"),
                };
                data.docs.insert(
                    id.to_owned(),
                    StoredDoc {
                        index: index.clone(),
                        id: id.to_owned(),
                        version: *version,
                        doc_type: doc_type.clone(),
                        source: source.clone(),
                    },
                );
                BulkResponseItem::new(
                    action,
                    ItemResult::applied(&index, id, status, result, Some(*version)),
                )
            }
            BulkDirective::Delete { .. } => {
                let result = match data.docs.remove(id) {
                    Some(removed) => ItemResult::applied(
                        &index,
                        id,
                        200,
                        "deleted",
                        Some(removed.version + 1),
                    ),
                    None => ItemResult::applied(&index, id, 404, "not_found", None),
                };
                BulkResponseItem::new(action, result)
            }
        }
    }

    fn type_error(&self, doc_type: Option<&str>) -> Option<ItemError> {
        match (self.legacy, doc_type) {
            (true, None) => Some(ItemError::new(
                "action_request_validation_exception",
                "Validation Failed: 1: type is missing;",
            )),
            (false, Some(t)) => Some(ItemError::new(
                "illegal_argument_exception",
                format!("mapping type [{t}] is not supported; remove _type from the request"),
            )),
            _ => None,
        }
    }
}

impl SearchCluster for MemoryCluster {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_index(&self, index: &str, body: &Value) -> ClusterResult<()> {
        let mut state = self.lock();
        state.check(AdminOp::CreateIndex)?;
        if state.indices.contains_key(index) || state.aliases.contains_key(index) {
            return Err(ClusterError::new(
                400,
                "resource_already_exists_exception",
                format!("index [{index}] already exists"),
            ));
        }
        state.indices.insert(
            index.to_owned(),
            IndexData {
                body: body.clone(),
                docs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn put_alias(&self, index: &str, alias: &str) -> ClusterResult<()> {
        let mut state = self.lock();
        state.check(AdminOp::PutAlias)?;
        if !state.indices.contains_key(index) {
            return Err(not_found(index));
        }
        state
            .aliases
            .entry(alias.to_owned())
            .or_default()
            .insert(index.to_owned());
        state.record_aliases();
        Ok(())
    }

    fn get_alias(&self, alias: &str) -> ClusterResult<Vec<String>> {
        let state = self.lock();
        state.check(AdminOp::GetAlias)?;
        Ok(state.bound(alias))
    }

    fn alias_exists(&self, alias: &str) -> ClusterResult<bool> {
        let state = self.lock();
        state.check(AdminOp::GetAlias)?;
        Ok(state.aliases.contains_key(alias))
    }

    fn update_aliases(&self, actions: &[AliasAction]) -> ClusterResult<()> {
        let mut state = self.lock();
        state.check(AdminOp::UpdateAliases)?;

        // Validate everything before applying anything
        for action in actions {
            match action {
                AliasAction::Add { index, .. } => {
                    if !state.indices.contains_key(index) {
                        return Err(not_found(index));
                    }
                }
                AliasAction::Remove { index, alias } => {
                    if !state.indices.contains_key(index) {
                        return Err(not_found(index));
                    }
                    if !state.aliases.get(alias).is_some_and(|set| set.contains(index)) {
                        return Err(ClusterError::new(
                            404,
                            "aliases_not_found_exception",
                            format!("aliases [{alias}] missing"),
                        ));
                    }
                }
            }
        }

        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    state
                        .aliases
                        .entry(alias.clone())
                        .or_default()
                        .insert(index.clone());
                }
                AliasAction::Remove { index, alias } => {
                    if let Some(set) = state.aliases.get_mut(alias) {
                        set.remove(index);
                    }
                }
            }
        }
        state.aliases.retain(|_, set| !set.is_empty());
        state.alias_updates += 1;
        state.record_aliases();
        Ok(())
    }

    fn delete_indices(&self, indices: &[String]) -> ClusterResult<()> {
        let mut state = self.lock();
        state.check(AdminOp::DeleteIndices)?;
        if let Some(missing) = indices.iter().find(|i| !state.indices.contains_key(*i)) {
            return Err(not_found(missing));
        }
        for index in indices {
            state.indices.remove(index);
            state.unbind_index(index);
        }
        state.record_aliases();
        Ok(())
    }

    fn cat_indices(&self) -> ClusterResult<Vec<IndexInfo>> {
        let state = self.lock();
        state.check(AdminOp::CatIndices)?;
        Ok(state
            .indices
            .iter()
            .map(|(name, data)| IndexInfo {
                index: name.clone(),
                health: Some("green".to_owned()),
                docs_count: Some(data.docs.len().to_string()),
            })
            .collect())
    }

    fn count(&self, index: &str) -> ClusterResult<u64> {
        let state = self.lock();
        state.check(AdminOp::Count)?;
        let total: usize = state
            .resolve(index)?
            .iter()
            .filter_map(|name| state.indices.get(name))
            .map(|data| data.docs.len())
            .sum();
        Ok(total as u64)
    }

    fn bulk(&self, request: &BulkRequest) -> ClusterResult<BulkResponse> {
        let mut state = self.lock();
        if let Some(error) = state.bulk_failure.clone() {
            return Err(error);
        }
        state.bulk_calls += 1;
        let items = request
            .directives()
            .iter()
            .map(|directive| self.apply_directive(&mut state, directive))
            .collect();
        Ok(BulkResponse::from_items(items))
    }

    fn delete_by_query(&self, index: &str, body: &Value) -> ClusterResult<DeleteByQueryResponse> {
        let mut state = self.lock();
        state.check(AdminOp::DeleteByQuery)?;
        let clause = body.get("query").ok_or_else(|| {
            ClusterError::new(400, "parsing_exception", "request body is missing [query]")
        })?;
        let matcher = QueryMatcher::parse(clause)?;

        let mut deleted = 0;
        for name in state.resolve(index)? {
            if let Some(data) = state.indices.get_mut(&name) {
                let before = data.docs.len();
                data.docs.retain(|_, doc| !matcher.matches(doc));
                deleted += (before - data.docs.len()) as u64;
            }
        }
        Ok(DeleteByQueryResponse {
            deleted,
            ..DeleteByQueryResponse::default()
        })
    }
}

/// The small query subset delete-by-query understands here
enum QueryMatcher {
    All,
    Ids(Vec<String>),
    Term(String, Value),
}

impl QueryMatcher {
    fn parse(clause: &Value) -> ClusterResult<Self> {
        if clause.get("match_all").is_some() {
            return Ok(Self::All);
        }
        if let Some(values) = clause.pointer("/ids/values").and_then(Value::as_array) {
            let ids = values
                .iter()
                .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_owned))
                .collect();
            return Ok(Self::Ids(ids));
        }
        if let Some((field, value)) = clause
            .get("term")
            .and_then(Value::as_object)
            .and_then(|term| term.iter().next())
        {
            let value = value.get("value").unwrap_or(value).clone();
            return Ok(Self::Term(field.clone(), value));
        }
        Err(ClusterError::new(
            400,
            "parsing_exception",
            format!("unsupported query {clause}"),
        ))
    }

    fn matches(&self, doc: &StoredDoc) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.contains(&doc.id),
            Self::Term(field, value) => doc.source.get(field) == Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use swapindex::{Document, TypeMode};

    fn doc(id: &str, name: &str) -> Document {
        Document::new(id, json!({ "name": name }).as_object().cloned().unwrap())
    }

    fn index(index: &str, id: &str, version: u64) -> BulkDirective {
        BulkDirective::index(index, &doc(id, "x"), version, &TypeMode::Typeless)
    }

    fn cluster_with(index_name: &str) -> MemoryCluster {
        let cluster = MemoryCluster::new("mem");
        cluster.create_index(index_name, &json!({})).unwrap();
        cluster
    }

    #[test]
    fn external_versions_strictly_greater_wins() {
        let cluster = cluster_with("p_1");
        let send = |version| {
            cluster
                .bulk(&BulkRequest::new(vec![index("p_1", "1", version)]))
                .unwrap()
        };

        assert!(!send(5).errors);
        assert!(!send(6).errors);
        let tie = send(6);
        assert!(tie.errors);
        let (_, item) = tie.items[0].outcome().unwrap();
        assert_eq!(item.status, 409);
        assert_eq!(
            item.error.as_ref().unwrap().reason,
            "[1]: version conflict, current version [6] is higher or equal to the one provided [6]"
        );
        assert!(send(3).errors);
        assert_eq!(cluster.get_doc("p_1", "1").unwrap().version, 6);
    }

    #[test]
    fn legacy_conflicts_carry_type_prefix() {
        let cluster = MemoryCluster::legacy("old");
        cluster.create_index("p_1", &json!({})).unwrap();
        let mode = TypeMode::Legacy {
            doc_type: "product".into(),
        };
        let write = |version| {
            cluster
                .bulk(&BulkRequest::new(vec![BulkDirective::index(
                    "p_1",
                    &doc("7", "x"),
                    version,
                    &mode,
                )]))
                .unwrap()
        };
        assert!(!write(2).errors);
        let response = write(1);
        let (_, item) = response.items[0].outcome().unwrap();
        assert!(
            item.error
                .as_ref()
                .unwrap()
                .reason
                .starts_with("[product][7]: version conflict")
        );
    }

    #[test]
    fn type_mode_is_enforced() {
        let modern = cluster_with("p_1");
        let typed = BulkDirective::index("p_1", &doc("1", "x"), 1, &TypeMode::legacy());
        assert!(modern.bulk(&BulkRequest::new(vec![typed])).unwrap().errors);

        let legacy = MemoryCluster::legacy("old");
        legacy.create_index("p_1", &json!({})).unwrap();
        assert!(
            legacy
                .bulk(&BulkRequest::new(vec![index("p_1", "1", 1)]))
                .unwrap()
                .errors
        );
    }

    #[test]
    fn writes_through_multi_index_alias_are_rejected() {
        let cluster = cluster_with("p_1");
        cluster.create_index("p_2", &json!({})).unwrap();
        cluster.put_alias("p_1", "p_write").unwrap();
        assert!(
            !cluster
                .bulk(&BulkRequest::new(vec![index("p_write", "1", 1)]))
                .unwrap()
                .errors
        );
        cluster.put_alias("p_2", "p_write").unwrap();
        assert!(
            cluster
                .bulk(&BulkRequest::new(vec![index("p_write", "2", 1)]))
                .unwrap()
                .errors
        );
    }

    #[test]
    fn alias_updates_are_all_or_nothing() {
        let cluster = cluster_with("p_1");
        cluster.put_alias("p_1", "p").unwrap();

        let err = cluster
            .update_aliases(&[
                AliasAction::remove("p_1", "p"),
                AliasAction::add("p_missing", "p"),
            ])
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(cluster.bindings("p"), vec!["p_1"]);
        assert_eq!(cluster.alias_updates(), 0);
    }

    #[test]
    fn deleting_an_index_drops_its_aliases() {
        let cluster = cluster_with("p_1");
        cluster.put_alias("p_1", "p").unwrap();
        cluster.delete_indices(&["p_1".to_owned()]).unwrap();
        assert!(!cluster.alias_exists("p").unwrap());
        assert!(cluster.index_names().is_empty());
    }

    #[test]
    fn delete_by_query_subset() {
        let cluster = cluster_with("p_1");
        cluster.put_alias("p_1", "p_write").unwrap();
        cluster
            .bulk(&BulkRequest::new(vec![
                BulkDirective::index("p_1", &doc("1", "lamp"), 1, &TypeMode::Typeless),
                BulkDirective::index("p_1", &doc("2", "desk"), 1, &TypeMode::Typeless),
                BulkDirective::index("p_1", &doc("3", "lamp"), 1, &TypeMode::Typeless),
            ]))
            .unwrap();

        let response = cluster
            .delete_by_query("p_write", &json!({ "query": { "term": { "name": "lamp" } } }))
            .unwrap();
        assert_eq!(response.deleted, 2);
        assert_eq!(cluster.count("p_1").unwrap(), 1);

        assert!(
            cluster
                .delete_by_query("p_write", &json!({ "query": { "fuzzy": {} } }))
                .is_err()
        );
        let err = cluster
            .delete_by_query("p_write", &json!({ "term": { "name": "desk" } }))
            .unwrap_err();
        assert_eq!(err.error_type, "parsing_exception");
        assert_eq!(cluster.count("p_1").unwrap(), 1);
    }

    #[test]
    fn injected_failures_surface() {
        let cluster = cluster_with("p_1");
        cluster.fail_admin(
            AdminOp::CreateIndex,
            ClusterError::new(400, "invalid_index_name_exception", "bad"),
        );
        assert!(cluster.create_index("p_2", &json!({})).is_err());
        cluster.clear_admin_failure(AdminOp::CreateIndex);
        assert!(cluster.create_index("p_2", &json!({})).is_ok());

        cluster.set_bulk_failure(Some(ClusterError::transport("reset")));
        assert!(cluster.bulk(&BulkRequest::default()).is_err());
        assert_eq!(cluster.bulk_calls(), 0);
    }
}
