//! Process-memory resources: collections, objects and binary blobs.
//!
//! These back the bundled server and the tests. Nothing here is persisted.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use bytes::Bytes;
use url::form_urlencoded;
use uuid::Uuid;

use crate::request::{MediaType, RequestContext};
use crate::resource::{
    BinaryContentSink, BinaryResource, ContentChunk, PropertySink, Resource, ResourceSink,
    ResourceState, Responder, Value,
};

const READ_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Clone)]
enum Member {
    Collection(Arc<InMemoryCollection>),
    Object(Arc<InMemoryObject>),
    Binary(Arc<InMemoryBinary>),
}

impl Member {
    fn id(&self) -> &str {
        match self {
            Member::Collection(c) => c.id(),
            Member::Object(o) => o.id(),
            Member::Binary(b) => b.id(),
        }
    }

    fn resource(&self) -> Arc<dyn Resource> {
        match self {
            Member::Collection(c) => c.clone() as Arc<dyn Resource>,
            Member::Object(o) => o.clone() as Arc<dyn Resource>,
            Member::Binary(b) => b.clone() as Arc<dyn Resource>,
        }
    }

    fn sort_key(&self, field: &str) -> Option<SortKey> {
        if field == "id" {
            return Some(SortKey::Text(self.id().to_string()));
        }
        match self {
            Member::Object(o) => o.state().property(field).and_then(SortKey::from_value),
            Member::Binary(b) if field == "length" => Some(SortKey::Number(b.len() as f64)),
            _ => None,
        }
    }
}

/// Comparable projection of a property value.
#[derive(Debug, Clone)]
enum SortKey {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SortKey {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(SortKey::Bool(*b)),
            Value::Integer(i) => Some(SortKey::Number(*i as f64)),
            Value::Float(x) => Some(SortKey::Number(*x)),
            Value::Text(s) | Value::Uri(s) => Some(SortKey::Text(s.clone())),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Bool(_) => 0,
            SortKey::Number(_) => 1,
            SortKey::Text(_) => 2,
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Bool(a), SortKey::Bool(b)) => a.cmp(b),
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

fn upgrade_parent(parent: &Option<Weak<InMemoryCollection>>) -> Option<Arc<dyn Resource>> {
    parent
        .as_ref()
        .and_then(Weak::upgrade)
        .map(|p| p as Arc<dyn Resource>)
}

/// Ordered collection of members with pagination, sorting and links.
pub struct InMemoryCollection {
    id: String,
    parent: Option<Weak<InMemoryCollection>>,
    members: RwLock<Vec<Member>>,
}

impl InMemoryCollection {
    /// The tree root (id `""`, URI `/`).
    pub fn root() -> Arc<Self> {
        Self::new("")
    }

    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            parent: None,
            members: RwLock::new(Vec::new()),
        })
    }

    pub fn add_collection(self: &Arc<Self>, id: impl Into<String>) -> Arc<InMemoryCollection> {
        let child = Arc::new(Self {
            id: id.into(),
            parent: Some(Arc::downgrade(self)),
            members: RwLock::new(Vec::new()),
        });
        self.push(Member::Collection(child.clone()));
        child
    }

    /// Add an object built from `state`; the id comes from the state or is
    /// generated.
    pub fn add_object(self: &Arc<Self>, state: ResourceState) -> Arc<InMemoryObject> {
        let id = state
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let object = InMemoryObject::with_parent(id, state, Some(Arc::downgrade(self)));
        self.push(Member::Object(object.clone()));
        object
    }

    pub fn add_binary(
        self: &Arc<Self>,
        id: impl Into<String>,
        media_type: MediaType,
        content: impl Into<Bytes>,
    ) -> Arc<InMemoryBinary> {
        let binary = InMemoryBinary::with_parent(id.into(), media_type, content.into(), Some(Arc::downgrade(self)));
        self.push(Member::Binary(binary.clone()));
        binary
    }

    pub fn member(&self, id: &str) -> Option<Arc<dyn Resource>> {
        self.read_guard()
            .iter()
            .find(|m| m.id() == id)
            .map(Member::resource)
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: &str) -> bool {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        let before = members.len();
        members.retain(|m| m.id() != id);
        members.len() != before
    }

    fn push(&self, member: Member) {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(member);
    }

    /// Push `member` unless its id is taken; check and insert share one
    /// write guard.
    fn insert_new(&self, member: Member) -> bool {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        if members.iter().any(|m| m.id() == member.id()) {
            return false;
        }
        members.push(member);
        true
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, Vec<Member>> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn sorted_members(&self, ctx: &RequestContext) -> Vec<Member> {
        let mut members = self.read_guard().clone();
        let sorting = ctx.sorting();
        if !sorting.is_empty() {
            members.sort_by(|a, b| sorting.compare(a, b, |m, field| m.sort_key(field)));
        }
        members
    }

    fn links(&self, ctx: &RequestContext, total: usize) -> Vec<Value> {
        let pagination = ctx.pagination();
        let (offset, limit) = (pagination.offset(), pagination.limit());
        if limit == 0 {
            return Vec::new();
        }
        let base = self.uri().to_string();
        let sort = ctx.params().value("sort");
        let link = |rel: &str, at: usize| {
            let mut query = form_urlencoded::Serializer::new(String::new());
            query
                .append_pair("offset", &at.to_string())
                .append_pair("limit", &limit.to_string());
            if let Some(sort) = sort {
                query.append_pair("sort", sort);
            }
            let mut state = ResourceState::new();
            state.put_property("rel", rel);
            state.put_property("href", Value::Uri(format!("{}?{}", base, query.finish())));
            Value::State(state)
        };
        let mut links = Vec::new();
        if offset > 0 {
            links.push(link("first", 0));
            links.push(link("prev", offset.saturating_sub(limit)));
        }
        if offset.saturating_add(limit) < total {
            links.push(link("next", offset + limit));
            links.push(link("last", ((total - 1) / limit) * limit));
        }
        links
    }
}

impl Resource for InMemoryCollection {
    fn id(&self) -> &str {
        &self.id
    }

    fn parent(&self) -> Option<Arc<dyn Resource>> {
        upgrade_parent(&self.parent)
    }

    fn read_properties(self: Arc<Self>, ctx: &RequestContext, mut sink: PropertySink) {
        let total = self.len();
        sink.accept("count", total as i64);
        let links = self.links(ctx, total);
        if !links.is_empty() {
            sink.accept("links", links);
        }
        sink.close();
    }

    fn read_members(self: Arc<Self>, ctx: &RequestContext, mut sink: ResourceSink) {
        let members = self.sorted_members(ctx);
        let window = ctx.pagination().window(members.len());
        for member in &members[window] {
            sink.accept(member.resource());
        }
        sink.close();
    }

    fn read_member(self: Arc<Self>, _ctx: &RequestContext, id: &str, responder: Responder) {
        match self.member(id) {
            Some(member) => responder.resource_read(member),
            None => responder.no_such_resource(id),
        }
    }

    fn create_member(self: Arc<Self>, ctx: &RequestContext, state: ResourceState, responder: Responder) {
        let id = state
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let parent = Some(Arc::downgrade(&self));
        let member = match state.binary_content() {
            Some(content) => {
                let media_type = ctx
                    .attributes()
                    .content_type
                    .clone()
                    .unwrap_or_else(MediaType::octet_stream);
                Member::Binary(InMemoryBinary::with_parent(id.clone(), media_type, content.clone(), parent))
            }
            None => Member::Object(InMemoryObject::with_parent(id.clone(), state, parent)),
        };
        let created = member.resource();
        if self.insert_new(member) {
            responder.resource_created(created);
        } else {
            responder.resource_already_exists(id);
        }
    }

    fn delete(self: Arc<Self>, _ctx: &RequestContext, responder: Responder) {
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.remove(&self.id);
        }
        responder.resource_deleted(self);
    }
}

/// A leaf holding a property bag.
pub struct InMemoryObject {
    id: String,
    parent: Option<Weak<InMemoryCollection>>,
    state: RwLock<ResourceState>,
}

impl InMemoryObject {
    /// Parentless object, mostly for tests.
    pub fn root(id: impl Into<String>) -> Arc<Self> {
        let id = id.into();
        Self::with_parent(id.clone(), ResourceState::with_id(id), None)
    }

    fn with_parent(id: String, mut state: ResourceState, parent: Option<Weak<InMemoryCollection>>) -> Arc<Self> {
        state.set_id(id.clone());
        Arc::new(Self {
            id,
            parent,
            state: RwLock::new(state),
        })
    }

    /// Snapshot of the current properties.
    pub fn state(&self) -> ResourceState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Resource for InMemoryObject {
    fn id(&self) -> &str {
        &self.id
    }

    fn parent(&self) -> Option<Arc<dyn Resource>> {
        upgrade_parent(&self.parent)
    }

    fn read_properties(self: Arc<Self>, _ctx: &RequestContext, mut sink: PropertySink) {
        for (name, value) in self.state().properties() {
            sink.accept(name.clone(), value.clone());
        }
        sink.close();
    }

    fn update_properties(self: Arc<Self>, _ctx: &RequestContext, state: ResourceState, responder: Responder) {
        {
            let mut current = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let mut replacement = ResourceState::with_id(self.id.clone());
            for (name, value) in state.properties() {
                replacement.put_property(name.clone(), value.clone());
            }
            *current = replacement;
        }
        responder.resource_updated(self);
    }

    fn delete(self: Arc<Self>, _ctx: &RequestContext, responder: Responder) {
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.remove(&self.id);
        }
        responder.resource_deleted(self);
    }
}

/// Raw content with a fixed media type. Reads and writes stream in chunks
/// on a worker thread.
pub struct InMemoryBinary {
    id: String,
    parent: Option<Weak<InMemoryCollection>>,
    media_type: MediaType,
    content: RwLock<Bytes>,
    staging: Mutex<Vec<u8>>,
}

impl InMemoryBinary {
    pub fn root(id: impl Into<String>, media_type: MediaType, content: impl Into<Bytes>) -> Arc<Self> {
        Self::with_parent(id.into(), media_type, content.into(), None)
    }

    fn with_parent(
        id: String,
        media_type: MediaType,
        content: Bytes,
        parent: Option<Weak<InMemoryCollection>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            parent,
            media_type,
            content: RwLock::new(content),
            staging: Mutex::new(Vec::new()),
        })
    }

    pub fn content(&self) -> Bytes {
        self.content.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.content().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Resource for InMemoryBinary {
    fn id(&self) -> &str {
        &self.id
    }

    fn parent(&self) -> Option<Arc<dyn Resource>> {
        upgrade_parent(&self.parent)
    }

    fn requires_worker_thread(&self) -> bool {
        true
    }

    fn as_binary(self: Arc<Self>) -> Option<Arc<dyn BinaryResource>> {
        Some(self)
    }

    fn read_properties(self: Arc<Self>, _ctx: &RequestContext, mut sink: PropertySink) {
        sink.accept("media-type", self.media_type.to_string());
        sink.accept("length", self.len() as i64);
        sink.close();
    }

    fn delete(self: Arc<Self>, _ctx: &RequestContext, responder: Responder) {
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.remove(&self.id);
        }
        responder.resource_deleted(self);
    }
}

impl BinaryResource for InMemoryBinary {
    fn media_type(&self) -> MediaType {
        self.media_type.clone()
    }

    fn content_length(&self) -> u64 {
        self.len() as u64
    }

    fn read_content(self: Arc<Self>, _ctx: &RequestContext, mut sink: BinaryContentSink) {
        let content = self.content();
        let mut start = 0;
        while start < content.len() {
            let end = (start + READ_CHUNK_SIZE).min(content.len());
            if sink.accept(content.slice(start..end)).is_err() {
                tracing::debug!(resource = %self.id, "Binary reader went away");
                return;
            }
            start = end;
        }
        sink.close();
    }

    fn will_process_update(&self, _ctx: &RequestContext, responder: Responder) -> Option<Responder> {
        Some(responder)
    }

    fn update_content(
        self: Arc<Self>,
        _ctx: &RequestContext,
        chunk: ContentChunk,
        responder: Responder,
    ) -> Option<Responder> {
        let mut staging = self.staging.lock().unwrap_or_else(PoisonError::into_inner);
        if chunk.offset == 0 {
            staging.clear();
        }
        let written = staging.len() as u64;
        if chunk.offset != written {
            staging.clear();
            drop(staging);
            responder.invalid_request(format!(
                "chunk at offset {} does not follow the {} bytes already written",
                chunk.offset, written
            ));
            return None;
        }
        staging.extend_from_slice(&chunk.data);
        if !chunk.complete {
            return Some(responder);
        }
        let content = Bytes::from(std::mem::take(&mut *staging));
        drop(staging);
        *self.content.write().unwrap_or_else(PoisonError::into_inner) = content;
        responder.resource_updated(self);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::request::{Pagination, RequestType, ResourceParams, Sorting};
    use crate::resource::{ResourceOutcome, ResourcePath};

    fn read_ctx(offset: usize, limit: usize, sort: &str) -> RequestContext {
        RequestContext::builder(RequestType::Read, ResourcePath::parse("/coll"))
            .pagination(Pagination::new(offset, limit))
            .sorting(Sorting::parse(sort))
            .build()
    }

    fn named_collection(names: &[&str]) -> (Arc<InMemoryCollection>, Arc<InMemoryCollection>) {
        let root = InMemoryCollection::root();
        let coll = root.add_collection("coll");
        for name in names {
            let mut state = ResourceState::with_id(*name);
            state.put_property("name", *name);
            coll.add_object(state);
        }
        (root, coll)
    }

    async fn member_ids(coll: &Arc<InMemoryCollection>, ctx: &RequestContext) -> Vec<String> {
        let (sink, rx) = ResourceSink::channel();
        coll.clone().read_members(ctx, sink);
        rx.collect()
            .await
            .unwrap()
            .iter()
            .map(|m| m.id().to_string())
            .collect()
    }

    async fn link_rels(coll: &Arc<InMemoryCollection>, ctx: &RequestContext) -> Vec<String> {
        let (sink, rx) = PropertySink::channel();
        coll.clone().read_properties(ctx, sink);
        let props = rx.collect().await.unwrap();
        props
            .iter()
            .find(|(k, _)| k == "links")
            .and_then(|(_, v)| v.as_list().map(|l| l.to_vec()))
            .unwrap_or_default()
            .iter()
            .filter_map(|l| l.as_state()?.property("rel")?.as_str().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn sorts_and_pages_members() {
        let (_root, coll) = named_collection(&["a", "c", "b", "e", "d"]);
        assert_eq!(member_ids(&coll, &read_ctx(0, 2, "name")).await, vec!["a", "b"]);
        assert_eq!(member_ids(&coll, &read_ctx(1, 3, "-name")).await, vec!["d", "c", "b"]);
        assert!(member_ids(&coll, &read_ctx(5, 2, "name")).await.is_empty());
        assert!(member_ids(&coll, &read_ctx(0, 0, "name")).await.is_empty());
    }

    #[tokio::test]
    async fn links_appear_only_when_applicable() {
        let (_root, coll) = named_collection(&["a", "b", "c", "d", "e", "f"]);
        assert!(link_rels(&coll, &read_ctx(0, 100, "")).await.is_empty());
        assert_eq!(link_rels(&coll, &read_ctx(0, 2, "")).await, vec!["next", "last"]);
        assert_eq!(
            link_rels(&coll, &read_ctx(2, 2, "")).await,
            vec!["first", "prev", "next", "last"]
        );
        assert_eq!(link_rels(&coll, &read_ctx(4, 2, "")).await, vec!["first", "prev"]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let (_root, coll) = named_collection(&["a"]);
        let ctx = read_ctx(0, 10, "");
        let (responder, pending) = Responder::new("createMember");
        coll.clone().create_member(&ctx, ResourceState::with_id("a"), responder);
        let outcome = pending.outcome().await;
        assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::ResourceAlreadyExists));
    }

    #[test]
    fn concurrent_creates_of_one_id_admit_a_single_winner() {
        let (_root, coll) = named_collection(&[]);
        let outcomes: Vec<ResourceOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let coll = coll.clone();
                    scope.spawn(move || {
                        let ctx = read_ctx(0, 10, "");
                        let (responder, mut pending) = Responder::new("createMember");
                        coll.create_member(&ctx, ResourceState::with_id("same"), responder);
                        pending.try_outcome().expect("resolved synchronously")
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let created = outcomes
            .iter()
            .filter(|o| matches!(o, ResourceOutcome::Created(_)))
            .count();
        assert_eq!(created, 1);
        assert_eq!(coll.len(), 1);
    }

    #[tokio::test]
    async fn link_queries_are_form_encoded() {
        let (_root, coll) = named_collection(&["a", "b", "c"]);
        let ctx = RequestContext::builder(RequestType::Read, ResourcePath::parse("/coll"))
            .params(ResourceParams::from_pairs([("sort", "name&admin=1")]))
            .pagination(Pagination::new(0, 2))
            .build();
        let (sink, rx) = PropertySink::channel();
        coll.clone().read_properties(&ctx, sink);
        let props = rx.collect().await.unwrap();
        let links = props
            .iter()
            .find(|(k, _)| k == "links")
            .and_then(|(_, v)| v.as_list().map(|l| l.to_vec()))
            .unwrap();
        let href = links[0].as_state().unwrap().property("href").and_then(Value::as_str);
        assert_eq!(href, Some("/coll?offset=2&limit=2&sort=name%26admin%3D1"));
    }

    #[tokio::test]
    async fn generated_ids_are_uuids() {
        let (_root, coll) = named_collection(&[]);
        let ctx = read_ctx(0, 10, "");
        let (responder, pending) = Responder::new("createMember");
        coll.clone().create_member(&ctx, ResourceState::new(), responder);
        match pending.outcome().await {
            ResourceOutcome::Created(r) => {
                assert!(Uuid::parse_str(r.id()).is_ok());
                assert_eq!(r.uri().to_string(), format!("/coll/{}", r.id()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn binary_rejects_out_of_order_chunks() {
        let blob = InMemoryBinary::root("b", MediaType::octet_stream(), Vec::new());
        let ctx = read_ctx(0, 1, "");
        let (responder, mut pending) = Responder::new("updateContent");
        let chunk = |offset, data: &'static [u8], complete| ContentChunk {
            data: Bytes::from_static(data),
            offset,
            complete,
        };
        let responder = blob.clone().update_content(&ctx, chunk(0, b"abc", false), responder);
        let responder = responder.expect("still streaming");
        assert!(blob.clone().update_content(&ctx, chunk(7, b"x", true), responder).is_none());
        assert_eq!(
            pending.try_outcome().and_then(|o| o.error().map(|e| e.kind())),
            Some(ErrorKind::InvalidRequest)
        );
    }
}
