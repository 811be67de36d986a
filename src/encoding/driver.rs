//! Resource graph walk honoring a [`ReturnFields`] projection.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::dispatch::Dispatcher;
use crate::error::{ErrorKind, ResourceError};
use crate::request::{RequestContext, ReturnFields};
use crate::resource::{Resource, ResourceState, Value};

/// Pseudo-field that addresses a resource's members in a projection.
pub const MEMBERS_FIELD: &str = "members";

#[derive(Debug, Clone)]
pub struct EncodingDriver {
    dispatcher: Dispatcher,
}

impl EncodingDriver {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Materialize `resource` with the request's return fields. Failures
    /// surface as `NotAcceptable`.
    pub async fn encode(
        &self,
        resource: Arc<dyn Resource>,
        ctx: &RequestContext,
    ) -> Result<ResourceState, ResourceError> {
        self.walk(resource, ctx, ctx.return_fields())
            .await
            .map_err(|err| {
                tracing::warn!(
                    request_id = ctx.request_id(),
                    error = %err.chain(),
                    "Response encoding failed"
                );
                ResourceError::with_message(ErrorKind::NotAcceptable, err.client_message().to_string())
                    .with_cause(err)
            })
    }

    fn walk<'a>(
        &'a self,
        resource: Arc<dyn Resource>,
        ctx: &'a RequestContext,
        fields: &'a ReturnFields,
    ) -> BoxFuture<'a, Result<ResourceState, ResourceError>> {
        Box::pin(async move {
            let mut state = link(&resource);

            for (name, value) in self.dispatcher.read_properties(&resource, ctx).await? {
                if !fields.included(&name) {
                    continue;
                }
                let value = self.resolve(value, ctx, fields.child(&name)).await?;
                state.put_property(name, value);
            }

            if fields.included(MEMBERS_FIELD) {
                let nested = fields.child(MEMBERS_FIELD);
                // Sequential on purpose: members keep the order the resource gave.
                for member in self.dispatcher.read_members(&resource, ctx).await? {
                    let member_state = match nested {
                        Some(nested) => self.walk(member, ctx, nested).await?,
                        None => link(&member),
                    };
                    state.add_member(member_state);
                }
            }

            Ok(state)
        })
    }

    /// Replace resource references inside `value` with expanded states or
    /// links.
    fn resolve<'a>(
        &'a self,
        value: Value,
        ctx: &'a RequestContext,
        nested: Option<&'a ReturnFields>,
    ) -> BoxFuture<'a, Result<Value, ResourceError>> {
        Box::pin(async move {
            match value {
                Value::Resource(resource) => match nested {
                    Some(fields) => Ok(Value::State(self.walk(resource, ctx, fields).await?)),
                    None => Ok(Value::State(link(&resource))),
                },
                Value::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.resolve(item, ctx, nested).await?);
                    }
                    Ok(Value::List(out))
                }
                Value::Map(entries) => {
                    let mut out = BTreeMap::new();
                    for (key, item) in entries {
                        out.insert(key, self.resolve(item, ctx, nested).await?);
                    }
                    Ok(Value::Map(out))
                }
                other => Ok(other),
            }
        })
    }
}

/// State carrying only the id and self URI of `resource`.
fn link(resource: &Arc<dyn Resource>) -> ResourceState {
    let mut state = ResourceState::with_id(resource.id());
    state.set_uri(resource.uri().to_string());
    state
}
