//! Pipelines: named registries of places
//!
//! Places are registered in dependency order. A place may only consume
//! places registered before it, so the graph is acyclic by construction and
//! registration order is always a valid evaluation order. The topology never
//! changes after registration; only the per-place persist flags do.
//!
//! Driving a place:
//! - [`PlaceRef::compute`]: resolve now, on the calling thread or through a client
//! - [`PlaceRef::future`]: submit every step to a client, return a handle
//! - [`PlaceRef::read`]: load the persisted artifact, never compute

use crate::client::{ExecutionClient, InlineClient, PlaceFuture, Task, TaskHandle, Work};
use crate::context::RunContext;
use crate::error::{ConfigError, GraphError, PipelineError};
use crate::eval::LocalWalk;
use crate::feed::Feed;
use crate::persist::{check_name, PersistStore};
use crate::place::{Place, PlaceKind, PlaceSource, PlaceSpec, ScalarCheck};
use crate::report::Evaluation;
use crate::transition::TransitionRegistry;
use canopy_table::Value;
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, Index};
use std::path::PathBuf;
use std::sync::Arc;

/// A named computation graph
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    store: PersistStore,
    places: IndexMap<String, Place>,
    /// Edges point downstream; node index == registration index
    graph: DiGraph<String, ()>,
}

impl Pipeline {
    /// Empty pipeline persisting under `work_dir`
    pub fn new(name: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self::with_store(name, PersistStore::new(work_dir))
    }

    /// Empty pipeline persisting through `store`
    pub fn with_store(name: impl Into<String>, store: PersistStore) -> Self {
        Self {
            name: name.into(),
            store,
            places: IndexMap::new(),
            graph: DiGraph::new(),
        }
    }

    /// Pipeline name, the first half of every cache key
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Persist cache
    #[inline]
    #[must_use]
    pub fn store(&self) -> &PersistStore {
        &self.store
    }

    /// Register a place
    ///
    /// Nothing is registered when this fails.
    ///
    /// # Errors
    /// - `GraphError::InvalidName` if the pipeline or place name is not a
    ///   single path component
    /// - `GraphError::DuplicatePlace` if the name is taken
    /// - `GraphError::UnregisteredReference` if an upstream name is unknown
    /// - `GraphError::Arity` if the transition takes a different input count
    /// - `GraphError::InvalidLiteral` if a checked literal fails its check
    pub fn register(&mut self, name: impl Into<String>, spec: impl Into<PlaceSpec>) -> Result<(), GraphError> {
        let name = name.into();
        let spec = spec.into();

        for candidate in [self.name.as_str(), name.as_str()] {
            check_name(candidate).map_err(|reason| GraphError::InvalidName {
                name: candidate.to_string(),
                reason: reason.to_string(),
            })?;
        }
        if self.places.contains_key(&name) {
            return Err(GraphError::DuplicatePlace(name));
        }
        if let PlaceSpec::Checked { value, check } = &spec {
            check
                .check(value)
                .map_err(|reason| GraphError::InvalidLiteral { place: name.clone(), reason })?;
        }

        if let PlaceSpec::Derived { transition, inputs } = &spec {
            if let Some(missing) = inputs.iter().find(|input| !self.places.contains_key(*input)) {
                return Err(GraphError::UnregisteredReference {
                    place: name,
                    missing: missing.clone(),
                });
            }
            if let Some(expected) = transition.arity() {
                if expected != inputs.len() {
                    return Err(GraphError::Arity {
                        place: name,
                        transition: transition.name().to_string(),
                        expected,
                        actual: inputs.len(),
                    });
                }
            }
        }

        let place = Place::new(name.clone(), spec);
        let node = self.graph.add_node(name.clone());
        for input in place.inputs() {
            if let Some(index) = self.places.get_index_of(input) {
                self.graph.add_edge(NodeIndex::new(index), node, ());
            }
        }

        tracing::debug!(
            pipeline = %self.name,
            place = %name,
            kind = %place.kind(),
            inputs = ?place.inputs(),
            "registered place"
        );
        self.places.insert(name, place);
        Ok(())
    }

    /// Look up a place
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Place> {
        self.places.get(name)
    }

    /// Place handle to drive
    ///
    /// # Errors
    /// - `GraphError::PlaceNotFound` if no place has this name
    pub fn place(&self, name: &str) -> Result<PlaceRef<'_>, GraphError> {
        self.places
            .get(name)
            .map(|place| PlaceRef { pipeline: self, place })
            .ok_or_else(|| GraphError::PlaceNotFound(name.to_string()))
    }

    /// Check if a place exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.places.contains_key(name)
    }

    /// Place names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.places.keys().map(String::as_str).collect()
    }

    /// Number of places
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.places.len()
    }

    /// Check if no place is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Places in an order where every place follows its upstream places
    #[must_use]
    pub fn topological_order(&self) -> Vec<&str> {
        self.names()
    }

    /// Transitive upstream places of `name`, in registration order
    ///
    /// # Errors
    /// - `GraphError::PlaceNotFound` if no place has this name
    pub fn upstream(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        let start = self.node(name)?;
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut found = Vec::new();
        while let Some(node) = dfs.next(reversed) {
            if node != start {
                found.push(node.index());
            }
        }
        Ok(self.names_at(found))
    }

    /// Transitive downstream places of `name`, in registration order
    ///
    /// # Errors
    /// - `GraphError::PlaceNotFound` if no place has this name
    pub fn downstream(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        let start = self.node(name)?;
        let mut dfs = Dfs::new(&self.graph, start);
        let mut found = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            if node != start {
                found.push(node.index());
            }
        }
        Ok(self.names_at(found))
    }

    /// Serializable shape of the pipeline
    #[must_use]
    pub fn describe(&self) -> PipelineDescription {
        PipelineDescription {
            name: self.name.clone(),
            places: self
                .places
                .values()
                .map(|place| PlaceDescription {
                    name: place.name().to_string(),
                    kind: place.kind(),
                    persist: place.persist(),
                    check: place.check(),
                    transition: place.transition().map(|t| t.name().to_string()),
                    inputs: place.inputs().to_vec(),
                })
                .collect(),
        }
    }

    /// Rebuild a described pipeline
    ///
    /// Transitions are looked up by name in `registry`; literal places take
    /// their value from `literals`.
    ///
    /// # Errors
    /// - `ConfigError::UnknownTransition` for an unregistered transition name
    /// - `ConfigError::MissingLiteral` for a literal place without a value
    /// - any `GraphError` the description's shape triggers
    pub fn rebuild<I>(
        description: &PipelineDescription,
        registry: &TransitionRegistry,
        literals: I,
        store: PersistStore,
    ) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut literals: HashMap<String, Value> = literals.into_iter().collect();
        let mut pipeline = Self::with_store(description.name.clone(), store);

        for place in &description.places {
            let spec = match &place.transition {
                Some(transition) => PlaceSpec::derive(registry.get(transition)?, place.inputs.iter().cloned()),
                None => {
                    let value = literals
                        .remove(&place.name)
                        .ok_or_else(|| ConfigError::MissingLiteral(place.name.clone()))?;
                    match (place.check, value) {
                        (Some(check), Value::Scalar(value)) => PlaceSpec::checked(value, check),
                        (_, value) => PlaceSpec::Literal(value),
                    }
                }
            };
            pipeline.register(place.name.clone(), spec)?;
            if let Some(registered) = pipeline.get(&place.name) {
                registered.set_persist(place.persist);
            }
        }

        tracing::debug!(pipeline = %pipeline.name, places = pipeline.len(), "rebuilt pipeline");
        Ok(pipeline)
    }

    fn node(&self, name: &str) -> Result<NodeIndex, GraphError> {
        self.places
            .get_index_of(name)
            .map(NodeIndex::new)
            .ok_or_else(|| GraphError::PlaceNotFound(name.to_string()))
    }

    fn names_at(&self, mut indices: Vec<usize>) -> Vec<&str> {
        indices.sort_unstable();
        indices
            .into_iter()
            .filter_map(|i| self.places.get_index(i).map(|(name, _)| name.as_str()))
            .collect()
    }

    /// Places a walk to `target` resolves, upstream first
    ///
    /// Does not descend past scalar places the feed overrides.
    fn walk_order(&self, target: &str, feed: &Feed) -> Result<Vec<&Place>, GraphError> {
        fn visit<'a>(
            pipeline: &'a Pipeline,
            name: &str,
            feed: &Feed,
            seen: &mut HashSet<&'a str>,
            order: &mut Vec<&'a Place>,
        ) -> Result<(), GraphError> {
            let place = pipeline
                .places
                .get(name)
                .ok_or_else(|| GraphError::PlaceNotFound(name.to_string()))?;
            if !seen.insert(place.name()) {
                return Ok(());
            }
            if feed.resolve(name, place.kind()).is_none() {
                for input in place.inputs() {
                    visit(pipeline, input, feed, seen, order)?;
                }
            }
            order.push(place);
            Ok(())
        }

        let mut seen = HashSet::new();
        let mut order = Vec::new();
        visit(self, target, feed, &mut seen, &mut order)?;
        Ok(order)
    }

    fn submit_walk(
        &self,
        target: &str,
        ctx: &RunContext,
        client: &dyn ExecutionClient,
    ) -> Result<PlaceFuture, PipelineError> {
        let mut handles: HashMap<&str, TaskHandle> = HashMap::new();
        let mut tasks = Vec::new();

        for place in self.walk_order(target, ctx.feed())? {
            let (work, dependencies) = match (ctx.feed().resolve(place.name(), place.kind()), place.source()) {
                (Some(overridden), _) => (Work::Literal(Arc::new(Value::Scalar(overridden.clone()))), Vec::new()),
                (None, PlaceSource::Literal(value)) => (Work::Literal(Arc::clone(value)), Vec::new()),
                (None, PlaceSource::Pending(future)) => (Work::Forward, vec![future.root().clone()]),
                (None, PlaceSource::Derived { transition, inputs }) => {
                    let mut dependencies = Vec::with_capacity(inputs.len());
                    for input in inputs {
                        let handle = handles
                            .get(input.as_str())
                            .ok_or_else(|| GraphError::PlaceNotFound(input.clone()))?;
                        dependencies.push(handle.clone());
                    }
                    (Work::Transition(Arc::clone(transition)), dependencies)
                }
            };

            let task = Task::new(&self.name, place.name(), work, ctx.feed().clone())
                .with_persist(place.persist().then(|| self.store.clone()))
                .with_progress(ctx.progress().cloned());
            let handle = client.submit(task, dependencies);
            tasks.push(handle.clone());
            handles.insert(place.name(), handle);
        }

        let root = handles
            .remove(target)
            .ok_or_else(|| GraphError::PlaceNotFound(target.to_string()))?;
        Ok(PlaceFuture::new(target, root, tasks))
    }
}

impl Index<&str> for Pipeline {
    type Output = Place;

    /// # Panics
    /// Panics if no place has this name; use [`Pipeline::get`] to check.
    fn index(&self, name: &str) -> &Place {
        match self.places.get(name) {
            Some(place) => place,
            None => panic!("no place named '{name}' in pipeline '{}'", self.name),
        }
    }
}

/// A place together with the pipeline that owns it
#[derive(Debug, Clone, Copy)]
pub struct PlaceRef<'p> {
    pipeline: &'p Pipeline,
    place: &'p Place,
}

impl<'p> PlaceRef<'p> {
    /// Owning pipeline
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &'p Pipeline {
        self.pipeline
    }

    /// Resolve the value
    ///
    /// Literals are returned as is. Otherwise every upstream place is
    /// resolved first, feed overrides applied, and the transition run. Places
    /// flagged `persist` are written to the cache on the way. The cache is
    /// never read.
    ///
    /// # Errors
    /// - `PipelineError::Config` for a bad feed, before any work
    /// - `PipelineError::Transition` if a transition fails
    /// - `PipelineError::Io` / `Codec` if an artifact cannot be written
    pub fn compute(&self, ctx: &RunContext) -> Result<Value, PipelineError> {
        self.evaluate(ctx).map(Evaluation::into_value)
    }

    /// Resolve the value along with the report of the walk
    ///
    /// # Errors
    /// Same as [`PlaceRef::compute`].
    pub fn evaluate(&self, ctx: &RunContext) -> Result<Evaluation, PipelineError> {
        ctx.feed().validate(self.pipeline)?;
        tracing::info!(
            pipeline = %self.pipeline.name,
            place = %self.place.name(),
            overrides = ctx.feed().len(),
            client = ctx.client().is_some(),
            "computing place"
        );

        let evaluation = match ctx.client() {
            Some(client) => {
                let future = self.pipeline.submit_walk(self.place.name(), ctx, &**client)?;
                futures::executor::block_on(future)?
            }
            None => LocalWalk::new(self.pipeline, ctx).run(self.place.name())?,
        };

        let skipped = evaluation.report.skipped_count();
        if skipped > 0 {
            tracing::warn!(place = %self.place.name(), skipped, "rows skipped");
        }
        Ok(evaluation)
    }

    /// Submit the walk and return without waiting
    ///
    /// Each place becomes one task on the context's client (an
    /// [`InlineClient`] when none is set), depending on the tasks of its
    /// upstream places.
    ///
    /// # Errors
    /// - `PipelineError::Config` for a bad feed; nothing is submitted
    pub fn future(&self, ctx: &RunContext) -> Result<PlaceFuture, PipelineError> {
        ctx.feed().validate(self.pipeline)?;
        tracing::info!(
            pipeline = %self.pipeline.name,
            place = %self.place.name(),
            overrides = ctx.feed().len(),
            "submitting place"
        );

        match ctx.client() {
            Some(client) => self.pipeline.submit_walk(self.place.name(), ctx, &**client),
            None => self.pipeline.submit_walk(self.place.name(), ctx, &InlineClient),
        }
    }

    /// Load the persisted artifact
    ///
    /// # Errors
    /// - `PipelineError::CacheMiss` if nothing was persisted for this place
    pub fn read(&self) -> Result<Value, PipelineError> {
        self.pipeline.store.read(&self.pipeline.name, self.place.name())
    }

    /// Where this place's artifact lives
    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.pipeline.store.artifact_path(&self.pipeline.name, self.place.name())
    }
}

impl Deref for PlaceRef<'_> {
    type Target = Place;

    fn deref(&self) -> &Place {
        self.place
    }
}

/// Serializable pipeline shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDescription {
    /// Pipeline name
    pub name: String,
    /// Places in registration order
    pub places: Vec<PlaceDescription>,
}

/// Serializable place shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceDescription {
    /// Place name
    pub name: String,
    /// Type tag
    pub kind: PlaceKind,
    /// Persist flag
    pub persist: bool,
    /// Constraint on fed values, for checked scalars
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<ScalarCheck>,
    /// Transition name, absent for literals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,
    /// Upstream place names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
}
