//! Graph evaluation
//!
//! [`Step`] is the per-place work shared by the local walk and by tasks
//! shipped to an execution client: run the transition, record the outcome,
//! persist when asked, notify the observer.
//!
//! [`LocalWalk`] is the synchronous path: depth-first, upstream before
//! downstream, with a memo that lives for one call only.

use crate::context::RunContext;
use crate::error::{GraphError, PipelineError};
use crate::feed::Feed;
use crate::persist::PersistStore;
use crate::pipeline::Pipeline;
use crate::place::PlaceSource;
use crate::progress::{ProgressEvent, ProgressObserver};
use crate::report::{Evaluation, RowFailure, RunReport};
use crate::transition::{Output, Transition};
use canopy_table::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-place bookkeeping around a value
pub(crate) struct Step<'a> {
    pub(crate) pipeline: &'a str,
    pub(crate) place: &'a str,
    pub(crate) persist: Option<&'a PersistStore>,
    pub(crate) progress: Option<&'a dyn ProgressObserver>,
}

impl Step<'_> {
    pub(crate) fn start(&self) {
        tracing::debug!(pipeline = self.pipeline, place = self.place, "evaluating place");
        self.notify(ProgressEvent::Started {
            place: self.place.to_string(),
        });
    }

    /// Run a transition, tagging failures with the place
    pub(crate) fn apply(
        &self,
        transition: &dyn Transition,
        inputs: Vec<Value>,
        feed: &Feed,
    ) -> Result<Output, PipelineError> {
        transition.execute(inputs, feed).map_err(|e| {
            tracing::error!(
                pipeline = self.pipeline,
                place = self.place,
                transition = transition.name(),
                error = %e,
                "transition failed"
            );
            PipelineError::transition(self.place, e)
        })
    }

    /// Record a resolved value and write it out when persisting
    pub(crate) fn finish(
        &self,
        value: &Value,
        failures: Vec<RowFailure>,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        let skipped_rows = failures.len();
        report.record_evaluated(self.place);
        report.record_failures(self.place, failures);

        if let Some(store) = self.persist {
            let path = store.write(self.pipeline, self.place, value)?;
            report.record_persisted(self.place, path.clone());
            self.notify(ProgressEvent::Persisted {
                place: self.place.to_string(),
                path,
            });
        }

        self.notify(ProgressEvent::Finished {
            place: self.place.to_string(),
            skipped_rows,
        });
        Ok(())
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(observer) = self.progress {
            observer.on_event(&event);
        }
    }
}

/// Synchronous depth-first evaluation on the calling thread
pub(crate) struct LocalWalk<'p> {
    pipeline: &'p Pipeline,
    ctx: &'p RunContext,
    memo: HashMap<String, Arc<Value>>,
    report: RunReport,
}

impl<'p> LocalWalk<'p> {
    pub(crate) fn new(pipeline: &'p Pipeline, ctx: &'p RunContext) -> Self {
        Self {
            pipeline,
            ctx,
            memo: HashMap::new(),
            report: RunReport::new(),
        }
    }

    /// Evaluate `place` and everything it needs
    pub(crate) fn run(mut self, place: &str) -> Result<Evaluation, PipelineError> {
        let value = self.resolve(place)?;
        drop(self.memo);
        let value = Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone());
        Ok(Evaluation {
            value,
            report: self.report,
        })
    }

    fn resolve(&mut self, name: &str) -> Result<Arc<Value>, PipelineError> {
        if let Some(value) = self.memo.get(name) {
            return Ok(Arc::clone(value));
        }

        let (pipeline, ctx) = (self.pipeline, self.ctx);
        let place = pipeline
            .get(name)
            .ok_or_else(|| GraphError::PlaceNotFound(name.to_string()))?;
        let step = Step {
            pipeline: pipeline.name(),
            place: name,
            persist: place.persist().then_some(pipeline.store()),
            progress: ctx.progress().map(|p| &**p),
        };
        step.start();

        let (value, failures) = match (ctx.feed().resolve(name, place.kind()), place.source()) {
            (Some(overridden), _) => {
                tracing::debug!(place = name, value = %overridden, "feed override");
                (Arc::new(Value::Scalar(overridden.clone())), Vec::new())
            }
            (None, PlaceSource::Literal(value)) => (Arc::clone(value), Vec::new()),
            (None, PlaceSource::Pending(future)) => {
                let evaluation = futures::executor::block_on(future.clone())?;
                (Arc::new(evaluation.value), Vec::new())
            }
            (None, PlaceSource::Derived { transition, inputs }) => {
                let mut values = Vec::with_capacity(inputs.len());
                for input in inputs {
                    values.push(self.resolve(input)?.as_ref().clone());
                }
                let output = step.apply(transition.as_ref(), values, ctx.feed())?;
                (Arc::new(output.value), output.row_failures)
            }
        };

        step.finish(&value, failures, &mut self.report)?;
        self.memo.insert(name.to_string(), Arc::clone(&value));
        Ok(value)
    }
}
