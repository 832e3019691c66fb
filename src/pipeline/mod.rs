//! Request processing pipelines.
//!
//! # Data Flow
//! ```text
//! Exchange
//!     → stage 1 … stage n (stop early on Flow::Stop or an error)
//!     → response interceptors (at most once per exchange)
//!     → completion hooks of the stages that ran, in reverse order
//! ```
//!
//! # Design Decisions
//! - A pipeline is an immutable list of shared stages built once per route
//! - Stages never write error responses; the driver does it from the
//!   returned [`GatewayError`]
//! - Completion hooks replace exit callbacks: logging and buffer release
//!   happen there, whatever way the chain ended

pub mod factory;
pub mod interceptors;
pub mod logging;
pub mod stages;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::routing::RouteKind;

pub use factory::PipelineFactory;
pub use interceptors::{
    InterceptPoint, Interceptor, InterceptorRegistry, RequestInterceptorsExecutor,
    ResponseInterceptorsExecutor,
};
pub use logging::{RequestLogSettings, RequestLogger};

/// Route attributes attached to every exchange the route handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineInfo {
    pub kind: RouteKind,
    pub pattern: String,
    pub name: String,
    pub secured: bool,
}

/// What the driver does after a stage returns successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The response is complete; skip the remaining stages.
    Stop,
}

/// One step of a pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError>;

    /// Called once the chain is over, in reverse stage order.
    fn completed(&self, _exchange: &mut Exchange) {}
}

/// An ordered chain of stages.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    response_interceptors: Option<ResponseInterceptorsExecutor>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn has_response_interceptors(&self) -> bool {
        self.response_interceptors.is_some()
    }

    /// Run the chain against `exchange`. Errors end up in the exchange's response.
    pub async fn execute(&self, exchange: &mut Exchange) {
        let mut ran = 0;
        for stage in &self.stages {
            ran += 1;
            match stage.handle(exchange).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(err) => {
                    tracing::debug!(stage = stage.name(), error = %err, "Stage ended the pipeline");
                    exchange.set_in_error(&err);
                    break;
                }
            }
        }

        if let Some(executor) = &self.response_interceptors {
            executor.execute(exchange).await;
        }

        for stage in self.stages[..ran].iter().rev() {
            stage.completed(exchange);
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("response_interceptors", &self.has_response_interceptors())
            .finish()
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    response_interceptors: Option<ResponseInterceptorsExecutor>,
}

impl PipelineBuilder {
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn shared(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn response_interceptors(mut self, executor: ResponseInterceptorsExecutor) -> Self {
        self.response_interceptors = Some(executor);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
            response_interceptors: self.response_interceptors,
        }
    }
}
