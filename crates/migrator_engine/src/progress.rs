use engine_logging::{engine_info, engine_log};
use log::Level;

use crate::{PipelineEvent, Stage, StageSummary};

/// Receives `(level, stage, message)` tuples and stage summaries from the
/// pipeline. Formatting and destinations belong to the implementor.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Forwards every event to the global `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Log {
                level,
                stage,
                message,
            } => engine_log!(level, stage.target(), "{}", message),
            PipelineEvent::StageCompleted(summary) => {
                engine_info!("stage completed: {}", summary);
            }
        }
    }
}

pub(crate) fn report(sink: &dyn ProgressSink, level: Level, stage: Stage, message: impl Into<String>) {
    sink.emit(PipelineEvent::Log {
        level,
        stage,
        message: message.into(),
    });
}

pub(crate) fn complete(sink: &dyn ProgressSink, summary: StageSummary) {
    sink.emit(PipelineEvent::StageCompleted(summary));
}
